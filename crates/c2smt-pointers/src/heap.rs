//! SMT encodings of the heap
//!
//! Three interchangeable theories back the memory regions:
//! - [`UfHeap`]: one uninterpreted function per region version
//! - [`ArrayHeap`]: one array per region version
//! - [`ByteArrayHeap`]: a single byte array shared by all regions
//!
//! Heaps are stateless. The caller owns the SSA indices of the heap symbols
//! and, for the function encoding, the retention of unwritten cells.

use crate::config::{Endianness, HeapEncoding, PointerAliasingConfig, SubBytePolicy};
use crate::error::{EncodingError, EncodingResult};
use c2smt_formula::{ssa_name, FormulaError, Sort, Term};
use std::fmt;
use tracing::trace;

/// Name of the byte array of the byte-array heap
pub const BYTE_HEAP_NAME: &str = "__heap";

/// Heap read and write encoding
pub trait SmtHeap: Send + Sync + fmt::Debug {
    /// Symbol whose SSA index versions the region `region_symbol`
    fn heap_symbol(&self, region_symbol: &str) -> String {
        region_symbol.to_string()
    }

    /// Whether a write keeps all other cells of the written symbol
    fn retains_unwritten_cells(&self) -> bool;

    /// Whether all regions share one byte-granular symbol
    fn is_byte_addressed(&self) -> bool {
        false
    }

    /// `name@new_index` equals `name@old_index` updated at `address` with `value`
    fn make_pointer_assignment(
        &self,
        name: &str,
        sort: &Sort,
        old_index: u32,
        new_index: u32,
        address: &Term,
        value: &Term,
    ) -> EncodingResult<Term>;

    /// Several writes producing one new version
    fn make_pointer_assignments(
        &self,
        name: &str,
        sort: &Sort,
        old_index: u32,
        new_index: u32,
        assignments: &[(Term, Term)],
    ) -> EncodingResult<Term> {
        match assignments {
            [(address, value)] => {
                self.make_pointer_assignment(name, sort, old_index, new_index, address, value)
            }
            _ => Err(EncodingError::Unsupported(format!(
                "{} writes to {name} in one step",
                assignments.len()
            ))),
        }
    }

    /// `name@new_index` equals `name@old_index`
    fn make_identity_pointer_assignment(
        &self,
        name: &str,
        sort: &Sort,
        old_index: u32,
        new_index: u32,
    ) -> EncodingResult<Term>;

    /// Value of sort `sort` at `address` of the heap symbol `name`, which
    /// already carries its version
    fn make_pointer_dereference(&self, name: &str, sort: &Sort, address: &Term)
        -> EncodingResult<Term>;

    /// Value of sort `sort` at `address` of version `index` of `name`
    fn make_indexed_pointer_dereference(
        &self,
        name: &str,
        sort: &Sort,
        index: u32,
        address: &Term,
    ) -> EncodingResult<Term> {
        self.make_pointer_dereference(&ssa_name(&self.heap_symbol(name), index), sort, address)
    }
}

/// Whether `name` versions heap contents rather than a program variable
pub fn is_heap_symbol(name: &str) -> bool {
    name.starts_with('*') || name == BYTE_HEAP_NAME
}

/// Heap for the configured encoding
pub fn make_heap(config: &PointerAliasingConfig) -> Box<dyn SmtHeap> {
    let address_sort = config.address_sort();
    match config.heap_encoding {
        HeapEncoding::UninterpretedFunctions => Box::new(UfHeap::new(address_sort)),
        HeapEncoding::Arrays => Box::new(ArrayHeap::new(address_sort)),
        HeapEncoding::ByteArray => Box::new(ByteArrayHeap::new(
            address_sort,
            config.endianness,
            config.byte_array_sub_byte_policy,
        )),
    }
}

fn check_sort(op: &'static str, expected: &Sort, term: &Term) -> EncodingResult<()> {
    let actual = term.sort();
    if &actual == expected {
        Ok(())
    } else {
        Err(FormulaError::SortMismatch {
            op,
            expected: expected.to_string(),
            actual: actual.to_string(),
        }
        .into())
    }
}

/// One uninterpreted function from addresses to values per region version
#[derive(Debug, Clone)]
pub struct UfHeap {
    address_sort: Sort,
}

impl UfHeap {
    pub fn new(address_sort: Sort) -> Self {
        Self { address_sort }
    }

    fn write(&self, name: &str, sort: &Sort, new_index: u32, address: &Term, value: &Term) -> EncodingResult<Term> {
        check_sort("heap write", &self.address_sort, address)?;
        check_sort("heap write", sort, value)?;
        let cell = Term::apply(ssa_name(name, new_index), sort.clone(), vec![address.clone()]);
        Ok(Term::eq(cell, value.clone())?)
    }
}

impl SmtHeap for UfHeap {
    fn retains_unwritten_cells(&self) -> bool {
        false
    }

    fn make_pointer_assignment(
        &self,
        name: &str,
        sort: &Sort,
        _old_index: u32,
        new_index: u32,
        address: &Term,
        value: &Term,
    ) -> EncodingResult<Term> {
        self.write(name, sort, new_index, address, value)
    }

    fn make_pointer_assignments(
        &self,
        name: &str,
        sort: &Sort,
        _old_index: u32,
        new_index: u32,
        assignments: &[(Term, Term)],
    ) -> EncodingResult<Term> {
        let writes = assignments
            .iter()
            .map(|(address, value)| self.write(name, sort, new_index, address, value))
            .collect::<EncodingResult<Vec<_>>>()?;
        Ok(Term::and_all(writes))
    }

    fn make_identity_pointer_assignment(
        &self,
        name: &str,
        _sort: &Sort,
        _old_index: u32,
        _new_index: u32,
    ) -> EncodingResult<Term> {
        Err(EncodingError::Unsupported(format!(
            "identity of uninterpreted function {name} needs quantifiers"
        )))
    }

    fn make_pointer_dereference(
        &self,
        name: &str,
        sort: &Sort,
        address: &Term,
    ) -> EncodingResult<Term> {
        check_sort("heap read", &self.address_sort, address)?;
        Ok(Term::apply(name, sort.clone(), vec![address.clone()]))
    }
}

/// One array from addresses to values per region version
#[derive(Debug, Clone)]
pub struct ArrayHeap {
    address_sort: Sort,
}

impl ArrayHeap {
    pub fn new(address_sort: Sort) -> Self {
        Self { address_sort }
    }

    fn array(&self, name: &str, index: u32, sort: &Sort) -> Term {
        Term::var(
            ssa_name(name, index),
            Sort::array(self.address_sort.clone(), sort.clone()),
        )
    }
}

impl SmtHeap for ArrayHeap {
    fn retains_unwritten_cells(&self) -> bool {
        true
    }

    fn make_pointer_assignment(
        &self,
        name: &str,
        sort: &Sort,
        old_index: u32,
        new_index: u32,
        address: &Term,
        value: &Term,
    ) -> EncodingResult<Term> {
        check_sort("heap write", &self.address_sort, address)?;
        check_sort("heap write", sort, value)?;
        let stored = Term::store(self.array(name, old_index, sort), address.clone(), value.clone())?;
        Ok(Term::eq(self.array(name, new_index, sort), stored)?)
    }

    fn make_identity_pointer_assignment(
        &self,
        name: &str,
        sort: &Sort,
        old_index: u32,
        new_index: u32,
    ) -> EncodingResult<Term> {
        Ok(Term::eq(
            self.array(name, new_index, sort),
            self.array(name, old_index, sort),
        )?)
    }

    fn make_pointer_dereference(
        &self,
        name: &str,
        sort: &Sort,
        address: &Term,
    ) -> EncodingResult<Term> {
        check_sort("heap read", &self.address_sort, address)?;
        let array = Term::var(name, Sort::array(self.address_sort.clone(), sort.clone()));
        Ok(Term::select(array, address.clone())?)
    }
}

/// All regions share one array from addresses to bytes
#[derive(Debug, Clone)]
pub struct ByteArrayHeap {
    address_sort: Sort,
    endianness: Endianness,
    sub_byte: SubBytePolicy,
}

impl ByteArrayHeap {
    pub fn new(address_sort: Sort, endianness: Endianness, sub_byte: SubBytePolicy) -> Self {
        Self {
            address_sort,
            endianness,
            sub_byte,
        }
    }

    fn heap_array(&self, name: &str) -> Term {
        Term::var(name, Sort::array(self.address_sort.clone(), Sort::BitVec(8)))
    }

    /// Width of the value and number of bytes it occupies
    fn layout(&self, sort: &Sort) -> EncodingResult<(u32, u32)> {
        let Some(width) = sort.bv_width() else {
            return Err(EncodingError::Unsupported(format!(
                "values of sort {sort} on the byte-array heap"
            )));
        };
        if width % 8 == 0 {
            return Ok((width, width / 8));
        }
        match self.sub_byte {
            SubBytePolicy::Reject => Err(EncodingError::Unsupported(format!(
                "{width}-bit access on the byte-array heap"
            ))),
            SubBytePolicy::Widen => Ok((width, width.div_ceil(8))),
        }
    }

    fn byte_address(&self, address: &Term, offset: u32) -> EncodingResult<Term> {
        let width = self.address_sort.bv_width().unwrap_or(64);
        Ok(Term::bv_add(address.clone(), Term::bv(i128::from(offset), width))?)
    }

    /// Index of the value byte (0 = least significant) stored at `offset`
    fn byte_index(&self, offset: u32, bytes: u32) -> u32 {
        match self.endianness {
            Endianness::Little => offset,
            Endianness::Big => bytes - 1 - offset,
        }
    }
}

impl SmtHeap for ByteArrayHeap {
    fn heap_symbol(&self, _region_symbol: &str) -> String {
        BYTE_HEAP_NAME.to_string()
    }

    fn is_byte_addressed(&self) -> bool {
        true
    }

    fn retains_unwritten_cells(&self) -> bool {
        true
    }

    fn make_pointer_assignment(
        &self,
        _name: &str,
        sort: &Sort,
        old_index: u32,
        new_index: u32,
        address: &Term,
        value: &Term,
    ) -> EncodingResult<Term> {
        check_sort("heap write", &self.address_sort, address)?;
        check_sort("heap write", sort, value)?;
        let (width, bytes) = self.layout(sort)?;
        let padded = Term::zero_extend(value.clone(), bytes * 8 - width)?;
        let mut heap = self.heap_array(&ssa_name(BYTE_HEAP_NAME, old_index));
        for offset in 0..bytes {
            let k = self.byte_index(offset, bytes);
            let byte = Term::extract(padded.clone(), 8 * k + 7, 8 * k)?;
            heap = Term::store(heap, self.byte_address(address, offset)?, byte)?;
        }
        trace!(bytes, old_index, new_index, "byte heap write");
        Ok(Term::eq(
            self.heap_array(&ssa_name(BYTE_HEAP_NAME, new_index)),
            heap,
        )?)
    }

    fn make_identity_pointer_assignment(
        &self,
        _name: &str,
        _sort: &Sort,
        old_index: u32,
        new_index: u32,
    ) -> EncodingResult<Term> {
        Ok(Term::eq(
            self.heap_array(&ssa_name(BYTE_HEAP_NAME, new_index)),
            self.heap_array(&ssa_name(BYTE_HEAP_NAME, old_index)),
        )?)
    }

    fn make_pointer_dereference(
        &self,
        name: &str,
        sort: &Sort,
        address: &Term,
    ) -> EncodingResult<Term> {
        check_sort("heap read", &self.address_sort, address)?;
        let (width, bytes) = self.layout(sort)?;
        let heap = self.heap_array(name);
        let mut value: Option<Term> = None;
        for offset in 0..bytes {
            let byte = Term::select(heap.clone(), self.byte_address(address, offset)?)?;
            value = Some(match (value, self.endianness) {
                (None, _) => byte,
                // later bytes are more significant
                (Some(acc), Endianness::Little) => Term::concat(byte, acc)?,
                (Some(acc), Endianness::Big) => Term::concat(acc, byte)?,
            });
        }
        let value = value.ok_or_else(|| {
            EncodingError::Unsupported("zero-width access on the byte-array heap".to_string())
        })?;
        Ok(Term::extract(value, width - 1, 0)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use c2smt_formula::{Model, Value};

    fn addr(n: i128) -> Term {
        Term::bv(n, 64)
    }

    fn round_trip(heap: &dyn SmtHeap, width: u32, value: u128) -> Value {
        let sort = Sort::BitVec(width);
        let write = heap
            .make_pointer_assignment("*int", &sort, 1, 2, &addr(64), &Term::BitVec(value, width))
            .unwrap();
        let mut model = Model::completing();
        model.define(&write).unwrap();
        let read = heap
            .make_indexed_pointer_dereference("*int", &sort, 2, &addr(64))
            .unwrap();
        model.eval(&read).unwrap()
    }

    #[test]
    fn test_round_trips() {
        let heaps: Vec<Box<dyn SmtHeap>> = vec![
            Box::new(UfHeap::new(Sort::BitVec(64))),
            Box::new(ArrayHeap::new(Sort::BitVec(64))),
            Box::new(ByteArrayHeap::new(
                Sort::BitVec(64),
                Endianness::Little,
                SubBytePolicy::Reject,
            )),
            Box::new(ByteArrayHeap::new(
                Sort::BitVec(64),
                Endianness::Big,
                SubBytePolicy::Reject,
            )),
        ];
        for heap in &heaps {
            assert_eq!(
                round_trip(heap.as_ref(), 32, 0xdead_beef),
                Value::BitVec(0xdead_beef, 32)
            );
        }
    }

    #[test]
    fn test_byte_order() {
        let sort = Sort::BitVec(16);
        for (endianness, first_byte) in [(Endianness::Little, 0x34), (Endianness::Big, 0x12)] {
            let heap = ByteArrayHeap::new(Sort::BitVec(64), endianness, SubBytePolicy::Reject);
            let write = heap
                .make_pointer_assignment("*short", &sort, 1, 2, &addr(0), &Term::bv(0x1234, 16))
                .unwrap();
            let mut model = Model::completing();
            model.define(&write).unwrap();
            let byte = heap
                .make_indexed_pointer_dereference("*char", &Sort::BitVec(8), 2, &addr(0))
                .unwrap();
            assert_eq!(model.eval(&byte).unwrap(), Value::BitVec(first_byte, 8));
        }
    }

    #[test]
    fn test_sub_byte_policy() {
        let reject = ByteArrayHeap::new(Sort::BitVec(64), Endianness::Little, SubBytePolicy::Reject);
        let err = reject
            .make_pointer_assignment("*x", &Sort::BitVec(12), 1, 2, &addr(0), &Term::bv(5, 12))
            .unwrap_err();
        assert!(err.is_unsupported());

        let widen = ByteArrayHeap::new(Sort::BitVec(64), Endianness::Little, SubBytePolicy::Widen);
        assert_eq!(round_trip(&widen, 12, 0xabc), Value::BitVec(0xabc, 12));
    }

    #[test]
    fn test_unsupported_requests() {
        let bytes = ByteArrayHeap::new(Sort::BitVec(64), Endianness::Little, SubBytePolicy::Widen);
        let err = bytes
            .make_pointer_dereference("__heap@1", &Sort::Int, &addr(0))
            .unwrap_err();
        assert!(err.is_unsupported());

        let uf = UfHeap::new(Sort::BitVec(64));
        assert!(uf
            .make_identity_pointer_assignment("*int", &Sort::BitVec(32), 1, 2)
            .unwrap_err()
            .is_unsupported());

        let arrays = ArrayHeap::new(Sort::BitVec(64));
        let two = [
            (addr(0), Term::bv(1, 32)),
            (addr(4), Term::bv(2, 32)),
        ];
        assert!(arrays
            .make_pointer_assignments("*int", &Sort::BitVec(32), 1, 2, &two)
            .unwrap_err()
            .is_unsupported());
        let batched = uf
            .make_pointer_assignments("*int", &Sort::BitVec(32), 1, 2, &two)
            .unwrap();
        let mut model = Model::completing();
        model.define(&batched).unwrap();
        let second = uf
            .make_indexed_pointer_dereference("*int", &Sort::BitVec(32), 2, &addr(4))
            .unwrap();
        assert_eq!(model.eval(&second).unwrap(), Value::BitVec(2, 32));
    }

    #[test]
    fn test_sort_mismatch() {
        let heap = ArrayHeap::new(Sort::BitVec(64));
        let err = heap
            .make_pointer_assignment("*int", &Sort::BitVec(32), 1, 2, &addr(0), &Term::bv(1, 16))
            .unwrap_err();
        assert!(matches!(
            err,
            EncodingError::Formula(FormulaError::SortMismatch { .. })
        ));
        assert!(heap
            .make_pointer_dereference("*int@1", &Sort::BitVec(32), &Term::bv(0, 32))
            .is_err());
    }

    #[test]
    fn test_make_heap() {
        let config = PointerAliasingConfig {
            heap_encoding: HeapEncoding::ByteArray,
            ..Default::default()
        };
        let heap = make_heap(&config);
        assert_eq!(heap.heap_symbol("*int"), BYTE_HEAP_NAME);
        assert!(heap.retains_unwritten_cells());
        assert!(heap.is_byte_addressed());
        let uf = make_heap(&PointerAliasingConfig::default());
        assert!(!uf.retains_unwritten_cells());
        assert!(!uf.is_byte_addressed());
    }

    #[test]
    fn test_heap_symbols() {
        assert!(is_heap_symbol("*int"));
        assert!(is_heap_symbol("*int@struct_S.g"));
        assert!(is_heap_symbol(BYTE_HEAP_NAME));
        assert!(!is_heap_symbol("main::x"));
    }
}
