//! SSA indices and side constraints
//!
//! Every variable and every heap symbol is versioned; a write produces a
//! fresh index. Indices start at [`SsaMap::INITIAL_INDEX`] for symbols that
//! were never written.

use c2smt_formula::{ssa_name, Sort, Term};
use im::OrdMap;
use serde::{Deserialize, Serialize};

/// Current SSA index per symbol, and the sort of every symbol that was
/// versioned with a known sort
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SsaMap {
    indices: OrdMap<String, u32>,
    sorts: OrdMap<String, Sort>,
}

impl SsaMap {
    pub const INITIAL_INDEX: u32 = 1;

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn index(&self, name: &str) -> u32 {
        self.indices
            .get(name)
            .copied()
            .unwrap_or(Self::INITIAL_INDEX)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.indices.contains_key(name)
    }

    /// Current version of `name` as a term
    pub fn term(&self, name: &str, sort: Sort) -> Term {
        Term::var(ssa_name(name, self.index(name)), sort)
    }

    pub fn sort(&self, name: &str) -> Option<&Sort> {
        self.sorts.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &u32)> {
        self.indices.iter()
    }

    pub fn builder(&self) -> SsaMapBuilder {
        SsaMapBuilder {
            indices: self.indices.clone(),
            sorts: self.sorts.clone(),
        }
    }

    /// Pointwise maximum of both maps, plus the symbols whose indices differ
    /// as `(name, left index, right index)`
    pub fn merge(left: &SsaMap, right: &SsaMap) -> (SsaMap, Vec<(String, u32, u32)>) {
        let mut indices = left.indices.clone();
        let mut differences = Vec::new();
        for (name, &r) in right.indices.iter() {
            let l = left.index(name);
            if l != r {
                differences.push((name.clone(), l, r));
            }
            indices.insert(name.clone(), l.max(r));
        }
        for (name, &l) in left.indices.iter() {
            if !right.indices.contains_key(name) && l != Self::INITIAL_INDEX {
                differences.push((name.clone(), l, Self::INITIAL_INDEX));
            }
        }
        differences.sort();
        let sorts = left.sorts.clone().union(right.sorts.clone());
        (SsaMap { indices, sorts }, differences)
    }
}

/// Mutable view used while encoding one edge
#[derive(Debug, Clone, Default)]
pub struct SsaMapBuilder {
    indices: OrdMap<String, u32>,
    sorts: OrdMap<String, Sort>,
}

impl SsaMapBuilder {
    pub fn index(&self, name: &str) -> u32 {
        self.indices
            .get(name)
            .copied()
            .unwrap_or(SsaMap::INITIAL_INDEX)
    }

    /// Advance `name` to a new version and return its index
    pub fn fresh_index(&mut self, name: &str) -> u32 {
        let next = self.index(name) + 1;
        self.indices.insert(name.to_string(), next);
        next
    }

    /// Advance `name` of sort `sort` to a new version
    pub fn fresh_versioned(&mut self, name: &str, sort: Sort) -> u32 {
        self.sorts.insert(name.to_string(), sort);
        self.fresh_index(name)
    }

    pub fn sort(&self, name: &str) -> Option<&Sort> {
        self.sorts.get(name)
    }

    pub fn set_index(&mut self, name: &str, index: u32) {
        self.indices.insert(name.to_string(), index);
    }

    /// Current version of `name` as a term
    pub fn term(&self, name: &str, sort: Sort) -> Term {
        Term::var(ssa_name(name, self.index(name)), sort)
    }

    pub fn build(self) -> SsaMap {
        SsaMap {
            indices: self.indices,
            sorts: self.sorts,
        }
    }
}

/// Boolean side conditions collected while encoding
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Constraints {
    terms: Vec<Term>,
}

impl Constraints {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a constraint; trivially true ones are dropped
    pub fn add(&mut self, constraint: Term) {
        if !constraint.is_true() {
            self.terms.push(constraint);
        }
    }

    pub fn extend(&mut self, other: Constraints) {
        self.terms.extend(other.terms);
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Term> {
        self.terms.iter()
    }

    /// Conjunction of all constraints
    pub fn to_formula(&self) -> Term {
        Term::and_all(self.terms.iter().cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_indices() {
        let ssa = SsaMap::empty();
        let mut b = ssa.builder();
        assert_eq!(b.index("x"), 1);
        assert_eq!(b.fresh_index("x"), 2);
        assert_eq!(b.fresh_index("x"), 3);
        let built = b.build();
        assert_eq!(built.index("x"), 3);
        assert_eq!(ssa.index("x"), 1);
        assert_eq!(built.term("x", Sort::Int).to_string(), "x@3");
    }

    #[test]
    fn test_merge_reports_differences() {
        let mut l = SsaMap::empty().builder();
        l.set_index("x", 3);
        l.set_index("y", 2);
        let mut r = SsaMap::empty().builder();
        r.set_index("x", 5);
        r.set_index("y", 2);
        r.set_index("z", 4);
        let (merged, diffs) = SsaMap::merge(&l.build(), &r.build());
        assert_eq!(merged.index("x"), 5);
        assert_eq!(merged.index("z"), 4);
        assert_eq!(
            diffs,
            vec![("x".to_string(), 3, 5), ("z".to_string(), 1, 4)]
        );
    }

    #[test]
    fn test_sorts_survive_merge() {
        let mut l = SsaMap::empty().builder();
        assert_eq!(l.fresh_versioned("x", Sort::BitVec(32)), 2);
        let mut r = SsaMap::empty().builder();
        r.fresh_versioned("*int", Sort::BitVec(32));
        let (merged, _) = SsaMap::merge(&l.build(), &r.build());
        assert_eq!(merged.sort("x"), Some(&Sort::BitVec(32)));
        assert_eq!(merged.sort("*int"), Some(&Sort::BitVec(32)));
        assert_eq!(merged.sort("y"), None);
    }

    #[test]
    fn test_constraints_drop_true() {
        let mut c = Constraints::new();
        c.add(Term::Bool(true));
        assert!(c.is_empty());
        c.add(Term::var("p", Sort::Bool));
        assert_eq!(c.to_formula(), Term::var("p", Sort::Bool));
    }
}
