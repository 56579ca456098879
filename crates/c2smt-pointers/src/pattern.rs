//! Pointer target patterns
//!
//! A pattern is a partially specified [`PointerTarget`]. Unset components
//! match anything, so patterns form a lattice from "any target" over
//! "all targets in one base" and "semi-exact" (container and offsets known,
//! base unknown) to exact patterns that denote a single target.

use crate::target::PointerTarget;
use c2smt_types::CType;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Predicate over pointer targets
pub trait TargetMatcher {
    fn matches(&self, target: &PointerTarget) -> bool;
}

/// A partially specified pointer target
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PointerTargetPattern {
    base: Option<String>,
    container_type: Option<CType>,
    proper_offset: Option<u64>,
    container_offset: Option<u64>,
}

impl PointerTargetPattern {
    /// Matches every target
    pub fn any() -> Self {
        Self::default()
    }

    /// Matches every target inside `base`
    pub fn for_base(base: impl Into<String>) -> Self {
        Self {
            base: Some(base.into()),
            ..Self::default()
        }
    }

    /// Start of a pattern for an lvalue that is the base object itself
    pub fn for_base_object(base: impl Into<String>) -> PointerTargetPatternBuilder {
        PointerTargetPatternBuilder {
            pattern: Self {
                base: Some(base.into()),
                container_type: None,
                proper_offset: Some(0),
                container_offset: Some(0),
            },
        }
    }

    /// Byte range `[start, start + size)` of `base`; not refinable further
    pub fn for_range(base: impl Into<String>, start: u64, size: u64) -> RangePattern {
        RangePattern {
            base: base.into(),
            start,
            end: start.saturating_add(size),
        }
    }

    /// Exact pattern denoting `target`
    pub fn for_target(target: &PointerTarget) -> Self {
        Self {
            base: Some(target.base.clone()),
            container_type: target.container_type.clone(),
            proper_offset: Some(target.proper_offset),
            container_offset: Some(target.container_offset),
        }
    }

    pub fn base(&self) -> Option<&str> {
        self.base.as_deref()
    }

    pub fn container_type(&self) -> Option<&CType> {
        self.container_type.as_ref()
    }

    pub fn proper_offset(&self) -> Option<u64> {
        self.proper_offset
    }

    pub fn container_offset(&self) -> Option<u64> {
        self.container_offset
    }

    /// Base and both offsets are known
    pub fn is_exact(&self) -> bool {
        self.base.is_some() && self.proper_offset.is_some() && self.container_offset.is_some()
    }

    /// Container and proper offset are known, the base may not be
    pub fn is_semi_exact(&self) -> bool {
        self.container_type.is_some() && self.proper_offset.is_some()
    }

    /// Offset within the base, when known
    pub fn offset(&self) -> Option<u64> {
        Some(self.container_offset? + self.proper_offset?)
    }

    /// The unique target of an exact pattern
    pub fn as_pointer_target(&self) -> Option<PointerTarget> {
        if !self.is_exact() {
            return None;
        }
        Some(PointerTarget::new(
            self.base.clone()?,
            self.container_type.clone(),
            self.proper_offset?,
            self.container_offset?,
        ))
    }

    pub fn builder(self) -> PointerTargetPatternBuilder {
        PointerTargetPatternBuilder { pattern: self }
    }
}

fn container_types_match(pattern: &CType, target: Option<&CType>) -> bool {
    let Some(target) = target else {
        return false;
    };
    if pattern == target {
        return true;
    }
    // arrays of the same element type are interchangeable containers
    match (pattern, target) {
        (CType::Array(a, _), CType::Array(b, _)) => a == b,
        _ => false,
    }
}

impl TargetMatcher for PointerTargetPattern {
    fn matches(&self, target: &PointerTarget) -> bool {
        if let Some(base) = &self.base {
            if base != &target.base {
                return false;
            }
        }
        if let Some(offset) = self.container_offset {
            if offset != target.container_offset {
                return false;
            }
        }
        if let Some(offset) = self.proper_offset {
            if offset != target.proper_offset {
                return false;
            }
        }
        match &self.container_type {
            Some(ty) => container_types_match(ty, target.container_type.as_ref()),
            None => true,
        }
    }
}

impl fmt::Display for PointerTargetPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn opt<T: fmt::Display>(v: &Option<T>) -> String {
            v.as_ref().map_or_else(|| "_".to_string(), |v| v.to_string())
        }
        write!(
            f,
            "({} + {}: {} + {})",
            opt(&self.base),
            opt(&self.container_offset),
            opt(&self.container_type),
            opt(&self.proper_offset)
        )
    }
}

/// All targets of one base whose offset lies in `[start, end)`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RangePattern {
    base: String,
    start: u64,
    end: u64,
}

impl RangePattern {
    pub fn base(&self) -> &str {
        &self.base
    }
}

impl TargetMatcher for RangePattern {
    fn matches(&self, target: &PointerTarget) -> bool {
        target.base == self.base && (self.start..self.end).contains(&target.offset())
    }
}

/// Incremental narrowing of a pattern while descending into an lvalue
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PointerTargetPatternBuilder {
    pattern: PointerTargetPattern,
}

impl PointerTargetPatternBuilder {
    pub fn any() -> Self {
        Self::default()
    }

    /// Descend into a container of type `container_type`. The current
    /// location becomes the container; the proper offset is unknown.
    pub fn shift(&mut self, container_type: CType) -> &mut Self {
        let p = &mut self.pattern;
        p.container_offset = match (p.container_offset, p.proper_offset) {
            (Some(c), Some(o)) => Some(c + o),
            _ => None,
        };
        p.container_type = Some(container_type);
        p.proper_offset = None;
        self
    }

    /// Descend into a container at a known offset
    pub fn shift_container(&mut self, container_type: CType, proper_offset: u64) -> &mut Self {
        self.shift(container_type);
        self.pattern.proper_offset = Some(proper_offset);
        self
    }

    pub fn set_proper_offset(&mut self, proper_offset: u64) -> &mut Self {
        self.pattern.proper_offset = Some(proper_offset);
        self
    }

    /// Forget everything but the base
    pub fn retain_base(&mut self) -> &mut Self {
        let base = self.pattern.base.take();
        self.pattern = PointerTargetPattern {
            base,
            ..PointerTargetPattern::default()
        };
        self
    }

    /// Forget everything
    pub fn clear(&mut self) -> &mut Self {
        self.pattern = PointerTargetPattern::default();
        self
    }

    pub fn is_exact(&self) -> bool {
        self.pattern.is_exact()
    }

    pub fn build(&self) -> PointerTargetPattern {
        self.pattern.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use c2smt_types::StructField;

    fn s_type() -> CType {
        CType::structure(
            "S",
            vec![
                StructField::new("f", CType::int()),
                StructField::new("g", CType::int()),
            ],
        )
    }

    #[test]
    fn test_field_descent_is_exact() {
        let mut b = PointerTargetPattern::for_base_object("s");
        b.shift_container(s_type(), 4);
        let p = b.build();
        assert!(p.is_exact());
        let target = PointerTarget::new("s", Some(s_type()), 4, 0);
        assert!(p.matches(&target));
        assert_eq!(p.as_pointer_target(), Some(target));
        assert!(!p.matches(&PointerTarget::new("s", Some(s_type()), 0, 0)));
    }

    #[test]
    fn test_unknown_index_loses_proper_offset() {
        let arr = CType::array(CType::int(), 4);
        let mut b = PointerTargetPattern::for_base_object("a");
        b.shift(arr.clone());
        let p = b.build();
        assert!(!p.is_exact());
        for i in 0..4 {
            assert!(p.matches(&PointerTarget::new("a", Some(arr.clone()), i * 4, 0)));
        }
        assert!(!p.matches(&PointerTarget::new("b", Some(arr), 0, 0)));
    }

    #[test]
    fn test_semi_exact_through_pointer() {
        let mut b = PointerTargetPatternBuilder::any();
        b.shift_container(s_type(), 4);
        let p = b.build();
        assert!(p.is_semi_exact());
        assert!(!p.is_exact());
        assert!(p.matches(&PointerTarget::new("x", Some(s_type()), 4, 0)));
        assert!(p.matches(&PointerTarget::new("y", Some(s_type()), 4, 0)));
        // container offset unknown
        assert!(p.matches(&PointerTarget::new("y", Some(s_type()), 4, 32)));
    }

    #[test]
    fn test_array_containers_are_loosened() {
        let p = PointerTargetPattern::for_target(&PointerTarget::new(
            "a",
            Some(CType::array(CType::int(), 4)),
            8,
            0,
        ));
        assert!(p.matches(&PointerTarget::new(
            "a",
            Some(CType::array(CType::int(), 10)),
            8,
            0
        )));
        assert!(!p.matches(&PointerTarget::new(
            "a",
            Some(CType::array(CType::uint(), 4)),
            8,
            0
        )));
    }

    #[test]
    fn test_retain_base_and_clear() {
        let mut b = PointerTargetPattern::for_base_object("s");
        b.shift_container(s_type(), 4);
        b.retain_base();
        assert_eq!(b.build(), PointerTargetPattern::for_base("s"));
        b.clear();
        assert_eq!(b.build(), PointerTargetPattern::any());
    }

    #[test]
    fn test_range() {
        let r = PointerTargetPattern::for_range("a", 4, 8);
        assert!(!r.matches(&PointerTarget::new("a", None, 3, 0)));
        assert!(r.matches(&PointerTarget::new("a", None, 0, 4)));
        assert!(r.matches(&PointerTarget::new("a", Some(CType::int()), 3, 8)));
        assert!(!r.matches(&PointerTarget::new("a", None, 12, 0)));
        assert!(!r.matches(&PointerTarget::new("b", None, 4, 0)));
    }
}
