//! Per-value propagation state.

use crate::annotation::{AnnotationMetadata, MdInfo};
use crate::core::IrType;
use std::collections::BTreeSet;

/// Distance of a value no root has reached yet.
pub const INFINITE_DISTANCE: u32 = u32::MAX;

/// Propagation record of one value within one scope.
///
/// `distance == 0` exactly when `is_root` holds.
#[derive(Debug, Clone, PartialEq)]
pub struct ValueInfo<V: Ord> {
    pub is_root: bool,
    pub is_backtracking_node: bool,
    /// Roots this value's metadata derives from.
    pub root_set: BTreeSet<V>,
    /// Hops along the propagation path that produced `metadata`.
    pub distance: u32,
    pub metadata: Option<MdInfo>,
    pub target: Option<String>,
}

impl<V: Ord> Default for ValueInfo<V> {
    fn default() -> Self {
        Self {
            is_root: false,
            is_backtracking_node: false,
            root_set: BTreeSet::new(),
            distance: INFINITE_DISTANCE,
            metadata: None,
            target: None,
        }
    }
}

impl<V: Ord + Copy> ValueInfo<V> {
    /// Root record for an annotated value stored as `storage`.
    pub fn for_root(value: V, ann: &AnnotationMetadata, storage: &IrType) -> Self {
        Self {
            is_root: true,
            is_backtracking_node: ann.backtracking_enabled,
            root_set: BTreeSet::from([value]),
            distance: 0,
            metadata: Some(MdInfo::from_annotation(ann, storage)),
            target: ann.target.clone(),
        }
    }

    /// Deep copy of this record as a fresh root for `value`.
    ///
    /// Used when a specialized function's parameters start a new scope: the
    /// caller-side distance is discarded.
    pub fn rerooted(&self, value: V) -> Self {
        Self {
            is_root: true,
            is_backtracking_node: self.is_backtracking_node,
            root_set: BTreeSet::from([value]),
            distance: 0,
            metadata: self.metadata.clone(),
            target: self.target.clone(),
        }
    }

    /// Stop treating this value as an independent root; it now sits one hop
    /// below the producer that replaced it.
    pub fn demote_root(&mut self) {
        if self.is_root {
            self.is_root = false;
            self.distance = self.distance.max(1);
        }
    }

    /// Make this value a root keeping whatever metadata it already has.
    pub fn promote_to_root(&mut self) {
        self.is_root = true;
        self.distance = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotation::AnnotationParser;

    #[test]
    fn test_root_and_demotion() {
        let ann = AnnotationParser::parse("no_float range 0 1").unwrap();
        let mut info = ValueInfo::for_root(7u32, &ann, &IrType::ptr_to(IrType::Float));
        assert!(info.is_root);
        assert!(info.is_backtracking_node);
        assert_eq!(info.distance, 0);
        assert_eq!(info.root_set, BTreeSet::from([7]));

        info.demote_root();
        assert!(!info.is_root);
        assert_eq!(info.distance, 1);
    }

    #[test]
    fn test_reroot_discards_distance() {
        let info = ValueInfo::<u32> {
            distance: 5,
            target: Some("t".to_string()),
            ..Default::default()
        };
        let rooted = info.rerooted(3);
        assert!(rooted.is_root);
        assert_eq!(rooted.distance, 0);
        assert_eq!(rooted.target.as_deref(), Some("t"));
        assert_eq!(rooted.root_set, BTreeSet::from([3]));
    }
}
