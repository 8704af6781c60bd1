//! Global layout parameters for invalidation tracking.

use super::types::ContainerWidth;
use crate::model::SnapshotId;

/// Global parameters that determine every row's layout.
///
/// Used for invalidation: measurements, cached rows, and ledger deltas are only
/// meaningful under the key they were produced for. A change of snapshot or
/// container width invalidates all of them at once.
///
/// # Equality Semantics
/// Two LayoutKeys are equal if they would produce identical layouts.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LayoutKey {
    /// Collection snapshot.
    pub snapshot: SnapshotId,
    /// Container width in pixels.
    pub container_width: ContainerWidth,
}

impl LayoutKey {
    /// Create new layout key.
    pub fn new(snapshot: SnapshotId, container_width: ContainerWidth) -> Self {
        Self {
            snapshot,
            container_width,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(snapshot: &str, width: u32) -> LayoutKey {
        LayoutKey::new(
            SnapshotId::new(snapshot).unwrap(),
            ContainerWidth::new(width).unwrap(),
        )
    }

    #[test]
    fn test_equality_same_params() {
        assert_eq!(key("t1", 1000), key("t1", 1000));
    }

    #[test]
    fn test_inequality_different_width() {
        assert_ne!(key("t1", 1000), key("t1", 1200));
    }

    #[test]
    fn test_inequality_different_snapshot() {
        assert_ne!(key("t1", 1000), key("t2", 1000));
    }
}
