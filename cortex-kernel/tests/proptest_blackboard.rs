//! Property tests for the blackboard's dot-path semantics.

use cortex_kernel::Blackboard;
use proptest::prelude::*;

proptest! {
    #[test]
    fn set_then_get_round_trips(
        segments in prop::collection::vec("[a-z]{1,8}", 1..5),
        value in any::<i64>(),
    ) {
        let bb = Blackboard::new();
        let path = segments.join(".");
        bb.set(&path, serde_json::json!(value), "prop");
        prop_assert_eq!(bb.get(&path), Some(serde_json::json!(value)));
        let source = bb.source_of(&path);
        prop_assert_eq!(source.as_deref(), Some("prop"));
    }

    #[test]
    fn absent_paths_read_as_none(
        segments in prop::collection::vec("[a-z]{1,8}", 1..5),
    ) {
        let bb = Blackboard::new();
        prop_assert_eq!(bb.get(&segments.join(".")), None);
    }

    #[test]
    fn last_write_wins_per_path(
        segments in prop::collection::vec("[a-z]{1,8}", 1..4),
        first in any::<i64>(),
        second in any::<i64>(),
    ) {
        let bb = Blackboard::new();
        let path = segments.join(".");
        bb.set(&path, serde_json::json!(first), "one");
        bb.set(&path, serde_json::json!(second), "two");
        prop_assert_eq!(bb.get(&path), Some(serde_json::json!(second)));
        let source = bb.source_of(&path);
        prop_assert_eq!(source.as_deref(), Some("two"));
    }
}
