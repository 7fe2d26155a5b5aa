use crate::topology::Node;

/// Node types whose interface can take a low-level capture
pub const CAPTURE_ALLOWED_TYPES: [&str; 6] =
    ["device", "ovsbridge", "internal", "veth", "tun", "bridge"];

/// Whether `node` may receive a packet capture, based on its `Type` metadata
pub fn is_capture_allowed(node: &Node) -> bool {
    node.node_type()
        .is_some_and(|t| CAPTURE_ALLOWED_TYPES.contains(&t))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::TYPE_KEY;
    use proptest::prelude::*;

    fn typed(node_type: &str) -> Node {
        Node::new("n1").with(TYPE_KEY, node_type)
    }

    #[test]
    fn test_allowed_types() {
        for t in CAPTURE_ALLOWED_TYPES {
            assert!(is_capture_allowed(&typed(t)), "{} should be allowed", t);
        }
    }

    #[test]
    fn test_rejected_types() {
        assert!(!is_capture_allowed(&Node::new("untyped")));
        assert!(!is_capture_allowed(&typed("")));
        assert!(!is_capture_allowed(&typed("netns")));
        assert!(!is_capture_allowed(&typed("Device")));
        assert!(!is_capture_allowed(&typed("device ")));
    }

    proptest! {
        #[test]
        fn prop_allowed_iff_in_list(node_type in "[a-z]{0,10}") {
            let expected = CAPTURE_ALLOWED_TYPES.contains(&node_type.as_str());
            prop_assert_eq!(is_capture_allowed(&typed(&node_type)), expected);
        }

        #[test]
        fn prop_allowed_types_survive_other_metadata(
            idx in 0usize..CAPTURE_ALLOWED_TYPES.len(),
            name in "[a-z0-9]{1,8}",
        ) {
            let node = typed(CAPTURE_ALLOWED_TYPES[idx]).with("Name", name);
            prop_assert!(is_capture_allowed(&node));
        }
    }
}
