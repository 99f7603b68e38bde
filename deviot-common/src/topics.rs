//! Publish/subscribe topic naming.
//!
//! Every gateway owns two topics, `/deviot/<owner>/<name>/data` for outbound
//! device state and `/deviot/<owner>/<name>/action` for inbound invocations.

use serde::{Deserialize, Serialize};

/// Leading namespace segment of every gateway topic.
pub const NAMESPACE: &str = "deviot";

/// Placeholder segment used when the gateway has no owner.
const EMPTY_OWNER: &str = "_";

/// Characters that would split a segment or act as a wildcard.
const RESERVED: [char; 4] = ['/', '@', '+', '#'];

/// Topic pair derived from a gateway's owner and name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Topics {
    pub data: String,
    pub action: String,
}

impl Topics {
    /// Derive the topic pair. Deterministic in `(owner, name)`.
    pub fn derive(owner: &str, name: &str) -> Self {
        let owner = if owner.is_empty() {
            EMPTY_OWNER.to_string()
        } else {
            normalize_segment(owner)
        };
        let name = normalize_segment(name);

        Self {
            data: format!("/{}/{}/{}/data", NAMESPACE, owner, name),
            action: format!("/{}/{}/{}/action", NAMESPACE, owner, name),
        }
    }
}

/// Replace delimiter and wildcard characters with `_`.
pub fn normalize_segment(segment: &str) -> String {
    segment
        .chars()
        .map(|c| if RESERVED.contains(&c) { '_' } else { c })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derive_with_owner() {
        let topics = Topics::derive("alice@example.com", "home/hub");
        assert_eq!(topics.data, "/deviot/alice_example.com/home_hub/data");
        assert_eq!(topics.action, "/deviot/alice_example.com/home_hub/action");
    }

    #[test]
    fn test_empty_owner_maps_to_placeholder() {
        let topics = Topics::derive("", "hub");
        assert_eq!(topics.data, "/deviot/_/hub/data");
        assert_eq!(topics.action, "/deviot/_/hub/action");
    }

    #[test]
    fn test_wildcards_are_normalized() {
        assert_eq!(normalize_segment("a+b#c"), "a_b_c");
        assert_eq!(normalize_segment("plain-name_1"), "plain-name_1");
    }
}
