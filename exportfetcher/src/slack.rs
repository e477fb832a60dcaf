//! Graph shape of the Slack export: users, channels and channel messages.

use crate::generator::{EdgeRule, EntityRules, KeySource};

const USER: &str = "slack_user";
const CHANNEL: &str = "slack_channel";
const MESSAGE: &str = "slack_message";

pub const ENTITIES: &[EntityRules] = &[
    EntityRules {
        entity: "users",
        label: Some(USER),
        edges: &[],
    },
    EntityRules {
        entity: "channels",
        label: Some(CHANNEL),
        edges: &[EdgeRule {
            start_label: USER,
            start: KeySource::Field("creator"),
            relationship: "creates",
            end_label: CHANNEL,
            end: KeySource::Own,
        }],
    },
    EntityRules {
        entity: "channel_messages",
        label: Some(MESSAGE),
        edges: &[
            EdgeRule {
                start_label: USER,
                start: KeySource::Field("user"),
                relationship: "creates",
                end_label: MESSAGE,
                end: KeySource::Own,
            },
            EdgeRule {
                start_label: CHANNEL,
                start: KeySource::Field("channel_id"),
                relationship: "contains",
                end_label: MESSAGE,
                end: KeySource::Own,
            },
        ],
    },
];

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn message_is_created_by_user_and_contained_in_channel() {
        let row = json!({"id": "m-1", "user": "U1", "text": "hi", "channel_id": "C1"});
        let events = ENTITIES[2].events_for(row.as_object().cloned().unwrap());
        assert_eq!(events.len(), 3);
    }

    #[test]
    fn bot_message_without_client_id_has_no_edges() {
        let row = json!({"id": null, "user": "B1", "text": "deploy done", "channel_id": "C1"});
        let events = ENTITIES[2].events_for(row.as_object().cloned().unwrap());
        assert_eq!(events.len(), 1);
    }
}
