//! Graph shape of the Confluence export: spaces and pages.

use crate::generator::{EdgeRule, EntityRules, KeySource};

const SPACE: &str = "confluence_space";
const PAGE: &str = "confluence_page";

pub const ENTITIES: &[EntityRules] = &[
    EntityRules {
        entity: "space",
        label: Some(SPACE),
        edges: &[],
    },
    EntityRules {
        entity: "pages",
        label: Some(PAGE),
        edges: &[
            EdgeRule {
                start_label: "atlassian_user",
                start: KeySource::Field("author_id"),
                relationship: "creates",
                end_label: PAGE,
                end: KeySource::Own,
            },
            EdgeRule {
                start_label: PAGE,
                start: KeySource::Field("parent_id"),
                relationship: "contains",
                end_label: PAGE,
                end: KeySource::Own,
            },
            EdgeRule {
                start_label: SPACE,
                start: KeySource::Field("space_id"),
                relationship: "contains",
                end_label: PAGE,
                end: KeySource::Own,
            },
            EdgeRule {
                start_label: PAGE,
                start: KeySource::Own,
                relationship: "discusses",
                end_label: "jira_issue",
                end: KeySource::EachOf("jira_issues"),
            },
        ],
    },
];

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn page_links_author_parent_space_and_issues() {
        let row = json!({
            "id": "P2",
            "author_id": "U1",
            "parent_id": "P1",
            "space_id": "S1",
            "jira_issues": ["10001", "10002"]
        });
        let events = ENTITIES[1].events_for(row.as_object().cloned().unwrap());
        assert_eq!(events.len(), 6);
        assert!(events[0].is_node());
    }

    #[test]
    fn page_without_optional_links_only_credits_author() {
        let row = json!({"id": "P1", "title": "Runbook", "author_id": "U1"});
        let events = ENTITIES[1].events_for(row.as_object().cloned().unwrap());
        assert_eq!(events.len(), 2);
    }
}
