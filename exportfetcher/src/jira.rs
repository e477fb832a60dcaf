//! Graph shape of the Jira export: users, projects, boards, sprints, issues
//! and their comments.

use crate::generator::{EdgeRule, EntityRules, KeySource};

const USER: &str = "atlassian_user";
const PROJECT: &str = "jira_project";
const BOARD: &str = "jira_board";
const SPRINT: &str = "jira_sprint";
const ISSUE: &str = "jira_issue";
const COMMENT: &str = "jira_comment";

pub const ENTITIES: &[EntityRules] = &[
    EntityRules {
        entity: "boards",
        label: Some(BOARD),
        edges: &[EdgeRule {
            start_label: PROJECT,
            start: KeySource::Field("project_id"),
            relationship: "contains",
            end_label: BOARD,
            end: KeySource::Own,
        }],
    },
    EntityRules {
        entity: "issues",
        label: Some(ISSUE),
        edges: &[
            EdgeRule {
                start_label: USER,
                start: KeySource::Field("creator_id"),
                relationship: "creates",
                end_label: ISSUE,
                end: KeySource::Own,
            },
            EdgeRule {
                start_label: USER,
                start: KeySource::Field("assignee_id"),
                relationship: "works_on",
                end_label: ISSUE,
                end: KeySource::Own,
            },
            EdgeRule {
                start_label: ISSUE,
                start: KeySource::Own,
                relationship: "worked_on_by",
                end_label: USER,
                end: KeySource::Field("assignee_id"),
            },
        ],
    },
    EntityRules {
        entity: "issue_comments",
        label: Some(COMMENT),
        edges: &[
            EdgeRule {
                start_label: USER,
                start: KeySource::Field("author_id"),
                relationship: "creates",
                end_label: COMMENT,
                end: KeySource::Own,
            },
            EdgeRule {
                start_label: ISSUE,
                start: KeySource::Field("issue_id"),
                relationship: "contains",
                end_label: COMMENT,
                end: KeySource::Own,
            },
        ],
    },
    EntityRules {
        entity: "projects",
        label: Some(PROJECT),
        edges: &[EdgeRule {
            start_label: USER,
            start: KeySource::Field("assignee_id"),
            relationship: "owns",
            end_label: PROJECT,
            end: KeySource::Own,
        }],
    },
    EntityRules {
        entity: "sprints",
        label: Some(SPRINT),
        edges: &[EdgeRule {
            start_label: BOARD,
            start: KeySource::Field("board_id"),
            relationship: "contains",
            end_label: SPRINT,
            end: KeySource::Own,
        }],
    },
    EntityRules {
        entity: "sprint_issues",
        label: None,
        edges: &[EdgeRule {
            start_label: SPRINT,
            start: KeySource::Field("sprint_id"),
            relationship: "contains",
            end_label: ISSUE,
            end: KeySource::Field("issue_id"),
        }],
    },
    EntityRules {
        entity: "users",
        label: Some(USER),
        edges: &[],
    },
];
