use std::collections::BTreeMap;
use std::path::Path;

use kgstore::Properties;
use serde_json::{Map, Value};

use crate::error::{FetcherError, Result};

/// How one output field is pulled out of a decoded export row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Accessor {
    /// RFC 6901 JSON Pointer, e.g. `/fields/assignee/accountId`.
    Pointer(String),
    /// Flattens the Atlassian document found at the pointer into text.
    DocumentText(String),
}

impl Accessor {
    pub fn pointer(path: &str) -> Self {
        Accessor::Pointer(path.to_string())
    }

    pub fn document_text(path: &str) -> Self {
        Accessor::DocumentText(path.to_string())
    }

    fn path(&self) -> &str {
        match self {
            Accessor::Pointer(path) | Accessor::DocumentText(path) => path,
        }
    }

    /// Missing paths and unexpected shapes evaluate to `null`.
    pub fn evaluate(&self, raw: &Value) -> Value {
        match self {
            Accessor::Pointer(path) => raw.pointer(path).cloned().unwrap_or(Value::Null),
            Accessor::DocumentText(path) => raw
                .pointer(path)
                .and_then(document_text)
                .map(Value::String)
                .unwrap_or(Value::Null),
        }
    }

    fn from_json(source: &str, field: &str, value: &Value) -> Result<Self> {
        let accessor = match value {
            Value::String(path) => Accessor::Pointer(path.clone()),
            Value::Object(spec) => match spec.get("document_text").and_then(Value::as_str) {
                Some(path) => Accessor::DocumentText(path.to_string()),
                None => {
                    return Err(FetcherError::InvalidFieldMap(format!(
                        "{source}.{field}: expected {{\"document_text\": <pointer>}}"
                    )))
                }
            },
            other => {
                return Err(FetcherError::InvalidFieldMap(format!(
                    "{source}.{field}: unsupported accessor {other}"
                )))
            }
        };
        let path = accessor.path();
        if !path.is_empty() && !path.starts_with('/') {
            return Err(FetcherError::InvalidFieldMap(format!(
                "{source}.{field}: '{path}' is not a JSON pointer"
            )));
        }
        Ok(accessor)
    }
}

/// Paragraph texts joined with `", "`, paragraphs joined with `","`.
fn document_text(doc: &Value) -> Option<String> {
    let doc = doc.as_object()?;
    let Some(blocks) = doc.get("content") else {
        return Some(String::new());
    };
    let paragraphs = blocks
        .as_array()?
        .iter()
        .map(|block| {
            let texts = block
                .get("content")?
                .as_array()?
                .iter()
                .map(|inline| inline.get("text")?.as_str())
                .collect::<Option<Vec<_>>>()?;
            Some(texts.join(", "))
        })
        .collect::<Option<Vec<_>>>()?;
    Some(paragraphs.join(","))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: String,
    pub accessor: Accessor,
}

/// Source key (`jira/issues`) to the ordered output fields of its records.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldMap {
    sources: BTreeMap<String, Vec<FieldSpec>>,
}

impl FieldMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_source<'a>(
        &mut self,
        source_key: &str,
        fields: impl IntoIterator<Item = (&'a str, Accessor)>,
    ) {
        let fields = fields
            .into_iter()
            .map(|(name, accessor)| FieldSpec {
                name: name.to_string(),
                accessor,
            })
            .collect();
        self.sources.insert(source_key.to_string(), fields);
    }

    /// Field map for the Jira, Confluence and Slack export streams.
    pub fn builtin() -> Self {
        use Accessor as A;
        let p = A::pointer;

        let mut map = Self::new();
        map.insert_source(
            "confluence/space",
            [("id", p("/id")), ("key", p("/key")), ("name", p("/name")), ("type", p("/type"))],
        );
        map.insert_source(
            "confluence/pages",
            [
                ("id", p("/id")),
                ("type", p("/type")),
                ("title", p("/title")),
                ("author_id", p("/history/createdBy/accountId")),
                ("author_name", p("/history/createdBy/displayName")),
                ("created", p("/history/createdDate")),
            ],
        );
        map.insert_source(
            "jira/users",
            [
                ("id", p("/accountId")),
                ("email", p("/emailAddress")),
                ("display_name", p("/displayName")),
            ],
        );
        map.insert_source(
            "jira/projects",
            [
                ("id", p("/id")),
                ("project_key", p("/key")),
                ("title", p("/name")),
                ("description", p("/description")),
                ("assignee_id", p("/lead/accountId")),
            ],
        );
        map.insert_source("jira/boards", [("id", p("/id")), ("project_id", p("/projectId"))]);
        map.insert_source(
            "jira/sprints",
            [
                ("id", p("/id")),
                ("name", p("/name")),
                ("start_date", p("/startDate")),
                ("end_date", p("/endDate")),
                ("board_id", p("/boardId")),
                ("state", p("/state")),
            ],
        );
        map.insert_source(
            "jira/issues",
            [
                ("assignee_id", p("/fields/assignee/accountId")),
                ("created", p("/fields/created")),
                ("creator_id", p("/fields/creator/accountId")),
                ("description", p("/fields/issuetype/description")),
                ("id", p("/id")),
                ("issue_type", p("/fields/issuetype/name")),
                ("key", p("/key")),
                ("parent_key", p("/fields/parent/key")),
                ("project_id", p("/fields/project/id")),
                ("status", p("/fields/status/statusCategory/name")),
                ("title", p("/fields/summary")),
                ("updated", p("/fields/updated")),
            ],
        );
        map.insert_source(
            "jira/issue_comments",
            [
                ("id", p("/id")),
                ("author_id", p("/author/accountId")),
                ("text", A::document_text("/body")),
                ("issue_id", p("/issueId")),
                ("created", p("/created")),
            ],
        );
        map.insert_source(
            "jira/sprint_issues",
            [("sprint_id", p("/sprintId")), ("issue_id", p("/issueId"))],
        );
        map.insert_source(
            "slack/channels",
            [
                ("id", p("/id")),
                ("name", p("/name")),
                ("creator", p("/creator")),
                ("purpose_value", p("/purpose/value")),
                ("is_private", p("/is_private")),
                ("num_members", p("/num_members")),
                ("created", p("/created")),
            ],
        );
        map.insert_source(
            "slack/channel_messages",
            [
                ("id", p("/client_msg_id")),
                ("user", p("/user")),
                ("text", p("/text")),
                ("team", p("/team")),
                ("channel_id", p("/channel_id")),
                ("created", p("/ts")),
            ],
        );
        map.insert_source(
            "slack/users",
            [
                ("id", p("/id")),
                ("team_id", p("/team_id")),
                ("name", p("/real_name")),
                ("first_name", p("/profile/first_name")),
                ("last_name", p("/profile/last_name")),
                ("title", p("/profile/title")),
                ("email", p("/profile/email")),
                ("is_admin", p("/is_admin")),
            ],
        );
        map
    }

    /// Parses `{"jira/issues": {"id": "/id", "text": {"document_text": "/body"}}}`.
    pub fn from_json(value: &Value) -> Result<Self> {
        let sources = value.as_object().ok_or_else(|| {
            FetcherError::InvalidFieldMap("top level must be an object of source keys".into())
        })?;
        let mut map = Self::new();
        for (source, fields) in sources {
            let fields: &Map<String, Value> = fields.as_object().ok_or_else(|| {
                FetcherError::InvalidFieldMap(format!("{source}: fields must be an object"))
            })?;
            let specs = fields
                .iter()
                .map(|(name, accessor)| {
                    Accessor::from_json(source, name, accessor).map(|a| (name.as_str(), a))
                })
                .collect::<Result<Vec<_>>>()?;
            map.insert_source(source, specs);
        }
        Ok(map)
    }

    pub fn from_json_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json(&serde_json::from_str(&raw)?)
    }

    /// Replaces this map's entries with every source key defined in `overrides`.
    pub fn with_overrides(mut self, overrides: FieldMap) -> Self {
        self.sources.extend(overrides.sources);
        self
    }

    pub fn can_map(&self, source_key: &str) -> bool {
        self.sources.contains_key(source_key)
    }

    pub fn source_keys(&self) -> impl Iterator<Item = &str> {
        self.sources.keys().map(String::as_str)
    }

    pub fn fields(&self, source_key: &str) -> Option<&[FieldSpec]> {
        self.sources.get(source_key).map(Vec::as_slice)
    }

    /// Builds the flat record for one decoded row: every declared field, in order.
    pub fn map_row(&self, raw: &Value, source_key: &str) -> Result<Properties> {
        let fields = self
            .fields(source_key)
            .ok_or_else(|| FetcherError::UnknownSourceKey(source_key.to_string()))?;
        Ok(fields
            .iter()
            .map(|field| (field.name.clone(), field.accessor.evaluate(raw)))
            .collect())
    }
}
