use std::collections::VecDeque;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Lines, Write};
use std::path::{Path, PathBuf};

use kgstore::models::NATURAL_KEY;
use kgstore::{GraphEvent, NodeRef, Properties};
use serde::Serialize;
use serde_json::Value;

use crate::error::{FetcherError, Result};
use crate::{confluence, jira, slack};

/// Where a relationship endpoint takes its `id` from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeySource {
    /// The row's own `id`.
    Own,
    /// A foreign-key field of the row.
    Field(&'static str),
    /// Every element of an array field, one relationship each.
    EachOf(&'static str),
}

/// Null and empty-string keys count as absent.
fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        _ => false,
    }
}

impl KeySource {
    fn values(self, row: &Properties) -> Vec<Value> {
        let value = match self {
            KeySource::Own => row.get(NATURAL_KEY),
            KeySource::Field(field) | KeySource::EachOf(field) => row.get(field),
        };
        match (self, value) {
            (_, None) => Vec::new(),
            (KeySource::EachOf(_), Some(Value::Array(items))) => {
                items.iter().filter(|v| !is_blank(v)).cloned().collect()
            }
            (_, Some(value)) if is_blank(value) => Vec::new(),
            (_, Some(value)) => vec![value.clone()],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EdgeRule {
    pub start_label: &'static str,
    pub start: KeySource,
    pub relationship: &'static str,
    pub end_label: &'static str,
    pub end: KeySource,
}

impl EdgeRule {
    /// Edges for one row; empty when either endpoint value is absent or null.
    fn events(&self, row: &Properties) -> Vec<GraphEvent> {
        let starts = self.start.values(row);
        let ends = self.end.values(row);
        let mut events = Vec::with_capacity(starts.len() * ends.len());
        for start in &starts {
            for end in &ends {
                events.push(GraphEvent::relationship(
                    NodeRef::by_id(self.start_label, start.clone()),
                    self.relationship,
                    NodeRef::by_id(self.end_label, end.clone()),
                ));
            }
        }
        events
    }
}

/// Graph shape of one exported entity type (`issues`, `channels`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntityRules {
    pub entity: &'static str,
    /// `None` for link tables that only produce relationships.
    pub label: Option<&'static str>,
    pub edges: &'static [EdgeRule],
}

impl EntityRules {
    pub fn input_file(&self, dir: &Path) -> PathBuf {
        dir.join(format!("{}.jsonl", self.entity))
    }

    pub fn output_file(&self, dir: &Path) -> PathBuf {
        dir.join(format!("{}_data.jsonl", self.entity))
    }

    /// Node event first, then its relationships in rule order.
    pub fn events_for(&self, row: Properties) -> Vec<GraphEvent> {
        let mut events: Vec<GraphEvent> = Vec::new();
        let edges: Vec<GraphEvent> = self.edges.iter().flat_map(|rule| rule.events(&row)).collect();
        if let Some(label) = self.label {
            events.push(GraphEvent::node(label, row));
        }
        events.extend(edges);
        events
    }
}

/// Lazy event stream over one entity's JSON-lines file.
pub struct EventStream<R> {
    lines: Lines<R>,
    rules: &'static EntityRules,
    pending: VecDeque<GraphEvent>,
    row: usize,
    failed: bool,
}

impl<R: BufRead> EventStream<R> {
    pub fn new(reader: R, rules: &'static EntityRules) -> Self {
        Self {
            lines: reader.lines(),
            rules,
            pending: VecDeque::new(),
            row: 0,
            failed: false,
        }
    }
}

impl<R: BufRead> Iterator for EventStream<R> {
    type Item = Result<GraphEvent>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return Some(Ok(event));
            }
            if self.failed {
                return None;
            }
            let line = match self.lines.next()? {
                Ok(line) => line,
                Err(err) => {
                    self.failed = true;
                    return Some(Err(err.into()));
                }
            };
            self.row += 1;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<Properties>(&line) {
                Ok(row) => self.pending.extend(self.rules.events_for(row)),
                Err(err) => {
                    self.failed = true;
                    return Some(Err(FetcherError::MalformedRow {
                        row: self.row,
                        reason: format!("record is not a JSON object: {err}"),
                    }));
                }
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GenerateReport {
    pub files: Vec<PathBuf>,
    pub nodes: usize,
    pub relationships: usize,
    pub skipped_entities: Vec<String>,
}

/// The export system a graph generator understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceSystem {
    Jira,
    Confluence,
    Slack,
}

impl SourceSystem {
    pub const ALL: [SourceSystem; 3] = [SourceSystem::Jira, SourceSystem::Slack, SourceSystem::Confluence];

    pub fn name(self) -> &'static str {
        match self {
            SourceSystem::Jira => "jira",
            SourceSystem::Confluence => "confluence",
            SourceSystem::Slack => "slack",
        }
    }

    /// First system whose name occurs in `key`, checked as jira, slack, confluence.
    pub fn detect(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|system| key.contains(system.name()))
    }

    pub fn entities(self) -> &'static [EntityRules] {
        match self {
            SourceSystem::Jira => jira::ENTITIES,
            SourceSystem::Confluence => confluence::ENTITIES,
            SourceSystem::Slack => slack::ENTITIES,
        }
    }
}

impl std::str::FromStr for SourceSystem {
    type Err = FetcherError;

    fn from_str(value: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|system| system.name().eq_ignore_ascii_case(value.trim()))
            .ok_or_else(|| FetcherError::UnknownSourceKey(value.to_string()))
    }
}

/// Turns per-entity record files into graph event files for one source system.
#[derive(Debug, Clone, Copy)]
pub struct GraphGenerator {
    system: SourceSystem,
}

impl GraphGenerator {
    pub fn new(system: SourceSystem) -> Self {
        Self { system }
    }

    pub fn system(&self) -> SourceSystem {
        self.system
    }

    pub fn rules(&self, entity: &str) -> Option<&'static EntityRules> {
        self.system.entities().iter().find(|rules| rules.entity == entity)
    }

    /// Event stream for a single `{entity}.jsonl` file; the entity is taken
    /// from the file stem.
    pub fn events(&self, input: &Path) -> Result<EventStream<BufReader<File>>> {
        let entity = input
            .file_stem()
            .and_then(|stem| stem.to_str())
            .unwrap_or_default();
        let rules = self.rules(entity).ok_or_else(|| {
            FetcherError::UnknownSourceKey(format!("{}/{}", self.system.name(), entity))
        })?;
        Ok(EventStream::new(BufReader::new(File::open(input)?), rules))
    }

    pub fn generate(&self, input_dir: &Path, output_dir: &Path) -> Result<GenerateReport> {
        std::fs::create_dir_all(output_dir)?;
        let mut report = GenerateReport::default();

        for rules in self.system.entities() {
            let input = rules.input_file(input_dir);
            if !input.exists() {
                log::warn!(
                    "Input file not found: {}, skipping {}",
                    input.display(),
                    rules.entity
                );
                report.skipped_entities.push(rules.entity.to_string());
                continue;
            }

            let output = rules.output_file(output_dir);
            let mut writer = BufWriter::new(File::create(&output)?);
            let stream = EventStream::new(BufReader::new(File::open(&input)?), rules);
            for event in stream {
                let event = event?;
                if event.is_node() {
                    report.nodes += 1;
                } else {
                    report.relationships += 1;
                }
                serde_json::to_writer(&mut writer, &event)?;
                writer.write_all(b"\n")?;
            }
            writer.flush()?;
            log::info!("Generated {}", output.display());
            report.files.push(output);
        }
        Ok(report)
    }
}
