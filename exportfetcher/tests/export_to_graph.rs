use std::path::Path;
use std::sync::Arc;

use exportfetcher::{transform, FieldMap, GraphGenerator, SourceSystem};
use kgstore::{GraphLoader, MemoryGraphStore};
use serde_json::{json, Value};

const HEADER: &str = "_airbyte_ab_id,_airbyte_emitted_at,_airbyte_data";

fn csv_row(id: &str, payload: &Value) -> String {
    let quoted = payload.to_string().replace('"', "\"\"");
    format!("{id},1714557600,\"{quoted}\"")
}

fn write_export(path: &Path, payloads: &[Value]) -> anyhow::Result<()> {
    let mut lines = vec![HEADER.to_string()];
    for (idx, payload) in payloads.iter().enumerate() {
        lines.push(csv_row(&format!("ab-{idx}"), payload));
    }
    std::fs::write(path, lines.join("\n") + "\n")?;
    Ok(())
}

fn read_jsonl(path: &Path) -> anyhow::Result<Vec<Value>> {
    std::fs::read_to_string(path)?
        .lines()
        .map(|line| Ok(serde_json::from_str(line)?))
        .collect()
}

#[tokio::test]
async fn single_issue_flows_from_csv_to_graph() -> anyhow::Result<()> {
    let _ = env_logger::builder().is_test(true).try_init();
    let dir = tempfile::tempdir()?;
    let source = dir.path().join("2024_05_01_0.csv");
    write_export(
        &source,
        &[json!({
            "id": "10001",
            "key": "ENG-1",
            "fields": {
                "summary": "Fix login",
                "assignee": {"accountId": "U1"},
                "creator": {"accountId": "U1"},
                "issuetype": {"name": "Bug"},
                "status": {"statusCategory": {"name": "In Progress"}}
            }
        })],
    )?;

    let transformed = dir.path().join("transformed/jira");
    let report = transform(
        &FieldMap::builtin(),
        &source,
        &transformed.join("issues.jsonl"),
        "jira/issues",
    )?;
    assert_eq!(report.rows, 1);
    let records = read_jsonl(&transformed.join("issues.jsonl"))?;
    assert_eq!(records[0]["assignee_id"], "U1");
    assert_eq!(records[0]["creator_id"], "U1");

    let graph_output = dir.path().join("graph_output");
    let generated = GraphGenerator::new(SourceSystem::Jira).generate(&transformed, &graph_output)?;
    assert_eq!(generated.nodes, 1);
    assert_eq!(generated.relationships, 3);
    assert_eq!(generated.files, vec![graph_output.join("issues_data.jsonl")]);
    assert_eq!(generated.skipped_entities.len(), 6);

    let events = read_jsonl(&graph_output.join("issues_data.jsonl"))?;
    let kinds: Vec<_> = events
        .iter()
        .map(|e| e["relationship"].as_str().unwrap_or("node").to_string())
        .collect();
    assert_eq!(kinds, vec!["node", "creates", "works_on", "worked_on_by"]);

    let store = Arc::new(MemoryGraphStore::new());
    let loaded = GraphLoader::new(store.clone()).load(&graph_output).await?;
    assert_eq!(loaded.nodes, 1);
    assert_eq!(loaded.relationships, 3);
    assert_eq!(store.node_count("jira_issue")?, 1);
    assert_eq!(store.node_count("atlassian_user")?, 1);
    assert_eq!(store.relationships()?.len(), 3);
    Ok(())
}

#[tokio::test]
async fn unassigned_issue_gets_no_assignment_edges() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let source = dir.path().join("issues.csv");
    write_export(
        &source,
        &[json!({"id": "10002", "fields": {"assignee": null, "creator": {"accountId": "U2"}}})],
    )?;
    let transformed = dir.path().join("transformed/jira");
    transform(
        &FieldMap::builtin(),
        &source,
        &transformed.join("issues.jsonl"),
        "jira/issues",
    )?;
    let graph_output = dir.path().join("graph_output");
    let generated = GraphGenerator::new(SourceSystem::Jira).generate(&transformed, &graph_output)?;
    assert_eq!(generated.relationships, 1);

    let store = Arc::new(MemoryGraphStore::new());
    GraphLoader::new(store.clone()).load(&graph_output).await?;
    let edges = store.relationships()?;
    assert_eq!(edges.len(), 1);
    assert_eq!(edges[0].relationship, "creates");
    Ok(())
}

#[test]
fn slack_export_generates_all_present_entities() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let transformed = dir.path().join("transformed/slack");
    let map = FieldMap::builtin();

    let users = dir.path().join("users.csv");
    write_export(
        &users,
        &[json!({"id": "U1", "team_id": "T1", "real_name": "Grace Hopper", "profile": {"first_name": "Grace"}})],
    )?;
    transform(&map, &users, &transformed.join("users.jsonl"), "slack/users")?;

    let messages = dir.path().join("messages.csv");
    write_export(
        &messages,
        &[
            json!({"client_msg_id": "m-1", "user": "U1", "text": "hello", "channel_id": "C1", "ts": "1714557600.0001"}),
            json!({"client_msg_id": "m-2", "user": "U1", "text": "again", "channel_id": "C1", "ts": "1714557601.0001"}),
        ],
    )?;
    transform(
        &map,
        &messages,
        &transformed.join("channel_messages.jsonl"),
        "slack/channel_messages",
    )?;

    let graph_output = dir.path().join("graph_output");
    let report = GraphGenerator::new(SourceSystem::Slack).generate(&transformed, &graph_output)?;
    assert_eq!(report.files.len(), 2);
    assert_eq!(report.skipped_entities, vec!["channels".to_string()]);
    assert_eq!(report.nodes, 3);
    assert_eq!(report.relationships, 4);

    let user_events = read_jsonl(&graph_output.join("users_data.jsonl"))?;
    assert_eq!(user_events[0]["properties"]["name"], "Grace Hopper");
    assert_eq!(user_events[0]["properties"]["last_name"], Value::Null);
    Ok(())
}

#[test]
fn events_stream_reads_one_entity_file() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let input = dir.path().join("projects.jsonl");
    std::fs::write(
        &input,
        "{\"id\":\"P1\",\"assignee_id\":\"U1\"}\n{\"id\":\"P2\",\"assignee_id\":null}\n",
    )?;
    let events = GraphGenerator::new(SourceSystem::Jira)
        .events(&input)?
        .collect::<exportfetcher::Result<Vec<_>>>()?;
    assert_eq!(events.len(), 3);

    let unknown = dir.path().join("worklogs.jsonl");
    std::fs::write(&unknown, "")?;
    assert!(GraphGenerator::new(SourceSystem::Jira).events(&unknown).is_err());
    Ok(())
}
