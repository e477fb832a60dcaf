use std::sync::Arc;

use kgstore::{
    EmbeddingMergePolicy, EmbeddingUpdater, GraphLoader, GraphStore, IndexedProperties, KgStore,
    MemoryGraphStore, NodeMergeMode, StorageError,
};
use serde_json::json;

mod common;

use common::{CountingEmbeddingProvider, FailingEmbeddingProvider, init_test_context, write_events};

const ISSUE_NODE: &str = r#"{"type":"node","label":"jira_issue","properties":{"id":"10001","key":"ENG-1","title":"Fix login","status":"To Do","assignee_id":"U1","parent_key":null}}"#;
const CREATES: &str = r#"{"type":"relationship","start_node":{"label":"atlassian_user","id":"U1"},"end_node":{"label":"jira_issue","id":"10001"},"relationship":"creates"}"#;
const WORKS_ON: &str = r#"{"type":"relationship","start_node":{"label":"atlassian_user","id":"U1"},"end_node":{"label":"jira_issue","id":"10001"},"relationship":"works_on"}"#;
const WORKED_ON_BY: &str = r#"{"type":"relationship","start_node":{"label":"jira_issue","id":"10001"},"end_node":{"label":"atlassian_user","id":"U1"},"relationship":"worked_on_by"}"#;

#[tokio::test]
async fn loading_issue_events_builds_node_edges_and_embedding() -> anyhow::Result<()> {
    let ctx = init_test_context(EmbeddingMergePolicy::Append)?;
    let events = ctx.temp_dir.path().join("graph_output");
    write_events(
        &events.join("issues_data.jsonl"),
        &[ISSUE_NODE, CREATES, WORKS_ON, WORKED_ON_BY],
    )?;

    let report = ctx.store.loader.load(&events).await?;
    assert_eq!(report.files, 1);
    assert_eq!(report.nodes, 1);
    assert_eq!(report.relationships, 3);
    assert_eq!(report.embeddings_updated, 1);
    assert_eq!(report.embedding_failures, 0);

    assert_eq!(ctx.graph.node_count("jira_issue")?, 1);
    assert_eq!(ctx.graph.node_count("atlassian_user")?, 1);
    let mut labels: Vec<_> = ctx
        .graph
        .relationships()?
        .into_iter()
        .map(|r| r.relationship)
        .collect();
    labels.sort();
    assert_eq!(labels, vec!["creates", "worked_on_by", "works_on"]);

    let issue = ctx
        .graph
        .nodes()?
        .into_iter()
        .find(|n| n.label == "jira_issue")
        .ok_or_else(|| anyhow::anyhow!("issue node missing"))?;
    assert!(!issue.properties.contains_key("parent_key"));
    let text = r#"{"title": "Fix login", "status": "To Do"}"#;
    assert_eq!(
        issue.properties.get("embedding"),
        Some(&json!([text.len() as f64, 1.0]))
    );
    Ok(())
}

#[tokio::test]
async fn reloading_the_same_events_is_idempotent_for_the_graph() -> anyhow::Result<()> {
    let ctx = init_test_context(EmbeddingMergePolicy::Replace)?;
    let file = ctx.temp_dir.path().join("issues_data.jsonl");
    write_events(&file, &[ISSUE_NODE, WORKS_ON])?;

    ctx.store.loader.load_file(&file).await?;
    ctx.store.loader.load_file(&file).await?;

    assert_eq!(ctx.graph.nodes()?.len(), 2);
    assert_eq!(ctx.graph.relationships()?.len(), 1);
    let issue = ctx
        .graph
        .find_node("jira_issue", &json!("10001"))
        .await?
        .ok_or_else(|| anyhow::anyhow!("issue node missing"))?;
    assert_eq!(
        issue.get("embedding").and_then(|v| v.as_array()).map(Vec::len),
        Some(2)
    );
    Ok(())
}

#[tokio::test]
async fn append_policy_grows_embedding_on_reload() -> anyhow::Result<()> {
    let ctx = init_test_context(EmbeddingMergePolicy::Append)?;
    let file = ctx.temp_dir.path().join("issues_data.jsonl");
    write_events(&file, &[ISSUE_NODE])?;

    ctx.store.loader.load_file(&file).await?;
    ctx.store.loader.load_file(&file).await?;

    let issue = ctx
        .graph
        .find_node("jira_issue", &json!("10001"))
        .await?
        .ok_or_else(|| anyhow::anyhow!("issue node missing"))?;
    assert_eq!(
        issue.get("embedding").and_then(|v| v.as_array()).map(Vec::len),
        Some(4)
    );
    Ok(())
}

#[tokio::test]
async fn relationship_with_absent_endpoints_creates_placeholders() -> anyhow::Result<()> {
    let ctx = init_test_context(EmbeddingMergePolicy::Append)?;
    let file = ctx.temp_dir.path().join("sprint_issues_data.jsonl");
    write_events(
        &file,
        &[r#"{"type":"relationship","start_node":{"label":"jira_sprint","id":3},"end_node":{"label":"jira_issue","id":"10001"},"relationship":"contains"}"#],
    )?;

    let report = ctx.store.loader.load_file(&file).await?;
    assert_eq!(report.relationships, 1);
    let nodes = ctx.graph.nodes()?;
    assert_eq!(nodes.len(), 2);
    assert!(nodes.iter().all(|n| n.properties.len() == 1));
    Ok(())
}

#[tokio::test]
async fn node_loaded_after_its_placeholder_embeds_its_own_properties() -> anyhow::Result<()> {
    let ctx = init_test_context(EmbeddingMergePolicy::Replace)?;
    let issues = ctx.temp_dir.path().join("issues_data.jsonl");
    let users = ctx.temp_dir.path().join("users_data.jsonl");
    write_events(&issues, &[WORKS_ON])?;
    write_events(
        &users,
        &[r#"{"type":"node","label":"atlassian_user","properties":{"id":"U1","display_name":"Ada Lovelace","email":"ada@example.com"}}"#],
    )?;

    ctx.store.loader.load_file(&issues).await?;
    let report = ctx.store.loader.load_file(&users).await?;
    assert_eq!(report.embeddings_updated, 1);

    let users: Vec<_> = ctx
        .graph
        .nodes()?
        .into_iter()
        .filter(|n| n.label == "atlassian_user")
        .collect();
    assert_eq!(users.len(), 2);
    let placeholder = users
        .iter()
        .find(|n| !n.properties.contains_key("display_name"))
        .ok_or_else(|| anyhow::anyhow!("placeholder missing"))?;
    assert!(!placeholder.properties.contains_key("embedding"));

    let loaded = users
        .iter()
        .find(|n| n.properties.contains_key("display_name"))
        .ok_or_else(|| anyhow::anyhow!("loaded user missing"))?;
    let text = r#"{"id": "U1", "display_name": "Ada Lovelace"}"#;
    assert_eq!(
        loaded.properties.get("embedding"),
        Some(&json!([text.len() as f64, 1.0]))
    );
    Ok(())
}

#[tokio::test]
async fn natural_key_store_fills_in_the_placeholder() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let graph = Arc::new(MemoryGraphStore::new());
    let store = KgStore::new(graph.clone())
        .with_merge_mode(NodeMergeMode::NaturalKey)
        .with_embeddings(
            Arc::new(CountingEmbeddingProvider::default()),
            IndexedProperties::builtin(),
            EmbeddingMergePolicy::Replace,
        );
    assert!(store.updater.is_some());
    let file = dir.path().join("users_data.jsonl");
    write_events(
        &file,
        &[
            WORKS_ON,
            r#"{"type":"node","label":"atlassian_user","properties":{"id":"U1","display_name":"Ada Lovelace"}}"#,
        ],
    )?;

    let report = store.loader.load_file(&file).await?;
    assert_eq!(report.embeddings_updated, 1);
    assert_eq!(graph.node_count("atlassian_user")?, 1);
    let user = graph
        .find_node("atlassian_user", &json!("U1"))
        .await?
        .ok_or_else(|| anyhow::anyhow!("user missing"))?;
    assert_eq!(user.get("display_name"), Some(&json!("Ada Lovelace")));
    let text = r#"{"id": "U1", "display_name": "Ada Lovelace"}"#;
    assert_eq!(user.get("embedding"), Some(&json!([text.len() as f64, 1.0])));
    assert_eq!(graph.relationships()?.len(), 1);
    Ok(())
}

#[tokio::test]
async fn unkeyed_endpoints_and_empty_nodes_are_skipped() -> anyhow::Result<()> {
    let ctx = init_test_context(EmbeddingMergePolicy::Append)?;
    let file = ctx.temp_dir.path().join("projects_data.jsonl");
    write_events(
        &file,
        &[
            r#"{"type":"node","label":"jira_project","properties":{"id":null}}"#,
            "",
            r#"{"type":"relationship","start_node":{"label":"atlassian_user","id":null},"end_node":{"label":"jira_project","id":"P1"},"relationship":"owns"}"#,
        ],
    )?;

    let report = ctx.store.loader.load_file(&file).await?;
    assert_eq!(report.skipped, 2);
    assert_eq!(report.nodes, 0);
    assert!(ctx.graph.nodes()?.is_empty());
    Ok(())
}

#[tokio::test]
async fn malformed_event_line_aborts_the_load() -> anyhow::Result<()> {
    let ctx = init_test_context(EmbeddingMergePolicy::Append)?;
    let file = ctx.temp_dir.path().join("broken_data.jsonl");
    write_events(&file, &[ISSUE_NODE, "{not json"])?;

    let err = ctx.store.loader.load_file(&file).await.unwrap_err();
    match err {
        StorageError::InvalidArg(message) => assert!(message.contains(":2:")),
        other => panic!("unexpected error {other:?}"),
    }
    Ok(())
}

#[tokio::test]
async fn embedding_failures_do_not_fail_node_writes() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let graph = Arc::new(MemoryGraphStore::new());
    let updater = EmbeddingUpdater::new(
        graph.clone(),
        Arc::new(FailingEmbeddingProvider),
        IndexedProperties::builtin(),
        EmbeddingMergePolicy::Append,
    );
    let loader = GraphLoader::new(graph.clone())
        .with_updater(updater)
        .with_merge_mode(NodeMergeMode::AllProperties);
    let file = dir.path().join("issues_data.jsonl");
    write_events(&file, &[ISSUE_NODE])?;

    let report = loader.load_file(&file).await?;
    assert_eq!(report.nodes, 1);
    assert_eq!(report.embedding_failures, 1);
    assert_eq!(graph.node_count("jira_issue")?, 1);
    Ok(())
}

#[tokio::test]
async fn missing_event_directory_is_reported() -> anyhow::Result<()> {
    let ctx = init_test_context(EmbeddingMergePolicy::Append)?;
    let err = ctx
        .store
        .loader
        .load(&ctx.temp_dir.path().join("absent"))
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::NotFound(_)));
    Ok(())
}
