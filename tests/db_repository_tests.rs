use std::collections::BTreeMap;

use newscode_lib::{
    core::types::{AnalysisIssue, AnalysisResult, DocumentAnalysis, IssueKind, RunStatus, VariableResult},
    db::{repositories::analyses, Database},
};

fn analysis(document_id: &str, section: &str, issues: usize) -> DocumentAnalysis {
    let mut variables = BTreeMap::new();
    variables.insert(
        "tema".to_string(),
        VariableResult {
            code: "2".to_string(),
            label: "Política".to_string(),
            evidence: vec!["el Congreso".to_string()],
        },
    );
    DocumentAnalysis {
        document_id: document_id.to_string(),
        section: section.to_string(),
        result: AnalysisResult {
            section: section.to_string(),
            variables,
            errors: (0..issues)
                .map(|idx| AnalysisIssue::for_variable(IssueKind::InvalidCode, "tema", format!("issue {idx}")))
                .collect(),
        },
        latency_ms: 42,
    }
}

#[tokio::test]
async fn run_lifecycle_persists_analyses_and_counts() {
    let db = Database::in_memory().await.expect("db should initialize");
    analyses::create_run(db.pool(), "run-1", "gemma3:4b")
        .await
        .expect("create run");

    analyses::save_analysis(db.pool(), "run-1", &analysis("doc-b", "FUENTES", 0))
        .await
        .expect("save analysis");
    analyses::save_analysis(db.pool(), "run-1", &analysis("doc-a", "FUENTES", 2))
        .await
        .expect("save analysis");
    analyses::save_analysis(db.pool(), "run-1", &analysis("doc-a", "LENGUAJE", 1))
        .await
        .expect("save analysis");

    let running = analyses::get_run(db.pool(), "run-1").await.expect("get run");
    assert_eq!(running.run.status, RunStatus::Running);
    assert!(running.run.ended_at.is_none());

    analyses::complete_run(db.pool(), "run-1")
        .await
        .expect("complete run");
    let done = analyses::get_run(db.pool(), "run-1").await.expect("get run");
    assert_eq!(done.run.status, RunStatus::Completed);
    assert_eq!(done.run.model, "gemma3:4b");
    assert_eq!(done.run.document_count, 2);
    assert_eq!(done.run.error_count, 3);
    assert!(done.run.ended_at.is_some());

    let order: Vec<(&str, &str)> = done
        .analyses
        .iter()
        .map(|item| (item.document_id.as_str(), item.section.as_str()))
        .collect();
    assert_eq!(
        order,
        vec![("doc-a", "FUENTES"), ("doc-a", "LENGUAJE"), ("doc-b", "FUENTES")]
    );
    assert_eq!(done.analyses[2].result.code_of("tema"), Some("2"));
    assert_eq!(done.analyses[0].latency_ms, 42);
}

#[tokio::test]
async fn resaving_a_section_replaces_it_and_filters_by_document() {
    let db = Database::in_memory().await.expect("db should initialize");
    analyses::create_run(db.pool(), "run-2", "gemma3:4b")
        .await
        .expect("create run");
    analyses::save_analysis(db.pool(), "run-2", &analysis("doc-a", "FUENTES", 1))
        .await
        .expect("save analysis");
    analyses::save_analysis(db.pool(), "run-2", &analysis("doc-a", "FUENTES", 0))
        .await
        .expect("save analysis");
    analyses::save_analysis(db.pool(), "run-2", &analysis("doc-b", "FUENTES", 0))
        .await
        .expect("save analysis");

    let only_a = analyses::list_analyses(db.pool(), "run-2", Some("doc-a"))
        .await
        .expect("list analyses");
    assert_eq!(only_a.len(), 1);
    assert!(only_a[0].result.errors.is_empty());

    let all = analyses::list_analyses(db.pool(), "run-2", None)
        .await
        .expect("list analyses");
    assert_eq!(all.len(), 2);
}

#[tokio::test]
async fn failed_and_unknown_runs() {
    let db = Database::in_memory().await.expect("db should initialize");
    analyses::create_run(db.pool(), "run-3", "gemma3:4b")
        .await
        .expect("create run");
    analyses::fail_run(db.pool(), "run-3").await.expect("fail run");
    let failed = analyses::get_run(db.pool(), "run-3").await.expect("get run");
    assert_eq!(failed.run.status, RunStatus::Failed);

    let missing = analyses::get_run(db.pool(), "nope").await.expect_err("missing run");
    assert_eq!(missing.code(), "NOT_FOUND");
    assert!(analyses::complete_run(db.pool(), "nope").await.is_err());

    let orphan = analyses::save_analysis(db.pool(), "nope", &analysis("doc-a", "FUENTES", 0)).await;
    assert!(orphan.is_err(), "analyses require an existing run");
}

#[tokio::test]
async fn file_database_is_created_with_parent_directories() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("nested").join("results.sqlite");
    let db = Database::open(&path).await.expect("open file db");
    analyses::create_run(db.pool(), "run-4", "gemma3:4b")
        .await
        .expect("create run");
    assert!(path.exists());
}
