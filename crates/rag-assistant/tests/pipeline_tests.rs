//! End-to-end orchestrator behavior with in-process providers

mod common;

use common::{harness, harness_with, test_config, write_file, MockEmbedder};
use rag_assistant::{Error, ErrorKind, PipelineState};
use serde_json::json;

#[tokio::test]
async fn answers_from_ingested_document_with_source() {
    let dir = tempfile::tempdir().unwrap();
    let fr = write_file(dir.path(), "fr.txt", "Paris is the capital of France.");
    let h = harness(test_config(dir.path()));

    let report = h.rag.ingest(&[fr.clone()]).await.unwrap();
    assert_eq!(report.documents_loaded, 1);
    assert_eq!(report.chunks_indexed, 1);
    assert_eq!(h.rag.state().await, PipelineState::Indexed);

    let response = h.rag.ask("What is the capital of France?").await;
    assert!(!response.is_error(), "unexpected failure: {}", response.answer);
    assert!(response.answer.contains("Paris"));
    assert_eq!(response.sources, vec![fr.display().to_string()]);
    assert_eq!(response.confidence, 1);
    assert_eq!(response.citations[0].file_name, "fr.txt");
    assert!(response.citations[0].cited);
    assert_eq!(h.rag.state().await, PipelineState::Queryable);

    let prompt = h.llm.last_prompt().unwrap();
    assert!(prompt.contains("Respond in English"));
    assert!(prompt.contains("What is the capital of France?"));
}

#[tokio::test]
async fn empty_question_makes_no_provider_calls() {
    let dir = tempfile::tempdir().unwrap();
    let fr = write_file(dir.path(), "fr.txt", "Paris is the capital of France.");
    let h = harness(test_config(dir.path()));
    h.rag.ingest(&[fr]).await.unwrap();

    let embed_calls = h.embedder.calls();
    for question in ["", "   ", "\n\t"] {
        let response = h.rag.ask(question).await;
        assert!(response.is_error());
        assert_eq!(response.error_kind, Some(ErrorKind::Validation));
        assert_eq!(response.question, question);
    }
    assert_eq!(h.embedder.calls(), embed_calls);
    assert_eq!(h.llm.calls(), 0);
}

#[tokio::test]
async fn ask_before_ingest_is_a_configuration_failure() {
    let dir = tempfile::tempdir().unwrap();
    let h = harness(test_config(dir.path()));

    let response = h.rag.ask("What is the capital of France?").await;
    assert!(response.is_error());
    assert_eq!(response.error_kind, Some(ErrorKind::Configuration));
    assert!(response.answer.starts_with("Sorry, an error occurred"));
    assert!(response.sources.is_empty());
    assert_eq!(h.embedder.calls(), 0);
    assert_eq!(h.llm.calls(), 0);
    assert_eq!(h.rag.state().await, PipelineState::Uninitialized);
}

#[tokio::test]
async fn configure_k_limits_sources() {
    let dir = tempfile::tempdir().unwrap();
    let paths: Vec<_> = ["a", "b", "c", "d"]
        .iter()
        .map(|name| {
            write_file(
                dir.path(),
                &format!("{}.txt", name),
                &format!("Report {} covers the capital city budget.", name),
            )
        })
        .collect();

    let h = harness(test_config(dir.path()));
    h.rag.ingest(&paths).await.unwrap();
    h.rag
        .configure("retrieval", json!({"k": 2, "score_threshold": 0.0}))
        .await
        .unwrap();

    let response = h.rag.ask("What does the report say about the capital budget?").await;
    assert!(!response.is_error(), "unexpected failure: {}", response.answer);
    assert!(response.sources.len() <= 2);
    assert!(response.confidence <= 2);
    assert_eq!(response.confidence, 2);
}

#[tokio::test]
async fn configure_drops_query_chain() {
    let dir = tempfile::tempdir().unwrap();
    let fr = write_file(dir.path(), "fr.txt", "Paris is the capital of France.");
    let h = harness(test_config(dir.path()));
    h.rag.ingest(&[fr]).await.unwrap();

    h.rag.ask("What is the capital of France?").await;
    assert_eq!(h.rag.state().await, PipelineState::Queryable);

    h.rag
        .configure("llm", json!({"response_language": "Spanish"}))
        .await
        .unwrap();
    assert_eq!(h.rag.state().await, PipelineState::Indexed);

    h.rag.ask("What is the capital of France?").await;
    assert!(h.llm.last_prompt().unwrap().contains("Respond in Spanish"));
}

#[tokio::test]
async fn configure_rejects_unknown_keys_and_sections() {
    let dir = tempfile::tempdir().unwrap();
    let h = harness(test_config(dir.path()));
    let before = h.rag.config().await;

    let err = h
        .rag
        .configure("retrieval", json!({"top_k": 3}))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Validation(_)));

    let err = h
        .rag
        .configure("chunking", json!({"chunk_size": 100, "chunk_overlap": 100}))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Configuration);

    assert!(h.rag.configure("theme", json!({})).await.is_err());
    assert_eq!(h.rag.config().await, before);
}

#[tokio::test]
async fn open_existing_on_missing_directory_keeps_state() {
    let dir = tempfile::tempdir().unwrap();
    let h = harness(test_config(dir.path()));

    let err = h.rag.open_existing(dir.path().join("never-built")).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Index);
    assert_eq!(h.rag.state().await, PipelineState::Uninitialized);
}

#[tokio::test]
async fn missing_file_is_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let a = write_file(dir.path(), "a.txt", "Alpha document text.");
    let b = write_file(dir.path(), "b.md", "# Beta\n\nBeta document text.");
    let missing = dir.path().join("missing.txt");
    let h = harness(test_config(dir.path()));

    let report = h.rag.ingest(&[a, missing, b]).await.unwrap();
    assert_eq!(report.files_requested, 3);
    assert_eq!(report.documents_loaded, 2);
    assert_eq!(report.failures.len(), 1);
    assert!(report.failures[0].path.ends_with("missing.txt"));
}

#[tokio::test]
async fn ingest_with_nothing_loadable_fails_and_keeps_state() {
    let dir = tempfile::tempdir().unwrap();
    let h = harness(test_config(dir.path()));

    let err = h
        .rag
        .ingest(&[dir.path().join("missing.pdf")])
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Ingestion);
    assert_eq!(h.rag.state().await, PipelineState::Uninitialized);
    assert_eq!(h.embedder.calls(), 0);
}

#[tokio::test]
async fn ingest_rejects_too_many_files() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(dir.path());
    config.ingestion.max_files_per_batch = 2;
    let h = harness(config);

    let paths: Vec<_> = (0..3)
        .map(|i| write_file(dir.path(), &format!("{}.txt", i), "text"))
        .collect();
    let err = h.rag.ingest(&paths).await.unwrap_err();
    assert!(matches!(err, Error::Validation(_)));
}

#[tokio::test]
async fn reopened_index_answers_without_reingesting() {
    let dir = tempfile::tempdir().unwrap();
    let fr = write_file(dir.path(), "fr.txt", "Paris is the capital of France.");
    let config = test_config(dir.path());
    let index_dir = config.vector_db.persist_directory.clone();

    {
        let h = harness(config.clone());
        h.rag.ingest(&[fr]).await.unwrap();
    }

    let h = harness(config);
    assert_eq!(h.rag.open_existing(&index_dir).await.unwrap(), 1);
    assert_eq!(h.rag.state().await, PipelineState::Indexed);

    let response = h.rag.ask("What is the capital of France?").await;
    assert!(response.answer.contains("Paris"));

    let stats = h.rag.stats().await;
    assert_eq!(stats.entry_count, 1);
    assert_eq!(stats.embedding_model, "mock-embedding");
    assert_eq!(stats.state, PipelineState::Queryable);
}

#[tokio::test]
async fn add_documents_extends_index() {
    let dir = tempfile::tempdir().unwrap();
    let fr = write_file(dir.path(), "fr.txt", "Paris is the capital of France.");
    let de = write_file(dir.path(), "de.txt", "Berlin is the capital of Germany.");
    let h = harness(test_config(dir.path()));

    // Falls back to a fresh build when nothing is open
    let first = h.rag.add_documents(&[fr]).await.unwrap();
    assert_eq!(first.chunks_indexed, 1);

    let second = h.rag.add_documents(&[de.clone()]).await.unwrap();
    assert_eq!(second.chunks_indexed, 1);
    assert_eq!(h.rag.stats().await.entry_count, 2);

    let response = h.rag.ask("What is the capital of Germany?").await;
    assert_eq!(response.sources.first(), Some(&de.display().to_string()));
}

#[tokio::test]
async fn provider_failure_becomes_error_response() {
    let dir = tempfile::tempdir().unwrap();
    let fr = write_file(dir.path(), "fr.txt", "Paris is the capital of France.");
    let h = harness(test_config(dir.path()));
    h.rag.ingest(&[fr]).await.unwrap();

    h.embedder
        .fail
        .store(true, std::sync::atomic::Ordering::SeqCst);
    let response = h.rag.ask("What is the capital of France?").await;
    assert!(response.is_error());
    assert_eq!(response.error_kind, Some(ErrorKind::Query));
    assert_eq!(response.question, "What is the capital of France?");
    assert_eq!(h.llm.calls(), 0);
}

#[tokio::test]
async fn concurrent_asks_share_one_chain() {
    let dir = tempfile::tempdir().unwrap();
    let fr = write_file(dir.path(), "fr.txt", "Paris is the capital of France.");
    let h = harness(test_config(dir.path()));
    h.rag.ingest(&[fr]).await.unwrap();

    let rag = std::sync::Arc::new(h.rag);
    let asks = (0..8).map(|_| {
        let rag = rag.clone();
        async move { rag.ask("What is the capital of France?").await }
    });
    let responses = futures::future::join_all(asks).await;

    assert!(responses.iter().all(|r| !r.is_error()));
    assert_eq!(h.llm.calls(), 8);
}

#[tokio::test]
async fn add_with_other_model_keeps_existing_index() {
    let dir = tempfile::tempdir().unwrap();
    let paths: Vec<_> = ["a", "b", "c"]
        .iter()
        .map(|name| write_file(dir.path(), &format!("{}.txt", name), &format!("Note {}.", name)))
        .collect();
    let extra = write_file(dir.path(), "new.txt", "A later note.");
    let config = test_config(dir.path());
    let index_dir = config.vector_db.persist_directory.clone();

    let original = harness_with(config.clone(), MockEmbedder::with_model("model-a"));
    original.rag.ingest(&paths).await.unwrap();

    let other = harness_with(config.clone(), MockEmbedder::with_model("model-b"));
    assert!(other.rag.open_existing(&index_dir).await.is_err());
    let err = other.rag.add_documents(&[extra]).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Index);
    assert_eq!(other.embedder.calls(), 0);

    let reopened = harness_with(config, MockEmbedder::with_model("model-a"));
    assert_eq!(reopened.rag.open_existing(&index_dir).await.unwrap(), 3);
}

#[tokio::test]
async fn ingest_all_skips_batches_that_load_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(dir.path());
    config.ingestion.max_files_per_batch = 2;
    let h = harness(config);

    let paths = vec![
        write_file(dir.path(), "report.docx", "binary"),
        dir.path().join("missing.txt"),
        write_file(dir.path(), "a.txt", "Alpha notes."),
        write_file(dir.path(), "b.txt", "Beta notes."),
        write_file(dir.path(), "slides.pptx", "binary"),
    ];

    let report = h.rag.ingest_all(&paths).await.unwrap();
    assert_eq!(report.files_requested, 5);
    assert_eq!(report.documents_loaded, 2);
    assert_eq!(report.chunks_indexed, 2);
    assert_eq!(report.failures.len(), 3);
    assert!(report.failures.iter().any(|f| f.path.ends_with("missing.txt")));
    assert_eq!(h.rag.stats().await.entry_count, 2);
    assert_eq!(h.rag.state().await, PipelineState::Indexed);
}

#[tokio::test]
async fn ingest_all_fails_when_nothing_loads() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(dir.path());
    config.ingestion.max_files_per_batch = 1;
    let h = harness(config);

    let paths = vec![dir.path().join("gone.txt"), write_file(dir.path(), "x.docx", "binary")];
    let err = h.rag.ingest_all(&paths).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Ingestion);
    assert_eq!(h.rag.state().await, PipelineState::Uninitialized);
}

#[tokio::test]
async fn ingest_from_queryable_returns_to_indexed() {
    let dir = tempfile::tempdir().unwrap();
    let fr = write_file(dir.path(), "fr.txt", "Paris is the capital of France.");
    let de = write_file(dir.path(), "de.txt", "Berlin is the capital of Germany.");
    let h = harness(test_config(dir.path()));
    h.rag.ingest(&[fr]).await.unwrap();

    h.rag.ask("What is the capital of France?").await;
    assert_eq!(h.rag.state().await, PipelineState::Queryable);

    h.rag.ingest(&[de.clone()]).await.unwrap();
    assert_eq!(h.rag.state().await, PipelineState::Indexed);

    // The rebuilt chain searches the replaced index
    let response = h.rag.ask("What is the capital of Germany?").await;
    assert_eq!(response.sources, vec![de.display().to_string()]);
    assert_eq!(h.rag.state().await, PipelineState::Queryable);
}

#[tokio::test]
async fn open_existing_from_queryable_returns_to_indexed() {
    let dir = tempfile::tempdir().unwrap();
    let fr = write_file(dir.path(), "fr.txt", "Paris is the capital of France.");
    let config = test_config(dir.path());
    let index_dir = config.vector_db.persist_directory.clone();
    let h = harness(config);
    h.rag.ingest(&[fr]).await.unwrap();

    h.rag.ask("What is the capital of France?").await;
    assert_eq!(h.rag.state().await, PipelineState::Queryable);

    assert_eq!(h.rag.open_existing(&index_dir).await.unwrap(), 1);
    assert_eq!(h.rag.state().await, PipelineState::Indexed);
}
