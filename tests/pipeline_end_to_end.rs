//! End-to-end run of the full pipeline against a fake tenant CLI
//! (`fixtures/tenant_cli.py`) and fake in-memory embedder/vector-index
//! clients, composing every crate the way `main.rs` does.

use std::collections::HashMap;
use std::convert::Infallible;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use crm_bridge::CliBridge;
use crm_cache::CacheStore;
use crm_coalesce::{CoalesceConfig, QueryCoalescer};
use crm_core::PipelineError;
use crm_model::Chunk;
use crm_pipeline::{
    AutomationEnricher, CorpusEmitter, Describer, Embedder, Enumerator, EnumeratorFilters,
    FieldSecurityEnricher, HistoryEnricher, IndexEntry, OrgSecurityEnricher, Orchestrator,
    RemoteClient, StatsEnricher, Uploader, UpsertItem, VectorIndexClient,
};
use crm_progress::{Phase, ProgressStore};
use crm_ratelimiter::{RateLimiter, RateLimiterConfigBuilder};
use crm_retry::{RetryConfigBuilder, RetryEngine};

fn fixture_cli() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/tenant_cli.py")
}

/// An in-memory embedder: one fixed-length vector per text, seeded from
/// its byte length so distinct texts get distinct vectors.
#[derive(Clone, Default)]
struct FakeEmbedder;

impl Embedder for FakeEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, PipelineError<Infallible>> {
        Ok(texts
            .iter()
            .map(|t| vec![t.len() as f32, 1.0, 0.0])
            .collect())
    }
}

/// An in-memory vector index: just a `Mutex<HashMap>`, enough to drive
/// the Incremental Uploader's diff-then-submit cycle.
#[derive(Clone, Default)]
struct FakeVectorIndex {
    entries: Arc<Mutex<HashMap<String, (String, String)>>>,
}

impl VectorIndexClient for FakeVectorIndex {
    async fn list(&self) -> Result<Vec<IndexEntry>, PipelineError<Infallible>> {
        let entries = self.entries.lock().unwrap();
        Ok(entries
            .iter()
            .map(|(id, (object_ref, content_hash))| IndexEntry {
                id: id.clone(),
                object_ref: object_ref.clone(),
                content_hash: content_hash.clone(),
            })
            .collect())
    }

    async fn upsert(&self, items: Vec<UpsertItem>) -> Result<(), PipelineError<Infallible>> {
        let mut entries = self.entries.lock().unwrap();
        for item in items {
            entries.insert(
                item.chunk.id.clone(),
                (item.chunk.metadata.object_ref.clone(), item.chunk.metadata.content_hash.clone()),
            );
        }
        Ok(())
    }

    async fn delete(&self, ids: Vec<String>) -> Result<(), PipelineError<Infallible>> {
        let mut entries = self.entries.lock().unwrap();
        for id in ids {
            entries.remove(&id);
        }
        Ok(())
    }
}

fn remote() -> RemoteClient {
    let (limiter, _handle) = RateLimiter::new(RateLimiterConfigBuilder::new().build());
    let retry = RetryEngine::new(RetryConfigBuilder::new().build());
    RemoteClient::new(CliBridge::new(fixture_cli().to_str().unwrap()), limiter, retry)
}

#[tokio::test]
async fn full_run_enumerates_describes_enriches_emits_and_uploads() {
    let cache_dir = tempfile::tempdir().unwrap();
    let output_dir = tempfile::tempdir().unwrap();
    let progress_path = cache_dir.path().join("progress.json");

    let describe_cache = Arc::new(CacheStore::new(cache_dir.path(), crm_cache::DEFAULT_TTL, 1));
    let coalesce_cache = CacheStore::new(cache_dir.path(), crm_cache::DEFAULT_TTL, 1);
    let coalescer = Arc::new(QueryCoalescer::new(coalesce_cache, CoalesceConfig::new(1)));
    let progress = Arc::new(ProgressStore::open(progress_path).await.unwrap());

    let enumerator = Enumerator::new(remote());
    let describer = Describer::new(remote(), describe_cache.clone(), 1, 4);
    let automation = AutomationEnricher::new(remote(), Arc::clone(&coalescer));
    let field_security = FieldSecurityEnricher::new(remote(), Arc::clone(&coalescer));
    let history = HistoryEnricher::new(remote(), Arc::clone(&coalescer));
    let org_security = OrgSecurityEnricher::new(remote(), 4);
    let stats = StatsEnricher::new(remote(), Arc::clone(&coalescer), 10, 4);
    let emitter = CorpusEmitter::new("object", 6_000);

    let index = FakeVectorIndex::default();
    let embedder = FakeEmbedder;
    let retry_for_upload = Arc::new(RetryEngine::new(RetryConfigBuilder::new().build()));
    let uploader = Uploader::new(
        index.clone(),
        embedder,
        retry_for_upload,
        Arc::clone(&progress),
        50,
        4,
    );

    let orchestrator = Orchestrator::new(
        enumerator,
        describer,
        automation,
        field_security,
        history,
        org_security,
        stats,
        emitter,
        uploader,
        Arc::clone(&progress),
        describe_cache,
        crm_pipeline::PipelineConfig {
            output_dir: output_dir.path().to_path_buf(),
            ..crm_pipeline::PipelineConfig::default()
        },
        EnumeratorFilters::default(),
    );

    let report = orchestrator.run(&Phase::ALL).await;

    assert_eq!(report.exit_code, 0);
    assert_eq!(report.enumerated, 2);
    assert_eq!(report.described, 2);
    assert_eq!(report.errored, 0, "no enricher or upload call should fail against the fixture");
    assert!(report.emitted_chunks >= 2);
    assert_eq!(report.uploaded_refs, 2);

    assert!(output_dir.path().join("schema.json").is_file());
    assert!(output_dir.path().join("corpus.jsonl").is_file());
    assert!(output_dir.path().join("security.json").is_file());
    assert!(output_dir.path().join("documents/Account.md").is_file());
    assert!(output_dir.path().join("documents/Contact.md").is_file());

    // A second run resumes from the Progress Store: both refs are already
    // marked Done for Describe, so neither is re-described, but their
    // ObjectRecords are still reconstructed from the Describer's cache so
    // emit and upload keep seeing the full working set. Content hasn't
    // changed, so the Incremental Uploader finds both refs unchanged.
    let second_report = orchestrator.run(&Phase::ALL).await;
    assert_eq!(second_report.exit_code, 0);
    assert_eq!(second_report.described, 0);
    assert!(second_report.emitted_chunks >= 2);
    assert_eq!(second_report.uploaded_refs, 0);
}

#[tokio::test]
async fn describe_only_run_skips_enrichment_and_upload() {
    let cache_dir = tempfile::tempdir().unwrap();
    let progress_path = cache_dir.path().join("progress.json");

    let describe_cache = Arc::new(CacheStore::new(cache_dir.path(), crm_cache::DEFAULT_TTL, 1));
    let coalesce_cache = CacheStore::new(cache_dir.path(), crm_cache::DEFAULT_TTL, 1);
    let coalescer = Arc::new(QueryCoalescer::new(coalesce_cache, CoalesceConfig::new(1)));
    let progress = Arc::new(ProgressStore::open(progress_path).await.unwrap());

    let enumerator = Enumerator::new(remote());
    let describer = Describer::new(remote(), describe_cache.clone(), 1, 4);
    let automation = AutomationEnricher::new(remote(), Arc::clone(&coalescer));
    let field_security = FieldSecurityEnricher::new(remote(), Arc::clone(&coalescer));
    let history = HistoryEnricher::new(remote(), Arc::clone(&coalescer));
    let org_security = OrgSecurityEnricher::new(remote(), 4);
    let stats = StatsEnricher::new(remote(), Arc::clone(&coalescer), 10, 4);
    let emitter = CorpusEmitter::new("object", 6_000);

    let index = FakeVectorIndex::default();
    let embedder = FakeEmbedder;
    let retry_for_upload = Arc::new(RetryEngine::new(RetryConfigBuilder::new().build()));
    let uploader = Uploader::new(index, embedder, retry_for_upload, Arc::clone(&progress), 50, 4);

    let orchestrator = Orchestrator::new(
        enumerator,
        describer,
        automation,
        field_security,
        history,
        org_security,
        stats,
        emitter,
        uploader,
        Arc::clone(&progress),
        describe_cache,
        crm_pipeline::PipelineConfig::default(),
        EnumeratorFilters::default(),
    );

    let report = orchestrator.run(&[Phase::Enumerate, Phase::Describe]).await;

    assert_eq!(report.exit_code, 0);
    assert_eq!(report.described, 2);
    assert_eq!(report.emitted_chunks, 0);
    assert_eq!(report.uploaded_refs, 0);
}

#[tokio::test]
async fn chunk_ids_round_trip_through_emit_and_upload() {
    let cache_dir = tempfile::tempdir().unwrap();
    let progress = Arc::new(
        ProgressStore::open(cache_dir.path().join("progress.json"))
            .await
            .unwrap(),
    );
    let index = FakeVectorIndex::default();
    let embedder = FakeEmbedder;
    let retry = Arc::new(RetryEngine::new(RetryConfigBuilder::new().build()));
    let uploader = Uploader::new(index.clone(), embedder, retry, Arc::clone(&progress), 10, 2);

    let emitter = CorpusEmitter::new("object", 6_000);
    let describer = Describer::new(
        remote(),
        Arc::new(CacheStore::new(cache_dir.path(), crm_cache::DEFAULT_TTL, 1)),
        1,
        2,
    );
    let object_ref = crm_model::ObjectRef::new("Account");
    let mut record = describer.describe_one(&object_ref).await.unwrap();
    record.finalize_hash();

    let emitted = emitter.emit(&record);
    assert!(!emitted.chunks.is_empty());

    let expected_id = Chunk::id_for("object", "Account", 1, emitted.chunks.len() as u32);
    assert_eq!(emitted.chunks[0].id, expected_id);

    let report = uploader.upload(emitted.chunks, true).await;
    assert_eq!(report.upserted_refs, 1);
    assert!(index.entries.lock().unwrap().contains_key(&expected_id));
}
