//! Incremental Uploader: diffs the desired chunk set against
//! the vector index's current state and submits the minimal set of
//! deletes and upserts. The embedder and vector index are external
//! services; only their client contract is specified, so both are traits
//! the Orchestrator supplies a concrete implementation for.

use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crm_core::PipelineError;
use crm_model::Chunk;
use crm_progress::{Phase, ProgressState, ProgressStore};
use crm_retry::RetryEngine;

/// One chunk as currently known to the vector index's listing API.
#[derive(Debug, Clone)]
pub struct IndexEntry {
    pub id: String,
    pub object_ref: String,
    pub content_hash: String,
}

/// A chunk paired with its embedding, ready to submit.
pub struct UpsertItem {
    pub chunk: Chunk,
    pub vector: Vec<f32>,
}

/// The embedding model client contract.
pub trait Embedder: Send + Sync {
    fn embed(
        &self,
        texts: &[String],
    ) -> impl std::future::Future<Output = Result<Vec<Vec<f32>>, PipelineError<Infallible>>> + Send;
}

/// The vector index client contract.
pub trait VectorIndexClient: Send + Sync {
    fn list(
        &self,
    ) -> impl std::future::Future<Output = Result<Vec<IndexEntry>, PipelineError<Infallible>>> + Send;

    fn upsert(
        &self,
        items: Vec<UpsertItem>,
    ) -> impl std::future::Future<Output = Result<(), PipelineError<Infallible>>> + Send;

    fn delete(
        &self,
        ids: Vec<String>,
    ) -> impl std::future::Future<Output = Result<(), PipelineError<Infallible>>> + Send;
}

#[derive(Debug, Default)]
pub struct UploadReport {
    pub upserted_refs: usize,
    pub deleted_refs: usize,
    pub unchanged_refs: usize,
    pub failed_refs: Vec<(String, PipelineError<Infallible>)>,
}

enum RefChange {
    New,
    Changed,
    Deleted,
    Unchanged,
}

pub struct Uploader<I, E> {
    index: I,
    embedder: E,
    retry: Arc<RetryEngine>,
    progress: Arc<ProgressStore>,
    embed_batch_size: usize,
    upsert_pool_size: usize,
}

impl<I, E> Uploader<I, E>
where
    I: VectorIndexClient,
    E: Embedder,
{
    pub fn new(
        index: I,
        embedder: E,
        retry: Arc<RetryEngine>,
        progress: Arc<ProgressStore>,
        embed_batch_size: usize,
        upsert_pool_size: usize,
    ) -> Self {
        Self {
            index,
            embedder,
            retry,
            progress,
            embed_batch_size: embed_batch_size.max(1),
            upsert_pool_size: upsert_pool_size.max(1),
        }
    }

    /// Runs the full diff-then-submit cycle for `new_chunks`. Deletes are submitted before upserts for every changed
    /// ref, and across the whole run, to avoid transient over-capacity.
    ///
    /// When `incremental` is false, every ref present in `new_chunks` is
    /// upserted regardless of whether its content hash matches the
    /// index's current state.
    pub async fn upload(&self, new_chunks: Vec<Chunk>, incremental: bool) -> UploadReport {
        let mut report = UploadReport::default();

        let current = match self.index.list().await {
            Ok(entries) => entries,
            Err(e) => {
                report.failed_refs.push(("<list>".to_string(), e));
                return report;
            }
        };

        let cur_hash = build_hash_map(current.iter().map(|e| (&e.object_ref, &e.content_hash)));
        let cur_ids_by_ref = group_ids_by_ref(&current);
        let new_hash = build_hash_map(
            new_chunks
                .iter()
                .map(|c| (&c.metadata.object_ref, &c.metadata.content_hash)),
        );

        let mut new_chunks_by_ref: HashMap<String, Vec<Chunk>> = HashMap::new();
        for chunk in new_chunks {
            new_chunks_by_ref
                .entry(chunk.metadata.object_ref.clone())
                .or_default()
                .push(chunk);
        }

        let mut all_refs: Vec<String> = cur_hash.keys().chain(new_hash.keys()).cloned().collect();
        all_refs.sort();
        all_refs.dedup();

        let mut delete_ids = Vec::new();
        let mut refs_to_upsert = Vec::new();

        for object_ref in &all_refs {
            let mut change = classify(cur_hash.get(object_ref), new_hash.get(object_ref));
            if !incremental && matches!(change, RefChange::Unchanged) {
                change = RefChange::Changed;
            }
            match change {
                RefChange::Unchanged => report.unchanged_refs += 1,
                RefChange::Deleted => {
                    if let Some(ids) = cur_ids_by_ref.get(object_ref) {
                        delete_ids.extend(ids.iter().cloned());
                    }
                    report.deleted_refs += 1;
                }
                RefChange::Changed => {
                    if let Some(ids) = cur_ids_by_ref.get(object_ref) {
                        delete_ids.extend(ids.iter().cloned());
                    }
                    refs_to_upsert.push(object_ref.clone());
                }
                RefChange::New => refs_to_upsert.push(object_ref.clone()),
            }
        }

        if !delete_ids.is_empty() {
            if let Err(e) = self.retry_delete(delete_ids).await {
                report.failed_refs.push(("<delete>".to_string(), e));
            }
        }

        let mut chunks_to_upsert = Vec::new();
        for object_ref in &refs_to_upsert {
            if let Some(chunks) = new_chunks_by_ref.remove(object_ref) {
                chunks_to_upsert.extend(chunks);
            }
        }
        chunks_to_upsert.sort_by(|a, b| {
            (a.metadata.object_ref.as_str(), a.metadata.part_index)
                .cmp(&(b.metadata.object_ref.as_str(), b.metadata.part_index))
        });

        let batches: Vec<Vec<Chunk>> = chunks_to_upsert
            .chunks(self.embed_batch_size)
            .map(|c| c.to_vec())
            .collect();

        let batch_failures = self.upsert_batches(batches).await;
        let failed_upsert_refs: std::collections::HashSet<String> =
            batch_failures.iter().map(|(r, _)| r.clone()).collect();
        for (object_ref, error) in batch_failures {
            let _ = self
                .progress
                .mark(
                    object_ref.clone(),
                    Phase::Upload,
                    ProgressState::Error,
                    Some(error.to_string()),
                )
                .await;
            report.failed_refs.push((object_ref, error));
        }
        report.upserted_refs = refs_to_upsert
            .iter()
            .filter(|r| !failed_upsert_refs.contains(*r))
            .count();

        report
    }

    async fn retry_delete(&self, ids: Vec<String>) -> Result<(), PipelineError<Infallible>> {
        self.retry
            .call(|_attempt| async { self.index.delete(ids.clone()).await })
            .await
    }

    /// Embeds and upserts every batch concurrently, bounded by the
    /// upsert worker pool. Returns one failure entry per chunk whose batch never
    /// succeeded, keyed by object ref.
    async fn upsert_batches(&self, batches: Vec<Vec<Chunk>>) -> Vec<(String, PipelineError<Infallible>)>
    where
        I: Clone + 'static,
        E: Clone + 'static,
    {
        let semaphore = Arc::new(Semaphore::new(self.upsert_pool_size));
        let mut tasks = JoinSet::new();

        for batch in batches {
            if batch.is_empty() {
                continue;
            }
            let semaphore = Arc::clone(&semaphore);
            let index = self.index.clone();
            let embedder = self.embedder.clone();
            let retry = Arc::clone(&self.retry);

            tasks.spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .expect("uploader semaphore never closes");

                let refs: Vec<String> = batch
                    .iter()
                    .map(|c| c.metadata.object_ref.clone())
                    .collect();

                let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
                let vectors = retry
                    .call(|_attempt| async { embedder.embed(&texts).await })
                    .await;

                let vectors = match vectors {
                    Ok(v) => v,
                    Err(e) => return refs.into_iter().map(|r| (r, clone_error(&e))).collect(),
                };

                let items: Vec<UpsertItem> = batch
                    .into_iter()
                    .zip(vectors)
                    .map(|(chunk, vector)| UpsertItem { chunk, vector })
                    .collect();

                let result = retry
                    .call(|_attempt| {
                        let items = clone_items(&items);
                        let index = &index;
                        async move { index.upsert(items).await }
                    })
                    .await;

                match result {
                    Ok(()) => Vec::new(),
                    Err(e) => refs.into_iter().map(|r| (r, clone_error(&e))).collect(),
                }
            });
        }

        let mut failures = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            if let Ok(batch_failures) = joined {
                failures.extend(batch_failures);
            }
        }
        failures
    }
}

fn clone_error(err: &PipelineError<Infallible>) -> PipelineError<Infallible> {
    err.clone()
}

fn clone_items(items: &[UpsertItem]) -> Vec<UpsertItem> {
    items
        .iter()
        .map(|i| UpsertItem {
            chunk: i.chunk.clone(),
            vector: i.vector.clone(),
        })
        .collect()
}

fn build_hash_map<'a>(
    pairs: impl Iterator<Item = (&'a String, &'a String)>,
) -> HashMap<String, String> {
    let mut out = HashMap::new();
    for (object_ref, hash) in pairs {
        out.insert(object_ref.clone(), hash.clone());
    }
    out
}

fn group_ids_by_ref(entries: &[IndexEntry]) -> HashMap<String, Vec<String>> {
    let mut out: HashMap<String, Vec<String>> = HashMap::new();
    for entry in entries {
        out.entry(entry.object_ref.clone()).or_default().push(entry.id.clone());
    }
    out
}

fn classify(cur: Option<&String>, new: Option<&String>) -> RefChange {
    match (cur, new) {
        (None, Some(_)) => RefChange::New,
        (Some(_), None) => RefChange::Deleted,
        (Some(c), Some(n)) if c != n => RefChange::Changed,
        _ => RefChange::Unchanged,
    }
}
