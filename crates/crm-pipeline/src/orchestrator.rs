//! The Orchestrator: runs the requested phases in
//! dependency order, seeds resume state from the Progress Store, watches
//! for a hard quota wall, and reports final counts.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crm_cache::{CacheStatsSnapshot, CacheStore};
use crm_model::{ObjectRecord, ObjectRef};
use crm_progress::{Phase, ProgressState, ProgressStore};

use crate::config::PipelineConfig;
use crate::describer::Describer;
use crate::emitter::CorpusEmitter;
use crate::enrichers::{
    AutomationEnricher, FieldSecurityEnricher, HistoryEnricher, OrgSecurityEnricher, StatsEnricher,
};
use crate::enumerator::{Enumerator, EnumeratorFilters};
use crate::output;
use crate::uploader::{Embedder, Uploader, VectorIndexClient};

/// Exit code signaling a graceful, resumable stop.
pub const EXIT_CODE_PARTIAL: i32 = 2;

#[derive(Debug, Default)]
pub struct RunReport {
    pub enumerated: usize,
    pub described: usize,
    pub enriched: usize,
    pub emitted_chunks: usize,
    pub uploaded_refs: usize,
    pub errored: usize,
    pub cache_stats: Option<CacheStatsSnapshot>,
    pub elapsed: Duration,
    pub exit_code: i32,
}

pub struct Orchestrator<I, E> {
    enumerator: Enumerator,
    describer: Describer,
    automation: AutomationEnricher,
    field_security: FieldSecurityEnricher,
    history: HistoryEnricher,
    org_security: OrgSecurityEnricher,
    stats: StatsEnricher,
    emitter: CorpusEmitter,
    uploader: Uploader<I, E>,
    progress: Arc<ProgressStore>,
    cache: Arc<CacheStore>,
    config: PipelineConfig,
    filters: EnumeratorFilters,
}

impl<I, E> Orchestrator<I, E>
where
    I: VectorIndexClient + Clone + 'static,
    E: Embedder + Clone + 'static,
{
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        enumerator: Enumerator,
        describer: Describer,
        automation: AutomationEnricher,
        field_security: FieldSecurityEnricher,
        history: HistoryEnricher,
        org_security: OrgSecurityEnricher,
        stats: StatsEnricher,
        emitter: CorpusEmitter,
        uploader: Uploader<I, E>,
        progress: Arc<ProgressStore>,
        cache: Arc<CacheStore>,
        config: PipelineConfig,
        filters: EnumeratorFilters,
    ) -> Self {
        Self {
            enumerator,
            describer,
            automation,
            field_security,
            history,
            org_security,
            stats,
            emitter,
            uploader,
            progress,
            cache,
            config,
            filters,
        }
    }

    /// Runs every phase in `requested`, in the dependency order fixed by
    /// [`Phase::ALL`].
    pub async fn run(&self, requested: &[Phase]) -> RunReport {
        let start = Instant::now();
        let mut report = RunReport::default();
        let mut quota_streak = 0u32;
        let mut records: HashMap<String, ObjectRecord> = HashMap::new();

        let phases: Vec<Phase> = Phase::ALL
            .into_iter()
            .filter(|p| requested.contains(p))
            .collect();

        let refs = match self.enumerator.enumerate(&self.filters).await {
            Ok(refs) => refs,
            Err(_err) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(error = %_err, "enumeration failed, aborting run");
                report.exit_code = 1;
                report.elapsed = start.elapsed();
                return report;
            }
        };
        report.enumerated = refs.len();
        #[cfg(feature = "tracing")]
        tracing::info!(refs = refs.len(), phases = ?phases, "enumeration complete");

        if phases.contains(&Phase::Describe) {
            let to_describe = self.refs_needing(Phase::Describe, &refs).await;
            let already_described: Vec<ObjectRef> = refs
                .iter()
                .filter(|object_ref| !to_describe.contains(object_ref))
                .cloned()
                .collect();

            let results = self.describer.describe_all(&to_describe).await;
            for (object_ref, result) in results {
                match result {
                    Ok(record) => {
                        quota_streak = 0;
                        let _ = self
                            .progress
                            .mark(object_ref.as_str(), Phase::Describe, ProgressState::Done, None)
                            .await;
                        records.insert(object_ref.into_string(), record);
                        report.described += 1;
                    }
                    Err(e) => {
                        quota_streak = bump_quota_streak(quota_streak, e.is_quota());
                        let _ = self
                            .progress
                            .mark(
                                object_ref.as_str(),
                                Phase::Describe,
                                ProgressState::Error,
                                Some(e.to_string()),
                            )
                            .await;
                        report.errored += 1;
                    }
                }
            }

            if quota_streak >= self.config.quota_wall_threshold {
                return self.halt_for_quota_wall(report, start).await;
            }

            // Refs already Done at Describe still need their ObjectRecord
            // for every later phase; the Describer's own cache makes this
            // free unless the cache entry has expired. A cache miss here
            // means the tenant schema needs re-describing, so it's folded
            // back into the ordinary error path rather than silently
            // dropping the ref.
            if !already_described.is_empty() {
                let cached = self.describer.describe_all(&already_described).await;
                for (object_ref, result) in cached {
                    match result {
                        Ok(record) => {
                            records.insert(object_ref.into_string(), record);
                        }
                        Err(e) => {
                            quota_streak = bump_quota_streak(quota_streak, e.is_quota());
                            let _ = self
                                .progress
                                .mark(
                                    object_ref.as_str(),
                                    Phase::Describe,
                                    ProgressState::Error,
                                    Some(e.to_string()),
                                )
                                .await;
                            report.errored += 1;
                        }
                    }
                }
                if quota_streak >= self.config.quota_wall_threshold {
                    return self.halt_for_quota_wall(report, start).await;
                }
            }
        }

        let mut record_values: Vec<ObjectRecord> = records.values().cloned().collect();

        for phase in &phases {
            let failures = match phase {
                Phase::Stats => self.stats.enrich(&mut record_values).await,
                Phase::Automation => self.automation.enrich(&mut record_values).await,
                // Field-level history rides along with the Security
                // phase: the CLI's phase selector has no separate slot
                // for it, and both are audit-adjacent per-field metadata.
                Phase::Security => {
                    let mut failures = self.field_security.enrich(&mut record_values).await;
                    failures.extend(self.history.enrich(&mut record_values).await);
                    failures
                }
                _ => continue,
            };
            report.enriched += record_values.len() - failures.len().min(record_values.len());
            for (object_ref, error) in failures {
                quota_streak = bump_quota_streak(quota_streak, error.is_quota());
                let _ = self
                    .progress
                    .mark(object_ref.clone(), *phase, ProgressState::Error, Some(error.to_string()))
                    .await;
                report.errored += 1;
            }
            if quota_streak >= self.config.quota_wall_threshold {
                return self.halt_for_quota_wall(report, start).await;
            }
        }

        if phases.contains(&Phase::OrgSecurity) {
            let (model, failures) = self.org_security.enrich().await;
            for (name, error) in failures {
                quota_streak = bump_quota_streak(quota_streak, error.is_quota());
                let _ = self
                    .progress
                    .mark(name, Phase::OrgSecurity, ProgressState::Error, Some(error.to_string()))
                    .await;
                report.errored += 1;
            }
            if let Err(_e) = output::write_security(&self.config.output_dir, &model).await {
                #[cfg(feature = "tracing")]
                tracing::warn!(error = %_e, "failed to write security.json");
            }
            if quota_streak >= self.config.quota_wall_threshold {
                return self.halt_for_quota_wall(report, start).await;
            }
        }

        for record in &mut record_values {
            record.finalize_hash();
        }

        let mut emitted_chunks = Vec::new();
        if phases.contains(&Phase::Emit) {
            let mut documents: Vec<(String, String)> = Vec::new();
            for record in &record_values {
                let emitted = self.emitter.emit(record);
                documents.push((record.object_ref.as_str().to_string(), emitted.document));
                emitted_chunks.extend(emitted.chunks);
            }
            emitted_chunks.sort_by(|a, b| {
                (a.metadata.object_ref.as_str(), a.metadata.part_index)
                    .cmp(&(b.metadata.object_ref.as_str(), b.metadata.part_index))
            });
            report.emitted_chunks = emitted_chunks.len();

            if let Err(_e) = output::write_schema(&self.config.output_dir, &record_values).await {
                #[cfg(feature = "tracing")]
                tracing::warn!(error = %_e, "failed to write schema.json");
            }
            if let Err(_e) = output::write_documents(&self.config.output_dir, &documents).await {
                #[cfg(feature = "tracing")]
                tracing::warn!(error = %_e, "failed to write per-object documents");
            }
            if let Err(_e) = output::write_corpus_jsonl(&self.config.output_dir, &emitted_chunks).await {
                #[cfg(feature = "tracing")]
                tracing::warn!(error = %_e, "failed to write corpus.jsonl");
            }
        }

        if phases.contains(&Phase::Upload) && !self.config.dry_run {
            let upload_report = self.uploader.upload(emitted_chunks, self.config.incremental).await;
            report.uploaded_refs = upload_report.upserted_refs;
            report.errored += upload_report.failed_refs.len();
        }

        let _ = self.progress.flush().await;
        report.cache_stats = Some(self.cache.stats());
        report.elapsed = start.elapsed();
        report.exit_code = 0;
        report
    }

    async fn refs_needing(&self, phase: Phase, refs: &[ObjectRef]) -> Vec<ObjectRef> {
        if !self.config.resume {
            return refs.to_vec();
        }
        let mut out = Vec::new();
        for object_ref in refs {
            let needs = self
                .progress
                .get(object_ref.as_str(), phase)
                .map(|record| record.needs_processing())
                .unwrap_or(true);
            if needs {
                out.push(object_ref.clone());
            }
        }
        out
    }

    /// Stops gracefully on a hard quota wall: flush Progress
    /// and Cache synchronously, report a resumable partial outcome.
    async fn halt_for_quota_wall(&self, mut report: RunReport, start: Instant) -> RunReport {
        #[cfg(feature = "tracing")]
        tracing::warn!(
            threshold = self.config.quota_wall_threshold,
            "quota wall hit, halting run for a resumable partial outcome"
        );
        let _ = self.progress.flush().await;
        report.cache_stats = Some(self.cache.stats());
        report.elapsed = start.elapsed();
        report.exit_code = EXIT_CODE_PARTIAL;
        report
    }
}

fn bump_quota_streak(streak: u32, is_quota: bool) -> u32 {
    if is_quota {
        streak + 1
    } else {
        0
    }
}
