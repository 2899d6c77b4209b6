use std::path::PathBuf;
use std::time::Duration;

/// Tunables for a pipeline run.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Binary name of the pre-authenticated tenant CLI.
    pub tenant_cli: String,
    pub cache_dir: PathBuf,
    pub output_dir: PathBuf,
    pub progress_path: PathBuf,
    pub schema_version: u32,
    pub cache_ttl: Duration,

    pub describe_pool_size: usize,
    pub enricher_pool_size: usize,
    pub upsert_pool_size: usize,

    pub coalesce_batch_size: usize,
    pub embed_batch_size: usize,
    pub stats_sample_size: u32,

    pub noise_prefixes: Vec<String>,
    pub excluded_namespaces: Vec<String>,

    pub corpus_namespace: String,
    /// Target upper bound on characters per chunk, standing in for the
    /// embedder's token cap.
    pub chunk_char_budget: usize,

    /// Consecutive quota errors within a phase before the Orchestrator
    /// halts it gracefully.
    pub quota_wall_threshold: u32,

    pub resume: bool,
    pub dry_run: bool,
    pub incremental: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            tenant_cli: "tenant-cli".to_string(),
            cache_dir: PathBuf::from(".cache"),
            output_dir: PathBuf::from("out"),
            progress_path: PathBuf::from("out/progress.json"),
            schema_version: 1,
            cache_ttl: crm_cache::DEFAULT_TTL,
            describe_pool_size: 15,
            enricher_pool_size: 15,
            upsert_pool_size: 8,
            coalesce_batch_size: crm_coalesce::DEFAULT_BATCH_SIZE,
            embed_batch_size: 96,
            stats_sample_size: 100,
            noise_prefixes: Vec::new(),
            excluded_namespaces: Vec::new(),
            corpus_namespace: "salesforce_object".to_string(),
            chunk_char_budget: 6_000,
            quota_wall_threshold: 10,
            resume: true,
            dry_run: false,
            incremental: true,
        }
    }
}
