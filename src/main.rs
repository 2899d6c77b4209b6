//! Entry point: parses CLI flags and environment, wires the full
//! dependency graph (Rate Limiter → Retry Engine → CLI Bridge, Cache
//! Store, Query Coalescer, Progress Store, Enumerator, Describer,
//! Enrichers, Corpus Emitter, Uploader), and runs the requested phases
//! through the Orchestrator.

mod clients;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;

use crm_bridge::CliBridge;
use crm_cache::CacheStore;
use crm_coalesce::{CoalesceConfig, QueryCoalescer};
use crm_pipeline::{
    AutomationEnricher, CorpusEmitter, Describer, Enumerator, EnumeratorFilters,
    FieldSecurityEnricher, HistoryEnricher, OrgSecurityEnricher, Orchestrator, PipelineConfig,
    RemoteClient, StatsEnricher, Uploader,
};
use crm_progress::{Phase, ProgressStore};
use crm_ratelimiter::{RateLimiter, RateLimiterConfigBuilder};
use crm_retry::{RetryConfigBuilder, RetryEngine};

use clients::{HttpEmbedder, HttpVectorIndex};

/// Extracts a CRM tenant's schema, automation, usage, and security model
/// and publishes it as a chunked, embedded vector corpus.
#[derive(Parser, Debug)]
#[command(name = "sfcorpus-ingest", version, about)]
struct Args {
    /// Binary name (or path) of the pre-authenticated tenant CLI every
    /// remote call shells out to.
    #[arg(long, env = "SFCORPUS_TENANT_CLI", default_value = "tenant-cli")]
    tenant_cli: String,

    /// Comma-delimited phase list, in any order — the Orchestrator always
    /// runs them in dependency order. `all` runs every phase.
    #[arg(long, env = "SFCORPUS_PHASES", default_value = "all", value_delimiter = ',')]
    phases: Vec<String>,

    #[arg(long, env = "SFCORPUS_CACHE_DIR", default_value = ".sfcorpus-cache")]
    cache_dir: PathBuf,

    #[arg(long, env = "SFCORPUS_OUTPUT_DIR", default_value = "./corpus-out")]
    output_dir: PathBuf,

    /// Hours a cached remote response stays valid before a re-fetch.
    #[arg(long, env = "SFCORPUS_CACHE_TTL_HOURS", default_value_t = 24)]
    cache_ttl_hours: u64,

    /// Deletes the cache directory before the run starts.
    #[arg(long)]
    clear_cache: bool,

    /// Disables resume: every ref is reprocessed regardless of prior
    /// Progress Store state.
    #[arg(long)]
    no_resume: bool,

    /// Runs every phase up to and including Emit but skips Upload.
    #[arg(long)]
    dry_run: bool,

    /// Always re-embeds and re-upserts every chunk instead of diffing
    /// against the vector index's current state.
    #[arg(long)]
    no_incremental: bool,

    /// Concurrent in-flight remote calls for the Describer and the
    /// per-object sampled-read and per-entity enrichers.
    #[arg(long, env = "SFCORPUS_MAX_WORKERS", default_value_t = 15)]
    max_workers: usize,

    /// Concurrent in-flight embed+upsert batches.
    #[arg(long, env = "SFCORPUS_UPSERT_WORKERS", default_value_t = 8)]
    upsert_workers: usize,

    /// Chunks per embed/upsert call submitted to the vector index.
    #[arg(long, env = "SFCORPUS_EMBED_BATCH_SIZE", default_value_t = 96)]
    embed_batch_size: usize,

    /// Rows sampled per object for field fill-rate and picklist stats.
    #[arg(long, env = "SFCORPUS_STATS_SAMPLE_SIZE", default_value_t = 100)]
    stats_sample_size: u32,

    /// Namespace prefix used when deriving chunk ids.
    #[arg(long, env = "SFCORPUS_NAMESPACE", default_value = "salesforce_object")]
    corpus_namespace: String,

    /// Upper bound on characters per emitted chunk.
    #[arg(long, env = "SFCORPUS_CHUNK_CHAR_BUDGET", default_value_t = 6_000)]
    chunk_char_budget: usize,

    /// Consecutive quota errors within a phase before the run halts
    /// gracefully and returns a resumable partial outcome.
    #[arg(long, env = "SFCORPUS_QUOTA_WALL_THRESHOLD", default_value_t = 10)]
    quota_wall_threshold: u32,

    #[arg(long, value_delimiter = ',')]
    noise_prefixes: Vec<String>,

    #[arg(long, value_delimiter = ',')]
    excluded_namespaces: Vec<String>,

    #[arg(long, env = "SFCORPUS_EMBEDDER_ENDPOINT")]
    embedder_endpoint: String,

    #[arg(long, env = "SFCORPUS_EMBEDDER_API_KEY")]
    embedder_api_key: String,

    #[arg(long, env = "SFCORPUS_INDEX_ENDPOINT")]
    index_endpoint: String,

    #[arg(long, env = "SFCORPUS_INDEX_API_KEY")]
    index_api_key: String,
}

fn parse_phases(raw: &[String]) -> Vec<Phase> {
    if raw.iter().any(|p| p.eq_ignore_ascii_case("all")) {
        return Phase::ALL.to_vec();
    }
    raw.iter()
        .filter_map(|p| match p.to_lowercase().as_str() {
            "enumerate" => Some(Phase::Enumerate),
            "describe" => Some(Phase::Describe),
            "stats" => Some(Phase::Stats),
            "automation" => Some(Phase::Automation),
            "security" => Some(Phase::Security),
            "org_security" | "orgsecurity" => Some(Phase::OrgSecurity),
            "emit" => Some(Phase::Emit),
            "upload" => Some(Phase::Upload),
            other => {
                tracing::warn!("ignoring unrecognized phase {other:?}");
                None
            }
        })
        .collect()
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    if args.clear_cache {
        match std::fs::remove_dir_all(&args.cache_dir) {
            Ok(()) => tracing::info!(dir = %args.cache_dir.display(), "cleared cache directory"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
    }
    std::fs::create_dir_all(&args.cache_dir)?;
    std::fs::create_dir_all(&args.output_dir)?;

    let phases = parse_phases(&args.phases);

    let config = PipelineConfig {
        tenant_cli: args.tenant_cli.clone(),
        cache_dir: args.cache_dir.clone(),
        output_dir: args.output_dir.clone(),
        progress_path: args.output_dir.join("progress.json"),
        cache_ttl: Duration::from_secs(args.cache_ttl_hours * 3600),
        describe_pool_size: args.max_workers,
        enricher_pool_size: args.max_workers,
        upsert_pool_size: args.upsert_workers,
        embed_batch_size: args.embed_batch_size,
        stats_sample_size: args.stats_sample_size,
        noise_prefixes: args.noise_prefixes.clone(),
        excluded_namespaces: args.excluded_namespaces.clone(),
        corpus_namespace: args.corpus_namespace.clone(),
        chunk_char_budget: args.chunk_char_budget,
        quota_wall_threshold: args.quota_wall_threshold,
        resume: !args.no_resume,
        dry_run: args.dry_run,
        incremental: !args.no_incremental,
        ..PipelineConfig::default()
    };

    let (rate_limiter, _rate_limiter_task) = RateLimiter::new(RateLimiterConfigBuilder::new().build());
    let retry_engine = RetryEngine::new(RetryConfigBuilder::new().build());
    let remote = RemoteClient::new(CliBridge::new(config.tenant_cli.clone()), rate_limiter, retry_engine);

    let describe_cache = Arc::new(CacheStore::new(
        config.cache_dir.clone(),
        config.cache_ttl,
        config.schema_version,
    ));
    let coalesce_cache = CacheStore::new(config.cache_dir.clone(), config.cache_ttl, config.schema_version);
    let coalescer = Arc::new(QueryCoalescer::new(
        coalesce_cache,
        CoalesceConfig::new(config.schema_version).default_batch_size(config.coalesce_batch_size),
    ));

    let progress = Arc::new(ProgressStore::open(config.progress_path.clone()).await?);

    let enumerator = Enumerator::new(remote.clone());
    let describer = Describer::new(
        remote.clone(),
        Arc::clone(&describe_cache),
        config.schema_version,
        config.describe_pool_size,
    );
    let automation = AutomationEnricher::new(remote.clone(), Arc::clone(&coalescer));
    let field_security = FieldSecurityEnricher::new(remote.clone(), Arc::clone(&coalescer));
    let history = HistoryEnricher::new(remote.clone(), Arc::clone(&coalescer));
    let stats = StatsEnricher::new(
        remote.clone(),
        Arc::clone(&coalescer),
        config.stats_sample_size,
        config.enricher_pool_size,
    );
    let org_security = OrgSecurityEnricher::new(remote.clone(), config.enricher_pool_size);
    let emitter = CorpusEmitter::new(config.corpus_namespace.clone(), config.chunk_char_budget);

    let http_client = reqwest::Client::builder().build()?;
    let embedder = HttpEmbedder::new(
        http_client.clone(),
        args.embedder_endpoint.clone(),
        args.embedder_api_key.clone(),
    );
    let index = HttpVectorIndex::new(http_client, args.index_endpoint.clone(), args.index_api_key.clone());
    let upload_retry = Arc::new(RetryEngine::new(RetryConfigBuilder::new().build()));
    let uploader = Uploader::new(
        index,
        embedder,
        upload_retry,
        Arc::clone(&progress),
        config.embed_batch_size,
        config.upsert_pool_size,
    );

    let filters = EnumeratorFilters {
        noise_prefixes: config.noise_prefixes.clone(),
        excluded_namespaces: config.excluded_namespaces.clone(),
    };

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
        config.clone(),
        filters,
    );

    let report = orchestrator.run(&phases).await;

    tracing::info!(
        enumerated = report.enumerated,
        described = report.described,
        enriched = report.enriched,
        emitted_chunks = report.emitted_chunks,
        uploaded_refs = report.uploaded_refs,
        errored = report.errored,
        elapsed_secs = report.elapsed.as_secs_f64(),
        "run finished"
    );
    if let Some(stats) = &report.cache_stats {
        tracing::info!(
            hits = stats.hits,
            misses = stats.misses,
            writes = stats.writes,
            bytes_saved = stats.bytes_saved,
            "cache stats"
        );
    }

    std::process::exit(report.exit_code);
}
