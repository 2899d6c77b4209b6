//! Enumerator, Describer, Enrichers, Corpus Emitter, Incremental
//! Uploader, and Orchestrator: the components that turn a tenant's
//! object refs into a chunked, embedded, upserted corpus.

pub mod config;
pub mod describer;
pub mod emitter;
pub mod enrichers;
pub mod enumerator;
pub mod orchestrator;
pub mod output;
pub mod remote;
pub mod uploader;

pub use config::PipelineConfig;
pub use describer::Describer;
pub use emitter::{CorpusEmitter, EmittedObject};
pub use enrichers::{
    AutomationEnricher, FieldSecurityEnricher, HistoryEnricher, OrgSecurityEnricher, StatsEnricher,
};
pub use enumerator::{Enumerator, EnumeratorFilters};
pub use orchestrator::{Orchestrator, RunReport, EXIT_CODE_PARTIAL};
pub use remote::RemoteClient;
pub use uploader::{Embedder, IndexEntry, UploadReport, Uploader, UpsertItem, VectorIndexClient};
