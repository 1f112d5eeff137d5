//! Document processing pipeline: routing, page fallback, chunking, and job orchestration.

pub mod chunking;
pub mod fallback;
pub mod lineage;
mod mappers;
pub mod router;
mod service;
pub mod store;
pub mod types;

pub use service::{
    Collaborators, DEFAULT_SEARCH_LIMIT, MAX_SEARCH_LIMIT, PipelineService, PipelineSettings,
    ProcessingApi, TEXT_PREVIEW_CHARS,
};
pub use store::{InMemoryJobStore, JobStore, JsonFileJobStore, StoreError};
pub use types::{
    ChunkRecord, ChunkingError, ErrorCategory, GraphRagAnswer, Job, JobResultView, JobStatus,
    JobStatusView, PageInfo, PageRecord, PipelineError, QueryError, SearchResponse, Stage,
    Strategy,
};
