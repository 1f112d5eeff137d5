//! Job orchestration: routing, extraction, chunking, indexing, and lineage for one document.

use crate::{
    config::Config,
    embedding::{EmbeddingClient, get_embedding_client},
    extraction::{
        ChatImageClient, ImageTranscriber, PageRenderer, PageText, PdfTextExtractor,
        PdftoppmRenderer, StructuredExtractor, TranscriptionMode, image_mime_for,
    },
    generation::{ChatCompletionGenerator, TextGenerator},
    graph::{GraphDocument, GraphStore, Neo4jService},
    logging::job_span,
    metrics::{MetricsSnapshot, PipelineMetrics},
    processing::{
        chunking::{chunk_text, locate_chunks},
        fallback::{FallbackEngine, needs_image},
        lineage::{LineageChunk, LineageManifest, LineageWriter, elapsed_seconds, local_timestamp},
        mappers::{PayloadContext, build_points, graphrag_context, graphrag_prompt, to_graph_chunk},
        router::choose_route,
        store::{JobStore, JsonFileJobStore, StoreError},
        types::{
            ChunkRecord, ChunkingError, ErrorCategory, GraphRagAnswer, Job, JobResultView,
            JobStatus, JobStatusView, PageInfo, PageRecord, PipelineError, QueryError,
            SearchResponse, Stage, Strategy,
        },
    },
    qdrant::{QdrantService, VectorStore, compute_content_hash, payload::current_timestamp_rfc3339},
    upstream::{RetryPolicy, RetryingClient},
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio::fs;
use tokio::task::JoinHandle;
use tracing::Instrument;
use uuid::Uuid;

/// Characters of the assembled text kept as the job preview.
pub const TEXT_PREVIEW_CHARS: usize = 300;
/// Default number of search hits.
pub const DEFAULT_SEARCH_LIMIT: usize = 5;
/// Largest accepted search limit.
pub const MAX_SEARCH_LIMIT: usize = 20;
const MAX_GRAPH_LIMIT: usize = 50;

/// External capabilities the orchestrator depends on.
#[derive(Clone)]
pub struct Collaborators {
    /// Per-page text from structured documents.
    pub extractor: Arc<dyn StructuredExtractor>,
    /// Page rasterizer used for OCR and vision fallbacks.
    pub renderer: Arc<dyn PageRenderer>,
    /// Plain-text OCR model.
    pub ocr: Arc<dyn ImageTranscriber>,
    /// Layout-aware vision model.
    pub vision: Arc<dyn ImageTranscriber>,
    /// Embedding service.
    pub embedder: Arc<dyn EmbeddingClient>,
    /// Vector store.
    pub vectors: Arc<dyn VectorStore>,
    /// Graph store.
    pub graph: Arc<dyn GraphStore>,
    /// Text generator for GraphRAG answers.
    pub generator: Arc<dyn TextGenerator>,
}

/// Filesystem layout and tuning knobs for the pipeline.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// Where uploads and rendered page images are written.
    pub upload_dir: PathBuf,
    /// Where lineage manifests are written.
    pub lineage_dir: PathBuf,
    /// Chunk window in characters.
    pub chunk_size: usize,
    /// Overlap between consecutive chunks in characters.
    pub chunk_overlap: usize,
    /// Page rendering resolution.
    pub render_dpi: u32,
    /// Whether lineage chunk entries carry their full text.
    pub include_chunk_text: bool,
}

impl PipelineSettings {
    /// Settings derived from the process configuration.
    pub fn from_config(config: &Config) -> Self {
        Self {
            upload_dir: config.upload_dir(),
            lineage_dir: config.lineage_dir(),
            chunk_size: config.chunk_size,
            chunk_overlap: config.chunk_overlap,
            render_dpi: config.render_dpi,
            include_chunk_text: true,
        }
    }
}

/// Abstraction over the pipeline used by the HTTP surface.
#[async_trait]
pub trait ProcessingApi: Send + Sync {
    /// Store an upload, create its job, and start processing in the background.
    async fn submit_job(
        &self,
        filename: Option<String>,
        bytes: Vec<u8>,
        route_hint: Option<String>,
    ) -> Result<String, PipelineError>;

    /// Status snapshot; unknown ids report `failed`.
    async fn job_status(&self, job_id: &str) -> Result<JobStatusView, StoreError>;

    /// Result summary; a placeholder until the job finishes.
    async fn job_result(&self, job_id: &str) -> Result<JobResultView, StoreError>;

    /// Similarity search over indexed chunks.
    async fn search(&self, query: &str, limit: Option<usize>)
    -> Result<SearchResponse, QueryError>;

    /// Keyword graph lookup followed by answer generation.
    async fn graphrag(
        &self,
        keyword: &str,
        limit: Option<usize>,
        fallback: Option<usize>,
    ) -> Result<GraphRagAnswer, QueryError>;

    /// Current pipeline counters.
    fn metrics_snapshot(&self) -> MetricsSnapshot;
}

/// Runs document jobs end to end and answers queries over the indexed output.
///
/// Cloning is cheap; every clone shares the job store, collaborators, and metrics, so a clone
/// can be moved into the task that processes a job.
#[derive(Clone)]
pub struct PipelineService {
    store: Arc<dyn JobStore>,
    collaborators: Collaborators,
    settings: Arc<PipelineSettings>,
    lineage: LineageWriter,
    metrics: Arc<PipelineMetrics>,
}

struct RouteDecision {
    route: Strategy,
}

struct ExtractionResult {
    route: Strategy,
    full_text: String,
    pages: Vec<PageRecord>,
    /// Byte range of each page's content in `full_text`, parallel to `pages`.
    spans: Vec<Range<usize>>,
    images_dir: Option<PathBuf>,
}

struct ChunkSet {
    route: Strategy,
    full_text: String,
    chunks: Vec<ChunkRecord>,
    page_info: PageInfo,
}

struct UpsertResult {
    chunks: Vec<ChunkRecord>,
    stored: usize,
}

struct JobOutcome {
    route: Strategy,
    chunks: usize,
    qdrant_points: usize,
    lineage_path: PathBuf,
    text_preview: String,
}

impl PipelineService {
    /// Assemble a service from explicit parts.
    pub fn new(
        store: Arc<dyn JobStore>,
        collaborators: Collaborators,
        settings: PipelineSettings,
    ) -> Self {
        let lineage = LineageWriter::new(&settings.lineage_dir, settings.include_chunk_text);
        Self {
            store,
            collaborators,
            settings: Arc::new(settings),
            lineage,
            metrics: Arc::new(PipelineMetrics::new()),
        }
    }

    /// Build the production service: JSON job table, HTTP collaborators, and `pdftoppm`.
    pub async fn from_config(config: &Config) -> Result<Self, PipelineError> {
        let http = RetryingClient::new(RetryPolicy {
            attempts: config.http_retry_attempts,
            base_delay: config.http_retry_base_delay,
        })?;

        tracing::info!(path = %config.job_table_path().display(), "Opening job table");
        let store = JsonFileJobStore::open(config.job_table_path()).await?;

        let collaborators = Collaborators {
            extractor: Arc::new(PdfTextExtractor),
            renderer: Arc::new(PdftoppmRenderer::new()),
            ocr: Arc::new(ChatImageClient::new(
                http.clone(),
                &config.olm_api_url,
                &config.olm_model,
                TranscriptionMode::Ocr,
            )),
            vision: Arc::new(ChatImageClient::new(
                http.clone(),
                &config.vlm_api_url,
                &config.vlm_model,
                TranscriptionMode::Vision,
            )),
            embedder: Arc::from(get_embedding_client(config, http.clone())),
            vectors: Arc::new(QdrantService::new(config)?),
            graph: Arc::new(Neo4jService::new(config)?),
            generator: Arc::new(ChatCompletionGenerator::from_config(config, http)),
        };

        Ok(Self::new(
            Arc::new(store),
            collaborators,
            PipelineSettings::from_config(config),
        ))
    }

    /// Persist an upload and create its `queued` job; returns the job id.
    pub async fn submit(
        &self,
        filename: Option<&str>,
        bytes: &[u8],
        route_hint: Option<String>,
    ) -> Result<String, PipelineError> {
        let job_id = Uuid::new_v4().simple().to_string();
        let filename = sanitize_filename(filename, &job_id);
        let input_path = self
            .settings
            .upload_dir
            .join(format!("{job_id}__{filename}"));

        fs::create_dir_all(&self.settings.upload_dir).await?;
        fs::write(&input_path, bytes).await?;

        let route_hint = route_hint
            .map(|hint| hint.trim().to_string())
            .filter(|hint| !hint.is_empty());
        let mut job = Job::queued(
            job_id.clone(),
            filename,
            input_path,
            route_hint,
            current_timestamp_rfc3339(),
        );
        job.input_sha256 = Some(compute_content_hash(bytes));
        self.store.create(job).await?;

        tracing::info!(job_id = %job_id, bytes = bytes.len(), "Job queued");
        Ok(job_id)
    }

    /// Process `job_id` on its own task.
    pub fn spawn(&self, job_id: String) -> JoinHandle<()> {
        let service = self.clone();
        let span = job_span(&job_id);
        tokio::spawn(
            async move {
                if let Err(error) = service.run_job(&job_id).await {
                    tracing::error!(error = %error, "Job store failed while processing job");
                }
            }
            .instrument(span),
        )
    }

    /// Run a queued job to a terminal state.
    ///
    /// Returns `None` without doing any work when the job is unknown or no longer `queued`.
    /// Job-level faults are recorded on the job; only job-store failures are returned.
    pub async fn run_job(&self, job_id: &str) -> Result<Option<Job>, StoreError> {
        let Some(job) = self.store.claim(job_id).await? else {
            tracing::debug!(job_id, "Job is not queued; skipping");
            return Ok(None);
        };

        let started = Instant::now();
        tracing::info!(job_id, filename = %job.filename, "Job started");

        let finished = match self.execute(&job, started).await {
            Ok(outcome) => {
                self.metrics
                    .record_finished(outcome.chunks as u64, outcome.qdrant_points as u64);
                tracing::info!(
                    job_id,
                    route = %outcome.route,
                    chunks = outcome.chunks,
                    qdrant_points = outcome.qdrant_points,
                    elapsed_sec = elapsed_seconds(started),
                    "Job finished"
                );
                self.store
                    .update(
                        job_id,
                        Box::new(move |job| {
                            job.status = JobStatus::Finished;
                            job.stage = Some(Stage::Finished);
                            job.route = Some(outcome.route);
                            job.chunks = Some(outcome.chunks);
                            job.qdrant_points = Some(outcome.qdrant_points);
                            job.lineage_path = Some(outcome.lineage_path);
                            job.text_preview = Some(outcome.text_preview);
                        }),
                    )
                    .await?
            }
            Err(error) => {
                self.metrics.record_failed();
                let message = error.job_message();
                tracing::error!(job_id, category = %error.category(), error = %error, "Job failed");
                self.store
                    .update(
                        job_id,
                        Box::new(move |job| {
                            job.status = JobStatus::Failed;
                            job.stage = Some(Stage::Failed);
                            job.error = Some(message);
                        }),
                    )
                    .await?
            }
        };

        Ok(Some(finished))
    }

    async fn execute(&self, job: &Job, started: Instant) -> Result<JobOutcome, PipelineError> {
        if !matches!(fs::try_exists(&job.input_path).await, Ok(true)) {
            return Err(PipelineError::InputMissing(job.input_path.clone()));
        }

        let decision = self.route(job).await?;

        self.set_stage(&job.job_id, Stage::Extract).await?;
        let extraction = self.extract(job, decision).await?;

        self.set_stage(&job.job_id, Stage::Chunking).await?;
        let chunk_set = self.chunk(extraction)?;
        tracing::debug!(job_id = %job.job_id, chunks = chunk_set.chunks.len(), "Chunking complete");

        let upserted = if chunk_set.chunks.is_empty() {
            tracing::info!(job_id = %job.job_id, "No text extracted; skipping indexing");
            UpsertResult {
                chunks: Vec::new(),
                stored: 0,
            }
        } else {
            let upserted = self.index(job, &chunk_set).await?;
            self.link_graph(job, chunk_set.route, &upserted).await?;
            upserted
        };

        self.set_stage(&job.job_id, Stage::Lineage).await?;
        let manifest = self.manifest(job, &chunk_set, &upserted, started);
        let lineage_path = self.lineage.write(&manifest).await?;

        Ok(JobOutcome {
            route: chunk_set.route,
            chunks: upserted.chunks.len(),
            qdrant_points: upserted.stored,
            lineage_path,
            text_preview: text_preview(&chunk_set.full_text),
        })
    }

    async fn set_stage(&self, job_id: &str, stage: Stage) -> Result<(), StoreError> {
        tracing::info!(job_id, stage = ?stage, "Job stage");
        self.store
            .update(job_id, Box::new(move |job| job.stage = Some(stage)))
            .await?;
        Ok(())
    }

    async fn set_route(&self, job_id: &str, route: Strategy) -> Result<(), StoreError> {
        self.store
            .update(job_id, Box::new(move |job| job.route = Some(route)))
            .await?;
        Ok(())
    }

    async fn route(&self, job: &Job) -> Result<RouteDecision, StoreError> {
        let route = choose_route(&job.input_path, &job.filename, job.route_hint.as_deref());
        tracing::info!(job_id = %job.job_id, route = %route, "Route selected");
        self.set_route(&job.job_id, route).await?;
        Ok(RouteDecision { route })
    }

    async fn extract(
        &self,
        job: &Job,
        decision: RouteDecision,
    ) -> Result<ExtractionResult, PipelineError> {
        match decision.route {
            Strategy::Structured => self.extract_structured(job).await,
            Strategy::Ocr => {
                let text = self.transcribe_input(self.collaborators.ocr.as_ref(), job).await?;
                if !text.is_empty() {
                    return Ok(single_page(Strategy::Ocr, text));
                }
                tracing::info!(job_id = %job.job_id, "OCR returned no text; reclassifying as vision");
                self.set_route(&job.job_id, Strategy::Vision).await?;
                let text = self
                    .transcribe_input(self.collaborators.vision.as_ref(), job)
                    .await?;
                Ok(single_page(Strategy::Vision, text))
            }
            Strategy::Vision => {
                let text = self
                    .transcribe_input(self.collaborators.vision.as_ref(), job)
                    .await?;
                Ok(single_page(Strategy::Vision, text))
            }
        }
    }

    async fn transcribe_input(
        &self,
        transcriber: &dyn ImageTranscriber,
        job: &Job,
    ) -> Result<String, PipelineError> {
        let bytes = fs::read(&job.input_path).await?;
        let text = transcriber
            .transcribe(&bytes, &image_mime_for(&job.input_path))
            .await?;
        Ok(text.trim().to_string())
    }

    async fn extract_structured(&self, job: &Job) -> Result<ExtractionResult, PipelineError> {
        let mut pages = self
            .collaborators
            .extractor
            .extract_pages(&job.input_path)
            .await?;
        if pages.is_empty() {
            pages.push(PageText {
                page: 1,
                text: String::new(),
            });
        }

        let (images, images_dir) = self.render_weak_pages(job, &pages).await;

        let engine = FallbackEngine::new(
            self.collaborators.ocr.as_ref(),
            self.collaborators.vision.as_ref(),
        );
        let mut records = Vec::with_capacity(pages.len());
        for page in &pages {
            let image = images.get(&page.page).map(PathBuf::as_path);
            let record = engine.resolve_page(page.page, &page.text, image).await;
            tracing::debug!(
                job_id = %job.job_id,
                page = record.page,
                used_route = %record.used_route,
                ocr_score = ?record.ocr_score,
                "Page resolved"
            );
            records.push(record);
        }

        let (full_text, spans) = assemble_pages(&records);
        Ok(ExtractionResult {
            route: Strategy::Structured,
            full_text,
            pages: records,
            spans,
            images_dir,
        })
    }

    /// Render only the pages whose baseline text needs an image. Failures leave every page on
    /// its baseline text.
    async fn render_weak_pages(
        &self,
        job: &Job,
        pages: &[PageText],
    ) -> (HashMap<u32, PathBuf>, Option<PathBuf>) {
        let wanted: Vec<u32> = pages
            .iter()
            .filter(|page| needs_image(&page.text))
            .map(|page| page.page)
            .collect();
        if wanted.is_empty() {
            return (HashMap::new(), None);
        }

        let dir = self
            .settings
            .upload_dir
            .join(format!("{}__{}_images", job.job_id, file_stem(&job.filename)));
        match self
            .collaborators
            .renderer
            .render_pages(&job.input_path, &dir, &wanted, self.settings.render_dpi)
            .await
        {
            Ok(rendered) => {
                tracing::debug!(job_id = %job.job_id, pages = rendered.len(), "Rendered page images");
                (rendered.into_iter().collect(), Some(dir))
            }
            Err(error) => {
                tracing::warn!(job_id = %job.job_id, error = %error, "Page rendering failed; keeping baseline text");
                (HashMap::new(), None)
            }
        }
    }

    fn chunk(&self, extraction: ExtractionResult) -> Result<ChunkSet, ChunkingError> {
        let ExtractionResult {
            route,
            full_text,
            mut pages,
            spans,
            images_dir,
        } = extraction;

        let mut chunks = Vec::new();
        for (page, span) in pages.iter_mut().zip(spans) {
            if span.end <= span.start {
                continue;
            }
            let pieces = chunk_text(
                &full_text[span.clone()],
                self.settings.chunk_size,
                self.settings.chunk_overlap,
            )?;
            for located in locate_chunks(&full_text, span.start, span.end, pieces) {
                let chunk_id = chunks.len();
                page.chunk_ids.push(chunk_id);
                chunks.push(ChunkRecord {
                    chunk_id,
                    page: page.page,
                    start: located.start,
                    end: located.end,
                    text: located.text,
                    qdrant_point_id: None,
                    used_route: page.used_route,
                    ocr_score: page.ocr_score,
                });
            }
        }

        let page_info = PageInfo {
            total_pages: pages.len(),
            scanned_pdf_detected: pages.iter().any(|page| page.ocr_score.is_some()),
            images_dir,
            pages,
        };
        Ok(ChunkSet {
            route,
            full_text,
            chunks,
            page_info,
        })
    }

    async fn index(&self, job: &Job, chunk_set: &ChunkSet) -> Result<UpsertResult, PipelineError> {
        self.set_stage(&job.job_id, Stage::Embedding).await?;
        self.collaborators.vectors.ensure_collection().await?;

        let texts: Vec<String> = chunk_set
            .chunks
            .iter()
            .map(|chunk| chunk.text.clone())
            .collect();
        let vectors = self.collaborators.embedder.generate_embeddings(texts).await?;
        if vectors.len() != chunk_set.chunks.len() {
            tracing::warn!(
                job_id = %job.job_id,
                category = %ErrorCategory::DataShapeMismatch,
                chunks = chunk_set.chunks.len(),
                vectors = vectors.len(),
                "Embedding count differs from chunk count; unmatched chunks are not stored"
            );
        }

        self.set_stage(&job.job_id, Stage::QdrantUpsert).await?;
        let context = PayloadContext {
            job_id: &job.job_id,
            filename: &job.filename,
            route: chunk_set.route,
        };
        let points = build_points(&context, &chunk_set.chunks, vectors);
        let ids = self.collaborators.vectors.upsert(points).await?;

        let mut chunks = chunk_set.chunks.clone();
        let mut ids = ids.into_iter();
        for chunk in &mut chunks {
            chunk.qdrant_point_id = ids.next();
        }
        let stored = chunks
            .iter()
            .filter(|chunk| chunk.qdrant_point_id.is_some())
            .count();
        tracing::info!(job_id = %job.job_id, stored, "Vectors upserted");

        Ok(UpsertResult { chunks, stored })
    }

    async fn link_graph(
        &self,
        job: &Job,
        route: Strategy,
        upserted: &UpsertResult,
    ) -> Result<(), PipelineError> {
        self.set_stage(&job.job_id, Stage::Neo4j).await?;
        let document = GraphDocument {
            job_id: job.job_id.clone(),
            filename: job.filename.clone(),
            input_path: job.input_path.display().to_string(),
            route: route.as_str().to_string(),
        };
        let nodes: Vec<_> = upserted.chunks.iter().map(to_graph_chunk).collect();
        self.collaborators
            .graph
            .upsert_document(&document, &nodes)
            .await?;
        Ok(())
    }

    fn manifest(
        &self,
        job: &Job,
        chunk_set: &ChunkSet,
        upserted: &UpsertResult,
        started: Instant,
    ) -> LineageManifest {
        let include_text = self.lineage.include_text();
        LineageManifest {
            job_id: job.job_id.clone(),
            filename: job.filename.clone(),
            route: chunk_set.route,
            input_path: job.input_path.clone(),
            input_sha256: job.input_sha256.clone(),
            chunk_size: self.settings.chunk_size,
            chunk_overlap: self.settings.chunk_overlap,
            chunk_count: upserted.chunks.len(),
            qdrant_points: upserted.stored,
            elapsed_sec: elapsed_seconds(started),
            created_at: local_timestamp(),
            chunks: upserted
                .chunks
                .iter()
                .map(|chunk| LineageChunk::from_record(chunk, include_text))
                .collect(),
            page_info: chunk_set.page_info.clone(),
        }
    }

    /// Embed `query` and return the nearest chunks.
    pub async fn search(
        &self,
        query: &str,
        limit: Option<usize>,
    ) -> Result<SearchResponse, QueryError> {
        if query.trim().is_empty() {
            return Err(QueryError::InvalidRequest("query must not be empty".into()));
        }
        let limit = limit
            .unwrap_or(DEFAULT_SEARCH_LIMIT)
            .clamp(1, MAX_SEARCH_LIMIT);

        let mut vectors = self
            .collaborators
            .embedder
            .generate_embeddings(vec![query.to_string()])
            .await?;
        let vector = vectors.pop().ok_or(QueryError::EmptyEmbedding)?;
        let hits = self.collaborators.vectors.search(vector, limit).await?;
        tracing::debug!(limit, hits = hits.len(), "Search completed");

        Ok(SearchResponse {
            query: query.to_string(),
            hits,
        })
    }

    /// Answer a keyword question from graph-linked chunks.
    ///
    /// When no chunk mentions the keyword, the first chunks of the most recent document are used.
    pub async fn graphrag(
        &self,
        keyword: &str,
        limit: Option<usize>,
        fallback: Option<usize>,
    ) -> Result<GraphRagAnswer, QueryError> {
        let keyword = keyword.trim();
        if keyword.is_empty() {
            return Err(QueryError::InvalidRequest("keyword must not be empty".into()));
        }
        let limit = limit.unwrap_or(DEFAULT_SEARCH_LIMIT).clamp(1, MAX_GRAPH_LIMIT);
        let fallback = fallback
            .unwrap_or(DEFAULT_SEARCH_LIMIT)
            .clamp(1, MAX_GRAPH_LIMIT);

        let mut hits = self
            .collaborators
            .graph
            .find_by_keyword(keyword, limit)
            .await?;
        let used_fallback = hits.is_empty();
        if used_fallback {
            tracing::debug!(keyword, "No keyword hits; using most recent document");
            hits = self
                .collaborators
                .graph
                .fallback_top_chunks(fallback, None)
                .await?;
        }

        let prompt = graphrag_prompt(keyword, &graphrag_context(&hits));
        let answer = self.collaborators.generator.generate(&prompt).await?;

        Ok(GraphRagAnswer {
            keyword: keyword.to_string(),
            used_fallback,
            hits,
            answer,
        })
    }

    /// Snapshot of a job record.
    pub async fn job(&self, job_id: &str) -> Result<Option<Job>, StoreError> {
        self.store.get(job_id).await
    }

    /// Return the current pipeline counters.
    pub fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }
}

#[async_trait]
impl ProcessingApi for PipelineService {
    async fn submit_job(
        &self,
        filename: Option<String>,
        bytes: Vec<u8>,
        route_hint: Option<String>,
    ) -> Result<String, PipelineError> {
        let job_id = self.submit(filename.as_deref(), &bytes, route_hint).await?;
        self.spawn(job_id.clone());
        Ok(job_id)
    }

    async fn job_status(&self, job_id: &str) -> Result<JobStatusView, StoreError> {
        Ok(match self.store.get(job_id).await? {
            Some(job) => JobStatusView::from(&job),
            None => JobStatusView::not_found(job_id),
        })
    }

    async fn job_result(&self, job_id: &str) -> Result<JobResultView, StoreError> {
        let job = self.store.get(job_id).await?;
        Ok(JobResultView::for_job(job_id, job.as_ref()))
    }

    async fn search(
        &self,
        query: &str,
        limit: Option<usize>,
    ) -> Result<SearchResponse, QueryError> {
        PipelineService::search(self, query, limit).await
    }

    async fn graphrag(
        &self,
        keyword: &str,
        limit: Option<usize>,
        fallback: Option<usize>,
    ) -> Result<GraphRagAnswer, QueryError> {
        PipelineService::graphrag(self, keyword, limit, fallback).await
    }

    fn metrics_snapshot(&self) -> MetricsSnapshot {
        PipelineService::metrics_snapshot(self)
    }
}

/// Join pages as `# Page <n>` blocks and record where each page's content lands.
fn assemble_pages(pages: &[PageRecord]) -> (String, Vec<Range<usize>>) {
    let mut full_text = String::new();
    let mut spans = Vec::with_capacity(pages.len());
    for page in pages {
        full_text.push_str(&format!("# Page {}\n", page.page));
        let start = full_text.len();
        full_text.push_str(page.text.trim());
        spans.push(start..full_text.len());
        full_text.push_str("\n\n");
    }
    full_text.truncate(full_text.trim_end().len());
    full_text.push('\n');
    (full_text, spans)
}

fn single_page(route: Strategy, text: String) -> ExtractionResult {
    let page = PageRecord {
        page: 1,
        text_chars: text.chars().count(),
        text: text.clone(),
        is_scanned: false,
        image: None,
        used_route: route,
        ocr_score: None,
        chunk_ids: Vec::new(),
    };
    let span = 0..text.len();
    ExtractionResult {
        route,
        full_text: text,
        pages: vec![page],
        spans: vec![span],
        images_dir: None,
    }
}

fn text_preview(text: &str) -> String {
    match text.char_indices().nth(TEXT_PREVIEW_CHARS) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

/// Keep only the final path component of a client-supplied filename.
fn sanitize_filename(raw: Option<&str>, job_id: &str) -> String {
    let name = raw
        .unwrap_or_default()
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim();
    if name.is_empty() || name == "." || name == ".." {
        format!("upload_{job_id}")
    } else {
        name.to_string()
    }
}

fn file_stem(filename: &str) -> String {
    Path::new(filename)
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| filename.to_string())
}
