//! Scan → persist → enrich pipeline.
//!
//! ```text
//! scanner ──(bounded)──> persist consumer ──(bounded task queue)──> N workers
//!                        probe + upsert                 cover → artist → album → commit
//! ```
//!
//! In streaming mode every persisted record that still needs enrichment is
//! pushed straight onto the task queue. In two-phase mode the whole scan is
//! persisted first and a second pass pages pending records out of the
//! catalog ([`Pipeline::drain_backlog`]). Both producers block when the
//! queue is full, so memory stays bounded by the queue capacity.
//!
//! Workers share one receiver. Within a task the stages run strictly in
//! order; a failing stage is logged and the task dropped, leaving the record
//! at its persisted status so a later run picks it up again.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use futures::StreamExt;
use sqlx::sqlite::SqlitePool;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::config::{Config, PipelineConfig, PipelineMode};
use crate::cover::{self, CoverExtractor, ToolExtractor};
use crate::db::catalog::{self, AlbumUpsert, ArtistUpsert};
use crate::db::tracks::{self, Enrichment};
use crate::db::record_cover_art;
use crate::enrichment::{ArtistLookup, MusicBrainzClient};
use crate::error::{Error, Result};
use crate::metadata::{LoftyTagReader, TagReader};
use crate::model::{MediaFileRecord, TrackStatus};
use crate::probe::{FfprobeProber, MediaProber};
use crate::scanner;
use crate::store::ContentStore;

/// Upper bound on the worker count.
pub const MAX_WORKERS: usize = 64;

/// Parse a worker count from user input.
///
/// Non-numeric input falls back to 1 with a warning; values are clamped to
/// `1..=MAX_WORKERS`.
pub fn parse_worker_count(input: &str) -> usize {
    match input.trim().parse::<i64>() {
        Ok(n) if n < 1 => {
            warn!(target: "pipeline", requested = n, "Worker count below 1, using 1");
            1
        }
        Ok(n) if n > MAX_WORKERS as i64 => {
            warn!(target: "pipeline", requested = n, max = MAX_WORKERS, "Worker count too high, clamping");
            MAX_WORKERS
        }
        Ok(n) => n as usize,
        Err(_) => {
            warn!(target: "pipeline", input, "Invalid worker count, using 1");
            1
        }
    }
}

/// Steps of one enrichment task, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    ExtractingArt,
    ResolvingArtist,
    ResolvingAlbum,
    Committing,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::ExtractingArt => "extracting-art",
            Stage::ResolvingArtist => "resolving-artist",
            Stage::ResolvingAlbum => "resolving-album",
            Stage::Committing => "committing",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A task that failed at `stage`.
#[derive(Debug)]
pub struct TaskFailure {
    pub stage: Stage,
    pub error: Error,
}

trait AtStage<T> {
    fn at(self, stage: Stage) -> std::result::Result<T, TaskFailure>;
}

impl<T> AtStage<T> for Result<T> {
    fn at(self, stage: Stage) -> std::result::Result<T, TaskFailure> {
        self.map_err(|error| TaskFailure { stage, error })
    }
}

/// Counters for one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Records produced by the scanner
    pub scanned: usize,
    /// Records written to the catalog
    pub persisted: usize,
    /// Records the catalog rejected
    pub persist_failures: usize,
    /// Files the scanner skipped
    pub skipped: usize,
    /// Tasks handed to the workers
    pub enqueued: usize,
    /// Tasks that reached `cover`
    pub enriched: usize,
    /// Tasks abandoned for this run
    pub failed: usize,
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "scanned {} (skipped {}), persisted {} ({} failed), enqueued {}, enriched {}, failed {}",
            self.scanned,
            self.skipped,
            self.persisted,
            self.persist_failures,
            self.enqueued,
            self.enriched,
            self.failed
        )
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct WorkerStats {
    enriched: usize,
    failed: usize,
}

/// Everything a worker needs, shared by all workers.
struct WorkerContext {
    pool: SqlitePool,
    store: ContentStore,
    extractor: Arc<dyn CoverExtractor>,
    enricher: Option<Arc<dyn ArtistLookup>>,
    upsert_attempts: u32,
}

/// The configured pipeline.
pub struct Pipeline {
    pool: SqlitePool,
    store: ContentStore,
    workers: usize,
    settings: PipelineConfig,
    tag_reader: Arc<dyn TagReader>,
    prober: Option<Arc<dyn MediaProber>>,
    extractor: Arc<dyn CoverExtractor>,
    enricher: Option<Arc<dyn ArtistLookup>>,
}

impl Pipeline {
    /// A pipeline with the default collaborators: lofty tags, tool-based
    /// cover extraction, no probing and no enrichment.
    pub fn new(pool: SqlitePool, store: ContentStore, workers: usize, settings: PipelineConfig) -> Self {
        Self {
            pool,
            store,
            workers: workers.clamp(1, MAX_WORKERS),
            settings,
            tag_reader: Arc::new(LoftyTagReader),
            prober: None,
            extractor: Arc::new(ToolExtractor::default()),
            enricher: None,
        }
    }

    /// A pipeline wired from the application config.
    ///
    /// # Errors
    ///
    /// Returns an error if enrichment is enabled but the HTTP client cannot
    /// be built.
    pub fn from_config(
        pool: SqlitePool,
        store: ContentStore,
        workers: usize,
        config: &Config,
    ) -> Result<Self> {
        let prober: Option<Arc<dyn MediaProber>> = config
            .tools
            .probe
            .then(|| Arc::new(FfprobeProber::new(&config.tools.ffprobe)) as Arc<dyn MediaProber>);

        let enricher: Option<Arc<dyn ArtistLookup>> = if config.enrichment.enabled {
            Some(Arc::new(MusicBrainzClient::new(&config.enrichment)?))
        } else {
            None
        };

        Ok(Self::new(pool, store, workers, config.pipeline.clone())
            .with_tag_reader(Arc::new(LoftyTagReader))
            .with_prober(prober)
            .with_extractor(Arc::from(cover::extractor_for(&config.tools)))
            .with_enricher(enricher))
    }

    pub fn with_tag_reader(mut self, tag_reader: Arc<dyn TagReader>) -> Self {
        self.tag_reader = tag_reader;
        self
    }

    pub fn with_prober(mut self, prober: Option<Arc<dyn MediaProber>>) -> Self {
        self.prober = prober;
        self
    }

    pub fn with_extractor(mut self, extractor: Arc<dyn CoverExtractor>) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn with_enricher(mut self, enricher: Option<Arc<dyn ArtistLookup>>) -> Self {
        self.enricher = enricher;
        self
    }

    /// Scan `root`, persist every record and enrich the pending ones.
    ///
    /// # Errors
    ///
    /// Returns an error if the scan root cannot be walked. Work already
    /// queued is finished first, so everything persisted up to that point
    /// is still enriched.
    pub async fn run(&self, root: &Path) -> Result<RunSummary> {
        info!(
            target: "pipeline",
            root = %root.display(),
            workers = self.workers,
            mode = ?self.settings.mode,
            "Starting run"
        );

        let summary = match self.settings.mode {
            PipelineMode::Streaming => self.run_streaming(root).await?,
            PipelineMode::TwoPhase => self.run_two_phase(root).await?,
        };

        info!(target: "pipeline", %summary, "Run finished");
        Ok(summary)
    }

    /// Enqueue every pending record in the catalog and enrich it.
    ///
    /// Records are read page by page while the workers consume, so the
    /// backlog never has to fit in memory.
    pub async fn drain_backlog(&self) -> Result<RunSummary> {
        let (task_tx, workers) = self.spawn_workers();
        let mut summary = RunSummary::default();
        let page_size = self.settings.enqueue_page_size.max(1);
        let mut after_id = 0;

        let enqueue_result = async {
            'pages: loop {
                let page = tracks::pending_page(&self.pool, after_id, page_size).await?;
                let Some(last_id) = page.last().and_then(|r| r.id) else {
                    break;
                };
                after_id = last_id;

                for record in page {
                    if task_tx.send(record).await.is_err() {
                        error!(target: "pipeline", "All workers exited, stopping enqueue");
                        break 'pages;
                    }
                    summary.enqueued += 1;
                }
            }
            Ok::<(), Error>(())
        }
        .await;

        drop(task_tx);
        let stats = join_workers(workers).await;
        summary.enriched = stats.enriched;
        summary.failed = stats.failed;

        enqueue_result?;
        info!(target: "pipeline", enqueued = summary.enqueued, enriched = summary.enriched, failed = summary.failed, "Backlog drained");
        Ok(summary)
    }

    async fn run_streaming(&self, root: &Path) -> Result<RunSummary> {
        let scan = scanner::scan(root.to_path_buf(), self.tag_reader.clone(), self.settings.scan_buffer);
        let (records, done) = scan.into_stream();
        let mut records = Box::pin(records);
        let (task_tx, workers) = self.spawn_workers();
        let mut summary = RunSummary::default();

        while let Some(mut record) = records.next().await {
            summary.scanned += 1;
            let Some(status) = self.persist(&mut record, &mut summary).await else {
                continue;
            };
            if !status.is_pending() {
                continue;
            }
            if task_tx.send(record).await.is_err() {
                error!(target: "pipeline", "All workers exited, stopping enqueue");
                break;
            }
            summary.enqueued += 1;
        }

        // Unblocks the scanner if the loop stopped early
        drop(records);
        drop(task_tx);
        let stats = join_workers(workers).await;
        summary.enriched = stats.enriched;
        summary.failed = stats.failed;

        summary.skipped = scan_outcome(done).await?.skipped;
        Ok(summary)
    }

    async fn run_two_phase(&self, root: &Path) -> Result<RunSummary> {
        let scan = scanner::scan(root.to_path_buf(), self.tag_reader.clone(), self.settings.scan_buffer);
        let (records, done) = scan.into_stream();
        let mut records = std::pin::pin!(records);
        let mut summary = RunSummary::default();

        while let Some(mut record) = records.next().await {
            summary.scanned += 1;
            self.persist(&mut record, &mut summary).await;
        }
        summary.skipped = scan_outcome(done).await?.skipped;

        let backlog = self.drain_backlog().await?;
        summary.enqueued = backlog.enqueued;
        summary.enriched = backlog.enriched;
        summary.failed = backlog.failed;
        Ok(summary)
    }

    /// Probe and upsert one scanned record. Returns the persisted status.
    async fn persist(&self, record: &mut MediaFileRecord, summary: &mut RunSummary) -> Option<TrackStatus> {
        if let Some(prober) = &self.prober {
            let prober = prober.clone();
            let path = record.path();
            let probed = tokio::task::spawn_blocking(move || prober.probe(&path))
                .await
                .map_err(|e| Error::TaskJoin(e.to_string()))
                .and_then(|r| r);
            match probed {
                Ok(report) => {
                    if record.tags.album_artist.is_none() {
                        record.tags.album_artist = report.album_artist().map(str::to_string);
                    }
                    record.probe = Some(report);
                }
                Err(e) => {
                    warn!(target: "pipeline", path = %record.path().display(), error = %e, "Probe failed, persisting without it");
                }
            }
        }

        match tracks::upsert_scanned(&self.pool, record).await {
            Ok((id, status)) => {
                record.id = Some(id);
                record.status = status;
                summary.persisted += 1;
                debug!(target: "pipeline", id, %status, path = %record.path().display(), "Persisted");
                Some(status)
            }
            Err(e) => {
                summary.persist_failures += 1;
                error!(target: "pipeline", path = %record.path().display(), error = %e, "Failed to persist record");
                None
            }
        }
    }

    fn spawn_workers(&self) -> (mpsc::Sender<MediaFileRecord>, JoinSet<WorkerStats>) {
        let capacity = self.settings.queue_capacity.unwrap_or(self.workers).max(1);
        let (task_tx, task_rx) = mpsc::channel(capacity);
        let task_rx = Arc::new(Mutex::new(task_rx));

        let ctx = Arc::new(WorkerContext {
            pool: self.pool.clone(),
            store: self.store.clone(),
            extractor: self.extractor.clone(),
            enricher: self.enricher.clone(),
            upsert_attempts: self.settings.upsert_attempts,
        });

        let mut set = JoinSet::new();
        for worker in 0..self.workers {
            set.spawn(worker_loop(worker, ctx.clone(), task_rx.clone()));
        }
        (task_tx, set)
    }
}

async fn scan_outcome(
    done: tokio::sync::oneshot::Receiver<Result<scanner::ScanSummary>>,
) -> Result<scanner::ScanSummary> {
    done.await
        .map_err(|_| Error::TaskJoin("scanner exited without reporting".to_string()))?
}

async fn join_workers(mut set: JoinSet<WorkerStats>) -> WorkerStats {
    let mut total = WorkerStats::default();
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok(stats) => {
                total.enriched += stats.enriched;
                total.failed += stats.failed;
            }
            Err(e) => error!(target: "pipeline::worker", error = %e, "Worker panicked"),
        }
    }
    total
}

async fn worker_loop(
    worker: usize,
    ctx: Arc<WorkerContext>,
    tasks: Arc<Mutex<mpsc::Receiver<MediaFileRecord>>>,
) -> WorkerStats {
    let mut stats = WorkerStats::default();
    loop {
        let next = tasks.lock().await.recv().await;
        let Some(record) = next else {
            break;
        };

        let path = record.path();
        match process(&ctx, record).await {
            Ok(()) => {
                stats.enriched += 1;
                debug!(target: "pipeline::worker", worker, path = %path.display(), "Enriched");
            }
            Err(failure) => {
                stats.failed += 1;
                warn!(
                    target: "pipeline::worker",
                    worker,
                    path = %path.display(),
                    stage = %failure.stage,
                    error = %failure.error,
                    "Task failed"
                );
            }
        }
    }
    debug!(target: "pipeline::worker", worker, enriched = stats.enriched, failed = stats.failed, "Worker done");
    stats
}

/// Run one task through every stage.
async fn process(ctx: &WorkerContext, record: MediaFileRecord) -> std::result::Result<(), TaskFailure> {
    let id = record
        .id
        .ok_or_else(|| Error::invalid_argument("task record was never persisted"))
        .at(Stage::Committing)?;

    let blob = {
        let store = ctx.store.clone();
        let extractor = ctx.extractor.clone();
        let path = record.path();
        tokio::task::spawn_blocking(move || cover::extract_and_store(&store, extractor.as_ref(), &path))
            .await
            .map_err(|e| Error::TaskJoin(e.to_string()))
            .and_then(|r| r)
            .at(Stage::ExtractingArt)?
    };
    record_cover_art(&ctx.pool, &blob).await.at(Stage::ExtractingArt)?;

    let payload = lookup_artist(ctx, &record).await;
    let artist_id = catalog::resolve(&ctx.pool, &ArtistUpsert::for_record(&record, payload), ctx.upsert_attempts)
        .await
        .at(Stage::ResolvingArtist)?;

    let album = AlbumUpsert::for_record(&record, artist_id, Some(blob.fingerprint.to_string()));
    let album_id = catalog::resolve(&ctx.pool, &album, ctx.upsert_attempts)
        .await
        .at(Stage::ResolvingAlbum)?;

    let cover_path = blob
        .relative_path
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/");
    let enrichment = Enrichment {
        cover_hash: blob.fingerprint.into_string(),
        cover_path,
        artist_id,
        album_id,
    };
    tracks::commit_enrichment(&ctx.pool, id, &enrichment)
        .await
        .at(Stage::Committing)
}

/// Best-effort external lookup; failures resolve the artist without a payload.
async fn lookup_artist(ctx: &WorkerContext, record: &MediaFileRecord) -> Option<serde_json::Value> {
    let enricher = ctx.enricher.as_ref()?;
    let mbid = record.musicbrainz_artist_id()?;
    match enricher.lookup_artist(mbid).await {
        Ok(payload) => Some(payload),
        Err(e) => {
            warn!(target: "pipeline::worker", artist = record.artist_name(), mbid, error = %e, "Artist lookup failed");
            None
        }
    }
}


/// Property-based tests using proptest
#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        /// Any integer input lands in range
        #[test]
        fn worker_count_always_in_range(n in any::<i64>()) {
            let workers = parse_worker_count(&n.to_string());
            prop_assert!((1..=MAX_WORKERS).contains(&workers));
        }

        /// In-range values pass through unchanged
        #[test]
        fn worker_count_in_range_is_identity(n in 1usize..=MAX_WORKERS) {
            prop_assert_eq!(parse_worker_count(&n.to_string()), n);
        }

        /// Arbitrary text never panics and never leaves the range
        #[test]
        fn worker_count_from_text(s in "\\PC*") {
            let workers = parse_worker_count(&s);
            prop_assert!((1..=MAX_WORKERS).contains(&workers));
        }
    }
}
