//! Variation pipeline integration tests.
//!
//! These tests drive artifacts from `process_file` through workers to
//! published files, using mock processors so that job ordering can be
//! stepped through deterministically.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;
use tokio::sync::Semaphore;
use tokio_test::{assert_err, assert_ok};

use variations_core::{
    queue::{JobFilter, NewJob, QueueKey},
    storage,
    testing::{fixtures, MockExtractor, MockProcessor},
    Artifact, ArtifactStore, ArtifactType, Job, JobOutcome, JobQueueManager, JobStore,
    MetadataRegistry, MimeCategory, Pipeline, PipelineContext, PipelineError, ProcessorError,
    ProcessorKind, ProcessorRegistry, QueueError, QueueStats, SqliteArtifactStore,
    SqliteJobStore, Stage, StorageLayout, SyncError, VariationCatalog, Worker,
};

const CREATION_IMAGE: QueueKey = QueueKey {
    stage: Stage::Creation,
    category: MimeCategory::Image,
};
const SLOW_IMAGE: QueueKey = QueueKey {
    stage: Stage::Optimization,
    category: MimeCategory::Image,
};

/// Catalog with two root variations and one derived from "medium".
fn playfield_catalog() -> VariationCatalog {
    VariationCatalog::builder()
        .entry(
            ArtifactType::PlayfieldFs,
            MimeCategory::Image,
            vec![
                fixtures::resize("medium", "image/jpeg", 10, 400, 300),
                fixtures::resize("medium-2x", "image/jpeg", 15, 800, 600),
                fixtures::square("square", 40, "medium", 120),
            ],
        )
        .build()
        .expect("valid catalog")
}

/// Test helper wiring stores, registries and a storage root.
struct TestHarness {
    pipeline: Pipeline,
    ctx: Arc<PipelineContext>,
    artifacts: Arc<SqliteArtifactStore>,
    temp_dir: TempDir,
}

impl TestHarness {
    fn new(processors: Vec<MockProcessor>) -> Self {
        let mut registry = ProcessorRegistry::new();
        for processor in processors {
            registry
                .register(Arc::new(processor))
                .expect("unique processor names");
        }
        Self::with_registry(playfield_catalog(), registry, Self::mock_extractors())
    }

    fn mock_extractors() -> MetadataRegistry {
        let mut extractors = MetadataRegistry::new();
        extractors.register(Arc::new(MockExtractor::new()));
        extractors
    }

    fn with_registry(
        catalog: VariationCatalog,
        processors: ProcessorRegistry,
        extractors: MetadataRegistry,
    ) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let artifacts = Arc::new(
            SqliteArtifactStore::new(&temp_dir.path().join("test.db"))
                .expect("Failed to create artifact store"),
        );
        let jobs = Arc::new(
            SqliteJobStore::new(&temp_dir.path().join("test.db"))
                .expect("Failed to create job store"),
        );
        let ctx = Self::context(
            temp_dir.path(),
            catalog,
            processors,
            extractors,
            &artifacts,
            jobs,
        );

        Self {
            pipeline: Pipeline::new(Arc::clone(&ctx)),
            ctx,
            artifacts,
            temp_dir,
        }
    }

    fn context(
        root: &Path,
        catalog: VariationCatalog,
        processors: ProcessorRegistry,
        extractors: MetadataRegistry,
        artifacts: &Arc<SqliteArtifactStore>,
        jobs: Arc<dyn JobStore>,
    ) -> Arc<PipelineContext> {
        Arc::new(
            PipelineContext::new(
                Arc::new(catalog),
                Arc::new(processors),
                Arc::new(extractors),
                Arc::new(JobQueueManager::new(jobs)),
                Arc::clone(artifacts) as Arc<dyn ArtifactStore>,
                StorageLayout::new(root.join("media")),
            )
            .with_source_wait_timeout(Duration::from_secs(5))
            .with_poll_interval(Duration::from_millis(20)),
        )
    }

    /// A second process sharing this harness's database and storage root.
    fn peer(&self, processors: Vec<MockProcessor>) -> Arc<PipelineContext> {
        let jobs = Arc::new(
            SqliteJobStore::new(&self.root().join("test.db")).expect("Failed to open job store"),
        );
        self.peer_with_jobs(processors, jobs)
    }

    fn peer_with_jobs(
        &self,
        processors: Vec<MockProcessor>,
        jobs: Arc<dyn JobStore>,
    ) -> Arc<PipelineContext> {
        let mut registry = ProcessorRegistry::new();
        for processor in processors {
            registry
                .register(Arc::new(processor))
                .expect("unique processor names");
        }
        let artifacts = Arc::new(
            SqliteArtifactStore::new(&self.root().join("test.db"))
                .expect("Failed to open artifact store"),
        );
        Self::context(
            self.root(),
            playfield_catalog(),
            registry,
            Self::mock_extractors(),
            &artifacts,
            jobs,
        )
    }

    /// Store an artifact record and its original bytes.
    fn ingest(&self, artifact: &Artifact) -> PathBuf {
        self.artifacts.insert(artifact).expect("insert artifact");
        let path = self.pipeline.original_path(artifact);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, b"original bytes").unwrap();
        path
    }

    fn worker(&self) -> Worker {
        Worker::new(Arc::clone(&self.ctx))
    }

    /// Dequeue the next job of `queue` and run it.
    async fn run_next(&self, queue: QueueKey) -> (String, Option<String>, JobOutcome) {
        let job = self
            .ctx
            .queue
            .dequeue(queue)
            .expect("dequeue")
            .expect("a waiting job");
        let processor = job.processor.clone();
        let target = job.target().map(str::to_string);
        let outcome = self.worker().run_job(job).await;
        (processor, target, outcome)
    }

    fn total_pending(&self) -> usize {
        self.pipeline
            .stats()
            .unwrap()
            .iter()
            .map(|s| s.waiting + s.active)
            .sum()
    }

    fn root(&self) -> &Path {
        self.temp_dir.path()
    }
}

/// Job store whose first deletion-marker check passes, with the marker set
/// right after it, as if a deletion landed between the check and the rename.
struct MarkAfterFirstCheck {
    inner: SqliteJobStore,
    checked: AtomicBool,
}

impl MarkAfterFirstCheck {
    fn new(db: &Path) -> Self {
        Self {
            inner: SqliteJobStore::new(db).expect("Failed to open job store"),
            checked: AtomicBool::new(false),
        }
    }
}

impl JobStore for MarkAfterFirstCheck {
    fn push(&self, job: NewJob) -> Result<Job, QueueError> {
        self.inner.push(job)
    }

    fn pop(&self, queue: QueueKey) -> Result<Option<Job>, QueueError> {
        self.inner.pop(queue)
    }

    fn remove(&self, id: &str) -> Result<bool, QueueError> {
        self.inner.remove(id)
    }

    fn list(&self, filter: &JobFilter) -> Result<Vec<Job>, QueueError> {
        self.inner.list(filter)
    }

    fn count(&self, filter: &JobFilter) -> Result<usize, QueueError> {
        self.inner.count(filter)
    }

    fn remove_waiting(&self, artifact_id: &str) -> Result<Vec<Job>, QueueError> {
        self.inner.remove_waiting(artifact_id)
    }

    fn reset_active(&self) -> Result<usize, QueueError> {
        self.inner.reset_active()
    }

    fn stats(&self) -> Result<Vec<QueueStats>, QueueError> {
        self.inner.stats()
    }

    fn set_deletion_marker(&self, artifact_id: &str) -> Result<(), QueueError> {
        self.inner.set_deletion_marker(artifact_id)
    }

    fn has_deletion_marker(&self, artifact_id: &str) -> Result<bool, QueueError> {
        let marked = self.inner.has_deletion_marker(artifact_id)?;
        if !self.checked.swap(true, Ordering::SeqCst) {
            self.inner.set_deletion_marker(artifact_id)?;
        }
        Ok(marked)
    }

    fn clear_deletion_marker(&self, artifact_id: &str) -> Result<(), QueueError> {
        self.inner.clear_deletion_marker(artifact_id)
    }
}

fn playfield() -> Artifact {
    fixtures::artifact("pf1", ArtifactType::PlayfieldFs, "image/png")
}

fn resize() -> MockProcessor {
    MockProcessor::creation("resize")
}

/// Optimizes variations only, never the original.
fn optimize() -> MockProcessor {
    MockProcessor::optimization("optimize").accepting(|_, src, _| src.is_some())
}

async fn wait_for<F, Fut>(mut check: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..500 {
        if check().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not met in time");
}

fn temp_files(dir: &Path) -> Vec<PathBuf> {
    std::fs::read_dir(dir)
        .map(|entries| {
            entries
                .filter_map(|e| e.ok())
                .map(|e| e.path())
                .filter(|p| {
                    p.file_name()
                        .and_then(|n| n.to_str())
                        .map_or(false, |n| n.starts_with('.'))
                })
                .collect()
        })
        .unwrap_or_default()
}

#[tokio::test]
async fn test_playfield_chain() {
    let h = TestHarness::new(vec![resize(), optimize()]);
    let artifact = playfield();
    let original = h.ingest(&artifact);

    let jobs = h.pipeline.process_file(&artifact, &original).unwrap();
    let mut targets: Vec<_> = jobs.iter().filter_map(|j| j.target()).collect();
    targets.sort();
    assert_eq!(targets, vec!["medium", "medium-2x"]);
    assert!(jobs.iter().all(|j| j.queue == CREATION_IMAGE));
    assert_eq!(h.ctx.queue.pending("pf1", Some("square")).unwrap(), 0);

    // Lower priority number first.
    let (_, target, outcome) = h.run_next(CREATION_IMAGE).await;
    assert_eq!(target.as_deref(), Some("medium"));
    assert!(matches!(outcome, JobOutcome::Published { .. }));

    // Publishing "medium" queued "square" on the slow lane and an optimization.
    assert_eq!(h.ctx.queue.pending("pf1", Some("square")).unwrap(), 1);
    assert_eq!(h.ctx.queue.pending("pf1", Some("medium")).unwrap(), 1);
    let slow = h
        .ctx
        .queue
        .list(&variations_core::queue::JobFilter::for_artifact("pf1").with_queue(SLOW_IMAGE))
        .unwrap();
    let square = slow
        .iter()
        .find(|j| j.target() == Some("square"))
        .expect("square job");
    assert_eq!(square.kind, ProcessorKind::Creation);
    assert_eq!(square.src_variation.as_deref(), Some("medium"));

    let (_, target, _) = h.run_next(CREATION_IMAGE).await;
    assert_eq!(target.as_deref(), Some("medium-2x"));
    assert!(h.ctx.queue.dequeue(CREATION_IMAGE).unwrap().is_none());

    // Slow lane: square (40) before the optimizations (110, 115).
    let mut order = Vec::new();
    while let Some(job) = h.ctx.queue.dequeue(SLOW_IMAGE).unwrap() {
        order.push((job.processor.clone(), job.target().unwrap_or("original").to_string()));
        let outcome = h.worker().run_job(job).await;
        assert!(matches!(outcome, JobOutcome::Published { .. }), "{:?}", outcome);
    }
    assert_eq!(
        order,
        vec![
            ("resize".to_string(), "square".to_string()),
            ("optimize".to_string(), "medium".to_string()),
            ("optimize".to_string(), "medium-2x".to_string()),
            ("optimize".to_string(), "square".to_string()),
        ]
    );
    assert_eq!(h.total_pending(), 0);

    let stored = h.artifacts.get("pf1").unwrap().unwrap();
    let names: Vec<_> = stored.variations.keys().cloned().collect();
    assert_eq!(names, vec!["medium", "medium-2x", "square"]);
    assert_eq!(stored.variations["square"].metadata["width"], 100);
    for name in ["medium", "medium-2x", "square"] {
        let dir = h.root().join("media").join(name);
        assert!(storage::is_ready(&dir.join("pf1.jpg")).await);
        assert!(temp_files(&dir).is_empty(), "leftover temp files in {:?}", dir);
    }
}

#[tokio::test]
async fn test_await_before_publish() {
    let h = TestHarness::new(vec![resize(), optimize()]);
    let artifact = playfield();
    let original = h.ingest(&artifact);
    h.pipeline.process_file(&artifact, &original).unwrap();

    // "square" is not queued yet, but its ancestor is.
    let reader = {
        let pipeline = h.pipeline.clone();
        let artifact = artifact.clone();
        tokio::spawn(async move {
            pipeline
                .await_published(&artifact, Some("square"), Some(Duration::from_secs(5)))
                .await
        })
    };
    wait_for(|| async { !h.ctx.synchronizer.waiting_keys().is_empty() }).await;

    let pool = variations_core::WorkerPool::new(
        Arc::clone(&h.ctx),
        Default::default(),
        Duration::from_millis(20),
    );
    pool.start().await;

    let path = reader.await.unwrap().unwrap();
    assert_eq!(path, h.root().join("media/square/pf1.jpg"));
    assert!(storage::is_ready(&path).await);

    wait_for(|| async { h.total_pending() == 0 }).await;
    pool.stop().await;
    assert!(!pool.is_running());
    assert!(pool.status().pools.iter().all(|p| p.total_failed == 0));
}

#[tokio::test]
async fn test_fast_path_is_idempotent() {
    let h = TestHarness::new(vec![resize()]);
    let artifact = playfield();
    let original = h.ingest(&artifact);
    h.pipeline.process_file(&artifact, &original).unwrap();
    h.run_next(CREATION_IMAGE).await;

    for _ in 0..3 {
        let path = assert_ok!(
            h.pipeline
                .await_published(&artifact, Some("medium"), Some(Duration::from_millis(10)))
                .await
        );
        assert_eq!(path, h.root().join("media/medium/pf1.jpg"));
    }
    let original_path = assert_ok!(h.pipeline.await_published(&artifact, None, None).await);
    assert_eq!(original_path, original);
    assert!(h.ctx.synchronizer.waiting_keys().is_empty());
}

#[tokio::test]
async fn test_caller_errors() {
    let h = TestHarness::new(vec![resize()]);
    let artifact = playfield();
    h.ingest(&artifact);

    let err = assert_err!(
        h.pipeline
            .await_published(&artifact, Some("huge"), None)
            .await
    );
    assert!(matches!(err, SyncError::UnknownVariation { .. }));

    // Declared but neither present nor queued.
    let err = assert_err!(
        h.pipeline
            .await_published(&artifact, Some("medium"), None)
            .await
    );
    assert!(matches!(err, SyncError::NoSuchJob { .. }));
}

#[tokio::test]
async fn test_ambiguous_processors_queue_nothing() {
    let h = TestHarness::new(vec![resize(), MockProcessor::creation("resize-too")]);
    let artifact = playfield();
    let original = h.ingest(&artifact);

    let err = h.pipeline.process_file(&artifact, &original).unwrap_err();
    assert!(err.is_configuration());
    match err {
        PipelineError::Processor(ProcessorError::Ambiguous { processors, .. }) => {
            assert_eq!(processors, vec!["resize", "resize-too"]);
        }
        other => panic!("expected Ambiguous, got {:?}", other),
    }
    assert_eq!(h.total_pending(), 0);
}

#[tokio::test]
async fn test_unknown_artifact_type_fails_fast() {
    let h = TestHarness::new(vec![resize()]);
    let artifact = fixtures::artifact("b1", ArtifactType::Backglass, "image/png");
    let original = h.ingest(&artifact);

    let err = h.pipeline.process_file(&artifact, &original).unwrap_err();
    assert!(matches!(err, PipelineError::Catalog(_)));
    assert!(err.is_configuration());
}

#[tokio::test]
async fn test_deletion_during_active_job() {
    let gate = Arc::new(Semaphore::new(0));
    let creator = resize().with_gate(Arc::clone(&gate));
    let calls = creator.handle();
    let h = TestHarness::new(vec![creator, optimize()]);
    let artifact = playfield();
    let original = h.ingest(&artifact);
    h.pipeline.process_file(&artifact, &original).unwrap();

    let job = h.ctx.queue.dequeue(CREATION_IMAGE).unwrap().unwrap();
    let running = {
        let worker = h.worker();
        tokio::spawn(async move { worker.run_job(job).await })
    };
    wait_for(|| async { calls.call_count().await == 1 }).await;

    let report = h.pipeline.delete_artifact(&artifact, false).await.unwrap();
    assert_eq!(report.cancelled_jobs, 1);
    assert_eq!(report.active_jobs, 1);
    assert!(report.marked);
    assert!(report.removed_files.is_empty());
    assert!(original.exists());

    gate.add_permits(1);
    let outcome = running.await.unwrap();
    assert_eq!(outcome, JobOutcome::Discarded);

    let medium_dir = h.root().join("media/medium");
    assert!(!medium_dir.join("pf1.jpg").exists());
    assert!(temp_files(&medium_dir).is_empty());
    assert_eq!(h.total_pending(), 0);
    assert!(!h.ctx.queue.is_marked_deleted("pf1").unwrap());
}

#[tokio::test]
async fn test_marker_blocks_publish_and_chaining() {
    let h = TestHarness::new(vec![resize(), optimize()]);
    let artifact = playfield();
    let original = h.ingest(&artifact);
    h.pipeline.process_file(&artifact, &original).unwrap();

    let job = h.ctx.queue.dequeue(CREATION_IMAGE).unwrap().unwrap();
    h.ctx.queue.mark_deleted("pf1").unwrap();
    let outcome = h.worker().run_job(job).await;

    assert_eq!(outcome, JobOutcome::Aborted);
    assert!(!h.root().join("media/medium/pf1.jpg").exists());
    assert_eq!(h.ctx.queue.pending("pf1", Some("square")).unwrap(), 0);
    assert!(!h.ctx.queue.is_marked_deleted("pf1").unwrap());
}

#[tokio::test]
async fn test_deletion_during_publish_removes_output() {
    let h = TestHarness::new(vec![resize(), optimize()]);
    let artifact = playfield();
    let original = h.ingest(&artifact);
    h.pipeline.process_file(&artifact, &original).unwrap();

    let store = Arc::new(MarkAfterFirstCheck::new(&h.root().join("test.db")));
    let racing = h.peer_with_jobs(vec![resize(), optimize()], store);
    let job = racing.queue.dequeue(CREATION_IMAGE).unwrap().unwrap();
    let canonical = job.dest_path.clone();

    let outcome = Worker::new(Arc::clone(&racing)).run_job(job).await;

    assert_eq!(outcome, JobOutcome::Aborted);
    assert!(!canonical.exists());
    assert!(temp_files(canonical.parent().unwrap()).is_empty());
    // Nothing chained from a file that was never kept.
    assert_eq!(h.ctx.queue.pending("pf1", Some("square")).unwrap(), 0);
}

#[tokio::test]
async fn test_failure_reaches_dependent_waiters() {
    let creator = resize();
    let control = creator.handle();
    let h = TestHarness::new(vec![creator]);
    let artifact = playfield();
    let original = h.ingest(&artifact);
    h.pipeline.process_file(&artifact, &original).unwrap();

    let reader = {
        let pipeline = h.pipeline.clone();
        let artifact = artifact.clone();
        tokio::spawn(async move {
            pipeline
                .await_published(&artifact, Some("square"), Some(Duration::from_secs(5)))
                .await
        })
    };
    wait_for(|| async { !h.ctx.synchronizer.waiting_keys().is_empty() }).await;

    control
        .fail_next(ProcessorError::failed("decoder exploded", None))
        .await;
    let (_, target, outcome) = h.run_next(CREATION_IMAGE).await;
    assert_eq!(target.as_deref(), Some("medium"));
    assert!(matches!(outcome, JobOutcome::Failed { .. }));

    let err = reader.await.unwrap().unwrap_err();
    assert!(matches!(err, SyncError::Failed { .. }), "{:?}", err);
    // No retry: the failed job is gone and nothing was chained.
    assert_eq!(h.ctx.queue.pending("pf1", Some("medium")).unwrap(), 0);
    assert_eq!(h.ctx.queue.pending("pf1", Some("square")).unwrap(), 0);
}

#[tokio::test]
async fn test_unpublished_file_is_never_visible() {
    let gate = Arc::new(Semaphore::new(0));
    let creator = resize().with_gate(Arc::clone(&gate));
    let calls = creator.handle();
    let h = TestHarness::new(vec![creator]);
    let artifact = playfield();
    let original = h.ingest(&artifact);
    h.pipeline.process_file(&artifact, &original).unwrap();

    let job = h.ctx.queue.dequeue(CREATION_IMAGE).unwrap().unwrap();
    let canonical = job.dest_path.clone();
    let running = {
        let worker = h.worker();
        tokio::spawn(async move { worker.run_job(job).await })
    };
    wait_for(|| async { calls.call_count().await == 1 }).await;

    assert!(!storage::is_ready(&canonical).await);
    let recorded = calls.recorded_calls().await;
    assert_ne!(recorded[0].dest, canonical);
    assert_eq!(recorded[0].dest.parent(), canonical.parent());

    gate.add_permits(1);
    assert!(matches!(running.await.unwrap(), JobOutcome::Published { .. }));
    assert!(storage::is_ready(&canonical).await);
    assert!(!recorded[0].dest.exists());
}

#[tokio::test]
async fn test_reader_sees_publish_from_another_process() {
    let reader = TestHarness::new(vec![resize()]);
    let worker_ctx = reader.peer(vec![resize()]);
    let artifact = playfield();
    let original = reader.ingest(&artifact);
    reader.pipeline.process_file(&artifact, &original).unwrap();

    let waiting = {
        let pipeline = reader.pipeline.clone();
        let artifact = artifact.clone();
        tokio::spawn(async move {
            pipeline
                .await_published(&artifact, Some("medium"), Some(Duration::from_secs(5)))
                .await
        })
    };
    wait_for(|| async { !reader.ctx.synchronizer.waiting_keys().is_empty() }).await;

    let job = worker_ctx.queue.dequeue(CREATION_IMAGE).unwrap().unwrap();
    let outcome = Worker::new(Arc::clone(&worker_ctx)).run_job(job).await;
    let JobOutcome::Published { path } = outcome else {
        panic!("expected publish, got {:?}", outcome);
    };

    let published = assert_ok!(waiting.await.unwrap());
    assert_eq!(published, path);
    assert!(reader.ctx.synchronizer.waiting_keys().is_empty());
}

#[tokio::test]
async fn test_missing_artifact_is_discarded() {
    let h = TestHarness::new(vec![resize()]);
    let artifact = playfield();
    let original = h.ingest(&artifact);
    h.pipeline.process_file(&artifact, &original).unwrap();
    h.artifacts.delete("pf1").unwrap();

    let (_, _, outcome) = h.run_next(CREATION_IMAGE).await;
    assert_eq!(outcome, JobOutcome::Discarded);
    assert_eq!(h.ctx.queue.pending("pf1", Some("medium")).unwrap(), 0);
}

#[tokio::test]
async fn test_recovered_jobs_run_after_restart() {
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("queue.db");
    let artifact = playfield();
    {
        let queue = JobQueueManager::new(Arc::new(SqliteJobStore::new(&db).unwrap()));
        let medium = fixtures::resize("medium", "image/jpeg", 10, 1, 1);
        queue
            .enqueue(
                Stage::Creation,
                &resize(),
                &artifact,
                Path::new("original/pf1.png"),
                Path::new("medium/pf1.jpg"),
                None,
                Some(&medium),
            )
            .unwrap();
        // Claimed by a process that then crashed.
        assert!(queue.dequeue(CREATION_IMAGE).unwrap().is_some());
    }

    let queue = JobQueueManager::new(Arc::new(SqliteJobStore::new(&db).unwrap()));
    assert!(queue.dequeue(CREATION_IMAGE).unwrap().is_none());
    assert_eq!(queue.recover_stalled().unwrap(), 1);
    let job = queue.dequeue(CREATION_IMAGE).unwrap().unwrap();
    assert_eq!(job.target(), Some("medium"));
}
