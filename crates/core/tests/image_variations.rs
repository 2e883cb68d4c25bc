//! End-to-end run of the built-in catalog with the real image processors.

use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use variations_core::{
    testing::fixtures, ArtifactStore, ArtifactType, FfmpegRunner, JobQueueManager,
    MetadataRegistry, Pipeline, PipelineContext, ProcessorRegistry, SqliteArtifactStore,
    SqliteJobStore, StorageLayout, VariationCatalog, WorkerPool, WorkerPoolConfig,
};

#[tokio::test]
async fn test_backglass_variations_are_all_published() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let db_path = temp_dir.path().join("test.db");
    let runner = Arc::new(FfmpegRunner::with_defaults());

    let artifacts = Arc::new(SqliteArtifactStore::new(&db_path).unwrap());
    let ctx = Arc::new(PipelineContext::new(
        Arc::new(VariationCatalog::builtin().unwrap()),
        Arc::new(ProcessorRegistry::with_defaults(Arc::clone(&runner))),
        Arc::new(MetadataRegistry::with_defaults(runner)),
        Arc::new(JobQueueManager::new(Arc::new(
            SqliteJobStore::new(&db_path).unwrap(),
        ))),
        Arc::clone(&artifacts) as Arc<dyn ArtifactStore>,
        StorageLayout::new(temp_dir.path().join("media")),
    ));
    let pipeline = Pipeline::new(Arc::clone(&ctx));

    let artifact = fixtures::artifact("bg1", ArtifactType::Backglass, "image/png");
    artifacts.insert(&artifact).unwrap();
    let original = pipeline.original_path(&artifact);
    fixtures::write_png(&original, 96, 64).unwrap();

    let jobs = pipeline.process_file(&artifact, &original).unwrap();
    // Three roots plus the optimization of the png original.
    assert_eq!(jobs.len(), 4);

    let pool = WorkerPool::new(
        Arc::clone(&ctx),
        WorkerPoolConfig::default(),
        Duration::from_millis(20),
    );
    pool.start().await;

    for name in ["medium", "medium-2x", "small", "small-2x", "full"] {
        let path = pipeline
            .await_published(&artifact, Some(name), Some(Duration::from_secs(30)))
            .await
            .unwrap_or_else(|e| panic!("{} not published: {}", name, e));
        assert_eq!(path.extension().and_then(|e| e.to_str()), Some("jpg"));
        let decoded = image::open(&path).unwrap();
        // Contain never upscales the 96x64 original.
        assert_eq!((decoded.width(), decoded.height()), (96, 64));
    }

    for _ in 0..500 {
        let pending: usize = pipeline
            .stats()
            .unwrap()
            .iter()
            .map(|s| s.waiting + s.active)
            .sum();
        if pending == 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    pool.stop().await;

    let stored = artifacts.get("bg1").unwrap().unwrap();
    assert_eq!(stored.variations.len(), 5);
    assert_eq!(stored.variations["small"].metadata["width"], 96);
    assert_eq!(stored.variations["small"].mime_type, "image/jpeg");
    // The optimized original carries detailed metadata.
    assert!(stored.is_browsable());
    assert_eq!(stored.metadata.as_ref().unwrap()["kind"], "image");
}
