//! Mock processor for testing.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{RwLock, Semaphore};

use crate::artifact::Artifact;
use crate::catalog::VariationDefinition;
use crate::processor::{Processor, ProcessorError, ProcessorKind};

type AcceptFn = dyn Fn(&Artifact, Option<&VariationDefinition>, Option<&VariationDefinition>) -> bool
    + Send
    + Sync;

/// A recorded `process` call for test assertions.
#[derive(Debug, Clone)]
pub struct RecordedProcess {
    pub artifact_id: String,
    pub src: PathBuf,
    pub dest: PathBuf,
    pub variation: Option<String>,
}

/// Mock implementation of the Processor trait.
///
/// Writes fixed bytes to the destination. By default a creation mock accepts
/// any destination variation and an optimization mock accepts everything;
/// narrow it with [`accepting`](Self::accepting).
pub struct MockProcessor {
    name: String,
    kind: ProcessorKind,
    accepts: Option<Arc<AcceptFn>>,
    output: Vec<u8>,
    /// Recorded calls.
    calls: Arc<RwLock<Vec<RecordedProcess>>>,
    /// If set, the next call fails with this error.
    next_error: Arc<RwLock<Option<ProcessorError>>>,
    /// Simulated processing duration in milliseconds.
    duration_ms: Arc<RwLock<u64>>,
    /// When set, each call waits for a permit before writing.
    gate: Option<Arc<Semaphore>>,
}

impl MockProcessor {
    pub fn new(name: impl Into<String>, kind: ProcessorKind) -> Self {
        Self {
            name: name.into(),
            kind,
            accepts: None,
            output: b"mock output".to_vec(),
            calls: Arc::new(RwLock::new(Vec::new())),
            next_error: Arc::new(RwLock::new(None)),
            duration_ms: Arc::new(RwLock::new(0)),
            gate: None,
        }
    }

    pub fn creation(name: impl Into<String>) -> Self {
        Self::new(name, ProcessorKind::Creation)
    }

    pub fn optimization(name: impl Into<String>) -> Self {
        Self::new(name, ProcessorKind::Optimization)
    }

    /// Only handle (artifact, src, dest) triples matching `f`.
    pub fn accepting<F>(mut self, f: F) -> Self
    where
        F: Fn(&Artifact, Option<&VariationDefinition>, Option<&VariationDefinition>) -> bool
            + Send
            + Sync
            + 'static,
    {
        self.accepts = Some(Arc::new(f));
        self
    }

    /// Bytes written to every destination.
    pub fn with_output(mut self, output: impl Into<Vec<u8>>) -> Self {
        self.output = output.into();
        self
    }

    /// Block each call until a permit is added to `gate`.
    pub fn with_gate(mut self, gate: Arc<Semaphore>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub async fn fail_next(&self, error: ProcessorError) {
        *self.next_error.write().await = Some(error);
    }

    pub async fn set_duration_ms(&self, ms: u64) {
        *self.duration_ms.write().await = ms;
    }

    pub async fn recorded_calls(&self) -> Vec<RecordedProcess> {
        self.calls.read().await.clone()
    }

    pub async fn call_count(&self) -> usize {
        self.calls.read().await.len()
    }

    /// Shares recorded state; useful after moving the mock into a registry.
    pub fn handle(&self) -> MockProcessorHandle {
        MockProcessorHandle {
            calls: Arc::clone(&self.calls),
            next_error: Arc::clone(&self.next_error),
        }
    }
}

/// Access to a [`MockProcessor`]'s state once it is owned by a registry.
#[derive(Clone)]
pub struct MockProcessorHandle {
    calls: Arc<RwLock<Vec<RecordedProcess>>>,
    next_error: Arc<RwLock<Option<ProcessorError>>>,
}

impl MockProcessorHandle {
    pub async fn recorded_calls(&self) -> Vec<RecordedProcess> {
        self.calls.read().await.clone()
    }

    pub async fn call_count(&self) -> usize {
        self.calls.read().await.len()
    }

    pub async fn fail_next(&self, error: ProcessorError) {
        *self.next_error.write().await = Some(error);
    }
}

#[async_trait]
impl Processor for MockProcessor {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ProcessorKind {
        self.kind
    }

    fn can_process(
        &self,
        artifact: &Artifact,
        src: Option<&VariationDefinition>,
        dest: Option<&VariationDefinition>,
    ) -> bool {
        match &self.accepts {
            Some(accepts) => accepts(artifact, src, dest),
            None => match self.kind {
                ProcessorKind::Creation => dest.is_some(),
                ProcessorKind::Optimization => true,
            },
        }
    }

    async fn process(
        &self,
        artifact: &Artifact,
        src: &Path,
        dest: &Path,
        variation: Option<&VariationDefinition>,
    ) -> Result<(), ProcessorError> {
        self.calls.write().await.push(RecordedProcess {
            artifact_id: artifact.id.clone(),
            src: src.to_path_buf(),
            dest: dest.to_path_buf(),
            variation: variation.map(|v| v.name.clone()),
        });

        if let Some(gate) = &self.gate {
            if let Ok(permit) = gate.acquire().await {
                permit.forget();
            }
        }

        let duration_ms = *self.duration_ms.read().await;
        if duration_ms > 0 {
            tokio::time::sleep(Duration::from_millis(duration_ms)).await;
        }

        if let Some(error) = self.next_error.write().await.take() {
            return Err(error);
        }

        if !tokio::fs::try_exists(src).await.unwrap_or(false) {
            return Err(ProcessorError::InputNotFound {
                path: src.to_path_buf(),
            });
        }
        tokio::fs::write(dest, &self.output).await?;
        Ok(())
    }
}
