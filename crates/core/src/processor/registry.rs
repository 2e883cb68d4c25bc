//! Processor registration and selection.

use std::sync::Arc;

use super::{
    FfmpegRunner, ImageOptimizationProcessor, ImageVariationProcessor, Processor, ProcessorError,
    ProcessorKind, VideoOptimizationProcessor, VideoScreenshotProcessor, VideoTranscodeProcessor,
};
use crate::artifact::Artifact;
use crate::catalog::VariationDefinition;

/// The set of processors available to the pipeline, in registration order.
#[derive(Clone, Default)]
pub struct ProcessorRegistry {
    processors: Vec<Arc<dyn Processor>>,
}

impl ProcessorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in image and video processors.
    pub fn with_defaults(runner: Arc<FfmpegRunner>) -> Self {
        Self {
            processors: vec![
                Arc::new(ImageVariationProcessor::new()),
                Arc::new(ImageOptimizationProcessor::new()),
                Arc::new(VideoScreenshotProcessor::new(Arc::clone(&runner))),
                Arc::new(VideoTranscodeProcessor::new(Arc::clone(&runner))),
                Arc::new(VideoOptimizationProcessor::new(runner)),
            ],
        }
    }

    /// Add a processor. Names must be unique since jobs refer to processors by name.
    pub fn register(&mut self, processor: Arc<dyn Processor>) -> Result<(), ProcessorError> {
        if self.get(processor.name()).is_some() {
            return Err(ProcessorError::DuplicateProcessor(
                processor.name().to_string(),
            ));
        }
        self.processors.push(processor);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Processor>> {
        self.processors
            .iter()
            .find(|p| p.name() == name)
            .map(Arc::clone)
    }

    pub fn names(&self) -> Vec<&str> {
        self.processors.iter().map(|p| p.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.processors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.processors.is_empty()
    }

    /// The single creation processor for producing `dest` from `src`.
    ///
    /// No match is tolerated (`Ok(None)`): some variations are produced
    /// elsewhere. More than one match is a configuration error naming every
    /// matching processor.
    pub fn creation_processor_for(
        &self,
        artifact: &Artifact,
        src: Option<&VariationDefinition>,
        dest: &VariationDefinition,
    ) -> Result<Option<Arc<dyn Processor>>, ProcessorError> {
        let mut matches: Vec<&Arc<dyn Processor>> = self
            .processors
            .iter()
            .filter(|p| p.kind() == ProcessorKind::Creation)
            .filter(|p| p.can_process(artifact, src, Some(dest)))
            .collect();

        match matches.len() {
            0 => Ok(None),
            1 => Ok(matches.pop().map(Arc::clone)),
            _ => Err(ProcessorError::Ambiguous {
                artifact_id: artifact.id.clone(),
                src: src.map_or("original", |v| v.name.as_str()).to_string(),
                dest: dest.name.clone(),
                processors: matches.iter().map(|p| p.name().to_string()).collect(),
            }),
        }
    }

    /// Every optimization processor that applies to `variation` (`None` = the original).
    pub fn optimization_processors_for(
        &self,
        artifact: &Artifact,
        variation: Option<&VariationDefinition>,
    ) -> Vec<Arc<dyn Processor>> {
        self.processors
            .iter()
            .filter(|p| p.kind() == ProcessorKind::Optimization)
            .filter(|p| p.can_process(artifact, variation, variation))
            .map(Arc::clone)
            .collect()
    }
}

impl std::fmt::Debug for ProcessorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessorRegistry")
            .field("processors", &self.names())
            .finish()
    }
}
