use std::time::Duration;

use guardian_core::config::AppConfig;
use guardian_core::{Detector, Source};

use crate::mapping::{default_mapper, ResultMapper};

/// A detector plus everything the scheduler needs to drive it.
pub struct DetectorBinding {
    pub(crate) source: Source,
    pub(crate) detector: Box<dyn Detector>,
    pub(crate) cadence: Option<Duration>,
    pub(crate) enabled: bool,
    pub(crate) mapper: Box<dyn ResultMapper>,
    pub(crate) max_failures: u32,
}

impl DetectorBinding {
    /// An on-demand binding with the stock mapper and default limits.
    /// Use [`every`](Self::every) to give it a cadence.
    pub fn new(source: Source, detector: Box<dyn Detector>) -> Self {
        let defaults = AppConfig::default();
        Self {
            source,
            detector,
            cadence: None,
            enabled: true,
            mapper: default_mapper(source, &defaults),
            max_failures: defaults.scheduler.max_consecutive_failures,
        }
    }

    /// Binding configured from the matching `[obstacle]`/`[face]`/... section.
    pub fn from_config(source: Source, detector: Box<dyn Detector>, config: &AppConfig) -> Self {
        let (enabled, cadence_ms) = match source {
            Source::Obstacle => (config.obstacle.enabled, Some(config.obstacle.cadence_ms)),
            Source::Face => (config.face.enabled, Some(config.face.cadence_ms)),
            Source::Object => (config.object.enabled, Some(config.object.cadence_ms)),
            Source::Scene => (config.scene.enabled, Some(config.scene.cadence_ms)),
            Source::Ocr => (config.ocr.enabled, None),
            Source::Color => (config.color.enabled, None),
            Source::Currency => (config.currency.enabled, None),
            Source::System => (false, None),
        };
        Self {
            source,
            detector,
            // A zero cadence on a disabled detector means it only answers triggers.
            cadence: cadence_ms.filter(|ms| *ms > 0).map(Duration::from_millis),
            enabled,
            mapper: default_mapper(source, config),
            max_failures: config.scheduler.max_consecutive_failures,
        }
    }

    pub fn every(mut self, cadence: Duration) -> Self {
        self.cadence = Some(cadence);
        self
    }

    pub fn with_mapper(mut self, mapper: impl ResultMapper + 'static) -> Self {
        self.mapper = Box::new(mapper);
        self
    }

    pub fn with_max_failures(mut self, max_failures: u32) -> Self {
        self.max_failures = max_failures.max(1);
        self
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn source(&self) -> Source {
        self.source
    }

    pub fn cadence(&self) -> Option<Duration> {
        self.cadence
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }
}
