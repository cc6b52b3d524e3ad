use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::announcement::Priority;
use crate::error::ConfigError;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub audio: AudioConfig,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub camera: CameraConfig,
    #[serde(default)]
    pub obstacle: ObstacleConfig,
    #[serde(default)]
    pub face: FaceConfig,
    #[serde(default)]
    pub object: ObjectConfig,
    #[serde(default)]
    pub scene: SceneConfig,
    #[serde(default)]
    pub ocr: OnDemandConfig,
    #[serde(default)]
    pub color: OnDemandConfig,
    #[serde(default)]
    pub currency: OnDemandConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AudioConfig {
    /// `console` prints utterances, `piper` plays them through piper + aplay.
    #[serde(default = "default_engine")]
    pub engine: String,
    #[serde(default = "default_piper_binary")]
    pub piper_binary: String,
    #[serde(default)]
    pub piper_model: String,
    #[serde(default)]
    pub piper_config: String,
    /// How long the speaker blocks on an empty queue before re-checking.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Lowest priority allowed to cut off lower-priority speech.
    /// Emergency announcements interrupt regardless of this setting.
    #[serde(default = "default_interrupt_min_priority")]
    pub interrupt_min_priority: Priority,
    /// Speaking rate used by the console engine to pace output.
    #[serde(default = "default_words_per_minute")]
    pub words_per_minute: u32,
}

fn default_engine() -> String {
    "console".into()
}
fn default_piper_binary() -> String {
    "piper".into()
}
fn default_poll_interval_ms() -> u64 {
    500
}
fn default_interrupt_min_priority() -> Priority {
    Priority::High
}
fn default_words_per_minute() -> u32 {
    160
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            engine: default_engine(),
            piper_binary: default_piper_binary(),
            piper_model: String::new(),
            piper_config: String::new(),
            poll_interval_ms: default_poll_interval_ms(),
            interrupt_min_priority: default_interrupt_min_priority(),
            words_per_minute: default_words_per_minute(),
        }
    }
}

impl AudioConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct QueueConfig {
    /// Maximum number of pending announcements.
    #[serde(default = "default_capacity")]
    pub capacity: usize,
    /// An announcement identical to one spoken this recently is dropped (0 = disabled).
    #[serde(default = "default_anti_repeat_ms")]
    pub anti_repeat_ms: u64,
}

fn default_capacity() -> usize {
    10
}
fn default_anti_repeat_ms() -> u64 {
    2_000
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
            anti_repeat_ms: default_anti_repeat_ms(),
        }
    }
}

impl QueueConfig {
    pub fn anti_repeat(&self) -> Duration {
        Duration::from_millis(self.anti_repeat_ms)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SchedulerConfig {
    /// Consecutive detector failures before a binding is disabled.
    #[serde(default = "default_max_consecutive_failures")]
    pub max_consecutive_failures: u32,
    /// Time allowed for detector threads to stop before they are abandoned.
    #[serde(default = "default_shutdown_grace_ms")]
    pub shutdown_grace_ms: u64,
}

fn default_max_consecutive_failures() -> u32 {
    3
}
fn default_shutdown_grace_ms() -> u64 {
    2_000
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_consecutive_failures: default_max_consecutive_failures(),
            shutdown_grace_ms: default_shutdown_grace_ms(),
        }
    }
}

impl SchedulerConfig {
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CameraConfig {
    #[serde(default = "default_fps")]
    pub fps: u32,
    #[serde(default = "default_frame_width")]
    pub width: u32,
    #[serde(default = "default_frame_height")]
    pub height: u32,
}

fn default_fps() -> u32 {
    15
}
fn default_frame_width() -> u32 {
    640
}
fn default_frame_height() -> u32 {
    480
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            fps: default_fps(),
            width: default_frame_width(),
            height: default_frame_height(),
        }
    }
}

/// Obstacle detection thresholds.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObstacleConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_obstacle_cadence_ms")]
    pub cadence_ms: u64,
    /// In-path obstacles this close are announced as critical.
    #[serde(default = "default_warning_distance_cm")]
    pub warning_distance_cm: f32,
    /// In-path obstacles this close escalate to emergency.
    #[serde(default = "default_minimum_distance_cm")]
    pub minimum_distance_cm: f32,
    /// Minimum gap between two alerts for the same zone.
    #[serde(default = "default_alert_interval_ms")]
    pub alert_interval_ms: u64,
}

fn default_true() -> bool {
    true
}
fn default_obstacle_cadence_ms() -> u64 {
    500
}
fn default_warning_distance_cm() -> f32 {
    150.0
}
fn default_minimum_distance_cm() -> f32 {
    50.0
}
fn default_alert_interval_ms() -> u64 {
    2_000
}

impl Default for ObstacleConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            cadence_ms: default_obstacle_cadence_ms(),
            warning_distance_cm: default_warning_distance_cm(),
            minimum_distance_cm: default_minimum_distance_cm(),
            alert_interval_ms: default_alert_interval_ms(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FaceConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_face_cadence_ms")]
    pub cadence_ms: u64,
    /// The same person is greeted at most once per window.
    #[serde(default = "default_face_cooldown_ms")]
    pub cooldown_ms: u64,
    #[serde(default)]
    pub announce_unknown: bool,
}

fn default_face_cadence_ms() -> u64 {
    2_000
}
fn default_face_cooldown_ms() -> u64 {
    10_000
}

impl Default for FaceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            cadence_ms: default_face_cadence_ms(),
            cooldown_ms: default_face_cooldown_ms(),
            announce_unknown: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObjectConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_object_cadence_ms")]
    pub cadence_ms: u64,
    /// Number of top detections mentioned per announcement.
    #[serde(default = "default_max_objects")]
    pub max_objects: usize,
    #[serde(default = "default_min_confidence")]
    pub min_confidence: f32,
    /// An unchanged set of labels is not repeated within this window.
    #[serde(default = "default_object_repeat_ms")]
    pub repeat_interval_ms: u64,
}

fn default_object_cadence_ms() -> u64 {
    3_000
}
fn default_max_objects() -> usize {
    3
}
fn default_min_confidence() -> f32 {
    0.5
}
fn default_object_repeat_ms() -> u64 {
    10_000
}

impl Default for ObjectConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            cadence_ms: default_object_cadence_ms(),
            max_objects: default_max_objects(),
            min_confidence: default_min_confidence(),
            repeat_interval_ms: default_object_repeat_ms(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SceneConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_scene_cadence_ms")]
    pub cadence_ms: u64,
}

fn default_scene_cadence_ms() -> u64 {
    10_000
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            cadence_ms: default_scene_cadence_ms(),
        }
    }
}

/// Detectors that only run when asked for by a voice command.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OnDemandConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Default for OnDemandConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            audio: AudioConfig::default(),
            queue: QueueConfig::default(),
            scheduler: SchedulerConfig::default(),
            camera: CameraConfig::default(),
            obstacle: ObstacleConfig::default(),
            face: FaceConfig::default(),
            object: ObjectConfig::default(),
            scene: SceneConfig::default(),
            ocr: OnDemandConfig::default(),
            color: OnDemandConfig::default(),
            currency: OnDemandConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: AppConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load config with fallback chain: explicit path → ./config/default.toml → hardcoded defaults.
    pub fn load_or_default(explicit_path: Option<&Path>) -> Self {
        if let Some(path) = explicit_path {
            match Self::load(path) {
                Ok(cfg) => return cfg,
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {e}", path.display());
                }
            }
        }

        let default_path = Path::new("config/default.toml");
        if default_path.exists() {
            match Self::load(default_path) {
                Ok(cfg) => return cfg,
                Err(e) => {
                    tracing::warn!("Failed to load default config: {e}");
                }
            }
        }

        tracing::info!("Using hardcoded default configuration");
        Self::default()
    }

    /// Reject values the runtime cannot operate with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.queue.capacity == 0 {
            return Err(ConfigError::invalid("queue.capacity", "must be at least 1"));
        }
        if self.scheduler.max_consecutive_failures == 0 {
            return Err(ConfigError::invalid(
                "scheduler.max_consecutive_failures",
                "must be at least 1",
            ));
        }
        if self.audio.poll_interval_ms == 0 {
            return Err(ConfigError::invalid("audio.poll_interval_ms", "must be positive"));
        }
        if !matches!(self.audio.engine.as_str(), "console" | "piper") {
            return Err(ConfigError::invalid(
                "audio.engine",
                format!("unknown engine '{}'", self.audio.engine),
            ));
        }
        if self.camera.fps == 0 {
            return Err(ConfigError::invalid("camera.fps", "must be positive"));
        }

        let cadences = [
            ("obstacle.cadence_ms", self.obstacle.enabled, self.obstacle.cadence_ms),
            ("face.cadence_ms", self.face.enabled, self.face.cadence_ms),
            ("object.cadence_ms", self.object.enabled, self.object.cadence_ms),
            ("scene.cadence_ms", self.scene.enabled, self.scene.cadence_ms),
        ];
        for (field, enabled, cadence) in cadences {
            if enabled && cadence == 0 {
                return Err(ConfigError::invalid(field, "must be positive when enabled"));
            }
        }

        if self.obstacle.minimum_distance_cm > self.obstacle.warning_distance_cm {
            return Err(ConfigError::invalid(
                "obstacle.minimum_distance_cm",
                "must not exceed obstacle.warning_distance_cm",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn default_detector_cadences() {
        let config = AppConfig::default();
        assert_eq!(config.obstacle.cadence_ms, 500);
        assert_eq!(config.face.cadence_ms, 2_000);
        assert_eq!(config.object.cadence_ms, 3_000);
        assert_eq!(config.scene.cadence_ms, 10_000);
        assert_eq!(config.scheduler.max_consecutive_failures, 3);
        assert_eq!(config.audio.interrupt_min_priority, Priority::High);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let config = AppConfig::parse(
            "[queue]\ncapacity = 5\n\n[audio]\ninterrupt_min_priority = \"critical\"\n",
        )
        .unwrap();
        assert_eq!(config.queue.capacity, 5);
        assert_eq!(config.queue.anti_repeat_ms, 2_000);
        assert_eq!(config.audio.interrupt_min_priority, Priority::Critical);
        assert_eq!(config.audio.engine, "console");
        assert!(config.face.enabled);
    }

    #[test]
    fn zero_capacity_is_rejected() {
        let err = AppConfig::parse("[queue]\ncapacity = 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { ref field, .. } if field == "queue.capacity"));
    }

    #[test]
    fn inverted_obstacle_distances_are_rejected() {
        let err = AppConfig::parse(
            "[obstacle]\nwarning_distance_cm = 40.0\nminimum_distance_cm = 80.0\n",
        )
        .unwrap_err();
        assert!(err.to_string().contains("obstacle.minimum_distance_cm"));
    }

    #[test]
    fn disabled_detector_may_have_zero_cadence() {
        let config = AppConfig::parse("[scene]\nenabled = false\ncadence_ms = 0\n").unwrap();
        assert!(!config.scene.enabled);
    }

    #[test]
    fn unknown_engine_is_rejected() {
        assert!(AppConfig::parse("[audio]\nengine = \"espeak\"\n").is_err());
    }

    #[test]
    fn load_reads_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[scheduler]\nmax_consecutive_failures = 5").unwrap();
        let config = AppConfig::load(file.path()).unwrap();
        assert_eq!(config.scheduler.max_consecutive_failures, 5);
    }

    #[test]
    fn load_or_default_falls_back_on_bad_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "this is not toml [").unwrap();
        let config = AppConfig::load_or_default(Some(file.path()));
        assert_eq!(config.queue.capacity, AppConfig::default().queue.capacity);
    }
}
