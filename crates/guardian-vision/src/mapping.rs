//! Turning detector results into announcements.
//!
//! Each binding owns one mapper. Mappers are stateful: they remember when a
//! zone, a person or an object set was last announced so that periodic runs
//! do not repeat themselves. On-demand runs (voice commands) bypass those
//! cooldowns and always produce an answer.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use guardian_core::config::{AppConfig, FaceConfig, ObjectConfig, ObstacleConfig};
use guardian_core::detection::{DetectedObject, Obstacle, RecognizedFace, Zone};
use guardian_core::{Announcement, DetectionResult, Priority, Source};

/// Per-run information handed to a mapper.
#[derive(Debug, Clone, Copy)]
pub struct MapContext {
    pub now: Instant,
    /// The run was requested by the user rather than by the cadence timer.
    pub on_demand: bool,
}

impl MapContext {
    pub fn periodic(now: Instant) -> Self {
        Self { now, on_demand: false }
    }

    pub fn on_demand(now: Instant) -> Self {
        Self { now, on_demand: true }
    }
}

pub trait ResultMapper: Send {
    fn map(&mut self, result: DetectionResult, ctx: &MapContext) -> Vec<Announcement>;
}

impl<F> ResultMapper for F
where
    F: FnMut(DetectionResult, &MapContext) -> Vec<Announcement> + Send,
{
    fn map(&mut self, result: DetectionResult, ctx: &MapContext) -> Vec<Announcement> {
        self(result, ctx)
    }
}

/// The stock mapper for `source`, configured from `config`.
pub fn default_mapper(source: Source, config: &AppConfig) -> Box<dyn ResultMapper> {
    match source {
        Source::Obstacle => Box::new(ObstacleMapper::new(&config.obstacle)),
        Source::Face => Box::new(FaceMapper::new(&config.face)),
        Source::Object => Box::new(ObjectMapper::new(&config.object)),
        Source::Scene => Box::new(SceneMapper),
        Source::Ocr => Box::new(TextMapper),
        Source::Color => Box::new(ColorMapper),
        Source::Currency => Box::new(CurrencyMapper),
        Source::System => Box::new(|_: DetectionResult, _: &MapContext| -> Vec<Announcement> { Vec::new() }),
    }
}

fn unexpected(mapper: &str, result: &DetectionResult) -> Vec<Announcement> {
    tracing::warn!("{mapper} mapper ignoring {} result", result.kind());
    Vec::new()
}

fn at(text: impl Into<String>, priority: Priority, source: Source, ctx: &MapContext) -> Announcement {
    let announcement = Announcement::at(text, priority, source, ctx.now);
    if ctx.on_demand {
        announcement.on_request()
    } else {
        announcement
    }
}

pub struct ObstacleMapper {
    warning_cm: f32,
    minimum_cm: f32,
    alert_interval: Duration,
    last_alert: HashMap<Zone, Instant>,
}

impl ObstacleMapper {
    pub fn new(config: &ObstacleConfig) -> Self {
        Self {
            warning_cm: config.warning_distance_cm,
            minimum_cm: config.minimum_distance_cm,
            alert_interval: Duration::from_millis(config.alert_interval_ms),
            last_alert: HashMap::new(),
        }
    }

    fn describe(&self, obstacle: &Obstacle) -> String {
        let zone = obstacle.zone.as_str();
        let distance = obstacle.distance_cm;
        if distance <= self.minimum_cm {
            format!("Warning! Obstacle {zone}, {distance:.0} centimeters")
        } else {
            format!("Obstacle {zone}, {distance:.0} centimeters")
        }
    }

    fn on_demand(&self, mut obstacles: Vec<Obstacle>, ctx: &MapContext) -> Vec<Announcement> {
        obstacles.sort_by(|a, b| a.distance_cm.total_cmp(&b.distance_cm));
        match obstacles.first() {
            Some(closest) => vec![at(self.describe(closest), Priority::High, Source::Obstacle, ctx)],
            None => vec![at("Path is clear", Priority::Medium, Source::Obstacle, ctx)],
        }
    }
}

impl ResultMapper for ObstacleMapper {
    fn map(&mut self, result: DetectionResult, ctx: &MapContext) -> Vec<Announcement> {
        let mut obstacles = match result {
            DetectionResult::Obstacles(obstacles) => obstacles,
            other => return unexpected("obstacle", &other),
        };
        if ctx.on_demand {
            return self.on_demand(obstacles, ctx);
        }

        obstacles.sort_by(|a, b| a.distance_cm.total_cmp(&b.distance_cm));
        let mut out = Vec::new();
        for obstacle in obstacles {
            if !obstacle.in_path || obstacle.distance_cm > self.warning_cm {
                continue;
            }
            if let Some(last) = self.last_alert.get(&obstacle.zone) {
                if ctx.now.saturating_duration_since(*last) < self.alert_interval {
                    continue;
                }
            }
            let priority = if obstacle.distance_cm <= self.minimum_cm {
                Priority::Emergency
            } else {
                Priority::Critical
            };
            self.last_alert.insert(obstacle.zone, ctx.now);
            out.push(
                at(self.describe(&obstacle), priority, Source::Obstacle, ctx)
                    .with_dedup_key(obstacle.zone.as_str()),
            );
        }
        out
    }
}

pub struct FaceMapper {
    cooldown: Duration,
    announce_unknown: bool,
    last_greeted: HashMap<String, Instant>,
}

impl FaceMapper {
    pub fn new(config: &FaceConfig) -> Self {
        Self {
            cooldown: Duration::from_millis(config.cooldown_ms),
            announce_unknown: config.announce_unknown,
            last_greeted: HashMap::new(),
        }
    }

    fn cooled_down(&mut self, key: &str, now: Instant) -> bool {
        match self.last_greeted.get(key) {
            Some(last) if now.saturating_duration_since(*last) < self.cooldown => false,
            _ => {
                self.last_greeted.insert(key.to_string(), now);
                true
            }
        }
    }

    fn on_demand(faces: &[RecognizedFace], ctx: &MapContext) -> Vec<Announcement> {
        let mut known: Vec<&str> = faces.iter().filter_map(|f| f.name.as_deref()).collect();
        known.sort_unstable();
        known.dedup();
        let unknown = faces.iter().filter(|f| f.name.is_none()).count();
        let plural = if unknown > 1 { "s" } else { "" };

        let mut out = Vec::new();
        if !known.is_empty() {
            out.push(at(format!("I see {}", known.join(", ")), Priority::High, Source::Face, ctx));
            if unknown > 0 {
                out.push(at(format!("And {unknown} unknown person{plural}"), Priority::High, Source::Face, ctx));
            }
        } else if unknown > 0 {
            out.push(at(format!("I see {unknown} unknown person{plural}"), Priority::High, Source::Face, ctx));
        } else {
            out.push(at("No people detected", Priority::Medium, Source::Face, ctx));
        }
        out
    }
}

impl ResultMapper for FaceMapper {
    fn map(&mut self, result: DetectionResult, ctx: &MapContext) -> Vec<Announcement> {
        let faces = match result {
            DetectionResult::Faces(faces) => faces,
            other => return unexpected("face", &other),
        };
        if ctx.on_demand {
            return Self::on_demand(&faces, ctx);
        }

        let mut out = Vec::new();
        let mut unknown_seen = false;
        for face in &faces {
            match face.name.as_deref() {
                Some(name) => {
                    if self.cooled_down(name, ctx.now) {
                        out.push(
                            at(format!("Hello {name}"), Priority::High, Source::Face, ctx).with_dedup_key(name),
                        );
                    }
                }
                None => unknown_seen = true,
            }
        }
        // An empty key never collides with a person's name.
        if unknown_seen && self.announce_unknown && self.cooled_down("", ctx.now) {
            out.push(at("Unknown person ahead", Priority::Medium, Source::Face, ctx).with_dedup_key("unknown"));
        }
        out
    }
}

pub struct ObjectMapper {
    max_objects: usize,
    min_confidence: f32,
    repeat_interval: Duration,
    last: Option<(String, Instant)>,
}

impl ObjectMapper {
    pub fn new(config: &ObjectConfig) -> Self {
        Self {
            max_objects: config.max_objects.max(1),
            min_confidence: config.min_confidence,
            repeat_interval: Duration::from_millis(config.repeat_interval_ms),
            last: None,
        }
    }

    /// Top labels by confidence, grouped in first-seen order: `["2 chairs", "table"]`.
    pub fn summarize(&self, mut objects: Vec<DetectedObject>) -> Vec<String> {
        objects.retain(|o| o.confidence >= self.min_confidence);
        objects.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
        objects.truncate(self.max_objects);

        let mut groups: Vec<(String, usize)> = Vec::new();
        for object in objects {
            match groups.iter_mut().find(|(label, _)| *label == object.label) {
                Some((_, count)) => *count += 1,
                None => groups.push((object.label, 1)),
            }
        }
        groups
            .into_iter()
            .map(|(label, count)| if count > 1 { format!("{count} {label}s") } else { label })
            .collect()
    }
}

/// `"I see a"`, `"I see a and b"`, `"I see a, b, and c"`.
pub fn sentence(items: &[String]) -> Option<String> {
    match items {
        [] => None,
        [one] => Some(format!("I see {one}")),
        [a, b] => Some(format!("I see {a} and {b}")),
        [rest @ .., last] => Some(format!("I see {}, and {last}", rest.join(", "))),
    }
}

impl ResultMapper for ObjectMapper {
    fn map(&mut self, result: DetectionResult, ctx: &MapContext) -> Vec<Announcement> {
        let objects = match result {
            DetectionResult::Objects(objects) => objects,
            other => return unexpected("object", &other),
        };
        let summary = self.summarize(objects);
        let Some(text) = sentence(&summary) else {
            if ctx.on_demand {
                return vec![at("I don't see anything", Priority::Medium, Source::Object, ctx)];
            }
            return Vec::new();
        };

        let mut key_parts = summary.clone();
        key_parts.sort();
        let key = key_parts.join(",");
        if !ctx.on_demand {
            if let Some((last_key, last_at)) = &self.last {
                if *last_key == key && ctx.now.saturating_duration_since(*last_at) < self.repeat_interval {
                    return Vec::new();
                }
            }
        }
        self.last = Some((key.clone(), ctx.now));
        vec![at(text, Priority::Medium, Source::Object, ctx).with_dedup_key(key)]
    }
}

pub struct SceneMapper;

impl ResultMapper for SceneMapper {
    fn map(&mut self, result: DetectionResult, ctx: &MapContext) -> Vec<Announcement> {
        let description = match result {
            DetectionResult::Scene(description) => description,
            other => return unexpected("scene", &other),
        };
        if description.trim().is_empty() {
            return Vec::new();
        }
        // Asked-for descriptions must not sit behind routine chatter.
        let priority = if ctx.on_demand { Priority::Medium } else { Priority::Low };
        vec![at(description, priority, Source::Scene, ctx).with_dedup_key("scene")]
    }
}

pub struct TextMapper;

impl ResultMapper for TextMapper {
    fn map(&mut self, result: DetectionResult, ctx: &MapContext) -> Vec<Announcement> {
        let text = match result {
            DetectionResult::Text(text) => text,
            other => return unexpected("ocr", &other),
        };
        if text.trim().is_empty() {
            return vec![at("No text detected", Priority::Medium, Source::Ocr, ctx)];
        }
        vec![at(text, Priority::Medium, Source::Ocr, ctx)]
    }
}

pub struct ColorMapper;

impl ResultMapper for ColorMapper {
    fn map(&mut self, result: DetectionResult, ctx: &MapContext) -> Vec<Announcement> {
        let color = match result {
            DetectionResult::Color(color) => color,
            other => return unexpected("color", &other),
        };
        if color.trim().is_empty() {
            return Vec::new();
        }
        vec![at(format!("Color: {color}"), Priority::Medium, Source::Color, ctx)]
    }
}

pub struct CurrencyMapper;

impl ResultMapper for CurrencyMapper {
    fn map(&mut self, result: DetectionResult, ctx: &MapContext) -> Vec<Announcement> {
        match result {
            DetectionResult::Currency(Some(reading)) => vec![at(
                format!("{} {}", reading.amount, reading.currency),
                Priority::High,
                Source::Currency,
                ctx,
            )],
            DetectionResult::Currency(None) => {
                vec![at("No currency detected", Priority::Medium, Source::Currency, ctx)]
            }
            other => unexpected("currency", &other),
        }
    }
}
