//! Announcement type system.
//!
//! Every spoken message carries a priority, the detector that produced it and
//! an optional dedup key. Ordering inside the queue is derived from these.

use std::fmt;
use std::str::FromStr;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Urgency of an announcement, from least to most urgent.
///
/// `Ord` follows urgency, so `Priority::Emergency > Priority::Low`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    /// Ambient scene description.
    Low = 1,
    /// Generic object, text and color readouts.
    Medium = 2,
    /// Recognized people, currency, command responses.
    High = 3,
    /// Obstacles inside the warning distance.
    Critical = 4,
    /// Obstacles inside the minimum distance. Always interrupts speech.
    Emergency = 5,
}

impl Priority {
    pub const ALL: [Priority; 5] = [
        Priority::Low,
        Priority::Medium,
        Priority::High,
        Priority::Critical,
        Priority::Emergency,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
            Priority::Critical => "critical",
            Priority::Emergency => "emergency",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Priority::Low),
            "medium" => Ok(Priority::Medium),
            "high" => Ok(Priority::High),
            "critical" => Ok(Priority::Critical),
            "emergency" => Ok(Priority::Emergency),
            other => Err(format!("unknown priority: {other}")),
        }
    }
}

/// Which detector (or subsystem) produced an announcement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Obstacle,
    Face,
    Object,
    Scene,
    Ocr,
    Color,
    Currency,
    System,
}

impl Source {
    pub fn as_str(self) -> &'static str {
        match self {
            Source::Obstacle => "obstacle",
            Source::Face => "face",
            Source::Object => "object",
            Source::Scene => "scene",
            Source::Ocr => "ocr",
            Source::Color => "color",
            Source::Currency => "currency",
            Source::System => "system",
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single unit of spoken output.
#[derive(Debug, Clone)]
pub struct Announcement {
    pub id: Uuid,
    pub text: String,
    pub priority: Priority,
    pub source: Source,
    /// Collapses repeated announcements about the same subject.
    pub dedup_key: Option<String>,
    /// Monotonic creation time; drives FIFO order and cooldowns.
    pub created_at: Instant,
    /// Wall-clock creation time for logs and events.
    pub issued_at: DateTime<Utc>,
    /// Answer to an explicit user request. Never dropped as a repeat.
    pub requested: bool,
}

impl Announcement {
    pub fn new(text: impl Into<String>, priority: Priority, source: Source) -> Self {
        Self::at(text, priority, source, Instant::now())
    }

    /// Create an announcement with an explicit creation instant.
    pub fn at(text: impl Into<String>, priority: Priority, source: Source, created_at: Instant) -> Self {
        Self {
            id: Uuid::new_v4(),
            text: text.into().trim().to_string(),
            priority,
            source,
            dedup_key: None,
            created_at,
            issued_at: Utc::now(),
            requested: false,
        }
    }

    pub fn with_dedup_key(mut self, key: impl Into<String>) -> Self {
        self.dedup_key = Some(key.into());
        self
    }

    /// Mark as the answer to a voice command.
    pub fn on_request(mut self) -> Self {
        self.requested = true;
        self
    }

    /// Short form used in log lines.
    pub fn preview(&self) -> &str {
        match self.text.char_indices().nth(48) {
            Some((idx, _)) => &self.text[..idx],
            None => &self.text,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_orders_by_urgency() {
        assert!(Priority::Emergency > Priority::Critical);
        assert!(Priority::Critical > Priority::High);
        assert!(Priority::High > Priority::Medium);
        assert!(Priority::Medium > Priority::Low);
        let mut sorted = Priority::ALL;
        sorted.sort();
        assert_eq!(sorted, Priority::ALL);
    }

    #[test]
    fn priority_parses_case_insensitively() {
        assert_eq!("HIGH".parse::<Priority>().unwrap(), Priority::High);
        assert_eq!(" emergency ".parse::<Priority>().unwrap(), Priority::Emergency);
        assert!("urgent".parse::<Priority>().is_err());
    }

    #[test]
    fn priority_serde_lowercase() {
        let json = serde_json::to_string(&Priority::Critical).unwrap();
        assert_eq!(json, "\"critical\"");
        let back: Priority = serde_json::from_str("\"low\"").unwrap();
        assert_eq!(back, Priority::Low);
    }

    #[test]
    fn announcement_trims_text() {
        let a = Announcement::new("  I see a cup  ", Priority::Low, Source::Object);
        assert_eq!(a.text, "I see a cup");
        assert!(a.dedup_key.is_none());
        assert!(!a.requested);
        assert!(a.on_request().requested);
    }

    #[test]
    fn preview_truncates_long_text() {
        let long = "x".repeat(100);
        let a = Announcement::new(long, Priority::Low, Source::Ocr);
        assert_eq!(a.preview().len(), 48);
        let short = Announcement::new("hello", Priority::Low, Source::Ocr);
        assert_eq!(short.preview(), "hello");
    }
}
