use guardian_audio::AnnouncementQueue;
use guardian_core::{Announcement, Priority, Source};

use crate::error::SchedulerError;
use crate::scheduler::SchedulerHandle;

pub const HELP_TEXT: &str = "Available commands: read text, describe scene, identify people, detect color, identify money, check obstacles, repeat, stop";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoiceCommand {
    ReadText,
    DescribeScene,
    IdentifyPeople,
    DetectColor,
    IdentifyMoney,
    CheckObstacles,
    Help,
    Stop,
    Exit,
    Repeat,
}

/// Matched in order; the first keyword contained in the utterance wins.
const KEYWORDS: &[(&str, VoiceCommand)] = &[
    ("read text", VoiceCommand::ReadText),
    ("what do you see", VoiceCommand::DescribeScene),
    ("who is here", VoiceCommand::IdentifyPeople),
    ("what color", VoiceCommand::DetectColor),
    ("identify money", VoiceCommand::IdentifyMoney),
    ("any obstacles", VoiceCommand::CheckObstacles),
    ("help", VoiceCommand::Help),
    ("stop", VoiceCommand::Stop),
    ("exit", VoiceCommand::Exit),
    ("repeat", VoiceCommand::Repeat),
];

impl VoiceCommand {
    pub fn parse(utterance: &str) -> Option<Self> {
        let lower = utterance.to_lowercase();
        KEYWORDS
            .iter()
            .find(|(keyword, _)| lower.contains(keyword))
            .map(|(_, command)| *command)
    }

    /// `(keyword, command)` pairs in match order.
    pub fn keywords() -> &'static [(&'static str, VoiceCommand)] {
        KEYWORDS
    }

    /// Detector that answers this command, if any.
    pub fn source(self) -> Option<Source> {
        match self {
            VoiceCommand::ReadText => Some(Source::Ocr),
            VoiceCommand::DescribeScene => Some(Source::Scene),
            VoiceCommand::IdentifyPeople => Some(Source::Face),
            VoiceCommand::DetectColor => Some(Source::Color),
            VoiceCommand::IdentifyMoney => Some(Source::Currency),
            VoiceCommand::CheckObstacles => Some(Source::Obstacle),
            VoiceCommand::Help | VoiceCommand::Stop | VoiceCommand::Exit | VoiceCommand::Repeat => None,
        }
    }

    pub fn feature(self) -> &'static str {
        match self {
            VoiceCommand::ReadText => "Text reading",
            VoiceCommand::DescribeScene => "Scene description",
            VoiceCommand::IdentifyPeople => "Face recognition",
            VoiceCommand::DetectColor => "Color detection",
            VoiceCommand::IdentifyMoney => "Currency detection",
            VoiceCommand::CheckObstacles => "Obstacle detection",
            VoiceCommand::Help => "Help",
            VoiceCommand::Stop => "Stop",
            VoiceCommand::Exit => "Exit",
            VoiceCommand::Repeat => "Repeat",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandOutcome {
    Handled,
    Exit,
    Unknown,
}

/// Executes voice commands against the queue and the running scheduler.
pub struct CommandDispatcher<'a> {
    queue: &'a AnnouncementQueue,
    scheduler: &'a SchedulerHandle,
}

impl<'a> CommandDispatcher<'a> {
    pub fn new(queue: &'a AnnouncementQueue, scheduler: &'a SchedulerHandle) -> Self {
        Self { queue, scheduler }
    }

    pub fn handle_utterance(&self, utterance: &str) -> CommandOutcome {
        match VoiceCommand::parse(utterance) {
            Some(command) => self.dispatch(command),
            None => {
                tracing::warn!("Unknown command: {utterance}");
                CommandOutcome::Unknown
            }
        }
    }

    pub fn dispatch(&self, command: VoiceCommand) -> CommandOutcome {
        tracing::info!("Command: {}", command.feature());
        if let Some(source) = command.source() {
            self.request(command, source);
            return CommandOutcome::Handled;
        }

        match command {
            VoiceCommand::Help => self.say(HELP_TEXT, Priority::High),
            VoiceCommand::Stop => {
                self.queue.clear();
                self.queue.cancel_current();
                self.say("Stopped", Priority::High);
            }
            VoiceCommand::Repeat => match self.queue.last_answer() {
                Some(text) => self.say(&text, Priority::High),
                None => self.say("Nothing to repeat", Priority::Medium),
            },
            VoiceCommand::Exit => return CommandOutcome::Exit,
            _ => {}
        }
        CommandOutcome::Handled
    }

    fn request(&self, command: VoiceCommand, source: Source) {
        match self.scheduler.trigger(source) {
            Ok(()) => {}
            Err(SchedulerError::UnknownSource(_)) | Err(SchedulerError::Disabled(_)) => {
                self.say(&format!("{} is not available", command.feature()), Priority::Medium);
            }
            Err(e) => tracing::warn!("Could not run {source} detector: {e}"),
        }
    }

    fn say(&self, text: &str, priority: Priority) {
        self.queue
            .enqueue(Announcement::new(text, priority, Source::System).on_request());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keywords_match_inside_sentences() {
        assert_eq!(VoiceCommand::parse("Please READ TEXT for me"), Some(VoiceCommand::ReadText));
        assert_eq!(VoiceCommand::parse("hey, what do you see?"), Some(VoiceCommand::DescribeScene));
        assert_eq!(VoiceCommand::parse("who is here"), Some(VoiceCommand::IdentifyPeople));
        assert_eq!(VoiceCommand::parse("any obstacles ahead"), Some(VoiceCommand::CheckObstacles));
        assert_eq!(VoiceCommand::parse("stop talking"), Some(VoiceCommand::Stop));
        assert_eq!(VoiceCommand::parse("sing a song"), None);
    }

    #[test]
    fn earlier_keyword_wins() {
        // Contains both "help" and "stop".
        assert_eq!(VoiceCommand::parse("help me stop"), Some(VoiceCommand::Help));
    }

    #[test]
    fn detection_commands_map_to_sources() {
        assert_eq!(VoiceCommand::IdentifyMoney.source(), Some(Source::Currency));
        assert_eq!(VoiceCommand::DetectColor.source(), Some(Source::Color));
        assert_eq!(VoiceCommand::Repeat.source(), None);
        assert_eq!(VoiceCommand::keywords().len(), 10);
    }
}
