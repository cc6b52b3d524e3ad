//! Contracts between the scheduling core and its external collaborators.
//!
//! The camera, the vision models and the speech engine all live behind these
//! traits. The core never reaches past them.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::detection::{DetectionResult, Frame, FrameSnapshot};
use crate::error::TtsError;

/// Latest-frame provider. Never blocks.
pub trait FrameSource: Send + Sync {
    /// The most recent frame, or `None` before the first capture.
    fn latest(&self) -> Option<FrameSnapshot>;
}

/// Camera backend driven by the capture thread.
pub trait FrameGrabber: Send {
    /// Block until the next frame is available.
    fn grab(&mut self) -> anyhow::Result<Frame>;
}

/// A vision model mapping a frame to a structured result.
///
/// `detect` may take substantial wall-clock time. Each binding owns its
/// detector exclusively, so implementations need not be `Sync`.
pub trait Detector: Send {
    fn name(&self) -> &str;
    fn detect(&mut self, frame: &Frame) -> anyhow::Result<DetectionResult>;
}

/// How a `speak` call ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeechOutcome {
    Completed,
    Cancelled,
}

/// Speech output device.
pub trait TextToSpeech: Send + Sync {
    /// Speak `text`, blocking until playback ends or `cancel` is raised.
    ///
    /// Implementations must return `SpeechOutcome::Cancelled` promptly once
    /// `cancel.is_cancelled()` turns true.
    fn speak(&self, text: &str, cancel: &CancelToken) -> Result<SpeechOutcome, TtsError>;

    /// Request early termination of the `speak` running under `generation`.
    /// A call for any other generation must leave playback alone.
    fn cancel(&self, _generation: u64) {}
}

type CancelHook = Box<dyn Fn(u64) + Send + Sync>;

/// Interruption signal shared by the announcement queue and the speaker.
///
/// Each utterance runs under its own generation. Raising the signal only
/// affects the generation it was raised for, so a late interrupt can never
/// cut off the next utterance.
pub struct SpeechInterrupt {
    generation: AtomicU64,
    raised: AtomicU64,
    hook: Mutex<Option<CancelHook>>,
}

impl SpeechInterrupt {
    pub fn new() -> Self {
        Self {
            generation: AtomicU64::new(0),
            raised: AtomicU64::new(0),
            hook: Mutex::new(None),
        }
    }

    /// Install the callback run whenever an utterance is interrupted,
    /// typically a forward to [`TextToSpeech::cancel`]. It receives the
    /// interrupted generation, which may already have been superseded.
    pub fn set_hook(&self, hook: impl Fn(u64) + Send + Sync + 'static) {
        if let Ok(mut slot) = self.hook.lock() {
            *slot = Some(Box::new(hook));
        }
    }

    /// Open a new generation and hand out its token.
    pub fn begin(self: &Arc<Self>) -> CancelToken {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        CancelToken {
            interrupt: Some(Arc::clone(self)),
            generation,
        }
    }

    pub fn current_generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Interrupt `generation` if it is still the active one.
    /// Returns whether the signal was raised by this call.
    pub fn raise(&self, generation: u64) -> bool {
        if generation == 0 || self.generation.load(Ordering::SeqCst) != generation {
            return false;
        }
        let previous = self.raised.fetch_max(generation, Ordering::SeqCst);
        if previous >= generation {
            return false;
        }
        if let Ok(hook) = self.hook.lock() {
            if let Some(hook) = hook.as_ref() {
                hook(generation);
            }
        }
        true
    }

    fn is_raised(&self, generation: u64) -> bool {
        self.raised.load(Ordering::SeqCst) >= generation
    }
}

impl Default for SpeechInterrupt {
    fn default() -> Self {
        Self::new()
    }
}

/// Scoped cancellation handle for one utterance.
#[derive(Clone)]
pub struct CancelToken {
    interrupt: Option<Arc<SpeechInterrupt>>,
    generation: u64,
}

impl CancelToken {
    /// A token that is never cancelled, for one-off speech outside the queue.
    pub fn never() -> Self {
        Self {
            interrupt: None,
            generation: 0,
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_cancelled(&self) -> bool {
        match &self.interrupt {
            Some(interrupt) => interrupt.is_raised(self.generation),
            None => false,
        }
    }

    /// Raise the signal for this token's utterance.
    pub fn cancel(&self) -> bool {
        match &self.interrupt {
            Some(interrupt) => interrupt.raise(self.generation),
            None => false,
        }
    }
}

impl std::fmt::Debug for CancelToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancelToken")
            .field("generation", &self.generation)
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn never_token_is_not_cancelled() {
        let token = CancelToken::never();
        assert!(!token.is_cancelled());
        assert!(!token.cancel());
    }

    #[test]
    fn raise_cancels_current_generation_and_runs_hook() {
        let interrupt = Arc::new(SpeechInterrupt::new());
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::new(AtomicU64::new(0));
        let (counter, last) = (calls.clone(), seen.clone());
        interrupt.set_hook(move |generation| {
            counter.fetch_add(1, Ordering::SeqCst);
            last.store(generation, Ordering::SeqCst);
        });

        interrupt.begin();
        let token = interrupt.begin();
        assert!(!token.is_cancelled());
        assert!(interrupt.raise(token.generation()));
        assert!(token.is_cancelled());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(seen.load(Ordering::SeqCst), 2);

        // Raising twice does not re-run the hook.
        assert!(!interrupt.raise(token.generation()));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn stale_raise_does_not_leak_into_next_generation() {
        let interrupt = Arc::new(SpeechInterrupt::new());
        let first = interrupt.begin();
        let second = interrupt.begin();

        assert!(!interrupt.raise(first.generation()));
        assert!(!second.is_cancelled());

        assert!(second.cancel());
        assert!(second.is_cancelled());

        let third = interrupt.begin();
        assert!(!third.is_cancelled());
    }

    #[test]
    fn tts_trait_is_object_safe() {
        fn assert_send_sync<T: Send + Sync + ?Sized>() {}
        assert_send_sync::<dyn TextToSpeech>();
        assert_send_sync::<dyn FrameSource>();
    }
}
