use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use guardian_core::{Announcement, CancelToken, SpeechOutcome, TextToSpeech};

use crate::events::SpeechEvent;
use crate::queue::{AnnouncementQueue, Delivery, Dequeued};

/// Speaker worker state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeakerState {
    Idle,
    Speaking,
    Draining,
    Stopped,
}

/// Single consumer of the announcement queue. Runs on a dedicated std::thread
/// and hands each announcement to the speech engine.
pub struct SpeakerWorker {
    queue: Arc<AnnouncementQueue>,
    tts: Arc<dyn TextToSpeech>,
    poll_interval: Duration,
    events: Option<mpsc::Sender<SpeechEvent>>,
}

impl SpeakerWorker {
    pub fn new(queue: Arc<AnnouncementQueue>, tts: Arc<dyn TextToSpeech>, poll_interval: Duration) -> Self {
        Self {
            queue,
            tts,
            poll_interval,
            events: None,
        }
    }

    /// Publish [`SpeechEvent`]s on `tx` while running.
    pub fn with_events(mut self, tx: mpsc::Sender<SpeechEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    /// Spawn the worker thread. Installs the queue's interrupt hook so that
    /// preemption stops the engine mid-utterance.
    pub fn spawn(self) -> std::io::Result<SpeakerHandle> {
        let tts = self.tts.clone();
        self.queue.interrupt().set_hook(move |generation| tts.cancel(generation));

        let state = Arc::new(Mutex::new(SpeakerState::Idle));
        let thread_state = state.clone();
        let thread = thread::Builder::new()
            .name("speaker".into())
            .spawn(move || self.run(&thread_state))?;

        Ok(SpeakerHandle { state, thread })
    }

    fn run(self, state: &Mutex<SpeakerState>) {
        tracing::info!("Speaker worker running (poll={:?})", self.poll_interval);
        loop {
            set_state(state, SpeakerState::Idle);
            match self.queue.dequeue_blocking(self.poll_interval) {
                Dequeued::Item { announcement, cancel } => {
                    set_state(state, SpeakerState::Speaking);
                    let delivery = self.speak(&announcement, &cancel);
                    self.queue.finish_current(&announcement, delivery);
                }
                Dequeued::TimedOut => continue,
                Dequeued::Shutdown => break,
            }
        }

        set_state(state, SpeakerState::Draining);
        let dropped = self.queue.clear();
        if dropped > 0 {
            tracing::debug!("Speaker drained {dropped} announcements");
        }
        set_state(state, SpeakerState::Stopped);
        self.emit(SpeechEvent::Stopped);
        tracing::info!("Speaker worker stopped");
    }

    fn speak(&self, announcement: &Announcement, cancel: &CancelToken) -> Delivery {
        let id = announcement.id;
        tracing::info!(
            "Speaking [{}/{}]: {}",
            announcement.source,
            announcement.priority,
            announcement.text
        );
        self.emit(SpeechEvent::Speaking {
            id,
            source: announcement.source,
            priority: announcement.priority,
            text: announcement.text.clone(),
        });

        let result = panic::catch_unwind(AssertUnwindSafe(|| self.tts.speak(&announcement.text, cancel)));
        match result {
            Ok(Ok(SpeechOutcome::Completed)) => {
                self.emit(SpeechEvent::Finished { id });
                Delivery::Spoken
            }
            Ok(Ok(SpeechOutcome::Cancelled)) => {
                tracing::debug!("Speech interrupted: {}", announcement.preview());
                self.emit(SpeechEvent::Interrupted { id });
                Delivery::Interrupted
            }
            Ok(Err(e)) => {
                tracing::error!("TTS failed for {} announcement: {e}", announcement.source);
                self.emit(SpeechEvent::Failed { id, error: e.to_string() });
                Delivery::Failed
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                tracing::error!("TTS panicked for {} announcement: {message}", announcement.source);
                self.emit(SpeechEvent::Failed { id, error: message });
                Delivery::Failed
            }
        }
    }

    fn emit(&self, event: SpeechEvent) {
        if let Some(tx) = &self.events {
            let _ = tx.send(event);
        }
    }
}

fn set_state(state: &Mutex<SpeakerState>, next: SpeakerState) {
    *state.lock().unwrap_or_else(PoisonError::into_inner) = next;
}

/// Best-effort text of a caught panic payload.
pub fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Handle to a running [`SpeakerWorker`].
pub struct SpeakerHandle {
    state: Arc<Mutex<SpeakerState>>,
    thread: JoinHandle<()>,
}

impl SpeakerHandle {
    pub fn state(&self) -> SpeakerState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }

    /// Wait up to `grace` for the worker to exit. The queue must already be
    /// shut down. Returns false if the thread was left running.
    pub fn join(self, grace: Duration) -> bool {
        let deadline = Instant::now() + grace;
        while !self.thread.is_finished() {
            if Instant::now() >= deadline {
                tracing::warn!("Speaker did not stop within {grace:?}, abandoning it");
                return false;
            }
            thread::sleep(Duration::from_millis(10));
        }
        if self.thread.join().is_err() {
            tracing::error!("Speaker thread panicked");
        }
        true
    }
}
