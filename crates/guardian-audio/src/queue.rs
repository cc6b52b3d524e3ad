//! Priority announcement queue.
//!
//! Pending items are kept sorted by `(priority desc, created_at asc)`. A single
//! mutex guards the ordered buffer and the "currently speaking" slot; it is
//! never held while the speech engine is being cancelled.

use std::cmp::Reverse;
use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use guardian_core::config::AppConfig;
use guardian_core::{Announcement, CancelToken, Priority, Source, SpeechInterrupt};
use serde::Serialize;
use uuid::Uuid;

/// Result of [`AnnouncementQueue::enqueue`].
#[derive(Debug, Clone)]
pub enum Admission {
    Admitted,
    /// A pending item with the same `(source, dedup_key)` was replaced.
    Replaced,
    /// The queue was full; the returned lower-priority item made room.
    Evicted(Announcement),
    Rejected(RejectReason),
}

impl Admission {
    pub fn is_admitted(&self) -> bool {
        !matches!(self, Admission::Rejected(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// Blank text.
    Empty,
    /// The queue has been shut down.
    ShutDown,
    /// Identical to an announcement spoken within the anti-repeat window.
    Repeat,
    /// A pending item with the same dedup key outranks it.
    Superseded,
    /// At capacity with nothing of lower priority to evict.
    Full,
}

/// Result of [`AnnouncementQueue::dequeue_blocking`].
#[derive(Debug)]
pub enum Dequeued {
    Item {
        announcement: Announcement,
        cancel: CancelToken,
    },
    TimedOut,
    Shutdown,
}

/// How the speaker finished with an announcement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Spoken,
    Interrupted,
    Failed,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    pub admitted: u64,
    pub rejected: u64,
    pub replaced: u64,
    pub evicted: u64,
    pub cleared: u64,
    pub spoken: u64,
    pub interrupted: u64,
    pub failed: u64,
    pub pending: usize,
    pub speaking: Option<Priority>,
}

struct Entry {
    announcement: Announcement,
    seq: u64,
}

impl Entry {
    fn key(&self) -> (Reverse<Priority>, Instant, u64) {
        (
            Reverse(self.announcement.priority),
            self.announcement.created_at,
            self.seq,
        )
    }
}

#[derive(Clone, Copy)]
struct Speaking {
    id: Uuid,
    priority: Priority,
    generation: u64,
}

struct Spoken {
    source: Source,
    text: String,
    at: Instant,
}

#[derive(Default)]
struct State {
    pending: Vec<Entry>,
    next_seq: u64,
    speaking: Option<Speaking>,
    shutdown: bool,
    recent: VecDeque<Spoken>,
    last_spoken: Option<String>,
    last_answer: Option<String>,
    stats: QueueStats,
}

impl State {
    fn insert(&mut self, announcement: Announcement) {
        let entry = Entry {
            announcement,
            seq: self.next_seq,
        };
        self.next_seq += 1;
        let key = entry.key();
        let idx = self.pending.partition_point(|e| e.key() <= key);
        self.pending.insert(idx, entry);
    }

    fn is_idle(&self) -> bool {
        self.pending.is_empty() && self.speaking.is_none()
    }
}

/// Bounded, deduplicating priority queue feeding the speaker worker.
pub struct AnnouncementQueue {
    state: Mutex<State>,
    changed: Condvar,
    interrupt: Arc<SpeechInterrupt>,
    capacity: usize,
    anti_repeat: Duration,
    interrupt_min: Priority,
}

impl AnnouncementQueue {
    pub fn new(capacity: usize, anti_repeat: Duration, interrupt_min: Priority) -> Self {
        Self {
            state: Mutex::new(State::default()),
            changed: Condvar::new(),
            interrupt: Arc::new(SpeechInterrupt::new()),
            capacity: capacity.max(1),
            anti_repeat,
            interrupt_min,
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(
            config.queue.capacity,
            config.queue.anti_repeat(),
            config.audio.interrupt_min_priority,
        )
    }

    /// The interruption signal shared with the speaker.
    pub fn interrupt(&self) -> &Arc<SpeechInterrupt> {
        &self.interrupt
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert an announcement, applying dedup, anti-repeat and capacity rules.
    ///
    /// Admission wakes the speaker and may interrupt lower-priority speech.
    pub fn enqueue(&self, announcement: Announcement) -> Admission {
        let priority = announcement.priority;
        let source = announcement.source;
        let preview = announcement.preview().to_string();

        let admission = {
            let mut state = self.lock();
            let admission = self.admit(&mut state, announcement);
            match &admission {
                Admission::Rejected(_) => state.stats.rejected += 1,
                Admission::Replaced => {
                    state.stats.admitted += 1;
                    state.stats.replaced += 1;
                }
                Admission::Evicted(_) => {
                    state.stats.admitted += 1;
                    state.stats.evicted += 1;
                }
                Admission::Admitted => state.stats.admitted += 1,
            }
            admission
        };

        match &admission {
            Admission::Rejected(reason) => {
                tracing::debug!("Dropped {source} announcement ({priority}, {reason:?}): {preview}");
            }
            Admission::Evicted(victim) => {
                tracing::debug!(
                    "Queue full, evicted {} announcement ({}): {}",
                    victim.source,
                    victim.priority,
                    victim.preview()
                );
            }
            _ => tracing::debug!("Queued {source} announcement ({priority}): {preview}"),
        }

        if admission.is_admitted() {
            self.changed.notify_all();
            self.preempt_current(priority);
        }
        admission
    }

    fn admit(&self, state: &mut State, announcement: Announcement) -> Admission {
        if announcement.text.is_empty() {
            return Admission::Rejected(RejectReason::Empty);
        }
        if state.shutdown {
            return Admission::Rejected(RejectReason::ShutDown);
        }

        let now = Instant::now();
        let window = self.anti_repeat;
        state.recent.retain(|s| now.duration_since(s.at) < window);
        let exempt = announcement.priority == Priority::Emergency || announcement.requested;
        if !exempt
            && state
                .recent
                .iter()
                .any(|s| s.source == announcement.source && s.text == announcement.text)
        {
            return Admission::Rejected(RejectReason::Repeat);
        }

        if let Some(key) = announcement.dedup_key.as_deref() {
            let existing = state.pending.iter().position(|e| {
                e.announcement.source == announcement.source
                    && e.announcement.dedup_key.as_deref() == Some(key)
            });
            if let Some(idx) = existing {
                if announcement.priority < state.pending[idx].announcement.priority {
                    return Admission::Rejected(RejectReason::Superseded);
                }
                state.pending.remove(idx);
                state.insert(announcement);
                return Admission::Replaced;
            }
        }

        if state.pending.len() >= self.capacity {
            let lowest = match state.pending.last() {
                Some(entry) => entry.announcement.priority,
                None => return Admission::Rejected(RejectReason::Full),
            };
            if announcement.priority <= lowest {
                return Admission::Rejected(RejectReason::Full);
            }
            // Oldest item of the lowest priority band.
            let idx = state
                .pending
                .partition_point(|e| e.announcement.priority > lowest);
            let victim = state.pending.remove(idx).announcement;
            state.insert(announcement);
            return Admission::Evicted(victim);
        }

        state.insert(announcement);
        Admission::Admitted
    }

    /// Remove the highest-priority, oldest item, waiting up to `timeout`.
    ///
    /// The returned item becomes the "currently speaking" one until
    /// [`finish_current`](Self::finish_current) is called.
    pub fn dequeue_blocking(&self, timeout: Duration) -> Dequeued {
        let deadline = Instant::now() + timeout;
        let mut state = self.lock();
        loop {
            if state.shutdown {
                return Dequeued::Shutdown;
            }
            if !state.pending.is_empty() {
                let announcement = state.pending.remove(0).announcement;
                let cancel = self.interrupt.begin();
                state.speaking = Some(Speaking {
                    id: announcement.id,
                    priority: announcement.priority,
                    generation: cancel.generation(),
                });
                return Dequeued::Item {
                    announcement,
                    cancel,
                };
            }
            let now = Instant::now();
            if now >= deadline {
                return Dequeued::TimedOut;
            }
            state = self
                .changed
                .wait_timeout(state, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }

    /// Interrupt in-progress speech if `new_priority` strictly outranks it.
    ///
    /// Emergency outranking anything always interrupts. Other priorities
    /// interrupt only when at or above the configured threshold.
    pub fn preempt_current(&self, new_priority: Priority) -> bool {
        let target = {
            let state = self.lock();
            match state.speaking {
                Some(current) if self.may_interrupt(new_priority, current.priority) => current,
                _ => return false,
            }
        };
        let raised = self.interrupt.raise(target.generation);
        if raised {
            tracing::info!(
                "Interrupting {} speech for {} announcement",
                target.priority,
                new_priority
            );
        }
        raised
    }

    fn may_interrupt(&self, incoming: Priority, speaking: Priority) -> bool {
        incoming > speaking && (incoming == Priority::Emergency || incoming >= self.interrupt_min)
    }

    /// Interrupt whatever is being spoken, regardless of priority.
    pub fn cancel_current(&self) -> bool {
        let generation = match self.lock().speaking {
            Some(current) => current.generation,
            None => return false,
        };
        self.interrupt.raise(generation)
    }

    /// Record how the current announcement ended and free the speaking slot.
    pub fn finish_current(&self, announcement: &Announcement, delivery: Delivery) {
        {
            let mut state = self.lock();
            if state.speaking.map(|s| s.id) == Some(announcement.id) {
                state.speaking = None;
            }
            // Detector answers to voice commands can be replayed, even if cut off.
            if announcement.requested && announcement.source != Source::System && delivery != Delivery::Failed {
                state.last_answer = Some(announcement.text.clone());
            }
            match delivery {
                Delivery::Spoken => {
                    state.stats.spoken += 1;
                    state.recent.push_back(Spoken {
                        source: announcement.source,
                        text: announcement.text.clone(),
                        at: Instant::now(),
                    });
                    state.last_spoken = Some(announcement.text.clone());
                }
                Delivery::Interrupted => state.stats.interrupted += 1,
                Delivery::Failed => state.stats.failed += 1,
            }
        }
        self.changed.notify_all();
    }

    /// Drop every pending announcement. Returns how many were dropped.
    pub fn clear(&self) -> usize {
        let dropped = {
            let mut state = self.lock();
            let dropped = state.pending.len();
            state.pending.clear();
            state.stats.cleared += dropped as u64;
            dropped
        };
        if dropped > 0 {
            tracing::info!("Cleared {dropped} pending announcements");
        }
        self.changed.notify_all();
        dropped
    }

    /// Terminal: reject further input, drop pending items, interrupt speech
    /// and wake every waiter.
    pub fn shutdown(&self) {
        let speaking = {
            let mut state = self.lock();
            state.shutdown = true;
            let dropped = state.pending.len();
            state.pending.clear();
            state.stats.cleared += dropped as u64;
            state.speaking
        };
        if let Some(current) = speaking {
            self.interrupt.raise(current.generation);
        }
        self.changed.notify_all();
    }

    pub fn is_shut_down(&self) -> bool {
        self.lock().shutdown
    }

    /// Block until nothing is pending or speaking. Returns false on timeout.
    pub fn wait_until_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.lock();
        while !state.is_idle() {
            let now = Instant::now();
            if now >= deadline {
                tracing::warn!("Timeout waiting for announcements to complete");
                return false;
            }
            state = self
                .changed
                .wait_timeout(state, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        true
    }

    pub fn len(&self) -> usize {
        self.lock().pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().pending.is_empty()
    }

    /// Pending announcements in the order they will be spoken.
    pub fn snapshot(&self) -> Vec<Announcement> {
        self.lock()
            .pending
            .iter()
            .map(|e| e.announcement.clone())
            .collect()
    }

    pub fn speaking(&self) -> Option<Priority> {
        self.lock().speaking.map(|s| s.priority)
    }

    pub fn last_spoken(&self) -> Option<String> {
        self.lock().last_spoken.clone()
    }

    /// Most recent detector answer to a voice command, replayed by "repeat".
    pub fn last_answer(&self) -> Option<String> {
        self.lock().last_answer.clone()
    }

    pub fn stats(&self) -> QueueStats {
        let state = self.lock();
        QueueStats {
            pending: state.pending.len(),
            speaking: state.speaking.map(|s| s.priority),
            ..state.stats.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    fn queue(capacity: usize) -> AnnouncementQueue {
        AnnouncementQueue::new(capacity, Duration::from_secs(2), Priority::High)
    }

    fn item(text: &str, priority: Priority, source: Source, base: Instant, offset_ms: u64) -> Announcement {
        Announcement::at(text, priority, source, base + Duration::from_millis(offset_ms))
    }

    fn next(queue: &AnnouncementQueue) -> Announcement {
        match queue.dequeue_blocking(Duration::from_millis(10)) {
            Dequeued::Item { announcement, .. } => announcement,
            other => panic!("expected an item, got {other:?}"),
        }
    }

    fn cancel_counter(queue: &AnnouncementQueue) -> Arc<AtomicUsize> {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        queue.interrupt().set_hook(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        calls
    }

    #[test]
    fn obstacle_warning_jumps_ahead_of_object_readout() {
        let q = queue(10);
        let base = Instant::now();
        q.enqueue(item("I see a cup", Priority::Low, Source::Object, base, 0));
        q.enqueue(item("Warning! Obstacle ahead", Priority::Critical, Source::Obstacle, base, 1));

        let first = next(&q);
        assert_eq!(first.text, "Warning! Obstacle ahead");
        q.finish_current(&first, Delivery::Spoken);
        assert_eq!(next(&q).text, "I see a cup");
    }

    #[test]
    fn dequeue_order_is_priority_then_fifo() {
        let q = queue(64);
        let base = Instant::now();
        // Deterministic pseudo-random priority sequence.
        let mut seed: u32 = 0x2545_f491;
        let mut expected = Vec::new();
        for i in 0..40u64 {
            seed = seed.wrapping_mul(1_103_515_245).wrapping_add(12_345);
            let priority = Priority::ALL[(seed >> 16) as usize % Priority::ALL.len()];
            let text = format!("item {i}");
            expected.push((priority, i, text.clone()));
            assert!(q.enqueue(item(&text, priority, Source::Object, base, i)).is_admitted());
        }

        expected.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));
        let mut last: Option<Announcement> = None;
        for (priority, _, text) in expected {
            let got = next(&q);
            assert_eq!(got.priority, priority);
            assert_eq!(got.text, text);
            if let Some(prev) = &last {
                assert!(prev.priority >= got.priority);
                if prev.priority == got.priority {
                    assert!(prev.created_at <= got.created_at);
                }
            }
            q.finish_current(&got, Delivery::Interrupted);
            last = Some(got);
        }
        assert!(q.is_empty());
    }

    #[test]
    fn same_key_with_higher_or_equal_priority_replaces() {
        let q = queue(10);
        let base = Instant::now();
        let first = item("Hello John", Priority::High, Source::Face, base, 0).with_dedup_key("John");
        let second = item("Hello John again", Priority::High, Source::Face, base, 5).with_dedup_key("John");
        let second_at = second.created_at;

        assert!(matches!(q.enqueue(first), Admission::Admitted));
        assert!(matches!(q.enqueue(second), Admission::Replaced));
        assert_eq!(q.len(), 1);
        let pending = q.snapshot();
        assert_eq!(pending[0].text, "Hello John again");
        assert_eq!(pending[0].created_at, second_at);
    }

    #[test]
    fn same_key_with_lower_priority_is_discarded() {
        let q = queue(10);
        let base = Instant::now();
        q.enqueue(item("Obstacle center, 90 centimeters", Priority::Critical, Source::Obstacle, base, 0).with_dedup_key("center"));
        let admission = q.enqueue(item("Obstacle center, 140 centimeters", Priority::High, Source::Obstacle, base, 1).with_dedup_key("center"));

        assert!(matches!(admission, Admission::Rejected(RejectReason::Superseded)));
        assert_eq!(q.snapshot()[0].text, "Obstacle center, 90 centimeters");
    }

    #[test]
    fn dedup_key_is_scoped_per_source() {
        let q = queue(10);
        let base = Instant::now();
        q.enqueue(item("Hello John", Priority::High, Source::Face, base, 0).with_dedup_key("John"));
        q.enqueue(item("John's mug", Priority::Medium, Source::Object, base, 1).with_dedup_key("John"));
        assert_eq!(q.len(), 2);
    }

    #[test]
    fn repeated_face_within_cooldown_queues_once() {
        let q = queue(10);
        let base = Instant::now();
        q.enqueue(item("Hello John", Priority::High, Source::Face, base, 0).with_dedup_key("John"));
        q.enqueue(item("Hello John", Priority::High, Source::Face, base, 200).with_dedup_key("John"));
        assert_eq!(q.len(), 1);
    }

    #[test]
    fn critical_evicts_one_low_when_full() {
        let q = queue(5);
        let base = Instant::now();
        for i in 0..5 {
            q.enqueue(item(&format!("low {i}"), Priority::Low, Source::Scene, base, i));
        }
        let admission = q.enqueue(item("Obstacle", Priority::Critical, Source::Obstacle, base, 10));
        match admission {
            Admission::Evicted(victim) => assert_eq!(victim.text, "low 0"),
            other => panic!("expected eviction, got {other:?}"),
        }
        assert_eq!(q.len(), 5);
        let pending = q.snapshot();
        assert_eq!(pending[0].priority, Priority::Critical);
        assert_eq!(pending.iter().filter(|a| a.priority == Priority::Low).count(), 4);

        let rejected = q.enqueue(item("low 6", Priority::Low, Source::Scene, base, 11));
        assert!(matches!(rejected, Admission::Rejected(RejectReason::Full)));
        assert_eq!(q.len(), 5);
    }

    #[test]
    fn sixth_low_item_is_rejected_at_capacity_five() {
        let q = queue(5);
        let base = Instant::now();
        for i in 0..5 {
            assert!(q.enqueue(item(&format!("low {i}"), Priority::Low, Source::Object, base, i)).is_admitted());
        }
        assert!(!q.enqueue(item("low 5", Priority::Low, Source::Object, base, 5)).is_admitted());
        assert_eq!(q.len(), 5);
        assert_eq!(q.stats().rejected, 1);
    }

    #[test]
    fn empty_text_is_rejected() {
        let q = queue(5);
        let admission = q.enqueue(Announcement::new("   ", Priority::High, Source::System));
        assert!(matches!(admission, Admission::Rejected(RejectReason::Empty)));
    }

    #[test]
    fn recently_spoken_text_is_not_repeated() {
        let q = queue(5);
        q.enqueue(Announcement::new("Color: blue", Priority::Medium, Source::Color));
        let spoken = next(&q);
        q.finish_current(&spoken, Delivery::Spoken);

        let again = q.enqueue(Announcement::new("Color: blue", Priority::Medium, Source::Color));
        assert!(matches!(again, Admission::Rejected(RejectReason::Repeat)));

        // Emergency alerts are never suppressed.
        q.enqueue(Announcement::new("Stop!", Priority::Emergency, Source::Obstacle));
        let alert = next(&q);
        q.finish_current(&alert, Delivery::Spoken);
        assert!(q.enqueue(Announcement::new("Stop!", Priority::Emergency, Source::Obstacle)).is_admitted());
    }

    #[test]
    fn zero_anti_repeat_window_allows_repeats() {
        let q = AnnouncementQueue::new(5, Duration::ZERO, Priority::High);
        q.enqueue(Announcement::new("Color: red", Priority::Medium, Source::Color));
        let spoken = next(&q);
        q.finish_current(&spoken, Delivery::Spoken);
        assert!(q.enqueue(Announcement::new("Color: red", Priority::Medium, Source::Color)).is_admitted());
    }

    #[test]
    fn dequeue_times_out_when_empty() {
        let q = queue(5);
        let started = Instant::now();
        assert!(matches!(q.dequeue_blocking(Duration::from_millis(30)), Dequeued::TimedOut));
        assert!(started.elapsed() >= Duration::from_millis(30));
    }

    #[test]
    fn enqueue_wakes_blocked_dequeue() {
        let q = Arc::new(queue(5));
        let consumer = {
            let q = q.clone();
            thread::spawn(move || q.dequeue_blocking(Duration::from_secs(5)))
        };
        thread::sleep(Duration::from_millis(50));
        q.enqueue(Announcement::new("Hello", Priority::High, Source::Face));
        match consumer.join().unwrap() {
            Dequeued::Item { announcement, .. } => assert_eq!(announcement.text, "Hello"),
            other => panic!("expected item, got {other:?}"),
        }
    }

    #[test]
    fn shutdown_wakes_blocked_dequeue_and_rejects_input() {
        let q = Arc::new(queue(5));
        let consumer = {
            let q = q.clone();
            thread::spawn(move || q.dequeue_blocking(Duration::from_secs(5)))
        };
        thread::sleep(Duration::from_millis(50));
        q.shutdown();
        assert!(matches!(consumer.join().unwrap(), Dequeued::Shutdown));
        let admission = q.enqueue(Announcement::new("late", Priority::High, Source::System));
        assert!(matches!(admission, Admission::Rejected(RejectReason::ShutDown)));
    }

    #[test]
    fn emergency_interrupts_medium_speech() {
        let q = queue(5);
        let cancels = cancel_counter(&q);
        q.enqueue(Announcement::new("I see a chair", Priority::Medium, Source::Object));
        let (_speaking, token) = match q.dequeue_blocking(Duration::from_millis(10)) {
            Dequeued::Item { announcement, cancel } => (announcement, cancel),
            other => panic!("{other:?}"),
        };

        q.enqueue(Announcement::new("I see a table", Priority::Medium, Source::Object));
        assert!(!token.is_cancelled());
        assert_eq!(cancels.load(Ordering::SeqCst), 0);

        q.enqueue(Announcement::new("Warning! Obstacle center", Priority::Emergency, Source::Obstacle));
        assert!(token.is_cancelled());
        assert_eq!(cancels.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn interrupt_threshold_applies_below_emergency() {
        let q = queue(5);
        let cancels = cancel_counter(&q);

        q.enqueue(Announcement::new("A chair", Priority::Low, Source::Scene));
        let low = next(&q);
        // Medium is below the High threshold: waits its turn.
        q.enqueue(Announcement::new("Color: red", Priority::Medium, Source::Color));
        assert_eq!(cancels.load(Ordering::SeqCst), 0);
        // Critical outranks low speech and meets the threshold.
        q.enqueue(Announcement::new("Obstacle left", Priority::Critical, Source::Obstacle));
        assert_eq!(cancels.load(Ordering::SeqCst), 1);
        q.finish_current(&low, Delivery::Interrupted);

        let critical = next(&q);
        assert_eq!(critical.priority, Priority::Critical);
        // Equal priority never interrupts.
        assert!(!q.preempt_current(Priority::Critical));
        assert!(q.preempt_current(Priority::Emergency));
        assert_eq!(q.stats().interrupted, 1);
    }

    #[test]
    fn preempt_without_speech_is_noop() {
        let q = queue(5);
        assert!(!q.preempt_current(Priority::Emergency));
        assert!(!q.cancel_current());
    }

    #[test]
    fn clear_drops_pending_only() {
        let q = queue(5);
        q.enqueue(Announcement::new("one", Priority::Low, Source::Scene));
        q.enqueue(Announcement::new("two", Priority::Low, Source::Scene));
        q.enqueue(Announcement::new("three", Priority::Low, Source::Scene));
        let speaking = next(&q);
        assert_eq!(q.clear(), 2);
        assert!(q.is_empty());
        assert_eq!(q.speaking(), Some(Priority::Low));
        q.finish_current(&speaking, Delivery::Spoken);
        assert_eq!(q.last_spoken().as_deref(), Some("one"));
        assert_eq!(q.stats().cleared, 2);
    }

    #[test]
    fn wait_until_idle_returns_after_finish() {
        let q = Arc::new(queue(5));
        q.enqueue(Announcement::new("one", Priority::Low, Source::Scene));
        let speaking = next(&q);
        let finisher = {
            let q = q.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(50));
                q.finish_current(&speaking, Delivery::Spoken);
            })
        };
        assert!(q.wait_until_idle(Duration::from_secs(2)));
        finisher.join().unwrap();
        assert_eq!(q.speaking(), None);
    }

    #[test]
    fn requested_answers_skip_anti_repeat() {
        let q = queue(5);
        q.enqueue(Announcement::new("Color: blue", Priority::Medium, Source::Color).on_request());
        let first = next(&q);
        q.finish_current(&first, Delivery::Spoken);

        // Periodic chatter with the same text is still filtered.
        assert!(matches!(
            q.enqueue(Announcement::new("Color: blue", Priority::Medium, Source::Color)),
            Admission::Rejected(RejectReason::Repeat)
        ));
        // Asking again always gets an answer.
        assert!(q
            .enqueue(Announcement::new("Color: blue", Priority::Medium, Source::Color).on_request())
            .is_admitted());
    }

    #[test]
    fn last_answer_ignores_alerts_and_system_speech() {
        let q = queue(5);
        assert_eq!(q.last_answer(), None);

        q.enqueue(Announcement::new("Exit only", Priority::Medium, Source::Ocr).on_request());
        let answer = next(&q);
        q.finish_current(&answer, Delivery::Interrupted);

        q.enqueue(Announcement::new("Obstacle left, 90 centimeters", Priority::Critical, Source::Obstacle));
        q.enqueue(Announcement::new("Nothing to repeat", Priority::Medium, Source::System).on_request());
        for _ in 0..2 {
            let item = next(&q);
            q.finish_current(&item, Delivery::Spoken);
        }

        assert_eq!(q.last_spoken().as_deref(), Some("Nothing to repeat"));
        assert_eq!(q.last_answer().as_deref(), Some("Exit only"));
    }
}
