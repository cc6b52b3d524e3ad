//! Detection scheduler.
//!
//! Every binding gets its own thread ("unit") so a slow model never delays
//! another detector's cadence or the capture loop. Units sleep on a crossbeam
//! `select!` over the shutdown channel and their trigger channel, timing out
//! at the next cadence boundary. Boundaries are absolute (`next += cadence`)
//! so processing time does not accumulate as drift.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use chrono::Utc;
use crossbeam_channel::{select, Receiver, Sender, TryRecvError, TrySendError};
use guardian_audio::{panic_message, AnnouncementQueue};
use guardian_core::{Detector, FrameSource, Source};
use serde::Serialize;

use crate::binding::DetectorBinding;
use crate::error::SchedulerError;
use crate::mapping::{MapContext, ResultMapper};
use crate::status::StatusEvent;

/// Point-in-time view of one binding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BindingStatus {
    pub source: Source,
    pub detector: String,
    pub enabled: bool,
    pub cadence_ms: Option<u64>,
    pub consecutive_failures: u32,
    pub runs: u64,
    pub last_error: Option<String>,
}

/// Outcome of [`SchedulerHandle::shutdown`].
#[derive(Debug, Clone, Default, Serialize)]
pub struct ShutdownReport {
    pub joined: Vec<Source>,
    pub abandoned: Vec<Source>,
}

/// State shared between a unit thread and the handle.
struct UnitShared {
    source: Source,
    detector: String,
    cadence: Option<Duration>,
    enabled: AtomicBool,
    failures: AtomicU32,
    runs: AtomicU64,
    last_error: Mutex<Option<String>>,
}

impl UnitShared {
    fn status(&self) -> BindingStatus {
        BindingStatus {
            source: self.source,
            detector: self.detector.clone(),
            enabled: self.enabled.load(Ordering::SeqCst),
            cadence_ms: self.cadence.map(|c| c.as_millis() as u64),
            consecutive_failures: self.failures.load(Ordering::SeqCst),
            runs: self.runs.load(Ordering::SeqCst),
            last_error: self.last_error.lock().unwrap_or_else(PoisonError::into_inner).clone(),
        }
    }
}

/// Collects bindings, then starts one unit thread per binding.
pub struct DetectionScheduler {
    frames: Arc<dyn FrameSource>,
    queue: Arc<AnnouncementQueue>,
    bindings: Vec<DetectorBinding>,
    status_tx: Option<Sender<StatusEvent>>,
}

impl DetectionScheduler {
    pub fn new(frames: Arc<dyn FrameSource>, queue: Arc<AnnouncementQueue>) -> Self {
        Self {
            frames,
            queue,
            bindings: Vec::new(),
            status_tx: None,
        }
    }

    /// Publish [`StatusEvent`]s on `tx`.
    pub fn with_status(mut self, tx: Sender<StatusEvent>) -> Self {
        self.status_tx = Some(tx);
        self
    }

    pub fn bind(mut self, binding: DetectorBinding) -> Result<Self, SchedulerError> {
        if self.bindings.iter().any(|b| b.source == binding.source) {
            return Err(SchedulerError::DuplicateSource(binding.source));
        }
        if binding.cadence.is_some_and(|c| c.is_zero()) {
            return Err(SchedulerError::ZeroCadence(binding.source));
        }
        self.bindings.push(binding);
        Ok(self)
    }

    pub fn start(self) -> Result<SchedulerHandle, SchedulerError> {
        let (shutdown_tx, shutdown_rx) = crossbeam_channel::bounded::<()>(0);
        let mut units = Vec::with_capacity(self.bindings.len());

        for binding in self.bindings {
            let source = binding.source;
            let shared = Arc::new(UnitShared {
                source,
                detector: binding.detector.name().to_string(),
                cadence: binding.cadence,
                enabled: AtomicBool::new(binding.enabled),
                failures: AtomicU32::new(0),
                runs: AtomicU64::new(0),
                last_error: Mutex::new(None),
            });
            let (trigger_tx, trigger_rx) = crossbeam_channel::bounded(1);
            let unit = Unit {
                shared: shared.clone(),
                detector: binding.detector,
                mapper: binding.mapper,
                max_failures: binding.max_failures,
                frames: self.frames.clone(),
                queue: self.queue.clone(),
                status_tx: self.status_tx.clone(),
                triggers: trigger_rx,
                shutdown: shutdown_rx.clone(),
                last_sequence: 0,
            };
            let thread = thread::Builder::new()
                .name(format!("detector-{source}"))
                .spawn(move || unit.run())?;
            tracing::info!(
                "Started {source} detector ({}, cadence={:?})",
                shared.detector,
                shared.cadence
            );
            units.push(UnitHandle {
                shared,
                trigger: trigger_tx,
                thread,
            });
        }

        Ok(SchedulerHandle {
            units,
            shutdown_tx: Some(shutdown_tx),
            status_tx: self.status_tx,
        })
    }
}

struct UnitHandle {
    shared: Arc<UnitShared>,
    trigger: Sender<()>,
    thread: JoinHandle<()>,
}

/// Control surface of a running scheduler. Dropping it without calling
/// [`shutdown`](Self::shutdown) still stops the units, but does not wait.
pub struct SchedulerHandle {
    units: Vec<UnitHandle>,
    shutdown_tx: Option<Sender<()>>,
    status_tx: Option<Sender<StatusEvent>>,
}

impl SchedulerHandle {
    fn unit(&self, source: Source) -> Result<&UnitHandle, SchedulerError> {
        if self.shutdown_tx.is_none() {
            return Err(SchedulerError::ShutDown);
        }
        self.units
            .iter()
            .find(|u| u.shared.source == source)
            .ok_or(SchedulerError::UnknownSource(source))
    }

    pub fn sources(&self) -> Vec<Source> {
        self.units.iter().map(|u| u.shared.source).collect()
    }

    /// Run `source` once as soon as possible, outside its cadence. The result
    /// is mapped as an on-demand answer.
    pub fn trigger(&self, source: Source) -> Result<(), SchedulerError> {
        let unit = self.unit(source)?;
        if !unit.shared.enabled.load(Ordering::SeqCst) {
            return Err(SchedulerError::Disabled(source));
        }
        match unit.trigger.try_send(()) {
            // A trigger is already pending; one run answers both.
            Ok(()) | Err(TrySendError::Full(())) => Ok(()),
            Err(TrySendError::Disconnected(())) => Err(SchedulerError::ShutDown),
        }
    }

    /// Operator re-enable: clears the failure count.
    pub fn enable(&self, source: Source) -> Result<(), SchedulerError> {
        let unit = self.unit(source)?;
        unit.shared.failures.store(0, Ordering::SeqCst);
        if !unit.shared.enabled.swap(true, Ordering::SeqCst) {
            tracing::info!("{source} detector re-enabled");
            self.emit(StatusEvent::BindingEnabled { source, at: Utc::now() });
        }
        Ok(())
    }

    pub fn disable(&self, source: Source) -> Result<(), SchedulerError> {
        let unit = self.unit(source)?;
        if unit.shared.enabled.swap(false, Ordering::SeqCst) {
            tracing::info!("{source} detector disabled by operator");
        }
        Ok(())
    }

    pub fn status(&self) -> Vec<BindingStatus> {
        self.units.iter().map(|u| u.shared.status()).collect()
    }

    /// Stop every unit, waiting up to `grace` in total. Units still inside
    /// `detect` at the deadline are abandoned.
    pub fn shutdown(mut self, grace: Duration) -> ShutdownReport {
        // Dropping the only sender disconnects every unit's shutdown receiver.
        self.shutdown_tx.take();
        let deadline = Instant::now() + grace;

        let mut pending: Vec<UnitHandle> = std::mem::take(&mut self.units);
        let mut report = ShutdownReport::default();
        loop {
            let (finished, running): (Vec<_>, Vec<_>) =
                pending.into_iter().partition(|u| u.thread.is_finished());
            for unit in finished {
                let source = unit.shared.source;
                if unit.thread.join().is_err() {
                    tracing::error!("{source} detector thread panicked");
                }
                report.joined.push(source);
            }
            pending = running;
            if pending.is_empty() || Instant::now() >= deadline {
                break;
            }
            thread::sleep(Duration::from_millis(5));
        }

        for unit in pending {
            let source = unit.shared.source;
            tracing::warn!("{source} detector did not stop within {grace:?}, abandoning it");
            self.emit(StatusEvent::UnitAbandoned { source, at: Utc::now() });
            report.abandoned.push(source);
        }

        tracing::info!(
            "Scheduler stopped ({} joined, {} abandoned)",
            report.joined.len(),
            report.abandoned.len()
        );
        self.emit(StatusEvent::SchedulerStopped {
            joined: report.joined.len(),
            abandoned: report.abandoned.len(),
            at: Utc::now(),
        });
        report
    }

    fn emit(&self, event: StatusEvent) {
        if let Some(tx) = &self.status_tx {
            let _ = tx.send(event);
        }
    }
}

enum Wake {
    Tick,
    Trigger,
    Stop,
}

struct Unit {
    shared: Arc<UnitShared>,
    detector: Box<dyn Detector>,
    mapper: Box<dyn ResultMapper>,
    max_failures: u32,
    frames: Arc<dyn FrameSource>,
    queue: Arc<AnnouncementQueue>,
    status_tx: Option<Sender<StatusEvent>>,
    triggers: Receiver<()>,
    shutdown: Receiver<()>,
    last_sequence: u64,
}

impl Unit {
    fn run(mut self) {
        let source = self.shared.source;
        let cadence = self.shared.cadence;
        let mut next = Instant::now();

        loop {
            let wake = match cadence {
                Some(_) => {
                    let timeout = next.saturating_duration_since(Instant::now());
                    select! {
                        recv(self.shutdown) -> _ => Wake::Stop,
                        recv(self.triggers) -> msg => if msg.is_ok() { Wake::Trigger } else { Wake::Stop },
                        default(timeout) => Wake::Tick,
                    }
                }
                None => select! {
                    recv(self.shutdown) -> _ => Wake::Stop,
                    recv(self.triggers) -> msg => if msg.is_ok() { Wake::Trigger } else { Wake::Stop },
                },
            };

            match wake {
                Wake::Stop => break,
                Wake::Trigger => self.cycle(true),
                Wake::Tick => {
                    self.cycle(false);
                    if let Some(cadence) = cadence {
                        next += cadence;
                        let now = Instant::now();
                        // Skip boundaries missed during a slow run.
                        while next <= now {
                            next += cadence;
                        }
                    }
                }
            }
        }
        tracing::debug!("{source} detector unit exiting");
    }

    fn stopping(&self) -> bool {
        matches!(self.shutdown.try_recv(), Err(TryRecvError::Disconnected))
    }

    fn cycle(&mut self, on_demand: bool) {
        let source = self.shared.source;
        if !self.shared.enabled.load(Ordering::SeqCst) {
            if on_demand {
                tracing::debug!("Ignoring trigger for disabled {source} detector");
            }
            return;
        }
        let Some(snapshot) = self.frames.latest() else {
            tracing::trace!("{source}: no frame yet");
            return;
        };
        if !on_demand && snapshot.sequence == self.last_sequence {
            tracing::trace!("{source}: frame {} already processed", snapshot.sequence);
            return;
        }
        self.last_sequence = snapshot.sequence;

        let started = Instant::now();
        let detector = &mut self.detector;
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| detector.detect(&snapshot.frame)));
        self.shared.runs.fetch_add(1, Ordering::SeqCst);

        let result = match outcome {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => return self.record_failure(format!("{e:#}")),
            Err(payload) => return self.record_failure(format!("panicked: {}", panic_message(payload.as_ref()))),
        };
        self.shared.failures.store(0, Ordering::SeqCst);
        tracing::debug!(
            "{source} produced {} in {:?}",
            result.kind(),
            started.elapsed()
        );

        if self.stopping() {
            return;
        }
        let ctx = if on_demand {
            MapContext::on_demand(Instant::now())
        } else {
            MapContext::periodic(Instant::now())
        };
        for announcement in self.mapper.map(result, &ctx) {
            self.queue.enqueue(announcement);
        }
    }

    fn record_failure(&mut self, error: String) {
        let source = self.shared.source;
        let failures = self.shared.failures.fetch_add(1, Ordering::SeqCst) + 1;
        *self.shared.last_error.lock().unwrap_or_else(PoisonError::into_inner) = Some(error.clone());

        if failures < self.max_failures {
            tracing::warn!("{source} detector failed ({failures}/{}): {error}", self.max_failures);
            return;
        }
        if self.shared.enabled.swap(false, Ordering::SeqCst) {
            tracing::error!("{source} detector disabled after {failures} consecutive failures: {error}");
            if let Some(tx) = &self.status_tx {
                let _ = tx.send(StatusEvent::BindingDisabled {
                    source,
                    failures,
                    last_error: error,
                    at: Utc::now(),
                });
            }
        }
    }
}
