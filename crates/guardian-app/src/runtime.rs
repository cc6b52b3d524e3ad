use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;

use anyhow::Result;
use guardian_audio::{engine_from_config, AnnouncementQueue, QueueStats, SpeakerWorker, SpeechEvent};
use guardian_core::{Announcement, AppConfig, Priority, Source};
use guardian_vision::{
    spawn_capture, BindingStatus, CommandDispatcher, CommandOutcome, DetectionScheduler, DetectorBinding,
    SharedFrameSlot, ShutdownReport,
};
use serde::Serialize;
use tokio::sync::mpsc as async_mpsc;

use crate::simulated::{self, SyntheticCamera};

/// Printed as JSON when the run ends.
#[derive(Serialize)]
pub struct RunSummary {
    pub queue: QueueStats,
    pub detectors: Vec<BindingStatus>,
    pub shutdown: ShutdownReport,
    pub speaker_stopped: bool,
}

/// Full pipeline with a synthetic camera and simulated detectors. Voice
/// commands come from stdin, one utterance per line.
pub async fn simulate(config: AppConfig, duration: Option<Duration>, known_faces: Vec<String>) -> Result<RunSummary> {
    let grace = config.scheduler.shutdown_grace();
    let queue = Arc::new(AnnouncementQueue::from_config(&config));

    let (speech_tx, speech_rx) = mpsc::channel();
    let speaker = SpeakerWorker::new(queue.clone(), engine_from_config(&config.audio), config.audio.poll_interval())
        .with_events(speech_tx)
        .spawn()?;
    thread::Builder::new().name("speech-events".into()).spawn(move || {
        for event in speech_rx {
            if let SpeechEvent::Failed { error, .. } = &event {
                tracing::warn!("Announcement lost: {error}");
            } else {
                tracing::debug!("{event:?}");
            }
        }
    })?;

    let slot = Arc::new(SharedFrameSlot::new());
    let (camera_tx, camera_rx) = crossbeam_channel::bounded::<()>(1);
    let capture = spawn_capture(
        Box::new(SyntheticCamera::new(config.camera.width, config.camera.height)),
        slot.clone(),
        config.camera.fps,
        camera_rx,
    )?;

    let (status_tx, status_rx) = crossbeam_channel::unbounded();
    thread::Builder::new().name("status".into()).spawn(move || {
        for event in status_rx {
            match serde_json::to_string(&event) {
                Ok(line) => println!("{line}"),
                Err(e) => tracing::warn!("Could not encode status event: {e}"),
            }
        }
    })?;

    let mut scheduler = DetectionScheduler::new(slot.clone(), queue.clone()).with_status(status_tx);
    for (source, detector) in simulated::detectors(known_faces) {
        scheduler = scheduler.bind(DetectorBinding::from_config(source, detector, &config))?;
    }
    let scheduler = scheduler.start()?;
    queue.enqueue(Announcement::new("Guardian ready", Priority::High, Source::System));

    {
        let dispatcher = CommandDispatcher::new(&queue, &scheduler);
        let mut utterances = spawn_voice_input()?;
        let mut input_open = true;

        let ctrl_c = tokio::signal::ctrl_c();
        tokio::pin!(ctrl_c);
        let deadline = async {
            match duration {
                Some(d) => tokio::time::sleep(d).await,
                None => std::future::pending::<()>().await,
            }
        };
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                _ = &mut ctrl_c => {
                    tracing::info!("Interrupted");
                    break;
                }
                _ = &mut deadline => break,
                line = utterances.recv(), if input_open => match line {
                    Some(line) => {
                        if dispatcher.handle_utterance(&line) == CommandOutcome::Exit {
                            break;
                        }
                    }
                    None => input_open = false,
                },
            }
        }
    }

    // Detectors stop first so nothing queues behind the farewell.
    let detectors = scheduler.status();
    let shutdown = scheduler.shutdown(grace);
    drop(camera_tx);
    if capture.join().is_err() {
        tracing::error!("Capture thread panicked");
    }
    slot.close();

    queue.enqueue(Announcement::new("Guardian shutting down", Priority::High, Source::System));
    queue.wait_until_idle(grace);
    queue.shutdown();
    let speaker_stopped = speaker.join(grace);

    Ok(RunSummary {
        queue: queue.stats(),
        detectors,
        shutdown,
        speaker_stopped,
    })
}

/// Reads stdin on a plain thread so a pending read never holds up runtime shutdown.
fn spawn_voice_input() -> std::io::Result<async_mpsc::UnboundedReceiver<String>> {
    let (tx, rx) = async_mpsc::unbounded_channel();
    thread::Builder::new().name("voice-input".into()).spawn(move || {
        for line in std::io::stdin().lines() {
            let line = match line {
                Ok(line) => line,
                Err(e) => {
                    tracing::warn!("Voice input closed: {e}");
                    break;
                }
            };
            if line.trim().is_empty() {
                continue;
            }
            if tx.send(line).is_err() {
                break;
            }
        }
    })?;
    Ok(rx)
}

/// Speak one announcement and wait for it to finish.
pub fn say(config: &AppConfig, text: &str, priority: Priority) -> Result<QueueStats> {
    let queue = Arc::new(AnnouncementQueue::from_config(config));
    let speaker = SpeakerWorker::new(queue.clone(), engine_from_config(&config.audio), config.audio.poll_interval()).spawn()?;

    let admission = queue.enqueue(Announcement::new(text, priority, Source::System));
    if !admission.is_admitted() {
        anyhow::bail!("announcement rejected: {admission:?}");
    }
    // Generous bound: a slow speaker at 60 words per minute.
    let words = text.split_whitespace().count() as u64;
    if !queue.wait_until_idle(Duration::from_secs(5 + words)) {
        tracing::warn!("Speech did not finish in time");
    }

    queue.shutdown();
    speaker.join(config.scheduler.shutdown_grace());
    Ok(queue.stats())
}
