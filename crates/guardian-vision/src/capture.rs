use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError};
use guardian_core::FrameGrabber;

use crate::frame::SharedFrameSlot;

/// Consecutive grab failures after which the capture loop gives up.
const MAX_GRAB_FAILURES: u32 = 30;

/// Spawn the capture thread: grabs at `fps` into `slot` until `shutdown`
/// fires or is dropped. The slot is closed when the loop exits.
pub fn spawn_capture(
    mut grabber: Box<dyn FrameGrabber>,
    slot: Arc<SharedFrameSlot>,
    fps: u32,
    shutdown: Receiver<()>,
) -> std::io::Result<JoinHandle<()>> {
    let interval = Duration::from_secs(1) / fps.max(1);
    thread::Builder::new().name("capture".into()).spawn(move || {
        tracing::info!("Capture started at {fps} fps");
        let mut failures = 0u32;
        let mut next = Instant::now();
        loop {
            match grabber.grab() {
                Ok(frame) => {
                    failures = 0;
                    if slot.publish(frame).is_none() {
                        break;
                    }
                }
                Err(e) => {
                    failures += 1;
                    tracing::warn!("Frame grab failed ({failures}/{MAX_GRAB_FAILURES}): {e}");
                    if failures >= MAX_GRAB_FAILURES {
                        tracing::error!("Camera unavailable, stopping capture");
                        break;
                    }
                }
            }

            next += interval;
            let now = Instant::now();
            if next < now {
                next = now;
            }
            match shutdown.recv_timeout(next - now) {
                Err(RecvTimeoutError::Timeout) => {}
                Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        slot.close();
        tracing::info!("Capture stopped");
    })
}
