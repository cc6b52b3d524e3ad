use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Instant;

use guardian_core::{Frame, FrameSnapshot, FrameSource};

/// Latest-frame slot written by the capture thread and read by every
/// detector unit. Readers clone an `Arc`; the writer only swaps a pointer.
#[derive(Default)]
pub struct SharedFrameSlot {
    latest: RwLock<Option<FrameSnapshot>>,
    sequence: AtomicU64,
    closed: AtomicBool,
}

impl SharedFrameSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the latest frame. Returns the new sequence number, or `None`
    /// once the slot is closed.
    pub fn publish(&self, frame: Frame) -> Option<u64> {
        if self.is_closed() {
            return None;
        }
        let snapshot = FrameSnapshot {
            frame: Arc::new(frame),
            sequence: self.sequence.fetch_add(1, Ordering::SeqCst) + 1,
            captured_at: Instant::now(),
        };
        let sequence = snapshot.sequence;
        *self.latest.write().unwrap_or_else(PoisonError::into_inner) = Some(snapshot);
        Some(sequence)
    }

    /// Stop accepting frames and drop the current one.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.latest.write().unwrap_or_else(PoisonError::into_inner).take();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Number of frames published so far.
    pub fn sequence(&self) -> u64 {
        self.sequence.load(Ordering::SeqCst)
    }
}

impl FrameSource for SharedFrameSlot {
    fn latest(&self) -> Option<FrameSnapshot> {
        if self.is_closed() {
            return None;
        }
        self.latest.read().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn empty_slot_has_no_frame() {
        let slot = SharedFrameSlot::new();
        assert!(slot.latest().is_none());
        assert_eq!(slot.sequence(), 0);
    }

    #[test]
    fn publish_bumps_sequence() {
        let slot = SharedFrameSlot::new();
        assert_eq!(slot.publish(Frame::blank(2, 2)), Some(1));
        assert_eq!(slot.publish(Frame::blank(4, 2)), Some(2));
        let snapshot = slot.latest().unwrap();
        assert_eq!(snapshot.sequence, 2);
        assert_eq!(snapshot.frame.width, 4);
    }

    #[test]
    fn reader_keeps_its_snapshot_after_publish() {
        let slot = SharedFrameSlot::new();
        slot.publish(Frame::blank(2, 2));
        let held = slot.latest().unwrap();
        slot.publish(Frame::new(1, 1, vec![9, 9, 9]));
        assert_eq!(held.frame.data.len(), 12);
        assert_eq!(slot.latest().unwrap().frame.data, vec![9, 9, 9]);
    }

    #[test]
    fn closed_slot_rejects_frames() {
        let slot = SharedFrameSlot::new();
        slot.publish(Frame::blank(2, 2));
        slot.close();
        assert!(slot.latest().is_none());
        assert_eq!(slot.publish(Frame::blank(2, 2)), None);
    }

    #[test]
    fn concurrent_readers_see_whole_frames() {
        let slot = Arc::new(SharedFrameSlot::new());
        let writer = {
            let slot = slot.clone();
            thread::spawn(move || {
                for i in 1..=200u32 {
                    let fill = (i % 250) as u8;
                    slot.publish(Frame::new(i, 1, vec![fill; i as usize * 3]));
                }
            })
        };
        let readers: Vec<_> = (0..4)
            .map(|_| {
                let slot = slot.clone();
                thread::spawn(move || {
                    let mut last = 0;
                    for _ in 0..500 {
                        if let Some(snap) = slot.latest() {
                            let frame = &snap.frame;
                            assert_eq!(frame.data.len(), frame.width as usize * 3);
                            assert!(frame.data.iter().all(|&b| b == frame.data[0]));
                            assert!(snap.sequence >= last);
                            last = snap.sequence;
                        }
                    }
                })
            })
            .collect();
        writer.join().unwrap();
        for reader in readers {
            reader.join().unwrap();
        }
    }
}
