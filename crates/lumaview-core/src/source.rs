//! Inbound frame delivery from the decode pipeline.

use crate::frame::VideoFrame;
use crossbeam_channel::{Receiver, TryRecvError};
use tracing::{debug, trace};

/// Non-blocking supplier of decoded frames.
pub trait FrameSource {
    /// Return a new frame for `target_time` (seconds), if one is ready.
    ///
    /// Must not block. `None` means there is nothing new for this deadline.
    fn try_get_frame(&mut self, target_time: f64) -> Option<VideoFrame>;

    /// Whether the producer has signalled that new data is on its way.
    fn has_new_data(&self) -> bool {
        false
    }
}

/// Frame source fed by a producer thread over a channel.
///
/// Frames whose timestamp is not yet due stay queued; when several frames are
/// due at once only the newest one is returned and the older ones are
/// dropped.
pub struct ChannelFrameSource {
    receiver: Receiver<VideoFrame>,
    pending: Option<VideoFrame>,
    dropped: u64,
    disconnected: bool,
}

impl ChannelFrameSource {
    pub fn new(receiver: Receiver<VideoFrame>) -> Self {
        Self {
            receiver,
            pending: None,
            dropped: 0,
            disconnected: false,
        }
    }

    /// Frames discarded because a newer frame was already due.
    pub fn dropped_frames(&self) -> u64 {
        self.dropped
    }

    /// The producer hung up and every queued frame was consumed.
    pub fn is_finished(&self) -> bool {
        self.disconnected && self.pending.is_none() && self.receiver.is_empty()
    }

    fn next_pending(&mut self) -> Option<VideoFrame> {
        if let Some(frame) = self.pending.take() {
            return Some(frame);
        }
        match self.receiver.try_recv() {
            Ok(frame) => Some(frame),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => {
                if !self.disconnected {
                    debug!("Frame producer disconnected");
                }
                self.disconnected = true;
                None
            }
        }
    }
}

impl FrameSource for ChannelFrameSource {
    fn try_get_frame(&mut self, target_time: f64) -> Option<VideoFrame> {
        let mut due: Option<VideoFrame> = None;

        while let Some(frame) = self.next_pending() {
            if frame.pts > target_time {
                self.pending = Some(frame);
                break;
            }
            if let Some(stale) = due.replace(frame) {
                trace!("Dropping late frame at {:.3}s", stale.pts);
                self.dropped += 1;
            }
        }

        due
    }

    fn has_new_data(&self) -> bool {
        self.pending.is_some() || !self.receiver.is_empty()
    }
}
