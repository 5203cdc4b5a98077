//! Back-to-back placement of inbound audio on the output clock.

use std::collections::HashSet;
use tokio::sync::mpsc;

use crate::audio::{PlaybackBuffer, PlaybackDevice, PlaybackId};
use crate::error::BridgeError;

/// Playback cursor plus the buffers still in flight.
///
/// `next_start_time` only moves forward between resets, so consecutive
/// buffers never overlap and never start before the clock.
#[derive(Debug, Default)]
pub struct PlaybackSchedule {
    next_start_time: f64,
    active: HashSet<PlaybackId>,
}

impl PlaybackSchedule {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_start_time(&self) -> f64 {
        self.next_start_time
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    pub fn is_active(&self, id: PlaybackId) -> bool {
        self.active.contains(&id)
    }

    /// Place `buffer` right after the current tail (or now, if the tail is in
    /// the past) and advance the cursor by its duration.
    ///
    /// The cursor advances from the start the device reports, which is later
    /// than requested if its clock moved past it in the meantime.
    ///
    /// Returns the id and the start time used. On a device error the cursor
    /// is left untouched.
    pub fn schedule<P>(
        &mut self,
        device: &P,
        buffer: PlaybackBuffer,
        ended: mpsc::UnboundedSender<PlaybackId>,
    ) -> Result<(PlaybackId, f64), BridgeError>
    where
        P: PlaybackDevice + ?Sized,
    {
        let requested = self.next_start_time.max(device.now());
        let duration = buffer.duration();
        let (id, start_at) = device.schedule(buffer, requested, ended)?;
        self.next_start_time = start_at + duration;
        self.active.insert(id);
        Ok((id, start_at))
    }

    /// A buffer played to the end. Returns false for ids no longer tracked.
    pub fn finished(&mut self, id: PlaybackId) -> bool {
        self.active.remove(&id)
    }

    /// Forget every in-flight buffer and rewind the cursor to zero.
    /// The caller halts the returned ids on the device.
    pub fn reset(&mut self) -> Vec<PlaybackId> {
        self.next_start_time = 0.0;
        self.active.drain().collect()
    }
}
