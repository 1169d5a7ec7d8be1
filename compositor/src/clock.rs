// SPDX-FileCopyrightText: OpenTalk GmbH <mail@opentalk.eu>
//
// SPDX-License-Identifier: EUPL-1.2

//! Pacemaker tick generation.
//!
//! Both output streams are driven by a [`TickClock`]: an evenly spaced,
//! monotonic stream of deadlines derived from a fixed epoch. Every tick's
//! deadline is `epoch + index * interval`, never "previous wake time plus
//! interval", so scheduling jitter is bounded per tick and does not
//! accumulate over the lifetime of a session.

use std::time::Duration;
use tokio::time::{sleep_until, Instant};

/// Video output rate in frames per second.
pub const VIDEO_FRAMERATE: u32 = 30;
/// Audio output rate in Hz.
pub const AUDIO_SAMPLE_RATE: u32 = 48_000;
/// Audio output channel count (stereo).
pub const AUDIO_CHANNELS: usize = 2;
/// Samples per channel in one audio frame (20 ms at 48 kHz).
pub const AUDIO_SAMPLES_PER_FRAME: usize = 960;

/// Interval between two video ticks.
#[must_use]
pub fn video_interval() -> Duration {
    Duration::from_nanos(1_000_000_000 / u64::from(VIDEO_FRAMERATE))
}

/// Interval between two audio ticks (one 960 sample frame).
#[must_use]
pub fn audio_interval() -> Duration {
    Duration::from_millis(20)
}

/// A single scheduling event of a [`TickClock`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tick {
    /// Zero-based tick index since the clock epoch.
    pub index: u64,
    /// Media time of this tick relative to the epoch.
    pub pts: Duration,
}

/// Evenly spaced monotonic tick source.
#[derive(Debug)]
pub struct TickClock {
    epoch: Instant,
    interval: Duration,
    index: u64,
}

impl TickClock {
    /// Create a clock whose epoch is now.
    #[must_use]
    pub fn new(interval: Duration) -> Self {
        Self::with_epoch(Instant::now(), interval)
    }

    /// Create a clock with an explicit epoch, e.g. to share one session
    /// start time between the video and the audio clock.
    #[must_use]
    pub fn with_epoch(epoch: Instant, interval: Duration) -> Self {
        Self {
            epoch,
            interval,
            index: 0,
        }
    }

    /// The epoch all deadlines are computed from.
    #[must_use]
    pub fn epoch(&self) -> Instant {
        self.epoch
    }

    /// Deadline of the tick with the given index.
    #[must_use]
    pub fn deadline(&self, index: u64) -> Instant {
        self.epoch + Duration::from_nanos((self.interval.as_nanos() as u64).saturating_mul(index))
    }

    /// Sleep until the next deadline and return its tick.
    ///
    /// If the task is woken late the tick is still emitted (the next ticks
    /// then fire back to back until the clock caught up); ticks are never
    /// skipped and never reordered.
    pub async fn tick(&mut self) -> Tick {
        let index = self.index;
        self.index += 1;

        sleep_until(self.deadline(index)).await;

        Tick {
            index,
            pts: Duration::from_nanos((self.interval.as_nanos() as u64).saturating_mul(index)),
        }
    }
}
