// SPDX-FileCopyrightText: OpenTalk GmbH <mail@opentalk.eu>
//
// SPDX-License-Identifier: EUPL-1.2

//! Audio mixing.

use anyhow::Result;
use parking_lot::Mutex;
use std::{
    collections::{BTreeMap, VecDeque},
    sync::{Arc, Weak},
};

use crate::{
    MixedFrame, SourceKey, StreamResampler, Tick, TickClock, AUDIO_CHANNELS,
    AUDIO_SAMPLES_PER_FRAME,
};

/// Interleaved values of one output frame.
const FRAME_SAMPLES: usize = AUDIO_SAMPLES_PER_FRAME * AUDIO_CHANNELS;
/// Ring capacity per source: 10 frames = 200 ms. Latency over memory.
const MAX_BUFFERED_FRAMES: usize = 10;

#[derive(Debug, Default)]
struct AudioSlot {
    /// Normalized interleaved stereo samples waiting to be mixed.
    buffer: VecDeque<i16>,
}

#[derive(Debug, Default)]
struct AudioState {
    next_order: u64,
    slots: BTreeMap<SourceKey, AudioSlot>,
}

/// Mixes all attached audio sources into one frame per tick.
///
/// A tick takes one full frame from every source that has one buffered and
/// averages them; sources with less than a frame keep their samples for
/// the next tick and contribute nothing now. With no ready source the
/// output is silence. Averaging bounds every output sample by the loudest
/// contributing input sample.
#[derive(Debug)]
pub struct AudioMixer {
    clock: TickClock,
    state: Arc<Mutex<AudioState>>,
}

impl AudioMixer {
    #[must_use]
    pub fn new(clock: TickClock) -> Self {
        Self {
            clock,
            state: Arc::new(Mutex::new(AudioState::default())),
        }
    }

    /// Handle for attaching sources from other tasks.
    #[must_use]
    pub fn attacher(&self) -> AudioAttacher {
        AudioAttacher {
            state: Arc::downgrade(&self.state),
        }
    }

    /// Number of currently attached sources.
    #[must_use]
    pub fn source_count(&self) -> usize {
        self.state.lock().slots.len()
    }

    /// Replace the pacing clock, e.g. when recording actually starts and
    /// tick zero should be "now".
    pub fn set_clock(&mut self, clock: TickClock) {
        self.clock = clock;
    }

    /// Block until the next audio tick and mix one frame.
    pub async fn next_frame(&mut self) -> MixedFrame {
        let tick = self.clock.tick().await;
        self.mix(tick)
    }

    fn mix(&self, tick: Tick) -> MixedFrame {
        let mut acc = [0i32; FRAME_SAMPLES];
        let mut ready = 0u32;

        {
            let mut state = self.state.lock();
            for slot in state.slots.values_mut() {
                if slot.buffer.len() < FRAME_SAMPLES {
                    continue;
                }
                ready += 1;
                for (value, sample) in acc.iter_mut().zip(slot.buffer.drain(..FRAME_SAMPLES)) {
                    *value += i32::from(sample);
                }
            }
        }

        if ready == 0 {
            return MixedFrame::silence(tick.index, tick.pts);
        }

        let samples = acc
            .iter()
            .map(|&value| {
                let mixed = (f64::from(value) / f64::from(ready)).round();
                mixed.clamp(f64::from(i16::MIN), f64::from(i16::MAX)) as i16
            })
            .collect();

        MixedFrame {
            tick: tick.index,
            pts: tick.pts,
            samples,
        }
    }
}

/// Attaches new audio sources to a running [`AudioMixer`].
#[derive(Debug, Clone)]
pub struct AudioAttacher {
    state: Weak<Mutex<AudioState>>,
}

impl AudioAttacher {
    /// Attach a source delivering PCM at the given input rate.
    ///
    /// Returns `None` when the mixer has already been torn down.
    pub fn attach(&self, track_id: &str, input_rate: u32) -> Result<Option<AudioSourceHandle>> {
        let Some(state) = self.state.upgrade() else {
            return Ok(None);
        };

        let resampler = StreamResampler::new(input_rate)?;
        let key = {
            let mut state = state.lock();
            let key = SourceKey::new(state.next_order, track_id);
            state.next_order += 1;
            state.slots.insert(key.clone(), AudioSlot::default());
            key
        };
        debug!("attached audio source {key} at {input_rate} Hz");

        Ok(Some(AudioSourceHandle {
            key,
            state: Arc::downgrade(&state),
            resampler,
        }))
    }
}

/// Push side of one attached audio source.
///
/// Owns the normalization state, so resampling happens on the caller's
/// task without holding the mixer lock. Dropping the handle detaches the
/// source.
#[derive(Debug)]
pub struct AudioSourceHandle {
    key: SourceKey,
    state: Weak<Mutex<AudioState>>,
    resampler: StreamResampler,
}

impl AudioSourceHandle {
    #[must_use]
    pub fn key(&self) -> &SourceKey {
        &self.key
    }

    /// Feed interleaved PCM with the given channel count.
    ///
    /// Samples are normalized to 48 kHz stereo and appended to this
    /// source's ring buffer; on overflow the oldest samples are dropped.
    /// Returns `false` when the mixer is gone and the caller should stop
    /// delivering.
    pub fn push(&mut self, interleaved: &[i16], channels: usize) -> Result<bool> {
        let normalized = self.resampler.process(interleaved, channels)?;

        let Some(state) = self.state.upgrade() else {
            return Ok(false);
        };

        let mut state = state.lock();
        let Some(slot) = state.slots.get_mut(&self.key) else {
            return Ok(false);
        };

        slot.buffer.extend(normalized);
        let capacity = MAX_BUFFERED_FRAMES * FRAME_SAMPLES;
        if slot.buffer.len() > capacity {
            let excess = slot.buffer.len() - capacity;
            slot.buffer.drain(..excess);
            trace!("audio source {} overflowed by {excess} samples", self.key);
        }

        Ok(true)
    }
}

impl Drop for AudioSourceHandle {
    fn drop(&mut self) {
        if let Some(state) = self.state.upgrade() {
            state.lock().slots.remove(&self.key);
            debug!("detached audio source {}", self.key);
        }
    }
}
