// SPDX-FileCopyrightText: OpenTalk GmbH <mail@opentalk.eu>
//
// SPDX-License-Identifier: EUPL-1.2

//! Per-source audio normalization.
//!
//! Every audio source carries its own [`StreamResampler`] which converts
//! whatever PCM the decoder produces into 48 kHz interleaved stereo S16.
//! The resampler is stateful: its filter memory survives across pushes, so
//! a source delivering odd-sized packets does not produce clicks.

use anyhow::{Context, Result};
use rubato::{FftFixedIn, Resampler};

use crate::{AUDIO_CHANNELS, AUDIO_SAMPLE_RATE};

/// Input chunk size of the FFT resampler.
const CHUNK_SIZE: usize = 1024;
/// Number of FFT sub chunks, trading latency against quality.
const SUB_CHUNKS: usize = 2;

/// Stateful converter from arbitrary-rate PCM to 48 kHz stereo S16.
pub struct StreamResampler {
    input_rate: u32,
    /// `None` when the input already is 48 kHz (pass-through).
    inner: Option<FftFixedIn<f32>>,
    /// Planar stereo samples waiting for a full resampler chunk.
    pending: [Vec<f32>; AUDIO_CHANNELS],
}

impl std::fmt::Debug for StreamResampler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamResampler")
            .field("input_rate", &self.input_rate)
            .field("pending", &self.pending[0].len())
            .finish()
    }
}

impl StreamResampler {
    /// Create a resampler for the given input sample rate.
    pub fn new(input_rate: u32) -> Result<Self> {
        let inner = if input_rate == AUDIO_SAMPLE_RATE {
            None
        } else {
            Some(
                FftFixedIn::new(
                    input_rate as usize,
                    AUDIO_SAMPLE_RATE as usize,
                    CHUNK_SIZE,
                    SUB_CHUNKS,
                    AUDIO_CHANNELS,
                )
                .with_context(|| format!("unable to create resampler for {input_rate} Hz"))?,
            )
        };

        Ok(Self {
            input_rate,
            inner,
            pending: [Vec::new(), Vec::new()],
        })
    }

    #[must_use]
    pub fn input_rate(&self) -> u32 {
        self.input_rate
    }

    /// Feed interleaved samples with the given channel count and return all
    /// normalized output that became available.
    ///
    /// Mono input is duplicated onto both channels, surplus channels beyond
    /// stereo are ignored.
    pub fn process(&mut self, interleaved: &[i16], channels: usize) -> Result<Vec<i16>> {
        if channels == 0 {
            return Ok(Vec::new());
        }

        let frames = interleaved.len() / channels;

        let Some(inner) = &mut self.inner else {
            // Pass-through, only the channel layout may need fixing.
            let mut out = Vec::with_capacity(frames * AUDIO_CHANNELS);
            for frame in interleaved.chunks_exact(channels) {
                let left = frame[0];
                let right = if channels > 1 { frame[1] } else { frame[0] };
                out.push(left);
                out.push(right);
            }
            return Ok(out);
        };

        for frame in interleaved.chunks_exact(channels) {
            let left = f32::from(frame[0]) / 32768.0;
            let right = if channels > 1 {
                f32::from(frame[1]) / 32768.0
            } else {
                left
            };
            self.pending[0].push(left);
            self.pending[1].push(right);
        }

        let mut out = Vec::new();
        while self.pending[0].len() >= CHUNK_SIZE {
            let chunk: Vec<Vec<f32>> = self
                .pending
                .iter_mut()
                .map(|channel| channel.drain(..CHUNK_SIZE).collect())
                .collect();

            let resampled = inner
                .process(&chunk, None)
                .context("resampler chunk failed")?;

            for n in 0..resampled[0].len() {
                for channel in resampled.iter().take(AUDIO_CHANNELS) {
                    out.push((channel[n].clamp(-1.0, 1.0) * 32767.0).round() as i16);
                }
            }
        }

        Ok(out)
    }
}
