// SPDX-FileCopyrightText: OpenTalk GmbH <mail@opentalk.eu>
//
// SPDX-License-Identifier: EUPL-1.2

//! Sink without any output, for tests.

use anyhow::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;

use crate::{ComposedFrame, MediaSink, MixedFrame};

/// Counters shared between a [`FakeSink`] and the test observing it.
#[derive(Debug, Default)]
pub struct FakeSinkCounters {
    pub video_frames: Mutex<Vec<u64>>,
    pub audio_frames: Mutex<Vec<u64>>,
    pub finished: Mutex<bool>,
}

/// Swallows all frames and records their tick indices.
#[derive(Debug, Default)]
pub struct FakeSink {
    counters: Arc<FakeSinkCounters>,
}

impl FakeSink {
    #[must_use]
    pub fn counters(&self) -> Arc<FakeSinkCounters> {
        Arc::clone(&self.counters)
    }
}

#[async_trait]
impl MediaSink for FakeSink {
    async fn write_video(&mut self, frame: &ComposedFrame) -> Result<()> {
        self.counters.video_frames.lock().push(frame.tick);
        Ok(())
    }

    async fn write_audio(&mut self, frame: &MixedFrame) -> Result<()> {
        self.counters.audio_frames.lock().push(frame.tick);
        Ok(())
    }

    async fn finish(&mut self) -> Result<()> {
        *self.counters.finished.lock() = true;
        Ok(())
    }
}
