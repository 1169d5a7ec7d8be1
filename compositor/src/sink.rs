// SPDX-FileCopyrightText: OpenTalk GmbH <mail@opentalk.eu>
//
// SPDX-License-Identifier: EUPL-1.2

//! Sink trait.

use anyhow::Result;
use async_trait::async_trait;
use std::fmt::Debug;

use crate::{ComposedFrame, MixedFrame};

/// Trait of an output sink.
///
/// A sink receives the composed video frames and mixed audio frames in
/// strict tick order per stream and turns them into whatever output it
/// produces. Once [`MediaSink::finish`] returned, the output is final and
/// must not be touched again.
#[async_trait]
pub trait MediaSink: Send + Debug + 'static {
    /// Write one composed video frame.
    async fn write_video(&mut self, frame: &ComposedFrame) -> Result<()>;

    /// Write one mixed audio frame.
    async fn write_audio(&mut self, frame: &MixedFrame) -> Result<()>;

    /// Flush all pending data and finalize the output.
    ///
    /// Callers bound the duration of this with a timeout; the sink itself
    /// may block until its writer is done.
    async fn finish(&mut self) -> Result<()>;
}
