// SPDX-FileCopyrightText: OpenTalk GmbH <mail@opentalk.eu>
//
// SPDX-License-Identifier: EUPL-1.2

/*!
    # Purpose
    The *compositor* crate turns any number of live video and audio inputs
    into exactly one output video stream and one output audio stream, paced
    by a shared clock. It is the media core of the lecture recording
    service: sources are attached and detached while running, the
    [VideoCompositor] renders one 1280x720 YUV420P frame per video tick and
    the [AudioMixer] produces one 20 ms stereo S16 frame per audio tick,
    regardless of how many inputs are currently delivering data.

    - [VideoCompositor]
    - [AudioMixer]
    - [TickClock]

    # Source & Sink

    Inputs are fed through handles obtained from the attachers:

    - [VideoAttacher] / [VideoSourceHandle]
      push decoded frames of arbitrary resolution; only the most recent
      frame per source is kept.
    - [AudioAttacher] / [AudioSourceHandle]
      push decoded PCM of arbitrary rate and channel count; samples are
      normalized to 48 kHz stereo S16 on the way into a bounded per-source
      ring buffer.

    Outputs are written into a [MediaSink]:

    - [MatroskaSink]
      feeds an `ffmpeg` child process over loopback TCP and writes a single
      Matroska file (H.264 + AAC).
    - [FakeSink]
      counts frames without producing output, for tests.

    # Layouts

    The composite picture is controlled by a [Layout]:

    - [PictureInPicture]
      letterboxes the main source onto the canvas and stacks every further
      source as a quarter-width inset tile from the bottom-right corner
      upward.

    # Color

    Frames are YUV 4:2:0 planar. The black background follows BT.601
    limited range conventions (black is Y=16, U=V=128).
*/

#![allow(clippy::module_name_repetitions)]

#[macro_use]
extern crate log;

pub mod clock;
pub mod frame;
pub mod layout;
mod mixer;
mod resample;
mod scaling;
mod sink;
mod sinks;

#[cfg(test)]
mod tests;

pub use clock::*;
pub use frame::*;
pub use layout::*;
pub use mixer::*;
pub use resample::*;
pub use scaling::*;
pub use sink::*;
pub use sinks::*;
