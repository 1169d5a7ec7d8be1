// SPDX-FileCopyrightText: OpenTalk GmbH <mail@opentalk.eu>
//
// SPDX-License-Identifier: EUPL-1.2

mod clock;
mod layout;
mod scaling;
mod sinks;
mod video;

pub mod testing {

    use crate::*;
    use std::sync::Once;

    static INIT: Once = Once::new();

    /// initialize for testing
    pub fn init() {
        INIT.call_once(|| {
            env_logger::try_init().ok();
        });
    }

    /// frame filled with one solid YUV color
    pub fn solid_frame(size: Size, y: u8, u: u8, v: u8) -> VideoFrame {
        let mut data = vec![y; size.width * size.height];
        data.resize(size.width * size.height * 5 / 4, u);
        data.resize(VideoFrame::buffer_len(size.width, size.height), v);

        VideoFrame::from_yuv420(size.width, size.height, data).unwrap()
    }

    /// luma value of the composed frame at the given pixel
    pub fn luma_at(frame: &VideoFrame, x: usize, y: usize) -> u8 {
        frame.y_plane()[y * frame.width + x]
    }

    /// one full interleaved stereo frame filled with a constant value
    pub fn constant_samples(value: i16) -> Vec<i16> {
        vec![value; AUDIO_SAMPLES_PER_FRAME * AUDIO_CHANNELS]
    }
}
