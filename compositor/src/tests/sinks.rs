// SPDX-FileCopyrightText: OpenTalk GmbH <mail@opentalk.eu>
//
// SPDX-License-Identifier: EUPL-1.2

use super::testing;
use crate::{
    audio_interval, video_interval, AudioMixer, FakeSink, MatroskaParameters, MatroskaSink,
    MediaSink, PictureInPicture, Size, TickClock, VideoCompositor,
};

#[tokio::test(start_paused = true)]
async fn fake_sink_records_tick_order() {
    let mut compositor = VideoCompositor::new(
        Size::HD,
        PictureInPicture::default(),
        TickClock::new(video_interval()),
    );
    let mut mixer = AudioMixer::new(TickClock::new(audio_interval()));

    let mut sink = FakeSink::default();
    let counters = sink.counters();

    for _ in 0..3 {
        let frame = compositor.next_frame().await;
        sink.write_video(&frame).await.unwrap();
        let frame = mixer.next_frame().await;
        sink.write_audio(&frame).await.unwrap();
    }
    sink.finish().await.unwrap();

    assert_eq!(*counters.video_frames.lock(), vec![0, 1, 2]);
    assert_eq!(*counters.audio_frames.lock(), vec![0, 1, 2]);
    assert!(*counters.finished.lock());
}

/// Needs a system ffmpeg; run with `cargo test -- --ignored`.
#[tokio::test]
#[ignore]
async fn matroska_sink_produces_a_playable_file() {
    testing::init();

    let dir = tempfile::tempdir().unwrap();
    let file_path = dir.path().join("out.mkv");

    let mut sink = MatroskaSink::create(
        Size::HD,
        &MatroskaParameters {
            file_path: file_path.clone(),
            crf: 18,
            preset: "ultrafast".to_owned(),
        },
    )
    .await
    .unwrap();

    let mut compositor = VideoCompositor::new(
        Size::HD,
        PictureInPicture::default(),
        TickClock::new(video_interval()),
    );
    let mut mixer = AudioMixer::new(TickClock::new(audio_interval()));

    // two seconds of black video and silence, interleaved so ffmpeg can mux
    for n in 0..100 {
        if n % 5 < 3 {
            let frame = compositor.next_frame().await;
            sink.write_video(&frame).await.unwrap();
        }
        let frame = mixer.next_frame().await;
        sink.write_audio(&frame).await.unwrap();
    }
    sink.finish().await.unwrap();

    let written = std::fs::metadata(&file_path).unwrap().len();
    assert!(written > 0, "no data was written to {file_path:?}");
}
