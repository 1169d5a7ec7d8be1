// SPDX-FileCopyrightText: OpenTalk GmbH <mail@opentalk.eu>
//
// SPDX-License-Identifier: EUPL-1.2

use super::testing;
use crate::{video_interval, PictureInPicture, Size, TickClock, VideoCompositor};
use std::time::Duration;

fn compositor() -> VideoCompositor {
    testing::init();
    VideoCompositor::new(
        Size::HD,
        PictureInPicture::default(),
        TickClock::new(video_interval()),
    )
}

#[tokio::test(start_paused = true)]
async fn no_sources_give_black_frames_at_the_target_rate() {
    let mut compositor = compositor();

    for expected in 0..5u64 {
        let composed = compositor.next_frame().await;
        assert_eq!(composed.tick, expected);
        assert_eq!(composed.frame.width, 1280);
        assert_eq!(composed.frame.height, 720);
        assert!(composed.frame.y_plane().iter().all(|&value| value == 16));
        assert!(composed.frame.u_plane().iter().all(|&value| value == 128));
    }
}

#[tokio::test(start_paused = true)]
async fn single_source_is_letterboxed() {
    let mut compositor = compositor();
    let attacher = compositor.attacher();

    let source = attacher.attach("camera-0").unwrap();
    assert!(source.push(testing::solid_frame(Size::SD, 200, 128, 128)));

    let composed = compositor.next_frame().await;

    // the 960x720 pillarboxed image is centered
    assert_eq!(testing::luma_at(&composed.frame, 640, 360), 200);
    assert_eq!(testing::luma_at(&composed.frame, 160, 0), 200);
    // the side bars stay black
    assert_eq!(testing::luma_at(&composed.frame, 80, 360), 16);
    assert_eq!(testing::luma_at(&composed.frame, 1200, 360), 16);
}

#[tokio::test(start_paused = true)]
async fn second_source_lands_in_the_bottom_right_tile() {
    let mut compositor = compositor();
    let attacher = compositor.attacher();

    let main = attacher.attach("camera-main").unwrap();
    let inset = attacher.attach("camera-inset").unwrap();
    assert!(main.push(testing::solid_frame(Size::HD, 200, 128, 128)));
    assert!(inset.push(testing::solid_frame(
        Size {
            width: 640,
            height: 360
        },
        100,
        128,
        128
    )));

    let composed = compositor.next_frame().await;

    // tile area: 320x180 at (950, 530)
    assert_eq!(testing::luma_at(&composed.frame, 1000, 600), 100);
    assert_eq!(testing::luma_at(&composed.frame, 951, 531), 100);
    // main image everywhere else
    assert_eq!(testing::luma_at(&composed.frame, 400, 300), 200);
    assert_eq!(testing::luma_at(&composed.frame, 940, 600), 200);
}

#[tokio::test(start_paused = true)]
async fn main_source_is_the_earliest_attached() {
    let mut compositor = compositor();
    let attacher = compositor.attacher();

    let first = attacher.attach("camera-1").unwrap();
    let second = attacher.attach("camera-2").unwrap();
    assert!(first.push(testing::solid_frame(Size::HD, 180, 128, 128)));
    assert!(second.push(testing::solid_frame(Size::HD, 60, 128, 128)));

    let composed = compositor.next_frame().await;
    // center belongs to the first source, tile to the second
    assert_eq!(testing::luma_at(&composed.frame, 640, 100), 180);
    assert_eq!(testing::luma_at(&composed.frame, 1000, 600), 60);

    // dropping the main promotes the second source on the next tick
    drop(first);
    let composed = compositor.next_frame().await;
    assert_eq!(testing::luma_at(&composed.frame, 640, 100), 60);
}

#[tokio::test(start_paused = true)]
async fn stalled_sources_lose_their_slot_after_a_second() {
    let mut compositor = compositor();
    let attacher = compositor.attacher();

    let source = attacher.attach("camera-0").unwrap();
    assert!(source.push(testing::solid_frame(Size::SD, 200, 128, 128)));

    let composed = compositor.next_frame().await;
    assert_eq!(testing::luma_at(&composed.frame, 640, 360), 200);

    tokio::time::advance(Duration::from_millis(1500)).await;

    // the held frame expired, the layout re-flows to an empty canvas
    let composed = compositor.next_frame().await;
    assert!(composed.frame.y_plane().iter().all(|&value| value == 16));

    // a fresh frame brings the source back
    assert!(source.push(testing::solid_frame(Size::SD, 200, 128, 128)));
    let composed = compositor.next_frame().await;
    assert_eq!(testing::luma_at(&composed.frame, 640, 360), 200);
}

#[tokio::test(start_paused = true)]
async fn dropping_the_compositor_stops_accepting_frames() {
    let compositor = compositor();
    let attacher = compositor.attacher();
    let source = attacher.attach("camera-0").unwrap();

    drop(compositor);

    assert!(!source.push(testing::solid_frame(Size::SD, 200, 128, 128)));
    assert!(attacher.attach("camera-1").is_none());
}
