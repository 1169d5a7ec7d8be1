// SPDX-FileCopyrightText: OpenTalk GmbH <mail@opentalk.eu>
//
// SPDX-License-Identifier: EUPL-1.2

use crate::{audio_interval, video_interval, TickClock};
use std::time::Duration;
use tokio::time::Instant;

#[test]
fn intervals() {
    assert_eq!(video_interval(), Duration::from_nanos(33_333_333));
    assert_eq!(audio_interval(), Duration::from_millis(20));
}

#[tokio::test(start_paused = true)]
async fn deadlines_come_from_the_epoch() {
    let epoch = Instant::now();
    let clock = TickClock::with_epoch(epoch, Duration::from_millis(20));

    // deadline is epoch + index * interval, independent of wake times
    assert_eq!(clock.deadline(0), epoch);
    assert_eq!(clock.deadline(5), epoch + Duration::from_millis(100));
    assert_eq!(clock.deadline(50), epoch + Duration::from_secs(1));
}

#[tokio::test(start_paused = true)]
async fn ticks_are_monotonic_and_complete() {
    let mut clock = TickClock::new(Duration::from_millis(20));

    for expected in 0..25u64 {
        let tick = clock.tick().await;
        assert_eq!(tick.index, expected);
        assert_eq!(tick.pts, Duration::from_millis(20 * expected));
    }
}

#[tokio::test(start_paused = true)]
async fn late_wakeup_does_not_skip_ticks() {
    let mut clock = TickClock::new(Duration::from_millis(20));

    let first = clock.tick().await;
    // miss several deadlines
    tokio::time::advance(Duration::from_millis(100)).await;

    let second = clock.tick().await;
    let third = clock.tick().await;

    assert_eq!(first.index, 0);
    assert_eq!(second.index, 1);
    assert_eq!(third.index, 2);
}
