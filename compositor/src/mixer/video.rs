// SPDX-FileCopyrightText: OpenTalk GmbH <mail@opentalk.eu>
//
// SPDX-License-Identifier: EUPL-1.2

//! Video compositing.

use parking_lot::Mutex;
use std::{
    collections::BTreeMap,
    sync::{Arc, Weak},
    time::Duration,
};
use tokio::time::Instant;

use crate::{
    scaling::{blit, scale_frame},
    ComposedFrame, Layout, Size, SourceKey, Tick, TickClock, VideoFrame,
};

/// How long the last frame of a stalled source keeps its layout slot.
const FRAME_HOLD: Duration = Duration::from_secs(1);

#[derive(Debug)]
struct VideoSlot {
    latest: Option<(Arc<VideoFrame>, Instant)>,
}

#[derive(Debug, Default)]
struct VideoState {
    next_order: u64,
    slots: BTreeMap<SourceKey, VideoSlot>,
}

/// Composites all attached video sources into one output frame per tick.
///
/// Rendering snapshots the source set under a short lock and composes
/// without holding it. With no live sources the output is a solid black
/// frame, so downstream timestamps never stall.
#[derive(Debug)]
pub struct VideoCompositor {
    canvas: Size,
    layout: Box<dyn Layout>,
    clock: TickClock,
    state: Arc<Mutex<VideoState>>,
}

impl VideoCompositor {
    #[must_use]
    pub fn new(canvas: Size, mut layout: impl Layout, clock: TickClock) -> Self {
        layout.set_canvas(canvas);

        Self {
            canvas,
            layout: Box::new(layout),
            clock,
            state: Arc::new(Mutex::new(VideoState::default())),
        }
    }

    /// Handle for attaching sources from other tasks.
    #[must_use]
    pub fn attacher(&self) -> VideoAttacher {
        VideoAttacher {
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

    /// Block until the next video tick and compose one frame.
    pub async fn next_frame(&mut self) -> ComposedFrame {
        let tick = self.clock.tick().await;
        self.compose(tick)
    }

    fn compose(&self, tick: Tick) -> ComposedFrame {
        let now = Instant::now();

        // Snapshot the live frames in stable source order.
        let frames: Vec<Arc<VideoFrame>> = {
            let state = self.state.lock();
            state
                .slots
                .values()
                .filter_map(|slot| slot.latest.as_ref())
                .filter(|(_, at)| now.duration_since(*at) <= FRAME_HOLD)
                .map(|(frame, _)| Arc::clone(frame))
                .collect()
        };

        let mut canvas = VideoFrame::black(self.canvas);

        let sizes: Vec<Size> = frames.iter().map(|frame| frame.size()).collect();
        for (frame, view) in frames.iter().zip(self.layout.arrange(&sizes)) {
            let Some(view) = view else {
                continue;
            };
            let scaled = scale_frame(frame, view.size);
            blit(&mut canvas, &scaled, view.pos);
        }

        ComposedFrame {
            tick: tick.index,
            pts: tick.pts,
            frame: canvas,
        }
    }
}

/// Attaches new video sources to a running [`VideoCompositor`].
#[derive(Debug, Clone)]
pub struct VideoAttacher {
    state: Weak<Mutex<VideoState>>,
}

impl VideoAttacher {
    /// Attach a source for the given track.
    ///
    /// Returns `None` when the compositor has already been torn down.
    #[must_use]
    pub fn attach(&self, track_id: &str) -> Option<VideoSourceHandle> {
        let state = self.state.upgrade()?;
        let key = {
            let mut state = state.lock();
            let key = SourceKey::new(state.next_order, track_id);
            state.next_order += 1;
            state.slots.insert(key.clone(), VideoSlot { latest: None });
            key
        };
        debug!("attached video source {key}");

        Some(VideoSourceHandle {
            key,
            state: Arc::downgrade(&state),
        })
    }
}

/// Push side of one attached video source.
///
/// Dropping the handle detaches the source; the layout re-flows on the
/// next tick.
#[derive(Debug)]
pub struct VideoSourceHandle {
    key: SourceKey,
    state: Weak<Mutex<VideoState>>,
}

impl VideoSourceHandle {
    #[must_use]
    pub fn key(&self) -> &SourceKey {
        &self.key
    }

    /// Replace the most recent frame of this source.
    ///
    /// Returns `false` when the compositor is gone and the caller should
    /// stop delivering.
    pub fn push(&self, frame: VideoFrame) -> bool {
        let Some(state) = self.state.upgrade() else {
            return false;
        };

        let mut state = state.lock();
        match state.slots.get_mut(&self.key) {
            Some(slot) => {
                slot.latest = Some((Arc::new(frame), Instant::now()));
                true
            }
            None => false,
        }
    }
}

impl Drop for VideoSourceHandle {
    fn drop(&mut self) {
        if let Some(state) = self.state.upgrade() {
            state.lock().slots.remove(&self.key);
            debug!("detached video source {}", self.key);
        }
    }
}
