// SPDX-FileCopyrightText: OpenTalk GmbH <mail@opentalk.eu>
//
// SPDX-License-Identifier: EUPL-1.2

use super::{Layout, Position, Size, View};
use crate::scaling::{fit_width, letterbox};

/// Fraction of the canvas width used by one inset tile (1/4 = 320 px on HD).
const TILE_DIVISOR: usize = 4;
/// Distance of the tiles from the canvas edges and between stacked tiles.
const TILE_PADDING: usize = 10;

/// Picture-in-picture layout.
///
/// The main source is letterboxed onto the full canvas. Every further
/// source becomes a quarter-width tile with its aspect ratio preserved,
/// stacked upward from the bottom-right corner with [`TILE_PADDING`]
/// pixels of spacing. When the stack would leave the canvas, tiles are
/// dropped lowest source order first, so the most recently attached
/// sources stay visible.
#[derive(Debug, Clone)]
pub struct PictureInPicture {
    canvas: Size,
}

impl Default for PictureInPicture {
    fn default() -> Self {
        Self { canvas: Size::HD }
    }
}

impl Layout for PictureInPicture {
    fn set_canvas(&mut self, canvas: Size) {
        self.canvas = canvas;
    }

    fn arrange(&self, sources: &[Size]) -> Vec<Option<View>> {
        match sources {
            [] => Vec::new(),
            [main] => vec![Some(self.main_view(*main))],
            [main, rest @ ..] => {
                let mut views = vec![Some(self.main_view(*main))];
                views.extend(self.tile_views(rest));
                views
            }
        }
    }
}

impl PictureInPicture {
    fn main_view(&self, source: Size) -> View {
        let (size, pos) = letterbox(source, self.canvas);
        View { pos, size }
    }

    /// Views of the inset tiles, one entry per secondary source.
    fn tile_views(&self, sources: &[Size]) -> Vec<Option<View>> {
        let tile_width = self.canvas.width / TILE_DIVISOR;
        let sizes: Vec<Size> = sources
            .iter()
            .map(|source| fit_width(*source, tile_width))
            .collect();

        // Walk from the highest source order down and keep what still fits;
        // everything below the cut is dropped.
        let available = self.canvas.height.saturating_sub(2 * TILE_PADDING);
        let mut used = 0;
        let mut first_shown = sizes.len();
        for (n, size) in sizes.iter().enumerate().rev() {
            let needed = size.height + if used == 0 { 0 } else { TILE_PADDING };
            if used + needed > available {
                break;
            }
            used += needed;
            first_shown = n;
        }

        // Stack the surviving tiles in source order from the bottom upward.
        let x = (self.canvas.width - tile_width - TILE_PADDING) as i64;
        let mut bottom = (self.canvas.height - TILE_PADDING) as i64;
        let mut views = vec![None; sizes.len()];
        for (n, size) in sizes.iter().enumerate().skip(first_shown) {
            let y = bottom - size.height as i64;
            views[n] = Some(View {
                pos: Position { x, y },
                size: *size,
            });
            bottom = y - TILE_PADDING as i64;
        }

        views
    }
}
