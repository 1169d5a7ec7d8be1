// SPDX-FileCopyrightText: OpenTalk GmbH <mail@opentalk.eu>
//
// SPDX-License-Identifier: EUPL-1.2

//! Geometry and pixel work: aspect-preserving fits, bilinear rescaling of
//! YUV420P frames and plane-aligned blitting.
//!
//! All produced dimensions and positions are even so the half-resolution
//! chroma planes stay aligned with the luma plane.

use crate::{Position, Size, VideoFrame};

fn even_down(value: usize) -> usize {
    value & !1
}

fn even_up(value: usize) -> usize {
    value + (value & 1)
}

/// Fit `source` into `canvas` preserving its aspect ratio.
///
/// Returns the scaled size and the centered position (letterbox or
/// pillarbox). The scaled size never exceeds the canvas; dimensions are
/// rounded down to even values.
#[must_use]
pub fn letterbox(source: Size, canvas: Size) -> (Size, Position) {
    if source.width == 0 || source.height == 0 {
        return (canvas, Position::default());
    }

    let scale = (canvas.width as f64 / source.width as f64)
        .min(canvas.height as f64 / source.height as f64);

    let size = Size {
        width: even_down(((source.width as f64 * scale) as usize).min(canvas.width)),
        height: even_down(((source.height as f64 * scale) as usize).min(canvas.height)),
    };
    let pos = Position {
        x: even_down((canvas.width - size.width) / 2) as i64,
        y: even_down((canvas.height - size.height) / 2) as i64,
    };

    (size, pos)
}

/// Scale `source` to the given width preserving its aspect ratio.
///
/// The height is rounded up to the next even value.
#[must_use]
pub fn fit_width(source: Size, width: usize) -> Size {
    if source.width == 0 || source.height == 0 {
        return Size { width, height: 0 };
    }

    let height = (width as f64 * source.height as f64 / source.width as f64).round() as usize;

    Size {
        width: even_down(width),
        height: even_up(height),
    }
}

/// Bilinear resize of a single plane.
fn scale_plane(src: &[u8], src_w: usize, src_h: usize, dst: &mut [u8], dst_w: usize, dst_h: usize) {
    if src_w == dst_w && src_h == dst_h {
        dst.copy_from_slice(src);
        return;
    }

    let x_ratio = src_w as f32 / dst_w as f32;
    let y_ratio = src_h as f32 / dst_h as f32;

    for dy in 0..dst_h {
        let sy = ((dy as f32 + 0.5) * y_ratio - 0.5).max(0.0);
        let y0 = (sy as usize).min(src_h - 1);
        let y1 = (y0 + 1).min(src_h - 1);
        let fy = sy - y0 as f32;

        for dx in 0..dst_w {
            let sx = ((dx as f32 + 0.5) * x_ratio - 0.5).max(0.0);
            let x0 = (sx as usize).min(src_w - 1);
            let x1 = (x0 + 1).min(src_w - 1);
            let fx = sx - x0 as f32;

            let top = src[y0 * src_w + x0] as f32 * (1.0 - fx) + src[y0 * src_w + x1] as f32 * fx;
            let bottom =
                src[y1 * src_w + x0] as f32 * (1.0 - fx) + src[y1 * src_w + x1] as f32 * fx;
            dst[dy * dst_w + dx] = (top * (1.0 - fy) + bottom * fy + 0.5) as u8;
        }
    }
}

/// Bilinear resize of a whole frame to the given even target size.
#[must_use]
pub fn scale_frame(source: &VideoFrame, target: Size) -> VideoFrame {
    let mut scaled = VideoFrame::black(target);
    {
        let (y, u, v) = scaled.planes_mut();
        scale_plane(
            source.y_plane(),
            source.width,
            source.height,
            y,
            target.width,
            target.height,
        );
        scale_plane(
            source.u_plane(),
            source.width / 2,
            source.height / 2,
            u,
            target.width / 2,
            target.height / 2,
        );
        scale_plane(
            source.v_plane(),
            source.width / 2,
            source.height / 2,
            v,
            target.width / 2,
            target.height / 2,
        );
    }

    scaled
}

/// Copy `src` into `dst` at the given position.
///
/// The position is clamped to even coordinates; parts of `src` that would
/// fall outside of `dst` are clipped.
pub fn blit(dst: &mut VideoFrame, src: &VideoFrame, pos: Position) {
    let x = even_down(pos.x.max(0) as usize).min(dst.width);
    let y = even_down(pos.y.max(0) as usize).min(dst.height);
    let w = src.width.min(dst.width - x);
    let h = src.height.min(dst.height - y);
    if w == 0 || h == 0 {
        return;
    }

    let (dst_w, dst_h) = (dst.width, dst.height);
    let (dy, du, dv) = dst.planes_mut();

    copy_rect(src.y_plane(), src.width, dy, dst_w, x, y, w, h);
    copy_rect(
        src.u_plane(),
        src.width / 2,
        du,
        dst_w / 2,
        x / 2,
        y / 2,
        w / 2,
        h / 2,
    );
    copy_rect(
        src.v_plane(),
        src.width / 2,
        dv,
        dst_w / 2,
        x / 2,
        y / 2,
        w / 2,
        h / 2,
    );

    debug_assert!(y + h <= dst_h);
}

#[allow(clippy::too_many_arguments)]
fn copy_rect(
    src: &[u8],
    src_stride: usize,
    dst: &mut [u8],
    dst_stride: usize,
    x: usize,
    y: usize,
    w: usize,
    h: usize,
) {
    for row in 0..h {
        let s = row * src_stride;
        let d = (y + row) * dst_stride + x;
        dst[d..d + w].copy_from_slice(&src[s..s + w]);
    }
}
