// SPDX-FileCopyrightText: OpenTalk GmbH <mail@opentalk.eu>
//
// SPDX-License-Identifier: EUPL-1.2

use crate::{Layout, PictureInPicture, Position, Size, View};

fn layout() -> PictureInPicture {
    let mut layout = PictureInPicture::default();
    layout.set_canvas(Size::HD);
    layout
}

#[test]
fn no_sources_no_views() {
    assert!(layout().arrange(&[]).is_empty());
}

#[test]
fn single_wide_source_fills_the_canvas() {
    let views = layout().arrange(&[Size::FHD]);

    assert_eq!(
        views,
        vec![Some(View {
            pos: Position { x: 0, y: 0 },
            size: Size::HD,
        })]
    );
}

#[test]
fn single_narrow_source_is_pillarboxed() {
    let views = layout().arrange(&[Size::SD]);

    // 640x480 scaled by 1.5 and centered
    assert_eq!(
        views,
        vec![Some(View {
            pos: Position { x: 160, y: 0 },
            size: Size {
                width: 960,
                height: 720,
            },
        })]
    );
}

#[test]
fn second_source_becomes_a_bottom_right_tile() {
    let views = layout().arrange(&[
        Size::HD,
        Size {
            width: 640,
            height: 360,
        },
    ]);

    assert_eq!(views.len(), 2);
    // quarter canvas width, aspect preserved, 10 px off both edges
    assert_eq!(
        views[1],
        Some(View {
            pos: Position { x: 950, y: 530 },
            size: Size {
                width: 320,
                height: 180,
            },
        })
    );
}

#[test]
fn overflowing_tiles_are_dropped_lowest_order_first() {
    let tile_source = Size {
        width: 640,
        height: 360,
    };
    // five 180 px tiles plus spacing do not fit into 700 px
    let views = layout().arrange(&[
        Size::HD,
        tile_source,
        tile_source,
        tile_source,
        tile_source,
        tile_source,
    ]);

    assert_eq!(views.len(), 6);
    assert!(views[0].is_some());
    // the two oldest secondary sources lose their slots
    assert_eq!(views[1], None);
    assert_eq!(views[2], None);

    // the survivors stack upward from the bottom edge
    let ys: Vec<i64> = views[3..]
        .iter()
        .map(|view| view.as_ref().unwrap().pos.y)
        .collect();
    assert_eq!(ys, vec![530, 340, 150]);
}

#[test]
fn tile_heights_follow_the_source_aspect() {
    let views = layout().arrange(&[
        Size::HD,
        // portrait source: 320 wide means 426.6 -> 428 px high
        Size {
            width: 480,
            height: 640,
        },
    ]);

    let tile = views[1].as_ref().unwrap();
    assert_eq!(tile.size.width, 320);
    assert_eq!(tile.size.height, 428);
    assert_eq!(tile.pos.y, 720 - 10 - 428);
}
