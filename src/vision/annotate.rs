// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Draws detections onto the uploaded image

use ab_glyph::{FontRef, InvalidFont, PxScale};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_hollow_rect_mut, draw_text_mut, text_size};
use imageproc::rect::Rect;

use super::detection::Detection;

/// Box and label colour
pub const BOX_COLOR: Rgb<u8> = Rgb([0, 255, 0]);

/// Label font size in pixels
pub const LABEL_SCALE: f32 = 18.0;

/// Gap between the label baseline and the box edge
const LABEL_MARGIN: i32 = 4;

static FONT_DATA: &[u8] = include_bytes!("../../assets/DejaVuSans.ttf");

/// Renders boxes and `"<class> <confidence>"` labels
#[derive(Debug, Clone)]
pub struct Annotator {
    font: FontRef<'static>,
    scale: PxScale,
}

impl Annotator {
    /// Annotator using the embedded DejaVu Sans font
    pub fn new() -> Result<Self, InvalidFont> {
        let font = FontRef::try_from_slice(FONT_DATA)?;
        Ok(Self {
            font,
            scale: PxScale::from(LABEL_SCALE),
        })
    }

    /// Draw every detection in place
    pub fn draw(&self, image: &mut RgbImage, detections: &[Detection]) {
        for detection in detections {
            self.draw_box(image, detection);
            self.draw_label(image, detection);
        }
    }

    fn draw_box(&self, image: &mut RgbImage, detection: &Detection) {
        let bbox = &detection.bbox;
        let (x, y) = (bbox.x1 as i32, bbox.y1 as i32);
        let (w, h) = (bbox.width().max(1), bbox.height().max(1));

        draw_hollow_rect_mut(image, Rect::at(x, y).of_size(w, h), BOX_COLOR);
        // Second, inset outline for a 2 px stroke
        if w > 2 && h > 2 {
            draw_hollow_rect_mut(image, Rect::at(x + 1, y + 1).of_size(w - 2, h - 2), BOX_COLOR);
        }
    }

    fn draw_label(&self, image: &mut RgbImage, detection: &Detection) {
        let label = label_text(detection);
        let (text_w, text_h) = text_size(self.scale, &self.font, &label);
        let (x, y) = label_origin(
            (detection.bbox.x1, detection.bbox.y1),
            (text_w, text_h),
            image.dimensions(),
        );
        draw_text_mut(image, BOX_COLOR, x, y, self.scale, &self.font, &label);
    }
}

/// `"<class> <confidence:.2>"`
pub fn label_text(detection: &Detection) -> String {
    format!("{} {:.2}", detection.class_name, detection.confidence)
}

/// Top-left of the label: above the box when there is room, otherwise just
/// inside it. Always kept within the image.
fn label_origin(anchor: (u32, u32), text: (u32, u32), image: (u32, u32)) -> (i32, i32) {
    let (anchor_x, anchor_y) = (anchor.0 as i32, anchor.1 as i32);
    let (text_w, text_h) = (text.0 as i32, text.1 as i32);
    let (img_w, img_h) = (image.0 as i32, image.1 as i32);

    let above = anchor_y - text_h - LABEL_MARGIN;
    let y = if above >= 0 { above } else { anchor_y + LABEL_MARGIN };
    let y = y.min(img_h - text_h).max(0);
    let x = anchor_x.min(img_w - text_w).max(0);

    (x, y)
}
