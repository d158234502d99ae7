//! Placeholder tile for coordinates that are neither online nor cached.
//!
//! Renders a neutral grey square with a border, a faint diagonal cross and
//! the words "NO CACHED TILE" in a built-in 5x7 bitmap font, encoded as PNG.

use std::io::Cursor;
use std::sync::Arc;

use image::{ImageFormat, Rgba, RgbaImage};

/// Placeholder size in pixels, matching standard slippy map tiles.
pub const PLACEHOLDER_SIZE: u32 = 256;

/// Text drawn across the middle of the placeholder.
pub const PLACEHOLDER_TEXT: &str = "NO CACHED TILE";

const BACKGROUND: Rgba<u8> = Rgba([224, 224, 224, 255]);
const LINES: Rgba<u8> = Rgba([200, 200, 200, 255]);
const BANNER: Rgba<u8> = Rgba([242, 242, 242, 255]);
const TEXT: Rgba<u8> = Rgba([96, 96, 96, 255]);

const GLYPH_WIDTH: u32 = 5;
const GLYPH_HEIGHT: u32 = 7;
const GLYPH_SCALE: u32 = 2;
const GLYPH_SPACING: u32 = 2;
const BORDER: u32 = 2;

/// Rows of a 5x7 glyph, most significant of the low five bits is the left column.
fn glyph(c: char) -> [u8; 7] {
    match c {
        'A' => [0b01110, 0b10001, 0b10001, 0b11111, 0b10001, 0b10001, 0b10001],
        'C' => [0b01110, 0b10001, 0b10000, 0b10000, 0b10000, 0b10001, 0b01110],
        'D' => [0b11110, 0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b11110],
        'E' => [0b11111, 0b10000, 0b10000, 0b11110, 0b10000, 0b10000, 0b11111],
        'H' => [0b10001, 0b10001, 0b10001, 0b11111, 0b10001, 0b10001, 0b10001],
        'I' => [0b01110, 0b00100, 0b00100, 0b00100, 0b00100, 0b00100, 0b01110],
        'L' => [0b10000, 0b10000, 0b10000, 0b10000, 0b10000, 0b10000, 0b11111],
        'N' => [0b10001, 0b11001, 0b10101, 0b10011, 0b10001, 0b10001, 0b10001],
        'O' => [0b01110, 0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b01110],
        'T' => [0b11111, 0b00100, 0b00100, 0b00100, 0b00100, 0b00100, 0b00100],
        _ => [0; 7],
    }
}

fn text_width(text: &str) -> u32 {
    let chars = text.chars().count() as u32;
    chars * GLYPH_WIDTH * GLYPH_SCALE + chars.saturating_sub(1) * GLYPH_SPACING
}

fn fill_rect(img: &mut RgbaImage, x0: u32, y0: u32, w: u32, h: u32, color: Rgba<u8>) {
    for y in y0..(y0 + h).min(img.height()) {
        for x in x0..(x0 + w).min(img.width()) {
            img.put_pixel(x, y, color);
        }
    }
}

fn draw_text(img: &mut RgbaImage, text: &str, x0: u32, y0: u32) {
    let advance = GLYPH_WIDTH * GLYPH_SCALE + GLYPH_SPACING;
    for (i, c) in text.chars().enumerate() {
        let gx = x0 + i as u32 * advance;
        for (row, bits) in glyph(c).iter().enumerate() {
            for col in 0..GLYPH_WIDTH {
                if bits & (1 << (GLYPH_WIDTH - 1 - col)) != 0 {
                    fill_rect(
                        img,
                        gx + col * GLYPH_SCALE,
                        y0 + row as u32 * GLYPH_SCALE,
                        GLYPH_SCALE,
                        GLYPH_SCALE,
                        TEXT,
                    );
                }
            }
        }
    }
}

/// Draw the placeholder bitmap.
pub fn render_placeholder() -> RgbaImage {
    let size = PLACEHOLDER_SIZE;
    let mut img = RgbaImage::from_pixel(size, size, BACKGROUND);

    for y in 0..size {
        for x in 0..size {
            let is_border = x < BORDER || x >= size - BORDER || y < BORDER || y >= size - BORDER;
            let on_diagonal = x.abs_diff(y) <= 1 || (size - 1 - x).abs_diff(y) <= 1;
            if is_border || on_diagonal {
                img.put_pixel(x, y, LINES);
            }
        }
    }

    let width = text_width(PLACEHOLDER_TEXT);
    let height = GLYPH_HEIGHT * GLYPH_SCALE;
    let x0 = (size - width) / 2;
    let y0 = (size - height) / 2;
    let pad = 6;
    fill_rect(&mut img, x0 - pad, y0 - pad, width + 2 * pad, height + 2 * pad, BANNER);
    draw_text(&mut img, PLACEHOLDER_TEXT, x0, y0);

    img
}

/// The encoded placeholder, rendered once and shared.
#[derive(Debug, Clone)]
pub struct Placeholder {
    png: Arc<[u8]>,
}

impl Placeholder {
    pub fn new() -> Result<Self, image::ImageError> {
        let mut buf = Cursor::new(Vec::new());
        render_placeholder().write_to(&mut buf, ImageFormat::Png)?;
        Ok(Self {
            png: buf.into_inner().into(),
        })
    }

    pub fn png(&self) -> Arc<[u8]> {
        self.png.clone()
    }
}
