use image::{DynamicImage, Rgb, imageops::FilterType};
use ratatui::{buffer::Buffer, layout::Rect, style::Color, widgets::Widget};

use crate::display::DisplayMode;

const ASCII_RAMP: [&str; 10] = [" ", ".", ":", "-", "=", "+", "*", "#", "%", "@"];

/// Scale and crop `image` so it covers `width` x `height` cells in `mode`.
pub fn fit_to_cells(image: &DynamicImage, width: u16, height: u16, mode: DisplayMode) -> DynamicImage {
  let w = u32::from(width).max(1);
  let h = (u32::from(height) * mode.rows_per_cell()).max(1);
  image.resize_to_fill(w, h, FilterType::Triangle)
}

/// Draws an already fitted image (see [`fit_to_cells`]), centered in its area.
pub struct ThumbnailWidget<'a> {
  pub image: &'a DynamicImage,
  pub mode: DisplayMode,
}

fn luminance(p: &Rgb<u8>) -> f32 {
  0.299 * f32::from(p[0]) + 0.587 * f32::from(p[1]) + 0.114 * f32::from(p[2])
}

fn rgb(p: &Rgb<u8>) -> Color {
  Color::Rgb(p[0], p[1], p[2])
}

impl Widget for ThumbnailWidget<'_> {
  fn render(self, area: Rect, buf: &mut Buffer) {
    if area.is_empty() {
      return;
    }
    let pixels = self.image.to_rgb8();
    let rows = self.mode.rows_per_cell();
    let cols = pixels.width().min(u32::from(area.width));
    let lines = pixels.height().div_ceil(rows).min(u32::from(area.height));
    let left = area.x + ((u32::from(area.width) - cols) / 2) as u16;
    let top = area.y + ((u32::from(area.height) - lines) / 2) as u16;

    for row in 0..lines {
      for col in 0..cols {
        let cell = &mut buf[(left + col as u16, top + row as u16)];
        match self.mode {
          DisplayMode::Direct => {
            let upper = pixels.get_pixel(col, row * 2);
            let below = row * 2 + 1;
            let bg = if below < pixels.height() { rgb(pixels.get_pixel(col, below)) } else { Color::Reset };
            cell.set_symbol("▀").set_fg(rgb(upper)).set_bg(bg);
          }
          DisplayMode::Ascii => {
            let level = luminance(pixels.get_pixel(col, row)) / 255.0;
            let idx = ((level * (ASCII_RAMP.len() - 1) as f32).round() as usize).min(ASCII_RAMP.len() - 1);
            cell.set_symbol(ASCII_RAMP[idx]);
          }
        }
      }
    }
  }
}
