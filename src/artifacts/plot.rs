use font8x8::{BASIC_FONTS, UnicodeFonts};
use image::{Rgb, RgbImage};
use serde::{Deserialize, Serialize};

use crate::metrics::{LossHistory, LossRecord};

pub const WIDTH: u32 = 640;
pub const HEIGHT: u32 = 480;
const MARGIN: u32 = 24;
const GLYPH: i64 = 8;

pub mod colors {
    use image::Rgb;

    pub const WHITE: Rgb<u8> = Rgb([255, 255, 255]);
    pub const BLACK: Rgb<u8> = Rgb([0, 0, 0]);
    pub const LIGHT_GRAY: Rgb<u8> = Rgb([200, 200, 200]);
    pub const BLUE: Rgb<u8> = Rgb([33, 150, 243]);
    pub const ORANGE: Rgb<u8> = Rgb([255, 152, 0]);
}

/// Everything the loss curve shows, persisted next to it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LossReport {
    pub dataset: String,
    pub steps: u64,
    pub elapsed_secs: f64,
    pub history: LossHistory,
}

impl LossReport {
    /// The annotation drawn above the curve.
    pub fn label(&self) -> String {
        format!(
            "{}: {} steps, total training time {:.1}s",
            self.dataset, self.steps, self.elapsed_secs
        )
    }
}

/// Plots the critic (blue) and generator (orange) losses against their steps, annotated with
/// the run's total training time.
pub fn render_loss_curve(report: &LossReport, width: u32, height: u32) -> RgbImage {
    let mut img = RgbImage::from_pixel(width, height, colors::WHITE);
    let records = report.history.records();

    let (mut low, mut high) = (0f32, 0f32);
    for r in records {
        for v in [r.critic, r.generator].into_iter().filter(|v| v.is_finite()) {
            low = low.min(v);
            high = high.max(v);
        }
    }
    if high - low < f32::EPSILON {
        low -= 1.;
        high += 1.;
    }

    let first = records.first().map_or(0, |r| r.step);
    let last = records.last().map_or(0, |r| r.step);
    let span = (last - first).max(1) as f32;

    let plot_w = width.saturating_sub(2 * MARGIN).max(1) as f32;
    let plot_h = height.saturating_sub(2 * MARGIN).max(1) as f32;

    let to_x = |step: u64| MARGIN as f32 + (step - first) as f32 / span * plot_w;
    let to_y = |v: f32| MARGIN as f32 + (high - v) / (high - low) * plot_h;

    let (left, top) = (MARGIN as i64, MARGIN as i64);
    let (right, bottom) = (
        width.saturating_sub(MARGIN) as i64,
        height.saturating_sub(MARGIN) as i64,
    );

    let zero = to_y(0.).round() as i64;
    draw_line(&mut img, (left, zero), (right, zero), colors::LIGHT_GRAY);
    draw_line(&mut img, (left, top), (left, bottom), colors::BLACK);
    draw_line(&mut img, (left, bottom), (right, bottom), colors::BLACK);

    let series: [(fn(&LossRecord) -> f32, Rgb<u8>); 2] = [
        (|r| r.critic, colors::BLUE),
        (|r| r.generator, colors::ORANGE),
    ];

    let text_top = (MARGIN as i64 - GLYPH) / 2;
    draw_text(&mut img, (left, text_top), &report.label(), colors::BLACK);

    for (value, color) in series {
        let points: Vec<(i64, i64)> = records
            .iter()
            .filter(|r| value(r).is_finite())
            .map(|r| (to_x(r.step).round() as i64, to_y(value(r)).round() as i64))
            .collect();

        if let [only] = points.as_slice() {
            draw_line(&mut img, *only, *only, color);
        }

        for pair in points.windows(2) {
            draw_line(&mut img, pair[0], pair[1], color);
        }
    }

    img
}

/// Bresenham's line, clipped to the image.
fn draw_line(img: &mut RgbImage, from: (i64, i64), to: (i64, i64), color: Rgb<u8>) {
    let (mut x, mut y) = from;
    let (dx, dy) = ((to.0 - x).abs(), -(to.1 - y).abs());
    let (sx, sy) = (if x < to.0 { 1 } else { -1 }, if y < to.1 { 1 } else { -1 });
    let mut err = dx + dy;

    loop {
        put_clipped(img, x, y, color);

        if (x, y) == to {
            break;
        }

        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x += sx;
        }
        if e2 <= dx {
            err += dx;
            y += sy;
        }
    }
}

/// Writes `text` in an 8x8 bitmap font from its top left corner, skipping unknown characters.
fn draw_text(img: &mut RgbImage, origin: (i64, i64), text: &str, color: Rgb<u8>) {
    for (i, ch) in text.chars().enumerate() {
        let Some(glyph) = BASIC_FONTS.get(ch) else {
            continue;
        };
        let left = origin.0 + GLYPH * i as i64;

        for (dy, &row) in glyph.iter().enumerate() {
            for dx in 0..GLYPH {
                if row & (1u8 << dx) != 0 {
                    put_clipped(img, left + dx, origin.1 + dy as i64, color);
                }
            }
        }
    }
}

fn put_clipped(img: &mut RgbImage, x: i64, y: i64, color: Rgb<u8>) {
    if (0..img.width() as i64).contains(&x) && (0..img.height() as i64).contains(&y) {
        img.put_pixel(x as u32, y as u32, color);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(losses: &[(f32, f32)]) -> LossReport {
        let mut history = LossHistory::default();
        for (i, &(critic, generator)) in losses.iter().enumerate() {
            history.push(LossRecord {
                step: i as u64 * 10,
                epoch: 0,
                critic,
                generator,
            });
        }

        LossReport {
            dataset: "digits".into(),
            steps: losses.len() as u64 * 10,
            elapsed_secs: 12.34,
            history,
        }
    }

    fn count(img: &RgbImage, color: Rgb<u8>) -> usize {
        img.pixels().filter(|&&p| p == color).count()
    }

    #[test]
    fn both_series_are_drawn() {
        let img = render_loss_curve(&report(&[(-0.1, 0.2), (-0.3, 0.1), (-0.2, 0.4)]), WIDTH, HEIGHT);

        assert_eq!(img.dimensions(), (WIDTH, HEIGHT));
        assert!(count(&img, colors::BLUE) > 0);
        assert!(count(&img, colors::ORANGE) > 0);
    }

    #[test]
    fn degenerate_histories_still_render() {
        let empty = render_loss_curve(&report(&[]), 100, 80);
        let single = render_loss_curve(&report(&[(0., 0.)]), 100, 80);
        let diverged = render_loss_curve(&report(&[(f32::NAN, 1.), (0.5, f32::INFINITY)]), 100, 80);

        assert_eq!(count(&empty, colors::BLUE), 0);
        assert!(count(&single, colors::ORANGE) > 0);
        assert_eq!(diverged.dimensions(), (100, 80));
    }

    #[test]
    fn elapsed_time_is_written_above_the_plot() {
        let report = report(&[(-0.1, 0.2), (-0.3, 0.1)]);
        let img = render_loss_curve(&report, WIDTH, HEIGHT);

        assert_eq!(report.label(), "digits: 20 steps, total training time 12.3s");
        let above_plot = (0..WIDTH)
            .flat_map(|x| (0..MARGIN).map(move |y| (x, y)))
            .filter(|&(x, y)| *img.get_pixel(x, y) == colors::BLACK)
            .count();
        assert!(above_plot > 0);

        let slower = LossReport {
            elapsed_secs: 98.7,
            ..report.clone()
        };
        assert_ne!(render_loss_curve(&slower, WIDTH, HEIGHT), img);
    }

    #[test]
    fn unknown_characters_are_skipped() {
        let mut img = RgbImage::new(16, 8);

        draw_text(&mut img, (0, 0), "\u{1F600}", colors::WHITE);
        assert_eq!(count(&img, colors::WHITE), 0);

        draw_text(&mut img, (0, 0), "\u{1F600}I", colors::WHITE);
        assert!(count(&img, colors::WHITE) > 0);
    }

    #[test]
    fn lines_are_clipped_to_the_image() {
        let mut img = RgbImage::new(4, 4);

        draw_line(&mut img, (-5, -5), (10, 10), colors::WHITE);

        assert_eq!(count(&img, colors::WHITE), 4);
    }
}
