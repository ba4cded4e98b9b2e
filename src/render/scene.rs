//! The composited scene: gradient field, glow, spectrum bars, waveform trace
//! and orbiting particles.
//!
//! All geometry is computed in logical units and scaled by the device pixel
//! ratio at draw time.

use tiny_skia::{
    BlendMode, Color, FillRule, GradientStop, LineCap, LinearGradient, Paint, PathBuilder, Pixmap,
    Point, RadialGradient, Rect, SpreadMode, Stroke, Transform,
};

use crate::analysis::AnalysisFrame;

pub const BAR_COUNT: usize = 120;
pub const ORBIT_COUNT: usize = 6;
/// Smallest bar half-height, so silence still draws a visible line.
pub const MIN_BAR_HALF_HEIGHT: f32 = 2.0;

const BAR_STROKE_WIDTH: f32 = 1.2;
const WAVEFORM_STROKE_WIDTH: f32 = 3.2;

/// Half-height of a spectrum bar for bin magnitude `magnitude`.
pub fn bar_half_height(magnitude: u8, height: f32) -> f32 {
    (f32::from(magnitude) / 255.0 * height * 0.38).max(MIN_BAR_HALF_HEIGHT)
}

/// Vertical position of waveform sample `sample` (128 is the mid-line).
pub fn waveform_y(sample: u8, height: f32) -> f32 {
    f32::from(sample) / 128.0 * (height / 2.0) * 0.9 + height * 0.05
}

/// Frequency bin sampled by bar `bar`.
pub fn bar_bin(bar: usize, bins: usize) -> Option<usize> {
    if bins == 0 {
        return None;
    }
    let stride = (bins / BAR_COUNT).max(1);
    Some((bar * stride).min(bins - 1))
}

/// Placement and look of one orbiting particle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrbitParticle {
    pub x: f32,
    pub y: f32,
    pub angle: f64,
    /// Outer radius of the radial fade
    pub glow_radius: f32,
    /// Radius of the filled disc
    pub radius: f32,
    pub color: (u8, u8, u8),
    pub alpha: f32,
}

/// Computes particle `index` at animation time `now_ms`.
pub fn orbit_particle(index: usize, now_ms: f64, frequency: &[u8], width: f32, height: f32) -> OrbitParticle {
    let i = index as f32;
    let orbit = width / 3.2 * (1.0 + i * 0.1);
    let period = 2500.0 - index as f64 * 180.0;
    let angle = (now_ms / period) % std::f64::consts::TAU;
    let amplitude = if frequency.is_empty() {
        0.0
    } else {
        f32::from(frequency[(index * 11) % frequency.len()]) / 255.0
    };
    let pulse = 0.18 + amplitude * 0.6;

    OrbitParticle {
        x: width / 2.0 + angle.cos() as f32 * orbit * 0.4,
        y: height / 2.0 + angle.sin() as f32 * orbit * 0.25,
        angle,
        glow_radius: orbit * 0.55,
        radius: orbit * 0.45,
        color: (150 + 12 * index as u8, 255 - 25 * index as u8, 255),
        alpha: pulse,
    }
}

/// Paints one full frame into `pixmap`.
///
/// `pixmap` is expected to be cleared to an opaque background first.
pub fn paint(
    pixmap: &mut Pixmap,
    width: f32,
    height: f32,
    device_pixel_ratio: f32,
    frame: &AnalysisFrame,
    now_ms: f64,
) {
    let transform = Transform::from_scale(device_pixel_ratio, device_pixel_ratio);
    let Some(area) = Rect::from_xywh(0.0, 0.0, width, height) else {
        return;
    };

    paint_background(pixmap, area, transform);
    paint_glow(pixmap, area, frame.average_intensity(), transform);
    paint_bars(pixmap, width, height, &frame.frequency, transform);
    paint_waveform(pixmap, width, height, &frame.waveform, transform);
    paint_particles(pixmap, width, height, &frame.frequency, now_ms, transform);
}

fn paint_background(pixmap: &mut Pixmap, area: Rect, transform: Transform) {
    let stops = vec![
        GradientStop::new(0.0, rgba(86, 160, 255, 0.25)),
        GradientStop::new(0.45, rgba(100, 250, 210, 0.15)),
        GradientStop::new(1.0, rgba(30, 18, 61, 0.45)),
    ];
    let shader = LinearGradient::new(
        Point::from_xy(0.0, 0.0),
        Point::from_xy(area.width(), area.height()),
        stops,
        SpreadMode::Pad,
        Transform::identity(),
    );
    if let Some(shader) = shader {
        let paint = Paint {
            shader,
            anti_alias: true,
            ..Paint::default()
        };
        pixmap.fill_rect(area, &paint, transform, None);
    }
}

fn paint_glow(pixmap: &mut Pixmap, area: Rect, intensity: f32, transform: Transform) {
    let center = Point::from_xy(area.width() / 2.0, area.height() / 2.0);
    let stops = vec![
        GradientStop::new(0.0, rgba(130, 255, 236, 0.25 + intensity * 0.4)),
        GradientStop::new(0.45, rgba(86, 140, 255, 0.25 + intensity * 0.3)),
        GradientStop::new(1.0, rgba(5, 8, 18, 0.2)),
    ];
    let radius = area.width().max(area.height()) * 0.75;
    if let Some(shader) = RadialGradient::new(center, center, radius, stops, SpreadMode::Pad, Transform::identity()) {
        let paint = Paint {
            shader,
            anti_alias: true,
            ..Paint::default()
        };
        pixmap.fill_rect(area, &paint, transform, None);
    }
}

fn paint_bars(pixmap: &mut Pixmap, width: f32, height: f32, frequency: &[u8], transform: Transform) {
    let center_y = height / 2.0;
    let mut builder = PathBuilder::new();
    for bar in 0..BAR_COUNT {
        let magnitude = bar_bin(bar, frequency.len()).map_or(0, |bin| frequency[bin]);
        let half = bar_half_height(magnitude, height);
        let x = width / BAR_COUNT as f32 * bar as f32;
        builder.move_to(x, center_y - half);
        builder.line_to(x, center_y + half);
    }
    let Some(path) = builder.finish() else {
        return;
    };

    let mut paint = Paint::default();
    paint.set_color(rgba(206, 255, 250, 0.35));
    paint.anti_alias = true;
    let stroke = Stroke {
        width: BAR_STROKE_WIDTH,
        ..Stroke::default()
    };
    pixmap.stroke_path(&path, &paint, &stroke, transform, None);
}

fn paint_waveform(pixmap: &mut Pixmap, width: f32, height: f32, waveform: &[u8], transform: Transform) {
    if waveform.is_empty() {
        return;
    }
    let slice = width / waveform.len() as f32;
    let mut builder = PathBuilder::new();
    for (i, &sample) in waveform.iter().enumerate() {
        let x = slice * i as f32;
        let y = waveform_y(sample, height);
        if i == 0 {
            builder.move_to(x, y);
        } else {
            builder.line_to(x, y);
        }
    }
    let Some(path) = builder.finish() else {
        return;
    };

    let mut paint = Paint::default();
    paint.set_color(rgba(76, 228, 230, 0.6));
    paint.anti_alias = true;
    let stroke = Stroke {
        width: WAVEFORM_STROKE_WIDTH,
        line_cap: LineCap::Round,
        ..Stroke::default()
    };
    pixmap.stroke_path(&path, &paint, &stroke, transform, None);
}

fn paint_particles(
    pixmap: &mut Pixmap,
    width: f32,
    height: f32,
    frequency: &[u8],
    now_ms: f64,
    transform: Transform,
) {
    for index in 0..ORBIT_COUNT {
        let particle = orbit_particle(index, now_ms, frequency, width, height);
        let center = Point::from_xy(particle.x, particle.y);
        let (r, g, b) = particle.color;
        let stops = vec![
            GradientStop::new(0.0, rgba(r, g, b, particle.alpha)),
            GradientStop::new(1.0, rgba(0, 0, 0, 0.0)),
        ];
        let Some(shader) = RadialGradient::new(
            center,
            center,
            particle.glow_radius,
            stops,
            SpreadMode::Pad,
            Transform::identity(),
        ) else {
            continue;
        };
        let Some(disc) = PathBuilder::from_circle(particle.x, particle.y, particle.radius) else {
            continue;
        };
        let paint = Paint {
            shader,
            blend_mode: BlendMode::Plus,
            anti_alias: true,
            ..Paint::default()
        };
        pixmap.fill_path(&disc, &paint, FillRule::Winding, transform, None);
    }
}

fn rgba(r: u8, g: u8, b: u8, alpha: f32) -> Color {
    Color::from_rgba8(r, g, b, (alpha.clamp(0.0, 1.0) * 255.0).round() as u8)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn painted(frame: &AnalysisFrame) -> Pixmap {
        let mut pixmap = Pixmap::new(128, 72).unwrap();
        pixmap.fill(Color::from_rgba8(5, 8, 20, 255));
        paint(&mut pixmap, 64.0, 36.0, 2.0, frame, 1234.0);
        pixmap
    }

    #[test]
    fn test_silence_keeps_minimum_bar() {
        assert_eq!(bar_half_height(0, 720.0), MIN_BAR_HALF_HEIGHT);
        assert!((bar_half_height(255, 720.0) - 273.6).abs() < 1e-3);
    }

    #[test]
    fn test_centered_waveform_sits_on_midline() {
        assert!((waveform_y(128, 720.0) - 360.0).abs() < 1e-3);
        assert!(waveform_y(0, 720.0) < waveform_y(255, 720.0));
    }

    #[test]
    fn test_bars_sample_at_stride() {
        assert_eq!(bar_bin(0, 1024), Some(0));
        assert_eq!(bar_bin(1, 1024), Some(8));
        assert_eq!(bar_bin(119, 1024), Some(952));
        // Fewer bins than bars still stays in range.
        assert_eq!(bar_bin(119, 16), Some(15));
        assert_eq!(bar_bin(3, 0), None);
    }

    #[test]
    fn test_particles_orbit_at_distinct_speeds() {
        let freq = vec![0u8; 1024];
        let a = orbit_particle(0, 1000.0, &freq, 1280.0, 720.0);
        let b = orbit_particle(5, 1000.0, &freq, 1280.0, 720.0);
        assert!((a.angle - 1000.0 / 2500.0).abs() < 1e-9);
        assert!((b.angle - 1000.0 / 1600.0).abs() < 1e-9);
        assert!((a.alpha - 0.18).abs() < 1e-6);
        assert_eq!(b.color, (210, 130, 255));
    }

    #[test]
    fn test_particle_pulse_follows_sampled_bin() {
        let mut freq = vec![0u8; 1024];
        freq[22] = 255;
        let particle = orbit_particle(2, 0.0, &freq, 1280.0, 720.0);
        assert!((particle.alpha - 0.78).abs() < 1e-6);
    }

    #[test]
    fn test_paint_is_opaque_and_reactive() {
        let silent = painted(&AnalysisFrame::silent(1024, 2048));
        let loud = painted(&AnalysisFrame {
            frequency: vec![200; 1024],
            waveform: (0..2048).map(|i| if i % 2 == 0 { 40 } else { 220 }).collect(),
        });
        assert!(silent.pixels().iter().all(|p| p.alpha() == 255));
        assert!(loud.pixels().iter().all(|p| p.alpha() == 255));
        assert_ne!(silent.data(), loud.data());
    }

    proptest! {
        #[test]
        fn bar_height_has_floor(magnitude in any::<u8>(), height in 0.0f32..4000.0) {
            prop_assert!(bar_half_height(magnitude, height) >= MIN_BAR_HALF_HEIGHT);
        }

        #[test]
        fn bar_height_is_monotone(a in any::<u8>(), b in any::<u8>(), height in 1.0f32..4000.0) {
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            prop_assert!(bar_half_height(lo, height) <= bar_half_height(hi, height));
        }
    }
}
