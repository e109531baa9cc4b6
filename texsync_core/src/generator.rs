//! The procedural content generator.
//!
//! A pure function of `(time, angle, version)`: no hidden state and no
//! randomness, so the same inputs always give byte-identical pixels. The
//! "noise" term is a deterministic function of `version`.

use crate::state::{Dimensions, Payload, CHANNELS};

/// Renders the animated pattern into a fresh payload.
///
/// Pixel coordinates are mapped to `[-1, 1]`, rotated by `angle_degrees`, and
/// combined from two phase-shifted waves, a radial ripple and a spiral. Each
/// channel is clamped to `[0, 1]` and truncated to 8 bits.
pub fn generate(dims: Dimensions, time: f32, angle_degrees: f32, version: u64) -> Payload {
    let mut data = vec![0u8; dims.byte_len()];
    let rotation = angle_degrees.to_radians();
    let (sin_r, cos_r) = rotation.sin_cos();
    let noise_phase = version as f32 * 0.1;

    for (y, row) in data.chunks_exact_mut(dims.width() * CHANNELS).enumerate() {
        let ny = normalized(y, dims.height());

        for (x, px) in row.chunks_exact_mut(CHANNELS).enumerate() {
            let nx = normalized(x, dims.width());

            let rx = nx * cos_r - ny * sin_r;
            let ry = nx * sin_r + ny * cos_r;

            let [r, g, b] = shade(rx, ry, time, noise_phase);
            px[0] = quantize(r);
            px[1] = quantize(g);
            px[2] = quantize(b);
        }
    }

    Payload::from_sized(dims, data)
}

/// Colour of one rotated coordinate, before clamping.
fn shade(rx: f32, ry: f32, t: f32, noise_phase: f32) -> [f32; 3] {
    let wave1 = (rx * 8.0 + t * 2.0).sin() * 0.5 + 0.5;
    let wave2 = (ry * 6.0 + t * 1.5).cos() * 0.5 + 0.5;
    let radial = (rx * rx + ry * ry).sqrt();
    let ripple = (radial * 10.0 - t * 4.0).sin() * 0.5 + 0.5;

    let spiral = ry.atan2(rx) + radial * 3.0 - t * 2.0;
    let spiral_pattern = spiral.sin() * 0.5 + 0.5;

    let noise = (noise_phase + rx * ry * 100.0).sin() * 0.1;

    [
        wave1 * ripple * spiral_pattern + noise,
        wave2 * (1.0 - radial * 0.3) + noise,
        (wave1 + wave2) * 0.5 * ripple + noise,
    ]
}

/// Maps a pixel index onto `[-1, 1]`. A one-pixel axis sits at 0.
fn normalized(i: usize, extent: usize) -> f32 {
    if extent < 2 {
        return 0.0;
    }
    (i as f32 / (extent - 1) as f32) * 2.0 - 1.0
}

fn quantize(c: f32) -> u8 {
    (c.clamp(0.0, 1.0) * 255.0) as u8
}
