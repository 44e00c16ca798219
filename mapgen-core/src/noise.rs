//! Coherent value noise on the integer lattice.

use crate::rng::{hash_2d, seed_offset};

pub fn value_noise(seed: u64, x: f32, y: f32) -> f32 {
    let xi = x.floor() as i32;
    let yi = y.floor() as i32;
    let tx = x - xi as f32;
    let ty = y - yi as f32;

    let v00 = hash_2d(seed, xi, yi);
    let v10 = hash_2d(seed, xi + 1, yi);
    let v01 = hash_2d(seed, xi, yi + 1);
    let v11 = hash_2d(seed, xi + 1, yi + 1);

    let sx = smoothstep(tx);
    let sy = smoothstep(ty);

    let a = lerp(v00, v10, sx);
    let b = lerp(v01, v11, sx);
    lerp(a, b, sy)
}

/// Fractal sum of `octaves` value-noise layers, in `[0, 1]`.
pub fn fbm(seed: u64, x: f32, y: f32, octaves: u32, base_freq: f32) -> f32 {
    let mut amp = 0.5;
    let mut freq = base_freq;
    let mut sum = 0.0;
    let mut norm = 0.0;

    for octave in 0..octaves {
        let n = value_noise(seed_offset(seed, octave as u64 + 1), x * freq, y * freq);
        sum += n * amp;
        norm += amp;
        amp *= 0.5;
        freq *= 2.0;
    }

    if norm > 0.0 {
        (sum / norm).clamp(0.0, 1.0)
    } else {
        0.0
    }
}

/// Rescales `fbm` over the whole field to exactly `[0, 1]`.
///
/// Sampled at `(x / width, y / width)` so the aspect ratio is preserved.
pub fn normalized_field(
    seed: u64,
    width: usize,
    height: usize,
    octaves: u32,
    frequency: f32,
) -> Vec<f32> {
    let scale = 1.0 / width.max(1) as f32;
    let mut field = Vec::with_capacity(width * height);
    for y in 0..height {
        for x in 0..width {
            field.push(fbm(
                seed,
                x as f32 * scale,
                y as f32 * scale,
                octaves.max(1),
                frequency,
            ));
        }
    }
    normalize_in_place(&mut field);
    field
}

/// Linearly maps `values` onto `[0, 1]`. A constant slice maps to `0.5`.
pub fn normalize_in_place(values: &mut [f32]) {
    let (lo, hi) = values
        .iter()
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        });
    let span = hi - lo;
    if !(span.is_finite() && span > f32::EPSILON) {
        values.fill(0.5);
        return;
    }
    for v in values {
        *v = ((*v - lo) / span).clamp(0.0, 1.0);
    }
}

fn smoothstep(t: f32) -> f32 {
    t * t * (3.0 - 2.0 * t)
}

fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}
