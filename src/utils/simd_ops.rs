//! SIMD-accelerated vector kernels for complex data.
//!
//! These are the hot operations of the CG inner loop and the deapodization
//! multiply. When the `simd` feature is enabled the real-scalar operations use
//! 128-bit SIMD (f32x4, two complex values per register), which is compatible
//! with both native SSE/NEON and WASM SIMD. All operations have scalar
//! fallbacks when SIMD is disabled. Operations with a complex scalar operand
//! stay scalar; the shuffle overhead outweighs the gain at these sizes.

use num_complex::Complex32;

#[cfg(feature = "simd")]
use wide::f32x4;

/// Complex values processed per SIMD iteration
#[cfg(feature = "simd")]
const LANES: usize = 2;

/// Squared l2 norm: sum(|a[i]|^2)
#[cfg(feature = "simd")]
#[inline]
pub fn norm_sq_c32(a: &[Complex32]) -> f32 {
    let n = a.len();
    let chunks = n / LANES;
    let remainder = n % LANES;

    let mut sum = f32x4::ZERO;

    // Two complex values per register: [re0, im0, re1, im1]
    for i in 0..chunks {
        let idx = i * LANES;
        let v = f32x4::from([a[idx].re, a[idx].im, a[idx + 1].re, a[idx + 1].im]);
        sum += v * v;
    }

    let mut result = sum.reduce_add();

    let start = chunks * LANES;
    for i in 0..remainder {
        result += a[start + i].norm_sqr();
    }

    result
}

#[cfg(not(feature = "simd"))]
#[inline]
pub fn norm_sq_c32(a: &[Complex32]) -> f32 {
    a.iter().map(|v| v.norm_sqr()).sum()
}

/// Inner product with conjugation on the left operand: sum(conj(a[i]) * b[i])
#[inline]
pub fn dot_conj_c32(a: &[Complex32], b: &[Complex32]) -> Complex32 {
    debug_assert_eq!(a.len(), b.len());
    let mut acc = Complex32::new(0.0, 0.0);
    for (ai, bi) in a.iter().zip(b.iter()) {
        acc += ai.conj() * bi;
    }
    acc
}

/// Compute y[i] = y[i] + alpha * x[i] with complex alpha (axpy operation)
#[inline]
pub fn axpy_c32(y: &mut [Complex32], alpha: Complex32, x: &[Complex32]) {
    debug_assert_eq!(y.len(), x.len());
    for i in 0..y.len() {
        y[i] += alpha * x[i];
    }
}

/// Compute p[i] = r[i] + beta * p[i] (used in CG for the direction update)
#[cfg(feature = "simd")]
#[inline]
pub fn xpby_c32(p: &mut [Complex32], r: &[Complex32], beta: f32) {
    debug_assert_eq!(p.len(), r.len());
    let n = p.len();
    let chunks = n / LANES;
    let remainder = n % LANES;

    let vbeta = f32x4::splat(beta);

    for i in 0..chunks {
        let idx = i * LANES;
        let vp = f32x4::from([p[idx].re, p[idx].im, p[idx + 1].re, p[idx + 1].im]);
        let vr = f32x4::from([r[idx].re, r[idx].im, r[idx + 1].re, r[idx + 1].im]);
        let out = vr + vbeta * vp;
        let out = out.as_array_ref();
        p[idx] = Complex32::new(out[0], out[1]);
        p[idx + 1] = Complex32::new(out[2], out[3]);
    }

    let start = chunks * LANES;
    for i in 0..remainder {
        p[start + i] = r[start + i] + beta * p[start + i];
    }
}

#[cfg(not(feature = "simd"))]
#[inline]
pub fn xpby_c32(p: &mut [Complex32], r: &[Complex32], beta: f32) {
    debug_assert_eq!(p.len(), r.len());
    for i in 0..p.len() {
        p[i] = r[i] + beta * p[i];
    }
}

/// Scale in place by a real scalar: a[i] = s * a[i]
#[cfg(feature = "simd")]
#[inline]
pub fn scale_c32(a: &mut [Complex32], s: f32) {
    let n = a.len();
    let chunks = n / LANES;
    let remainder = n % LANES;

    let vs = f32x4::splat(s);

    for i in 0..chunks {
        let idx = i * LANES;
        let v = f32x4::from([a[idx].re, a[idx].im, a[idx + 1].re, a[idx + 1].im]);
        let out = vs * v;
        let out = out.as_array_ref();
        a[idx] = Complex32::new(out[0], out[1]);
        a[idx + 1] = Complex32::new(out[2], out[3]);
    }

    let start = chunks * LANES;
    for i in 0..remainder {
        a[start + i] *= s;
    }
}

#[cfg(not(feature = "simd"))]
#[inline]
pub fn scale_c32(a: &mut [Complex32], s: f32) {
    for v in a.iter_mut() {
        *v *= s;
    }
}

/// Elementwise multiply by a real window: a[i] = w[i] * a[i]
#[cfg(feature = "simd")]
#[inline]
pub fn mul_real_c32(a: &mut [Complex32], w: &[f32]) {
    debug_assert_eq!(a.len(), w.len());
    let n = a.len();
    let chunks = n / LANES;
    let remainder = n % LANES;

    for i in 0..chunks {
        let idx = i * LANES;
        let v = f32x4::from([a[idx].re, a[idx].im, a[idx + 1].re, a[idx + 1].im]);
        let vw = f32x4::from([w[idx], w[idx], w[idx + 1], w[idx + 1]]);
        let out = vw * v;
        let out = out.as_array_ref();
        a[idx] = Complex32::new(out[0], out[1]);
        a[idx + 1] = Complex32::new(out[2], out[3]);
    }

    let start = chunks * LANES;
    for i in 0..remainder {
        a[start + i] *= w[start + i];
    }
}

#[cfg(not(feature = "simd"))]
#[inline]
pub fn mul_real_c32(a: &mut [Complex32], w: &[f32]) {
    debug_assert_eq!(a.len(), w.len());
    for (v, &wi) in a.iter_mut().zip(w.iter()) {
        *v *= wi;
    }
}
