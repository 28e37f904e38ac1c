//! Centered FFT workspaces over the oversampled grid.
//!
//! Per-axis rustfft plans are built once per shape and reused; data is flat,
//! C order (last axis contiguous), transformed axis by axis with an explicit
//! gather/scatter lane buffer. The centered transforms sandwich the FFT in
//! ifftshift/fftshift so grid index g corresponds to frequency g - n/2.
//!
//! Neither direction is normalized: the unnormalized inverse is the exact
//! adjoint of the unnormalized forward, which the NUFFT operator pair relies
//! on. Reconstruction-scale normalization happens at the NUFFT level.

use num_complex::Complex32;
use rustfft::{Fft, FftDirection, FftPlanner};
use std::sync::Arc;

/// Cached per-axis FFT plans for one spatial shape (1-3 dims).
///
/// The workspace itself is immutable after construction and can be shared
/// across threads; all mutable state lives in a per-call [`FftScratch`].
pub struct FftWorkspace {
    shape: Vec<usize>,
    len: usize,
    fwd: Vec<Arc<dyn Fft<f32>>>,
    inv: Vec<Arc<dyn Fft<f32>>>,
    scratch_len: usize,
    max_axis: usize,
}

/// Scratch buffers for one sequence of transforms.
pub struct FftScratch {
    scratch: Vec<Complex32>,
    lane: Vec<Complex32>,
    tmp: Vec<Complex32>,
}

impl FftWorkspace {
    pub fn new(shape: &[usize]) -> Self {
        let mut planner = FftPlanner::<f32>::new();
        let mut fwd = Vec::with_capacity(shape.len());
        let mut inv = Vec::with_capacity(shape.len());
        let mut scratch_len = 0;
        for &n in shape {
            let f = planner.plan_fft(n, FftDirection::Forward);
            let i = planner.plan_fft(n, FftDirection::Inverse);
            scratch_len = scratch_len
                .max(f.get_inplace_scratch_len())
                .max(i.get_inplace_scratch_len());
            fwd.push(f);
            inv.push(i);
        }
        Self {
            shape: shape.to_vec(),
            len: shape.iter().product(),
            fwd,
            inv,
            scratch_len,
            max_axis: shape.iter().copied().max().unwrap_or(1),
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn make_scratch(&self) -> FftScratch {
        let zero = Complex32::new(0.0, 0.0);
        FftScratch {
            scratch: vec![zero; self.scratch_len],
            lane: vec![zero; self.max_axis],
            tmp: vec![zero; self.len],
        }
    }

    /// Centered forward FFT: fftshift(FFT(ifftshift(data))), unnormalized.
    pub fn centered_fft(&self, data: &mut [Complex32], scratch: &mut FftScratch) {
        self.shift(data, scratch, true);
        for axis in 0..self.shape.len() {
            self.apply_axis(data, axis, true, scratch);
        }
        self.shift(data, scratch, false);
    }

    /// Exact adjoint of [`centered_fft`]: fftshift(IFFT(ifftshift(data))) with
    /// no 1/N scaling.
    pub fn centered_ifft_adjoint(&self, data: &mut [Complex32], scratch: &mut FftScratch) {
        self.shift(data, scratch, true);
        for axis in 0..self.shape.len() {
            self.apply_axis(data, axis, false, scratch);
        }
        self.shift(data, scratch, false);
    }

    fn apply_axis(&self, data: &mut [Complex32], axis: usize, forward: bool, scratch: &mut FftScratch) {
        let n = self.shape[axis];
        if n == 1 {
            return;
        }
        let plan = if forward { &self.fwd[axis] } else { &self.inv[axis] };
        let inner: usize = self.shape[axis + 1..].iter().product();
        let blocks = self.len / (n * inner);

        if inner == 1 {
            // last axis is contiguous, transform in place
            for b in 0..blocks {
                let start = b * n;
                plan.process_with_scratch(&mut data[start..start + n], &mut scratch.scratch);
            }
        } else {
            for b in 0..blocks {
                let base = b * n * inner;
                for j in 0..inner {
                    for t in 0..n {
                        scratch.lane[t] = data[base + j + t * inner];
                    }
                    plan.process_with_scratch(&mut scratch.lane[..n], &mut scratch.scratch);
                    for t in 0..n {
                        data[base + j + t * inner] = scratch.lane[t];
                    }
                }
            }
        }
    }

    /// Quadrant swap; `inverse` selects ifftshift (h = (n+1)/2) over fftshift
    /// (h = n/2). The two agree for even axes and compose to the identity.
    fn shift(&self, data: &mut [Complex32], scratch: &mut FftScratch, inverse: bool) {
        let h = |n: usize| if inverse { (n + 1) / 2 } else { n / 2 };
        let tmp = &mut scratch.tmp;
        match *self.shape {
            [n0] => {
                let h0 = h(n0);
                for i in 0..n0 {
                    tmp[(i + h0) % n0] = data[i];
                }
            }
            [n0, n1] => {
                let (h0, h1) = (h(n0), h(n1));
                for i in 0..n0 {
                    let si = (i + h0) % n0;
                    for j in 0..n1 {
                        tmp[si * n1 + (j + h1) % n1] = data[i * n1 + j];
                    }
                }
            }
            [n0, n1, n2] => {
                let (h0, h1, h2) = (h(n0), h(n1), h(n2));
                for i in 0..n0 {
                    let si = (i + h0) % n0;
                    for j in 0..n1 {
                        let sj = (j + h1) % n1;
                        for k in 0..n2 {
                            tmp[(si * n1 + sj) * n2 + (k + h2) % n2] =
                                data[(i * n1 + j) * n2 + k];
                        }
                    }
                }
            }
            _ => unreachable!("shape validated to 1-3 dims at plan construction"),
        }
        data.copy_from_slice(tmp);
    }
}
