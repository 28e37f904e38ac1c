//! Common test utilities for NUFFT-core integration tests

use num_complex::Complex32;
use nufft_core::nufft::SampleSet;

/// Full Cartesian lattice trajectory for one or more contrasts: every
/// integer node of the npix^ndim grid, coordinates in [-npix/2, npix/2),
/// laid out as one view of npix^ndim samples per contrast.
pub fn full_lattice(npix: usize, ndim: usize, ncontrasts: usize) -> SampleSet {
    let nsamples = npix.pow(ndim as u32);
    let mut coords = Vec::with_capacity(ncontrasts * nsamples * ndim);
    for _ in 0..ncontrasts {
        for s in 0..nsamples {
            let mut rem = s;
            let mut node = [0usize; 3];
            for d in (0..ndim).rev() {
                node[d] = rem % npix;
                rem /= npix;
            }
            for d in 0..ndim {
                coords.push(node[d] as f32 - (npix / 2) as f32);
            }
        }
    }
    SampleSet::new(coords, ncontrasts, 1, nsamples, ndim).unwrap()
}

/// Uniform density compensation for a fully sampled lattice.
pub fn flat_dcf(sampling_len: usize) -> Vec<f32> {
    vec![1.0; sampling_len]
}

/// Small deterministic generator so tests stay reproducible without extra
/// dependencies.
pub struct Lcg(pub u64);

impl Lcg {
    pub fn next_f32(&mut self) -> f32 {
        self.0 = self
            .0
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        ((self.0 >> 33) as f32 / (1u64 << 31) as f32) - 0.5
    }

    pub fn next_c32(&mut self) -> Complex32 {
        Complex32::new(self.next_f32(), self.next_f32())
    }

    pub fn fill_c32(&mut self, n: usize) -> Vec<Complex32> {
        (0..n).map(|_| self.next_c32()).collect()
    }
}

/// Largest elementwise magnitude difference.
pub fn max_abs_diff(a: &[Complex32], b: &[Complex32]) -> f32 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y).norm())
        .fold(0.0, f32::max)
}

/// Relative l2 error ||a - b|| / ||b||.
pub fn rel_l2(a: &[Complex32], b: &[Complex32]) -> f32 {
    let num: f32 = a
        .iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y).norm_sqr())
        .sum();
    let den: f32 = b.iter().map(|y| y.norm_sqr()).sum();
    (num / den.max(1e-30)).sqrt()
}
