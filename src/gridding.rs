//! Convolutional resampling between irregular sample points and the regular
//! oversampled grid.
//!
//! Degridding gathers, gridding scatter-adds; both enumerate the kernel
//! neighborhood through the same tap helper and evaluate the same kernel
//! table, so the two directions are exact transposes of each other under the
//! standard inner product. Kernel weights are separable products of per-axis
//! evaluations.
//!
//! Boundary policy: sample positions wrap periodically onto the grid
//! (`rem_euclid`), matching the periodicity of the DFT. Coordinates outside
//! the sampled field of view alias instead of erroring; bounding them is the
//! caller's contract.
//!
//! Cost is O(nsamples * W^D) with no data-dependent branching in the inner
//! loops.

use num_complex::Complex32;

use crate::kernel::KernelTable;

/// Fill the kernel taps along one axis for a scaled position `p` on a grid of
/// length `n`. Exactly `width` taps, grid indices wrapped.
#[inline]
fn axis_taps(p: f32, n: usize, kernel: &KernelTable, idx: &mut [usize], wgt: &mut [f32]) {
    let w = kernel.width();
    let base = (p - w as f32 * 0.5).floor() as isize + 1;
    for t in 0..w {
        let g = base + t as isize;
        idx[t] = g.rem_euclid(n as isize) as usize;
        wgt[t] = kernel.eval(p - g as f32);
    }
}

/// Degridding (forward path): gather grid values around each sample position.
///
/// `pos` holds scaled positions, (nsamples, ndim) flattened; `out[s]` is
/// accumulated with `weight * sum`, so basis-weighted contributions from
/// several coefficient grids can be fused into one output pass.
pub fn degrid(
    grid: &[Complex32],
    os_shape: &[usize],
    pos: &[f32],
    kernel: &KernelTable,
    weight: Complex32,
    out: &mut [Complex32],
) {
    let ndim = os_shape.len();
    let w = kernel.width();
    let nsamples = out.len();
    debug_assert_eq!(pos.len(), nsamples * ndim);

    let mut idx0 = vec![0usize; w];
    let mut wgt0 = vec![0f32; w];
    let mut idx1 = vec![0usize; w];
    let mut wgt1 = vec![0f32; w];
    let mut idx2 = vec![0usize; w];
    let mut wgt2 = vec![0f32; w];

    match ndim {
        1 => {
            let n0 = os_shape[0];
            for s in 0..nsamples {
                axis_taps(pos[s], n0, kernel, &mut idx0, &mut wgt0);
                let mut acc = Complex32::new(0.0, 0.0);
                for t in 0..w {
                    acc += wgt0[t] * grid[idx0[t]];
                }
                out[s] += weight * acc;
            }
        }
        2 => {
            let (n0, n1) = (os_shape[0], os_shape[1]);
            for s in 0..nsamples {
                axis_taps(pos[s * 2], n0, kernel, &mut idx0, &mut wgt0);
                axis_taps(pos[s * 2 + 1], n1, kernel, &mut idx1, &mut wgt1);
                let mut acc = Complex32::new(0.0, 0.0);
                for t0 in 0..w {
                    let row = idx0[t0] * n1;
                    let k0 = wgt0[t0];
                    for t1 in 0..w {
                        acc += k0 * wgt1[t1] * grid[row + idx1[t1]];
                    }
                }
                out[s] += weight * acc;
            }
        }
        3 => {
            let (n0, n1, n2) = (os_shape[0], os_shape[1], os_shape[2]);
            for s in 0..nsamples {
                axis_taps(pos[s * 3], n0, kernel, &mut idx0, &mut wgt0);
                axis_taps(pos[s * 3 + 1], n1, kernel, &mut idx1, &mut wgt1);
                axis_taps(pos[s * 3 + 2], n2, kernel, &mut idx2, &mut wgt2);
                let mut acc = Complex32::new(0.0, 0.0);
                for t0 in 0..w {
                    let k0 = wgt0[t0];
                    let plane = idx0[t0] * n1;
                    for t1 in 0..w {
                        let k01 = k0 * wgt1[t1];
                        let row = (plane + idx1[t1]) * n2;
                        for t2 in 0..w {
                            acc += k01 * wgt2[t2] * grid[row + idx2[t2]];
                        }
                    }
                }
                out[s] += weight * acc;
            }
        }
        _ => unreachable!("dimensionality validated at plan construction"),
    }
}

/// Gridding (adjoint path): scatter-add each sample value onto its kernel
/// neighborhood. Exact transpose of [`degrid`]: same taps, same weights.
///
/// For a basis-weighted adjoint the caller passes the conjugated basis entry
/// as `weight`.
pub fn grid(
    grid: &mut [Complex32],
    os_shape: &[usize],
    pos: &[f32],
    kernel: &KernelTable,
    weight: Complex32,
    vals: &[Complex32],
) {
    let ndim = os_shape.len();
    let w = kernel.width();
    let nsamples = vals.len();
    debug_assert_eq!(pos.len(), nsamples * ndim);

    let mut idx0 = vec![0usize; w];
    let mut wgt0 = vec![0f32; w];
    let mut idx1 = vec![0usize; w];
    let mut wgt1 = vec![0f32; w];
    let mut idx2 = vec![0usize; w];
    let mut wgt2 = vec![0f32; w];

    match ndim {
        1 => {
            let n0 = os_shape[0];
            for s in 0..nsamples {
                axis_taps(pos[s], n0, kernel, &mut idx0, &mut wgt0);
                let v = weight * vals[s];
                for t in 0..w {
                    grid[idx0[t]] += wgt0[t] * v;
                }
            }
        }
        2 => {
            let (n0, n1) = (os_shape[0], os_shape[1]);
            for s in 0..nsamples {
                axis_taps(pos[s * 2], n0, kernel, &mut idx0, &mut wgt0);
                axis_taps(pos[s * 2 + 1], n1, kernel, &mut idx1, &mut wgt1);
                let v = weight * vals[s];
                for t0 in 0..w {
                    let row = idx0[t0] * n1;
                    let k0 = wgt0[t0];
                    for t1 in 0..w {
                        grid[row + idx1[t1]] += k0 * wgt1[t1] * v;
                    }
                }
            }
        }
        3 => {
            let (n0, n1, n2) = (os_shape[0], os_shape[1], os_shape[2]);
            for s in 0..nsamples {
                axis_taps(pos[s * 3], n0, kernel, &mut idx0, &mut wgt0);
                axis_taps(pos[s * 3 + 1], n1, kernel, &mut idx1, &mut wgt1);
                axis_taps(pos[s * 3 + 2], n2, kernel, &mut idx2, &mut wgt2);
                let v = weight * vals[s];
                for t0 in 0..w {
                    let k0 = wgt0[t0];
                    let plane = idx0[t0] * n1;
                    for t1 in 0..w {
                        let k01 = k0 * wgt1[t1];
                        let row = (plane + idx1[t1]) * n2;
                        for t2 in 0..w {
                            grid[row + idx2[t2]] += k01 * wgt2[t2] * v;
                        }
                    }
                }
            }
        }
        _ => unreachable!("dimensionality validated at plan construction"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::simd_ops::dot_conj_c32;

    // small deterministic generator; keeps the tests free of external crates
    struct Lcg(u64);
    impl Lcg {
        fn next_f32(&mut self) -> f32 {
            self.0 = self.0.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            ((self.0 >> 33) as f32 / (1u64 << 31) as f32) - 0.5
        }
        fn next_c32(&mut self) -> Complex32 {
            Complex32::new(self.next_f32(), self.next_f32())
        }
    }

    fn check_adjointness(os_shape: &[usize], nsamples: usize) {
        let ndim = os_shape.len();
        let kernel = KernelTable::new(4, 1.25, 1024).unwrap();
        let glen: usize = os_shape.iter().product();
        let mut rng = Lcg(0x1234_5678);

        let x: Vec<Complex32> = (0..glen).map(|_| rng.next_c32()).collect();
        let y: Vec<Complex32> = (0..nsamples).map(|_| rng.next_c32()).collect();
        let pos: Vec<f32> = (0..nsamples * ndim)
            .map(|d| (rng.next_f32() + 0.5) * os_shape[d % ndim] as f32)
            .collect();

        // <degrid(x), y>
        let mut fx = vec![Complex32::new(0.0, 0.0); nsamples];
        degrid(&x, os_shape, &pos, &kernel, Complex32::new(1.0, 0.0), &mut fx);
        let lhs = dot_conj_c32(&fx, &y);

        // <x, grid(y)>
        let mut aty = vec![Complex32::new(0.0, 0.0); glen];
        grid(&mut aty, os_shape, &pos, &kernel, Complex32::new(1.0, 0.0), &y);
        let rhs = dot_conj_c32(&x, &aty);

        assert!(
            (lhs - rhs).norm() / lhs.norm() < 1e-4,
            "adjointness violated for {:?}: {} vs {}",
            os_shape,
            lhs,
            rhs
        );
    }

    #[test]
    fn test_grid_is_adjoint_of_degrid_1d() {
        check_adjointness(&[10], 17);
    }

    #[test]
    fn test_grid_is_adjoint_of_degrid_2d() {
        check_adjointness(&[8, 10], 23);
    }

    #[test]
    fn test_grid_is_adjoint_of_degrid_3d() {
        check_adjointness(&[6, 5, 8], 31);
    }

    #[test]
    fn test_on_grid_sample_prefers_nearest_cell() {
        let kernel = KernelTable::new(4, 1.25, 1024).unwrap();
        let grid_vals: Vec<Complex32> =
            (0..8).map(|i| Complex32::new(i as f32, 0.0)).collect();
        let pos = [4.0f32];
        let mut out = [Complex32::new(0.0, 0.0)];
        degrid(&grid_vals, &[8], &pos, &kernel, Complex32::new(1.0, 0.0), &mut out);

        // the tap at zero offset carries the largest weight, so the gathered
        // value sits near cell 4 times the kernel mass
        let total: f32 = (0..4).map(|t| kernel.eval(4.0 - (3 + t) as f32)).sum();
        assert!((out[0].re / total - 4.0).abs() < 0.5, "got {}", out[0].re / total);
    }

    #[test]
    fn test_wraparound_scatter() {
        let kernel = KernelTable::new(4, 1.25, 1024).unwrap();
        let mut g = vec![Complex32::new(0.0, 0.0); 6];
        // position at the left edge spills onto the right edge cells
        grid(
            &mut g,
            &[6],
            &[0.25],
            &kernel,
            Complex32::new(1.0, 0.0),
            &[Complex32::new(1.0, 0.0)],
        );
        assert!(g[5].re > 0.0, "no wrap contribution: {:?}", g);
        let mass: f32 = g.iter().map(|v| v.re).sum();
        assert!(mass > 0.0);
    }
}
