//! NUFFT operator pair: forward (image -> k-space) and its exact adjoint.
//!
//! The forward path is deapodize, centered zero-pad to the oversampled grid,
//! unnormalized centered FFT, degrid at the scaled sample positions. The
//! adjoint runs the exact transpose of each stage in reverse: grid,
//! unnormalized centered inverse FFT, centered crop, deapodize. Because every
//! stage is transposed exactly, `forward`/`adjoint` satisfy
//! <forward(x), y> == <x, adjoint(y)> to floating precision.
//!
//! The adjoint is *not* an inverse. [`nufft_adjoint`] is the reconstruction
//! entry point: it applies optional density compensation and a
//! 1/prod(matrix) normalization, so that fully sampled data round-trips an
//! impulse at unit height. Both flavors are public on purpose.
//!
//! An optional low-rank temporal basis contracts the contrast axis against a
//! reduced coefficient axis inside the grid/degrid pass, so k-space data can
//! live in subspace-coefficient form without materializing per-contrast
//! images.

use num_complex::Complex32;

use crate::error::ReconError;
use crate::fft::FftWorkspace;
use crate::gridding;
use crate::kernel::{deapodization_axis, KernelTable};
use crate::utils::simd_ops::{mul_real_c32, scale_c32};

/// Sample coordinate set, grouped by (contrast, view).
///
/// Coordinates are (ncontrasts, nviews, nsamples, ndim) flattened in C order,
/// in grid units spanning [-0.5*matrix, 0.5*matrix] per axis; component `d`
/// addresses image axis `d` (axis 0 slowest). Bounding the coordinates is the
/// trajectory generator's contract; out-of-range values alias periodically.
pub struct SampleSet {
    coords: Vec<f32>,
    ncontrasts: usize,
    nviews: usize,
    nsamples: usize,
    ndim: usize,
}

impl SampleSet {
    pub fn new(
        coords: Vec<f32>,
        ncontrasts: usize,
        nviews: usize,
        nsamples: usize,
        ndim: usize,
    ) -> Result<Self, ReconError> {
        if !(1..=3).contains(&ndim) {
            return Err(ReconError::UnsupportedConfig(format!(
                "sample dimensionality must be 1, 2 or 3, got {}",
                ndim
            )));
        }
        let expected = ncontrasts * nviews * nsamples * ndim;
        if coords.len() != expected {
            return Err(ReconError::ShapeMismatch(format!(
                "coordinate buffer holds {} values, expected {} ({}x{}x{}x{})",
                coords.len(),
                expected,
                ncontrasts,
                nviews,
                nsamples,
                ndim
            )));
        }
        Ok(Self {
            coords,
            ncontrasts,
            nviews,
            nsamples,
            ndim,
        })
    }

    pub fn ndim(&self) -> usize {
        self.ndim
    }

    pub fn ncontrasts(&self) -> usize {
        self.ncontrasts
    }

    /// Samples per contrast (views * samples).
    pub fn samples_per_contrast(&self) -> usize {
        self.nviews * self.nsamples
    }
}

/// Low-rank temporal basis: (ncontrasts x ncoeff) complex matrix, row-major.
pub struct Basis {
    ncontrasts: usize,
    ncoeff: usize,
    mat: Vec<Complex32>,
}

impl Basis {
    pub fn new(mat: Vec<Complex32>, ncontrasts: usize, ncoeff: usize) -> Result<Self, ReconError> {
        if ncontrasts == 0 || ncoeff == 0 {
            return Err(ReconError::UnsupportedConfig(
                "basis dimensions must be nonzero".into(),
            ));
        }
        if mat.len() != ncontrasts * ncoeff {
            return Err(ReconError::ShapeMismatch(format!(
                "basis matrix holds {} entries, expected {}x{}",
                mat.len(),
                ncontrasts,
                ncoeff
            )));
        }
        Ok(Self {
            ncontrasts,
            ncoeff,
            mat,
        })
    }

    /// Identity basis; contracting with it reproduces the basis-free path.
    pub fn identity(n: usize) -> Self {
        let mut mat = vec![Complex32::new(0.0, 0.0); n * n];
        for i in 0..n {
            mat[i * n + i] = Complex32::new(1.0, 0.0);
        }
        Self {
            ncontrasts: n,
            ncoeff: n,
            mat,
        }
    }

    #[inline]
    fn entry(&self, contrast: usize, coeff: usize) -> Complex32 {
        self.mat[contrast * self.ncoeff + coeff]
    }
}

/// Gridding configuration. Width 4 with 1.25 oversampling is the accuracy /
/// speed tradeoff used throughout; raise oversampling towards 2.0 for tighter
/// error bounds.
pub struct NufftOptions {
    pub oversamp: f64,
    pub width: usize,
    pub table_len: usize,
}

impl Default for NufftOptions {
    fn default() -> Self {
        Self {
            oversamp: 1.25,
            width: 4,
            table_len: 1024,
        }
    }
}

/// Precomputed NUFFT operator for one trajectory and matrix size.
///
/// Construction validates everything up front; `forward`/`adjoint` take
/// `&self` and allocate their oversampled grids per call, so one plan can be
/// shared across threads and reused across solves.
pub struct NufftPlan {
    ndim: usize,
    matrix: Vec<usize>,
    matrix_len: usize,
    os_shape: Vec<usize>,
    os_len: usize,
    ncontrasts: usize,
    spc: usize,
    pos: Vec<f32>,
    kernel: KernelTable,
    deapod: Vec<f32>,
    basis: Option<Basis>,
    fft: FftWorkspace,
    pad_off: Vec<usize>,
}

impl NufftPlan {
    pub fn new(
        sampling: &SampleSet,
        matrix: &[usize],
        opts: &NufftOptions,
    ) -> Result<Self, ReconError> {
        Self::build(sampling, matrix, None, opts)
    }

    pub fn with_basis(
        sampling: &SampleSet,
        matrix: &[usize],
        basis: Basis,
        opts: &NufftOptions,
    ) -> Result<Self, ReconError> {
        if basis.ncontrasts != sampling.ncontrasts {
            return Err(ReconError::ShapeMismatch(format!(
                "basis has {} contrasts, sampling has {}",
                basis.ncontrasts, sampling.ncontrasts
            )));
        }
        Self::build(sampling, matrix, Some(basis), opts)
    }

    fn build(
        sampling: &SampleSet,
        matrix: &[usize],
        basis: Option<Basis>,
        opts: &NufftOptions,
    ) -> Result<Self, ReconError> {
        let ndim = sampling.ndim;
        if matrix.len() != ndim {
            return Err(ReconError::ShapeMismatch(format!(
                "matrix has {} axes, coordinates have {}",
                matrix.len(),
                ndim
            )));
        }
        if matrix.iter().any(|&n| n == 0) {
            return Err(ReconError::UnsupportedConfig(
                "matrix axes must be nonzero".into(),
            ));
        }

        let kernel = KernelTable::new(opts.width, opts.oversamp, opts.table_len)?;

        let os_shape: Vec<usize> = matrix
            .iter()
            .map(|&n| (opts.oversamp * n as f64).ceil() as usize)
            .collect();
        let pad_off: Vec<usize> = os_shape
            .iter()
            .zip(matrix.iter())
            .map(|(&os, &n)| os / 2 - n / 2)
            .collect();

        // separable rolloff correction, degenerate windows rejected here
        let mut axes = Vec::with_capacity(ndim);
        for d in 0..ndim {
            axes.push(deapodization_axis(
                matrix[d],
                os_shape[d],
                opts.width,
                kernel.beta(),
            )?);
        }
        let deapod = separable_product(&axes);

        // scale coordinates into oversampled grid positions
        let mut pos = Vec::with_capacity(sampling.coords.len());
        for (i, &c) in sampling.coords.iter().enumerate() {
            let d = i % ndim;
            let scale = os_shape[d] as f32 / matrix[d] as f32;
            pos.push(c * scale + (os_shape[d] / 2) as f32);
        }

        let matrix_len = matrix.iter().product();
        let os_len = os_shape.iter().product();
        let fft = FftWorkspace::new(&os_shape);

        Ok(Self {
            ndim,
            matrix: matrix.to_vec(),
            matrix_len,
            os_shape,
            os_len,
            ncontrasts: sampling.ncontrasts,
            spc: sampling.samples_per_contrast(),
            pos,
            kernel,
            deapod,
            basis,
            fft,
            pad_off,
        })
    }

    pub fn ndim(&self) -> usize {
        self.ndim
    }

    pub fn matrix(&self) -> &[usize] {
        &self.matrix
    }

    pub fn matrix_len(&self) -> usize {
        self.matrix_len
    }

    pub fn ncontrasts(&self) -> usize {
        self.ncontrasts
    }

    /// Image-side channel count: basis coefficients when a basis is present,
    /// contrasts otherwise.
    pub fn ncoeff(&self) -> usize {
        self.basis.as_ref().map_or(self.ncontrasts, |b| b.ncoeff)
    }

    /// k-space samples per contrast.
    pub fn samples_per_contrast(&self) -> usize {
        self.spc
    }

    /// Forward operator: image (batch, ncoeff, *matrix) -> k-space
    /// (batch, ncontrasts, nviews*nsamples). Leading batch axes are folded
    /// flat and carried through untouched.
    pub fn forward(&self, image: &[Complex32]) -> Result<Vec<Complex32>, ReconError> {
        let nchan = self.ncoeff();
        let chan_len = nchan * self.matrix_len;
        if chan_len == 0 || image.len() % chan_len != 0 {
            return Err(ReconError::ShapeMismatch(format!(
                "image length {} is not a multiple of channels x matrix = {}",
                image.len(),
                chan_len
            )));
        }
        let nbatch = image.len() / chan_len;

        let zero = Complex32::new(0.0, 0.0);
        let mut out = vec![zero; nbatch * self.ncontrasts * self.spc];
        let mut grids = vec![zero; nchan * self.os_len];
        let mut block = vec![zero; self.matrix_len];
        let mut scratch = self.fft.make_scratch();

        for b in 0..nbatch {
            grids.fill(zero);
            for ci in 0..nchan {
                let src = &image[(b * nchan + ci) * self.matrix_len..][..self.matrix_len];
                block.copy_from_slice(src);
                mul_real_c32(&mut block, &self.deapod);
                let g = &mut grids[ci * self.os_len..][..self.os_len];
                self.pad_into(&block, g);
                self.fft.centered_fft(g, &mut scratch);
            }

            for c in 0..self.ncontrasts {
                let pos = &self.pos[c * self.spc * self.ndim..][..self.spc * self.ndim];
                let dst = &mut out[(b * self.ncontrasts + c) * self.spc..][..self.spc];
                match &self.basis {
                    Some(basis) => {
                        for ci in 0..nchan {
                            let g = &grids[ci * self.os_len..][..self.os_len];
                            gridding::degrid(
                                g,
                                &self.os_shape,
                                pos,
                                &self.kernel,
                                basis.entry(c, ci),
                                dst,
                            );
                        }
                    }
                    None => {
                        let g = &grids[c * self.os_len..][..self.os_len];
                        gridding::degrid(
                            g,
                            &self.os_shape,
                            pos,
                            &self.kernel,
                            Complex32::new(1.0, 0.0),
                            dst,
                        );
                    }
                }
            }
        }
        Ok(out)
    }

    /// Exact adjoint of [`forward`]: k-space (batch, ncontrasts,
    /// nviews*nsamples) -> image (batch, ncoeff, *matrix). No density
    /// weighting and no normalization; see [`nufft_adjoint`] for the
    /// reconstruction-normalized flavor.
    pub fn adjoint(&self, kdata: &[Complex32]) -> Result<Vec<Complex32>, ReconError> {
        let contrast_len = self.ncontrasts * self.spc;
        if contrast_len == 0 || kdata.len() % contrast_len != 0 {
            return Err(ReconError::ShapeMismatch(format!(
                "k-space length {} is not a multiple of contrasts x samples = {}",
                kdata.len(),
                contrast_len
            )));
        }
        let nbatch = kdata.len() / contrast_len;
        let nchan = self.ncoeff();

        let zero = Complex32::new(0.0, 0.0);
        let mut out = vec![zero; nbatch * nchan * self.matrix_len];
        let mut grids = vec![zero; nchan * self.os_len];
        let mut block = vec![zero; self.matrix_len];
        let mut scratch = self.fft.make_scratch();

        for b in 0..nbatch {
            grids.fill(zero);
            for c in 0..self.ncontrasts {
                let pos = &self.pos[c * self.spc * self.ndim..][..self.spc * self.ndim];
                let vals = &kdata[(b * self.ncontrasts + c) * self.spc..][..self.spc];
                match &self.basis {
                    Some(basis) => {
                        for ci in 0..nchan {
                            let g = &mut grids[ci * self.os_len..][..self.os_len];
                            gridding::grid(
                                g,
                                &self.os_shape,
                                pos,
                                &self.kernel,
                                basis.entry(c, ci).conj(),
                                vals,
                            );
                        }
                    }
                    None => {
                        let g = &mut grids[c * self.os_len..][..self.os_len];
                        gridding::grid(
                            g,
                            &self.os_shape,
                            pos,
                            &self.kernel,
                            Complex32::new(1.0, 0.0),
                            vals,
                        );
                    }
                }
            }

            for ci in 0..nchan {
                let g = &mut grids[ci * self.os_len..][..self.os_len];
                self.fft.centered_ifft_adjoint(g, &mut scratch);
                self.crop_from(g, &mut block);
                mul_real_c32(&mut block, &self.deapod);
                out[(b * nchan + ci) * self.matrix_len..][..self.matrix_len]
                    .copy_from_slice(&block);
            }
        }
        Ok(out)
    }

    /// Centered zero-pad of one matrix block into one oversampled grid block.
    fn pad_into(&self, src: &[Complex32], dst: &mut [Complex32]) {
        match self.ndim {
            1 => {
                let o0 = self.pad_off[0];
                dst[o0..o0 + self.matrix[0]].copy_from_slice(src);
            }
            2 => {
                let (n0, n1) = (self.matrix[0], self.matrix[1]);
                let (o0, o1) = (self.pad_off[0], self.pad_off[1]);
                let s1 = self.os_shape[1];
                for i in 0..n0 {
                    let dst_row = (i + o0) * s1 + o1;
                    dst[dst_row..dst_row + n1].copy_from_slice(&src[i * n1..(i + 1) * n1]);
                }
            }
            3 => {
                let (n0, n1, n2) = (self.matrix[0], self.matrix[1], self.matrix[2]);
                let (o0, o1, o2) = (self.pad_off[0], self.pad_off[1], self.pad_off[2]);
                let (s1, s2) = (self.os_shape[1], self.os_shape[2]);
                for i in 0..n0 {
                    for j in 0..n1 {
                        let dst_row = ((i + o0) * s1 + (j + o1)) * s2 + o2;
                        let src_row = (i * n1 + j) * n2;
                        dst[dst_row..dst_row + n2]
                            .copy_from_slice(&src[src_row..src_row + n2]);
                    }
                }
            }
            _ => unreachable!("dimensionality validated at construction"),
        }
    }

    /// Exact transpose of [`pad_into`]: centered crop.
    fn crop_from(&self, src: &[Complex32], dst: &mut [Complex32]) {
        match self.ndim {
            1 => {
                let o0 = self.pad_off[0];
                dst.copy_from_slice(&src[o0..o0 + self.matrix[0]]);
            }
            2 => {
                let (n0, n1) = (self.matrix[0], self.matrix[1]);
                let (o0, o1) = (self.pad_off[0], self.pad_off[1]);
                let s1 = self.os_shape[1];
                for i in 0..n0 {
                    let src_row = (i + o0) * s1 + o1;
                    dst[i * n1..(i + 1) * n1].copy_from_slice(&src[src_row..src_row + n1]);
                }
            }
            3 => {
                let (n0, n1, n2) = (self.matrix[0], self.matrix[1], self.matrix[2]);
                let (o0, o1, o2) = (self.pad_off[0], self.pad_off[1], self.pad_off[2]);
                let (s1, s2) = (self.os_shape[1], self.os_shape[2]);
                for i in 0..n0 {
                    for j in 0..n1 {
                        let src_row = ((i + o0) * s1 + (j + o1)) * s2 + o2;
                        let dst_row = (i * n1 + j) * n2;
                        dst[dst_row..dst_row + n2]
                            .copy_from_slice(&src[src_row..src_row + n2]);
                    }
                }
            }
            _ => unreachable!("dimensionality validated at construction"),
        }
    }
}

/// Forward NUFFT of an image batch; see [`NufftPlan::forward`].
pub fn nufft(image: &[Complex32], plan: &NufftPlan) -> Result<Vec<Complex32>, ReconError> {
    plan.forward(image)
}

/// Reconstruction-normalized adjoint NUFFT.
///
/// Applies the density compensation weights (shape (ncontrasts,
/// nviews*nsamples), broadcast over batch) and divides by prod(matrix), so
/// that fully sampled unit data reproduces a centered unit impulse. For the
/// pure mathematical adjoint use [`NufftPlan::adjoint`].
pub fn nufft_adjoint(
    kdata: &[Complex32],
    plan: &NufftPlan,
    dcf: Option<&[f32]>,
) -> Result<Vec<Complex32>, ReconError> {
    let image = match dcf {
        Some(w) => {
            let block = plan.ncontrasts() * plan.samples_per_contrast();
            if w.len() != block {
                return Err(ReconError::ShapeMismatch(format!(
                    "density weights hold {} values, expected {}",
                    w.len(),
                    block
                )));
            }
            let mut weighted = kdata.to_vec();
            for (i, v) in weighted.iter_mut().enumerate() {
                *v *= w[i % block];
            }
            plan.adjoint(&weighted)?
        }
        None => plan.adjoint(kdata)?,
    };
    let mut image = image;
    scale_c32(&mut image, 1.0 / plan.matrix_len() as f32);
    Ok(image)
}

/// Full separable product of per-axis windows, C order.
fn separable_product(axes: &[Vec<f32>]) -> Vec<f32> {
    match axes {
        [a] => a.clone(),
        [a, b] => {
            let mut out = Vec::with_capacity(a.len() * b.len());
            for &ai in a {
                for &bi in b {
                    out.push(ai * bi);
                }
            }
            out
        }
        [a, b, c] => {
            let mut out = Vec::with_capacity(a.len() * b.len() * c.len());
            for &ai in a {
                for &bi in b {
                    for &ci in c {
                        out.push(ai * bi * ci);
                    }
                }
            }
            out
        }
        _ => unreachable!("dimensionality validated at construction"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lattice_1d(npix: usize) -> SampleSet {
        let coords: Vec<f32> = (0..npix)
            .map(|i| i as f32 - (npix / 2) as f32)
            .collect();
        SampleSet::new(coords, 1, 1, npix, 1).unwrap()
    }

    #[test]
    fn test_plan_rejects_bad_matrix_rank() {
        let s = lattice_1d(4);
        let res = NufftPlan::new(&s, &[4, 4], &NufftOptions::default());
        assert!(matches!(res, Err(ReconError::ShapeMismatch(_))));
    }

    #[test]
    fn test_plan_rejects_bad_ndim() {
        let res = SampleSet::new(vec![0.0; 16], 1, 1, 4, 4);
        assert!(matches!(res, Err(ReconError::UnsupportedConfig(_))));
    }

    #[test]
    fn test_forward_rejects_bad_image_len() {
        let s = lattice_1d(4);
        let plan = NufftPlan::new(&s, &[4], &NufftOptions::default()).unwrap();
        let image = vec![Complex32::new(0.0, 0.0); 6];
        assert!(matches!(
            plan.forward(&image),
            Err(ReconError::ShapeMismatch(_))
        ));
    }

    #[test]
    fn test_basis_identity_entries() {
        let b = Basis::identity(3);
        for c in 0..3 {
            for k in 0..3 {
                let expected = if c == k { 1.0 } else { 0.0 };
                assert_eq!(b.entry(c, k), Complex32::new(expected, 0.0));
            }
        }
    }

    #[test]
    fn test_pad_crop_are_transposes() {
        let s = SampleSet::new(vec![0.0; 2 * 4 * 4], 1, 4, 4, 2).unwrap();
        let plan = NufftPlan::new(&s, &[4, 4], &NufftOptions::default()).unwrap();

        let x: Vec<Complex32> = (0..16)
            .map(|i| Complex32::new(i as f32, -(i as f32)))
            .collect();
        let mut padded = vec![Complex32::new(0.0, 0.0); plan.os_len];
        plan.pad_into(&x, &mut padded);
        let mut back = vec![Complex32::new(0.0, 0.0); 16];
        plan.crop_from(&padded, &mut back);

        assert_eq!(x, back);
        // pad adds only zeros
        let pad_mass: f32 = padded.iter().map(|v| v.norm_sqr()).sum();
        let x_mass: f32 = x.iter().map(|v| v.norm_sqr()).sum();
        assert!((pad_mass - x_mass).abs() < 1e-3);
    }

    #[test]
    fn test_deapod_product_shape() {
        let s = SampleSet::new(vec![0.0; 2 * 5 * 3], 1, 5, 3, 2).unwrap();
        let plan = NufftPlan::new(&s, &[4, 6], &NufftOptions::default()).unwrap();
        assert_eq!(plan.deapod.len(), 24);
        // separable: corner value is the product of the axis extremes
        assert!(plan.deapod.iter().all(|&v| v > 0.0));
    }
}
