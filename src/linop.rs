//! Linear operators over flat complex buffers.
//!
//! The solver only needs "apply A to x", so operators are a small tagged enum
//! rather than a trait object zoo: boxed closures for ad-hoc operators, a
//! dense matrix form for small problems and tests, the NUFFT normal operator
//! for reconstruction, and identity/scale/sum combinators that compose the
//! Tikhonov-regularized system without touching the wrapped operator.
//!
//! All variants allocate their output; the buffers at play are image-sized,
//! not grid-sized, and the FFT work inside the normal operator dominates
//! anyway.

use num_complex::Complex32;

use crate::error::ReconError;
use crate::nufft::NufftPlan;
use crate::utils::simd_ops::{axpy_c32, scale_c32};

/// Self-adjoint NUFFT normal operator A^H W A with optional density
/// compensation weights W. Includes the 1/prod(matrix) reconstruction
/// normalization, so it is consistent with [`crate::nufft::nufft_adjoint`].
pub struct NufftNormal<'a> {
    plan: &'a NufftPlan,
    dcf: Option<Vec<f32>>,
}

impl<'a> NufftNormal<'a> {
    pub fn new(plan: &'a NufftPlan, dcf: Option<Vec<f32>>) -> Result<Self, ReconError> {
        if let Some(w) = &dcf {
            let expected = plan.ncontrasts() * plan.samples_per_contrast();
            if w.len() != expected {
                return Err(ReconError::ShapeMismatch(format!(
                    "density weights hold {} values, expected {}",
                    w.len(),
                    expected
                )));
            }
        }
        Ok(Self { plan, dcf })
    }

    fn apply(&self, x: &[Complex32]) -> Result<Vec<Complex32>, ReconError> {
        let mut kdata = self.plan.forward(x)?;
        if let Some(w) = &self.dcf {
            let block = w.len();
            for (i, v) in kdata.iter_mut().enumerate() {
                *v *= w[i % block];
            }
        }
        let mut out = self.plan.adjoint(&kdata)?;
        scale_c32(&mut out, 1.0 / self.plan.matrix_len() as f32);
        Ok(out)
    }
}

/// A linear operator the solver can apply.
pub enum LinOp<'a> {
    /// Arbitrary matrix-free operator.
    Fun(Box<dyn Fn(&[Complex32]) -> Result<Vec<Complex32>, ReconError> + Sync + 'a>),
    /// Dense n x n matrix, row-major.
    Dense { mat: Vec<Complex32>, n: usize },
    /// NUFFT normal operator.
    Normal(NufftNormal<'a>),
    /// Identity.
    Identity,
    /// Real scalar multiple of another operator.
    Scaled(f32, Box<LinOp<'a>>),
    /// Sum of two operators, applied to the same input.
    Sum(Box<LinOp<'a>>, Box<LinOp<'a>>),
    /// Borrow of another operator, so combinators need not take ownership.
    Ref(&'a LinOp<'a>),
}

impl<'a> LinOp<'a> {
    pub fn from_fn<F>(f: F) -> Self
    where
        F: Fn(&[Complex32]) -> Result<Vec<Complex32>, ReconError> + Sync + 'a,
    {
        LinOp::Fun(Box::new(f))
    }

    pub fn dense(mat: Vec<Complex32>, n: usize) -> Result<Self, ReconError> {
        if mat.len() != n * n {
            return Err(ReconError::ShapeMismatch(format!(
                "dense operator holds {} entries, expected {}x{}",
                mat.len(),
                n,
                n
            )));
        }
        Ok(LinOp::Dense { mat, n })
    }

    pub fn apply(&self, x: &[Complex32]) -> Result<Vec<Complex32>, ReconError> {
        match self {
            LinOp::Fun(f) => {
                let y = f(x)?;
                if y.len() != x.len() {
                    return Err(ReconError::ShapeMismatch(format!(
                        "operator changed length {} -> {}",
                        x.len(),
                        y.len()
                    )));
                }
                Ok(y)
            }
            LinOp::Dense { mat, n } => {
                if x.len() % n != 0 {
                    return Err(ReconError::ShapeMismatch(format!(
                        "input length {} is not a multiple of operator size {}",
                        x.len(),
                        n
                    )));
                }
                let mut y = vec![Complex32::new(0.0, 0.0); x.len()];
                for (xb, yb) in x.chunks_exact(*n).zip(y.chunks_exact_mut(*n)) {
                    for i in 0..*n {
                        let row = &mat[i * n..(i + 1) * n];
                        let mut acc = Complex32::new(0.0, 0.0);
                        for j in 0..*n {
                            acc += row[j] * xb[j];
                        }
                        yb[i] = acc;
                    }
                }
                Ok(y)
            }
            LinOp::Normal(op) => op.apply(x),
            LinOp::Identity => Ok(x.to_vec()),
            LinOp::Scaled(s, inner) => {
                let mut y = inner.apply(x)?;
                scale_c32(&mut y, *s);
                Ok(y)
            }
            LinOp::Sum(a, b) => {
                let mut y = a.apply(x)?;
                let yb = b.apply(x)?;
                if yb.len() != y.len() {
                    return Err(ReconError::ShapeMismatch(
                        "summed operators disagree on output length".into(),
                    ));
                }
                axpy_c32(&mut y, Complex32::new(1.0, 0.0), &yb);
                Ok(y)
            }
            LinOp::Ref(inner) => inner.apply(x),
        }
    }

    /// Apply the adjoint A^H. Identity, the normal operator and their
    /// scaled/summed compositions are self-adjoint; dense matrices use the
    /// conjugate transpose. Matrix-free callables carry no adjoint and are
    /// rejected.
    pub fn adjoint_apply(&self, x: &[Complex32]) -> Result<Vec<Complex32>, ReconError> {
        match self {
            LinOp::Fun(_) => Err(ReconError::UnsupportedConfig(
                "matrix-free operator has no adjoint".into(),
            )),
            LinOp::Dense { mat, n } => {
                if x.len() % n != 0 {
                    return Err(ReconError::ShapeMismatch(format!(
                        "input length {} is not a multiple of operator size {}",
                        x.len(),
                        n
                    )));
                }
                let mut y = vec![Complex32::new(0.0, 0.0); x.len()];
                for (xb, yb) in x.chunks_exact(*n).zip(y.chunks_exact_mut(*n)) {
                    for i in 0..*n {
                        let mut acc = Complex32::new(0.0, 0.0);
                        for j in 0..*n {
                            acc += mat[j * n + i].conj() * xb[j];
                        }
                        yb[i] = acc;
                    }
                }
                Ok(y)
            }
            LinOp::Normal(op) => op.apply(x),
            LinOp::Identity => Ok(x.to_vec()),
            LinOp::Scaled(s, inner) => {
                let mut y = inner.adjoint_apply(x)?;
                scale_c32(&mut y, *s);
                Ok(y)
            }
            LinOp::Sum(a, b) => {
                let mut y = a.adjoint_apply(x)?;
                let yb = b.adjoint_apply(x)?;
                if yb.len() != y.len() {
                    return Err(ReconError::ShapeMismatch(
                        "summed operators disagree on output length".into(),
                    ));
                }
                axpy_c32(&mut y, Complex32::new(1.0, 0.0), &yb);
                Ok(y)
            }
            LinOp::Ref(inner) => inner.adjoint_apply(x),
        }
    }

    /// The operator A + lamda * I for Tikhonov-regularized solves. Borrows
    /// `self`, so the unregularized operator stays usable.
    pub fn with_tikhonov<'b>(&'b self, lamda: f32) -> LinOp<'b>
    where
        'a: 'b,
    {
        LinOp::Sum(
            Box::new(LinOp::Ref(self)),
            Box::new(LinOp::Scaled(lamda, Box::new(LinOp::Identity))),
        )
    }
}
