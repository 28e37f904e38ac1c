//! Conjugate gradient for self-adjoint positive semidefinite systems.
//!
//! Solves (A + lamda I) x = b with x0 = 0, where b is the adjoint-projected
//! data A^H y and A the normal operator. The solve is batched: the buffer
//! holds (batch, *solution) elements flat, the operator is applied to the
//! whole buffer at once, and the scalar recursion (alpha, beta, residual
//! norms) runs independently per batch element. Convergence requires every
//! batch element's residual norm to drop below the tolerance.
//!
//! A batch element whose curvature denominator <p, Ap> collapses to zero is
//! frozen at its current iterate instead of poisoning the whole batch with a
//! division by zero; frozen elements count as converged.

use num_complex::Complex32;

use crate::error::ReconError;
use crate::linop::LinOp;
use crate::utils::simd_ops::{axpy_c32, dot_conj_c32, norm_sq_c32, xpby_c32};

const TINY: f32 = 1e-20;

/// Solver configuration.
pub struct CgConfig {
    /// Maximum number of iterations.
    pub niter: usize,
    /// Residual norm threshold for early termination; `None` runs all
    /// `niter` iterations.
    pub tol: Option<f32>,
    /// Tikhonov regularization strength; 0 solves the unregularized system.
    pub lamda: f32,
    /// Record the objective value after each iteration.
    pub save_history: bool,
    /// Print per-iteration residuals to stderr.
    pub verbose: bool,
}

impl Default for CgConfig {
    fn default() -> Self {
        Self {
            niter: 10,
            tol: None,
            lamda: 0.0,
            save_history: false,
            verbose: false,
        }
    }
}

/// One batched CG recursion in progress.
///
/// Separated from [`cg_solve`] so callers that want to interleave work
/// between iterations (progress reporting, custom stopping rules) can drive
/// the recursion themselves.
pub struct CgStep {
    r: Vec<Complex32>,
    p: Vec<Complex32>,
    rsold: Vec<f32>,
    rsnew: Vec<f32>,
    active: Vec<bool>,
    seg: usize,
}

impl CgStep {
    /// Start the recursion at x0 = 0, so r0 = p0 = b. `seg` is the length of
    /// one batch element; `b.len()` must be a multiple of it.
    pub fn new(b: &[Complex32], seg: usize) -> Result<Self, ReconError> {
        if seg == 0 || b.len() % seg != 0 {
            return Err(ReconError::ShapeMismatch(format!(
                "right-hand side length {} is not a multiple of the solution length {}",
                b.len(),
                seg
            )));
        }
        let batch = b.len() / seg;
        let rsold: Vec<f32> = (0..batch)
            .map(|bi| norm_sq_c32(&b[bi * seg..(bi + 1) * seg]))
            .collect();
        Ok(Self {
            r: b.to_vec(),
            p: b.to_vec(),
            rsnew: rsold.clone(),
            active: rsold.iter().map(|&rs| rs > TINY).collect(),
            rsold,
            seg,
        })
    }

    pub fn batch(&self) -> usize {
        self.active.len()
    }

    /// Residual norms (squared) per batch element after the last step.
    pub fn residuals(&self) -> &[f32] {
        &self.rsnew
    }

    /// Advance x by one CG iteration against the operator `op`.
    ///
    /// Applies the operator to the full search-direction buffer, then updates
    /// each active batch element independently. The direction update uses the
    /// ratio of the new to old residual norm, so `step` leaves the recursion
    /// ready for the next call.
    pub fn step(&mut self, op: &LinOp<'_>, x: &mut [Complex32]) -> Result<(), ReconError> {
        if x.len() != self.r.len() {
            return Err(ReconError::ShapeMismatch(format!(
                "solution length {} does not match right-hand side length {}",
                x.len(),
                self.r.len()
            )));
        }
        let q = op.apply(&self.p)?;
        if q.len() != self.p.len() {
            return Err(ReconError::ShapeMismatch(
                "operator changed the buffer length".into(),
            ));
        }

        let seg = self.seg;
        for bi in 0..self.batch() {
            if !self.active[bi] {
                continue;
            }
            let span = bi * seg..(bi + 1) * seg;
            let pq = dot_conj_c32(&self.p[span.clone()], &q[span.clone()]);
            if pq.norm_sqr() < TINY * TINY {
                // zero curvature, freeze this element at its current iterate
                self.active[bi] = false;
                continue;
            }
            let alpha = Complex32::new(self.rsold[bi], 0.0) / pq;
            axpy_c32(&mut x[span.clone()], alpha, &self.p[span.clone()]);
            axpy_c32(&mut self.r[span.clone()], -alpha, &q[span.clone()]);
            self.rsnew[bi] = norm_sq_c32(&self.r[span]);
        }

        // direction update, after all residuals of this iteration are in
        for bi in 0..self.batch() {
            if !self.active[bi] {
                continue;
            }
            let span = bi * seg..(bi + 1) * seg;
            let beta = self.rsnew[bi] / self.rsold[bi].max(TINY);
            let (pb, rb) = (&mut self.p[span.clone()], &self.r[span]);
            xpby_c32(pb, rb, beta);
            self.rsold[bi] = self.rsnew[bi];
        }
        Ok(())
    }

    /// True when every batch element is below `tol` or frozen.
    pub fn converged(&self, tol: f32) -> bool {
        self.rsnew
            .iter()
            .zip(self.active.iter())
            .all(|(&rs, &act)| !act || rs.sqrt() < tol)
    }
}

/// Solve (A + lamda I) x = b, returning the solution and the objective
/// history (empty unless `save_history` is set).
///
/// `shape` is the full buffer shape with the solution occupying the trailing
/// `ndim` axes; leading axes are independent batch elements. The objective
/// 0.5 * ||x - b||^2 + lamda * ||x||^2 is recorded after each iteration,
/// before the convergence test, so a solve that converges on the first
/// iteration still reports one entry.
pub fn cg_solve(
    b: &[Complex32],
    op: &LinOp<'_>,
    shape: &[usize],
    ndim: usize,
    cfg: &CgConfig,
) -> Result<(Vec<Complex32>, Vec<f32>), ReconError> {
    if ndim == 0 || ndim > shape.len() {
        return Err(ReconError::UnsupportedConfig(format!(
            "solution dimensionality {} does not fit a {}-axis buffer",
            ndim,
            shape.len()
        )));
    }
    let total: usize = shape.iter().product();
    if b.len() != total {
        return Err(ReconError::ShapeMismatch(format!(
            "right-hand side length {} does not match shape {:?}",
            b.len(),
            shape
        )));
    }
    let seg: usize = shape[shape.len() - ndim..].iter().product();

    let regularized;
    let system: &LinOp<'_> = if cfg.lamda != 0.0 {
        regularized = op.with_tikhonov(cfg.lamda);
        &regularized
    } else {
        op
    };

    let mut x = vec![Complex32::new(0.0, 0.0); b.len()];
    let mut state = CgStep::new(b, seg)?;
    let mut history = Vec::new();

    for it in 0..cfg.niter {
        state.step(system, &mut x)?;

        if cfg.save_history {
            history.push(objective(&x, b, cfg.lamda));
        }
        if cfg.verbose {
            let worst = state
                .residuals()
                .iter()
                .cloned()
                .fold(0.0f32, f32::max)
                .sqrt();
            eprintln!("[CG] iter {}/{}: residual {:.3e}", it + 1, cfg.niter, worst);
        }
        if let Some(tol) = cfg.tol {
            if state.converged(tol) {
                break;
            }
        }
    }
    Ok((x, history))
}

fn objective(x: &[Complex32], b: &[Complex32], lamda: f32) -> f32 {
    let mut diff = 0.0f32;
    for (xi, bi) in x.iter().zip(b.iter()) {
        diff += (xi - bi).norm_sqr();
    }
    0.5 * diff + lamda * norm_sq_c32(x)
}
