//! Kaiser-Bessel gridding kernel.
//!
//! The kernel is evaluated through a precomputed interpolation table shared by
//! the gridding and degridding paths, so both directions see bit-identical
//! weights. The deapodization window is the kernel's image-domain transform,
//! sampled on the target matrix; dividing by it undoes the rolloff the
//! convolution imprints on the image.

use std::f64::consts::PI;

use crate::error::ReconError;

/// Kernel shape parameter for minimal aliasing error at the given width and
/// oversampling ratio (Beatty et al.).
pub fn kb_beta(width: usize, oversamp: f64) -> Result<f64, ReconError> {
    let arg = ((width as f64 / oversamp) * (oversamp - 0.5)).powi(2) - 0.8;
    if arg <= 0.0 {
        return Err(ReconError::UnsupportedConfig(format!(
            "kernel width {} with oversampling {} yields a degenerate shape parameter",
            width, oversamp
        )));
    }
    Ok(PI * arg.sqrt())
}

/// Modified Bessel function of the first kind, order zero.
///
/// Polynomial approximation from Abramowitz & Stegun 9.8.1/9.8.2, accurate to
/// ~2e-7 relative over the full range.
pub fn bessel_i0(x: f64) -> f64 {
    let ax = x.abs();
    if ax < 3.75 {
        let t = (x / 3.75).powi(2);
        1.0 + t
            * (3.5156229
                + t * (3.0899424
                    + t * (1.2067492 + t * (0.2659732 + t * (0.0360768 + t * 0.0045813)))))
    } else {
        let t = 3.75 / ax;
        (ax.exp() / ax.sqrt())
            * (0.39894228
                + t * (0.01328592
                    + t * (0.00225319
                        + t * (-0.00157565
                            + t * (0.00916281
                                + t * (-0.02057706
                                    + t * (0.02635537
                                        + t * (-0.01647633 + t * 0.00392377))))))))
    }
}

/// Precomputed Kaiser-Bessel lookup over the half-support [0, W/2].
pub struct KernelTable {
    width: usize,
    beta: f64,
    table: Vec<f32>,
}

impl KernelTable {
    /// Build the table for the given width, oversampling ratio and resolution.
    ///
    /// Fails at construction for widths below 2, oversampling below 1.0 or a
    /// degenerate shape parameter.
    pub fn new(width: usize, oversamp: f64, table_len: usize) -> Result<Self, ReconError> {
        if width < 2 {
            return Err(ReconError::UnsupportedConfig(format!(
                "kernel width must be at least 2, got {}",
                width
            )));
        }
        if oversamp < 1.0 {
            return Err(ReconError::UnsupportedConfig(format!(
                "oversampling ratio must be at least 1.0, got {}",
                oversamp
            )));
        }
        if table_len < 2 {
            return Err(ReconError::UnsupportedConfig(format!(
                "kernel table length must be at least 2, got {}",
                table_len
            )));
        }
        let beta = kb_beta(width, oversamp)?;

        let mut table = Vec::with_capacity(table_len);
        for i in 0..table_len {
            // x is the offset normalized to the half-width, in [0, 1]
            let x = i as f64 / (table_len - 1) as f64;
            table.push(bessel_i0(beta * (1.0 - x * x).sqrt()) as f32);
        }

        Ok(Self { width, beta, table })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn beta(&self) -> f64 {
        self.beta
    }

    /// Kernel value at a real offset `u` in grid cells, |u| <= W/2.
    /// Offsets beyond the support evaluate to zero.
    #[inline]
    pub fn eval(&self, u: f32) -> f32 {
        let x = u.abs() * 2.0 / self.width as f32;
        if x >= 1.0 {
            if x > 1.0 {
                return 0.0;
            }
            return self.table[self.table.len() - 1];
        }
        let f = x * (self.table.len() - 1) as f32;
        let i = f as usize;
        let frac = f - i as f32;
        self.table[i] + frac * (self.table[i + 1] - self.table[i])
    }
}

/// Deapodization correction along one axis.
///
/// Entry m is 1/(W·c(t)) with c(t) = sinh(sqrt(beta^2 - (pi W t)^2))/sqrt(...)
/// at t = (m - n/2)/os_n, the image-domain transform of the unnormalized
/// kernel. A non-positive sqrt argument anywhere on the matrix means the
/// window has a zero crossing inside the field of view; that configuration is
/// rejected here rather than at apply time.
pub fn deapodization_axis(
    n: usize,
    os_n: usize,
    width: usize,
    beta: f64,
) -> Result<Vec<f32>, ReconError> {
    let mut out = Vec::with_capacity(n);
    for m in 0..n {
        let t = (m as f64 - (n / 2) as f64) / os_n as f64;
        let arg = beta * beta - (PI * width as f64 * t).powi(2);
        if arg <= 0.0 {
            return Err(ReconError::UnsupportedConfig(format!(
                "deapodization window degenerate at index {} (n={}, oversampled {}, width {})",
                m, n, os_n, width
            )));
        }
        let s = arg.sqrt();
        let w = if s < 1e-8 { 1.0 } else { s / s.sinh() };
        out.push((w / width as f64) as f32);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_i0_known_values() {
        assert!((bessel_i0(0.0) - 1.0).abs() < 1e-12);
        // I0(1) = 1.2660658...
        assert!((bessel_i0(1.0) - 1.2660658).abs() < 1e-6);
        // I0(5) = 27.239871...
        assert!((bessel_i0(5.0) - 27.239871).abs() < 1e-3);
    }

    #[test]
    fn test_i0_branch_continuity() {
        // i0 itself moves by about I1(3.75) * dx ~ 1.6e-3 over this interval,
        // so the tolerance must sit above the true slope contribution
        let below = bessel_i0(3.7499);
        let above = bessel_i0(3.7501);
        assert!(
            (below - above).abs() / below < 5e-4,
            "i0 discontinuous across branch: {} vs {}",
            below,
            above
        );
    }

    #[test]
    fn test_beta_reference_value() {
        // width 4, oversampling 1.25: pi * sqrt((3.2 * 0.75)^2 - 0.8)
        let beta = kb_beta(4, 1.25).unwrap();
        assert!((beta - 6.99664).abs() < 1e-4, "beta = {}", beta);
    }

    #[test]
    fn test_table_matches_closed_form() {
        let kt = KernelTable::new(4, 1.25, 1024).unwrap();
        let beta = kt.beta();
        for &u in &[0.0f32, 0.3, 0.77, 1.5, 1.99] {
            let x = (u as f64) / 2.0;
            let exact = bessel_i0(beta * (1.0 - x * x).sqrt());
            let got = kt.eval(u) as f64;
            assert!(
                (got - exact).abs() / exact < 1e-3,
                "eval({}) = {}, closed form {}",
                u,
                got,
                exact
            );
        }
    }

    #[test]
    fn test_eval_symmetric_and_bounded() {
        let kt = KernelTable::new(4, 1.25, 1024).unwrap();
        assert!((kt.eval(0.7) - kt.eval(-0.7)).abs() < 1e-6);
        assert_eq!(kt.eval(2.5), 0.0);
        assert!(kt.eval(0.0) > kt.eval(1.0));
    }

    #[test]
    fn test_deapodization_center_value() {
        let kt = KernelTable::new(4, 1.25, 1024).unwrap();
        let d = deapodization_axis(4, 5, 4, kt.beta()).unwrap();
        let beta = kt.beta();
        let expected = beta / beta.sinh() / 4.0;
        assert!((d[2] as f64 - expected).abs() < 1e-7);
        // window grows away from the center (rolloff compensation)
        assert!(d[0] > d[2]);
    }

    #[test]
    fn test_degenerate_window_rejected() {
        // no oversampling with a large matrix pushes pi*W*t past beta
        let beta = kb_beta(4, 1.0).unwrap();
        let res = deapodization_axis(64, 64, 4, beta);
        assert!(matches!(res, Err(ReconError::UnsupportedConfig(_))));
    }

    #[test]
    fn test_bad_width_rejected() {
        assert!(matches!(
            KernelTable::new(1, 1.25, 1024),
            Err(ReconError::UnsupportedConfig(_))
        ));
        assert!(matches!(
            KernelTable::new(4, 0.9, 1024),
            Err(ReconError::UnsupportedConfig(_))
        ));
    }
}
