//! NUFFT-Core: non-uniform FFT operators and iterative reconstruction
//!
//! This crate provides the gridding NUFFT operator pair and a conjugate
//! gradient solver for non-Cartesian MRI reconstruction.
//!
//! # Modules
//! - `kernel`: Kaiser-Bessel interpolation kernel and deapodization window
//! - `gridding`: convolutional resampling between samples and the grid
//! - `fft`: centered FFT workspaces using rustfft
//! - `nufft`: forward/adjoint NUFFT plans, optional low-rank basis
//! - `linop`: composable linear operators for the solver
//! - `solvers`: conjugate gradient
//! - `utils`: SIMD vector kernels

// Core modules
pub mod error;
pub mod fft;
pub mod gridding;
pub mod kernel;

// Operator and solver modules
pub mod linop;
pub mod nufft;
pub mod solvers;
pub mod utils;

pub use error::ReconError;
pub use linop::{LinOp, NufftNormal};
pub use nufft::{nufft, nufft_adjoint, Basis, NufftOptions, NufftPlan, SampleSet};
pub use solvers::{cg_solve, CgConfig};
