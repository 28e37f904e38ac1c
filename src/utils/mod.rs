pub mod simd_ops;
