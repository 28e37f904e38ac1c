pub mod cg;

pub use cg::{cg_solve, CgConfig, CgStep};
