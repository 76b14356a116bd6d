//! Multiplicative update drivers, one per cost function.
//!
//! Each driver owns its scratch matrices, allocated once at entry and
//! reused across iterations, and exposes a single `run` entry point that
//! loops until the step limit or the convergence criterion is hit.

mod continuous;
mod ed;
mod kl;
mod sparse;

pub(crate) use continuous::NmfKlTempCont;
pub(crate) use ed::{NmdEd, NmfEd};
pub(crate) use kl::NmdKl;
pub(crate) use sparse::{NmfEdSparse, NmfEdSparseNorm, NmfKlSparse};
