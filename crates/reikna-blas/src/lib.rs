//! Batched dense linear-algebra kernels over the reikna execution runtime.
//!
//! The library implements the BLAS Level-1/2 reduction and tiling family
//! (dot, gemv and its symmetric/Hermitian/banded/packed relatives, rank-1
//! and rank-2 updates, triangular solve) plus a source-level GEMM fallback
//! behind an external-backend contract. Every operation follows the same
//! shape: a pure dispatch function picks a kernel variant and its tile
//! geometry from the problem size, element precision and device
//! architecture; operand descriptors resolve per-batch storage; kernels
//! partition the work across a grid of cooperative groups and combine
//! partial results through a fixed-shape tree reduction.
//!
//! Entry points assume pre-validated arguments: argument checking,
//! logging and numeric screening belong to the wrapper layer that calls
//! into this crate.

pub mod dispatch;
pub mod error;
pub mod handle;
pub mod operand;
pub mod ops;
pub mod reduce;
pub mod tuning;
pub mod types;

pub use dispatch::{
    DotKernel, DotLoad, DotPlan, GemvKernel, GemvPlan, GerKernel, GerPlan,
};
pub use error::{Error, Result};
pub use handle::Handle;
pub use operand::{
    same_vector, BatchSource, MatArg, Plain, PtrArray, ResultDest, ScalarArg, Strided, VecArg,
};
pub use reduce::{group_reduce_sum, wave_reduce_sum};
pub use tuning::Tunables;
pub use types::{Diag, Element, Op, Precision, Scalar, Uplo};

pub use ops::banded::{hbmv, sbmv};
pub use ops::dot::{dot, dot_workspace_size, dotc};
pub use ops::gemm::{gemm, GemmElement, GemmRequest, MatmulBackend};
pub use ops::gemv::{gemv, gemv_workspace_size};
pub use ops::ger::{ger, gerc};
pub use ops::packed::{hpmv, hpr, hpr2, spmv, spr, spr2};
pub use ops::symv::{hemv, symv};
pub use ops::syr::{her, her2, syr, syr2};
pub use ops::trsv::trsv;
