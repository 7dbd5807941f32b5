//! Portable data-parallel execution runtime.
//!
//! This crate is the execution collaborator consumed by `reikna-blas`: a
//! device context with an architecture record and allocation tracking,
//! typed device buffers, and an ordered queue that launches kernels over a
//! 3-D grid of cooperative groups.
//!
//! The shipped runtime executes on the host. Cooperative groups run in
//! parallel (one rayon task per group); within a group the kernel body
//! iterates its lanes in explicit phases, so every reduction tree has a
//! fixed shape and results are reproducible bit-for-bit run to run. A
//! phase boundary in a kernel body is the analogue of an in-group barrier:
//! all lanes of one phase complete before the next phase reads what they
//! wrote.
//!
//! The only cross-group communication primitive is [`AtomicAdd`]; kernels
//! that use it (and only those) trade bitwise reproducibility for
//! grid-wide accumulation.

pub mod atomic;
pub mod buffer;
pub mod context;
pub mod error;
pub mod queue;

pub use atomic::AtomicAdd;
pub use buffer::{DevSlice, DeviceBuffer};
pub use context::{ArchCode, DeviceContext, DeviceInfo};
pub use error::{DeviceError, DeviceResult};
pub use queue::{Dim3, GroupCtx, LaunchConfig, Queue};
