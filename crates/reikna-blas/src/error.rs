use reikna_device::DeviceError;
use thiserror::Error;

/// Failure taxonomy of the kernel library.
///
/// The core performs no argument validation; malformed descriptors are a
/// caller contract violation, not a reportable error. What remains is
/// small and stable so wrappers can map it onto their own status codes.
#[derive(Debug, Error)]
pub enum Error {
    /// The handle does not refer to a live device context. Reserved for
    /// bindings that hand out opaque handles; safe Rust callers cannot
    /// construct one.
    #[error("invalid handle")]
    InvalidHandle,

    /// The reduction scratch buffer (or another per-call allocation)
    /// could not be obtained. Fatal to the call, never retried.
    #[error("device memory allocation failed: {0}")]
    OutOfMemory(DeviceError),

    /// No kernel exists for this operation/precision combination. The
    /// caller may fall back to an alternative path.
    #[error("operation not implemented for this precision")]
    NotImplemented,

    /// The execution runtime rejected a launch or copy.
    #[error(transparent)]
    Device(DeviceError),
}

impl From<DeviceError> for Error {
    fn from(e: DeviceError) -> Self {
        match e {
            DeviceError::OutOfMemory { .. } => Error::OutOfMemory(e),
            other => Error::Device(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
