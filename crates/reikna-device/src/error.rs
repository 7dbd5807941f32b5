use thiserror::Error;

#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("device allocation of {requested} bytes failed ({in_use} bytes in use, limit {limit})")]
    OutOfMemory {
        requested: usize,
        in_use: usize,
        limit: usize,
    },

    #[error("invalid launch configuration: {0}")]
    InvalidLaunch(String),

    #[error("copy extents mismatch: source {src} elements, destination {dst}")]
    CopyExtents { src: usize, dst: usize },
}

pub type DeviceResult<T> = Result<T, DeviceError>;
