use std::fmt;

use zarrs::{
    array::{ArrayCreateError, ArrayError},
    group::GroupCreateError,
    storage::StorageError,
};

use crate::device::DeviceKind;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A required configuration value is missing or empty.
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("no {kind} device matches {pattern:?}")]
    DeviceNotFound { kind: DeviceKind, pattern: String },
    /// The stored array does not have the geometry that was requested.
    #[error("shape mismatch: {0}")]
    ShapeMismatch(GeometryMismatch),
    /// Acquisition dimensions or chunk layout violate an invariant.
    #[error("invalid geometry: {0}")]
    InvalidGeometry(String),
    /// The runtime was driven through an illegal state transition.
    #[error("runtime error: {0}")]
    Runtime(String),
    #[error("{0}")]
    General(String),
    #[error(transparent)]
    SerdeJson(#[from] serde_json::Error),
    #[error(transparent)]
    Figment(#[from] Box<figment::Error>),
    #[error(transparent)]
    Regex(#[from] regex::Error),
    #[error(transparent)]
    Url(#[from] url::ParseError),
    #[error(transparent)]
    ArrayCreate(#[from] ArrayCreateError),
    #[error(transparent)]
    Array(#[from] ArrayError),
    #[error(transparent)]
    GroupCreate(#[from] GroupCreateError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Wrapped(Box<dyn std::error::Error + Send + Sync>),
}

impl Error {
    pub fn general(message: impl Into<String>) -> Self {
        Self::General(message.into())
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    pub fn invalid_geometry(message: impl Into<String>) -> Self {
        Self::InvalidGeometry(message.into())
    }

    pub fn runtime(message: impl Into<String>) -> Self {
        Self::Runtime(message.into())
    }

    pub fn wrap(error: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Wrapped(Box::new(error))
    }
}

impl From<figment::Error> for Error {
    fn from(value: figment::Error) -> Self {
        Self::Figment(Box::new(value))
    }
}

/// Which reported quantity of a stored array disagreed with the requested geometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeometryQuantity {
    ChunkShape,
    Shape,
    ChunkCount,
}

impl fmt::Display for GeometryQuantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            GeometryQuantity::ChunkShape => "chunk shape",
            GeometryQuantity::Shape => "shape",
            GeometryQuantity::ChunkCount => "chunk count",
        };
        f.write_str(s)
    }
}

/// Expected and reported values of a single geometry quantity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeometryMismatch {
    pub quantity: GeometryQuantity,
    pub expected: Vec<u64>,
    pub actual: Vec<u64>,
}

impl fmt::Display for GeometryMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} is {:?}, expected {:?}",
            self.quantity, self.actual, self.expected
        )
    }
}
