use thiserror::Error;

/// Errors raised while settling an enrollment.
///
/// Every variant maps to a stable wire kind (see [`SettlementError::kind`]) so
/// the HTTP layer and the checkout client agree on the taxonomy.
#[derive(Error, Debug)]
pub enum SettlementError {
    /// Caller error: missing or malformed identifiers or payloads.
    #[error("{0}")]
    BadRequest(String),
    /// The referenced course does not exist.
    #[error("{0}")]
    NotFound(String),
    /// No verified caller identity.
    #[error("{0}")]
    Unauthorized(String),
    /// Verified caller, but not allowed to use this operation.
    #[error("{0}")]
    Forbidden(String),
    /// The payment processor errored, timed out or was unreachable.
    #[error("payment processor error: {0}")]
    UpstreamPayment(String),
    /// One of the two settlement writes failed. Needs reconciliation.
    #[error(
        "enrollment write failed (enrollment written: {enrollment_written}, payment written: {payment_written}): {reason}"
    )]
    UpstreamWrite {
        enrollment_written: bool,
        payment_written: bool,
        reason: String,
    },
    #[error("Validation error: {0}")]
    ValidationError(String),
    #[error("Internal error: {0}")]
    InternalError(Box<dyn std::error::Error + Send + Sync>),
    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[cfg(feature = "storage-rocksdb")]
    #[error("RocksDB error: {0}")]
    RocksDbError(#[from] rocksdb::Error),
}

impl SettlementError {
    /// Stable, machine-readable kind used in error envelopes.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::BadRequest(_) | Self::ValidationError(_) => "bad_request",
            Self::NotFound(_) => "not_found",
            Self::Unauthorized(_) => "unauthorized",
            Self::Forbidden(_) => "forbidden",
            Self::UpstreamPayment(_) => "upstream_payment_error",
            Self::UpstreamWrite { .. } => "upstream_write_failure",
            Self::InternalError(_) | Self::CsvError(_) | Self::IoError(_) => "internal",
            #[cfg(feature = "storage-rocksdb")]
            Self::RocksDbError(_) => "internal",
        }
    }

    /// Rebuilds an error from a wire kind and message.
    pub fn from_kind(kind: &str, message: String) -> Self {
        match kind {
            "bad_request" => Self::BadRequest(message),
            "not_found" => Self::NotFound(message),
            "unauthorized" => Self::Unauthorized(message),
            "forbidden" => Self::Forbidden(message),
            "upstream_payment_error" => Self::UpstreamPayment(message),
            "upstream_write_failure" => Self::UpstreamWrite {
                enrollment_written: false,
                payment_written: false,
                reason: message,
            },
            _ => Self::InternalError(message.into()),
        }
    }

    pub(crate) fn internal(message: impl Into<String>) -> Self {
        let message: String = message.into();
        Self::InternalError(message.into())
    }
}

pub type Result<T> = std::result::Result<T, SettlementError>;
