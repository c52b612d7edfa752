//! SAI error type.

use thiserror::Error;

/// Error returned by a switch control call.
///
/// The variants follow the SAI status codes a caller can act on; anything
/// else is reported as [`SaiError::Internal`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SaiError {
    /// SAI_STATUS_INVALID_PARAMETER / SAI_STATUS_INVALID_OBJECT_ID
    #[error("Invalid parameter: {message}")]
    InvalidParameter { message: String },

    /// SAI_STATUS_ITEM_NOT_FOUND
    #[error("Item not found: {item}")]
    NotFound { item: String },

    /// SAI_STATUS_ITEM_ALREADY_EXISTS
    #[error("Item already exists: {item}")]
    AlreadyExists { item: String },

    /// SAI_STATUS_OBJECT_IN_USE
    #[error("Object in use: {object}")]
    ObjectInUse { object: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl SaiError {
    pub fn invalid_parameter(message: impl Into<String>) -> Self {
        SaiError::InvalidParameter {
            message: message.into(),
        }
    }

    pub fn not_found(item: impl Into<String>) -> Self {
        SaiError::NotFound { item: item.into() }
    }

    pub fn already_exists(item: impl Into<String>) -> Self {
        SaiError::AlreadyExists { item: item.into() }
    }

    pub fn object_in_use(object: impl Into<String>) -> Self {
        SaiError::ObjectInUse {
            object: object.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        SaiError::Internal {
            message: message.into(),
        }
    }

    /// Name of the SAI status code this error corresponds to.
    pub fn status_name(&self) -> &'static str {
        match self {
            SaiError::InvalidParameter { .. } => "SAI_STATUS_INVALID_PARAMETER",
            SaiError::NotFound { .. } => "SAI_STATUS_ITEM_NOT_FOUND",
            SaiError::AlreadyExists { .. } => "SAI_STATUS_ITEM_ALREADY_EXISTS",
            SaiError::ObjectInUse { .. } => "SAI_STATUS_OBJECT_IN_USE",
            SaiError::Internal { .. } => "SAI_STATUS_FAILURE",
        }
    }
}

/// Result type for SAI operations.
pub type SaiResult<T> = Result<T, SaiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SaiError::not_found("oid:0x15000000000a1");
        assert_eq!(err.to_string(), "Item not found: oid:0x15000000000a1");
    }

    #[test]
    fn test_status_name() {
        assert_eq!(
            SaiError::object_in_use("pool").status_name(),
            "SAI_STATUS_OBJECT_IN_USE"
        );
        assert_eq!(SaiError::internal("boom").status_name(), "SAI_STATUS_FAILURE");
    }
}
