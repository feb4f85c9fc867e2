use thiserror::Error;

#[derive(Debug, Error)]
pub enum DomainError {
    #[error("`{field}` is not a valid calendar date: `{value}`")]
    InvalidDate { field: &'static str, value: String },
    #[error("`{field}` must be a finite number")]
    NonFinite { field: &'static str },
    #[error("domain validation failed: {message}")]
    Validation { message: String },
}

impl DomainError {
    pub fn invalid_date(field: &'static str, value: impl Into<String>) -> Self {
        Self::InvalidDate {
            field,
            value: value.into(),
        }
    }

    pub fn non_finite(field: &'static str) -> Self {
        Self::NonFinite { field }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }
}
