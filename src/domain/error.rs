use thiserror::Error;

/// A path parameter that could not be turned into a domain value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParameterError {
    #[error("invalid `{name}` parameter: `{value}` is not a number")]
    NotNumeric { name: &'static str, value: String },
    #[error("invalid `{name}` parameter: `{value}` is out of range")]
    OutOfRange { name: &'static str, value: String },
}

impl ParameterError {
    pub fn not_numeric(name: &'static str, value: impl Into<String>) -> Self {
        Self::NotNumeric {
            name,
            value: value.into(),
        }
    }

    pub fn out_of_range(name: &'static str, value: impl Into<String>) -> Self {
        Self::OutOfRange {
            name,
            value: value.into(),
        }
    }
}
