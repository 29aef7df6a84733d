use thiserror::Error;

use crate::config::ConfigError;

/// Registration-time validation failures. Any of these must abort startup.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistrationError {
    #[error("operation {operation} is not a struct")]
    NotAStruct { operation: String },
    #[error("duplicate operation: {operation}")]
    DuplicateOperation { operation: String },
    #[error("operation {operation} is missing its In structure")]
    MissingInput { operation: String },
    #[error("operation {operation} is missing its Out structure")]
    MissingOutput { operation: String },
    #[error("{part} of operation {operation} is not a struct")]
    MessageNotAStruct {
        operation: String,
        part: &'static str,
    },
    #[error("{part} of operation {operation} declares field {field} twice")]
    DuplicateField {
        operation: String,
        part: &'static str,
        field: String,
    },
    #[error("invalid operation name: {operation:?}")]
    InvalidOperationName { operation: String },
}

impl RegistrationError {
    pub fn operation(&self) -> &str {
        match self {
            Self::NotAStruct { operation }
            | Self::DuplicateOperation { operation }
            | Self::MissingInput { operation }
            | Self::MissingOutput { operation }
            | Self::MessageNotAStruct { operation, .. }
            | Self::DuplicateField { operation, .. }
            | Self::InvalidOperationName { operation } => operation,
        }
    }
}

#[derive(Debug, Error)]
pub enum ServerError {
    #[error(transparent)]
    Registration(#[from] RegistrationError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("failed to serialize protocol document: {0}")]
    Document(String),
    #[error("server i/o failure: {0}")]
    Io(#[from] std::io::Error),
}
