//! Module context error types.

use thiserror::Error;
use weave_types::{ErrorCode, WeaveError};

/// Errors raised while reading or mutating a module.
#[derive(Debug, Error)]
pub enum ModuleError {
    /// The module text is not a well-formed S-expression module.
    #[error("malformed module: {0}")]
    Malformed(String),

    /// A function symbol does not resolve to a function of the module.
    #[error("unknown function {0}")]
    UnknownFunction(String),

    #[error("adding global: {0}")]
    AddGlobal(String),

    #[error("adding local to {function}: {message}")]
    AddLocal { function: String, message: String },

    #[error("adding function: {0}")]
    AddFunction(String),

    #[error("adding type: {0}")]
    AddType(String),

    #[error("adding import: {0}")]
    AddImport(String),

    #[error("adding export: {0}")]
    AddExport(String),

    /// Advice code could not be applied to a join-point block.
    #[error("applying code to {function}: {message}")]
    Apply { function: String, message: String },
}

impl ModuleError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Malformed(_) => ErrorCode::MALFORMED_MODULE,
            Self::UnknownFunction(_) => ErrorCode::UNKNOWN_FUNCTION,
            Self::AddGlobal(_) => ErrorCode::ADD_GLOBAL_FAILED,
            Self::AddLocal { .. } => ErrorCode::ADD_LOCAL_FAILED,
            Self::AddFunction(_) => ErrorCode::ADD_FUNCTION_FAILED,
            Self::AddType(_) => ErrorCode::ADD_TYPE_FAILED,
            Self::AddImport(_) => ErrorCode::ADD_IMPORT_FAILED,
            Self::AddExport(_) => ErrorCode::ADD_EXPORT_FAILED,
            Self::Apply { .. } => ErrorCode::APPLY_FAILED,
        }
    }
}

impl From<ModuleError> for WeaveError {
    fn from(err: ModuleError) -> Self {
        let context = match &err {
            ModuleError::AddLocal { function, .. } | ModuleError::Apply { function, .. } => {
                Some(function.clone())
            }
            _ => None,
        };
        let converted = WeaveError::new(err.code(), err.to_string());
        match context {
            Some(function) => converted.within(function),
            None => converted,
        }
    }
}

/// Module result type alias.
pub type ModuleResult<T> = Result<T, ModuleError>;
