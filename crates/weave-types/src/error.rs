use crate::Span;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Error category, determined by error code range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorCategory {
    Grammar,
    Reference,
    Module,
    Description,
    Io,
}

/// Numeric error code (E100–E599).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ErrorCode(pub u16);

impl ErrorCode {
    // ── Grammar errors (E100–E199) ──
    pub const UNEXPECTED_TOKEN: Self = Self(100);
    pub const UNEXPECTED_CHARACTER: Self = Self(101);
    pub const UNTERMINATED_LITERAL: Self = Self(102);
    pub const INVALID_REGEX: Self = Self(103);
    pub const INVALID_TEMPLATE: Self = Self(104);
    pub const INVALID_VARIABLE: Self = Self(105);
    pub const INVALID_TYPE: Self = Self(106);

    // ── Reference errors (E200–E299) ──
    pub const UNKNOWN_PARAMETER: Self = Self(200);
    pub const INDEX_OUT_OF_RANGE: Self = Self(201);
    pub const UNKNOWN_FUNCTION: Self = Self(202);
    pub const UNKNOWN_POINTCUT: Self = Self(203);
    pub const ARITY_MISMATCH: Self = Self(204);
    pub const TYPE_MISMATCH: Self = Self(205);
    pub const UNKNOWN_TEMPLATE: Self = Self(206);
    pub const UNKNOWN_LOCAL: Self = Self(207);

    // ── Module errors (E300–E399) ──
    pub const MALFORMED_MODULE: Self = Self(300);
    pub const ADD_GLOBAL_FAILED: Self = Self(301);
    pub const ADD_LOCAL_FAILED: Self = Self(302);
    pub const ADD_FUNCTION_FAILED: Self = Self(303);
    pub const ADD_TYPE_FAILED: Self = Self(304);
    pub const ADD_IMPORT_FAILED: Self = Self(305);
    pub const ADD_EXPORT_FAILED: Self = Self(306);
    pub const APPLY_FAILED: Self = Self(307);

    // ── Description errors (E400–E499) ──
    pub const INVALID_DESCRIPTION: Self = Self(400);
    pub const UNSUPPORTED_FORMAT: Self = Self(401);

    // ── I/O errors (E500–E599) ──
    pub const READ_FAILED: Self = Self(500);
    pub const WRITE_FAILED: Self = Self(501);
    pub const ENCODE_FAILED: Self = Self(502);

    /// Get the category for this error code.
    pub fn category(self) -> ErrorCategory {
        match self.0 {
            100..=199 => ErrorCategory::Grammar,
            200..=299 => ErrorCategory::Reference,
            300..=399 => ErrorCategory::Module,
            400..=499 => ErrorCategory::Description,
            _ => ErrorCategory::Io,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "E{}", self.0)
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Grammar => write!(f, "grammar"),
            Self::Reference => write!(f, "reference"),
            Self::Module => write!(f, "module"),
            Self::Description => write!(f, "description"),
            Self::Io => write!(f, "io"),
        }
    }
}

/// A structured weaver error.
///
/// Every failure that reaches the driver is one of these. The optional
/// `context` names the advice, function symbol or join-point involved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeaveError {
    /// Error code (e.g., E201).
    pub code: ErrorCode,
    /// Error category (derived from code).
    pub category: ErrorCategory,
    /// Human-readable error message.
    pub message: String,
    /// Location inside the offending pointcut, template or expression.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub span: Option<Span>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

impl WeaveError {
    /// Create a new error.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            category: code.category(),
            message: message.into(),
            span: None,
            context: None,
        }
    }

    /// Attach the source location.
    pub fn at(mut self, span: Span) -> Self {
        self.span = Some(span);
        self
    }

    /// Attach a context label. An existing label is kept as the inner part,
    /// so nested calls read outermost first.
    pub fn within(mut self, context: impl Into<String>) -> Self {
        let outer = context.into();
        self.context = Some(match self.context.take() {
            Some(inner) => format!("{outer} > {inner}"),
            None => outer,
        });
        self
    }
}

impl fmt::Display for WeaveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(context) = &self.context {
            write!(f, "{context}: ")?;
        }
        write!(f, "{} [{}] {}", self.code, self.category, self.message)?;
        if let Some(span) = &self.span {
            write!(f, " at {span}")?;
        }
        Ok(())
    }
}

impl std::error::Error for WeaveError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_category() {
        assert_eq!(
            ErrorCode::UNEXPECTED_TOKEN.category(),
            ErrorCategory::Grammar
        );
        assert_eq!(
            ErrorCode::INDEX_OUT_OF_RANGE.category(),
            ErrorCategory::Reference
        );
        assert_eq!(
            ErrorCode::ADD_GLOBAL_FAILED.category(),
            ErrorCategory::Module
        );
        assert_eq!(
            ErrorCode::INVALID_DESCRIPTION.category(),
            ErrorCategory::Description
        );
        assert_eq!(ErrorCode::WRITE_FAILED.category(), ErrorCategory::Io);
    }

    #[test]
    fn test_error_code_display() {
        assert_eq!(format!("{}", ErrorCode::INVALID_REGEX), "E103");
        assert_eq!(format!("{}", ErrorCode::UNKNOWN_POINTCUT), "E203");
    }

    #[test]
    fn test_error_display_with_context_and_span() {
        let err = WeaveError::new(ErrorCode::UNEXPECTED_TOKEN, "expected `=>`")
            .at(Span::new(1, 4, 1, 5))
            .within("pointcut of advice `count`");
        assert_eq!(
            err.to_string(),
            "pointcut of advice `count`: E100 [grammar] expected `=>` at 1:4"
        );
    }

    #[test]
    fn test_nested_context_reads_outermost_first() {
        let err = WeaveError::new(ErrorCode::UNKNOWN_LOCAL, "no local `q`")
            .within("function $main")
            .within("advice `trace`");
        assert_eq!(
            err.context.as_deref(),
            Some("advice `trace` > function $main")
        );
    }

    #[test]
    fn test_error_json_serialization() {
        let err = WeaveError::new(ErrorCode::TYPE_MISMATCH, "expected i32, found f64");
        let json = serde_json::to_string(&err).unwrap();
        assert!(json.contains("\"code\":205"));
        assert!(json.contains("\"category\":\"reference\""));
        assert!(!json.contains("\"span\""));

        let back: WeaveError = serde_json::from_str(&json).unwrap();
        assert_eq!(back, err);
    }
}
