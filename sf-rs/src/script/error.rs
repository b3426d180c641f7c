//! Script error kinds and the engine's sticky error slot.
//!
//! The numeric order of [`ErrorKind`] and its texts are shown to end users by
//! host tooling, so neither may change.

use tracing::debug;

// ── ErrorKind ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, thiserror::Error)]
#[repr(u8)]
pub enum ErrorKind {
    #[default]
    #[error("Success")]
    Success = 0,
    #[error("String is too long")]
    StringTooLong,
    #[error("Unexpected end")]
    UnexpectedEnd,
    #[error("Unexpected character")]
    UnexpectedCharacter,
    #[error("Unexpected identifier")]
    UnexpectedIdentifier,
    #[error("A right parenthesis was expected at the end")]
    ExpectedRightParenthesis,
    #[error("A left parenthesis was expected at the end")]
    ExpectedLeftParenthesis,
    #[error("Expected delimiter ';'")]
    ExpectedDelimiter,
    #[error("Expected function")]
    ExpectedFunction,
    #[error("Expected identifier")]
    ExpectedIdentifier,
    #[error("Unknown function")]
    UnknownFunction,
    #[error("Unknown constant")]
    UnknownConstant,
    #[error("Unknown variable")]
    UnknownVariable,
    #[error("Unknown symbol")]
    UnknownSymbol,
    #[error("Unknown identifier")]
    UnknownIdentifier,
    #[error("Unknown object member")]
    UnknownObjectMember,
    #[error("Cannot assign a value to a constant")]
    AssignConstant,
    #[error("Identifier length exceeded")]
    MaxIdentifierLength,
    #[error("Too many parameters in function")]
    TooManyParameters,
    #[error("Too few parameters in function")]
    TooFewParameters,
    #[error("Multiple declaration")]
    MultipleDeclaration,
    #[error("Unexpected keyword")]
    UnexpectedKeyword,
    #[error("Division by zero")]
    DivisionByZero,
    #[error("Label not found")]
    LabelNotFound,
    #[error("IP stack error")]
    IpStack,
    #[error("Malformed additional statement")]
    ExternalKeyword,
    #[error("Script took to long to execute")]
    ScriptTimeout,
    #[error("Function error")]
    FunctionError,
    #[error("Not a left value")]
    NotLValue,
    #[error("Identifier references NOT an object")]
    NotObject,
    #[error("Compiler implementation fault")]
    CompilerImplementationError,
}

impl ErrorKind {
    pub const ALL: &'static [ErrorKind] = &[
        ErrorKind::Success,
        ErrorKind::StringTooLong,
        ErrorKind::UnexpectedEnd,
        ErrorKind::UnexpectedCharacter,
        ErrorKind::UnexpectedIdentifier,
        ErrorKind::ExpectedRightParenthesis,
        ErrorKind::ExpectedLeftParenthesis,
        ErrorKind::ExpectedDelimiter,
        ErrorKind::ExpectedFunction,
        ErrorKind::ExpectedIdentifier,
        ErrorKind::UnknownFunction,
        ErrorKind::UnknownConstant,
        ErrorKind::UnknownVariable,
        ErrorKind::UnknownSymbol,
        ErrorKind::UnknownIdentifier,
        ErrorKind::UnknownObjectMember,
        ErrorKind::AssignConstant,
        ErrorKind::MaxIdentifierLength,
        ErrorKind::TooManyParameters,
        ErrorKind::TooFewParameters,
        ErrorKind::MultipleDeclaration,
        ErrorKind::UnexpectedKeyword,
        ErrorKind::DivisionByZero,
        ErrorKind::LabelNotFound,
        ErrorKind::IpStack,
        ErrorKind::ExternalKeyword,
        ErrorKind::ScriptTimeout,
        ErrorKind::FunctionError,
        ErrorKind::NotLValue,
        ErrorKind::NotObject,
        ErrorKind::CompilerImplementationError,
    ];

    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn from_code(code: i64) -> Option<ErrorKind> {
        usize::try_from(code)
            .ok()
            .and_then(|i| ErrorKind::ALL.get(i))
            .copied()
    }

    /// User-facing text for any integer code.
    pub fn text_for(code: i64) -> String {
        match ErrorKind::from_code(code) {
            Some(kind) => kind.to_string(),
            None => "Unknown error".to_owned(),
        }
    }

    pub fn is_success(self) -> bool {
        self == ErrorKind::Success
    }
}

// ── ScriptError ───────────────────────────────────────────────────────────────

/// An error kind together with the reason text that triggered it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind} '{reason}'")]
pub struct ScriptError {
    pub kind: ErrorKind,
    pub reason: String,
}

impl ScriptError {
    pub fn new(kind: ErrorKind, reason: impl Into<String>) -> Self {
        ScriptError {
            kind,
            reason: reason.into(),
        }
    }
}

impl From<ErrorKind> for ScriptError {
    fn from(kind: ErrorKind) -> Self {
        ScriptError::new(kind, "")
    }
}

// ── ErrorState ────────────────────────────────────────────────────────────────

/// Current error kind plus the reason text that came with it.
#[derive(Debug, Clone, Default)]
pub struct ErrorState {
    kind: ErrorKind,
    reason: String,
}

impl ErrorState {
    /// Record an error.  Repeating the current kind keeps the first reason;
    /// a different kind replaces both.  Returns `true` only for `Success`.
    pub fn set(&mut self, kind: ErrorKind, reason: &str) -> bool {
        if self.kind != kind {
            self.kind = kind;
            self.reason = reason.to_owned();
            if !kind.is_success() {
                debug!(kind = ?kind, reason = %self.reason, "script error: {kind}");
            }
        }
        kind.is_success()
    }

    /// [`ErrorState::set`] from a propagated error.
    pub fn record(&mut self, err: &ScriptError) -> bool {
        self.set(err.kind, &err.reason)
    }

    pub fn to_error(&self) -> Option<ScriptError> {
        self.is_error()
            .then(|| ScriptError::new(self.kind, self.reason.clone()))
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }

    pub fn is_error(&self) -> bool {
        !self.kind.is_success()
    }

    pub fn clear(&mut self) {
        self.kind = ErrorKind::Success;
        self.reason.clear();
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_ordered() {
        for (i, kind) in ErrorKind::ALL.iter().enumerate() {
            assert_eq!(kind.code() as usize, i);
        }
        assert_eq!(ErrorKind::CompilerImplementationError.code(), 30);
    }

    #[test]
    fn texts() {
        assert_eq!(ErrorKind::Success.to_string(), "Success");
        assert_eq!(ErrorKind::ExpectedDelimiter.to_string(), "Expected delimiter ';'");
        assert_eq!(ErrorKind::text_for(22), "Division by zero");
        assert_eq!(ErrorKind::text_for(99), "Unknown error");
        assert_eq!(ErrorKind::text_for(-1), "Unknown error");
    }

    #[test]
    fn sticky_against_duplicates_only() {
        let mut st = ErrorState::default();
        assert!(!st.set(ErrorKind::UnknownSymbol, "a"));
        assert!(!st.set(ErrorKind::UnknownSymbol, "b"));
        assert_eq!(st.reason(), "a");
        st.set(ErrorKind::NotLValue, "c");
        assert_eq!(st.kind(), ErrorKind::NotLValue);
        assert_eq!(st.reason(), "c");
        assert!(st.set(ErrorKind::Success, ""));
        assert!(!st.is_error());
    }
}
