//! Error handling for the Sift engine core
//!
//! All fallible operations return [`EngineResult`]. Errors fall into three
//! families: condition trees that cannot be compiled, variables referenced
//! before any clause binds them, and failures raised by user thunks during
//! evaluation.

use sift_types::Variable;
use thiserror::Error;

/// Error type for engine operations
#[derive(Error, Debug)]
pub enum EngineError {
    /// A condition tree that cannot be compiled: a negation applied to a
    /// non-negatable construct, an empty or disjunctive NCC body, and
    /// similar structural problems. Reported before any network mutation.
    #[error("malformed condition: {message}")]
    MalformedCondition {
        /// What was wrong with the condition tree
        message: String,
    },

    /// A thunk references a variable no earlier clause in its conjunct
    /// binds. Raised at rule-add time when the thunk declares its
    /// variables, otherwise at evaluation time.
    #[error("unbound variable `{variable}` ({context})")]
    UnboundVariable {
        /// Name of the offending variable
        variable: String,
        /// Where the reference occurred
        context: String,
    },

    /// A user-supplied `Filter` or `Bind` thunk failed. The error escapes
    /// the mutation that triggered evaluation; the network keeps the
    /// portion of the mutation already applied.
    #[error("thunk failed: {message}")]
    Thunk {
        /// Failure reported by the thunk
        message: String,
    },
}

impl EngineError {
    /// Create a malformed-condition error
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedCondition { message: message.into() }
    }

    /// Create an unbound-variable error
    pub fn unbound(variable: &Variable, context: impl Into<String>) -> Self {
        Self::UnboundVariable { variable: variable.name().to_string(), context: context.into() }
    }

    /// Create a thunk-failure error
    pub fn thunk(message: impl Into<String>) -> Self {
        Self::Thunk { message: message.into() }
    }

    /// Get the error category for logging and metrics
    pub fn category(&self) -> &'static str {
        match self {
            Self::MalformedCondition { .. } => "malformed_condition",
            Self::UnboundVariable { .. } => "unbound_variable",
            Self::Thunk { .. } => "thunk",
        }
    }
}

impl From<anyhow::Error> for EngineError {
    fn from(err: anyhow::Error) -> Self {
        Self::Thunk { message: format!("{err:#}") }
    }
}

/// Result type alias for engine operations
pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn categories() {
        assert_eq!(EngineError::malformed("x").category(), "malformed_condition");
        assert_eq!(
            EngineError::unbound(&Variable::new("x"), "filter").category(),
            "unbound_variable"
        );
        assert_eq!(EngineError::thunk("boom").category(), "thunk");
    }

    #[test]
    fn anyhow_conversion() {
        let err: EngineError = anyhow::anyhow!("division by zero").into();
        assert!(matches!(err, EngineError::Thunk { .. }));
        assert!(err.to_string().contains("division by zero"));
    }
}
