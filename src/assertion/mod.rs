pub mod expectation;
pub mod handler;
pub mod url;

pub use expectation::{Contains, CountEquals, Equals, Expectation, Failure, Matches};
pub use handler::{
    default_handler, set_default_handler, Asserter, ErrorHandler, FailureHandler, PanicHandler,
    Record, RecordingHandler,
};
pub use url::{UrlComponent, UrlEquals, DEFAULT_COMPONENTS};

use serde::Serialize;
use std::fmt;

/// A failed check: what went wrong plus the values that were compared.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssertionFailure {
    pub message: String,
    pub context: Vec<(String, String)>,
}

impl AssertionFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            context: Vec::new(),
        }
    }

    pub fn with_context(mut self, key: impl Into<String>, value: impl fmt::Display) -> Self {
        self.context.push((key.into(), value.to_string()));
        self
    }

    pub fn context(&self, key: &str) -> Option<&str> {
        self.context
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

impl fmt::Display for AssertionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Assertion failed: {}", self.message)?;
        for (key, value) in &self.context {
            write!(f, "\n  {}: {}", key, value)?;
        }
        Ok(())
    }
}

pub type Outcome = std::result::Result<(), AssertionFailure>;

pub fn pass() -> Outcome {
    Ok(())
}

pub fn fail(message: impl Into<String>) -> Outcome {
    Err(AssertionFailure::new(message))
}

/// A zero-argument check, built from values already read off the page.
pub trait Assertion {
    fn description(&self) -> String;

    fn evaluate(&self) -> Outcome;
}

/// An assertion that knows how to report its own negation passing.
pub trait Negatable: Assertion {
    fn negated_failure(&self) -> AssertionFailure;
}

/// Passes exactly when the wrapped assertion fails.
#[derive(Debug, Clone)]
pub struct Not<A>(pub A);

pub fn not<A: Negatable>(assertion: A) -> Not<A> {
    Not(assertion)
}

impl<A: Negatable> Assertion for Not<A> {
    fn description(&self) -> String {
        format!("not ({})", self.0.description())
    }

    fn evaluate(&self) -> Outcome {
        match self.0.evaluate() {
            Ok(()) => Err(self.0.negated_failure()),
            Err(_) => Ok(()),
        }
    }
}

impl<A: Assertion + ?Sized> Assertion for Box<A> {
    fn description(&self) -> String {
        (**self).description()
    }

    fn evaluate(&self) -> Outcome {
        (**self).evaluate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_primitives() {
        assert!(pass().is_ok());
        let failure = fail("nope").unwrap_err();
        assert_eq!(failure.message, "nope");
        assert_eq!(failure.to_string(), "Assertion failed: nope");
    }

    #[test]
    fn test_negation_uses_the_prepared_failure() {
        let holds = Contains::new("page", "hello world", "world");
        let negated = not(holds).evaluate().unwrap_err();
        assert!(negated.message.contains("not to contain"));

        assert!(not(Contains::new("page", "hello", "bye")).evaluate().is_ok());
    }

    #[test]
    fn test_failure_context_is_displayed() {
        let failure = AssertionFailure::new("mismatch")
            .with_context("expected", "a")
            .with_context("actual", 2);
        assert_eq!(failure.context("actual"), Some("2"));
        assert_eq!(failure.to_string(), "Assertion failed: mismatch\n  expected: a\n  actual: 2");
    }
}
