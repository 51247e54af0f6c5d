use super::{fail, Assertion, AssertionFailure, Negatable, Outcome};
use regex::Regex;
use std::fmt::Debug;

/// A precomputed condition with both of its failure messages.
#[derive(Debug, Clone)]
pub struct Expectation {
    description: String,
    holds: bool,
    failure: AssertionFailure,
    negated: AssertionFailure,
}

impl Expectation {
    pub fn that(holds: bool, description: impl Into<String>) -> Self {
        let description = description.into();
        Self {
            failure: AssertionFailure::new(format!("expected {}", description)),
            negated: AssertionFailure::new(format!("expected not {}", description)),
            description,
            holds,
        }
    }

    pub fn on_failure(mut self, failure: AssertionFailure) -> Self {
        self.failure = failure;
        self
    }

    pub fn on_negated(mut self, failure: AssertionFailure) -> Self {
        self.negated = failure;
        self
    }
}

impl Assertion for Expectation {
    fn description(&self) -> String {
        self.description.clone()
    }

    fn evaluate(&self) -> Outcome {
        if self.holds {
            Ok(())
        } else {
            Err(self.failure.clone())
        }
    }
}

impl Negatable for Expectation {
    fn negated_failure(&self) -> AssertionFailure {
        self.negated.clone()
    }
}

/// `subject` names what was searched ("page", "element h1" ...).
#[derive(Debug, Clone)]
pub struct Contains {
    subject: String,
    haystack: String,
    needle: String,
}

impl Contains {
    pub fn new(subject: impl Into<String>, haystack: impl Into<String>, needle: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            haystack: haystack.into(),
            needle: needle.into(),
        }
    }

    fn excerpt(&self) -> String {
        const LIMIT: usize = 200;
        if self.haystack.chars().count() <= LIMIT {
            self.haystack.clone()
        } else {
            let head: String = self.haystack.chars().take(LIMIT).collect();
            format!("{}...", head)
        }
    }
}

impl Assertion for Contains {
    fn description(&self) -> String {
        format!("{} contains \"{}\"", self.subject, self.needle)
    }

    fn evaluate(&self) -> Outcome {
        if self.haystack.contains(&self.needle) {
            return Ok(());
        }
        Err(
            AssertionFailure::new(format!("expected {} to contain \"{}\"", self.subject, self.needle))
                .with_context("actual", self.excerpt()),
        )
    }
}

impl Negatable for Contains {
    fn negated_failure(&self) -> AssertionFailure {
        AssertionFailure::new(format!("expected {} not to contain \"{}\"", self.subject, self.needle))
            .with_context("actual", self.excerpt())
    }
}

#[derive(Debug, Clone)]
pub struct Equals<T> {
    subject: String,
    actual: T,
    expected: T,
}

impl<T: PartialEq + Debug> Equals<T> {
    pub fn new(subject: impl Into<String>, actual: T, expected: T) -> Self {
        Self {
            subject: subject.into(),
            actual,
            expected,
        }
    }
}

impl<T: PartialEq + Debug> Assertion for Equals<T> {
    fn description(&self) -> String {
        format!("{} equals {:?}", self.subject, self.expected)
    }

    fn evaluate(&self) -> Outcome {
        if self.actual == self.expected {
            return Ok(());
        }
        Err(AssertionFailure::new(format!("{} does not match", self.subject))
            .with_context("expected", format!("{:?}", self.expected))
            .with_context("actual", format!("{:?}", self.actual)))
    }
}

impl<T: PartialEq + Debug> Negatable for Equals<T> {
    fn negated_failure(&self) -> AssertionFailure {
        AssertionFailure::new(format!(
            "expected {} to differ from {:?}",
            self.subject, self.expected
        ))
    }
}

#[derive(Debug, Clone)]
pub struct CountEquals {
    selector: String,
    actual: usize,
    expected: usize,
}

impl CountEquals {
    pub fn new(selector: impl Into<String>, actual: usize, expected: usize) -> Self {
        Self {
            selector: selector.into(),
            actual,
            expected,
        }
    }
}

impl Assertion for CountEquals {
    fn description(&self) -> String {
        format!("{} element(s) match \"{}\"", self.expected, self.selector)
    }

    fn evaluate(&self) -> Outcome {
        if self.actual == self.expected {
            return Ok(());
        }
        Err(AssertionFailure::new(format!(
            "expected {} element(s) matching \"{}\", found {}",
            self.expected, self.selector, self.actual
        )))
    }
}

impl Negatable for CountEquals {
    fn negated_failure(&self) -> AssertionFailure {
        AssertionFailure::new(format!(
            "expected anything but {} element(s) matching \"{}\"",
            self.expected, self.selector
        ))
    }
}

#[derive(Debug, Clone)]
pub struct Matches {
    subject: String,
    haystack: String,
    pattern: Regex,
}

impl Matches {
    pub fn new(subject: impl Into<String>, haystack: impl Into<String>, pattern: Regex) -> Self {
        Self {
            subject: subject.into(),
            haystack: haystack.into(),
            pattern,
        }
    }
}

impl Assertion for Matches {
    fn description(&self) -> String {
        format!("{} matches /{}/", self.subject, self.pattern)
    }

    fn evaluate(&self) -> Outcome {
        if self.pattern.is_match(&self.haystack) {
            return Ok(());
        }
        Err(AssertionFailure::new(format!(
            "expected {} to match /{}/",
            self.subject, self.pattern
        )))
    }
}

impl Negatable for Matches {
    fn negated_failure(&self) -> AssertionFailure {
        AssertionFailure::new(format!(
            "expected {} not to match /{}/",
            self.subject, self.pattern
        ))
    }
}

/// Fails unconditionally, for checks whose subject could not be found.
#[derive(Debug, Clone)]
pub struct Failure {
    message: String,
}

impl Failure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl Assertion for Failure {
    fn description(&self) -> String {
        self.message.clone()
    }

    fn evaluate(&self) -> Outcome {
        fail(self.message.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assertion::not;

    #[test]
    fn test_equals_reports_both_sides() {
        let failure = Equals::new("field 'email'", "a@b", "c@d").evaluate().unwrap_err();
        assert_eq!(failure.context("expected"), Some("\"c@d\""));
        assert_eq!(failure.context("actual"), Some("\"a@b\""));
        assert!(Equals::new("status", 200, 200).evaluate().is_ok());
    }

    #[test]
    fn test_failure_always_fails() {
        let failure = Failure::new("field 'q' not found").evaluate().unwrap_err();
        assert_eq!(failure.message, "field 'q' not found");
    }

    #[test]
    fn test_count_and_negation() {
        assert!(CountEquals::new("li", 3, 3).evaluate().is_ok());
        assert!(CountEquals::new("li", 2, 3).evaluate().is_err());
        assert!(not(CountEquals::new("li", 2, 3)).evaluate().is_ok());
    }

    #[test]
    fn test_regex_matches() {
        let pattern = Regex::new(r"Order #\d+").unwrap();
        assert!(Matches::new("page", "Your Order #42 shipped", pattern.clone()).evaluate().is_ok());
        assert!(not(Matches::new("page", "nothing", pattern)).evaluate().is_ok());
    }

    #[test]
    fn test_expectation_messages() {
        let failure = Expectation::that(false, "checkbox 'terms' to be checked")
            .evaluate()
            .unwrap_err();
        assert_eq!(failure.message, "expected checkbox 'terms' to be checked");

        let negated = not(Expectation::that(true, "a visible banner")).evaluate().unwrap_err();
        assert_eq!(negated.message, "expected not a visible banner");
    }

    #[test]
    fn test_long_pages_are_truncated_in_failures() {
        let page = "x".repeat(500);
        let failure = Contains::new("page", page, "y").evaluate().unwrap_err();
        assert!(failure.context("actual").unwrap().ends_with("..."));
    }
}
