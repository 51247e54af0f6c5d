use super::{Assertion, AssertionFailure};
use crate::errors::{BrowserError, Result};
use std::cell::RefCell;
use std::rc::Rc;
use tracing::debug;

/// Decides what a failed check does: panic, return an error, or just
/// record it for a host framework.
pub trait FailureHandler {
    fn on_pass(&self, _description: &str) {}

    fn on_failure(&self, failure: &AssertionFailure) -> Result<()>;
}

/// Fails the running test.
#[derive(Debug, Clone, Copy, Default)]
pub struct PanicHandler;

impl FailureHandler for PanicHandler {
    fn on_failure(&self, failure: &AssertionFailure) -> Result<()> {
        panic!("{}", failure);
    }
}

/// Returns `BrowserError::AssertionFailed` to the caller.
#[derive(Debug, Clone, Copy, Default)]
pub struct ErrorHandler;

impl FailureHandler for ErrorHandler {
    fn on_failure(&self, failure: &AssertionFailure) -> Result<()> {
        Err(BrowserError::AssertionFailed(failure.clone()))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Record {
    Passed(String),
    Failed(AssertionFailure),
}

/// Keeps every outcome; clones share the same log.
#[derive(Debug, Clone, Default)]
pub struct RecordingHandler {
    records: Rc<RefCell<Vec<Record>>>,
}

impl RecordingHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<Record> {
        self.records.borrow().clone()
    }

    pub fn passes(&self) -> usize {
        self.records
            .borrow()
            .iter()
            .filter(|r| matches!(r, Record::Passed(_)))
            .count()
    }

    pub fn failures(&self) -> Vec<AssertionFailure> {
        self.records
            .borrow()
            .iter()
            .filter_map(|r| match r {
                Record::Failed(failure) => Some(failure.clone()),
                Record::Passed(_) => None,
            })
            .collect()
    }

    pub fn clear(&self) {
        self.records.borrow_mut().clear();
    }
}

impl FailureHandler for RecordingHandler {
    fn on_pass(&self, description: &str) {
        self.records.borrow_mut().push(Record::Passed(description.to_string()));
    }

    fn on_failure(&self, failure: &AssertionFailure) -> Result<()> {
        self.records.borrow_mut().push(Record::Failed(failure.clone()));
        Ok(())
    }
}

thread_local! {
    static DEFAULT_HANDLER: RefCell<Rc<dyn FailureHandler>> = RefCell::new(Rc::new(PanicHandler));
}

/// Handler given to browsers created on this thread from now on.
pub fn set_default_handler(handler: Rc<dyn FailureHandler>) {
    DEFAULT_HANDLER.with(|slot| *slot.borrow_mut() = handler);
}

pub fn default_handler() -> Rc<dyn FailureHandler> {
    DEFAULT_HANDLER.with(|slot| slot.borrow().clone())
}

/// Runs assertions and routes their outcome to a handler.
#[derive(Clone)]
pub struct Asserter {
    handler: Rc<dyn FailureHandler>,
}

impl Asserter {
    pub fn new(handler: Rc<dyn FailureHandler>) -> Self {
        Self { handler }
    }

    pub fn handler(&self) -> &Rc<dyn FailureHandler> {
        &self.handler
    }

    pub fn set_handler(&mut self, handler: Rc<dyn FailureHandler>) {
        self.handler = handler;
    }

    pub fn check(&self, assertion: &dyn Assertion) -> Result<()> {
        match assertion.evaluate() {
            Ok(()) => {
                let description = assertion.description();
                debug!(assertion = %description, "passed");
                self.handler.on_pass(&description);
                Ok(())
            }
            Err(failure) => {
                debug!(failure = %failure.message, "failed");
                self.handler.on_failure(&failure)
            }
        }
    }
}

impl Default for Asserter {
    fn default() -> Self {
        Self::new(default_handler())
    }
}

impl std::fmt::Debug for Asserter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Asserter").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assertion::{not, Contains, Equals};

    #[test]
    fn test_error_handler_returns_failure() {
        let asserter = Asserter::new(Rc::new(ErrorHandler));
        assert!(asserter.check(&Equals::new("status", 200, 200)).is_ok());
        match asserter.check(&Equals::new("status", 404, 200)) {
            Err(BrowserError::AssertionFailed(failure)) => {
                assert_eq!(failure.message, "status does not match")
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    #[should_panic(expected = "expected page to contain \"missing\"")]
    fn test_panic_handler_fails_the_test() {
        let asserter = Asserter::new(Rc::new(PanicHandler));
        let _ = asserter.check(&Contains::new("page", "hello", "missing"));
    }

    #[test]
    fn test_recording_handler_sees_passes_and_failures() {
        let recorder = RecordingHandler::new();
        let asserter = Asserter::new(Rc::new(recorder.clone()));

        asserter.check(&Contains::new("page", "hello", "ell")).unwrap();
        asserter.check(&not(Contains::new("page", "hello", "ell"))).unwrap();

        assert_eq!(recorder.passes(), 1);
        assert_eq!(recorder.failures().len(), 1);
        assert!(recorder.failures()[0].message.contains("not to contain"));
    }

    #[test]
    fn test_default_handler_is_thread_local() {
        let recorder = RecordingHandler::new();
        set_default_handler(Rc::new(recorder.clone()));
        Asserter::default()
            .check(&Equals::new("x", 1, 2))
            .unwrap();
        assert_eq!(recorder.failures().len(), 1);
        set_default_handler(Rc::new(PanicHandler));
    }
}
