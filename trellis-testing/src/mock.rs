// Test doubles: fault loggers, call spies and a mock controller

use parking_lot::Mutex;
use std::sync::Arc;
use trellis_core::{
    ActionArgs, Controller, FaultRecord, LogError, Logger, Payload, Result, unknown_action,
};

/// A fault as captured by [`RecordingLogger`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggedFault {
    pub message: String,
    pub status: u16,
    pub kind: &'static str,
}

/// Logger that keeps every fault it receives. Clones share the record.
#[derive(Debug, Clone, Default)]
pub struct RecordingLogger {
    faults: Arc<Mutex<Vec<LoggedFault>>>,
}

impl RecordingLogger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn faults(&self) -> Vec<LoggedFault> {
        self.faults.lock().clone()
    }

    pub fn count(&self) -> usize {
        self.faults.lock().len()
    }

    pub fn last(&self) -> Option<LoggedFault> {
        self.faults.lock().last().cloned()
    }

    pub fn clear(&self) {
        self.faults.lock().clear();
    }
}

impl Logger for RecordingLogger {
    fn error(&self, message: &str, record: &FaultRecord<'_>) -> std::result::Result<(), LogError> {
        self.faults.lock().push(LoggedFault {
            message: message.to_string(),
            status: record.status.as_u16(),
            kind: record.kind(),
        });
        Ok(())
    }
}

/// Logger whose sink is always unavailable.
#[derive(Debug, Clone, Copy, Default)]
pub struct FailingLogger;

impl Logger for FailingLogger {
    fn error(&self, _: &str, _: &FaultRecord<'_>) -> std::result::Result<(), LogError> {
        Err(LogError::Unavailable("failing logger".to_string()))
    }
}

/// Records named calls with their arguments. Clones share the record.
#[derive(Debug, Clone, Default)]
pub struct Spy {
    calls: Arc<Mutex<Vec<(String, Vec<String>)>>>,
}

impl Spy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, name: &str, args: Vec<String>) {
        self.calls.lock().push((name.to_string(), args));
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    pub fn calls_to(&self, name: &str) -> usize {
        self.calls.lock().iter().filter(|(n, _)| n == name).count()
    }

    pub fn was_called(&self, name: &str) -> bool {
        self.calls_to(name) > 0
    }

    pub fn calls(&self) -> Vec<(String, Vec<String>)> {
        self.calls.lock().clone()
    }

    pub fn clear(&self) {
        self.calls.lock().clear();
    }
}

/// Controller answering a fixed set of actions with canned text and
/// recording each call with its path parameters.
#[derive(Debug, Clone)]
pub struct MockController {
    name: String,
    actions: Vec<(String, String)>,
    spy: Spy,
}

impl MockController {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            actions: Vec::new(),
            spy: Spy::new(),
        }
    }

    /// Answer `action` with `body`.
    pub fn with_action(mut self, action: &str, body: &str) -> Self {
        self.actions.push((action.to_string(), body.to_string()));
        self
    }

    pub fn spy(&self) -> &Spy {
        &self.spy
    }
}

impl Controller for MockController {
    fn call_action(&self, action: &str, args: ActionArgs) -> Result<Payload> {
        let params = args
            .params()
            .iter()
            .map(|(name, value)| format!("{name}={value}"))
            .collect();
        self.spy.record(action, params);

        self.actions
            .iter()
            .find(|(name, _)| name == action)
            .map(|(_, body)| Payload::from(body.clone()))
            .ok_or_else(|| unknown_action(&self.name, action))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trellis_core::{Error, HttpError, RouteParams, StatusCode};

    #[test]
    fn test_recording_logger_shares_record() {
        let logger = RecordingLogger::new();
        let clone = logger.clone();
        let fault: Error = HttpError::not_found().into();
        clone
            .error("Not Found", &FaultRecord::new(&fault, StatusCode::NOT_FOUND))
            .unwrap();

        assert_eq!(logger.count(), 1);
        let last = logger.last().unwrap();
        assert_eq!(last.status, 404);
        assert_eq!(last.kind, "http");
    }

    #[test]
    fn test_spy() {
        let spy = Spy::new();
        spy.record("show", vec!["id=1".into()]);
        spy.record("show", vec!["id=2".into()]);
        assert_eq!(spy.calls_to("show"), 2);
        assert!(!spy.was_called("index"));
        spy.clear();
        assert_eq!(spy.call_count(), 0);
    }

    #[test]
    fn test_mock_controller() {
        let controller = MockController::new("PostController").with_action("show", "post");
        let params: RouteParams = [("id", "3")].into_iter().collect();

        assert!(controller.call_action("show", ActionArgs::new(params)).is_ok());
        assert!(matches!(
            controller.call_action("edit", ActionArgs::default()),
            Err(Error::Invocation(_))
        ));
        assert_eq!(
            controller.spy().calls()[0],
            ("show".to_string(), vec!["id=3".to_string()])
        );
    }
}
