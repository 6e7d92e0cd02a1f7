//! Integration tests for Engine logging system
//!
//! Verifies the logger host and the messages subsystems emit.
//! No GPU required.
//!
//! Run with: cargo test --test logging_integration_tests

use nebula_engine::nebula::Engine;
use nebula_engine::nebula::device::{QueueKind, SimulatedDevice};
use nebula_engine::nebula::log::{Logger, LogEntry, LogSeverity};
use nebula_engine::nebula::submission::{SubmissionConfig, SubmissionQueue};
use std::sync::{Arc, Mutex};
use serial_test::serial;

// ============================================================================
// TEST LOGGER IMPLEMENTATION
// ============================================================================

/// Test logger that captures log entries for verification
struct TestLogger {
    entries: Arc<Mutex<Vec<LogEntry>>>,
}

impl TestLogger {
    fn new() -> (Self, Arc<Mutex<Vec<LogEntry>>>) {
        let entries = Arc::new(Mutex::new(Vec::new()));
        (Self { entries: entries.clone() }, entries)
    }
}

impl Logger for TestLogger {
    fn log(&self, entry: &LogEntry) {
        self.entries.lock().unwrap().push(entry.clone());
    }
}

// ============================================================================
// LOGGER HOST
// ============================================================================

#[test]
#[serial]
fn test_integration_custom_logger() {
    let (test_logger, entries) = TestLogger::new();
    Engine::set_logger(test_logger);

    Engine::log(LogSeverity::Info, "test::module", "Test info message".to_string());
    Engine::log(LogSeverity::Warn, "test::module", "Test warning message".to_string());

    {
        let captured = entries.lock().unwrap();
        assert_eq!(captured.len(), 2);
        assert_eq!(captured[0].severity, LogSeverity::Info);
        assert_eq!(captured[0].source, "test::module");
        assert_eq!(captured[0].message, "Test info message");
        assert_eq!(captured[1].severity, LogSeverity::Warn);
        assert!(captured[1].file.is_none());
    }

    Engine::reset_logger();
}

#[test]
#[serial]
fn test_integration_logger_reset() {
    let (test_logger, entries) = TestLogger::new();
    Engine::set_logger(test_logger);

    Engine::log(LogSeverity::Info, "test", "Message 1".to_string());
    Engine::reset_logger();
    Engine::log(LogSeverity::Info, "test", "Message 2".to_string());

    // Still only one message
    assert_eq!(entries.lock().unwrap().len(), 1);
}

// ============================================================================
// SUBSYSTEM MESSAGES
// ============================================================================

#[test]
#[serial]
fn test_integration_queue_creation_is_logged() {
    let (test_logger, entries) = TestLogger::new();
    Engine::set_logger(test_logger);

    let device = Arc::new(SimulatedDevice::new());
    let config = SubmissionConfig { label: "frame".to_string(), ..Default::default() };
    let _queue = SubmissionQueue::new(device, QueueKind::Compute, config).unwrap();

    {
        let captured = entries.lock().unwrap();
        let created = captured
            .iter()
            .find(|e| e.source == "nebula::SubmissionQueue" && e.severity == LogSeverity::Info)
            .expect("queue creation message");
        assert!(created.message.contains("[frame]"));
        assert!(created.message.contains("compute"));
    }

    Engine::reset_logger();
}

#[test]
#[serial]
fn test_integration_device_failure_logged_with_location() {
    let (test_logger, entries) = TestLogger::new();
    Engine::set_logger(test_logger);

    let device = Arc::new(SimulatedDevice::new());
    let queue = SubmissionQueue::new(device.clone(), QueueKind::Graphics, SubmissionConfig::default()).unwrap();
    device.fail_next_submit();
    assert!(queue.submit(queue.acquire_buffer().unwrap()).is_err());

    {
        let captured = entries.lock().unwrap();
        let errors: Vec<_> = captured.iter().filter(|e| e.severity == LogSeverity::Error).collect();
        assert!(!errors.is_empty());
        assert!(errors.iter().all(|e| e.file.is_some() && e.line.is_some()));
        assert!(errors.iter().any(|e| e.source == "nebula::SubmissionQueue" && e.message.contains("Submit failed")));
    }

    Engine::reset_logger();
}

#[test]
#[serial]
fn test_integration_trace_messages_reach_custom_logger() {
    let (test_logger, entries) = TestLogger::new();
    Engine::set_logger(test_logger);

    let device = Arc::new(SimulatedDevice::new());
    let queue = SubmissionQueue::new(device, QueueKind::Copy, SubmissionConfig::default()).unwrap();
    queue.submit(queue.acquire_buffer().unwrap()).unwrap();
    queue.submit(queue.acquire_buffer().unwrap()).unwrap();

    {
        let captured = entries.lock().unwrap();
        assert!(captured.iter().any(|e| e.severity == LogSeverity::Debug && e.message.contains("Created command allocator")));
        assert!(captured.iter().any(|e| e.severity == LogSeverity::Trace && e.message.contains("Recycled command allocator")));
    }

    Engine::reset_logger();
}
