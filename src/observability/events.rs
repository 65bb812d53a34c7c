/// Structured run lifecycle events
///
/// Each event is rendered as one JSON line and routed through the `log`
/// facade at a level derived from the event type. Events of one run share a
/// uuid run id.
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::time::SystemTime;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunEventType {
    RunStart,
    InputDelivered,
    Quiescent,
    InputExhausted,
    ForcedKill,
    RunEnd,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventLevel {
    Debug,
    Info,
    Warn,
}

impl RunEventType {
    pub fn default_level(&self) -> EventLevel {
        match self {
            RunEventType::InputDelivered | RunEventType::Quiescent => EventLevel::Debug,
            RunEventType::RunStart | RunEventType::RunEnd => EventLevel::Info,
            RunEventType::InputExhausted | RunEventType::ForcedKill => EventLevel::Warn,
        }
    }
}

/// Correlation id for one run
pub fn new_run_id() -> String {
    Uuid::new_v4().to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunEvent {
    pub event_type: RunEventType,
    pub run_id: String,
    pub timestamp: SystemTime,
    pub details: String,
    pub pid: Option<u32>,
    pub elapsed_ms: Option<u64>,
}

impl RunEvent {
    pub fn new(event_type: RunEventType, run_id: &str, details: String) -> Self {
        Self {
            event_type,
            run_id: run_id.to_string(),
            timestamp: SystemTime::now(),
            details,
            pid: None,
            elapsed_ms: None,
        }
    }

    pub fn with_pid(mut self, pid: u32) -> Self {
        self.pid = Some(pid);
        self
    }

    pub fn with_elapsed_ms(mut self, elapsed_ms: u64) -> Self {
        self.elapsed_ms = Some(elapsed_ms);
        self
    }

    /// JSON line for this event
    pub fn to_json(&self) -> serde_json::Value {
        let mut entry = serde_json::json!({
            "timestamp": self.timestamp
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap_or_default()
                .as_millis() as u64,
            "event_type": self.event_type,
            "run_id": self.run_id,
            "details": self.details,
        });
        if let Some(pid) = self.pid {
            entry["pid"] = serde_json::json!(pid);
        }
        if let Some(elapsed_ms) = self.elapsed_ms {
            entry["elapsed_ms"] = serde_json::json!(elapsed_ms);
        }
        entry
    }
}

pub fn log_run_event(event: &RunEvent) {
    let entry = event.to_json();
    match event.event_type.default_level() {
        EventLevel::Debug => debug!("{}", entry),
        EventLevel::Info => info!("{}", entry),
        EventLevel::Warn => warn!("{}", entry),
    }
}

/// Convenience emitters used by the runners
pub mod events {
    use super::*;

    pub fn run_start(run_id: &str, program: &str, pid: Option<u32>) {
        let mut event = RunEvent::new(
            RunEventType::RunStart,
            run_id,
            format!("started {}", program),
        );
        if let Some(pid) = pid {
            event = event.with_pid(pid);
        }
        log_run_event(&event);
    }

    pub fn input_delivered(run_id: &str, index: usize, elapsed_ms: u64) {
        log_run_event(
            &RunEvent::new(
                RunEventType::InputDelivered,
                run_id,
                format!("delivered scripted input #{}", index),
            )
            .with_elapsed_ms(elapsed_ms),
        );
    }

    pub fn quiescent(run_id: &str, pending_inputs: usize, elapsed_ms: u64) {
        log_run_event(
            &RunEvent::new(
                RunEventType::Quiescent,
                run_id,
                format!("no output within read timeout, {} inputs pending", pending_inputs),
            )
            .with_elapsed_ms(elapsed_ms),
        );
    }

    pub fn input_exhausted(run_id: &str, consumed: usize) {
        log_run_event(&RunEvent::new(
            RunEventType::InputExhausted,
            run_id,
            format!("program requested input after {} scripted inputs", consumed),
        ));
    }

    pub fn forced_kill(run_id: &str, pid: u32, reason: &str) {
        log_run_event(
            &RunEvent::new(RunEventType::ForcedKill, run_id, reason.to_string()).with_pid(pid),
        );
    }

    pub fn run_end(run_id: &str, outcome: &str, elapsed_ms: u64) {
        log_run_event(
            &RunEvent::new(RunEventType::RunEnd, run_id, format!("outcome {}", outcome))
                .with_elapsed_ms(elapsed_ms),
        );
    }
}
