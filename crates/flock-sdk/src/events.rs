use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};

pub type EventData = BTreeMap<String, Value>;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Initialized,
    InitializationFailed,
    OperationQueued,
    OperationReplayed,
    OperationDropped,
    CustomerIdentified,
    CampaignLoaded,
    CheckpointsLoaded,
    IdentifyFailed,
    PingFailed,
    BridgePresented,
    BridgeNavigated,
    BridgeDismissed,
    BridgeEvent,
    Diagnostic,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SessionEvent {
    pub kind: EventKind,
    pub timestamp: String,
    pub data: EventData,
}

impl SessionEvent {
    pub fn new(kind: EventKind) -> Self {
        Self {
            kind,
            timestamp: current_timestamp(),
            data: EventData::new(),
        }
    }

    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.data.insert(key.to_string(), value.into());
        self
    }

    pub fn str(&self, key: &str) -> Option<&str> {
        self.data.get(key).and_then(Value::as_str)
    }
}

pub trait EventEmitter: Send + Sync {
    fn emit(&self, event: SessionEvent);
}

#[derive(Default)]
pub struct NoopEventEmitter;

impl EventEmitter for NoopEventEmitter {
    fn emit(&self, _event: SessionEvent) {}
}

#[derive(Clone, Default)]
pub struct BufferedEventEmitter {
    inner: Arc<Mutex<Vec<SessionEvent>>>,
}

impl BufferedEventEmitter {
    pub fn snapshot(&self) -> Vec<SessionEvent> {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn kinds(&self) -> Vec<EventKind> {
        self.snapshot().into_iter().map(|event| event.kind).collect()
    }

    pub fn of_kind(&self, kind: EventKind) -> Vec<SessionEvent> {
        self.snapshot()
            .into_iter()
            .filter(|event| event.kind == kind)
            .collect()
    }
}

impl EventEmitter for BufferedEventEmitter {
    fn emit(&self, event: SessionEvent) {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }
}

fn current_timestamp() -> String {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    format!("{}.{:03}Z", now.as_secs(), now.subsec_millis())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffered_event_emitter_stores_emitted_events() {
        let emitter = BufferedEventEmitter::default();
        emitter.emit(SessionEvent::new(EventKind::Initialized).with("campaign_id", "camp-1"));
        emitter.emit(SessionEvent::new(EventKind::PingFailed));

        let events = emitter.snapshot();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].str("campaign_id"), Some("camp-1"));
        assert_eq!(
            emitter.kinds(),
            vec![EventKind::Initialized, EventKind::PingFailed]
        );
    }

    #[test]
    fn event_kind_serializes_snake_case() {
        let value = serde_json::to_value(EventKind::OperationQueued).expect("serialize");
        assert_eq!(value, Value::String("operation_queued".to_string()));
    }
}
