//! Named-stage progress events.
//!
//! Strictly observational: events are pushed to an optional observer and
//! have no feedback into pipeline control. Observer failures are ignored.

use crate::types::RiskTier;
use serde::Serialize;
use tokio::sync::mpsc;

/// One pipeline stage event.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "stage", rename_all = "snake_case")]
pub enum ProgressEvent {
    CacheCheck {
        file_id: String,
    },
    MetadataFetch {
        file_id: String,
    },
    AnalysisStart {
        file_id: String,
    },
    AnalysisComplete {
        file_id: String,
        risk: RiskTier,
    },
    BatchStart {
        batch_index: usize,
        size: usize,
    },
    FileComplete {
        file_id: String,
        from_cache: bool,
    },
    BatchComplete {
        batch_index: usize,
    },
    Error {
        file_id: String,
        message: String,
    },
}

/// Receives pipeline stage events.
pub trait ProgressObserver: Send + Sync {
    fn on_event(&self, event: ProgressEvent);
}

/// Forwards events into a tokio channel, dropping them when the receiver
/// lags or is gone.
pub struct ChannelObserver {
    sender: mpsc::Sender<ProgressEvent>,
}

impl ChannelObserver {
    pub fn new(sender: mpsc::Sender<ProgressEvent>) -> Self {
        Self { sender }
    }
}

impl ProgressObserver for ChannelObserver {
    fn on_event(&self, event: ProgressEvent) {
        let _ = self.sender.try_send(event);
    }
}

#[cfg(test)]
pub(crate) struct CollectingObserver {
    pub events: std::sync::Mutex<Vec<ProgressEvent>>,
}

#[cfg(test)]
impl CollectingObserver {
    pub fn new() -> Self {
        Self {
            events: std::sync::Mutex::new(Vec::new()),
        }
    }

    pub fn stages(&self) -> Vec<String> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .map(|e| {
                serde_json::to_value(e)
                    .ok()
                    .and_then(|v| v.get("stage").and_then(|s| s.as_str().map(String::from)))
                    .unwrap_or_default()
            })
            .collect()
    }
}

#[cfg(test)]
impl ProgressObserver for CollectingObserver {
    fn on_event(&self, event: ProgressEvent) {
        self.events.lock().unwrap().push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_events_serialize_with_stage_tag() {
        let event = ProgressEvent::BatchStart {
            batch_index: 0,
            size: 50,
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["stage"], "batch_start");
        assert_eq!(value["size"], 50);
    }

    #[tokio::test]
    async fn test_channel_observer_drops_when_full() {
        let (tx, mut rx) = mpsc::channel(1);
        let observer = ChannelObserver::new(tx);

        observer.on_event(ProgressEvent::CacheCheck {
            file_id: "f1".into(),
        });
        // Channel full: silently dropped, no panic, no block.
        observer.on_event(ProgressEvent::CacheCheck {
            file_id: "f2".into(),
        });

        let first = rx.recv().await.unwrap();
        assert!(matches!(first, ProgressEvent::CacheCheck { file_id } if file_id == "f1"));
    }
}
