//! Progress events
//!
//! Broadcast to whoever drives the UI (celebrations, toasts, sidebar
//! refresh). Emitting never fails an operation.

use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, trace};

use crate::model::RewardSource;

#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    ModuleStarted {
        user_id: String,
        training_id: String,
        module_id: String,
    },
    ModuleCompleted {
        user_id: String,
        training_id: String,
        module_id: String,
        score: Option<u8>,
        percentage: u8,
    },
    CompletionRejected {
        user_id: String,
        module_id: String,
        min_score: u8,
        score: Option<u8>,
    },
    RewardGranted {
        user_id: String,
        source: RewardSource,
        source_id: String,
        xp: u32,
        coins: u32,
    },
    TrainingCompleted {
        user_id: String,
        training_id: String,
    },
    CertificateIssued {
        user_id: String,
        training_id: String,
        certificate_number: String,
    },
}

/// Event bus for progress events
pub struct EventBus {
    sender: broadcast::Sender<ProgressEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(256)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn emit(&self, event: ProgressEvent) {
        trace!(event = ?event, "Emitting progress event");
        // No subscribers is fine
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ProgressEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

fn log_event(event: &ProgressEvent) {
    match event {
        ProgressEvent::TrainingCompleted { user_id, training_id } => {
            info!(user_id = %user_id, training_id = %training_id, "Training completed");
        }
        ProgressEvent::CertificateIssued {
            user_id,
            certificate_number,
            ..
        } => {
            info!(user_id = %user_id, certificate = %certificate_number, "Certificate issued");
        }
        ProgressEvent::CompletionRejected {
            user_id,
            module_id,
            min_score,
            score,
        } => {
            debug!(
                user_id = %user_id,
                module_id = %module_id,
                min_score = min_score,
                score = ?score,
                "Checkpoint not passed"
            );
        }
        _ => {
            trace!(event = ?event, "Progress event");
        }
    }
}

/// Spawn a background task that logs every event
pub fn spawn_logging_listener(event_bus: Arc<EventBus>) -> tokio::task::JoinHandle<()> {
    let mut receiver = event_bus.subscribe();

    tokio::spawn(async move {
        loop {
            match receiver.recv().await {
                Ok(event) => log_event(&event),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    debug!(skipped = n, "Event listener lagged, skipped events");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!("Event bus closed, stopping listener");
                    break;
                }
            }
        }
    })
}
