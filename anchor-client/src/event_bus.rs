//! Event bus for the orchestrator's status stream.
//!
//! The orchestrator publishes every state change, broadcast and outcome;
//! the presentation layer (and tests) subscribe.
//!
//! Uses tokio broadcast channels for fan-out to multiple receivers.

use alloy_primitives::B256;
use anchor_domain::{OperationId, OperationKind, OperationState};
use anchor_exec::Receipt;
use chrono::{DateTime, Utc};
use tokio::sync::broadcast;

// =============================================================================
// Event Types
// =============================================================================

/// Why a transaction was broadcast.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxPurpose {
    /// Token approval preceding the operation
    Approval,
    /// The operation itself
    Execution,
}

/// Events that flow through the client event bus.
#[derive(Debug, Clone)]
pub enum ClientEvent {
    /// Orchestrator state changed
    StateChanged {
        operation_id: Option<OperationId>,
        kind: Option<OperationKind>,
        from: OperationState,
        to: OperationState,
        timestamp: DateTime<Utc>,
    },

    /// A signed transaction was broadcast
    TransactionSubmitted {
        operation_id: OperationId,
        purpose: TxPurpose,
        tx_hash: B256,
        timestamp: DateTime<Utc>,
    },

    /// The operation's transaction confirmed
    OperationConfirmed {
        operation_id: OperationId,
        receipt: Receipt,
    },

    /// The operation failed
    OperationFailed {
        operation_id: OperationId,
        reason: String,
    },
}

// =============================================================================
// Event Bus
// =============================================================================

/// Event bus for client-wide communication.
///
/// Multiple producers can send events, and multiple consumers can receive.
/// Uses broadcast channels for fan-out pattern.
pub struct EventBus {
    sender: broadcast::Sender<ClientEvent>,
}

impl EventBus {
    /// Create a new event bus with specified capacity.
    ///
    /// Capacity determines how many events can be buffered before
    /// slow receivers start missing events (lagging).
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Send an event to all subscribers.
    ///
    /// Returns the number of receivers that received the event.
    /// Returns 0 if there are no active receivers.
    pub fn send(&self, event: ClientEvent) -> usize {
        self.sender.send(event).unwrap_or(0)
    }

    /// Subscribe to events sent after this call.
    pub fn subscribe(&self) -> EventReceiver {
        EventReceiver { receiver: self.sender.subscribe() }
    }

    /// Get the number of active receivers.
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

/// Receiver for client events.
pub struct EventReceiver {
    receiver: broadcast::Receiver<ClientEvent>,
}

impl EventReceiver {
    /// Receive the next event.
    ///
    /// Returns `None` if the sender has been dropped.
    /// Returns error description if the receiver lagged (missed events).
    pub async fn recv(&mut self) -> Option<Result<ClientEvent, String>> {
        match self.receiver.recv().await {
            Ok(event) => Some(Ok(event)),
            Err(broadcast::error::RecvError::Closed) => None,
            Err(broadcast::error::RecvError::Lagged(count)) => {
                Some(Err(format!("Receiver lagged, missed {} events", count)))
            }
        }
    }

    /// Try to receive an event without blocking.
    ///
    /// Returns `None` if no event is immediately available.
    pub fn try_recv(&mut self) -> Option<Result<ClientEvent, String>> {
        match self.receiver.try_recv() {
            Ok(event) => Some(Ok(event)),
            Err(broadcast::error::TryRecvError::Empty) => None,
            Err(broadcast::error::TryRecvError::Closed) => None,
            Err(broadcast::error::TryRecvError::Lagged(count)) => {
                Some(Err(format!("Receiver lagged, missed {} events", count)))
            }
        }
    }

    /// Drain every event currently buffered.
    pub fn drain(&mut self) -> Vec<ClientEvent> {
        let mut events = Vec::new();
        while let Some(next) = self.try_recv() {
            if let Ok(event) = next {
                events.push(event);
            }
        }
        events
    }
}

// =============================================================================
// Tests
// =============================================================================
