//! Notifications emitted by kernel instances

use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

use crate::address::Address;

/// Event emitted on a successful state change
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "PascalCase")]
pub enum KernelEvent {
    /// A contract name was bound to an implementation
    ImplementationAdded {
        contract_name: String,
        implementation: Address,
    },
}

/// Logs produced by a single mutating call
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    pub logs: Vec<KernelEvent>,
}

impl Receipt {
    pub fn with_event(event: KernelEvent) -> Self {
        Self { logs: vec![event] }
    }

    /// Find the first log of the `ImplementationAdded` kind
    pub fn implementation_added(&self) -> Option<(&str, Address)> {
        self.logs.iter().find_map(|log| match log {
            KernelEvent::ImplementationAdded {
                contract_name,
                implementation,
            } => Some((contract_name.as_str(), *implementation)),
        })
    }
}

/// Subscriber for events dispatched by a [`crate::KernelRegistry`]
pub trait EventSink: Send + Sync {
    fn on_event(&self, source: Address, event: &KernelEvent);
}

/// Sink that keeps every event it receives. Clones share the same log.
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    entries: Arc<Mutex<Vec<(Address, KernelEvent)>>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the recorded events, oldest first
    pub fn entries(&self) -> Vec<(Address, KernelEvent)> {
        match self.entries.lock() {
            Ok(entries) => entries.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl EventSink for EventLog {
    fn on_event(&self, source: Address, event: &KernelEvent) {
        let mut entries = match self.entries.lock() {
            Ok(entries) => entries,
            Err(poisoned) => poisoned.into_inner(),
        };
        entries.push((source, event.clone()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_receipt_lookup() {
        let implementation = Address::from_bytes([1; 20]);
        let receipt = Receipt::with_event(KernelEvent::ImplementationAdded {
            contract_name: "TestContract".to_string(),
            implementation,
        });
        assert_eq!(receipt.logs.len(), 1);
        assert_eq!(
            receipt.implementation_added(),
            Some(("TestContract", implementation))
        );
        assert_eq!(Receipt::default().implementation_added(), None);
    }

    #[test]
    fn test_event_log_shares_entries() {
        let log = EventLog::new();
        let clone = log.clone();
        clone.on_event(
            Address::ZERO,
            &KernelEvent::ImplementationAdded {
                contract_name: "A".to_string(),
                implementation: Address::from_bytes([2; 20]),
            },
        );
        assert_eq!(log.len(), 1);
        assert!(!log.is_empty());
    }

    #[test]
    fn test_event_serialization() {
        let event = KernelEvent::ImplementationAdded {
            contract_name: "TestContract".to_string(),
            implementation: Address::ZERO,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "ImplementationAdded");
        assert_eq!(json["contract_name"], "TestContract");
    }
}
