//! Persisted form of kernel instances

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::address::Address;
use crate::checksum::Checksum;
use crate::error::{KernelError, Result};
use crate::instance::KernelInstance;

/// Snapshot of one deployed instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceRecord {
    /// Address the instance was deployed at
    pub address: Address,
    /// Position in the registry's deployment order
    pub sequence: u64,
    pub name: String,
    pub version: String,
    pub developer: Address,
    pub parent: Option<Address>,
    pub frozen: bool,
    /// Local bindings only
    pub bindings: BTreeMap<String, Address>,
    pub deployed_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frozen_at: Option<DateTime<Utc>>,
}

impl InstanceRecord {
    /// Build a fresh record for a newly deployed instance
    pub fn new(
        address: Address,
        sequence: u64,
        instance: &KernelInstance,
        parent: Option<Address>,
    ) -> Self {
        Self {
            address,
            sequence,
            name: instance.name().to_string(),
            version: instance.version().to_string(),
            developer: instance.developer(),
            parent,
            frozen: instance.is_frozen(),
            bindings: instance.bindings().clone(),
            deployed_at: Utc::now(),
            frozen_at: None,
        }
    }

    /// Copy of this record with one more binding
    pub fn with_binding(&self, contract_name: &str, implementation: Address) -> Self {
        let mut next = self.clone();
        next.bindings.insert(contract_name.to_string(), implementation);
        next
    }

    /// Copy of this record marked frozen now
    pub fn frozen_now(&self) -> Self {
        let mut next = self.clone();
        if !next.frozen {
            next.frozen = true;
            next.frozen_at = Some(Utc::now());
        }
        next
    }

    /// File name used for this record
    pub fn filename(&self) -> String {
        format!("{}.json", self.address.to_hex())
    }
}

/// A record together with the checksum of its JSON encoding
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordEnvelope {
    pub record: InstanceRecord,
    pub checksum: Checksum,
}

impl RecordEnvelope {
    pub fn seal(record: InstanceRecord) -> Result<Self> {
        let checksum = Checksum::from_json(&record)?;
        Ok(Self { record, checksum })
    }

    pub fn verify(&self) -> Result<bool> {
        self.checksum.verify_json(&self.record)
    }

    /// Unwrap the record, failing if the checksum does not match
    pub fn open(self) -> Result<InstanceRecord> {
        let actual = Checksum::from_json(&self.record)?;
        if actual != self.checksum {
            return Err(KernelError::ChecksumMismatch {
                expected: self.checksum.to_string(),
                actual: actual.to_string(),
            });
        }
        Ok(self.record)
    }
}
