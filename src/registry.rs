//! Kernel Registry
//!
//! Hosts many kernel instances under derived addresses and keeps each one on
//! disk as a checksummed JSON record.
//!
//! Unfrozen instances are owned exclusively by the registry. Freezing moves an
//! instance into an `Arc` so that children can share it as their parent.

use std::collections::{btree_map, BTreeMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::address::Address;
use crate::checksum::IdentityHash;
use crate::config::{OutputFormat, RegistryConfig};
use crate::error::{KernelError, Result};
use crate::event::{EventSink, Receipt};
use crate::instance::{FreezeState, KernelInstance};
use crate::record::{InstanceRecord, RecordEnvelope};

enum Slot {
    Open(KernelInstance),
    Sealed(Arc<KernelInstance>),
}

impl Slot {
    fn instance(&self) -> &KernelInstance {
        match self {
            Slot::Open(instance) => instance,
            Slot::Sealed(instance) => &**instance,
        }
    }

    fn into_sealed(self) -> Slot {
        match self {
            Slot::Open(instance) => Slot::Sealed(Arc::new(instance)),
            sealed @ Slot::Sealed(_) => sealed,
        }
    }
}

struct Entry {
    slot: Slot,
    record: InstanceRecord,
}

/// File-backed host for kernel instances
pub struct KernelRegistry {
    /// Path to the registry root
    root: PathBuf,
    config: RegistryConfig,
    output: OutputFormat,
    entries: BTreeMap<Address, Entry>,
    next_sequence: u64,
    sinks: Vec<Box<dyn EventSink>>,
}

impl KernelRegistry {
    /// Open an existing registry or create a new one
    pub fn open(path: impl AsRef<Path>, config: RegistryConfig) -> Result<Self> {
        let root = path.as_ref().to_path_buf();
        fs::create_dir_all(root.join("instances"))?;

        let mut registry = Self {
            root,
            config,
            output: OutputFormat::default(),
            entries: BTreeMap::new(),
            next_sequence: 0,
            sinks: Vec::new(),
        };
        registry.load_records()?;

        info!(
            root = %registry.root.display(),
            instances = registry.entries.len(),
            "kernel registry opened"
        );
        Ok(registry)
    }

    /// Use `format` when writing records
    pub fn with_output(mut self, format: OutputFormat) -> Self {
        self.output = format;
        self
    }

    /// Get the root path of the registry
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Register a subscriber for events from every instance
    pub fn subscribe(&mut self, sink: impl EventSink + 'static) {
        self.sinks.push(Box::new(sink));
    }

    /// Deploy a new instance and return its address
    pub fn deploy(
        &mut self,
        caller: &Address,
        name: &str,
        version: &str,
        parent: Option<Address>,
    ) -> Result<Address> {
        let parent_instance = match parent {
            None => None,
            Some(address) => {
                let entry = self
                    .entries
                    .get(&address)
                    .ok_or(KernelError::NotFound { address })?;
                match &entry.slot {
                    Slot::Sealed(instance) => Some(Arc::clone(instance)),
                    Slot::Open(_) => {
                        return Err(KernelError::InvalidParentState {
                            parent: address.to_string(),
                        })
                    }
                }
            }
        };

        let instance = KernelInstance::with_max_depth(
            name,
            version,
            *caller,
            parent_instance,
            self.config.max_chain_depth,
        )?;

        let sequence = self.next_sequence;
        let address = Address::derive(caller, sequence);
        let record = InstanceRecord::new(address, sequence, &instance, parent);
        self.write_record(&record)?;

        self.next_sequence += 1;
        self.entries.insert(
            address,
            Entry {
                slot: Slot::Open(instance),
                record,
            },
        );

        info!(%address, name, version, parent = ?parent, "kernel deployed");
        Ok(address)
    }

    /// Bind `contract_name` in the instance at `at`
    pub fn add_implementation(
        &mut self,
        caller: &Address,
        at: &Address,
        contract_name: &str,
        implementation: Address,
    ) -> Result<Receipt> {
        let entry = self
            .entries
            .get_mut(at)
            .ok_or(KernelError::NotFound { address: *at })?;

        let instance = match &mut entry.slot {
            Slot::Open(instance) => instance,
            Slot::Sealed(instance) => {
                // Sealed instances are frozen, so this reports why the call is rejected
                instance.check_binding(caller, contract_name, implementation)?;
                return Err(KernelError::FrozenRegistry {
                    name: instance.name().to_string(),
                    version: instance.version().to_string(),
                });
            }
        };

        // Validate and persist before touching memory so a failed write changes nothing
        instance.check_binding(caller, contract_name, implementation)?;
        let record = entry.record.with_binding(contract_name, implementation);
        write_record(&self.root, self.output, &record)?;

        let receipt = instance.add_implementation(caller, contract_name, implementation)?;
        entry.record = record;

        for event in &receipt.logs {
            for sink in &self.sinks {
                sink.on_event(*at, event);
            }
        }
        Ok(receipt)
    }

    /// Freeze the instance at `at`. Freezing a frozen instance is a no-op.
    pub fn freeze(&mut self, caller: &Address, at: &Address) -> Result<()> {
        let entry = self
            .entries
            .get_mut(at)
            .ok_or(KernelError::NotFound { address: *at })?;

        let instance = match &mut entry.slot {
            Slot::Open(instance) => instance,
            Slot::Sealed(instance) => {
                instance.ensure_developer(caller)?;
                debug!(address = %at, "already frozen");
                return Ok(());
            }
        };

        instance.ensure_developer(caller)?;
        let record = entry.record.frozen_now();
        write_record(&self.root, self.output, &record)?;

        instance.freeze(caller)?;
        entry.record = record;

        // Move the now frozen instance behind an Arc
        if let Some(Entry { slot, record }) = self.entries.remove(at) {
            self.entries.insert(
                *at,
                Entry {
                    slot: slot.into_sealed(),
                    record,
                },
            );
        }

        info!(address = %at, "kernel sealed");
        Ok(())
    }

    /// Get the instance at `at`
    pub fn get(&self, at: &Address) -> Option<&KernelInstance> {
        self.entries.get(at).map(|e| e.slot.instance())
    }

    /// Shared handle to a frozen instance
    pub fn get_shared(&self, at: &Address) -> Option<Arc<KernelInstance>> {
        match &self.entries.get(at)?.slot {
            Slot::Sealed(instance) => Some(Arc::clone(instance)),
            Slot::Open(_) => None,
        }
    }

    /// Get the persisted record for `at`
    pub fn record(&self, at: &Address) -> Option<&InstanceRecord> {
        self.entries.get(at).map(|e| &e.record)
    }

    /// Resolve `contract_name` through the instance at `at` and its ancestors
    pub fn get_implementation(&self, at: &Address, contract_name: &str) -> Result<Option<Address>> {
        let instance = self
            .get(at)
            .ok_or(KernelError::NotFound { address: *at })?;
        Ok(instance.get_implementation(contract_name))
    }

    /// All instances in deployment order
    pub fn instances(&self) -> Vec<(Address, &KernelInstance)> {
        let mut all: Vec<_> = self
            .entries
            .iter()
            .map(|(address, e)| (e.record.sequence, *address, e.slot.instance()))
            .collect();
        all.sort_by_key(|(sequence, _, _)| *sequence);
        all.into_iter()
            .map(|(_, address, instance)| (address, instance))
            .collect()
    }

    /// Identity hash of an instance under the configured scheme
    pub fn identity_of(&self, at: &Address) -> Option<IdentityHash> {
        self.get(at).map(|i| i.hash_with(self.config.hash_scheme))
    }

    /// Addresses of every instance whose identity hash equals `hash`
    pub fn find_by_hash(&self, hash: &IdentityHash) -> Vec<Address> {
        self.instances()
            .into_iter()
            .filter(|(_, instance)| instance.hash_with(self.config.hash_scheme) == *hash)
            .map(|(address, _)| address)
            .collect()
    }

    /// Re-read the record for `at` from disk and check its checksum
    pub fn verify(&self, at: &Address) -> Result<bool> {
        let entry = self
            .entries
            .get(at)
            .ok_or(KernelError::NotFound { address: *at })?;

        let path = self.record_path(&entry.record);
        let content = fs::read_to_string(&path)?;
        let envelope: RecordEnvelope = serde_json::from_str(&content)?;
        Ok(envelope.verify()? && envelope.record == entry.record)
    }

    fn record_path(&self, record: &InstanceRecord) -> PathBuf {
        self.root.join("instances").join(record.filename())
    }

    fn write_record(&self, record: &InstanceRecord) -> Result<()> {
        write_record(&self.root, self.output, record)
    }

    /// Load all records from disk
    fn load_records(&mut self) -> Result<()> {
        let instances_dir = self.root.join("instances");

        let mut records = Vec::new();
        for entry in fs::read_dir(&instances_dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }

            let content = fs::read_to_string(&path)?;
            let envelope: RecordEnvelope = serde_json::from_str(&content)?;
            let record = envelope.open().map_err(|e| {
                warn!(path = %path.display(), error = %e, "rejected kernel record");
                e
            })?;
            if path.file_name().and_then(|n| n.to_str()) != Some(record.filename().as_str()) {
                return Err(KernelError::CorruptRecord(format!(
                    "{} is stored as {}",
                    record.address,
                    path.display()
                )));
            }
            records.push(record);
        }

        // Parents always precede their children
        records.sort_by_key(|r| r.sequence);

        for record in records {
            let parent = match record.parent {
                None => None,
                Some(parent) => match self.entries.get(&parent).map(|e| &e.slot) {
                    Some(Slot::Sealed(instance)) => Some(Arc::clone(instance)),
                    Some(Slot::Open(_)) => {
                        return Err(KernelError::CorruptRecord(format!(
                            "{} has unfrozen parent {}",
                            record.address, parent
                        )))
                    }
                    None => {
                        return Err(KernelError::CorruptRecord(format!(
                            "{} has unknown parent {}",
                            record.address, parent
                        )))
                    }
                },
            };

            // Records were valid when written; depth limits apply to new deployments only
            let base = KernelInstance::with_max_depth(
                record.name.clone(),
                record.version.clone(),
                record.developer,
                parent,
                usize::MAX,
            )?;
            let state = if record.frozen {
                FreezeState::Frozen
            } else {
                FreezeState::Unfrozen
            };
            let instance = KernelInstance::restore(base, record.bindings.clone(), state)?;

            let slot = if instance.is_frozen() {
                Slot::Sealed(Arc::new(instance))
            } else {
                Slot::Open(instance)
            };

            self.next_sequence = self.next_sequence.max(record.sequence + 1);
            debug!(address = %record.address, name = %record.name, version = %record.version, "kernel loaded");
            match self.entries.entry(record.address) {
                btree_map::Entry::Occupied(_) => {
                    return Err(KernelError::CorruptRecord(format!(
                        "duplicate record for {}",
                        record.address
                    )))
                }
                btree_map::Entry::Vacant(vacant) => {
                    vacant.insert(Entry { slot, record });
                }
            }
        }

        Ok(())
    }
}

fn write_record(root: &Path, format: OutputFormat, record: &InstanceRecord) -> Result<()> {
    let envelope = RecordEnvelope::seal(record.clone())?;
    let content = match format {
        OutputFormat::Pretty => serde_json::to_string_pretty(&envelope)?,
        OutputFormat::Compact => serde_json::to_string(&envelope)?,
    };
    fs::write(root.join("instances").join(record.filename()), content)?;
    Ok(())
}
