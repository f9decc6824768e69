//! Kernel Instance
//!
//! A named, versioned mapping from contract names to implementation addresses.
//! Instances start unfrozen, accept new bindings until frozen, and once frozen
//! may serve as the parent of new instances. Lookups that miss locally walk up
//! the parent chain.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::address::Address;
use crate::checksum::{HashScheme, IdentityHash};
use crate::error::{KernelError, Result};
use crate::event::{KernelEvent, Receipt};

/// Default limit on the number of ancestors an instance may have
pub const DEFAULT_MAX_CHAIN_DEPTH: usize = 64;

/// Freeze state of an instance. `Frozen` is absorbing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FreezeState {
    #[default]
    Unfrozen,
    Frozen,
}

/// Where a looked-up implementation came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub implementation: Address,
    /// Name of the instance holding the binding
    pub name: String,
    /// Version of the instance holding the binding
    pub version: String,
    /// 0 if bound locally, 1 if bound by the parent, and so on
    pub distance: usize,
}

impl Resolution {
    pub fn is_inherited(&self) -> bool {
        self.distance > 0
    }
}

/// A versioned, freezable implementation registry
#[derive(Debug)]
pub struct KernelInstance {
    name: String,
    version: String,
    developer: Address,
    parent: Option<Arc<KernelInstance>>,
    state: FreezeState,
    bindings: BTreeMap<String, Address>,
    depth: usize,
}

impl KernelInstance {
    /// Create an instance with the default chain depth limit
    pub fn new(
        name: impl Into<String>,
        version: impl Into<String>,
        developer: Address,
        parent: Option<Arc<KernelInstance>>,
    ) -> Result<Self> {
        Self::with_max_depth(name, version, developer, parent, DEFAULT_MAX_CHAIN_DEPTH)
    }

    /// Create an instance whose ancestor chain may be at most `max_depth` long.
    ///
    /// A parent must already be frozen.
    pub fn with_max_depth(
        name: impl Into<String>,
        version: impl Into<String>,
        developer: Address,
        parent: Option<Arc<KernelInstance>>,
        max_depth: usize,
    ) -> Result<Self> {
        let name = name.into();
        let version = version.into();

        if name.is_empty() {
            return Err(KernelError::InvalidName(
                "kernel name must not be empty".to_string(),
            ));
        }

        let depth = match &parent {
            None => 0,
            Some(parent) => {
                if !parent.is_frozen() {
                    return Err(KernelError::InvalidParentState {
                        parent: format!("{} v{}", parent.name, parent.version),
                    });
                }
                let depth = parent.depth + 1;
                if depth > max_depth {
                    return Err(KernelError::ChainTooDeep {
                        depth,
                        max: max_depth,
                    });
                }
                depth
            }
        };

        Ok(Self {
            name,
            version,
            developer,
            parent,
            state: FreezeState::Unfrozen,
            bindings: BTreeMap::new(),
            depth,
        })
    }

    /// Rebuild an instance from persisted parts without emitting events.
    ///
    /// Bindings are restored as given; the parent is still checked.
    pub(crate) fn restore(
        mut base: KernelInstance,
        bindings: BTreeMap<String, Address>,
        state: FreezeState,
    ) -> Result<Self> {
        if let Some((contract, _)) = bindings.iter().find(|(_, address)| address.is_zero()) {
            return Err(KernelError::ZeroImplementation {
                contract: contract.clone(),
            });
        }
        base.bindings = bindings;
        base.state = state;
        Ok(base)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// Identity that created this instance
    pub fn developer(&self) -> Address {
        self.developer
    }

    pub fn parent(&self) -> Option<&Arc<KernelInstance>> {
        self.parent.as_ref()
    }

    pub fn state(&self) -> FreezeState {
        self.state
    }

    pub fn is_frozen(&self) -> bool {
        self.state == FreezeState::Frozen
    }

    /// Number of ancestors
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Bindings held by this instance only
    pub fn bindings(&self) -> &BTreeMap<String, Address> {
        &self.bindings
    }

    pub(crate) fn ensure_developer(&self, caller: &Address) -> Result<()> {
        if *caller != self.developer {
            return Err(KernelError::Unauthorized {
                caller: *caller,
                developer: self.developer,
            });
        }
        Ok(())
    }

    /// Every check `add_implementation` performs, without mutating
    pub(crate) fn check_binding(
        &self,
        caller: &Address,
        contract_name: &str,
        implementation: Address,
    ) -> Result<()> {
        self.ensure_developer(caller)?;

        if self.is_frozen() {
            return Err(KernelError::FrozenRegistry {
                name: self.name.clone(),
                version: self.version.clone(),
            });
        }
        if contract_name.is_empty() {
            return Err(KernelError::InvalidName(
                "contract name must not be empty".to_string(),
            ));
        }
        if implementation.is_zero() {
            return Err(KernelError::ZeroImplementation {
                contract: contract_name.to_string(),
            });
        }
        if let Some(existing) = self.bindings.get(contract_name) {
            return Err(KernelError::DuplicateBinding {
                contract: contract_name.to_string(),
                existing: *existing,
            });
        }
        Ok(())
    }

    /// Bind `contract_name` to `implementation` in this instance.
    ///
    /// A name bound by an ancestor may be bound again here, shadowing it.
    pub fn add_implementation(
        &mut self,
        caller: &Address,
        contract_name: impl Into<String>,
        implementation: Address,
    ) -> Result<Receipt> {
        let contract_name = contract_name.into();
        self.check_binding(caller, &contract_name, implementation)?;

        info!(
            kernel = %self.name,
            version = %self.version,
            contract = %contract_name,
            %implementation,
            "implementation added"
        );
        self.bindings.insert(contract_name.clone(), implementation);

        Ok(Receipt::with_event(KernelEvent::ImplementationAdded {
            contract_name,
            implementation,
        }))
    }

    /// Freeze this instance. Freezing a frozen instance is a no-op.
    pub fn freeze(&mut self, caller: &Address) -> Result<()> {
        self.ensure_developer(caller)?;

        if self.is_frozen() {
            debug!(kernel = %self.name, version = %self.version, "already frozen");
            return Ok(());
        }

        self.state = FreezeState::Frozen;
        info!(
            kernel = %self.name,
            version = %self.version,
            bindings = self.bindings.len(),
            "kernel frozen"
        );
        Ok(())
    }

    /// Freeze and share this instance so it can be used as a parent
    pub fn seal(mut self, caller: &Address) -> Result<Arc<KernelInstance>> {
        self.freeze(caller)?;
        Ok(Arc::new(self))
    }

    /// Look up the implementation for `contract_name`, delegating to ancestors
    pub fn get_implementation(&self, contract_name: &str) -> Option<Address> {
        self.resolve(contract_name).map(|r| r.implementation)
    }

    /// Like [`Self::get_implementation`], also reporting which instance answered
    pub fn resolve(&self, contract_name: &str) -> Option<Resolution> {
        for (distance, instance) in self.chain().enumerate() {
            if let Some(implementation) = instance.bindings.get(contract_name) {
                return Some(Resolution {
                    implementation: *implementation,
                    name: instance.name.clone(),
                    version: instance.version.clone(),
                    distance,
                });
            }
        }
        debug!(kernel = %self.name, contract = contract_name, "no implementation in chain");
        None
    }

    /// This instance followed by its ancestors, nearest first
    pub fn chain(&self) -> Chain<'_> {
        Chain {
            next: Some(self),
        }
    }

    /// Ancestors of this instance, nearest first
    pub fn ancestors(&self) -> Chain<'_> {
        Chain {
            next: self.parent.as_deref(),
        }
    }

    /// Every name visible from this instance with shadowing applied
    pub fn effective_bindings(&self) -> BTreeMap<String, Address> {
        let mut merged = BTreeMap::new();
        for instance in self.chain() {
            for (contract, implementation) in &instance.bindings {
                merged.entry(contract.clone()).or_insert(*implementation);
            }
        }
        merged
    }

    /// Identity hash of `name ++ version`
    pub fn get_hash(&self) -> IdentityHash {
        self.hash_with(HashScheme::Concatenated)
    }

    pub fn hash_with(&self, scheme: HashScheme) -> IdentityHash {
        IdentityHash::compute(&self.name, &self.version, scheme)
    }
}

impl Drop for KernelInstance {
    // Unlink ancestors one at a time so dropping a long chain does not recurse
    fn drop(&mut self) {
        let mut parent = self.parent.take();
        while let Some(mut ancestor) = parent.and_then(Arc::into_inner) {
            parent = ancestor.parent.take();
        }
    }
}

/// Iterator over an instance chain
#[derive(Debug, Clone)]
pub struct Chain<'a> {
    next: Option<&'a KernelInstance>,
}

impl<'a> Iterator for Chain<'a> {
    type Item = &'a KernelInstance;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next?;
        self.next = current.parent.as_deref();
        Some(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn developer() -> Address {
        Address::from_bytes([0xde; 20])
    }

    fn implementation(n: u8) -> Address {
        Address::from_bytes([n; 20])
    }

    #[test]
    fn test_new_instance() {
        let instance = KernelInstance::new("Test", "0.0", developer(), None).unwrap();
        assert_eq!(instance.name(), "Test");
        assert_eq!(instance.version(), "0.0");
        assert_eq!(instance.developer(), developer());
        assert!(instance.parent().is_none());
        assert_eq!(instance.state(), FreezeState::Unfrozen);
        assert_eq!(instance.depth(), 0);
    }

    #[test]
    fn test_empty_name_rejected() {
        let result = KernelInstance::new("", "0.0", developer(), None);
        assert!(matches!(result, Err(KernelError::InvalidName(_))));
    }

    #[test]
    fn test_rejects_zero_and_empty_bindings() {
        let mut instance = KernelInstance::new("Test", "0.0", developer(), None).unwrap();
        assert!(matches!(
            instance.add_implementation(&developer(), "TestContract", Address::ZERO),
            Err(KernelError::ZeroImplementation { .. })
        ));
        assert!(matches!(
            instance.add_implementation(&developer(), "", implementation(1)),
            Err(KernelError::InvalidName(_))
        ));
        assert!(instance.bindings().is_empty());
    }

    #[test]
    fn test_only_developer_mutates() {
        let stranger = Address::from_bytes([0x55; 20]);
        let mut instance = KernelInstance::new("Test", "0.0", developer(), None).unwrap();

        assert!(matches!(
            instance.add_implementation(&stranger, "TestContract", implementation(1)),
            Err(KernelError::Unauthorized { .. })
        ));
        assert!(matches!(
            instance.freeze(&stranger),
            Err(KernelError::Unauthorized { .. })
        ));
        assert!(!instance.is_frozen());
    }

    #[test]
    fn test_freeze_is_idempotent() {
        let mut instance = KernelInstance::new("Test", "0.0", developer(), None).unwrap();
        instance.freeze(&developer()).unwrap();
        instance.freeze(&developer()).unwrap();
        assert!(instance.is_frozen());
    }

    #[test]
    fn test_resolution_distance() {
        let mut root = KernelInstance::new("Test", "0.0", developer(), None).unwrap();
        root.add_implementation(&developer(), "A", implementation(1)).unwrap();
        let root = root.seal(&developer()).unwrap();

        let middle = KernelInstance::new("Test", "0.1", developer(), Some(root))
            .unwrap()
            .seal(&developer())
            .unwrap();
        let leaf = KernelInstance::new("Test", "0.2", developer(), Some(middle)).unwrap();

        let resolution = leaf.resolve("A").unwrap();
        assert_eq!(resolution.implementation, implementation(1));
        assert_eq!(resolution.version, "0.0");
        assert_eq!(resolution.distance, 2);
        assert!(resolution.is_inherited());
        assert_eq!(leaf.depth(), 2);
        assert_eq!(leaf.ancestors().count(), 2);
        assert_eq!(leaf.chain().count(), 3);
    }

    #[test]
    fn test_effective_bindings_apply_shadowing() {
        let mut root = KernelInstance::new("Test", "0.0", developer(), None).unwrap();
        root.add_implementation(&developer(), "A", implementation(1)).unwrap();
        root.add_implementation(&developer(), "B", implementation(2)).unwrap();
        let root = root.seal(&developer()).unwrap();

        let mut child = KernelInstance::new("Test", "0.1", developer(), Some(root)).unwrap();
        child.add_implementation(&developer(), "B", implementation(3)).unwrap();
        child.add_implementation(&developer(), "C", implementation(4)).unwrap();

        let merged = child.effective_bindings();
        assert_eq!(merged.len(), 3);
        assert_eq!(merged["A"], implementation(1));
        assert_eq!(merged["B"], implementation(3));
        assert_eq!(merged["C"], implementation(4));
        assert_eq!(child.bindings().len(), 2);
    }

    #[test]
    fn test_chain_depth_limit() {
        let root = KernelInstance::new("Test", "0", developer(), None)
            .unwrap()
            .seal(&developer())
            .unwrap();
        let child = KernelInstance::with_max_depth("Test", "1", developer(), Some(root.clone()), 1)
            .unwrap()
            .seal(&developer())
            .unwrap();

        let result = KernelInstance::with_max_depth("Test", "2", developer(), Some(child), 1);
        assert!(matches!(
            result,
            Err(KernelError::ChainTooDeep { depth: 2, max: 1 })
        ));

        let result = KernelInstance::with_max_depth("Test", "1b", developer(), Some(root), 0);
        assert!(matches!(result, Err(KernelError::ChainTooDeep { .. })));
    }

    #[test]
    fn test_hash_ignores_bindings_and_state() {
        let mut instance = KernelInstance::new("Test", "0.0", developer(), None).unwrap();
        let before = instance.get_hash();
        instance.add_implementation(&developer(), "A", implementation(1)).unwrap();
        instance.freeze(&developer()).unwrap();
        assert_eq!(instance.get_hash(), before);

        let other = KernelInstance::new("Test", "0.0", Address::ZERO, None).unwrap();
        assert_eq!(other.get_hash(), before);
        assert_ne!(
            other.hash_with(HashScheme::LengthPrefixed),
            other.hash_with(HashScheme::Concatenated)
        );
    }

    #[test]
    fn test_frozen_instances_are_shareable_across_threads() {
        let mut root = KernelInstance::new("Test", "0.0", developer(), None).unwrap();
        root.add_implementation(&developer(), "A", implementation(9)).unwrap();
        let root = root.seal(&developer()).unwrap();

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let root = Arc::clone(&root);
                std::thread::spawn(move || root.get_implementation("A"))
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.join().unwrap(), Some(implementation(9)));
        }
    }

    #[test]
    fn test_dropping_child_keeps_shared_ancestors() {
        let root = KernelInstance::new("Test", "0", developer(), None)
            .unwrap()
            .seal(&developer())
            .unwrap();
        let mut middle = KernelInstance::new("Test", "1", developer(), Some(Arc::clone(&root))).unwrap();
        middle.add_implementation(&developer(), "A", implementation(5)).unwrap();
        let middle = middle.seal(&developer()).unwrap();

        let leaf = KernelInstance::new("Test", "2", developer(), Some(Arc::clone(&middle))).unwrap();
        assert_eq!(Arc::strong_count(&middle), 2);
        drop(leaf);

        assert_eq!(Arc::strong_count(&middle), 1);
        assert_eq!(Arc::strong_count(&root), 2);
        assert!(Arc::ptr_eq(middle.parent().unwrap(), &root));
        assert_eq!(middle.get_implementation("A"), Some(implementation(5)));
    }
}
