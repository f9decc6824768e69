//! Kernel Registry
//!
//! A versioned registry of contract implementations. Each kernel instance maps
//! contract names to implementation addresses under a `(name, version)`
//! identity.
//!
//! ## Features
//!
//! - **Append-only bindings**: a bound name can never be rebound in the same instance
//! - **Freezing**: a one-way transition that finalizes an instance
//! - **Inheritance**: frozen instances can parent new ones, which inherit and may shadow bindings
//! - **Identity hashes**: SHA256 of name and version, independent of bindings
//! - **Persistence**: a file-backed host with checksummed records
//!
//! ## Lifecycle
//!
//! ```text
//! deploy ──► Unfrozen ──add_implementation──► Unfrozen
//!               │
//!             freeze
//!               ▼
//!            Frozen ──► parent of new instances
//! ```

pub mod address;
pub mod checksum;
pub mod config;
pub mod error;
pub mod event;
pub mod instance;
pub mod record;
pub mod registry;
pub mod token;

pub use address::Address;
pub use checksum::{Checksum, HashScheme, IdentityHash};
pub use config::KernelConfig;
pub use error::{KernelError, Result};
pub use event::{EventLog, EventSink, KernelEvent, Receipt};
pub use instance::{FreezeState, KernelInstance, Resolution};
pub use registry::KernelRegistry;
pub use token::{TokenMetadata, ZEP_TOKEN};
