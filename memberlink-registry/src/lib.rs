//! # Memberlink Registry
//!
//! Storage, transactional mutation, loading and auditing of linked members.
//!
//! The registry keeps two views of the same data in memory: members keyed by
//! subject id, and a mapping from external account id to subject id for
//! active members. Every mutation is persisted before it returns; a failed
//! write rolls the in-memory change back.
//!
//! Document stores:
//!
//! - **File**: Atomic single-file JSON document for real deployments
//! - **Memory**: In-process document with failure injection for testing
//!
//! ## Example
//!
//! ```rust,ignore
//! use memberlink_registry::{MemberRegistry, RegistryConfig};
//!
//! let config = RegistryConfig::from_env()?;
//! let registry = MemberRegistry::open_from_config(&config).await?;
//!
//! // Link an external account to a subject
//! let member = registry
//!     .register("ext-42", subject, credentials, profile)
//!     .await?;
//!
//! // Check the bidirectional index
//! assert!(registry.audit().is_consistent);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

pub mod audit;
pub mod config;
pub mod document;
pub mod index;
pub mod loader;
mod file;
mod memory;
mod registry;

pub use audit::{AuditIssue, AuditReport};
pub use config::RegistryConfig;
pub use file::FileStore;
pub use index::MemberIndex;
pub use loader::{Anomaly, AnomalyKind};
pub use memory::MemoryStore;
pub use registry::{LoadReport, MemberRegistry, RegistryStats, WriteLock};

// Re-export the store trait from core
pub use memberlink_core::traits::DocumentStore;
