//! # Memberlink Core
//!
//! Core types, errors, and traits shared by every memberlink crate.
//!
//! This crate provides the foundational building blocks for the member registry:
//!
//! - **Types**: [`Member`], its snapshots, and the credential records
//! - **Errors**: The full error taxonomy with classification helpers
//! - **Constants**: Document version and cipher sizes
//! - **Traits**: The [`DocumentStore`] persistence boundary
//!
//! ## Example
//!
//! ```rust
//! use memberlink_core::{ProfileSnapshot, SubjectSnapshot};
//!
//! let subject = SubjectSnapshot::new(12345);
//! assert_eq!(subject.subject_id(), "12345");
//!
//! let json = serde_json::to_string(&ProfileSnapshot::default()).unwrap();
//! assert_eq!(json, "{}");
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, clippy::all)]

pub mod constants;
pub mod error;
pub mod traits;
pub mod types;

// Re-export commonly used items at crate root
pub use constants::*;
pub use error::{MemberlinkError, Result};
pub use traits::*;
pub use types::*;
