//! Domain types for memberlink.
//!
//! - [`Member`]: One linked external-account / subject pair
//! - [`ProfileSnapshot`], [`SubjectSnapshot`]: Payloads copied at registration
//! - [`Credentials`]: Sensitive token set, encrypted at rest
//! - [`EncryptedCredentials`]: The at-rest form of [`Credentials`]

mod credentials;
mod member;

pub use credentials::*;
pub use member::*;
