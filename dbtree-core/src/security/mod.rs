//! Credential protection.
//!
//! # Security Guarantees
//! - Credentials are stored in `Zeroizing` containers for automatic memory clearing
//! - Passwords never appear in `Debug` output, logs, or error messages
//!
//! # Module Structure
//! - `credentials`: Secure credential container with automatic memory zeroing

mod credentials;

pub use credentials::Credentials;
pub(crate) use credentials::decode_userinfo;
