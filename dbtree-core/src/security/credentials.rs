//! Secure credential container with automatic memory zeroing.
//!
//! # Security
//! - Credentials are stored in `Zeroizing<T>` containers
//! - Memory is automatically cleared when credentials go out of scope
//! - Passwords are never exposed in debug output or logs

use crate::Result;
use crate::error::DbTreeError;
use zeroize::{Zeroize, Zeroizing};

/// Secure credential container that automatically zeros memory on drop.
///
/// # Example
///
/// ```rust
/// use dbtree_core::security::Credentials;
///
/// let creds = Credentials::new("root".to_string(), Some("secret".to_string()));
/// assert_eq!(creds.username(), "root");
/// assert!(creds.has_password());
/// assert!(!format!("{:?}", creds).contains("secret"));
/// ```
#[derive(Clone, Zeroize)]
#[zeroize(drop)]
pub struct Credentials {
    username: Zeroizing<String>,
    password: Zeroizing<Option<String>>,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username.as_str())
            .field("password", &self.password.as_deref().map(|_| "****"))
            .finish()
    }
}

impl Credentials {
    /// Creates new credentials with automatic memory zeroing.
    pub fn new(username: String, password: Option<String>) -> Self {
        Self {
            username: Zeroizing::new(username),
            password: Zeroizing::new(password),
        }
    }

    /// Extracts the user and password embedded in a connection URL.
    ///
    /// Both are percent-decoded. A URL without a user yields an empty
    /// username; the caller decides on a default.
    pub fn from_url(connection_string: &str) -> Result<Self> {
        let url = url::Url::parse(connection_string).map_err(|e| {
            DbTreeError::configuration(format!("Invalid connection string format: {}", e))
        })?;

        let username = decode_userinfo(url.username())?;
        let password = url.password().map(decode_userinfo).transpose()?;
        Ok(Self::new(username, password))
    }

    /// Gets the username (still protected by Zeroizing).
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Gets the password for handing to a driver. Never log the result.
    pub fn password(&self) -> Option<&str> {
        self.password.as_deref()
    }

    /// Checks if password is present without exposing it.
    pub fn has_password(&self) -> bool {
        self.password.is_some()
    }

    /// Returns a copy with `username` replaced, keeping the password.
    pub fn with_username(&self, username: String) -> Self {
        Self::new(username, (*self.password).clone())
    }
}

/// Percent-decodes a user or password component of a URL.
///
/// `+` and `&` are literal characters in userinfo, not form encoding.
pub(crate) fn decode_userinfo(raw: &str) -> Result<String> {
    percent_encoding::percent_decode_str(raw)
        .decode_utf8()
        .map(std::borrow::Cow::into_owned)
        .map_err(|_| DbTreeError::configuration("Connection string credentials are not valid UTF-8"))
}
