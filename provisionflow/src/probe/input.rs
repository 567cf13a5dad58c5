//! Connection input and the target host reference retained after connect.

use crate::errors::InputError;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::LazyLock;

const DEFAULT_PORT: u16 = 22;
const DEFAULT_USERNAME: &str = "root";

// Hostnames, IPv4 and bracket-less IPv6 literals.
#[allow(clippy::expect_used)]
static ADDRESS_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:[A-Za-z0-9](?:[A-Za-z0-9\-]{0,61}[A-Za-z0-9])?(?:\.[A-Za-z0-9](?:[A-Za-z0-9\-]{0,61}[A-Za-z0-9])?)*|[0-9A-Fa-f:.]+)$")
        .expect("address pattern is a valid regex")
});

/// Credentials and address of the host to onboard.
///
/// The secret is only held for the duration of the connect call; `Debug`
/// output redacts it and it is never serialized.
#[derive(Clone, Deserialize)]
pub struct ConnectionInput {
    /// Host name or IP address.
    pub address: String,
    /// SSH port.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Login user.
    #[serde(default = "default_username")]
    pub username: String,
    secret: String,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_username() -> String {
    DEFAULT_USERNAME.to_string()
}

impl ConnectionInput {
    /// Creates connection input for the default port and user.
    #[must_use]
    pub fn new(address: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            port: DEFAULT_PORT,
            username: DEFAULT_USERNAME.to_string(),
            secret: secret.into(),
        }
    }

    /// Sets the port.
    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Sets the login user.
    #[must_use]
    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = username.into();
        self
    }

    /// The credential secret (password or private key).
    #[must_use]
    pub fn secret(&self) -> &str {
        &self.secret
    }

    /// Validates the input before any remote contact.
    ///
    /// # Errors
    ///
    /// Returns an [`InputError`] naming the first malformed field.
    pub fn validate(&self) -> Result<(), InputError> {
        let address = self.address.trim();
        if address.is_empty() {
            return Err(InputError::new("address", "must not be empty"));
        }
        if !ADDRESS_PATTERN.is_match(address) {
            return Err(InputError::new(
                "address",
                format!("'{address}' is not a host name or IP address"),
            ));
        }
        if self.secret.is_empty() {
            return Err(InputError::new("secret", "must not be empty"));
        }
        if self.port == 0 {
            return Err(InputError::new("port", "must be between 1 and 65535"));
        }
        if self.username.trim().is_empty() {
            return Err(InputError::new("username", "must not be empty"));
        }
        Ok(())
    }

    /// The opaque host reference kept once the secret is discarded.
    #[must_use]
    pub fn target(&self) -> TargetHost {
        TargetHost {
            address: self.address.trim().to_string(),
            port: self.port,
        }
    }
}

impl fmt::Debug for ConnectionInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionInput")
            .field("address", &self.address)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// Address-only reference to a connected host.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TargetHost {
    /// Host name or IP address.
    pub address: String,
    /// SSH port.
    pub port: u16,
}

impl TargetHost {
    /// Creates a target host reference.
    #[must_use]
    pub fn new(address: impl Into<String>, port: u16) -> Self {
        Self {
            address: address.into(),
            port,
        }
    }
}

impl fmt::Display for TargetHost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.address, self.port)
    }
}
