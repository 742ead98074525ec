// Copyright 2025 Lablup Inc. and Jeongkyu Shin
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Validation for target and cluster definitions.
//!
//! Everything here returns [`ValidationError`] so registries can surface the
//! failing field synchronously without attempting any connection.

use super::error::ValidationError;

/// Maximum length of a target or cluster name.
const MAX_NAME_LENGTH: usize = 64;

/// Maximum hostname length (RFC 1123).
const MAX_HOSTNAME_LENGTH: usize = 253;

/// Maximum POSIX username length.
const MAX_USERNAME_LENGTH: usize = 32;

/// Validate a registry name (target or cluster).
///
/// Names are identifiers used on the command line and as map keys, so they
/// are restricted to alphanumerics, `-`, `_` and `.`.
pub fn validate_name(field: &str, name: &str) -> Result<(), ValidationError> {
    if name.is_empty() {
        return Err(ValidationError::empty(field));
    }
    if name.len() > MAX_NAME_LENGTH {
        return Err(ValidationError::too_long(field, MAX_NAME_LENGTH));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
    {
        return Err(ValidationError::invalid_characters(field));
    }
    Ok(())
}

/// Validate a hostname or IP literal.
///
/// # Examples
///
/// ```
/// use fleetsh::shared::validation::validate_hostname;
///
/// assert!(validate_hostname("db-01.example.com").is_ok());
/// assert!(validate_hostname("").is_err());
/// assert!(validate_hostname("host;rm -rf /").is_err());
/// ```
pub fn validate_hostname(hostname: &str) -> Result<(), ValidationError> {
    if hostname.is_empty() {
        return Err(ValidationError::empty("host"));
    }
    if hostname.len() > MAX_HOSTNAME_LENGTH {
        return Err(ValidationError::too_long("host", MAX_HOSTNAME_LENGTH));
    }

    // Alphanumeric, dots, hyphens, and colons/brackets for IPv6
    let valid_chars = hostname.chars().all(|c| {
        c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == ':' || c == '[' || c == ']'
    });
    if !valid_chars {
        return Err(ValidationError::invalid_characters("host"));
    }

    if hostname.contains("..") || hostname.contains("--") {
        return Err(ValidationError::new(
            "host",
            "contains suspicious repeated characters",
        ));
    }

    Ok(())
}

/// Validate a remote username (POSIX-compliant).
pub fn validate_username(username: &str) -> Result<(), ValidationError> {
    if username.is_empty() {
        return Err(ValidationError::empty("username"));
    }
    if username.len() > MAX_USERNAME_LENGTH {
        return Err(ValidationError::too_long("username", MAX_USERNAME_LENGTH));
    }
    let valid_chars = username
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.');
    if !valid_chars {
        return Err(ValidationError::invalid_characters("username"));
    }
    if username.starts_with('-') {
        return Err(ValidationError::new("username", "cannot start with a hyphen"));
    }
    Ok(())
}

/// Validate a TCP port. Port 0 is never a valid remote endpoint.
pub fn validate_port(port: u16) -> Result<(), ValidationError> {
    if port == 0 {
        return Err(ValidationError::new(
            "port",
            "must be between 1 and 65535",
        ));
    }
    Ok(())
}
