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

//! Remote target definitions.

use std::fmt;
use std::path::PathBuf;

use zeroize::Zeroizing;

use crate::shared::error::ValidationError;
use crate::shared::validation::{validate_hostname, validate_name, validate_port, validate_username};

pub const DEFAULT_SSH_PORT: u16 = 22;

/// How a target authenticates. Exactly one method per target.
#[derive(Clone, PartialEq, Eq)]
pub enum AuthMethod {
    KeyFile(PathBuf),
    Password(Zeroizing<String>),
}

impl AuthMethod {
    pub fn with_key_file(path: impl Into<PathBuf>) -> Self {
        AuthMethod::KeyFile(path.into())
    }

    pub fn with_password(password: &str) -> Self {
        AuthMethod::Password(Zeroizing::new(password.to_string()))
    }

    /// Build an auth method from optional config fields.
    ///
    /// Fails unless exactly one of `key_path` and `password` is supplied.
    pub fn from_parts(
        key_path: Option<PathBuf>,
        password: Option<String>,
    ) -> Result<Self, ValidationError> {
        match (key_path, password) {
            (Some(path), None) => {
                if path.as_os_str().is_empty() {
                    return Err(ValidationError::empty("ssh_key"));
                }
                Ok(AuthMethod::KeyFile(path))
            }
            (None, Some(password)) => {
                if password.is_empty() {
                    return Err(ValidationError::empty("password"));
                }
                Ok(AuthMethod::Password(Zeroizing::new(password)))
            }
            (Some(_), Some(_)) => Err(ValidationError::new(
                "auth",
                "specify either ssh_key or password, not both",
            )),
            (None, None) => Err(ValidationError::new(
                "auth",
                "one of ssh_key or password is required",
            )),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            AuthMethod::KeyFile(_) => "key",
            AuthMethod::Password(_) => "password",
        }
    }
}

impl fmt::Debug for AuthMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthMethod::KeyFile(path) => f.debug_tuple("KeyFile").field(path).finish(),
            AuthMethod::Password(_) => f.write_str("Password(<redacted>)"),
        }
    }
}

/// Pool key for a target endpoint.
///
/// Sessions are shared only between targets with the same username, host
/// and port.
#[derive(Debug, Clone, Hash, Eq, PartialEq, PartialOrd, Ord)]
pub struct TargetKey {
    pub username: String,
    pub host: String,
    pub port: u16,
}

impl fmt::Display for TargetKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}:{}", self.username, self.host, self.port)
    }
}

/// A remote system's identity and credentials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetConfig {
    pub name: String,
    pub host: String,
    pub port: u16,
    pub username: String,
    pub auth: AuthMethod,
    pub tags: Vec<String>,
    pub enabled: bool,
}

impl TargetConfig {
    pub fn new(
        name: impl Into<String>,
        host: impl Into<String>,
        port: u16,
        username: impl Into<String>,
        auth: AuthMethod,
    ) -> Self {
        Self {
            name: name.into(),
            host: host.into(),
            port,
            username: username.into(),
            auth,
            tags: Vec::new(),
            enabled: true,
        }
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Parse a `[user@]host[:port]` endpoint into a target.
    ///
    /// The username falls back to `default_user`, then `$USER`/`$USERNAME`,
    /// then `root`.
    pub fn parse(
        name: &str,
        endpoint: &str,
        default_user: Option<&str>,
        auth: AuthMethod,
    ) -> Result<Self, ValidationError> {
        let (user_part, host, port) = split_endpoint(endpoint)?;
        let port = port.unwrap_or(DEFAULT_SSH_PORT);
        let username = user_part
            .or(default_user)
            .map(|s| s.to_string())
            .unwrap_or_else(current_username);

        let target = TargetConfig::new(name, host, port, username, auth);
        target.validate()?;
        Ok(target)
    }

    /// Check every field invariant.
    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_name("name", &self.name)?;
        validate_hostname(&self.host)?;
        validate_port(self.port)?;
        validate_username(&self.username)?;
        match &self.auth {
            AuthMethod::KeyFile(path) if path.as_os_str().is_empty() => {
                Err(ValidationError::empty("ssh_key"))
            }
            AuthMethod::Password(password) if password.is_empty() => {
                Err(ValidationError::empty("password"))
            }
            _ => Ok(()),
        }
    }

    pub fn key(&self) -> TargetKey {
        TargetKey {
            username: self.username.clone(),
            host: self.host.clone(),
            port: self.port,
        }
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }
}

impl fmt::Display for TargetConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}@{}:{})",
            self.name, self.username, self.host, self.port
        )
    }
}

/// Partial update applied by `update_target`. `None` leaves a field as is.
#[derive(Debug, Clone, Default)]
pub struct TargetUpdate {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub username: Option<String>,
    pub auth: Option<AuthMethod>,
    pub tags: Option<Vec<String>>,
    pub enabled: Option<bool>,
}

impl TargetUpdate {
    /// Produce the updated target without touching the original.
    pub fn apply_to(&self, target: &TargetConfig) -> TargetConfig {
        let mut updated = target.clone();
        if let Some(host) = &self.host {
            updated.host = host.clone();
        }
        if let Some(port) = self.port {
            updated.port = port;
        }
        if let Some(username) = &self.username {
            updated.username = username.clone();
        }
        if let Some(auth) = &self.auth {
            updated.auth = auth.clone();
        }
        if let Some(tags) = &self.tags {
            updated.tags = tags.clone();
        }
        if let Some(enabled) = self.enabled {
            updated.enabled = enabled;
        }
        updated
    }
}

/// Split `[user@]host[:port]` into its parts; the port is `None` when absent.
pub(crate) fn split_endpoint(
    endpoint: &str,
) -> Result<(Option<&str>, &str, Option<u16>), ValidationError> {
    let (user_part, host_part) = match endpoint.split_once('@') {
        Some((user, rest)) => (Some(user), rest),
        None => (None, endpoint),
    };

    let parse_port = |port_str: &str| {
        port_str.parse::<u16>().map_err(|_| {
            ValidationError::new("port", format!("'{port_str}' is not a valid port"))
        })
    };

    // Bracketed IPv6 literals keep their colons
    match host_part.rfind(':') {
        Some(colon_pos) if !host_part.ends_with(']') && host_part.matches(':').count() == 1 => Ok((
            user_part,
            &host_part[..colon_pos],
            Some(parse_port(&host_part[colon_pos + 1..])?),
        )),
        Some(colon_pos) if host_part.starts_with('[') && host_part[..colon_pos].ends_with(']') => {
            Ok((
                user_part,
                &host_part[..colon_pos],
                Some(parse_port(&host_part[colon_pos + 1..])?),
            ))
        }
        _ => Ok((user_part, host_part, None)),
    }
}

pub(crate) fn current_username() -> String {
    std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| "root".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> AuthMethod {
        AuthMethod::with_key_file("~/.ssh/id_ed25519")
    }

    #[test]
    fn test_parse_host_only() {
        let target = TargetConfig::parse("web1", "example.com", Some("deploy"), key()).unwrap();
        assert_eq!(target.host, "example.com");
        assert_eq!(target.port, 22);
        assert_eq!(target.username, "deploy");
    }

    #[test]
    fn test_parse_full_format() {
        let target = TargetConfig::parse("web1", "admin@example.com:2222", None, key()).unwrap();
        assert_eq!(target.username, "admin");
        assert_eq!(target.host, "example.com");
        assert_eq!(target.port, 2222);
    }

    #[test]
    fn test_parse_bracketed_ipv6() {
        let target = TargetConfig::parse("v6", "ops@[::1]:2200", None, key()).unwrap();
        assert_eq!(target.host, "[::1]");
        assert_eq!(target.port, 2200);
    }

    #[test]
    fn test_parse_rejects_bad_port() {
        assert!(TargetConfig::parse("web1", "example.com:99999", None, key()).is_err());
        assert!(TargetConfig::parse("web1", "example.com:0", None, key()).is_err());
    }

    #[test]
    fn test_auth_requires_exactly_one_method() {
        assert!(AuthMethod::from_parts(Some("/k".into()), None).is_ok());
        assert!(AuthMethod::from_parts(None, Some("secret".to_string())).is_ok());
        assert!(AuthMethod::from_parts(None, None).is_err());
        assert!(AuthMethod::from_parts(Some("/k".into()), Some("secret".to_string())).is_err());
    }

    #[test]
    fn test_password_is_redacted_in_debug() {
        let auth = AuthMethod::with_password("hunter2");
        assert!(!format!("{auth:?}").contains("hunter2"));
    }

    #[test]
    fn test_update_leaves_unset_fields() {
        let target = TargetConfig::new("db", "10.0.0.5", 22, "postgres", key()).with_tags(["db"]);
        let update = TargetUpdate {
            port: Some(2222),
            ..Default::default()
        };
        let updated = update.apply_to(&target);
        assert_eq!(updated.port, 2222);
        assert_eq!(updated.host, "10.0.0.5");
        assert_eq!(updated.tags, vec!["db".to_string()]);
    }

    #[test]
    fn test_key_identity() {
        let a = TargetConfig::new("a", "host", 22, "root", key());
        let b = TargetConfig::new("b", "host", 22, "root", key());
        let c = TargetConfig::new("c", "host", 22, "admin", key());
        assert_eq!(a.key(), b.key());
        assert_ne!(a.key(), c.key());
        assert_eq!(a.key().to_string(), "root@host:22");
    }
}
