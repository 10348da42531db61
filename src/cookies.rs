//! Session cookies and portal credentials
//!
//! A [`CookieBundle`] holds the allow-listed session cookies of the
//! smart-energy portal. It is produced by the gateway, carried as the
//! `NAME=value; NAME=value` wire string, and swapped wholesale on refresh.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Cookies the usage API needs, in wire order
pub const COOKIE_ALLOW_LIST: [&str; 2] = ["MM_SID", "__RequestVerificationToken"];

/// Cookies worth capturing while the login flow runs
pub const CAPTURE_NAMES: [&str; 3] = ["MM_SID", "__RequestVerificationToken", "ASP.NET_SessionId"];

/// Portal username and password
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub username: String,
    pub password: String,
}

impl Credential {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    pub fn is_complete(&self) -> bool {
        !self.username.trim().is_empty() && !self.password.is_empty()
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Allow-listed session cookies keyed by name
#[derive(Clone, Default, PartialEq, Eq)]
pub struct CookieBundle {
    values: BTreeMap<String, String>,
}

impl CookieBundle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a `Cookie` header or a pasted cookie string, keeping allow-listed names
    pub fn parse(raw: &str) -> Self {
        let mut bundle = Self::new();
        bundle.absorb_header(raw, &COOKIE_ALLOW_LIST);
        bundle
    }

    /// Merge `name=value` pairs from a header, restricted to `names`; later values win
    pub fn absorb_header(&mut self, header: &str, names: &[&str]) {
        for pair in header.split(';') {
            if let Some((name, value)) = split_pair(pair)
                && names.contains(&name)
            {
                self.values.insert(name.to_string(), value.to_string());
            }
        }
    }

    /// Insert a single cookie when its name is in `names`
    pub fn absorb(&mut self, name: &str, value: &str, names: &[&str]) {
        let value = value.trim();
        if names.contains(&name) && !value.is_empty() {
            self.values.insert(name.to_string(), value.to_string());
        }
    }

    /// Only the cookies the API needs
    pub fn restricted(&self) -> Self {
        let values = self
            .values
            .iter()
            .filter(|(k, _)| COOKIE_ALLOW_LIST.contains(&k.as_str()))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        Self { values }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Wire form: allow-listed cookies joined by `"; "` in allow-list order
    pub fn to_header_string(&self) -> String {
        COOKIE_ALLOW_LIST
            .iter()
            .filter_map(|name| self.values.get(*name).map(|v| format!("{}={}", name, v)))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

impl fmt::Debug for CookieBundle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.values.keys()).finish()
    }
}

fn split_pair(pair: &str) -> Option<(&str, &str)> {
    let (name, value) = pair.split_once('=')?;
    let name = name.trim();
    let value = value.trim();
    if name.is_empty() || value.is_empty() {
        return None;
    }
    Some((name, value))
}
