//! Agent addresses.
//!
//! Every agent is identified by a jid of the form `local@domain[/resource]`.
//! The bare form (`local@domain`) is what the in-process network routes on.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::JidError;

/// A validated agent address.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Jid {
    raw: String,
    at: usize,
    slash: Option<usize>,
}

impl Jid {
    /// Parse and validate an address.
    pub fn parse(s: &str) -> Result<Self, JidError> {
        let s = s.trim();
        if s.is_empty() {
            return Err(JidError::Empty);
        }
        let at = s.find('@').ok_or_else(|| JidError::MissingDomain(s.to_string()))?;
        if at == 0 {
            return Err(JidError::EmptyLocal(s.to_string()));
        }
        let slash = s[at..].find('/').map(|i| i + at);
        let domain_end = slash.unwrap_or(s.len());
        if domain_end == at + 1 {
            return Err(JidError::MissingDomain(s.to_string()));
        }
        if slash.is_some_and(|i| i + 1 == s.len()) {
            return Err(JidError::EmptyResource(s.to_string()));
        }
        Ok(Self {
            raw: s.to_string(),
            at,
            slash,
        })
    }

    /// The part before `@`.
    pub fn local(&self) -> &str {
        &self.raw[..self.at]
    }

    /// The part between `@` and the optional `/resource`.
    pub fn domain(&self) -> &str {
        let end = self.slash.unwrap_or(self.raw.len());
        &self.raw[self.at + 1..end]
    }

    /// The optional resource after `/`.
    pub fn resource(&self) -> Option<&str> {
        self.slash.map(|i| &self.raw[i + 1..])
    }

    /// The address without its resource.
    pub fn bare(&self) -> Jid {
        match self.slash {
            Some(i) => Self {
                raw: self.raw[..i].to_string(),
                at: self.at,
                slash: None,
            },
            None => self.clone(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl std::fmt::Display for Jid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.raw)
    }
}

impl FromStr for Jid {
    type Err = JidError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Jid {
    type Error = JidError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl From<Jid> for String {
    fn from(jid: Jid) -> Self {
        jid.raw
    }
}
