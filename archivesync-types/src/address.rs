use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Errors produced while parsing an [`Address`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddressError {
    #[error("address is empty")]
    Empty,

    #[error("address has an empty resource: {0}")]
    EmptyResource(String),
}

/// Identifier of a local account owning conversations.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AccountId(pub String);

impl AccountId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A network address of the form `local@domain[/resource]`.
///
/// The bare part (everything before the first `/`) is the persistent identity
/// of a participant and is normalized to lowercase. The resource names one
/// connected client of that participant and is kept verbatim.
///
/// Serializes as its string form; deserialization goes through [`Address::parse`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Address {
    bare: String,
    resource: Option<String>,
}

impl Address {
    /// Parses `local@domain[/resource]`.
    pub fn parse(raw: &str) -> Result<Self, AddressError> {
        let raw = raw.trim();
        let (bare, resource) = match raw.split_once('/') {
            Some((bare, resource)) => {
                if resource.is_empty() {
                    return Err(AddressError::EmptyResource(raw.to_string()));
                }
                (bare, Some(resource.to_string()))
            }
            None => (raw, None),
        };
        if bare.is_empty() {
            return Err(AddressError::Empty);
        }
        Ok(Self {
            bare: bare.to_lowercase(),
            resource,
        })
    }

    /// The persistent (resource-less) part of the address.
    pub fn bare(&self) -> &str {
        &self.bare
    }

    pub fn resource(&self) -> Option<&str> {
        self.resource.as_deref()
    }

    /// True if both addresses name the same participant, ignoring resources.
    pub fn same_bare(&self, other: &Address) -> bool {
        self.bare == other.bare
    }
}

impl FromStr for Address {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Address::parse(s)
    }
}

impl TryFrom<String> for Address {
    type Error = AddressError;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        Address::parse(&raw)
    }
}

impl From<Address> for String {
    fn from(addr: Address) -> Self {
        addr.to_string()
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.resource {
            Some(resource) => write!(f, "{}/{}", self.bare, resource),
            None => write!(f, "{}", self.bare),
        }
    }
}
