//! Authors whose content is ingested.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DomainError;

/// An author, keyed by the (first name, last name) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserDocument {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
}

impl UserDocument {
    /// Creates a user with a fresh id.
    pub fn new(first_name: impl Into<String>, last_name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            first_name: first_name.into(),
            last_name: last_name.into(),
        }
    }

    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

/// First/last name pair used to resolve an owner.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserName {
    pub first_name: String,
    pub last_name: String,
}

impl UserName {
    pub fn new(first_name: impl Into<String>, last_name: impl Into<String>) -> Self {
        Self {
            first_name: first_name.into(),
            last_name: last_name.into(),
        }
    }

    /// Parses a full name with [`split_user_full_name`].
    pub fn parse(full_name: &str) -> Result<Self, DomainError> {
        let (first_name, last_name) = split_user_full_name(full_name)?;
        Ok(Self {
            first_name,
            last_name,
        })
    }
}

impl std::fmt::Display for UserName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.first_name, self.last_name)
    }
}

/// Splits a full name into first and last name.
///
/// The last whitespace-separated token is the last name and everything before
/// it is the first name. A single token is used as both.
pub fn split_user_full_name(full_name: &str) -> Result<(String, String), DomainError> {
    let tokens: Vec<&str> = full_name.split_whitespace().collect();

    match tokens.as_slice() {
        [] => Err(DomainError::EmptyUserName),
        [single] => Ok((single.to_string(), single.to_string())),
        [first @ .., last] => Ok((first.join(" "), last.to_string())),
    }
}
