//! Repository identity.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::codec::{decode, encode};
use crate::error::{CoreError, Result};

/// Identifies one repository instance: `(customer, name)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RepositoryId {
    pub customer: String,
    pub name: String,
}

impl RepositoryId {
    /// Create a repository id.
    pub fn new(customer: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            customer: customer.into(),
            name: name.into(),
        }
    }

    /// Encoded `customer,name` prefix used in query listings.
    pub fn to_record_prefix(&self) -> String {
        format!("{},{}", encode(&self.customer), encode(&self.name))
    }

    /// Parse the two encoded key fields of a listing line.
    pub fn from_record_fields(customer: &str, name: &str) -> Result<Self> {
        Ok(Self {
            customer: decode(customer)?,
            name: decode(name)?,
        })
    }

    /// Whether this id passes optional customer/name filters.
    pub fn matches(&self, customer: Option<&str>, name: Option<&str>) -> bool {
        customer.map_or(true, |c| c == self.customer) && name.map_or(true, |n| n == self.name)
    }
}

impl fmt::Display for RepositoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.customer, self.name)
    }
}

impl TryFrom<(&str, &str)> for RepositoryId {
    type Error = CoreError;

    fn try_from((customer, name): (&str, &str)) -> Result<Self> {
        Self::from_record_fields(customer, name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_prefix_roundtrip() {
        let id = RepositoryId::new("acme", "store,1");
        assert_eq!(id.to_record_prefix(), "acme,store$k1");
        let back = RepositoryId::from_record_fields("acme", "store$k1").unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn test_matches() {
        let id = RepositoryId::new("acme", "deployment");
        assert!(id.matches(None, None));
        assert!(id.matches(Some("acme"), None));
        assert!(id.matches(Some("acme"), Some("deployment")));
        assert!(!id.matches(Some("other"), None));
        assert!(!id.matches(None, Some("shop")));
    }
}
