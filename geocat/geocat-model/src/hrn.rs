//! Resource names.
//!
//! A catalog is addressed by a resource name of the form
//! `hrn:<partition>:<service>:<region>:<account>:<catalog>`, for example
//! `hrn:here:data:::example-catalog`. Region and account may be empty.

use std::fmt;
use std::str::FromStr;

use crate::error::{ModelError, ModelResult};

/// Scheme prefix every resource name starts with.
const SCHEME: &str = "hrn";

/// Service segment used by data catalogs.
pub const DATA_SERVICE: &str = "data";

/// A parsed, validated resource name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Hrn {
    partition: String,
    service: String,
    region: String,
    account: String,
    catalog: String,
}

impl Hrn {
    /// Parse a resource name.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::InvalidHrn`] if the input does not have six
    /// colon-separated segments, does not start with `hrn`, or is missing the
    /// partition, service or catalog segment.
    pub fn parse(input: &str) -> ModelResult<Self> {
        let invalid = |detail| ModelError::InvalidHrn {
            input: input.to_string(),
            detail,
        };

        let segments: Vec<&str> = input.split(':').collect();
        if segments.len() != 6 {
            return Err(invalid("expected 6 colon-separated segments"));
        }
        if segments[0] != SCHEME {
            return Err(invalid("missing hrn scheme"));
        }

        let [_, partition, service, region, account, catalog] = segments[..] else {
            return Err(invalid("expected 6 colon-separated segments"));
        };
        if partition.is_empty() {
            return Err(invalid("empty partition"));
        }
        if service.is_empty() {
            return Err(invalid("empty service"));
        }
        if catalog.is_empty() {
            return Err(invalid("empty catalog name"));
        }
        if catalog.chars().any(char::is_whitespace) {
            return Err(invalid("catalog name contains whitespace"));
        }

        Ok(Self {
            partition: partition.to_string(),
            service: service.to_string(),
            region: region.to_string(),
            account: account.to_string(),
            catalog: catalog.to_string(),
        })
    }

    /// The partition namespace (e.g. `here`).
    #[must_use]
    pub fn partition(&self) -> &str {
        &self.partition
    }

    /// The service segment (`data` for catalogs).
    #[must_use]
    pub fn service(&self) -> &str {
        &self.service
    }

    /// The region segment, possibly empty.
    #[must_use]
    pub fn region(&self) -> &str {
        &self.region
    }

    /// The organization/account segment, possibly empty.
    #[must_use]
    pub fn account(&self) -> &str {
        &self.account
    }

    /// The catalog name.
    #[must_use]
    pub fn catalog(&self) -> &str {
        &self.catalog
    }

    /// Whether this name addresses a data catalog.
    #[must_use]
    pub fn is_catalog(&self) -> bool {
        self.service == DATA_SERVICE
    }
}

impl fmt::Display for Hrn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{SCHEME}:{}:{}:{}:{}:{}",
            self.partition, self.service, self.region, self.account, self.catalog
        )
    }
}

impl FromStr for Hrn {
    type Err = ModelError;

    fn from_str(s: &str) -> ModelResult<Self> {
        Self::parse(s)
    }
}
