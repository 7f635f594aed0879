//! Geo location lookup for the caller's address.

use std::net::IpAddr;

use async_trait::async_trait;
use serde_json::{Map, Value};

/// Geo location of an IP address. Subdivisions run from largest to smallest.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Location {
    pub country: String,
    pub city: String,
    pub subdivisions: Vec<String>,
}

/// A geo location database.
#[async_trait]
pub trait GeoIpLookup: Send + Sync {
    async fn lookup(&self, ip: IpAddr) -> anyhow::Result<Location>;
}

/// Outcome of looking up one call's remote address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeoIpResult {
    pub remote_addr: String,
    /// The location, or why it could not be resolved.
    pub location: Result<Location, String>,
}

impl GeoIpResult {
    #[must_use]
    pub fn found(remote_addr: impl Into<String>, location: Location) -> Self {
        Self {
            remote_addr: remote_addr.into(),
            location: Ok(location),
        }
    }

    #[must_use]
    pub fn failed(remote_addr: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            remote_addr: remote_addr.into(),
            location: Err(error.into()),
        }
    }

    /// Log summary: `country`, `city`, `subdivision_N` (1-based) and
    /// `remote_addr`, or `error` and `remote_addr`.
    #[must_use]
    pub fn fields(&self) -> Map<String, Value> {
        let mut fields = Map::new();
        match &self.location {
            Ok(location) => {
                fields.insert("country".into(), location.country.clone().into());
                fields.insert("city".into(), location.city.clone().into());
                for (i, name) in location.subdivisions.iter().enumerate() {
                    fields.insert(format!("subdivision_{}", i + 1), name.clone().into());
                }
            }
            Err(error) => {
                fields.insert("error".into(), error.clone().into());
            }
        }
        fields.insert("remote_addr".into(), self.remote_addr.clone().into());
        fields
    }
}
