//! Demand-driven value cache.
//!
//! Every field remembers the resource that produced it. Reading a field
//! drops that resource's freshness record, so the next refresh fetches it
//! again; resources nobody reads are only refetched once their TTL expires.

use std::collections::HashMap;

use chrono::{DateTime, TimeDelta, Utc};

use crate::diff::field_changes;
use crate::flat::FieldMap;
use crate::types::FieldChange;

pub const DEFAULT_TTL_MINUTES: i64 = 15;

#[derive(Debug, Clone)]
pub struct ValueStore {
    values: FieldMap,
    owners: HashMap<String, String>,
    fetched: HashMap<String, DateTime<Utc>>,
    ttl: TimeDelta,
}

impl Default for ValueStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ValueStore {
    pub fn new() -> Self {
        Self::with_ttl(TimeDelta::minutes(DEFAULT_TTL_MINUTES))
    }

    pub fn with_ttl(ttl: TimeDelta) -> Self {
        Self {
            values: FieldMap::new(),
            owners: HashMap::new(),
            fetched: HashMap::new(),
            ttl,
        }
    }

    /// Returns the cached value and marks its resource due on the next refresh.
    pub fn get(&mut self, field: &str) -> Option<&str> {
        if let Some(owner) = self.owners.get(field) {
            self.fetched.remove(owner);
        }
        self.values.get(field).map(String::as_str)
    }

    /// Reads without touching freshness.
    pub fn peek(&self, field: &str) -> Option<&str> {
        self.values.get(field).map(String::as_str)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.values.contains_key(field)
    }

    pub fn values(&self) -> &FieldMap {
        &self.values
    }

    pub fn owner(&self, field: &str) -> Option<&str> {
        self.owners.get(field).map(String::as_str)
    }

    pub fn last_fetched(&self, resource: &str) -> Option<DateTime<Utc>> {
        self.fetched.get(resource).copied()
    }

    /// Merges a successful fetch of `resource` and stamps its freshness.
    /// Returns the fields whose value changed.
    pub fn update_from_resource(&mut self, resource: &str, fields: FieldMap, now: DateTime<Utc>) -> Vec<FieldChange> {
        let changes = field_changes(resource, &self.values, &fields);
        for (field, value) in fields {
            self.owners.insert(field.clone(), resource.to_string());
            self.values.insert(field, value);
        }
        self.fetched.insert(resource.to_string(), now);
        changes
    }

    /// Sets a value locally, e.g. after a command the device acknowledged.
    /// Ownership and freshness are left as they are.
    pub fn insert(&mut self, field: impl Into<String>, value: impl Into<String>) {
        self.values.insert(field.into(), value.into());
    }

    pub fn is_stale(&self, resource: &str, now: DateTime<Utc>) -> bool {
        self.fetched
            .get(resource)
            .is_none_or(|fetched| now - *fetched >= self.ttl)
    }

    /// The subset of `resources` that needs fetching: never fetched,
    /// invalidated by a read, or older than the TTL.
    pub fn stale_resources<'a>(&self, resources: &[&'a str], now: DateTime<Utc>) -> Vec<&'a str> {
        resources
            .iter()
            .copied()
            .filter(|r| self.is_stale(r, now))
            .collect()
    }

    /// Forces `resource` onto the next refresh.
    pub fn invalidate(&mut self, resource: &str) {
        self.fetched.remove(resource);
    }
}
