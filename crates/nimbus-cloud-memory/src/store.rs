//! Per-scope transactional key-value store
//!
//! A [`MemoryStore`] holds any number of independent scopes. Each scope is a
//! set of named tables mapping string keys to JSON records. All access goes
//! through [`Scope::transaction`]: the closure works on a private copy of the
//! scope and the copy replaces the live state only when the closure returns
//! `Ok`, so a failed operation never leaves a half-applied change behind.

use crate::error::{MemoryError, Result};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

type Table = BTreeMap<String, Value>;
type Tables = BTreeMap<String, Table>;

/// Shared store of isolated scopes
#[derive(Debug, Default)]
pub struct MemoryStore {
    scopes: Mutex<HashMap<String, Tables>>,
}

impl MemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Handle on one scope; the scope comes into being with its first transaction
    pub fn scope(self: &Arc<Self>, name: impl Into<String>) -> Scope {
        Scope {
            store: Arc::clone(self),
            name: name.into(),
        }
    }

    /// Names of all scopes touched so far
    pub fn scope_names(&self) -> Result<Vec<String>> {
        let scopes = self
            .scopes
            .lock()
            .map_err(|_| MemoryError::Poisoned("*".to_string()))?;
        let mut names: Vec<String> = scopes.keys().cloned().collect();
        names.sort();
        Ok(names)
    }
}

/// One named scope of a [`MemoryStore`]
#[derive(Debug, Clone)]
pub struct Scope {
    store: Arc<MemoryStore>,
    name: String,
}

impl Scope {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Run `f` atomically against this scope
    pub fn transaction<T, E>(
        &self,
        f: impl FnOnce(&mut Transaction) -> std::result::Result<T, E>,
    ) -> std::result::Result<T, E>
    where
        E: From<MemoryError>,
    {
        let mut scopes = self
            .store
            .scopes
            .lock()
            .map_err(|_| MemoryError::Poisoned(self.name.clone()))?;

        let mut tx = Transaction {
            tables: scopes.get(&self.name).cloned().unwrap_or_default(),
        };
        let out = f(&mut tx)?;
        scopes.insert(self.name.clone(), tx.tables);
        Ok(out)
    }
}

/// Working copy of a scope inside a transaction
#[derive(Debug)]
pub struct Transaction {
    tables: Tables,
}

impl Transaction {
    pub fn get<T: DeserializeOwned>(&self, table: &str, key: &str) -> Result<Option<T>> {
        match self.tables.get(table).and_then(|t| t.get(key)) {
            Some(value) => decode(table, key, value.clone()).map(Some),
            None => Ok(None),
        }
    }

    pub fn put<T: Serialize>(&mut self, table: &str, key: impl Into<String>, value: &T) -> Result<()> {
        let value = serde_json::to_value(value)?;
        self.tables
            .entry(table.to_string())
            .or_default()
            .insert(key.into(), value);
        Ok(())
    }

    /// Returns whether the key was present
    pub fn remove(&mut self, table: &str, key: &str) -> bool {
        self.tables
            .get_mut(table)
            .map(|t| t.remove(key).is_some())
            .unwrap_or(false)
    }

    pub fn contains(&self, table: &str, key: &str) -> bool {
        self.tables.get(table).is_some_and(|t| t.contains_key(key))
    }

    /// All records of a table, in key order
    pub fn values<T: DeserializeOwned>(&self, table: &str) -> Result<Vec<T>> {
        let Some(t) = self.tables.get(table) else {
            return Ok(Vec::new());
        };
        t.iter()
            .map(|(key, value)| decode(table, key, value.clone()))
            .collect()
    }

    pub fn keys(&self, table: &str) -> Vec<String> {
        self.tables
            .get(table)
            .map(|t| t.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn count(&self, table: &str) -> usize {
        self.tables.get(table).map(BTreeMap::len).unwrap_or(0)
    }
}

fn decode<T: DeserializeOwned>(table: &str, key: &str, value: Value) -> Result<T> {
    serde_json::from_value(value).map_err(|source| MemoryError::Codec {
        table: table.to_string(),
        key: key.to_string(),
        source,
    })
}
