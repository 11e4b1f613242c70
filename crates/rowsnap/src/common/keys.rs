//! Primary-key scan cursor
//!
//! [`Keys`] holds the ordered primary-key columns of a table together with
//! the mutable start/end bound values the scanner advances between batches.
//! The column set is fixed at construction; only the bound values move.

use std::collections::HashMap;

use crate::common::error::{Error, Result};
use crate::common::value::SqlValue;

/// One primary-key column with its current scan bounds.
#[derive(Debug, Clone, PartialEq)]
pub struct Key {
    /// Column name
    pub name: String,
    /// Inclusive lower bound for the next batch
    pub start: SqlValue,
    /// Inclusive upper bound for the whole scan
    pub end: SqlValue,
}

impl Key {
    /// Create a key with unset bounds.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            start: SqlValue::Null,
            end: SqlValue::Null,
        }
    }
}

/// Ordered primary-key cursor.
///
/// Invariants: key names are unique; order matches the table's PK index
/// order; `clone` yields a fully independent copy.
#[derive(Debug, Clone)]
pub struct Keys {
    keys: Vec<Key>,
    index: HashMap<String, usize>,
}

impl Keys {
    /// Construct an independent copy of the given key list.
    pub fn new(keys: Vec<Key>) -> Self {
        let index = keys
            .iter()
            .enumerate()
            .map(|(i, k)| (k.name.clone(), i))
            .collect();
        Self { keys, index }
    }

    /// Build a cursor from bare column names.
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(names.into_iter().map(Key::new).collect())
    }

    /// Key column names in PK order.
    pub fn column_names(&self) -> Vec<&str> {
        self.keys.iter().map(|k| k.name.as_str()).collect()
    }

    /// The keys themselves, in PK order.
    pub fn keys(&self) -> &[Key] {
        &self.keys
    }

    /// Number of key columns.
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Check whether the cursor has no key columns.
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Current starting values, in PK order.
    pub fn starting_values(&self) -> Vec<SqlValue> {
        self.keys.iter().map(|k| k.start.clone()).collect()
    }

    /// Current ending values, in PK order.
    pub fn ending_values(&self) -> Vec<SqlValue> {
        self.keys.iter().map(|k| k.end.clone()).collect()
    }

    /// Set start and/or end values positionally. A non-empty vector must
    /// have exactly one value per key; omitting a side (or passing an empty
    /// vector) leaves it unchanged.
    pub fn load_values(
        &mut self,
        starts: Option<&[SqlValue]>,
        ends: Option<&[SqlValue]>,
    ) -> Result<()> {
        if let Some(starts) = starts.filter(|v| !v.is_empty()) {
            if starts.len() != self.keys.len() {
                return Err(Error::catalog(format!(
                    "expected {} starting values, got {}",
                    self.keys.len(),
                    starts.len()
                )));
            }
            for (key, value) in self.keys.iter_mut().zip(starts) {
                key.start = value.clone();
            }
        }
        if let Some(ends) = ends.filter(|v| !v.is_empty()) {
            if ends.len() != self.keys.len() {
                return Err(Error::catalog(format!(
                    "expected {} ending values, got {}",
                    self.keys.len(),
                    ends.len()
                )));
            }
            for (key, value) in self.keys.iter_mut().zip(ends) {
                key.end = value.clone();
            }
        }
        Ok(())
    }

    /// Update the starting value of a named key.
    pub fn update_starting_value(&mut self, name: &str, value: SqlValue) -> Result<()> {
        match self.index.get(name) {
            Some(&i) => {
                self.keys[i].start = value;
                Ok(())
            }
            None => Err(Error::catalog(format!("unknown key column: {name}"))),
        }
    }

    /// Update the ending value of a named key.
    pub fn update_ending_value(&mut self, name: &str, value: SqlValue) -> Result<()> {
        match self.index.get(name) {
            Some(&i) => {
                self.keys[i].end = value;
                Ok(())
            }
            None => Err(Error::catalog(format!("unknown key column: {name}"))),
        }
    }

    /// The scan is exhausted when there are no keys or every key's start
    /// equals its end (driver-native value equality).
    pub fn is_exhausted(&self) -> bool {
        self.keys.is_empty() || self.keys.iter().all(|k| k.start == k.end)
    }
}
