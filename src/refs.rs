//! Refcounted handle table backing opaque references.
//!
//! Values that cannot (or should not) be copied across the wire are parked
//! here and addressed by an opaque handle string. The table keys on value
//! *identity* - the address of the shared allocation - so saving the same
//! in-memory value twice bumps one refcount instead of minting a second
//! handle, while two equal but distinct values get distinct handles.
//!
//! This is an explicitly manual protocol: every handle handed to the caller
//! must be released exactly as many times as it was produced, or the entry
//! (and the value it pins) lives for the rest of the process.

use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::value::Value;

struct Entry {
    value: Value,
    count: u64,
}

#[derive(Default)]
pub struct RefTable {
    by_identity: HashMap<usize, String>,
    entries: HashMap<String, Entry>,
    next_id: u64,
}

impl RefTable {
    pub fn new() -> RefTable {
        RefTable::default()
    }

    /// Park a value and return its handle. Saving a value that is already
    /// tracked increments its refcount and returns the existing handle.
    pub fn save(&mut self, value: &Value) -> String {
        let identity = value.identity();
        if let Some(handle) = self.by_identity.get(&identity) {
            let entry = self
                .entries
                .get_mut(handle)
                .expect("identity index points at a live entry");
            entry.count += 1;
            return handle.clone();
        }
        self.next_id += 1;
        let handle = format!("h{:08x}", self.next_id);
        self.by_identity.insert(identity, handle.clone());
        self.entries.insert(
            handle.clone(),
            Entry {
                value: value.clone(),
                count: 1,
            },
        );
        handle
    }

    /// Drop one reference; the entry is removed exactly when the count
    /// reaches zero.
    pub fn release(&mut self, handle: &str) -> Result<()> {
        let entry = self
            .entries
            .get_mut(handle)
            .ok_or_else(|| Error::UnknownReference(handle.to_string()))?;
        if entry.count == 0 {
            // Entries are removed at zero, so this should be unreachable.
            return Err(Error::NegativeRefcount(handle.to_string()));
        }
        entry.count -= 1;
        if entry.count == 0 {
            let identity = entry.value.identity();
            self.entries.remove(handle);
            self.by_identity.remove(&identity);
        }
        Ok(())
    }

    pub fn lookup(&self, handle: &str) -> Result<Value> {
        self.entries
            .get(handle)
            .map(|e| e.value.clone())
            .ok_or_else(|| Error::UnknownReference(handle.to_string()))
    }

    pub fn count(&self, handle: &str) -> Option<u64> {
        self.entries.get(handle).map(|e| e.count)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
