//! Browser-style key-value storage tiers
//!
//! A page has two string-valued stores: a session-scoped one and a
//! longer-lived one. Both are modelled by [`KeyValueStore`]. Named
//! structured databases (IndexedDB in a browser) are modelled by
//! [`DatabaseStore`], which only needs to support deletion here.

pub mod clear;
pub mod file;

pub use clear::{clear_chat_storage, ClearReport};
pub use file::{DirDatabases, FileStore};

/// Errors raised by a storage tier or database store.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("storage access denied: {0}")]
    Denied(String),
    #[error("no such database: {0}")]
    NotFound(String),
    #[error("storage corrupt: {0}")]
    Corrupt(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// One string-valued key-value storage tier.
pub trait KeyValueStore {
    /// All keys currently present, in a stable order.
    fn keys(&self) -> Result<Vec<String>, StorageError>;
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;
    fn set(&mut self, key: &str, value: &str) -> Result<(), StorageError>;
    /// Remove a key. Removing an absent key is not an error.
    fn remove(&mut self, key: &str) -> Result<(), StorageError>;
}

/// Named structured databases that can be dropped wholesale.
pub trait DatabaseStore {
    /// Delete the named database. Fails with [`StorageError::NotFound`]
    /// when it does not exist.
    fn delete_database(&mut self, name: &str) -> Result<(), StorageError>;
}

/// Both storage tiers plus the database store of one page.
pub struct BrowserStorage {
    /// Long-lived store (markers live here).
    pub local: Box<dyn KeyValueStore>,
    /// Session-scoped store.
    pub session: Box<dyn KeyValueStore>,
    pub databases: Box<dyn DatabaseStore>,
}

/// In-memory storage tier, used by tests.
///
/// `denied` makes every call fail, mimicking a browser that blocks storage.
#[cfg(test)]
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    entries: std::collections::BTreeMap<String, String>,
    denied: bool,
}

#[cfg(test)]
impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store whose every access fails with [`StorageError::Denied`].
    pub fn denied() -> Self {
        Self {
            entries: std::collections::BTreeMap::new(),
            denied: true,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    fn check(&self) -> Result<(), StorageError> {
        if self.denied {
            return Err(StorageError::Denied("memory store".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
impl KeyValueStore for MemoryStore {
    fn keys(&self) -> Result<Vec<String>, StorageError> {
        self.check()?;
        Ok(self.entries.keys().cloned().collect())
    }

    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        self.check()?;
        Ok(self.entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StorageError> {
        self.check()?;
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), StorageError> {
        self.check()?;
        self.entries.remove(key);
        Ok(())
    }
}

/// In-memory database store, used by tests.
#[cfg(test)]
#[derive(Debug, Default)]
pub struct MemoryDatabases {
    pub present: std::collections::BTreeSet<String>,
    pub deleted: Vec<String>,
}

#[cfg(test)]
impl MemoryDatabases {
    pub fn with(names: &[&str]) -> Self {
        Self {
            present: names.iter().map(|n| n.to_string()).collect(),
            deleted: Vec::new(),
        }
    }
}

#[cfg(test)]
impl DatabaseStore for MemoryDatabases {
    fn delete_database(&mut self, name: &str) -> Result<(), StorageError> {
        if self.present.remove(name) {
            self.deleted.push(name.to_string());
            Ok(())
        } else {
            Err(StorageError::NotFound(name.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_store_set_get_remove() {
        let mut store = MemoryStore::new();
        store.set("a", "1").unwrap();
        assert_eq!(store.get("a").unwrap().as_deref(), Some("1"));
        store.remove("a").unwrap();
        assert_eq!(store.get("a").unwrap(), None);
        // Removing again is fine.
        store.remove("a").unwrap();
    }

    #[test]
    fn test_memory_store_denied() {
        let mut store = MemoryStore::denied();
        assert!(matches!(store.keys(), Err(StorageError::Denied(_))));
        assert!(store.set("a", "1").is_err());
    }

    #[test]
    fn test_memory_databases_missing_is_not_found() {
        let mut dbs = MemoryDatabases::with(&["msal.db"]);
        dbs.delete_database("msal.db").unwrap();
        assert!(matches!(
            dbs.delete_database("msal.db"),
            Err(StorageError::NotFound(_))
        ));
    }
}
