//! Chat storage clearing
//!
//! Removes every trace the chat widget leaves in the page's storage tiers
//! and drops its structured databases, so the next chat starts anonymous.

use super::{BrowserStorage, KeyValueStore, StorageError};
use crate::config::ChatStorageConfig;

/// What one clearing pass removed.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ClearReport {
    pub local_cleared: usize,
    pub session_cleared: usize,
    pub databases_deleted: Vec<String>,
}

impl ClearReport {
    /// Total number of keys and databases removed.
    pub fn total(&self) -> usize {
        self.local_cleared + self.session_cleared + self.databases_deleted.len()
    }
}

/// Clear chat-related keys from both tiers and drop the chat databases.
///
/// A tier that refuses access is skipped; the other tier and the
/// database step still run. Running it again on cleared storage removes
/// nothing.
pub fn clear_chat_storage(storage: &mut BrowserStorage, rules: &ChatStorageConfig) -> ClearReport {
    tracing::info!("Clearing chat storage...");
    let mut report = ClearReport::default();

    match clear_tier(storage.local.as_mut(), rules) {
        Ok(n) => report.local_cleared = n,
        Err(e) => tracing::warn!("Could not clear local storage: {}", e),
    }
    match clear_tier(storage.session.as_mut(), rules) {
        Ok(n) => report.session_cleared = n,
        Err(e) => tracing::warn!("Could not clear session storage: {}", e),
    }

    for name in &rules.databases {
        match storage.databases.delete_database(name) {
            Ok(()) => {
                tracing::debug!("Deleted database {}", name);
                report.databases_deleted.push(name.clone());
            }
            Err(e) => tracing::debug!("Could not delete database {} ({})", name, e),
        }
    }

    if report.local_cleared + report.session_cleared == 0 {
        tracing::debug!("No storage keys matched the chat rules");
    }
    tracing::info!(
        "Cleared {} local, {} session keys and {} databases",
        report.local_cleared,
        report.session_cleared,
        report.databases_deleted.len()
    );
    report
}

fn clear_tier(
    store: &mut dyn KeyValueStore,
    rules: &ChatStorageConfig,
) -> Result<usize, StorageError> {
    let keys = store.keys()?;
    tracing::debug!("Scanning {} keys", keys.len());

    let mut cleared = 0;
    for key in keys {
        if !is_chat_entry(store, &key, rules) {
            continue;
        }
        match store.remove(&key) {
            Ok(()) => {
                tracing::debug!("Cleared key {}", key);
                cleared += 1;
            }
            Err(e) => tracing::warn!("Could not remove key {}: {}", key, e),
        }
    }
    Ok(cleared)
}

fn is_chat_entry(store: &dyn KeyValueStore, key: &str, rules: &ChatStorageConfig) -> bool {
    if rules.key_matches(key) {
        return true;
    }
    // Unreadable values simply don't match
    match store.get(key) {
        Ok(Some(value)) if rules.value_matches(&value) => {
            tracing::debug!("Found chat context in value of key {}", key);
            true
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{MemoryDatabases, MemoryStore};

    fn seeded_storage() -> BrowserStorage {
        let mut local = MemoryStore::new();
        local.set("oc-lcw-widget-state", "{}").unwrap();
        local.set("MsOmnichannelSession", "x").unwrap();
        local.set("persisted-chat", r#"{"liveChatContext":{"chatId":"1"}}"#).unwrap();
        local.set("theme", "dark").unwrap();
        local.set("auth-return-url", "/index.html").unwrap();

        let mut session = MemoryStore::new();
        session.set("livechat-draft", "hello").unwrap();
        session.set("blob", r#"{"domainStates":[]}"#).unwrap();
        session.set("tab", "2").unwrap();

        BrowserStorage {
            local: Box::new(local),
            session: Box::new(session),
            databases: Box::new(MemoryDatabases::with(&["msal.db", "OmnichannelDB"])),
        }
    }

    #[test]
    fn test_clears_by_key_and_value() {
        let mut storage = seeded_storage();
        let report = clear_chat_storage(&mut storage, &ChatStorageConfig::default());

        assert_eq!(report.local_cleared, 3);
        assert_eq!(report.session_cleared, 2);
        assert_eq!(report.databases_deleted, vec!["msal.db", "OmnichannelDB"]);
        assert_eq!(
            storage.local.keys().unwrap(),
            vec!["auth-return-url".to_string(), "theme".to_string()]
        );
        assert_eq!(storage.session.keys().unwrap(), vec!["tab".to_string()]);
    }

    #[test]
    fn test_second_pass_removes_nothing() {
        let mut storage = seeded_storage();
        let rules = ChatStorageConfig::default();
        let first = clear_chat_storage(&mut storage, &rules);
        assert!(first.total() > 0);

        let second = clear_chat_storage(&mut storage, &rules);
        assert_eq!(second, ClearReport::default());
        assert_eq!(second.total(), 0);
    }

    #[test]
    fn test_denied_tier_is_skipped() {
        let mut session = MemoryStore::new();
        session.set("chatToken", "abc").unwrap();
        let mut storage = BrowserStorage {
            local: Box::new(MemoryStore::denied()),
            session: Box::new(session),
            databases: Box::new(MemoryDatabases::with(&["LiveChatWidgetDB"])),
        };

        let report = clear_chat_storage(&mut storage, &ChatStorageConfig::default());
        assert_eq!(report.local_cleared, 0);
        assert_eq!(report.session_cleared, 1);
        assert_eq!(report.databases_deleted, vec!["LiveChatWidgetDB"]);
    }

    #[test]
    fn test_empty_storage_is_fine() {
        let mut storage = BrowserStorage {
            local: Box::new(MemoryStore::new()),
            session: Box::new(MemoryStore::new()),
            databases: Box::new(MemoryDatabases::default()),
        };
        let report = clear_chat_storage(&mut storage, &ChatStorageConfig::default());
        assert_eq!(report.total(), 0);
    }
}
