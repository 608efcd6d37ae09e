use std::{collections::BTreeSet, sync::Arc};

use crate::dao::models::{ArchiveEntry, ParticipantEntity};

use super::{CacheStore, error::CacheResult};

const COOKIE_CONSENT_ACCEPTED: &str = "accepted";
const LEGACY_ENTRY_PAGE: &str = "event.html";
const ENTRY_PAGE: &str = "questions.html";

/// Cache entries owned by a single device.
#[derive(Clone)]
pub struct DeviceCache {
    store: Arc<CacheStore>,
    prefix: String,
}

impl DeviceCache {
    pub(super) fn new(store: Arc<CacheStore>, device_id: &str) -> Self {
        Self {
            store,
            prefix: format!("device:{device_id}:"),
        }
    }

    fn key(&self, name: &str) -> String {
        format!("{}{}", self.prefix, name)
    }

    /// The participant this device plays in `event_id`.
    pub fn participant(&self, event_id: &str) -> CacheResult<Option<ParticipantEntity>> {
        self.store
            .read_json(&self.key(&format!("participant_{event_id}")))
    }

    pub fn set_participant(&self, event_id: &str, participant: &ParticipantEntity) -> CacheResult<()> {
        self.store
            .write_json(&self.key(&format!("participant_{event_id}")), participant)
    }

    /// Questions this device disables by default when creating events.
    pub fn disabled_questions(&self) -> CacheResult<BTreeSet<usize>> {
        Ok(self
            .store
            .read_json(&self.key("disabledQuestions"))?
            .unwrap_or_default())
    }

    pub fn set_disabled_questions(&self, disabled: &BTreeSet<usize>) -> CacheResult<()> {
        self.store.write_json(&self.key("disabledQuestions"), disabled)
    }

    pub fn cookie_consent(&self) -> CacheResult<bool> {
        Ok(self
            .store
            .raw()
            .get(&self.key("cookieConsent"))?
            .is_some_and(|value| value == COOKIE_CONSENT_ACCEPTED))
    }

    pub fn set_cookie_consent(&self, accepted: bool) -> CacheResult<()> {
        let key = self.key("cookieConsent");
        if accepted {
            self.store.raw().set(&key, COOKIE_CONSENT_ACCEPTED)
        } else {
            self.store.raw().remove(&key)
        }
    }

    /// Events created from this device, most recent first.
    ///
    /// Entries recorded before the entry page was renamed point at the old
    /// page and are rewritten on the way out.
    pub fn archive(&self) -> CacheResult<Vec<ArchiveEntry>> {
        let entries: Vec<ArchiveEntry> = self
            .store
            .read_json(&self.key("eventArchive"))?
            .unwrap_or_default();
        Ok(entries
            .into_iter()
            .map(|mut entry| {
                entry.url = entry.url.replace(LEGACY_ENTRY_PAGE, ENTRY_PAGE);
                entry
            })
            .collect())
    }

    /// Prepend an entry, dropping the oldest beyond the configured limit.
    pub fn push_archive(&self, entry: ArchiveEntry) -> CacheResult<()> {
        let _guard = self.store.lock();
        let mut entries = self.archive()?;
        entries.insert(0, entry);
        entries.truncate(self.store.archive_limit());
        self.store.write_json(&self.key("eventArchive"), &entries)
    }

    /// Remove the entry at `index`, returning it when it existed.
    pub fn remove_archive(&self, index: usize) -> CacheResult<Option<ArchiveEntry>> {
        let _guard = self.store.lock();
        let mut entries = self.archive()?;
        if index >= entries.len() {
            return Ok(None);
        }
        let removed = entries.remove(index);
        self.store.write_json(&self.key("eventArchive"), &entries)?;
        Ok(Some(removed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dao::local_cache::MemoryCache;

    fn entry(id: &str) -> ArchiveEntry {
        ArchiveEntry {
            id: id.into(),
            title: format!("Event {id}"),
            pin: "123456".into(),
            url: format!("http://localhost/questions.html?id={id}"),
            created_at: None,
        }
    }

    #[test]
    fn archive_is_bounded_and_most_recent_first() {
        let store = CacheStore::new(Arc::new(MemoryCache::new()), 5);
        let device = store.device("d1");
        for id in ["a", "b", "c", "d", "e", "f"] {
            device.push_archive(entry(id)).unwrap();
        }

        let ids: Vec<_> = device.archive().unwrap().into_iter().map(|e| e.id).collect();
        assert_eq!(ids, ["f", "e", "d", "c", "b"]);

        let removed = device.remove_archive(1).unwrap().unwrap();
        assert_eq!(removed.id, "e");
        assert!(device.remove_archive(10).unwrap().is_none());
        assert_eq!(device.archive().unwrap().len(), 4);
    }

    #[test]
    fn legacy_archive_urls_point_at_entry_page() {
        let store = CacheStore::new(Arc::new(MemoryCache::new()), 5);
        let device = store.device("d1");
        let mut old = entry("a");
        old.url = "http://localhost/event.html?id=a".into();
        device.push_archive(old).unwrap();

        assert_eq!(
            device.archive().unwrap()[0].url,
            "http://localhost/questions.html?id=a"
        );
    }

    #[test]
    fn devices_do_not_share_entries() {
        let store = CacheStore::new(Arc::new(MemoryCache::new()), 5);
        let first = store.device("d1");
        let second = store.device("d2");

        first.set_cookie_consent(true).unwrap();
        first
            .set_disabled_questions(&BTreeSet::from([1, 3]))
            .unwrap();

        assert!(first.cookie_consent().unwrap());
        assert!(!second.cookie_consent().unwrap());
        assert!(second.disabled_questions().unwrap().is_empty());
        assert_eq!(first.disabled_questions().unwrap(), BTreeSet::from([1, 3]));

        first.set_cookie_consent(false).unwrap();
        assert!(!first.cookie_consent().unwrap());
    }
}
