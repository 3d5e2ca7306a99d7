//! JSON-file-backed storage, so separate processes can stand in for separate
//! tabs. Each process polls the file and turns changes made by others into
//! `StorageEvent`s, the same way a browser announces writes from other tabs.

use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use fs2::FileExt;
use parking_lot::Mutex;
use rand::Rng;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use crate::storage::{SharedStorage, Storage, StorageEvent, StorageListener, Subscribers, Subscription};

type Items = BTreeMap<String, String>;

// every handle's own listeners share this origin; polled changes carry none
const OWN_ORIGIN: u64 = 0;

pub struct FileStorage {
    path: PathBuf,
    // what this handle last wrote or observed; the poller diffs against it
    last_seen: Mutex<Items>,
    subscribers: Subscribers,
}

impl FileStorage {
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let last_seen = read_items(&path);
        Self {
            path,
            last_seen: Mutex::new(last_seen),
            subscribers: Subscribers::default(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the file once and announces whatever other writers changed since
    /// the last look. Returns the number of events dispatched.
    pub fn poll(&self) -> usize {
        let current = read_items(&self.path);
        let events = {
            let mut last_seen = self.last_seen.lock();
            let events = diff(&last_seen, &current);
            *last_seen = current;
            events
        };
        for event in &events {
            debug!("📨 Storage change from another process: {:?}", event.key);
            self.subscribers.dispatch(None, event);
        }
        events.len()
    }

    /// Polls the file every `period` until the returned handle is dropped.
    pub fn watch(self: &Arc<Self>, period: Duration) -> WatchHandle {
        let storage = Arc::downgrade(self);
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(storage) = storage.upgrade() else {
                    break;
                };
                storage.poll();
            }
        });
        WatchHandle { task }
    }

    fn update<F>(&self, change: F)
    where
        F: FnOnce(&mut Items),
    {
        let foreign = {
            let mut last_seen = self.last_seen.lock();
            // held across read, change and rename so concurrent writers
            // in other processes cannot drop each other's keys
            let _lock = match StoreLock::exclusive(&self.path) {
                Ok(lock) => Some(lock),
                Err(err) => {
                    warn!("⚠️ Failed to lock {}: {}", self.path.display(), err);
                    None
                }
            };
            let mut items = read_unlocked(&self.path);
            // changes other writers made since our last look still get announced
            let foreign = diff(&last_seen, &items);
            change(&mut items);
            if let Err(err) = write_items(&self.path, &items) {
                warn!("⚠️ Failed to write {}: {}", self.path.display(), err);
            }
            *last_seen = items;
            foreign
        };
        for event in &foreign {
            self.subscribers.dispatch(None, event);
        }
    }
}

impl Storage for FileStorage {
    fn get_item(&self, key: &str) -> Option<String> {
        read_items(&self.path).get(key).cloned()
    }

    fn set_item(&self, key: &str, value: &str) {
        self.update(|items| {
            items.insert(key.to_string(), value.to_string());
        });
    }

    fn remove_item(&self, key: &str) {
        self.update(|items| {
            items.remove(key);
        });
    }

    fn clear(&self) {
        self.update(|items| items.clear());
    }

    fn keys(&self) -> Vec<String> {
        read_items(&self.path).keys().cloned().collect()
    }
}

impl SharedStorage for FileStorage {
    fn subscribe(&self, listener: StorageListener) -> Subscription {
        self.subscribers.add(OWN_ORIGIN, listener)
    }
}

#[must_use = "dropping a WatchHandle stops polling"]
pub struct WatchHandle {
    task: JoinHandle<()>,
}

impl Drop for WatchHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

fn diff(before: &Items, after: &Items) -> Vec<StorageEvent> {
    if after.is_empty() && !before.is_empty() {
        return vec![StorageEvent {
            key: None,
            old_value: None,
            new_value: None,
        }];
    }
    let mut events = Vec::new();
    for (key, old) in before {
        if !after.contains_key(key) {
            events.push(StorageEvent {
                key: Some(key.clone()),
                old_value: Some(old.clone()),
                new_value: None,
            });
        }
    }
    for (key, new) in after {
        let old = before.get(key);
        if old != Some(new) {
            events.push(StorageEvent {
                key: Some(key.clone()),
                old_value: old.cloned(),
                new_value: Some(new.clone()),
            });
        }
    }
    events
}

/// Advisory lock on a `<file>.lock` sidecar. The data file itself is replaced
/// by rename on every write, so it cannot carry the lock.
struct StoreLock {
    file: File,
}

impl StoreLock {
    fn shared(path: &Path) -> io::Result<Self> {
        let file = Self::open(path)?;
        FileExt::lock_shared(&file)?;
        Ok(Self { file })
    }

    fn exclusive(path: &Path) -> io::Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = Self::open(path)?;
        FileExt::lock_exclusive(&file)?;
        Ok(Self { file })
    }

    fn open(path: &Path) -> io::Result<File> {
        OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(lock_path(path))
    }
}

impl Drop for StoreLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

fn lock_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".lock");
    PathBuf::from(name)
}

fn read_items(path: &Path) -> Items {
    let _lock = match StoreLock::shared(path) {
        Ok(lock) => Some(lock),
        // no directory yet means no data yet
        Err(err) if err.kind() == ErrorKind::NotFound => None,
        Err(err) => {
            warn!("⚠️ Failed to lock {}: {}", path.display(), err);
            None
        }
    };
    read_unlocked(path)
}

fn read_unlocked(path: &Path) -> Items {
    match fs::read_to_string(path) {
        Ok(raw) if raw.trim().is_empty() => Items::new(),
        Ok(raw) => serde_json::from_str(&raw).unwrap_or_else(|err| {
            warn!("⚠️ Ignoring unreadable storage file {}: {}", path.display(), err);
            Items::new()
        }),
        Err(err) if err.kind() == ErrorKind::NotFound => Items::new(),
        Err(err) => {
            warn!("⚠️ Failed to read {}: {}", path.display(), err);
            Items::new()
        }
    }
}

fn write_items(path: &Path, items: &Items) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let raw = serde_json::to_string_pretty(items)?;
    let suffix: u32 = rand::thread_rng().gen();
    let tmp = path.with_extension(format!("{}.{suffix:08x}.tmp", std::process::id()));
    fs::write(&tmp, raw)?;
    fs::rename(&tmp, path).inspect_err(|_| {
        let _ = fs::remove_file(&tmp);
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recorder() -> (StorageListener, Arc<Mutex<Vec<StorageEvent>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let listener: StorageListener = Arc::new(move |event: &StorageEvent| {
            sink.lock().push(event.clone());
        });
        (listener, seen)
    }

    #[test]
    fn handles_share_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("local.json");
        let first = FileStorage::open(&path);
        let second = FileStorage::open(&path);

        first.set_item("activeUser_w", "Ada");
        assert_eq!(second.get_item("activeUser_w").as_deref(), Some("Ada"));
        assert_eq!(second.keys(), vec!["activeUser_w".to_string()]);
    }

    #[test]
    fn poll_reports_other_writers_only() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("local.json");
        let writer = FileStorage::open(&path);
        let reader = FileStorage::open(&path);
        let (own_listener, own_seen) = recorder();
        let (listener, seen) = recorder();
        let _own = writer.subscribe(own_listener);
        let _sub = reader.subscribe(listener);

        writer.set_item("activeTab_w", "tab_2");
        assert_eq!(writer.poll(), 0);
        assert_eq!(reader.poll(), 1);
        assert_eq!(reader.poll(), 0);

        assert!(own_seen.lock().is_empty());
        let events = seen.lock().clone();
        assert_eq!(events[0].key.as_deref(), Some("activeTab_w"));
        assert_eq!(events[0].new_value.as_deref(), Some("tab_2"));
    }

    #[test]
    fn removal_and_clear_are_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("local.json");
        let writer = FileStorage::open(&path);
        writer.set_item("a", "1");
        writer.set_item("b", "2");
        let reader = FileStorage::open(&path);
        let (listener, seen) = recorder();
        let _sub = reader.subscribe(listener);

        writer.remove_item("a");
        reader.poll();
        writer.clear();
        reader.poll();

        let events = seen.lock().clone();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].key.as_deref(), Some("a"));
        assert_eq!(events[0].new_value, None);
        assert_eq!(events[1].key, None);
    }

    #[test]
    fn garbage_file_reads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("local.json");
        fs::write(&path, "{ not json").unwrap();
        let storage = FileStorage::open(&path);
        assert_eq!(storage.get_item("a"), None);
        storage.set_item("a", "1");
        assert_eq!(storage.get_item("a").as_deref(), Some("1"));
    }

    #[test]
    fn writes_take_a_sidecar_lock() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("local.json");
        let storage = FileStorage::open(&path);
        assert_eq!(storage.get_item("a"), None);

        storage.set_item("a", "1");

        assert!(dir.path().join("nested").join("local.json.lock").exists());
        let leftovers: Vec<_> = fs::read_dir(dir.path().join("nested"))
            .unwrap()
            .filter_map(Result::ok)
            .filter(|entry| entry.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn failed_rename_leaves_no_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        // a directory in the way makes the final rename fail
        let path = dir.path().join("local.json");
        fs::create_dir(&path).unwrap();
        fs::write(path.join("occupied"), "x").unwrap();

        assert!(write_items(&path, &Items::new()).is_err());

        let temps = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(Result::ok)
            .filter(|entry| entry.file_name().to_string_lossy().ends_with(".tmp"))
            .count();
        assert_eq!(temps, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn watcher_delivers_changes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("local.json");
        let writer = FileStorage::open(&path);
        let reader = Arc::new(FileStorage::open(&path));
        let (listener, seen) = recorder();
        let _sub = reader.subscribe(listener);
        let _watch = reader.watch(Duration::from_millis(250));

        writer.set_item("forceLogout_w", "123");
        tokio::time::sleep(Duration::from_millis(600)).await;

        assert_eq!(seen.lock().len(), 1);
    }
}
