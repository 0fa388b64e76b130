//! C9: the static task context store.
//!
//! A per-task persistent key-value map, loaded from a single JSON file at
//! startup (a missing or unreadable file is treated as empty, not fatal)
//! and debounce-serialized back to that file on mutation (I9). Step bodies
//! interact with their task's slice exclusively through [`TaskContextHandle`]
//! — never with the underlying map directly, so every write goes through
//! the same debounce path instead of racing the serializer.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use serde_json::{Map, Value};
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;

use crate::error::ContextStoreError;

type TaskKey = String;
type TaskMap = Map<String, Value>;

/// `{ "<ClassName>_<TaskName>": { <string>: <any JSON> } }`, per spec §6.
fn task_key(type_name: &str, task_name: &str) -> TaskKey {
    format!("{type_name}_{task_name}")
}

/// Backing store shared by every task's [`TaskContextHandle`].
pub struct StaticContextStore {
    path: PathBuf,
    serialize_interval: Duration,
    data: Arc<RwLock<HashMap<TaskKey, TaskMap>>>,
    pending_save: AsyncMutex<Option<JoinHandle<()>>>,
}

impl StaticContextStore {
    /// Best-effort load: a missing or malformed file yields an empty store.
    pub async fn load(path: impl Into<PathBuf>, serialize_interval: Duration) -> Arc<Self> {
        let path = path.into();
        let data = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice::<HashMap<TaskKey, TaskMap>>(&bytes)
                .unwrap_or_default(),
            Err(_) => HashMap::new(),
        };

        Arc::new(Self {
            path,
            serialize_interval,
            data: Arc::new(RwLock::new(data)),
            pending_save: AsyncMutex::new(None),
        })
    }

    /// A handle scoped to one task's slice of the map, creating it if
    /// absent.
    pub fn handle_for(self: &Arc<Self>, type_name: &str, task_name: &str) -> TaskContextHandle {
        let key = task_key(type_name, task_name);
        self.data.write().entry(key.clone()).or_default();
        TaskContextHandle {
            store: self.clone(),
            key,
        }
    }

    fn snapshot(&self) -> HashMap<TaskKey, TaskMap> {
        self.data.read().clone()
    }

    /// Schedule a debounced save: a pending timer is cancelled and replaced
    /// on every call, so a burst of writes collapses to at most one disk
    /// write after `serialize_interval` of quiet (I9 / P6).
    async fn schedule_save(self: &Arc<Self>) {
        let mut pending = self.pending_save.lock().await;
        if let Some(handle) = pending.take() {
            handle.abort();
        }

        let this = self.clone();
        let interval = self.serialize_interval;
        *pending = Some(tokio::spawn(async move {
            tokio::time::sleep(interval).await;
            let _ = this.save_now().await;
        }));
    }

    /// Synchronous (awaited) save, used for the debounce firing and for the
    /// final flush on shutdown. Writes atomically via a temp file + rename.
    pub async fn save_now(&self) -> Result<(), ContextStoreError> {
        let snapshot = self.snapshot();
        let bytes = serde_json::to_vec_pretty(&snapshot).map_err(ContextStoreError::Serialize)?;

        let tmp_path = tmp_path_for(&self.path);
        tokio::fs::write(&tmp_path, &bytes)
            .await
            .map_err(|source| ContextStoreError::Write {
                path: tmp_path.display().to_string(),
                source,
            })?;
        tokio::fs::rename(&tmp_path, &self.path)
            .await
            .map_err(|source| ContextStoreError::Write {
                path: self.path.display().to_string(),
                source,
            })?;
        Ok(())
    }

    /// Cancel any pending debounce timer and perform one final synchronous
    /// save, called during engine shutdown.
    pub async fn shutdown(self: &Arc<Self>) -> Result<(), ContextStoreError> {
        let mut pending = self.pending_save.lock().await;
        if let Some(handle) = pending.take() {
            handle.abort();
        }
        self.save_now().await
    }
}

fn tmp_path_for(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Observable proxy over one task's slice of the store.
///
/// Every `set` triggers the debounce timer; `get`/`snapshot` read directly.
#[derive(Clone)]
pub struct TaskContextHandle {
    store: Arc<StaticContextStore>,
    key: TaskKey,
}

impl TaskContextHandle {
    pub fn get(&self, field: &str) -> Option<Value> {
        self.store
            .data
            .read()
            .get(&self.key)
            .and_then(|m| m.get(field))
            .cloned()
    }

    pub fn snapshot(&self) -> TaskMap {
        self.store
            .data
            .read()
            .get(&self.key)
            .cloned()
            .unwrap_or_default()
    }

    /// Set a field and schedule a debounced save.
    pub async fn set(&self, field: impl Into<String>, value: Value) {
        {
            let mut data = self.store.data.write();
            data.entry(self.key.clone())
                .or_default()
                .insert(field.into(), value);
        }
        self.store.schedule_save().await;
    }

    pub fn remove_sync(&self, field: &str) {
        if let Some(map) = self.store.data.write().get_mut(&self.key) {
            map.remove(field);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile_shim::temp_file_path;

    mod tempfile_shim {
        use std::path::PathBuf;
        use std::sync::atomic::{AtomicU64, Ordering};

        static COUNTER: AtomicU64 = AtomicU64::new(0);

        pub fn temp_file_path(name: &str) -> PathBuf {
            let n = COUNTER.fetch_add(1, Ordering::Relaxed);
            std::env::temp_dir().join(format!("cameleer-ctx-test-{name}-{n}.json"))
        }
    }

    #[tokio::test]
    async fn missing_file_loads_empty() {
        let path = temp_file_path("missing");
        let store = StaticContextStore::load(&path, Duration::from_millis(10)).await;
        assert!(store.snapshot().is_empty());
    }

    #[tokio::test]
    async fn set_is_visible_immediately_and_debounces_to_one_write() {
        let path = temp_file_path("debounce");
        let store = StaticContextStore::load(&path, Duration::from_millis(30)).await;
        let handle = store.handle_for("Task", "my_task");

        handle.set("a", json!(1)).await;
        handle.set("a", json!(2)).await;
        handle.set("b", json!(3)).await;

        // Reads are synchronous/in-memory regardless of debounce.
        assert_eq!(handle.get("a"), Some(json!(2)));
        assert_eq!(handle.get("b"), Some(json!(3)));

        tokio::time::sleep(Duration::from_millis(80)).await;

        let on_disk = tokio::fs::read(&path).await.expect("file written");
        let parsed: HashMap<String, TaskMap> = serde_json::from_slice(&on_disk).unwrap();
        assert_eq!(parsed["Task_my_task"]["a"], json!(2));
        assert_eq!(parsed["Task_my_task"]["b"], json!(3));

        let _ = tokio::fs::remove_file(&path).await;
    }

    #[tokio::test]
    async fn shutdown_flushes_pending_write() {
        let path = temp_file_path("shutdown");
        let store = StaticContextStore::load(&path, Duration::from_secs(60)).await;
        let handle = store.handle_for("Task", "t");
        handle.set("x", json!(true)).await;

        store.shutdown().await.expect("shutdown save succeeds");

        let on_disk = tokio::fs::read(&path).await.expect("file written");
        let parsed: HashMap<String, TaskMap> = serde_json::from_slice(&on_disk).unwrap();
        assert_eq!(parsed["Task_t"]["x"], json!(true));

        let _ = tokio::fs::remove_file(&path).await;
    }
}
