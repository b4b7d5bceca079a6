//! 状态存储 - 业务能力层
//!
//! 每个案件号一份"上一次观测结果"，跨运行保存，用来判断状态是否变化。

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::StoreError;
use crate::models::{ObservedRecord, PersistedState, TrackedIdentifier};

/// 状态存储
///
/// 同一案件号同一时间只会有一个运行在读写（由外部调度保证），不需要加锁。
pub trait StateStore: Send + Sync {
    /// 读取上一次保存的状态，不存在时返回 `None`
    fn load(&self, identifier: &TrackedIdentifier) -> Result<Option<PersistedState>, StoreError>;

    /// 覆盖保存，并记录写入时间
    fn persist(
        &self,
        identifier: &TrackedIdentifier,
        candidate: &ObservedRecord,
    ) -> Result<PersistedState, StoreError>;

    /// 与上一次保存的状态相比是否有变化
    ///
    /// 没有历史状态时总是返回 `true`；比较 `status`、`last_updated_at`、`message`。
    fn has_changed(
        &self,
        identifier: &TrackedIdentifier,
        candidate: &ObservedRecord,
    ) -> Result<bool, StoreError> {
        Ok(changed_against(self.load(identifier)?.as_ref(), candidate))
    }
}

/// 与历史状态比较，没有历史状态时视为已变化
pub fn changed_against(previous: Option<&PersistedState>, candidate: &ObservedRecord) -> bool {
    match previous {
        Some(previous) => candidate.changed_since(&previous.record),
        None => true,
    }
}

/// JSON 文件状态存储
///
/// 每个案件号一个文件：`<dir>/visa_state_<案件号>.json`
pub struct JsonFileStateStore {
    dir: PathBuf,
}

impl JsonFileStateStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// 案件号对应的状态文件路径
    ///
    /// 文件名中只保留字母、数字、`-` 和 `_`
    pub fn path_for(&self, identifier: &TrackedIdentifier) -> PathBuf {
        let safe: String = identifier
            .as_str()
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.dir.join(format!("visa_state_{}.json", safe))
    }
}

impl StateStore for JsonFileStateStore {
    fn load(&self, identifier: &TrackedIdentifier) -> Result<Option<PersistedState>, StoreError> {
        let path = self.path_for(identifier);
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("状态文件不存在: {}", path.display());
                return Ok(None);
            }
            Err(source) => return Err(io_error(&path, source)),
        };

        // 文件损坏时按"没有历史状态"处理，本次运行会重新写入
        match serde_json::from_str(&content) {
            Ok(state) => Ok(Some(state)),
            Err(e) => {
                warn!("⚠️ 状态文件无法解析，视为无历史状态 ({}): {}", path.display(), e);
                Ok(None)
            }
        }
    }

    fn persist(
        &self,
        identifier: &TrackedIdentifier,
        candidate: &ObservedRecord,
    ) -> Result<PersistedState, StoreError> {
        let path = self.path_for(identifier);
        let state = PersistedState::capture(candidate.clone());
        let json = serde_json::to_string_pretty(&state)?;

        fs::create_dir_all(&self.dir).map_err(|source| io_error(&self.dir, source))?;

        // 先写临时文件再改名，避免中途退出留下半个文件
        let tmp_path = path.with_extension("json.tmp");
        fs::write(&tmp_path, json).map_err(|source| io_error(&tmp_path, source))?;
        fs::rename(&tmp_path, &path).map_err(|source| io_error(&path, source))?;

        debug!("状态已保存: {}", path.display());
        Ok(state)
    }
}

fn io_error(path: &Path, source: std::io::Error) -> StoreError {
    StoreError::Io {
        path: path.display().to_string(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id() -> TrackedIdentifier {
        TrackedIdentifier::new("AA00ABCDEF").unwrap()
    }

    fn record(status: &str, updated: &str, message: &str) -> ObservedRecord {
        ObservedRecord {
            status: status.to_string(),
            created_at: "01-Jan-2024".to_string(),
            last_updated_at: updated.to_string(),
            message: message.to_string(),
        }
    }

    #[test]
    fn test_absent_state_always_changed() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStateStore::new(dir.path());

        assert!(store.load(&id()).unwrap().is_none());
        assert!(store
            .has_changed(&id(), &record("Issued", "05-Jan-2024", "Approved"))
            .unwrap());
    }

    #[test]
    fn test_persist_then_compare() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStateStore::new(dir.path());
        let current = record("In Process", "01-Jan-2024", "Pending");

        store.persist(&id(), &current).unwrap();

        assert!(!store.has_changed(&id(), &current).unwrap());
        assert!(store
            .has_changed(&id(), &record("Issued", "01-Jan-2024", "Pending"))
            .unwrap());

        let mut created_moved = current.clone();
        created_moved.created_at = "02-Jan-2024".to_string();
        assert!(!store.has_changed(&id(), &created_moved).unwrap());
    }

    #[test]
    fn test_persist_overwrites_and_restamps() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStateStore::new(dir.path());
        let current = record("In Process", "01-Jan-2024", "Pending");

        let first = store.persist(&id(), &current).unwrap();
        let second = store.persist(&id(), &current).unwrap();

        assert!(second.captured_at >= first.captured_at);
        assert_eq!(store.load(&id()).unwrap().unwrap().record, current);
    }

    #[test]
    fn test_file_layout() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStateStore::new(dir.path());
        store
            .persist(&id(), &record("Issued", "05-Jan-2024", "Approved"))
            .unwrap();

        let path = dir.path().join("visa_state_AA00ABCDEF.json");
        let json: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(json["status"], "Issued");
        assert_eq!(json["lastUpdatedAt"], "05-Jan-2024");
        assert!(json["capturedAt"].is_string());
    }

    #[test]
    fn test_corrupt_file_treated_as_absent() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStateStore::new(dir.path());
        fs::write(store.path_for(&id()), "{ not json").unwrap();

        assert!(store.load(&id()).unwrap().is_none());
        assert!(store
            .has_changed(&id(), &record("Issued", "05-Jan-2024", "Approved"))
            .unwrap());
    }

    #[test]
    fn test_identifier_is_sanitized_for_file_name() {
        let store = JsonFileStateStore::new("/tmp/state");
        let odd = TrackedIdentifier::new("../AA 01").unwrap();

        assert_eq!(
            store.path_for(&odd),
            PathBuf::from("/tmp/state/visa_state____AA_01.json")
        );
    }
}
