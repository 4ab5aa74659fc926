//! Import task records and the in-memory registry clients poll.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

pub const MSG_COUNTING_LOCAL: &str = "正在统计本地文件数量...";
pub const MSG_COUNTING_WEBDAV_MUSIC: &str = "正在统计 WebDAV 音乐文件...";
pub const MSG_COUNTING_WEBDAV_AUDIOBOOK: &str = "正在统计 WebDAV 有声书文件...";
pub const MSG_PARSING: &str = "正在解析媒体文件...";
pub const MSG_SWEEPING: &str = "正在清理已失效数据...";
pub const MSG_COMPACTING: &str = "正在整理曲库...";
pub const MSG_DONE: &str = "导入完成";

/// Lifecycle of an import task. SUCCESS and FAILED are final.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TaskStatus {
    Initializing,
    Preparing,
    Parsing,
    Success,
    Failed,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Success | TaskStatus::Failed)
    }
}

/// What an import run does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ImportMode {
    /// Scan every source; tracks not seen are left alone
    #[default]
    Incremental,
    /// Scan every source, then trash tracks that were not seen
    Full,
    /// Maintenance only: episode numbers, fingerprints, statuses
    Compact,
}

/// Progress snapshot of one import run, as returned to pollers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportTask {
    pub id: String,
    pub status: TaskStatus,
    pub message: Option<String>,
    pub mode: ImportMode,
    pub total: usize,
    pub current: usize,
    pub local_total: usize,
    pub local_current: usize,
    pub webdav_total: usize,
    pub webdav_current: usize,
    pub current_file_name: Option<String>,
}

impl ImportTask {
    pub fn new(id: String, mode: ImportMode) -> Self {
        Self {
            id,
            status: TaskStatus::Initializing,
            message: None,
            mode,
            total: 0,
            current: 0,
            local_total: 0,
            local_current: 0,
            webdav_total: 0,
            webdav_current: 0,
            current_file_name: None,
        }
    }

    /// Whether the task counts as running for [`TaskRegistry::running`].
    pub fn is_running(&self) -> bool {
        !self.status.is_terminal()
    }
}

/// Every task created by this process, in creation order.
///
/// Nothing is persisted; tasks live until the process exits.
#[derive(Debug, Default)]
pub struct TaskRegistry {
    tasks: RwLock<Vec<ImportTask>>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, task: ImportTask) {
        self.tasks.write().push(task);
    }

    pub fn get(&self, id: &str) -> Option<ImportTask> {
        self.tasks.read().iter().find(|t| t.id == id).cloned()
    }

    /// Apply `f` to a task. Finished tasks are immutable: returns false
    /// without calling `f` for them and for unknown ids.
    pub fn update(&self, id: &str, f: impl FnOnce(&mut ImportTask)) -> bool {
        let mut tasks = self.tasks.write();
        match tasks.iter_mut().find(|t| t.id == id) {
            Some(task) if !task.status.is_terminal() => {
                f(task);
                true
            }
            _ => false,
        }
    }

    /// The oldest task that has not finished.
    pub fn running(&self) -> Option<ImportTask> {
        self.tasks.read().iter().find(|t| t.is_running()).cloned()
    }

    pub fn all(&self) -> Vec<ImportTask> {
        self.tasks.read().clone()
    }
}
