//! Project persistence.
//!
//! [`ProjectStore`] is the persistence collaborator: whole-project save/load
//! plus an undo/redo snapshot log keyed by project, direction, and a
//! monotonic sequence number. [`FsProjectStore`] lays it out on disk:
//!
//! ```text
//! <root>/<project id>/meta/project.json
//! <root>/<project id>/history/past/<seq>.json
//! <root>/<project id>/history/future/<seq>.json
//! ```

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::history::DEFAULT_HISTORY_CAPACITY;
use crate::project::{Project, ProjectError};

/// Which history stack a snapshot belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HistoryDirection {
    Past,
    Future,
}

impl HistoryDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            HistoryDirection::Past => "past",
            HistoryDirection::Future => "future",
        }
    }
}

/// Storage for projects and their history snapshots.
pub trait ProjectStore: Send + Sync {
    /// Save a project. With `id = None` a fresh id is assigned.
    /// Returns the id it was stored under.
    fn save(&self, id: Option<&str>, project: &Project) -> Result<String, ProjectError>;

    fn load(&self, id: &str) -> Result<Project, ProjectError>;

    /// Store a snapshot, pruning the oldest past the retention limit.
    fn put_snapshot(
        &self,
        project_id: &str,
        direction: HistoryDirection,
        seq: u64,
        project: &Project,
    ) -> Result<(), ProjectError>;

    fn get_snapshot(
        &self,
        project_id: &str,
        direction: HistoryDirection,
        seq: u64,
    ) -> Result<Option<Project>, ProjectError>;

    /// Stored sequence numbers, ascending.
    fn list_snapshots(
        &self,
        project_id: &str,
        direction: HistoryDirection,
    ) -> Result<Vec<u64>, ProjectError>;

    fn clear_snapshots(
        &self,
        project_id: &str,
        direction: HistoryDirection,
    ) -> Result<(), ProjectError>;
}

/// Filesystem-backed store.
#[derive(Debug, Clone)]
pub struct FsProjectStore {
    root: PathBuf,
    retention: usize,
}

impl FsProjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            retention: DEFAULT_HISTORY_CAPACITY,
        }
    }

    pub fn with_retention(mut self, retention: usize) -> Self {
        self.retention = retention.max(1);
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn project_dir(&self, id: &str) -> PathBuf {
        self.root.join(id)
    }

    fn project_file(&self, id: &str) -> PathBuf {
        self.project_dir(id).join("meta").join("project.json")
    }

    fn history_dir(&self, id: &str, direction: HistoryDirection) -> PathBuf {
        self.project_dir(id).join("history").join(direction.as_str())
    }

    /// Ids of every stored project.
    pub fn list_projects(&self) -> Result<Vec<String>, ProjectError> {
        if !self.root.exists() {
            return Ok(vec![]);
        }
        let entries = std::fs::read_dir(&self.root).map_err(|e| io_err(&self.root, e))?;
        let mut ids = vec![];
        for entry in entries {
            let entry = entry.map_err(|e| io_err(&self.root, e))?;
            let path = entry.path();
            if path.join("meta").join("project.json").exists() {
                if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                    ids.push(name.to_string());
                }
            }
        }
        ids.sort();
        Ok(ids)
    }
}

impl ProjectStore for FsProjectStore {
    fn save(&self, id: Option<&str>, project: &Project) -> Result<String, ProjectError> {
        let id = id.map(str::to_string).unwrap_or_else(crate::new_id);
        validate_id(&id)?;

        let mut stored = project.clone();
        stored.id = id.clone();
        write_json(&self.project_file(&id), &stored)?;
        tracing::debug!(project_id = %id, "Saved project");
        Ok(id)
    }

    fn load(&self, id: &str) -> Result<Project, ProjectError> {
        validate_id(id)?;
        let path = self.project_file(id);
        if !path.exists() {
            return Err(ProjectError::NotFound { id: id.to_string() });
        }
        read_json(&path)
    }

    fn put_snapshot(
        &self,
        project_id: &str,
        direction: HistoryDirection,
        seq: u64,
        project: &Project,
    ) -> Result<(), ProjectError> {
        validate_id(project_id)?;
        let dir = self.history_dir(project_id, direction);
        write_json(&dir.join(format!("{seq}.json")), project)?;

        let stored = self.list_snapshots(project_id, direction)?;
        if stored.len() > self.retention {
            for old in &stored[..stored.len() - self.retention] {
                let path = dir.join(format!("{old}.json"));
                std::fs::remove_file(&path).map_err(|e| io_err(&path, e))?;
                tracing::trace!(project_id, seq = old, "Pruned history snapshot");
            }
        }
        Ok(())
    }

    fn get_snapshot(
        &self,
        project_id: &str,
        direction: HistoryDirection,
        seq: u64,
    ) -> Result<Option<Project>, ProjectError> {
        validate_id(project_id)?;
        let path = self
            .history_dir(project_id, direction)
            .join(format!("{seq}.json"));
        if !path.exists() {
            return Ok(None);
        }
        read_json(&path).map(Some)
    }

    fn list_snapshots(
        &self,
        project_id: &str,
        direction: HistoryDirection,
    ) -> Result<Vec<u64>, ProjectError> {
        validate_id(project_id)?;
        let dir = self.history_dir(project_id, direction);
        if !dir.exists() {
            return Ok(vec![]);
        }
        let mut seqs = vec![];
        for entry in std::fs::read_dir(&dir).map_err(|e| io_err(&dir, e))? {
            let entry = entry.map_err(|e| io_err(&dir, e))?;
            let name = entry.file_name();
            if let Some(seq) = name
                .to_str()
                .and_then(|n| n.strip_suffix(".json"))
                .and_then(|n| n.parse::<u64>().ok())
            {
                seqs.push(seq);
            }
        }
        seqs.sort_unstable();
        Ok(seqs)
    }

    fn clear_snapshots(
        &self,
        project_id: &str,
        direction: HistoryDirection,
    ) -> Result<(), ProjectError> {
        validate_id(project_id)?;
        let dir = self.history_dir(project_id, direction);
        if dir.exists() {
            std::fs::remove_dir_all(&dir).map_err(|e| io_err(&dir, e))?;
        }
        Ok(())
    }
}

/// In-memory store, for tests and ephemeral sessions.
#[derive(Debug)]
pub struct MemoryProjectStore {
    projects: Mutex<HashMap<String, Project>>,
    snapshots: Mutex<HashMap<(String, HistoryDirection), BTreeMap<u64, Project>>>,
    retention: usize,
}

impl MemoryProjectStore {
    pub fn new() -> Self {
        Self::with_retention(DEFAULT_HISTORY_CAPACITY)
    }

    pub fn with_retention(retention: usize) -> Self {
        Self {
            projects: Mutex::new(HashMap::new()),
            snapshots: Mutex::new(HashMap::new()),
            retention: retention.max(1),
        }
    }
}

impl Default for MemoryProjectStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ProjectStore for MemoryProjectStore {
    fn save(&self, id: Option<&str>, project: &Project) -> Result<String, ProjectError> {
        let id = id.map(str::to_string).unwrap_or_else(crate::new_id);
        let mut stored = project.clone();
        stored.id = id.clone();
        lock(&self.projects)?.insert(id.clone(), stored);
        Ok(id)
    }

    fn load(&self, id: &str) -> Result<Project, ProjectError> {
        lock(&self.projects)?
            .get(id)
            .cloned()
            .ok_or_else(|| ProjectError::NotFound { id: id.to_string() })
    }

    fn put_snapshot(
        &self,
        project_id: &str,
        direction: HistoryDirection,
        seq: u64,
        project: &Project,
    ) -> Result<(), ProjectError> {
        let mut snapshots = lock(&self.snapshots)?;
        let log = snapshots
            .entry((project_id.to_string(), direction))
            .or_default();
        log.insert(seq, project.clone());
        while log.len() > self.retention {
            log.pop_first();
        }
        Ok(())
    }

    fn get_snapshot(
        &self,
        project_id: &str,
        direction: HistoryDirection,
        seq: u64,
    ) -> Result<Option<Project>, ProjectError> {
        Ok(lock(&self.snapshots)?
            .get(&(project_id.to_string(), direction))
            .and_then(|log| log.get(&seq).cloned()))
    }

    fn list_snapshots(
        &self,
        project_id: &str,
        direction: HistoryDirection,
    ) -> Result<Vec<u64>, ProjectError> {
        Ok(lock(&self.snapshots)?
            .get(&(project_id.to_string(), direction))
            .map(|log| log.keys().copied().collect())
            .unwrap_or_default())
    }

    fn clear_snapshots(
        &self,
        project_id: &str,
        direction: HistoryDirection,
    ) -> Result<(), ProjectError> {
        lock(&self.snapshots)?.remove(&(project_id.to_string(), direction));
        Ok(())
    }
}

fn lock<T>(m: &Mutex<T>) -> Result<std::sync::MutexGuard<'_, T>, ProjectError> {
    m.lock().map_err(|_| ProjectError::ValidationError {
        message: "project store lock poisoned".to_string(),
    })
}

/// Ids become directory names; reject anything that could escape the root.
fn validate_id(id: &str) -> Result<(), ProjectError> {
    let ok = !id.is_empty()
        && id != "."
        && id != ".."
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.');
    if ok {
        Ok(())
    } else {
        Err(ProjectError::ValidationError {
            message: format!("invalid project id {id:?}"),
        })
    }
}

fn io_err(path: &Path, source: std::io::Error) -> ProjectError {
    ProjectError::IoError {
        path: path.to_path_buf(),
        source,
    }
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), ProjectError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
    }
    let json = serde_json::to_string_pretty(value).map_err(|e| ProjectError::ParseError {
        path: path.to_path_buf(),
        source: e,
    })?;
    // Write-then-rename so a crash never leaves a truncated project file.
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, json).map_err(|e| io_err(&tmp, e))?;
    std::fs::rename(&tmp, path).map_err(|e| io_err(path, e))
}

fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T, ProjectError> {
    let content = std::fs::read_to_string(path).map_err(|e| io_err(path, e))?;
    serde_json::from_str(&content).map_err(|e| ProjectError::ParseError {
        path: path.to_path_buf(),
        source: e,
    })
}
