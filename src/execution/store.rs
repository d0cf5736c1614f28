// ABOUTME: Execution store keyed by execution ID: live snapshots while running, archived records after.
// ABOUTME: Optionally persists terminal executions as JSON so other processes can read them.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::{Notify, watch};

use crate::deploy::CancelSignal;
use crate::types::ExecutionId;

use super::{Execution, ExecutionSummary, Verdict};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("failed to access execution store at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to encode execution record {path}: {source}")]
    Encode {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// Criteria for `ExecutionStore::list`.
#[derive(Debug, Clone, Default)]
pub struct ListFilter {
    pub environment: Option<String>,
    pub verdict: Option<Verdict>,
    pub limit: Option<usize>,
}

impl ListFilter {
    pub fn limit(limit: usize) -> Self {
        Self {
            limit: Some(limit),
            ..Self::default()
        }
    }

    fn matches(&self, summary: &ExecutionSummary) -> bool {
        self.environment
            .as_deref()
            .is_none_or(|env| summary.environment == env)
            && self.verdict.is_none_or(|v| summary.verdict == v)
    }
}

#[derive(Debug)]
enum Entry {
    Live {
        snapshots: watch::Receiver<Execution>,
        cancel: CancelSignal,
    },
    Archived(Arc<Execution>),
}

impl Entry {
    fn snapshot(&self) -> Execution {
        match self {
            Entry::Live { snapshots, .. } => snapshots.borrow().clone(),
            Entry::Archived(execution) => Execution::clone(execution),
        }
    }
}

#[derive(Debug, Default)]
pub struct ExecutionStore {
    entries: RwLock<HashMap<ExecutionId, Entry>>,
    state_dir: Option<PathBuf>,
    archived: Notify,
}

impl ExecutionStore {
    /// Store that keeps records for the lifetime of the process only.
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Open a persistent store, loading every record already in `state_dir`.
    ///
    /// Unreadable or corrupt records are skipped with a warning.
    pub fn open(state_dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let state_dir = state_dir.into();
        std::fs::create_dir_all(&state_dir).map_err(|source| StoreError::Io {
            path: state_dir.clone(),
            source,
        })?;

        let mut entries = HashMap::new();
        let dir = std::fs::read_dir(&state_dir).map_err(|source| StoreError::Io {
            path: state_dir.clone(),
            source,
        })?;
        for entry in dir.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match load_record(&path) {
                Ok(execution) => {
                    entries.insert(execution.id.clone(), Entry::Archived(Arc::new(execution)));
                }
                Err(e) => tracing::warn!(path = %path.display(), "skipping execution record: {}", e),
            }
        }
        tracing::debug!(dir = %state_dir.display(), records = entries.len(), "opened execution store");

        Ok(Self {
            entries: RwLock::new(entries),
            state_dir: Some(state_dir),
            archived: Notify::new(),
        })
    }

    pub fn state_dir(&self) -> Option<&Path> {
        self.state_dir.as_deref()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn contains(&self, id: &ExecutionId) -> bool {
        self.entries.read().contains_key(id)
    }

    /// Track a running execution.
    pub fn register(
        &self,
        id: ExecutionId,
        snapshots: watch::Receiver<Execution>,
        cancel: CancelSignal,
    ) {
        self.entries
            .write()
            .insert(id, Entry::Live { snapshots, cancel });
    }

    /// Latest snapshot of an execution. Never blocks on the engine.
    pub fn snapshot(&self, id: &ExecutionId) -> Option<Execution> {
        self.entries.read().get(id).map(Entry::snapshot)
    }

    /// Stop handle for a running execution; `None` once archived.
    pub fn cancel_signal(&self, id: &ExecutionId) -> Option<CancelSignal> {
        match self.entries.read().get(id) {
            Some(Entry::Live { cancel, .. }) => Some(cancel.clone()),
            _ => None,
        }
    }

    /// Retain a terminal execution read-only, persisting it when a state dir is set.
    ///
    /// The in-memory record is replaced even if persisting fails.
    pub fn archive(&self, execution: Execution) -> Result<(), StoreError> {
        let persisted = match self.state_dir {
            Some(ref dir) => write_record(dir, &execution),
            None => Ok(()),
        };
        self.entries
            .write()
            .insert(execution.id.clone(), Entry::Archived(Arc::new(execution)));
        self.archived.notify_waiters();
        persisted
    }

    /// Wait until the execution has been archived and return its final record.
    pub async fn wait(&self, id: &ExecutionId) -> Option<Execution> {
        loop {
            let archived = self.archived.notified();
            tokio::pin!(archived);
            archived.as_mut().enable();

            if let Entry::Archived(execution) = self.entries.read().get(id)? {
                return Some(Execution::clone(execution));
            }
            archived.await;
        }
    }

    /// Summaries, most recent first.
    pub fn list(&self, filter: &ListFilter) -> Vec<ExecutionSummary> {
        let mut summaries: Vec<ExecutionSummary> = self
            .entries
            .read()
            .values()
            .map(|entry| entry.snapshot().summary())
            .filter(|summary| filter.matches(summary))
            .collect();

        summaries.sort_by(|a, b| {
            b.started_at
                .cmp(&a.started_at)
                .then_with(|| b.id.as_str().cmp(a.id.as_str()))
        });
        if let Some(limit) = filter.limit {
            summaries.truncate(limit);
        }
        summaries
    }
}

fn record_path(dir: &Path, id: &ExecutionId) -> PathBuf {
    dir.join(format!("{id}.json"))
}

fn write_record(dir: &Path, execution: &Execution) -> Result<(), StoreError> {
    let path = record_path(dir, &execution.id);
    let json = serde_json::to_vec_pretty(execution).map_err(|source| StoreError::Encode {
        path: path.clone(),
        source,
    })?;
    std::fs::write(&path, json).map_err(|source| StoreError::Io { path, source })
}

fn load_record(path: &Path) -> Result<Execution, Box<dyn std::error::Error>> {
    let content = std::fs::read(path)?;
    Ok(serde_json::from_slice(&content)?)
}
