//! The session manager: locking, persistence, lifecycle.

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex as StdMutex};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{watch, Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{info, warn};

use carapace_core::{HistoryEntry, SessionId};

use crate::error::{SessionError, SessionResult};
use crate::state::SessionState;

const STATE_FILE: &str = "state";
const STATE_TMP_FILE: &str = "state.tmp";
const HISTORY_FILE: &str = "history";

/// Lock-free metadata snapshot returned by [`SessionManager::list`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionInfo {
    /// Session id.
    pub session_id: SessionId,
    /// Channel type (`cli`, `web`, ...).
    pub channel_type: String,
    /// Channel-specific address.
    pub channel_ref: String,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last activity time.
    pub last_active: DateTime<Utc>,
    /// Activated rule ids.
    pub activated_rules: Vec<String>,
    /// Disabled rule ids.
    pub disabled_rules: Vec<String>,
}

impl From<&SessionState> for SessionInfo {
    fn from(state: &SessionState) -> Self {
        Self {
            session_id: state.session_id.clone(),
            channel_type: state.channel_type.clone(),
            channel_ref: state.channel_ref.clone(),
            created_at: state.created_at,
            last_active: state.last_active,
            activated_rules: state.activated_rules.iter().cloned().collect(),
            disabled_rules: state.disabled_rules.iter().cloned().collect(),
        }
    }
}

/// A scoped, exclusive acquisition of one session.
///
/// Holding the handle holds the session's lock; dropping it on any exit path
/// releases the lock. All state mutation and persistence for an agent turn
/// happens through a handle.
#[derive(Debug)]
pub struct SessionHandle {
    state: SessionState,
    cancel: watch::Receiver<bool>,
    _guard: OwnedMutexGuard<()>,
}

impl SessionHandle {
    /// The session id.
    #[must_use]
    pub fn id(&self) -> &SessionId {
        &self.state.session_id
    }

    /// Read the session state.
    #[must_use]
    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Mutate the session state. Changes are not durable until
    /// [`SessionManager::save_state`] runs.
    #[must_use]
    pub fn state_mut(&mut self) -> &mut SessionState {
        &mut self.state
    }

    /// A watch that flips to `true` when the session is deleted or reset.
    /// In-flight waits select on this to observe cancellation.
    #[must_use]
    pub fn cancel_watch(&self) -> watch::Receiver<bool> {
        self.cancel.clone()
    }
}

/// Owns the mapping from session ids to on-disk session records and the
/// per-session exclusive locks.
///
/// Locks serialise agent turns: a session has at most one in-flight turn,
/// because rules reason over ordered history. Work across different
/// sessions is fully parallel.
pub struct SessionManager {
    sessions_dir: PathBuf,
    locks: StdMutex<HashMap<String, Arc<AsyncMutex<()>>>>,
    cancels: StdMutex<HashMap<String, watch::Sender<bool>>>,
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("sessions_dir", &self.sessions_dir)
            .finish_non_exhaustive()
    }
}

impl SessionManager {
    /// Create a manager rooted at `data_dir`, creating `sessions/` if
    /// needed.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Storage`] if the directory cannot be created.
    pub fn new(data_dir: impl Into<PathBuf>) -> SessionResult<Self> {
        let sessions_dir = data_dir.into().join("sessions");
        std::fs::create_dir_all(&sessions_dir).map_err(|e| SessionError::Storage {
            path: sessions_dir.display().to_string(),
            source: e,
        })?;
        Ok(Self {
            sessions_dir,
            locks: StdMutex::new(HashMap::new()),
            cancels: StdMutex::new(HashMap::new()),
        })
    }

    fn session_dir(&self, id: &SessionId) -> PathBuf {
        self.sessions_dir.join(id.as_str())
    }

    fn lock_for(&self, id: &SessionId) -> Arc<AsyncMutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        Arc::clone(
            locks
                .entry(id.as_str().to_string())
                .or_insert_with(|| Arc::new(AsyncMutex::new(()))),
        )
    }

    fn cancel_receiver(&self, id: &SessionId) -> watch::Receiver<bool> {
        let mut cancels = self.cancels.lock().unwrap_or_else(|e| e.into_inner());
        cancels
            .entry(id.as_str().to_string())
            .or_insert_with(|| watch::channel(false).0)
            .subscribe()
    }

    fn signal_cancel(&self, id: &SessionId) {
        let cancels = self.cancels.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(tx) = cancels.get(id.as_str()) {
            let _ = tx.send(true);
        }
    }

    /// Allocate a fresh session: id, directory, empty state and history.
    ///
    /// # Errors
    ///
    /// Returns a [`SessionError`] if the directory or files cannot be
    /// created.
    pub fn create(
        &self,
        channel_type: impl Into<String>,
        channel_ref: impl Into<String>,
    ) -> SessionResult<SessionState> {
        let state = SessionState::new(channel_type, channel_ref);
        let dir = self.session_dir(&state.session_id);
        std::fs::create_dir_all(&dir).map_err(|e| SessionError::Storage {
            path: dir.display().to_string(),
            source: e,
        })?;

        let history_path = dir.join(HISTORY_FILE);
        File::create(&history_path).map_err(|e| SessionError::Storage {
            path: history_path.display().to_string(),
            source: e,
        })?;

        self.save_state(&state)?;
        info!(session_id = %state.session_id, channel_type = %state.channel_type, "session created");
        Ok(state)
    }

    /// Acquire the session's exclusive lock and load its state.
    ///
    /// The returned handle releases the lock on drop, on every exit path.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NotFound`] if the session does not exist on
    /// disk.
    pub async fn open(&self, id: &SessionId) -> SessionResult<SessionHandle> {
        let lock = self.lock_for(id);
        let guard = lock.lock_owned().await;
        let state = self.load_state(id)?;
        let cancel = self.cancel_receiver(id);
        Ok(SessionHandle {
            state,
            cancel,
            _guard: guard,
        })
    }

    /// Load a session's state without acquiring its lock.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NotFound`] if missing, or a storage /
    /// serialization error.
    pub fn load_state(&self, id: &SessionId) -> SessionResult<SessionState> {
        let path = self.session_dir(id).join(STATE_FILE);
        let raw = match std::fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(SessionError::NotFound(id.clone()))
            }
            Err(e) => {
                return Err(SessionError::Storage {
                    path: path.display().to_string(),
                    source: e,
                })
            }
        };
        Ok(serde_json::from_str(&raw)?)
    }

    /// Rewrite the session's state document atomically.
    ///
    /// The document is written to a temporary file, flushed, then renamed
    /// over the old one, so a crash leaves either the old or the new
    /// document, never a torn one.
    ///
    /// # Errors
    ///
    /// Returns a [`SessionError`] on any write failure; the old document is
    /// left untouched.
    pub fn save_state(&self, state: &SessionState) -> SessionResult<()> {
        let dir = self.session_dir(&state.session_id);
        let tmp_path = dir.join(STATE_TMP_FILE);
        let final_path = dir.join(STATE_FILE);

        let body = serde_json::to_vec_pretty(state)?;
        let mut file = File::create(&tmp_path).map_err(|e| SessionError::Storage {
            path: tmp_path.display().to_string(),
            source: e,
        })?;
        file.write_all(&body).map_err(|e| SessionError::Storage {
            path: tmp_path.display().to_string(),
            source: e,
        })?;
        file.sync_all().map_err(|e| SessionError::Storage {
            path: tmp_path.display().to_string(),
            source: e,
        })?;
        std::fs::rename(&tmp_path, &final_path).map_err(|e| SessionError::Storage {
            path: final_path.display().to_string(),
            source: e,
        })?;
        Ok(())
    }

    /// Append one history entry and flush it to disk.
    ///
    /// History is ordered by append time and never rewritten. The flush
    /// happens before any dependent state rewrite, so after a crash the
    /// history always contains at least as much as the state reflects.
    ///
    /// # Errors
    ///
    /// Returns a [`SessionError`] on write failure.
    pub fn append_history(&self, id: &SessionId, entry: &HistoryEntry) -> SessionResult<()> {
        let path = self.session_dir(id).join(HISTORY_FILE);
        let mut line = serde_json::to_string(entry)?;
        line.push('\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| SessionError::Storage {
                path: path.display().to_string(),
                source: e,
            })?;
        file.write_all(line.as_bytes())
            .map_err(|e| SessionError::Storage {
                path: path.display().to_string(),
                source: e,
            })?;
        file.sync_data().map_err(|e| SessionError::Storage {
            path: path.display().to_string(),
            source: e,
        })?;
        Ok(())
    }

    /// Load a session's full history, in append order.
    ///
    /// A torn trailing line (crash mid-append) is skipped with a warning;
    /// everything before it is returned.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NotFound`] if the session does not exist.
    pub fn load_history(&self, id: &SessionId) -> SessionResult<Vec<HistoryEntry>> {
        let path = self.session_dir(id).join(HISTORY_FILE);
        let raw = match std::fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(SessionError::NotFound(id.clone()))
            }
            Err(e) => {
                return Err(SessionError::Storage {
                    path: path.display().to_string(),
                    source: e,
                })
            }
        };

        let mut entries = Vec::new();
        for line in raw.lines() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str(line) {
                Ok(entry) => entries.push(entry),
                Err(e) => {
                    warn!(session_id = %id, error = %e, "skipping unparseable history line");
                }
            }
        }
        Ok(entries)
    }

    /// Lock-free listing of all sessions, most recently active first.
    ///
    /// Need not be transactional with concurrent mutations; unreadable
    /// entries are skipped.
    #[must_use]
    pub fn list(&self) -> Vec<SessionInfo> {
        let Ok(entries) = std::fs::read_dir(&self.sessions_dir) else {
            return Vec::new();
        };

        let mut infos: Vec<SessionInfo> = entries
            .filter_map(Result::ok)
            .filter(|e| e.path().is_dir())
            .filter_map(|e| {
                let id = SessionId(e.file_name().to_string_lossy().into_owned());
                self.load_state(&id).ok().map(|s| SessionInfo::from(&s))
            })
            .collect();
        infos.sort_by(|a, b| b.last_active.cmp(&a.last_active));
        infos
    }

    /// Remove a session's on-disk state. Any in-flight operation on the
    /// session observes cancellation at its next suspension point.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NotFound`] if the session does not exist.
    pub fn delete(&self, id: &SessionId) -> SessionResult<()> {
        let dir = self.session_dir(id);
        if !dir.exists() {
            return Err(SessionError::NotFound(id.clone()));
        }
        self.signal_cancel(id);
        std::fs::remove_dir_all(&dir).map_err(|e| SessionError::Storage {
            path: dir.display().to_string(),
            source: e,
        })?;
        info!(session_id = %id, "session deleted");
        Ok(())
    }

    /// Retire the handle's session and allocate a successor bound to the
    /// same channel.
    ///
    /// The old session stays on disk for audit, marked retired and linked
    /// to its successor. Any other in-flight waiters on the old session
    /// observe cancellation.
    ///
    /// # Errors
    ///
    /// Returns a [`SessionError`] if the successor cannot be created or the
    /// retirement cannot be persisted.
    pub fn reset(&self, handle: &mut SessionHandle) -> SessionResult<SessionState> {
        let successor = self.create(
            handle.state.channel_type.clone(),
            handle.state.channel_ref.clone(),
        )?;

        handle.state.retired = true;
        handle.state.successor = Some(successor.session_id.clone());
        self.save_state(&handle.state)?;
        self.signal_cancel(&handle.state.session_id);

        info!(
            old = %handle.state.session_id,
            new = %successor.session_id,
            "session reset"
        );
        Ok(successor)
    }

    /// Update the session's last-active time and persist it.
    ///
    /// # Errors
    ///
    /// Returns a [`SessionError`] on persistence failure.
    pub fn touch(&self, handle: &mut SessionHandle) -> SessionResult<()> {
        handle.state.touch();
        self.save_state(&handle.state)
    }

    /// Delete sessions whose `last_active` is older than `retention`.
    /// Returns the ids that were removed.
    #[must_use]
    pub fn sweep(&self, retention: Duration) -> Vec<SessionId> {
        let cutoff = Utc::now() - retention;
        let mut removed = Vec::new();
        for info in self.list() {
            if info.last_active < cutoff {
                match self.delete(&info.session_id) {
                    Ok(()) => removed.push(info.session_id),
                    Err(e) => {
                        warn!(session_id = %info.session_id, error = %e, "retention sweep failed to delete")
                    }
                }
            }
        }
        removed
    }

    /// The sessions root directory (for diagnostics).
    #[must_use]
    pub fn sessions_dir(&self) -> &Path {
        &self.sessions_dir
    }
}
