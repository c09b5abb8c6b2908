//! Session registry: explicit, id-keyed ownership of reasoning structures.
//!
//! Each session owns exactly one engine. All access goes through a single
//! async mutex, so operations on the registry are serialized. When a store is
//! configured, sessions that are not resident are restored from their latest
//! snapshot on first use, and every successful mutation is saved.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::SessionConfig;
use crate::engine::{
    ChainEngine, ChainSnapshot, GraphEngine, GraphSnapshot, ThoughtNode, TreeEngine,
    TreeSnapshot,
};
use crate::error::{AppError, AppResult, ReasoningResult, StorageError, ToolError};
use crate::modes::ReasoningMode;
use crate::storage::{SessionSummary, SnapshotStore, StoredSession};


/// The structure owned by a session.
#[derive(Debug, Clone)]
pub enum SessionEngine {
    /// Linear chain of steps.
    Chain(ChainEngine),
    /// Rooted tree of thoughts.
    Tree(TreeEngine),
    /// Directed graph of thoughts.
    Graph(GraphEngine),
}

/// Persisted form of a [`SessionEngine`], tagged by mode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum SessionSnapshot {
    /// Chain snapshot.
    Chain(ChainSnapshot),
    /// Tree snapshot.
    Tree(TreeSnapshot),
    /// Graph snapshot.
    Graph(GraphSnapshot),
}

impl SessionEngine {
    /// Which structure variant this is.
    pub fn mode(&self) -> ReasoningMode {
        match self {
            SessionEngine::Chain(_) => ReasoningMode::Chain,
            SessionEngine::Tree(_) => ReasoningMode::Tree,
            SessionEngine::Graph(_) => ReasoningMode::Graph,
        }
    }

    /// Deep copy suitable for persistence.
    pub fn snapshot(&self) -> SessionSnapshot {
        match self {
            SessionEngine::Chain(chain) => SessionSnapshot::Chain(chain.snapshot()),
            SessionEngine::Tree(tree) => SessionSnapshot::Tree(tree.snapshot()),
            SessionEngine::Graph(graph) => SessionSnapshot::Graph(graph.serialize()),
        }
    }

    /// Rebuild an engine from a snapshot.
    pub fn restore(snapshot: SessionSnapshot) -> ReasoningResult<Self> {
        Ok(match snapshot {
            SessionSnapshot::Chain(s) => SessionEngine::Chain(ChainEngine::restore(s)?),
            SessionSnapshot::Tree(s) => SessionEngine::Tree(TreeEngine::restore(s)?),
            SessionSnapshot::Graph(s) => SessionEngine::Graph(GraphEngine::deserialize(s)?),
        })
    }

    /// Update a node's score and/or confidence regardless of variant.
    pub fn set_score(
        &mut self,
        node_id: &str,
        score: Option<f64>,
        confidence: Option<f64>,
    ) -> ReasoningResult<ThoughtNode> {
        Ok(match self {
            SessionEngine::Chain(chain) => chain.set_score(node_id, score, confidence)?.clone(),
            SessionEngine::Tree(tree) => {
                tree.set_score(node_id, score, confidence)?.thought.clone()
            }
            SessionEngine::Graph(graph) => graph.set_score(node_id, score, confidence)?.clone(),
        })
    }
}

/// Whether an operation mutates the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    /// Query only; nothing is persisted.
    Read,
    /// Mutation; the session is saved afterwards.
    Write,
}

#[derive(Debug)]
struct Resident {
    engine: SessionEngine,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    /// The latest state failed to save and exists only in memory.
    dirty: bool,
}

impl Resident {
    fn new(engine: SessionEngine) -> Self {
        let now = Utc::now();
        Self {
            engine,
            created_at: now,
            updated_at: now,
            dirty: false,
        }
    }
}

/// Owner of every live session.
pub struct SessionRegistry {
    sessions: Mutex<HashMap<String, Resident>>,
    store: Option<Arc<dyn SnapshotStore>>,
    config: SessionConfig,
}

impl SessionRegistry {
    /// Create a registry, optionally backed by a snapshot store.
    pub fn new(config: SessionConfig, store: Option<Arc<dyn SnapshotStore>>) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            store,
            config,
        }
    }

    /// Registry without persistence.
    pub fn in_memory() -> Self {
        Self::new(SessionConfig::default(), None)
    }

    /// Register a new session. The id is a fresh UUID unless supplied.
    pub async fn create(
        &self,
        session_id: Option<String>,
        engine: SessionEngine,
    ) -> AppResult<String> {
        let id = match session_id {
            Some(id) => validate_session_id(id)?,
            None => Uuid::new_v4().to_string(),
        };

        let mut sessions = self.sessions.lock().await;
        if sessions.contains_key(&id) || self.load(&id).await?.is_some() {
            return Err(ToolError::Session(format!("Session already exists: {}", id)).into());
        }
        self.make_room(&mut sessions).await?;

        let mode = engine.mode();
        let resident = sessions
            .entry(id.clone())
            .or_insert_with(|| Resident::new(engine));
        self.persist(&id, resident).await?;

        info!(session_id = %id, mode = %mode, "Session created");
        Ok(id)
    }

    /// Run `f` against a chain session, creating the chain if it does not exist.
    ///
    /// Returns the session id together with `f`'s result. A freshly created
    /// session is discarded again when `f` fails.
    pub async fn with_chain_or_create<R, F>(
        &self,
        session_id: Option<String>,
        f: F,
    ) -> AppResult<(String, R)>
    where
        F: FnOnce(&mut ChainEngine) -> ReasoningResult<R>,
    {
        let id = match session_id {
            Some(id) => validate_session_id(id)?,
            None => Uuid::new_v4().to_string(),
        };

        let mut sessions = self.sessions.lock().await;
        let mut created = false;
        if !sessions.contains_key(&id) {
            let resident = match self.load(&id).await? {
                Some(resident) => resident,
                None => {
                    created = true;
                    Resident::new(SessionEngine::Chain(ChainEngine::new()))
                }
            };
            self.make_room(&mut sessions).await?;
            sessions.insert(id.clone(), resident);
        }

        let resident = sessions
            .get_mut(&id)
            .ok_or_else(|| session_not_found(&id))?;
        let outcome = match &mut resident.engine {
            SessionEngine::Chain(chain) => f(chain).map_err(AppError::from),
            other => Err(mode_mismatch(&id, ReasoningMode::Chain, other.mode())),
        };

        match outcome {
            Ok(result) => {
                resident.updated_at = Utc::now();
                self.persist(&id, resident).await?;
                if created {
                    info!(session_id = %id, mode = "chain", "Session created");
                }
                Ok((id, result))
            }
            Err(e) => {
                if created {
                    sessions.remove(&id);
                }
                Err(e)
            }
        }
    }

    /// Run `f` against an existing chain session.
    pub async fn with_chain<R, F>(&self, session_id: &str, access: Access, f: F) -> AppResult<R>
    where
        F: FnOnce(&mut ChainEngine) -> ReasoningResult<R>,
    {
        self.with_session(session_id, access, |engine| match engine {
            SessionEngine::Chain(chain) => Ok(f(chain)?),
            other => Err(mode_mismatch(session_id, ReasoningMode::Chain, other.mode())),
        })
        .await
    }

    /// Run `f` against an existing tree session.
    pub async fn with_tree<R, F>(&self, session_id: &str, access: Access, f: F) -> AppResult<R>
    where
        F: FnOnce(&mut TreeEngine) -> ReasoningResult<R>,
    {
        self.with_session(session_id, access, |engine| match engine {
            SessionEngine::Tree(tree) => Ok(f(tree)?),
            other => Err(mode_mismatch(session_id, ReasoningMode::Tree, other.mode())),
        })
        .await
    }

    /// Run `f` against an existing graph session.
    pub async fn with_graph<R, F>(&self, session_id: &str, access: Access, f: F) -> AppResult<R>
    where
        F: FnOnce(&mut GraphEngine) -> ReasoningResult<R>,
    {
        self.with_session(session_id, access, |engine| match engine {
            SessionEngine::Graph(graph) => Ok(f(graph)?),
            other => Err(mode_mismatch(session_id, ReasoningMode::Graph, other.mode())),
        })
        .await
    }

    /// Run `f` against any existing session.
    ///
    /// With [`Access::Write`], the session is saved after `f` succeeds. The
    /// in-memory change is kept even if saving fails.
    pub async fn with_session<R, F>(&self, session_id: &str, access: Access, f: F) -> AppResult<R>
    where
        F: FnOnce(&mut SessionEngine) -> AppResult<R>,
    {
        let mut sessions = self.sessions.lock().await;
        if !sessions.contains_key(session_id) {
            let resident = self
                .load(session_id)
                .await?
                .ok_or_else(|| session_not_found(session_id))?;
            self.make_room(&mut sessions).await?;
            sessions.insert(session_id.to_string(), resident);
        }

        let resident = sessions
            .get_mut(session_id)
            .ok_or_else(|| session_not_found(session_id))?;
        let result = f(&mut resident.engine)?;

        if access == Access::Write {
            resident.updated_at = Utc::now();
            self.persist(session_id, resident).await?;
        }
        Ok(result)
    }

    /// Known sessions, most recently updated first.
    ///
    /// Resident sessions are merged with persisted ones; the newer record of
    /// a session present in both wins.
    pub async fn list(&self, limit: u32) -> AppResult<Vec<SessionSummary>> {
        let mut merged: BTreeMap<String, SessionSummary> = BTreeMap::new();

        if let Some(store) = &self.store {
            for summary in store.list_sessions(limit).await? {
                merged.insert(summary.id.clone(), summary);
            }
        }

        let sessions = self.sessions.lock().await;
        for (id, resident) in sessions.iter() {
            let newer = merged
                .get(id)
                .map_or(true, |s| s.updated_at < resident.updated_at);
            if newer {
                merged.insert(
                    id.clone(),
                    SessionSummary {
                        id: id.clone(),
                        mode: resident.engine.mode().as_str().to_string(),
                        created_at: resident.created_at,
                        updated_at: resident.updated_at,
                    },
                );
            }
        }

        let mut summaries: Vec<SessionSummary> = merged.into_values().collect();
        summaries.sort_by(|a, b| {
            b.updated_at
                .cmp(&a.updated_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        summaries.truncate(limit as usize);
        Ok(summaries)
    }

    /// Number of sessions currently held in memory.
    pub async fn resident_count(&self) -> usize {
        self.sessions.lock().await.len()
    }

    fn persists(&self) -> bool {
        self.config.persist && self.store.is_some()
    }

    async fn load(&self, session_id: &str) -> AppResult<Option<Resident>> {
        let Some(store) = &self.store else {
            return Ok(None);
        };
        let Some(stored) = store.load_session(session_id).await? else {
            return Ok(None);
        };

        let snapshot: SessionSnapshot =
            serde_json::from_value(stored.snapshot).map_err(StorageError::from)?;
        let engine = SessionEngine::restore(snapshot)?;

        info!(session_id = %session_id, mode = %engine.mode(), "Session restored from storage");
        Ok(Some(Resident {
            engine,
            created_at: stored.created_at,
            updated_at: stored.updated_at,
            dirty: false,
        }))
    }

    async fn persist(&self, session_id: &str, resident: &mut Resident) -> AppResult<()> {
        let Some(store) = self.store.as_ref().filter(|_| self.config.persist) else {
            return Ok(());
        };

        let snapshot =
            serde_json::to_value(resident.engine.snapshot()).map_err(StorageError::from)?;
        let mut stored =
            StoredSession::new(session_id, resident.engine.mode().as_str(), snapshot);
        stored.created_at = resident.created_at;
        stored.updated_at = resident.updated_at;

        if let Err(e) = store.save_session(&stored).await {
            resident.dirty = true;
            warn!(session_id = %session_id, error = %e, "Failed to persist session snapshot");
            return Err(e.into());
        }
        resident.dirty = false;
        debug!(session_id = %session_id, "Session snapshot saved");
        Ok(())
    }

    /// Ensure there is room for one more resident session.
    ///
    /// When snapshots are persisted, the least recently updated session is
    /// evicted from memory; it will be restored on next use. A session whose
    /// last save failed is saved again first and stays resident if that
    /// fails too.
    async fn make_room(&self, sessions: &mut HashMap<String, Resident>) -> AppResult<()> {
        if sessions.len() < self.config.max_sessions {
            return Ok(());
        }

        if self.persists() {
            let mut candidates: Vec<(DateTime<Utc>, String)> = sessions
                .iter()
                .map(|(id, r)| (r.updated_at, id.clone()))
                .collect();
            candidates.sort();

            for (_, id) in candidates {
                let Some(resident) = sessions.get_mut(&id) else {
                    continue;
                };
                if resident.dirty && self.persist(&id, resident).await.is_err() {
                    continue;
                }
                sessions.remove(&id);
                debug!(session_id = %id, "Evicted session from memory");
                return Ok(());
            }
        }

        Err(ToolError::Session(format!(
            "Session limit reached ({} sessions)",
            self.config.max_sessions
        ))
        .into())
    }
}

fn validate_session_id(id: String) -> AppResult<String> {
    if id.trim().is_empty() {
        return Err(ToolError::Validation {
            field: "session_id".to_string(),
            reason: "Session id cannot be empty".to_string(),
        }
        .into());
    }
    Ok(id)
}

fn session_not_found(session_id: &str) -> AppError {
    ToolError::Session(format!("Session not found: {}", session_id)).into()
}

fn mode_mismatch(session_id: &str, expected: ReasoningMode, actual: ReasoningMode) -> AppError {
    ToolError::Session(format!(
        "Session {} is a {} session, not a {} session",
        session_id, actual, expected
    ))
    .into()
}
