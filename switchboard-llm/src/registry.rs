//! Cache of live backend clients keyed by [`AgentKey`].
//!
//! Each key owns a slot holding a `OnceCell`. Taking the slot only touches
//! one map shard for an instant; the (possibly slow) connect runs outside
//! the map lock, so lookups of other keys never wait on it. The cell
//! serialises creation per key, and a failed connect leaves the cell empty
//! for the next caller to retry.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{info, warn};

use crate::{BackendConnector, ChatBackend};
use switchboard_core::{
    AgentConfig, AgentError, AgentKey, ChatMessage, ChatReply, SwitchboardError,
    SwitchboardResult,
};

/// A live, reusable backend client.
pub struct AgentHandle {
    key: AgentKey,
    client: Arc<dyn ChatBackend>,
    created_at: DateTime<Utc>,
}

impl AgentHandle {
    pub fn new(key: AgentKey, client: Arc<dyn ChatBackend>) -> Self {
        Self {
            key,
            client,
            created_at: Utc::now(),
        }
    }

    pub fn key(&self) -> &AgentKey {
        &self.key
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn provider(&self) -> &str {
        self.client.provider()
    }

    /// True when both handles wrap the same underlying connection.
    pub fn shares_client_with(&self, other: &AgentHandle) -> bool {
        Arc::ptr_eq(&self.client, &other.client)
    }

    pub async fn send(
        &self,
        agent: &AgentConfig,
        message: &str,
        history: &[ChatMessage],
    ) -> SwitchboardResult<ChatReply> {
        self.client.send(agent, message, history).await
    }
}

impl std::fmt::Debug for AgentHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentHandle")
            .field("key", &self.key)
            .field("provider", &self.client.provider())
            .field("created_at", &self.created_at)
            .finish()
    }
}

type Slot = Arc<OnceCell<Arc<AgentHandle>>>;

/// Maps agent configurations to live handles.
///
/// Handles are retained for the life of the process; a configuration
/// refresh only matters when it changes the key.
pub struct AgentRegistry {
    connector: Arc<dyn BackendConnector>,
    handles: DashMap<AgentKey, Slot>,
}

impl AgentRegistry {
    pub fn new(connector: Arc<dyn BackendConnector>) -> Self {
        Self {
            connector,
            handles: DashMap::new(),
        }
    }

    /// Return the handle for `agent`'s key, connecting on first use.
    ///
    /// Creation runs on its own task, so it completes even if the caller
    /// is cancelled.
    pub async fn get_or_create(&self, agent: &AgentConfig) -> SwitchboardResult<Arc<AgentHandle>> {
        let key = agent.key();
        let slot: Slot = {
            let entry = self.handles.entry(key.clone()).or_default();
            Arc::clone(entry.value())
        };
        if let Some(handle) = slot.get() {
            return Ok(Arc::clone(handle));
        }

        let connector = Arc::clone(&self.connector);
        let agent = agent.clone();
        let task_key = key.clone();
        let creation = tokio::spawn(async move {
            let handle = slot
                .get_or_try_init(move || async move {
                    let client = connector.connect(&agent).await?;
                    info!(
                        agent_key = %task_key,
                        digest = %task_key.digest(),
                        provider = client.provider(),
                        "Created agent handle"
                    );
                    Ok::<_, SwitchboardError>(Arc::new(AgentHandle::new(task_key, client)))
                })
                .await?;
            Ok::<_, SwitchboardError>(Arc::clone(handle))
        });

        match creation.await {
            Ok(Ok(handle)) => Ok(handle),
            Ok(Err(e)) => {
                warn!(agent_key = %key, error = %e, "Agent creation failed");
                Err(match e {
                    SwitchboardError::Agent(agent_error) => agent_error.into(),
                    other => AgentError::CreationFailed {
                        key: key.to_string(),
                        reason: other.to_string(),
                    }
                    .into(),
                })
            }
            Err(join_error) => Err(AgentError::CreationFailed {
                key: key.to_string(),
                reason: format!("creation task aborted: {}", join_error),
            }
            .into()),
        }
    }

    /// Existing handle for a key, without creating one.
    pub fn get(&self, key: &AgentKey) -> Option<Arc<AgentHandle>> {
        self.handles
            .get(key)
            .and_then(|slot| slot.value().get().cloned())
    }

    /// Number of live handles.
    pub fn len(&self) -> usize {
        self.handles
            .iter()
            .filter(|slot| slot.value().initialized())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for AgentRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentRegistry")
            .field("handles", &self.len())
            .finish()
    }
}
