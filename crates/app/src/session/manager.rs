//! Session lifecycle: creation, routing, teardown.

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

use parlance_audio::AudioFrame;
use parlance_foundation::{OrchestratorError, TransportError};
use parlance_retrieval::{NoopRetriever, Retriever};
use parlance_telemetry::PipelineMetrics;

use crate::agent::{AgentStore, Registries};
use crate::session::events::{EventPublisher, SessionEvent};
use crate::turn::{EngineConfig, EngineDeps, TurnEngine};

/// Queue depths. The inbound queue absorbs a transport burst of ~5 s of
/// 20 ms frames; outbound holds ~10 s of synthesized audio before frames
/// drop.
const INBOUND_QUEUE: usize = 256;
const OUTBOUND_QUEUE: usize = 512;

pub struct SessionHandle {
    pub id: Uuid,
    pub agent_id: String,
    pub created_at: DateTime<Utc>,
    pub metrics: Arc<PipelineMetrics>,
    events_tx: mpsc::Sender<SessionEvent>,
    publisher: EventPublisher,
    outbound_rx: Mutex<Option<mpsc::Receiver<AudioFrame>>>,
}

impl SessionHandle {
    /// Queue one event onto the session's inbound queue.
    pub async fn send(&self, event: SessionEvent) -> Result<(), OrchestratorError> {
        self.events_tx
            .send(event)
            .await
            .map_err(|_| OrchestratorError::SessionNotFound(self.id.to_string()))
    }

    pub fn events_tx(&self) -> mpsc::Sender<SessionEvent> {
        self.events_tx.clone()
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<super::events::PublishedEvent> {
        self.publisher.subscribe()
    }

    /// Claim the outbound audio stream. Exactly one transport may bind.
    pub fn take_outbound(&self) -> Result<mpsc::Receiver<AudioFrame>, OrchestratorError> {
        self.outbound_rx
            .lock()
            .take()
            .ok_or_else(|| TransportError::AlreadyAttached(self.id.to_string()).into())
    }
}

pub struct SessionManager {
    sessions: Arc<RwLock<HashMap<Uuid, Arc<SessionHandle>>>>,
    agents: AgentStore,
    registries: Registries,
    retriever: Arc<dyn Retriever>,
    engine_config: EngineConfig,
}

impl SessionManager {
    pub fn new(agents: AgentStore, registries: Registries, engine_config: EngineConfig) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            agents,
            registries,
            retriever: Arc::new(NoopRetriever),
            engine_config,
        }
    }

    /// Swap in the process's retrieval implementation.
    pub fn with_retriever(mut self, retriever: Arc<dyn Retriever>) -> Self {
        self.retriever = retriever;
        self
    }

    /// Create a session for the named agent and start its engine.
    pub fn create(&self, agent_id: &str) -> Result<Arc<SessionHandle>, OrchestratorError> {
        let agent_config = self.agents.get(agent_id)?;
        let agent = Arc::new(self.registries.snapshot(agent_config)?);

        let id = Uuid::new_v4();
        let (events_tx, events_rx) = mpsc::channel(INBOUND_QUEUE);
        let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_QUEUE);
        let publisher = EventPublisher::default();
        let metrics = Arc::new(PipelineMetrics::default());

        let engine = TurnEngine::new(EngineDeps {
            session_id: id,
            agent,
            events_rx,
            events_tx: events_tx.clone(),
            outbound: outbound_tx,
            publisher: publisher.clone(),
            retriever: self.retriever.clone(),
            metrics: metrics.clone(),
            config: self.engine_config.clone(),
        });

        let task = tokio::spawn(engine.run());

        // reap the table entry once the engine exits, however it exits
        let sessions = self.sessions.clone();
        tokio::spawn(async move {
            if let Err(err) = task.await {
                tracing::error!(session = %id, error = %err, "engine task panicked");
            }
            sessions.write().remove(&id);
        });

        let handle = Arc::new(SessionHandle {
            id,
            agent_id: agent_id.to_string(),
            created_at: Utc::now(),
            metrics,
            events_tx,
            publisher,
            outbound_rx: Mutex::new(Some(outbound_rx)),
        });
        self.sessions.write().insert(id, handle.clone());
        tracing::info!(session = %id, agent = agent_id, "session created");
        Ok(handle)
    }

    pub fn get(&self, id: Uuid) -> Result<Arc<SessionHandle>, OrchestratorError> {
        self.sessions
            .read()
            .get(&id)
            .cloned()
            .ok_or_else(|| OrchestratorError::SessionNotFound(id.to_string()))
    }

    /// Request teardown. The entry disappears when the engine exits.
    pub async fn close(&self, id: Uuid) -> Result<(), OrchestratorError> {
        let handle = self.get(id)?;
        handle.send(SessionEvent::Cancel).await
    }

    pub fn active_count(&self) -> usize {
        self.sessions.read().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::AgentConfig;

    fn manager() -> SessionManager {
        SessionManager::new(
            AgentStore::new(vec![AgentConfig::demo("demo")]),
            Registries::with_defaults(),
            EngineConfig::default(),
        )
    }

    #[tokio::test]
    async fn create_and_close_session() {
        let manager = manager();
        let handle = manager.create("demo").unwrap();
        assert_eq!(manager.active_count(), 1);
        assert!(manager.get(handle.id).is_ok());

        manager.close(handle.id).await.unwrap();
        // reaper runs after the engine drains the cancel event
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert_eq!(manager.active_count(), 0);
    }

    #[tokio::test]
    async fn unknown_agent_is_rejected() {
        let manager = manager();
        assert!(matches!(
            manager.create("ghost"),
            Err(OrchestratorError::AgentNotFound(_))
        ));
    }

    #[tokio::test]
    async fn outbound_binds_exactly_once() {
        let manager = manager();
        let handle = manager.create("demo").unwrap();
        assert!(handle.take_outbound().is_ok());
        assert!(handle.take_outbound().is_err());
    }
}
