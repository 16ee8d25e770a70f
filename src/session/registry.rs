//! Registry of live matches keyed by their public id. Creation, lookup
//! and the capacity cap live here; each created match runs as its own
//! actor task and removes itself when it closes.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

use crate::game::state::GameSettings;
use crate::metrics::Metrics;
use crate::net::connection::ConnectionRegistry;
use crate::net::match_session::{spawn_match, MatchHandle};
use crate::session::match_state::Match;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RegistryError {
    #[error("Server is at capacity ({0} matches)")]
    AtCapacity(usize),
}

pub struct MatchRegistry {
    matches: RwLock<HashMap<String, MatchHandle>>,
    settings: GameSettings,
    max_matches: usize,
}

impl MatchRegistry {
    pub fn new(settings: GameSettings, max_matches: usize) -> Self {
        Self {
            matches: RwLock::new(HashMap::new()),
            settings,
            max_matches,
        }
    }

    /// Handle for `key`, creating and spawning the match if nothing runs
    /// under that id yet. `None` asks for a fresh match with a generated
    /// id.
    pub fn join_or_create(
        self: &Arc<Self>,
        key: Option<&str>,
        connections: &Arc<ConnectionRegistry>,
        metrics: &Arc<Metrics>,
    ) -> Result<MatchHandle, RegistryError> {
        if let Some(key) = key {
            if let Some(handle) = self.matches.read().get(key) {
                return Ok(handle.clone());
            }
        }

        let mut matches = self.matches.write();
        // a racing creator may have claimed the id between the locks
        if let Some(key) = key {
            if let Some(handle) = matches.get(key) {
                return Ok(handle.clone());
            }
        }
        if matches.len() >= self.max_matches {
            return Err(RegistryError::AtCapacity(self.max_matches));
        }

        let id = match key {
            Some(key) => key.to_string(),
            None => Uuid::new_v4().to_string(),
        };
        let game = Match::new(id.clone(), self.settings.clone());
        let handle = spawn_match(
            game,
            Arc::clone(self),
            Arc::clone(connections),
            Arc::clone(metrics),
        );
        matches.insert(id.clone(), handle.clone());
        metrics.record_match_created();
        info!("Match {} created ({} live)", id, matches.len());
        Ok(handle)
    }

    pub fn get(&self, id: &str) -> Option<MatchHandle> {
        self.matches.read().get(id).cloned()
    }

    /// Called by a match actor as it exits.
    pub fn remove(&self, id: &str) -> bool {
        let removed = self.matches.write().remove(id).is_some();
        if removed {
            debug!("Match {} dropped from registry", id);
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.matches.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.matches.read().is_empty()
    }

    /// Ask every live actor to stop. Handles are cloned out first so no
    /// lock is held across the sends.
    pub async fn shutdown_all(&self) {
        let handles: Vec<MatchHandle> = self.matches.read().values().cloned().collect();
        for handle in handles {
            handle.shutdown().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn harness() -> (Arc<MatchRegistry>, Arc<ConnectionRegistry>, Arc<Metrics>) {
        (
            Arc::new(MatchRegistry::new(GameSettings::default(), 4)),
            Arc::new(ConnectionRegistry::new()),
            Arc::new(Metrics::new()),
        )
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let (registry, connections, metrics) = harness();
        let handle = registry
            .join_or_create(Some("alpha"), &connections, &metrics)
            .unwrap();
        assert_eq!(handle.id(), "alpha");
        assert!(registry.get("alpha").is_some());
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn test_same_key_shares_one_match() {
        let (registry, connections, metrics) = harness();
        let a = registry
            .join_or_create(Some("shared"), &connections, &metrics)
            .unwrap();
        let b = registry
            .join_or_create(Some("shared"), &connections, &metrics)
            .unwrap();
        assert_eq!(a.id(), b.id());
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn test_fresh_match_gets_generated_id() {
        let (registry, connections, metrics) = harness();
        let a = registry.join_or_create(None, &connections, &metrics).unwrap();
        let b = registry.join_or_create(None, &connections, &metrics).unwrap();
        assert!(Uuid::parse_str(a.id()).is_ok());
        assert_ne!(a.id(), b.id());
        assert_eq!(registry.len(), 2);
    }

    #[tokio::test]
    async fn test_capacity_is_enforced() {
        let (_, connections, metrics) = harness();
        let registry = Arc::new(MatchRegistry::new(GameSettings::default(), 2));
        registry.join_or_create(None, &connections, &metrics).unwrap();
        registry.join_or_create(None, &connections, &metrics).unwrap();
        assert_eq!(
            registry.join_or_create(None, &connections, &metrics).err(),
            Some(RegistryError::AtCapacity(2))
        );
        // named keys hit the same cap
        assert!(registry
            .join_or_create(Some("late"), &connections, &metrics)
            .is_err());
    }

    #[tokio::test]
    async fn test_remove_is_idempotent() {
        let (registry, connections, metrics) = harness();
        registry
            .join_or_create(Some("gone"), &connections, &metrics)
            .unwrap();
        assert!(registry.remove("gone"));
        assert!(registry.get("gone").is_none());
        assert!(!registry.remove("gone"));
    }

    #[tokio::test]
    async fn test_actor_removes_itself_when_last_player_leaves() {
        let (registry, connections, metrics) = harness();
        let handle = registry
            .join_or_create(Some("ephemeral"), &connections, &metrics)
            .unwrap();

        let (tx, _rx) = tokio::sync::mpsc::channel(8);
        let conn = connections.register("127.0.0.1:41000".parse().unwrap(), tx);
        handle.join(conn.id).await.unwrap();
        handle.disconnect(conn.id).await;

        for _ in 0..100 {
            if registry.get("ephemeral").is_none() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("closed match never left the registry");
    }

    #[tokio::test]
    async fn test_shutdown_all_drains_registry() {
        let (registry, connections, metrics) = harness();
        registry.join_or_create(Some("a"), &connections, &metrics).unwrap();
        registry.join_or_create(Some("b"), &connections, &metrics).unwrap();

        registry.shutdown_all().await;

        for _ in 0..100 {
            if registry.is_empty() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("matches still registered after shutdown");
    }
}
