//! Controlled page clients.
//!
//! Just enough of the Clients API for the engine: which pages exist, which
//! worker version controls each, and claiming them after activation.

use hashbrown::HashMap;
use url::Url;

/// One page under (or awaiting) this worker's control.
#[derive(Debug, Clone)]
pub struct Client {
    pub id: String,
    pub url: Url,
    /// Version tag of the controlling worker, if any.
    pub controller: Option<String>,
}

/// Registry of known clients.
#[derive(Debug, Default)]
pub struct ClientRegistry {
    clients: HashMap<String, Client>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a page. New clients start uncontrolled.
    pub fn add(&mut self, id: impl Into<String>, url: Url) {
        let id = id.into();
        self.clients.insert(
            id.clone(),
            Client {
                id,
                url,
                controller: None,
            },
        );
    }

    /// Remove a page (closed or navigated away).
    pub fn remove(&mut self, id: &str) -> Option<Client> {
        self.clients.remove(id)
    }

    pub fn get(&self, id: &str) -> Option<&Client> {
        self.clients.get(id)
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    /// IDs of clients controlled by the given version.
    pub fn controlled_by(&self, version: &str) -> Vec<&str> {
        self.clients
            .values()
            .filter(|c| c.controller.as_deref() == Some(version))
            .map(|c| c.id.as_str())
            .collect()
    }

    /// Point every client at `version`. Returns the IDs whose controller
    /// actually changed, for controller-change notifications.
    pub fn claim(&mut self, version: &str) -> Vec<String> {
        let mut changed = Vec::new();
        for client in self.clients.values_mut() {
            if client.controller.as_deref() != Some(version) {
                client.controller = Some(version.to_string());
                changed.push(client.id.clone());
            }
        }
        changed.sort();
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn test_add_and_remove() {
        let mut registry = ClientRegistry::new();
        registry.add("tab-1", url("https://nexus-ar.example/"));
        assert_eq!(registry.len(), 1);
        assert!(registry.get("tab-1").unwrap().controller.is_none());

        assert!(registry.remove("tab-1").is_some());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_claim_controls_all_clients() {
        let mut registry = ClientRegistry::new();
        registry.add("tab-1", url("https://nexus-ar.example/"));
        registry.add("tab-2", url("https://nexus-ar.example/portal"));

        let changed = registry.claim("v1.0.0");
        assert_eq!(changed, vec!["tab-1", "tab-2"]);
        assert_eq!(registry.controlled_by("v1.0.0").len(), 2);
    }

    #[test]
    fn test_claim_is_idempotent_per_version() {
        let mut registry = ClientRegistry::new();
        registry.add("tab-1", url("https://nexus-ar.example/"));

        registry.claim("v1.0.0");
        let changed = registry.claim("v1.0.0");
        assert!(changed.is_empty());
    }

    #[test]
    fn test_reclaim_by_new_version() {
        let mut registry = ClientRegistry::new();
        registry.add("tab-1", url("https://nexus-ar.example/"));
        registry.claim("v1.0.0");

        let changed = registry.claim("v1.0.1");
        assert_eq!(changed, vec!["tab-1"]);
        assert!(registry.controlled_by("v1.0.0").is_empty());
    }
}
