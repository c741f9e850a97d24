use std::{collections::HashMap, path::Path};

use serde::{Deserialize, Serialize};

use super::ConfigError;

/// One registered relying party.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClientEntry {
    /// Display name, shown on the login-method chooser.
    pub name: String,

    /// Exact-match redirect URI allow-list. The only trusted redirect
    /// targets for this client.
    pub redirect_uris: Vec<String>,

    /// Optional error page to send users to when their login state has
    /// expired and no OIDC redirect is possible.
    #[serde(default)]
    pub error_page: Option<String>,
}

/// Read-only client registry, loaded once at startup from a JSON file of
/// the shape `{"client_id": {"name": …, "redirect_uris": […]}}`.
#[derive(Debug, Clone, Default)]
pub struct ClientRegistry {
    clients: HashMap<String, ClientEntry>,
}

impl ClientRegistry {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::Io(e, path.as_ref().to_path_buf()))?;
        Self::from_json(&contents)
    }

    pub fn from_json(contents: &str) -> Result<Self, ConfigError> {
        let clients: HashMap<String, ClientEntry> = serde_json::from_str(contents)
            .map_err(|e| ConfigError::Validation(format!("invalid clients file: {}", e)))?;
        for (client_id, entry) in &clients {
            if entry.redirect_uris.is_empty() {
                return Err(ConfigError::Validation(format!(
                    "client '{}' has no redirect_uris",
                    client_id
                )));
            }
        }
        Ok(Self { clients })
    }

    pub fn get(&self, client_id: &str) -> Option<&ClientEntry> {
        self.clients.get(client_id)
    }

    pub fn contains(&self, client_id: &str) -> bool {
        self.clients.contains_key(client_id)
    }

    /// Whether `redirect_uri` is on the client's allow-list. Unknown clients
    /// allow nothing.
    pub fn allows_redirect(&self, client_id: &str, redirect_uri: &str) -> bool {
        self.clients
            .get(client_id)
            .is_some_and(|c| c.redirect_uris.iter().any(|uri| uri == redirect_uri))
    }

    pub fn error_page(&self, client_id: &str) -> Option<&str> {
        self.clients
            .get(client_id)
            .and_then(|c| c.error_page.as_deref())
    }

    #[cfg(test)]
    pub fn from_entries(entries: Vec<(&str, ClientEntry)>) -> Self {
        Self {
            clients: entries
                .into_iter()
                .map(|(id, e)| (id.to_string(), e))
                .collect(),
        }
    }
}
