use crate::error::{AppError, AppResult};
use crate::models::{Endpoint, NewEndpoint};
use crate::storage::{keys, StorageManager};
use anyhow::Context;
use std::sync::Arc;
use uuid::Uuid;

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// User-maintained list of Flowise endpoints, mirrored to local storage on
/// every change.
#[derive(Debug)]
pub struct EndpointRegistry {
    storage: Arc<StorageManager>,
    endpoints: Vec<Endpoint>,
}

impl EndpointRegistry {
    pub async fn load(storage: Arc<StorageManager>) -> Result<Self, anyhow::Error> {
        let endpoints: Vec<Endpoint> = storage
            .get_json_or_default(keys::ENDPOINTS)
            .await
            .context("Failed to load endpoints")?;
        log::info!("Loaded {} endpoints", endpoints.len());
        Ok(Self { storage, endpoints })
    }

    pub fn list(&self) -> &[Endpoint] {
        &self.endpoints
    }

    pub fn get(&self, id: &str) -> Option<&Endpoint> {
        self.endpoints.iter().find(|ep| ep.id == id)
    }

    /// Registers a new endpoint. Name and URL are required.
    pub async fn add(&mut self, new: NewEndpoint) -> AppResult<Endpoint> {
        let name = new.name.trim();
        let url = new.url.trim();
        if name.is_empty() || url.is_empty() {
            return Err(AppError::Validation(
                "Please fill in the endpoint name and URL".to_string(),
            ));
        }

        let endpoint = Endpoint {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            url: url.to_string(),
            description: non_blank(new.description),
            api_key: non_blank(new.api_key),
        };
        log::info!("Adding endpoint '{}' ({})", endpoint.name, endpoint.id);

        self.endpoints.push(endpoint.clone());
        self.flush().await?;
        Ok(endpoint)
    }

    /// Replaces an existing endpoint in place. Chats that cached the old name
    /// keep it.
    pub async fn update(&mut self, endpoint: Endpoint) -> AppResult<Endpoint> {
        if endpoint.name.trim().is_empty() || endpoint.url.trim().is_empty() {
            return Err(AppError::Validation(
                "Please fill in the endpoint name and URL".to_string(),
            ));
        }
        let Some(slot) = self.endpoints.iter_mut().find(|ep| ep.id == endpoint.id) else {
            return Err(AppError::EndpointNotFound(endpoint.id));
        };

        *slot = Endpoint {
            id: endpoint.id,
            name: endpoint.name.trim().to_string(),
            url: endpoint.url.trim().to_string(),
            description: non_blank(endpoint.description),
            api_key: non_blank(endpoint.api_key),
        };
        let updated = slot.clone();
        log::info!("Updated endpoint {}", updated.id);

        self.flush().await?;
        Ok(updated)
    }

    /// Removes an endpoint. Chats referencing it are left as they are.
    pub async fn delete(&mut self, id: &str) -> AppResult<bool> {
        let before = self.endpoints.len();
        self.endpoints.retain(|ep| ep.id != id);
        let removed = self.endpoints.len() != before;
        if removed {
            log::warn!("Deleted endpoint {}", id);
            self.flush().await?;
        }
        Ok(removed)
    }

    async fn flush(&self) -> Result<(), anyhow::Error> {
        self.storage
            .set_json(keys::ENDPOINTS, &self.endpoints)
            .await
            .context("Failed to persist endpoints")
    }
}
