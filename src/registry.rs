//! Endpoint registry: tenant-scoped CRUD for webhook endpoints.
//!
//! Validation is synchronous and happens before anything is persisted, so a
//! misconfigured endpoint is rejected at the management surface instead of
//! silently failing every delivery. This component never performs network
//! I/O.

use std::net::IpAddr;
use std::sync::Arc;

use chrono::Utc;

use crate::error::WebhookError;
use crate::storage::Storage;
use crate::types::{EndpointId, EventType, TenantId, UpdateEndpoint, WebhookEndpoint};

/// Default maximum active endpoints per tenant.
pub const DEFAULT_MAX_ENDPOINTS: usize = 25;

/// Registry behavior switches.
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Permit plain-HTTP URLs (for development and tests).
    pub allow_http: bool,
    /// Permit private/internal destination hosts (for development and tests).
    pub allow_private_hosts: bool,
    /// Endpoint cap per tenant.
    pub max_endpoints_per_tenant: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            allow_http: false,
            allow_private_hosts: false,
            max_endpoints_per_tenant: DEFAULT_MAX_ENDPOINTS,
        }
    }
}

impl RegistryConfig {
    /// Permit plain-HTTP URLs.
    pub fn with_allow_http(mut self, allow: bool) -> Self {
        self.allow_http = allow;
        self
    }

    /// Permit private/internal destination hosts.
    pub fn with_allow_private_hosts(mut self, allow: bool) -> Self {
        self.allow_private_hosts = allow;
        self
    }

    /// Set the endpoint cap per tenant.
    pub fn with_max_endpoints(mut self, max: usize) -> Self {
        self.max_endpoints_per_tenant = max;
        self
    }
}

/// Service for endpoint configuration operations.
#[derive(Clone)]
pub struct EndpointRegistry {
    storage: Arc<dyn Storage>,
    config: RegistryConfig,
}

impl EndpointRegistry {
    pub fn new(storage: Arc<dyn Storage>, config: RegistryConfig) -> Self {
        Self { storage, config }
    }

    /// Create a new endpoint. Defaults to active with zeroed counters.
    pub async fn create_endpoint(
        &self,
        tenant_id: TenantId,
        url: impl Into<String>,
        secret: impl Into<String>,
        event_types: Vec<EventType>,
    ) -> Result<WebhookEndpoint, WebhookError> {
        let url = url.into();
        let secret = secret.into();

        validate_url(&url, &self.config)?;
        if event_types.is_empty() {
            return Err(WebhookError::Validation(
                "subscribed event types must not be empty".into(),
            ));
        }
        if secret.is_empty() {
            return Err(WebhookError::Validation("secret must not be empty".into()));
        }

        let existing = self.storage.list_endpoints(&tenant_id).await.len();
        if existing >= self.config.max_endpoints_per_tenant {
            return Err(WebhookError::EndpointLimitExceeded {
                limit: self.config.max_endpoints_per_tenant,
            });
        }

        let endpoint = WebhookEndpoint::new(tenant_id, url, secret, event_types);
        self.storage.upsert_endpoint(&endpoint).await;

        tracing::info!(
            target: "webhook_registry",
            endpoint_id = %endpoint.id,
            tenant_id = %endpoint.tenant_id,
            url = %endpoint.url,
            "Webhook endpoint created"
        );
        Ok(endpoint)
    }

    /// All endpoints for a tenant, regardless of active flag.
    pub async fn list_endpoints(&self, tenant_id: &TenantId) -> Vec<WebhookEndpoint> {
        self.storage.list_endpoints(tenant_id).await
    }

    /// Fetch a single endpoint.
    pub async fn get_endpoint(&self, id: &EndpointId) -> Result<WebhookEndpoint, WebhookError> {
        self.storage
            .get_endpoint(id)
            .await
            .ok_or_else(|| WebhookError::EndpointNotFound(id.clone()))
    }

    /// Partial update. Only supplied fields change; bumps the modification
    /// timestamp.
    pub async fn update_endpoint(
        &self,
        id: &EndpointId,
        update: UpdateEndpoint,
    ) -> Result<WebhookEndpoint, WebhookError> {
        let mut endpoint = self
            .storage
            .get_endpoint(id)
            .await
            .ok_or_else(|| WebhookError::EndpointNotFound(id.clone()))?;

        if let Some(ref url) = update.url {
            validate_url(url, &self.config)?;
            endpoint.url = url.clone();
        }
        if let Some(ref secret) = update.secret {
            if secret.is_empty() {
                return Err(WebhookError::Validation("secret must not be empty".into()));
            }
            endpoint.secret = secret.clone();
        }
        if let Some(ref event_types) = update.event_types {
            if event_types.is_empty() {
                return Err(WebhookError::Validation(
                    "subscribed event types must not be empty".into(),
                ));
            }
            endpoint.event_types = event_types.clone();
        }
        if let Some(active) = update.active {
            endpoint.active = active;
        }
        endpoint.updated_at = Utc::now();

        self.storage.upsert_endpoint(&endpoint).await;
        tracing::info!(
            target: "webhook_registry",
            endpoint_id = %endpoint.id,
            tenant_id = %endpoint.tenant_id,
            active = endpoint.active,
            "Webhook endpoint updated"
        );
        Ok(endpoint)
    }

    /// Remove an endpoint. Returns false if it did not exist.
    ///
    /// In-flight retries targeting the endpoint are not cancelled; their next
    /// attempt fails on the missing record and runs through ordinary
    /// retry/dead-letter handling.
    pub async fn delete_endpoint(&self, id: &EndpointId) -> bool {
        let removed = self.storage.delete_endpoint(id).await;
        if removed {
            tracing::info!(
                target: "webhook_registry",
                endpoint_id = %id,
                "Webhook endpoint deleted"
            );
        }
        removed
    }
}

// ---------------------------------------------------------------------------
// URL validation
// ---------------------------------------------------------------------------

/// Validate a webhook delivery URL.
///
/// Checks that the URL parses as absolute HTTP(S), carries a host, and (by
/// default) does not target a private/internal address.
pub fn validate_url(url: &str, config: &RegistryConfig) -> Result<(), WebhookError> {
    let parsed = url::Url::parse(url)
        .map_err(|e| WebhookError::Validation(format!("invalid url: {e}")))?;

    match parsed.scheme() {
        "https" => {}
        "http" if config.allow_http => {}
        "http" => {
            return Err(WebhookError::Validation(
                "webhook urls must use https".into(),
            ));
        }
        scheme => {
            return Err(WebhookError::Validation(format!(
                "unsupported url scheme: {scheme}"
            )));
        }
    }

    let host = parsed
        .host_str()
        .ok_or_else(|| WebhookError::Validation("url must have a host".into()))?;

    if !config.allow_private_hosts {
        validate_host_not_internal(host)?;
    }

    Ok(())
}

/// Reject private/internal destination hosts.
///
/// Blocks loopback, RFC-1918 ranges, link-local (cloud metadata endpoints),
/// CGNAT, IPv6 loopback/unspecified, and common internal hostname suffixes.
fn validate_host_not_internal(host: &str) -> Result<(), WebhookError> {
    if let Ok(ip) = host.parse::<IpAddr>() {
        if is_internal_ip(&ip) {
            return Err(WebhookError::Validation(format!(
                "destination host {host} is a private/internal address"
            )));
        }
    }

    let lower = host.to_ascii_lowercase();
    if lower == "localhost" || lower.ends_with(".internal") || lower.ends_with(".local") {
        return Err(WebhookError::Validation(format!(
            "destination host {host} is a restricted internal hostname"
        )));
    }

    Ok(())
}

fn is_internal_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            v4.is_loopback()
                || v4.is_private()
                || v4.is_link_local()
                || v4.is_broadcast()
                || v4.is_unspecified()
                || (v4.octets()[0] == 100 && (v4.octets()[1] & 0xC0) == 64)
        }
        IpAddr::V6(v6) => v6.is_loopback() || v6.is_unspecified(),
    }
}
