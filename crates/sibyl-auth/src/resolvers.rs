// SPDX-FileCopyrightText: 2026 Sibyl Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Identity resolver implementations.
//!
//! Two backings, selected by `auth.resolver` in configuration: the local
//! user-mapping table, or an external directory service over HTTP. Both
//! fail closed: a resolver that cannot answer yields
//! `ResolverUnavailable`, never an implicit allow.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use sibyl_config::model::AuthConfig;
use sibyl_core::traits::IdentityResolver;
use sibyl_core::types::{Identity, Principal};
use sibyl_core::SibylError;
use sibyl_storage::queries::user_mappings;
use sibyl_storage::Database;
use tracing::debug;

/// Resolver backed by the `user_mappings` table in local storage.
pub struct LocalTableResolver {
    db: Arc<Database>,
    op_timeout: Duration,
}

impl LocalTableResolver {
    pub fn new(db: Arc<Database>, op_timeout: Duration) -> Self {
        Self { db, op_timeout }
    }
}

#[async_trait]
impl IdentityResolver for LocalTableResolver {
    async fn resolve(&self, principal: &Principal) -> Result<Identity, SibylError> {
        let lookup = user_mappings::get_by_principal(&self.db, principal.as_str());
        let mapping = tokio::time::timeout(self.op_timeout, lookup)
            .await
            .map_err(|_| SibylError::ResolverUnavailable {
                message: format!("user-mapping lookup exceeded {:?}", self.op_timeout),
                source: None,
            })?
            .map_err(|e| SibylError::ResolverUnavailable {
                message: "user-mapping store error".to_string(),
                source: Some(Box::new(e)),
            })?;

        let mapping = mapping.ok_or_else(|| SibylError::IdentityNotFound {
            principal: principal.to_string(),
        })?;

        debug!(principal = %principal, roles = ?mapping.roles, "resolved via local table");
        Ok(Identity {
            principal: mapping.principal,
            email: mapping.email,
            full_name: mapping.full_name,
            directory_id: mapping.directory_id,
            roles: mapping.roles,
            capabilities: mapping.capabilities,
            active: mapping.active,
        })
    }

    fn name(&self) -> &str {
        "local-table"
    }
}

/// Wire shape returned by the directory service.
#[derive(Debug, Deserialize)]
struct DirectoryIdentity {
    principal: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    full_name: Option<String>,
    #[serde(default)]
    directory_id: Option<String>,
    #[serde(default)]
    roles: Vec<String>,
    #[serde(default)]
    capabilities: Vec<String>,
    #[serde(default = "default_active")]
    active: bool,
}

fn default_active() -> bool {
    true
}

/// Resolver backed by an external directory service.
///
/// The binding/search mechanics live in that service; this client only
/// fetches the resolved identity document.
pub struct DirectoryResolver {
    client: reqwest::Client,
    base_url: String,
}

impl DirectoryResolver {
    pub fn new(
        base_url: String,
        timeout: Duration,
        api_key: Option<String>,
    ) -> Result<Self, SibylError> {
        let mut headers = reqwest::header::HeaderMap::new();
        if let Some(key) = api_key {
            let value = reqwest::header::HeaderValue::from_str(&key)
                .map_err(|e| SibylError::Config(format!("invalid directory API key: {e}")))?;
            headers.insert("x-api-key", value);
        }
        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|e| SibylError::Config(format!("failed to build directory client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl IdentityResolver for DirectoryResolver {
    async fn resolve(&self, principal: &Principal) -> Result<Identity, SibylError> {
        let url = format!("{}/v1/identities/{}", self.base_url, principal.as_str());
        let response = self.client.get(&url).send().await.map_err(|e| {
            SibylError::ResolverUnavailable {
                message: format!("directory request failed: {e}"),
                source: Some(Box::new(e)),
            }
        })?;

        match response.status() {
            status if status.is_success() => {
                let doc: DirectoryIdentity =
                    response
                        .json()
                        .await
                        .map_err(|e| SibylError::ResolverUnavailable {
                            message: format!("directory response malformed: {e}"),
                            source: Some(Box::new(e)),
                        })?;
                debug!(principal = %principal, roles = ?doc.roles, "resolved via directory");
                Ok(Identity {
                    principal: doc.principal,
                    email: doc.email,
                    full_name: doc.full_name,
                    directory_id: doc.directory_id,
                    roles: doc.roles,
                    capabilities: doc.capabilities,
                    active: doc.active,
                })
            }
            reqwest::StatusCode::NOT_FOUND => Err(SibylError::IdentityNotFound {
                principal: principal.to_string(),
            }),
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(SibylError::ResolverUnavailable {
                    message: format!("directory returned {status}: {body}"),
                    source: None,
                })
            }
        }
    }

    fn name(&self) -> &str {
        "directory"
    }
}

/// Build the resolver named by configuration.
///
/// Selection lives here so nothing downstream branches on resolver kind.
pub fn resolver_from_config(
    auth: &AuthConfig,
    storage_op_timeout: Duration,
    db: Arc<Database>,
) -> Result<Arc<dyn IdentityResolver>, SibylError> {
    match auth.resolver {
        sibyl_config::model::ResolverKind::Local => Ok(Arc::new(LocalTableResolver::new(
            db,
            storage_op_timeout,
        ))),
        sibyl_config::model::ResolverKind::Directory => {
            let base_url = auth.directory_url.clone().ok_or_else(|| {
                SibylError::Config("auth.directory_url required for directory resolver".into())
            })?;
            Ok(Arc::new(DirectoryResolver::new(
                base_url,
                Duration::from_millis(auth.directory_timeout_ms),
                auth.directory_api_key.clone(),
            )?))
        }
    }
}
