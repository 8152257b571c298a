//! Provider integrations
//!
//! Each provider module owns its client, raw payload types, pure mappers and
//! the describers that hand them to the [`Collector`](crate::describer::Collector).
//!
//! # Module Structure
//!
//! - [`auth`] - API token resolution and validation
//! - [`http`] - Shared HTTP client for REST and GraphQL calls
//! - [`containers`] - Container-app platform (apps, machines, volumes)
//! - [`scm`] - Source-control platform (repositories, webhooks, teams)
//! - [`managed`] - Managed-services platform (services, models)

pub mod auth;
pub mod containers;
pub mod http;
pub mod managed;
pub mod scm;

use crate::config::Config;
use crate::describer::DescribeError;
use anyhow::{Context, Result};
use auth::resolve_token;
use containers::ContainersClient;
use http::ProviderHttpClient;
use managed::ManagedClient;
use scm::ScmClient;
use serde::de::DeserializeOwned;
use serde_json::Value;

pub const CONTAINERS_TOKEN_ENV: &str = "CONTAINERS_API_TOKEN";
pub const SCM_TOKEN_ENV: &str = "SCM_TOKEN";
pub const MANAGED_TOKEN_ENV: &str = "MANAGED_API_TOKEN";

/// Decode a JSON document into a raw payload type
pub(crate) fn decode<T: DeserializeOwned>(value: Value) -> Result<T> {
    serde_json::from_value(value).map_err(|e| DescribeError::Decode(e).into())
}

/// Overrides taken from the command line
#[derive(Debug, Clone, Default)]
pub struct ClientOverrides {
    pub token: Option<String>,
    pub org: Option<String>,
}

/// Provider clients for one invocation. A provider without credentials has no
/// client; asking for it is an error.
#[derive(Clone, Default)]
pub struct Clients {
    containers: Option<ContainersClient>,
    scm: Option<ScmClient>,
    managed: Option<ManagedClient>,
}

impl Clients {
    /// Build every client that has credentials
    pub fn from_config(config: &Config, overrides: &ClientOverrides) -> Result<Self> {
        let http = ProviderHttpClient::new()?;
        let token_flag = overrides.token.as_deref();

        let containers = resolve_token(token_flag, CONTAINERS_TOKEN_ENV, config.containers.token.as_deref())
            .map(|token| {
                let org = overrides
                    .org
                    .clone()
                    .or_else(|| config.containers.org.clone())
                    .unwrap_or_else(|| "personal".to_string());
                ContainersClient::new(http.clone(), token, config.containers.base_url.as_deref(), &org)
            });

        let scm = match resolve_token(token_flag, SCM_TOKEN_ENV, config.scm.token.as_deref()) {
            Some(token) => {
                let org = overrides.org.clone().or_else(|| config.scm.org.clone());
                org.map(|org| ScmClient::new(http.clone(), token, config.scm.base_url.as_deref(), &org))
            }
            None => None,
        };

        let managed = match (
            resolve_token(token_flag, MANAGED_TOKEN_ENV, config.managed.token.as_deref()),
            config.managed.base_url.as_deref(),
        ) {
            (Some(token), Some(base_url)) => Some(ManagedClient::new(
                http.clone(),
                token,
                base_url,
                config.managed.settings.clone(),
            )),
            _ => None,
        };

        tracing::debug!(
            containers = containers.is_some(),
            scm = scm.is_some(),
            managed = managed.is_some(),
            "Provider clients configured"
        );

        Ok(Self {
            containers,
            scm,
            managed,
        })
    }

    pub fn with_containers(mut self, client: ContainersClient) -> Self {
        self.containers = Some(client);
        self
    }

    pub fn with_scm(mut self, client: ScmClient) -> Self {
        self.scm = Some(client);
        self
    }

    pub fn with_managed(mut self, client: ManagedClient) -> Self {
        self.managed = Some(client);
        self
    }

    pub fn containers(&self) -> Result<&ContainersClient> {
        self.containers
            .as_ref()
            .with_context(|| format!("Container platform not configured. Set {}", CONTAINERS_TOKEN_ENV))
    }

    pub fn scm(&self) -> Result<&ScmClient> {
        self.scm.as_ref().with_context(|| {
            format!(
                "Source-control platform not configured. Set {} and an organization (--org)",
                SCM_TOKEN_ENV
            )
        })
    }

    pub fn managed(&self) -> Result<&ManagedClient> {
        self.managed.as_ref().with_context(|| {
            format!(
                "Managed-services platform not configured. Set {} and managed.base_url",
                MANAGED_TOKEN_ENV
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_client_is_an_error() {
        let clients = Clients::default();
        let err = clients.scm().err().unwrap();
        assert!(err.to_string().contains(SCM_TOKEN_ENV));
    }

    #[test]
    fn test_decode_error_is_typed() {
        let err = decode::<Vec<u8>>(serde_json::json!({"not": "a list"})).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<DescribeError>(),
            Some(DescribeError::Decode(_))
        ));
    }
}
