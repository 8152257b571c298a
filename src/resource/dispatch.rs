//! Describer Dispatch
//!
//! Maps registry method names to the provider describers.

use super::registry::get_resource;
use crate::describer::{Collector, Resource, Sink};
use crate::providers::{containers, managed, scm, Clients};
use anyhow::{bail, Context, Result};

/// List every resource of one type
pub async fn describe(
    resource_key: &str,
    clients: &Clients,
    collector: &Collector,
    scope: Option<&str>,
    sink: Option<&mut dyn Sink>,
) -> Result<Vec<Resource>> {
    let Some(resource_def) = get_resource(resource_key) else {
        bail!("Unknown resource: {}", resource_key);
    };

    tracing::info!(
        "describe: resource={}, provider={}, method={}",
        resource_key,
        resource_def.provider,
        resource_def.list_method
    );

    if scope.is_some() && resource_def.scope_param.is_none() {
        tracing::warn!("{} cannot be narrowed, ignoring scope", resource_key);
    }
    let scope = scope.filter(|_| resource_def.scope_param.is_some());

    let method = resource_def.list_method.as_str();
    let result = match resource_def.provider.as_str() {
        "containers" => invoke_containers(method, clients, collector, scope, sink).await,
        "scm" => invoke_scm(method, clients, collector, sink).await,
        "managed" => invoke_managed(method, clients, collector, sink).await,
        provider => Err(anyhow::anyhow!("Unknown provider: {}", provider)),
    };
    result.with_context(|| format!("Failed to describe {}", resource_def.display_name))
}

/// Describe a single resource by id, bounded by the collector's
/// cancellation token and deadline
pub async fn describe_single(
    resource_key: &str,
    clients: &Clients,
    collector: &Collector,
    scope: Option<&str>,
    resource_id: &str,
) -> Result<Option<Resource>> {
    let Some(resource_def) = get_resource(resource_key) else {
        bail!("Unknown resource: {}", resource_key);
    };
    let Some(method) = resource_def.get_method.as_deref() else {
        bail!("{} cannot be described by id", resource_def.display_name);
    };

    tracing::info!(
        "describe_single: resource={}, method={}, id={}",
        resource_key,
        method,
        resource_id
    );

    let request = async {
        match method {
            "get_machine" => {
                let (app, machine_id) = split_scoped_id(scope, resource_id)?;
                containers::get_machine(clients.containers()?, app, machine_id).await
            }
            "get_repository" => {
                let full_name = match scope {
                    Some(owner) if !resource_id.contains('/') => format!("{}/{}", owner, resource_id),
                    _ if resource_id.contains('/') => resource_id.to_string(),
                    _ => format!("{}/{}", clients.scm()?.org(), resource_id),
                };
                scm::get_repository(clients.scm()?, &full_name).await
            }
            _ => Err(anyhow::anyhow!("Unknown get method: {}", method)),
        }
    };
    collector.bounded(request).await
}

/// `--app web --get 123` and `--get web/123` both name machine 123 of app web
fn split_scoped_id<'a>(scope: Option<&'a str>, resource_id: &'a str) -> Result<(&'a str, &'a str)> {
    if let Some(scope) = scope {
        return Ok((scope, resource_id));
    }
    match resource_id.split_once('/') {
        Some((parent, id)) if !parent.is_empty() && !id.is_empty() => Ok((parent, id)),
        _ => bail!("Expected <parent>/<id> or a scope for {}", resource_id),
    }
}

// =============================================================================
// Container platform
// =============================================================================

async fn invoke_containers(
    method: &str,
    clients: &Clients,
    collector: &Collector,
    scope: Option<&str>,
    sink: Option<&mut dyn Sink>,
) -> Result<Vec<Resource>> {
    let client = clients.containers()?;
    match method {
        "list_apps" => containers::list_apps(client, collector, sink).await,
        "list_machines" => containers::list_machines(client, scope, collector, sink).await,
        "list_volumes" => containers::list_volumes(client, scope, collector, sink).await,
        _ => Err(anyhow::anyhow!("Unknown containers method: {}", method)),
    }
}

// =============================================================================
// Source control
// =============================================================================

async fn invoke_scm(
    method: &str,
    clients: &Clients,
    collector: &Collector,
    sink: Option<&mut dyn Sink>,
) -> Result<Vec<Resource>> {
    let client = clients.scm()?;
    match method {
        "list_repositories" => scm::list_repositories(client, collector, sink).await,
        "list_webhooks" => scm::list_webhooks(client, collector, sink).await,
        "list_teams" => scm::list_teams(client, collector, sink).await,
        _ => Err(anyhow::anyhow!("Unknown scm method: {}", method)),
    }
}

// =============================================================================
// Managed services
// =============================================================================

async fn invoke_managed(
    method: &str,
    clients: &Clients,
    collector: &Collector,
    sink: Option<&mut dyn Sink>,
) -> Result<Vec<Resource>> {
    let client = clients.managed()?;
    match method {
        "list_services" => managed::list_services(client, collector, sink).await,
        "list_models" => managed::list_models(client, collector, sink).await,
        _ => Err(anyhow::anyhow!("Unknown managed method: {}", method)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_scoped_id() {
        assert_eq!(split_scoped_id(Some("web"), "m1").unwrap(), ("web", "m1"));
        assert_eq!(split_scoped_id(None, "web/m1").unwrap(), ("web", "m1"));
        assert!(split_scoped_id(None, "m1").is_err());
        assert!(split_scoped_id(None, "/m1").is_err());
    }

    #[tokio::test]
    async fn test_unknown_resource_is_an_error() {
        let err = describe("nope", &Clients::default(), &Collector::default(), None, None)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Unknown resource"));
    }

    #[tokio::test]
    async fn test_get_unsupported_for_teams() {
        let err = describe_single("scm-teams", &Clients::default(), &Collector::default(), None, "core")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("cannot be described by id"));
    }

    #[tokio::test]
    async fn test_unconfigured_provider_reports_missing_token() {
        let err = describe(
            "container-apps",
            &Clients::default(),
            &Collector::default(),
            None,
            None,
        )
        .await
        .unwrap_err();
        assert!(format!("{:#}", err).contains("CONTAINERS_API_TOKEN"));
    }
}
