//! Container-app platform
//!
//! Apps, machines and volumes from the platform's Machines REST API. Apps are
//! listed per organization; machines and volumes are listed per app, so those
//! describers walk every app of the organization.

use super::auth::ApiToken;
use super::decode;
use super::http::{with_query, ProviderHttpClient};
use crate::describer::{describe_one, Collector, Description, Resource, Sink, Submitter};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const DEFAULT_BASE_URL: &str = "https://api.machines.dev";

// =============================================================================
// Raw API payloads
// =============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct RawApp {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub machine_count: u32,
    #[serde(default)]
    pub network: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AppsResponse {
    #[serde(default)]
    apps: Vec<RawApp>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawMachine {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub region: String,
    #[serde(default)]
    pub private_ip: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub config: Option<RawMachineConfig>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawMachineConfig {
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub guest: Option<RawGuest>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawGuest {
    #[serde(default)]
    pub cpu_kind: Option<String>,
    #[serde(default)]
    pub cpus: u32,
    #[serde(default)]
    pub memory_mb: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawVolume {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub region: String,
    #[serde(default)]
    pub size_gb: u32,
    #[serde(default)]
    pub encrypted: bool,
    #[serde(default)]
    pub attached_machine_id: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

// =============================================================================
// Descriptions
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppDescription {
    pub org: String,
    pub machine_count: u32,
    pub network: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MachineDescription {
    pub app: String,
    pub state: String,
    pub region: String,
    pub image: Option<String>,
    pub cpu_kind: Option<String>,
    pub cpus: u32,
    pub memory_mb: u32,
    /// Environment variable names only; values may hold secrets
    pub env_keys: Vec<String>,
    pub metadata: BTreeMap<String, String>,
    pub private_ip: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VolumeDescription {
    pub app: String,
    pub state: String,
    pub region: String,
    pub size_gb: u32,
    pub encrypted: bool,
    pub attached_machine_id: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
}

// =============================================================================
// Mappers
// =============================================================================

pub fn map_app(org: &str, app: RawApp) -> Result<Option<Resource>> {
    let description = AppDescription {
        org: org.to_string(),
        machine_count: app.machine_count,
        network: app.network,
    };
    Ok(Some(Resource::new(app.id, app.name, Description::ContainerApp(description))))
}

/// Shared by the list and get machine paths
pub fn map_machine(app: &str, machine: RawMachine) -> Result<Option<Resource>> {
    let config = machine.config.unwrap_or_default();
    let (cpu_kind, cpus, memory_mb) = match config.guest {
        Some(guest) => (guest.cpu_kind, guest.cpus, guest.memory_mb),
        None => (None, 0, 0),
    };

    let description = MachineDescription {
        app: app.to_string(),
        state: machine.state,
        region: machine.region,
        image: config.image,
        cpu_kind,
        cpus,
        memory_mb,
        env_keys: config.env.into_keys().collect(),
        metadata: config.metadata,
        private_ip: machine.private_ip,
        created_at: machine.created_at,
    };
    Ok(Some(Resource::new(
        machine.id,
        machine.name,
        Description::ContainerMachine(description),
    )))
}

pub fn map_volume(app: &str, volume: RawVolume) -> Result<Option<Resource>> {
    let description = VolumeDescription {
        app: app.to_string(),
        state: volume.state,
        region: volume.region,
        size_gb: volume.size_gb,
        encrypted: volume.encrypted,
        attached_machine_id: volume.attached_machine_id,
        created_at: volume.created_at,
    };
    Ok(Some(Resource::new(
        volume.id,
        volume.name,
        Description::ContainerVolume(description),
    )))
}

// =============================================================================
// Client
// =============================================================================

#[derive(Clone)]
pub struct ContainersClient {
    http: ProviderHttpClient,
    token: ApiToken,
    base_url: String,
    org: String,
}

impl ContainersClient {
    pub fn new(http: ProviderHttpClient, token: ApiToken, base_url: Option<&str>, org: &str) -> Self {
        Self {
            http,
            token,
            base_url: base_url
                .unwrap_or(DEFAULT_BASE_URL)
                .trim_end_matches('/')
                .to_string(),
            org: org.to_string(),
        }
    }

    pub fn org(&self) -> &str {
        &self.org
    }

    fn url(&self, path: &str) -> String {
        format!("{}/v1/{}", self.base_url, path)
    }

    fn app_url(&self, app: &str, resource: &str) -> String {
        self.url(&format!("apps/{}/{}", urlencoding::encode(app), resource))
    }

    pub async fn list_apps_raw(&self) -> Result<Vec<RawApp>> {
        let url = with_query(&self.url("apps"), &[("org_slug", self.org.clone())]);
        let response = self.http.get(&url, self.token.as_str()).await?;
        let apps: AppsResponse = decode(response).context("Failed to decode app list")?;
        Ok(apps.apps)
    }

    pub async fn list_machines_raw(&self, app: &str) -> Result<Vec<RawMachine>> {
        let response = self.http.get(&self.app_url(app, "machines"), self.token.as_str()).await?;
        decode(response).with_context(|| format!("Failed to decode machines of {}", app))
    }

    pub async fn get_machine_raw(&self, app: &str, machine_id: &str) -> Result<RawMachine> {
        let url = self.app_url(app, &format!("machines/{}", urlencoding::encode(machine_id)));
        let response = self.http.get(&url, self.token.as_str()).await?;
        decode(response).with_context(|| format!("Failed to decode machine {}", machine_id))
    }

    pub async fn list_volumes_raw(&self, app: &str) -> Result<Vec<RawVolume>> {
        let response = self.http.get(&self.app_url(app, "volumes"), self.token.as_str()).await?;
        decode(response).with_context(|| format!("Failed to decode volumes of {}", app))
    }

    /// Apps to walk: the given one, or every app of the organization
    async fn app_names(&self, app: Option<&str>) -> Result<Vec<String>> {
        match app {
            Some(app) => Ok(vec![app.to_string()]),
            None => Ok(self.list_apps_raw().await?.into_iter().map(|a| a.name).collect()),
        }
    }
}

// =============================================================================
// Describers
// =============================================================================

pub async fn list_apps(
    client: &ContainersClient,
    collector: &Collector,
    sink: Option<&mut dyn Sink>,
) -> Result<Vec<Resource>> {
    let client = client.clone();
    collector
        .collect(
            move |s: Submitter| async move {
                let apps = client.list_apps_raw().await?;
                tracing::debug!(count = apps.len(), org = %client.org, "Listed apps");
                let org = client.org.clone();
                s.submit_all(apps, move |app| map_app(&org, app)).await
            },
            sink,
        )
        .await
}

/// Machines of one app, or of every app in the organization
pub async fn list_machines(
    client: &ContainersClient,
    app: Option<&str>,
    collector: &Collector,
    sink: Option<&mut dyn Sink>,
) -> Result<Vec<Resource>> {
    let client = client.clone();
    let app = app.map(str::to_string);
    collector
        .collect(
            move |s: Submitter| async move {
                for app in client.app_names(app.as_deref()).await? {
                    let machines = client.list_machines_raw(&app).await?;
                    tracing::debug!(count = machines.len(), app = %app, "Listed machines");
                    s.submit_all(machines, move |m| map_machine(&app, m)).await?;
                }
                Ok(())
            },
            sink,
        )
        .await
}

pub async fn get_machine(client: &ContainersClient, app: &str, machine_id: &str) -> Result<Option<Resource>> {
    describe_one(client.get_machine_raw(app, machine_id), |m| map_machine(app, m)).await
}

pub async fn list_volumes(
    client: &ContainersClient,
    app: Option<&str>,
    collector: &Collector,
    sink: Option<&mut dyn Sink>,
) -> Result<Vec<Resource>> {
    let client = client.clone();
    let app = app.map(str::to_string);
    collector
        .collect(
            move |s: Submitter| async move {
                for app in client.app_names(app.as_deref()).await? {
                    let volumes = client.list_volumes_raw(&app).await?;
                    s.submit_all(volumes, move |v| map_volume(&app, v)).await?;
                }
                Ok(())
            },
            sink,
        )
        .await
}
