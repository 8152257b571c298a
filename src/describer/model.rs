//! Normalized resource representation

use crate::providers::containers::{AppDescription, MachineDescription, VolumeDescription};
use crate::providers::managed::{ModelDescription, ServiceDescription};
use crate::providers::scm::{RepositoryDescription, TeamDescription, WebhookDescription};
use serde::{Deserialize, Serialize};

/// One normalized inventory entry.
///
/// `id` is unique within a single listing call. `name` is a display label and
/// may be empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    pub id: String,
    pub name: String,
    pub description: Description,
}

impl Resource {
    pub fn new(id: impl Into<String>, name: impl Into<String>, description: Description) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description,
        }
    }

    /// Resource kind tag, as serialized
    pub fn kind(&self) -> &'static str {
        self.description.kind()
    }
}

/// Provider-specific payload, tagged by resource kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Description {
    ContainerApp(AppDescription),
    ContainerMachine(MachineDescription),
    ContainerVolume(VolumeDescription),
    ScmRepository(RepositoryDescription),
    ScmWebhook(WebhookDescription),
    ScmTeam(TeamDescription),
    ManagedService(ServiceDescription),
    ManagedModel(ModelDescription),
    /// Free-form payload for ad-hoc describers and tests
    Raw(RawDescription),
}

impl Description {
    pub fn kind(&self) -> &'static str {
        match self {
            Description::ContainerApp(_) => "container_app",
            Description::ContainerMachine(_) => "container_machine",
            Description::ContainerVolume(_) => "container_volume",
            Description::ScmRepository(_) => "scm_repository",
            Description::ScmWebhook(_) => "scm_webhook",
            Description::ScmTeam(_) => "scm_team",
            Description::ManagedService(_) => "managed_service",
            Description::ManagedModel(_) => "managed_model",
            Description::Raw(_) => "raw",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawDescription {
    pub value: serde_json::Value,
}

impl From<serde_json::Value> for Description {
    fn from(value: serde_json::Value) -> Self {
        Description::Raw(RawDescription { value })
    }
}
