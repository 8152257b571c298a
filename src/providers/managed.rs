//! Managed-services platform
//!
//! Services are listed with cursor pagination. Hosted models live in model
//! directories; listing every model of a large account is expensive, so the
//! model describer samples the first directories and caps the pages it reads
//! per directory. Both thresholds come from [`ManagedSettings`].

use super::auth::ApiToken;
use super::decode;
use super::http::{with_query, ProviderHttpClient};
use crate::describer::{
    paginate, sample_first, Collector, Description, Page, PagePolicy, PageToken, Resource, Sink, Submitter,
};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use serde::{Deserialize, Serialize};

pub const DEFAULT_SAMPLE_DIRECTORIES: usize = 5;
pub const DEFAULT_MAX_MODEL_PAGES: usize = 10;

/// Sampling thresholds for the model describer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManagedSettings {
    #[serde(default = "default_sample_directories")]
    pub sample_directories: usize,
    #[serde(default = "default_max_model_pages")]
    pub max_model_pages: usize,
    #[serde(default = "default_page_size")]
    pub page_size: usize,
}

fn default_sample_directories() -> usize {
    DEFAULT_SAMPLE_DIRECTORIES
}

fn default_max_model_pages() -> usize {
    DEFAULT_MAX_MODEL_PAGES
}

fn default_page_size() -> usize {
    100
}

impl Default for ManagedSettings {
    fn default() -> Self {
        Self {
            sample_directories: DEFAULT_SAMPLE_DIRECTORIES,
            max_model_pages: DEFAULT_MAX_MODEL_PAGES,
            page_size: default_page_size(),
        }
    }
}

// =============================================================================
// Raw API payloads
// =============================================================================

#[derive(Debug, Deserialize)]
struct CursorList<T> {
    #[serde(default = "Vec::new")]
    items: Vec<T>,
    #[serde(default)]
    next_cursor: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawService {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(rename = "type", default)]
    pub service_type: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub plan: Option<String>,
    #[serde(default)]
    pub suspended: bool,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawDirectory {
    pub id: String,
    #[serde(default)]
    pub path: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawModel {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub task: Option<String>,
    #[serde(default)]
    pub size_bytes: Option<u64>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

// =============================================================================
// Descriptions
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceDescription {
    pub service_type: Option<String>,
    pub region: Option<String>,
    pub plan: Option<String>,
    pub suspended: bool,
    pub tags: Vec<String>,
    pub url: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelDescription {
    pub directory: String,
    pub version: Option<String>,
    pub task: Option<String>,
    pub size_bytes: Option<u64>,
    pub updated_at: Option<DateTime<Utc>>,
}

// =============================================================================
// Mappers
// =============================================================================

/// Services with neither a name nor tags carry nothing worth cataloging
pub fn map_service(service: RawService) -> Result<Option<Resource>> {
    let name = service.name.unwrap_or_default();
    let tags: Vec<String> = service
        .tags
        .into_iter()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .collect();

    if name.trim().is_empty() && tags.is_empty() {
        return Ok(None);
    }

    let description = ServiceDescription {
        service_type: service.service_type,
        region: service.region,
        plan: service.plan,
        suspended: service.suspended,
        tags,
        url: service.url,
        created_at: service.created_at,
    };
    Ok(Some(Resource::new(service.id, name, Description::ManagedService(description))))
}

/// Model ids repeat across directories, so the id is `<directory>/<model>`
pub fn map_model(directory: &RawDirectory, model: RawModel) -> Result<Option<Resource>> {
    let description = ModelDescription {
        directory: directory.path.clone(),
        version: model.version,
        task: model.task,
        size_bytes: model.size_bytes,
        updated_at: model.updated_at,
    };
    Ok(Some(Resource::new(
        format!("{}/{}", directory.id, model.id),
        model.name,
        Description::ManagedModel(description),
    )))
}

// =============================================================================
// Client
// =============================================================================

#[derive(Clone)]
pub struct ManagedClient {
    http: ProviderHttpClient,
    token: ApiToken,
    base_url: String,
    settings: ManagedSettings,
}

impl ManagedClient {
    pub fn new(http: ProviderHttpClient, token: ApiToken, base_url: &str, settings: ManagedSettings) -> Self {
        Self {
            http,
            token,
            base_url: base_url.trim_end_matches('/').to_string(),
            settings,
        }
    }

    pub fn settings(&self) -> &ManagedSettings {
        &self.settings
    }

    fn url(&self, path: &str) -> String {
        format!("{}/v1/{}", self.base_url, path)
    }

    async fn cursor_page<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        token: Option<PageToken>,
    ) -> Result<Page<T>> {
        let cursor = token.and_then(|t| t.as_cursor().map(str::to_string)).unwrap_or_default();
        let url = with_query(
            &self.url(path),
            &[("limit", self.settings.page_size.to_string()), ("cursor", cursor)],
        );
        let response = self.http.get(&url, self.token.as_str()).await?;
        let list: CursorList<T> = decode(response).with_context(|| format!("Failed to decode {} page", path))?;
        Ok(Page::cursor(list.items, list.next_cursor))
    }

    pub async fn services_page(&self, token: Option<PageToken>) -> Result<Page<RawService>> {
        self.cursor_page("services", token).await
    }

    pub async fn list_directories_raw(&self) -> Result<Vec<RawDirectory>> {
        let response = self.http.get(&self.url("models/directories"), self.token.as_str()).await?;
        let list: CursorList<RawDirectory> = decode(response).context("Failed to decode model directories")?;
        Ok(list.items)
    }

    pub async fn models_page(&self, directory_id: &str, token: Option<PageToken>) -> Result<Page<RawModel>> {
        let path = format!("models/directories/{}/models", urlencoding::encode(directory_id));
        self.cursor_page(&path, token).await
    }
}

// =============================================================================
// Describers
// =============================================================================

pub async fn list_services(
    client: &ManagedClient,
    collector: &Collector,
    sink: Option<&mut dyn Sink>,
) -> Result<Vec<Resource>> {
    let client = client.clone();
    collector
        .collect(
            move |s: Submitter| async move {
                let pages = paginate(PagePolicy::unbounded(), None, |token| client.services_page(token));
                futures::pin_mut!(pages);
                while let Some(services) = pages.try_next().await? {
                    s.submit_all(services, map_service).await?;
                }
                Ok(())
            },
            sink,
        )
        .await
}

/// Models of the first `sample_directories` directories, reading at most
/// `max_model_pages` pages from each
pub async fn list_models(
    client: &ManagedClient,
    collector: &Collector,
    sink: Option<&mut dyn Sink>,
) -> Result<Vec<Resource>> {
    let client = client.clone();
    collector
        .collect(
            move |s: Submitter| async move {
                let directories = client.list_directories_raw().await?;
                let directories = sample_first(directories, client.settings.sample_directories);
                let policy = PagePolicy::capped(client.settings.max_model_pages);

                for directory in directories {
                    let pages = paginate(policy, None, |token| client.models_page(&directory.id, token));
                    futures::pin_mut!(pages);
                    while let Some(models) = pages.try_next().await? {
                        let dir = directory.clone();
                        s.submit_all(models, move |model| map_model(&dir, model)).await?;
                    }
                }
                Ok(())
            },
            sink,
        )
        .await
}
