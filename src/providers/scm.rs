//! Source-control platform
//!
//! Repositories and webhooks come from the REST API with page-number
//! pagination (`per_page=100`, a short page is the last one). Teams come from
//! the GraphQL API with cursor pagination.

use super::auth::ApiToken;
use super::decode;
use super::http::{with_query, ProviderHttpClient};
use crate::describer::{
    describe_one, paginate, Collector, DescribeError, Description, Page, PagePolicy, PageToken, Resource, Sink,
    Submitter,
};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

pub const DEFAULT_BASE_URL: &str = "https://api.github.com";

/// REST page size; a page with fewer items ends the listing
pub const PER_PAGE: usize = 100;

const TEAMS_QUERY: &str = r#"query($org: String!, $cursor: String) {
  organization(login: $org) {
    teams(first: 100, after: $cursor) {
      pageInfo { hasNextPage endCursor }
      nodes { id slug name description privacy members { totalCount } }
    }
  }
}"#;

// =============================================================================
// Raw API payloads
// =============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct RawRepository {
    pub id: u64,
    pub name: String,
    pub full_name: String,
    #[serde(default)]
    pub private: bool,
    #[serde(default)]
    pub archived: bool,
    #[serde(default)]
    pub default_branch: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub html_url: Option<String>,
    #[serde(default)]
    pub stargazers_count: u64,
    #[serde(default)]
    pub topics: Vec<String>,
    #[serde(default)]
    pub pushed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawWebhook {
    pub id: u64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub active: bool,
    #[serde(default)]
    pub events: Vec<String>,
    #[serde(default)]
    pub config: RawHookConfig,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawHookConfig {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub content_type: Option<String>,
    /// "0" or "1" on the wire
    #[serde(default)]
    pub insecure_ssl: Option<Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawTeam {
    pub id: String,
    pub slug: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub privacy: Option<String>,
    #[serde(default)]
    pub members: Option<TotalCount>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TotalCount {
    #[serde(rename = "totalCount")]
    pub total_count: u64,
}

#[derive(Debug, Deserialize)]
struct PageInfo {
    #[serde(rename = "hasNextPage")]
    has_next_page: bool,
    #[serde(rename = "endCursor")]
    end_cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TeamConnection {
    #[serde(rename = "pageInfo")]
    page_info: PageInfo,
    #[serde(default)]
    nodes: Vec<RawTeam>,
}

// =============================================================================
// Descriptions
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepositoryDescription {
    pub full_name: String,
    pub private: bool,
    pub archived: bool,
    pub default_branch: Option<String>,
    pub language: Option<String>,
    pub url: Option<String>,
    pub stars: u64,
    pub topics: Vec<String>,
    pub pushed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookDescription {
    pub repository: String,
    pub active: bool,
    pub events: Vec<String>,
    pub url: Option<String>,
    pub content_type: Option<String>,
    pub insecure_ssl: bool,
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamDescription {
    pub org: String,
    pub slug: String,
    pub description: Option<String>,
    pub privacy: Option<String>,
    pub member_count: u64,
}

// =============================================================================
// Mappers
// =============================================================================

pub fn map_repository(repo: RawRepository) -> Result<Option<Resource>> {
    let description = RepositoryDescription {
        full_name: repo.full_name.clone(),
        private: repo.private,
        archived: repo.archived,
        default_branch: repo.default_branch,
        language: repo.language,
        url: repo.html_url,
        stars: repo.stargazers_count,
        topics: repo.topics,
        pushed_at: repo.pushed_at,
    };
    Ok(Some(Resource::new(
        repo.id.to_string(),
        repo.name,
        Description::ScmRepository(description),
    )))
}

/// Hook ids are only unique per repository, so the id is `<repo>/hooks/<id>`
pub fn map_webhook(repository: &str, hook: RawWebhook) -> Result<Option<Resource>> {
    let insecure_ssl = match &hook.config.insecure_ssl {
        Some(Value::String(s)) => s == "1",
        Some(Value::Number(n)) => n.as_u64() == Some(1),
        _ => false,
    };
    let name = hook.config.url.clone().unwrap_or(hook.name);

    let description = WebhookDescription {
        repository: repository.to_string(),
        active: hook.active,
        events: hook.events,
        url: hook.config.url,
        content_type: hook.config.content_type,
        insecure_ssl,
        created_at: hook.created_at,
    };
    Ok(Some(Resource::new(
        format!("{}/hooks/{}", repository, hook.id),
        name,
        Description::ScmWebhook(description),
    )))
}

pub fn map_team(org: &str, team: RawTeam) -> Result<Option<Resource>> {
    let description = TeamDescription {
        org: org.to_string(),
        slug: team.slug,
        description: team.description.filter(|d| !d.is_empty()),
        privacy: team.privacy,
        member_count: team.members.map(|m| m.total_count).unwrap_or(0),
    };
    Ok(Some(Resource::new(team.id, team.name, Description::ScmTeam(description))))
}

// =============================================================================
// Client
// =============================================================================

#[derive(Clone)]
pub struct ScmClient {
    http: ProviderHttpClient,
    token: ApiToken,
    base_url: String,
    org: String,
}

impl ScmClient {
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
        format!("{}/{}", self.base_url, path)
    }

    fn paged_url(&self, path: &str, token: Option<PageToken>) -> (String, u32) {
        let page = token.and_then(|t| t.as_number()).unwrap_or(1);
        let url = with_query(
            &self.url(path),
            &[("per_page", PER_PAGE.to_string()), ("page", page.to_string())],
        );
        (url, page)
    }

    pub async fn repositories_page(&self, token: Option<PageToken>) -> Result<Page<RawRepository>> {
        let path = format!("orgs/{}/repos", urlencoding::encode(&self.org));
        let (url, page) = self.paged_url(&path, token);
        let response = self.http.get(&url, self.token.as_str()).await?;
        let items: Vec<RawRepository> = decode(response).context("Failed to decode repository page")?;
        Ok(Page::numbered(items, page, PER_PAGE))
    }

    /// `full_name` is `owner/repo`
    pub async fn get_repository_raw(&self, full_name: &str) -> Result<RawRepository> {
        let response = self
            .http
            .get(&self.url(&format!("repos/{}", full_name)), self.token.as_str())
            .await?;
        decode(response).with_context(|| format!("Failed to decode repository {}", full_name))
    }

    pub async fn webhooks_page(&self, full_name: &str, token: Option<PageToken>) -> Result<Page<RawWebhook>> {
        let (url, page) = self.paged_url(&format!("repos/{}/hooks", full_name), token);
        let response = self.http.get(&url, self.token.as_str()).await?;
        let items: Vec<RawWebhook> = decode(response).context("Failed to decode webhook page")?;
        Ok(Page::numbered(items, page, PER_PAGE))
    }

    pub async fn teams_page(&self, token: Option<PageToken>) -> Result<Page<RawTeam>> {
        let cursor = token.and_then(|t| t.as_cursor().map(str::to_string));
        let body = json!({
            "query": TEAMS_QUERY,
            "variables": { "org": self.org, "cursor": cursor },
        });
        let response = self
            .http
            .post(&self.url("graphql"), self.token.as_str(), &body)
            .await?;

        if let Some(message) = graphql_error(&response) {
            return Err(anyhow::anyhow!("GraphQL error: {}", message));
        }

        let connection = response
            .pointer("/data/organization/teams")
            .cloned()
            .context("GraphQL response has no organization teams")?;
        let connection: TeamConnection = decode(connection).context("Failed to decode team page")?;

        let next = if connection.page_info.has_next_page {
            connection.page_info.end_cursor
        } else {
            None
        };
        Ok(Page::cursor(connection.nodes, next))
    }
}

fn graphql_error(response: &Value) -> Option<String> {
    let errors = response.get("errors")?.as_array()?;
    let first = errors.first()?;
    Some(
        first
            .get("message")
            .and_then(|m| m.as_str())
            .unwrap_or("unknown error")
            .to_string(),
    )
}

/// Repositories whose hooks are not visible to the token are skipped
fn hooks_not_visible(error: &anyhow::Error) -> bool {
    error
        .chain()
        .find_map(|e| e.downcast_ref::<DescribeError>())
        .and_then(DescribeError::status)
        .is_some_and(|status| status == 403 || status == 404)
}

// =============================================================================
// Describers
// =============================================================================

pub async fn list_repositories(
    client: &ScmClient,
    collector: &Collector,
    sink: Option<&mut dyn Sink>,
) -> Result<Vec<Resource>> {
    let client = client.clone();
    collector
        .collect(
            move |s: Submitter| async move {
                let pages = paginate(PagePolicy::unbounded(), None, |token| client.repositories_page(token));
                futures::pin_mut!(pages);
                while let Some(repos) = pages.try_next().await? {
                    s.submit_all(repos, map_repository).await?;
                }
                Ok(())
            },
            sink,
        )
        .await
}

pub async fn get_repository(client: &ScmClient, full_name: &str) -> Result<Option<Resource>> {
    describe_one(client.get_repository_raw(full_name), map_repository).await
}

/// Webhooks of every repository in the organization
pub async fn list_webhooks(
    client: &ScmClient,
    collector: &Collector,
    sink: Option<&mut dyn Sink>,
) -> Result<Vec<Resource>> {
    let client = client.clone();
    collector
        .collect(
            move |s: Submitter| async move {
                let mut repositories = Vec::new();
                let pages = paginate(PagePolicy::unbounded(), None, |token| client.repositories_page(token));
                futures::pin_mut!(pages);
                while let Some(repos) = pages.try_next().await? {
                    repositories.extend(repos.into_iter().filter(|r| !r.archived).map(|r| r.full_name));
                }

                for repository in repositories {
                    let hooks = paginate(PagePolicy::unbounded(), None, |token| {
                        client.webhooks_page(&repository, token)
                    });
                    futures::pin_mut!(hooks);
                    loop {
                        let page = match hooks.try_next().await {
                            Ok(Some(page)) => page,
                            Ok(None) => break,
                            Err(e) if hooks_not_visible(&e) => {
                                tracing::debug!(repository = %repository, "Hooks not visible, skipping");
                                break;
                            }
                            Err(e) => return Err(e),
                        };
                        let repo = repository.clone();
                        s.submit_all(page, move |hook| map_webhook(&repo, hook)).await?;
                    }
                }
                Ok(())
            },
            sink,
        )
        .await
}

pub async fn list_teams(
    client: &ScmClient,
    collector: &Collector,
    sink: Option<&mut dyn Sink>,
) -> Result<Vec<Resource>> {
    let client = client.clone();
    collector
        .collect(
            move |s: Submitter| async move {
                let pages = paginate(PagePolicy::unbounded(), None, |token| client.teams_page(token));
                futures::pin_mut!(pages);
                while let Some(teams) = pages.try_next().await? {
                    let org = client.org.clone();
                    s.submit_all(teams, move |team| map_team(&org, team)).await?;
                }
                Ok(())
            },
            sink,
        )
        .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_repository() {
        let repo: RawRepository = serde_json::from_value(json!({
            "id": 42,
            "name": "api",
            "full_name": "acme/api",
            "private": true,
            "default_branch": "main",
            "stargazers_count": 7,
            "topics": ["rust"]
        }))
        .unwrap();

        let resource = map_repository(repo).unwrap().unwrap();
        assert_eq!(resource.id, "42");
        assert_eq!(resource.name, "api");
        let Description::ScmRepository(desc) = resource.description else {
            panic!("expected repository description");
        };
        assert!(desc.private);
        assert_eq!(desc.stars, 7);
        assert_eq!(desc.topics, vec!["rust"]);
    }

    #[test]
    fn test_map_webhook_synthesizes_id() {
        let hook: RawWebhook = serde_json::from_value(json!({
            "id": 9,
            "name": "web",
            "active": true,
            "events": ["push"],
            "config": {"url": "https://hooks.example/ci", "content_type": "json", "insecure_ssl": "1"}
        }))
        .unwrap();

        let resource = map_webhook("acme/api", hook).unwrap().unwrap();
        assert_eq!(resource.id, "acme/api/hooks/9");
        assert_eq!(resource.name, "https://hooks.example/ci");
        let Description::ScmWebhook(desc) = resource.description else {
            panic!("expected webhook description");
        };
        assert!(desc.insecure_ssl);
        assert_eq!(desc.events, vec!["push"]);
    }

    #[test]
    fn test_map_team_counts_members() {
        let team: RawTeam = serde_json::from_value(json!({
            "id": "T_1",
            "slug": "core",
            "name": "Core",
            "description": "",
            "members": {"totalCount": 5}
        }))
        .unwrap();

        let resource = map_team("acme", team).unwrap().unwrap();
        let Description::ScmTeam(desc) = resource.description else {
            panic!("expected team description");
        };
        assert_eq!(desc.member_count, 5);
        assert!(desc.description.is_none());
    }

    #[test]
    fn test_graphql_error_extraction() {
        let response = json!({"errors": [{"message": "Bad credentials"}]});
        assert_eq!(graphql_error(&response).as_deref(), Some("Bad credentials"));
        assert!(graphql_error(&json!({"data": {}})).is_none());
    }

    #[test]
    fn test_hooks_not_visible_on_404() {
        let err = anyhow::Error::from(DescribeError::Api {
            status: 404,
            message: String::new(),
        });
        assert!(hooks_not_visible(&err));
        assert!(!hooks_not_visible(&anyhow::anyhow!("boom")));
    }
}
