//! Supabase client for projects, saved comparisons and premium status.

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use reqwest::{Client, RequestBuilder, StatusCode, Url};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{ComparisonStore, EntitlementSource, ProjectStore};
use crate::config::SupabaseConfig;
use crate::schema::{NewComparison, NewProject, Project, SavedComparison};

const COMPARISONS_SELECT: &str =
    "*,projectA:projects!project_a_id(address),projectB:projects!project_b_id(address)";

/// Supabase REST and Auth admin client.
#[derive(Clone)]
pub struct SupabaseClient {
    client: Client,
    base_url: String,
    service_role_key: String,
}

impl SupabaseClient {
    pub fn new(config: &SupabaseConfig) -> Self {
        Self {
            client: Client::new(),
            base_url: config.url.clone(),
            service_role_key: config.service_role_key.clone(),
        }
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header("apikey", &self.service_role_key)
            .header("Authorization", format!("Bearer {}", self.service_role_key))
    }

    /// Auth admin URL for one user, the id pushed as a single escaped segment.
    fn admin_user_url(&self, user_id: &str) -> Result<Url> {
        let mut url = Url::parse(&self.base_url).context("Invalid Supabase URL")?;
        url.path_segments_mut()
            .map_err(|_| anyhow!("Supabase URL cannot be a base: {}", self.base_url))?
            .pop_if_empty()
            .extend(["auth", "v1", "admin", "users", user_id]);
        Ok(url)
    }

    /// Helper: GET rows from a table.
    async fn select<T: DeserializeOwned>(&self, table: &str, query: &[(&str, String)]) -> Result<T> {
        let url = format!("{}/rest/v1/{}", self.base_url, table);
        let resp = self
            .authorized(self.client.get(&url))
            .query(query)
            .send()
            .await
            .with_context(|| format!("Supabase GET {} failed", table))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(anyhow!("Supabase GET {} failed: {} - {}", table, status, text));
        }

        Ok(resp.json().await?)
    }

    /// Helper: insert one row and return its stored representation.
    async fn insert<B: Serialize, T: DeserializeOwned>(
        &self,
        table: &str,
        query: &[(&str, String)],
        body: &B,
    ) -> Result<T> {
        let url = format!("{}/rest/v1/{}", self.base_url, table);
        let resp = self
            .authorized(self.client.post(&url))
            .query(query)
            .header("Content-Type", "application/json")
            .header("Prefer", "return=representation")
            .json(body)
            .send()
            .await
            .with_context(|| format!("Supabase insert into {} failed", table))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(anyhow!("Failed to insert into {}: {} - {}", table, status, text));
        }

        let rows: Vec<T> = resp.json().await?;
        rows.into_iter()
            .next()
            .ok_or_else(|| anyhow!("Supabase returned no row for insert into {}", table))
    }
}

#[async_trait::async_trait]
impl ProjectStore for SupabaseClient {
    async fn insert_project(&self, project: NewProject) -> Result<Project> {
        debug!("Inserting project for {}", project.address);
        let stored: Project = self.insert("projects", &[], &project).await?;
        info!("Stored project {} in Supabase", stored.id);
        Ok(stored)
    }

    async fn fetch_projects(&self, ids: &[String]) -> Result<Vec<Project>> {
        self.select("projects", &[("select", "*".to_string()), ("id", in_filter(ids))])
            .await
    }

    async fn fetch_projects_by_owner(&self, owner_id: &str) -> Result<Vec<Project>> {
        self.select(
            "projects",
            &[
                ("select", "*".to_string()),
                ("user_id", format!("eq.{}", owner_id)),
                ("order", "created_at.desc".to_string()),
            ],
        )
        .await
    }

    async fn fetch_project(&self, id: &str) -> Result<Option<Project>> {
        let rows: Vec<Project> = self
            .select(
                "projects",
                &[("select", "*".to_string()), ("id", format!("eq.{}", id))],
            )
            .await?;
        Ok(rows.into_iter().next())
    }
}

#[async_trait::async_trait]
impl ComparisonStore for SupabaseClient {
    async fn insert_comparison(&self, comparison: NewComparison) -> Result<SavedComparison> {
        let stored: SavedComparison = self
            .insert(
                "saved_comparisons",
                &[("select", COMPARISONS_SELECT.to_string())],
                &comparison,
            )
            .await?;
        info!("Stored comparison {} in Supabase", stored.id);
        Ok(stored)
    }

    async fn fetch_comparisons_by_owner(&self, owner_id: &str) -> Result<Vec<SavedComparison>> {
        self.select(
            "saved_comparisons",
            &[
                ("select", COMPARISONS_SELECT.to_string()),
                ("user_id", format!("eq.{}", owner_id)),
                ("order", "created_at.desc".to_string()),
            ],
        )
        .await
    }
}

#[derive(Debug, Deserialize)]
struct AdminUser {
    #[serde(default)]
    user_metadata: UserMetadata,
}

#[derive(Debug, Default, Deserialize)]
struct UserMetadata {
    #[serde(default)]
    premium_until: Option<DateTime<Utc>>,
}

#[async_trait::async_trait]
impl EntitlementSource for SupabaseClient {
    async fn premium_until(&self, user_id: &str) -> Result<Option<DateTime<Utc>>> {
        // Auth user ids are always UUIDs; anything else cannot hold premium.
        if Uuid::parse_str(user_id).is_err() {
            warn!("Ignoring entitlement lookup for malformed user id {:?}", user_id);
            return Ok(None);
        }

        let url = self.admin_user_url(user_id)?;
        let resp = self
            .authorized(self.client.get(url))
            .send()
            .await
            .context("Supabase user lookup failed")?;

        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(anyhow!("Supabase user lookup failed: {} - {}", status, text));
        }

        let user: AdminUser = resp.json().await?;
        Ok(user.user_metadata.premium_until)
    }
}

/// PostgREST `in` filter with each id double-quoted.
fn in_filter(ids: &[String]) -> String {
    let quoted: Vec<String> = ids
        .iter()
        .map(|id| format!("\"{}\"", id.replace('"', "")))
        .collect();
    format!("in.({})", quoted.join(","))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_filter() {
        let ids = vec!["a1".to_string(), "b\"2".to_string()];
        assert_eq!(in_filter(&ids), r#"in.("a1","b2")"#);
    }

    fn client(base_url: &str) -> SupabaseClient {
        SupabaseClient::new(&SupabaseConfig {
            url: base_url.to_string(),
            service_role_key: "service-role".to_string(),
        })
    }

    #[test]
    fn test_admin_user_url_escapes_the_id() {
        let client = client("https://abc.supabase.co");

        let url = client
            .admin_user_url("2f0c1d4e-8a55-4c2b-9a39-5d4be1f0a7c1")
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://abc.supabase.co/auth/v1/admin/users/2f0c1d4e-8a55-4c2b-9a39-5d4be1f0a7c1"
        );

        let url = client
            .admin_user_url("../../../../rest/v1/projects?select=*")
            .unwrap();
        assert!(url.path().starts_with("/auth/v1/admin/users/"));
        assert_eq!(url.path_segments().unwrap().count(), 5);
        assert!(url.query().is_none());
    }

    #[tokio::test]
    async fn test_malformed_user_id_is_never_sent() {
        // Nothing listens here; any request would surface as an error.
        let client = client("http://127.0.0.1:9");
        let premium = client
            .premium_until("../../../../rest/v1/projects?select=*")
            .await
            .unwrap();
        assert!(premium.is_none());
    }

    #[test]
    fn test_admin_user_metadata() {
        let json = r#"{"id": "u1", "user_metadata": {"premium_until": "2026-01-08T12:00:00.000Z"}}"#;
        let user: AdminUser = serde_json::from_str(json).unwrap();
        assert!(user.user_metadata.premium_until.is_some());

        let bare: AdminUser = serde_json::from_str(r#"{"id": "u2"}"#).unwrap();
        assert!(bare.user_metadata.premium_until.is_none());
    }

    #[test]
    fn test_saved_comparison_join_shape() {
        let json = r#"[{
            "id": "c1", "user_id": "u1", "project_a_id": "a", "project_b_id": "b",
            "created_at": "2025-03-01T10:00:00+00:00",
            "data": {"winner": "A", "winnerReason": "r", "costDifference": 5,
                     "comparisonPoints": [], "recommendation": "x"},
            "projectA": {"address": "Vej 1"}, "projectB": {"address": "Vej 2"}
        }]"#;
        let rows: Vec<SavedComparison> = serde_json::from_str(json).unwrap();
        assert_eq!(rows[0].project_b.as_ref().unwrap().address, "Vej 2");
    }
}
