//! SharePoint lead folder store.
//!
//! Speaks the SharePoint REST API with an app-only token from the ACS
//! client-credentials flow. Folders and files are addressed by
//! server-relative URL; the store-path strings callers use are relative to
//! the site and get prefixed here.

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::debug;

use crate::store::{join_path, FileEntry, LeadFolderStore, StoreError, LEAD_SUBFOLDERS};

const ACS_HOST: &str = "https://accounts.accesscontrol.windows.net";
// Well-known principal id of SharePoint Online in the ACS resource string.
const SHAREPOINT_PRINCIPAL: &str = "00000003-0000-0ff1-ce00-000000000000";
const ACCEPT_JSON: &str = "application/json;odata=nometadata";

/// Connection settings for SharePoint.
///
/// Credentials come from the environment only.
#[derive(Clone)]
pub struct SharePointSettings {
    /// Full site URL, e.g. `https://contoso.sharepoint.com/sites/ops`
    pub site_url: String,
    pub tenant_id: String,
    pub client_id: String,
    pub client_secret: String,
}

impl SharePointSettings {
    /// Create from environment variables
    pub fn from_env() -> Result<Self> {
        let site_url = std::env::var("SHAREPOINT_SITE_URL")
            .context("SHAREPOINT_SITE_URL environment variable required")?;
        let tenant_id = std::env::var("SHAREPOINT_TENANT_ID")
            .context("SHAREPOINT_TENANT_ID environment variable required")?;
        let client_id = std::env::var("SHAREPOINT_CLIENT_ID")
            .context("SHAREPOINT_CLIENT_ID environment variable required")?;
        let client_secret = std::env::var("SHAREPOINT_CLIENT_SECRET")
            .context("SHAREPOINT_CLIENT_SECRET environment variable required")?;
        Ok(Self {
            site_url,
            tenant_id,
            client_id,
            client_secret,
        })
    }
}

/// Split a site URL into its host and server-relative site path.
fn split_site_url(site_url: &str) -> Result<(String, String), StoreError> {
    let stripped = site_url
        .strip_prefix("https://")
        .or_else(|| site_url.strip_prefix("http://"))
        .ok_or_else(|| {
            StoreError::Unavailable(format!("site URL must be absolute: {site_url}"))
        })?;

    let trimmed = stripped.trim_end_matches('/');
    match trimmed.split_once('/') {
        Some((host, path)) => Ok((host.to_string(), format!("/{path}"))),
        None => Ok((trimmed.to_string(), String::new())),
    }
}

/// Escape a path for embedding in a `'...'` REST URL literal.
fn escape_path(path: &str) -> String {
    path.replace('\'', "''")
}

#[derive(Debug, Deserialize)]
struct AcsTokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct ListingResponse {
    #[serde(default)]
    value: Vec<ListingEntry>,
}

#[derive(Debug, Deserialize)]
struct ListingEntry {
    #[serde(rename = "Name")]
    name: String,
}

/// SharePoint REST client implementing the lead folder store.
pub struct SharePointStore {
    site_url: String,
    site_path: String,
    token: String,
    client: reqwest::Client,
}

impl SharePointStore {
    /// Acquire an app-only token and build the store.
    pub async fn connect(settings: &SharePointSettings) -> Result<Self, StoreError> {
        let site_url = settings.site_url.trim_end_matches('/').to_string();
        let (host, site_path) = split_site_url(&site_url)?;

        let token_url = format!("{ACS_HOST}/{}/tokens/OAuth/2", settings.tenant_id);
        let resource = format!("{SHAREPOINT_PRINCIPAL}/{host}@{}", settings.tenant_id);
        let client_id = format!("{}@{}", settings.client_id, settings.tenant_id);

        let response = reqwest::Client::new()
            .post(&token_url)
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", client_id.as_str()),
                ("client_secret", settings.client_secret.as_str()),
                ("resource", resource.as_str()),
            ])
            .send()
            .await
            .map_err(http_err)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StoreError::AuthFailed(format!(
                "token request rejected ({status}): {body}"
            )));
        }

        let token: AcsTokenResponse = response
            .json()
            .await
            .map_err(|e| StoreError::AuthFailed(format!("token response: {e}")))?;

        debug!(site = %site_url, "Connected to SharePoint");
        Ok(Self {
            site_url,
            site_path,
            token: token.access_token,
            client: reqwest::Client::new(),
        })
    }

    /// Build API URL for a `_api/web` resource
    fn api_url(&self, resource: &str) -> String {
        format!("{}/_api/web/{}", self.site_url, resource)
    }

    /// Server-relative URL for a store path
    fn server_relative(&self, path: &str) -> String {
        if self.site_path.is_empty() {
            format!("/{}", path.trim_start_matches('/'))
        } else {
            join_path(&self.site_path, path)
        }
    }

    async fn checked(
        response: reqwest::Response,
        what: &str,
    ) -> Result<reqwest::Response, StoreError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let message = response.text().await.unwrap_or_default();
        Err(match status.as_u16() {
            401 | 403 => StoreError::AuthFailed(format!("({status}) {message}")),
            404 => StoreError::NotFound(what.to_string()),
            _ => StoreError::Unavailable(format!("{what}: ({status}) {message}")),
        })
    }

    /// Create one subfolder under an existing parent. Adding a folder that
    /// already exists returns it, so this is naturally idempotent.
    async fn ensure_folder(&self, parent: &str, name: &str) -> Result<(), StoreError> {
        let url = self.api_url(&format!(
            "GetFolderByServerRelativeUrl('{}')/Folders/add(url='{}')",
            escape_path(&self.server_relative(parent)),
            escape_path(name)
        ));

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.token)
            .header("Accept", ACCEPT_JSON)
            .header("Content-Length", "0")
            .send()
            .await
            .map_err(http_err)?;
        Self::checked(response, parent).await?;
        Ok(())
    }

    /// Ensure every segment of a path exists, except the first one: that is
    /// the document library itself, which cannot be created this way.
    async fn ensure_path(&self, path: &str) -> Result<(), StoreError> {
        let mut parent = String::new();
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            if parent.is_empty() {
                parent = segment.to_string();
                continue;
            }
            self.ensure_folder(&parent, segment).await?;
            parent = join_path(&parent, segment);
        }
        Ok(())
    }

    async fn list_entries(
        &self,
        folder: &str,
        collection: &str,
    ) -> Result<Vec<FileEntry>, StoreError> {
        let url = self.api_url(&format!(
            "GetFolderByServerRelativeUrl('{}')/{}?$select=Name",
            escape_path(&self.server_relative(folder)),
            collection
        ));

        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.token)
            .header("Accept", ACCEPT_JSON)
            .send()
            .await
            .map_err(http_err)?;
        let response = Self::checked(response, folder).await?;

        let listing: ListingResponse = response
            .json()
            .await
            .map_err(|e| StoreError::Unavailable(format!("{folder}: {e}")))?;

        let mut entries: Vec<FileEntry> = listing
            .value
            .into_iter()
            .map(|entry| FileEntry {
                path: join_path(folder, &entry.name),
                name: entry.name,
            })
            .collect();
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }
}

fn http_err(err: reqwest::Error) -> StoreError {
    StoreError::Unavailable(err.to_string())
}

fn split_file_path(path: &str) -> Result<(&str, &str), StoreError> {
    path.trim_end_matches('/')
        .rsplit_once('/')
        .ok_or_else(|| StoreError::Unavailable(format!("file path has no folder: {path}")))
}

#[async_trait::async_trait]
impl LeadFolderStore for SharePointStore {
    fn name(&self) -> &str {
        "sharepoint"
    }

    async fn ensure_folder_tree(&self, lead_root: &str) -> Result<(), StoreError> {
        self.ensure_path(lead_root).await?;
        for subfolder in LEAD_SUBFOLDERS {
            self.ensure_path(&join_path(lead_root, subfolder)).await?;
        }
        debug!(lead_root, "Ensured lead folder tree");
        Ok(())
    }

    async fn write_file(&self, path: &str, bytes: &[u8]) -> Result<(), StoreError> {
        let (folder, name) = split_file_path(path)?;
        let url = self.api_url(&format!(
            "GetFolderByServerRelativeUrl('{}')/Files/add(url='{}',overwrite=true)",
            escape_path(&self.server_relative(folder)),
            escape_path(name)
        ));

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.token)
            .header("Accept", ACCEPT_JSON)
            .body(bytes.to_vec())
            .send()
            .await
            .map_err(http_err)?;
        Self::checked(response, path).await?;

        debug!(path, size = bytes.len(), "Wrote file");
        Ok(())
    }

    async fn read_file(&self, path: &str) -> Result<Vec<u8>, StoreError> {
        let url = self.api_url(&format!(
            "GetFileByServerRelativeUrl('{}')/$value",
            escape_path(&self.server_relative(path))
        ));

        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(http_err)?;
        let response = Self::checked(response, path).await?;

        let bytes = response.bytes().await.map_err(http_err)?;
        Ok(bytes.to_vec())
    }

    async fn list_files(&self, folder: &str) -> Result<Vec<FileEntry>, StoreError> {
        self.list_entries(folder, "Files").await
    }

    async fn list_folders(&self, folder: &str) -> Result<Vec<FileEntry>, StoreError> {
        self.list_entries(folder, "Folders").await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_site_url() {
        let (host, path) = split_site_url("https://contoso.sharepoint.com/sites/ops").unwrap();
        assert_eq!(host, "contoso.sharepoint.com");
        assert_eq!(path, "/sites/ops");

        let (host, path) = split_site_url("https://contoso.sharepoint.com").unwrap();
        assert_eq!(host, "contoso.sharepoint.com");
        assert_eq!(path, "");

        assert!(split_site_url("contoso.sharepoint.com").is_err());
    }

    #[test]
    fn test_escape_path_doubles_quotes() {
        assert_eq!(escape_path("O'Brien_House"), "O''Brien_House");
    }

    #[test]
    fn test_split_file_path() {
        let (folder, name) = split_file_path("a/b/c.json").unwrap();
        assert_eq!(folder, "a/b");
        assert_eq!(name, "c.json");

        assert!(split_file_path("orphan.json").is_err());
    }
}
