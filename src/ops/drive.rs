//! Publish report folders to Google Drive (Drive v3 REST)
//!
//! Remote files are matched to local ones by name; a size difference means
//! the local copy is newer and gets re-uploaded in place.

use crate::error::{M365Error, Result};
use crate::graph::parse_retry_after;
use crate::retry::RetryExecutor;
use reqwest::{Client, Method, Response};
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};
use walkdir::WalkDir;

pub const DRIVE_API_BASE: &str = "https://www.googleapis.com";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFile {
    pub id: String,
    pub name: String,
    pub size: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileListPage {
    #[serde(default)]
    files: Vec<DriveFile>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DriveFile {
    id: String,
    name: String,
    // Drive returns int64 fields as strings
    size: Option<String>,
}

impl From<DriveFile> for RemoteFile {
    fn from(f: DriveFile) -> Self {
        Self {
            id: f.id,
            name: f.name,
            size: f.size.and_then(|s| s.parse().ok()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalFile {
    pub path: PathBuf,
    /// Path relative to the synced directory, `/`-separated
    pub name: String,
    pub size: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriveAction {
    Upload(LocalFile),
    Update { file: LocalFile, file_id: String },
    Skip(LocalFile),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DriveSyncSummary {
    pub uploaded: usize,
    pub updated: usize,
    pub skipped: usize,
}

/// Every regular file under `dir`, sorted by name
pub fn local_files(dir: &Path) -> Result<Vec<LocalFile>> {
    if !dir.is_dir() {
        return Err(M365Error::ConfigError(format!(
            "{} is not a directory",
            dir.display()
        )));
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(dir).follow_links(false) {
        let entry = entry.map_err(|e| M365Error::IoError(e.into()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = entry.path().strip_prefix(dir).unwrap_or(entry.path());
        let name = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        files.push(LocalFile {
            path: entry.path().to_path_buf(),
            name,
            size: entry.metadata().map_err(|e| M365Error::IoError(e.into()))?.len(),
        });
    }
    files.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(files)
}

/// Decide what to do with each local file given the remote listing
pub fn plan(local: Vec<LocalFile>, remote: &[RemoteFile]) -> Vec<DriveAction> {
    // Duplicate names: the first listed file wins
    let mut by_name: HashMap<&str, &RemoteFile> = HashMap::new();
    for r in remote {
        by_name.entry(r.name.as_str()).or_insert(r);
    }

    local
        .into_iter()
        .map(|file| match by_name.get(file.name.as_str()) {
            None => DriveAction::Upload(file),
            Some(existing) if existing.size != Some(file.size) => DriveAction::Update {
                file_id: existing.id.clone(),
                file,
            },
            Some(_) => DriveAction::Skip(file),
        })
        .collect()
}

fn mime_type(name: &str) -> &'static str {
    match name.rsplit('.').next().map(str::to_ascii_lowercase).as_deref() {
        Some("html") | Some("htm") => "text/html",
        Some("csv") => "text/csv",
        Some("json") => "application/json",
        Some("pdf") => "application/pdf",
        Some("txt") | Some("log") => "text/plain",
        _ => "application/octet-stream",
    }
}

/// `multipart/related` body: JSON metadata part, then the file content
pub fn multipart_body(
    boundary: &str,
    metadata: &serde_json::Value,
    mime: &str,
    content: &[u8],
) -> Vec<u8> {
    let mut body = Vec::with_capacity(content.len() + 512);
    body.extend_from_slice(
        format!(
            "--{b}\r\nContent-Type: application/json; charset=UTF-8\r\n\r\n{m}\r\n--{b}\r\nContent-Type: {mime}\r\n\r\n",
            b = boundary,
            m = metadata,
            mime = mime
        )
        .as_bytes(),
    );
    body.extend_from_slice(content);
    body.extend_from_slice(format!("\r\n--{}--\r\n", boundary).as_bytes());
    body
}

pub struct DriveClient {
    client: Client,
    access_token: String,
    base_url: String,
    retry: RetryExecutor,
}

impl DriveClient {
    pub fn new(access_token: String) -> Self {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            client,
            access_token,
            base_url: DRIVE_API_BASE.to_string(),
            retry: RetryExecutor::default(),
        }
    }

    /// Token from the environment variable named in `[drive] token_env`
    pub fn from_env(token_env: &str) -> Result<Self> {
        match std::env::var(token_env) {
            Ok(token) if !token.trim().is_empty() => Ok(Self::new(token.trim().to_string())),
            _ => Err(M365Error::ConfigError(format!(
                "Google Drive access token not found; set ${}",
                token_env
            ))),
        }
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    pub fn with_retry(mut self, retry: RetryExecutor) -> Self {
        self.retry = retry;
        self
    }

    /// One HTTP exchange; a non-success status becomes `DriveApiError`
    async fn send_once(
        &self,
        method: &Method,
        url: &str,
        content_type: Option<&str>,
        body: Option<&[u8]>,
    ) -> Result<Response> {
        debug!(%method, url, "Drive request");
        let mut request = self
            .client
            .request(method.clone(), url)
            .bearer_auth(&self.access_token);
        if let Some(content_type) = content_type {
            request = request.header(reqwest::header::CONTENT_TYPE, content_type);
        }
        if let Some(body) = body {
            request = request.body(body.to_vec());
        }

        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let retry_after = parse_retry_after(&response);
        let text = response.text().await.unwrap_or_default();
        Err(M365Error::DriveApiError {
            status: status.as_u16(),
            message: drive_error_message(&text),
            retry_after,
        })
    }

    /// [`send_once`](Self::send_once) under the retry executor. Only for
    /// requests that are safe to repeat (GET, media PATCH).
    async fn send(
        &self,
        operation: &str,
        method: Method,
        url: &str,
        content_type: Option<&str>,
        body: Option<&[u8]>,
    ) -> Result<Response> {
        let method = &method;
        self.retry
            .run(operation, move |_| async move {
                self.send_once(method, url, content_type, body).await
            })
            .await
            .into_result()
    }

    /// An already uploaded copy of `file` in the folder
    async fn find_uploaded(&self, folder_id: &str, file: &LocalFile) -> Result<Option<String>> {
        Ok(self
            .list_folder(folder_id)
            .await?
            .into_iter()
            .find(|r| r.name == file.name && r.size == Some(file.size))
            .map(|r| r.id))
    }

    /// All non-trashed files directly inside `folder_id`
    pub async fn list_folder(&self, folder_id: &str) -> Result<Vec<RemoteFile>> {
        let query =
            urlencoding::encode(&format!("'{}' in parents and trashed=false", folder_id))
                .into_owned();
        let mut files = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut url = format!(
                "{}/drive/v3/files?q={}&fields=nextPageToken,files(id,name,size)&pageSize=1000",
                self.base_url, query
            );
            if let Some(token) = &page_token {
                url.push_str("&pageToken=");
                url.push_str(&urlencoding::encode(token));
            }

            let page: FileListPage = self
                .send("list Drive folder", Method::GET, &url, None, None)
                .await?
                .json()
                .await?;
            files.extend(page.files.into_iter().map(RemoteFile::from));

            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        Ok(files)
    }

    /// Create `file` in the folder and return its id.
    ///
    /// A create is not idempotent: a request that timed out may still have
    /// landed. Before each retry the folder is listed again and a matching
    /// name and size is taken as the earlier attempt's result.
    pub async fn upload(&self, folder_id: &str, file: &LocalFile) -> Result<String> {
        let content = fs::read(&file.path)?;
        let boundary = format!("m365ops-{}", uuid::Uuid::new_v4().simple());
        let metadata = serde_json::json!({ "name": file.name, "parents": [folder_id] });
        let body = multipart_body(&boundary, &metadata, mime_type(&file.name), &content);
        let url = format!(
            "{}/upload/drive/v3/files?uploadType=multipart&fields=id",
            self.base_url
        );
        let content_type = format!("multipart/related; boundary={}", boundary);
        let (url, content_type, body) = (url.as_str(), content_type.as_str(), body.as_slice());

        self.retry
            .run(&format!("upload {}", file.name), move |attempt| async move {
                if attempt > 1 {
                    if let Some(id) = self.find_uploaded(folder_id, file).await? {
                        info!(name = %file.name, id = %id, "Earlier upload attempt had succeeded");
                        return Ok::<_, M365Error>(id);
                    }
                }
                let created: serde_json::Value = self
                    .send_once(&Method::POST, url, Some(content_type), Some(body))
                    .await?
                    .json()
                    .await?;
                created["id"]
                    .as_str()
                    .filter(|id| !id.is_empty())
                    .map(str::to_string)
                    .ok_or_else(|| M365Error::DriveApiError {
                        status: 200,
                        message: format!("upload of {} returned no file id", file.name),
                        retry_after: None,
                    })
            })
            .await
            .into_result()
    }

    pub async fn update(&self, file_id: &str, file: &LocalFile) -> Result<()> {
        let content = fs::read(&file.path)?;
        let url = format!(
            "{}/upload/drive/v3/files/{}?uploadType=media",
            self.base_url,
            urlencoding::encode(file_id)
        );
        self.send(
            &format!("update {}", file.name),
            Method::PATCH,
            &url,
            Some(mime_type(&file.name)),
            Some(content.as_slice()),
        )
        .await?;
        Ok(())
    }

    /// List, plan and (unless `dry_run`) execute. `on_action` sees each
    /// planned action before it runs.
    pub async fn sync_dir<F>(
        &self,
        dir: &Path,
        folder_id: &str,
        dry_run: bool,
        mut on_action: F,
    ) -> Result<DriveSyncSummary>
    where
        F: FnMut(&DriveAction),
    {
        let remote = self.list_folder(folder_id).await?;
        let actions = plan(local_files(dir)?, &remote);
        let mut summary = DriveSyncSummary::default();

        for action in &actions {
            on_action(action);
            match action {
                DriveAction::Upload(file) => {
                    if !dry_run {
                        self.upload(folder_id, file).await?;
                    }
                    summary.uploaded += 1;
                }
                DriveAction::Update { file, file_id } => {
                    if !dry_run {
                        self.update(file_id, file).await?;
                    }
                    summary.updated += 1;
                }
                DriveAction::Skip(_) => summary.skipped += 1,
            }
        }

        info!(
            folder_id,
            uploaded = summary.uploaded,
            updated = summary.updated,
            skipped = summary.skipped,
            dry_run,
            "Drive sync finished"
        );
        Ok(summary)
    }
}

/// `{"error": {"code": 403, "message": "..."}}` → message
fn drive_error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v["error"]["message"].as_str().map(str::to_string))
        .unwrap_or_else(|| body.to_string())
}
