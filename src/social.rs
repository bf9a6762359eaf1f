use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::path::Path;
use tracing::info;

use crate::settings::SocialSettings;

/// Page id and access token for the Graph-style photos endpoint. No session
/// management here; the token is assumed valid for the one upload.
#[derive(Debug, Clone)]
pub struct PageCredentials {
    pub page_id: String,
    pub token: String,
}

pub fn resolve_credentials(page_id: Option<&str>, token: Option<&str>) -> Result<PageCredentials> {
    Ok(PageCredentials {
        page_id: resolve_value(page_id, "FACEBOOK_PAGE_ID")?,
        token: resolve_value(token, "FACEBOOK_PAGE_TOKEN")?,
    })
}

fn resolve_value(flag: Option<&str>, env_key: &str) -> Result<String> {
    if let Some(value) = flag {
        let value = value.trim();
        if !value.is_empty() {
            return Ok(value.to_string());
        }
    }
    std::env::var(env_key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .ok_or_else(|| anyhow!("missing credential (pass a flag or set {})", env_key))
}

/// Upload one rendered card as a page photo: multipart `source` + `caption`
/// + `access_token` against `{graph_base}/{page_id}/photos`. Returns the id
/// the API assigned to the post.
pub async fn post_photo(
    settings: &SocialSettings,
    credentials: &PageCredentials,
    card: &Path,
    caption: &str,
) -> Result<String> {
    let bytes =
        std::fs::read(card).with_context(|| format!("failed to read card: {}", card.display()))?;
    let file_name = card
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("card.png")
        .to_string();

    let part = reqwest::multipart::Part::bytes(bytes)
        .file_name(file_name)
        .mime_str("image/png")
        .with_context(|| "failed to build multipart body")?;
    let form = reqwest::multipart::Form::new()
        .part("source", part)
        .text("caption", caption.to_string())
        .text("access_token", credentials.token.clone());

    let url = format!(
        "{}/{}/photos",
        settings.graph_base.trim_end_matches('/'),
        credentials.page_id
    );
    let client = reqwest::Client::new();
    let response = client
        .post(&url)
        .multipart(form)
        .send()
        .await
        .with_context(|| "failed to reach the graph endpoint")?;

    let status = response.status();
    let text = response.text().await.unwrap_or_default();
    if !status.is_success() {
        return Err(anyhow!(
            "graph API error ({}): {}",
            status,
            extract_graph_error(&text).unwrap_or(text)
        ));
    }

    let posted: PhotoResponse = serde_json::from_str(&text)
        .with_context(|| "failed to parse graph photo response")?;
    let id = posted
        .post_id
        .or(posted.id)
        .ok_or_else(|| anyhow!("graph photo response carried no id"))?;
    info!("posted {} as {}", card.display(), id);
    Ok(id)
}

#[derive(Debug, Deserialize)]
struct PhotoResponse {
    id: Option<String>,
    post_id: Option<String>,
}

fn extract_graph_error(body: &str) -> Option<String> {
    #[derive(Deserialize)]
    struct ErrorBody {
        error: Option<GraphError>,
    }

    #[derive(Deserialize)]
    struct GraphError {
        message: Option<String>,
        #[serde(rename = "type")]
        kind: Option<String>,
        code: Option<i64>,
    }

    let parsed: ErrorBody = serde_json::from_str(body).ok()?;
    let error = parsed.error?;
    let mut parts = Vec::new();
    if let Some(message) = error.message {
        if !message.trim().is_empty() {
            parts.push(message);
        }
    }
    if let Some(kind) = error.kind {
        if !kind.trim().is_empty() {
            parts.push(format!("type: {}", kind));
        }
    }
    if let Some(code) = error.code {
        parts.push(format!("code: {}", code));
    }
    if parts.is_empty() {
        None
    } else {
        Some(parts.join(" | "))
    }
}
