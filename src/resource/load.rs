//! Loading resources from files and remote URIs
//!
//! Inputs may hold several YAML documents. Each document becomes one
//! [`Resource`]; a single bad document fails the whole load.

use rand::Rng;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tokio::io::AsyncWriteExt;

use super::Resource;
use crate::common::{Error, Result};

/// Attempts made when downloading a remote resource
const FETCH_ATTEMPTS: u32 = 3;
/// Delay before the second attempt, doubled afterwards
const FETCH_BACKOFF: Duration = Duration::from_secs(1);
const FETCH_BACKOFF_FACTOR: f64 = 2.0;
const FETCH_JITTER: f64 = 0.1;

/// Load resources from a local file
pub fn load(path: &Path) -> Result<Vec<Resource>> {
    let content = std::fs::read(path).map_err(|e| Error::FileRead {
        path: path.display().to_string(),
        error: e.to_string(),
    })?;
    let source = path.display().to_string();
    let resources = parse(&content, &source)?;
    if resources.is_empty() {
        return Err(Error::NoResource(source));
    }
    Ok(resources)
}

/// Download resources from a remote URI and parse them like a local file
pub async fn load_from_uri(url: &reqwest::Url) -> Result<Vec<Resource>> {
    let scratch = tempfile::Builder::new()
        .prefix("kubestep-")
        .suffix(".yaml")
        .tempfile()?;

    let body = fetch_with_backoff(url).await?;
    let mut file = tokio::fs::File::create(scratch.path()).await?;
    file.write_all(&body).await?;
    file.flush().await?;
    drop(file);

    let content = tokio::fs::read(scratch.path()).await.map_err(|e| {
        Error::resource_load(url.as_str(), format!("error reading downloaded content: {e}"))
    })?;
    let resources = parse(&content, url.as_str())?;
    if resources.is_empty() {
        return Err(Error::NoResource(url.to_string()));
    }
    Ok(resources)
}

/// Parse a possibly multi-document YAML input
///
/// Empty documents are skipped. `source` names the input in errors.
pub fn parse(content: &[u8], source: &str) -> Result<Vec<Resource>> {
    let mut resources = Vec::new();
    for document in serde_yaml::Deserializer::from_slice(content) {
        let value = serde_yaml::Value::deserialize(document)
            .map_err(|e| Error::resource_load(source, e))?;
        if value.is_null() {
            continue;
        }
        let json = serde_json::to_value(&value).map_err(|e| Error::resource_load(source, e))?;
        let resource = Resource::from_value(json).map_err(|e| Error::resource_load(source, e))?;
        resources.push(resource);
    }
    Ok(resources)
}

async fn fetch_with_backoff(url: &reqwest::Url) -> Result<Vec<u8>> {
    let client = reqwest::Client::new();
    let mut delay = FETCH_BACKOFF;
    let mut last_error = String::new();

    for attempt in 1..=FETCH_ATTEMPTS {
        match fetch(&client, url).await {
            Ok(body) => return Ok(body),
            Err(e) => {
                tracing::debug!(%url, attempt, error = %e, "download failed");
                last_error = e;
            }
        }
        if attempt < FETCH_ATTEMPTS {
            tokio::time::sleep(jittered(delay)).await;
            delay = delay.mul_f64(FETCH_BACKOFF_FACTOR);
        }
    }

    Err(Error::resource_load(
        url.as_str(),
        format!("error downloading content: {last_error}"),
    ))
}

async fn fetch(
    client: &reqwest::Client,
    url: &reqwest::Url,
) -> std::result::Result<Vec<u8>, String> {
    let response = client
        .get(url.clone())
        .header("User-Agent", "kubestep")
        .send()
        .await
        .map_err(|e| e.to_string())?;
    if !response.status().is_success() {
        return Err(format!("unexpected status {}", response.status()));
    }
    response
        .bytes()
        .await
        .map(|b| b.to_vec())
        .map_err(|e| e.to_string())
}

/// Spread `delay` by up to ±10%
fn jittered(delay: Duration) -> Duration {
    let factor = 1.0 + rand::thread_rng().gen_range(-FETCH_JITTER..=FETCH_JITTER);
    delay.mul_f64(factor)
}
