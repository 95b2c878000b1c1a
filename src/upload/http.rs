//! Multipart HTTP uploader.
//!
//! The upload API answers `200 OK` for refusals too; the verdict is in the
//! body, either `<rsp stat="fail"><err code=".." msg=".."/></rsp>` or the
//! JSON form `{"stat":"fail","code":..,"message":".."}`. A 2xx body in
//! neither form is not treated as an upload.

use std::{path::Path, time::Duration};

use anyhow::Context;
use reqwest::blocking::{multipart, Client};
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::debug;

use super::{UploadError, Uploader};
use crate::{config::Config, Result};

/// API error codes that mean the credentials were refused.
const AUTH_ERROR_CODES: [i64; 3] = [98, 99, 100];

#[derive(Debug, Deserialize)]
struct ApiStatus {
    stat: String,
    #[serde(default)]
    code: Option<i64>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Clone)]
pub struct HttpUploader {
    client: Client,
    endpoint: String,
    api_key: String,
    auth_token: String,
    timeout: Option<Duration>,
}

impl HttpUploader {
    pub fn from_config(config: &Config) -> Result<Self> {
        let timeout = config.upload_timeout();
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            api_key: config.api_key.clone(),
            auth_token: config.auth_token.clone(),
            timeout,
        })
    }

    /// Total time allowed per upload request; `None` waits indefinitely.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }
}

impl Uploader for HttpUploader {
    fn upload(&mut self, path: &Path) -> std::result::Result<(), UploadError> {
        let form = multipart::Form::new()
            .text("api_key", self.api_key.clone())
            .text("auth_token", self.auth_token.clone())
            .file("photo", path)
            .map_err(|e| UploadError::Transport(format!("{}: {e}", path.display())))?;

        let res = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.auth_token)
            .multipart(form)
            .send()
            .map_err(|e| UploadError::Transport(e.to_string()))?;

        let status = res.status();
        let body = res
            .text()
            .map_err(|e| UploadError::Transport(format!("failed to read response body: {e}")))?;
        debug!(status = status.as_u16(), path = %path.display(), "upload response");
        classify_response(status, &body)
    }
}

fn classify_response(status: StatusCode, body: &str) -> std::result::Result<(), UploadError> {
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Err(UploadError::Authentication(format!("{status} - {}", body.trim())));
    }
    if !status.is_success() {
        return Err(UploadError::Rejected(format!("{status} - {}", body.trim())));
    }

    let api = match serde_json::from_str::<ApiStatus>(body) {
        Ok(api) => api,
        Err(_) => parse_xml_status(body).ok_or_else(|| {
            UploadError::Rejected(format!("unrecognized response: {}", body.trim()))
        })?,
    };
    if api.stat.eq_ignore_ascii_case("ok") {
        return Ok(());
    }
    let message = api.message.unwrap_or_else(|| "unknown error".into());
    match api.code {
        Some(code) if AUTH_ERROR_CODES.contains(&code) => {
            Err(UploadError::Authentication(format!("code {code}: {message}")))
        }
        Some(code) => Err(UploadError::Rejected(format!("code {code}: {message}"))),
        None => Err(UploadError::Rejected(format!("stat {}: {message}", api.stat))),
    }
}

/// Read `stat` from the `<rsp>` element and `code`/`msg` from `<err>`.
fn parse_xml_status(body: &str) -> Option<ApiStatus> {
    let stat = xml_attr(body, "rsp", "stat")?;
    let code = xml_attr(body, "err", "code").and_then(|c| c.trim().parse().ok());
    let message = xml_attr(body, "err", "msg");
    Some(ApiStatus {
        stat,
        code,
        message,
    })
}

fn xml_attr(body: &str, tag: &str, attr: &str) -> Option<String> {
    let open = format!("<{tag}");
    let mut rest = body;
    let element = loop {
        let start = rest.find(&open)?;
        let after = &rest[start + open.len()..];
        // `<rsp` must not match `<rspx`.
        if after.starts_with(|c: char| c.is_whitespace() || c == '>' || c == '/') {
            let end = after.find('>')?;
            break &after[..end];
        }
        rest = after;
    };

    let mut rest = element;
    loop {
        let eq = rest.find('=')?;
        let name = rest[..eq].trim();
        let value = rest[eq + 1..].trim_start();
        let quote = value.chars().next().filter(|c| *c == '"' || *c == '\'')?;
        let close = value[1..].find(quote)?;
        if name == attr {
            return Some(unescape_xml(&value[1..1 + close]));
        }
        rest = &value[close + 2..];
    }
}

fn unescape_xml(value: &str) -> String {
    value
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}
