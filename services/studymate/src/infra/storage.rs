use std::time::Duration;

use anyhow::{Context as _, anyhow};
use bytes::Bytes;
use chrono::Utc;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::config::CloudinaryConfig;
use crate::domain::repository::ObjectStorage;
use crate::domain::types::BlobRef;
use crate::error::ExternalError;

const API_BASE: &str = "https://api.cloudinary.com";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Cloudinary resource types a destroy is attempted against, in order. Uploads use
/// `auto`, so the stored type is not known when deleting.
const DESTROY_RESOURCE_TYPES: [&str; 3] = ["raw", "image", "video"];

/// Object storage backed by the Cloudinary upload API.
#[derive(Clone)]
pub struct CloudinaryClient {
    http: Client,
    config: CloudinaryConfig,
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    public_id: String,
    url: String,
    secure_url: String,
    original_filename: Option<String>,
    bytes: i64,
    format: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DestroyResponse {
    result: String,
}

impl CloudinaryClient {
    pub fn new(config: CloudinaryConfig) -> anyhow::Result<Self> {
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("build cloudinary http client")?;
        Ok(Self { http, config })
    }

    fn endpoint(&self, resource_type: &str, action: &str) -> String {
        format!(
            "{API_BASE}/v1_1/{}/{resource_type}/{action}",
            self.config.cloud_name
        )
    }

    /// Multipart form carrying `params`, the api key, and their signature.
    fn signed_form(&self, mut params: Vec<(&'static str, String)>) -> Form {
        params.push(("timestamp", Utc::now().timestamp().to_string()));
        let signature = sign(&params, &self.config.api_secret);
        params
            .into_iter()
            .fold(Form::new(), |form, (key, value)| form.text(key, value))
            .text("api_key", self.config.api_key.clone())
            .text("signature", signature)
    }

    async fn destroy(&self, resource_type: &str, object_id: &str) -> Result<bool, ExternalError> {
        let form = self.signed_form(vec![("public_id", object_id.to_owned())]);
        let response = self
            .http
            .post(self.endpoint(resource_type, "destroy"))
            .multipart(form)
            .send()
            .await
            .map_err(|e| classify_transport(e, "send destroy request"))?;
        let body: DestroyResponse = read_json(response, "destroy").await?;
        match body.result.as_str() {
            "ok" => Ok(true),
            "not found" => Ok(false),
            other => Err(ExternalError::Permanent(anyhow!(
                "unexpected destroy result: {other}"
            ))),
        }
    }
}

impl ObjectStorage for CloudinaryClient {
    async fn upload(
        &self,
        bytes: Bytes,
        filename: &str,
        folder: &str,
    ) -> Result<BlobRef, ExternalError> {
        let byte_len = bytes.len();
        let form = self
            .signed_form(vec![
                ("folder", folder.to_owned()),
                ("overwrite", "false".to_owned()),
                ("unique_filename", "true".to_owned()),
                ("use_filename", "true".to_owned()),
            ])
            .part(
                "file",
                Part::bytes(bytes.to_vec()).file_name(filename.to_owned()),
            );

        let response = self
            .http
            .post(self.endpoint("auto", "upload"))
            .multipart(form)
            .send()
            .await
            .map_err(|e| classify_transport(e, "send upload request"))?;
        let body: UploadResponse = read_json(response, "upload").await?;
        debug!(object_id = %body.public_id, bytes = byte_len, "object uploaded");

        Ok(BlobRef {
            original_filename: body
                .original_filename
                .unwrap_or_else(|| file_stem(filename).to_owned()),
            format: body
                .format
                .unwrap_or_else(|| file_extension(filename).to_owned()),
            object_id: body.public_id,
            url: body.url,
            secure_url: body.secure_url,
            byte_size: body.bytes,
        })
    }

    async fn delete(&self, object_id: &str) -> Result<(), ExternalError> {
        for resource_type in DESTROY_RESOURCE_TYPES {
            if self.destroy(resource_type, object_id).await? {
                return Ok(());
            }
        }
        debug!(object_id, "object already absent");
        Ok(())
    }
}

/// Hex SHA-256 over `k=v` pairs sorted by key and joined with `&`, followed by the secret.
fn sign(params: &[(&str, String)], api_secret: &str) -> String {
    let mut sorted: Vec<&(&str, String)> = params.iter().collect();
    sorted.sort_by(|a, b| a.0.cmp(b.0));
    let to_sign = sorted
        .iter()
        .map(|(key, value)| format!("{key}={value}"))
        .collect::<Vec<_>>()
        .join("&");
    hex::encode(Sha256::digest(format!("{to_sign}{api_secret}").as_bytes()))
}

async fn read_json<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
    what: &'static str,
) -> Result<T, ExternalError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        let err = anyhow!("cloudinary {what} returned {status}: {body}");
        return Err(if is_transient_status(status) {
            ExternalError::Transient(err)
        } else {
            ExternalError::Permanent(err)
        });
    }
    response
        .json::<T>()
        .await
        .map_err(|e| classify_transport(e, "decode cloudinary response"))
}

fn is_transient_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

fn classify_transport(err: reqwest::Error, what: &'static str) -> ExternalError {
    let transient = err.is_timeout() || err.is_connect();
    let err = anyhow::Error::new(err).context(what);
    if transient {
        ExternalError::Transient(err)
    } else {
        ExternalError::Permanent(err)
    }
}

fn file_stem(filename: &str) -> &str {
    filename
        .rsplit_once('.')
        .map_or(filename, |(stem, _)| stem)
}

fn file_extension(filename: &str) -> &str {
    filename.rsplit_once('.').map_or("", |(_, ext)| ext)
}
