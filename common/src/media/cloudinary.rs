use async_trait::async_trait;
use chrono::Utc;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;

use crate::{
    config::MediaConfig,
    error::{self, AddCode},
};

use super::{ImageUpload, MediaStore, StoredImage};

const API_BASE: &str = "https://api.cloudinary.com/v1_1";
const ALLOWED_FORMATS: &str = "jpg,jpeg,png,gif,webp";
const TRANSFORMATION: &str = "c_limit,h_1000,w_1000/q_auto";

/// Cloudinary image storage over the REST upload API. Requests are signed with SHA-256,
/// so the account must have SHA-256 signatures enabled.
pub struct CloudinaryStore {
    client: reqwest::Client,
    config: MediaConfig,
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    secure_url: String,
    public_id: String,
}

#[derive(Debug, Deserialize)]
struct DestroyResponse {
    result: String,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ErrorBody,
}

/// Cloudinary signature: parameters sorted by name, joined as a query string, followed by
/// the API secret.
fn sign(params: &[(&str, String)], api_secret: &str) -> String {
    let mut params = params.to_vec();
    params.sort_by(|a, b| a.0.cmp(b.0));

    let mut payload = params
        .iter()
        .map(|(key, value)| format!("{}={}", key, value))
        .collect::<Vec<_>>()
        .join("&");
    payload.push_str(api_secret);

    sha256::digest(payload)
}

impl CloudinaryStore {
    pub fn new(config: MediaConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    fn endpoint(&self, action: &str) -> String {
        format!("{}/{}/image/{}", API_BASE, self.config.cloud_name, action)
    }

    fn signed_form(&self, params: Vec<(&'static str, String)>) -> Form {
        let signature = sign(&params, &self.config.api_secret);

        let mut form = Form::new()
            .text("api_key", self.config.api_key.clone())
            .text("signature", signature);
        for (key, value) in params {
            form = form.text(key, value);
        }
        form
    }

    async fn failure(response: reqwest::Response, action: &str) -> error::ServiceError {
        let status = response.status();
        let message = match response.json::<ErrorResponse>().await {
            Ok(body) => body.error.message,
            Err(_) => status.to_string(),
        };
        anyhow::anyhow!("Media store {} failed: {}", action, message).code(500)
    }
}

#[async_trait]
impl MediaStore for CloudinaryStore {
    async fn store(&self, upload: &ImageUpload) -> error::Result<StoredImage> {
        let params = vec![
            ("allowed_formats", ALLOWED_FORMATS.to_string()),
            ("folder", self.config.folder.clone()),
            ("timestamp", Utc::now().timestamp().to_string()),
            ("transformation", TRANSFORMATION.to_string()),
        ];

        let file = Part::bytes(upload.bytes.clone())
            .file_name(upload.file_name.clone())
            .mime_str(&upload.content_type)?;
        let form = self.signed_form(params).part("file", file);

        let response = self
            .client
            .post(self.endpoint("upload"))
            .multipart(form)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::failure(response, "upload").await);
        }

        let uploaded = response.json::<UploadResponse>().await?;
        log::info!("Stored image {}", uploaded.public_id);

        Ok(StoredImage {
            url: uploaded.secure_url,
            storage_id: uploaded.public_id,
        })
    }

    async fn delete(&self, storage_id: &str) -> error::Result<()> {
        let params = vec![
            ("public_id", storage_id.to_string()),
            ("timestamp", Utc::now().timestamp().to_string()),
        ];

        let response = self
            .client
            .post(self.endpoint("destroy"))
            .multipart(self.signed_form(params))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::failure(response, "delete").await);
        }

        let destroyed = response.json::<DestroyResponse>().await?;
        match destroyed.result.as_str() {
            "ok" | "not found" => Ok(()),
            other => Err(anyhow::anyhow!("Media store delete returned {}", other).code(500)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::sign;

    #[test]
    fn signature_sorts_parameters_and_appends_secret() {
        let params = vec![
            ("timestamp", "1315060510".to_string()),
            ("public_id", "sample".to_string()),
        ];

        assert_eq!(
            sign(&params, "abcd"),
            sha256::digest("public_id=sample&timestamp=1315060510abcd".to_string())
        );
    }
}
