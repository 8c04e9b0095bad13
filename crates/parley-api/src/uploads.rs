use std::path::{Path, PathBuf};
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as B64;
use serde::Deserialize;
use sha1::{Digest, Sha1};
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

/// 10 MB limit on decoded image attachments
pub const MAX_IMAGE_SIZE: usize = 10 * 1024 * 1024;

const UPLOAD_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("image is not a base64 data URL")]
    InvalidDataUrl,

    #[error("unsupported image type: {0}")]
    UnsupportedType(String),

    #[error("image exceeds {max} bytes")]
    TooLarge { max: usize },

    #[error("invalid base64 payload: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("image write failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("image service request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("image service rejected upload: {0}")]
    Rejected(String),
}

/// A parsed `data:<mime>;base64,<payload>` URL.
#[derive(Debug, PartialEq, Eq)]
pub struct DataUrl<'a> {
    pub mime: &'a str,
    pub payload: &'a str,
}

impl<'a> DataUrl<'a> {
    pub fn parse(raw: &'a str) -> Result<Self, UploadError> {
        let rest = raw.trim().strip_prefix("data:").ok_or(UploadError::InvalidDataUrl)?;
        let (meta, payload) = rest.split_once(',').ok_or(UploadError::InvalidDataUrl)?;
        let mime = meta.strip_suffix(";base64").ok_or(UploadError::InvalidDataUrl)?;

        if payload.is_empty() {
            return Err(UploadError::InvalidDataUrl);
        }

        Ok(Self { mime, payload })
    }

    /// File extension for supported image types.
    pub fn extension(&self) -> Result<&'static str, UploadError> {
        match self.mime.to_ascii_lowercase().as_str() {
            "image/png" => Ok("png"),
            "image/jpeg" | "image/jpg" => Ok("jpg"),
            "image/gif" => Ok("gif"),
            "image/webp" => Ok("webp"),
            other => Err(UploadError::UnsupportedType(other.to_string())),
        }
    }

    /// Decode the payload, enforcing [`MAX_IMAGE_SIZE`].
    pub fn decode(&self) -> Result<Vec<u8>, UploadError> {
        // Reject before decoding when the encoded form is already too big
        if self.payload.len() / 4 * 3 > MAX_IMAGE_SIZE + 3 {
            return Err(UploadError::TooLarge { max: MAX_IMAGE_SIZE });
        }

        let bytes = B64.decode(self.payload)?;
        if bytes.len() > MAX_IMAGE_SIZE {
            return Err(UploadError::TooLarge { max: MAX_IMAGE_SIZE });
        }
        Ok(bytes)
    }
}

/// Where image attachments go. Callers only see "upload, get a URL".
pub enum ImageStore {
    Local(LocalImageStore),
    Cloudinary(CloudinaryStore),
}

impl ImageStore {
    /// Upload a base64 data URL and return the public URL of the image.
    pub async fn upload(&self, data_url: &str) -> Result<String, UploadError> {
        match self {
            ImageStore::Local(store) => store.upload(data_url).await,
            ImageStore::Cloudinary(store) => store.upload(data_url).await,
        }
    }

    /// Directory to serve under `/uploads`, for the local backend.
    pub fn local_dir(&self) -> Option<&Path> {
        match self {
            ImageStore::Local(store) => Some(store.dir()),
            ImageStore::Cloudinary(_) => None,
        }
    }
}

/// Images written to a directory and served by this process.
pub struct LocalImageStore {
    dir: PathBuf,
    public_base_url: String,
}

impl LocalImageStore {
    pub fn new(dir: PathBuf, public_base_url: &str) -> Self {
        Self {
            dir,
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub async fn upload(&self, data_url: &str) -> Result<String, UploadError> {
        let parsed = DataUrl::parse(data_url)?;
        let ext = parsed.extension()?;
        let bytes = parsed.decode()?;

        tokio::fs::create_dir_all(&self.dir).await?;

        let file_name = format!("{}.{}", Uuid::new_v4(), ext);
        tokio::fs::write(self.dir.join(&file_name), &bytes).await?;

        debug!("Stored {} byte image as {}", bytes.len(), file_name);
        Ok(format!("{}/uploads/{}", self.public_base_url, file_name))
    }
}

#[derive(Debug, Deserialize)]
struct CloudinaryResponse {
    secure_url: Option<String>,
    error: Option<CloudinaryErrorBody>,
}

#[derive(Debug, Deserialize)]
struct CloudinaryErrorBody {
    message: String,
}

/// Signed uploads to Cloudinary's image API.
pub struct CloudinaryStore {
    client: reqwest::Client,
    cloud_name: String,
    api_key: String,
    api_secret: String,
}

impl CloudinaryStore {
    pub fn new(cloud_name: String, api_key: String, api_secret: String) -> Result<Self, UploadError> {
        let client = reqwest::Client::builder().timeout(UPLOAD_TIMEOUT).build()?;
        info!("Image uploads go to Cloudinary cloud '{}'", cloud_name);
        Ok(Self {
            client,
            cloud_name,
            api_key,
            api_secret,
        })
    }

    /// SHA-1 over the sorted signed params followed by the API secret.
    pub fn signature(timestamp: i64, api_secret: &str) -> String {
        let mut hasher = Sha1::new();
        hasher.update(format!("timestamp={}{}", timestamp, api_secret).as_bytes());
        hex::encode(hasher.finalize())
    }

    pub async fn upload(&self, data_url: &str) -> Result<String, UploadError> {
        // Validate locally so bad input never costs a round trip
        let parsed = DataUrl::parse(data_url)?;
        parsed.extension()?;
        parsed.decode()?;

        let timestamp = chrono::Utc::now().timestamp();
        let signature = Self::signature(timestamp, &self.api_secret);
        let url = format!(
            "https://api.cloudinary.com/v1_1/{}/image/upload",
            self.cloud_name
        );
        let timestamp = timestamp.to_string();

        let response = self
            .client
            .post(&url)
            .form(&[
                ("file", data_url),
                ("api_key", self.api_key.as_str()),
                ("timestamp", timestamp.as_str()),
                ("signature", signature.as_str()),
            ])
            .send()
            .await?;

        let status = response.status();
        let body: CloudinaryResponse = response.json().await?;

        match (status.is_success(), body.secure_url, body.error) {
            (true, Some(secure_url), _) => Ok(secure_url),
            (_, _, Some(err)) => Err(UploadError::Rejected(err.message)),
            _ => Err(UploadError::Rejected(format!("unexpected response ({})", status))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // 1x1 transparent PNG
    const PNG_1X1: &str = "iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAYAAAAfFcSJAAAADUlEQVR42mNkYPhfDwAChwGA60e6kgAAAABJRU5ErkJggg==";

    #[test]
    fn data_url_parsing() {
        let raw = format!("data:image/png;base64,{}", PNG_1X1);
        let parsed = DataUrl::parse(&raw).unwrap();
        assert_eq!(parsed.mime, "image/png");
        assert_eq!(parsed.extension().unwrap(), "png");
        assert!(parsed.decode().unwrap().starts_with(b"\x89PNG"));
    }

    #[test]
    fn rejects_non_data_urls() {
        for raw in ["https://example.com/a.png", "data:image/png,abc", "data:image/png;base64,", "nope"] {
            assert!(matches!(DataUrl::parse(raw), Err(UploadError::InvalidDataUrl)), "{raw}");
        }
    }

    #[test]
    fn rejects_non_image_types() {
        let parsed = DataUrl::parse("data:text/html;base64,PGI+").unwrap();
        assert!(matches!(parsed.extension(), Err(UploadError::UnsupportedType(_))));
    }

    #[test]
    fn rejects_oversized_payloads() {
        let payload = "A".repeat((MAX_IMAGE_SIZE / 3 + 2) * 4);
        let raw = format!("data:image/png;base64,{}", payload);
        let parsed = DataUrl::parse(&raw).unwrap();
        assert!(matches!(parsed.decode(), Err(UploadError::TooLarge { .. })));
    }

    #[test]
    fn cloudinary_signature_is_sha1_hex() {
        let sig = CloudinaryStore::signature(1_315_060_510, "abcd");
        assert_eq!(sig.len(), 40);
        assert_eq!(sig, CloudinaryStore::signature(1_315_060_510, "abcd"));
        assert_ne!(sig, CloudinaryStore::signature(1_315_060_511, "abcd"));
    }

    #[tokio::test]
    async fn local_store_writes_file_and_returns_url() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalImageStore::new(dir.path().join("uploads"), "http://localhost:5001/");

        let url = store
            .upload(&format!("data:image/png;base64,{}", PNG_1X1))
            .await
            .unwrap();

        assert!(url.starts_with("http://localhost:5001/uploads/"));
        assert!(url.ends_with(".png"));

        let file_name = url.rsplit('/').next().unwrap();
        let written = std::fs::read(dir.path().join("uploads").join(file_name)).unwrap();
        assert!(written.starts_with(b"\x89PNG"));
    }
}
