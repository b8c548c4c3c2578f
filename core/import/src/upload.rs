//! Writes file content to signed object-storage URLs.

use bytes::Bytes;
use reqwest::header;
use tracing::debug;
use url::Url;

use driveimport_common::{Error, Result, MAX_FILE_SIZE};
use driveimport_gdrive::HttpConfig;

/// Uploads blobs with a single `PUT` to a pre-signed URL.
pub struct BlobUploader {
    http: reqwest::Client,
    max_bytes: u64,
}

impl BlobUploader {
    /// Create a new uploader.
    pub fn new(http: &HttpConfig) -> Result<Self> {
        Ok(Self {
            http: http.build_client()?,
            max_bytes: MAX_FILE_SIZE,
        })
    }

    /// Override the upload size ceiling (defaults to [`MAX_FILE_SIZE`]).
    pub fn with_max_bytes(mut self, limit: u64) -> Self {
        self.max_bytes = limit;
        self
    }

    /// Upload `data` to `url` with the given content type.
    ///
    /// # Errors
    /// - `PayloadTooLarge` if `data` exceeds the size ceiling
    /// - `Network` on transport failure or a non-success response
    pub async fn put(&self, url: &Url, data: Bytes, content_type: &str) -> Result<()> {
        if data.len() as u64 > self.max_bytes {
            return Err(Error::PayloadTooLarge(format!(
                "Upload of {} bytes exceeds {} bytes",
                data.len(),
                self.max_bytes
            )));
        }

        debug!(bytes = data.len(), content_type, "Uploading to signed URL");

        let response = self
            .http
            .put(url.clone())
            .header(header::CONTENT_TYPE, content_type)
            .body(data)
            .send()
            .await
            .map_err(|e| Error::Network(format!("Failed to upload blob: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Network(format!(
                "Upload failed: {} - {}",
                status, body
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_bytes, header as header_eq, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_put_sends_content_type_and_body() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/bucket/att-1"))
            .and(header_eq("content-type", "image/png"))
            .and(body_bytes(b"png-bytes".to_vec()))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let uploader = BlobUploader::new(&HttpConfig::default()).unwrap();
        let url = Url::parse(&format!("{}/bucket/att-1?expires=1", server.uri())).unwrap();
        uploader
            .put(&url, Bytes::from_static(b"png-bytes"), "image/png")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_put_rejected_by_storage() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(403).set_body_string("SignatureDoesNotMatch"))
            .mount(&server)
            .await;

        let uploader = BlobUploader::new(&HttpConfig::default()).unwrap();
        let url = Url::parse(&format!("{}/bucket/att-1", server.uri())).unwrap();
        let err = uploader
            .put(&url, Bytes::from_static(b"x"), "application/pdf")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Network(msg) if msg.contains("SignatureDoesNotMatch")));
    }

    #[tokio::test]
    async fn test_put_over_ceiling_is_never_sent() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let uploader = BlobUploader::new(&HttpConfig::default())
            .unwrap()
            .with_max_bytes(4);
        let url = Url::parse(&format!("{}/bucket/att-1", server.uri())).unwrap();
        let err = uploader
            .put(&url, Bytes::from_static(b"12345"), "image/png")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::PayloadTooLarge(_)));
    }
}
