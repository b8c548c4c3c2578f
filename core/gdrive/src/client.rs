//! Google Drive API client.

use bytes::{Bytes, BytesMut};
use chrono::{DateTime, Utc};
use futures::{Stream, StreamExt};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use driveimport_common::{Error, Result, Secret, MAX_FILE_SIZE};

use crate::config::{GoogleConfig, HttpConfig};
use crate::mime::{listing_query, ImportMode, PDF_MIME_TYPE};

/// Fields requested when listing files.
const LIST_FIELDS: &str = "nextPageToken, files(id, name, size, modifiedTime, mimeType)";

/// Google Drive file metadata from API.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriveFile {
    /// File ID.
    pub id: String,
    /// File name.
    pub name: String,
    /// MIME type.
    pub mime_type: String,
    /// File size in bytes. Native documents have none.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,
    /// Modified time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified_time: Option<DateTime<Utc>>,
}

impl DriveFile {
    /// Get size as u64.
    pub fn size_bytes(&self) -> Option<u64> {
        self.size.as_ref().and_then(|s| s.parse().ok())
    }

    /// Check whether the file may be offered for import.
    ///
    /// Files without a declared size are always kept; their size is only
    /// known after export. A size that does not parse is treated as too large.
    pub fn within_size_limit(&self) -> bool {
        match &self.size {
            None => true,
            Some(_) => self.size_bytes().is_some_and(|size| size < MAX_FILE_SIZE),
        }
    }

    /// How this file's content is fetched.
    pub fn import_mode(&self) -> ImportMode {
        ImportMode::for_mime_type(&self.mime_type)
    }
}

/// A page of listed files.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileList {
    #[serde(default)]
    pub files: Vec<DriveFile>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_page_token: Option<String>,
}

impl FileList {
    /// Drop files whose declared size reaches the ceiling.
    pub fn retain_within_size_limit(&mut self) {
        self.files.retain(DriveFile::within_size_limit);
    }
}

/// Content fetched from Drive, ready to be stored.
#[derive(Debug, Clone)]
pub struct FileContent {
    /// Raw bytes.
    pub data: Bytes,
    /// MIME type of `data`.
    pub mime_type: String,
    /// How the content was fetched.
    pub mode: ImportMode,
}

/// Google Drive API client.
///
/// Requests are authorized with the access token passed to each call.
pub struct DriveClient {
    http: Client,
    api_base: Url,
    max_content_bytes: u64,
}

impl DriveClient {
    /// Create a new Drive client.
    pub fn new(config: &GoogleConfig, http: &HttpConfig) -> Result<Self> {
        Ok(Self {
            http: http.build_client()?,
            api_base: config.drive_api_base.clone(),
            max_content_bytes: MAX_FILE_SIZE,
        })
    }

    /// Override the content size ceiling (defaults to [`MAX_FILE_SIZE`]).
    pub fn with_max_content_bytes(mut self, limit: u64) -> Self {
        self.max_content_bytes = limit;
        self
    }

    /// Build `{api_base}/files/{segments...}`.
    fn files_url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.api_base.clone();
        url.path_segments_mut()
            .map_err(|_| Error::Configuration("Drive API base cannot be a base URL".to_string()))?
            .pop_if_empty()
            .push("files")
            .extend(segments);
        Ok(url)
    }

    /// List one page of the user's importable files.
    ///
    /// Results are newest first. Size filtering is left to the caller.
    pub async fn list_files(
        &self,
        access_token: &Secret,
        page_token: Option<&str>,
    ) -> Result<FileList> {
        let url = self.files_url(&[])?;
        let query = listing_query();

        let mut request = self
            .http
            .get(url)
            .bearer_auth(access_token.expose())
            .query(&[
                ("q", query.as_str()),
                ("fields", LIST_FIELDS),
                ("orderBy", "modifiedTime desc"),
            ]);

        if let Some(token) = page_token {
            request = request.query(&[("pageToken", token)]);
        }

        let response = request
            .send()
            .await
            .map_err(|e| Error::Network(format!("Failed to list files: {}", e)))?;

        self.handle_response(response).await
    }

    /// Fetch a file's content, exporting native documents to PDF.
    ///
    /// # Errors
    /// - `PayloadTooLarge` if the content exceeds the size ceiling
    /// - `NotFound` / `PermissionDenied` / `Network` from the Drive API
    pub async fn fetch_content(
        &self,
        access_token: &Secret,
        file: &DriveFile,
    ) -> Result<FileContent> {
        let mode = file.import_mode();
        let request = match mode {
            ImportMode::Export => self
                .http
                .get(self.files_url(&[file.id.as_str(), "export"])?)
                .query(&[("mimeType", PDF_MIME_TYPE)]),
            ImportMode::Download => self
                .http
                .get(self.files_url(&[file.id.as_str()])?)
                .query(&[("alt", "media")]),
        };

        debug!(file_id = %file.id, ?mode, "Fetching Drive file content");

        let response = request
            .bearer_auth(access_token.expose())
            .send()
            .await
            .map_err(|e| Error::Network(format!("Failed to fetch file {}: {}", file.id, e)))?;

        let response = Self::check_status(response).await?;
        let data = Self::read_bounded(response, self.max_content_bytes).await?;

        Ok(FileContent {
            data,
            mime_type: mode.output_mime_type(&file.mime_type).to_string(),
            mode,
        })
    }

    /// Read a response body, failing once it exceeds `limit` bytes.
    async fn read_bounded(response: reqwest::Response, limit: u64) -> Result<Bytes> {
        if let Some(length) = response.content_length() {
            if length > limit {
                return Err(Error::PayloadTooLarge(format!(
                    "Declared content length {} exceeds {} bytes",
                    length, limit
                )));
            }
        }

        collect_bounded(response.bytes_stream(), limit).await
    }

    /// Map non-success statuses to errors, passing successful responses through.
    async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();

        if status.is_success() {
            Ok(response)
        } else if status == StatusCode::NOT_FOUND {
            Err(Error::NotFound("Resource not found".to_string()))
        } else if status == StatusCode::UNAUTHORIZED {
            Err(Error::ReauthorizationRequired(
                "Invalid or expired token".to_string(),
            ))
        } else if status == StatusCode::FORBIDDEN {
            Err(Error::PermissionDenied("Access denied".to_string()))
        } else if status == StatusCode::PAYLOAD_TOO_LARGE {
            Err(Error::PayloadTooLarge("Export too large".to_string()))
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(Error::Network(format!("API error: {} - {}", status, body)))
        }
    }

    /// Handle API response with error checking.
    async fn handle_response<T: serde::de::DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> Result<T> {
        let response = Self::check_status(response).await?;

        response
            .json()
            .await
            .map_err(|e| Error::Serialization(format!("Failed to parse response: {}", e)))
    }
}

/// Collect a byte stream, failing as soon as it grows past `limit` bytes.
async fn collect_bounded<S, E>(stream: S, limit: u64) -> Result<Bytes>
where
    S: Stream<Item = std::result::Result<Bytes, E>>,
    E: std::fmt::Display,
{
    let mut stream = std::pin::pin!(stream);
    let mut buffer = BytesMut::new();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| Error::Network(format!("Stream read error: {}", e)))?;
        if (buffer.len() + chunk.len()) as u64 > limit {
            return Err(Error::PayloadTooLarge(format!(
                "Content exceeds {} bytes",
                limit
            )));
        }
        buffer.extend_from_slice(&chunk);
    }

    Ok(buffer.freeze())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use wiremock::matchers::{header, method, path, query_param, query_param_is_missing};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn drive_file(id: &str, name: &str, mime_type: &str, size: Option<&str>) -> DriveFile {
        DriveFile {
            id: id.to_string(),
            name: name.to_string(),
            mime_type: mime_type.to_string(),
            size: size.map(String::from),
            modified_time: None,
        }
    }

    fn drive_client(server: &MockServer) -> DriveClient {
        let base = Url::parse(&server.uri()).unwrap();
        let config = GoogleConfig::new("id", Secret::new("secret"))
            .with_base_url(&base)
            .unwrap();
        DriveClient::new(&config, &HttpConfig::default()).unwrap()
    }

    #[test]
    fn test_drive_file_size_bytes() {
        let file = drive_file("1", "a.pdf", "application/pdf", Some("12345"));
        assert_eq!(file.size_bytes(), Some(12345));

        let doc = drive_file("2", "Doc", "application/vnd.google-apps.document", None);
        assert_eq!(doc.size_bytes(), None);
    }

    #[test]
    fn test_size_limit_boundary() {
        assert!(drive_file("1", "a", "image/png", Some("299999999")).within_size_limit());
        assert!(!drive_file("2", "b", "image/png", Some("300000000")).within_size_limit());
        assert!(!drive_file("3", "c", "image/png", Some("garbage")).within_size_limit());
        assert!(drive_file("4", "d", "application/vnd.google-apps.sheet", None).within_size_limit());
    }

    #[test]
    fn test_file_list_serializes_camel_case() {
        let list = FileList {
            files: vec![drive_file("1", "a.pdf", "application/pdf", Some("10"))],
            next_page_token: Some("next".to_string()),
        };
        let json = serde_json::to_value(&list).unwrap();
        assert_eq!(json["nextPageToken"], "next");
        assert_eq!(json["files"][0]["mimeType"], "application/pdf");
    }

    proptest! {
        #[test]
        fn declared_size_filter(size in 0u64..600_000_000) {
            let mut list = FileList {
                files: vec![
                    drive_file("sized", "a", "application/pdf", Some(&size.to_string())),
                    drive_file("native", "b", "application/vnd.google-apps.document", None),
                ],
                next_page_token: None,
            };
            list.retain_within_size_limit();

            prop_assert!(list.files.iter().any(|f| f.id == "native"));
            prop_assert_eq!(list.files.iter().any(|f| f.id == "sized"), size < MAX_FILE_SIZE);
        }
    }

    #[tokio::test]
    async fn test_list_files_sends_query() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/drive/v3/files"))
            .and(header("authorization", "Bearer ya29.token"))
            .and(query_param("orderBy", "modifiedTime desc"))
            .and(query_param("q", listing_query().as_str()))
            .and(query_param("pageToken", "page-2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "nextPageToken": "page-3",
                "files": [
                    {"id": "a", "name": "a.pdf", "mimeType": "application/pdf", "size": "100"}
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = drive_client(&server);
        let list = client
            .list_files(&Secret::new("ya29.token"), Some("page-2"))
            .await
            .unwrap();

        assert_eq!(list.files.len(), 1);
        assert_eq!(list.next_page_token.as_deref(), Some("page-3"));
    }

    #[tokio::test]
    async fn test_list_files_without_page_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/drive/v3/files"))
            .and(query_param_is_missing("pageToken"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"files": []})))
            .expect(1)
            .mount(&server)
            .await;

        let client = drive_client(&server);
        let list = client.list_files(&Secret::new("t"), None).await.unwrap();
        assert!(list.files.is_empty());
        assert!(list.next_page_token.is_none());
    }

    #[tokio::test]
    async fn test_fetch_exports_native_document() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/drive/v3/files/doc-1/export"))
            .and(query_param("mimeType", "application/pdf"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"%PDF-1.7".to_vec()))
            .expect(1)
            .mount(&server)
            .await;

        let client = drive_client(&server);
        let file = drive_file("doc-1", "Report", "application/vnd.google-apps.document", None);
        let content = client.fetch_content(&Secret::new("t"), &file).await.unwrap();

        assert_eq!(content.mode, ImportMode::Export);
        assert_eq!(content.mime_type, "application/pdf");
        assert_eq!(&content.data[..], b"%PDF-1.7");
    }

    #[tokio::test]
    async fn test_fetch_downloads_binary() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/drive/v3/files/img-1"))
            .and(query_param("alt", "media"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0x89, b'P', b'N', b'G']))
            .expect(1)
            .mount(&server)
            .await;

        let client = drive_client(&server);
        let file = drive_file("img-1", "Photo.png", "image/png", Some("4"));
        let content = client.fetch_content(&Secret::new("t"), &file).await.unwrap();

        assert_eq!(content.mode, ImportMode::Download);
        assert_eq!(content.mime_type, "image/png");
        assert_eq!(content.data.len(), 4);
    }

    #[tokio::test]
    async fn test_fetch_maps_forbidden() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/drive/v3/files/secret"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;

        let client = drive_client(&server);
        let file = drive_file("secret", "x.pdf", "application/pdf", None);
        let err = client.fetch_content(&Secret::new("t"), &file).await.unwrap_err();
        assert!(matches!(err, Error::PermissionDenied(_)));
    }

    #[tokio::test]
    async fn test_fetch_rejects_content_over_ceiling() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/drive/v3/files/big"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"123456789".to_vec()))
            .expect(1)
            .mount(&server)
            .await;

        let client = drive_client(&server).with_max_content_bytes(8);
        let file = drive_file("big", "big.bin", "application/zip", None);
        let err = client.fetch_content(&Secret::new("t"), &file).await.unwrap_err();
        assert!(matches!(err, Error::PayloadTooLarge(_)));
    }

    #[tokio::test]
    async fn test_fetch_accepts_content_at_ceiling() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/drive/v3/files/exact"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"12345678".to_vec()))
            .mount(&server)
            .await;

        let client = drive_client(&server).with_max_content_bytes(8);
        let file = drive_file("exact", "exact.bin", "application/zip", None);
        let content = client.fetch_content(&Secret::new("t"), &file).await.unwrap();
        assert_eq!(content.data.len(), 8);
    }

    #[tokio::test]
    async fn test_streamed_body_past_ceiling_is_rejected() {
        let chunks = futures::stream::iter(vec![
            Ok::<_, std::io::Error>(Bytes::from_static(b"1234")),
            Ok(Bytes::from_static(b"5678")),
            Ok(Bytes::from_static(b"9")),
        ]);
        let err = collect_bounded(chunks, 8).await.unwrap_err();
        assert!(matches!(err, Error::PayloadTooLarge(_)));

        let chunks = futures::stream::iter(vec![
            Ok::<_, std::io::Error>(Bytes::from_static(b"1234")),
            Ok(Bytes::from_static(b"5678")),
        ]);
        let data = collect_bounded(chunks, 8).await.unwrap();
        assert_eq!(&data[..], b"12345678");
    }
}
