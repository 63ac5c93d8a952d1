//! Remote fetcher: resolves file metadata and opens the body transfer.

use crate::error::{Error, Result};
use crate::types::RemoteFileInfo;
use crate::utils::{filename_from_content_disposition, filename_from_url, sanitize_file_name};
use reqwest::header::{CONTENT_DISPOSITION, CONTENT_LENGTH, HeaderMap};

/// HTTP client wrapper for the two requests a job makes against the source
#[derive(Clone, Debug, Default)]
pub struct RemoteFetcher {
    client: reqwest::Client,
}

impl RemoteFetcher {
    /// Create a fetcher with a caller-configured client
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// Resolve name and size without transferring the body
    ///
    /// Issues a HEAD request. The size comes from the `Content-Length` header
    /// and a missing or unparsable value is an error, since the job could not
    /// be routed safely without it. The name is taken from
    /// `Content-Disposition` if present, otherwise from the last segment of
    /// the final (post-redirect) URL. An empty name is returned as-is; the
    /// caller decides whether that is fatal.
    pub async fn get_metadata(&self, url: &str) -> Result<RemoteFileInfo> {
        let response = self.client.head(url).send().await?;

        if !response.status().is_success() {
            return Err(Error::NonSuccessStatus {
                status: response.status().as_u16(),
                url: url.to_string(),
            });
        }

        // reqwest reports a zero body hint for HEAD, so read the raw header
        let size = parse_content_length(response.headers())?;
        let name = derive_name(response.headers(), response.url().as_str());

        tracing::debug!(url, name = %name, size, "resolved remote metadata");
        Ok(RemoteFileInfo { name, size })
    }

    /// Start the body transfer
    ///
    /// The returned response is consumed chunk by chunk by the caller.
    /// A non-2xx status is reported as [`Error::NonSuccessStatus`].
    pub async fn fetch_body(&self, url: &str) -> Result<reqwest::Response> {
        let response = self.client.get(url).send().await?;

        if !response.status().is_success() {
            return Err(Error::NonSuccessStatus {
                status: response.status().as_u16(),
                url: url.to_string(),
            });
        }

        Ok(response)
    }
}

fn parse_content_length(headers: &HeaderMap) -> Result<u64> {
    let value = headers
        .get(CONTENT_LENGTH)
        .ok_or_else(|| Error::InvalidContentLength("missing Content-Length header".to_string()))?;
    let text = value
        .to_str()
        .map_err(|e| Error::InvalidContentLength(e.to_string()))?;
    text.trim()
        .parse::<u64>()
        .map_err(|e| Error::InvalidContentLength(format!("{text:?}: {e}")))
}

fn derive_name(headers: &HeaderMap, final_url: &str) -> String {
    let from_header = headers
        .get(CONTENT_DISPOSITION)
        .and_then(|v| v.to_str().ok())
        .and_then(filename_from_content_disposition);

    from_header
        .or_else(|| filename_from_url(final_url))
        .map(|name| sanitize_file_name(&name))
        .unwrap_or_default()
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn metadata_from_content_disposition() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .and(path("/download"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-disposition", r#"attachment; filename="big file.iso""#)
                    .set_body_bytes(vec![0u8; 1234]),
            )
            .mount(&server)
            .await;

        let fetcher = RemoteFetcher::default();
        let info = fetcher
            .get_metadata(&format!("{}/download", server.uri()))
            .await
            .unwrap();

        assert_eq!(info.name, "big file.iso");
        assert_eq!(info.size, 1234);
    }

    #[tokio::test]
    async fn metadata_falls_back_to_url_segment() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .and(path("/files/data.bin"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0u8; 10]))
            .mount(&server)
            .await;

        let info = RemoteFetcher::default()
            .get_metadata(&format!("{}/files/data.bin", server.uri()))
            .await
            .unwrap();

        assert_eq!(info.name, "data.bin");
        assert_eq!(info.size, 10);
    }

    #[tokio::test]
    async fn metadata_name_may_be_empty() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0u8; 3]))
            .mount(&server)
            .await;

        let info = RemoteFetcher::default()
            .get_metadata(&format!("{}/", server.uri()))
            .await
            .unwrap();

        assert!(info.name.is_empty());
        assert_eq!(info.size, 3);
    }

    #[tokio::test]
    async fn metadata_non_success_status() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let err = RemoteFetcher::default()
            .get_metadata(&format!("{}/gone.zip", server.uri()))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::NonSuccessStatus { status: 404, .. }));
    }

    #[tokio::test]
    async fn body_non_success_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let err = RemoteFetcher::default()
            .fetch_body(&format!("{}/file.zip", server.uri()))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::NonSuccessStatus { status: 503, .. }));
    }

    #[tokio::test]
    async fn body_is_returned_for_streaming() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/file.zip"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"hello".to_vec()))
            .mount(&server)
            .await;

        let mut response = RemoteFetcher::default()
            .fetch_body(&format!("{}/file.zip", server.uri()))
            .await
            .unwrap();

        let mut body = Vec::new();
        while let Some(chunk) = response.chunk().await.unwrap() {
            body.extend_from_slice(&chunk);
        }
        assert_eq!(body, b"hello");
    }

    #[test]
    fn content_length_must_parse() {
        let mut headers = HeaderMap::new();
        assert!(matches!(
            parse_content_length(&headers),
            Err(Error::InvalidContentLength(_))
        ));

        headers.insert(CONTENT_LENGTH, "abc".parse().unwrap());
        assert!(matches!(
            parse_content_length(&headers),
            Err(Error::InvalidContentLength(_))
        ));

        headers.insert(CONTENT_LENGTH, "4096".parse().unwrap());
        assert_eq!(parse_content_length(&headers).unwrap(), 4096);
    }

    #[test]
    fn derived_names_are_sanitized() {
        let mut headers = HeaderMap::new();
        headers.insert(
            CONTENT_DISPOSITION,
            r#"attachment; filename="../../evil.sh""#.parse().unwrap(),
        );
        assert_eq!(
            derive_name(&headers, "https://example.com/x"),
            ".._.._evil.sh"
        );
    }
}
