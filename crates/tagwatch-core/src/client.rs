use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use reqwest::Url;
use reqwest::header::{ACCEPT, AUTHORIZATION};
use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::release::{Credentials, ReleaseRecord, RepositoryCoordinates};

pub const DEFAULT_API_BASE: &str = "https://api.github.com";
pub const DEFAULT_USER_AGENT: &str = "tagwatch";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);
pub const RELEASES_MEDIA_TYPE: &str = "application/vnd.github+json";

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("failed to build release API client: {0}")]
    ClientBuild(#[source] reqwest::Error),
    #[error("release API base URL cannot carry a path: {url}")]
    InvalidBaseUrl { url: String },
    #[error("failed to query release API: {0}")]
    Request(#[source] reqwest::Error),
    #[error("release API request failed with HTTP {status}{body_snippet}")]
    HttpStatus {
        status: reqwest::StatusCode,
        body_snippet: String,
    },
    #[error("release API returned an empty body")]
    EmptyBody,
    #[error("failed to parse release API response: {0}")]
    Decode(#[source] serde_json::Error),
    #[error("release API returned no usable release tag")]
    NoRelease,
}

/// Coarse failure classes callers branch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchFailureKind {
    Network,
    Decode,
    NoRelease,
}

impl FetchError {
    #[must_use]
    pub fn kind(&self) -> FetchFailureKind {
        match self {
            Self::ClientBuild(_)
            | Self::InvalidBaseUrl { .. }
            | Self::Request(_)
            | Self::HttpStatus { .. } => FetchFailureKind::Network,
            Self::EmptyBody | Self::Decode(_) => FetchFailureKind::Decode,
            Self::NoRelease => FetchFailureKind::NoRelease,
        }
    }
}

/// Anything that can answer release queries for a repository.
#[async_trait]
pub trait ReleaseSource: Send + Sync {
    /// The newest non-prerelease release.
    async fn fetch_latest(
        &self,
        coordinates: &RepositoryCoordinates,
        credentials: &Credentials,
    ) -> Result<ReleaseRecord, FetchError>;

    /// The `count` most recent releases, prereleases included, newest first.
    async fn fetch_recent(
        &self,
        coordinates: &RepositoryCoordinates,
        credentials: &Credentials,
        count: u8,
    ) -> Result<Vec<ReleaseRecord>, FetchError>;
}

#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub api_base: String,
    pub user_agent: String,
    pub timeout: Duration,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

/// GitHub releases API client.
#[derive(Debug, Clone)]
pub struct ReleaseClient {
    http: reqwest::Client,
    api_base: Url,
}

impl ReleaseClient {
    /// Build a client with its own connection pool and request timeout.
    ///
    /// # Errors
    /// Returns an error when the base URL is invalid or the HTTP client
    /// cannot be constructed.
    pub fn new(options: &ClientOptions) -> Result<Self, FetchError> {
        let api_base = Url::parse(&options.api_base)
            .ok()
            .filter(|url| !url.cannot_be_a_base())
            .ok_or_else(|| FetchError::InvalidBaseUrl {
                url: options.api_base.clone(),
            })?;

        let http = reqwest::Client::builder()
            .timeout(options.timeout)
            .user_agent(options.user_agent.clone())
            .build()
            .map_err(FetchError::ClientBuild)?;

        Ok(Self { http, api_base })
    }

    fn releases_url(&self, coordinates: &RepositoryCoordinates, tail: &[&str]) -> Url {
        let mut url = self.api_base.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments
                .pop_if_empty()
                .extend(["repos", coordinates.owner.as_str(), coordinates.repo.as_str()])
                .push("releases")
                .extend(tail);
        }
        url
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        url: Url,
        credentials: &Credentials,
    ) -> Result<T, FetchError> {
        debug!("Requesting {url}");

        let mut request = self.http.get(url).header(ACCEPT, RELEASES_MEDIA_TYPE);
        if let Some(token) = credentials.bearer() {
            request = request.header(AUTHORIZATION, format!("token {token}"));
        }

        let response = request.send().await.map_err(FetchError::Request)?;

        if !response.status().is_success() {
            let status = response.status();
            let body_snippet = response
                .text()
                .await
                .ok()
                .map(|body| response_snippet(&body, 160))
                .unwrap_or_default();
            return Err(FetchError::HttpStatus {
                status,
                body_snippet,
            });
        }

        let body = response.bytes().await.map_err(FetchError::Request)?;
        if body.iter().all(u8::is_ascii_whitespace) {
            return Err(FetchError::EmptyBody);
        }

        serde_json::from_slice(&body).map_err(FetchError::Decode)
    }
}

#[async_trait]
impl ReleaseSource for ReleaseClient {
    async fn fetch_latest(
        &self,
        coordinates: &RepositoryCoordinates,
        credentials: &Credentials,
    ) -> Result<ReleaseRecord, FetchError> {
        let url = self.releases_url(coordinates, &["latest"]);
        let release: ReleaseRecord = self.get_json(url, credentials).await?;
        if release.tag_name.trim().is_empty() {
            return Err(FetchError::NoRelease);
        }
        Ok(release)
    }

    async fn fetch_recent(
        &self,
        coordinates: &RepositoryCoordinates,
        credentials: &Credentials,
        count: u8,
    ) -> Result<Vec<ReleaseRecord>, FetchError> {
        let mut url = self.releases_url(coordinates, &[]);
        url.query_pairs_mut()
            .append_pair("per_page", &count.to_string());

        let releases: Vec<ReleaseRecord> = self.get_json(url, credentials).await?;
        Ok(releases
            .into_iter()
            .filter(|release| !release.tag_name.trim().is_empty())
            .collect())
    }
}

fn response_snippet(body: &str, max_chars: usize) -> String {
    let snippet: String = body.chars().take(max_chars).collect();
    if snippet.is_empty() {
        String::new()
    } else {
        format!(": {snippet}")
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn coordinates() -> RepositoryCoordinates {
        RepositoryCoordinates::new("acme", "widget")
    }

    fn client_for(server: &MockServer) -> ReleaseClient {
        ReleaseClient::new(&ClientOptions {
            api_base: server.uri(),
            ..ClientOptions::default()
        })
        .expect("client should build")
    }

    fn release_json(tag: &str, prerelease: bool) -> serde_json::Value {
        json!({
            "tag_name": tag,
            "prerelease": prerelease,
            "html_url": format!("https://github.com/acme/widget/releases/tag/{tag}"),
            "zipball_url": format!("https://api.github.com/repos/acme/widget/zipball/{tag}"),
            "assets": [
                { "name": "widget.zip", "browser_download_url": format!("https://dl.test/{tag}/widget.zip") }
            ]
        })
    }

    #[tokio::test]
    async fn fetch_latest_sends_media_type_and_user_agent() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/acme/widget/releases/latest"))
            .and(header("accept", RELEASES_MEDIA_TYPE))
            .and(header("user-agent", DEFAULT_USER_AGENT))
            .respond_with(ResponseTemplate::new(200).set_body_json(release_json("v1.2.0", false)))
            .expect(1)
            .mount(&server)
            .await;

        let release = client_for(&server)
            .fetch_latest(&coordinates(), &Credentials::anonymous())
            .await
            .expect("latest release should be fetched");

        assert_eq!(release.tag_name, "v1.2.0");
        assert_eq!(release.assets.len(), 1);

        let requests = server
            .received_requests()
            .await
            .expect("request recording should be enabled");
        assert!(requests[0].headers.get("authorization").is_none());
    }

    #[tokio::test]
    async fn fetch_latest_attaches_token_when_present() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/acme/widget/releases/latest"))
            .and(header("authorization", "token ghp_example"))
            .respond_with(ResponseTemplate::new(200).set_body_json(release_json("v1.2.0", false)))
            .expect(1)
            .mount(&server)
            .await;

        let result = client_for(&server)
            .fetch_latest(&coordinates(), &Credentials::token("ghp_example"))
            .await;

        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn fetch_recent_requests_page_size_and_keeps_order() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/acme/widget/releases"))
            .and(query_param("per_page", "10"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                release_json("v2.1.0-beta", true),
                release_json("v2.0.0", false),
                { "tag_name": "", "prerelease": true }
            ])))
            .expect(1)
            .mount(&server)
            .await;

        let releases = client_for(&server)
            .fetch_recent(&coordinates(), &Credentials::anonymous(), 10)
            .await
            .expect("recent releases should be fetched");

        let tags: Vec<&str> = releases.iter().map(|r| r.tag_name.as_str()).collect();
        assert_eq!(tags, ["v2.1.0-beta", "v2.0.0"]);
    }

    #[tokio::test]
    async fn non_success_status_is_a_network_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404).set_body_string("{\"message\":\"Not Found\"}"))
            .mount(&server)
            .await;

        let error = client_for(&server)
            .fetch_latest(&coordinates(), &Credentials::anonymous())
            .await
            .expect_err("404 should fail");

        assert_eq!(error.kind(), FetchFailureKind::Network);
        assert!(matches!(
            error,
            FetchError::HttpStatus { status, ref body_snippet }
                if status == reqwest::StatusCode::NOT_FOUND && body_snippet.contains("Not Found")
        ));
    }

    #[tokio::test]
    async fn empty_and_malformed_bodies_are_decode_failures() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/acme/widget/releases/latest"))
            .respond_with(ResponseTemplate::new(200).set_body_string("  "))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/repos/acme/widget/releases"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let empty = client
            .fetch_latest(&coordinates(), &Credentials::anonymous())
            .await
            .expect_err("empty body should fail");
        assert!(matches!(empty, FetchError::EmptyBody));
        assert_eq!(empty.kind(), FetchFailureKind::Decode);

        let malformed = client
            .fetch_recent(&coordinates(), &Credentials::anonymous(), 10)
            .await
            .expect_err("non-JSON body should fail");
        assert!(matches!(malformed, FetchError::Decode(_)));
    }

    #[tokio::test]
    async fn release_without_tag_is_no_release() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "html_url": "x" })))
            .mount(&server)
            .await;

        let error = client_for(&server)
            .fetch_latest(&coordinates(), &Credentials::anonymous())
            .await
            .expect_err("tagless release should fail");

        assert_eq!(error.kind(), FetchFailureKind::NoRelease);
    }

    #[tokio::test]
    async fn slow_response_times_out_as_network_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(release_json("v1.0.0", false))
                    .set_delay(Duration::from_secs(5)),
            )
            .mount(&server)
            .await;

        let client = ReleaseClient::new(&ClientOptions {
            api_base: server.uri(),
            timeout: Duration::from_millis(200),
            ..ClientOptions::default()
        })
        .expect("client should build");

        let error = client
            .fetch_latest(&coordinates(), &Credentials::anonymous())
            .await
            .expect_err("request should time out");
        assert_eq!(error.kind(), FetchFailureKind::Network);
    }

    #[test]
    fn releases_url_encodes_path_segments() {
        let client = ReleaseClient::new(&ClientOptions {
            api_base: "https://api.example.test/".to_string(),
            ..ClientOptions::default()
        })
        .expect("client should build");

        let url = client.releases_url(&RepositoryCoordinates::new("ac me", "wid/get"), &["latest"]);
        assert_eq!(
            url.as_str(),
            "https://api.example.test/repos/ac%20me/wid%2Fget/releases/latest"
        );
    }

    #[test]
    fn invalid_base_url_is_rejected() {
        let result = ReleaseClient::new(&ClientOptions {
            api_base: "not a url".to_string(),
            ..ClientOptions::default()
        });
        assert!(matches!(result, Err(FetchError::InvalidBaseUrl { .. })));
    }
}
