//! GitHub contents API transport.

use async_trait::async_trait;
use reqwest::{
    Client, RequestBuilder, Response, StatusCode,
    header::{ACCEPT, AUTHORIZATION, ETAG, HeaderMap, IF_NONE_MATCH},
};
use time::OffsetDateTime;
use tracing::debug;
use url::Url;

use crate::application::remote::{
    ContentTransport, ListingEntry, ListingReply, RateLimit, TransportError,
};
use crate::config::{HttpSettings, SourceSettings};

use super::error::InfraError;

const SOURCE: &str = "infra::github";
const GITHUB_JSON: &str = "application/vnd.github.v3+json";
const HEADER_RATELIMIT_REMAINING: &str = "x-ratelimit-remaining";
const HEADER_RATELIMIT_RESET: &str = "x-ratelimit-reset";

/// Lists and downloads posts through the GitHub REST API.
#[derive(Clone)]
pub struct GitHubTransport {
    client: Client,
    listing_url: Url,
    token: Option<String>,
}

impl std::fmt::Debug for GitHubTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitHubTransport")
            .field("listing_url", &self.listing_url.as_str())
            .field("authenticated", &self.token.is_some())
            .finish()
    }
}

impl GitHubTransport {
    pub fn new(source: &SourceSettings, http: &HttpSettings) -> Result<Self, InfraError> {
        let client = Client::builder()
            .user_agent(http.user_agent.as_str())
            .timeout(http.timeout)
            .build()
            .map_err(InfraError::HttpClient)?;
        let listing_url = listing_url(source)?;

        Ok(Self {
            client,
            listing_url,
            token: source.token.clone(),
        })
    }

    pub fn listing_url(&self) -> &Url {
        &self.listing_url
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match self.token.as_deref() {
            Some(token) => request.header(AUTHORIZATION, format!("token {token}")),
            None => request,
        }
    }
}

#[async_trait]
impl ContentTransport for GitHubTransport {
    async fn list_directory(&self, etag: Option<&str>) -> Result<ListingReply, TransportError> {
        let url = self.listing_url.as_str();
        let mut request = self
            .authorize(self.client.get(self.listing_url.clone()))
            .header(ACCEPT, GITHUB_JSON);
        if let Some(etag) = etag {
            request = request.header(IF_NONE_MATCH, etag);
        }

        let response = request.send().await.map_err(|err| request_error(url, err))?;
        let status = response.status();
        let rate_limit = rate_limit(response.headers());
        debug!(
            target = SOURCE,
            status = status.as_u16(),
            remaining = ?rate_limit.remaining,
            "listing response"
        );

        if status == StatusCode::NOT_MODIFIED {
            return Ok(ListingReply::NotModified { rate_limit });
        }
        if is_rate_limited(status, &rate_limit) {
            return Ok(ListingReply::RateLimited { rate_limit });
        }
        if !status.is_success() {
            return Err(TransportError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let etag = response
            .headers()
            .get(ETAG)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let entries = response
            .json::<Vec<ListingEntry>>()
            .await
            .map_err(|err| decode_error(url, err))?;

        Ok(ListingReply::Listed {
            entries,
            etag,
            rate_limit,
        })
    }

    async fn download(&self, url: &str) -> Result<String, TransportError> {
        let response = self
            .authorize(self.client.get(url))
            .send()
            .await
            .map_err(|err| request_error(url, err))?;
        let response = ensure_success(url, response)?;
        response.text().await.map_err(|err| decode_error(url, err))
    }
}

fn listing_url(source: &SourceSettings) -> Result<Url, InfraError> {
    let mut url = source.api_base.clone();
    {
        let mut segments = url.path_segments_mut().map_err(|()| {
            InfraError::configuration(format!(
                "`{}` cannot be used as an API base",
                source.api_base
            ))
        })?;
        segments
            .pop_if_empty()
            .extend(["repos", source.owner.as_str(), source.repo.as_str(), "contents"])
            .extend(source.path.split('/').filter(|segment| !segment.is_empty()));
    }
    url.query_pairs_mut().append_pair("ref", &source.branch);
    Ok(url)
}

fn rate_limit(headers: &HeaderMap) -> RateLimit {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
    };

    RateLimit {
        remaining: header(HEADER_RATELIMIT_REMAINING).and_then(|value| value.parse().ok()),
        reset_at: header(HEADER_RATELIMIT_RESET)
            .and_then(|value| value.parse::<i64>().ok())
            .and_then(|epoch| OffsetDateTime::from_unix_timestamp(epoch).ok()),
    }
}

fn is_rate_limited(status: StatusCode, rate_limit: &RateLimit) -> bool {
    matches!(
        status,
        StatusCode::FORBIDDEN | StatusCode::TOO_MANY_REQUESTS
    ) && rate_limit.is_exhausted()
}

fn ensure_success(url: &str, response: Response) -> Result<Response, TransportError> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        Err(TransportError::Status {
            url: url.to_string(),
            status: status.as_u16(),
        })
    }
}

fn request_error(url: &str, err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout {
            url: url.to_string(),
        }
    } else {
        TransportError::Request {
            url: url.to_string(),
            message: err.to_string(),
        }
    }
}

fn decode_error(url: &str, err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        return TransportError::Timeout {
            url: url.to_string(),
        };
    }
    TransportError::Decode {
        url: url.to_string(),
        message: err.to_string(),
    }
}
