// ABOUTME: Minimal HTTP/1 client over hyper used by the stock prober and webhook notifier.
// ABOUTME: Plain http:// only; each request opens its own connection.

use async_trait::async_trait;
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::{Method, Request, StatusCode, Uri};
use hyper_util::rt::TokioIo;
use snafu::{ResultExt, Snafu};
use tokio::net::TcpStream;

use super::{HealthProber, HealthStatus, ProbeError, Release};

/// Transport-level HTTP failures.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum HttpError {
    #[snafu(display("invalid URL '{url}': {reason}"))]
    InvalidUrl { url: String, reason: String },

    #[snafu(display("failed to connect to {address}: {source}"))]
    Connect {
        address: String,
        source: std::io::Error,
    },

    #[snafu(display("HTTP handshake with {address} failed: {source}"))]
    Handshake {
        address: String,
        source: hyper::Error,
    },

    #[snafu(display("failed to build request for {url}: {source}"))]
    BuildRequest {
        url: String,
        source: hyper::http::Error,
    },

    #[snafu(display("request to {url} failed: {source}"))]
    Send { url: String, source: hyper::Error },

    #[snafu(display("failed to read response from {url}: {source}"))]
    Body { url: String, source: hyper::Error },
}

/// Error kind for programmatic handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpErrorKind {
    /// The URL cannot be used (bad syntax or unsupported scheme).
    InvalidUrl,
    /// No TCP connection could be established.
    Connection,
    /// The connection was established but the exchange failed.
    Protocol,
}

impl HttpError {
    pub fn kind(&self) -> HttpErrorKind {
        match self {
            HttpError::InvalidUrl { .. } | HttpError::BuildRequest { .. } => {
                HttpErrorKind::InvalidUrl
            }
            HttpError::Connect { .. } => HttpErrorKind::Connection,
            HttpError::Handshake { .. } | HttpError::Send { .. } | HttpError::Body { .. } => {
                HttpErrorKind::Protocol
            }
        }
    }
}

/// Split an `http://` URL into connect address, Host header and request path.
fn parse_target(url: &str) -> Result<(String, String, String), HttpError> {
    let invalid = |reason: &str| HttpError::InvalidUrl {
        url: url.to_string(),
        reason: reason.to_string(),
    };

    let uri: Uri = url.parse().map_err(|e: hyper::http::uri::InvalidUri| invalid(&e.to_string()))?;
    if uri.scheme_str() != Some("http") {
        return Err(invalid("only http:// URLs are supported"));
    }
    let host = uri.host().ok_or_else(|| invalid("missing host"))?;
    let port = uri.port_u16().unwrap_or(80);
    let authority = uri
        .authority()
        .map(|a| a.as_str().to_string())
        .unwrap_or_else(|| host.to_string());
    let path = uri
        .path_and_query()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| "/".to_string());

    Ok((format!("{host}:{port}"), authority, path))
}

pub(crate) async fn send(
    method: Method,
    url: &str,
    json_body: Option<Bytes>,
) -> Result<StatusCode, HttpError> {
    let (address, authority, path) = parse_target(url)?;

    let stream = TcpStream::connect(&address).await.context(ConnectSnafu {
        address: address.clone(),
    })?;
    let io = TokioIo::new(stream);

    let (mut sender, conn) = hyper::client::conn::http1::handshake(io)
        .await
        .context(HandshakeSnafu {
            address: address.clone(),
        })?;

    tokio::spawn(async move {
        if let Err(e) = conn.await {
            tracing::debug!("HTTP connection error: {}", e);
        }
    });

    let mut builder = Request::builder()
        .method(method)
        .uri(path)
        .header(hyper::header::HOST, authority);
    if json_body.is_some() {
        builder = builder.header(hyper::header::CONTENT_TYPE, "application/json");
    }
    let req = builder
        .body(Full::new(json_body.unwrap_or_default()))
        .context(BuildRequestSnafu { url })?;

    let resp = sender.send_request(req).await.context(SendSnafu { url })?;
    let status = resp.status();
    // Drain the body so the connection shuts down cleanly.
    resp.into_body()
        .collect()
        .await
        .context(BodySnafu { url })?;

    Ok(status)
}

/// Health prober that issues `GET` against the service's health URL.
///
/// 2xx is healthy, any other status is unhealthy, transport failures are
/// probe errors. Services without a health target are healthy once deployed.
#[derive(Debug, Clone, Copy, Default)]
pub struct HttpProber;

#[async_trait]
impl HealthProber for HttpProber {
    async fn probe(&self, release: &Release) -> Result<HealthStatus, ProbeError> {
        let Some(ref url) = release.health else {
            tracing::debug!(service = %release.service, "no health target, treating as healthy");
            return Ok(HealthStatus::Healthy);
        };

        let status = send(Method::GET, url, None).await?;
        if status.is_success() {
            Ok(HealthStatus::Healthy)
        } else {
            Ok(HealthStatus::Unhealthy {
                reason: format!("{url} returned HTTP {}", status.as_u16()),
            })
        }
    }
}
