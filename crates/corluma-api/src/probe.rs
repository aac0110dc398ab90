// HTTP probe client
//
// Fires the handful of requests discovery needs (pair, full connection
// test, directory lookup) and hands back the raw body, status and URL.
// Interpreting a reply is the caller's job: a 403 from a Nanoleaf that is
// not in pairing mode is a normal discovery outcome, not a transport
// failure, so only failures to get *any* reply become errors here.

use std::time::Duration;

use tracing::debug;
use url::Url;

use crate::error::Error;
use crate::family::ProtocolFamily;
use crate::transport::TransportConfig;
use crate::{hue, nanoleaf};

/// Default Hue cloud directory.
pub const NUPNP_URL: &str = "https://www.meethue.com/api/nupnp";

/// What a probe is trying to learn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProbeKind {
    /// Ask the device for a new auth token / username.
    RequestCredentials,
    /// Use a known token to fetch the device's full state.
    TestConnection,
    /// Query the vendor directory for devices on this network.
    Directory,
}

/// A single probe to be executed.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProbeRequest {
    pub family: ProtocolFamily,
    pub kind: ProbeKind,
    /// Bare host (no scheme). Empty for directory probes.
    pub host: String,
    pub port: u16,
    /// Token under test for `TestConnection`.
    pub token: Option<String>,
}

impl ProbeRequest {
    pub fn request_credentials(family: ProtocolFamily, host: &str, port: u16) -> Self {
        Self {
            family,
            kind: ProbeKind::RequestCredentials,
            host: host.to_owned(),
            port,
            token: None,
        }
    }

    pub fn test_connection(family: ProtocolFamily, host: &str, port: u16, token: &str) -> Self {
        Self {
            family,
            kind: ProbeKind::TestConnection,
            host: host.to_owned(),
            port,
            token: Some(token.to_owned()),
        }
    }

    pub fn directory(family: ProtocolFamily) -> Self {
        Self {
            family,
            kind: ProbeKind::Directory,
            host: String::new(),
            port: 0,
            token: None,
        }
    }
}

/// A reply that arrived, whatever its status code.
#[derive(Debug, Clone)]
pub struct ProbeResponse {
    pub request: ProbeRequest,
    pub url: Url,
    pub status: u16,
    pub body: String,
}

impl ProbeResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Decode the body as `T`, keeping the body in the error for logs.
    pub fn decode<T: serde::de::DeserializeOwned>(&self) -> Result<T, Error> {
        serde_json::from_str(&self.body).map_err(|e| Error::decode(&e, &self.body))
    }
}

/// Completion of a probe: either a reply, or the reason none arrived.
#[derive(Debug)]
pub enum ProbeOutcome {
    Response(ProbeResponse),
    Failed { request: ProbeRequest, error: Error },
}

impl ProbeOutcome {
    pub fn request(&self) -> &ProbeRequest {
        match self {
            Self::Response(r) => &r.request,
            Self::Failed { request, .. } => request,
        }
    }
}

/// HTTP client shared by every discovery engine.
///
/// Cheap to clone; clones share the connection pool.
#[derive(Debug, Clone)]
pub struct HttpProbe {
    http: reqwest::Client,
    nupnp_url: Url,
    device_type: String,
    timeout: Duration,
}

impl HttpProbe {
    /// Create a probe from a `TransportConfig`.
    ///
    /// `app_name` is announced to Hue bridges as `<app>#corluma device`.
    pub fn new(transport: &TransportConfig, nupnp_url: Url, app_name: &str) -> Result<Self, Error> {
        let http = transport.build_client()?;
        Ok(Self {
            http,
            nupnp_url,
            device_type: hue::device_type(app_name),
            timeout: transport.timeout,
        })
    }

    /// Create a probe around a pre-built `reqwest::Client`.
    pub fn with_client(http: reqwest::Client, nupnp_url: Url, app_name: &str) -> Self {
        Self {
            http,
            nupnp_url,
            device_type: hue::device_type(app_name),
            timeout: Duration::from_secs(30),
        }
    }

    /// The directory URL used for `ProbeKind::Directory`.
    pub fn nupnp_url(&self) -> &Url {
        &self.nupnp_url
    }

    /// Resolve the URL a request will hit.
    pub fn url_for(&self, request: &ProbeRequest) -> Result<Url, Error> {
        let token = request.token.as_deref().unwrap_or_default();
        match (request.family, request.kind) {
            (_, ProbeKind::Directory) => Ok(self.nupnp_url.clone()),
            (ProtocolFamily::Hue, ProbeKind::RequestCredentials) => {
                hue::credentials_url(&request.host, request.port)
            }
            (ProtocolFamily::Hue, ProbeKind::TestConnection) => {
                hue::state_url(&request.host, request.port, token)
            }
            (ProtocolFamily::Nanoleaf, ProbeKind::RequestCredentials) => {
                nanoleaf::credentials_url(&request.host, request.port)
            }
            (ProtocolFamily::Nanoleaf, ProbeKind::TestConnection) => {
                nanoleaf::state_url(&request.host, request.port, token)
            }
        }
    }

    /// Execute a probe. Never panics and never retries.
    pub async fn execute(&self, request: ProbeRequest) -> ProbeOutcome {
        match self.send(&request).await {
            Ok((url, status, body)) => ProbeOutcome::Response(ProbeResponse {
                request,
                url,
                status,
                body,
            }),
            Err(error) => ProbeOutcome::Failed { request, error },
        }
    }

    async fn send(&self, request: &ProbeRequest) -> Result<(Url, u16, String), Error> {
        let url = self.url_for(request)?;

        let builder = match (request.family, request.kind) {
            (ProtocolFamily::Hue, ProbeKind::RequestCredentials) => {
                debug!(%url, "POST");
                self.http
                    .post(url.clone())
                    .json(&hue::PairRequest::new(&self.device_type))
            }
            (ProtocolFamily::Nanoleaf, ProbeKind::RequestCredentials) => {
                debug!(%url, "POST");
                self.http
                    .post(url.clone())
                    .json(&serde_json::Map::new())
            }
            _ => {
                debug!(%url, "GET");
                self.http.get(url.clone())
            }
        };

        let resp = builder.send().await.map_err(|e| self.map_transport(e))?;
        let status = resp.status().as_u16();
        let body = resp.text().await.map_err(|e| self.map_transport(e))?;
        Ok((url, status, body.trim().to_owned()))
    }

    fn map_transport(&self, err: reqwest::Error) -> Error {
        if err.is_timeout() {
            Error::Timeout {
                timeout_secs: self.timeout.as_secs(),
            }
        } else {
            Error::Transport(err)
        }
    }
}
