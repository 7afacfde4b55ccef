//! Submission of NDJSON bulk bodies to the index endpoint.

use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;

use reqwest::header::CONTENT_TYPE;
use reqwest::{Certificate, Client};
use tracing::debug;
use url::Url;

use orgenrich_shared::{EnrichError, Result};

/// User-Agent string for bulk requests.
const USER_AGENT: &str = concat!("orgenrich/", env!("CARGO_PKG_VERSION"));

/// Status and body of a bulk request that reached the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkResponse {
    pub status: u16,
    pub body: String,
}

/// Sends one bulk body. An `Err` means the request never got a response.
pub trait BulkTransport {
    fn submit(&self, body: String) -> impl Future<Output = Result<BulkResponse>> + Send;
}

/// Settings for [`HttpBulkTransport`].
#[derive(Debug, Clone)]
pub struct HttpBulkOptions {
    /// Full `_bulk` endpoint URL.
    pub url: Url,
    pub username: String,
    pub password: String,
    /// PEM trust anchor. When set it replaces the built-in roots.
    pub ca_cert: Option<PathBuf>,
    pub timeout: Duration,
}

/// Basic-auth HTTP transport for OpenSearch/Elasticsearch `_bulk`.
pub struct HttpBulkTransport {
    client: Client,
    options: HttpBulkOptions,
    built_in_roots: bool,
}

impl HttpBulkTransport {
    pub fn new(options: HttpBulkOptions) -> Result<Self> {
        let mut builder = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(options.timeout);

        if let Some(path) = &options.ca_cert {
            let pem = std::fs::read(path).map_err(|e| EnrichError::io(path, e))?;
            let cert = Certificate::from_pem(&pem).map_err(|e| {
                EnrichError::config(format!("invalid CA certificate {}: {e}", path.display()))
            })?;
            builder = builder
                .tls_built_in_root_certs(false)
                .add_root_certificate(cert);
        }
        let built_in_roots = options.ca_cert.is_none();

        let client = builder
            .build()
            .map_err(|e| EnrichError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            options,
            built_in_roots,
        })
    }

    /// Whether the platform trust store is consulted. False once a CA file is configured.
    pub fn uses_built_in_roots(&self) -> bool {
        self.built_in_roots
    }
}

impl BulkTransport for HttpBulkTransport {
    async fn submit(&self, body: String) -> Result<BulkResponse> {
        let url = &self.options.url;
        debug!(%url, bytes = body.len(), "submitting bulk request");

        let response = self
            .client
            .post(url.as_str())
            .basic_auth(&self.options.username, Some(&self.options.password))
            .header(CONTENT_TYPE, "application/x-ndjson")
            .body(body)
            .send()
            .await
            .map_err(|e| EnrichError::Network(format!("{url}: {e}")))?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| EnrichError::Network(format!("{url}: failed to read body: {e}")))?;

        Ok(BulkResponse { status, body })
    }
}
