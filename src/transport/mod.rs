//! # Telemetry Transport Module
//!
//! Delivers one encoded sample to the remote sink per call.
//!
//! This module handles:
//! - Schema-driven encoding (line protocol or JSON, see `encoding`)
//! - HTTP POST with optional `Authorization` header
//! - Bounded wait per request
//! - Classifying the result as a `DeliveryOutcome`
//!
//! Nothing here retries; the sampling loop decides what happens next.

pub mod encoding;

use async_trait::async_trait;
use reqwest::header::{HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::de::Error as _;
use std::error::Error as _;
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use crate::error::{PowermonError, Result};
use crate::link::InterfaceHandle;
use crate::sensor::Sample;
use encoding::{EncodeError, Encoding, Payload};

/// Maximum number of body bytes kept from a rejected request
pub const MAX_REJECTION_BODY: usize = 512;

/// Where and how samples are delivered
#[derive(Clone)]
pub struct EndpointConfig {
    pub url: String,
    pub auth_token: Option<String>,
    /// `Authorization` scheme, e.g. "Bearer" or "Token"
    pub auth_scheme: String,
    pub device_id: String,
    pub location: String,
    pub measurement: String,
    pub encoding: Encoding,
    /// Bound on one request, connect through body
    pub timeout: Duration,
}

impl fmt::Debug for EndpointConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EndpointConfig")
            .field("url", &self.url)
            .field("device_id", &self.device_id)
            .field("location", &self.location)
            .field("measurement", &self.measurement)
            .field("encoding", &self.encoding)
            .field("timeout", &self.timeout)
            .field("authenticated", &self.auth_token.is_some())
            .finish_non_exhaustive()
    }
}

/// Network-level delivery failure
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("no response within {0:?}")]
    Timeout(Duration),

    #[error("connection failed: {0}")]
    Connect(String),

    /// Interface has no usable address
    #[error("link down")]
    LinkDown,

    #[error("request failed: {0}")]
    Request(String),
}

impl TransportError {
    /// Failures that point at the local link rather than the remote end
    pub fn is_link_level(&self) -> bool {
        matches!(self, TransportError::Connect(_) | TransportError::LinkDown)
    }
}

/// Result of exactly one delivery attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Delivered,
    RemoteRejected { status: u16, body: String },
    TransportFailed(TransportError),
}

/// Destination for encoded samples
#[async_trait]
pub trait TelemetrySink: Send + Sync {
    /// Encode with the sink's declared schema
    fn encode(&self, sample: &Sample) -> std::result::Result<Payload, EncodeError>;

    /// Make one delivery attempt over `handle`
    async fn deliver(&self, payload: Payload, handle: &InterfaceHandle) -> DeliveryOutcome;
}

/// HTTP sink (InfluxDB write API, PostgREST, ...)
pub struct HttpTransport {
    client: reqwest::Client,
    endpoint: EndpointConfig,
    authorization: Option<HeaderValue>,
}

impl fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpTransport")
            .field("endpoint", &self.endpoint)
            .finish_non_exhaustive()
    }
}

impl HttpTransport {
    /// Build the HTTP client for `endpoint`
    ///
    /// # Errors
    ///
    /// Returns error if the token cannot be sent as a header or the client
    /// cannot be constructed.
    pub fn new(endpoint: EndpointConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(endpoint.timeout)
            .connect_timeout(endpoint.timeout)
            .user_agent(concat!("powermon/", env!("CARGO_PKG_VERSION")))
            .build()?;

        let authorization = match &endpoint.auth_token {
            Some(token) => {
                let mut value = HeaderValue::from_str(&format!("{} {}", endpoint.auth_scheme, token))
                    .map_err(|e| {
                        PowermonError::Config(toml::de::Error::custom(format!(
                            "auth_token is not a valid header value: {}",
                            e
                        )))
                    })?;
                value.set_sensitive(true);
                Some(value)
            }
            None => None,
        };

        Ok(Self {
            client,
            endpoint,
            authorization,
        })
    }

    fn classify(&self, error: reqwest::Error) -> TransportError {
        if error.is_timeout() {
            TransportError::Timeout(self.endpoint.timeout)
        } else if error.is_connect() {
            TransportError::Connect(error_chain(&error))
        } else {
            TransportError::Request(error_chain(&error))
        }
    }
}

#[async_trait]
impl TelemetrySink for HttpTransport {
    fn encode(&self, sample: &Sample) -> std::result::Result<Payload, EncodeError> {
        self.endpoint.encoding.encode(&self.endpoint, sample)
    }

    async fn deliver(&self, payload: Payload, handle: &InterfaceHandle) -> DeliveryOutcome {
        if handle.ip().is_unspecified() {
            return DeliveryOutcome::TransportFailed(TransportError::LinkDown);
        }

        debug!(
            "POST {} from {} ({} bytes, {})",
            self.endpoint.url,
            handle.ip(),
            payload.body.len(),
            payload.content_type
        );

        let mut request = self
            .client
            .post(&self.endpoint.url)
            .header(CONTENT_TYPE, payload.content_type)
            .body(payload.body);
        if let Some(authorization) = &self.authorization {
            request = request.header(AUTHORIZATION, authorization.clone());
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => return DeliveryOutcome::TransportFailed(self.classify(e)),
        };

        let status = response.status();
        let body = match response.text().await {
            Ok(body) => body,
            Err(e) if status.is_success() => {
                debug!("Could not read response body: {}", e);
                String::new()
            }
            Err(e) => format!("<unreadable body: {}>", error_chain(&e)),
        };

        if status.is_success() {
            debug!("Sink answered {}: {}", status, body);
            DeliveryOutcome::Delivered
        } else {
            DeliveryOutcome::RemoteRejected {
                status: status.as_u16(),
                body: truncate_body(body),
            }
        }
    }
}

/// Render an error with its sources, e.g. "error sending request: Connection refused"
fn error_chain(error: &reqwest::Error) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

fn truncate_body(mut body: String) -> String {
    if body.len() > MAX_REJECTION_BODY {
        let mut end = MAX_REJECTION_BODY;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        body.truncate(end);
    }
    body
}
