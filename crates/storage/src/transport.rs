//! HTTP transport behind a narrow trait
//!
//! The gateway builds [`Request`] values and hands them to a [`Transport`].
//! [`UreqTransport`] talks to the backend; tests swap in an in-memory fake.

use crate::config::GatewayConfig;
use std::fmt;

/// Header carrying the acting user on every request
pub const USER_HEADER: &str = "X-User-Id";

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("network error: {0}")]
    Network(String),
    #[error("server returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("unreadable response body: {0}")]
    Body(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Method::Get => f.write_str("GET"),
            Method::Post => f.write_str("POST"),
        }
    }
}

/// One named part of a `multipart/form-data` body
#[derive(Debug, Clone, PartialEq)]
pub struct Part {
    pub name: String,
    pub filename: Option<String>,
    pub content_type: Option<String>,
    pub data: Vec<u8>,
}

/// Minimal `multipart/form-data` builder
#[derive(Debug, Clone, PartialEq)]
pub struct MultipartForm {
    boundary: String,
    parts: Vec<Part>,
}

impl Default for MultipartForm {
    fn default() -> Self {
        Self::new()
    }
}

impl MultipartForm {
    pub fn new() -> Self {
        Self::with_boundary(format!("annotator-{}", uuid::Uuid::new_v4().simple()))
    }

    pub fn with_boundary(boundary: impl Into<String>) -> Self {
        Self { boundary: boundary.into(), parts: Vec::new() }
    }

    pub fn text(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.parts.push(Part {
            name: name.into(),
            filename: None,
            content_type: None,
            data: value.into().into_bytes(),
        });
        self
    }

    pub fn file(
        mut self,
        name: impl Into<String>,
        filename: impl Into<String>,
        content_type: impl Into<String>,
        data: Vec<u8>,
    ) -> Self {
        self.parts.push(Part {
            name: name.into(),
            filename: Some(filename.into()),
            content_type: Some(content_type.into()),
            data,
        });
        self
    }

    pub fn parts(&self) -> &[Part] {
        &self.parts
    }

    pub fn part(&self, name: &str) -> Option<&Part> {
        self.parts.iter().find(|p| p.name == name)
    }

    pub fn content_type(&self) -> String {
        format!("multipart/form-data; boundary={}", self.boundary)
    }

    /// Encode the body with CRLF line endings
    pub fn encode(&self) -> Vec<u8> {
        let mut body = Vec::new();
        for part in &self.parts {
            body.extend_from_slice(format!("--{}\r\n", self.boundary).as_bytes());
            let mut disposition = format!("Content-Disposition: form-data; name=\"{}\"", part.name);
            if let Some(filename) = &part.filename {
                disposition.push_str(&format!("; filename=\"{filename}\""));
            }
            body.extend_from_slice(disposition.as_bytes());
            body.extend_from_slice(b"\r\n");
            if let Some(content_type) = &part.content_type {
                body.extend_from_slice(format!("Content-Type: {content_type}\r\n").as_bytes());
            }
            body.extend_from_slice(b"\r\n");
            body.extend_from_slice(&part.data);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{}--\r\n", self.boundary).as_bytes());
        body
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Body {
    Empty,
    Json(String),
    Multipart(MultipartForm),
}

/// A backend call; `path` includes the query string
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub method: Method,
    pub path: String,
    pub user_id: u64,
    pub body: Body,
}

impl Request {
    pub fn get(path: impl Into<String>, user_id: u64) -> Self {
        Self { method: Method::Get, path: path.into(), user_id, body: Body::Empty }
    }

    pub fn post(path: impl Into<String>, user_id: u64, body: Body) -> Self {
        Self { method: Method::Post, path: path.into(), user_id, body }
    }
}

/// Sends a request and returns the response body on 2xx
pub trait Transport {
    fn send(&self, request: &Request) -> Result<String, TransportError>;
}

impl<T: Transport + ?Sized> Transport for &T {
    fn send(&self, request: &Request) -> Result<String, TransportError> {
        (**self).send(request)
    }
}

/// Blocking HTTP transport over `ureq`
#[derive(Debug, Clone)]
pub struct UreqTransport {
    agent: ureq::Agent,
    base_url: String,
    user_agent: String,
}

impl UreqTransport {
    pub fn new(config: &GatewayConfig) -> Self {
        let agent = ureq::AgentBuilder::new().timeout(config.timeout()).build();
        Self {
            agent,
            base_url: config.base_url.trim_end_matches('/').to_owned(),
            user_agent: config.user_agent.clone(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

impl Transport for UreqTransport {
    fn send(&self, request: &Request) -> Result<String, TransportError> {
        let url = format!("{}{}", self.base_url, request.path);
        tracing::debug!(method = %request.method, %url, "sending request");

        let call = self
            .agent
            .request(&request.method.to_string(), &url)
            .set("User-Agent", &self.user_agent)
            .set("Accept", "application/json")
            .set(USER_HEADER, &request.user_id.to_string());

        let result = match &request.body {
            Body::Empty => call.call(),
            Body::Json(json) => call.set("Content-Type", "application/json").send_string(json),
            Body::Multipart(form) => call
                .set("Content-Type", &form.content_type())
                .send_bytes(&form.encode()),
        };

        let response = match result {
            Ok(response) => response,
            Err(ureq::Error::Status(status, response)) => {
                let body = response.into_string().unwrap_or_default();
                return Err(TransportError::Status { status, body });
            }
            Err(err) => return Err(TransportError::Network(err.to_string())),
        };

        response
            .into_string()
            .map_err(|e| TransportError::Body(e.to_string()))
    }
}
