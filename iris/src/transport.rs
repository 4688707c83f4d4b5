//! The single place where bytes leave the process.
//!
//! [`Session`](crate::session::Session) is generic over [`Transport`] so that callers (and
//! tests) can substitute the HTTP layer. [`ReqwestTransport`] is the real one: a blocking
//! `reqwest` client that **does not validate TLS certificates**, since clusters serve
//! self-signed ones.

#[cfg(any(test, feature = "testing"))]
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::io::{Read, Write};
use std::str::FromStr;

use serde_json::Value;

use crate::error::{Error, Result};

/// Size of the buffer used when streaming a download to disk.
pub const DOWNLOAD_CHUNK_SIZE: usize = 1_048_576;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
        }
    }
}

impl FromStr for Method {
    type Err = Error;

    fn from_str(s: &str) -> Result<Method> {
        match s.to_ascii_lowercase().as_str() {
            "get" => Ok(Method::Get),
            "post" => Ok(Method::Post),
            "put" => Ok(Method::Put),
            "delete" => Ok(Method::Delete),
            _ => Err(Error::InvalidMethod(s.to_string())),
        }
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub headers: BTreeMap<String, String>,
    pub body: Option<Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

/// No response was obtained at all (resolution, connection, TLS, ...).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportError(pub String);

impl std::fmt::Display for TransportError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug)]
pub enum DownloadError {
    Transport(String),
    Status(u16),
    /// The body stopped arriving (or could not be written) after `written` bytes.
    Interrupted { written: u64, reason: String },
}

pub trait Transport {
    /// Performs exactly one round trip.
    fn send(&self, request: &HttpRequest) -> std::result::Result<HttpResponse, TransportError>;

    /// Streams the response body into `out`, returning the number of bytes written.
    fn download(
        &self,
        request: &HttpRequest,
        out: &mut dyn Write,
    ) -> std::result::Result<u64, DownloadError>;
}

pub struct ReqwestTransport {
    client: reqwest::blocking::Client,
}

impl ReqwestTransport {
    pub fn new() -> Result<ReqwestTransport> {
        let client = reqwest::blocking::Client::builder()
            .danger_accept_invalid_certs(true)
            .build()?;
        Ok(ReqwestTransport { client })
    }

    fn prepare(&self, request: &HttpRequest) -> reqwest::blocking::RequestBuilder {
        let mut builder = match request.method {
            Method::Get => self.client.get(&request.url),
            Method::Post => self.client.post(&request.url),
            Method::Put => self.client.put(&request.url),
            Method::Delete => self.client.delete(&request.url),
        };
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(ref body) = request.body {
            builder = builder.json(body);
        }
        builder
    }
}

impl Transport for ReqwestTransport {
    fn send(&self, request: &HttpRequest) -> std::result::Result<HttpResponse, TransportError> {
        let response = self
            .prepare(request)
            .send()
            .map_err(|e| TransportError(e.to_string()))?;
        let status = response.status().as_u16();
        let body = response
            .bytes()
            .map_err(|e| TransportError(e.to_string()))?;
        Ok(HttpResponse {
            status,
            body: body.to_vec(),
        })
    }

    fn download(
        &self,
        request: &HttpRequest,
        out: &mut dyn Write,
    ) -> std::result::Result<u64, DownloadError> {
        let mut response = self
            .prepare(request)
            .send()
            .map_err(|e| DownloadError::Transport(e.to_string()))?;
        let status = response.status().as_u16();
        if status >= 400 {
            return Err(DownloadError::Status(status));
        }

        let mut buffer = vec![0u8; DOWNLOAD_CHUNK_SIZE];
        let mut written = 0u64;
        loop {
            let read = match response.read(&mut buffer) {
                Ok(0) => break,
                Ok(n) => n,
                Err(ref e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    return Err(DownloadError::Interrupted {
                        written,
                        reason: e.to_string(),
                    })
                }
            };
            out.write_all(&buffer[..read])
                .map_err(|e| DownloadError::Interrupted {
                    written,
                    reason: e.to_string(),
                })?;
            written += read as u64;
        }
        Ok(written)
    }
}

#[cfg(any(test, feature = "testing"))]
#[derive(Debug, Clone)]
enum Reply {
    Response(HttpResponse),
    Unreachable(String),
    Interrupted { partial: Vec<u8>, reason: String },
}

#[cfg(any(test, feature = "testing"))]
#[derive(Debug, Clone)]
struct Route {
    method: Method,
    fragment: String,
    reply: Reply,
}

/// In-memory [`Transport`] answering from canned routes.
///
/// A route matches when the method is equal and the URL contains its fragment; the first
/// registered match wins. Unmatched requests get an empty `404`. Every request is recorded.
///
/// Only built for tests, or with the `testing` feature.
#[cfg(any(test, feature = "testing"))]
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    routes: Vec<Route>,
    log: RefCell<Vec<HttpRequest>>,
}

#[cfg(any(test, feature = "testing"))]
impl ScriptedTransport {
    pub fn new() -> ScriptedTransport {
        ScriptedTransport::default()
    }

    pub fn on(mut self, method: Method, fragment: &str, status: u16, body: &str) -> ScriptedTransport {
        self.routes.push(Route {
            method,
            fragment: fragment.to_string(),
            reply: Reply::Response(HttpResponse {
                status,
                body: body.as_bytes().to_vec(),
            }),
        });
        self
    }

    pub fn on_json(self, method: Method, fragment: &str, status: u16, body: &Value) -> ScriptedTransport {
        let text = body.to_string();
        self.on(method, fragment, status, &text)
    }

    pub fn unreachable(mut self, method: Method, fragment: &str, reason: &str) -> ScriptedTransport {
        self.routes.push(Route {
            method,
            fragment: fragment.to_string(),
            reply: Reply::Unreachable(reason.to_string()),
        });
        self
    }

    /// Downloads matching this route deliver `partial` and then fail.
    pub fn interrupted(mut self, method: Method, fragment: &str, partial: &[u8], reason: &str) -> ScriptedTransport {
        self.routes.push(Route {
            method,
            fragment: fragment.to_string(),
            reply: Reply::Interrupted {
                partial: partial.to_vec(),
                reason: reason.to_string(),
            },
        });
        self
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.log.borrow().clone()
    }

    pub fn urls(&self) -> Vec<String> {
        self.log.borrow().iter().map(|r| r.url.clone()).collect()
    }

    fn reply_for(&self, request: &HttpRequest) -> Reply {
        self.log.borrow_mut().push(request.clone());
        self.routes
            .iter()
            .find(|r| r.method == request.method && request.url.contains(&r.fragment))
            .map(|r| r.reply.clone())
            .unwrap_or(Reply::Response(HttpResponse {
                status: 404,
                body: Vec::new(),
            }))
    }
}

#[cfg(any(test, feature = "testing"))]
impl Transport for ScriptedTransport {
    fn send(&self, request: &HttpRequest) -> std::result::Result<HttpResponse, TransportError> {
        match self.reply_for(request) {
            Reply::Response(response) => Ok(response),
            Reply::Unreachable(reason) => Err(TransportError(reason)),
            Reply::Interrupted { reason, .. } => Err(TransportError(reason)),
        }
    }

    fn download(
        &self,
        request: &HttpRequest,
        out: &mut dyn Write,
    ) -> std::result::Result<u64, DownloadError> {
        let (body, failure) = match self.reply_for(request) {
            Reply::Response(response) if response.status >= 400 => {
                return Err(DownloadError::Status(response.status))
            }
            Reply::Response(response) => (response.body, None),
            Reply::Unreachable(reason) => return Err(DownloadError::Transport(reason)),
            Reply::Interrupted { partial, reason } => (partial, Some(reason)),
        };
        let mut written = 0u64;
        for chunk in body.chunks(DOWNLOAD_CHUNK_SIZE) {
            out.write_all(chunk)
                .map_err(|e| DownloadError::Interrupted {
                    written,
                    reason: e.to_string(),
                })?;
            written += chunk.len() as u64;
        }
        match failure {
            Some(reason) => Err(DownloadError::Interrupted { written, reason }),
            None => Ok(written),
        }
    }
}
