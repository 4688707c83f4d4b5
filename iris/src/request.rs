//! Generic API calls against an authenticated [`Session`].
//!
//! Nothing here returns `Err` for conditions a caller is expected to run into (unreachable
//! host, unknown endpoint, server-side error payload). Those are logged and folded into
//! [`ApiResponse`], which callers match on.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

use log::debug;
use serde_json::Value;

use crate::error::{Error, Result};
use crate::session::Session;
use crate::transport::{DownloadError, HttpRequest, Method, Transport};

pub const DEFAULT_NAMESPACE: &str = "/public/";

#[derive(Debug, Clone, PartialEq)]
pub enum ApiResponse {
    /// The call succeeded without a usable body (204, non-JSON, boolean).
    Empty,
    /// The call failed; the message has already been reported.
    Error(String),
    /// Parsed JSON body, untouched.
    Value(Value),
}

impl ApiResponse {
    pub fn is_empty(&self) -> bool {
        matches!(self, ApiResponse::Empty)
    }

    pub fn is_error(&self) -> bool {
        matches!(self, ApiResponse::Error(_))
    }

    pub fn value(&self) -> Option<&Value> {
        match self {
            ApiResponse::Value(v) => Some(v),
            _ => None,
        }
    }

    pub fn into_value(self) -> Option<Value> {
        match self {
            ApiResponse::Value(v) => Some(v),
            _ => None,
        }
    }

    /// Field `key` of an object body. `None` for anything else, including errors.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.value().and_then(|v| v.get(key))
    }
}

/// Prefixes paths that are not rooted with the public API namespace.
pub fn normalize_path(path: &str) -> String {
    if path.starts_with('/') {
        path.to_string()
    } else {
        format!("{DEFAULT_NAMESPACE}{path}")
    }
}

/// Classifies a raw response. `path` only feeds the diagnostic.
fn interpret(status: u16, body: &[u8], path: &str) -> std::result::Result<ApiResponse, String> {
    if status == 204 {
        return Ok(ApiResponse::Empty);
    }
    if status == 404 {
        return Err(format!("Invalid api call: {path}"));
    }
    let json: Value = match serde_json::from_slice(body) {
        Ok(json) => json,
        Err(_) => return Ok(ApiResponse::Empty),
    };
    if json.is_boolean() {
        return Ok(ApiResponse::Empty);
    }
    if let Some(code) = json.get("errorCode") {
        let message = match json.get("message").and_then(Value::as_str) {
            Some(message) => {
                let code = code.as_str().map(str::to_string).unwrap_or_else(|| code.to_string());
                // error codes are tagged with a leading 'k'
                let code: String = code.chars().skip(1).collect();
                format!("{code}: {message}")
            }
            None => json.to_string(),
        };
        return Err(message);
    }
    Ok(ApiResponse::Value(json))
}

impl<T: Transport> Session<T> {
    /// One round trip, no retries.
    pub fn request(&self, method: Method, path: &str, body: Option<&Value>) -> ApiResponse {
        if !self.is_connected() {
            self.report("Not Connected");
            return ApiResponse::Error(Error::NotConnected.to_string());
        }
        let path = normalize_path(path);
        let request = HttpRequest {
            method,
            url: format!("{}{}", self.base_url(), path),
            headers: self.headers().clone(),
            body: body.cloned(),
        };
        debug!("{} {}", method, request.url);

        let response = match self.transport().send(&request) {
            Ok(response) => response,
            Err(err) => {
                self.report(&err.0);
                return ApiResponse::Error(err.0);
            }
        };
        match interpret(response.status, &response.body, &path) {
            Ok(result) => result,
            Err(message) => {
                self.report(&message);
                ApiResponse::Error(message)
            }
        }
    }

    /// [`Session::request`] with the method given by name, as typed by a user.
    pub fn request_named(&self, method: &str, path: &str, body: Option<&Value>) -> Result<ApiResponse> {
        Ok(self.request(method.parse()?, path, body))
    }

    pub fn get(&self, path: &str) -> ApiResponse {
        self.request(Method::Get, path, None)
    }

    /// Streams `path` into `destination`, returning the number of bytes written.
    ///
    /// An interrupted body leaves the partial file in place and yields
    /// [`Error::IncompleteTransfer`]. When no body arrives at all the file is removed again.
    pub fn download_file<P: AsRef<Path>>(&self, path: &str, destination: P) -> Result<u64> {
        if !self.is_connected() {
            return Err(Error::NotConnected);
        }
        let destination = destination.as_ref();
        let request = HttpRequest {
            method: Method::Get,
            url: format!("{}{}", self.base_url(), normalize_path(path)),
            headers: self.headers().clone(),
            body: None,
        };
        debug!("downloading {} to {}", request.url, destination.display());

        let mut out = BufWriter::new(File::create(destination)?);
        let result = self.transport().download(&request, &mut out);
        let flushed = out.flush();
        drop(out);
        let discard = |err: Error| -> Result<u64> {
            // nothing was received, so no file is left behind
            if let Err(remove) = fs::remove_file(destination) {
                debug!("could not remove {}: {}", destination.display(), remove);
            }
            Err(err)
        };
        match result {
            Ok(written) => {
                flushed?;
                Ok(written)
            }
            Err(DownloadError::Transport(reason)) => discard(Error::Transport(reason)),
            Err(DownloadError::Status(status)) => discard(Error::HttpStatus(status)),
            Err(DownloadError::Interrupted { written, reason }) => {
                debug!("download interrupted: {}", reason);
                Err(Error::IncompleteTransfer {
                    path: destination.to_path_buf(),
                    written,
                })
            }
        }
    }
}
