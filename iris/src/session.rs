//! Connection state for a cluster or the helios broker.
//!
//! A [`Session`] is an ordinary value owned by its caller. Several may exist side by side; a
//! single one must not be shared between threads without external serialization.

use std::collections::BTreeMap;

use log::{debug, error, info, warn};
use serde_derive::Deserialize;
use serde_json::{json, Value};

use crate::credentials::{CredentialStore, Prompter};
use crate::error::Result;
use crate::transport::{HttpRequest, Method, ReqwestTransport, Transport};

pub const BROKER_HOST: &str = "helios.cohesity.com";
pub const BROKER_STATUS_URL: &str = "https://helios.cohesity.com/mcm/clusters/connectionStatus";
pub const API_ROOT_PATH: &str = "/irisservices/api/v1";
pub const ACCESS_TOKEN_PATH: &str = "/public/accessTokens";
pub const ACCESS_CLUSTER_HEADER: &str = "accessClusterId";
pub const API_KEY_HEADER: &str = "apiKey";
pub const AUTHORIZATION_HEADER: &str = "authorization";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Direct,
    Brokered,
}

/// A cluster as reported by the broker when the session was established.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterRef {
    pub id: String,
    pub name: String,
    pub software_version: String,
    pub connected: bool,
}

#[derive(Debug, Deserialize)]
struct ClusterStatus {
    name: String,
    #[serde(rename = "clusterId")]
    cluster_id: Value,
    #[serde(rename = "softwareVersion", default)]
    software_version: Option<String>,
    #[serde(rename = "connectedToCluster", default)]
    connected_to_cluster: bool,
}

impl From<ClusterStatus> for ClusterRef {
    fn from(status: ClusterStatus) -> ClusterRef {
        let id = match status.cluster_id {
            Value::String(s) => s,
            other => other.to_string(),
        };
        ClusterRef {
            id,
            name: status.name,
            software_version: status.software_version.unwrap_or_default(),
            connected: status.connected_to_cluster,
        }
    }
}

#[derive(Debug, Deserialize)]
struct AccessToken {
    #[serde(rename = "accessToken")]
    access_token: String,
    #[serde(rename = "tokenType")]
    token_type: String,
}

#[derive(Debug, Clone)]
pub struct AuthOptions {
    pub host: String,
    pub username: String,
    pub domain: String,
    pub password: Option<String>,
    /// Discard any stored secret and ask again.
    pub update_password: bool,
    /// Ask for the secret without storing it.
    pub prompt: bool,
    pub brokered: bool,
    /// Suppress the informational messages.
    pub quiet: bool,
}

impl Default for AuthOptions {
    fn default() -> AuthOptions {
        AuthOptions {
            host: BROKER_HOST.to_string(),
            username: "helios".to_string(),
            domain: "local".to_string(),
            password: None,
            update_password: false,
            prompt: false,
            brokered: false,
            quiet: false,
        }
    }
}

impl AuthOptions {
    pub fn direct(host: &str, username: &str, domain: &str) -> AuthOptions {
        AuthOptions {
            host: host.to_string(),
            username: username.to_string(),
            domain: domain.to_string(),
            ..AuthOptions::default()
        }
    }

    pub fn brokered(username: &str) -> AuthOptions {
        AuthOptions {
            username: username.to_string(),
            brokered: true,
            ..AuthOptions::default()
        }
    }

    pub fn with_password(mut self, password: &str) -> AuthOptions {
        self.password = Some(password.to_string());
        self
    }

    pub fn is_brokered(&self) -> bool {
        self.brokered || self.host == BROKER_HOST
    }
}

/// How an [`Session::authenticate`] call ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthOutcome {
    Connected,
    /// The server answered but refused, or the secret could not be obtained.
    Rejected(String),
    /// No answer at all.
    Unreachable(String),
}

impl AuthOutcome {
    pub fn is_connected(&self) -> bool {
        matches!(self, AuthOutcome::Connected)
    }
}

#[derive(Debug, Clone)]
struct State {
    base_url: String,
    headers: BTreeMap<String, String>,
    authenticated: bool,
    mode: Mode,
    clusters: Vec<ClusterRef>,
}

impl State {
    fn unauthenticated() -> State {
        State {
            base_url: String::new(),
            headers: json_headers(),
            authenticated: false,
            mode: Mode::Direct,
            clusters: Vec::new(),
        }
    }
}

fn json_headers() -> BTreeMap<String, String> {
    let mut headers = BTreeMap::new();
    headers.insert("accept".to_string(), "application/json".to_string());
    headers.insert("content-type".to_string(), "application/json".to_string());
    headers
}

pub fn api_root(host: &str) -> String {
    format!("https://{host}{API_ROOT_PATH}")
}

pub struct Session<T: Transport = ReqwestTransport> {
    state: State,
    transport: T,
    pub(crate) quiet: bool,
}

impl Session<ReqwestTransport> {
    pub fn new() -> Result<Session<ReqwestTransport>> {
        Ok(Session::with_transport(ReqwestTransport::new()?))
    }
}

impl<T: Transport> Session<T> {
    pub fn with_transport(transport: T) -> Session<T> {
        Session {
            state: State::unauthenticated(),
            transport,
            quiet: false,
        }
    }

    /// Establishes a new connection, replacing whatever state the session held before.
    ///
    /// Failures are logged and returned as an [`AuthOutcome`]; the session is then left
    /// unauthenticated.
    pub fn authenticate<P: Prompter>(
        &mut self,
        opts: &AuthOptions,
        store: &CredentialStore<P>,
    ) -> AuthOutcome {
        self.quiet = opts.quiet;
        let brokered = opts.is_brokered();
        let host = if brokered { BROKER_HOST } else { opts.host.as_str() };

        let mut next = State {
            base_url: api_root(host),
            headers: json_headers(),
            authenticated: false,
            mode: if brokered { Mode::Brokered } else { Mode::Direct },
            clusters: Vec::new(),
        };

        let secret = match store.get(
            host,
            &opts.username,
            &opts.domain,
            opts.password.as_deref(),
            opts.update_password,
            opts.prompt,
        ) {
            Ok(secret) => secret,
            Err(err) => {
                error!("{}", err);
                self.state = next;
                return AuthOutcome::Rejected(err.to_string());
            }
        };

        let outcome = if brokered {
            self.connect_broker(&mut next, &secret)
        } else {
            self.connect_direct(&mut next, opts, &secret)
        };
        next.authenticated = outcome.is_connected();
        if next.authenticated && !self.quiet {
            info!("Connected!");
        }
        self.state = next;
        outcome
    }

    fn connect_broker(&self, next: &mut State, api_key: &str) -> AuthOutcome {
        next.headers
            .insert(API_KEY_HEADER.to_string(), api_key.to_string());
        let request = HttpRequest {
            method: Method::Get,
            url: BROKER_STATUS_URL.to_string(),
            headers: next.headers.clone(),
            body: None,
        };
        debug!("GET {}", request.url);
        let response = match self.transport.send(&request) {
            Ok(response) => response,
            Err(err) => {
                self.report(&err.0);
                return AuthOutcome::Unreachable(err.0);
            }
        };
        match serde_json::from_slice::<Vec<ClusterStatus>>(&response.body) {
            Ok(clusters) => {
                next.clusters = clusters
                    .into_iter()
                    .map(ClusterRef::from)
                    .filter(|c| c.connected)
                    .collect();
                debug!("{} clusters connected to helios", next.clusters.len());
                AuthOutcome::Connected
            }
            Err(_) => {
                let message = server_message(&response.body)
                    .unwrap_or_else(|| format!("helios answered with status {}", response.status));
                self.report(&message);
                AuthOutcome::Rejected(message)
            }
        }
    }

    fn connect_direct(&self, next: &mut State, opts: &AuthOptions, password: &str) -> AuthOutcome {
        let request = HttpRequest {
            method: Method::Post,
            url: format!("{}{}", next.base_url, ACCESS_TOKEN_PATH),
            headers: next.headers.clone(),
            body: Some(json!({
                "domain": opts.domain,
                "password": password,
                "username": opts.username,
            })),
        };
        debug!("POST {}", request.url);
        let response = match self.transport.send(&request) {
            Ok(response) => response,
            Err(err) => {
                self.report(&err.0);
                return AuthOutcome::Unreachable(err.0);
            }
        };

        if response.status != 201 {
            let message = server_message(&response.body)
                .unwrap_or_else(|| format!("authentication failed with status {}", response.status));
            // always shown, even when quiet
            error!("{}", message);
            return AuthOutcome::Rejected(message);
        }

        match serde_json::from_slice::<AccessToken>(&response.body) {
            Ok(token) => {
                next.headers.insert(
                    AUTHORIZATION_HEADER.to_string(),
                    format!("{} {}", token.token_type, token.access_token),
                );
                AuthOutcome::Connected
            }
            Err(err) => {
                let message = format!("malformed access token response: {err}");
                self.report(&message);
                AuthOutcome::Rejected(message)
            }
        }
    }

    pub fn is_connected(&self) -> bool {
        self.state.authenticated
    }

    /// Marks the session as disconnected. Headers are kept.
    pub fn disconnect(&mut self) {
        self.state.authenticated = false;
    }

    pub fn mode(&self) -> Mode {
        self.state.mode
    }

    pub fn base_url(&self) -> &str {
        &self.state.base_url
    }

    pub fn headers(&self) -> &BTreeMap<String, String> {
        &self.state.headers
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn set_quiet(&mut self, quiet: bool) {
        self.quiet = quiet;
    }

    /// Clusters connected to the broker, ordered by name ignoring case.
    pub fn connected_clusters(&self) -> Vec<&ClusterRef> {
        let mut clusters: Vec<&ClusterRef> = self.state.clusters.iter().collect();
        clusters.sort_by_key(|c| c.name.to_lowercase());
        clusters
    }

    /// Routes subsequent requests through the broker to the named cluster.
    ///
    /// Returns `false`, leaving the routing untouched, when no connected cluster matches.
    pub fn select_cluster(&mut self, name: &str) -> bool {
        let wanted = name.to_lowercase();
        let id = self
            .state
            .clusters
            .iter()
            .find(|c| c.name.to_lowercase() == wanted)
            .map(|c| c.id.clone());
        match id {
            Some(id) => {
                debug!("routing requests to cluster {} ({})", name, id);
                self.state
                    .headers
                    .insert(ACCESS_CLUSTER_HEADER.to_string(), id);
                true
            }
            None => {
                warn!("Cluster {} not connected to Helios", name);
                false
            }
        }
    }

    pub fn select_cluster_ref(&mut self, cluster: &ClusterRef) -> bool {
        self.select_cluster(&cluster.name)
    }

    pub(crate) fn report(&self, message: &str) {
        if !self.quiet {
            error!("{}", message);
        } else {
            debug!("{}", message);
        }
    }
}

/// `message` field of a JSON error payload, if there is one.
pub(crate) fn server_message(body: &[u8]) -> Option<String> {
    serde_json::from_slice::<Value>(body)
        .ok()
        .and_then(|v| v.get("message").and_then(Value::as_str).map(str::to_string))
}
