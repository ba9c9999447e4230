//! Purpose: Provide the transport seam between the client and a host.
//! Exports: `Transport`, `TransportRequest`, `Endpoint`, `HttpTransport`,
//!          `LocalTransport`.
//! Role: One primitive — issue a request, get a parsed JSON body back.
//!       `HttpTransport` speaks sync HTTP; `LocalTransport` runs the host
//!       executor in-process against a `MemoryStore`.
//! Invariants: Transport failures surface unmodified; no retries here.
//! Invariants: Both transports honor the per-invocation quota model: each
//!             issued request is one host invocation.
#![allow(clippy::result_large_err)]

use crate::api::auth::{Auth, PROTOCOL_VERSION, VERSION_COOKIE};
use crate::core::error::{Error, ErrorKind};
use crate::core::wire::{
    error_from_body, response_to_value, AccessMethod, WireRequest,
};
use crate::host::store::MemoryStore;
use crate::host::dispatch;
use serde_json::Value;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use url::Url;

const DEFAULT_SCRIPT_ID: &str = "10";
const DEFAULT_DEPLOY_ID: &str = "1";

/// One request as the transport sees it: scalar query pairs for GET-class
/// operations, a JSON body for POST-class ones.
#[derive(Clone, Debug)]
pub struct TransportRequest {
    pub method: AccessMethod,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
    pub timeout: Option<Duration>,
}

/// The single primitive the client depends on. Implementations raise on
/// transport failure and decode error envelopes into [`Error`].
pub trait Transport {
    fn issue(&self, request: &TransportRequest) -> Result<Value, Error>;
}

/// Location of the hosted executor script.
#[derive(Clone, Debug)]
pub struct Endpoint {
    base_url: Url,
    script_id: String,
    deploy_id: String,
}

impl Endpoint {
    pub fn new(base_url: impl Into<String>) -> Result<Self, Error> {
        let base_url = Url::parse(&base_url.into()).map_err(|err| {
            Error::new(ErrorKind::Usage)
                .with_message("invalid endpoint base url")
                .with_source(err)
        })?;
        let scheme = base_url.scheme();
        if scheme != "http" && scheme != "https" {
            return Err(Error::new(ErrorKind::Usage)
                .with_message("endpoint base url must use http or https scheme"));
        }
        Ok(Self {
            base_url,
            script_id: DEFAULT_SCRIPT_ID.to_string(),
            deploy_id: DEFAULT_DEPLOY_ID.to_string(),
        })
    }

    pub fn with_script(mut self, script_id: impl Into<String>) -> Self {
        self.script_id = script_id.into();
        self
    }

    pub fn with_deploy(mut self, deploy_id: impl Into<String>) -> Self {
        self.deploy_id = deploy_id.into();
        self
    }

    fn request_url(&self, query: &[(String, String)]) -> Url {
        let mut url = self.base_url.clone();
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("script", &self.script_id);
            pairs.append_pair("deploy", &self.deploy_id);
            for (key, value) in query {
                pairs.append_pair(key, value);
            }
        }
        url
    }
}

/// Blocking HTTP transport over `ureq`.
pub struct HttpTransport {
    agent: ureq::Agent,
    endpoint: Endpoint,
    auth: Auth,
}

impl HttpTransport {
    pub fn new(endpoint: Endpoint, auth: Auth) -> Self {
        Self {
            agent: ureq::AgentBuilder::new().build(),
            endpoint,
            auth,
        }
    }

    fn prepare(&self, request: &TransportRequest) -> ureq::Request {
        let url = self.endpoint.request_url(&request.query);
        let mut prepared = self
            .agent
            .request(request.method.as_str(), url.as_str())
            .set("Accept", "application/json")
            .set("Cookie", &format!("{VERSION_COOKIE}={PROTOCOL_VERSION}"));
        if let Some(header) = self.auth.header_value() {
            prepared = prepared.set("Authorization", &header);
        }
        if let Some(timeout) = request.timeout {
            prepared = prepared.timeout(timeout);
        }
        prepared
    }
}

impl Transport for HttpTransport {
    fn issue(&self, request: &TransportRequest) -> Result<Value, Error> {
        let prepared = self.prepare(request);
        let response = match (&request.body, request.method) {
            (None, _) | (_, AccessMethod::Get) => prepared.call(),
            (Some(body), AccessMethod::Post) => {
                let payload = serde_json::to_string(body).map_err(|err| {
                    Error::new(ErrorKind::Internal)
                        .with_message("failed to encode request json")
                        .with_source(err)
                })?;
                prepared
                    .set("Content-Type", "application/json")
                    .send_string(&payload)
            }
        };

        match response {
            Ok(resp) => read_json_response(resp),
            Err(ureq::Error::Status(code, resp)) => {
                let body = resp.into_string().unwrap_or_default();
                Err(error_from_body(code, &body))
            }
            Err(ureq::Error::Transport(err)) => Err(Error::new(ErrorKind::Io)
                .with_message("request failed")
                .with_source(err)),
        }
    }
}

fn read_json_response(response: ureq::Response) -> Result<Value, Error> {
    let body = response.into_string().map_err(|err| {
        Error::new(ErrorKind::Io)
            .with_message("failed to read response body")
            .with_source(err)
    })?;
    serde_json::from_str(&body).map_err(|err| {
        Error::new(ErrorKind::Internal)
            .with_message("invalid response json")
            .with_source(err)
    })
}

/// In-process transport: each issued request is one host invocation against
/// a shared `MemoryStore`, with the invocation's quota allowance restored
/// first — exactly the budget model a hosted executor sees.
#[derive(Clone)]
pub struct LocalTransport {
    store: Arc<Mutex<MemoryStore>>,
}

impl LocalTransport {
    pub fn new(store: MemoryStore) -> Self {
        Self {
            store: Arc::new(Mutex::new(store)),
        }
    }

    /// Direct access to the underlying store, for seeding and inspection.
    pub fn store(&self) -> MutexGuard<'_, MemoryStore> {
        self.store.lock().unwrap_or_else(|poison| poison.into_inner())
    }
}

impl Transport for LocalTransport {
    fn issue(&self, request: &TransportRequest) -> Result<Value, Error> {
        let wire = match request.method {
            AccessMethod::Get => WireRequest::from_query_pairs(
                request
                    .query
                    .iter()
                    .map(|(key, value)| (key.as_str(), value.as_str())),
            )?,
            AccessMethod::Post => {
                let body = request.body.clone().ok_or_else(|| {
                    Error::new(ErrorKind::Usage).with_message("POST request has no body")
                })?;
                serde_json::from_value(body).map_err(|err| {
                    Error::new(ErrorKind::Usage)
                        .with_message("invalid request json")
                        .with_source(err)
                })?
            }
        };

        let mut store = self.store();
        store.reset_usage();
        let response = dispatch::dispatch(&mut *store, request.method, &wire)?;
        response_to_value(&response)
    }
}
