/*
 * Copyright 2025 Oxide Computer Company
 */

//! Client for the REST interface of a virtual lab controller.  Wraps a
//! pooled HTTP client with bounded automatic retries, a default request
//! timeout, and bearer token authentication, and exposes a typed surface
//! for the lab and node operations the tools need.  The controller models
//! simulated network topologies ("labs") containing simulated devices
//! ("nodes"); the interesting operations drive a node through a stop/start
//! cycle, polling the reported state until it converges.

use std::time::Duration;

use reqwest::header::{
    HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE, RETRY_AFTER,
};
use slog::{debug, info, o, warn, Discard, Logger};

pub mod config;
mod error;
mod retry;
mod types;

pub use error::ClientError;
pub use retry::RetryPolicy;
pub use types::{LabDetail, LabMatch, NodeDetail, NodeState};

use types::{AuthRequest, NodeEnvelope, StateEnvelope};

/** Default per-request timeout; override with [`ClientBuilder::timeout`]. */
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/** Cap on authentication attempts before we give up on the controller. */
pub const AUTH_ATTEMPTS: u32 = 5;

pub struct ClientBuilder {
    url: String,
    token: Option<String>,
    accept_invalid_certs: bool,
    timeout: Duration,
    retry: RetryPolicy,
    log: Option<Logger>,
}

impl ClientBuilder {
    pub fn new(url: &str) -> ClientBuilder {
        ClientBuilder {
            url: url.trim_end_matches('/').to_string(),
            token: None,
            accept_invalid_certs: false,
            timeout: DEFAULT_TIMEOUT,
            retry: RetryPolicy::default(),
            log: None,
        }
    }

    pub fn bearer_token<S: AsRef<str>>(&mut self, token: S) -> &mut Self {
        self.token = Some(token.as_ref().to_string());
        self
    }

    /**
     * Accept a self-signed certificate from the controller.  Lab racks
     * almost never carry a real certificate, but callers must opt in to
     * the relaxation explicitly.
     */
    pub fn accept_invalid_certs(&mut self, accept: bool) -> &mut Self {
        self.accept_invalid_certs = accept;
        self
    }

    pub fn timeout(&mut self, timeout: Duration) -> &mut Self {
        self.timeout = timeout;
        self
    }

    pub fn retry_policy(&mut self, retry: RetryPolicy) -> &mut Self {
        self.retry = retry;
        self
    }

    pub fn logger(&mut self, log: Logger) -> &mut Self {
        self.log = Some(log);
        self
    }

    /**
     * Construct the client.  No network I/O occurs here; the first request
     * establishes connections.
     */
    pub fn build(&mut self) -> Result<Client, ClientError> {
        let mut dh = HeaderMap::new();
        dh.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        dh.insert(ACCEPT, HeaderValue::from_static("application/json"));

        if let Some(token) = self.token.as_deref() {
            let hv = HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|e| ClientError::Build(e.to_string()))?;
            dh.insert(AUTHORIZATION, hv);
        }

        let client = reqwest::ClientBuilder::new()
            .timeout(self.timeout)
            .connect_timeout(self.timeout)
            .redirect(reqwest::redirect::Policy::limited(
                self.retry.max_redirects,
            ))
            .danger_accept_invalid_certs(self.accept_invalid_certs)
            .default_headers(dh)
            .build()
            .map_err(|e| ClientError::Build(e.to_string()))?;

        let log =
            self.log.take().unwrap_or_else(|| Logger::root(Discard, o!()));

        Ok(Client {
            baseurl: self.url.clone(),
            client,
            retry: self.retry.clone(),
            log,
        })
    }
}

/**
 * Bounds for a state convergence poll: how often to ask the controller,
 * and how many asks before giving up.  The controller offers no push
 * notification for state changes, so polling is the only mechanism.
 */
#[derive(Debug, Clone)]
pub struct PollPolicy {
    pub interval: Duration,
    pub max_polls: u32,
}

impl Default for PollPolicy {
    fn default() -> Self {
        /*
         * Five minutes of patience at the usual controller cadence.
         */
        PollPolicy { interval: Duration::from_secs(5), max_polls: 60 }
    }
}

pub struct Client {
    baseurl: String,
    client: reqwest::Client,
    retry: RetryPolicy,
    log: Logger,
}

impl Client {
    fn url(&self, path: &str) -> String {
        format!("{}{}", self.baseurl, path)
    }

    /**
     * Send a request, retrying transient failures within the policy
     * budget.  Error statuses become [`ClientError::Status`] so that
     * callers never inspect a status code by hand.
     */
    async fn execute(
        &self,
        rb: reqwest::RequestBuilder,
        url: &str,
    ) -> Result<reqwest::Response, ClientError> {
        let mut retries = 0u32;

        loop {
            let attempt = match rb.try_clone() {
                Some(rb) => rb,
                None => {
                    return Err(ClientError::Build(
                        "request body cannot be replayed".to_string(),
                    ));
                }
            };

            let res = match attempt.send().await {
                Ok(res) => res,
                Err(e) => {
                    let e = ClientError::from_reqwest(url, e);
                    if !e.is_transient() {
                        return Err(e);
                    }
                    if retries >= self.retry.max_retries {
                        return Err(ClientError::RetriesExhausted {
                            url: url.to_string(),
                            attempts: retries + 1,
                            last: e.to_string(),
                        });
                    }

                    retries += 1;
                    let delay = self.retry.backoff(retries);
                    warn!(self.log, "transient failure, will retry";
                        "url" => url.to_string(),
                        "retry" => retries,
                        "delay_ms" => delay.as_millis() as u64,
                        "error" => e.to_string());
                    tokio::time::sleep(delay).await;
                    continue;
                }
            };

            let status = res.status();
            if !status.is_client_error() && !status.is_server_error() {
                return Ok(res);
            }

            if self.retry.retryable(status) {
                if retries >= self.retry.max_retries {
                    return Err(ClientError::RetriesExhausted {
                        url: url.to_string(),
                        attempts: retries + 1,
                        last: format!("status {}", status),
                    });
                }

                retries += 1;
                let delay = self
                    .retry_after(&res)
                    .unwrap_or_else(|| self.retry.backoff(retries));
                warn!(self.log, "retryable status, will retry";
                    "url" => url.to_string(),
                    "status" => status.as_u16(),
                    "retry" => retries,
                    "delay_ms" => delay.as_millis() as u64);
                tokio::time::sleep(delay).await;
                continue;
            }

            return Err(ClientError::Status { status, url: url.to_string() });
        }
    }

    fn retry_after(&self, res: &reqwest::Response) -> Option<Duration> {
        if !self.retry.respect_retry_after {
            return None;
        }

        res.headers()
            .get(RETRY_AFTER)?
            .to_str()
            .ok()
            .and_then(retry::parse_retry_after)
    }

    async fn get_json<T>(&self, path: &str) -> Result<T, ClientError>
    where
        T: serde::de::DeserializeOwned,
    {
        let url = self.url(path);
        let res = self.execute(self.client.get(&url), &url).await?;
        res.json().await.map_err(|e| ClientError::from_reqwest(&url, e))
    }

    async fn put(&self, path: &str) -> Result<(), ClientError> {
        let url = self.url(path);
        self.execute(self.client.put(&url), &url).await?;
        Ok(())
    }

    /** List the IDs of every lab on the controller. */
    pub async fn labs(&self) -> Result<Vec<String>, ClientError> {
        info!(self.log, "retrieving available labs");
        self.get_json("/api/v0/labs").await
    }

    /** Fetch one lab's metadata, including its human-readable title. */
    pub async fn lab_get(
        &self,
        lab_id: &str,
    ) -> Result<LabDetail, ClientError> {
        debug!(self.log, "retrieving lab details"; "lab" => lab_id.to_string());
        self.get_json(&format!("/api/v0/labs/{}", lab_id)).await
    }

    /** List the IDs of every node in a lab. */
    pub async fn lab_nodes(
        &self,
        lab_id: &str,
    ) -> Result<Vec<String>, ClientError> {
        debug!(self.log, "retrieving lab nodes"; "lab" => lab_id.to_string());
        self.get_json(&format!("/api/v0/labs/{}/nodes", lab_id)).await
    }

    /** Fetch one node's metadata, including its human-readable label. */
    pub async fn node_get(
        &self,
        lab_id: &str,
        node_id: &str,
    ) -> Result<NodeDetail, ClientError> {
        let e: NodeEnvelope = self
            .get_json(&format!("/api/v0/labs/{}/nodes/{}", lab_id, node_id))
            .await?;
        Ok(e.data)
    }

    pub async fn node_state(
        &self,
        lab_id: &str,
        node_id: &str,
    ) -> Result<NodeState, ClientError> {
        let e: StateEnvelope = self
            .get_json(&format!(
                "/api/v0/labs/{}/nodes/{}/state",
                lab_id, node_id
            ))
            .await?;
        Ok(e.state)
    }

    pub async fn node_stop(
        &self,
        lab_id: &str,
        node_id: &str,
    ) -> Result<(), ClientError> {
        self.put(&format!(
            "/api/v0/labs/{}/nodes/{}/state/stop",
            lab_id, node_id
        ))
        .await
    }

    pub async fn node_start(
        &self,
        lab_id: &str,
        node_id: &str,
    ) -> Result<(), ClientError> {
        self.put(&format!(
            "/api/v0/labs/{}/nodes/{}/state/start",
            lab_id, node_id
        ))
        .await
    }

    /** Ask the controller to start every node in a lab. */
    pub async fn lab_start(&self, lab_id: &str) -> Result<(), ClientError> {
        info!(self.log, "starting lab"; "lab" => lab_id.to_string());
        self.put(&format!("/api/v0/labs/{}/start", lab_id)).await
    }

    /**
     * Locate the first lab whose title contains the given substring,
     * case-insensitively.  An empty lab list and a list with no match are
     * distinct outcomes; a failed list call is an error.
     */
    pub async fn find_lab_by_title(
        &self,
        needle: &str,
    ) -> Result<LabMatch, ClientError> {
        let labs = self.labs().await?;
        if labs.is_empty() {
            return Ok(LabMatch::NoLabs);
        }

        let needle = needle.to_lowercase();
        for lab_id in labs {
            let detail = self.lab_get(&lab_id).await?;
            if detail.lab_title.to_lowercase().contains(&needle) {
                info!(self.log, "located lab";
                    "lab" => detail.id.to_string(),
                    "title" => detail.lab_title.to_string());
                return Ok(LabMatch::Found(detail));
            }
        }

        Ok(LabMatch::NoMatch)
    }

    /**
     * Locate the node in a lab whose label equals the given name,
     * case-insensitively.
     */
    pub async fn find_node_by_label(
        &self,
        lab_id: &str,
        label: &str,
    ) -> Result<Option<NodeDetail>, ClientError> {
        for node_id in self.lab_nodes(lab_id).await? {
            let detail = self.node_get(lab_id, &node_id).await?;
            if detail.label.eq_ignore_ascii_case(label) {
                return Ok(Some(detail));
            }
        }

        Ok(None)
    }

    /**
     * Poll a node's state until it reaches the requested value.  Unlike
     * the request-level retry budget, a transitional state here is not an
     * error; it is the expected shape of a slow lifecycle operation.  The
     * poll count is bounded so that a node stuck mid-transition cannot
     * wedge the caller forever.
     */
    pub async fn wait_for_node_state(
        &self,
        lab_id: &str,
        node_id: &str,
        want: NodeState,
        poll: &PollPolicy,
    ) -> Result<(), ClientError> {
        for n in 1..=poll.max_polls {
            let state = self.node_state(lab_id, node_id).await?;
            if state == want {
                debug!(self.log, "node state converged";
                    "node" => node_id.to_string(),
                    "state" => state.to_string(),
                    "polls" => n);
                return Ok(());
            }

            debug!(self.log, "node state not yet converged";
                "node" => node_id.to_string(),
                "state" => state.to_string(),
                "want" => want.to_string());
            tokio::time::sleep(poll.interval).await;
        }

        Err(ClientError::StateTimeout { want, polls: poll.max_polls })
    }

    /**
     * Drive a node through a full stop/start cycle, waiting for each
     * transition to be observed before moving on.  Returns false when the
     * controller rejects either lifecycle request; transport failures and
     * convergence timeouts are errors.
     */
    pub async fn restart_node(
        &self,
        lab_id: &str,
        node_id: &str,
        poll: &PollPolicy,
    ) -> Result<bool, ClientError> {
        info!(self.log, "stopping node"; "node" => node_id.to_string());
        match self.node_stop(lab_id, node_id).await {
            Ok(()) => (),
            Err(ClientError::Status { status, url }) => {
                warn!(self.log, "stop request rejected";
                    "status" => status.as_u16(), "url" => url);
                return Ok(false);
            }
            Err(e) => return Err(e),
        }

        self.wait_for_node_state(lab_id, node_id, NodeState::Stopped, poll)
            .await?;

        info!(self.log, "starting node"; "node" => node_id.to_string());
        match self.node_start(lab_id, node_id).await {
            Ok(()) => (),
            Err(ClientError::Status { status, url }) => {
                warn!(self.log, "start request rejected";
                    "status" => status.as_u16(), "url" => url);
                return Ok(false);
            }
            Err(e) => return Err(e),
        }

        self.wait_for_node_state(lab_id, node_id, NodeState::Started, poll)
            .await?;

        info!(self.log, "node restarted"; "node" => node_id.to_string());
        Ok(true)
    }

    /**
     * Release pooled connections.  Taking the client by value makes a
     * second close a compile-time error rather than a runtime surprise.
     */
    pub fn close(self) {
        drop(self);
    }
}

/**
 * Obtain a bearer token from the controller, with a bounded number of
 * attempts.  Controllers in lab racks are frequently still booting when a
 * script first reaches for them, so transient failures here are expected.
 * A response carrying anything other than a non-empty token string also
 * counts as a failed attempt; in particular an error object in the body
 * must never be mistaken for a token.
 */
pub async fn authenticate(
    log: &Logger,
    profile: &config::Profile,
    max_attempts: u32,
) -> Result<String, ClientError> {
    let client = reqwest::ClientBuilder::new()
        .timeout(DEFAULT_TIMEOUT)
        .connect_timeout(DEFAULT_TIMEOUT)
        .danger_accept_invalid_certs(!profile.tls_verify)
        .build()
        .map_err(|e| ClientError::Build(e.to_string()))?;

    let url =
        format!("{}/api/v0/authenticate", profile.url.trim_end_matches('/'));
    let body = AuthRequest {
        username: &profile.username,
        password: &profile.password,
    };

    for attempt in 1..=max_attempts {
        info!(log, "authenticating to controller";
            "url" => url.to_string(), "attempt" => attempt);

        let token: Result<String, String> = async {
            let res = client
                .post(&url)
                .json(&body)
                .send()
                .await
                .map_err(|e| e.to_string())?;

            let status = res.status();
            if status.is_client_error() || status.is_server_error() {
                return Err(format!("status {}", status));
            }

            res.json::<String>().await.map_err(|e| e.to_string())
        }
        .await;

        match token {
            Ok(token) if !token.is_empty() => {
                info!(log, "authentication succeeded"; "attempt" => attempt);
                return Ok(token);
            }
            Ok(_) => {
                warn!(log, "controller returned an empty token";
                    "attempt" => attempt);
            }
            Err(e) => {
                warn!(log, "authentication attempt failed";
                    "attempt" => attempt, "error" => e);
            }
        }
    }

    Err(ClientError::AuthExhausted { attempts: max_attempts })
}
