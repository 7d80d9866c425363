/*
 * Copyright 2025 Oxide Computer Company
 */

use reqwest::StatusCode;
use thiserror::Error;

use crate::types::NodeState;

/**
 * Failure categories for requests made against the lab controller.  Every
 * operation on [`crate::Client`] reports one of these; nothing is swallowed
 * and converted to a sentinel value at this layer.
 */
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("failed to construct client: {0}")]
    Build(String),

    /**
     * The controller answered with a client or server error status that is
     * not eligible for retry.
     */
    #[error("request to {url} returned status {status}")]
    Status { status: StatusCode, url: String },

    #[error("connection to {url} failed")]
    Connect {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("request to {url} timed out")]
    Timeout {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("request to {url} failed")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("request to {url} failed after {attempts} attempts: {last}")]
    RetriesExhausted { url: String, attempts: u32, last: String },

    #[error("authentication failed after {attempts} attempts")]
    AuthExhausted { attempts: u32 },

    #[error("node did not reach state {want} after {polls} polls")]
    StateTimeout { want: NodeState, polls: u32 },
}

impl ClientError {
    pub(crate) fn from_reqwest(url: &str, e: reqwest::Error) -> ClientError {
        if e.is_timeout() {
            ClientError::Timeout { url: url.to_string(), source: e }
        } else if e.is_connect() {
            ClientError::Connect { url: url.to_string(), source: e }
        } else {
            ClientError::Request { url: url.to_string(), source: e }
        }
    }

    /**
     * True if another attempt on the same retry budget might succeed:
     * connection failures and timeouts only.  Programming errors and
     * malformed responses are not retried.
     */
    pub(crate) fn is_transient(&self) -> bool {
        matches!(
            self,
            ClientError::Connect { .. } | ClientError::Timeout { .. }
        )
    }
}
