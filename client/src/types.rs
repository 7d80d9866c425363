/*
 * Copyright 2025 Oxide Computer Company
 */

use std::fmt;

use serde::{Deserialize, Serialize};

/**
 * Observable lifecycle state of a simulated node.  Controllers report
 * transitional states we do not act on; anything unrecognised maps to
 * [`NodeState::Other`] and is treated by pollers as "not yet converged".
 */
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NodeState {
    DefinedOnCore,
    Queued,
    Booted,
    Stopped,
    Started,
    #[serde(other)]
    Other,
}

impl fmt::Display for NodeState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            NodeState::DefinedOnCore => "DEFINED_ON_CORE",
            NodeState::Queued => "QUEUED",
            NodeState::Booted => "BOOTED",
            NodeState::Stopped => "STOPPED",
            NodeState::Started => "STARTED",
            NodeState::Other => "(unrecognised)",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LabDetail {
    pub id: String,
    pub lab_title: String,
    #[serde(default)]
    pub state: Option<String>,
}

/*
 * The controller wraps node details in a "data" envelope.
 */
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct NodeEnvelope {
    pub data: NodeDetail,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NodeDetail {
    pub id: String,
    pub label: String,
    #[serde(default)]
    pub state: Option<NodeState>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct StateEnvelope {
    pub state: NodeState,
}

/**
 * Outcome of a lab title search.  An empty lab list and a list in which
 * nothing matched are deliberately distinct: the former usually means the
 * operator is pointed at the wrong controller.
 */
#[derive(Debug, Clone)]
pub enum LabMatch {
    Found(LabDetail),
    NoMatch,
    NoLabs,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct AuthRequest<'a> {
    pub username: &'a str,
    pub password: &'a str,
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn node_state_decoding() {
        let s: NodeState = serde_json::from_str("\"STOPPED\"").unwrap();
        assert_eq!(s, NodeState::Stopped);

        let s: NodeState = serde_json::from_str("\"DEFINED_ON_CORE\"").unwrap();
        assert_eq!(s, NodeState::DefinedOnCore);

        /*
         * States we do not model must not be a decode failure:
         */
        let s: NodeState = serde_json::from_str("\"WIPING\"").unwrap();
        assert_eq!(s, NodeState::Other);
    }

    #[test]
    fn node_detail_envelope() {
        let j = r#"{"data": {"id": "n-1", "label": "r1",
            "state": "BOOTED", "node_definition": "iosv"}}"#;
        let e: NodeEnvelope = serde_json::from_str(j).unwrap();
        assert_eq!(e.data.id, "n-1");
        assert_eq!(e.data.label, "r1");
        assert_eq!(e.data.state, Some(NodeState::Booted));
    }

    #[test]
    fn lab_detail_without_state() {
        let j = r#"{"id": "l-1", "lab_title": "CLUSTER-TEST"}"#;
        let d: LabDetail = serde_json::from_str(j).unwrap();
        assert_eq!(d.lab_title, "CLUSTER-TEST");
        assert!(d.state.is_none());
    }
}
