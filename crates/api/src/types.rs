//! Typed views over control-plane responses.

use serde::{Deserialize, Serialize};

use crate::Result;

/// One node as reported by the control plane.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct NodeState {
    /// Node name.
    pub name: String,
    /// Whether its Ready condition is True.
    pub ready: bool,
}

/// Short observability snapshot returned by the local probe.
#[derive(Clone, Debug)]
pub struct ClusterInfo {
    /// The API endpoint that answered.
    pub endpoint: String,
    /// Control-plane version, when it could be read.
    pub version: Option<String>,
}

impl std::fmt::Display for ClusterInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.version {
            Some(version) => write!(f, "{} ({})", self.endpoint, version),
            None => write!(f, "{}", self.endpoint),
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct VersionInfo {
    #[serde(rename = "gitVersion")]
    pub git_version: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct NodeList {
    #[serde(default)]
    items: Vec<NodeItem>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct NodeItem {
    metadata: NodeMetadata,
    #[serde(default)]
    status: NodeStatusBlock,
}

impl NodeItem {
    pub fn is_ready(&self) -> bool {
        self.status
            .conditions
            .iter()
            .any(|c| c.kind == "Ready" && c.status == "True")
    }
}

#[derive(Debug, Deserialize)]
struct NodeMetadata {
    name: String,
}

#[derive(Debug, Default, Deserialize)]
struct NodeStatusBlock {
    #[serde(default)]
    conditions: Vec<NodeCondition>,
}

#[derive(Debug, Deserialize)]
struct NodeCondition {
    #[serde(rename = "type")]
    kind: String,
    status: String,
}

/// Parses a `/api/v1/nodes` response body.
pub(crate) fn parse_node_list(body: &str) -> Result<Vec<NodeState>> {
    let list: NodeList = serde_json::from_str(body)?;
    Ok(list
        .items
        .into_iter()
        .map(|item| NodeState {
            ready: item.is_ready(),
            name: item.metadata.name,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_node_list() {
        let body = r#"{
            "kind": "NodeList",
            "items": [
                {
                    "metadata": {"name": "server-1"},
                    "status": {"conditions": [
                        {"type": "MemoryPressure", "status": "False"},
                        {"type": "Ready", "status": "True"}
                    ]}
                },
                {
                    "metadata": {"name": "agent-1"},
                    "status": {"conditions": [
                        {"type": "Ready", "status": "False"}
                    ]}
                }
            ]
        }"#;

        let nodes = parse_node_list(body).unwrap();
        assert_eq!(
            nodes,
            vec![
                NodeState {
                    name: "server-1".to_string(),
                    ready: true
                },
                NodeState {
                    name: "agent-1".to_string(),
                    ready: false
                },
            ]
        );
    }

    #[test]
    fn missing_status_means_not_ready() {
        let body = r#"{"items": [{"metadata": {"name": "agent-2"}}]}"#;
        let nodes = parse_node_list(body).unwrap();
        assert_eq!(nodes.len(), 1);
        assert!(!nodes[0].ready);
    }

    #[test]
    fn empty_list_parses() {
        assert!(parse_node_list(r#"{"items": []}"#).unwrap().is_empty());
    }
}
