use std::collections::{BTreeMap, HashMap};

use tracing::debug;

use super::Ident;
use crate::transport::Endpoint;
use crate::utils::{BenchError, BenchResult};

/// Immutable node id -> endpoint lookup, built once before any session
/// starts.
///
/// Sessions without a node id use the default endpoint. So does every
/// session when no node is configured at all; once nodes are configured an
/// unknown node id is an error.
#[derive(Debug, Clone)]
pub struct NodeTable {
    default: Endpoint,
    nodes: HashMap<String, Endpoint>,
}

impl NodeTable {
    pub fn single(default: Endpoint) -> Self {
        Self {
            default,
            nodes: HashMap::new(),
        }
    }

    /// Builds the table from the workload's `nodes` and the configured ones;
    /// configured entries win. Node endpoints without a port get `node_port`.
    pub fn resolve(
        default_endpoint: &str,
        workload_nodes: &BTreeMap<Ident, String>,
        configured_nodes: &BTreeMap<String, String>,
        node_port: Option<u16>,
    ) -> BenchResult<Self> {
        let default = Endpoint::parse(default_endpoint)?;

        let entries = workload_nodes
            .iter()
            .map(|(id, raw)| (id.as_str(), raw.as_str()))
            .chain(
                configured_nodes
                    .iter()
                    .map(|(id, raw)| (id.as_str(), raw.as_str())),
            );

        let mut nodes = HashMap::new();
        for (id, raw) in entries {
            let mut endpoint = Endpoint::parse(raw)?;
            if let Some(port) = node_port {
                endpoint = endpoint.with_default_port(port);
            }
            debug!(node = %id, endpoint = %endpoint, "node resolved");
            nodes.insert(id.trim().to_string(), endpoint);
        }

        Ok(Self { default, nodes })
    }

    pub fn lookup(&self, node: Option<&Ident>) -> BenchResult<&Endpoint> {
        match node {
            Some(id) if !self.nodes.is_empty() => self
                .nodes
                .get(id.as_str())
                .ok_or_else(|| BenchError::UnknownNode(id.to_string())),
            _ => Ok(&self.default),
        }
    }

    pub fn default_endpoint(&self) -> &Endpoint {
        &self.default
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}
