//! The `workload` module describes who publishes and subscribes where.
//!
//! A workload comes either from a JSON file:
//!
//! ```json
//! {
//!   "publisher":  [{ "pub_id": 1, "node_id": 0, "topic_list": [1] }],
//!   "subscriber": [{ "sub_id": 1, "node_id": 0, "topic_list": [1] }],
//!   "nodes": { "0": "tcp://10.0.0.5:1883" }
//! }
//! ```
//!
//! or is generated as `n` publisher/subscriber pairs, pair `i` using topic `i`.
//! Identifiers may be written as numbers or strings; they are kept as text.

pub mod nodes;

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::utils::{BenchError, BenchResult};

pub use nodes::NodeTable;

/// A session, node or topic identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize)]
#[serde(try_from = "RawIdent")]
pub struct Ident(String);

#[derive(Deserialize)]
#[serde(untagged)]
enum RawIdent {
    Int(i64),
    Float(f64),
    Text(String),
}

impl TryFrom<RawIdent> for Ident {
    type Error = String;

    fn try_from(raw: RawIdent) -> Result<Self, Self::Error> {
        let text = match raw {
            RawIdent::Int(n) => n.to_string(),
            RawIdent::Float(f) if f.is_finite() => f.to_string(),
            RawIdent::Float(f) => return Err(format!("identifier {f} is not a finite number")),
            RawIdent::Text(s) => s.trim().to_string(),
        };
        if text.is_empty() {
            return Err("identifier must not be empty".to_string());
        }
        Ok(Ident(text))
    }
}

impl Ident {
    pub fn new(id: impl Into<String>) -> Self {
        Ident(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Ident {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PublisherSpec {
    #[serde(rename = "pub_id")]
    pub id: Ident,
    #[serde(default)]
    pub node_id: Option<Ident>,
    pub topic_list: Vec<Ident>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SubscriberSpec {
    #[serde(rename = "sub_id")]
    pub id: Ident,
    #[serde(default)]
    pub node_id: Option<Ident>,
    pub topic_list: Vec<Ident>,
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct Workload {
    #[serde(rename = "publisher", alias = "publishers", default)]
    pub publishers: Vec<PublisherSpec>,
    #[serde(rename = "subscriber", alias = "subscribers", default)]
    pub subscribers: Vec<SubscriberSpec>,
    /// Node id -> endpoint.
    #[serde(default)]
    pub nodes: BTreeMap<Ident, String>,
}

impl Workload {
    /// Reads and validates a workload file.
    pub fn load(path: impl AsRef<Path>) -> BenchResult<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|source| BenchError::WorkloadRead {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> BenchResult<Self> {
        let workload: Workload = serde_json::from_str(raw)?;
        workload.validate()?;
        Ok(workload)
    }

    /// `count` publisher/subscriber pairs; pair `i` (from 1) publishes and
    /// subscribes on topic `i`.
    pub fn pairs(count: usize) -> BenchResult<Self> {
        if count == 0 {
            return Err(BenchError::InvalidClientCount(count));
        }
        let (publishers, subscribers) = (1..=count)
            .map(|i| {
                let id = Ident(i.to_string());
                (
                    PublisherSpec {
                        id: id.clone(),
                        node_id: None,
                        topic_list: vec![id.clone()],
                    },
                    SubscriberSpec {
                        id: id.clone(),
                        node_id: None,
                        topic_list: vec![id],
                    },
                )
            })
            .unzip();
        Ok(Self {
            publishers,
            subscribers,
            nodes: BTreeMap::new(),
        })
    }

    pub fn validate(&self) -> BenchResult<()> {
        if self.publishers.is_empty() && self.subscribers.is_empty() {
            return Err(BenchError::InvalidClientCount(0));
        }

        let mut seen = HashSet::new();
        for publisher in &self.publishers {
            if !seen.insert(&publisher.id) {
                return Err(BenchError::Workload(format!(
                    "duplicate publisher id {}",
                    publisher.id
                )));
            }
            if publisher.topic_list.is_empty() {
                return Err(BenchError::Workload(format!(
                    "publisher {} has an empty topic_list",
                    publisher.id
                )));
            }
        }

        seen.clear();
        for subscriber in &self.subscribers {
            if !seen.insert(&subscriber.id) {
                return Err(BenchError::Workload(format!(
                    "duplicate subscriber id {}",
                    subscriber.id
                )));
            }
            if subscriber.topic_list.is_empty() {
                return Err(BenchError::Workload(format!(
                    "subscriber {} has an empty topic_list",
                    subscriber.id
                )));
            }
        }
        Ok(())
    }
}
