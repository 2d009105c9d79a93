//! Turns a workload into ready-to-run sessions.
//!
//! Everything that can be wrong with the configuration (rate, distribution,
//! unknown nodes, empty topic lists) surfaces here, before any connection is
//! opened.

use std::time::Duration;

use super::message::QoS;
use super::publisher::PublisherSession;
use super::rate::{Distribution, RateGenerator};
use super::subscriber::SubscriberSession;
use crate::transport::{ConnectOptions, Credentials, Endpoint, TopicFilters};
use crate::utils::BenchResult;
use crate::workload::{Ident, NodeTable, Workload};

/// Per-session parameters shared by the whole run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunParams {
    pub message_size: usize,
    pub message_count: u64,
    pub pub_qos: QoS,
    pub sub_qos: QoS,
    pub rate: f64,
    pub distribution: Distribution,
    pub client_id_prefix: String,
    pub credentials: Option<Credentials>,
    pub connect_timeout: Duration,
    pub ack_timeout: Duration,
}

impl Default for RunParams {
    fn default() -> Self {
        Self {
            message_size: 100,
            message_count: 1,
            pub_qos: QoS::AtMostOnce,
            sub_qos: QoS::AtMostOnce,
            rate: 1.0,
            distribution: Distribution::Poisson,
            client_id_prefix: "popbench".to_string(),
            credentials: None,
            connect_timeout: Duration::from_secs(10),
            ack_timeout: Duration::from_secs(10),
        }
    }
}

impl RunParams {
    fn connect_options(&self, client_id: String, endpoint: &Endpoint) -> ConnectOptions {
        ConnectOptions {
            client_id,
            endpoint: endpoint.clone(),
            credentials: self.credentials.clone(),
            connect_timeout: self.connect_timeout,
            ack_timeout: self.ack_timeout,
        }
    }
}

#[derive(Debug)]
pub struct RunPlan {
    pub publishers: Vec<PublisherSession>,
    pub subscribers: Vec<SubscriberSession>,
}

impl RunPlan {
    pub fn build(workload: &Workload, nodes: &NodeTable, params: &RunParams) -> BenchResult<Self> {
        let publishers = workload
            .publishers
            .iter()
            .map(|spec| {
                let endpoint = nodes.lookup(spec.node_id.as_ref())?;
                let client_id = format!("{}-pub-{}", params.client_id_prefix, spec.id);
                PublisherSession::new(
                    spec.id.as_str(),
                    params.connect_options(client_id, endpoint),
                    spec.topic_list.iter().map(Ident::to_string).collect(),
                    params.message_size,
                    params.message_count,
                    params.pub_qos,
                    RateGenerator::new(params.rate, params.distribution)?,
                )
            })
            .collect::<BenchResult<Vec<_>>>()?;

        let subscribers = workload
            .subscribers
            .iter()
            .map(|spec| {
                let endpoint = nodes.lookup(spec.node_id.as_ref())?;
                let client_id = format!("{}-sub-{}", params.client_id_prefix, spec.id);
                let filters: TopicFilters = spec
                    .topic_list
                    .iter()
                    .map(|topic| (topic.to_string(), params.sub_qos))
                    .collect();
                SubscriberSession::new(
                    spec.id.as_str(),
                    params.connect_options(client_id, endpoint),
                    filters,
                )
            })
            .collect::<BenchResult<Vec<_>>>()?;

        Ok(Self {
            publishers,
            subscribers,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.publishers.is_empty() && self.subscribers.is_empty()
    }
}
