use cordial_consensus::miner::BlockBroadcaster;
use cordial_consensus_core::MinerId;
use cordial_consensus_core::block::Block;
use cordial_consensus_core::config::params::Params;
use log::{debug, warn};
use std::time::Duration;

const BROADCAST_TIMEOUT: Duration = Duration::from_secs(5);

/// Ships each authored block to the n−1 peers as `POST [block]` against
/// their `/blocks` endpoint. A failed post is logged and forgotten; gossip
/// through later rounds heals the gap.
pub struct HttpBroadcaster {
    client: reqwest::blocking::Client,
    peers: Vec<(MinerId, String)>,
}

impl HttpBroadcaster {
    pub fn new(params: &Params, host: &str) -> Self {
        let client = reqwest::blocking::Client::builder()
            .timeout(BROADCAST_TIMEOUT)
            .build()
            .expect("Failed building the broadcast client");
        let peers = params.others().map(|peer| (peer, format!("http://{host}:{peer}/blocks"))).collect();
        Self { client, peers }
    }
}

impl BlockBroadcaster for HttpBroadcaster {
    fn broadcast(&self, block: &Block) {
        for (peer, url) in &self.peers {
            debug!("sending block {} to miner {}", block.hash, peer);
            match self.client.post(url).json(&[block]).send() {
                Ok(response) if !response.status().is_success() => {
                    warn!("miner {} rejected block {}: {}", peer, block.hash, response.status())
                }
                Ok(_) => {}
                Err(err) => warn!("failed shipping block {} to miner {}: {}", block.hash, peer, err),
            }
        }
    }
}
