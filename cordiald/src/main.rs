use cordial_consensus::miner::Miner;
use cordial_consensus::pipeline::ProcessingCounters;
use cordial_consensus::pipeline::driver::MinerProcessor;
use cordial_consensus_core::MinerId;
use cordial_consensus_core::config::params::Params;
use cordial_core::log::init_logger;
use cordial_core::runtime::Runtime;
use crossbeam_channel::unbounded;
use log::info;
use std::net::SocketAddr;
use std::sync::Arc;

mod args;
mod broadcast;
mod emit;
mod facade;

use args::Args;
use broadcast::HttpBroadcaster;
use emit::StdoutSink;
use facade::IngressService;

const PEER_HOST: &str = "127.0.0.1";

pub fn main() {
    let args = Args::parse();
    init_logger(&args.log_level);

    let everyone: Vec<MinerId> = (args.base_port..args.base_port + args.miner_count).collect();
    let params = Params::new(everyone, args.port);
    info!("cordiald starting as miner {} of {} participants", params.me, params.n());

    let (payload_sender, payload_receiver) = unbounded();
    let (block_sender, block_receiver) = unbounded();
    let counters = Arc::new(ProcessingCounters::default());

    let miner = Miner::new(
        params.clone(),
        Box::new(StdoutSink),
        Box::new(HttpBroadcaster::new(&params, PEER_HOST)),
        counters.clone(),
    );
    let processor = Arc::new(MinerProcessor::new(miner, payload_receiver, block_receiver));
    let listen: SocketAddr = ([0, 0, 0, 0], params.me).into();
    let ingress = Arc::new(IngressService::new(listen, params.me, payload_sender, block_sender, counters));

    let mut runtime = Runtime::new();
    runtime.register(processor);
    runtime.register(ingress);
    runtime.run();

    info!("cordiald is finished");
}
