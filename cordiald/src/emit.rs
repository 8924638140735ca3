use cordial_consensus::processes::orderer::OrderedPayloadSink;
use cordial_consensus_core::MinerId;
use serde_json::Value;

/// Writes the totally ordered payload stream to stdout, one JSON value per
/// line. Every correct miner prints the same sequence.
pub struct StdoutSink;

impl OrderedPayloadSink for StdoutSink {
    fn emit(&mut self, _creator: MinerId, payload: &Value) {
        println!("{}", payload);
    }
}
