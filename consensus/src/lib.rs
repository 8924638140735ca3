pub mod miner;
pub mod model;
pub mod pipeline;
pub mod processes;
pub mod testutils;

pub use miner::{BlockBroadcaster, Miner};
