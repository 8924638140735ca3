pub mod params;

pub use params::{LeaderSchedule, Params};
