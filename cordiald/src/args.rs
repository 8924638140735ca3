use clap::{Arg, Command, arg};

const DEFAULT_BASE_PORT: u16 = 5000;
const DEFAULT_MINER_COUNT: u16 = 10;

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub base_port: u16,
    pub miner_count: u16,
    pub log_level: String,
}

pub fn cli() -> Command {
    Command::new("cordiald")
        .about(format!("{} v{}", env!("CARGO_PKG_DESCRIPTION"), env!("CARGO_PKG_VERSION")))
        .version(env!("CARGO_PKG_VERSION"))
        .arg(
            arg!(<port> "Local miner port; doubles as the miner identity.")
                .value_parser(clap::value_parser!(u16)),
        )
        .arg(
            Arg::new("log_level")
                .short('d')
                .long("loglevel")
                .value_name("log_level")
                .default_value("info")
                .num_args(0..=1)
                .require_equals(true)
                .help("Specify log level."),
        )
        .arg(
            Arg::new("base_port")
                .long("base-port")
                .value_name("base_port")
                .default_value("5000")
                .num_args(0..=1)
                .require_equals(true)
                .value_parser(clap::value_parser!(u16))
                .help(format!("First port of the contiguous participant range (default: {DEFAULT_BASE_PORT}).")),
        )
        .arg(
            Arg::new("miner_count")
                .long("miners")
                .value_name("miner_count")
                .default_value("10")
                .num_args(0..=1)
                .require_equals(true)
                .value_parser(clap::value_parser!(u16))
                .help(format!("Number of participants in the deployment (default: {DEFAULT_MINER_COUNT}).")),
        )
}

impl Args {
    pub fn parse() -> Args {
        let m = cli().get_matches();
        Args {
            port: *m.get_one::<u16>("port").unwrap(),
            base_port: *m.get_one::<u16>("base_port").unwrap(),
            miner_count: *m.get_one::<u16>("miner_count").unwrap(),
            log_level: m.get_one::<String>("log_level").cloned().unwrap(),
        }
    }
}
