use clap::Parser;

/// n2k-gateway - polls an NMEA2000 gateway and keeps a live thing model
#[derive(Debug, Parser)]
#[clap(author, version)]
pub struct Options {
    /// Settings file (YAML)
    #[clap(short = 'c', long = "config", default_value = "config.yaml")]
    pub config_file: String,

    /// Stop after this many seconds
    #[clap(short = 't', long = "time")]
    pub runtime: Option<u64>,

    /// Bootstrap once, print the thing model and mobile values as JSON, exit
    #[clap(short = 'd', long = "dump")]
    pub dump: bool,
}

impl Options {
    pub fn new() -> Self {
        Self::parse()
    }
}
