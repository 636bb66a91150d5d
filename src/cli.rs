use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "panelink")]
#[command(about = "Open a panel server session and follow its daemon socket")]
#[command(version)]
pub struct Cli {
    /// Increase verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Settings file (defaults to the user config directory)
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Panel base URL, overrides settings and environment
    #[arg(long, value_name = "URL")]
    pub panel_url: Option<String>,

    /// Client API key, overrides settings and environment
    #[arg(long, value_name = "KEY")]
    pub api_key: Option<String>,

    /// Route to open first, e.g. /server/a1. Further routes are read from
    /// stdin, one per line.
    pub route: Option<String>,
}

impl Cli {
    /// `info` by default; `RUST_LOG` still takes precedence.
    pub fn log_level(&self) -> &'static str {
        match self.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    }
}
