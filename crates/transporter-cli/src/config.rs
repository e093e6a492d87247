use std::fmt;
use std::time::Duration;

use clap::{ArgAction, Parser};

use transporter_api::ServiceConfig;
use transporter_transfer::DEFAULT_CONCURRENCY;

/// Upload an .ipa to App Store Connect.
#[derive(Parser, Clone, Debug)]
#[command(name = "transporter", version, about)]
pub struct Args {
    /// Your Apple ID.
    #[arg(short, long, env = "TRANSPORTER_USERNAME")]
    pub username: String,

    /// App-specific password for your Apple ID.
    #[arg(short, long, env = "TRANSPORTER_PASSWORD", hide_env_values = true)]
    pub password: String,

    /// Path to the .ipa file (local file, http:// or https:// URL).
    #[arg(short, long)]
    pub file: String,

    /// Number of concurrent upload requests.
    #[arg(
        short,
        long,
        env = "TRANSPORTER_CONCURRENCY",
        default_value_t = DEFAULT_CONCURRENCY,
        value_parser = parse_concurrency,
    )]
    pub concurrency: usize,

    /// Verbosity level (-v, -vv).
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,
}

fn parse_concurrency(value: &str) -> Result<usize, String> {
    match value.parse::<usize>() {
        Ok(0) => Err("concurrency must be at least 1".into()),
        Ok(n) => Ok(n),
        Err(e) => Err(e.to_string()),
    }
}

/// Everything one upload run needs, resolved up front.
#[derive(Clone)]
pub struct RunConfig {
    pub username: String,
    pub password: String,
    /// Local path or remote URL of the package.
    pub source: String,
    pub concurrency: usize,
    pub services: ServiceConfig,
    /// How often transfer progress is logged.
    pub progress_interval: Duration,
}

impl RunConfig {
    pub fn from_args(args: Args) -> Self {
        Self {
            username: args.username,
            password: args.password,
            source: args.file,
            concurrency: args.concurrency,
            services: ServiceConfig::from_env(),
            progress_interval: Duration::from_secs(1),
        }
    }
}

impl fmt::Debug for RunConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunConfig")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("source", &self.source)
            .field("concurrency", &self.concurrency)
            .field("services", &self.services)
            .field("progress_interval", &self.progress_interval)
            .finish()
    }
}
