use std::path::PathBuf;

use clap::Parser;

/// Command line configuration for one Origin run: what to share, where to,
/// and for how long. Grounded on the teacher's `Args` (`main.rs`), but
/// fwdcast's Origin is a one-shot CLI tool rather than a long-running
/// server, so every field is a share parameter rather than a deployment
/// override.
#[derive(Parser, Debug)]
#[command(name = "fwdcast-origin")]
#[command(about = "Share a local directory through a fwdcast relay")]
pub struct Args {
    /// WebSocket URL of the relay to dial, e.g. `wss://relay.example/ws`.
    #[arg(long, env = "FWDCAST_RELAY_URL")]
    pub relay_url: String,

    /// Directory to share. Canonicalized at startup.
    #[arg(long, default_value = ".")]
    pub dir: PathBuf,

    /// How long the share stays active, in minutes.
    #[arg(long, default_value_t = 30, value_parser = duration_minutes_in_range)]
    pub duration_minutes: u32,

    /// Optional password viewers must supply before browsing the share.
    #[arg(long)]
    pub password: Option<String>,

    /// Substring patterns to exclude from directory listings and ZIP
    /// downloads (repeatable).
    #[arg(long = "exclude")]
    pub exclude: Vec<String>,

    /// Maximum connection attempts before giving up.
    #[arg(long, default_value_t = 10)]
    pub max_retries: u32,

    /// Delay between connection attempts, in milliseconds.
    #[arg(long, default_value_t = 500)]
    pub retry_delay_ms: u64,
}

fn duration_minutes_in_range(raw: &str) -> Result<u32, String> {
    let value: u32 = raw.parse().map_err(|_| format!("'{raw}' is not a number"))?;
    if (1..=120).contains(&value) {
        Ok(value)
    } else {
        Err("duration-minutes must be between 1 and 120".to_string())
    }
}

impl Args {
    pub fn load() -> Self {
        dotenvy::dotenv().ok();
        Args::parse()
    }
}
