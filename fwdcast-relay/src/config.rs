use std::env;

use clap::Parser;

/// Command line overrides for the relay's environment-derived configuration.
///
/// Mirrors the teacher's `Args` struct: a thin CLI layer that only
/// overrides the fields an operator is likely to want to tweak at launch,
/// leaving everything else to the environment.
#[derive(Parser, Debug)]
#[command(name = "fwdcast-relay")]
#[command(about = "Public relay for fwdcast ephemeral file shares")]
pub struct Args {
    /// Listen port (overrides LISTEN_PORT).
    #[arg(short, long, env = "LISTEN_PORT")]
    pub port: Option<u16>,

    /// Listen host (overrides LISTEN_HOST).
    #[arg(long, env = "LISTEN_HOST")]
    pub host: Option<String>,

    /// Public base URL used to build share links (overrides PUBLIC_BASE).
    #[arg(long, env = "PUBLIC_BASE")]
    pub public_base: Option<String>,
}

/// Relay runtime configuration, loaded from the environment and optionally
/// overridden by CLI flags.
#[derive(Debug, Clone)]
pub struct Config {
    pub listen_host: String,
    pub listen_port: u16,
    pub public_base: Option<String>,
}

impl Config {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        Self {
            listen_host: env::var("LISTEN_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            listen_port: env::var("LISTEN_PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(8080),
            public_base: env::var("PUBLIC_BASE").ok(),
        }
    }

    pub fn apply_args(&mut self, args: &Args) {
        if let Some(port) = args.port {
            self.listen_port = port;
        }
        if let Some(host) = &args.host {
            self.listen_host = host.clone();
        }
        if let Some(base) = &args.public_base {
            self.public_base = Some(base.clone());
        }
    }

    /// The base URL used to construct share links, defaulting to
    /// `http://{listenHost}` per `spec.md` §4.2.
    pub fn effective_public_base(&self) -> String {
        self.public_base
            .clone()
            .unwrap_or_else(|| format!("http://{}", self.listen_host))
    }
}
