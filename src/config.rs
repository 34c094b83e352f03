use crate::domain::signature::GatewaySecret;
use crate::infrastructure::razorpay::{DEFAULT_BASE_URL, RazorpayConfig};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

/// Secret the sandbox gateway signs with when `ENROLLPAY_GATEWAY_SECRET` is unset.
pub const SANDBOX_SECRET: &str = "sandbox_secret";

#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Path to persistent database (optional). If provided, uses RocksDB.
    #[arg(long, global = true)]
    pub db_path: Option<PathBuf>,

    #[command(flatten)]
    pub gateway: GatewayArgs,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run a CSV command script and print the resulting payments
    Process {
        /// Input commands CSV file
        input: PathBuf,
    },
    /// Print the checkout signature for an order/payment pair
    Sign {
        #[arg(long)]
        order: String,
        #[arg(long)]
        payment: String,
    },
    /// Print a user's payment history, newest first
    History {
        #[arg(long)]
        user: String,
    },
}

#[derive(Debug, Clone, Args)]
pub struct GatewayArgs {
    /// Shared secret for the sandbox gateway
    #[arg(
        long,
        global = true,
        env = "ENROLLPAY_GATEWAY_SECRET",
        default_value = SANDBOX_SECRET,
        hide_env_values = true
    )]
    pub gateway_secret: String,

    #[arg(long, global = true, env = "RAZORPAY_KEY_ID")]
    pub razorpay_key_id: Option<String>,

    #[arg(long, global = true, env = "RAZORPAY_KEY_SECRET", hide_env_values = true)]
    pub razorpay_key_secret: Option<String>,

    #[arg(long, global = true, env = "RAZORPAY_BASE_URL", default_value = DEFAULT_BASE_URL)]
    pub razorpay_base_url: String,

    /// Gateway request timeout
    #[arg(long, global = true, default_value_t = 30)]
    pub timeout_secs: u64,
}

/// Which gateway the binary talks to.
#[derive(Debug, Clone)]
pub enum GatewaySelection {
    Razorpay(RazorpayConfig),
    Sandbox(GatewaySecret),
}

impl GatewayArgs {
    /// Razorpay when both credentials are present and non-empty, the sandbox otherwise.
    pub fn selection(&self) -> GatewaySelection {
        let present = |v: &Option<String>| {
            v.as_deref()
                .filter(|s| !s.trim().is_empty())
                .map(str::to_string)
        };
        match (
            present(&self.razorpay_key_id),
            present(&self.razorpay_key_secret),
        ) {
            (Some(key_id), Some(key_secret)) => {
                let mut config = RazorpayConfig::new(key_id, key_secret);
                config.base_url = self.razorpay_base_url.clone();
                config.timeout = Duration::from_secs(self.timeout_secs);
                GatewaySelection::Razorpay(config)
            }
            _ => GatewaySelection::Sandbox(GatewaySecret::new(self.gateway_secret.clone())),
        }
    }

    /// The secret checkout signatures are computed with for the selected gateway.
    pub fn signing_secret(&self) -> GatewaySecret {
        match self.selection() {
            GatewaySelection::Razorpay(config) => config.signing_secret(),
            GatewaySelection::Sandbox(secret) => secret,
        }
    }
}
