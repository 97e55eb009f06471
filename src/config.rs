//! Runtime configuration, parsed from flags with environment fallbacks.

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;

use crate::chain::RegrantPolicy;
use crate::scope::SizeLimits;

#[derive(Debug, Clone, Parser)]
#[command(
    name = "consent-ledger-node",
    version,
    about = "Tamper-evident consent ledger with scope-gated feature extraction"
)]
pub struct Config {
    /// Address the HTTP server binds to.
    #[arg(long, default_value = "127.0.0.1:3030", env = "LEDGER_ADDR")]
    pub addr: SocketAddr,

    /// Directory holding the block files.
    #[arg(long, default_value = "data", env = "LEDGER_DATA_DIR")]
    pub data_dir: PathBuf,

    /// Accept consent writes without signatures. Demo deployments only.
    #[arg(
        long,
        env = "INSECURE_LEDGER",
        value_parser = clap::builder::FalseyValueParser::new()
    )]
    pub insecure: bool,

    /// Base URL of the scoring model. Scoring endpoints answer 502 without it.
    #[arg(long, env = "MODEL_BASE_URL")]
    pub model_base_url: Option<String>,

    /// Scorer request timeout in seconds.
    #[arg(long, default_value_t = 10, env = "MODEL_TIMEOUT_SECS")]
    pub model_timeout_secs: u64,

    /// How scopes resolve when a consent is granted again without a revoke.
    #[arg(long, value_enum, default_value = "latest", env = "REGRANT_POLICY")]
    pub regrant_policy: RegrantPolicy,

    /// Maximum accepted SMS entries per scoring request.
    #[arg(long, default_value_t = 2000, env = "MAX_SMS")]
    pub max_sms: usize,

    /// Maximum accepted contact entries per scoring request.
    #[arg(long, default_value_t = 5000, env = "MAX_CONTACTS")]
    pub max_contacts: usize,

    /// Maximum accepted email entries per scoring request.
    #[arg(long, default_value_t = 2000, env = "MAX_EMAILS")]
    pub max_emails: usize,

    /// Maximum accepted e-commerce entries per scoring request.
    #[arg(long, default_value_t = 5000, env = "MAX_ECOM")]
    pub max_ecom: usize,

    /// Maximum accepted web entries per scoring request.
    #[arg(long, default_value_t = 5000, env = "MAX_WEB")]
    pub max_web: usize,
}

impl Config {
    pub fn size_limits(&self) -> SizeLimits {
        SizeLimits {
            sms: self.max_sms,
            contacts: self.max_contacts,
            emails: self.max_emails,
            ecom: self.max_ecom,
            web: self.max_web,
        }
    }
}
