//! Configuration for the holder
//!
//! CLI arguments and environment variable handling using clap. A `.env`
//! file is honored by the binary through dotenvy.

use clap::Parser;
use mongodb::options::{
    Acknowledgment, AuthMechanism, ClientOptions, Credential, ServerAddress, Tls, TlsOptions,
    WriteConcern,
};
use std::time::Duration;

use crate::types::{HolderError, Result};

/// mongo-holder - typed MongoDB access helper
#[derive(Parser, Debug, Clone)]
#[command(name = "mongo-holder")]
#[command(about = "Check MongoDB connectivity and list the configured database's collections")]
pub struct Args {
    /// MongoDB connection configuration
    #[command(flatten)]
    pub mongo: MongoArgs,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Emit logs as JSON lines
    #[arg(long, env = "LOG_JSON", default_value = "false")]
    pub log_json: bool,
}

/// MongoDB connection configuration
#[derive(Parser, Debug, Clone)]
pub struct MongoArgs {
    /// Full connection string; when set, addresses and credentials are taken from it
    #[arg(long, env = "MONGODB_URI")]
    pub mongodb_uri: Option<String>,

    /// Database name (also the authentication source)
    #[arg(long, env = "MONGODB_DATABASE", default_value = "test")]
    pub database: String,

    /// Username for SCRAM-SHA-1 authentication (optional)
    #[arg(long, env = "MONGODB_USERNAME")]
    pub username: Option<String>,

    /// Password for SCRAM-SHA-1 authentication
    #[arg(long, env = "MONGODB_PASSWORD")]
    pub password: Option<String>,

    /// Comma-separated host:port list
    #[arg(
        long,
        env = "MONGODB_ADDRESSES",
        value_delimiter = ',',
        default_value = "localhost:27017"
    )]
    pub addresses: Vec<String>,

    /// Application name reported to the server
    #[arg(long, env = "MONGODB_APP_NAME", default_value = "mongo-holder")]
    pub app_name: String,

    /// Maximum connections per host
    #[arg(long, env = "MONGODB_MAX_POOL_SIZE", default_value = "100")]
    pub max_pool_size: u32,

    /// Minimum connections per host
    #[arg(long, env = "MONGODB_MIN_POOL_SIZE", default_value = "0")]
    pub min_pool_size: u32,

    /// Server selection timeout in milliseconds
    #[arg(long, env = "MONGODB_SERVER_SELECTION_TIMEOUT_MS", default_value = "30000")]
    pub server_selection_timeout_ms: u64,

    /// Connect timeout in milliseconds
    #[arg(long, env = "MONGODB_CONNECT_TIMEOUT_MS", default_value = "10000")]
    pub connect_timeout_ms: u64,

    /// Idle time before a pooled connection is closed, in milliseconds (0 = never)
    #[arg(long, env = "MONGODB_MAX_IDLE_TIME_MS", default_value = "0")]
    pub max_idle_time_ms: u64,

    /// Heartbeat frequency in milliseconds
    #[arg(long, env = "MONGODB_HEARTBEAT_FREQUENCY_MS", default_value = "10000")]
    pub heartbeat_frequency_ms: u64,

    /// Latency window for server selection in milliseconds
    #[arg(long, env = "MONGODB_LOCAL_THRESHOLD_MS", default_value = "15")]
    pub local_threshold_ms: u64,

    /// Enable TLS
    #[arg(long, env = "MONGODB_TLS", default_value = "false")]
    pub tls: bool,

    /// Accept invalid server certificates (testing only)
    #[arg(long, env = "MONGODB_TLS_ALLOW_INVALID_CERTIFICATES", default_value = "false")]
    pub tls_allow_invalid_certificates: bool,
}

/// Parse one `host:port` entry
fn parse_address(address: &str) -> Result<ServerAddress> {
    let (host, port) = address
        .trim()
        .rsplit_once(':')
        .ok_or_else(|| HolderError::Config(format!("Address '{}' is not host:port", address)))?;

    if host.is_empty() {
        return Err(HolderError::Config(format!("Address '{}' has no host", address)));
    }

    let port: u16 = port
        .parse()
        .map_err(|_| HolderError::Config(format!("Address '{}' has an invalid port", address)))?;

    Ok(ServerAddress::Tcp {
        host: host.to_string(),
        port: Some(port),
    })
}

impl MongoArgs {
    /// Configured addresses, blanks dropped
    pub fn address_list(&self) -> Vec<&str> {
        self.addresses
            .iter()
            .map(|a| a.trim())
            .filter(|a| !a.is_empty())
            .collect()
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.database.trim().is_empty() {
            return Err(HolderError::Config("MONGODB_DATABASE must not be empty".into()));
        }

        if self.mongodb_uri.is_none() {
            let addresses = self.address_list();
            if addresses.is_empty() {
                return Err(HolderError::Config(
                    "Either MONGODB_URI or MONGODB_ADDRESSES must be set".into(),
                ));
            }
            for address in addresses {
                parse_address(address)?;
            }
        }

        if self.username.is_some() && self.password.is_none() {
            return Err(HolderError::Config(
                "MONGODB_PASSWORD is required when MONGODB_USERNAME is set".into(),
            ));
        }

        if self.min_pool_size > self.max_pool_size {
            return Err(HolderError::Config(format!(
                "MONGODB_MIN_POOL_SIZE ({}) exceeds MONGODB_MAX_POOL_SIZE ({})",
                self.min_pool_size, self.max_pool_size
            )));
        }

        Ok(())
    }

    /// SCRAM-SHA-1 credential against the configured database
    fn credential(&self) -> Option<Credential> {
        let username = self.username.clone()?;
        let mut credential = Credential::default();
        credential.username = Some(username);
        credential.password = self.password.clone();
        credential.source = Some(self.database.clone());
        credential.mechanism = Some(AuthMechanism::ScramSha1);
        Some(credential)
    }

    /// Build driver options
    ///
    /// Pool and timeout settings always apply; hosts and credentials come
    /// from the URI when one is configured.
    pub async fn client_options(&self) -> Result<ClientOptions> {
        let mut options = match &self.mongodb_uri {
            Some(uri) => ClientOptions::parse(uri).await?,
            None => {
                let mut options = ClientOptions::default();
                options.hosts = self
                    .address_list()
                    .into_iter()
                    .map(parse_address)
                    .collect::<Result<Vec<_>>>()?;
                options.credential = self.credential();
                options
            }
        };

        self.apply_pool_options(&mut options);
        Ok(options)
    }

    fn apply_pool_options(&self, options: &mut ClientOptions) {
        options.app_name = Some(self.app_name.clone());
        options.max_pool_size = Some(self.max_pool_size);
        options.min_pool_size = Some(self.min_pool_size);
        options.server_selection_timeout =
            Some(Duration::from_millis(self.server_selection_timeout_ms));
        options.connect_timeout = Some(Duration::from_millis(self.connect_timeout_ms));
        options.max_idle_time = match self.max_idle_time_ms {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        };
        options.heartbeat_freq = Some(Duration::from_millis(self.heartbeat_frequency_ms));
        options.local_threshold = Some(Duration::from_millis(self.local_threshold_ms));

        if self.tls {
            let mut tls = TlsOptions::default();
            tls.allow_invalid_certificates = Some(self.tls_allow_invalid_certificates);
            options.tls = Some(Tls::Enabled(tls));
        } else if options.tls.is_none() {
            options.tls = Some(Tls::Disabled);
        }

        // Acknowledged writes
        let mut write_concern = WriteConcern::default();
        write_concern.w = Some(Acknowledgment::Nodes(1));
        options.write_concern = Some(write_concern);
    }
}
