use std::path::PathBuf;
use std::time::Duration;

use crate::store::DEFAULT_STORE_PATH;

/// Routers pinged on startup, resolution or send failures are tolerated.
pub const DEFAULT_BOOTSTRAP_NODES: [&str; 5] = [
    "router.bittorrent.com:6881",
    "router.utorrent.com:6881",
    "router.bitcomet.com:6881",
    "dht.transmissionbt.com:6881",
    "dht.aelitis.com:6881",
];

/// Version tag handed to the engine and sent in its messages.
pub const DEFAULT_VERSION: [u8; 4] = [b'J', b'C', 0, 0];

/// Upper bound on the wait budget returned by [crate::DhtSession::run_frame].
pub const MAX_FRAME_SLEEP: Duration = Duration::from_secs(3);

#[derive(Debug, Clone)]
/// Session Configurations
pub struct Config {
    /// Bootstrap nodes, as `"host:port"`.
    ///
    /// Defaults to [DEFAULT_BOOTSTRAP_NODES]
    pub bootstrap: Vec<String>,
    /// Where the node id and peer cache are persisted.
    ///
    /// Defaults to [DEFAULT_STORE_PATH] in the working directory, `None`
    /// disables persistence and generates a new id every run.
    pub store_path: Option<PathBuf>,
    /// Register an IPv4 transport with the engine.
    ///
    /// Defaults to true
    pub ipv4: bool,
    /// Register an IPv6 transport with the engine.
    ///
    /// Defaults to false
    pub ipv6: bool,
    /// Version tag handed to the engine.
    ///
    /// Defaults to [DEFAULT_VERSION]
    pub version: [u8; 4],
    /// Also persist the peer store from [crate::DhtSession::run_frame] at this
    /// interval, not only on shutdown.
    ///
    /// Defaults to None
    pub save_interval: Option<Duration>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bootstrap: DEFAULT_BOOTSTRAP_NODES
                .iter()
                .map(|s| s.to_string())
                .collect(),
            store_path: Some(PathBuf::from(DEFAULT_STORE_PATH)),
            ipv4: true,
            ipv6: false,
            version: DEFAULT_VERSION,
            save_interval: None,
        }
    }
}
