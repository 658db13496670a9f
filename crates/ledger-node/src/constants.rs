use std::time::Duration;

pub(crate) const HUB_CHANNEL_CAPACITY: usize = 256;
pub(crate) const CLIENT_REPLY_CAPACITY: usize = 32;
pub(crate) const UPSTREAM_QUEUE_CAPACITY: usize = 64;
pub(crate) const RECONNECT_DELAY: Duration = Duration::from_secs(3);
pub(crate) const DEFAULT_COORDINATOR_URL: &str = "ws://127.0.0.1:8080/ws";
pub(crate) const MINER_ADDRESS_BYTES: usize = 20;
