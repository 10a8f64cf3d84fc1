//! Upstream session (module G): the one logical Redis connection this
//! gateway dispatches unary commands over, plus dedicated connections for
//! pub/sub streaming. Grounded on teacher `redis.rs` (pool sizing) and
//! `server.c`'s `webdis_connect`/`on_timer_reconnect`/`disconnectCallback`
//! trio for the reconnect lifecycle.

use crate::config::Config as AppConfig;
use crate::error::GatewayError;
use crate::reply::ReplyValue;
use deadpool_redis::{Config as PoolConfig, Pool, Runtime};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

const RECONNECT_INTERVAL: Duration = Duration::from_millis(100);

pub struct Upstream {
    pool: Pool,
    client: redis::Client,
    connected: Arc<AtomicBool>,
}

impl Upstream {
    pub fn new(config: &AppConfig) -> Result<Self, GatewayError> {
        // `get_redis_url` already returns a `redis+unix://` URL for a
        // leading-slash `redis_host`; both `deadpool_redis::Config::from_url`
        // and `redis::Client::open` parse that scheme via the same
        // `IntoConnectionInfo`, so no separate UNIX-socket branch is needed
        // here.
        let url = config.get_redis_url();

        let mut pool_cfg = PoolConfig::from_url(&url);
        let pool_size =
            config.pool_size_per_thread.unwrap_or(10) * config.http_threads.unwrap_or(4);
        pool_cfg.pool = Some(deadpool_redis::PoolConfig::new(pool_size));
        let pool = pool_cfg
            .create_pool(Some(Runtime::Tokio1))
            .map_err(|e| GatewayError::UpstreamUnavailable(e.to_string()))?;

        let client = redis::Client::open(url.as_str())?;

        Ok(Self {
            pool,
            client,
            connected: Arc::new(AtomicBool::new(true)),
        })
    }

    /// Background probe matching `on_timer_reconnect`: while the pool can't
    /// hand out a connection, retry on a fixed interval and flip the
    /// connected flag the moment a connection succeeds again. Must be
    /// called from inside the tokio runtime.
    pub fn spawn_reconnect_monitor(self: &Arc<Self>) {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(RECONNECT_INTERVAL).await;
                match this.pool.get().await {
                    Ok(_) => {
                        if !this.connected.swap(true, Ordering::SeqCst) {
                            info!("redis connection restored");
                        }
                    }
                    Err(e) => {
                        if this.connected.swap(false, Ordering::SeqCst) {
                            warn!(error = %e, "redis connection lost, retrying");
                        }
                    }
                }
            }
        });
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Unary dispatch for one already-parsed argv. FIFO request/response
    /// matching on a shared connection is a property of the `redis` crate's
    /// multiplexed connection underneath the pool — no hand-rolled pending-
    /// reply queue is needed on top of it.
    pub async fn dispatch(&self, argv: &[Vec<u8>]) -> Result<ReplyValue, GatewayError> {
        let mut conn = self.pool.get().await.map_err(|e| {
            self.connected.store(false, Ordering::SeqCst);
            GatewayError::UpstreamUnavailable(e.to_string())
        })?;

        let mut redis_cmd = redis::cmd(&String::from_utf8_lossy(&argv[0]));
        for arg in &argv[1..] {
            redis_cmd.arg(arg.as_slice());
        }

        let value: redis::Value = redis_cmd.query_async(&mut conn).await?;
        Ok(ReplyValue::from(value))
    }

    /// Dedicated connection for SUBSCRIBE/PSUBSCRIBE, isolated from the
    /// pool's shared queue (`server.c::server_copy`'s "clone the session"
    /// pattern, re-grounded on the client's native pubsub mode — isolation
    /// comes from a separate connection object, not from multiplexing on
    /// the pooled one).
    pub async fn open_pubsub(&self) -> Result<redis::aio::PubSub, GatewayError> {
        Ok(self.client.get_async_pubsub().await?)
    }
}
