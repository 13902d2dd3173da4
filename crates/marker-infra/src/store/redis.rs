//! Redis counter store with server-side Lua scripts and fail-open accessors.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client, RedisResult, Script};

use marker_core::ports::{CounterStore, FixedWindowReply, SlidingWindowReply};

/// Sorted-set sliding window. Members are `now:token` so requests landing
/// in the same second stay distinct.
///
/// Returns `{allowed, remaining, retry_after}`.
const SLIDING_WINDOW_SCRIPT: &str = r#"
local key = KEYS[1]
local now = tonumber(ARGV[1])
local window = tonumber(ARGV[2])
local limit = tonumber(ARGV[3])
local token = ARGV[4]

redis.call('ZREMRANGEBYSCORE', key, 0, now - window)
local count = redis.call('ZCARD', key)

if count < limit then
    redis.call('ZADD', key, now, now .. ':' .. token)
    redis.call('EXPIRE', key, window)
    return {1, limit - count - 1, 0}
end

local oldest = redis.call('ZRANGE', key, 0, 0, 'WITHSCORES')
local retry_after = 0
if oldest and oldest[2] then
    retry_after = math.ceil((tonumber(oldest[2]) + window) - now)
end
return {0, 0, retry_after}
"#;

/// Counter per window. The first increment sets the expiry, which fixes
/// the window boundary.
///
/// Returns `{allowed, remaining, ttl, retry_after}`.
const FIXED_WINDOW_SCRIPT: &str = r#"
local key = KEYS[1]
local limit = tonumber(ARGV[1])
local window = tonumber(ARGV[2])

local count = redis.call('INCR', key)
if count == 1 then
    redis.call('EXPIRE', key, window)
end
local ttl = redis.call('TTL', key)

if count <= limit then
    return {1, limit - count, ttl, 0}
end
return {0, 0, ttl, ttl}
"#;

/// Redis connection configuration.
#[derive(Debug, Clone)]
pub struct RedisConfig {
    /// Redis URL (e.g., redis://localhost:6379)
    pub url: String,
    /// When false the client never connects and every call fails open.
    pub enabled: bool,
    /// Connection timeout
    pub connect_timeout: Duration,
    /// Upper bound for a single command, scripts included
    pub command_timeout: Duration,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: "redis://localhost:6379".to_string(),
            enabled: true,
            connect_timeout: Duration::from_secs(5),
            command_timeout: Duration::from_millis(500),
        }
    }
}

impl RedisConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        Self {
            url: std::env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://localhost:6379".to_string()),
            enabled: std::env::var("REDIS_ENABLED")
                .map(|v| v != "false" && v != "0")
                .unwrap_or(true),
            connect_timeout: Duration::from_secs(
                std::env::var("REDIS_CONNECT_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(5),
            ),
            command_timeout: Duration::from_millis(
                std::env::var("REDIS_COMMAND_TIMEOUT_MS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(500),
            ),
        }
    }
}

/// Window scripts, registered with the server at connect time.
///
/// Invocation goes through `EVALSHA` and resends the source when the server
/// answers `NOSCRIPT`, so a restarted or failed-over Redis keeps enforcing.
struct ScriptHandles {
    sliding_window: Script,
    fixed_window: Script,
}

/// Redis-backed counter store.
///
/// Uses connection manager for automatic reconnection; clones share one
/// multiplexed connection.
pub struct RedisCounterStore {
    conn: Option<ConnectionManager>,
    scripts: Option<ScriptHandles>,
    config: RedisConfig,
}

impl RedisCounterStore {
    /// Connect and register the window scripts.
    ///
    /// Never fails: an unreachable server leaves the store disconnected and
    /// a failed script load leaves the script handles unset.
    pub async fn connect(config: RedisConfig) -> Self {
        if !config.enabled {
            tracing::info!("Redis disabled by configuration");
            return Self::disconnected(config);
        }

        let conn = match Self::open(&config).await {
            Ok(conn) => conn,
            Err(e) => {
                tracing::warn!(url = %config.url, error = %e, "Redis connection failed");
                return Self::disconnected(config);
            }
        };

        let mut store = Self {
            conn: Some(conn),
            scripts: None,
            config,
        };
        store.scripts = store.load_scripts().await;

        tracing::info!(
            url = %store.config.url,
            scripts_loaded = store.scripts.is_some(),
            "Connected to Redis counter store"
        );

        store
    }

    /// Create from environment configuration.
    pub async fn from_env() -> Self {
        Self::connect(RedisConfig::from_env()).await
    }

    fn disconnected(config: RedisConfig) -> Self {
        Self {
            conn: None,
            scripts: None,
            config,
        }
    }

    async fn open(config: &RedisConfig) -> Result<ConnectionManager, String> {
        let client = Client::open(config.url.as_str()).map_err(|e| e.to_string())?;

        // Use timeout to prevent hanging if Redis is unreachable
        let mut conn = tokio::time::timeout(config.connect_timeout, ConnectionManager::new(client))
            .await
            .map_err(|_| "Connection timed out".to_string())?
            .map_err(|e| e.to_string())?;

        let _: String = tokio::time::timeout(
            config.connect_timeout,
            redis::cmd("PING").query_async(&mut conn),
        )
        .await
        .map_err(|_| "PING timed out".to_string())?
        .map_err(|e| e.to_string())?;

        Ok(conn)
    }

    async fn load_scripts(&self) -> Option<ScriptHandles> {
        let handles = ScriptHandles {
            sliding_window: Script::new(SLIDING_WINDOW_SCRIPT),
            fixed_window: Script::new(FIXED_WINDOW_SCRIPT),
        };

        self.script_load(&handles.sliding_window).await?;
        self.script_load(&handles.fixed_window).await?;
        tracing::info!("Redis Lua scripts loaded");

        Some(handles)
    }

    async fn script_load(&self, script: &Script) -> Option<String> {
        self.run("SCRIPT LOAD", |mut conn| async move {
            script.prepare_invoke().load_async(&mut conn).await
        })
        .await
    }

    /// Whether both window scripts are registered.
    pub fn scripts_loaded(&self) -> bool {
        self.scripts.is_some()
    }

    /// Run one command with the configured timeout, mapping every failure
    /// to `None`.
    async fn run<T, F, Fut>(&self, op: &'static str, f: F) -> Option<T>
    where
        F: FnOnce(ConnectionManager) -> Fut,
        Fut: Future<Output = RedisResult<T>>,
    {
        let conn = self.conn.clone()?;

        match tokio::time::timeout(self.config.command_timeout, f(conn)).await {
            Ok(Ok(value)) => Some(value),
            Ok(Err(e)) => {
                tracing::warn!(op, error = %e, "Redis command failed");
                None
            }
            Err(_) => {
                tracing::warn!(
                    op,
                    timeout_ms = self.config.command_timeout.as_millis() as u64,
                    "Redis command timed out"
                );
                None
            }
        }
    }

    async fn invoke(&self, script: &Script, key: &str, args: Vec<String>) -> Option<Vec<i64>> {
        self.run("EVALSHA", |mut conn| async move {
            script.key(key).arg(args).invoke_async(&mut conn).await
        })
        .await
    }
}

fn sliding_reply(values: &[i64]) -> Option<SlidingWindowReply> {
    match values {
        [allowed, remaining, retry_after] => Some(SlidingWindowReply {
            allowed: *allowed == 1,
            remaining: *remaining,
            retry_after: *retry_after,
        }),
        _ => {
            tracing::warn!(len = values.len(), "Unexpected sliding window reply");
            None
        }
    }
}

fn fixed_reply(values: &[i64]) -> Option<FixedWindowReply> {
    match values {
        [allowed, remaining, ttl, retry_after] => Some(FixedWindowReply {
            allowed: *allowed == 1,
            remaining: *remaining,
            ttl: *ttl,
            retry_after: *retry_after,
        }),
        _ => {
            tracing::warn!(len = values.len(), "Unexpected fixed window reply");
            None
        }
    }
}

#[async_trait]
impl CounterStore for RedisCounterStore {
    fn is_connected(&self) -> bool {
        self.conn.is_some()
    }

    async fn ping(&self) -> bool {
        self.run("PING", |mut conn| async move {
            let pong: RedisResult<String> = redis::cmd("PING").query_async(&mut conn).await;
            pong
        })
        .await
        .is_some()
    }

    async fn sliding_window(
        &self,
        key: &str,
        now: i64,
        window_secs: u64,
        max_requests: u32,
        unique_token: &str,
    ) -> Option<SlidingWindowReply> {
        let script = &self.scripts.as_ref()?.sliding_window;
        let args = vec![
            now.to_string(),
            window_secs.to_string(),
            max_requests.to_string(),
            unique_token.to_string(),
        ];
        let values = self.invoke(script, key, args).await?;
        sliding_reply(&values)
    }

    async fn fixed_window(
        &self,
        key: &str,
        max_requests: u32,
        window_secs: u64,
    ) -> Option<FixedWindowReply> {
        let script = &self.scripts.as_ref()?.fixed_window;
        let args = vec![max_requests.to_string(), window_secs.to_string()];
        let values = self.invoke(script, key, args).await?;
        fixed_reply(&values)
    }

    async fn get(&self, key: &str) -> Option<String> {
        self.run("GET", |mut conn| async move {
            conn.get::<_, Option<String>>(key).await
        })
        .await
        .flatten()
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> bool {
        self.run("SETEX", |mut conn| async move {
            conn.set_ex::<_, _, ()>(key, value, ttl.as_secs().max(1)).await
        })
        .await
        .is_some()
    }

    async fn delete(&self, keys: &[&str]) -> bool {
        if keys.is_empty() {
            return self.conn.is_some();
        }
        self.run("DEL", |mut conn| async move {
            conn.del::<_, ()>(keys).await
        })
        .await
        .is_some()
    }

    async fn flush(&self) -> bool {
        self.run("FLUSHDB", |mut conn| async move {
            let reply: RedisResult<()> = redis::cmd("FLUSHDB").query_async(&mut conn).await;
            reply
        })
        .await
        .is_some()
    }
}
