//! Redis list integration (single version of `redis` via deadpool-redis)
//!
//! The atomic pop is a Lua script: Redis runs a script to completion before
//! serving any other command, so concurrent callers against the same list
//! always receive disjoint items.

use crate::errors::FetchError;
use crate::ingest::{AtomicPop, BatchCap, RawPayload, MAX_BATCH_CAP};
use bytes::Bytes;
use deadpool_redis::redis::{self, RedisError, Script, Value};
use deadpool_redis::{Config, Pool, PoolError, Runtime};
use once_cell::sync::{Lazy, OnceCell};
use tracing::debug;

static REDIS_POOL: OnceCell<Pool> = OnceCell::new();

/// Pops up to `min(ARGV[1], MAX_BATCH_CAP)` items from the head of `KEYS[1]`.
///
/// A wrong-typed key faults on the first `LPOP`, before anything is removed,
/// so a script error never hides a partial removal.
static POP_SCRIPT: Lazy<Script> = Lazy::new(|| Script::new(&pop_script_source()));

pub fn pop_script_source() -> String {
    format!(
        r#"
local key = KEYS[1]
local wanted = tonumber(ARGV[1]) or 0
local limit = math.min(math.floor(wanted), {MAX_BATCH_CAP})
local items = {{}}

for i = 1, limit do
    local item = redis.call('LPOP', key)
    if not item then
        break
    end
    items[i] = item
end

return items
"#
    )
}

pub async fn init_redis_pool(redis_url: &str) -> Result<(), FetchError> {
    let cfg = Config::from_url(redis_url);
    let pool = cfg
        .create_pool(Some(Runtime::Tokio1))
        .map_err(|e| FetchError::RedisInit(e.to_string()))?;
    REDIS_POOL
        .set(pool)
        .map_err(|_| FetchError::RedisInit("pool already initialized".into()))?;
    Ok(())
}

pub fn pool() -> Result<&'static Pool, FetchError> {
    REDIS_POOL
        .get()
        .ok_or_else(|| FetchError::RedisInit("pool not initialized".into()))
}

/// Round-trip `PING` to confirm the pool can reach the server.
pub async fn ping(pool: &Pool) -> Result<(), FetchError> {
    let mut conn = pool.get().await.map_err(pool_error)?;
    let _: String = redis::cmd("PING")
        .query_async(&mut conn)
        .await
        .map_err(classify)?;
    Ok(())
}

/// Redis-list backed `AtomicPop`. Producers `RPUSH`; this pops from the head.
#[derive(Clone)]
pub struct RedisListQueue {
    pool: Pool,
}

impl RedisListQueue {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    #[tracing::instrument(skip(self, cap), fields(cap = cap.get()))]
    pub async fn pop_batch(&self, key: &str, cap: BatchCap) -> Result<Vec<RawPayload>, FetchError> {
        let mut conn = self.pool.get().await.map_err(pool_error)?;

        // EVALSHA, falling back to SCRIPT LOAD on NOSCRIPT.
        let val: Value = POP_SCRIPT
            .key(key)
            .arg(cap.get())
            .invoke_async(&mut conn)
            .await
            .map_err(classify)?;

        let items = parse_pop_reply(val)?;
        debug!(popped = items.len(), "atomic pop returned");
        Ok(items)
    }
}

#[async_trait::async_trait]
impl AtomicPop for RedisListQueue {
    type Error = FetchError;

    async fn pop_up_to(&self, key: &str, cap: BatchCap) -> Result<Vec<RawPayload>, Self::Error> {
        self.pop_batch(key, cap).await
    }
}

/// Parse the pop script's reply into raw payloads, preserving order.
pub fn parse_pop_reply(val: Value) -> Result<Vec<RawPayload>, FetchError> {
    match val {
        Value::Nil => Ok(Vec::new()),
        Value::Bulk(items) => Ok(items.into_iter().map(raw_from_value).collect()),
        other => Err(FetchError::Operation(format!(
            "unexpected pop reply shape: {other:?}"
        ))),
    }
}

fn raw_from_value(v: Value) -> RawPayload {
    match v {
        Value::Data(b) => RawPayload::Data(Bytes::from(b)),
        Value::Status(s) => RawPayload::Data(Bytes::from(s)),
        other => RawPayload::Unexpected(format!("{other:?}")),
    }
}

/// Map a `RedisError` into the transport/operation split.
pub fn classify(e: RedisError) -> FetchError {
    if e.is_io_error() || e.is_connection_dropped() || e.is_connection_refusal() || e.is_timeout()
    {
        FetchError::Transport(e.to_string())
    } else {
        FetchError::Operation(e.to_string())
    }
}

fn pool_error(e: PoolError) -> FetchError {
    FetchError::Transport(e.to_string())
}
