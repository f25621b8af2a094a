//! Redis-backed store.
//!
//! Records are hashes, tag sets are sets, and batches run as a single
//! MULTI/EXEC pipeline, so Redis expiration does the heavy lifting and
//! this module only has to translate. The connection is multiplexed
//! and established lazily on first use; the first connect also checks
//! the server version, since the write pipeline shape assumes a 2.6+
//! server.

use std::fmt;

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use tokio::sync::OnceCell;

use satchel_core::{CapabilityError, ConnectionParams, SatchelError, SatchelResult, StoreError};
use satchel_store::{Store, StoreResult, WriteBatch, WriteOp};

/// Oldest server version the write pipeline is exercised against.
const MIN_SERVER_VERSION: (u32, u32, u32) = (2, 6, 0);

/// Keys requested per SCAN iteration.
const SCAN_COUNT: usize = 512;

// =============================================================================
// Redis Store
// =============================================================================

pub struct RedisStore {
    params: ConnectionParams,
    connection: OnceCell<MultiplexedConnection>,
}

impl RedisStore {
    /// Build a store around `params`. Nothing connects until the first
    /// operation or an explicit [`connect`].
    ///
    /// [`connect`]: RedisStore::connect
    pub fn new(params: ConnectionParams) -> Self {
        Self {
            params,
            connection: OnceCell::new(),
        }
    }

    pub fn params(&self) -> &ConnectionParams {
        &self.params
    }

    /// Establish the connection now, surfacing the typed version-gate
    /// error. Lazily triggered connects report the same failure as a
    /// connection error.
    pub async fn connect(&self) -> SatchelResult<()> {
        self.connection
            .get_or_try_init(|| establish(&self.params))
            .await?;
        Ok(())
    }

    async fn connection(&self) -> StoreResult<MultiplexedConnection> {
        match self
            .connection
            .get_or_try_init(|| establish(&self.params))
            .await
        {
            Ok(conn) => Ok(conn.clone()),
            Err(SatchelError::Store(err)) => Err(err),
            Err(other) => Err(StoreError::Connection {
                reason: other.to_string(),
            }),
        }
    }
}

impl fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisStore")
            .field("params", &self.params)
            .field("connected", &self.connection.initialized())
            .finish()
    }
}

// =============================================================================
// Connection Setup
// =============================================================================

fn connection_info(params: &ConnectionParams) -> redis::ConnectionInfo {
    let addr = match &params.unix_socket_path {
        Some(path) => redis::ConnectionAddr::Unix(path.clone()),
        None => redis::ConnectionAddr::Tcp(params.host.clone(), params.port),
    };
    redis::ConnectionInfo {
        addr,
        redis: redis::RedisConnectionInfo {
            db: params.db,
            ..Default::default()
        },
    }
}

async fn establish(params: &ConnectionParams) -> Result<MultiplexedConnection, SatchelError> {
    let info = connection_info(params);
    tracing::debug!(addr = %info.addr, db = params.db, "Connecting to Redis");
    let client = redis::Client::open(info).map_err(connection_error)?;
    let mut conn = client
        .get_multiplexed_async_connection()
        .await
        .map_err(connection_error)?;
    verify_server_version(&mut conn).await?;
    Ok(conn)
}

async fn verify_server_version(conn: &mut MultiplexedConnection) -> Result<(), SatchelError> {
    let info: String = redis::cmd("INFO")
        .arg("server")
        .query_async(conn)
        .await
        .map_err(command_error)?;
    // Servers that omit the version line pass; only a version we can
    // read and know to be too old is rejected.
    match parse_redis_version(&info) {
        Some(version) if !version_supported(version) => Err(CapabilityError::StoreVersionTooOld {
            found: format!("{}.{}.{}", version.0, version.1, version.2),
            required: format!(
                "{}.{}.{}",
                MIN_SERVER_VERSION.0, MIN_SERVER_VERSION.1, MIN_SERVER_VERSION.2
            ),
            feature: "cache write pipelines".to_string(),
        }
        .into()),
        _ => Ok(()),
    }
}

fn parse_redis_version(info: &str) -> Option<(u32, u32, u32)> {
    let value = info
        .lines()
        .find_map(|line| line.strip_prefix("redis_version:"))?;
    let mut parts = value.trim().split('.');
    let major = parts.next()?.parse().ok()?;
    let minor = parts.next().unwrap_or("0").parse().ok()?;
    let patch = parts.next().unwrap_or("0").parse().ok()?;
    Some((major, minor, patch))
}

fn version_supported(version: (u32, u32, u32)) -> bool {
    version >= MIN_SERVER_VERSION
}

/// Escape glob metacharacters so a key prefix matches literally in
/// SCAN MATCH patterns.
fn glob_escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        if matches!(ch, '*' | '?' | '[' | ']' | '\\') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

fn connection_error(err: redis::RedisError) -> StoreError {
    StoreError::Connection {
        reason: err.to_string(),
    }
}

fn command_error(err: redis::RedisError) -> StoreError {
    StoreError::Command {
        reason: err.to_string(),
    }
}

// =============================================================================
// Store Implementation
// =============================================================================

#[async_trait]
impl Store for RedisStore {
    fn kind(&self) -> &'static str {
        "redis"
    }

    async fn field(&self, key: &str, field: &str) -> StoreResult<Option<Vec<u8>>> {
        let mut conn = self.connection().await?;
        let value: Option<Vec<u8>> = conn.hget(key, field).await.map_err(command_error)?;
        Ok(value)
    }

    async fn exists(&self, key: &str) -> StoreResult<bool> {
        let mut conn = self.connection().await?;
        let exists: bool = conn.exists(key).await.map_err(command_error)?;
        Ok(exists)
    }

    async fn members(&self, key: &str) -> StoreResult<Vec<String>> {
        let mut conn = self.connection().await?;
        let mut members: Vec<String> = conn.smembers(key).await.map_err(command_error)?;
        members.sort();
        Ok(members)
    }

    async fn is_member(&self, key: &str, member: &str) -> StoreResult<bool> {
        let mut conn = self.connection().await?;
        let found: bool = conn.sismember(key, member).await.map_err(command_error)?;
        Ok(found)
    }

    async fn member_count(&self, key: &str) -> StoreResult<u64> {
        let mut conn = self.connection().await?;
        let count: u64 = conn.scard(key).await.map_err(command_error)?;
        Ok(count)
    }

    async fn intersection(&self, keys: &[String]) -> StoreResult<Vec<String>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let mut conn = self.connection().await?;
        let mut members: Vec<String> = conn.sinter(keys.to_vec()).await.map_err(command_error)?;
        members.sort();
        Ok(members)
    }

    async fn union(&self, keys: &[String]) -> StoreResult<Vec<String>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let mut conn = self.connection().await?;
        let mut members: Vec<String> = conn.sunion(keys.to_vec()).await.map_err(command_error)?;
        members.sort();
        Ok(members)
    }

    async fn scan_prefix(&self, prefix: &str) -> StoreResult<Vec<String>> {
        let mut conn = self.connection().await?;
        let pattern = format!("{}*", glob_escape(prefix));
        let mut keys = Vec::new();
        let mut cursor: u64 = 0;
        loop {
            let (next, mut page): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(SCAN_COUNT)
                .query_async(&mut conn)
                .await
                .map_err(command_error)?;
            keys.append(&mut page);
            cursor = next;
            if cursor == 0 {
                break;
            }
        }
        // SCAN may repeat keys across iterations.
        keys.sort();
        keys.dedup();
        Ok(keys)
    }

    async fn apply(&self, batch: WriteBatch) -> StoreResult<()> {
        if batch.is_empty() {
            return Ok(());
        }
        let mut conn = self.connection().await?;
        let mut pipe = redis::pipe();
        pipe.atomic();
        for op in batch.into_ops() {
            match op {
                WriteOp::PutField { key, field, value } => {
                    pipe.hset(key, field, value).ignore();
                }
                WriteOp::ExpireIn { key, ttl_secs } => {
                    if ttl_secs <= 0 {
                        pipe.del(key).ignore();
                    } else {
                        pipe.expire(key, ttl_secs).ignore();
                    }
                }
                WriteOp::ExpireAt { key, epoch_secs } => {
                    pipe.expire_at(key, epoch_secs).ignore();
                }
                WriteOp::AddMembers { key, members } => {
                    if !members.is_empty() {
                        pipe.sadd(key, members).ignore();
                    }
                }
                WriteOp::RemoveMembers { key, members } => {
                    if !members.is_empty() {
                        pipe.srem(key, members).ignore();
                    }
                }
                WriteOp::Delete { key } => {
                    pipe.del(key).ignore();
                }
            }
        }
        let () = pipe.query_async(&mut conn).await.map_err(command_error)?;
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_version_parses_from_info_block() {
        let info = "# Server\r\nredis_version:7.4.1\r\nredis_mode:standalone\r\n";
        assert_eq!(parse_redis_version(info), Some((7, 4, 1)));
    }

    #[test]
    fn test_version_tolerates_short_and_missing_forms() {
        assert_eq!(parse_redis_version("redis_version:7.4\r\n"), Some((7, 4, 0)));
        assert_eq!(parse_redis_version("redis_version:7\r\n"), Some((7, 0, 0)));
        assert_eq!(parse_redis_version("# Server\r\nredis_mode:standalone\r\n"), None);
        assert_eq!(parse_redis_version("redis_version:devel\r\n"), None);
    }

    #[test]
    fn test_version_gate_compares_componentwise() {
        assert!(version_supported((2, 6, 0)));
        assert!(version_supported((2, 6, 12)));
        assert!(version_supported((7, 4, 1)));
        assert!(!version_supported((2, 5, 9)));
        assert!(!version_supported((1, 9, 9)));
    }

    #[test]
    fn test_version_gate_error_names_both_versions() {
        let err = CapabilityError::StoreVersionTooOld {
            found: "2.4.16".to_string(),
            required: "2.6.0".to_string(),
            feature: "cache write pipelines".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("2.4.16"));
        assert!(msg.contains("2.6.0"));
    }

    #[test]
    fn test_glob_escape_neutralizes_metacharacters() {
        assert_eq!(glob_escape("app::"), "app::");
        assert_eq!(glob_escape("app::*"), "app::\\*");
        assert_eq!(glob_escape("a?b[c]d\\e"), "a\\?b\\[c\\]d\\\\e");
    }

    #[test]
    fn test_connection_info_maps_tcp_parameters() {
        let params = ConnectionParams::default()
            .with_host("cache.internal")
            .with_port(6380)
            .with_db(3);
        let info = connection_info(&params);
        match info.addr {
            redis::ConnectionAddr::Tcp(host, port) => {
                assert_eq!(host, "cache.internal");
                assert_eq!(port, 6380);
            }
            other => panic!("unexpected addr: {other:?}"),
        }
        assert_eq!(info.redis.db, 3);
    }

    #[test]
    fn test_unix_socket_overrides_host_and_port() {
        let params = ConnectionParams::default().with_unix_socket_path("/run/redis.sock");
        let info = connection_info(&params);
        match info.addr {
            redis::ConnectionAddr::Unix(path) => {
                assert_eq!(path, PathBuf::from("/run/redis.sock"));
            }
            other => panic!("unexpected addr: {other:?}"),
        }
    }

    #[test]
    fn test_store_reports_its_kind_without_connecting() {
        let store = RedisStore::new(ConnectionParams::default());
        assert_eq!(store.kind(), "redis");
        assert!(format!("{store:?}").contains("connected: false"));
    }
}
