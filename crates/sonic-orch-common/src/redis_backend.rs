//! Redis database backend for SONiC orchestration.
//!
//! - [`RedisTable`]: a [`Table`] over one hash namespace of one database
//! - [`subscribe_config_table`]: initial load plus keyspace-notification
//!   driven updates of a CONFIG_DB table
//! - [`subscribe_notifications`]: messages of a pub/sub notification channel
//!
//! Subscribers push [`RedisEvent`]s into a tokio channel so the daemon can
//! apply them one at a time, in arrival order.

use crate::{FieldValue, KeyOpFieldsValues, Notification, Table, TableError, TableResult};
use log::{debug, info, warn};
use redis::{AsyncCommands, Commands};
use std::collections::HashMap;
use std::sync::Mutex;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_stream::StreamExt;

/// Errors from Redis operations.
#[derive(Error, Debug)]
pub enum RedisBackendError {
    #[error("Redis connection error: {0}")]
    ConnectionError(String),

    #[error("Redis command error: {0}")]
    CommandError(String),

    #[error("Event receiver closed")]
    ReceiverClosed,
}

/// Result type for Redis backend operations.
pub type Result<T> = std::result::Result<T, RedisBackendError>;

/// Redis database selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RedisDb {
    /// COUNTERS_DB (database 2) - counter statistics
    CounterDb = 2,
    /// CONFIG_DB (database 4) - switch configuration
    ConfigDb = 4,
    /// PFC_WD_DB (database 5) - polling registrations for the detector
    PfcWdDb = 5,
}

impl RedisDb {
    /// Key separator between table name and key in this database.
    pub fn separator(&self) -> char {
        match self {
            RedisDb::ConfigDb => '|',
            RedisDb::CounterDb | RedisDb::PfcWdDb => ':',
        }
    }
}

/// Configuration for Redis connection.
#[derive(Debug, Clone)]
pub struct RedisConfig {
    /// Redis server hostname or IP
    pub host: String,
    /// Redis server port
    pub port: u16,
    /// Database selector
    pub db: RedisDb,
}

impl RedisConfig {
    /// Creates a new Redis configuration.
    pub fn new(host: impl Into<String>, port: u16, db: RedisDb) -> Self {
        Self {
            host: host.into(),
            port,
            db,
        }
    }

    /// Creates CONFIG_DB connection config.
    pub fn config_db(host: impl Into<String>, port: u16) -> Self {
        Self::new(host, port, RedisDb::ConfigDb)
    }

    /// Creates COUNTERS_DB connection config.
    pub fn counter_db(host: impl Into<String>, port: u16) -> Self {
        Self::new(host, port, RedisDb::CounterDb)
    }

    /// Creates PFC_WD_DB connection config.
    pub fn pfc_wd_db(host: impl Into<String>, port: u16) -> Self {
        Self::new(host, port, RedisDb::PfcWdDb)
    }

    /// Returns the Redis connection URI.
    fn uri(&self) -> String {
        format!("redis://{}:{}/{}", self.host, self.port, self.db as u8)
    }

    fn client(&self) -> Result<redis::Client> {
        let uri = self.uri();
        redis::Client::open(uri.clone())
            .map_err(|e| RedisBackendError::ConnectionError(format!("{}: {}", uri, e)))
    }
}

/// Something a subscriber observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RedisEvent {
    /// Records of a configuration table.
    Table {
        table: String,
        entries: Vec<KeyOpFieldsValues>,
    },
    /// A message on a notification channel.
    Notification {
        channel: String,
        notification: Notification,
    },
}

/// A [`Table`] stored as Redis hashes named `<table><sep><key>`.
pub struct RedisTable {
    name: String,
    separator: char,
    connection: Mutex<redis::Connection>,
}

impl RedisTable {
    /// Opens a blocking connection for table access.
    pub fn connect(config: &RedisConfig, name: impl Into<String>) -> Result<Self> {
        let connection = config.client()?.get_connection().map_err(|e| {
            RedisBackendError::ConnectionError(format!("{}: {}", config.uri(), e))
        })?;
        let name = name.into();

        info!(
            "Opened table {} on Redis {} (db={})",
            name, config.host, config.db as u8
        );

        Ok(Self {
            name,
            separator: config.db.separator(),
            connection: Mutex::new(connection),
        })
    }

    fn redis_key(&self, key: &str) -> String {
        format!("{}{}{}", self.name, self.separator, key)
    }

    fn with_connection<T>(
        &self,
        op: &str,
        f: impl FnOnce(&mut redis::Connection) -> redis::RedisResult<T>,
    ) -> TableResult<T> {
        let mut connection = self
            .connection
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut connection).map_err(|e| TableError::backend(&self.name, format!("{} failed: {}", op, e)))
    }
}

impl Table for RedisTable {
    fn name(&self) -> &str {
        &self.name
    }

    fn get(&self, key: &str) -> TableResult<Option<Vec<FieldValue>>> {
        let redis_key = self.redis_key(key);
        let fvs: HashMap<String, String> =
            self.with_connection("HGETALL", |c| c.hgetall(&redis_key))?;
        if fvs.is_empty() {
            return Ok(None);
        }
        let mut fvs: Vec<FieldValue> = fvs.into_iter().collect();
        fvs.sort();
        Ok(Some(fvs))
    }

    fn set(&self, key: &str, fvs: &[FieldValue]) -> TableResult<()> {
        if fvs.is_empty() {
            return Ok(());
        }
        let redis_key = self.redis_key(key);
        self.with_connection("HSET", |c| c.hset_multiple::<_, _, _, ()>(&redis_key, fvs))
    }

    fn del(&self, key: &str) -> TableResult<()> {
        let redis_key = self.redis_key(key);
        self.with_connection("DEL", |c| c.del::<_, ()>(&redis_key))
    }

    fn keys(&self) -> TableResult<Vec<String>> {
        let pattern = format!("{}{}*", self.name, self.separator);
        let prefix_len = self.name.len() + self.separator.len_utf8();
        let keys: Vec<String> = self.with_connection("KEYS", |c| c.keys(&pattern))?;
        Ok(keys.into_iter().map(|k| k[prefix_len..].to_string()).collect())
    }
}

/// Streams a CONFIG_DB table: every existing record as one batch of SETs,
/// then one record per keyspace notification (`hset` → SET with the full
/// record, `del` → DEL).
///
/// Requires keyspace notifications to be enabled on the server
/// (`notify-keyspace-events` including `Kh` and `Kg`).
pub async fn subscribe_config_table<E>(
    config: RedisConfig,
    table: String,
    tx: mpsc::Sender<E>,
) -> Result<()>
where
    E: From<RedisEvent> + Send + 'static,
{
    let client = config.client()?;
    let separator = config.db.separator();
    let db_index = config.db as u8;

    let mut pubsub = client
        .get_async_pubsub()
        .await
        .map_err(|e| RedisBackendError::ConnectionError(e.to_string()))?;
    let keyspace_prefix = format!("__keyspace@{}__:{}{}", db_index, table, separator);
    pubsub
        .psubscribe(format!("{}*", keyspace_prefix))
        .await
        .map_err(|e| RedisBackendError::CommandError(format!("PSUBSCRIBE failed: {}", e)))?;

    let mut connection = client
        .get_multiplexed_async_connection()
        .await
        .map_err(|e| RedisBackendError::ConnectionError(e.to_string()))?;

    let initial = read_table(&mut connection, &table, separator).await?;
    info!("Loaded {} records from {}", initial.len(), table);
    if !initial.is_empty() {
        send(&tx, RedisEvent::Table {
            table: table.clone(),
            entries: initial,
        })
        .await?;
    }

    let mut messages = pubsub.on_message();
    while let Some(msg) = messages.next().await {
        let channel = msg.get_channel_name().to_string();
        let Some(key) = channel.strip_prefix(&keyspace_prefix) else {
            continue;
        };
        let command: String = match msg.get_payload() {
            Ok(command) => command,
            Err(e) => {
                warn!("Undecodable keyspace event on {}: {}", channel, e);
                continue;
            }
        };
        debug!("Keyspace event {} on {}{}{}", command, table, separator, key);

        let entry = match command.as_str() {
            "del" => KeyOpFieldsValues::del(key),
            "hset" | "hdel" => {
                let redis_key = format!("{}{}{}", table, separator, key);
                let fvs: HashMap<String, String> =
                    connection.hgetall(&redis_key).await.map_err(|e| {
                        RedisBackendError::CommandError(format!("HGETALL failed: {}", e))
                    })?;
                if fvs.is_empty() {
                    KeyOpFieldsValues::del(key)
                } else {
                    let mut fvs: Vec<FieldValue> = fvs.into_iter().collect();
                    fvs.sort();
                    KeyOpFieldsValues::set(key, fvs)
                }
            }
            _ => continue,
        };

        send(&tx, RedisEvent::Table {
            table: table.clone(),
            entries: vec![entry],
        })
        .await?;
    }

    Err(RedisBackendError::ConnectionError(format!(
        "subscription to {} closed",
        table
    )))
}

/// Streams messages published on `channel`. Malformed messages are logged
/// and skipped.
pub async fn subscribe_notifications<E>(
    config: RedisConfig,
    channel: String,
    tx: mpsc::Sender<E>,
) -> Result<()>
where
    E: From<RedisEvent> + Send + 'static,
{
    let mut pubsub = config
        .client()?
        .get_async_pubsub()
        .await
        .map_err(|e| RedisBackendError::ConnectionError(e.to_string()))?;
    pubsub
        .subscribe(&channel)
        .await
        .map_err(|e| RedisBackendError::CommandError(format!("SUBSCRIBE failed: {}", e)))?;
    info!("Subscribed to notification channel {}", channel);

    let mut messages = pubsub.on_message();
    while let Some(msg) = messages.next().await {
        let payload: String = match msg.get_payload() {
            Ok(payload) => payload,
            Err(e) => {
                warn!("Undecodable message on {}: {}", channel, e);
                continue;
            }
        };
        match Notification::from_json(&payload) {
            Ok(notification) => {
                send(&tx, RedisEvent::Notification {
                    channel: channel.clone(),
                    notification,
                })
                .await?
            }
            Err(e) => warn!("Dropping message on {}: {}", channel, e),
        }
    }

    Err(RedisBackendError::ConnectionError(format!(
        "subscription to {} closed",
        channel
    )))
}

async fn read_table(
    connection: &mut redis::aio::MultiplexedConnection,
    table: &str,
    separator: char,
) -> Result<Vec<KeyOpFieldsValues>> {
    let prefix = format!("{}{}", table, separator);
    let mut keys: Vec<String> = connection
        .keys(format!("{}*", prefix))
        .await
        .map_err(|e| RedisBackendError::CommandError(format!("KEYS failed: {}", e)))?;
    keys.sort();

    let mut entries = Vec::with_capacity(keys.len());
    for key in keys {
        let fvs: HashMap<String, String> = connection
            .hgetall(&key)
            .await
            .map_err(|e| RedisBackendError::CommandError(format!("HGETALL failed: {}", e)))?;
        let mut fvs: Vec<FieldValue> = fvs.into_iter().collect();
        fvs.sort();
        entries.push(KeyOpFieldsValues::set(&key[prefix.len()..], fvs));
    }
    Ok(entries)
}

async fn send<E: From<RedisEvent>>(tx: &mpsc::Sender<E>, event: RedisEvent) -> Result<()> {
    tx.send(E::from(event))
        .await
        .map_err(|_| RedisBackendError::ReceiverClosed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redis_config() {
        let config = RedisConfig::config_db("127.0.0.1", 6379);
        assert_eq!(config.db, RedisDb::ConfigDb);
        assert_eq!(config.uri(), "redis://127.0.0.1:6379/4");

        let config = RedisConfig::pfc_wd_db("127.0.0.1", 6379);
        assert_eq!(config.uri(), "redis://127.0.0.1:6379/5");
    }

    #[test]
    fn test_separators() {
        assert_eq!(RedisDb::ConfigDb.separator(), '|');
        assert_eq!(RedisDb::CounterDb.separator(), ':');
        assert_eq!(RedisDb::PfcWdDb.separator(), ':');
    }

    #[tokio::test]
    async fn test_send_reports_closed_receiver() {
        let (tx, rx) = mpsc::channel::<RedisEvent>(1);
        drop(rx);
        let result = send(
            &tx,
            RedisEvent::Notification {
                channel: "PFC_WD".to_string(),
                notification: Notification::new("oid:0x1", "storm", vec![]),
            },
        )
        .await;
        assert!(matches!(result, Err(RedisBackendError::ReceiverClosed)));
    }
}
