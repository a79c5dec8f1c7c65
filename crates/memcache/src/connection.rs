//! A single TCP connection to one memcached node.

use std::future::Future;
use std::time::Duration;

use forwarder::StoreError;
use tokio::io::{AsyncWriteExt, BufStream};
use tokio::net::TcpStream;
use tracing::debug;

use crate::protocol::{self, Item, ReplyError, StorageCommand, StorageReply};

/// An open connection. Every round trip is bounded by the connection's timeout.
#[derive(Debug)]
pub struct Connection {
    node: String,
    timeout: Duration,
    stream: BufStream<TcpStream>,
}

impl Connection {
    /// Connects to `node` (`host:port`).
    pub async fn connect(node: &str, timeout: Duration) -> Result<Self, StoreError> {
        let stream = tokio::time::timeout(timeout, TcpStream::connect(node))
            .await
            .map_err(|_| unavailable(node, "connect timed out"))?
            .map_err(|e| unavailable(node, e))?;
        stream.set_nodelay(true).map_err(|e| unavailable(node, e))?;
        debug!(node, "Connected to cache node");
        Ok(Self {
            node: node.to_owned(),
            timeout,
            stream: BufStream::new(stream),
        })
    }

    /// Node address this connection talks to.
    pub fn node(&self) -> &str {
        &self.node
    }

    /// `get <key>`: the item, or `None` on a miss.
    pub async fn get(&mut self, key: &str) -> Result<Option<Item>, StoreError> {
        self.retrieve("get", key).await
    }

    /// `gets <key>`: the item with its CAS unique, or `None` on a miss.
    pub async fn gets(&mut self, key: &str) -> Result<Option<Item>, StoreError> {
        self.retrieve("gets", key).await
    }

    /// Runs a storage command and returns the server's verdict.
    pub async fn store(
        &mut self,
        command: StorageCommand,
        key: &str,
        flags: u32,
        exptime: u32,
        data: &[u8],
    ) -> Result<StorageReply, StoreError> {
        let frame = protocol::storage(command, key, flags, exptime, data);
        let stream = &mut self.stream;
        bounded(&self.node, self.timeout, async move {
            send(stream, &frame).await?;
            protocol::read_storage_reply(stream).await
        })
        .await
    }

    /// `config get cluster`: the raw ElastiCache cluster configuration body.
    pub async fn config_get_cluster(&mut self) -> Result<String, StoreError> {
        let stream = &mut self.stream;
        bounded(&self.node, self.timeout, async move {
            send(stream, b"config get cluster\r\n").await?;
            protocol::read_config(stream).await
        })
        .await
    }

    async fn retrieve(&mut self, verb: &str, key: &str) -> Result<Option<Item>, StoreError> {
        let frame = protocol::retrieval(verb, key);
        let stream = &mut self.stream;
        let items = bounded(&self.node, self.timeout, async move {
            send(stream, &frame).await?;
            protocol::read_items(stream).await
        })
        .await?;
        Ok(items.into_iter().find(|item| item.key == key))
    }
}

async fn send(stream: &mut BufStream<TcpStream>, frame: &[u8]) -> Result<(), ReplyError> {
    stream.write_all(frame).await?;
    stream.flush().await?;
    Ok(())
}

/// Runs one round trip under `limit`, attributing I/O failures to `node`.
async fn bounded<T>(
    node: &str,
    limit: Duration,
    round_trip: impl Future<Output = Result<T, ReplyError>>,
) -> Result<T, StoreError> {
    match tokio::time::timeout(limit, round_trip).await {
        Err(_) => Err(unavailable(node, "operation timed out")),
        Ok(Err(ReplyError::Io(e))) => Err(unavailable(node, e)),
        Ok(Err(ReplyError::Store(e))) => Err(e),
        Ok(Ok(value)) => Ok(value),
    }
}

pub(crate) fn unavailable(node: &str, message: impl std::fmt::Display) -> StoreError {
    StoreError::Unavailable {
        node: node.to_owned(),
        message: message.to_string(),
    }
}
