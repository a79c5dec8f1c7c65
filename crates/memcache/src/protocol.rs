//! Memcached text protocol: command framing and reply parsing.
//!
//! Parsers read from any [`AsyncBufRead`], so they run unchanged against a
//! TCP stream or an in-memory byte slice.

use forwarder::StoreError;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt};

/// Longest reply line accepted before the connection is considered broken.
const MAX_LINE_LEN: usize = 8 * 1024;

/// Largest data block accepted: memcached's default item size limit.
pub const MAX_BLOCK_LEN: usize = 1024 * 1024;

/// One item from a `get`/`gets` reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Item {
    pub key: String,
    pub flags: u32,
    pub data: Vec<u8>,
    /// Present only in `gets` replies.
    pub cas: Option<u64>,
}

/// Reply to a storage command (`set`, `add`, `cas`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageReply {
    Stored,
    NotStored,
    /// `cas` lost: the item changed since it was read.
    Exists,
    /// `cas` target no longer exists.
    NotFound,
}

/// Storage command verbs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageCommand {
    Set,
    Add,
    Cas(u64),
}

/// Frames a retrieval command (`get` or `gets`).
pub fn retrieval(verb: &str, key: &str) -> Vec<u8> {
    format!("{verb} {key}\r\n").into_bytes()
}

/// Frames a storage command with its data block.
pub fn storage(command: StorageCommand, key: &str, flags: u32, exptime: u32, data: &[u8]) -> Vec<u8> {
    let header = match command {
        StorageCommand::Set => format!("set {key} {flags} {exptime} {}\r\n", data.len()),
        StorageCommand::Add => format!("add {key} {flags} {exptime} {}\r\n", data.len()),
        StorageCommand::Cas(unique) => {
            format!("cas {key} {flags} {exptime} {} {unique}\r\n", data.len())
        }
    };
    let mut frame = header.into_bytes();
    frame.extend_from_slice(data);
    frame.extend_from_slice(b"\r\n");
    frame
}

/// Reads one `\r\n`-terminated line, without the terminator.
pub async fn read_line<R>(reader: &mut R) -> Result<String, std::io::Error>
where
    R: AsyncBufRead + Unpin,
{
    let mut buf = Vec::new();
    let n = (&mut *reader)
        .take(MAX_LINE_LEN as u64)
        .read_until(b'\n', &mut buf)
        .await?;
    if n == 0 {
        return Err(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            "connection closed by server",
        ));
    }
    if !buf.ends_with(b"\r\n") {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            "reply line is not CRLF terminated",
        ));
    }
    buf.truncate(buf.len() - 2);
    String::from_utf8(buf)
        .map_err(|_| std::io::Error::new(std::io::ErrorKind::InvalidData, "reply line is not UTF-8"))
}

/// Reads a `len`-byte data block followed by `\r\n`.
///
/// `len` comes from the server and is rejected above [`MAX_BLOCK_LEN`]
/// before anything is allocated.
pub async fn read_block<R>(reader: &mut R, len: usize) -> Result<Vec<u8>, ReplyError>
where
    R: AsyncBufRead + Unpin,
{
    let framed = len
        .checked_add(2)
        .filter(|_| len <= MAX_BLOCK_LEN)
        .ok_or_else(|| {
            StoreError::Protocol(format!(
                "data block of {len} bytes exceeds the {MAX_BLOCK_LEN} byte limit"
            ))
        })?;
    let mut data = vec![0u8; framed];
    reader.read_exact(&mut data).await?;
    if !data.ends_with(b"\r\n") {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            "data block is not CRLF terminated",
        )
        .into());
    }
    data.truncate(len);
    Ok(data)
}

/// Maps the generic error replies, returning `None` for any other line.
pub fn error_reply(line: &str) -> Option<StoreError> {
    if line == "ERROR" {
        Some(StoreError::Protocol("server does not recognise the command".into()))
    } else if let Some(msg) = line.strip_prefix("CLIENT_ERROR ") {
        Some(StoreError::Protocol(format!("client error: {msg}")))
    } else if let Some(msg) = line.strip_prefix("SERVER_ERROR ") {
        Some(StoreError::Protocol(format!("server error: {msg}")))
    } else {
        None
    }
}

/// Outcome of parsing a reply: I/O failures are kept apart from protocol
/// violations so the caller can attribute them to the node.
#[derive(Debug)]
pub enum ReplyError {
    Io(std::io::Error),
    Store(StoreError),
}

impl From<std::io::Error> for ReplyError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<StoreError> for ReplyError {
    fn from(e: StoreError) -> Self {
        Self::Store(e)
    }
}

/// Reads a `get`/`gets` reply up to and including `END`.
pub async fn read_items<R>(reader: &mut R) -> Result<Vec<Item>, ReplyError>
where
    R: AsyncBufRead + Unpin,
{
    let mut items = Vec::new();
    loop {
        let line = read_line(reader).await?;
        if line == "END" {
            return Ok(items);
        }
        if let Some(err) = error_reply(&line) {
            return Err(err.into());
        }
        let (key, flags, len, cas) = parse_value_header(&line)?;
        let data = read_block(reader, len).await?;
        items.push(Item {
            key,
            flags,
            data,
            cas,
        });
    }
}

fn parse_value_header(line: &str) -> Result<(String, u32, usize, Option<u64>), StoreError> {
    let bad = || StoreError::Protocol(format!("malformed VALUE line '{line}'"));
    let mut parts = line.split(' ');
    if parts.next() != Some("VALUE") {
        return Err(StoreError::Protocol(format!("unexpected reply '{line}'")));
    }
    let key = parts.next().ok_or_else(bad)?.to_owned();
    let flags = parts.next().and_then(|f| f.parse().ok()).ok_or_else(bad)?;
    let len = parts.next().and_then(|l| l.parse().ok()).ok_or_else(bad)?;
    let cas = match parts.next() {
        Some(c) => Some(c.parse().map_err(|_| bad())?),
        None => None,
    };
    if parts.next().is_some() {
        return Err(bad());
    }
    Ok((key, flags, len, cas))
}

/// Reads the single-line reply to a storage command.
pub async fn read_storage_reply<R>(reader: &mut R) -> Result<StorageReply, ReplyError>
where
    R: AsyncBufRead + Unpin,
{
    let line = read_line(reader).await?;
    match line.as_str() {
        "STORED" => Ok(StorageReply::Stored),
        "NOT_STORED" => Ok(StorageReply::NotStored),
        "EXISTS" => Ok(StorageReply::Exists),
        "NOT_FOUND" => Ok(StorageReply::NotFound),
        other => Err(error_reply(other)
            .unwrap_or_else(|| StoreError::Protocol(format!("unexpected storage reply '{other}'")))
            .into()),
    }
}

/// Reads the reply to `config get cluster` and returns the config body.
pub async fn read_config<R>(reader: &mut R) -> Result<String, ReplyError>
where
    R: AsyncBufRead + Unpin,
{
    let line = read_line(reader).await?;
    if let Some(err) = error_reply(&line) {
        return Err(err.into());
    }
    let len = line
        .strip_prefix("CONFIG cluster ")
        .and_then(|rest| rest.split(' ').nth(1))
        .and_then(|l| l.parse::<usize>().ok())
        .ok_or_else(|| StoreError::Protocol(format!("malformed CONFIG line '{line}'")))?;
    let body = read_block(reader, len).await?;
    let end = read_line(reader).await?;
    if end != "END" {
        return Err(StoreError::Protocol(format!("expected END, got '{end}'")).into());
    }
    String::from_utf8(body)
        .map_err(|_| StoreError::Protocol("cluster config is not UTF-8".into()).into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_frames_carry_length_and_terminator() {
        let frame = storage(StorageCommand::Set, "src", 1, 0, b"t1");
        assert_eq!(frame, b"set src 1 0 2\r\nt1\r\n");
        let frame = storage(StorageCommand::Cas(42), "src", 1, 0, b"t2");
        assert_eq!(frame, b"cas src 1 0 2 42\r\nt2\r\n");
    }

    #[tokio::test]
    async fn reads_get_reply_with_one_item() {
        let mut reply: &[u8] = b"VALUE src 1 2\r\nt1\r\nEND\r\n";
        let items = read_items(&mut reply).await.unwrap();
        assert_eq!(
            items,
            vec![Item {
                key: "src".into(),
                flags: 1,
                data: b"t1".to_vec(),
                cas: None,
            }]
        );
    }

    #[tokio::test]
    async fn reads_gets_reply_with_cas_unique() {
        let mut reply: &[u8] = b"VALUE src 2 4 99\r\n\"t1\"\r\nEND\r\n";
        let items = read_items(&mut reply).await.unwrap();
        assert_eq!(items[0].cas, Some(99));
        assert_eq!(items[0].data, b"\"t1\"");
    }

    #[tokio::test]
    async fn data_blocks_may_contain_crlf() {
        let mut reply: &[u8] = b"VALUE k 1 4\r\na\r\nb\r\nEND\r\n";
        let items = read_items(&mut reply).await.unwrap();
        assert_eq!(items[0].data, b"a\r\nb");
    }

    #[tokio::test]
    async fn miss_is_an_empty_item_list() {
        let mut reply: &[u8] = b"END\r\n";
        assert!(read_items(&mut reply).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn server_errors_are_protocol_errors() {
        let mut reply: &[u8] = b"SERVER_ERROR out of memory storing object\r\n";
        match read_storage_reply(&mut reply).await {
            Err(ReplyError::Store(StoreError::Protocol(msg))) => {
                assert!(msg.contains("out of memory"))
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn truncated_reply_is_an_io_error() {
        let mut reply: &[u8] = b"VALUE src 1 10\r\nt1";
        assert!(matches!(read_items(&mut reply).await, Err(ReplyError::Io(_))));
    }

    #[tokio::test]
    async fn oversized_value_length_is_rejected_without_reading() {
        for header in ["VALUE k 1 18446744073709551615", "VALUE k 1 1099511627776", "VALUE k 1 1048577"] {
            let raw = format!("{header}\r\nx\r\nEND\r\n");
            let mut reply = raw.as_bytes();
            match read_items(&mut reply).await {
                Err(ReplyError::Store(StoreError::Protocol(msg))) => assert!(msg.contains("limit")),
                other => panic!("unexpected {other:?} for '{header}'"),
            }
        }
    }

    #[tokio::test]
    async fn oversized_cluster_config_is_rejected() {
        let mut reply: &[u8] = b"CONFIG cluster 0 18446744073709551615\r\nx\r\nEND\r\n";
        assert!(matches!(
            read_config(&mut reply).await,
            Err(ReplyError::Store(StoreError::Protocol(_)))
        ));
    }

    #[tokio::test]
    async fn reads_cluster_config_body() {
        let body = "12\nmyCluster.pc4ldq.0001.use1.cache.amazonaws.com|10.82.235.120|11211\n";
        let raw = format!("CONFIG cluster 0 {}\r\n{body}\r\nEND\r\n", body.len());
        let mut reply = raw.as_bytes();
        assert_eq!(read_config(&mut reply).await.unwrap(), body);
    }
}
