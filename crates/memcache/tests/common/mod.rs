//! In-process memcached stand-in speaking enough of the text protocol for the
//! store adapter: `get`, `gets`, `set`, `add`, `cas`, and `config get cluster`.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};

#[derive(Debug, Clone)]
pub struct StoredItem {
    pub flags: u32,
    pub data: Vec<u8>,
    pub cas: u64,
}

#[derive(Default)]
struct State {
    items: HashMap<String, StoredItem>,
    next_cas: u64,
    /// Number of upcoming `cas` commands to answer with `EXISTS`.
    forced_cas_conflicts: u32,
}

#[derive(Clone)]
pub struct FakeMemcached {
    pub addr: SocketAddr,
    state: Arc<Mutex<State>>,
    cluster_config: Arc<Mutex<Option<String>>>,
}

impl FakeMemcached {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let server = Self {
            addr: listener.local_addr().unwrap(),
            state: Arc::default(),
            cluster_config: Arc::default(),
        };
        let handle = server.clone();
        tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                let handle = handle.clone();
                tokio::spawn(async move { handle.serve(socket).await });
            }
        });
        server
    }

    pub fn node(&self) -> String {
        self.addr.to_string()
    }

    pub fn item(&self, key: &str) -> Option<StoredItem> {
        self.state.lock().unwrap().items.get(key).cloned()
    }

    pub fn insert(&self, key: &str, flags: u32, data: &[u8]) {
        let mut state = self.state.lock().unwrap();
        state.next_cas += 1;
        let cas = state.next_cas;
        state.items.insert(
            key.to_owned(),
            StoredItem {
                flags,
                data: data.to_vec(),
                cas,
            },
        );
    }

    pub fn force_cas_conflicts(&self, count: u32) {
        self.state.lock().unwrap().forced_cas_conflicts = count;
    }

    pub fn set_cluster_config(&self, body: &str) {
        *self.cluster_config.lock().unwrap() = Some(body.to_owned());
    }

    async fn serve(&self, socket: TcpStream) {
        let (read, mut write) = socket.into_split();
        let mut reader = BufReader::new(read);
        loop {
            let mut line = String::new();
            if reader.read_line(&mut line).await.unwrap_or(0) == 0 {
                return;
            }
            let parts: Vec<&str> = line.trim_end().split(' ').collect();
            let reply = match parts.as_slice() {
                ["get", key] => self.retrieve(key, false),
                ["gets", key] => self.retrieve(key, true),
                ["config", "get", "cluster"] => self.config_reply(),
                [verb @ ("set" | "add" | "cas"), key, flags, _exptime, len, rest @ ..] => {
                    let len: usize = len.parse().unwrap();
                    let mut data = vec![0u8; len + 2];
                    if reader.read_exact(&mut data).await.is_err() {
                        return;
                    }
                    data.truncate(len);
                    let unique = rest.first().map(|c| c.parse::<u64>().unwrap());
                    self.storage(verb, key, flags.parse().unwrap(), data, unique)
                }
                _ => b"ERROR\r\n".to_vec(),
            };
            if write.write_all(&reply).await.is_err() {
                return;
            }
        }
    }

    fn retrieve(&self, key: &str, with_cas: bool) -> Vec<u8> {
        let state = self.state.lock().unwrap();
        let mut reply = Vec::new();
        if let Some(item) = state.items.get(key) {
            let header = if with_cas {
                format!("VALUE {key} {} {} {}\r\n", item.flags, item.data.len(), item.cas)
            } else {
                format!("VALUE {key} {} {}\r\n", item.flags, item.data.len())
            };
            reply.extend_from_slice(header.as_bytes());
            reply.extend_from_slice(&item.data);
            reply.extend_from_slice(b"\r\n");
        }
        reply.extend_from_slice(b"END\r\n");
        reply
    }

    fn storage(&self, verb: &str, key: &str, flags: u32, data: Vec<u8>, unique: Option<u64>) -> Vec<u8> {
        let mut state = self.state.lock().unwrap();
        let existing = state.items.get(key).map(|item| item.cas);
        let verdict: &[u8] = match (verb, existing) {
            ("add", Some(_)) => b"NOT_STORED\r\n",
            ("cas", None) => b"NOT_FOUND\r\n",
            ("cas", Some(_)) if state.forced_cas_conflicts > 0 => {
                state.forced_cas_conflicts -= 1;
                b"EXISTS\r\n"
            }
            ("cas", Some(current)) if Some(current) != unique => b"EXISTS\r\n",
            _ => {
                state.next_cas += 1;
                let cas = state.next_cas;
                state
                    .items
                    .insert(key.to_owned(), StoredItem { flags, data, cas });
                b"STORED\r\n"
            }
        };
        verdict.to_vec()
    }

    fn config_reply(&self) -> Vec<u8> {
        match self.cluster_config.lock().unwrap().as_deref() {
            Some(body) => {
                format!("CONFIG cluster 0 {}\r\n{body}\r\nEND\r\n", body.len()).into_bytes()
            }
            None => b"ERROR\r\n".to_vec(),
        }
    }
}
