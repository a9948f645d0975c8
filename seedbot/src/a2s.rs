//! Thin UDP adapter for the Source server query protocol (A2S).
//!
//! Only what the monitor needs: info, rules and players, with the challenge
//! handshake and split-packet reassembly. Compressed split replies are
//! rejected.

use std::collections::BTreeMap;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;

use tokio::net::UdpSocket;
use tokio::time::timeout;
use tracing::debug;

use crate::error::QueryError;
use crate::query::{QueryClient, Rules, ServerInfo};

const SINGLE_PACKET: i32 = -1;
const SPLIT_PACKET: i32 = -2;
const MAX_PACKET: usize = 1400;
const MAX_CHALLENGES: usize = 3;

const HEADER: [u8; 4] = [0xFF; 4];
const CHALLENGE_REPLY: u8 = 0x41;
const INFO_REQUEST: u8 = 0x54;
const INFO_REPLY: u8 = 0x49;
const PLAYER_REQUEST: u8 = 0x55;
const PLAYER_REPLY: u8 = 0x44;
const RULES_REQUEST: u8 = 0x56;
const RULES_REPLY: u8 = 0x45;

/// Query client for one server address (`host:port`).
#[derive(Debug, Clone)]
pub struct A2sClient {
    address: String,
    timeout: Duration,
}

impl A2sClient {
    pub fn new(address: impl Into<String>, timeout: Duration) -> Self {
        Self {
            address: address.into(),
            timeout,
        }
    }

    async fn connect(&self) -> Result<UdpSocket, QueryError> {
        let target = tokio::net::lookup_host(&self.address)
            .await?
            .next()
            .ok_or_else(|| QueryError::Malformed(format!("no address for {}", self.address)))?;
        let local: SocketAddr = match target {
            SocketAddr::V4(_) => (Ipv4Addr::UNSPECIFIED, 0).into(),
            SocketAddr::V6(_) => (Ipv6Addr::UNSPECIFIED, 0).into(),
        };
        let socket = UdpSocket::bind(local).await?;
        socket.connect(target).await?;
        Ok(socket)
    }

    /// Send `kind` (+ challenge) and follow challenge replies until the
    /// expected reply arrives. Returns the payload after the reply type byte.
    async fn query(
        &self,
        base: &[u8],
        initial_challenge: Option<[u8; 4]>,
        expected: u8,
    ) -> Result<Vec<u8>, QueryError> {
        let socket = self.connect().await?;
        let mut request = base.to_vec();
        if let Some(challenge) = initial_challenge {
            request.extend_from_slice(&challenge);
        }

        for _ in 0..MAX_CHALLENGES {
            socket.send(&request).await.map_err(QueryError::Transport)?;
            let reply = self.receive(&socket).await?;
            match reply.split_first() {
                Some((&CHALLENGE_REPLY, rest)) => {
                    let challenge = rest
                        .get(..4)
                        .ok_or_else(|| QueryError::Malformed("short challenge".to_string()))?;
                    request.truncate(base.len());
                    request.extend_from_slice(challenge);
                }
                Some((&kind, rest)) if kind == expected => return Ok(rest.to_vec()),
                Some((&kind, _)) => {
                    return Err(QueryError::Malformed(format!(
                        "unexpected reply type 0x{kind:02x}"
                    )));
                }
                None => return Err(QueryError::Malformed("empty reply".to_string())),
            }
        }
        Err(QueryError::Malformed("too many challenges".to_string()))
    }

    /// Receive one logical reply, reassembling split packets. The leading
    /// 0xFFFFFFFF header is stripped.
    async fn receive(&self, socket: &UdpSocket) -> Result<Vec<u8>, QueryError> {
        let mut split = SplitReply::default();
        loop {
            let mut buf = vec![0u8; MAX_PACKET];
            let n = timeout(self.timeout, socket.recv(&mut buf))
                .await
                .map_err(|_| QueryError::Timeout)??;
            buf.truncate(n);

            let mut reader = Reader::new(&buf);
            match reader.i32()? {
                SINGLE_PACKET => return Ok(reader.rest().to_vec()),
                SPLIT_PACKET => {
                    let Some(joined) = split.accept(&mut reader)? else {
                        continue;
                    };
                    let mut reader = Reader::new(&joined);
                    if reader.i32()? != SINGLE_PACKET {
                        return Err(QueryError::Malformed(
                            "bad reassembled header".to_string(),
                        ));
                    }
                    return Ok(reader.rest().to_vec());
                }
                other => {
                    return Err(QueryError::Malformed(format!(
                        "unknown packet header {other}"
                    )));
                }
            }
        }
    }
}

/// Parts of one split reply, keyed by packet number.
#[derive(Debug, Default)]
struct SplitReply {
    id: Option<i32>,
    total: u8,
    parts: BTreeMap<u8, Vec<u8>>,
}

impl SplitReply {
    /// Take one split packet, positioned after its header. Returns the joined
    /// payload once every part has arrived. Parts of another reply are dropped.
    fn accept(&mut self, reader: &mut Reader<'_>) -> Result<Option<Vec<u8>>, QueryError> {
        let id = reader.i32()?;
        if (id as u32) & 0x8000_0000 != 0 {
            return Err(QueryError::Malformed("compressed split reply".to_string()));
        }
        let total = reader.u8()?;
        let number = reader.u8()?;
        let _size = reader.u16()?;
        if number >= total {
            return Err(QueryError::Malformed(format!(
                "split packet {number} of {total}"
            )));
        }

        match self.id {
            None => {
                self.id = Some(id);
                self.total = total;
            }
            Some(current) if current != id => {
                debug!(expected = current, got = id, "dropping stray split packet");
                return Ok(None);
            }
            Some(_) if total != self.total => {
                return Err(QueryError::Malformed(format!(
                    "split packet count changed from {} to {total}",
                    self.total
                )));
            }
            Some(_) => {}
        }

        self.parts.insert(number, reader.rest().to_vec());
        if self.parts.len() < usize::from(self.total) {
            return Ok(None);
        }
        Ok(Some(
            std::mem::take(&mut self.parts)
                .into_values()
                .flatten()
                .collect(),
        ))
    }
}

impl QueryClient for A2sClient {
    async fn query_info(&self) -> Result<ServerInfo, QueryError> {
        let mut base = HEADER.to_vec();
        base.push(INFO_REQUEST);
        base.extend_from_slice(b"Source Engine Query\0");
        let payload = self.query(&base, None, INFO_REPLY).await?;
        parse_info(&payload)
    }

    async fn query_rules(&self) -> Result<Rules, QueryError> {
        let mut base = HEADER.to_vec();
        base.push(RULES_REQUEST);
        let payload = self.query(&base, Some(HEADER), RULES_REPLY).await?;
        parse_rules(&payload)
    }

    async fn query_players(&self) -> Result<Vec<String>, QueryError> {
        let mut base = HEADER.to_vec();
        base.push(PLAYER_REQUEST);
        let payload = self.query(&base, Some(HEADER), PLAYER_REPLY).await?;
        parse_players(&payload)
    }
}

fn parse_info(payload: &[u8]) -> Result<ServerInfo, QueryError> {
    let mut reader = Reader::new(payload);
    let _protocol = reader.u8()?;
    let name = reader.cstring()?;
    let map = reader.cstring()?;
    let _folder = reader.cstring()?;
    let _game = reader.cstring()?;
    let _app_id = reader.u16()?;
    let players = reader.u8()?;
    let max_players = reader.u8()?;
    Ok(ServerInfo {
        name,
        map,
        players,
        max_players,
    })
}

fn parse_players(payload: &[u8]) -> Result<Vec<String>, QueryError> {
    let mut reader = Reader::new(payload);
    let count = reader.u8()?;
    let mut players = Vec::with_capacity(usize::from(count));
    // Some servers announce more players than they send
    while players.len() < usize::from(count) && !reader.is_empty() {
        let _index = reader.u8()?;
        let name = reader.cstring()?;
        let _score = reader.i32()?;
        let _duration = reader.f32()?;
        players.push(name);
    }
    Ok(players)
}

fn parse_rules(payload: &[u8]) -> Result<Rules, QueryError> {
    let mut reader = Reader::new(payload);
    let count = reader.u16()?;
    let mut rules = Rules::with_capacity(usize::from(count));
    while rules.len() < usize::from(count) && !reader.is_empty() {
        let key = reader.cstring()?;
        let value = reader.cstring()?;
        rules.insert(key, value);
    }
    Ok(rules)
}

/// Little-endian cursor over a reply payload.
struct Reader<'a> {
    buf: &'a [u8],
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf }
    }

    fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    fn rest(&self) -> &'a [u8] {
        self.buf
    }

    fn take<const N: usize>(&mut self) -> Result<[u8; N], QueryError> {
        let (head, tail) = self
            .buf
            .split_first_chunk::<N>()
            .ok_or_else(|| QueryError::Malformed("truncated reply".to_string()))?;
        self.buf = tail;
        Ok(*head)
    }

    fn u8(&mut self) -> Result<u8, QueryError> {
        Ok(self.take::<1>()?[0])
    }

    fn u16(&mut self) -> Result<u16, QueryError> {
        Ok(u16::from_le_bytes(self.take()?))
    }

    fn i32(&mut self) -> Result<i32, QueryError> {
        Ok(i32::from_le_bytes(self.take()?))
    }

    fn f32(&mut self) -> Result<f32, QueryError> {
        Ok(f32::from_le_bytes(self.take()?))
    }

    fn cstring(&mut self) -> Result<String, QueryError> {
        let end = self
            .buf
            .iter()
            .position(|&b| b == 0)
            .ok_or_else(|| QueryError::Malformed("unterminated string".to_string()))?;
        let value = String::from_utf8_lossy(&self.buf[..end]).into_owned();
        self.buf = &self.buf[end + 1..];
        Ok(value)
    }
}
