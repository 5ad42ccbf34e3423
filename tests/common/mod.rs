//! Loopback fixtures: torrents built in memory, simulated peers and a minimal
//! HTTP tracker, all served from `127.0.0.1` on ephemeral ports.

#![allow(dead_code)]

use leech::bencode::Value;
use leech::handshake::{Handshake, HANDSHAKE_LEN};
use leech::message::*;
use leech::torrent::{parse_torrent_file, InfoHash};
use leech::{Metainfo, Peer};

use byteorder::{BigEndian, WriteBytesExt};
use sha1::{Digest, Sha1};

use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

pub const SEEDER_ID: [u8; 20] = *b"-SD0001-000000000000";

/// Deterministic, non-repeating-looking content.
pub fn content(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 31 % 251) as u8).collect()
}

pub fn torrent_bytes(announce: &str, content: &[u8], piece_length: usize) -> Vec<u8> {
    let pieces: Vec<u8> = content
        .chunks(piece_length)
        .flat_map(|piece| {
            let mut hasher = Sha1::new();
            hasher.update(piece);
            <[u8; 20]>::from(hasher.finalize())
        })
        .collect();

    Value::dict()
        .insert("announce", Value::string(announce))
        .insert(
            "info",
            Value::dict()
                .insert("length", Value::Integer(content.len() as i64))
                .insert("name", Value::string("sample.bin"))
                .insert("piece length", Value::Integer(piece_length as i64))
                .insert("pieces", Value::Bytes(pieces)),
        )
        .encode()
}

pub fn torrent(announce: &str, content: &[u8], piece_length: usize) -> Metainfo {
    parse_torrent_file(&torrent_bytes(announce, content, piece_length)).unwrap()
}

fn bind() -> (TcpListener, Peer) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let peer = match listener.local_addr().unwrap() {
        SocketAddr::V4(addr) => Peer::from(addr),
        SocketAddr::V6(_) => unreachable!("bound to an IPv4 address"),
    };
    (listener, peer)
}

/// Behaviour of a simulated peer once the connection is accepted.
#[derive(Clone, Copy, Debug)]
pub enum Behavior {
    /// Full protocol, serves the real content
    Seed,
    /// Full protocol, serves every block with its bits flipped
    Corrupt,
    /// Closes the connection without answering
    Hangup,
}

/// A peer served from a background thread, one thread per connection.
pub struct SimulatedPeer {
    pub peer: Peer,
    connections: Arc<AtomicUsize>,
}

impl SimulatedPeer {
    pub fn spawn(
        behavior: Behavior,
        info_hash: InfoHash,
        content: Vec<u8>,
        piece_length: usize,
    ) -> Self {
        let (listener, peer) = bind();
        let connections = Arc::new(AtomicUsize::new(0));
        let content = Arc::new(content);

        let counter = Arc::clone(&connections);
        thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(stream) = stream else { break };
                counter.fetch_add(1, Ordering::SeqCst);
                let content = Arc::clone(&content);
                thread::spawn(move || {
                    let _ = serve(stream, behavior, info_hash, &content, piece_length);
                });
            }
        });

        SimulatedPeer { peer, connections }
    }

    /// Connections accepted so far.
    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    /// Wait until `expected` connections were accepted, or give up after 5s.
    pub fn wait_for_connections(&self, expected: usize) -> usize {
        let deadline = Instant::now() + Duration::from_secs(5);
        while self.connections() < expected && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }
        // Leave room for unexpected extra connections to show up
        thread::sleep(Duration::from_millis(100));
        self.connections()
    }
}

fn serve(
    mut stream: TcpStream,
    behavior: Behavior,
    info_hash: InfoHash,
    content: &[u8],
    piece_length: usize,
) -> leech::Result<()> {
    if let Behavior::Hangup = behavior {
        return Ok(());
    }

    let mut handshake = [0; HANDSHAKE_LEN];
    stream.read_exact(&mut handshake)?;
    stream.write_all(&Handshake::new(SEEDER_ID, info_hash).serialize())?;

    let pieces = content.len().div_ceil(piece_length);
    let bitfield = vec![0xff; pieces.div_ceil(8)];
    write_message(&mut stream, &Message::new_with_payload(MESSAGE_BITFIELD, bitfield))?;
    // Exercise keep-alive handling on the client side
    stream.write_all(&[0, 0, 0, 0])?;

    loop {
        let Some(message) = read_message(&mut stream)? else {
            continue;
        };
        match message.id {
            MESSAGE_INTERESTED => write_message(&mut stream, &Message::new(MESSAGE_UNCHOKE))?,
            MESSAGE_REQUEST => {
                let (index, begin, length) = message.parse_request()?;
                let start = index as usize * piece_length + begin as usize;
                let mut block = content[start..start + length as usize].to_vec();
                if let Behavior::Corrupt = behavior {
                    block.iter_mut().for_each(|b| *b = !*b);
                }

                let mut payload = vec![];
                payload.write_u32::<BigEndian>(index)?;
                payload.write_u32::<BigEndian>(begin)?;
                payload.extend_from_slice(&block);
                write_message(&mut stream, &Message::new_with_payload(MESSAGE_PIECE, payload))?;
            }
            _ => {}
        }
    }
}

/// A tracker answering every announce with the same bencoded body.
pub struct SimulatedTracker {
    pub url: String,
    requests: Arc<Mutex<Vec<String>>>,
}

impl SimulatedTracker {
    pub fn spawn(body: Vec<u8>) -> Self {
        SimulatedTracker::spawn_with_status("200 OK", body)
    }

    /// Answer with another status line, e.g. `400 Bad Request`.
    pub fn spawn_with_status(status: &str, body: Vec<u8>) -> Self {
        let status = status.to_string();
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("http://{}/announce", listener.local_addr().unwrap());
        let requests = Arc::new(Mutex::new(vec![]));

        let seen = Arc::clone(&requests);
        thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(mut stream) = stream else { break };
                if let Some(request_line) = read_request_line(&mut stream) {
                    seen.lock().unwrap().push(request_line);
                }
                let mut response = format!(
                    "HTTP/1.1 {}\r\nContent-Type: text/plain\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                    status,
                    body.len()
                )
                .into_bytes();
                response.extend_from_slice(&body);
                let _ = stream.write_all(&response);
            }
        });

        SimulatedTracker { url, requests }
    }

    /// Request lines received so far, e.g. `GET /announce?... HTTP/1.1`.
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }
}

/// Read the request head and return its first line.
fn read_request_line(stream: &mut TcpStream) -> Option<String> {
    let mut head = vec![];
    let mut byte = [0; 1];
    while !head.ends_with(b"\r\n\r\n") {
        stream.read_exact(&mut byte).ok()?;
        head.push(byte[0]);
    }
    let head = String::from_utf8_lossy(&head).into_owned();
    head.lines().next().map(String::from)
}

/// Bencoded announce response listing `peers`.
pub fn announce_response(peers: &[Peer]) -> Vec<u8> {
    let mut compact = vec![];
    for peer in peers {
        compact.extend_from_slice(&peer.ip.octets());
        compact.extend_from_slice(&peer.port.to_be_bytes());
    }
    Value::dict()
        .insert("interval", Value::Integer(60))
        .insert("peers", Value::Bytes(compact))
        .encode()
}
