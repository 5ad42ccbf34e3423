//! # HTTP Tracker Client
//!
//! Announces the client to the torrent's tracker and returns the peers it
//! lists. One announce is a single HTTP GET with the query parameters:
//!
//! | Parameter | Value |
//! |-----------|-------|
//! | info_hash | raw 20-byte info hash, percent-encoded |
//! | peer_id | configured 20-byte client id, percent-encoded |
//! | port | configured listening port |
//! | uploaded / downloaded | 0 |
//! | left | total length of the torrent |
//! | compact | 1 |
//!
//! The response body is a bencoded dictionary carrying either `peers` (compact
//! peer list) or `failure reason`.

use crate::bencode::{self, Value};
use crate::config::ClientConfig;
use crate::error::{Error, Result};
use crate::peer::{build_peers, Peer};
use crate::torrent::Metainfo;

use url::Url;

use std::time::Duration;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Talks to the HTTP tracker of one torrent.
pub struct TrackerClient {
    config: ClientConfig,
    http: reqwest::blocking::Client,
}

impl TrackerClient {
    pub fn new(config: ClientConfig) -> Result<TrackerClient> {
        let http = reqwest::blocking::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(TrackerClient { config, http })
    }

    /// Use a preconfigured HTTP client (proxy, TLS or timeout settings).
    pub fn with_http_client(
        config: ClientConfig,
        http: reqwest::blocking::Client,
    ) -> TrackerClient {
        TrackerClient { config, http }
    }

    /// Request peers from the tracker.
    ///
    /// # Errors
    ///
    /// - [`Error::TrackerFailure`] when the tracker rejects the announce
    /// - [`Error::TrackerProtocol`] when the response is not a valid announce
    ///   response, including error statuses without a bencoded body
    /// - [`Error::Http`] when the request itself fails
    ///
    /// The body is decoded whatever the HTTP status, so a `failure reason` sent
    /// with a 4xx or 5xx status still surfaces as [`Error::TrackerFailure`].
    pub fn announce(&self, metainfo: &Metainfo) -> Result<Vec<Peer>> {
        let url = build_tracker_url(metainfo, &self.config)?;
        debug!("Announcing to {}", metainfo.announce());

        let response = self.http.get(url).send()?;
        let status = response.status();
        let body = response.bytes()?;

        let peers = match parse_tracker_response(&body) {
            Err(Error::TrackerProtocol(reason)) if !status.is_success() => {
                return Err(Error::TrackerProtocol(format!(
                    "tracker answered {}: {}",
                    status, reason
                )));
            }
            result => result?,
        };
        info!("Tracker returned {} peers", peers.len());

        Ok(peers)
    }
}

/// Announce with a one-off client.
pub fn announce(metainfo: &Metainfo, config: &ClientConfig) -> Result<Vec<Peer>> {
    TrackerClient::new(config.clone())?.announce(metainfo)
}

/// Build tracker URL.
///
/// The query string is built by hand: `info_hash` and `peer_id` are binary and
/// must be percent-encoded byte by byte, not as UTF-8 text.
pub fn build_tracker_url(metainfo: &Metainfo, config: &ClientConfig) -> Result<String> {
    let base_url = Url::parse(metainfo.announce()).map_err(|e| {
        Error::InvalidTorrentFile(format!(
            "could not parse tracker url {:?}: {}",
            metainfo.announce(),
            e
        ))
    })?;

    let query = format!(
        "info_hash={}&peer_id={}&port={}&uploaded=0&downloaded=0&left={}&compact=1",
        percent_encode_binary(metainfo.info_hash()),
        percent_encode_binary(&config.peer_id),
        config.port,
        metainfo.length()
    );

    let mut url = base_url.to_string();
    if url.contains('?') {
        url.push('&');
    } else {
        url.push('?');
    }
    url.push_str(&query);

    Ok(url)
}

/// Each byte is encoded as %XX where XX is the hexadecimal representation
fn percent_encode_binary(data: &[u8]) -> String {
    const HEX_DIGITS: &[u8] = b"0123456789ABCDEF";
    let mut encoded = String::with_capacity(data.len() * 3);

    for &byte in data {
        encoded.push('%');
        encoded.push(HEX_DIGITS[(byte >> 4) as usize] as char);
        encoded.push(HEX_DIGITS[(byte & 0x0F) as usize] as char);
    }

    encoded
}

/// Decode a bencoded announce response into its peer list.
pub fn parse_tracker_response(body: &[u8]) -> Result<Vec<Peer>> {
    let (response, _) = bencode::decode(body).map_err(|e| {
        Error::TrackerProtocol(format!("response is not bencode: {}", e))
    })?;

    if response.as_dict().is_none() {
        return Err(Error::TrackerProtocol(
            "response is not a dictionary".to_string(),
        ));
    }

    if let Some(reason) = response.get("failure reason").and_then(Value::as_bytes) {
        return Err(Error::TrackerFailure(
            String::from_utf8_lossy(reason).into_owned(),
        ));
    }

    match response.get("peers").and_then(Value::as_bytes) {
        Some(peers) => build_peers(peers),
        None => Err(Error::TrackerProtocol(
            "response has neither 'peers' nor 'failure reason'".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::torrent::parse_torrent_file;

    fn metainfo(announce: &str) -> Metainfo {
        let buf = Value::dict()
            .insert("announce", Value::string(announce))
            .insert(
                "info",
                Value::dict()
                    .insert("length", Value::Integer(20000))
                    .insert("piece length", Value::Integer(16384))
                    .insert("pieces", Value::Bytes(vec![0; 40])),
            )
            .encode();
        parse_torrent_file(&buf).unwrap()
    }

    #[test]
    fn percent_encodes_every_byte() {
        assert_eq!(percent_encode_binary(&[0x00, 0xab, b'A']), "%00%AB%41");
    }

    #[test]
    fn tracker_url_carries_announce_parameters() {
        let metainfo = metainfo("http://tracker.test/announce");
        let config = ClientConfig::default().with_port(7000);
        let url = build_tracker_url(&metainfo, &config).unwrap();

        let info_hash = percent_encode_binary(metainfo.info_hash());
        assert!(url.starts_with("http://tracker.test/announce?info_hash="));
        assert!(url.contains(&format!("info_hash={}", info_hash)));
        assert!(url.contains("peer_id=%30%30%31%31"));
        assert!(url.contains("&port=7000&uploaded=0&downloaded=0&left=20000&compact=1"));
    }

    #[test]
    fn tracker_url_keeps_existing_query() {
        let metainfo = metainfo("http://tracker.test/announce?key=abc");
        let url = build_tracker_url(&metainfo, &ClientConfig::default()).unwrap();
        assert!(url.starts_with("http://tracker.test/announce?key=abc&info_hash="));
    }

    #[test]
    fn unparsable_announce_url_is_rejected() {
        let metainfo = metainfo("not a url");
        assert!(build_tracker_url(&metainfo, &ClientConfig::default()).is_err());
    }

    #[test]
    fn parses_compact_peers() {
        let body = b"d8:intervali60e5:peers12:\x7f\x00\x00\x01\x1a\xe1\x0a\x00\x00\x02\x00\x50e";
        let peers = parse_tracker_response(body).unwrap();
        assert_eq!(peers.len(), 2);
        assert_eq!(peers[0].to_string(), "127.0.0.1:6881");
        assert_eq!(peers[1].to_string(), "10.0.0.2:80");
    }

    #[test]
    fn failure_reason_is_reported() {
        match parse_tracker_response(b"d14:failure reason12:unregisterede") {
            Err(Error::TrackerFailure(reason)) => assert_eq!(reason, "unregistered"),
            other => panic!("expected TrackerFailure, got {:?}", other),
        }
    }

    #[test]
    fn malformed_responses_are_protocol_errors() {
        for body in [
            &b"d8:intervali60ee"[..],
            &b"d5:peers5:abcdee"[..],
            &b"d5:peersi1ee"[..],
            &b"le"[..],
            &b"<html>"[..],
        ] {
            assert!(
                matches!(parse_tracker_response(body), Err(Error::TrackerProtocol(_))),
                "body {:?}",
                String::from_utf8_lossy(body)
            );
        }
    }
}
