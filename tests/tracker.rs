mod common;

use common::{announce_response, content, torrent, SimulatedTracker};

use leech::bencode::Value;
use leech::tracker::TrackerClient;
use leech::{ClientConfig, Error, Peer};

use std::net::Ipv4Addr;

fn client(config: ClientConfig) -> TrackerClient {
    // Loopback requests must not go through an environment proxy
    let http = reqwest::blocking::Client::builder().no_proxy().build().unwrap();
    TrackerClient::with_http_client(config, http)
}

#[test]
fn announce_returns_compact_peers() {
    let listed = vec![
        Peer::new(Ipv4Addr::new(127, 0, 0, 1), 6881),
        Peer::new(Ipv4Addr::new(10, 1, 2, 3), 51413),
    ];
    let tracker = SimulatedTracker::spawn(announce_response(&listed));
    let metainfo = torrent(&tracker.url, &content(20000), 16384);

    let peers = client(ClientConfig::default().with_port(7001))
        .announce(&metainfo)
        .unwrap();
    assert_eq!(peers, listed);

    let requests = tracker.requests();
    assert_eq!(requests.len(), 1);
    let request = &requests[0];
    assert!(request.starts_with("GET /announce?info_hash="));
    assert!(request.contains("&peer_id=%30%30%31%31%32%32"));
    assert!(request.contains("&port=7001&uploaded=0&downloaded=0&left=20000&compact=1"));
}

#[test]
fn announce_surfaces_failure_reason() {
    let body = Value::dict()
        .insert("failure reason", Value::string("torrent not registered"))
        .encode();
    let tracker = SimulatedTracker::spawn(body);
    let metainfo = torrent(&tracker.url, &content(100), 64);

    match client(ClientConfig::default()).announce(&metainfo) {
        Err(Error::TrackerFailure(reason)) => assert_eq!(reason, "torrent not registered"),
        other => panic!("unexpected result {:?}", other),
    }
}

#[test]
fn failure_reason_survives_error_status() {
    let body = Value::dict()
        .insert("failure reason", Value::string("unregistered"))
        .encode();
    let tracker = SimulatedTracker::spawn_with_status("400 Bad Request", body);
    let metainfo = torrent(&tracker.url, &content(100), 64);

    match client(ClientConfig::default()).announce(&metainfo) {
        Err(Error::TrackerFailure(reason)) => assert_eq!(reason, "unregistered"),
        other => panic!("unexpected result {:?}", other),
    }
}

#[test]
fn error_status_without_bencode_names_the_status() {
    let tracker = SimulatedTracker::spawn_with_status(
        "500 Internal Server Error",
        b"upstream down".to_vec(),
    );
    let metainfo = torrent(&tracker.url, &content(100), 64);

    match client(ClientConfig::default()).announce(&metainfo) {
        Err(Error::TrackerProtocol(reason)) => assert!(reason.contains("500")),
        other => panic!("unexpected result {:?}", other),
    }
}

#[test]
fn announce_rejects_garbage() {
    let tracker = SimulatedTracker::spawn(b"<html>not bencode</html>".to_vec());
    let metainfo = torrent(&tracker.url, &content(100), 64);

    assert!(matches!(
        client(ClientConfig::default()).announce(&metainfo),
        Err(Error::TrackerProtocol(_))
    ));
}
