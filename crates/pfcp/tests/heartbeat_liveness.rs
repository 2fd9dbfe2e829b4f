// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Heartbeat synthesis, peer failure, and restart detection, end to end
//! against a scripted UDP peer.

mod common;

use common::{secs_ts, start_stack, Peer, Seen, TestTranslator};
use pfcp::proto;
use pfcp::{Config, RemoteNodeState};
use std::time::Duration;

fn quick_cfg() -> Config {
    Config {
        t1_ms: 100,
        heartbeat_t1_ms: 100,
        n1: 2,
        heartbeat_n1: 3,
        len_activity_wnd_ms: 100,
        nbr_activity_wnds: 3,
        ..Config::default()
    }
}

#[test]
fn test_heartbeat_success_keeps_peer_started() {
    let h = start_stack(quick_cfg());
    let ln = h.local_node();
    let peer = Peer::bind();

    let rn = ln
        .create_remote_node(peer.addr().ip(), peer.addr().port())
        .expect("remote node should be created");

    // the peer is silent: after a full silent rotation (~300 ms) a
    // Heartbeat Request must appear on the wire
    let (hdr, body, from) = peer.recv(Duration::from_secs(2)).expect("heartbeat request");
    assert_eq!(hdr.msg_type, proto::HEARTBEAT_REQ);
    assert_eq!(body.len(), 8, "recovery timestamp body");

    // reply within the retransmit interval, echoing the first-seen value
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&body[..8]);
    peer.send_heartbeat_rsp(from, hdr.seq_nbr, secs_ts(u64::from_be_bytes(raw)));

    // no restart, no failure (window kept short of the next liveness check)
    h.assert_quiet(Duration::from_millis(250), |seen| {
        matches!(seen, Seen::Restart(..))
            || matches!(
                seen,
                Seen::RemoteState(_, _, RemoteNodeState::Failed | RemoteNodeState::Restarted)
            )
    });
    assert_eq!(rn.state(), RemoteNodeState::Started);

    let stats = rn.stats().message(proto::HEARTBEAT_REQ).expect("heartbeat stats entry");
    assert_eq!(stats.sent()[0], 1, "one first-attempt heartbeat");
    assert_eq!(rn.stats().message(proto::HEARTBEAT_RSP).map(|m| m.received()), Some(1));
}

#[test]
fn test_unresponsive_peer_transitions_to_failed() {
    let h = start_stack(quick_cfg());
    let ln = h.local_node();
    let peer = Peer::bind();

    let rn = ln
        .create_remote_node(peer.addr().ip(), peer.addr().port())
        .expect("remote node should be created");

    // heartbeat_n1 = 3 attempts, then Failed (~600 ms in)
    let seen = h
        .wait_for(Duration::from_secs(3), |seen| {
            matches!(seen, Seen::RemoteState(_, _, RemoteNodeState::Failed))
        })
        .expect("peer should be declared Failed");
    if let Seen::RemoteState(_, old, _) = seen {
        assert_eq!(old, RemoteNodeState::Started);
    }
    assert_eq!(rn.state(), RemoteNodeState::Failed);

    // the heartbeat itself must not surface a request timeout
    h.assert_quiet(Duration::from_millis(300), |seen| matches!(seen, Seen::Timeout(_)));

    // all attempts carried the same sequence number
    let msgs = peer.drain(Duration::from_millis(200));
    let heartbeats: Vec<_> =
        msgs.iter().filter(|(hdr, _)| hdr.msg_type == proto::HEARTBEAT_REQ).collect();
    assert!(!heartbeats.is_empty());
    let attempts = rn.stats().message(proto::HEARTBEAT_REQ).expect("stats entry").sent();
    assert_eq!(attempts, vec![1, 1, 1], "original plus two retransmits");
}

#[test]
fn test_newer_recovery_timestamp_is_a_restart() {
    let mut cfg = quick_cfg();
    cfg.len_activity_wnd_ms = 50;
    let h = start_stack(cfg);
    let ln = h.local_node();
    let peer = Peer::bind();

    let rn = ln
        .create_remote_node(peer.addr().ip(), peer.addr().port())
        .expect("remote node should be created");

    // first heartbeat records the peer's start time silently
    let (hdr, _, from) = peer.recv(Duration::from_secs(2)).expect("first heartbeat");
    let t0 = secs_ts(1_700_000_000);
    peer.send_heartbeat_rsp(from, hdr.seq_nbr, t0);

    h.assert_quiet(Duration::from_millis(200), |seen| matches!(seen, Seen::Restart(..)));
    assert_eq!(rn.state(), RemoteNodeState::Started);

    // the next heartbeat response reports a newer start time
    let (hdr, _, from) = peer.recv(Duration::from_secs(2)).expect("second heartbeat");
    let t1 = secs_ts(1_700_000_060);
    peer.send_heartbeat_rsp(from, hdr.seq_nbr, t1);

    let seen = h
        .wait_for(Duration::from_secs(2), |seen| matches!(seen, Seen::Restart(..)))
        .expect("restart must be surfaced");
    if let Seen::Restart(_, restart_time) = seen {
        assert_eq!(restart_time, t1, "event carries the new timestamp");
    }
    assert_eq!(rn.state(), RemoteNodeState::Restarted);
    assert_eq!(rn.start_time(), Some(t1));
}

#[test]
fn test_inbound_heartbeat_request_is_answered() {
    // an unknown sender is auto-created and addressed on the configured
    // port, so the scripted peer must own that port
    let peer = Peer::bind();
    let mut cfg = quick_cfg();
    cfg.port = peer.addr().port();
    let h = start_stack(cfg);
    let ln = h.local_node();

    peer.send_heartbeat_req(ln.addr(), 11, secs_ts(1_600_000_000));

    let (hdr, body, _) = peer.recv(Duration::from_secs(2)).expect("heartbeat response");
    assert_eq!(hdr.msg_type, proto::HEARTBEAT_RSP);
    assert_eq!(hdr.seq_nbr, 11);

    // the response carries this node's recovery timestamp
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&body[..8]);
    assert_eq!(u64::from_be_bytes(raw), common::ts_secs(ln.start_time()));

    // a second request with a newer stamp is both answered and a restart
    peer.send_heartbeat_req(ln.addr(), 12, secs_ts(1_600_000_050));
    let (hdr, _, _) = peer.recv(Duration::from_secs(2)).expect("second heartbeat response");
    assert_eq!(hdr.seq_nbr, 12);

    let seen = h
        .wait_for(Duration::from_secs(2), |seen| matches!(seen, Seen::Restart(..)))
        .expect("restart from heartbeat request");
    if let Seen::Restart(rn, restart_time) = seen {
        assert_eq!(restart_time, secs_ts(1_600_000_050));
        assert_eq!(rn.state(), RemoteNodeState::Restarted);
    }
}

#[test]
fn test_translator_roundtrips_heartbeat_bodies() {
    // the codec contract consumed by the liveness machinery
    use pfcp::Translator;
    let translator = TestTranslator;
    assert!(translator.is_version_supported(1));
    assert!(!translator.is_version_supported(2));

    let wire = pfcp::proto::Header::node(proto::HEARTBEAT_REQ, 77).encode(&1234u64.to_be_bytes());
    let info = translator.get_msg_info(&wire).expect("header info");
    assert!(info.is_req);
    assert_eq!(info.msg_type, proto::HEARTBEAT_REQ);
    assert_eq!(info.seq_nbr, 77);
    assert_eq!(info.msg_class, pfcp::MsgClass::Node);
}
