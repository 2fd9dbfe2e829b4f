// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Session establishment in both directions, duplicate suppression, and
//! unknown-session handling.

mod common;

use common::{start_stack, EstBody, Peer, Seen, TestBody};
use pfcp::proto;
use pfcp::{AppMsgReq, AppMsgRsp, Config, MsgClass};
use std::time::{Duration, Instant};

fn cfg() -> Config {
    Config {
        t1_ms: 200,
        n1: 2,
        // keep the liveness machinery out of these tests
        len_activity_wnd_ms: 60_000,
        ..Config::default()
    }
}

#[test]
fn test_outbound_establishment_sets_remote_seid() {
    let h = start_stack(cfg());
    let ln = h.local_node();
    let peer = Peer::bind();
    let rn = ln
        .create_remote_node(peer.addr().ip(), peer.addr().port())
        .expect("remote node should be created");

    let session = ln.create_session(&rn).expect("session should be created");
    let local_seid = session.local_seid();
    assert_ne!(local_seid, 0);
    assert_eq!(session.remote_seid(), 0);

    let req = AppMsgReq::for_session(
        &session,
        proto::SESSION_ESTABLISHMENT_REQ,
        Box::new(TestBody(b"est".to_vec())),
    )
    .expect("establishment request should build");
    let seq = req.seq_nbr();
    h.handle.send_req(req).expect("send_req should enqueue");

    // the wire carries our FSEID and a zero target SEID
    let (hdr, body, from) = peer.recv(Duration::from_secs(2)).expect("establishment request");
    assert_eq!(hdr.msg_type, proto::SESSION_ESTABLISHMENT_REQ);
    assert_eq!(hdr.seid, Some(0));
    assert_eq!(hdr.seq_nbr, seq);
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&body[..8]);
    assert_eq!(u64::from_be_bytes(raw), local_seid);

    // accept with the peer's FSEID
    peer.send_establishment_rsp(from, seq, local_seid, 1, 0xBEEF);

    let seen = h
        .wait_for(Duration::from_secs(2), |seen| matches!(seen, Seen::Rsp(_)))
        .expect("establishment response should reach the application");
    let Seen::Rsp(rsp) = seen else { unreachable!() };
    assert_eq!(rsp.msg_type(), proto::SESSION_ESTABLISHMENT_RSP);
    assert_eq!(rsp.seq_nbr(), seq);
    assert_eq!(rsp.req().msg_type(), proto::SESSION_ESTABLISHMENT_REQ);
    assert_eq!(rsp.body::<EstBody>().map(|b| b.fseid), Some(0xBEEF));

    assert_eq!(session.remote_seid(), 0xBEEF);
    assert!(matches!(session.set_remote_seid(0xBEEF), Err(pfcp::Error::RemoteSeidAlreadySet)));

    // the session lands in the remote's SEID map shortly after
    let deadline = Instant::now() + Duration::from_secs(2);
    while rn.get_session(0xBEEF).is_none() {
        assert!(Instant::now() < deadline, "session should register under the remote SEID");
        std::thread::sleep(Duration::from_millis(10));
    }
    assert!(ln.get_session(local_seid).is_some());
}

#[test]
fn test_inbound_establishment_creates_session_and_drops_duplicate() {
    // the auto-created remote is addressed on the configured port
    let peer = Peer::bind();
    let mut c = cfg();
    c.port = peer.addr().port();
    let h = start_stack(c);
    let ln = h.local_node();

    // the same request twice, back to back (seqNbr 42)
    peer.send_establishment_req(ln.addr(), 42, 0x77);
    peer.send_establishment_req(ln.addr(), 42, 0x77);

    let seen = h
        .wait_for(Duration::from_secs(2), |seen| matches!(seen, Seen::Req(_)))
        .expect("one establishment request should be delivered");
    let Seen::Req(req) = seen else { unreachable!() };
    assert_eq!(req.msg_type(), proto::SESSION_ESTABLISHMENT_REQ);
    assert_eq!(req.msg_class(), MsgClass::Session);
    assert_eq!(req.seq_nbr(), 42);

    let session = req.session().cloned().expect("a session was created on the fly");
    assert_ne!(session.local_seid(), 0);
    assert_eq!(session.remote_seid(), 0x77, "peer FSEID recorded before delivery");

    // the duplicate is suppressed
    h.assert_quiet(Duration::from_millis(400), |seen| matches!(seen, Seen::Req(_)));
    assert_eq!(ln.session_count(), 1, "exactly one session");

    // answer from the application
    let rsp = AppMsgRsp::new(req, proto::SESSION_ESTABLISHMENT_RSP, Box::new(TestBody(vec![])));
    h.handle.send_rsp(rsp).expect("send_rsp should enqueue");

    let (hdr, body, _) = peer.recv(Duration::from_secs(2)).expect("establishment response");
    assert_eq!(hdr.msg_type, proto::SESSION_ESTABLISHMENT_RSP);
    assert_eq!(hdr.seq_nbr, 42);
    assert_eq!(hdr.seid, Some(0x77), "addressed by the peer's SEID");
    assert_eq!(body[0], 1, "accepted");
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&body[1..9]);
    assert_eq!(u64::from_be_bytes(raw), session.local_seid());
}

#[test]
fn test_session_request_for_unknown_seid_is_dropped() {
    let h = start_stack(cfg());
    let ln = h.local_node();
    let peer = Peer::bind();

    let wire = pfcp::proto::Header::session(proto::SESSION_MODIFICATION_REQ, 0xDEAD, 7)
        .encode(b"payload");
    peer.send(ln.addr(), &wire);

    // dropped with a log, nothing surfaced
    h.assert_quiet(Duration::from_millis(400), |seen| matches!(seen, Seen::Req(_)));

    // the stack is still healthy: a valid establishment goes through
    peer.send_establishment_req(ln.addr(), 8, 0x55);
    assert!(h
        .wait_for(Duration::from_secs(2), |seen| matches!(seen, Seen::Req(_)))
        .is_some());
}

#[test]
fn test_session_destroy_removes_registration() {
    let h = start_stack(cfg());
    let ln = h.local_node();
    let peer = Peer::bind();
    let rn = ln
        .create_remote_node(peer.addr().ip(), peer.addr().port())
        .expect("remote node should be created");

    let session = ln.create_session(&rn).expect("session should be created");
    let seid = session.local_seid();

    let deadline = Instant::now() + Duration::from_secs(2);
    while ln.get_session(seid).is_none() {
        assert!(Instant::now() < deadline, "session should register");
        std::thread::sleep(Duration::from_millis(10));
    }

    session.destroy();
    let deadline = Instant::now() + Duration::from_secs(2);
    while ln.get_session(seid).is_some() {
        assert!(Instant::now() < deadline, "session should be removed");
        std::thread::sleep(Duration::from_millis(10));
    }
    assert_eq!(ln.session_count(), 0);
}

#[test]
fn test_disconnect_drains_sessions_and_stops_remote() {
    let h = start_stack(cfg());
    let ln = h.local_node();
    let peer = Peer::bind();
    let rn = ln
        .create_remote_node(peer.addr().ip(), peer.addr().port())
        .expect("remote node should be created");

    for i in 0..3 {
        let s = ln.create_session(&rn).expect("session should be created");
        s.set_remote_seid(0x1000 + i).expect("remote seid");
    }
    let deadline = Instant::now() + Duration::from_secs(2);
    while rn.session_count() < 3 {
        assert!(Instant::now() < deadline, "sessions should register");
        std::thread::sleep(Duration::from_millis(10));
    }

    rn.disconnect();

    let seen = h
        .wait_for(Duration::from_secs(2), |seen| {
            matches!(seen, Seen::RemoteState(_, _, pfcp::RemoteNodeState::Stopped))
        })
        .expect("remote should stop once its sessions are drained");
    drop(seen);
    assert_eq!(rn.session_count(), 0);
    assert_eq!(ln.session_count(), 0);
}
