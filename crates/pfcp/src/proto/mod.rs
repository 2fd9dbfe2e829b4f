// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! PFCP protocol surface shared by the stack and its translators.
//!
//! The stack only ever looks at the common header and the message-type table;
//! Information Element bodies are the business of the injected
//! [`Translator`](crate::Translator).

pub mod header;

pub use header::Header;

/// Session Endpoint Identifier (64-bit, 0 means "unset").
pub type Seid = u64;

/// PFCP message sequence number (24 bits on the wire).
pub type SeqNbr = u32;

/// PFCP message type code.
pub type MsgType = u8;

/// Highest sequence number representable in the 3-byte wire field.
pub const SEQUENCE_MAX: SeqNbr = 0x00FF_FFFF;

/// The PFCP version this stack speaks.
pub const VERSION: u8 = 1;

// ===========================================================================
// Message types (TS 29.244 Sec.7.3, table 7.3-1)
// ===========================================================================

pub const HEARTBEAT_REQ: MsgType = 1;
pub const HEARTBEAT_RSP: MsgType = 2;
pub const PFD_MANAGEMENT_REQ: MsgType = 3;
pub const PFD_MANAGEMENT_RSP: MsgType = 4;
pub const ASSOCIATION_SETUP_REQ: MsgType = 5;
pub const ASSOCIATION_SETUP_RSP: MsgType = 6;
pub const ASSOCIATION_UPDATE_REQ: MsgType = 7;
pub const ASSOCIATION_UPDATE_RSP: MsgType = 8;
pub const ASSOCIATION_RELEASE_REQ: MsgType = 9;
pub const ASSOCIATION_RELEASE_RSP: MsgType = 10;
pub const VERSION_NOT_SUPPORTED_RSP: MsgType = 11;
pub const NODE_REPORT_REQ: MsgType = 12;
pub const NODE_REPORT_RSP: MsgType = 13;
pub const SESSION_SET_DELETION_REQ: MsgType = 14;
pub const SESSION_SET_DELETION_RSP: MsgType = 15;
pub const SESSION_ESTABLISHMENT_REQ: MsgType = 50;
pub const SESSION_ESTABLISHMENT_RSP: MsgType = 51;
pub const SESSION_MODIFICATION_REQ: MsgType = 52;
pub const SESSION_MODIFICATION_RSP: MsgType = 53;
pub const SESSION_DELETION_REQ: MsgType = 54;
pub const SESSION_DELETION_RSP: MsgType = 55;
pub const SESSION_REPORT_REQ: MsgType = 56;
pub const SESSION_REPORT_RSP: MsgType = 57;

/// Message class: node-scope messages versus SEID-keyed session messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MsgClass {
    Unknown,
    Node,
    Session,
}

impl MsgClass {
    /// Tag used in log lines ("NODE" / "SESSION" / "UNKNOWN").
    pub fn tag(self) -> &'static str {
        match self {
            MsgClass::Node => "NODE",
            MsgClass::Session => "SESSION",
            MsgClass::Unknown => "UNKNOWN",
        }
    }
}

/// Default message-type to class mapping per TS 29.244.
///
/// A release translator may override this via
/// [`Translator::msg_class`](crate::Translator::msg_class) for vendor
/// extensions.
pub fn msg_class_of(msg_type: MsgType) -> MsgClass {
    match msg_type {
        1..=15 => MsgClass::Node,
        50..=57 => MsgClass::Session,
        _ => MsgClass::Unknown,
    }
}

/// Whether a type code is a request per the standard numbering.
///
/// The pairs are not parity-aligned (Node Report Request is 12, its
/// response 13), so this is a table, not arithmetic.
pub fn is_req_type(msg_type: MsgType) -> bool {
    matches!(
        msg_type,
        HEARTBEAT_REQ
            | PFD_MANAGEMENT_REQ
            | ASSOCIATION_SETUP_REQ
            | ASSOCIATION_UPDATE_REQ
            | ASSOCIATION_RELEASE_REQ
            | NODE_REPORT_REQ
            | SESSION_SET_DELETION_REQ
            | SESSION_ESTABLISHMENT_REQ
            | SESSION_MODIFICATION_REQ
            | SESSION_DELETION_REQ
            | SESSION_REPORT_REQ
    )
}

/// Message-type codes known to the statistics template, in numeric order.
pub const STAT_MSG_TYPES: &[MsgType] = &[
    HEARTBEAT_REQ,
    HEARTBEAT_RSP,
    PFD_MANAGEMENT_REQ,
    PFD_MANAGEMENT_RSP,
    ASSOCIATION_SETUP_REQ,
    ASSOCIATION_SETUP_RSP,
    ASSOCIATION_UPDATE_REQ,
    ASSOCIATION_UPDATE_RSP,
    ASSOCIATION_RELEASE_REQ,
    ASSOCIATION_RELEASE_RSP,
    VERSION_NOT_SUPPORTED_RSP,
    NODE_REPORT_REQ,
    NODE_REPORT_RSP,
    SESSION_SET_DELETION_REQ,
    SESSION_SET_DELETION_RSP,
    SESSION_ESTABLISHMENT_REQ,
    SESSION_ESTABLISHMENT_RSP,
    SESSION_MODIFICATION_REQ,
    SESSION_MODIFICATION_RSP,
    SESSION_DELETION_REQ,
    SESSION_DELETION_RSP,
    SESSION_REPORT_REQ,
    SESSION_REPORT_RSP,
];

/// Human-readable message name for logs and the statistics document.
pub fn msg_name(msg_type: MsgType) -> &'static str {
    match msg_type {
        HEARTBEAT_REQ => "heartbeat_req",
        HEARTBEAT_RSP => "heartbeat_rsp",
        PFD_MANAGEMENT_REQ => "pfd_management_req",
        PFD_MANAGEMENT_RSP => "pfd_management_rsp",
        ASSOCIATION_SETUP_REQ => "association_setup_req",
        ASSOCIATION_SETUP_RSP => "association_setup_rsp",
        ASSOCIATION_UPDATE_REQ => "association_update_req",
        ASSOCIATION_UPDATE_RSP => "association_update_rsp",
        ASSOCIATION_RELEASE_REQ => "association_release_req",
        ASSOCIATION_RELEASE_RSP => "association_release_rsp",
        VERSION_NOT_SUPPORTED_RSP => "version_not_supported_rsp",
        NODE_REPORT_REQ => "node_report_req",
        NODE_REPORT_RSP => "node_report_rsp",
        SESSION_SET_DELETION_REQ => "session_set_deletion_req",
        SESSION_SET_DELETION_RSP => "session_set_deletion_rsp",
        SESSION_ESTABLISHMENT_REQ => "session_establishment_req",
        SESSION_ESTABLISHMENT_RSP => "session_establishment_rsp",
        SESSION_MODIFICATION_REQ => "session_modification_req",
        SESSION_MODIFICATION_RSP => "session_modification_rsp",
        SESSION_DELETION_REQ => "session_deletion_req",
        SESSION_DELETION_RSP => "session_deletion_rsp",
        SESSION_REPORT_REQ => "session_report_req",
        SESSION_REPORT_RSP => "session_report_rsp",
        _ => "unknown",
    }
}

/// The six message-type codes the stack's state machines branch on, captured
/// from the translator once at stack start and read-only afterwards.
#[derive(Debug, Clone, Copy)]
pub struct MsgTypes {
    pub heartbeat_req: MsgType,
    pub heartbeat_rsp: MsgType,
    pub session_establishment_req: MsgType,
    pub session_establishment_rsp: MsgType,
    pub association_setup_req: MsgType,
    pub association_setup_rsp: MsgType,
}

impl Default for MsgTypes {
    fn default() -> Self {
        Self {
            heartbeat_req: HEARTBEAT_REQ,
            heartbeat_rsp: HEARTBEAT_RSP,
            session_establishment_req: SESSION_ESTABLISHMENT_REQ,
            session_establishment_rsp: SESSION_ESTABLISHMENT_RSP,
            association_setup_req: ASSOCIATION_SETUP_REQ,
            association_setup_rsp: ASSOCIATION_SETUP_RSP,
        }
    }
}
