// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Captured-frame fixtures fed through the stream reassembler.
//!
//! Every fixture is hand-assembled from the E1.33 wire layout rather
//! than produced by this crate's own packer, so these tests pin the wire
//! format itself, not just round-trip consistency.

use rdmnet::msgbuf::{MsgBuf, MsgBufPoll};
use rdmnet::protocol::broker::BrokerMessage;
use rdmnet::protocol::message::RdmnetMessageData;
use rdmnet::protocol::rpt::RptMessageData;
use rdmnet::protocol::{RdmnetMessage, RptStatusCode};
use rdmnet::{Cid, DisconnectReason, RdmUid};

const ACN_IDENT: [u8; 12] = *b"ASC-E1.17\0\0\0";

/// Assemble a TCP frame from a root vector, sender CID, and protocol PDU.
fn frame(root_vector: u32, sender_cid: &str, pdu: &[u8]) -> Vec<u8> {
    let cid = Cid::parse(sender_cid).unwrap();
    let block_len = 23 + pdu.len();
    let mut out = Vec::new();
    out.extend_from_slice(&ACN_IDENT);
    out.extend_from_slice(&(block_len as u32).to_be_bytes());
    out.push(0xf0);
    out.push((block_len >> 8) as u8);
    out.push(block_len as u8);
    out.extend_from_slice(&root_vector.to_be_bytes());
    out.extend_from_slice(cid.as_bytes());
    out.extend_from_slice(pdu);
    out
}

/// Broker PDU: flags+length, vector, data.
fn broker_pdu(vector: u16, data: &[u8]) -> Vec<u8> {
    let len = 5 + data.len();
    let mut out = vec![0xf0, (len >> 8) as u8, len as u8];
    out.extend_from_slice(&vector.to_be_bytes());
    out.extend_from_slice(data);
    out
}

fn parse_one(bytes: &[u8]) -> RdmnetMessage {
    let mut buf = MsgBuf::new();
    buf.feed(bytes);
    let msg = match buf.poll() {
        MsgBufPoll::Complete(msg) => msg,
        other => panic!("expected complete message, got {:?}", other),
    };
    assert!(matches!(buf.poll(), MsgBufPoll::Empty), "extra data");
    msg
}

#[test]
fn broker_null() {
    let bytes = frame(
        0x0000_0009,
        "7ab5967a-1737-489b-9bc8-62a8ea479b6b",
        &broker_pdu(0x000f, &[]),
    );
    let msg = parse_one(&bytes);
    assert_eq!(
        msg.sender_cid,
        Cid::parse("7ab5967a-1737-489b-9bc8-62a8ea479b6b").unwrap()
    );
    assert_eq!(msg.data, RdmnetMessageData::Broker(BrokerMessage::Null));
}

#[test]
fn client_disconnect() {
    let bytes = frame(
        0x0000_0009,
        "9aad1b1e-32fa-43d2-ae31-392ae88b19a0",
        &broker_pdu(0x000e, &[0x00, 0x01]), // capacity exhausted
    );
    let msg = parse_one(&bytes);
    match msg.data {
        RdmnetMessageData::Broker(BrokerMessage::Disconnect(d)) => {
            assert_eq!(d.reason, DisconnectReason::CapacityExhausted);
        }
        other => panic!("expected disconnect, got {:?}", other),
    }
}

#[test]
fn client_redirect_v4() {
    let bytes = frame(
        0x0000_0009,
        "ed8dee0c-dfca-4d29-a50a-e0081dd567df",
        &broker_pdu(0x0004, &[0xc0, 0xa8, 0x13, 0x37, 0x88, 0x88]),
    );
    let msg = parse_one(&bytes);
    match msg.data {
        RdmnetMessageData::Broker(BrokerMessage::RedirectV4(r)) => {
            assert_eq!(r.new_addr, "192.168.19.55:34952".parse().unwrap());
            assert_eq!(r.new_addr.port(), 0x8888);
        }
        other => panic!("expected redirect, got {:?}", other),
    }
}

#[test]
fn rpt_status_mid_length_string() {
    let status_string = b"Something went wrong!";

    // RPT Status sub-PDU: flags+length, vector (u16), string.
    let status_len = 5 + status_string.len();
    let mut status_pdu = vec![0xf0, (status_len >> 8) as u8, status_len as u8];
    status_pdu.extend_from_slice(&0x0004u16.to_be_bytes()); // unknown RDM UID
    status_pdu.extend_from_slice(status_string);

    // RPT PDU header.
    let rpt_len = 28 + status_pdu.len();
    let mut rpt_pdu = vec![0xf0, (rpt_len >> 8) as u8, rpt_len as u8];
    rpt_pdu.extend_from_slice(&0x0000_0002u32.to_be_bytes()); // VECTOR_RPT_STATUS
    rpt_pdu.extend_from_slice(&[0x12, 0x34, 0x56, 0x78, 0xaa, 0xaa]); // source UID
    rpt_pdu.extend_from_slice(&[0x00, 0x00]); // source endpoint
    rpt_pdu.extend_from_slice(&[0xcb, 0xa9, 0x87, 0x65, 0x43, 0x21]); // dest UID
    rpt_pdu.extend_from_slice(&[0x00, 0x00]); // dest endpoint
    rpt_pdu.extend_from_slice(&[0x12, 0x34, 0x56, 0x78]); // seqnum
    rpt_pdu.push(0x00); // reserved
    rpt_pdu.extend_from_slice(&status_pdu);

    let bytes = frame(
        0x0000_0005,
        "69bc7b44-cb21-42f8-a37d-aa1a43653572",
        &rpt_pdu,
    );
    let msg = parse_one(&bytes);
    match msg.data {
        RdmnetMessageData::Rpt(rpt) => {
            assert_eq!(rpt.header.source_uid, RdmUid::new(0x1234, 0x5678aaaa));
            assert_eq!(rpt.header.dest_uid, RdmUid::new(0xcba9, 0x87654321));
            assert_eq!(rpt.header.seqnum, 0x12345678);
            match rpt.data {
                RptMessageData::Status(status) => {
                    assert_eq!(status.status_code, RptStatusCode::UnknownRdmUid);
                    assert_eq!(status.status_string.as_deref(), Some("Something went wrong!"));
                }
                other => panic!("expected status, got {:?}", other),
            }
        }
        other => panic!("expected RPT, got {:?}", other),
    }
}

#[test]
fn rdm_set_command_response_two_buffers() {
    // Two chained RDM response packets from a live SET transaction.
    let rdm_buf_1: [u8; 28] = [
        0xcc, 0x01, 0x1a, 0x12, 0x34, 0x56, 0x78, 0x9a, 0xbc, 0xcb, 0xa9, 0x87, 0x65, 0x43, 0x21,
        0x00, 0x00, 0x00, 0x00, 0x00, 0x30, 0x00, 0xf0, 0x02, 0x00, 0x10, 0x07, 0x47,
    ];
    let rdm_buf_2: [u8; 26] = [
        0xcc, 0x01, 0x18, 0xcb, 0xa9, 0x87, 0x65, 0x43, 0x21, 0x12, 0x34, 0x56, 0x78, 0x9a, 0xbc,
        0x00, 0x00, 0x00, 0x00, 0x00, 0x31, 0x00, 0xf0, 0x00, 0x07, 0x34,
    ];

    // Notification sub-PDU wrapping both RDM Command PDUs.
    let chain_len = 7 + (3 + rdm_buf_1.len()) + (3 + rdm_buf_2.len());
    let mut notif_pdu = vec![0xf0, (chain_len >> 8) as u8, chain_len as u8];
    notif_pdu.extend_from_slice(&0x0000_0001u32.to_be_bytes()); // RDM command vector
    for rdm in [&rdm_buf_1[..], &rdm_buf_2[..]] {
        let cmd_len = 3 + rdm.len();
        notif_pdu.push(0xf0);
        notif_pdu.push((cmd_len >> 8) as u8);
        notif_pdu.push(cmd_len as u8);
        notif_pdu.extend_from_slice(rdm);
    }

    let rpt_len = 28 + notif_pdu.len();
    let mut rpt_pdu = vec![0xf0, (rpt_len >> 8) as u8, rpt_len as u8];
    rpt_pdu.extend_from_slice(&0x0000_0003u32.to_be_bytes()); // VECTOR_RPT_NOTIFICATION
    rpt_pdu.extend_from_slice(&[0x12, 0x34, 0x56, 0x78, 0xaa, 0xaa]); // source UID
    rpt_pdu.extend_from_slice(&[0x00, 0x04]); // source endpoint
    rpt_pdu.extend_from_slice(&[0xff, 0xfc, 0xff, 0xff, 0xff, 0xff]); // dest: all controllers
    rpt_pdu.extend_from_slice(&[0x00, 0x00]); // dest endpoint
    rpt_pdu.extend_from_slice(&[0x12, 0x34, 0x56, 0x78]); // seqnum
    rpt_pdu.push(0x00); // reserved
    rpt_pdu.extend_from_slice(&notif_pdu);

    let bytes = frame(
        0x0000_0005,
        "deadbeef-baad-f00d-face-b00cd15eea5e",
        &rpt_pdu,
    );
    let msg = parse_one(&bytes);
    match msg.data {
        RdmnetMessageData::Rpt(rpt) => {
            assert_eq!(rpt.header.source_endpoint_id, 4);
            assert!(rpt.header.dest_uid.is_controller_broadcast());
            match rpt.data {
                RptMessageData::Notification(list) => {
                    assert_eq!(list.buffers.len(), 2);
                    assert_eq!(list.buffers[0].as_slice(), &rdm_buf_1);
                    assert_eq!(list.buffers[1].as_slice(), &rdm_buf_2);
                }
                other => panic!("expected notification, got {:?}", other),
            }
        }
        other => panic!("expected RPT, got {:?}", other),
    }
}

#[test]
fn broker_disconnect_pack_exact_bytes() {
    const CORRECT_DISCONNECT_MSG: [u8; 46] = [
        0x41, 0x53, 0x43, 0x2d, 0x45, 0x31, 0x2e, 0x31, 0x37, 0x00, 0x00, 0x00, // ident
        0x00, 0x00, 0x00, 0x1e, // block size
        0xf0, 0x00, 0x1e, // root flags and length
        0x00, 0x00, 0x00, 0x09, // VECTOR_ROOT_BROKER
        0x9e, 0xfb, 0x97, 0x13, 0x2b, 0x82, 0x41, 0x21, 0x8a, 0xe0, 0x9c, 0xa0, 0x45, 0x08, 0x6f,
        0xe6, // sender CID
        0xf0, 0x00, 0x07, // broker flags and length
        0x00, 0x0e, // VECTOR_BROKER_DISCONNECT
        0x00, 0x04, // software reset
    ];

    let msg = RdmnetMessage::broker(
        Cid::parse("9efb9713-2b82-4121-8ae0-9ca045086fe6").unwrap(),
        BrokerMessage::Disconnect(rdmnet::protocol::DisconnectMsg {
            reason: DisconnectReason::SoftwareReset,
        }),
    );
    assert_eq!(msg.pack_to_vec().unwrap().as_slice(), &CORRECT_DISCONNECT_MSG);
}

#[test]
fn fixtures_survive_arbitrary_chunking() {
    let mut stream = Vec::new();
    stream.extend_from_slice(&frame(
        0x0000_0009,
        "7ab5967a-1737-489b-9bc8-62a8ea479b6b",
        &broker_pdu(0x000f, &[]),
    ));
    stream.extend_from_slice(&frame(
        0x0000_0009,
        "9aad1b1e-32fa-43d2-ae31-392ae88b19a0",
        &broker_pdu(0x000e, &[0x00, 0x01]),
    ));
    stream.extend_from_slice(&frame(
        0x0000_0009,
        "ed8dee0c-dfca-4d29-a50a-e0081dd567df",
        &broker_pdu(0x0004, &[0xc0, 0xa8, 0x13, 0x37, 0x88, 0x88]),
    ));

    let whole: Vec<RdmnetMessage> = {
        let mut buf = MsgBuf::new();
        buf.feed(&stream);
        let mut out = Vec::new();
        while let MsgBufPoll::Complete(m) = buf.poll() {
            out.push(m);
        }
        out
    };
    assert_eq!(whole.len(), 3);

    for chunk_size in [1, 2, 5, 13, 40] {
        let mut buf = MsgBuf::new();
        let mut chunked = Vec::new();
        for chunk in stream.chunks(chunk_size) {
            buf.feed(chunk);
            while let MsgBufPoll::Complete(m) = buf.poll() {
                chunked.push(m);
            }
        }
        assert_eq!(chunked, whole, "chunk size {}", chunk_size);
    }
}
