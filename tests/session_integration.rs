//! Integration tests for the full command loop over the socket binding.
//!
//! Each test wires a kernel session to one end of a Unix socket pair and
//! speaks the framed JSON protocol from the other end, exactly as a real
//! caller would: send a command frame, read notification frames and the
//! terminal result/error frame.

use std::io::BufReader;
use std::os::unix::net::UnixStream;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use serde_json::{json, Value as Json};

use replink::session::Session;
use replink::transport::{framing, Transport};

/// The caller's side of the wire.
struct Peer {
    reader: BufReader<UnixStream>,
    writer: UnixStream,
}

impl Peer {
    fn send(&mut self, cmd: Json) {
        framing::write_message(&mut self.writer, &cmd.to_string()).expect("send command");
    }

    fn recv(&mut self) -> Json {
        let body = framing::read_message(&mut self.reader).expect("read frame");
        serde_json::from_str(&body).expect("parse frame")
    }

    /// Send a command and read frames until the terminal result/error,
    /// returning (notifications, terminal).
    fn roundtrip(&mut self, cmd: Json) -> (Vec<Json>, Json) {
        self.send(cmd);
        let mut notifications = Vec::new();
        loop {
            let frame = self.recv();
            match frame["tag"].as_str() {
                Some("stdout") | Some("stderr") => notifications.push(frame),
                _ => return (notifications, frame),
            }
        }
    }
}

/// Spawn a kernel session on one end of a socket pair; returns the peer
/// end and the session thread handle.
fn spawn_kernel() -> (Peer, JoinHandle<anyhow::Result<()>>) {
    let (kernel_stream, peer_stream) = UnixStream::pair().expect("socket pair");

    let handle = thread::spawn(move || {
        let transport = Transport::from_stream(kernel_stream)?;
        let mut session = Session::new(transport);
        // Keep test teardown fast.
        session.set_grace(Duration::from_millis(10));
        session.run()
    });

    let writer = peer_stream.try_clone().expect("clone peer stream");
    (
        Peer {
            reader: BufReader::new(peer_stream),
            writer,
        },
        handle,
    )
}

fn stop(mut peer: Peer, handle: JoinHandle<anyhow::Result<()>>) {
    peer.send(json!({"tag": "stop"}));
    // No response frame: the next read observes the closed transport.
    let eof = framing::read_message(&mut peer.reader);
    assert!(eof.is_err(), "stop must not produce a response frame");
    handle
        .join()
        .expect("session thread")
        .expect("clean shutdown");
}

#[test]
fn exec_formats_the_result_binding() {
    let (mut peer, handle) = spawn_kernel();

    let (_, frame) = peer.roundtrip(json!({
        "tag": "exec",
        "code": "ans = 1 + 1",
        "format": "int",
    }));
    assert_eq!(frame, json!({"tag": "result", "value": 2}));

    stop(peer, handle);
}

#[test]
fn guest_fault_reports_a_trace_and_the_loop_survives() {
    let (mut peer, handle) = spawn_kernel();

    let (_, frame) = peer.roundtrip(json!({
        "tag": "exec",
        "code": "ans = 1 // 0",
    }));
    assert_eq!(frame["tag"], json!("error"));
    assert_eq!(frame["msg"], json!("division by zero"));
    let trace = frame["trace"].as_array().expect("trace array");
    assert!(!trace.is_empty());
    assert!(trace[0].as_str().unwrap().contains("line 1"));

    // Loop is still alive.
    let (_, frame) = peer.roundtrip(json!({"tag": "echo", "msg": "still here"}));
    assert_eq!(frame, json!({"tag": "result", "value": "still here"}));

    stop(peer, handle);
}

#[test]
fn echo_round_trips_tagged_containers() {
    let (mut peer, handle) = spawn_kernel();

    let wire = json!({"type": "list", "val": [
        1,
        {"type": "tuple", "val": [2, 3]},
        {"type": "dict", "val": [["k", 4]]},
    ]});
    let (_, frame) = peer.roundtrip(json!({"tag": "echo", "msg": wire}));
    assert_eq!(frame["tag"], json!("result"));
    assert_eq!(frame["value"], wire);

    stop(peer, handle);
}

#[test]
fn big_integers_escape_to_hex_on_the_wire() {
    let (mut peer, handle) = spawn_kernel();

    let (_, frame) = peer.roundtrip(json!({
        "tag": "exec",
        "code": "ans = 1073741824",
    }));
    assert_eq!(
        frame,
        json!({"tag": "result", "value": {"type": "int", "val": "0x40000000"}})
    );

    stop(peer, handle);
}

#[test]
fn null_locals_build_session_state_across_calls() {
    let (mut peer, handle) = spawn_kernel();

    let (_, frame) = peer.roundtrip(json!({
        "tag": "exec",
        "code": "counter = 41",
        "locals": null,
    }));
    // Direct-scope execution yields none unconditionally.
    assert_eq!(frame, json!({"tag": "result", "value": null}));

    let (_, frame) = peer.roundtrip(json!({
        "tag": "exec",
        "code": "ans = counter + 1",
    }));
    assert_eq!(frame, json!({"tag": "result", "value": 42}));

    stop(peer, handle);
}

#[test]
fn named_scopes_are_isolated() {
    let (mut peer, handle) = spawn_kernel();

    peer.roundtrip(json!({
        "tag": "exec",
        "code": "x = 1",
        "scope": "alt",
        "locals": null,
    }));
    let (_, frame) = peer.roundtrip(json!({
        "tag": "exec",
        "code": "ans = x",
    }));
    assert_eq!(frame["tag"], json!("error"));
    assert!(frame["msg"].as_str().unwrap().contains("not defined"));

    stop(peer, handle);
}

#[test]
fn references_share_identity_and_release_through_decref() {
    let (mut peer, handle) = spawn_kernel();

    peer.roundtrip(json!({
        "tag": "exec",
        "code": "shared = [10, 20, 30]",
        "locals": null,
    }));

    // Two ref-formatted reads of the same binding: same handle.
    let (_, frame) = peer.roundtrip(json!({
        "tag": "exec",
        "code": "ans = shared",
        "format": "ref",
    }));
    let handle1 = frame["value"]["val"].as_str().expect("handle").to_string();
    let (_, frame) = peer.roundtrip(json!({
        "tag": "exec",
        "code": "ans = shared",
        "format": "ref",
    }));
    assert_eq!(frame["value"]["val"].as_str().unwrap(), handle1);

    // The handle resolves back through locals bindings.
    let (_, frame) = peer.roundtrip(json!({
        "tag": "exec",
        "code": "ans = xs[1]",
        "locals": {"xs": {"type": "ref", "val": handle1}},
    }));
    assert_eq!(frame, json!({"tag": "result", "value": 20}));

    // Release both references; a third release fails but the loop lives.
    let (_, frame) = peer.roundtrip(json!({"tag": "decref", "refs": [handle1, handle1]}));
    assert_eq!(frame["tag"], json!("result"));
    let (_, frame) = peer.roundtrip(json!({"tag": "decref", "refs": [handle1]}));
    assert_eq!(frame["tag"], json!("error"));
    assert!(frame["msg"].as_str().unwrap().contains("unknown reference"));

    stop(peer, handle);
}

#[test]
fn guest_print_interleaves_stdout_frames_before_the_result() {
    let (mut peer, handle) = spawn_kernel();

    let (notifications, frame) = peer.roundtrip(json!({
        "tag": "exec",
        "code": "print(\"hello\", 1)\nans = 2",
    }));
    assert_eq!(
        notifications,
        vec![json!({"tag": "stdout", "text": "hello 1\n"})]
    );
    assert_eq!(frame, json!({"tag": "result", "value": 2}));

    stop(peer, handle);
}

#[test]
fn unknown_tags_are_recoverable_protocol_errors() {
    let (mut peer, handle) = spawn_kernel();

    let (_, frame) = peer.roundtrip(json!({"tag": "nope"}));
    assert_eq!(frame["tag"], json!("error"));
    assert!(frame["msg"].as_str().unwrap().contains("unexpected tag"));

    let (_, frame) = peer.roundtrip(json!({"tag": "echo", "msg": 1}));
    assert_eq!(frame, json!({"tag": "result", "value": 1}));

    stop(peer, handle);
}

#[test]
fn closures_marshal_as_references_and_decode_back() {
    let (mut peer, handle) = spawn_kernel();

    peer.roundtrip(json!({
        "tag": "exec",
        "code": "double = fn(x) x * 2",
        "locals": null,
    }));
    let (_, frame) = peer.roundtrip(json!({
        "tag": "exec",
        "code": "ans = double",
    }));
    // No marshal rule or array strategy claims a function: ref fallback.
    assert_eq!(frame["value"]["type"], json!("ref"));
    let fn_handle = frame["value"]["val"].as_str().unwrap().to_string();

    let (_, frame) = peer.roundtrip(json!({
        "tag": "exec",
        "code": "ans = f(21)",
        "locals": {"f": {"type": "ref", "val": fn_handle}},
    }));
    assert_eq!(frame, json!({"tag": "result", "value": 42}));

    stop(peer, handle);
}

#[test]
fn union_format_selects_the_matching_variant() {
    let (mut peer, handle) = spawn_kernel();

    let (_, frame) = peer.roundtrip(json!({
        "tag": "exec",
        "code": "ans = \"text\"",
        "format": ["union", ["int", "str"]],
    }));
    assert_eq!(
        frame,
        json!({"tag": "result", "value": {"idx": 1, "val": "text"}})
    );

    let (_, frame) = peer.roundtrip(json!({
        "tag": "exec",
        "code": "ans = [1]",
        "format": ["union", ["int", "str"]],
    }));
    assert_eq!(frame["tag"], json!("error"));
    let msg = frame["msg"].as_str().unwrap();
    assert!(msg.contains("could not convert"), "{}", msg);
    assert!(msg.contains(" / "), "{}", msg);

    stop(peer, handle);
}

#[test]
fn stop_closes_the_transport_without_a_response() {
    let (peer, handle) = spawn_kernel();
    stop(peer, handle);
}
