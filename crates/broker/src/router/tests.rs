use std::time::Duration;

use evalbridge_protocol::{EvalForward, EvalResponse, ServerFrame};
use serde_json::{Value, json};

use super::*;
use crate::clock::ManualClock;
use crate::registry::PeerRole;

const TIMEOUT: Duration = Duration::from_secs(30);

struct Harness {
	broker: Broker<ManualClock>,
	next_conn: u64,
}

impl Harness {
	fn new() -> Self {
		let settings = BrokerSettings {
			request_timeout: TIMEOUT,
			process_id: 4242,
		};
		Self {
			broker: Broker::new(settings, ManualClock::new()),
			next_conn: 0,
		}
	}

	fn open(&mut self) -> ConnId {
		self.next_conn += 1;
		let conn = ConnId::new(self.next_conn);
		assert!(self.broker.handle(Event::Opened(conn)).is_empty());
		conn
	}

	fn send(&mut self, conn: ConnId, frame: Value) -> Vec<Outbound> {
		self.send_text(conn, &frame.to_string())
	}

	fn send_text(&mut self, conn: ConnId, text: &str) -> Vec<Outbound> {
		self.broker.handle(Event::Frame {
			conn,
			text: text.to_string(),
		})
	}

	fn close(&mut self, conn: ConnId) -> Vec<Outbound> {
		self.broker.handle(Event::Closed(conn))
	}

	fn host(&mut self, client_id: &str) -> ConnId {
		let conn = self.open();
		let out = self.send(conn, json!({"type": "hello", "role": "host", "clientId": client_id, "label": client_id}));
		assert_eq!(out.last(), Some(&ack(conn)));
		conn
	}

	fn driver(&mut self) -> ConnId {
		let conn = self.open();
		let out = self.send(conn, json!({"type": "hello", "role": "driver"}));
		assert_eq!(out, vec![ack(conn)]);
		conn
	}

	fn advance(&mut self, by: Duration) -> Vec<Outbound> {
		let fired = self.broker.clock_mut().advance(by);
		fired
			.into_iter()
			.flat_map(|key| self.broker.handle(Event::DeadlineFired(key)))
			.collect()
	}
}

fn ack(conn: ConnId) -> Outbound {
	Outbound::Send {
		to: conn,
		frame: ServerFrame::HelloAck,
	}
}

fn forward(to: ConnId, id: &str, script: &str) -> Outbound {
	Outbound::Send {
		to,
		frame: ServerFrame::EvalRequest(EvalForward {
			id: id.to_string(),
			script: script.to_string(),
		}),
	}
}

fn eval(id: &str, script: &str) -> Value {
	json!({"type": "eval_request", "id": id, "script": script})
}

/// The single eval response in `out`, which must be addressed to `to`.
fn response_to(out: &[Outbound], to: ConnId) -> EvalResponse {
	match out {
		[Outbound::Send {
			to: target,
			frame: ServerFrame::EvalResponse(response),
		}] if *target == to => response.clone(),
		other => panic!("expected one eval response to {to}, got {other:?}"),
	}
}

fn error_of(response: &EvalResponse) -> (String, String) {
	let descriptor = response.error_descriptor().expect("error descriptor");
	(descriptor.name, descriptor.message)
}

#[test]
fn host_hello_without_client_id_is_acked_then_closed() {
	let mut h = Harness::new();
	let conn = h.open();

	let out = h.send(conn, json!({"type": "hello", "role": "host", "clientId": ""}));

	assert_eq!(
		out,
		vec![
			ack(conn),
			Outbound::Close {
				conn,
				reason: CloseReason::MissingClientId,
			},
		]
	);
	assert!(h.broker.directory().is_empty());
}

#[test]
fn rejected_host_cannot_retry_on_same_connection() {
	let mut h = Harness::new();
	let conn = h.open();
	h.send(conn, json!({"type": "hello", "role": "host"}));

	let out = h.send(conn, json!({"type": "hello", "role": "host", "clientId": "file-1"}));

	assert!(out.is_empty());
	assert!(h.broker.directory().is_empty());
	assert!(h.broker.registry().is_empty());
	assert!(h.close(conn).is_empty());
}

#[test]
fn replaced_host_is_cut_off_before_its_socket_closes() {
	let mut h = Harness::new();
	let first = h.host("file-1");
	let second = h.host("file-1");
	let driver = h.driver();
	assert_eq!(h.send(driver, eval("r1", "1")), vec![forward(second, "r1", "1")]);

	// The old socket is still draining: its answer and its re-registration are both dropped.
	let late_reply = json!({"type": "eval_response", "id": "r1", "ok": true, "result": "stale"});
	assert!(h.send(first, late_reply).is_empty());
	assert!(h.send(first, json!({"type": "hello", "role": "host", "clientId": "file-1"})).is_empty());
	assert_eq!(h.broker.directory().get("file-1").map(|entry| entry.conn), Some(second));
	assert_eq!(h.broker.correlator().len(), 1);

	let out = h.send(second, json!({"type": "eval_response", "id": "r1", "ok": true, "result": 1}));
	assert_eq!(response_to(&out, driver).result, Some(json!(1)));
}

#[test]
fn duplicate_host_identifier_replaces_previous_connection() {
	let mut h = Harness::new();
	let first = h.host("file-1");
	let second = h.open();

	let out = h.send(second, json!({"type": "hello", "role": "host", "clientId": "file-1", "label": "Second"}));

	assert_eq!(
		out,
		vec![
			Outbound::Close {
				conn: first,
				reason: CloseReason::Replaced,
			},
			ack(second),
		]
	);
	assert_eq!(h.broker.directory().get("file-1").map(|entry| entry.conn), Some(second));

	// The replaced socket closing later must not evict its successor.
	assert!(h.close(first).is_empty());
	let clients = h.broker.directory().clients();
	assert_eq!(clients.len(), 1);
	assert_eq!(clients[0].label, "Second");
}

#[test]
fn replaced_host_close_keeps_requests_routed_to_successor() {
	let mut h = Harness::new();
	let first = h.host("file-1");
	let second = h.host("file-1");
	let driver = h.driver();

	let out = h.send(driver, eval("r1", "1"));
	assert_eq!(out, vec![forward(second, "r1", "1")]);

	assert!(h.close(first).is_empty());
	assert_eq!(h.broker.correlator().len(), 1);
}

#[test]
fn unknown_role_is_acked_and_stays_unassigned() {
	let mut h = Harness::new();
	let host = h.host("file-1");
	let peer = h.open();

	let out = h.send(peer, json!({"type": "hello", "role": "observer"}));
	assert_eq!(out, vec![ack(peer)]);
	assert_eq!(h.broker.registry().get(peer).map(|c| c.role().clone()), Some(PeerRole::Unassigned));

	// Unassigned peers may still submit.
	assert_eq!(h.send(peer, eval("r1", "2")), vec![forward(host, "r1", "2")]);
}

#[test]
fn conflicting_second_hello_is_acked_and_ignored() {
	let mut h = Harness::new();
	let host = h.host("file-1");

	let out = h.send(host, json!({"type": "hello", "role": "driver"}));
	assert_eq!(out, vec![ack(host)]);
	assert_eq!(h.broker.registry().get(host).and_then(|c| c.client_id()), Some("file-1"));

	let out = h.send(host, json!({"type": "hello", "role": "host", "clientId": "file-2"}));
	assert_eq!(out, vec![ack(host)]);
	assert!(h.broker.directory().get("file-2").is_none());
}

#[test]
fn submit_without_hosts_fails_immediately() {
	let mut h = Harness::new();
	let driver = h.driver();

	let out = h.send(driver, eval("r1", "1+1"));

	let response = response_to(&out, driver);
	assert_eq!(response.id, "r1");
	assert!(!response.ok);
	assert_eq!(error_of(&response), ("ResolutionError".to_string(), "no hosts connected".to_string()));
	assert!(h.broker.correlator().is_empty());
	assert_eq!(h.broker.clock_mut().armed_count(), 0);
}

#[test]
fn ambiguous_target_is_rejected_without_forwarding() {
	let mut h = Harness::new();
	h.host("file-1");
	h.host("file-2");
	let driver = h.driver();

	let out = h.send(driver, eval("r1", "1"));

	let response = response_to(&out, driver);
	assert_eq!(error_of(&response).1, "multiple hosts connected; identifier required");
	assert!(h.broker.correlator().is_empty());
}

#[test]
fn unknown_identifier_is_rejected() {
	let mut h = Harness::new();
	h.host("file-1");
	let driver = h.driver();

	let out = h.send(driver, json!({"type": "eval_request", "id": "r1", "clientId": "file-9", "script": "1"}));

	assert_eq!(error_of(&response_to(&out, driver)).1, "unknown identifier: file-9");
}

#[test]
fn explicit_identifier_selects_host() {
	let mut h = Harness::new();
	h.host("file-1");
	let second = h.host("file-2");
	let driver = h.driver();

	let out = h.send(driver, json!({"type": "eval_request", "id": "r1", "clientId": "file-2", "script": "x"}));

	assert_eq!(out, vec![forward(second, "r1", "x")]);
	assert_eq!(h.broker.correlator().get("r1").map(|p| p.client_id.as_str()), Some("file-2"));
}

#[test]
fn host_response_is_relayed_to_origin() {
	let mut h = Harness::new();
	let host = h.host("file-1");
	let driver = h.driver();

	assert_eq!(h.send(driver, eval("r1", "40 + 2")), vec![forward(host, "r1", "40 + 2")]);

	let out = h.send(host, json!({"type": "eval_response", "id": "r1", "ok": true, "result": 42, "logs": ["hi"]}));

	let response = response_to(&out, driver);
	assert!(response.ok);
	assert_eq!(response.result, Some(json!(42)));
	assert_eq!(response.logs, vec![json!("hi")]);
	assert!(h.broker.correlator().is_empty());
	assert!(!h.broker.clock_mut().is_armed("r1"));
}

#[test]
fn explicit_null_result_survives_relay() {
	let mut h = Harness::new();
	let host = h.host("file-1");
	let driver = h.driver();
	h.send(driver, eval("r1", "undefined"));

	let out = h.send(host, json!({"type": "eval_response", "id": "r1", "ok": true, "result": null}));

	let response = response_to(&out, driver);
	assert_eq!(response.result, Some(Value::Null));
	assert!(response.logs.is_empty());
}

#[test]
fn missing_request_id_is_generated() {
	let mut h = Harness::new();
	let host = h.host("file-1");
	let driver = h.driver();

	let first = h.send(driver, json!({"type": "eval_request", "script": "1"}));
	let second = h.send(driver, json!({"type": "eval_request", "id": "", "script": "2"}));

	assert_eq!(first, vec![forward(host, "req-1", "1")]);
	assert_eq!(second, vec![forward(host, "req-2", "2")]);
	assert_eq!(h.broker.correlator().len(), 2);
}

#[test]
fn duplicate_pending_id_is_rejected() {
	let mut h = Harness::new();
	h.host("file-1");
	let driver = h.driver();
	h.send(driver, eval("r1", "1"));

	let out = h.send(driver, eval("r1", "2"));

	let response = response_to(&out, driver);
	assert_eq!(error_of(&response).0, "DuplicateRequestError");
	assert_eq!(h.broker.correlator().len(), 1);
}

#[test]
fn hosts_cannot_submit() {
	let mut h = Harness::new();
	let host = h.host("file-1");

	let out = h.send(host, eval("r1", "1"));

	let response = response_to(&out, host);
	assert_eq!(error_of(&response).0, "ValidationError");
	assert!(h.broker.correlator().is_empty());
}

#[test]
fn pending_request_times_out_once() {
	let mut h = Harness::new();
	let host = h.host("file-1");
	let driver = h.driver();
	h.send(driver, eval("r1", "while(true){}"));

	assert!(h.advance(Duration::from_secs(29)).is_empty());
	let out = h.advance(Duration::from_secs(1));

	let response = response_to(&out, driver);
	assert_eq!(response.id, "r1");
	assert_eq!(error_of(&response), ("TimeoutError".to_string(), "request timed out after 30000ms".to_string()));
	assert!(h.broker.correlator().is_empty());

	// A late reply is dropped.
	assert!(h.send(host, json!({"type": "eval_response", "id": "r1", "ok": true})).is_empty());
}

#[test]
fn stale_deadline_does_not_expire_reused_id() {
	let mut h = Harness::new();
	let host = h.host("file-1");
	let driver = h.driver();

	h.send(driver, eval("r1", "a"));
	let stale = DeadlineKey {
		request_id: "r1".to_string(),
		seq: 1,
	};
	h.send(host, json!({"type": "eval_response", "id": "r1", "ok": true}));
	h.send(driver, eval("r1", "b"));

	assert!(h.broker.handle(Event::DeadlineFired(stale)).is_empty());
	assert_eq!(h.broker.correlator().len(), 1);
}

#[test]
fn host_disconnect_fails_its_requests() {
	let mut h = Harness::new();
	let target = h.host("file-1");
	let other = h.host("file-2");
	let first = h.driver();
	let second = h.driver();
	h.send(first, json!({"type": "eval_request", "id": "a", "clientId": "file-1", "script": "1"}));
	h.send(second, json!({"type": "eval_request", "id": "b", "clientId": "file-1", "script": "2"}));
	h.send(first, json!({"type": "eval_request", "id": "c", "clientId": "file-2", "script": "3"}));

	let out = h.close(target);

	let delivered: Vec<(ConnId, String)> = out
		.iter()
		.map(|outbound| match outbound {
			Outbound::Send {
				to,
				frame: ServerFrame::EvalResponse(response),
			} => {
				assert_eq!(error_of(response), ("DisconnectError".to_string(), "host disconnected: file-1".to_string()));
				(*to, response.id.clone())
			}
			other => panic!("unexpected effect {other:?}"),
		})
		.collect();
	assert_eq!(delivered.len(), 2);
	assert!(delivered.contains(&(first, "a".to_string())));
	assert!(delivered.contains(&(second, "b".to_string())));
	assert!(h.broker.directory().get("file-1").is_none());
	assert_eq!(h.broker.correlator().len(), 1);
	assert_eq!(h.broker.clock_mut().armed_count(), 1);
	assert_eq!(h.broker.directory().get("file-2").map(|e| e.conn), Some(other));
}

#[test]
fn origin_close_drops_its_requests_silently() {
	let mut h = Harness::new();
	let host = h.host("file-1");
	let driver = h.driver();
	h.send(driver, eval("r1", "1"));

	assert!(h.close(driver).is_empty());
	assert!(h.broker.correlator().is_empty());
	assert_eq!(h.broker.clock_mut().armed_count(), 0);

	// Neither the host's answer nor the passing deadline produce anything.
	assert!(h.send(host, json!({"type": "eval_response", "id": "r1", "ok": true})).is_empty());
	assert!(h.advance(TIMEOUT).is_empty());
}

#[test]
fn response_from_non_host_is_ignored() {
	let mut h = Harness::new();
	h.host("file-1");
	let driver = h.driver();
	let intruder = h.driver();
	h.send(driver, eval("r1", "1"));

	assert!(h.send(intruder, json!({"type": "eval_response", "id": "r1", "ok": true})).is_empty());
	assert_eq!(h.broker.correlator().len(), 1);
}

#[test]
fn invalid_frames_are_dropped() {
	let mut h = Harness::new();
	let driver = h.driver();

	for text in ["not json", "[1,2]", "{\"id\":1}", "{\"type\":\"shutdown\"}", "{\"type\":7}"] {
		assert!(h.send_text(driver, text).is_empty(), "{text}");
	}
	assert_eq!(h.broker.registry().len(), 1);
}

#[test]
fn frames_from_unknown_connection_are_dropped() {
	let mut h = Harness::new();
	assert!(h.send(ConnId::new(77), json!({"type": "status_request"})).is_empty());
}

#[test]
fn client_update_relabels_registered_host() {
	let mut h = Harness::new();
	let host = h.host("file-1");

	assert!(h.send(host, json!({"type": "client_update", "clientId": "file-1", "label": "Renamed"})).is_empty());
	assert!(h.send(host, json!({"type": "client_update", "clientId": "file-9", "label": "Ghost"})).is_empty());

	let clients = h.broker.directory().clients();
	assert_eq!(clients.len(), 1);
	assert_eq!(clients[0].label, "Renamed");
	assert_eq!(h.broker.registry().get(host).map(|c| c.label().to_string()), Some("Renamed".to_string()));
}

#[test]
fn status_reports_directory_in_identifier_order() {
	let mut h = Harness::new();
	h.host("zeta");
	h.host("alpha");
	let driver = h.driver();

	let out = h.send(driver, json!({"type": "status_request", "id": "s1"}));

	let [Outbound::Send {
		to,
		frame: ServerFrame::StatusResponse(status),
	}] = out.as_slice()
	else {
		panic!("expected a status response, got {out:?}");
	};
	assert_eq!(*to, driver);
	assert_eq!(status.id, "s1");
	assert_eq!(status.daemon.pid, Some(4242));
	assert!(status.daemon.listening);
	let ids: Vec<&str> = status.clients.iter().map(|c| c.client_id.as_str()).collect();
	assert_eq!(ids, vec!["alpha", "zeta"]);
}

#[test]
fn status_without_id_gets_one() {
	let mut h = Harness::new();
	let driver = h.driver();

	let out = h.send(driver, json!({"type": "status_request"}));

	match out.as_slice() {
		[Outbound::Send {
			frame: ServerFrame::StatusResponse(status),
			..
		}] => assert!(!status.id.is_empty()),
		other => panic!("unexpected effects {other:?}"),
	}
}

#[test]
fn closing_twice_is_harmless() {
	let mut h = Harness::new();
	let host = h.host("file-1");

	assert!(h.close(host).is_empty());
	assert!(h.close(host).is_empty());
	assert!(h.broker.registry().is_empty());
}
