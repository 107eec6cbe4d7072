//! End-to-end scenarios over real sockets and registry files.
//!
//! Every test talks to a QPU the way an external submitter would: one JSON
//! document per frame on the client socket. The registry files live in a
//! per-run temporary directory exported through `STORE` before any process
//! component starts.

use std::net::TcpStream;
use std::sync::mpsc;
use std::sync::Once;
use std::thread;
use std::time::{Duration, Instant};

use serde_json::{json, Value};

use sleipnir_net::frame::{read_frame, write_frame};
use sleipnir_qpu::{CcBackend, Executor, QcBackend, Qpu, SimpleBackend};
use sleipnir_registry as registry;

static STORE: Once = Once::new();

/// Point `STORE` at a temporary directory shared by the whole test binary.
fn init_store() {
    STORE.call_once(|| {
        let dir = tempfile::tempdir().unwrap();
        std::env::set_var("STORE", dir.path());
        std::mem::forget(dir);
    });
}

/// Minimal submitter speaking the client wire protocol.
struct Client {
    stream: TcpStream,
}

impl Client {
    fn connect(endpoint: &str) -> Self {
        let stream = TcpStream::connect(endpoint.trim_start_matches("tcp://")).unwrap();
        Self { stream }
    }

    fn submit(&mut self, document: &str) -> Value {
        write_frame(&mut self.stream, document.as_bytes()).unwrap();
        let reply = read_frame(&mut self.stream).unwrap();
        serde_json::from_slice(&reply).unwrap()
    }

    fn close(mut self) {
        write_frame(&mut self.stream, b"CLOSE").unwrap();
    }
}

fn spawn_simple_qpu(family: &str) -> String {
    init_store();
    let qpu = Qpu::new(Box::new(SimpleBackend::new()), "hpc", "qpu-test", family).unwrap();
    let endpoint = qpu.endpoint().to_string();
    thread::spawn(move || {
        let _ = qpu.turn_on();
    });
    endpoint
}

fn counts(reply: &Value) -> &serde_json::Map<String, Value> {
    reply["results"][0]["data"]["counts"].as_object().unwrap()
}

fn bell_task(shots: u64) -> String {
    json!({
        "id": "t1",
        "config": {"shots": shots, "method": "statevector", "num_clbits": 2,
                   "avoid_parallelization": false},
        "instructions": [
            {"name": "h", "qubits": [0]},
            {"name": "cx", "qubits": [0, 1]},
            {"name": "measure", "qubits": [0], "memory": [0]},
            {"name": "measure", "qubits": [1], "memory": [1]}
        ],
        "sending_to": [],
        "is_dynamic": false,
        "has_cc": false
    })
    .to_string()
}

#[test]
fn test_single_shot_bell_state() {
    let endpoint = spawn_simple_qpu("bell");
    let mut client = Client::connect(&endpoint);

    let reply = client.submit(&bell_task(1000));
    let counts = counts(&reply);

    let zeros = counts.get("00").and_then(Value::as_u64).unwrap_or(0);
    let ones = counts.get("11").and_then(Value::as_u64).unwrap_or(0);
    assert_eq!(counts.len(), 2, "only correlated outcomes may appear");
    assert_eq!(zeros + ones, 1000);
    // Each outcome is binomial(1000, 0.5); 3 sigma around 500 is about 47.
    assert!((453..=547).contains(&zeros), "zeros = {zeros}");
}

#[test]
fn test_parameter_rebinding_round() {
    let endpoint = spawn_simple_qpu("rebind");
    let mut client = Client::connect(&endpoint);

    // No parametric gates: an empty update re-runs the same circuit.
    let first = client.submit(&bell_task(100));
    assert!(first.get("ERROR").is_none());
    let second = client.submit(&json!({"params": []}).to_string());
    assert!(second.get("ERROR").is_none());
    let replayed = counts(&second);
    assert_eq!(
        replayed.values().filter_map(Value::as_u64).sum::<u64>(),
        100
    );

    // One rx gate, rebound from 0 to pi: counts flip from all-0 to all-1.
    let rx_circuit = json!({
        "id": "t2",
        "config": {"shots": 64, "num_clbits": 1},
        "instructions": [
            {"name": "rx", "qubits": [0], "params": [0.0]},
            {"name": "measure", "qubits": [0], "memory": [0]}
        ]
    })
    .to_string();
    let at_zero = client.submit(&rx_circuit);
    assert_eq!(counts(&at_zero)["0"], 64);

    let at_pi = client.submit(&json!({"params": [1.5707963*2.0]}).to_string());
    assert_eq!(counts(&at_pi)["1"], 64);

    // Arity violation: rejected with an error document, QPU stays up.
    let bad = client.submit(&json!({"params": [0.1, 0.2]}).to_string());
    assert!(bad.get("ERROR").is_some());
    let still_alive = client.submit(&json!({"params": [0.0]}).to_string());
    assert_eq!(counts(&still_alive)["0"], 64);
}

#[test]
fn test_close_then_new_client() {
    let endpoint = spawn_simple_qpu("close");

    let mut first = Client::connect(&endpoint);
    let reply = first.submit(&bell_task(50));
    assert!(reply.get("ERROR").is_none());
    first.close();

    let mut second = Client::connect(&endpoint);
    let reply = second.submit(&bell_task(50));
    assert!(reply.get("ERROR").is_none());
    assert_eq!(
        counts(&reply).values().filter_map(Value::as_u64).sum::<u64>(),
        50
    );
}

#[test]
fn test_error_reply_keeps_qpu_alive() {
    let endpoint = spawn_simple_qpu("errors");
    let mut client = Client::connect(&endpoint);

    let reply = client.submit(
        &json!({
            "id": "bad",
            "config": {"shots": 1, "num_clbits": 1},
            "instructions": [{"name": "frobnicate", "qubits": [0]}]
        })
        .to_string(),
    );
    assert!(reply["ERROR"].as_str().unwrap().contains("frobnicate"));

    // A two-qubit gate with one operand must be answered, not crash the
    // compute thread.
    let reply = client.submit(
        &json!({
            "id": "short",
            "config": {"shots": 1, "num_clbits": 2},
            "instructions": [{"name": "cx", "qubits": [0]}]
        })
        .to_string(),
    );
    assert!(reply["ERROR"].as_str().unwrap().contains("cx"));

    // Same for a measurement into a classical bit past the register.
    let reply = client.submit(
        &json!({
            "id": "wide",
            "config": {"shots": 1, "num_clbits": 1},
            "instructions": [
                {"name": "measure", "qubits": [0], "memory": [200]}
            ]
        })
        .to_string(),
    );
    assert!(reply["ERROR"].as_str().unwrap().contains("200"));

    let recovered = client.submit(&bell_task(10));
    assert!(recovered.get("ERROR").is_none());
}

#[test]
fn test_cc_measurement_exchange() {
    init_store();

    // Two classically communicating QPUs. Their channels publish under
    // known suffixes, which is what tasks use as logical peer ids.
    let qpu_a = Qpu::new(
        Box::new(CcBackend::new("cc_a").unwrap()),
        "hpc",
        "qpu-a",
        "cc_a",
    )
    .unwrap();
    let qpu_b = Qpu::new(
        Box::new(CcBackend::new("cc_b").unwrap()),
        "hpc",
        "qpu-b",
        "cc_b",
    )
    .unwrap();
    let endpoint_a = qpu_a.endpoint().to_string();
    let endpoint_b = qpu_b.endpoint().to_string();
    thread::spawn(move || {
        let _ = qpu_a.turn_on();
    });
    thread::spawn(move || {
        let _ = qpu_b.turn_on();
    });

    let shots = 8;
    let sender_task = json!({
        "id": "send",
        "config": {"shots": shots, "num_clbits": 1},
        "instructions": [
            {"name": "x", "qubits": [0]},
            {"name": "measure_and_send", "qubits": [0],
             "qpus": ["UNKNOWN_UNKNOWN_cc_b"]}
        ],
        "sending_to": ["UNKNOWN_UNKNOWN_cc_b"],
        "is_dynamic": true,
        "has_cc": true
    })
    .to_string();
    let receiver_task = json!({
        "id": "recv",
        "config": {"shots": shots, "num_clbits": 1},
        "instructions": [
            {"name": "remote_c_if", "qubits": [0],
             "qpus": ["UNKNOWN_UNKNOWN_cc_a"], "conditional_gate": "x"},
            {"name": "measure", "qubits": [0], "memory": [0]}
        ],
        "sending_to": [],
        "is_dynamic": true,
        "has_cc": true
    })
    .to_string();

    // The sender completes on its own (sends are buffered), so the
    // receiver finds every bit already waiting, shot by shot, in order.
    let mut client_a = Client::connect(&endpoint_a);
    let reply_a = client_a.submit(&sender_task);
    assert!(reply_a.get("ERROR").is_none(), "sender failed: {reply_a}");

    let mut client_b = Client::connect(&endpoint_b);
    let reply_b = client_b.submit(&receiver_task);
    assert!(reply_b.get("ERROR").is_none(), "receiver failed: {reply_b}");

    // The sender always measures 1, so the receiver always flips to 1.
    assert_eq!(counts(&reply_b)["1"], shots);

    // A logical id missing from the registry is answered, not fatal.
    let ghost_task = json!({
        "id": "ghost",
        "config": {"shots": 1, "num_clbits": 1},
        "instructions": [{"name": "x", "qubits": [0]}],
        "sending_to": ["no_such_qpu"],
        "is_dynamic": false,
        "has_cc": true
    })
    .to_string();
    let ghost_reply = client_a.submit(&ghost_task);
    assert!(ghost_reply["ERROR"]
        .as_str()
        .unwrap()
        .contains("no_such_qpu"));
    let recovered = client_a.submit(&bell_task(10));
    assert!(recovered.get("ERROR").is_none());
}

#[test]
fn test_executor_fan_in_fan_out() {
    init_store();

    // Two QC members of group "grp_x". Publishing with member-specific
    // suffixes that end in the group id gives each its own registry key
    // while staying selectable by the group filter.
    let (endpoints_tx, endpoints_rx) = mpsc::channel();
    for member in ["m1_grp_x", "m2_grp_x"] {
        let endpoints_tx = endpoints_tx.clone();
        thread::spawn(move || {
            // Blocks until the executor announces itself.
            let backend = QcBackend::new(member).unwrap();
            let qpu = Qpu::new(Box::new(backend), "hpc", member, member).unwrap();
            endpoints_tx.send(qpu.endpoint().to_string()).unwrap();
            let _ = qpu.turn_on();
        });
    }

    // Wait for both members to publish their channels.
    let deadline = Instant::now() + Duration::from_secs(10);
    loop {
        let published = registry::read_snapshot(&registry::communications_path())
            .ok()
            .and_then(|snapshot| {
                let entries = snapshot.as_object()?.clone();
                Some(
                    entries
                        .iter()
                        .filter(|(key, _)| key.ends_with("_grp_x"))
                        .count(),
                )
            })
            .unwrap_or(0);
        if published >= 2 {
            break;
        }
        assert!(Instant::now() < deadline, "members never published");
        thread::sleep(Duration::from_millis(20));
    }

    let executor = Executor::new(Some("grp_x")).unwrap();
    assert_eq!(executor.peers().len(), 2);
    thread::spawn(move || {
        let _ = executor.run();
    });

    let endpoint_1 = endpoints_rx.recv_timeout(Duration::from_secs(10)).unwrap();
    let endpoint_2 = endpoints_rx.recv_timeout(Duration::from_secs(10)).unwrap();

    fn member_task(id: &str) -> String {
        json!({
            "id": id,
            "config": {"shots": 16, "num_clbits": 1},
            "instructions": [
                {"name": "x", "qubits": [0]},
                {"name": "measure", "qubits": [0], "memory": [0]}
            ],
            "sending_to": [],
            "is_dynamic": false,
            "has_cc": false
        })
        .to_string()
    }

    // Submissions block until the executor has heard from both members.
    let reply_1 = thread::spawn(move || {
        Client::connect(&endpoint_1).submit(&member_task("m1"))
    });
    let reply_2 = thread::spawn(move || {
        Client::connect(&endpoint_2).submit(&member_task("m2"))
    });
    let reply_1 = reply_1.join().unwrap();
    let reply_2 = reply_2.join().unwrap();

    // Both members receive the same joint result within the round: two
    // concatenated one-bit registers, both always measuring 1.
    assert_eq!(reply_1, reply_2);
    assert_eq!(counts(&reply_1)["11"], 16);
}
