//! QuantumTask parsing, rebinding and peer endpoint rewrite.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use sleipnir_registry as registry;

use crate::error::{TaskError, TaskResult};
use crate::instruction::Instruction;

/// A circuit plus execution configuration, as submitted by one client.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QuantumTask {
    /// Submitter-chosen task id, unique per session.
    #[serde(default)]
    pub id: String,

    /// Opaque configuration forwarded to the backend. Carries at least
    /// `shots`, `method` and `num_clbits`.
    #[serde(default)]
    pub config: Map<String, Value>,

    /// The circuit, in execution order.
    #[serde(default)]
    pub instructions: Vec<Instruction>,

    /// Peers this task pushes measurements to. Logical ids on submission,
    /// communications endpoints after ingress.
    #[serde(default)]
    pub sending_to: Vec<String>,

    /// Whether the circuit contains conditionals or peer messaging.
    #[serde(default)]
    pub is_dynamic: bool,

    /// Whether peer identifiers must be rewritten on receipt.
    #[serde(default, skip_serializing)]
    pub has_cc: bool,
}

impl QuantumTask {
    /// Parse an ingress message, updating this task in place.
    ///
    /// A full task replaces the stored circuit; when it declares `has_cc`
    /// its logical peer ids are resolved against the communications
    /// registry before anything else sees it. A `{"params": [...]}`
    /// message rebinds the stored circuit instead.
    pub fn ingest(&mut self, message: &str) -> TaskResult<()> {
        let value: Value = serde_json::from_str(message)?;

        if value.get("instructions").is_some() && value.get("config").is_some() {
            *self = serde_json::from_value(value)?;
            if self.has_cc {
                let snapshot = registry::read_snapshot(&registry::communications_path())?;
                self.resolve_peers(&snapshot)?;
            }
            Ok(())
        } else if let Some(params) = value.get("params") {
            let params: Vec<f64> = serde_json::from_value(params.clone())?;
            self.rebind_params(&params)
        } else {
            Err(TaskError::MalformedMessage)
        }
    }

    /// Requested shot count (defaults to 1024).
    pub fn shots(&self) -> u64 {
        self.config
            .get("shots")
            .and_then(Value::as_u64)
            .unwrap_or(1024)
    }

    /// Width of the classical register.
    pub fn num_clbits(&self) -> usize {
        self.config
            .get("num_clbits")
            .and_then(Value::as_u64)
            .unwrap_or(0) as usize
    }

    /// Rebind rotation angles positionally over the stored circuit.
    ///
    /// Each parametric gate consumes its arity's worth of values; the
    /// vector length must match the total exactly, otherwise the task
    /// fails without modifying anything.
    pub fn rebind_params(&mut self, params: &[f64]) -> TaskResult<()> {
        if self.instructions.is_empty() {
            return Err(TaskError::CircuitMissing);
        }
        let expected: usize = self.instructions.iter().map(Instruction::param_arity).sum();
        if expected != params.len() {
            return Err(TaskError::ParamArity {
                expected,
                got: params.len(),
            });
        }

        let mut cursor = 0;
        for instruction in &mut self.instructions {
            let arity = instruction.param_arity();
            if arity == 0 {
                continue;
            }
            let values = instruction
                .params
                .as_mut()
                .ok_or_else(|| TaskError::MissingParams(instruction.name.clone()))?;
            values.resize(arity, 0.0);
            values.copy_from_slice(&params[cursor..cursor + arity]);
            cursor += arity;
        }
        debug!("rebound {} parameters on task {}", params.len(), self.id);
        Ok(())
    }

    /// Rewrite logical peer ids into concrete endpoints.
    ///
    /// Instruction routing prefers a peer's `executor_endpoint` (present
    /// when the peer delegates to an executor) over its own
    /// `communications_endpoint`; `sending_to` always resolves to the
    /// peer's own channel.
    pub fn resolve_peers(&mut self, snapshot: &Value) -> TaskResult<()> {
        for instruction in &mut self.instructions {
            if let Some(qpus) = instruction.qpus.as_mut() {
                for peer in qpus.iter_mut() {
                    *peer = lookup_endpoint(snapshot, peer, true)?;
                }
            }
        }
        for peer in &mut self.sending_to {
            *peer = lookup_endpoint(snapshot, peer, false)?;
        }
        Ok(())
    }

    /// Serialise for transport to an executor.
    ///
    /// An empty circuit renders as the empty string, which an executor
    /// interprets as "nothing to contribute this round".
    pub fn to_wire_string(&self) -> TaskResult<String> {
        if self.instructions.is_empty() {
            return Ok(String::new());
        }
        let document = serde_json::json!({
            "id": self.id,
            "config": self.config,
            "instructions": self.instructions,
            "sending_to": self.sending_to,
            "is_dynamic": self.is_dynamic,
        });
        Ok(document.to_string())
    }
}

/// Resolve one logical id against the communications snapshot.
fn lookup_endpoint(snapshot: &Value, peer: &str, prefer_executor: bool) -> TaskResult<String> {
    // Already-concrete endpoints pass through untouched so the rewrite
    // stays idempotent.
    if peer.starts_with("tcp://") {
        return Ok(peer.to_string());
    }
    let entry = snapshot
        .get(peer)
        .ok_or_else(|| TaskError::UnknownPeer(peer.to_string()))?;

    let endpoint = if prefer_executor {
        entry
            .get("executor_endpoint")
            .or_else(|| entry.get("communications_endpoint"))
    } else {
        entry.get("communications_endpoint")
    };
    endpoint
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| TaskError::MissingEndpoint(peer.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn bell_task_json() -> String {
        json!({
            "id": "t1",
            "config": {"shots": 1000, "method": "statevector", "num_clbits": 2,
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
    fn test_ingest_full_task() {
        let mut task = QuantumTask::default();
        task.ingest(&bell_task_json()).unwrap();

        assert_eq!(task.id, "t1");
        assert_eq!(task.shots(), 1000);
        assert_eq!(task.num_clbits(), 2);
        assert_eq!(task.instructions.len(), 4);
        assert!(!task.is_dynamic);
    }

    #[test]
    fn test_ingest_garbage_is_protocol_error() {
        let mut task = QuantumTask::default();
        assert!(matches!(
            task.ingest(r#"{"circuits": []}"#),
            Err(TaskError::MalformedMessage)
        ));
        assert!(matches!(task.ingest("not json"), Err(TaskError::Json(_))));
    }

    #[test]
    fn test_params_before_circuit_fails() {
        let mut task = QuantumTask::default();
        assert!(matches!(
            task.ingest(r#"{"params": [1.0]}"#),
            Err(TaskError::CircuitMissing)
        ));
    }

    #[test]
    fn test_rebind_positional_arity() {
        let mut task = QuantumTask::default();
        task.ingest(
            &json!({
                "id": "t2",
                "config": {"shots": 10, "num_clbits": 1},
                "instructions": [
                    {"name": "rx", "qubits": [0], "params": [0.0]},
                    {"name": "h", "qubits": [0]},
                    {"name": "r", "qubits": [0], "params": [0.0, 0.0]},
                    {"name": "u", "qubits": [0], "params": [0.0, 0.0, 0.0]}
                ]
            })
            .to_string(),
        )
        .unwrap();

        // rx consumes 1, r consumes 2, u consumes 3.
        task.ingest(r#"{"params": [0.1, 0.2, 0.3, 0.4, 0.5, 0.6]}"#)
            .unwrap();
        assert_eq!(task.instructions[0].params, Some(vec![0.1]));
        assert_eq!(task.instructions[2].params, Some(vec![0.2, 0.3]));
        assert_eq!(task.instructions[3].params, Some(vec![0.4, 0.5, 0.6]));
    }

    #[test]
    fn test_rebind_wrong_length_fails_without_touching_circuit() {
        let mut task = QuantumTask::default();
        task.ingest(
            &json!({
                "id": "t3",
                "config": {},
                "instructions": [{"name": "rx", "qubits": [0], "params": [1.5]}]
            })
            .to_string(),
        )
        .unwrap();

        let err = task.ingest(r#"{"params": [0.1, 0.2]}"#).unwrap_err();
        assert!(matches!(
            err,
            TaskError::ParamArity {
                expected: 1,
                got: 2
            }
        ));
        assert_eq!(task.instructions[0].params, Some(vec![1.5]));
    }

    #[test]
    fn test_rebind_empty_params_on_non_parametric_circuit() {
        let mut task = QuantumTask::default();
        task.ingest(&bell_task_json()).unwrap();
        task.ingest(r#"{"params": []}"#).unwrap();
    }

    #[test]
    fn test_resolve_peers_prefers_executor_for_instructions() {
        let snapshot = json!({
            "1234_77_a": {
                "communications_endpoint": "tcp://10.0.0.1:4001",
                "executor_endpoint": "tcp://10.0.0.9:5001"
            },
            "1234_78_b": {"communications_endpoint": "tcp://10.0.0.2:4002"}
        });

        let mut task: QuantumTask = serde_json::from_value(json!({
            "id": "t4",
            "config": {},
            "instructions": [
                {"name": "measure_and_send", "qubits": [0], "qpus": ["1234_77_a"]},
                {"name": "remote_c_if", "qubits": [1], "qpus": ["1234_78_b"],
                 "conditional_gate": "x"}
            ],
            "sending_to": ["1234_77_a"],
            "is_dynamic": true
        }))
        .unwrap();

        task.resolve_peers(&snapshot).unwrap();

        assert_eq!(
            task.instructions[0].qpus,
            Some(vec!["tcp://10.0.0.9:5001".to_string()])
        );
        assert_eq!(
            task.instructions[1].qpus,
            Some(vec!["tcp://10.0.0.2:4002".to_string()])
        );
        // sending_to always takes the peer's own channel.
        assert_eq!(task.sending_to, vec!["tcp://10.0.0.1:4001"]);
    }

    #[test]
    fn test_resolve_unknown_peer_is_error() {
        let snapshot = json!({});
        let mut task: QuantumTask = serde_json::from_value(json!({
            "id": "t5",
            "config": {},
            "instructions": [],
            "sending_to": ["ghost"]
        }))
        .unwrap();

        assert!(matches!(
            task.resolve_peers(&snapshot),
            Err(TaskError::UnknownPeer(peer)) if peer == "ghost"
        ));
    }

    #[test]
    fn test_wire_string_round_trips() {
        let mut task = QuantumTask::default();
        task.ingest(&bell_task_json()).unwrap();

        let wire = task.to_wire_string().unwrap();
        let mut reparsed = QuantumTask::default();
        reparsed.ingest(&wire).unwrap();

        assert_eq!(reparsed.id, task.id);
        assert_eq!(reparsed.instructions, task.instructions);
        assert!(!reparsed.has_cc);
    }

    #[test]
    fn test_empty_circuit_has_empty_wire_form() {
        let task = QuantumTask::default();
        assert_eq!(task.to_wire_string().unwrap(), "");
    }
}
