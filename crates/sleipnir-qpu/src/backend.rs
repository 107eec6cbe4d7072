//! Backend strategies.
//!
//! A backend turns a [`QuantumTask`] into a result document. The three
//! strategies differ only in how they reach the kernel: directly, wired to
//! peers, or through a group executor. They are deliberately thin; all the
//! numerics live in `sleipnir-sim`.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use sleipnir_net::ClassicalChannel;
use sleipnir_registry as registry;
use sleipnir_sim as sim;
use sleipnir_task::QuantumTask;

use crate::config::BASIS_GATES;
use crate::counts;
use crate::error::QpuResult;

/// Name the kernel reports in registry entries.
const SIMULATOR_NAME: &str = "statevector";

/// Execution strategy behind a QPU.
pub trait Backend: Send {
    /// Execute one task, returning the result document.
    fn execute(&mut self, task: &QuantumTask) -> QpuResult<Value>;

    /// Description published into the QPU's registry entry.
    fn to_json(&self) -> Value;
}

/// Static description of a backend, published for clients to inspect.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    pub name: String,
    pub version: String,
    pub n_qubits: usize,
    pub description: String,
    #[serde(default)]
    pub coupling_map: Vec<Vec<usize>>,
    pub basis_gates: Vec<String>,
    #[serde(default)]
    pub custom_instructions: String,
    #[serde(default)]
    pub noise_model: Value,
}

impl BackendConfig {
    fn describe(name: &str, description: &str) -> Self {
        Self {
            name: name.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            n_qubits: sim::statevector::MAX_QUBITS,
            description: description.to_string(),
            coupling_map: Vec::new(),
            basis_gates: BASIS_GATES.iter().map(|gate| gate.to_string()).collect(),
            custom_instructions: String::new(),
            noise_model: Value::Object(Default::default()),
        }
    }

    fn registry_json(&self) -> Value {
        let mut value = serde_json::to_value(self).unwrap_or_default();
        value["simulator"] = json!(SIMULATOR_NAME);
        value
    }
}

/// Local execution with no communication capabilities.
pub struct SimpleBackend {
    config: BackendConfig,
}

impl SimpleBackend {
    pub fn new() -> Self {
        Self {
            config: BackendConfig::describe(
                "SimpleBackend",
                "A simple backend with no communication capabilities.",
            ),
        }
    }
}

impl Default for SimpleBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl Backend for SimpleBackend {
    fn execute(&mut self, task: &QuantumTask) -> QpuResult<Value> {
        let mut result = sim::run(task)?;
        counts::to_bitstrings(&mut result, task.num_clbits())?;
        Ok(result)
    }

    fn to_json(&self) -> Value {
        self.config.registry_json()
    }
}

/// Local execution wired to peer QPUs for classical communication.
///
/// The channel is published at construction so peers can resolve this QPU
/// before it has seen any task.
pub struct CcBackend {
    config: BackendConfig,
    channel: ClassicalChannel,
}

impl CcBackend {
    pub fn new(group: &str) -> QpuResult<Self> {
        let channel = ClassicalChannel::new()?;
        channel.publish(group)?;
        Ok(Self {
            config: BackendConfig::describe(
                "CCBackend",
                "A backend with classical communication capabilities.",
            ),
            channel,
        })
    }
}

impl Backend for CcBackend {
    fn execute(&mut self, task: &QuantumTask) -> QpuResult<Value> {
        // Peers recognise this QPU by its published endpoint, so outbound
        // connections are stamped with the endpoint, not a symbolic id.
        self.channel.connect_all_forced(&task.sending_to)?;

        let mut result = if task.is_dynamic {
            sim::run_dynamic(task, &mut self.channel)?
        } else {
            sim::run(task)?
        };
        counts::to_bitstrings(&mut result, task.num_clbits())?;
        Ok(result)
    }

    fn to_json(&self) -> Value {
        self.config.registry_json()
    }
}

/// Delegation to a group executor for joint simulation.
///
/// Construction blocks until the executor announces itself: the executor
/// reads this QPU's published endpoint from the registry, connects, and
/// pushes its own endpoint, which this side then connects back to under
/// the id `"executor"`. The executor endpoint is also recorded in the
/// registry so ingress rewrite on *other* QPUs routes circuits here.
pub struct QcBackend {
    config: BackendConfig,
    channel: ClassicalChannel,
}

impl QcBackend {
    pub fn new(group: &str) -> QpuResult<Self> {
        let mut channel = ClassicalChannel::new()?;
        channel.publish(group)?;

        let executor_endpoint = channel.recv_info("executor")?;
        debug!("executor announced at {}", executor_endpoint);
        channel.connect(&executor_endpoint, "executor")?;
        registry::merge_into_entry(
            &registry::communications_path(),
            group,
            "executor_endpoint",
            json!(executor_endpoint),
        )?;

        Ok(Self {
            config: BackendConfig::describe(
                "QCBackend",
                "A backend with quantum communication capabilities.",
            ),
            channel,
        })
    }
}

impl Backend for QcBackend {
    fn execute(&mut self, task: &QuantumTask) -> QpuResult<Value> {
        let circuit = task.to_wire_string()?;
        debug!("delegating circuit {} to executor", task.id);

        self.channel.send_info(&circuit, "executor")?;
        if circuit.is_empty() {
            return Ok(Value::Null);
        }
        let results = self.channel.recv_info("executor")?;
        Ok(serde_json::from_str(&results)?)
    }

    fn to_json(&self) -> Value {
        self.config.registry_json()
    }
}
