//! Shot-by-shot circuit execution.
//!
//! Every shot replays the full instruction list on a fresh statevector, so
//! mid-circuit measurement and peer messaging fall out naturally: a
//! measurement collapses the state of that shot, and a dynamic circuit
//! performs one exchange per shot, in lockstep with the shots of the peer
//! running the other half.

use std::time::Instant;

use rand::rngs::ThreadRng;
use rustc_hash::FxHashMap;
use serde_json::{json, Map, Value};
use tracing::debug;

use sleipnir_net::ClassicalChannel;
use sleipnir_task::{Instruction, QuantumTask};

use crate::error::{SimError, SimResult};
use crate::statevector::Statevector;

/// Execute a self-contained task.
pub fn run(task: &QuantumTask) -> SimResult<Value> {
    run_with(task, None)
}

/// Execute a task that may exchange measurements over `channel`.
pub fn run_dynamic(task: &QuantumTask, channel: &mut ClassicalChannel) -> SimResult<Value> {
    run_with(task, Some(channel))
}

fn run_with(task: &QuantumTask, mut channel: Option<&mut ClassicalChannel>) -> SimResult<Value> {
    let num_qubits = required_qubits(&task.instructions);
    let num_clbits = effective_clbits(task);
    let shots = task.shots();
    debug!(
        "executing task {}: {} qubits, {} clbits, {} shots",
        task.id, num_qubits, num_clbits, shots
    );

    let start = Instant::now();
    let mut rng = rand::thread_rng();
    let mut counts: FxHashMap<u128, u64> = FxHashMap::default();

    for _ in 0..shots {
        let mut sv = Statevector::new(num_qubits)?;
        let mut creg: u128 = 0;
        for instruction in &task.instructions {
            apply(
                &mut sv,
                instruction,
                &mut creg,
                channel.as_deref_mut(),
                &mut rng,
            )?;
        }
        *counts.entry(creg).or_insert(0) += 1;
    }

    Ok(result_document(&counts, shots, start.elapsed().as_secs_f64()))
}

/// Apply one instruction within a shot.
fn apply(
    sv: &mut Statevector,
    instruction: &Instruction,
    creg: &mut u128,
    channel: Option<&mut ClassicalChannel>,
    rng: &mut ThreadRng,
) -> SimResult<()> {
    match instruction.name.as_str() {
        "measure" => {
            let bit = sv.measure(operand(instruction)?, rng)?;
            record_bit(creg, instruction, bit)
        }
        "measure_and_send" => {
            let channel = channel.ok_or_else(|| channel_required(instruction))?;
            let target = routing(instruction)?;
            let bit = sv.measure(operand(instruction)?, rng)?;
            if instruction.memory.is_some() {
                record_bit(creg, instruction, bit)?;
            }
            channel.send_measure(u32::from(bit), target)?;
            Ok(())
        }
        "remote_c_if" => {
            let channel = channel.ok_or_else(|| channel_required(instruction))?;
            let origin = routing(instruction)?;
            let bit = channel.recv_measure(origin)?;
            if bit & 1 == 1 {
                let gate = instruction
                    .conditional_gate
                    .as_deref()
                    .ok_or(SimError::MissingConditionalGate)?;
                sv.apply_gate(gate, &instruction.qubits, instruction.params.as_deref())?;
            }
            Ok(())
        }
        "reset" => sv.reset(operand(instruction)?, rng),
        _ => sv.apply_gate(
            &instruction.name,
            &instruction.qubits,
            instruction.params.as_deref(),
        ),
    }
}

/// Store a measured bit at its classical register position.
///
/// The register is a u128, so a position past bit 127 cannot be stored;
/// such an index can only come from a malformed task and is answered as
/// one.
fn record_bit(creg: &mut u128, instruction: &Instruction, bit: u8) -> SimResult<()> {
    let position = instruction
        .memory
        .as_ref()
        .and_then(|memory| memory.first().copied())
        .or_else(|| instruction.qubits.first().copied())
        .unwrap_or(0);
    if position >= 128 {
        return Err(SimError::ClbitOutOfRange(position));
    }
    if bit == 1 {
        *creg |= 1u128 << position;
    } else {
        *creg &= !(1u128 << position);
    }
    Ok(())
}

fn operand(instruction: &Instruction) -> SimResult<usize> {
    instruction
        .qubits
        .first()
        .copied()
        .ok_or_else(|| SimError::MissingOperands {
            gate: instruction.name.clone(),
            expected: 1,
            got: instruction.qubits.len(),
        })
}

fn routing(instruction: &Instruction) -> SimResult<&str> {
    instruction
        .qpus
        .as_ref()
        .and_then(|qpus| qpus.first())
        .map(String::as_str)
        .ok_or_else(|| SimError::MissingRouting(instruction.name.clone()))
}

fn channel_required(instruction: &Instruction) -> SimError {
    SimError::ChannelRequired(instruction.name.clone())
}

/// Width of the register implied by the instruction operands.
pub(crate) fn required_qubits(instructions: &[Instruction]) -> usize {
    instructions
        .iter()
        .flat_map(|instruction| instruction.qubits.iter())
        .map(|qubit| qubit + 1)
        .max()
        .unwrap_or(1)
}

/// Classical register width: configured, or implied by measurements.
pub(crate) fn effective_clbits(task: &QuantumTask) -> usize {
    let configured = task.num_clbits();
    if configured > 0 {
        return configured;
    }
    task.instructions
        .iter()
        .filter_map(|instruction| instruction.memory.as_ref())
        .flat_map(|memory| memory.iter())
        .map(|clbit| clbit + 1)
        .max()
        .unwrap_or(0)
}

/// Render the per-shot classical registers as a kernel result document.
///
/// Count keys are hex-encoded; the backend adapter widens them into the
/// bitstrings clients consume.
pub(crate) fn result_document(counts: &FxHashMap<u128, u64>, shots: u64, time_taken: f64) -> Value {
    let mut rendered = Map::new();
    let mut keys: Vec<_> = counts.keys().copied().collect();
    keys.sort_unstable();
    for key in keys {
        rendered.insert(format!("{key:#x}"), json!(counts[&key]));
    }
    json!({
        "results": [{
            "data": { "counts": Value::Object(rendered) },
            "shots": shots,
            "time_taken": time_taken,
            "success": true,
        }],
        "success": true,
    })
}
