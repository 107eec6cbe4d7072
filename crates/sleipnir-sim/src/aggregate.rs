//! Joint simulation of a QPU group.
//!
//! An executor collects one task per member QPU and simulates them as one
//! computation: member registers are packed side by side into a single
//! statevector, so entangling operations across members act on a shared
//! state. Peer messaging between members resolves in-process (their
//! routing was rewritten to the executor's own endpoint at ingress); a
//! target outside the group still goes over the classical channel.
//!
//! Member instruction streams are interleaved cooperatively: a member
//! blocks when it needs a bit that has not been produced yet and execution
//! switches to the next member. If every member is blocked at once the
//! messaging pattern is circular and the round fails.

use std::collections::VecDeque;
use std::time::Instant;

use rand::rngs::ThreadRng;
use rustc_hash::FxHashMap;
use serde_json::Value;
use tracing::debug;

use sleipnir_net::ClassicalChannel;
use sleipnir_task::{Instruction, QuantumTask};

use crate::engine::{effective_clbits, required_qubits, result_document};
use crate::error::{SimError, SimResult};
use crate::statevector::Statevector;

/// Total classical register width of a joint computation.
pub fn aggregate_clbits(tasks: &[QuantumTask]) -> usize {
    tasks.iter().map(effective_clbits).sum()
}

/// Simulate all member tasks as one computation.
///
/// Shots are taken from the first member; the group submits coherent
/// configurations. The result document covers the concatenated classical
/// register of every member, in member order.
pub fn run_aggregate(tasks: &[QuantumTask], channel: &mut ClassicalChannel) -> SimResult<Value> {
    let start = Instant::now();
    if tasks.is_empty() {
        return Ok(result_document(&FxHashMap::default(), 0, 0.0));
    }

    let mut qubit_offsets = Vec::with_capacity(tasks.len());
    let mut clbit_offsets = Vec::with_capacity(tasks.len());
    let mut total_qubits = 0;
    let mut total_clbits = 0;
    for task in tasks {
        qubit_offsets.push(total_qubits);
        clbit_offsets.push(total_clbits);
        total_qubits += required_qubits(&task.instructions);
        total_clbits += effective_clbits(task);
    }

    let shots = tasks[0].shots();
    debug!(
        "aggregate execution: {} members, {} qubits, {} clbits, {} shots",
        tasks.len(),
        total_qubits,
        total_clbits,
        shots
    );

    let mut rng = rand::thread_rng();
    let mut counts: FxHashMap<u128, u64> = FxHashMap::default();

    for _ in 0..shots {
        let mut sv = Statevector::new(total_qubits)?;
        let mut creg: u128 = 0;
        let mut cursors = vec![0usize; tasks.len()];
        let mut loopback: VecDeque<u8> = VecDeque::new();

        loop {
            let mut progress = false;
            for (member, task) in tasks.iter().enumerate() {
                while cursors[member] < task.instructions.len() {
                    let instruction = &task.instructions[cursors[member]];
                    if blocks_on_loopback(instruction, channel, &loopback) {
                        break;
                    }
                    apply_member(
                        &mut sv,
                        instruction,
                        qubit_offsets[member],
                        clbit_offsets[member],
                        &mut creg,
                        &mut loopback,
                        channel,
                        &mut rng,
                    )?;
                    cursors[member] += 1;
                    progress = true;
                }
            }
            let done = cursors
                .iter()
                .zip(tasks)
                .all(|(cursor, task)| *cursor == task.instructions.len());
            if done {
                break;
            }
            if !progress {
                return Err(SimError::AggregateStalled);
            }
        }
        *counts.entry(creg).or_insert(0) += 1;
    }

    Ok(result_document(&counts, shots, start.elapsed().as_secs_f64()))
}

/// Whether this instruction waits on an in-process bit that is not there.
fn blocks_on_loopback(
    instruction: &Instruction,
    channel: &ClassicalChannel,
    loopback: &VecDeque<u8>,
) -> bool {
    instruction.name == "remote_c_if"
        && instruction
            .qpus
            .as_ref()
            .and_then(|qpus| qpus.first())
            .is_some_and(|origin| origin == channel.endpoint())
        && loopback.is_empty()
}

#[allow(clippy::too_many_arguments)]
fn apply_member(
    sv: &mut Statevector,
    instruction: &Instruction,
    qubit_offset: usize,
    clbit_offset: usize,
    creg: &mut u128,
    loopback: &mut VecDeque<u8>,
    channel: &mut ClassicalChannel,
    rng: &mut ThreadRng,
) -> SimResult<()> {
    let qubits: Vec<usize> = instruction
        .qubits
        .iter()
        .map(|qubit| qubit + qubit_offset)
        .collect();

    match instruction.name.as_str() {
        "measure" => {
            let qubit = first(&qubits, instruction)?;
            let bit = sv.measure(qubit, rng)?;
            record_member_bit(creg, instruction, clbit_offset, bit)
        }
        "measure_and_send" => {
            let qubit = first(&qubits, instruction)?;
            let target = routing(instruction)?;
            let bit = sv.measure(qubit, rng)?;
            if instruction.memory.is_some() {
                record_member_bit(creg, instruction, clbit_offset, bit)?;
            }
            if target == channel.endpoint() {
                loopback.push_back(bit);
            } else {
                channel.send_measure(u32::from(bit), target)?;
            }
            Ok(())
        }
        "remote_c_if" => {
            let origin = routing(instruction)?.to_string();
            let bit = if origin == channel.endpoint() {
                // The scheduler only lets us in when a bit is waiting.
                loopback.pop_front().ok_or(SimError::AggregateStalled)?
            } else {
                channel.recv_measure(&origin)? as u8
            };
            if bit & 1 == 1 {
                let gate = instruction
                    .conditional_gate
                    .as_deref()
                    .ok_or(SimError::MissingConditionalGate)?;
                sv.apply_gate(gate, &qubits, instruction.params.as_deref())?;
            }
            Ok(())
        }
        "reset" => {
            let qubit = first(&qubits, instruction)?;
            sv.reset(qubit, rng)
        }
        _ => sv.apply_gate(&instruction.name, &qubits, instruction.params.as_deref()),
    }
}

fn first(qubits: &[usize], instruction: &Instruction) -> SimResult<usize> {
    qubits
        .first()
        .copied()
        .ok_or_else(|| SimError::MissingOperands {
            gate: instruction.name.clone(),
            expected: 1,
            got: qubits.len(),
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

/// Store a member's bit at its offset slot in the shared register.
///
/// The shared register is a u128; an index past bit 127 can only come
/// from a malformed member task and fails the round instead of shifting
/// out of range.
fn record_member_bit(
    creg: &mut u128,
    instruction: &Instruction,
    clbit_offset: usize,
    bit: u8,
) -> SimResult<()> {
    let position = instruction
        .memory
        .as_ref()
        .and_then(|memory| memory.first().copied())
        .or_else(|| instruction.qubits.first().copied())
        .unwrap_or(0)
        + clbit_offset;
    if position >= 128 {
        return Err(SimError::ClbitOutOfRange(position));
    }
    if bit == 1 {
        *creg |= 1u128 << position;
    }
    Ok(())
}
