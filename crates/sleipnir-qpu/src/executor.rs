//! The group executor process.
//!
//! QPUs whose kernel cannot talk to peers delegate their circuits to an
//! executor. One executor serves one group: at startup it walks the
//! communications registry, connects to every member's channel and pushes
//! its own endpoint so members can address it as `"executor"`. From then
//! on it runs rounds: collect one circuit per member, simulate the group
//! jointly, send the result back to every member that contributed.
//!
//! Members are visited in registry order and a straggler blocks the round.
//! That is deliberate: the aggregated simulation needs every participant
//! before it can start.

use std::env;

use serde_json::Value;
use tracing::{debug, info};

use sleipnir_net::ClassicalChannel;
use sleipnir_registry as registry;
use sleipnir_sim as sim;
use sleipnir_task::QuantumTask;

use crate::counts;
use crate::error::{QpuError, QpuResult};

/// Joint simulator for a group of QPUs.
pub struct Executor {
    channel: ClassicalChannel,
    peers: Vec<String>,
}

impl Executor {
    /// Attach to every group member registered in the communications file.
    ///
    /// Without a group id, members are the entries of this SLURM job
    /// (keys starting with the job id). With one, members are the entries
    /// whose key carries the `_<group>` suffix.
    pub fn new(group: Option<&str>) -> QpuResult<Self> {
        let mut channel = ClassicalChannel::with_id("executor")?;
        let snapshot = registry::read_snapshot(&registry::communications_path())?;
        let entries = snapshot
            .as_object()
            .cloned()
            .unwrap_or_default();

        let job_id = env::var("SLURM_JOB_ID").unwrap_or_else(|_| "UNKNOWN".to_string());
        let own_endpoint = channel.endpoint().to_string();
        let mut peers = Vec::new();

        for (key, value) in &entries {
            let is_member = match group {
                Some(group) => key.ends_with(&format!("_{group}")),
                None => key.starts_with(&job_id),
            };
            if !is_member {
                continue;
            }
            let endpoint = value
                .get("communications_endpoint")
                .and_then(Value::as_str)
                .ok_or_else(|| {
                    QpuError::Config(format!("registry entry {key} has no communications endpoint"))
                })?;

            channel.connect(endpoint, "")?;
            channel.send_info(&own_endpoint, endpoint)?;
            info!("executor attached to member {}", endpoint);
            peers.push(endpoint.to_string());
        }

        Ok(Self { channel, peers })
    }

    /// Endpoints of the attached members, in registry order.
    pub fn peers(&self) -> &[String] {
        &self.peers
    }

    /// Serve rounds until the process dies.
    pub fn run(mut self) -> QpuResult<()> {
        info!("executor serving {} members", self.peers.len());
        loop {
            self.round()?;
        }
    }

    /// One fan-in / simulate / fan-out cycle.
    pub fn round(&mut self) -> QpuResult<()> {
        let mut tasks = Vec::new();
        let mut working = Vec::new();

        for peer in &self.peers {
            debug!("waiting for a circuit from {}", peer);
            let message = self.channel.recv_info(peer)?;
            if message.is_empty() {
                continue;
            }
            let mut task = QuantumTask::default();
            task.ingest(&message)?;
            working.push(peer.clone());
            tasks.push(task);
        }

        let mut result = sim::run_aggregate(&tasks, &mut self.channel)?;
        counts::to_bitstrings(&mut result, sim::aggregate_clbits(&tasks))?;

        let rendered = result.to_string();
        for peer in &working {
            self.channel.send_info(&rendered, peer)?;
        }
        Ok(())
    }
}
