//! The QPU server loop.
//!
//! Two long-lived threads share one FIFO queue guarded by a mutex and a
//! condition variable. The listen thread blocks on the client socket and
//! pushes raw messages; the compute thread waits on the condition
//! variable, drains one message at a time with the lock released during
//! execution, and replies through the same socket. Replies leave in
//! arrival order because the queue and the routing FIFO are both ordered.
//!
//! Error policy: a failed send means the client is gone, so the reply is
//! dropped and the loop continues. Every other failure while handling a
//! task is answered with an `{"ERROR": ...}` document, so a submitter is
//! never left blocked on a reply that will not come.

use std::collections::VecDeque;
use std::env;
use std::sync::{Condvar, Mutex};
use std::thread;

use serde_json::json;
use tracing::{debug, error, info};

use sleipnir_net::{ClientServer, CLOSE_SENTINEL};
use sleipnir_registry as registry;
use sleipnir_task::QuantumTask;

use crate::backend::Backend;
use crate::error::QpuResult;

/// One simulated quantum processing unit.
pub struct Qpu {
    backend: Box<dyn Backend>,
    server: ClientServer,
    name: String,
    family: String,
}

impl Qpu {
    /// Create a QPU with its client socket already bound.
    pub fn new(
        backend: Box<dyn Backend>,
        mode: &str,
        name: &str,
        family: &str,
    ) -> QpuResult<Self> {
        Ok(Self {
            backend,
            server: ClientServer::bind(mode)?,
            name: name.to_string(),
            family: family.to_string(),
        })
    }

    /// The client-facing endpoint, `tcp://ip:port`.
    pub fn endpoint(&self) -> &str {
        self.server.endpoint()
    }

    /// Register this QPU and serve until the process dies.
    ///
    /// Writes the discovery entry, then runs the listen and compute
    /// threads. Does not return in normal operation.
    pub fn turn_on(self) -> QpuResult<()> {
        let Qpu {
            mut backend,
            server,
            name,
            family,
        } = self;

        let entry = json!({
            "backend": backend.to_json(),
            "net": server.info(),
            "name": name,
            "family": family,
            "slurm_job_id": env::var("SLURM_JOB_ID").unwrap_or_else(|_| "UNKNOWN".to_string()),
        });
        registry::write_on_file(&entry, &registry::qpus_path(), &family)?;
        info!("QPU {} on duty at {}", name, server.endpoint());

        let queue = Mutex::new(VecDeque::<String>::new());
        let available = Condvar::new();

        thread::scope(|scope| {
            scope.spawn(|| listen_loop(&server, &queue, &available));
            scope.spawn(|| compute_loop(&server, &queue, &available, backend.as_mut()));
        });
        Ok(())
    }
}

/// Accept clients and feed their messages into the queue.
///
/// The `CLOSE` sentinel (sent by a finished client, or synthesised by the
/// socket layer on any receive error) drops the session and re-accepts. An
/// accept failure is fatal for the thread.
fn listen_loop(server: &ClientServer, queue: &Mutex<VecDeque<String>>, available: &Condvar) {
    if let Err(e) = server.accept() {
        error!("could not accept a client session: {}", e);
        return;
    }
    loop {
        let message = server.recv_data();
        if message == CLOSE_SENTINEL {
            debug!("client session closed, waiting for the next one");
            if let Err(e) = server.accept() {
                error!("could not accept a client session: {}", e);
                return;
            }
            continue;
        }
        queue
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(message);
        available.notify_one();
    }
}

/// Drain the queue, executing tasks and replying in arrival order.
fn compute_loop(
    server: &ClientServer,
    queue: &Mutex<VecDeque<String>>,
    available: &Condvar,
    backend: &mut dyn Backend,
) {
    let mut task = QuantumTask::default();
    let mut pending = queue.lock().unwrap_or_else(|e| e.into_inner());
    loop {
        pending = available
            .wait_while(pending, |queue| queue.is_empty())
            .unwrap_or_else(|e| e.into_inner());

        while let Some(message) = pending.pop_front() {
            // Execution can block on peers; never hold the queue across it.
            drop(pending);

            let reply = match handle_message(&mut task, &message, backend) {
                Ok(reply) => reply,
                Err(e) => {
                    error!("task failed, answering with an error document: {}", e);
                    json!({"ERROR": e.to_string()}).to_string()
                }
            };
            if let Err(e) = server.send_result(&reply) {
                // Client-side problem; drop the reply and keep serving.
                error!("could not deliver result: {}", e);
            }

            pending = queue.lock().unwrap_or_else(|e| e.into_inner());
        }
    }
}

/// Parse one ingress message and run it through the backend.
fn handle_message(
    task: &mut QuantumTask,
    message: &str,
    backend: &mut dyn Backend,
) -> QpuResult<String> {
    task.ingest(message)?;
    let result = backend.execute(task)?;
    Ok(result.to_string())
}
