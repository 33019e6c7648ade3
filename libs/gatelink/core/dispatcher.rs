//! Inbound frame routing
//!
//! The read pump hands every text or binary frame to the dispatcher, which
//! decodes it and acts on its operation. In ordered mode a single worker
//! processes frames in receipt order; in concurrent mode each frame gets
//! its own task.

use crate::core::codec;
use crate::core::config::DispatchMode;
use crate::core::generation::Generation;
use crate::core::model::Frame;
use crate::core::supervisor::Supervisor;
use crate::traits::GatewayError;
use serde_json::Value;
use std::sync::{Arc, Weak};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Work for the dispatcher
#[derive(Debug)]
pub(crate) enum DispatchJob {
    /// A raw frame read by `generation`'s read pump
    Frame {
        raw: Vec<u8>,
        generation: Arc<Generation>,
    },
    /// An already decoded event, such as the one that completed a handshake
    Event { name: String, data: Value },
}

pub(crate) struct Dispatcher {
    mode: DispatchMode,
    jobs: mpsc::UnboundedSender<DispatchJob>,
}

impl Dispatcher {
    /// The receiver must be handed to [`spawn_worker`] in ordered mode
    pub(crate) fn new(mode: DispatchMode) -> (Self, mpsc::UnboundedReceiver<DispatchJob>) {
        let (jobs, rx) = mpsc::unbounded_channel();
        (Self { mode, jobs }, rx)
    }

    pub(crate) fn mode(&self) -> DispatchMode {
        self.mode
    }

    pub(crate) fn submit(&self, supervisor: &Arc<Supervisor>, job: DispatchJob) {
        match self.mode {
            DispatchMode::Ordered => {
                if self.jobs.send(job).is_err() {
                    debug!("Dispatch worker gone, dropping frame");
                }
            }
            DispatchMode::Concurrent => {
                let supervisor = Arc::clone(supervisor);
                tokio::spawn(async move { handle(&supervisor, job) });
            }
        }
    }
}

/// Start the ordered worker
///
/// Holds the supervisor weakly; ends when the supervisor is dropped.
pub(crate) fn spawn_worker(
    supervisor: Weak<Supervisor>,
    mut jobs: mpsc::UnboundedReceiver<DispatchJob>,
) {
    tokio::spawn(async move {
        while let Some(job) = jobs.recv().await {
            let Some(supervisor) = supervisor.upgrade() else {
                break;
            };
            handle(&supervisor, job);
        }
        debug!("Dispatch worker stopped");
    });
}

fn handle(supervisor: &Arc<Supervisor>, job: DispatchJob) {
    match job {
        DispatchJob::Frame { raw, generation } => route(supervisor, &raw, generation),
        DispatchJob::Event { name, data } => emit(supervisor, &name, &data),
    }
}

fn emit(supervisor: &Supervisor, event: &str, data: &Value) {
    if let Err(e) = supervisor.emitter().dispatch(event, data) {
        warn!(event, error = %e, "Event handler failed");
        supervisor.report(e);
    }
}

fn route(supervisor: &Arc<Supervisor>, raw: &[u8], generation: Arc<Generation>) {
    let frame = match codec::decode(raw, supervisor.config().debugger())
        .and_then(Frame::try_from)
    {
        Ok(frame) => frame,
        Err(e) => {
            warn!(error = %e, "Dropping undecodable frame");
            supervisor.report(e);
            return;
        }
    };

    match frame {
        Frame::Dispatch {
            sequence,
            event,
            data,
        } => {
            if let Some(sequence) = sequence {
                supervisor.session().record_sequence(sequence);
            }
            emit(supervisor, &event, &data);
        }
        Frame::Reconnect => {
            info!(generation = generation.id(), "Gateway requested reconnect");
            supervisor.spawn_restart(None, generation);
        }
        Frame::InvalidSession { resumable } => {
            info!(generation = generation.id(), resumable, "Session invalidated");
            supervisor.spawn_restart(Some(GatewayError::InvalidSession), generation);
        }
        Frame::HeartbeatAck => {
            if let Some(acks) = generation.acks() {
                acks.record_ack();
            }
        }
        Frame::Heartbeat => generation.request_heartbeat(),
        Frame::Hello { .. } => debug!("Ignoring hello outside the handshake"),
        Frame::Unknown(payload) => {
            supervisor.report(GatewayError::Protocol(format!(
                "unhandled operation {}",
                u8::from(payload.operation)
            )));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::supervisor::tests::idle_supervisor;
    use std::time::Duration;

    #[tokio::test]
    async fn test_late_invalid_session_leaves_live_session_alone() {
        let supervisor = idle_supervisor(8);
        let stale = supervisor.slot().load().unwrap();
        let live = supervisor.slot().supersede(&stale, 1).unwrap();
        supervisor.session().set_id("abc");

        route(&supervisor, br#"{"op":9,"d":false}"#, stale);
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(supervisor.session().id().as_deref(), Some("abc"));
        assert!(Arc::ptr_eq(&supervisor.slot().load().unwrap(), &live));
    }

    #[tokio::test]
    async fn test_dispatch_records_sequence_in_concurrent_mode() {
        let supervisor = idle_supervisor(8);
        let generation = supervisor.slot().load().unwrap();
        let dispatcher = Dispatcher::new(DispatchMode::Concurrent).0;

        dispatcher.submit(
            &supervisor,
            DispatchJob::Frame {
                raw: br#"{"op":0,"s":9,"t":"MSG","d":{}}"#.to_vec(),
                generation,
            },
        );
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(supervisor.session().sequence(), Some(9));
    }
}
