//! Connection supervisor
//!
//! Owns everything that outlives a single transport: the generation slot,
//! session, backoff, subscribers and the error stream. Every failure path
//! funnels into [`Supervisor::restart`], which only acts if the generation
//! the caller saw is still current.

use crate::core::config::ClientConfig;
use crate::core::connection_state::{AtomicConnectionState, AtomicMetrics, ConnectionState};
use crate::core::dispatcher::{self, DispatchJob, Dispatcher};
use crate::core::emitter::Emitter;
use crate::core::generation::{Generation, GenerationSlot, Session};
use crate::core::handshake::Handshaker;
use crate::core::pumps;
use crate::core::queue::PendingMessage;
use crate::traits::{GatewayError, ReconnectionStrategy, Result};
use futures::future::BoxFuture;
use crossbeam_channel::{Receiver, Sender, TrySendError};
use futures::StreamExt;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

pub(crate) struct Supervisor {
    config: ClientConfig,
    backoff: Mutex<Box<dyn ReconnectionStrategy>>,
    slot: GenerationSlot,
    session: Session,
    state: AtomicConnectionState,
    metrics: AtomicMetrics,
    emitter: Emitter,
    dispatcher: Dispatcher,
    errors: Sender<GatewayError>,
    error_backlog: Receiver<GatewayError>,
    shutdown: watch::Sender<bool>,
    next_generation: AtomicU64,
}

impl Supervisor {
    /// Create the supervisor and its dispatch worker
    ///
    /// The error stream holds at most `error_capacity` unread errors.
    /// Nothing connects until [`start`](Self::start).
    pub(crate) fn new(
        config: ClientConfig,
        backoff: Box<dyn ReconnectionStrategy>,
        error_capacity: usize,
    ) -> Arc<Self> {
        let (dispatcher, jobs) = Dispatcher::new(config.dispatch_mode);
        let (errors, error_backlog) = crossbeam_channel::bounded(error_capacity.max(1));
        let (shutdown, _) = watch::channel(false);

        let supervisor = Arc::new(Self {
            config,
            backoff: Mutex::new(backoff),
            slot: GenerationSlot::new(Arc::new(Generation::new(0))),
            session: Session::new(),
            state: AtomicConnectionState::new(ConnectionState::Disconnected),
            metrics: AtomicMetrics::new(),
            emitter: Emitter::new(),
            dispatcher,
            errors,
            error_backlog,
            shutdown,
            next_generation: AtomicU64::new(1),
        });

        dispatcher::spawn_worker(Arc::downgrade(&supervisor), jobs);
        supervisor
    }

    pub(crate) fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub(crate) fn slot(&self) -> &GenerationSlot {
        &self.slot
    }

    pub(crate) fn session(&self) -> &Session {
        &self.session
    }

    pub(crate) fn state(&self) -> &AtomicConnectionState {
        &self.state
    }

    pub(crate) fn metrics(&self) -> &AtomicMetrics {
        &self.metrics
    }

    pub(crate) fn emitter(&self) -> &Emitter {
        &self.emitter
    }

    /// A receiver for the error stream
    pub(crate) fn error_stream(&self) -> Receiver<GatewayError> {
        self.error_backlog.clone()
    }

    /// Publish an error on the error stream
    ///
    /// A full stream drops its oldest error to make room.
    pub(crate) fn report(&self, err: GatewayError) {
        self.config.debugger.error(&err);
        if let Err(TrySendError::Full(err)) = self.errors.try_send(err) {
            let _ = self.error_backlog.try_recv();
            if self.errors.try_send(err).is_err() {
                debug!("Error stream full, dropping error");
            }
        }
    }

    /// Schedule the first connection attempt
    pub(crate) fn start(self: &Arc<Self>) {
        let Some(initial) = self.slot.load() else {
            return;
        };
        debug!(dispatch = ?self.dispatcher.mode(), "Starting gateway client");
        tokio::spawn(self.restart(None, initial));
    }

    pub(crate) fn spawn_restart(self: &Arc<Self>, cause: Option<GatewayError>, expected: Arc<Generation>) {
        tokio::spawn(self.restart(cause, expected));
    }

    /// Replace `expected` with a new generation and reconnect
    ///
    /// A no-op unless `expected` is still current, so every task that
    /// observes the same failure may call this and only one proceeds. With
    /// a fatal `cause` the client stops; with any other cause the error is
    /// reported and the next attempt waits for the backoff delay; without a
    /// cause (the gateway asked for a reconnect) it reconnects immediately.
    ///
    /// Failed attempts loop here rather than recursing, each one keyed on
    /// the generation it created.
    pub(crate) fn restart(
        self: &Arc<Self>,
        cause: Option<GatewayError>,
        expected: Arc<Generation>,
    ) -> BoxFuture<'static, ()> {
        let this = Arc::clone(self);
        Box::pin(async move {
            let mut cause = cause;
            let mut expected = expected;

            loop {
                let id = this.next_generation.fetch_add(1, Ordering::Relaxed);
                let Some(current) = this.slot.supersede(&expected, id) else {
                    debug!(generation = expected.id(), "Generation no longer current, not restarting");
                    return;
                };
                debug!(from = expected.id(), to = current.id(), "Superseded generation");

                // only the restart that won the swap may forget the session
                if matches!(cause, Some(GatewayError::InvalidSession)) {
                    this.session.clear_id();
                }

                match cause.take() {
                    Some(err) if err.is_fatal() => {
                        this.fail(&current, err);
                        return;
                    }
                    Some(err) => {
                        warn!(error = %err, "Connection disrupted");
                        this.state.advance(ConnectionState::Connecting);
                        this.report(GatewayError::Disruption(Box::new(err)));

                        let delay = this.backoff.lock().next_delay();
                        let Some(delay) = delay else {
                            let attempts = this.backoff.lock().attempts();
                            this.fail(&current, GatewayError::ReconnectionFailed { attempts });
                            return;
                        };

                        info!(?delay, "Reconnecting after backoff");
                        if !this.sleep_unless_closed(delay).await {
                            debug!("Client closed during backoff");
                            return;
                        }
                        this.metrics.increment_reconnects();
                    }
                    None => {
                        this.state.advance(ConnectionState::Connecting);
                    }
                }

                match this.establish(&current).await {
                    Ok(()) => return,
                    Err(err) => {
                        cause = Some(err);
                        expected = current;
                    }
                }
            }
        })
    }

    /// Resolve, dial and handshake, then publish a connected generation
    /// in place of `pending` and start its pumps
    async fn establish(self: &Arc<Self>, pending: &Arc<Generation>) -> Result<()> {
        let url = self.config.resolver.resolve().await?;
        if pending.is_closed() {
            return Ok(());
        }

        info!(url = %url, generation = pending.id(), "Connecting to gateway");
        self.config.debugger.connecting(&url);
        let headers = self.config.headers.get_headers().await;
        let mut ws = self.config.dialer.dial(&url, &headers).await?;
        if pending.is_closed() {
            debug!(generation = pending.id(), "Closed while dialing, dropping transport");
            let _ = ws.close(None).await;
            return Ok(());
        }

        self.state.advance(ConnectionState::Handshaking);
        let session_id = self.session.id();
        let mut handshaker = Handshaker::new(
            &self.config.handshake,
            self.config.timeout,
            self.config.debugger.as_ref(),
        );
        if let Some(session_id) = session_id.as_deref() {
            handshaker = handshaker.resuming(session_id, self.session.sequence());
        }

        let outcome = tokio::select! {
            result = handshaker.run(&mut ws) => Some(result),
            _ = pending.closed() => None,
        };
        let details = match outcome {
            Some(Ok(details)) => details,
            Some(Err(err)) => {
                let _ = ws.close(None).await;
                return Err(err);
            }
            None => {
                debug!(generation = pending.id(), "Closed during handshake, dropping transport");
                let _ = ws.close(None).await;
                return Ok(());
            }
        };

        let id = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let live = Arc::new(pending.attach(id, self.config.heartbeat_ack_timeout));
        if !self.slot.compare_and_swap(pending, Arc::clone(&live)) {
            debug!(generation = pending.id(), "Superseded during handshake, dropping transport");
            let _ = ws.close(None).await;
            return Ok(());
        }

        self.backoff.lock().reset();
        self.session.set_id(details.session_id.as_str());
        self.state.advance(ConnectionState::Connected);
        info!(
            generation = live.id(),
            session_id = %details.session_id,
            heartbeat_interval = ?details.heartbeat_interval,
            "Connected to gateway"
        );

        self.dispatcher.submit(
            self,
            DispatchJob::Event {
                name: details.event,
                data: details.data,
            },
        );

        let (sink, stream) = ws.split();
        tokio::spawn(pumps::read_pump(Arc::clone(self), Arc::clone(&live), stream));
        tokio::spawn(pumps::write_pump(
            Arc::clone(self),
            live,
            sink,
            details.heartbeat_interval,
        ));
        Ok(())
    }

    pub(crate) fn submit(self: &Arc<Self>, job: DispatchJob) {
        self.dispatcher.submit(self, job);
    }

    /// Stop for good after `err`; `current` is the generation that replaced
    /// the failed one
    fn fail(&self, current: &Arc<Generation>, err: GatewayError) {
        error!(error = %err, "Unrecoverable gateway error, giving up");
        if self.slot.take_if(current) {
            current.close();
            self.state.set(ConnectionState::Failed);
            reject_pending(current.queue().drain(), || GatewayError::Fatal(Box::new(err.clone())));
        }
        self.shutdown.send_replace(true);
        self.report(GatewayError::Fatal(Box::new(err)));
    }

    /// Stop every generation and reject queued messages; idempotent
    ///
    /// Returns false if the client was already closed or failed.
    pub(crate) fn close(&self) -> bool {
        let Some(current) = self.slot.take() else {
            return false;
        };

        info!(generation = current.id(), "Closing gateway client");
        self.shutdown.send_replace(true);
        current.close();
        self.state.set(ConnectionState::Closed);
        reject_pending(current.queue().drain(), || GatewayError::Closed);
        true
    }

    /// Sleep for `delay`; false if the client was closed meanwhile
    async fn sleep_unless_closed(&self, delay: Duration) -> bool {
        let mut shutdown = self.shutdown.subscribe();
        let slept = tokio::select! {
            _ = tokio::time::sleep(delay) => true,
            _ = shutdown.wait_for(|closed| *closed) => false,
        };
        slept && !*self.shutdown.borrow()
    }

    pub(crate) fn current_generation(&self) -> Option<u64> {
        self.slot.with_current(|generation| generation.id())
    }
}

fn reject_pending(messages: Vec<PendingMessage>, err: impl Fn() -> GatewayError) {
    if !messages.is_empty() {
        debug!(count = messages.len(), "Rejecting pending messages");
    }
    for message in messages {
        message.resolve(Err(err()));
    }
}
