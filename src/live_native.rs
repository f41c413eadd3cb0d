//! Native live feed client
//!
//! Runs the connection state machine on a tokio task against an
//! `EventSource`. Observers read the latest `ConnectionState` through a
//! watch channel; only the newest value is kept.

use crate::config::LiveConfig;
use crate::core::{Command, ConnectionState, LiveConnection, Phase, SubscriptionId};
use crate::source::{EventSource, HttpEventSource, MessageStream};
use futures_util::StreamExt;
use std::collections::VecDeque;
use std::pin::Pin;
use tokio::sync::{oneshot, watch};
use tokio::time::Sleep;
use tracing::{debug, error, info, warn};

/// Live feed client; dropping it tears the connection down
pub struct LiveEventClient {
    state: watch::Receiver<ConnectionState>,
    shutdown: Option<oneshot::Sender<()>>,
}

impl LiveEventClient {
    /// Start the feed on the current tokio runtime
    pub fn spawn<S>(config: &LiveConfig, source: S) -> Self
    where
        S: EventSource + 'static,
    {
        let machine = LiveConnection::with_backoff(config.url.clone(), config.backoff);
        let (state_tx, state) = watch::channel(machine.state().clone());
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        tokio::spawn(run_connection(machine, source, state_tx, shutdown_rx));

        Self {
            state,
            shutdown: Some(shutdown_tx),
        }
    }

    /// Start the feed over HTTP in a background thread
    ///
    /// For callers without a tokio runtime of their own (e.g. a UI thread).
    pub fn connect(config: &LiveConfig) -> Self {
        let machine = LiveConnection::with_backoff(config.url.clone(), config.backoff);
        let (state_tx, state) = watch::channel(machine.state().clone());
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        std::thread::spawn(move || {
            let rt = match tokio::runtime::Runtime::new() {
                Ok(rt) => rt,
                Err(e) => {
                    error!(error = %e, "Failed to create tokio runtime");
                    state_tx.send_modify(|s| {
                        s.connected = false;
                        s.phase = Phase::Closed;
                    });
                    return;
                }
            };
            rt.block_on(run_connection(
                machine,
                HttpEventSource::new(),
                state_tx,
                shutdown_rx,
            ));
        });

        Self {
            state,
            shutdown: Some(shutdown_tx),
        }
    }

    /// Latest connection state
    pub fn state(&self) -> ConnectionState {
        self.state.borrow().clone()
    }

    pub fn is_connected(&self) -> bool {
        self.state.borrow().connected
    }

    /// A receiver notified whenever the state changes
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    /// Tear the connection down; no reconnect is attempted afterwards
    pub fn close(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

impl Drop for LiveEventClient {
    fn drop(&mut self) {
        self.close();
    }
}

type ActiveStream = Option<(SubscriptionId, MessageStream)>;
type ArmedRetry = Option<(SubscriptionId, Pin<Box<Sleep>>)>;

async fn run_connection<S: EventSource>(
    mut machine: LiveConnection,
    source: S,
    state_tx: watch::Sender<ConnectionState>,
    mut shutdown: oneshot::Receiver<()>,
) {
    let mut commands: VecDeque<Command> = machine.connect().into();
    let mut stream: ActiveStream = None;
    let mut retry: ArmedRetry = None;

    'run: loop {
        while let Some(command) = commands.pop_front() {
            match command {
                Command::Close { id } => {
                    if stream.as_ref().is_some_and(|(current, _)| *current == id) {
                        debug!(id, "Dropping event stream");
                        stream = None;
                    }
                }
                Command::ScheduleRetry { after, delay } => {
                    retry = Some((after, Box::pin(tokio::time::sleep(delay))));
                }
                Command::Open { id, url } => {
                    let opened = tokio::select! {
                        biased;
                        _ = &mut shutdown => None,
                        result = source.open(&url) => Some(result),
                    };
                    let Some(result) = opened else {
                        break 'run;
                    };
                    match result {
                        Ok(messages) => {
                            stream = Some((id, messages));
                            machine.on_open(id);
                        }
                        Err(e) => {
                            warn!(url = %url, error = %e, "Failed to open live feed");
                            commands.extend(machine.on_error(id));
                        }
                    }
                }
            }
        }
        publish(&state_tx, &machine);

        tokio::select! {
            biased;
            _ = &mut shutdown => break 'run,
            (id, item) = next_message(&mut stream) => match item {
                Some(Ok(data)) => {
                    if let Some(event) = machine.on_message(id, &data) {
                        debug!(event = %event.event, sequence = event.sequence, "Live event received");
                    }
                }
                Some(Err(e)) => {
                    warn!(error = %e, "Live feed stream failed");
                    commands.extend(machine.on_error(id));
                }
                None => {
                    warn!("Live feed stream ended");
                    commands.extend(machine.on_error(id));
                }
            },
            after = retry_due(&mut retry) => {
                retry = None;
                commands.extend(machine.on_retry_timer(after));
            }
        }
    }

    for command in machine.teardown() {
        if let Command::Close { id } = command {
            debug!(id, "Dropping event stream");
        }
    }
    drop(stream);
    drop(retry);
    publish(&state_tx, &machine);
    info!("Live feed task stopped");
}

fn publish(state_tx: &watch::Sender<ConnectionState>, machine: &LiveConnection) {
    let next = machine.state();
    state_tx.send_if_modified(|current| {
        if *current == *next {
            return false;
        }
        *current = next.clone();
        true
    });
}

async fn next_message(
    stream: &mut ActiveStream,
) -> (SubscriptionId, Option<Result<String, crate::error::TransportError>>) {
    match stream {
        Some((id, messages)) => (*id, messages.next().await),
        None => std::future::pending().await,
    }
}

async fn retry_due(retry: &mut ArmedRetry) -> SubscriptionId {
    match retry {
        Some((after, sleep)) => {
            sleep.as_mut().await;
            *after
        }
        None => std::future::pending().await,
    }
}
