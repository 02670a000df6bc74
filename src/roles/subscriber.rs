//! Subscribe probe: event-driven consumption with prefix filtering and
//! protocol-violation detection.
//!
//! The client's event loop runs on its own task (the dispatcher) and hands
//! accepted messages to the control loop over bounded channels. Every
//! counter lives in the control loop, so there is exactly one writer and no
//! locks.

use std::time::Duration;

use anyhow::Result;
use bytes::Bytes;
use flume::Receiver;
use rumqttc::{AsyncClient, ConnectReturnCode, Event, Incoming, Publish, QoS, SubscribeReasonCode};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::clock::now_unix_ns;
use crate::error::ProbeError;
use crate::options::{ClientOptions, DISCONNECT_GRACE};
use crate::output;
use crate::payload;
use crate::session::{self, mqtt_options};
use crate::stats::{BenchmarkResult, Recorder, Unit};

/// Bound on the dispatcher-to-control-loop hand-off.
const MESSAGE_CHANNEL_CAPACITY: usize = 1024;

pub struct SubscriberConfig {
    pub client: ClientOptions,
    /// Subscription topic, may contain wildcards.
    pub topic: String,
    /// When set, messages on topics not starting with this prefix are
    /// silently discarded without counting toward the target.
    pub match_prefix: Option<String>,
    pub qos: QoS,
    pub count: usize,
    /// Absolute window for the whole run, measured from readiness.
    pub idle_timeout: Duration,
}

pub async fn run_subscriber(config: SubscriberConfig) -> Result<BenchmarkResult> {
    validate(&config)?;
    info!(
        topic = %config.topic,
        qos = ?config.qos,
        count = config.count,
        match_prefix = ?config.match_prefix,
        "Starting subscribe probe"
    );

    let options = mqtt_options(&config.client, true)?;
    let (client, mut eventloop) = AsyncClient::new(options, session::CLIENT_CAPACITY);

    let (msg_tx, msg_rx) = flume::bounded::<Bytes>(MESSAGE_CHANNEL_CAPACITY);
    let (err_tx, err_rx) = flume::bounded::<ProbeError>(1);
    let (ready_tx, ready_rx) = flume::bounded::<()>(1);

    // Dispatcher: the sole driver of the event loop. Subscribes once the
    // session is acknowledged, signals readiness once the subscription is,
    // then acks and classifies every delivery. All of its failures travel on
    // the error channel because they happen outside the control loop.
    let mut dispatcher = {
        let client = client.clone();
        let topic = config.topic.clone();
        let qos = config.qos;
        let prefix = config.match_prefix.clone();
        tokio::spawn(async move {
            loop {
                match eventloop.poll().await {
                    Ok(Event::Incoming(Incoming::ConnAck(ack))) => {
                        if ack.code != ConnectReturnCode::Success {
                            let _ = err_tx.try_send(ProbeError::Connect(format!(
                                "broker refused: {:?}",
                                ack.code
                            )));
                            break;
                        }
                        if let Err(e) = client.subscribe(topic.clone(), qos).await {
                            let _ = err_tx.try_send(ProbeError::Subscribe(e.to_string()));
                            break;
                        }
                    }
                    Ok(Event::Incoming(Incoming::SubAck(ack))) => {
                        if ack
                            .return_codes
                            .iter()
                            .any(|code| matches!(code, SubscribeReasonCode::Failure))
                        {
                            let _ = err_tx.try_send(ProbeError::Subscribe(
                                "broker rejected subscription".into(),
                            ));
                            break;
                        }
                        let _ = ready_tx.try_send(());
                    }
                    Ok(Event::Incoming(Incoming::Publish(publish))) => {
                        // Ack before validation, so the broker never
                        // redelivers a message the application rejects.
                        if let Err(e) = client.ack(&publish).await {
                            warn!(error = %e, "manual ack failed");
                        }
                        match classify(prefix.as_deref(), &publish) {
                            Verdict::Ignore => {}
                            Verdict::Reject(err) => {
                                let _ = err_tx.try_send(err);
                                break;
                            }
                            Verdict::Accept => {
                                if msg_tx.send_async(publish.payload.clone()).await.is_err() {
                                    break;
                                }
                            }
                        }
                    }
                    Ok(_) => {}
                    Err(e) => {
                        let _ = err_tx.try_send(ProbeError::Connect(e.to_string()));
                        break;
                    }
                }
            }
        })
    };

    // Handshake: readiness requires both the session and the subscription
    // acknowledgement.
    tokio::select! {
        ready = ready_rx.recv_async() => {
            if ready.is_err() {
                dispatcher.abort();
                return Err(drain_error(&err_rx).into());
            }
        }
        err = err_rx.recv_async() => {
            dispatcher.abort();
            let err = err.unwrap_or_else(|_| handshake_lost());
            return Err(err.into());
        }
    }
    output::signal_ready()?;

    let deadline = Instant::now() + config.idle_timeout;
    let outcome = consume_messages(&msg_rx, &err_rx, config.count, deadline).await;

    // Flush the DISCONNECT while the dispatcher still polls the event loop.
    let _ = client.disconnect().await;
    if tokio::time::timeout(DISCONNECT_GRACE, &mut dispatcher).await.is_err() {
        dispatcher.abort();
    }

    Ok(outcome?.finish(Unit::Sub))
}

fn validate(config: &SubscriberConfig) -> Result<(), ProbeError> {
    if config.count == 0 {
        return Err(ProbeError::Config("message count must be at least 1".into()));
    }
    config.client.broker()?;
    Ok(())
}

fn drain_error(errors: &Receiver<ProbeError>) -> ProbeError {
    errors.try_recv().unwrap_or_else(|_| handshake_lost())
}

fn handshake_lost() -> ProbeError {
    ProbeError::Connect("connection closed before subscribe completed".into())
}

/// Outcome of classifying one delivery.
pub enum Verdict {
    Accept,
    Ignore,
    Reject(ProbeError),
}

/// Classification order per the benchmark contract: prefix filter first
/// (silent discard), then protocol violations (fatal), then accept. A
/// duplicate-flagged message is as fatal as a retained one: each message is
/// published once on a clean session, so a redelivery means the measurement
/// is already invalid.
pub fn classify(match_prefix: Option<&str>, publish: &Publish) -> Verdict {
    if let Some(prefix) = match_prefix {
        if !publish.topic.starts_with(prefix) {
            return Verdict::Ignore;
        }
    }
    if publish.dup {
        return Verdict::Reject(ProbeError::UnexpectedDuplicate);
    }
    if publish.retain {
        return Verdict::Reject(ProbeError::UnexpectedRetained);
    }
    Verdict::Accept
}

/// The control loop: single consumer of the dispatcher's channels and sole
/// owner of the counters. One absolute deadline covers the whole run; it is
/// not reset per message. Stops after `count` accepted messages.
pub async fn consume_messages(
    messages: &Receiver<Bytes>,
    errors: &Receiver<ProbeError>,
    count: usize,
    deadline: Instant,
) -> Result<Recorder, ProbeError> {
    let mut recorder = Recorder::new();
    let idle = tokio::time::sleep_until(deadline);
    tokio::pin!(idle);
    while recorder.ops() < count as u64 {
        tokio::select! {
            _ = &mut idle => return Err(ProbeError::IdleTimeout),
            err = errors.recv_async() => {
                return Err(err.unwrap_or_else(|_| delivery_lost()));
            }
            msg = messages.recv_async() => {
                let payload = msg.map_err(|_| delivery_lost())?;
                let value = payload::decode(&payload)?;
                let latency = now_unix_ns().saturating_sub(value.timestamp);
                recorder.record(latency, payload.len() as u64);
                debug!(seq = value.seq, latency_ns = latency, "accepted message");
            }
        }
    }
    Ok(recorder)
}

fn delivery_lost() -> ProbeError {
    ProbeError::Connect("delivery task exited".into())
}
