//! Publish probe: N timestamped messages, each individually timed.

use std::time::{Duration, Instant};

use anyhow::Result;
use bytes::Bytes;
use rumqttc::QoS;
use tracing::info;

use crate::clock::now_unix_ns;
use crate::error::ProbeError;
use crate::options::ClientOptions;
use crate::output;
use crate::payload;
use crate::session::{PublishSession, Publisher};
use crate::stats::{BenchmarkResult, Recorder, Unit};
use crate::wire::publish_len;

/// Pacing delay between consecutive publishes, so a single send path is not
/// hammered back-to-back.
const INTER_MESSAGE_DELAY: Duration = Duration::from_millis(1);

pub struct PublisherConfig {
    pub client: ClientOptions,
    pub topic: String,
    pub qos: QoS,
    pub count: usize,
    pub size: usize,
    pub retain: bool,
}

pub async fn run_publisher(config: PublisherConfig) -> Result<BenchmarkResult> {
    validate(&config)?;
    info!(
        topic = %config.topic,
        qos = ?config.qos,
        count = config.count,
        size = config.size,
        "Starting publish probe"
    );

    let mut session =
        PublishSession::connect(&config.client, &config.topic, config.qos, config.retain).await?;

    // Session is up: let the harness release the other side.
    output::signal_ready()?;

    let mut recorder = Recorder::new();
    publish_messages(&mut session, &config, &mut recorder).await?;
    session.disconnect().await;

    Ok(recorder.finish(Unit::Pub))
}

fn validate(config: &PublisherConfig) -> Result<(), ProbeError> {
    if config.count == 0 {
        return Err(ProbeError::Config("message count must be at least 1".into()));
    }
    config.client.broker()?;
    Ok(())
}

/// The timed loop, generic over the publish seam. Any publish error aborts
/// the whole run; a partial result is never reported.
pub async fn publish_messages<P: Publisher>(
    publisher: &mut P,
    config: &PublisherConfig,
    recorder: &mut Recorder,
) -> Result<(), ProbeError> {
    for n in 0..config.count {
        if n > 0 {
            tokio::time::sleep(INTER_MESSAGE_DELAY).await;
        }
        let message = payload::encode(n as u64, now_unix_ns(), config.size);
        let wire_len = publish_len(config.topic.len(), config.qos, message.len());
        let start = Instant::now();
        publisher.publish(Bytes::from(message)).await?;
        recorder.record(start.elapsed().as_nanos() as u64, wire_len as u64);
    }
    Ok(())
}
