//! MQTT session plumbing built on rumqttc.
//!
//! rumqttc splits a connection into an `AsyncClient` handle and an
//! `EventLoop` that must be polled to make progress. The publish probe keeps
//! both on one task and drives the loop inline, so each publish is a direct
//! blocking call that returns once the broker (or the socket, for QoS 0) has
//! confirmed it. The subscribe probe hands its event loop to a dispatcher
//! task instead; see `roles::subscriber`.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use rumqttc::{
    AsyncClient, ConnectReturnCode, Event, EventLoop, Incoming, MqttOptions, Outgoing, QoS,
};
use tracing::debug;

use crate::error::ProbeError;
use crate::options::{ClientOptions, DISCONNECT_GRACE};

/// Request-channel capacity between the client handle and the event loop.
pub(crate) const CLIENT_CAPACITY: usize = 65536;

const KEEP_ALIVE: Duration = Duration::from_secs(30);
const MAX_PACKET_SIZE: usize = 2 * 1024 * 1024;

/// Build rumqttc options from the shared client options: MQTT v3.1.1, clean
/// session, credentials only when both parts are present.
pub fn mqtt_options(opts: &ClientOptions, manual_acks: bool) -> Result<MqttOptions, ProbeError> {
    let broker = opts.broker()?;
    let mut options = MqttOptions::new(opts.client_id.clone(), broker.host.clone(), broker.port);
    options.set_keep_alive(KEEP_ALIVE);
    options.set_max_packet_size(MAX_PACKET_SIZE, MAX_PACKET_SIZE);
    options.set_clean_session(true);
    options.set_manual_acks(manual_acks);
    if let Some(user) = &opts.username {
        if let Some(pass) = &opts.password {
            options.set_credentials(user.clone(), pass.clone());
        }
    }
    Ok(options)
}

/// Publish seam: one fully-acknowledged message per call.
#[async_trait]
pub trait Publisher {
    async fn publish(&mut self, payload: Bytes) -> Result<(), ProbeError>;
}

/// A connected publish session bound to one topic.
pub struct PublishSession {
    client: AsyncClient,
    eventloop: EventLoop,
    topic: String,
    qos: QoS,
    retain: bool,
}

impl PublishSession {
    /// Establish the session and wait for a successful ConnAck. Failure
    /// propagates before any output is produced.
    pub async fn connect(
        opts: &ClientOptions,
        topic: &str,
        qos: QoS,
        retain: bool,
    ) -> Result<Self, ProbeError> {
        let options = mqtt_options(opts, false)?;
        let (client, mut eventloop) = AsyncClient::new(options, CLIENT_CAPACITY);
        await_connack(&mut eventloop).await?;
        debug!(topic, ?qos, "publish session established");
        Ok(Self {
            client,
            eventloop,
            topic: topic.to_string(),
            qos,
            retain,
        })
    }

    /// Send DISCONNECT and give the event loop a bounded grace period to
    /// flush it.
    pub async fn disconnect(mut self) {
        if self.client.disconnect().await.is_err() {
            return;
        }
        let drain = async {
            loop {
                match self.eventloop.poll().await {
                    Ok(Event::Outgoing(Outgoing::Disconnect)) | Err(_) => break,
                    Ok(_) => {}
                }
            }
        };
        let _ = tokio::time::timeout(DISCONNECT_GRACE, drain).await;
    }
}

async fn await_connack(eventloop: &mut EventLoop) -> Result<(), ProbeError> {
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Incoming::ConnAck(ack))) => {
                if ack.code == ConnectReturnCode::Success {
                    return Ok(());
                }
                return Err(ProbeError::Connect(format!("broker refused: {:?}", ack.code)));
            }
            Ok(_) => {}
            Err(e) => return Err(ProbeError::Connect(e.to_string())),
        }
    }
}

#[async_trait]
impl Publisher for PublishSession {
    /// Publish and wait for the QoS-appropriate confirmation: the socket
    /// write for QoS 0, PubAck for QoS 1, PubComp for QoS 2.
    async fn publish(&mut self, payload: Bytes) -> Result<(), ProbeError> {
        self.client
            .publish(self.topic.clone(), self.qos, self.retain, payload.to_vec())
            .await
            .map_err(|e| ProbeError::Publish(e.to_string()))?;
        loop {
            let event = self
                .eventloop
                .poll()
                .await
                .map_err(|e| ProbeError::Publish(e.to_string()))?;
            match (self.qos, &event) {
                (QoS::AtMostOnce, Event::Outgoing(Outgoing::Publish(_)))
                | (QoS::AtLeastOnce, Event::Incoming(Incoming::PubAck(_)))
                | (QoS::ExactlyOnce, Event::Incoming(Incoming::PubComp(_))) => return Ok(()),
                _ => {}
            }
        }
    }
}
