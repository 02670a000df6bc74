//! Run configuration: shared client options, endpoint parsing, and protocol
//! constants. Configs are plain immutable values built by the CLI layer and
//! passed into the role functions.

use std::time::Duration;

use rumqttc::QoS;

use crate::error::ProbeError;

pub const DEFAULT_SERVER: &str = "tcp://localhost:1883";
pub const DEFAULT_CLIENT_ID: &str = "test";
pub const DEFAULT_TOPIC: &str = "foo";
pub const DEFAULT_PORT: u16 = 1883;

/// Absolute window the subscriber waits for its N messages, measured from
/// readiness. Not reset per message.
pub const IDLE_TIMEOUT: Duration = Duration::from_secs(10);

/// Bounded wait for the DISCONNECT packet to flush on shutdown.
pub const DISCONNECT_GRACE: Duration = Duration::from_millis(500);

/// Connection identity shared by both probes.
#[derive(Clone, Debug)]
pub struct ClientOptions {
    pub client_id: String,
    pub servers: Vec<Broker>,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl ClientOptions {
    /// The connect target. The client library takes a single endpoint, so
    /// the first server in the list is used; the rest are accepted for CLI
    /// compatibility but unused.
    pub fn broker(&self) -> Result<&Broker, ProbeError> {
        self.servers
            .first()
            .ok_or_else(|| ProbeError::Config("no broker endpoint".into()))
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Broker {
    pub host: String,
    pub port: u16,
}

/// Parse a broker endpoint: `tcp://host:port`, `host:port`, or a bare host
/// (the port defaults to 1883).
pub fn parse_endpoint(endpoint: &str) -> Result<Broker, ProbeError> {
    let rest = match endpoint.split_once("://") {
        Some(("tcp", rest)) => rest,
        Some((scheme, _)) => {
            return Err(ProbeError::Config(format!(
                "unsupported scheme {scheme:?} in endpoint {endpoint:?}"
            )))
        }
        None => endpoint,
    };
    let (host, port) = match rest.rsplit_once(':') {
        Some((host, port)) => {
            let port = port.parse().map_err(|_| {
                ProbeError::Config(format!("invalid port in endpoint {endpoint:?}"))
            })?;
            (host, port)
        }
        None => (rest, DEFAULT_PORT),
    };
    if host.is_empty() {
        return Err(ProbeError::Config(format!("empty host in endpoint {endpoint:?}")));
    }
    Ok(Broker {
        host: host.to_string(),
        port,
    })
}

/// Map a CLI QoS level (0, 1, 2) to the client's QoS.
pub fn parse_qos(level: u8) -> QoS {
    match level {
        2 => QoS::ExactlyOnce,
        1 => QoS::AtLeastOnce,
        _ => QoS::AtMostOnce,
    }
}
