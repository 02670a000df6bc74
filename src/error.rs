//! Probe error taxonomy. Every variant is fatal; a probe run is never
//! retried.

#[derive(thiserror::Error, Debug)]
pub enum ProbeError {
    #[error("config: {0}")]
    Config(String),
    #[error("connect: {0}")]
    Connect(String),
    #[error("subscribe: {0}")]
    Subscribe(String),
    #[error("publish: {0}")]
    Publish(String),
    #[error("received unexpected duplicate message")]
    UnexpectedDuplicate,
    #[error("received unexpected retained message")]
    UnexpectedRetained,
    #[error("malformed payload: {0}")]
    MalformedPayload(String),
    #[error("timeout waiting for messages")]
    IdleTimeout,
}
