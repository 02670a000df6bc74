//! Benchmark payload codec.
//!
//! Every message starts with a JSON header carrying the sequence number and
//! the publish timestamp, terminated by a newline. The newline cannot occur
//! in the random fill alphabet, so the decoder can truncate at the first one
//! it finds. The requested size is a floor: payloads are padded up to it with
//! printable filler, but a header longer than the request is never truncated.

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::ProbeError;

pub const DELIMITER: u8 = b'\n';

const FILL: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789!@$#%^&*()";

/// Structured payload header, created fresh per published message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PubValue {
    pub seq: u64,
    /// Nanoseconds since the Unix epoch, captured just before the send.
    pub timestamp: u64,
}

/// Serialize the header, append the delimiter, and pad with random filler up
/// to `target_size`. The filler is generated first, then the header bytes
/// overwrite the buffer prefix.
pub fn encode(seq: u64, timestamp: u64, target_size: usize) -> Vec<u8> {
    let mut header =
        serde_json::to_vec(&PubValue { seq, timestamp }).expect("header is always serializable");
    header.push(DELIMITER);
    if header.len() >= target_size {
        return header;
    }
    let mut payload = random_fill(target_size);
    payload[..header.len()].copy_from_slice(&header);
    payload
}

/// Parse the header back out of a received payload, truncating at the first
/// delimiter (a payload without one is parsed whole). Failure means the
/// publisher and subscriber disagree on the payload contract and is fatal.
pub fn decode(payload: &[u8]) -> Result<PubValue, ProbeError> {
    let header = match payload.iter().position(|&b| b == DELIMITER) {
        Some(at) => &payload[..at],
        None => payload,
    };
    serde_json::from_slice(header).map_err(|e| ProbeError::MalformedPayload(e.to_string()))
}

/// `size` bytes drawn from the printable fill alphabet.
pub fn random_fill(size: usize) -> Vec<u8> {
    let mut rng = rand::thread_rng();
    (0..size).map(|_| FILL[rng.gen_range(0..FILL.len())]).collect()
}
