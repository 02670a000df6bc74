//! Pipeline tests: the publish loop feeding the subscriber's classification
//! and consume loop through in-process channels, no broker involved.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use rumqttc::{Publish, QoS};
use tokio::time::Instant;

use mqtt_bench::options::parse_endpoint;
use mqtt_bench::payload;
use mqtt_bench::roles::publisher::{publish_messages, PublisherConfig};
use mqtt_bench::roles::subscriber::{classify, consume_messages, Verdict};
use mqtt_bench::session::Publisher;
use mqtt_bench::{ClientOptions, ProbeError, Recorder, Unit};

fn client_options() -> ClientOptions {
    ClientOptions {
        client_id: "test".into(),
        servers: vec![parse_endpoint("tcp://localhost:1883").unwrap()],
        username: None,
        password: None,
    }
}

fn publisher_config(topic: &str, count: usize, size: usize) -> PublisherConfig {
    PublisherConfig {
        client: client_options(),
        topic: topic.into(),
        qos: QoS::AtMostOnce,
        count,
        size,
        retain: false,
    }
}

/// Stands in for the broker path: wraps every publish in a delivery and runs
/// it through the subscriber's classification, exactly like the dispatcher.
struct LoopbackPublisher {
    topic: &'static str,
    match_prefix: Option<&'static str>,
    retain_from: Option<usize>,
    msg_tx: flume::Sender<Bytes>,
    err_tx: flume::Sender<ProbeError>,
    sent_lens: Vec<usize>,
}

impl LoopbackPublisher {
    fn new(
        topic: &'static str,
        match_prefix: Option<&'static str>,
    ) -> (Self, flume::Receiver<Bytes>, flume::Receiver<ProbeError>) {
        let (msg_tx, msg_rx) = flume::bounded(64);
        let (err_tx, err_rx) = flume::bounded(1);
        (
            Self {
                topic,
                match_prefix,
                retain_from: None,
                msg_tx,
                err_tx,
                sent_lens: Vec::new(),
            },
            msg_rx,
            err_rx,
        )
    }
}

#[async_trait]
impl Publisher for LoopbackPublisher {
    async fn publish(&mut self, body: Bytes) -> Result<(), ProbeError> {
        let mut publish = Publish::new(self.topic, QoS::AtMostOnce, body.to_vec());
        if self.retain_from.is_some_and(|from| self.sent_lens.len() >= from) {
            publish.retain = true;
        }
        self.sent_lens.push(body.len());
        match classify(self.match_prefix, &publish) {
            Verdict::Accept => {
                let _ = self.msg_tx.send_async(publish.payload).await;
            }
            Verdict::Ignore => {}
            Verdict::Reject(err) => {
                let _ = self.err_tx.try_send(err);
            }
        }
        Ok(())
    }
}

#[tokio::test]
async fn header_only_messages_flow_end_to_end() {
    let (mut publisher, msg_rx, err_rx) = LoopbackPublisher::new("t", Some("t"));
    let config = publisher_config("t", 3, 0);

    let mut pub_recorder = Recorder::new();
    publish_messages(&mut publisher, &config, &mut pub_recorder)
        .await
        .unwrap();
    let pub_result = pub_recorder.finish(Unit::Pub);
    assert_eq!(pub_result.ops, 3);

    let deadline = Instant::now() + Duration::from_secs(5);
    let sub_result = consume_messages(&msg_rx, &err_rx, 3, deadline)
        .await
        .unwrap()
        .finish(Unit::Sub);

    assert_eq!(sub_result.ops, 3);
    // size=0 means every payload is exactly its header
    let expected: u64 = publisher.sent_lens.iter().map(|&l| l as u64).sum();
    assert_eq!(sub_result.bytes, expected);
    let header_len = payload::encode(0, 1_722_000_000_000_000_000, 0).len();
    assert!(publisher
        .sent_lens
        .iter()
        .all(|&l| l.abs_diff(header_len) <= 2));
}

#[tokio::test]
async fn padded_messages_account_raw_payload_bytes() {
    let (mut publisher, msg_rx, err_rx) = LoopbackPublisher::new("bench/data", None);
    let config = publisher_config("bench/data", 4, 512);

    let mut pub_recorder = Recorder::new();
    publish_messages(&mut publisher, &config, &mut pub_recorder)
        .await
        .unwrap();

    let deadline = Instant::now() + Duration::from_secs(5);
    let sub_result = consume_messages(&msg_rx, &err_rx, 4, deadline)
        .await
        .unwrap()
        .finish(Unit::Sub);

    assert_eq!(sub_result.ops, 4);
    assert_eq!(sub_result.bytes, 4 * 512);
}

#[tokio::test(start_paused = true)]
async fn filtered_messages_never_reach_the_consumer() {
    let (mut publisher, msg_rx, err_rx) = LoopbackPublisher::new("x/y", Some("a/b"));
    let config = publisher_config("x/y", 3, 0);

    let mut pub_recorder = Recorder::new();
    publish_messages(&mut publisher, &config, &mut pub_recorder)
        .await
        .unwrap();
    assert_eq!(publisher.sent_lens.len(), 3);

    // Everything was discarded by the filter, so the consumer starves until
    // the idle window closes.
    let deadline = Instant::now() + Duration::from_secs(10);
    let err = consume_messages(&msg_rx, &err_rx, 1, deadline)
        .await
        .unwrap_err();
    assert!(matches!(err, ProbeError::IdleTimeout));
}

#[tokio::test]
async fn retained_delivery_kills_the_run_after_valid_traffic() {
    let (mut publisher, msg_rx, err_rx) = LoopbackPublisher::new("t", Some("t"));
    publisher.retain_from = Some(1);
    let config = publisher_config("t", 3, 0);

    let mut pub_recorder = Recorder::new();
    publish_messages(&mut publisher, &config, &mut pub_recorder)
        .await
        .unwrap();

    // One valid message then a retained one: fatal, no result.
    let deadline = Instant::now() + Duration::from_secs(5);
    let err = consume_messages(&msg_rx, &err_rx, 3, deadline)
        .await
        .unwrap_err();
    assert!(matches!(err, ProbeError::UnexpectedRetained));
}
