//! Approximate on-wire size of a PUBLISH, used for throughput accounting.
//!
//! One fixed-header byte, the variable-length remaining-length field, the
//! two-byte topic length prefix, the topic, a two-byte packet id for QoS 1
//! and 2, and the payload. The transport may frame the real packet
//! differently; this is an accounting estimate, not a codec.

use rumqttc::QoS;

/// Number of 7-bit groups in the MQTT variable-length integer encoding of
/// `value`. Zero encodes in zero groups.
pub fn len_var_int(mut value: usize) -> usize {
    let mut groups = 0;
    while value > 0 {
        groups += 1;
        value >>= 7;
    }
    groups
}

/// Estimated wire length of publishing `payload_len` bytes to a topic of
/// `topic_len` bytes at `qos`.
pub fn publish_len(topic_len: usize, qos: QoS, payload_len: usize) -> usize {
    let mut body = 2 + topic_len + payload_len;
    if qos != QoS::AtMostOnce {
        body += 2;
    }
    1 + len_var_int(body) + body
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn var_int_group_boundaries() {
        assert_eq!(len_var_int(0), 0);
        assert_eq!(len_var_int(1), 1);
        assert_eq!(len_var_int(127), 1);
        assert_eq!(len_var_int(128), 2);
        assert_eq!(len_var_int(16_383), 2);
        assert_eq!(len_var_int(16_384), 3);
    }

    #[test]
    fn qos0_publish_to_foo() {
        // body = 2 + 3 + 10 = 15, one var-int group, total 17
        assert_eq!(publish_len("foo".len(), QoS::AtMostOnce, 10), 17);
    }

    #[test]
    fn qos_above_zero_reserves_a_packet_id() {
        assert_eq!(
            publish_len(3, QoS::AtLeastOnce, 10),
            publish_len(3, QoS::AtMostOnce, 10) + 2
        );
        assert_eq!(
            publish_len(3, QoS::ExactlyOnce, 10),
            publish_len(3, QoS::AtLeastOnce, 10)
        );
    }

    #[test]
    fn long_body_grows_the_length_field() {
        // body = 2 + 3 + 200 = 205 needs two var-int groups
        assert_eq!(publish_len(3, QoS::AtMostOnce, 200), 1 + 2 + 205);
    }
}
