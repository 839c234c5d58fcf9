use sio_protocol::{Packet, PacketType, Value};

fn s(s: &str) -> Value {
    Value::String(s.to_string())
}

#[test]
fn default_empty_event_encodes_to_bare_digit() {
    let packet = Packet::event("/", None, Value::Null).unwrap();
    assert_eq!(packet.encode().text, "2");
}

#[test]
fn string_event_default_namespace() {
    let packet = Packet::event("/", None, Value::array([s("foo")])).unwrap();
    assert_eq!(packet.encode().text, r#"2["foo"]"#);
}

#[test]
fn event_with_namespace_and_id() {
    let packet = Packet::event("/bar", Some(123), Value::array([s("foo")])).unwrap();
    assert_eq!(packet.encode().text, r#"2/bar,123["foo"]"#);
}

#[test]
fn ack_with_id() {
    let packet = Packet::ack("/", 1000, Value::array([s("foo")])).unwrap();
    assert_eq!(packet.encode().text, r#"31000["foo"]"#);
}

#[test]
fn binary_event_with_one_attachment() {
    let packet = Packet::event("/", None, Value::Bytes(vec![1, 2, 3])).unwrap();
    assert_eq!(packet.r#type, PacketType::BinaryEvent);
    let encoded = packet.encode();
    assert_eq!(encoded.text, r#"51-{"_placeholder":true,"num":0}"#);
    assert_eq!(encoded.attachments, vec![vec![1, 2, 3]]);
}

#[test]
fn namespace_query_string_is_stripped() {
    let packet = Packet::decode(r#"2/bar?a=b,["foo"]"#).unwrap();
    assert_eq!(packet.namespace, "/bar");
    assert_eq!(packet.data, Value::array([s("foo")]));
}

#[test]
fn three_binary_leaves_scenario() {
    // data = {'a': '123', 'b': b'456', 'c': [b'789', 123]}
    let data = Value::Object(vec![
        ("a".to_string(), s("123")),
        ("b".to_string(), Value::Bytes(b"456".to_vec())),
        (
            "c".to_string(),
            Value::Array(vec![Value::Bytes(b"789".to_vec()), Value::Number(123.into())]),
        ),
    ]);
    let packet = Packet::new(PacketType::Event, "/", None, data).unwrap();
    assert_eq!(packet.r#type, PacketType::BinaryEvent);
    assert_eq!(packet.attachment_count, 2);

    let encoded = packet.encode();
    assert_eq!(encoded.attachments, vec![b"456".to_vec(), b"789".to_vec()]);
    assert_eq!(
        encoded.text,
        r#"52-{"a":"123","b":{"_placeholder":true,"num":0},"c":[{"_placeholder":true,"num":1},123]}"#
    );
}

#[test]
fn round_trip_reassembly_of_binary_event() {
    let original = Packet::event("/", None, Value::Bytes(vec![4, 5, 6])).unwrap();
    let encoded = original.encode();

    let mut decoded = Packet::decode(&encoded.text).unwrap();
    assert!(!decoded.is_complete());
    for attachment in encoded.attachments {
        decoded.add_attachment(attachment).unwrap();
    }
    assert!(decoded.is_complete());
    assert_eq!(decoded.data, Value::Bytes(vec![4, 5, 6]));
}

#[test]
fn supplying_more_attachments_than_declared_is_an_error() {
    let mut decoded = Packet::decode(r#"51-{"_placeholder":true,"num":0}"#).unwrap();
    assert!(decoded.add_attachment(vec![1]).unwrap());
    assert!(decoded.add_attachment(vec![2]).is_err());
}

#[test]
fn binary_type_with_no_attachments_is_invalid() {
    assert!(Packet::decode("50-").is_err());
}

#[test]
fn event_type_with_binary_leaf_auto_upgrades() {
    let packet = Packet::new(PacketType::Event, "/", None, Value::Bytes(vec![9])).unwrap();
    assert_eq!(packet.r#type, PacketType::BinaryEvent);
}

#[test]
fn connect_error_round_trips_through_text_frame() {
    let packet = Packet::connect_error("/admin", s("not authorized"));
    let encoded = packet.encode();
    let decoded = Packet::decode(&encoded.text).unwrap();
    assert_eq!(decoded.r#type, PacketType::ConnectError);
    assert_eq!(decoded.namespace, "/admin");
    assert_eq!(decoded.data, s("not authorized"));
}

#[test]
fn unknown_packet_type_digit_is_rejected() {
    assert!(matches!(
        Packet::decode("9"),
        Err(sio_protocol::Error::InvalidPacketType('9'))
    ));
}

#[test]
fn default_namespace_omitted_on_encode() {
    let packet = Packet::disconnect("/");
    assert_eq!(packet.encode().text, "1");
}

#[test]
fn non_default_namespace_present_on_encode() {
    let packet = Packet::disconnect("/admin");
    assert_eq!(packet.encode().text, "1/admin,");
}
