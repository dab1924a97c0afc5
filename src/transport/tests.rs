use bytes::Bytes;

use super::frame::{
    ControlFrame, DATA_MARKER, DataFrame, Frame, FrameError, SUBSCRIBE_MARKER,
    SubscriptionAction, UNSUBSCRIBE_MARKER,
};

#[test]
fn test_control_frame_layout() {
    let subscribe = ControlFrame::subscribe(Bytes::from_static(b"news"));
    assert_eq!(subscribe.encode(), Bytes::from_static(b"\x01news"));

    let unsubscribe = ControlFrame::unsubscribe(Bytes::from_static(b""));
    assert_eq!(unsubscribe.encode(), Bytes::from_static(&[UNSUBSCRIBE_MARKER]));
}

#[test]
fn test_decode_control_frames() {
    let frame = Frame::decode(Bytes::from_static(b"\x01weather.")).unwrap();
    assert_eq!(
        frame,
        Frame::Control(ControlFrame {
            action: SubscriptionAction::Subscribe,
            pattern: Bytes::from_static(b"weather."),
        })
    );

    // a bare marker is the empty (match-all) pattern
    let frame = Frame::decode(Bytes::from_static(&[SUBSCRIBE_MARKER])).unwrap();
    assert_eq!(frame, Frame::Control(ControlFrame::subscribe(Bytes::new())));

    let frame = Frame::decode(Bytes::from_static(b"\x00a")).unwrap();
    assert_eq!(frame, Frame::Control(ControlFrame::unsubscribe(Bytes::from_static(b"a"))));
}

#[test]
fn test_data_frame_layout_and_accessors() {
    let frame = DataFrame::new(b"news.sports", b"goal").unwrap();
    let raw = frame.as_bytes().clone();

    assert_eq!(raw[0], DATA_MARKER);
    assert_eq!(&raw[1..3], &11u16.to_be_bytes());
    assert_eq!(&raw[3..14], b"news.sports");
    assert_eq!(&raw[14..], b"goal");

    let Frame::Data(decoded) = Frame::decode(raw.clone()).unwrap() else {
        panic!("expected data frame");
    };
    assert_eq!(decoded.topic(), Bytes::from_static(b"news.sports"));
    assert_eq!(decoded.payload(), Bytes::from_static(b"goal"));
    assert_eq!(decoded.into_bytes(), raw);
}

#[test]
fn test_data_frame_with_empty_topic_and_payload() {
    let Frame::Data(decoded) = Frame::decode(Bytes::from_static(&[DATA_MARKER, 0, 0])).unwrap() else {
        panic!("expected data frame");
    };
    assert!(decoded.topic().is_empty());
    assert!(decoded.payload().is_empty());
}

#[test]
fn test_payload_may_contain_marker_bytes() {
    let frame = DataFrame::new(b"\x01", b"\x00\x01\x02").unwrap();
    let Frame::Data(decoded) = Frame::decode(frame.into_bytes()).unwrap() else {
        panic!("expected data frame");
    };
    assert_eq!(decoded.topic(), Bytes::from_static(b"\x01"));
    assert_eq!(decoded.payload(), Bytes::from_static(b"\x00\x01\x02"));
}

#[test]
fn test_malformed_frames_are_rejected() {
    assert_eq!(Frame::decode(Bytes::new()), Err(FrameError::Empty));
    assert_eq!(
        Frame::decode(Bytes::from_static(b"\x09abc")),
        Err(FrameError::UnknownMarker(0x09))
    );
    assert_eq!(
        Frame::decode(Bytes::from_static(&[DATA_MARKER, 0])),
        Err(FrameError::Truncated { needed: 3, actual: 2 })
    );
    assert_eq!(
        Frame::decode(Bytes::from_static(&[DATA_MARKER, 0, 5, b'a', b'b'])),
        Err(FrameError::Truncated { needed: 8, actual: 5 })
    );
}

#[test]
fn test_topic_length_limit() {
    let topic = vec![b'x'; u16::MAX as usize + 1];
    assert_eq!(
        DataFrame::new(&topic, b"p"),
        Err(FrameError::TopicTooLong(u16::MAX as usize + 1))
    );
    assert!(DataFrame::new(&topic[..u16::MAX as usize], b"p").is_ok());
}

#[test]
fn test_frame_encode_is_identity_for_data() {
    let data = DataFrame::new(b"t", b"p").unwrap();
    assert_eq!(Frame::Data(data.clone()).encode(), data.into_bytes());
}
