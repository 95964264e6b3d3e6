use super::*;
use bytes::{Buf, BufMut, BytesMut};
use codec::{AMQPCodec, Frame};
use frame::{AMQPFieldValue, AMQPFrame, MethodFrameArgs};
use tokio_util::codec::{Decoder, Encoder};

fn encode(frame: AMQPFrame) -> BytesMut {
    let mut encoder = AMQPCodec {};
    let mut buf = BytesMut::with_capacity(1024);

    encoder.encode(Frame::Frame(frame), &mut buf).unwrap();

    buf
}

fn decode_single(buf: &mut BytesMut) -> AMQPFrame {
    let mut decoder = AMQPCodec {};

    match decoder.decode(buf).unwrap() {
        Some(Frame::Frame(frame)) => frame,
        other => panic!("expected a single frame, got {:?}", other),
    }
}

#[test]
fn encode_header_frame() {
    let buf = encode(AMQPFrame::Header);

    assert_eq!(&buf[..], &b"AMQP\x00\x00\x09\x01"[..]);
}

#[test]
fn encode_queue_declare_frame() {
    let buf = encode(frame::queue_declare(
        1,
        "prints",
        Some(frame::QueueDeclareFlags::DURABLE),
    ));

    let mut argbuf = BytesMut::with_capacity(64);
    argbuf.put(&b"\x00\x32\x00\x0A"[..]);
    argbuf.put(&b"\x00\x00"[..]);
    argbuf.put(&b"\x06prints"[..]);
    argbuf.put_u8(0x02);
    argbuf.put_u32(0);

    let mut expected = BytesMut::with_capacity(64);
    expected.put(&b"\x01\x00\x01"[..]);
    expected.put_u32(argbuf.len() as u32);
    expected.put(argbuf);
    expected.put_u8(0xCE);

    assert_eq!(expected, buf);
}

#[test]
fn encode_basic_ack_frame() {
    let buf = encode(frame::basic_ack(1, 9, false));

    let mut expected = BytesMut::with_capacity(32);
    expected.put(&b"\x01\x00\x01"[..]);
    expected.put_u32(13);
    expected.put(&b"\x00\x3C\x00\x50"[..]);
    expected.put_u64(9);
    expected.put_u8(0);
    expected.put_u8(0xCE);

    assert_eq!(expected, buf);
}

#[test]
fn decode_encoded_basic_deliver() {
    let mut buf = encode(frame::basic_deliver(4, "ctag-1", 42, true, "", "prints"));

    match decode_single(&mut buf) {
        AMQPFrame::Method(4, frame::BASIC_DELIVER, MethodFrameArgs::BasicDeliver(args)) => {
            assert_eq!(args.consumer_tag, "ctag-1");
            assert_eq!(args.delivery_tag, 42);
            assert!(args.redelivered);
            assert_eq!(args.exchange_name, "");
            assert_eq!(args.routing_key, "prints");
        }
        other => panic!("unexpected frame {:?}", other),
    }

    assert!(!buf.has_remaining());
}

#[test]
fn decode_encoded_content_frames() {
    let payload = b"hello receipt".to_vec();

    let mut buf = encode(frame::content_header(7, payload.len() as u64).into());

    match decode_single(&mut buf) {
        AMQPFrame::ContentHeader(header) => {
            assert_eq!(header.channel, 7);
            assert_eq!(header.class_id, 0x003C);
            assert_eq!(header.body_size, payload.len() as u64);
        }
        other => panic!("unexpected frame {:?}", other),
    }

    let mut buf = encode(frame::content_body(7, &payload).into());

    match decode_single(&mut buf) {
        AMQPFrame::ContentBody(body) => {
            assert_eq!(body.channel, 7);
            assert_eq!(body.body, payload);
        }
        other => panic!("unexpected frame {:?}", other),
    }
}

#[test]
fn decode_encoded_connection_start_properties() {
    let mut buf = encode(frame::connection_start(0));

    match decode_single(&mut buf) {
        AMQPFrame::Method(0, frame::CONNECTION_START, MethodFrameArgs::ConnectionStart(args)) => {
            assert_eq!(args.version_major, 0);
            assert_eq!(args.version_minor, 9);
            assert_eq!(args.mechanisms, "PLAIN");

            let properties = args.properties.unwrap();

            assert_eq!(
                properties.get("product"),
                Some(&AMQPFieldValue::LongString("spoolmq".into()))
            );

            match properties.get("capabilities") {
                Some(AMQPFieldValue::FieldTable(caps)) => {
                    assert_eq!(
                        caps.get("consumer_cancel_notify"),
                        Some(&AMQPFieldValue::Bool(true))
                    );
                }
                other => panic!("missing capabilities table: {:?}", other),
            }
        }
        other => panic!("unexpected frame {:?}", other),
    }
}

#[test]
fn decode_partial_frame_waits_for_more() {
    let buf = encode(frame::channel_open(1));
    let mut partial = BytesMut::from(&buf[..buf.len() - 2]);

    let mut decoder = AMQPCodec {};

    assert!(decoder.decode(&mut partial).unwrap().is_none());

    partial.put(&buf[buf.len() - 2..]);

    match decode_single(&mut partial) {
        AMQPFrame::Method(1, frame::CHANNEL_OPEN, MethodFrameArgs::ChannelOpen) => (),
        other => panic!("unexpected frame {:?}", other),
    }
}

#[test]
fn decode_heartbeat_frame() {
    let mut buf = encode(frame::heartbeat());

    assert!(matches!(decode_single(&mut buf), AMQPFrame::Heartbeat(0)));
}
