use crate::frame::*;
use bytes::{Buf, BufMut, BytesMut};
use std::io;
use tokio_util::codec::{Decoder, Encoder};

const FRAME_METHOD_FRAME: u8 = 0x01;
const FRAME_CONTENT_HEADER: u8 = 0x02;
const FRAME_CONTENT_BODY: u8 = 0x03;
const FRAME_HEARTBEAT: u8 = 0x08;
const FRAME_AMQP_VERSION: u8 = 0x41;

const FRAME_END: u8 = 0xCE;

/// AMQP encoder and decoder.
pub struct AMQPCodec {}

/// One or more AMQP frames going out in one write.
///
/// A published message is a method frame, a content header and a content
/// body which need to leave the socket together.
#[derive(Debug)]
pub enum Frame {
    Frame(AMQPFrame),
    Frames(Vec<AMQPFrame>),
}

impl Encoder<Frame> for AMQPCodec {
    type Error = io::Error;

    fn encode(&mut self, event: Frame, mut buf: &mut BytesMut) -> Result<(), Self::Error> {
        match event {
            Frame::Frame(frame) => encode_amqp_frame(&mut buf, frame),
            Frame::Frames(frames) => {
                for frame in frames {
                    encode_amqp_frame(&mut buf, frame);
                }
            }
        }

        Ok(())
    }
}

impl Decoder for AMQPCodec {
    type Item = Frame;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < 7 || !is_full_frame(src) {
            return Ok(None);
        }

        match src.get_u8() {
            FRAME_METHOD_FRAME => {
                let channel = src.get_u16();
                let frame_len = src.get_u32() as usize;

                let mut frame_buf = src.split_to(frame_len);
                let frame = decode_method_frame(&mut frame_buf, channel)?;

                let _frame_separator = src.get_u8();

                Ok(Some(Frame::Frame(frame)))
            }
            FRAME_CONTENT_HEADER => {
                let channel = src.get_u16();
                let frame_len = src.get_u32() as usize;

                let mut frame_buf = src.split_to(frame_len);
                let frame = decode_content_header_frame(&mut frame_buf, channel);

                let _frame_separator = src.get_u8();

                Ok(Some(Frame::Frame(frame)))
            }
            FRAME_CONTENT_BODY => {
                let channel = src.get_u16();
                let body_len = src.get_u32();
                let bytes = src.split_to(body_len as usize);

                let _frame_separator = src.get_u8();

                let frame = AMQPFrame::ContentBody(ContentBodyFrame {
                    channel,
                    body: bytes.to_vec(),
                });

                Ok(Some(Frame::Frame(frame)))
            }
            FRAME_HEARTBEAT => {
                let channel = src.get_u16();
                let len = src.get_u32();
                let _ = src.split_to(len as usize);

                let _frame_separator = src.get_u8();

                Ok(Some(Frame::Frame(AMQPFrame::Heartbeat(channel))))
            }
            FRAME_AMQP_VERSION => {
                let mut head = [0u8; 7];
                src.copy_to_slice(&mut head);

                Ok(Some(Frame::Frame(AMQPFrame::Header)))
            }
            f => Err(frame_error(format!("unknown frame type {}", f))),
        }
    }
}

fn frame_error(message: String) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, message)
}

/// Check if the buffer contains a full frame. Cheap to do since all frame
/// types but the protocol header carry their length at a fixed offset.
fn is_full_frame(src: &BytesMut) -> bool {
    match src[0] {
        FRAME_AMQP_VERSION => src.len() >= 8,
        _ => {
            let mut bs = [0u8; 4];
            bs.copy_from_slice(&src[3..7]);

            let len = u32::from_be_bytes(bs) as usize;

            src.len() >= len + 8
        }
    }
}

fn decode_method_frame(mut src: &mut BytesMut, channel: u16) -> io::Result<AMQPFrame> {
    let class_method = src.get_u32();

    let method_frame_args = match class_method {
        CONNECTION_START => decode_connection_start(&mut src)?,
        CONNECTION_START_OK => decode_connection_start_ok(&mut src)?,
        CONNECTION_TUNE => decode_connection_tune(&mut src),
        CONNECTION_TUNE_OK => decode_connection_tune_ok(&mut src),
        CONNECTION_OPEN => decode_connection_open(&mut src)?,
        CONNECTION_OPEN_OK => decode_connection_open_ok(&mut src)?,
        CONNECTION_CLOSE => decode_connection_close(&mut src)?,
        CONNECTION_CLOSE_OK => MethodFrameArgs::ConnectionCloseOk,
        CHANNEL_OPEN => decode_channel_open(&mut src)?,
        CHANNEL_OPEN_OK => decode_channel_open_ok(&mut src)?,
        CHANNEL_CLOSE => decode_channel_close(&mut src)?,
        CHANNEL_CLOSE_OK => MethodFrameArgs::ChannelCloseOk,
        QUEUE_DECLARE => decode_queue_declare(&mut src)?,
        QUEUE_DECLARE_OK => decode_queue_declare_ok(&mut src)?,
        BASIC_CONSUME => decode_basic_consume(&mut src)?,
        BASIC_CONSUME_OK => decode_basic_consume_ok(&mut src)?,
        BASIC_CANCEL => decode_basic_cancel(&mut src)?,
        BASIC_CANCEL_OK => decode_basic_cancel_ok(&mut src)?,
        BASIC_PUBLISH => decode_basic_publish(&mut src)?,
        BASIC_DELIVER => decode_basic_deliver(&mut src)?,
        BASIC_ACK => decode_basic_ack(&mut src),
        cm => return Err(frame_error(format!("unsupported method {:08X}", cm))),
    };

    Ok(AMQPFrame::Method(channel, class_method, method_frame_args))
}

fn decode_connection_start(mut src: &mut BytesMut) -> io::Result<MethodFrameArgs> {
    let args = ConnectionStartArgs {
        version_major: src.get_u8(),
        version_minor: src.get_u8(),
        properties: decode_field_table(&mut src)?,
        mechanisms: decode_long_string(&mut src)?,
        locales: decode_long_string(&mut src)?,
    };

    Ok(MethodFrameArgs::ConnectionStart(args))
}

fn decode_connection_start_ok(mut src: &mut BytesMut) -> io::Result<MethodFrameArgs> {
    let args = ConnectionStartOkArgs {
        properties: decode_field_table(&mut src)?,
        mechanism: decode_short_string(&mut src)?,
        response: decode_long_string(&mut src)?,
        locale: decode_short_string(&mut src)?,
    };

    Ok(MethodFrameArgs::ConnectionStartOk(args))
}

fn decode_connection_tune(src: &mut BytesMut) -> MethodFrameArgs {
    let args = ConnectionTuneArgs {
        channel_max: src.get_u16(),
        frame_max: src.get_u32(),
        heartbeat: src.get_u16(),
    };

    MethodFrameArgs::ConnectionTune(args)
}

fn decode_connection_tune_ok(src: &mut BytesMut) -> MethodFrameArgs {
    let args = ConnectionTuneOkArgs {
        channel_max: src.get_u16(),
        frame_max: src.get_u32(),
        heartbeat: src.get_u16(),
    };

    MethodFrameArgs::ConnectionTuneOk(args)
}

fn decode_connection_open(mut src: &mut BytesMut) -> io::Result<MethodFrameArgs> {
    let virtual_host = decode_short_string(&mut src)?;
    let _reserved = decode_short_string(&mut src)?;
    let flags = src.get_u8();

    Ok(MethodFrameArgs::ConnectionOpen(ConnectionOpenArgs {
        virtual_host,
        insist: flags & 0x01 != 0,
    }))
}

fn decode_connection_open_ok(mut src: &mut BytesMut) -> io::Result<MethodFrameArgs> {
    let _ = decode_short_string(&mut src)?;

    Ok(MethodFrameArgs::ConnectionOpenOk)
}

fn decode_connection_close(mut src: &mut BytesMut) -> io::Result<MethodFrameArgs> {
    let args = ConnectionCloseArgs {
        code: src.get_u16(),
        text: decode_short_string(&mut src)?,
        class_id: src.get_u16(),
        method_id: src.get_u16(),
    };

    Ok(MethodFrameArgs::ConnectionClose(args))
}

fn decode_channel_open(mut src: &mut BytesMut) -> io::Result<MethodFrameArgs> {
    let _ = decode_short_string(&mut src)?;

    Ok(MethodFrameArgs::ChannelOpen)
}

fn decode_channel_open_ok(mut src: &mut BytesMut) -> io::Result<MethodFrameArgs> {
    let _ = decode_long_string(&mut src)?;

    Ok(MethodFrameArgs::ChannelOpenOk)
}

fn decode_channel_close(mut src: &mut BytesMut) -> io::Result<MethodFrameArgs> {
    let args = ChannelCloseArgs {
        code: src.get_u16(),
        text: decode_short_string(&mut src)?,
        class_id: src.get_u16(),
        method_id: src.get_u16(),
    };

    Ok(MethodFrameArgs::ChannelClose(args))
}

fn decode_queue_declare(mut src: &mut BytesMut) -> io::Result<MethodFrameArgs> {
    let _reserved = src.get_u16();
    let name = decode_short_string(&mut src)?;
    let flags = QueueDeclareFlags::from_bits(src.get_u8()).unwrap_or_default();
    let args = decode_field_table(&mut src)?;

    Ok(MethodFrameArgs::QueueDeclare(QueueDeclareArgs { name, flags, args }))
}

fn decode_queue_declare_ok(mut src: &mut BytesMut) -> io::Result<MethodFrameArgs> {
    let args = QueueDeclareOkArgs {
        name: decode_short_string(&mut src)?,
        message_count: src.get_u32(),
        consumer_count: src.get_u32(),
    };

    Ok(MethodFrameArgs::QueueDeclareOk(args))
}

fn decode_basic_consume(mut src: &mut BytesMut) -> io::Result<MethodFrameArgs> {
    let _reserved = src.get_u16();
    let queue = decode_short_string(&mut src)?;
    let consumer_tag = decode_short_string(&mut src)?;
    let flags = BasicConsumeFlags::from_bits(src.get_u8()).unwrap_or_default();
    let args = decode_field_table(&mut src)?;

    Ok(MethodFrameArgs::BasicConsume(BasicConsumeArgs {
        queue,
        consumer_tag,
        flags,
        args,
    }))
}

fn decode_basic_consume_ok(mut src: &mut BytesMut) -> io::Result<MethodFrameArgs> {
    let args = BasicConsumeOkArgs {
        consumer_tag: decode_short_string(&mut src)?,
    };

    Ok(MethodFrameArgs::BasicConsumeOk(args))
}

fn decode_basic_cancel(mut src: &mut BytesMut) -> io::Result<MethodFrameArgs> {
    let args = BasicCancelArgs {
        consumer_tag: decode_short_string(&mut src)?,
        no_wait: src.get_u8() != 0,
    };

    Ok(MethodFrameArgs::BasicCancel(args))
}

fn decode_basic_cancel_ok(mut src: &mut BytesMut) -> io::Result<MethodFrameArgs> {
    let args = BasicCancelOkArgs {
        consumer_tag: decode_short_string(&mut src)?,
    };

    Ok(MethodFrameArgs::BasicCancelOk(args))
}

fn decode_basic_publish(mut src: &mut BytesMut) -> io::Result<MethodFrameArgs> {
    let _reserved = src.get_u16();
    let exchange_name = decode_short_string(&mut src)?;
    let routing_key = decode_short_string(&mut src)?;
    let flags = BasicPublishFlags::from_bits(src.get_u8()).unwrap_or_default();

    Ok(MethodFrameArgs::BasicPublish(BasicPublishArgs {
        exchange_name,
        routing_key,
        flags,
    }))
}

fn decode_basic_deliver(mut src: &mut BytesMut) -> io::Result<MethodFrameArgs> {
    let args = BasicDeliverArgs {
        consumer_tag: decode_short_string(&mut src)?,
        delivery_tag: src.get_u64(),
        redelivered: src.get_u8() != 0,
        exchange_name: decode_short_string(&mut src)?,
        routing_key: decode_short_string(&mut src)?,
    };

    Ok(MethodFrameArgs::BasicDeliver(args))
}

fn decode_basic_ack(src: &mut BytesMut) -> MethodFrameArgs {
    let args = BasicAckArgs {
        delivery_tag: src.get_u64(),
        multiple: src.get_u8() != 0,
    };

    MethodFrameArgs::BasicAck(args)
}

fn decode_content_header_frame(src: &mut BytesMut, channel: u16) -> AMQPFrame {
    let class_id = src.get_u16();
    let weight = src.get_u16();
    let body_size = src.get_u64();
    let prop_flags = src.get_u16();

    AMQPFrame::ContentHeader(ContentHeaderFrame {
        channel,
        class_id,
        weight,
        body_size,
        prop_flags,
    })
}

fn decode_value(mut buf: &mut BytesMut) -> io::Result<AMQPFieldValue> {
    match buf.get_u8() {
        b't' => Ok(AMQPFieldValue::Bool(buf.get_u8() != 0)),
        b'I' => Ok(AMQPFieldValue::Int(buf.get_i32())),
        b'l' => Ok(AMQPFieldValue::LongInt(buf.get_i64())),
        b'T' => Ok(AMQPFieldValue::Timestamp(buf.get_u64())),
        b'S' => Ok(AMQPFieldValue::LongString(decode_long_string(&mut buf)?)),
        b'F' => match decode_field_table(&mut buf)? {
            None => Ok(AMQPFieldValue::FieldTable(Box::default())),
            Some(table) => Ok(AMQPFieldValue::FieldTable(Box::new(table))),
        },
        t => Err(frame_error(format!("unsupported field value type {}", t as char))),
    }
}

fn decode_short_string(buf: &mut BytesMut) -> io::Result<String> {
    let len = buf.get_u8() as usize;
    let sb = buf.split_to(len);

    String::from_utf8(sb.to_vec()).map_err(|e| frame_error(e.to_string()))
}

fn decode_long_string(buf: &mut BytesMut) -> io::Result<String> {
    let len = buf.get_u32() as usize;
    let sb = buf.split_to(len);

    String::from_utf8(sb.to_vec()).map_err(|e| frame_error(e.to_string()))
}

/// Decode a field table.
///
/// The buffer points to the beginning of the field table which is a `u32`
/// length information.
fn decode_field_table(buf: &mut BytesMut) -> io::Result<Option<FieldTable>> {
    let ft_len = buf.get_u32() as usize;

    if ft_len == 0 {
        return Ok(None);
    }

    let mut ft_buf = buf.split_to(ft_len);
    let mut table = FieldTable::new();

    while ft_buf.has_remaining() {
        let field_name = decode_short_string(&mut ft_buf)?;
        let field_value = decode_value(&mut ft_buf)?;

        table.insert(field_name, field_value);
    }

    Ok(Some(table))
}

fn encode_amqp_frame(mut buf: &mut BytesMut, frame: AMQPFrame) {
    match frame {
        AMQPFrame::Header => buf.put(&b"AMQP\x00\x00\x09\x01"[..]),

        AMQPFrame::Method(ch, cm, args) => encode_method_frame(&mut buf, ch, cm, &args),

        AMQPFrame::ContentHeader(header_frame) => encode_content_header_frame(&mut buf, &header_frame),

        AMQPFrame::ContentBody(body_frame) => encode_content_body_frame(&mut buf, &body_frame),

        AMQPFrame::Heartbeat(channel) => encode_heartbeat_frame(&mut buf, channel),
    }
}

fn encode_method_frame(buf: &mut BytesMut, channel: Channel, cm: ClassMethod, args: &MethodFrameArgs) {
    buf.put_u8(FRAME_METHOD_FRAME);
    buf.put_u16(channel);

    let mut fr = BytesMut::with_capacity(4096);
    fr.put_u32(cm);

    match args {
        MethodFrameArgs::ConnectionStart(args) => encode_connection_start(&mut fr, args),
        MethodFrameArgs::ConnectionStartOk(args) => encode_connection_start_ok(&mut fr, args),
        MethodFrameArgs::ConnectionTune(args) => encode_connection_tune(&mut fr, args),
        MethodFrameArgs::ConnectionTuneOk(args) => encode_connection_tune_ok(&mut fr, args),
        MethodFrameArgs::ConnectionOpen(args) => encode_connection_open(&mut fr, args),
        MethodFrameArgs::ConnectionOpenOk => encode_connection_open_ok(&mut fr),
        MethodFrameArgs::ConnectionClose(args) => encode_connection_close(&mut fr, args),
        MethodFrameArgs::ConnectionCloseOk => (),
        MethodFrameArgs::ChannelOpen => encode_channel_open(&mut fr),
        MethodFrameArgs::ChannelOpenOk => encode_channel_open_ok(&mut fr),
        MethodFrameArgs::ChannelClose(args) => encode_channel_close(&mut fr, args),
        MethodFrameArgs::ChannelCloseOk => (),
        MethodFrameArgs::QueueDeclare(args) => encode_queue_declare(&mut fr, args),
        MethodFrameArgs::QueueDeclareOk(args) => encode_queue_declare_ok(&mut fr, args),
        MethodFrameArgs::BasicConsume(args) => encode_basic_consume(&mut fr, args),
        MethodFrameArgs::BasicConsumeOk(args) => encode_basic_consume_ok(&mut fr, args),
        MethodFrameArgs::BasicCancel(args) => encode_basic_cancel(&mut fr, args),
        MethodFrameArgs::BasicCancelOk(args) => encode_basic_cancel_ok(&mut fr, args),
        MethodFrameArgs::BasicPublish(args) => encode_basic_publish(&mut fr, args),
        MethodFrameArgs::BasicDeliver(args) => encode_basic_deliver(&mut fr, args),
        MethodFrameArgs::BasicAck(args) => encode_basic_ack(&mut fr, args),
    }

    buf.put_u32(fr.len() as u32);
    buf.put(fr);
    buf.put_u8(FRAME_END);
}

fn encode_connection_start(mut buf: &mut BytesMut, args: &ConnectionStartArgs) {
    buf.put_u8(args.version_major);
    buf.put_u8(args.version_minor);
    encode_field_table(&mut buf, args.properties.as_ref());
    encode_long_string(&mut buf, &args.mechanisms);
    encode_long_string(&mut buf, &args.locales);
}

fn encode_connection_start_ok(mut buf: &mut BytesMut, args: &ConnectionStartOkArgs) {
    encode_field_table(&mut buf, args.properties.as_ref());
    encode_short_string(&mut buf, &args.mechanism);
    encode_long_string(&mut buf, &args.response);
    encode_short_string(&mut buf, &args.locale);
}

fn encode_connection_tune(buf: &mut BytesMut, args: &ConnectionTuneArgs) {
    buf.put_u16(args.channel_max);
    buf.put_u32(args.frame_max);
    buf.put_u16(args.heartbeat);
}

fn encode_connection_tune_ok(buf: &mut BytesMut, args: &ConnectionTuneOkArgs) {
    buf.put_u16(args.channel_max);
    buf.put_u32(args.frame_max);
    buf.put_u16(args.heartbeat);
}

fn encode_connection_open(buf: &mut BytesMut, args: &ConnectionOpenArgs) {
    encode_short_string(buf, &args.virtual_host);
    encode_short_string(buf, "");

    let mut flags = 0x00;

    if args.insist {
        flags |= 0x01;
    }

    buf.put_u8(flags);
}

fn encode_connection_open_ok(buf: &mut BytesMut) {
    // empty short string
    buf.put_u8(0);
}

fn encode_connection_close(mut buf: &mut BytesMut, args: &ConnectionCloseArgs) {
    buf.put_u16(args.code);
    encode_short_string(&mut buf, &args.text);
    buf.put_u16(args.class_id);
    buf.put_u16(args.method_id);
}

fn encode_channel_open(buf: &mut BytesMut) {
    // empty short string
    buf.put_u8(0);
}

fn encode_channel_open_ok(buf: &mut BytesMut) {
    // empty long string
    buf.put_u32(0);
}

fn encode_channel_close(mut buf: &mut BytesMut, args: &ChannelCloseArgs) {
    buf.put_u16(args.code);
    encode_short_string(&mut buf, &args.text);
    buf.put_u16(args.class_id);
    buf.put_u16(args.method_id);
}

fn encode_queue_declare(mut buf: &mut BytesMut, args: &QueueDeclareArgs) {
    buf.put_u16(0);
    encode_short_string(&mut buf, &args.name);
    buf.put_u8(args.flags.bits());
    encode_field_table(&mut buf, args.args.as_ref());
}

fn encode_queue_declare_ok(mut buf: &mut BytesMut, args: &QueueDeclareOkArgs) {
    encode_short_string(&mut buf, &args.name);
    buf.put_u32(args.message_count);
    buf.put_u32(args.consumer_count);
}

fn encode_basic_consume(mut buf: &mut BytesMut, args: &BasicConsumeArgs) {
    buf.put_u16(0);
    encode_short_string(&mut buf, &args.queue);
    encode_short_string(&mut buf, &args.consumer_tag);
    buf.put_u8(args.flags.bits());
    encode_field_table(&mut buf, args.args.as_ref());
}

fn encode_basic_consume_ok(mut buf: &mut BytesMut, args: &BasicConsumeOkArgs) {
    encode_short_string(&mut buf, &args.consumer_tag);
}

fn encode_basic_cancel(mut buf: &mut BytesMut, args: &BasicCancelArgs) {
    encode_short_string(&mut buf, &args.consumer_tag);
    buf.put_u8(if args.no_wait { 1 } else { 0 });
}

fn encode_basic_cancel_ok(mut buf: &mut BytesMut, args: &BasicCancelOkArgs) {
    encode_short_string(&mut buf, &args.consumer_tag);
}

fn encode_basic_publish(mut buf: &mut BytesMut, args: &BasicPublishArgs) {
    buf.put_u16(0);
    encode_short_string(&mut buf, &args.exchange_name);
    encode_short_string(&mut buf, &args.routing_key);
    buf.put_u8(args.flags.bits());
}

fn encode_basic_deliver(mut buf: &mut BytesMut, args: &BasicDeliverArgs) {
    encode_short_string(&mut buf, &args.consumer_tag);
    buf.put_u64(args.delivery_tag);
    buf.put_u8(if args.redelivered { 1 } else { 0 });
    encode_short_string(&mut buf, &args.exchange_name);
    encode_short_string(&mut buf, &args.routing_key);
}

fn encode_basic_ack(buf: &mut BytesMut, args: &BasicAckArgs) {
    buf.put_u64(args.delivery_tag);
    buf.put_u8(if args.multiple { 1 } else { 0 });
}

fn encode_content_header_frame(buf: &mut BytesMut, hf: &ContentHeaderFrame) {
    buf.put_u8(FRAME_CONTENT_HEADER);
    buf.put_u16(hf.channel);

    let mut fr_buf = BytesMut::with_capacity(16);
    fr_buf.put_u16(hf.class_id);
    fr_buf.put_u16(hf.weight);
    fr_buf.put_u64(hf.body_size);
    fr_buf.put_u16(hf.prop_flags);

    buf.put_u32(fr_buf.len() as u32);
    buf.put(fr_buf);
    buf.put_u8(FRAME_END);
}

fn encode_content_body_frame(buf: &mut BytesMut, bf: &ContentBodyFrame) {
    buf.put_u8(FRAME_CONTENT_BODY);
    buf.put_u16(bf.channel);
    buf.put_u32(bf.body.len() as u32);
    buf.put(bf.body.as_slice());
    buf.put_u8(FRAME_END);
}

fn encode_heartbeat_frame(buf: &mut BytesMut, channel: Channel) {
    buf.put_u8(FRAME_HEARTBEAT);
    buf.put_u16(channel);
    buf.put_u32(0);
    buf.put_u8(FRAME_END);
}

fn encode_short_string(buf: &mut BytesMut, s: &str) {
    debug_assert!(s.len() < 256);

    buf.put_u8(s.len() as u8);
    buf.put(s.as_bytes());
}

fn encode_long_string(buf: &mut BytesMut, s: &str) {
    buf.put_u32(s.len() as u32);
    buf.put(s.as_bytes());
}

fn encode_field_table(mut buf: &mut BytesMut, ft: Option<&FieldTable>) {
    match ft {
        None => buf.put_u32(0),
        Some(t) => encode_field_table2(&mut buf, t),
    }
}

fn encode_field_table2(buf: &mut BytesMut, ft: &FieldTable) {
    let mut ft_buf = BytesMut::with_capacity(4096);

    for (name, value) in ft {
        encode_short_string(&mut ft_buf, name);

        match value {
            AMQPFieldValue::Bool(v) => {
                ft_buf.put_u8(b't');
                ft_buf.put_u8(if *v { 1 } else { 0 });
            }
            AMQPFieldValue::Int(v) => {
                ft_buf.put_u8(b'I');
                ft_buf.put_i32(*v);
            }
            AMQPFieldValue::LongInt(v) => {
                ft_buf.put_u8(b'l');
                ft_buf.put_i64(*v);
            }
            AMQPFieldValue::Timestamp(v) => {
                ft_buf.put_u8(b'T');
                ft_buf.put_u64(*v);
            }
            AMQPFieldValue::LongString(v) => {
                ft_buf.put_u8(b'S');
                ft_buf.put_u32(v.len() as u32);
                ft_buf.put(v.as_bytes());
            }
            AMQPFieldValue::FieldTable(v) => {
                ft_buf.put_u8(b'F');
                encode_field_table2(&mut ft_buf, v);
            }
        }
    }

    buf.put_u32(ft_buf.len() as u32);
    buf.put(ft_buf);
}
