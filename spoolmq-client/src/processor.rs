use crate::client_error;
use crate::consumer::ConsumerSignal;
use crate::state::{self, ClientState};
use anyhow::{anyhow, Result};
use futures::stream::{SplitSink, StreamExt};
use futures::SinkExt;
use log::{debug, error, trace};
use spoolmq_codec::codec::{AMQPCodec, Frame};
use spoolmq_codec::frame::{self, AMQPFrame, MethodFrameArgs};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio_util::codec::Framed;

pub(crate) type RequestSink = mpsc::Sender<Request>;
pub(crate) type ConsumerSink = mpsc::UnboundedSender<ConsumerSignal>;
pub(crate) type FrameResponse = oneshot::Sender<Result<()>>;

/// What the caller of a request waits for.
///
/// `SentOut` unblocks as soon as the frame is handed to the I/O task,
/// `FrameResponse` when the matching answer frame arrives from the server.
pub(crate) enum WaitFor {
    Nothing,
    SentOut(FrameResponse),
    FrameResponse(FrameResponse),
}

pub(crate) enum Param {
    Frame(AMQPFrame),
    Consume(AMQPFrame, ConsumerSink),
    Publish(AMQPFrame, Vec<u8>),
}

/// A client request, typically a frame to send with the way the caller
/// wants to be unblocked.
pub(crate) struct Request {
    pub(crate) param: Param,
    pub(crate) response: WaitFor,
}

impl fmt::Debug for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.param {
            Param::Frame(frame) => write!(f, "Request{{Frame={:?}}}", frame),
            Param::Consume(frame, _) => write!(f, "Request{{Consume={:?}}}", frame),
            Param::Publish(frame, _) => write!(f, "Request{{Publish={:?}}}", frame),
        }
    }
}

/// Open the TCP connection to the broker and spawn the socket loop which
/// owns it. Requests travel through the returned sink; when the sink is
/// closed or the server goes away the loop finishes.
pub(crate) async fn create_connection(address: &str) -> Result<RequestSink> {
    match TcpStream::connect(address).await {
        Ok(socket) => {
            let (sender, receiver) = mpsc::channel(16);

            tokio::spawn(async move {
                if let Err(e) = socket_loop(socket, receiver).await {
                    error!("Error in socket loop {:?}", e);
                }
            });

            Ok(sender)
        }
        Err(e) => Err(anyhow!("Connection error {:?}", e)),
    }
}

pub(crate) async fn socket_loop(socket: TcpStream, mut requests: mpsc::Receiver<Request>) -> Result<()> {
    let (mut sink, mut stream) = Framed::new(socket, AMQPCodec {}).split();
    let (out_tx, mut out_rx) = mpsc::channel(16);
    let mut client = state::new(out_tx);
    let feedback = Arc::new(Mutex::new(HashMap::<u16, FrameResponse>::new()));

    // I/O output port, handles outgoing frames sent via a channel.
    tokio::spawn(async move {
        if let Err(e) = handle_outgoing(&mut sink, &mut out_rx).await {
            error!("Error writing frame {:?}", e);
        }
    });

    loop {
        tokio::select! {
            incoming = stream.next() => {
                match incoming {
                    Some(Ok(Frame::Frame(frame))) => {
                        if let Err(e) = notify_waiter(&frame, &feedback) {
                            error!("Error {:?}", e);
                        }

                        if let Err(e) = handle_in_frame(frame, &mut client).await {
                            error!("Error {:?}", e);
                        }
                    }
                    Some(Ok(Frame::Frames(frames))) => {
                        for frame in frames {
                            if let Err(e) = notify_waiter(&frame, &feedback) {
                                error!("Error {:?}", e);
                            }

                            if let Err(e) = handle_in_frame(frame, &mut client).await {
                                error!("Error {:?}", e);
                            }
                        }
                    }
                    Some(Err(e)) => {
                        error!("Error reading frame {:?}", e);

                        break;
                    }
                    None => {
                        debug!("Server closed the stream");

                        break;
                    }
                }
            }
            req = requests.recv() => {
                match req {
                    Some(request) => {
                        trace!("Client request {:?}", request);

                        if let Err(e) = handle_request(request, &mut client, &feedback).await {
                            error!("Error {:?}", e);
                        }
                    },
                    None => {
                        debug!("Client dropped the request sink");

                        break;
                    }
                }
            }
        }
    }

    // The connection is over, unblock every pending call and tell the
    // consumers so they can stop waiting for deliveries.
    for (_, fb) in feedback.lock().unwrap().drain() {
        let _ = fb.send(client_error!(None, 501, "Connection closed", 0));
    }

    client.connection_lost();

    Ok(())
}

async fn handle_outgoing(
    sink: &mut SplitSink<Framed<TcpStream, AMQPCodec>, Frame>,
    outgoing: &mut mpsc::Receiver<Frame>,
) -> Result<()> {
    while let Some(f) = outgoing.recv().await {
        sink.send(f).await?;
    }

    Ok(())
}

async fn handle_request(
    request: Request,
    client: &mut ClientState,
    feedback: &Arc<Mutex<HashMap<u16, FrameResponse>>>,
) -> Result<()> {
    match request.param {
        Param::Frame(frame) => {
            let channel = frame_channel(&frame);

            client.send_method(frame).await?;

            resolve_or_register(feedback, channel, request.response);
        }
        Param::Consume(frame, signal_sink) => {
            let channel = frame_channel(&frame);

            client.basic_consume(channel.unwrap_or_default(), frame, signal_sink).await?;

            resolve_or_register(feedback, channel, request.response);
        }
        Param::Publish(frame, body) => {
            client.basic_publish(frame, body).await?;

            resolve_or_register(feedback, None, request.response);
        }
    }

    Ok(())
}

fn frame_channel(f: &AMQPFrame) -> Option<u16> {
    match f {
        AMQPFrame::Header => Some(0),
        AMQPFrame::Method(channel, _, _) => Some(*channel),
        _ => None,
    }
}

/// A frame is on its way out. `SentOut` waiters are done now, answer
/// waiters are parked in the feedback map keyed by the channel until
/// `notify_waiter` sees the response.
fn resolve_or_register(
    feedback: &Arc<Mutex<HashMap<u16, FrameResponse>>>,
    channel: Option<u16>,
    wait_for: WaitFor,
) {
    match wait_for {
        WaitFor::Nothing => (),
        WaitFor::SentOut(tx) => {
            let _ = tx.send(Ok(()));
        }
        WaitFor::FrameResponse(tx) => {
            trace!("Register waiter on channel {:?}", channel);

            if let Some(ch) = channel {
                feedback.lock().unwrap().insert(ch, tx);
            }
        }
    }
}

/// Unblock the client call waiting on the frame's channel. A normal
/// response frame resolves the waiter with a unit value; a channel close
/// fails the waiter of that channel and a connection close fails all of
/// them with a `ClientError`.
fn notify_waiter(frame: &AMQPFrame, feedback: &Arc<Mutex<HashMap<u16, FrameResponse>>>) -> Result<()> {
    trace!("Notify waiter by {:?}", frame);

    match frame {
        AMQPFrame::Method(_, frame::CONNECTION_CLOSE, MethodFrameArgs::ConnectionClose(args)) => {
            let err = crate::ClientError {
                channel: None,
                code: args.code,
                message: args.text.clone(),
                class_method: frame::unify_class_method(args.class_id, args.method_id),
            };

            for (_, fb) in feedback.lock().unwrap().drain() {
                let _ = fb.send(Err(anyhow::Error::new(err.clone())));
            }

            Ok(())
        }
        AMQPFrame::Method(channel, frame::CHANNEL_CLOSE, MethodFrameArgs::ChannelClose(args)) => {
            let err: Result<()> = client_error!(
                Some(*channel),
                args.code,
                args.text.clone(),
                frame::unify_class_method(args.class_id, args.method_id)
            );

            if let Some(fb) = feedback.lock().unwrap().remove(channel) {
                if fb.send(err).is_err() {
                    return client_error!(None, 501, "Cannot unblock client", 0);
                }
            }

            Ok(())
        }
        // Deliveries arrive on their own, they never answer a pending call.
        AMQPFrame::Method(_, frame::BASIC_DELIVER, _) => Ok(()),
        AMQPFrame::Method(channel, _, _) => {
            if let Some(fb) = feedback.lock().unwrap().remove(channel) {
                if fb.send(Ok(())).is_err() {
                    return client_error!(None, 501, "Cannot unblock client", 0);
                }
            }

            Ok(())
        }
        _ => Ok(()),
    }
}

async fn handle_in_frame(f: AMQPFrame, cs: &mut ClientState) -> Result<()> {
    debug!("Incoming frame {:?}", f);

    match f {
        AMQPFrame::Header => Ok(()),
        AMQPFrame::Method(ch, _, args) => handle_in_method_frame(ch, args, cs).await,
        AMQPFrame::ContentHeader(ch) => cs.content_header(ch),
        AMQPFrame::ContentBody(cb) => cs.content_body(cb),
        AMQPFrame::Heartbeat(_) => Ok(()),
    }
}

/// Handle AMQP frames coming from the server side. The handshake answers
/// are driven by the `connect` call through `notify_waiter`, the state only
/// deals with frames which need a reaction on their own.
async fn handle_in_method_frame(
    channel: frame::Channel,
    ma: frame::MethodFrameArgs,
    cs: &mut ClientState,
) -> Result<()> {
    use frame::MethodFrameArgs::*;

    match ma {
        ConnectionStart(_) | ConnectionTune(_) | ConnectionOpenOk => Ok(()),
        ConnectionClose(args) => cs.handle_connection_close(args).await,
        ConnectionCloseOk => cs.connection_close_ok(),
        ChannelOpenOk => Ok(()),
        ChannelClose(args) => cs.handle_channel_close(channel, args).await,
        ChannelCloseOk => cs.channel_close_ok(channel),
        QueueDeclareOk(_) => Ok(()),
        BasicConsumeOk(_) => Ok(()),
        BasicCancel(args) => cs.on_basic_cancel(channel, args).await,
        BasicCancelOk(args) => cs.basic_cancel_ok(channel, args),
        BasicDeliver(args) => cs.basic_deliver(channel, args),
        ma => client_error!(Some(channel), 540, format!("Unexpected frame {:?}", ma), 0),
    }
}

/// Send a frame and wait until the response frame arrives.
pub(crate) async fn call(sink: &RequestSink, f: AMQPFrame) -> Result<()> {
    let (tx, rx) = oneshot::channel();

    sink.send(Request {
        param: Param::Frame(f),
        response: WaitFor::FrameResponse(tx),
    })
    .await?;

    rx.await?
}

/// Send a frame without waiting for any answer.
pub(crate) async fn send(sink: &RequestSink, f: AMQPFrame) -> Result<()> {
    sink.send(Request {
        param: Param::Frame(f),
        response: WaitFor::Nothing,
    })
    .await?;

    Ok(())
}

/// Send a frame and wait until it is handed over to the I/O task.
pub(crate) async fn sync_send(sink: &RequestSink, f: AMQPFrame) -> Result<()> {
    let (tx, rx) = oneshot::channel();

    sink.send(Request {
        param: Param::Frame(f),
        response: WaitFor::SentOut(tx),
    })
    .await?;

    rx.await?
}
