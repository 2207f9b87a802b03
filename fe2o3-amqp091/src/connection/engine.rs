//! The engine is the single reader and writer of the socket. It owns every
//! channel state machine and routes frames between them and the handles.

use std::{
    collections::{BTreeMap, VecDeque},
    io,
    time::Duration,
};

use fe2o3_amqp091_types::{
    definitions::{self, ReplyCode, FRAME_MIN_SIZE},
    methods::{channel as channel_methods, connection, Method},
    value::FieldTable,
};
use futures_util::{SinkExt, StreamExt};
use tokio::{
    io::{AsyncRead, AsyncWrite},
    sync::{mpsc, oneshot, watch},
    task::JoinHandle,
};
use tracing::{debug, error, instrument, trace, warn};

use crate::{
    channel::{self, engine::ChannelEngine},
    control::{ChannelControl, ConnectionControl},
    frames::{Frame, FrameBody},
    transport::{self, ProtocolHeader, Transport},
    util::Running,
};

use super::{
    error::framing_error, heartbeat::HeartBeat, Blocking, Builder, Error, OpenError, Tuning,
    ViolationScope,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConnectionState {
    Opened,
    CloseSent,
}

#[derive(Debug)]
pub(crate) struct ConnectionEngine<Io> {
    transport: Transport<Io>,
    control: mpsc::Receiver<ConnectionControl>,
    control_closed: bool,
    heartbeat: HeartBeat,
    tuning: Tuning,
    violation_scope: ViolationScope,
    state: ConnectionState,

    channels: BTreeMap<u16, ChannelEngine>,
    next_serial: u64,

    blocked_listeners: Vec<mpsc::UnboundedSender<Blocking>>,
    pending_secrets: VecDeque<oneshot::Sender<Result<(), Error>>>,

    outcome: Option<Result<(), Error>>,
    closed: watch::Sender<Option<Result<(), Error>>>,
}

/// Reads the next method on channel 0 during the handshake
async fn recv_handshake<Io>(transport: &mut Transport<Io>) -> Result<Method, OpenError>
where
    Io: AsyncRead + AsyncWrite + Unpin,
{
    loop {
        let frame = match transport.next().await {
            Some(frame) => frame?,
            None => {
                return Err(OpenError::Io(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "Connection closed during handshake",
                )))
            }
        };
        trace!(channel = frame.channel, frame = ?frame.body);
        match (frame.channel, frame.body) {
            (_, FrameBody::Heartbeat) => continue,
            (0, FrameBody::Method(Method::ConnectionClose(close))) => {
                let _ = transport
                    .send(Frame::method(0, connection::CloseOk))
                    .await;
                return Err(OpenError::Remote(close.into()));
            }
            (0, FrameBody::Method(method)) => return Ok(method),
            (channel, body) => {
                return Err(OpenError::UnexpectedFrame(format!(
                    "{:?} on channel {}",
                    body, channel
                )))
            }
        }
    }
}

impl<Io> ConnectionEngine<Io>
where
    Io: AsyncRead + AsyncWrite + Send + Unpin + 'static,
{
    /// Runs the handshake without starting the event loop
    #[instrument(name = "OPEN", skip_all, fields(vhost = %builder.virtual_host))]
    pub(crate) async fn open(
        mut io: Io,
        builder: &Builder,
        control: mpsc::Receiver<ConnectionControl>,
        closed: watch::Sender<Option<Result<(), Error>>>,
    ) -> Result<(Self, FieldTable), OpenError> {
        Transport::send_proto_header(&mut io, ProtocolHeader::amqp()).await?;
        let frame_max = match builder.frame_max {
            0 => 0,
            frame_max => frame_max.max(FRAME_MIN_SIZE),
        };
        let mut transport = Transport::bind(io, frame_max as usize, None);

        // Connection.Start
        let start = match recv_handshake(&mut transport).await? {
            Method::ConnectionStart(start) => start,
            other => return Err(OpenError::UnexpectedFrame(other.name().to_string())),
        };
        debug!(
            version = ?(start.version_major, start.version_minor),
            mechanisms = %start.mechanisms,
            "RECV connection.start"
        );
        let profile = builder.sasl_profile.clone().unwrap_or_default();
        let offered = start.mechanisms.as_str().unwrap_or_default();
        if !profile.is_offered(offered) {
            return Err(OpenError::MechanismNotSupported {
                mechanism: profile.mechanism(),
                offered: offered.to_string(),
            });
        }

        // Connection.StartOk
        let start_ok = connection::StartOk {
            client_properties: builder.client_properties(),
            mechanism: profile.mechanism().to_string(),
            response: profile.initial_response(),
            locale: builder.locale.clone(),
        };
        transport.send(Frame::method(0, start_ok)).await?;

        // Connection.Tune
        let tune = match recv_handshake(&mut transport).await? {
            Method::ConnectionTune(tune) => tune,
            other => return Err(OpenError::UnexpectedFrame(other.name().to_string())),
        };
        let tuning = Tuning::negotiate(&builder.client_tuning(), &tune);
        debug!(?tune, ?tuning, "Negotiated tuning");

        // Connection.TuneOk
        let tune_ok = connection::TuneOk {
            channel_max: tuning.channel_max,
            frame_max: tuning.frame_max,
            heartbeat: tuning.heartbeat,
        };
        transport.send(Frame::method(0, tune_ok)).await?;
        transport.set_max_frame_size(tuning.frame_max as usize);
        let heartbeat = Duration::from_secs(u64::from(tuning.heartbeat));
        transport.set_idle_timeout(heartbeat * 2);

        // Connection.Open
        let open = connection::Open {
            virtual_host: builder.virtual_host.clone(),
        };
        transport.send(Frame::method(0, open)).await?;
        match recv_handshake(&mut transport).await? {
            Method::ConnectionOpenOk(_) => {}
            other => return Err(OpenError::UnexpectedFrame(other.name().to_string())),
        }
        debug!("Connection opened");

        let engine = Self {
            transport,
            control,
            control_closed: false,
            heartbeat: HeartBeat::new(heartbeat),
            tuning,
            violation_scope: builder.violation_scope,
            state: ConnectionState::Opened,
            channels: BTreeMap::new(),
            next_serial: 0,
            blocked_listeners: Vec::new(),
            pending_secrets: VecDeque::new(),
            outcome: None,
            closed,
        };
        Ok((engine, start.server_properties))
    }

    pub fn tuning(&self) -> Tuning {
        self.tuning
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.event_loop())
    }

    fn closed_error(&self) -> Error {
        match &self.outcome {
            Some(Err(err)) => err.clone(),
            _ => Error::Closed,
        }
    }

    #[instrument(name = "SEND", skip_all)]
    async fn send_frame(&mut self, frame: Frame) -> Result<(), Error> {
        trace!(channel = frame.channel, frame = ?frame.body);
        self.transport.send(frame).await?;
        self.heartbeat.record_sent();
        Ok(())
    }

    /// Writes the frames a channel has queued and releases the channel once
    /// it is closed
    #[instrument(name = "SEND", skip_all, fields(channel = id))]
    async fn flush_channel(&mut self, id: u16) -> Result<(), Error> {
        let (frames, closed) = match self.channels.get_mut(&id) {
            Some(channel) => (channel.take_outgoing(), channel.is_closed()),
            None => return Ok(()),
        };
        if !frames.is_empty() {
            for frame in frames {
                trace!(frame = ?frame.body);
                self.transport.feed(frame).await?;
            }
            self.transport.flush().await?;
            self.heartbeat.record_sent();
        }
        if closed {
            self.channels.remove(&id);
            debug!(channel = id, "Channel id released");
        }
        Ok(())
    }

    fn terminate_channels(&mut self, reason: &Result<(), Error>) {
        let error = channel::Error::ConnectionClosed(match reason {
            Ok(()) => Error::Closed,
            Err(err) => err.clone(),
        });
        for (_, mut channel) in std::mem::take(&mut self.channels) {
            channel.terminate(Err(error.clone()));
        }
    }

    /// Sends Connection.Close. A `None` error closes the connection normally.
    async fn begin_close(&mut self, error: Option<definitions::Error>) -> Result<Running, Error> {
        if self.state != ConnectionState::Opened {
            return Ok(Running::Continue);
        }
        let (close, reason) = match error {
            Some(error) => (error.clone(), Err(Error::Local(error))),
            None => (
                definitions::Error::new(ReplyCode::ReplySuccess, "Closed by client"),
                Ok(()),
            ),
        };
        debug!(?reason, "Closing connection");

        self.state = ConnectionState::CloseSent;
        self.terminate_channels(&reason);
        self.outcome = Some(reason);
        self.send_frame(Frame::method(0, connection::Close::from(close)))
            .await?;
        Ok(Running::Continue)
    }

    /* ------------------------------ incoming ------------------------------ */

    #[instrument(name = "RECV", skip_all)]
    async fn on_incoming(
        &mut self,
        incoming: Result<Frame, transport::Error>,
    ) -> Result<Running, Error> {
        let frame = match incoming {
            Ok(frame) => frame,
            Err(transport::Error::Framing(err)) if err.is_framing_intact() => {
                let error = framing_error(&err);
                warn!(%error, "Malformed frame");
                return self.begin_close(Some(error)).await;
            }
            Err(transport::Error::Framing(err)) => {
                let error = framing_error(&err);
                error!(%error, "Framing lost");
                // Nothing more can be read, the peer is not waited on
                let close = connection::Close::from(error.clone());
                let _ = self.send_frame(Frame::method(0, close)).await;
                return Err(Error::Local(error));
            }
            Err(err) => return Err(err.into()),
        };

        let Frame { channel, body } = frame;
        trace!(channel, frame = ?body);
        if self.state == ConnectionState::CloseSent {
            return self.on_incoming_while_closing(channel, body).await;
        }
        match channel {
            0 => self.on_connection_frame(body).await,
            id => self.on_channel_frame(id, body).await,
        }
    }

    async fn on_incoming_while_closing(
        &mut self,
        channel: u16,
        body: FrameBody,
    ) -> Result<Running, Error> {
        match (channel, body) {
            (0, FrameBody::Method(Method::ConnectionCloseOk(_))) => Ok(Running::Stop),
            (0, FrameBody::Method(Method::ConnectionClose(close))) => {
                debug!(close = ?close, "Close crossed on the wire");
                self.send_frame(Frame::method(0, connection::CloseOk)).await?;
                Ok(Running::Stop)
            }
            // Discarded until Connection.CloseOk
            _ => Ok(Running::Continue),
        }
    }

    async fn on_connection_frame(&mut self, body: FrameBody) -> Result<Running, Error> {
        let method = match body {
            FrameBody::Heartbeat => return Ok(Running::Continue),
            FrameBody::Method(method) => method,
            body => {
                let error = definitions::Error::new(
                    ReplyCode::UnexpectedFrame,
                    format!("Unexpected {:?} on channel 0", body),
                );
                return self.begin_close(Some(error)).await;
            }
        };

        match method {
            Method::ConnectionClose(close) => {
                let error = definitions::Error::from(close);
                warn!(%error, "Connection closed by server");
                self.send_frame(Frame::method(0, connection::CloseOk)).await?;
                self.outcome = Some(Err(Error::Remote(error)));
                Ok(Running::Stop)
            }
            Method::ConnectionBlocked(blocked) => {
                debug!(reason = %blocked.reason, "Connection blocked");
                self.notify_blocked(Blocking {
                    active: true,
                    reason: blocked.reason,
                });
                Ok(Running::Continue)
            }
            Method::ConnectionUnblocked(_) => {
                debug!("Connection unblocked");
                self.notify_blocked(Blocking {
                    active: false,
                    reason: String::new(),
                });
                Ok(Running::Continue)
            }
            Method::ConnectionUpdateSecretOk(_) => match self.pending_secrets.pop_front() {
                Some(responder) => {
                    let _ = responder.send(Ok(()));
                    Ok(Running::Continue)
                }
                None => {
                    let error = definitions::Error::new(
                        ReplyCode::UnexpectedFrame,
                        "Unexpected connection.update-secret-ok",
                    );
                    self.begin_close(Some(error)).await
                }
            },
            method => {
                let error = definitions::Error::new(
                    ReplyCode::UnexpectedFrame,
                    format!("Unexpected {} on channel 0", method.name()),
                )
                .caused_by(method.id());
                self.begin_close(Some(error)).await
            }
        }
    }

    fn notify_blocked(&mut self, blocking: Blocking) {
        self.blocked_listeners
            .retain(|listener| listener.send(blocking.clone()).is_ok());
    }

    async fn on_channel_frame(&mut self, id: u16, body: FrameBody) -> Result<Running, Error> {
        let channel = match self.channels.get_mut(&id) {
            Some(channel) => channel,
            None => return self.on_unknown_channel(id, body).await,
        };

        if let Err(error) = channel.on_incoming(body) {
            match self.violation_scope {
                ViolationScope::Channel => {
                    warn!(channel = id, %error, "Closing channel on protocol violation");
                    channel.begin_close(Some(error), None);
                }
                ViolationScope::Connection => {
                    warn!(channel = id, %error, "Closing connection on protocol violation");
                    return self.begin_close(Some(error)).await;
                }
            }
        }
        self.flush_channel(id).await?;
        Ok(Running::Continue)
    }

    async fn on_unknown_channel(&mut self, id: u16, body: FrameBody) -> Result<Running, Error> {
        match body {
            FrameBody::Method(Method::ChannelCloseOk(_)) => Ok(Running::Continue),
            FrameBody::Method(Method::ChannelClose(_)) => {
                self.send_frame(Frame::method(id, channel_methods::CloseOk))
                    .await?;
                Ok(Running::Continue)
            }
            body => {
                let error = definitions::Error::new(
                    ReplyCode::ChannelError,
                    format!("{:?} on unknown channel {}", body, id),
                );
                self.begin_close(Some(error)).await
            }
        }
    }

    /* ------------------------------ control ------------------------------- */

    fn allocate_channel_id(&self) -> Option<u16> {
        (1..=self.tuning.max_channel_id()).find(|id| !self.channels.contains_key(id))
    }

    async fn on_control(&mut self, control: ConnectionControl) -> Result<Running, Error> {
        match control {
            ConnectionControl::OpenChannel { responder } => {
                if self.state != ConnectionState::Opened {
                    let error = channel::Error::ConnectionClosed(self.closed_error());
                    let _ = responder.send(Err(error));
                    return Ok(Running::Continue);
                }
                let id = match self.allocate_channel_id() {
                    Some(id) => id,
                    None => {
                        let _ = responder.send(Err(channel::Error::ChannelMaxReached));
                        return Ok(Running::Continue);
                    }
                };
                let serial = self.next_serial;
                self.next_serial += 1;
                let channel =
                    ChannelEngine::open(id, serial, self.tuning.frame_max as usize, responder);
                self.channels.insert(id, channel);
                debug!(channel = id, "Opening channel");
                self.flush_channel(id).await?;
            }
            ConnectionControl::Channel {
                id,
                serial,
                control,
            } => match self.channels.get_mut(&id) {
                Some(channel) if channel.serial() == serial => {
                    channel.on_control(control);
                    self.flush_channel(id).await?;
                }
                // The handle belongs to a channel that is gone. Dropping the
                // control lets the handle report its recorded close reason.
                _ => drop::<ChannelControl>(control),
            },
            ConnectionControl::UpdateSecret {
                new_secret,
                reason,
                responder,
            } => {
                if self.state != ConnectionState::Opened {
                    let _ = responder.send(Err(self.closed_error()));
                    return Ok(Running::Continue);
                }
                let update = connection::UpdateSecret { new_secret, reason };
                self.send_frame(Frame::method(0, update)).await?;
                self.pending_secrets.push_back(responder);
            }
            ConnectionControl::NotifyBlocked(listener) => self.blocked_listeners.push(listener),
            ConnectionControl::Close(error) => return self.begin_close(error).await,
        }
        Ok(Running::Continue)
    }

    async fn on_heartbeat(&mut self) -> Result<Running, Error> {
        if self.heartbeat.is_due() {
            self.send_frame(Frame::heartbeat()).await?;
        }
        Ok(Running::Continue)
    }

    async fn event_loop(mut self) {
        let result = loop {
            let running = tokio::select! {
                _ = self.heartbeat.next() => self.on_heartbeat().await,
                incoming = self.transport.next() => match incoming {
                    Some(incoming) => self.on_incoming(incoming).await,
                    None if self.state == ConnectionState::CloseSent => Ok(Running::Stop),
                    None => Err(Error::from(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "Connection closed by peer",
                    ))),
                },
                control = self.control.recv(), if !self.control_closed => match control {
                    Some(control) => self.on_control(control).await,
                    None => {
                        // Every handle is dropped
                        self.control_closed = true;
                        self.begin_close(None).await
                    }
                },
            };

            match running {
                Ok(Running::Continue) => {}
                Ok(Running::Stop) => break self.outcome.take().unwrap_or(Ok(())),
                Err(err) => break Err(err),
            }
        };

        self.shutdown(result).await
    }

    async fn shutdown(mut self, result: Result<(), Error>) {
        match &result {
            Ok(()) => debug!("Connection closed"),
            Err(err) => error!(%err, "Connection closed"),
        }
        self.terminate_channels(&result);
        let error = match &result {
            Ok(()) => Error::Closed,
            Err(err) => err.clone(),
        };
        for responder in self.pending_secrets.drain(..) {
            let _ = responder.send(Err(error.clone()));
        }
        self.blocked_listeners.clear();
        self.closed.send_replace(Some(result));
        let _ = self.transport.close().await;
    }
}
