#![allow(dead_code)]

use bytes::{Bytes, BytesMut};
use fe2o3_amqp091::{
    connection::Builder,
    frames::{Frame, FrameBody, FrameCodec},
    types::{
        methods::{channel, connection, Method},
        properties::{BasicProperties, ContentHeader},
        value::FieldTable,
    },
    ConnectionHandle,
};
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncReadExt, DuplexStream};
use tokio_util::codec::Framed;

pub const PROTOCOL_HEADER: &[u8; 8] = b"AMQP\x00\x00\x09\x01";

/// Server side of an in memory connection
pub struct Broker {
    framed: Framed<DuplexStream, FrameCodec>,
    pub frame_max: usize,
}

/// Opens a connection against a broker proposing `tune`
pub async fn connect(builder: Builder, tune: connection::Tune) -> (ConnectionHandle, Broker) {
    let (client, server) = tokio::io::duplex(64 * 1024);
    let (handle, broker) = tokio::join!(
        builder.open_with_stream(client),
        Broker::accept(server, tune)
    );
    (handle.unwrap(), broker)
}

/// Opens a connection with small frames and no heartbeats
pub async fn connect_default() -> (ConnectionHandle, Broker) {
    let tune = connection::Tune {
        channel_max: 2047,
        frame_max: 4096,
        heartbeat: 0,
    };
    connect(Builder::new().frame_max(4096).heartbeat(0), tune).await
}

impl Broker {
    pub async fn accept(mut io: DuplexStream, tune: connection::Tune) -> Self {
        let mut header = [0u8; 8];
        io.read_exact(&mut header).await.unwrap();
        assert_eq!(&header, PROTOCOL_HEADER);

        let mut broker = Self {
            framed: Framed::new(io, FrameCodec::new(0)),
            frame_max: tune.frame_max as usize,
        };
        let start = connection::Start {
            version_major: 0,
            version_minor: 9,
            server_properties: [("product", "mock")].into_iter().collect(),
            mechanisms: "PLAIN AMQPLAIN".into(),
            locales: "en_US".into(),
        };
        broker.send_method(0, start).await;

        match broker.recv_method(0).await {
            Method::ConnectionStartOk(start_ok) => assert_eq!(start_ok.mechanism, "PLAIN"),
            other => panic!("expecting connection.start-ok, found {:?}", other),
        }
        broker.send_method(0, tune).await;

        match broker.recv_method(0).await {
            Method::ConnectionTuneOk(tune_ok) => {
                if tune_ok.frame_max != 0 {
                    broker.frame_max = tune_ok.frame_max as usize;
                }
            }
            other => panic!("expecting connection.tune-ok, found {:?}", other),
        }
        match broker.recv_method(0).await {
            Method::ConnectionOpen(_) => {}
            other => panic!("expecting connection.open, found {:?}", other),
        }
        broker.send_method(0, connection::OpenOk).await;
        broker
    }

    pub async fn send(&mut self, frame: Frame) {
        self.framed.send(frame).await.unwrap();
    }

    pub async fn send_method(&mut self, channel: u16, method: impl Into<Method>) {
        self.send(Frame::method(channel, method)).await;
    }

    pub async fn send_content(
        &mut self,
        channel: u16,
        method: impl Into<Method>,
        properties: BasicProperties,
        body: impl Into<Bytes>,
    ) {
        let body = body.into();
        let header = ContentHeader::new(body.len() as u64, properties);
        for frame in Frame::content(channel, method.into(), header, body, self.frame_max) {
            self.framed.feed(frame).await.unwrap();
        }
        self.framed.flush().await.unwrap();
    }

    /// Writes raw bytes, bypassing the codec
    pub async fn send_raw(&mut self, bytes: &[u8]) {
        use tokio::io::AsyncWriteExt;
        let io = self.framed.get_mut();
        io.write_all(bytes).await.unwrap();
        io.flush().await.unwrap();
    }

    /// Next frame, heartbeats included. `None` once the client is gone
    pub async fn next(&mut self) -> Option<Frame> {
        match self.framed.next().await {
            Some(Ok(frame)) => Some(frame),
            Some(Err(_)) | None => None,
        }
    }

    /// Next frame that is not a heartbeat
    pub async fn recv(&mut self) -> Frame {
        loop {
            let frame = self.next().await.expect("client hung up");
            if frame.body != FrameBody::Heartbeat {
                return frame;
            }
        }
    }

    pub async fn recv_method(&mut self, channel: u16) -> Method {
        let frame = self.recv().await;
        assert_eq!(frame.channel, channel, "unexpected {:?}", frame);
        match frame.body {
            FrameBody::Method(method) => method,
            body => panic!("expecting a method, found {:?}", body),
        }
    }

    /// Reads a content-bearing method with its header and reassembled body
    pub async fn recv_content(&mut self, channel: u16) -> (Method, ContentHeader, Bytes) {
        let method = self.recv_method(channel).await;
        let header = match self.recv().await.body {
            FrameBody::Header(header) => header,
            body => panic!("expecting a content header, found {:?}", body),
        };
        let mut body = BytesMut::new();
        while (body.len() as u64) < header.body_size {
            let frame = self.recv().await;
            assert_eq!(frame.channel, channel);
            match frame.body {
                FrameBody::Body(chunk) => {
                    assert!(chunk.len() + 8 <= self.frame_max);
                    body.extend_from_slice(&chunk);
                }
                body => panic!("expecting a content body, found {:?}", body),
            }
        }
        (method, header, body.freeze())
    }

    /// Answers the next channel.open and returns its channel id
    pub async fn accept_channel(&mut self) -> u16 {
        let frame = self.recv().await;
        match frame.body {
            FrameBody::Method(Method::ChannelOpen(_)) => {}
            body => panic!("expecting channel.open, found {:?}", body),
        }
        self.send_method(frame.channel, channel::OpenOk).await;
        frame.channel
    }

    /// Answers the client's connection.close
    pub async fn accept_close(&mut self) -> connection::Close {
        loop {
            let frame = self.recv().await;
            if let FrameBody::Method(Method::ConnectionClose(close)) = frame.body {
                self.send_method(0, connection::CloseOk).await;
                return close;
            }
        }
    }

    pub fn server_properties() -> FieldTable {
        [("product", "mock")].into_iter().collect()
    }
}
