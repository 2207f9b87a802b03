use fe2o3_amqp091::{
    channel,
    connection::{self, Blocking, Builder, OpenError, ViolationScope},
    frames::{Frame, FrameBody},
    types::{
        definitions::{self, ReplyCode},
        methods::{connection as methods, Method},
        value::FieldValue,
    },
};

mod common;

use common::{connect, connect_default, Broker};

#[tokio::test]
async fn open_and_close() {
    let (mut connection, mut broker) = connect_default().await;
    assert_eq!(connection.tuning().frame_max, 4096);
    assert_eq!(connection.tuning().heartbeat, 0);
    assert_eq!(
        connection
            .server_properties()
            .get("product")
            .and_then(FieldValue::as_str),
        Some("mock")
    );

    let (result, close) = tokio::join!(connection.close(), broker.accept_close());
    result.unwrap();
    assert_eq!(close.reply_code, ReplyCode::ReplySuccess);
    assert!(connection.is_closed());

    // Closing twice reports the same outcome without touching the wire
    connection.close().await.unwrap();
    connection.on_close().await.unwrap();
    assert!(broker.next().await.is_none());
}

#[tokio::test]
async fn server_close_is_reported_to_every_handle() {
    let (mut connection, mut broker) = connect_default().await;
    let (channel, id) = tokio::join!(connection.open_channel(), broker.accept_channel());
    let channel = channel.unwrap();
    assert_eq!(id, 1);

    let error = definitions::Error::new(ReplyCode::ConnectionForced, "shutting down");
    broker
        .send_method(0, methods::Close::from(error.clone()))
        .await;
    match broker.recv_method(0).await {
        Method::ConnectionCloseOk(_) => {}
        other => panic!("expecting connection.close-ok, found {:?}", other),
    }

    match connection.on_close().await {
        Err(connection::Error::Remote(remote)) => {
            assert_eq!(remote.code, ReplyCode::ConnectionForced)
        }
        other => panic!("unexpected {:?}", other),
    }
    match channel.on_close().await {
        Err(channel::Error::ConnectionClosed(connection::Error::Remote(remote))) => {
            assert_eq!(remote, error)
        }
        other => panic!("unexpected {:?}", other),
    }
    assert!(matches!(
        channel.qos(10, 0, false).await,
        Err(channel::Error::ConnectionClosed(_))
    ));
    assert!(matches!(
        connection.open_channel().await,
        Err(channel::Error::ConnectionClosed(_))
    ));
}

#[tokio::test]
async fn channel_ids_are_reused_after_close() {
    let (connection, mut broker) = connect_default().await;
    let (first, id) = tokio::join!(connection.open_channel(), broker.accept_channel());
    let first = first.unwrap();
    assert_eq!(id, 1);
    let (second, id) = tokio::join!(connection.open_channel(), broker.accept_channel());
    let _second = second.unwrap();
    assert_eq!(id, 2);

    let broker_side = async {
        match broker.recv_method(1).await {
            Method::ChannelClose(_) => {}
            other => panic!("expecting channel.close, found {:?}", other),
        }
        broker
            .send_method(1, fe2o3_amqp091::types::methods::channel::CloseOk)
            .await;
    };
    let (result, _) = tokio::join!(first.close(), broker_side);
    result.unwrap();

    let (third, id) = tokio::join!(connection.open_channel(), broker.accept_channel());
    let third = third.unwrap();
    assert_eq!(id, 1);
    assert_eq!(third.id(), 1);
}

#[tokio::test]
async fn channel_max_is_enforced() {
    let tune = methods::Tune {
        channel_max: 1,
        frame_max: 4096,
        heartbeat: 0,
    };
    let (connection, mut broker) = connect(Builder::new().heartbeat(0), tune).await;
    assert_eq!(connection.tuning().channel_max, 1);

    let (channel, _) = tokio::join!(connection.open_channel(), broker.accept_channel());
    channel.unwrap();
    assert!(matches!(
        connection.open_channel().await,
        Err(channel::Error::ChannelMaxReached)
    ));
}

#[tokio::test]
async fn channel_violation_closes_connection_by_default() {
    let (mut connection, mut broker) = connect_default().await;
    let (channel, id) = tokio::join!(connection.open_channel(), broker.accept_channel());
    let channel = channel.unwrap();

    // A body frame without a content method is a hard error
    broker
        .send(Frame::new(id, FrameBody::Body("stray".into())))
        .await;
    let close = broker.accept_close().await;
    assert_eq!(close.reply_code, ReplyCode::UnexpectedFrame);

    match connection.on_close().await {
        Err(connection::Error::Local(error)) => assert_eq!(error.code, ReplyCode::UnexpectedFrame),
        other => panic!("unexpected {:?}", other),
    }
    assert!(matches!(
        channel.on_close().await,
        Err(channel::Error::ConnectionClosed(connection::Error::Local(_)))
    ));
}

#[tokio::test]
async fn channel_violation_closes_only_the_channel_when_configured() {
    let tune = methods::Tune {
        channel_max: 0,
        frame_max: 4096,
        heartbeat: 0,
    };
    let builder = Builder::new()
        .heartbeat(0)
        .violation_scope(ViolationScope::Channel);
    let (mut connection, mut broker) = connect(builder, tune).await;
    let (channel, id) = tokio::join!(connection.open_channel(), broker.accept_channel());
    let channel = channel.unwrap();

    broker
        .send(Frame::new(id, FrameBody::Body("stray".into())))
        .await;
    match broker.recv_method(id).await {
        Method::ChannelClose(close) => assert_eq!(close.reply_code, ReplyCode::UnexpectedFrame),
        other => panic!("expecting channel.close, found {:?}", other),
    }
    broker
        .send_method(id, fe2o3_amqp091::types::methods::channel::CloseOk)
        .await;

    match channel.on_close().await {
        Err(channel::Error::Local(error)) => assert_eq!(error.code, ReplyCode::UnexpectedFrame),
        other => panic!("unexpected {:?}", other),
    }
    assert!(!connection.is_closed());

    let (reopened, _) = tokio::join!(connection.open_channel(), broker.accept_channel());
    reopened.unwrap();

    let (result, _) = tokio::join!(connection.close(), broker.accept_close());
    result.unwrap();
}

#[tokio::test]
async fn lost_framing_closes_immediately() {
    let (mut connection, mut broker) = connect_default().await;

    // Method frame on channel 0 with a bad frame-end octet
    broker
        .send_raw(&[1, 0, 0, 0, 0, 0, 4, 0, 10, 0, 40, 0x00])
        .await;
    match broker.recv_method(0).await {
        Method::ConnectionClose(close) => assert_eq!(close.reply_code, ReplyCode::FrameError),
        other => panic!("expecting connection.close, found {:?}", other),
    }
    match connection.on_close().await {
        Err(connection::Error::Local(error)) => assert_eq!(error.code, ReplyCode::FrameError),
        other => panic!("unexpected {:?}", other),
    }
}

#[tokio::test]
async fn deeply_nested_table_closes_with_syntax_error() {
    let (mut connection, mut broker) = connect_default().await;

    // connection.start whose server-properties nest 100 arrays under key "a"
    let depth = 100u32;
    let mut table = vec![1, b'a', b'A'];
    for level in (0..depth).rev() {
        table.extend_from_slice(&(level * 5).to_be_bytes());
        if level > 0 {
            table.push(b'A');
        }
    }
    let mut payload = vec![0, 10, 0, 10, 0, 9];
    payload.extend_from_slice(&(table.len() as u32).to_be_bytes());
    payload.extend_from_slice(&table);
    payload.extend_from_slice(&[0, 0, 0, 5]);
    payload.extend_from_slice(b"PLAIN");
    payload.extend_from_slice(&[0, 0, 0, 5]);
    payload.extend_from_slice(b"en_US");

    let mut frame = vec![1, 0, 0];
    frame.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    frame.extend_from_slice(&payload);
    frame.push(0xCE);
    broker.send_raw(&frame).await;

    let close = broker.accept_close().await;
    assert_eq!(close.reply_code, ReplyCode::SyntaxError);
    match connection.on_close().await {
        Err(connection::Error::Local(error)) => assert_eq!(error.code, ReplyCode::SyntaxError),
        other => panic!("unexpected {:?}", other),
    }
}

#[tokio::test]
async fn frame_on_unknown_channel_is_a_channel_error() {
    let (mut connection, mut broker) = connect_default().await;
    broker
        .send_method(7, fe2o3_amqp091::types::methods::basic::QosOk)
        .await;
    let close = broker.accept_close().await;
    assert_eq!(close.reply_code, ReplyCode::ChannelError);
    assert!(matches!(
        connection.on_close().await,
        Err(connection::Error::Local(_))
    ));
}

#[tokio::test]
async fn blocked_notifications() {
    let (connection, mut broker) = connect_default().await;
    let mut blocked = connection.notify_blocked().await.unwrap();

    broker
        .send_method(
            0,
            methods::Blocked {
                reason: "low on memory".into(),
            },
        )
        .await;
    broker.send_method(0, methods::Unblocked).await;

    assert_eq!(
        blocked.recv().await,
        Some(Blocking {
            active: true,
            reason: "low on memory".into()
        })
    );
    assert_eq!(
        blocked.recv().await,
        Some(Blocking {
            active: false,
            reason: String::new()
        })
    );
}

#[tokio::test]
async fn update_secret() {
    let (connection, mut broker) = connect_default().await;
    let broker_side = async {
        match broker.recv_method(0).await {
            Method::ConnectionUpdateSecret(update) => {
                assert_eq!(update.new_secret.as_bytes(), b"new-token");
                assert_eq!(update.reason, "token refresh");
            }
            other => panic!("expecting connection.update-secret, found {:?}", other),
        }
        broker.send_method(0, methods::UpdateSecretOk).await;
    };
    let (result, _) = tokio::join!(
        connection.update_secret("new-token", "token refresh"),
        broker_side
    );
    result.unwrap();
}

#[tokio::test(start_paused = true)]
async fn silent_server_times_out() {
    let tune = methods::Tune {
        channel_max: 0,
        frame_max: 4096,
        heartbeat: 1,
    };
    let (mut connection, mut broker) = connect(Builder::new().heartbeat(1), tune).await;
    assert_eq!(connection.tuning().heartbeat, 1);

    assert!(matches!(
        connection.on_close().await,
        Err(connection::Error::HeartbeatTimeout)
    ));

    // The client kept sending heartbeats while waiting
    let frame = broker.next().await.unwrap();
    assert_eq!(frame.body, FrameBody::Heartbeat);
    assert_eq!(frame.channel, 0);
}

#[tokio::test]
async fn server_close_during_handshake() {
    let (client, server) = tokio::io::duplex(4096);
    let broker_side = async move {
        use tokio::io::AsyncReadExt;

        let mut server = server;
        let mut header = [0u8; 8];
        server.read_exact(&mut header).await.unwrap();
        let mut framed = tokio_util::codec::Framed::new(
            server,
            fe2o3_amqp091::frames::FrameCodec::new(0),
        );
        let error = definitions::Error::new(ReplyCode::AccessRefused, "login refused");
        futures_util::SinkExt::send(&mut framed, Frame::method(0, methods::Close::from(error)))
            .await
            .unwrap();
        framed
    };
    let (result, _framed) = tokio::join!(Builder::new().open_with_stream(client), broker_side);
    match result {
        Err(OpenError::Remote(error)) => assert_eq!(error.code, ReplyCode::AccessRefused),
        other => panic!("unexpected {:?}", other.map(|_| ())),
    }
}

#[tokio::test]
async fn unsupported_mechanism() {
    let (client, server) = tokio::io::duplex(4096);
    let broker_side = async move {
        use tokio::io::AsyncReadExt;

        let mut server = server;
        let mut header = [0u8; 8];
        server.read_exact(&mut header).await.unwrap();
        let mut framed = tokio_util::codec::Framed::new(
            server,
            fe2o3_amqp091::frames::FrameCodec::new(0),
        );
        let start = methods::Start {
            version_major: 0,
            version_minor: 9,
            server_properties: Broker::server_properties(),
            mechanisms: "EXTERNAL".into(),
            locales: "en_US".into(),
        };
        futures_util::SinkExt::send(&mut framed, Frame::method(0, start))
            .await
            .unwrap();
        framed
    };
    let (result, _framed) = tokio::join!(Builder::new().open_with_stream(client), broker_side);
    match result {
        Err(OpenError::MechanismNotSupported { mechanism, offered }) => {
            assert_eq!(mechanism, "PLAIN");
            assert_eq!(offered, "EXTERNAL");
        }
        other => panic!("unexpected {:?}", other.map(|_| ())),
    }
}
