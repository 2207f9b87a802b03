//! Method frame payloads
//!
//! A method payload is the class id and the method id (both u16) followed by
//! the arguments of the method. Consecutive bit arguments are packed into
//! octets, least significant bit first.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::{
    definitions::{self, ReplyCode},
    primitives::{get_short_str, get_u16, put_short_str},
    Error,
};

/// Argument list of a single method
pub trait MethodArgs: Sized {
    /// Class id
    const CLASS_ID: u16;

    /// Method id within the class
    const METHOD_ID: u16;

    /// Writes the arguments, without the class and method ids
    fn encode_args(&self, buf: &mut BytesMut) -> Result<(), Error>;

    /// Reads the arguments, without the class and method ids
    fn decode_args(buf: &mut Bytes) -> Result<Self, Error>;
}

macro_rules! empty_method {
    ($(#[$meta:meta])* $name:ident, $class:expr, $method:expr) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
        pub struct $name;

        impl $crate::methods::MethodArgs for $name {
            const CLASS_ID: u16 = $class;
            const METHOD_ID: u16 = $method;

            fn encode_args(&self, _: &mut bytes::BytesMut) -> Result<(), $crate::Error> {
                Ok(())
            }

            fn decode_args(_: &mut bytes::Bytes) -> Result<Self, $crate::Error> {
                Ok(Self)
            }
        }
    };
}

pub mod basic;
pub mod channel;
pub mod confirm;
pub mod connection;
pub mod exchange;
pub mod queue;
pub mod tx;

macro_rules! methods {
    ($($variant:ident($ty:ty) = $name:literal),* $(,)?) => {
        /// Every method of the protocol
        #[derive(Debug, Clone, PartialEq)]
        pub enum Method {
            $(
                #[doc = concat!("`", $name, "`")]
                $variant($ty),
            )*
        }

        impl Method {
            /// `(class id, method id)`
            pub fn id(&self) -> (u16, u16) {
                match self {
                    $(Method::$variant(_) => (
                        <$ty as MethodArgs>::CLASS_ID,
                        <$ty as MethodArgs>::METHOD_ID,
                    ),)*
                }
            }

            /// Dotted lower case name, eg. `basic.publish`
            pub fn name(&self) -> &'static str {
                match self {
                    $(Method::$variant(_) => $name,)*
                }
            }

            /// Writes the class id, the method id and the arguments
            pub fn encode(&self, buf: &mut BytesMut) -> Result<(), Error> {
                let (class_id, method_id) = self.id();
                buf.put_u16(class_id);
                buf.put_u16(method_id);
                match self {
                    $(Method::$variant(m) => m.encode_args(buf),)*
                }
            }

            /// Reads a complete method payload
            ///
            /// The payload must be consumed exactly, trailing bytes are rejected
            pub fn decode(mut buf: Bytes) -> Result<Self, Error> {
                let class_id = get_u16(&mut buf)?;
                let method_id = get_u16(&mut buf)?;
                let method = Self::decode_args(class_id, method_id, &mut buf)?;
                if buf.has_remaining() {
                    return Err(Error::TrailingBytes(buf.remaining()));
                }
                Ok(method)
            }

            fn decode_args(class_id: u16, method_id: u16, buf: &mut Bytes) -> Result<Self, Error> {
                $(
                    if class_id == <$ty as MethodArgs>::CLASS_ID
                        && method_id == <$ty as MethodArgs>::METHOD_ID
                    {
                        return Ok(Method::$variant(<$ty as MethodArgs>::decode_args(buf)?));
                    }
                )*
                Err(Error::UnknownMethod { class_id, method_id })
            }
        }

        $(
            impl From<$ty> for Method {
                fn from(value: $ty) -> Self {
                    Method::$variant(value)
                }
            }
        )*
    };
}

methods! {
    ConnectionStart(connection::Start) = "connection.start",
    ConnectionStartOk(connection::StartOk) = "connection.start-ok",
    ConnectionSecure(connection::Secure) = "connection.secure",
    ConnectionSecureOk(connection::SecureOk) = "connection.secure-ok",
    ConnectionTune(connection::Tune) = "connection.tune",
    ConnectionTuneOk(connection::TuneOk) = "connection.tune-ok",
    ConnectionOpen(connection::Open) = "connection.open",
    ConnectionOpenOk(connection::OpenOk) = "connection.open-ok",
    ConnectionClose(connection::Close) = "connection.close",
    ConnectionCloseOk(connection::CloseOk) = "connection.close-ok",
    ConnectionBlocked(connection::Blocked) = "connection.blocked",
    ConnectionUnblocked(connection::Unblocked) = "connection.unblocked",
    ConnectionUpdateSecret(connection::UpdateSecret) = "connection.update-secret",
    ConnectionUpdateSecretOk(connection::UpdateSecretOk) = "connection.update-secret-ok",

    ChannelOpen(channel::Open) = "channel.open",
    ChannelOpenOk(channel::OpenOk) = "channel.open-ok",
    ChannelFlow(channel::Flow) = "channel.flow",
    ChannelFlowOk(channel::FlowOk) = "channel.flow-ok",
    ChannelClose(channel::Close) = "channel.close",
    ChannelCloseOk(channel::CloseOk) = "channel.close-ok",

    ExchangeDeclare(exchange::Declare) = "exchange.declare",
    ExchangeDeclareOk(exchange::DeclareOk) = "exchange.declare-ok",
    ExchangeDelete(exchange::Delete) = "exchange.delete",
    ExchangeDeleteOk(exchange::DeleteOk) = "exchange.delete-ok",
    ExchangeBind(exchange::Bind) = "exchange.bind",
    ExchangeBindOk(exchange::BindOk) = "exchange.bind-ok",
    ExchangeUnbind(exchange::Unbind) = "exchange.unbind",
    ExchangeUnbindOk(exchange::UnbindOk) = "exchange.unbind-ok",

    QueueDeclare(queue::Declare) = "queue.declare",
    QueueDeclareOk(queue::DeclareOk) = "queue.declare-ok",
    QueueBind(queue::Bind) = "queue.bind",
    QueueBindOk(queue::BindOk) = "queue.bind-ok",
    QueuePurge(queue::Purge) = "queue.purge",
    QueuePurgeOk(queue::PurgeOk) = "queue.purge-ok",
    QueueDelete(queue::Delete) = "queue.delete",
    QueueDeleteOk(queue::DeleteOk) = "queue.delete-ok",
    QueueUnbind(queue::Unbind) = "queue.unbind",
    QueueUnbindOk(queue::UnbindOk) = "queue.unbind-ok",

    BasicQos(basic::Qos) = "basic.qos",
    BasicQosOk(basic::QosOk) = "basic.qos-ok",
    BasicConsume(basic::Consume) = "basic.consume",
    BasicConsumeOk(basic::ConsumeOk) = "basic.consume-ok",
    BasicCancel(basic::Cancel) = "basic.cancel",
    BasicCancelOk(basic::CancelOk) = "basic.cancel-ok",
    BasicPublish(basic::Publish) = "basic.publish",
    BasicReturn(basic::Return) = "basic.return",
    BasicDeliver(basic::Deliver) = "basic.deliver",
    BasicGet(basic::Get) = "basic.get",
    BasicGetOk(basic::GetOk) = "basic.get-ok",
    BasicGetEmpty(basic::GetEmpty) = "basic.get-empty",
    BasicAck(basic::Ack) = "basic.ack",
    BasicReject(basic::Reject) = "basic.reject",
    BasicRecoverAsync(basic::RecoverAsync) = "basic.recover-async",
    BasicRecover(basic::Recover) = "basic.recover",
    BasicRecoverOk(basic::RecoverOk) = "basic.recover-ok",
    BasicNack(basic::Nack) = "basic.nack",

    ConfirmSelect(confirm::Select) = "confirm.select",
    ConfirmSelectOk(confirm::SelectOk) = "confirm.select-ok",

    TxSelect(tx::Select) = "tx.select",
    TxSelectOk(tx::SelectOk) = "tx.select-ok",
    TxCommit(tx::Commit) = "tx.commit",
    TxCommitOk(tx::CommitOk) = "tx.commit-ok",
    TxRollback(tx::Rollback) = "tx.rollback",
    TxRollbackOk(tx::RollbackOk) = "tx.rollback-ok",
}

impl Method {
    /// Class id of the method
    pub fn class_id(&self) -> u16 {
        self.id().0
    }

    /// Whether a content header and body frames follow the method frame
    pub fn has_content(&self) -> bool {
        matches!(
            self,
            Method::BasicPublish(_)
                | Method::BasicReturn(_)
                | Method::BasicDeliver(_)
                | Method::BasicGetOk(_)
        )
    }

    /// Whether a client request waits for a reply from the server
    ///
    /// Methods carrying a `no-wait` bit that is set do not expect a reply
    pub fn expects_reply(&self) -> bool {
        match self {
            Method::ConnectionOpen(_)
            | Method::ConnectionClose(_)
            | Method::ConnectionUpdateSecret(_)
            | Method::ChannelOpen(_)
            | Method::ChannelFlow(_)
            | Method::ChannelClose(_)
            | Method::QueueUnbind(_)
            | Method::BasicQos(_)
            | Method::BasicGet(_)
            | Method::BasicRecover(_)
            | Method::TxSelect(_)
            | Method::TxCommit(_)
            | Method::TxRollback(_) => true,
            Method::ExchangeDeclare(m) => !m.no_wait,
            Method::ExchangeDelete(m) => !m.no_wait,
            Method::ExchangeBind(m) => !m.no_wait,
            Method::ExchangeUnbind(m) => !m.no_wait,
            Method::QueueDeclare(m) => !m.no_wait,
            Method::QueueBind(m) => !m.no_wait,
            Method::QueuePurge(m) => !m.no_wait,
            Method::QueueDelete(m) => !m.no_wait,
            Method::BasicConsume(m) => !m.no_wait,
            Method::BasicCancel(m) => !m.no_wait,
            Method::ConfirmSelect(m) => !m.no_wait,
            _ => false,
        }
    }

    /// Whether `reply` is a valid response to this request
    pub fn accepts_reply(&self, reply: &Method) -> bool {
        use Method::*;
        matches!(
            (self, reply),
            (ConnectionOpen(_), ConnectionOpenOk(_))
                | (ConnectionClose(_), ConnectionCloseOk(_))
                | (ConnectionUpdateSecret(_), ConnectionUpdateSecretOk(_))
                | (ChannelOpen(_), ChannelOpenOk(_))
                | (ChannelFlow(_), ChannelFlowOk(_))
                | (ChannelClose(_), ChannelCloseOk(_))
                | (ExchangeDeclare(_), ExchangeDeclareOk(_))
                | (ExchangeDelete(_), ExchangeDeleteOk(_))
                | (ExchangeBind(_), ExchangeBindOk(_))
                | (ExchangeUnbind(_), ExchangeUnbindOk(_))
                | (QueueDeclare(_), QueueDeclareOk(_))
                | (QueueBind(_), QueueBindOk(_))
                | (QueuePurge(_), QueuePurgeOk(_))
                | (QueueDelete(_), QueueDeleteOk(_))
                | (QueueUnbind(_), QueueUnbindOk(_))
                | (BasicQos(_), BasicQosOk(_))
                | (BasicConsume(_), BasicConsumeOk(_))
                | (BasicCancel(_), BasicCancelOk(_))
                | (BasicGet(_), BasicGetOk(_) | BasicGetEmpty(_))
                | (BasicRecover(_), BasicRecoverOk(_))
                | (ConfirmSelect(_), ConfirmSelectOk(_))
                | (TxSelect(_), TxSelectOk(_))
                | (TxCommit(_), TxCommitOk(_))
                | (TxRollback(_), TxRollbackOk(_))
        )
    }

    /// Whether a reply of this kind only ever answers a client request
    pub fn is_reply(&self) -> bool {
        use Method::*;
        matches!(
            self,
            ConnectionOpenOk(_)
                | ConnectionCloseOk(_)
                | ConnectionUpdateSecretOk(_)
                | ChannelOpenOk(_)
                | ChannelFlowOk(_)
                | ChannelCloseOk(_)
                | ExchangeDeclareOk(_)
                | ExchangeDeleteOk(_)
                | ExchangeBindOk(_)
                | ExchangeUnbindOk(_)
                | QueueDeclareOk(_)
                | QueueBindOk(_)
                | QueuePurgeOk(_)
                | QueueDeleteOk(_)
                | QueueUnbindOk(_)
                | BasicQosOk(_)
                | BasicConsumeOk(_)
                | BasicCancelOk(_)
                | BasicGetOk(_)
                | BasicGetEmpty(_)
                | BasicRecoverOk(_)
                | ConfirmSelectOk(_)
                | TxSelectOk(_)
                | TxCommitOk(_)
                | TxRollbackOk(_)
        )
    }
}

/// Reply code, reply text, class id and method id, shared by the Close
/// method of the connection and the channel class
pub(crate) fn encode_close(buf: &mut BytesMut, error: &definitions::Error) -> Result<(), Error> {
    buf.put_u16(error.code.into());
    put_short_str(buf, &error.text)?;
    buf.put_u16(error.class_id);
    buf.put_u16(error.method_id);
    Ok(())
}

pub(crate) fn decode_close(buf: &mut Bytes) -> Result<definitions::Error, Error> {
    let code = ReplyCode::from(get_u16(buf)?);
    let text = get_short_str(buf)?;
    let class_id = get_u16(buf)?;
    let method_id = get_u16(buf)?;
    Ok(definitions::Error {
        code,
        text,
        class_id,
        method_id,
    })
}

#[cfg(test)]
mod tests {
    use bytes::{Bytes, BytesMut};

    use crate::value::FieldTable;

    use super::*;

    fn encode(method: &Method) -> Bytes {
        let mut buf = BytesMut::new();
        method.encode(&mut buf).unwrap();
        buf.freeze()
    }

    #[test]
    fn tune_ok_layout() {
        let method = Method::from(connection::TuneOk {
            channel_max: 2047,
            frame_max: 131072,
            heartbeat: 60,
        });
        let bytes = encode(&method);
        assert_eq!(
            &bytes[..],
            &[0, 10, 0, 31, 0x07, 0xff, 0x00, 0x02, 0x00, 0x00, 0x00, 0x3c]
        );
        assert_eq!(Method::decode(bytes).unwrap(), method);
    }

    #[test]
    fn queue_declare_packs_bits() {
        let method = Method::from(queue::Declare {
            queue: "q".into(),
            durable: true,
            auto_delete: true,
            ..Default::default()
        });
        let bytes = encode(&method);
        // class, method, reserved, "q", bits (durable = 1 << 1, auto-delete = 1 << 3), empty table
        assert_eq!(
            &bytes[..],
            &[0, 50, 0, 10, 0, 0, 1, b'q', 0b0000_1010, 0, 0, 0, 0]
        );
        assert_eq!(Method::decode(bytes).unwrap(), method);
    }

    #[test]
    fn deliver_round_trips() {
        let method = Method::from(basic::Deliver {
            consumer_tag: "ctag-1".into(),
            delivery_tag: 42,
            redelivered: true,
            exchange: "".into(),
            routing_key: "rk".into(),
        });
        assert_eq!(Method::decode(encode(&method)).unwrap(), method);
        assert!(method.has_content());
    }

    #[test]
    fn start_round_trips() {
        let mut props = FieldTable::new();
        props.insert("product", "broker");
        let method = Method::from(connection::Start {
            version_major: 0,
            version_minor: 9,
            server_properties: props,
            mechanisms: "PLAIN AMQPLAIN".into(),
            locales: "en_US".into(),
        });
        assert_eq!(Method::decode(encode(&method)).unwrap(), method);
    }

    #[test]
    fn close_carries_reply() {
        let error = definitions::Error::new(ReplyCode::NotFound, "no queue").caused_by((50, 10));
        let method = Method::from(channel::Close::from(error.clone()));
        let decoded = Method::decode(encode(&method)).unwrap();
        match decoded {
            Method::ChannelClose(close) => assert_eq!(definitions::Error::from(close), error),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn unknown_method_is_rejected() {
        let bytes = Bytes::from_static(&[0, 60, 0, 99]);
        assert_eq!(
            Method::decode(bytes),
            Err(Error::UnknownMethod {
                class_id: 60,
                method_id: 99
            })
        );
    }

    #[test]
    fn trailing_bytes_are_rejected() {
        let bytes = Bytes::from_static(&[0, 20, 0, 41, 0xff]);
        assert_eq!(Method::decode(bytes), Err(Error::TrailingBytes(1)));
    }

    #[test]
    fn no_wait_turns_off_reply() {
        let declare = Method::from(queue::Declare {
            no_wait: true,
            ..Default::default()
        });
        assert!(!declare.expects_reply());

        let get = Method::from(basic::Get::default());
        assert!(get.expects_reply());
        assert!(get.accepts_reply(&Method::from(basic::GetEmpty)));
        assert!(!get.accepts_reply(&Method::from(basic::QosOk)));
    }
}
