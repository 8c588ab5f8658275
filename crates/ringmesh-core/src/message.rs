//! Overlay protocol messages.
//!
//! Every message carries a kind, the source and destination keys, and a
//! typed argument list. The argument schema for each kind is fixed by the
//! [`MESSAGE_SPECS`] table; [`Message::validate`] checks a received message
//! against it before any handler runs.

use serde::{Deserialize, Serialize};

use crate::host::NodeAddr;
use crate::key::Key;

/// Message discriminator. Codes are part of the protocol and are what goes
/// on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
#[repr(u8)]
pub enum MessageKind {
    Join = 1,
    JoinAck = 2,
    Update = 3,
    Piggy = 4,
    JoinNack = 5,
    Ping = 6,
    Route = 7,
}

impl MessageKind {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(Self::Join),
            2 => Some(Self::JoinAck),
            3 => Some(Self::Update),
            4 => Some(Self::Piggy),
            5 => Some(Self::JoinNack),
            6 => Some(Self::Ping),
            7 => Some(Self::Route),
            _ => None,
        }
    }

    pub fn spec(self) -> &'static MessageSpec {
        // Table is indexed by code - 1.
        &MESSAGE_SPECS[self as usize - 1]
    }

    pub fn name(self) -> &'static str {
        self.spec().name
    }
}

impl From<MessageKind> for u8 {
    fn from(kind: MessageKind) -> u8 {
        kind as u8
    }
}

impl TryFrom<u8> for MessageKind {
    type Error = MessageError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        MessageKind::from_u8(value).ok_or(MessageError::UnknownKind(value))
    }
}

/// Type of one positional argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgType {
    Addr,
    AddrList,
    Str,
}

/// The receiver must acknowledge the message at transport level.
pub const FLAG_REQUEST_ACK: u8 = 0x01;
/// The message is routed hop by hop towards its destination key.
pub const FLAG_MUST_ROUTE: u8 = 0x02;

/// Static description of one message kind.
#[derive(Debug)]
pub struct MessageSpec {
    pub kind: MessageKind,
    pub name: &'static str,
    pub args: &'static [ArgType],
    pub flags: u8,
}

impl MessageSpec {
    pub fn requests_ack(&self) -> bool {
        self.flags & FLAG_REQUEST_ACK != 0
    }

    pub fn must_route(&self) -> bool {
        self.flags & FLAG_MUST_ROUTE != 0
    }
}

pub static MESSAGE_SPECS: [MessageSpec; 7] = [
    MessageSpec {
        kind: MessageKind::Join,
        name: "JOIN",
        args: &[ArgType::Addr],
        flags: FLAG_REQUEST_ACK | FLAG_MUST_ROUTE,
    },
    MessageSpec {
        kind: MessageKind::JoinAck,
        name: "JOIN_ACK",
        args: &[ArgType::AddrList],
        flags: FLAG_REQUEST_ACK,
    },
    MessageSpec {
        kind: MessageKind::Update,
        name: "UPDATE",
        args: &[ArgType::Addr],
        flags: FLAG_REQUEST_ACK,
    },
    MessageSpec {
        kind: MessageKind::Piggy,
        name: "PIGGY",
        args: &[ArgType::AddrList],
        flags: FLAG_REQUEST_ACK,
    },
    MessageSpec {
        kind: MessageKind::JoinNack,
        name: "JOIN_NACK",
        args: &[ArgType::Addr],
        flags: FLAG_REQUEST_ACK,
    },
    MessageSpec {
        kind: MessageKind::Ping,
        name: "PING",
        args: &[ArgType::Addr],
        flags: FLAG_REQUEST_ACK,
    },
    MessageSpec {
        kind: MessageKind::Route,
        name: "ROUTE",
        args: &[ArgType::Str],
        flags: FLAG_REQUEST_ACK | FLAG_MUST_ROUTE,
    },
];

/// One positional argument value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Arg {
    Addr(NodeAddr),
    AddrList(Vec<NodeAddr>),
    Str(String),
}

impl Arg {
    pub fn arg_type(&self) -> ArgType {
        match self {
            Arg::Addr(_) => ArgType::Addr,
            Arg::AddrList(_) => ArgType::AddrList,
            Arg::Str(_) => ArgType::Str,
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum MessageError {
    #[error("unknown message kind {0}")]
    UnknownKind(u8),
    #[error("{kind} expects {expected} arguments, got {got}")]
    ArgCount {
        kind: &'static str,
        expected: usize,
        got: usize,
    },
    #[error("{kind} argument {index} should be {expected:?}, got {got:?}")]
    ArgType {
        kind: &'static str,
        index: usize,
        expected: ArgType,
        got: ArgType,
    },
    #[error("malformed message body: {0}")]
    Decode(String),
    #[error("failed to encode message: {0}")]
    Encode(String),
}

/// Message envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub kind: MessageKind,
    pub source: Key,
    pub destination: Key,
    pub args: Vec<Arg>,
}

impl Message {
    pub fn new(kind: MessageKind, source: Key, destination: Key, args: Vec<Arg>) -> Self {
        Self {
            kind,
            source,
            destination,
            args,
        }
    }

    pub fn join(source: Key, destination: Key, joiner: NodeAddr) -> Self {
        Self::new(MessageKind::Join, source, destination, vec![Arg::Addr(joiner)])
    }

    pub fn join_ack(source: Key, destination: Key, addrs: Vec<NodeAddr>) -> Self {
        Self::new(MessageKind::JoinAck, source, destination, vec![Arg::AddrList(addrs)])
    }

    pub fn join_nack(source: Key, destination: Key, joiner: NodeAddr) -> Self {
        Self::new(MessageKind::JoinNack, source, destination, vec![Arg::Addr(joiner)])
    }

    pub fn update(source: Key, destination: Key, me: NodeAddr) -> Self {
        Self::new(MessageKind::Update, source, destination, vec![Arg::Addr(me)])
    }

    pub fn piggy(source: Key, destination: Key, addrs: Vec<NodeAddr>) -> Self {
        Self::new(MessageKind::Piggy, source, destination, vec![Arg::AddrList(addrs)])
    }

    pub fn ping(source: Key, destination: Key, me: NodeAddr) -> Self {
        Self::new(MessageKind::Ping, source, destination, vec![Arg::Addr(me)])
    }

    pub fn route(source: Key, destination: Key, payload: String) -> Self {
        Self::new(MessageKind::Route, source, destination, vec![Arg::Str(payload)])
    }

    pub fn spec(&self) -> &'static MessageSpec {
        self.kind.spec()
    }

    /// Check the argument list against the schema for this kind.
    pub fn validate(&self) -> Result<(), MessageError> {
        let spec = self.spec();
        if self.args.len() != spec.args.len() {
            return Err(MessageError::ArgCount {
                kind: spec.name,
                expected: spec.args.len(),
                got: self.args.len(),
            });
        }
        for (index, (arg, expected)) in self.args.iter().zip(spec.args.iter()).enumerate() {
            let got = arg.arg_type();
            if got != *expected {
                return Err(MessageError::ArgType {
                    kind: spec.name,
                    index,
                    expected: *expected,
                    got,
                });
            }
        }
        Ok(())
    }

    /// Argument `index` as an address. Only meaningful after `validate`.
    pub fn addr_arg(&self, index: usize) -> Option<NodeAddr> {
        match self.args.get(index) {
            Some(Arg::Addr(a)) => Some(*a),
            _ => None,
        }
    }

    pub fn addr_list_arg(&self, index: usize) -> Option<&[NodeAddr]> {
        match self.args.get(index) {
            Some(Arg::AddrList(list)) => Some(list),
            _ => None,
        }
    }

    pub fn str_arg(&self, index: usize) -> Option<&str> {
        match self.args.get(index) {
            Some(Arg::Str(s)) => Some(s),
            _ => None,
        }
    }

    /// JSON body as carried by the datagram transport.
    pub fn encode(&self) -> Result<Vec<u8>, MessageError> {
        serde_json::to_vec(self).map_err(|e| MessageError::Encode(e.to_string()))
    }

    /// Decode and validate a JSON body.
    pub fn decode(body: &[u8]) -> Result<Self, MessageError> {
        let value: serde_json::Value =
            serde_json::from_slice(body).map_err(|e| MessageError::Decode(e.to_string()))?;
        let code = value
            .get("kind")
            .and_then(|k| k.as_u64())
            .ok_or_else(|| MessageError::Decode("missing message kind".into()))?;
        match u8::try_from(code).ok().and_then(MessageKind::from_u8) {
            Some(_) => {}
            None => return Err(MessageError::UnknownKind(code.min(u8::MAX as u64) as u8)),
        }
        let msg: Message =
            serde_json::from_value(value).map_err(|e| MessageError::Decode(e.to_string()))?;
        msg.validate()?;
        Ok(msg)
    }
}
