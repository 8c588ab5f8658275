//! ringmesh-core: ring keys, peer records, protocol messages and framing.
//! All other ringmesh crates depend on this one.

pub mod config;
pub mod host;
pub mod key;
pub mod message;
pub mod wire;

pub use host::{Host, HostCache, HostError, NodeAddr, BAD_LINK, GOOD_LINK, SUCCESS_WINDOW};
pub use key::{Key, KeyError, BASE_B, DIGIT_VALUES, KEY_DIGITS};
pub use message::{Arg, ArgType, Message, MessageError, MessageKind, MessageSpec, MESSAGE_SPECS};
