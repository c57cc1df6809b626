//! Wire protocol: message schema and line framing (spec §4.F, §4.G, §6).

pub mod codec;
pub mod messages;

pub use codec::{CodecError, LineCodec, MAX_LINE_LENGTH};
pub use messages::{ClientRequest, ProtocolError, ServerMessage};
