//! SMPTE timecode value type and framerate descriptor table (spec §3, §4.A, §4.B).

pub mod framerate;
pub mod value;

pub use framerate::{lookup as lookup_framerate, supported_keys, Framerate};
pub use value::{advance, format, from_fields, parse, ParseError};

/// The default `initial_timecode` / `reset_timecode` value when the caller
/// omits one.
pub const DEFAULT_TIMECODE: &str = "00:00:00:00";
