//! The closed table of SMPTE framerates this server understands.

use serde::{Deserialize, Serialize};

/// A supported broadcast framerate.
///
/// `key` is the stable wire identifier (§6.1 of the protocol); `nominal_fps`
/// is never compared for equality, only used to schedule ticks and to
/// compute the 24-hour frame total.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Framerate {
    pub key: &'static str,
    pub nominal_fps: f64,
    pub timebase: u32,
    pub drop_frame: bool,
}

/// Frames dropped per non-tenth minute, for drop-frame rates only.
///
/// `round(nominal_fps * 0.06)`: 2 for 29.97, 4 for 59.94.
impl Framerate {
    pub const fn drop_frames_per_minute(&self) -> u32 {
        if self.drop_frame {
            // timebase is 30 or 60 for the two drop-frame rates we support.
            self.timebase / 15
        } else {
            0
        }
    }

    /// Total number of distinct frame numbers in a 24-hour day, i.e. the
    /// modulus `advance` wraps under.
    pub fn total_frames(&self) -> u32 {
        (self.nominal_fps * 86_400.0).round() as u32
    }
}

const TABLE: &[Framerate] = &[
    Framerate { key: "23.976", nominal_fps: 23.976, timebase: 24, drop_frame: false },
    Framerate { key: "24", nominal_fps: 24.0, timebase: 24, drop_frame: false },
    Framerate { key: "29.97", nominal_fps: 29.97, timebase: 30, drop_frame: true },
    Framerate { key: "30", nominal_fps: 30.0, timebase: 30, drop_frame: false },
    Framerate { key: "50", nominal_fps: 50.0, timebase: 50, drop_frame: false },
    Framerate { key: "59.94", nominal_fps: 59.94, timebase: 60, drop_frame: true },
    Framerate { key: "60", nominal_fps: 60.0, timebase: 60, drop_frame: false },
];

/// Look up a framerate by its wire key. Returns `None` for anything outside
/// the closed set (the caller turns that into `UnknownFramerate`).
pub fn lookup(key: &str) -> Option<Framerate> {
    TABLE.iter().copied().find(|fr| fr.key == key)
}

/// The wire keys of every supported framerate, in table order — used in the
/// `welcome` message's `supported_framerates` field.
pub fn supported_keys() -> Vec<&'static str> {
    TABLE.iter().map(|fr| fr.key).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_known_rates() {
        for key in ["23.976", "24", "29.97", "30", "50", "59.94", "60"] {
            assert!(lookup(key).is_some(), "expected {key} to be supported");
        }
    }

    #[test]
    fn lookup_rejects_unknown() {
        assert!(lookup("25").is_none());
        assert!(lookup("29.97 ").is_none());
    }

    #[test]
    fn drop_frame_flag_matches_spec() {
        assert!(lookup("29.97").unwrap().drop_frame);
        assert!(lookup("59.94").unwrap().drop_frame);
        assert!(!lookup("23.976").unwrap().drop_frame);
        assert!(!lookup("30").unwrap().drop_frame);
        assert!(!lookup("60").unwrap().drop_frame);
    }

    #[test]
    fn total_frames_matches_spec_examples() {
        assert_eq!(lookup("24").unwrap().total_frames(), 2_073_600);
        assert_eq!(lookup("29.97").unwrap().total_frames(), 2_589_408);
        assert_eq!(lookup("59.94").unwrap().total_frames(), 5_178_816);
    }

    #[test]
    fn drop_frames_per_minute_matches_smpte() {
        assert_eq!(lookup("29.97").unwrap().drop_frames_per_minute(), 2);
        assert_eq!(lookup("59.94").unwrap().drop_frames_per_minute(), 4);
        assert_eq!(lookup("30").unwrap().drop_frames_per_minute(), 0);
    }
}
