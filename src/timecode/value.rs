//! `HH:MM:SS:FF` parsing, formatting, and frame arithmetic.
//!
//! The canonical representation is a frame count (`u32`) under a given
//! [`Framerate`]; display form is computed on demand. For drop-frame rates
//! the forward/reverse conversion follows the standard SMPTE algorithm (the
//! same one used by `ffmpeg`'s `av_timecode` and by reference crates such as
//! `video-timecode`): drop `drop_frames_per_minute` frame numbers at the
//! start of every minute except the tenth.

use thiserror::Error;

use super::framerate::Framerate;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("expected HH:MM:SS:FF, got {0:?}")]
    BadFormat(String),
    #[error("hour {0} out of range 0..23")]
    HourOutOfRange(u32),
    #[error("minute {0} out of range 0..59")]
    MinuteOutOfRange(u32),
    #[error("second {0} out of range 0..59")]
    SecondOutOfRange(u32),
    #[error("frame {0} out of range 0..{1}")]
    FrameOutOfRange(u32, u32),
    #[error("frame {frame} at {hour:02}:{minute:02}:00 is a dropped drop-frame value")]
    DroppedFrame { hour: u32, minute: u32, frame: u32 },
}

/// Parse `"HH:MM:SS:FF"` into a frame count under `rate`.
pub fn parse(text: &str, rate: Framerate) -> Result<u32, ParseError> {
    let fields = split_fields(text)?;
    let [h, m, s, f] = fields;

    if h > 23 {
        return Err(ParseError::HourOutOfRange(h));
    }
    if m > 59 {
        return Err(ParseError::MinuteOutOfRange(m));
    }
    if s > 59 {
        return Err(ParseError::SecondOutOfRange(s));
    }
    if f >= rate.timebase {
        return Err(ParseError::FrameOutOfRange(f, rate.timebase - 1));
    }

    if rate.drop_frame {
        let drop_per_min = rate.drop_frames_per_minute();
        let total_minutes = h * 60 + m;
        if s == 0 && total_minutes % 10 != 0 && f < drop_per_min {
            return Err(ParseError::DroppedFrame { hour: h, minute: m, frame: f });
        }
    }

    Ok(from_fields(h, m, s, f, rate))
}

/// Split `"HH:MM:SS:FF"` into four decimal fields without validating ranges.
fn split_fields(text: &str) -> Result<[u32; 4], ParseError> {
    let parts: Vec<&str> = text.split(':').collect();
    if parts.len() != 4 {
        return Err(ParseError::BadFormat(text.to_string()));
    }
    let mut fields = [0u32; 4];
    for (i, part) in parts.iter().enumerate() {
        if part.len() != 2 || !part.bytes().all(|b| b.is_ascii_digit()) {
            return Err(ParseError::BadFormat(text.to_string()));
        }
        fields[i] = part.parse().map_err(|_| ParseError::BadFormat(text.to_string()))?;
    }
    Ok(fields)
}

/// Compute a frame count from already-validated `HH:MM:SS:FF` fields.
pub fn from_fields(h: u32, m: u32, s: u32, f: u32, rate: Framerate) -> u32 {
    let raw = ((h * 60 + m) * 60 + s) * rate.timebase + f;
    if !rate.drop_frame {
        return raw;
    }
    let drop_per_min = rate.drop_frames_per_minute();
    let total_minutes = h * 60 + m;
    raw - drop_per_min * (total_minutes - total_minutes / 10)
}

/// Format a frame count under `rate` as `"HH:MM:SS:FF"`.
pub fn format(frame_number: u32, rate: Framerate) -> String {
    let n = frame_number % rate.total_frames();
    let (h, m, s, f) = if rate.drop_frame {
        to_fields_drop_frame(n, rate)
    } else {
        to_fields_non_drop(n, rate)
    };
    format!("{h:02}:{m:02}:{s:02}:{f:02}")
}

fn to_fields_non_drop(frame_number: u32, rate: Framerate) -> (u32, u32, u32, u32) {
    let f = frame_number % rate.timebase;
    let total_seconds = frame_number / rate.timebase;
    let s = total_seconds % 60;
    let total_minutes = total_seconds / 60;
    let m = total_minutes % 60;
    let h = (total_minutes / 60) % 24;
    (h, m, s, f)
}

fn to_fields_drop_frame(frame_number: u32, rate: Framerate) -> (u32, u32, u32, u32) {
    let drop_per_min = rate.drop_frames_per_minute();
    let frames_per_min_nondrop = rate.timebase * 60;
    let frames_per_10min = frames_per_min_nondrop * 10 - drop_per_min * 9;

    let d = frame_number / frames_per_10min;
    let mut m_rem = frame_number % frames_per_10min;
    if m_rem < drop_per_min {
        m_rem += drop_per_min;
    }
    let adjusted = frame_number
        + drop_per_min * 9 * d
        + drop_per_min * ((m_rem - drop_per_min) / (frames_per_min_nondrop - drop_per_min));

    to_fields_non_drop(adjusted, rate)
}

/// Advance `frame_number` by `delta` ticks, wrapping at the 24-hour total.
pub fn advance(frame_number: u32, rate: Framerate, delta: u32) -> u32 {
    let total = rate.total_frames();
    (frame_number + delta) % total
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timecode::framerate::lookup;

    fn rate(key: &str) -> Framerate {
        lookup(key).unwrap()
    }

    #[test]
    fn roundtrip_non_drop() {
        let r = rate("24");
        for text in ["00:00:00:00", "01:02:03:04", "23:59:59:23"] {
            let n = parse(text, r).unwrap();
            assert_eq!(format(n, r), text);
        }
    }

    #[test]
    fn roundtrip_drop_frame_2997() {
        let r = rate("29.97");
        for text in ["00:00:00:02", "00:01:00:00", "00:10:00:00", "10:00:00:00", "23:59:59:29"] {
            let n = parse(text, r).unwrap();
            assert_eq!(format(n, r), text, "roundtrip failed for {text}");
        }
    }

    #[test]
    fn roundtrip_drop_frame_5994() {
        let r = rate("59.94");
        for text in ["00:00:00:04", "00:01:00:00", "00:10:00:00", "12:34:56:10"] {
            let n = parse(text, r).unwrap();
            assert_eq!(format(n, r), text, "roundtrip failed for {text}");
        }
    }

    #[test]
    fn every_frame_number_roundtrips_24fps() {
        let r = rate("24");
        for n in (0..r.total_frames()).step_by(977) {
            assert_eq!(parse(&format(n, r), r).unwrap(), n);
        }
    }

    #[test]
    fn every_frame_number_roundtrips_2997() {
        let r = rate("29.97");
        for n in (0..r.total_frames()).step_by(977) {
            assert_eq!(parse(&format(n, r), r).unwrap(), n);
        }
    }

    #[test]
    fn rejects_dropped_values_2997() {
        let r = rate("29.97");
        assert_eq!(
            parse("00:01:00:00", r),
            Err(ParseError::DroppedFrame { hour: 0, minute: 1, frame: 0 })
        );
        assert_eq!(
            parse("00:01:00:01", r),
            Err(ParseError::DroppedFrame { hour: 0, minute: 1, frame: 1 })
        );
        // Every tenth minute keeps :00 and :01 — not dropped.
        assert!(parse("00:10:00:00", r).is_ok());
        assert!(parse("00:10:00:01", r).is_ok());
    }

    #[test]
    fn rejects_dropped_values_5994() {
        let r = rate("59.94");
        for f in 0..4 {
            let text = format!("00:01:00:{f:02}");
            assert!(matches!(parse(&text, r), Err(ParseError::DroppedFrame { .. })));
        }
        assert!(parse("00:10:00:00", r).is_ok());
    }

    #[test]
    fn rejects_out_of_range_fields() {
        let r = rate("24");
        assert!(matches!(parse("24:00:00:00", r), Err(ParseError::HourOutOfRange(24))));
        assert!(matches!(parse("00:60:00:00", r), Err(ParseError::MinuteOutOfRange(60))));
        assert!(matches!(parse("00:00:60:00", r), Err(ParseError::SecondOutOfRange(60))));
        assert!(matches!(parse("00:00:00:24", r), Err(ParseError::FrameOutOfRange(24, 23))));
    }

    #[test]
    fn rejects_malformed_text() {
        let r = rate("24");
        assert!(matches!(parse("00:00:00", r), Err(ParseError::BadFormat(_))));
        assert!(matches!(parse("00:00:00:0", r), Err(ParseError::BadFormat(_))));
        assert!(matches!(parse("aa:00:00:00", r), Err(ParseError::BadFormat(_))));
    }

    #[test]
    fn advance_wraps_at_24_hours() {
        let r = rate("24");
        let last = parse("23:59:59:23", r).unwrap();
        assert_eq!(advance(last, r, 1), 0);
        assert_eq!(format(advance(last, r, 1), r), "00:00:00:00");
    }

    #[test]
    fn advance_wraps_at_24_hours_drop_frame() {
        let r = rate("29.97");
        let last = parse("23:59:59:29", r).unwrap();
        assert_eq!(advance(last, r, 1), 0);
        assert_eq!(format(advance(last, r, 1), r), "00:00:00:00");
    }
}
