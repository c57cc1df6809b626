//! Drift-corrected per-session ticker (spec §4.D).
//!
//! Schedules each frame relative to `epoch_wall` rather than sleeping
//! `1/fps` and incrementing — the latter accumulates drift over a long
//! session. The ticker holds no lock and owns no session state; it only
//! computes wall-clock targets and reports how many frame periods have
//! elapsed by sending [`Command::Tick`] back through the session's own
//! mailbox, which re-enters the session's serialization domain to publish
//! the frame (§5: "the ticker holds no lock across its sleep; it
//! reacquires the session's domain to publish each frame").

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::timecode::Framerate;

use super::Command;

fn frame_target(epoch_wall: Instant, rate: Framerate, k: u64) -> Instant {
    epoch_wall + Duration::from_secs_f64(k as f64 / rate.nominal_fps)
}

/// Run until `cancel` fires or the session's mailbox is gone.
///
/// Each iteration sleeps until the *next* unsent frame's target time, then
/// reports the frame count actually elapsed at wakeup (not simply `k+1`).
/// If the task wakes up late — scheduler jitter, a stalled runtime — many
/// targets may already be in the past; rather than looping once per missed
/// target and emitting every intermediate frame (a burst), it jumps `k`
/// straight to the frame the wall clock says we're at now and emits a
/// single tick, matching spec §4.D: "it does NOT burst-emit missed frames
/// ... the displayed timecode jumps forward accurately."
pub(crate) async fn run(
    cmd_tx: mpsc::Sender<Command>,
    epoch_wall: Instant,
    rate: Framerate,
    cancel: CancellationToken,
) {
    let mut k: u64 = 1;
    loop {
        let target = frame_target(epoch_wall, rate, k);

        // Defensive re-sleep loop for the (monotonic-clock-violating, so
        // never expected in practice) case of a spurious early wakeup —
        // spec §4.D: "if it wakes more than one full frame early ... it
        // re-sleeps."
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep_until(target) => {}
            }
            if Instant::now() >= target {
                break;
            }
        }

        let elapsed_frames =
            ((Instant::now() - epoch_wall).as_secs_f64() * rate.nominal_fps).floor() as u64;
        if elapsed_frames > k {
            k = elapsed_frames;
        }

        if cmd_tx.send(Command::Tick { k }).await.is_err() {
            return; // session actor has exited
        }
        k += 1;
    }
}
