//! Attachment fan-out
//!
//! Forwards an attachment to every other member of the sender's room.
//! Delivery is best-effort: a failure for one recipient is logged and
//! never affects the sender or the remaining recipients.

use std::time::Duration;

use tracing::{debug, warn};

use crate::error::AppError;
use crate::message::Envelope;
use crate::room::Membership;

/// Default time a broadcast waits on one recipient's full queue
pub const DEFAULT_BROADCAST_TIMEOUT: Duration = Duration::from_secs(5);

/// Result of one fan-out
#[derive(Debug, Default)]
pub struct DeliveryReport {
    /// Recipients whose queue accepted the frame
    pub delivered: usize,
    /// Per-recipient failures
    pub failed: Vec<AppError>,
}

/// Broadcast dispatcher
#[derive(Debug, Clone, Copy)]
pub struct Dispatcher {
    deadline: Duration,
}

impl Dispatcher {
    pub fn new(deadline: Duration) -> Self {
        Self { deadline }
    }

    /// Forward an attachment from `sender` to everyone else in its room
    ///
    /// Recipients are taken from a snapshot of the room; members joining or
    /// leaving mid-fan-out may or may not be reached. Recipients are served
    /// one after another, which keeps per-sender ordering intact.
    pub async fn broadcast_voice(
        &self,
        sender: &Membership,
        payload: String,
        meta: &str,
    ) -> DeliveryReport {
        let msg = Envelope::voice_from(sender.name(), payload, meta);
        let mut report = DeliveryReport::default();

        for (recipient, sink) in sender.room().snapshot() {
            if &recipient == sender.name() {
                continue;
            }

            match sink.send_within(msg.clone(), self.deadline).await {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    let err = AppError::RecipientDelivery {
                        recipient,
                        reason: e.to_string(),
                    };
                    warn!(room = %sender.room().id, from = %sender.name(), "{}", err);
                    report.failed.push(err);
                }
            }
        }

        debug!(
            room = %sender.room().id,
            from = %sender.name(),
            delivered = report.delivered,
            failed = report.failed.len(),
            "Voice broadcast"
        );
        report
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new(DEFAULT_BROADCAST_TIMEOUT)
    }
}
