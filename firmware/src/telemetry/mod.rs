//! Forwards cycle events to defmt over RTT.

use defmt::{error, info, warn};
use programmer_core::telemetry::{CycleEvent, CycleObserver};

/// Logs every event; failures at `warn`/`error` so they stand out in RTT.
pub struct DefmtObserver;

impl CycleObserver for DefmtObserver {
    fn record(&mut self, event: CycleEvent) {
        match event {
            CycleEvent::BringUpFailed(_)
            | CycleEvent::VerificationFailed { .. }
            | CycleEvent::ReadbackUnavailable => error!("{}", event),
            CycleEvent::BusFault { .. } => warn!("{}", event),
            CycleEvent::FieldChecked(check) if !check.matched => warn!("{}", event),
            _ => info!("{}", event),
        }
    }
}
