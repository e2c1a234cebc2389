//! Repeating background tasks.

use std::{future::Future, time::Duration};

use tokio::{
    task::JoinHandle,
    time::{Instant, MissedTickBehavior, interval_at},
};
use tracing::{Instrument, error, info_span};

use super::types::Void;

/// Spawns a task that runs `pass` forever, once per `period`.
///
/// The first pass happens one full `period` after spawning, and every later pass
/// waits for the next tick, so the loop can never spin.  A pass is always awaited
/// to completion before the next tick is considered; if a pass overruns the
/// period, the following tick is delayed rather than fired in a burst.
///
/// An error from a pass is logged, and the loop carries on.
pub fn spawn_repeating<F, Fut>(name: &'static str, period: Duration, mut pass: F) -> JoinHandle<()>
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = Void> + Send + 'static,
{
    let span = info_span!("repeating", task = name);

    tokio::spawn(
        async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;

                if let Err(err) = pass().await {
                    error!("Error while running `{}` pass: {}", name, err);
                }
            }
        }
        .instrument(span),
    )
}

// Tests.
