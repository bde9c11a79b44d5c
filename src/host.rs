//! Periodic update driver
//!
//! Wakes at the tick interval and lets the room catch up on whatever
//! wall-clock time has passed. Late wakeups are absorbed by the room's
//! scheduler, so the timer only needs to be roughly on time.

use std::future::Future;
use std::time::Duration;

use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info};

use crate::lobby::room::SharedRoom;

/// Drive `room` until `shutdown` resolves
pub async fn run_driver<F>(room: SharedRoom, tick_interval: Duration, shutdown: F)
where
    F: Future<Output = ()>,
{
    let mut timer = interval(tick_interval);
    timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
    tokio::pin!(shutdown);

    info!("Update driver started ({:?} interval)", tick_interval);

    loop {
        tokio::select! {
            _ = timer.tick() => {
                let ran = room.lock().update();
                if ran > 1 {
                    debug!("Driver caught up {} ticks", ran);
                }
            }
            _ = &mut shutdown => break,
        }
    }

    info!("Update driver stopped");
}
