use std::{
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use tokio::{
    sync::mpsc,
    task::JoinHandle,
    time::{self, Instant},
};
use tracing::debug;

use mines_common::{models::Digits, protocol::ServerMessage};

const TICK: Duration = Duration::from_secs(1);

/// Per-game clock counting whole seconds on its own task.
///
/// The task is aborted by [`GameTimer::stop`] and when the timer is dropped,
/// so a finished or torn down game never sees another tick.
#[derive(Debug, Default)]
pub struct GameTimer {
    elapsed: Arc<AtomicU64>,
    task: Option<JoinHandle<()>>,
}

impl GameTimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts counting. Each tick is also pushed to `ticks` when given.
    /// Calling this on a running timer does nothing.
    pub fn start(&mut self, ticks: Option<mpsc::UnboundedSender<ServerMessage>>) {
        if self.task.is_some() {
            return;
        }

        let elapsed = self.elapsed.clone();
        self.task = Some(tokio::spawn(async move {
            let mut interval = time::interval_at(Instant::now() + TICK, TICK);
            loop {
                interval.tick().await;
                let seconds = elapsed.fetch_add(1, Ordering::Relaxed) + 1;
                if let Some(ticks) = &ticks
                    && ticks
                        .send(ServerMessage::Tick {
                            time: Digits::time(seconds),
                        })
                        .is_err()
                {
                    debug!("Tick receiver closed, stopping clock");
                    break;
                }
            }
        }));
        debug!("Game clock started");
    }

    pub fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            debug!("Game clock stopped at {}s", self.elapsed());
        }
    }

    pub fn is_running(&self) -> bool {
        self.task.is_some()
    }

    pub fn elapsed(&self) -> u64 {
        self.elapsed.load(Ordering::Relaxed)
    }

    /// Elapsed seconds as shown to the player, capped at 999.
    pub fn display(&self) -> Digits {
        Digits::time(self.elapsed())
    }
}

impl Drop for GameTimer {
    fn drop(&mut self) {
        self.stop();
    }
}
