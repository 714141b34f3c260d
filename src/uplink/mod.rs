use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, info, warn};
use thiserror::Error;
use tokio::time::{sleep, Instant};

use crate::config::LorawanConfig;
use crate::payload::{TruncationError, UplinkPayload};
use crate::radio::{EventReceiver, LorawanStack, RadioError, RadioEvent};
use crate::reading::{self, MeterReading, ReadingError};

/// Seconds between transmissions in periodic mode. The actual spacing may
/// become longer under the duty-cycle limitations enforced by the stack.
pub const TX_INTERVAL: Duration = Duration::from_secs(120);

/// FPort carrying the meter payload.
pub const UPLINK_PORT: u8 = 1;

// Pause per protocol-loop iteration so one loop does not saturate a core.
const POLL_INTERVAL: Duration = Duration::from_millis(1);

#[derive(Error, Debug)]
pub enum CycleError {
    #[error(transparent)]
    Reading(#[from] ReadingError),
    #[error(transparent)]
    Truncation(#[from] TruncationError),
    #[error(transparent)]
    Radio(#[from] RadioError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxState {
    Idle,
    Sending,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// One read-and-send cycle, return after the completion event.
    Once,
    /// Read and send forever, rescheduling after each completion.
    Periodic(Duration),
}

/// Single-threaded dispatch loop around a [`LorawanStack`].
///
/// Drives the stack's protocol loop, consumes its event channel and runs
/// the read-resolve-format-queue cycle on schedule. Exactly one
/// transmission is in flight at any time.
pub struct UplinkDriver<S: LorawanStack> {
    stack: S,
    events: EventReceiver,
    config: LorawanConfig,
    path_file: PathBuf,
    state: TxState,
    shutdown: Arc<AtomicBool>,
}

impl<S: LorawanStack> UplinkDriver<S> {
    pub fn new(
        stack: S,
        events: EventReceiver,
        config: LorawanConfig,
        path_file: PathBuf,
    ) -> Self {
        UplinkDriver {
            stack,
            events,
            config,
            path_file,
            state: TxState::Idle,
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Flag checked once per loop iteration; setting it makes the loop
    /// exit cleanly.
    pub fn shutdown_handle(&self) -> Arc<AtomicBool> {
        self.shutdown.clone()
    }

    pub fn state(&self) -> TxState {
        self.state
    }

    /// One read-and-send cycle: load the latest reading, resolve the
    /// configured selector, format the payload and queue it. Skipped when
    /// a transmission is still pending.
    pub fn send_cycle(&mut self) -> Result<(), CycleError> {
        if self.stack.tx_pending() {
            warn!("transmission pending, not sending");
            return Ok(());
        }

        let reading_path = reading::last_reading_path(&self.path_file)?;
        debug!("reading {}", reading_path.display());
        let meter_reading = MeterReading::load(&reading_path)?;
        info!(
            "meter {}: {} data block entries",
            meter_reading.meter_id,
            meter_reading.entries.len()
        );

        let resolved = meter_reading.resolve(&self.config.obis_selection)?;
        let payload = UplinkPayload::from_reading(&resolved)?;
        info!("uplink payload: {}", payload);

        self.stack.queue_uplink(UPLINK_PORT, payload.as_bytes(), false)?;
        self.state = TxState::Sending;
        Ok(())
    }

    // Returns true when a transmission completed.
    fn handle_event(&mut self, event: RadioEvent) -> bool {
        match event {
            RadioEvent::TxComplete { ack, downlink } => {
                info!("transmission complete");
                if ack {
                    info!("received ack");
                }
                if let Some(data) = downlink {
                    info!("received {} bytes of downlink: {}", data.len(), hex::encode(&data));
                }
                self.state = TxState::Idle;
                true
            }
            RadioEvent::Joining => {
                info!("joining");
                false
            }
            RadioEvent::Joined => {
                info!("joined");
                false
            }
            RadioEvent::JoinFailed => {
                warn!("join failed");
                false
            }
            RadioEvent::LinkDead => {
                warn!("link dead");
                false
            }
        }
    }

    /// Cooperative run loop: one stack iteration, drain the event channel,
    /// start a cycle when one is due, then yield.
    ///
    /// In [`RunMode::Once`] the loop returns after the first completion;
    /// cycle errors are returned to the caller. In [`RunMode::Periodic`]
    /// cycle errors are logged and the cycle is retried on the next
    /// interval.
    pub async fn run(&mut self, mode: RunMode) -> Result<(), CycleError> {
        let mut next_tx = Some(Instant::now());

        loop {
            if self.shutdown.load(Ordering::Relaxed) {
                info!("shutdown requested, exiting run loop");
                return Ok(());
            }

            self.stack.run_once();

            let mut completed = false;
            while let Ok(event) = self.events.try_recv() {
                completed |= self.handle_event(event);
            }

            if completed {
                match mode {
                    RunMode::Once => return Ok(()),
                    RunMode::Periodic(interval) => {
                        debug!("next transmission in {}s", interval.as_secs());
                        next_tx = Some(Instant::now() + interval);
                    }
                }
            }

            if self.state == TxState::Idle {
                if let Some(due) = next_tx {
                    if Instant::now() >= due {
                        next_tx = None;
                        if let Err(err) = self.send_cycle() {
                            match mode {
                                RunMode::Once => return Err(err),
                                RunMode::Periodic(interval) => {
                                    error!("send cycle failed: {}", err);
                                    next_tx = Some(Instant::now() + interval);
                                }
                            }
                        }
                    }
                }
            }

            sleep(POLL_INTERVAL).await;
        }
    }
}

/// Installs the Ctrl-C handler that flips the driver's shutdown flag.
pub fn spawn_ctrl_c_handler(flag: Arc<AtomicBool>) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("break received, exiting");
            flag.store(true, Ordering::Relaxed);
        }
    });
}
