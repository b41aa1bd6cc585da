//! Pixel clock adapter.

use anyhow::anyhow;
use tracing::debug;

use super::error::{ClockOp, Error, Result};

/// A programmable clock from the platform clock tree.
pub trait Clock: Send {
    fn set_rate(&mut self, hz: u64) -> anyhow::Result<()>;

    /// Prepares and ungates the clock.
    fn prepare_enable(&mut self) -> anyhow::Result<()>;

    /// Gates and unprepares the clock.
    fn disable_unprepare(&mut self);

    /// Current rate, if the provider can report it.
    fn rate(&self) -> Option<u64> {
        None
    }
}

/// Wraps the transmitter clock and makes enable/disable idempotent.
///
/// Calls are passed through in the order they arrive; ordering `set_rate` before `enable`
/// is up to the caller.
pub struct ClockController {
    clock: Box<dyn Clock>,
    running: bool,
}

impl ClockController {
    pub fn new(clock: Box<dyn Clock>) -> Self {
        Self {
            clock,
            running: false,
        }
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn rate(&self) -> Option<u64> {
        self.clock.rate()
    }

    pub fn set_rate(&mut self, hz: u64) -> Result<()> {
        let op = ClockOp::SetRate(hz);
        if hz == 0 {
            return Err(Error::ClockProgramming {
                op,
                source: anyhow!("rate must be positive"),
            });
        }

        debug!("setting clock to {hz} Hz");
        self.clock
            .set_rate(hz)
            .map_err(|source| Error::ClockProgramming { op, source })
    }

    pub fn enable(&mut self) -> Result<()> {
        if self.running {
            debug!("clock already enabled");
            return Ok(());
        }

        debug!("enabling clock");
        self.clock
            .prepare_enable()
            .map_err(|source| Error::ClockProgramming {
                op: ClockOp::Enable,
                source,
            })?;
        self.running = true;
        Ok(())
    }

    pub fn disable(&mut self) {
        if !self.running {
            debug!("clock already disabled");
            return;
        }

        debug!("disabling clock");
        self.clock.disable_unprepare();
        self.running = false;
    }
}
