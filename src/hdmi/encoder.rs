//! Encoder role: binding to the compositor and the output lifecycle.
//!
//! The lifecycle follows the order the compositor drives commits in:
//!
//! ```text
//! Unbound --bind--> Idle --mode_set--> ModeProgrammed --enable--> Enabled
//!                                            ^                      |
//!                                  mode_set  |        disable       |
//!                                            +----- Disabled <------+
//! ```
//!
//! `unbind` returns to `Unbound` from any state. `enable` from `Disabled` restarts the
//! clock with the mode programmed before.
//!
//! The pixel clock only runs in `Enabled`.

use tracing::{debug, info, warn};

use super::clock::ClockController;
use super::connector::{validate, ModeStatus};
use super::error::{BindStep, Error, Result};
use super::master::{BridgeId, ConnectorId, DrmMaster, EncoderId};
use super::modes::TimingMode;
use super::types::{
    CapabilityLimits, ConnectorDesc, EncoderDesc, PollFlags, CONNECTOR_TYPE_HDMIA,
    ENCODER_TYPE_TMDS,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// Not registered with a compositor.
    Unbound,
    /// Registered, no mode programmed yet.
    Idle,
    /// A mode is programmed, output off.
    ModeProgrammed,
    Enabled,
    /// Output turned off after having been programmed.
    Disabled,
}

#[derive(Debug, Clone, Copy)]
struct BoundObjects {
    encoder: EncoderId,
    bridge: Option<BridgeId>,
    connector: ConnectorId,
}

pub struct EncoderRole {
    name: String,
    limits: CapabilityLimits,
    with_bridge: bool,
    clock: ClockController,
    state: LifecycleState,
    bound: Option<BoundObjects>,
    mode: Option<TimingMode>,
}

impl EncoderRole {
    pub fn new(
        name: String,
        limits: CapabilityLimits,
        with_bridge: bool,
        clock: ClockController,
    ) -> Self {
        Self {
            name,
            limits,
            with_bridge,
            clock,
            state: LifecycleState::Unbound,
            bound: None,
            mode: None,
        }
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn is_bound(&self) -> bool {
        self.bound.is_some()
    }

    pub fn clock_running(&self) -> bool {
        self.clock.is_running()
    }

    pub fn clock_rate(&self) -> Option<u64> {
        self.clock.rate()
    }

    pub fn mode(&self) -> Option<&TimingMode> {
        self.mode.as_ref()
    }

    pub fn encoder_desc(&self) -> EncoderDesc {
        EncoderDesc {
            name: self.name.clone(),
            encoder_type: ENCODER_TYPE_TMDS,
            possible_crtcs: 1,
        }
    }

    pub fn connector_desc(&self) -> ConnectorDesc {
        ConnectorDesc {
            name: format!("{}-HDMI-A", self.name),
            connector_type: CONNECTOR_TYPE_HDMIA,
            polled: PollFlags::CONNECT | PollFlags::DISCONNECT,
        }
    }

    /// Registers the encoder, the optional bridge and the connector with the compositor.
    ///
    /// On failure everything created so far is released again and the role stays unbound.
    pub fn bind(&mut self, master: &mut dyn DrmMaster) -> Result<()> {
        let _span = tracy_client::span!("EncoderRole::bind");

        if self.bound.is_some() {
            return Err(Error::InvalidState {
                op: "bind",
                state: self.state,
            });
        }

        let encoder = master
            .encoder_init(&self.encoder_desc())
            .map_err(|source| Error::Bind {
                step: BindStep::EncoderInit,
                source,
            })?;

        let bridge = if self.with_bridge {
            match master.bridge_attach(encoder) {
                Ok(bridge) => Some(bridge),
                Err(source) => {
                    master.encoder_cleanup(encoder);
                    return Err(Error::Bind {
                        step: BindStep::BridgeAttach,
                        source,
                    });
                }
            }
        } else {
            None
        };

        let connector = match master.connector_init(&self.connector_desc()) {
            Ok(connector) => connector,
            Err(source) => {
                release_encoder(master, encoder, bridge);
                return Err(Error::Bind {
                    step: BindStep::ConnectorInit,
                    source,
                });
            }
        };

        if let Err(source) = master.connector_register(connector) {
            master.connector_cleanup(connector);
            release_encoder(master, encoder, bridge);
            return Err(Error::Bind {
                step: BindStep::ConnectorRegister,
                source,
            });
        }

        if let Err(source) = master.connector_attach_encoder(connector, encoder) {
            master.connector_unregister(connector);
            master.connector_cleanup(connector);
            release_encoder(master, encoder, bridge);
            return Err(Error::Bind {
                step: BindStep::ConnectorAttach,
                source,
            });
        }

        self.bound = Some(BoundObjects {
            encoder,
            bridge,
            connector,
        });
        self.state = LifecycleState::Idle;
        info!("{} bound to compositor", self.name);
        Ok(())
    }

    /// Programs the pixel clock for `mode`.
    ///
    /// Reprogramming a live output keeps it enabled.
    pub fn mode_set(&mut self, mode: &TimingMode) -> Result<()> {
        let _span = tracy_client::span!("EncoderRole::mode_set");

        if self.bound.is_none() {
            return Err(Error::InvalidState {
                op: "mode_set",
                state: self.state,
            });
        }

        if let ModeStatus::Rejected(reason) = validate(&self.limits, Some(mode)) {
            warn!("refusing to program {mode}: {reason}");
            return Err(Error::ModeRejected(reason));
        }

        self.clock.set_rate(mode.pixel_clock_hz())?;

        debug!("{} programmed {mode}", self.name);
        self.mode = Some(mode.clone());
        if self.state != LifecycleState::Enabled {
            self.state = LifecycleState::ModeProgrammed;
        }
        Ok(())
    }

    pub fn enable(&mut self) -> Result<()> {
        let _span = tracy_client::span!("EncoderRole::enable");

        match self.state {
            LifecycleState::Enabled => {
                debug!("{} already enabled", self.name);
                return Ok(());
            }
            LifecycleState::ModeProgrammed | LifecycleState::Disabled => (),
            state @ (LifecycleState::Unbound | LifecycleState::Idle) => {
                return Err(Error::InvalidState {
                    op: "enable",
                    state,
                });
            }
        }

        self.clock.enable()?;
        self.state = LifecycleState::Enabled;
        debug!("{} enabled", self.name);
        Ok(())
    }

    /// Stops the clock. Safe to call in any state.
    pub fn disable(&mut self) {
        let _span = tracy_client::span!("EncoderRole::disable");

        self.clock.disable();
        if matches!(
            self.state,
            LifecycleState::Enabled | LifecycleState::ModeProgrammed
        ) {
            self.state = LifecycleState::Disabled;
            debug!("{} disabled", self.name);
        }
    }

    /// Disables the output and releases every compositor object.
    pub fn unbind(&mut self, master: &mut dyn DrmMaster) {
        let _span = tracy_client::span!("EncoderRole::unbind");

        self.disable();

        let Some(bound) = self.bound.take() else {
            debug!("{} not bound, nothing to release", self.name);
            return;
        };

        master.connector_unregister(bound.connector);
        master.connector_cleanup(bound.connector);
        release_encoder(master, bound.encoder, bound.bridge);

        self.mode = None;
        self.state = LifecycleState::Unbound;
        info!("{} unbound from compositor", self.name);
    }
}

fn release_encoder(master: &mut dyn DrmMaster, encoder: EncoderId, bridge: Option<BridgeId>) {
    if let Some(bridge) = bridge {
        master.bridge_detach(bridge);
    }
    master.encoder_cleanup(encoder);
}
