//! Error taxonomy for the transmitter driver.
//!
//! Soft conditions (no bus, no EDID, unknown connection status) are not represented here;
//! they surface as empty mode lists or `ConnectorStatus::Unknown`.

use std::fmt;

use super::connector::Rejection;
use super::encoder::LifecycleState;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A mandatory resource is missing. Construction cannot continue.
    #[error("missing mandatory resource {resource:?}")]
    Configuration {
        resource: String,
        #[source]
        source: anyhow::Error,
    },
    /// A collaborator exists in the configuration but is not available yet.
    #[error("dependency {resource:?} not available yet, retry later")]
    DeferredDependency { resource: String },
    #[error("failed to bind at step {step}")]
    Bind {
        step: BindStep,
        #[source]
        source: anyhow::Error,
    },
    #[error("clock {op} failed")]
    ClockProgramming {
        op: ClockOp,
        #[source]
        source: anyhow::Error,
    },
    #[error("mode rejected: {0}")]
    ModeRejected(Rejection),
    #[error("cannot {op} while {state:?}")]
    InvalidState {
        op: &'static str,
        state: LifecycleState,
    },
}

impl Error {
    /// Whether the caller should retry later instead of giving up.
    pub fn is_deferred(&self) -> bool {
        matches!(self, Self::DeferredDependency { .. })
    }
}

/// The step of `bind()` that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindStep {
    EncoderInit,
    BridgeAttach,
    ConnectorInit,
    ConnectorRegister,
    ConnectorAttach,
}

impl fmt::Display for BindStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::EncoderInit => "encoder init",
            Self::BridgeAttach => "bridge attach",
            Self::ConnectorInit => "connector init",
            Self::ConnectorRegister => "connector register",
            Self::ConnectorAttach => "connector attach",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockOp {
    SetRate(u64),
    Enable,
}

impl fmt::Display for ClockOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SetRate(hz) => write!(f, "set rate to {hz} Hz"),
            Self::Enable => f.write_str("enable"),
        }
    }
}
