use std::fmt;

use serde::{Deserialize, Serialize};

/// Instrument settings that are range-checked before they reach the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BoundedParameter {
    /// STM bias voltage, volts. Sign is the polarity.
    Bias,
    /// Z PI controller setpoint current, amps. Sign follows the bias.
    Setpoint,
}

impl BoundedParameter {
    pub fn name(self) -> &'static str {
        match self {
            BoundedParameter::Bias => "bias",
            BoundedParameter::Setpoint => "setpoint",
        }
    }

    /// Physical unit of the value.
    pub fn unit(self) -> &'static str {
        match self {
            BoundedParameter::Bias => "V",
            BoundedParameter::Setpoint => "A",
        }
    }
}

impl fmt::Display for BoundedParameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The controller's textual reply to a setter, kept opaque.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ack(String);

impl Ack {
    pub fn new(reply: impl Into<String>) -> Self {
        Self(reply.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for Ack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
