//! Source arbitration.
//!
//! Every source may send any [`Command`]; whether it lands depends on the
//! permissions derived from the interface modes at start-up. Enable and
//! reset need control permission, set-points need reference permission.

use gun_common::gun::interface::ControlSource;
use tracing::{debug, info};

use super::{Command, CommandError, Reference};
use crate::state::GlobalControlState;

/// Writer view for the command role.
pub struct CommandPath<'a> {
    pub(super) state: &'a mut GlobalControlState,
}

impl<'a> CommandPath<'a> {
    pub(crate) fn new(state: &'a mut GlobalControlState) -> Self {
        Self { state }
    }

    /// Check permission for `command` from `source` without applying it.
    pub fn authorize(&self, source: ControlSource, command: &Command) -> Result<(), CommandError> {
        let permissions = self.state.permissions;
        if command.is_control() {
            if !permissions.allows_control(source) {
                return Err(CommandError::ControlNotPermitted { origin: source });
            }
        } else if !permissions.allows_reference(source) {
            return Err(CommandError::ReferenceNotPermitted { origin: source });
        }
        Ok(())
    }

    /// Apply one command from `source`.
    pub fn apply(&mut self, source: ControlSource, command: Command) -> Result<(), CommandError> {
        if let Err(e) = self.authorize(source, &command) {
            debug!(%source, ?command, error = %e, "command rejected");
            return Err(e);
        }
        let s = &mut *self.state;
        match command {
            Command::HeaterEnable(on) => s.requests.heater = on,
            Command::HvEnable(on) => s.requests.hv = on,
            Command::BeamEnable(on) => s.requests.beam = on,
            Command::Reset => {
                info!(%source, "reset requested");
                s.reset_active = true;
                if source == ControlSource::Ethernet {
                    s.ethernet_reset_cmd = true;
                }
            }
            Command::SetPoint(reference, value) => self.set_point(source, reference, value)?,
        }
        Ok(())
    }

    fn set_point(
        &mut self,
        source: ControlSource,
        reference: Reference,
        value: u16,
    ) -> Result<(), CommandError> {
        let s = &mut *self.state;
        let out_of_range = |range| CommandError::OutOfRange { reference, range };
        match reference {
            Reference::HighVoltage => s
                .outputs
                .high_voltage
                .set_point(value)
                .map_err(out_of_range)?,
            Reference::PulseTop => s.outputs.top_voltage.set_point(value).map_err(out_of_range)?,
            // The heater regulator walks the output toward its target.
            Reference::Heater => {
                s.outputs.heater_voltage.check(value).map_err(out_of_range)?;
                s.heater.voltage_target = value;
            }
        }

        if let Some(points) = s.references.for_source_mut(source) {
            match reference {
                Reference::HighVoltage => points.high_voltage = value,
                Reference::PulseTop => points.pulse_top = value,
                Reference::Heater => points.heater = value,
            }
        }
        if source == ControlSource::Can {
            s.control_config.mark(reference.received_flag());
        }
        Ok(())
    }
}
