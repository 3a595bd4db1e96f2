//! Customer discrete pins as a command source.

use gun_common::gun::interface::ControlSource;
use tracing::info;

use super::arbitration::CommandPath;

impl CommandPath<'_> {
    /// Turn the debounced customer pins into requests.
    ///
    /// Only acts while discrete control is permitted. The heater is requested
    /// whenever discrete control is active, HV and beam follow their pins, and
    /// an on→off edge of the HV-on pin requests a reset. The previous pin
    /// level is tracked either way so enabling discrete control never sees a
    /// stale edge.
    pub fn apply_discrete(&mut self) {
        let s = &mut *self.state;
        let hv_on = s.discrete.customer_hv_on();
        let falling = s.previous_customer_hv_on && !hv_on;
        s.previous_customer_hv_on = hv_on;

        if !s.permissions.allows_control(ControlSource::Discrete) {
            return;
        }
        s.requests.heater = true;
        s.requests.hv = hv_on;
        s.requests.beam = s.discrete.customer_beam_enable();
        if falling {
            info!("customer HV-on released, reset requested");
            s.reset_active = true;
        }
    }
}
