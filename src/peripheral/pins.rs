/// GPIO function select values, as written to the `GPFSELn` registers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum PinFunction {
    /// GPIO input
    Input = 0b000,
    /// GPIO output
    Output = 0b001,
    /// Alternate function 0
    Alt0 = 0b100,
    /// Alternate function 1
    Alt1 = 0b101,
    /// Alternate function 5
    Alt5 = 0b010,
}

/// A GPIO that can be driven by one of the PWM channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PwmPin {
    /// The GPIO number.
    pub gpio: u8,
    /// The PWM channel wired to it.
    pub channel: u8,
    /// The alternate function that connects it.
    pub function: PinFunction,
}

macro_rules! pwm_pins {
    ($( $gpio:literal => $channel:literal $function:ident ),+ $(,)?) => {
        /// All GPIOs with a PWM function.
        pub const PWM_PINS: &[PwmPin] = &[$(
            PwmPin {
                gpio: $gpio,
                channel: $channel,
                function: PinFunction::$function,
            }
        ),+];
    };
}

pwm_pins! {
    12 => 0 Alt0,
    18 => 0 Alt5,
    40 => 0 Alt0,
    52 => 0 Alt1,
    13 => 1 Alt0,
    19 => 1 Alt5,
    41 => 1 Alt0,
    45 => 1 Alt0,
    53 => 1 Alt1,
}

/// The PWM function of a GPIO, if it has one.
pub fn pwm_pin(gpio: u8) -> Option<&'static PwmPin> {
    PWM_PINS.iter().find(|pin| pin.gpio == gpio)
}

/// The PWM channel wired to a GPIO, if any.
pub fn pwm_channel_for_pin(gpio: u8) -> Option<u8> {
    pwm_pin(gpio).map(|pin| pin.channel)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_pins() {
        assert_eq!(pwm_channel_for_pin(18), Some(0));
        assert_eq!(pwm_channel_for_pin(12), Some(0));
        assert_eq!(pwm_channel_for_pin(13), Some(1));
        assert_eq!(pwm_channel_for_pin(19), Some(1));
        assert_eq!(pwm_pin(18).map(|p| p.function), Some(PinFunction::Alt5));
        assert_eq!(pwm_channel_for_pin(4), None);
    }
}
