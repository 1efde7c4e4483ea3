//! Raspberry Pi GPIO adapters for the relay and the front-panel buttons.

use rppal::gpio::{Gpio, InputPin, OutputPin};
use tracing::debug;

use brew_traits::{BoxError, ButtonLevels, ButtonPanel, RelayPin};

use crate::error::{HwError, Result};

fn gpio() -> Result<Gpio> {
    Gpio::new().map_err(|e| HwError::Gpio(e.to_string()))
}

fn input(gpio: &Gpio, pin: u8) -> Result<InputPin> {
    gpio.get(pin)
        .map(|p| p.into_input_pullup())
        .map_err(|e| HwError::Gpio(format!("pin {pin}: {e}")))
}

/// Brew-switch relay on a single output pin. Starts low.
pub struct GpioRelay {
    pin: OutputPin,
}

impl GpioRelay {
    pub fn new(pin: u8) -> Result<Self> {
        let mut pin = gpio()?
            .get(pin)
            .map_err(|e| HwError::Gpio(format!("pin {pin}: {e}")))?
            .into_output_low();
        // released pins would float the relay driver
        pin.set_reset_on_drop(true);
        debug!(pin = pin.pin(), "relay ready");
        Ok(Self { pin })
    }
}

impl RelayPin for GpioRelay {
    fn set_high(&mut self) -> std::result::Result<(), BoxError> {
        self.pin.set_high();
        Ok(())
    }

    fn set_low(&mut self) -> std::result::Result<(), BoxError> {
        self.pin.set_low();
        Ok(())
    }
}

/// Three pulled-up button inputs. A missing pin reads as released.
pub struct GpioButtons {
    manual: Option<InputPin>,
    one_cup: Option<InputPin>,
    two_cup: Option<InputPin>,
}

impl GpioButtons {
    pub fn new(manual: Option<u8>, one_cup: Option<u8>, two_cup: Option<u8>) -> Result<Self> {
        let gpio = gpio()?;
        let open = |pin: Option<u8>| pin.map(|p| input(&gpio, p)).transpose();
        Ok(Self {
            manual: open(manual)?,
            one_cup: open(one_cup)?,
            two_cup: open(two_cup)?,
        })
    }
}

fn level(pin: &Option<InputPin>) -> bool {
    pin.as_ref().is_none_or(InputPin::is_high)
}

impl ButtonPanel for GpioButtons {
    fn read(&mut self) -> std::result::Result<ButtonLevels, BoxError> {
        Ok(ButtonLevels {
            manual: level(&self.manual),
            one_cup: level(&self.one_cup),
            two_cup: level(&self.two_cup),
        })
    }
}
