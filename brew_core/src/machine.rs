//! Relay and front-panel buttons of the espresso machine.
//!
//! Everything advances from [`MachineController::update`] against recorded
//! deadlines; nothing here sleeps.

use brew_traits::{ButtonLevels, ButtonPanel, RelayPin};

use crate::config::MachineCfg;
use crate::hw_error::map_hw_error;

/// Edge-detecting debouncer for one active-low input.
///
/// A raw level must hold for `debounce_ms` before the stable level follows it.
#[derive(Debug, Clone, Copy)]
pub struct DebouncedButton {
    stable: bool,
    raw: bool,
    raw_since_ms: u64,
}

impl Default for DebouncedButton {
    fn default() -> Self {
        Self {
            stable: true,
            raw: true,
            raw_since_ms: 0,
        }
    }
}

impl DebouncedButton {
    /// Feed the current raw level; returns true exactly once per press.
    pub fn update(&mut self, raw: bool, now_ms: u64, debounce_ms: u64) -> bool {
        if raw != self.raw {
            self.raw = raw;
            self.raw_since_ms = now_ms;
            return false;
        }
        if raw != self.stable && now_ms.saturating_sub(self.raw_since_ms) >= debounce_ms {
            self.stable = raw;
            return !raw;
        }
        false
    }

    #[inline]
    pub fn is_pressed(&self) -> bool {
        !self.stable
    }
}

/// Debounced press edges seen in one update.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ButtonEdges {
    pub manual: bool,
    pub one_cup: bool,
    pub two_cup: bool,
}

impl ButtonEdges {
    #[inline]
    pub fn any(&self) -> bool {
        self.manual || self.one_cup || self.two_cup
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Macro {
    Idle,
    ClickAt(u64),
    HoldAt(u64),
}

pub struct MachineController {
    relay: Box<dyn RelayPin>,
    buttons: Option<Box<dyn ButtonPanel>>,
    cfg: MachineCfg,
    manual: DebouncedButton,
    one_cup: DebouncedButton,
    two_cup: DebouncedButton,
    relay_high: bool,
    latched: bool,
    release_at_ms: Option<u64>,
    macro_step: Macro,
    macro_done: bool,
    stop_click_at_ms: Option<u64>,
}

impl core::fmt::Debug for MachineController {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("MachineController")
            .field("relay_high", &self.relay_high)
            .field("latched", &self.latched)
            .field("macro", &self.macro_step)
            .field("stop_click_at_ms", &self.stop_click_at_ms)
            .finish()
    }
}

impl MachineController {
    pub fn new(relay: Box<dyn RelayPin>, buttons: Option<Box<dyn ButtonPanel>>, cfg: MachineCfg) -> Self {
        Self {
            relay,
            buttons,
            cfg,
            manual: DebouncedButton::default(),
            one_cup: DebouncedButton::default(),
            two_cup: DebouncedButton::default(),
            relay_high: false,
            latched: false,
            release_at_ms: None,
            macro_step: Macro::Idle,
            macro_done: false,
            stop_click_at_ms: None,
        }
    }

    fn drive(&mut self, high: bool) {
        let res = if high {
            self.relay.set_high()
        } else {
            self.relay.set_low()
        };
        if let Err(e) = res {
            tracing::warn!(high, error = %map_hw_error(&*e), "relay write failed");
        }
        self.relay_high = high;
    }

    /// Pulse the relay for the configured duration.
    pub fn click_relay(&mut self, now_ms: u64) {
        self.drive(true);
        self.latched = false;
        self.release_at_ms = Some(now_ms + self.cfg.pulse_ms);
    }

    /// Latch the relay on until [`release_relay`](Self::release_relay).
    pub fn hold_relay(&mut self) {
        self.drive(true);
        self.latched = true;
        self.release_at_ms = None;
    }

    pub fn release_relay(&mut self) {
        self.latched = false;
        self.release_at_ms = None;
        if self.relay_high {
            self.drive(false);
        }
    }

    /// Click, wait, then latch: lets a one-cup press become an open-ended
    /// preinfusion the physical button cannot hold by itself.
    pub fn start_preinfusion_macro(&mut self, now_ms: u64) {
        self.macro_step = Macro::ClickAt(now_ms + self.cfg.macro_click_delay_ms);
        self.macro_done = false;
    }

    /// True once after the macro has latched the relay.
    pub fn take_macro_complete(&mut self) -> bool {
        std::mem::take(&mut self.macro_done)
    }

    pub fn cancel_macro(&mut self) {
        self.macro_step = Macro::Idle;
        self.macro_done = false;
    }

    /// Abandon the preinfusion macro. Before its click the machine is still
    /// running from the button press, so `stop_pump` clicks once to stop it;
    /// after the click only the relay has to come down.
    pub fn abort_macro(&mut self, now_ms: u64, stop_pump: bool) {
        let step = self.macro_step;
        self.cancel_macro();
        match step {
            Macro::ClickAt(_) if stop_pump => self.click_relay(now_ms),
            Macro::ClickAt(_) => {}
            Macro::HoldAt(_) => self.release_relay(),
            Macro::Idle if self.latched => self.stop_from_preinfusion(now_ms),
            Macro::Idle => {}
        }
    }

    /// Release the latch, then click to stop the machine.
    pub fn stop_from_preinfusion(&mut self, now_ms: u64) {
        self.release_relay();
        self.stop_click_at_ms = Some(now_ms + self.cfg.stop_click_delay_ms);
    }

    #[inline]
    pub fn is_latched(&self) -> bool {
        self.latched
    }

    #[inline]
    pub fn is_relay_high(&self) -> bool {
        self.relay_high
    }

    /// No pending pulse, macro step or stop sequence, and the relay is low.
    pub fn is_settled(&self) -> bool {
        !self.relay_high
            && self.release_at_ms.is_none()
            && self.macro_step == Macro::Idle
            && self.stop_click_at_ms.is_none()
    }

    /// Drop every pending sequence and force the relay low.
    pub fn force_release(&mut self) {
        self.cancel_macro();
        self.stop_click_at_ms = None;
        self.release_relay();
    }

    /// Advance timed relay sequences and return debounced button presses.
    pub fn update(&mut self, now_ms: u64) -> ButtonEdges {
        if let Some(at) = self.release_at_ms
            && now_ms >= at
        {
            self.release_at_ms = None;
            if !self.latched {
                self.drive(false);
            }
        }

        match self.macro_step {
            Macro::ClickAt(at) if now_ms >= at => {
                self.click_relay(now_ms);
                self.macro_step = Macro::HoldAt(now_ms + self.cfg.macro_hold_delay_ms);
            }
            Macro::HoldAt(at) if now_ms >= at => {
                self.hold_relay();
                self.macro_step = Macro::Idle;
                self.macro_done = true;
            }
            _ => {}
        }

        if let Some(at) = self.stop_click_at_ms
            && now_ms >= at
        {
            self.stop_click_at_ms = None;
            self.click_relay(now_ms);
        }

        self.read_buttons(now_ms)
    }

    fn read_buttons(&mut self, now_ms: u64) -> ButtonEdges {
        let Some(panel) = self.buttons.as_mut() else {
            return ButtonEdges::default();
        };
        let levels = match panel.read() {
            Ok(l) => l,
            Err(e) => {
                tracing::warn!(error = %map_hw_error(&*e), "button read failed");
                ButtonLevels::default()
            }
        };
        let d = self.cfg.debounce_ms;
        ButtonEdges {
            manual: self.manual.update(levels.manual, now_ms, d),
            one_cup: self.one_cup.update(levels.one_cup, now_ms, d),
            two_cup: self.two_cup.update(levels.two_cup, now_ms, d),
        }
    }
}
