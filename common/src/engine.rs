use crate::{
    color::{closest_entry, parse_rgb},
    config::{BridgeConfig, ButtonAction},
    error::CommandError,
    palette::{ColorId, Palette, Rgb},
    state::DeviceState,
    types::{CommandDescriptor, CommandKind, CommandParams, Dispatch, IrAction, StateSnapshot},
};

/// Transmission gateway: turns a code into a physical IR frame.
///
/// Fire-and-forget. The light never acknowledges, so there is nothing to
/// report back to the engine.
pub trait Transmitter {
    fn transmit(&mut self, code: u32);

    fn pulse_indicator(&mut self) {}
}

/// Owns the believed device state and decides which codes to emit.
///
/// Operations mutate the state synchronously and return the IR work as an
/// ordered action list. Callers must run that list to completion before the
/// next operation so pulse trains never interleave.
#[derive(Debug, Clone)]
pub struct CommandEngine {
    config: BridgeConfig,
    palette: Palette,
    state: DeviceState,
}

impl CommandEngine {
    pub fn new(mut config: BridgeConfig, palette: Palette) -> Self {
        config.sanitize();
        let state = DeviceState::initial(&palette, config.max_level);
        Self {
            config,
            palette,
            state,
        }
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn palette(&self) -> &Palette {
        &self.palette
    }

    pub fn device_state(&self) -> &DeviceState {
        &self.state
    }

    pub fn current_state(&self) -> StateSnapshot {
        self.state.snapshot(&self.palette)
    }

    pub fn dispatch(
        &mut self,
        descriptor: &CommandDescriptor,
        params: &CommandParams,
    ) -> Result<Dispatch, CommandError> {
        let before = self.state;
        let actions = match descriptor.kind {
            CommandKind::PowerOn => self.power_on(),
            CommandKind::PowerOff => self.power_off(),
            CommandKind::ColorSelect => {
                let color = self.entry_for_code(descriptor.code);
                self.set_color(color)
            }
            CommandKind::ColorMatch => {
                let raw = params
                    .value
                    .as_deref()
                    .ok_or(CommandError::MissingParameter("value"))?;
                self.set_color_rgb(parse_rgb(raw)?)
            }
            CommandKind::BrightnessAdjust => {
                let raw = params
                    .value
                    .as_deref()
                    .ok_or(CommandError::MissingParameter("value"))?;
                let level = self.parse_level(raw)?;
                self.set_brightness(level)?
            }
            CommandKind::SimpleToggleLike => self.send_raw(descriptor.code),
        };

        Ok(self.finish(before, actions))
    }

    pub fn button_pressed(&mut self) -> Dispatch {
        let before = self.state;
        let actions = match self.config.button_action {
            ButtonAction::PowerOn => self.power_on(),
            ButtonAction::PowerOff => self.power_off(),
        };
        self.finish(before, actions)
    }

    pub fn power_on(&mut self) -> Vec<IrAction> {
        if self.state.powered {
            return Vec::new();
        }
        self.state.powered = true;
        self.state.brightness = self.config.max_level;
        vec![IrAction::Send(self.config.power_on_code)]
    }

    pub fn power_off(&mut self) -> Vec<IrAction> {
        if !self.state.powered {
            return Vec::new();
        }
        self.state.powered = false;
        vec![IrAction::Send(self.config.power_off_code)]
    }

    // Selecting a color restarts the light at full brightness.
    pub fn set_color(&mut self, color: ColorId) -> Vec<IrAction> {
        if !self.state.powered {
            return Vec::new();
        }
        self.state.color = color;
        self.state.brightness = self.config.max_level;
        vec![IrAction::Send(self.palette.get(color).code)]
    }

    pub fn set_color_rgb(&mut self, target: Rgb) -> Vec<IrAction> {
        let color = closest_entry(&self.palette, target);
        self.set_color(color)
    }

    /// Steps the cyclic brightness counter until it reads `target`.
    pub fn set_brightness(&mut self, target: u8) -> Result<Vec<IrAction>, CommandError> {
        let max = self.config.max_level;
        if !(1..=max).contains(&target) {
            return Err(CommandError::BrightnessOutOfRange {
                level: u32::from(target),
                max,
            });
        }

        let mut actions = Vec::new();
        if !self.state.powered {
            return Ok(actions);
        }

        // Out-of-range stale level counts as max.
        let mut level = self.state.brightness;
        if !(1..=max).contains(&level) {
            level = max;
        }

        while level != target {
            if !actions.is_empty() {
                actions.push(IrAction::Delay(self.config.inter_pulse_delay_ms));
            }
            actions.push(IrAction::Send(self.config.brightness_code));
            level = level % max + 1;
        }

        self.state.brightness = level;
        Ok(actions)
    }

    pub fn send_raw(&mut self, code: u32) -> Vec<IrAction> {
        vec![IrAction::Send(code)]
    }

    pub fn entry_for_code(&self, code: u32) -> ColorId {
        self.palette.find_code(code).unwrap_or(self.state.color)
    }

    fn parse_level(&self, raw: &str) -> Result<u8, CommandError> {
        let level = raw
            .trim()
            .parse::<u32>()
            .map_err(|_| CommandError::InvalidBrightness(raw.to_string()))?;
        let max = self.config.max_level;
        u8::try_from(level)
            .ok()
            .filter(|level| (1..=max).contains(level))
            .ok_or(CommandError::BrightnessOutOfRange { level, max })
    }

    fn finish(&self, before: DeviceState, actions: Vec<IrAction>) -> Dispatch {
        Dispatch {
            snapshot: self.current_state(),
            changed: before != self.state,
            actions,
        }
    }
}

/// Runs an action list against `transmitter`, sleeping through `delay` for
/// every [`IrAction::Delay`].
pub fn run_actions<T, D>(transmitter: &mut T, actions: &[IrAction], mut delay: D)
where
    T: Transmitter + ?Sized,
    D: FnMut(u64),
{
    for action in actions {
        match *action {
            IrAction::Send(code) => {
                transmitter.transmit(code);
                transmitter.pulse_indicator();
            }
            IrAction::Delay(ms) => delay(ms),
        }
    }
}
