use crate::{
    palette::{ColorId, Palette},
    types::{PowerState, StateSnapshot},
};

/// Local belief about the light. The IR link is one-way, so this is only what
/// was last sent; the physical device may have drifted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceState {
    pub powered: bool,
    pub color: ColorId,
    /// Only meaningful while powered. Left stale on power-off.
    pub brightness: u8,
}

impl DeviceState {
    pub fn initial(palette: &Palette, max_level: u8) -> Self {
        Self {
            powered: false,
            color: palette.first(),
            brightness: max_level,
        }
    }

    pub fn snapshot(&self, palette: &Palette) -> StateSnapshot {
        StateSnapshot {
            state: if self.powered {
                PowerState::On
            } else {
                PowerState::Off
            },
            brightness: self.brightness,
            color: palette.get(self.color).rgb.to_array(),
        }
    }
}
