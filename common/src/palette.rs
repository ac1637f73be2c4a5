use serde::{Deserialize, Serialize};

use crate::error::CommandError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    pub fn to_array(self) -> [u8; 3] {
        [self.r, self.g, self.b]
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaletteEntry {
    pub name: String,
    pub code: u32,
    pub rgb: Rgb,
}

impl PaletteEntry {
    pub fn new(name: &str, code: u32, rgb: Rgb) -> Self {
        Self {
            name: name.to_string(),
            code,
            rgb,
        }
    }
}

/// Stable handle to a palette entry. Only a [`Palette`] hands these out, so an
/// id is always in bounds for the palette that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ColorId(usize);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Palette {
    entries: Vec<PaletteEntry>,
}

impl Palette {
    pub fn new(entries: Vec<PaletteEntry>) -> Result<Self, CommandError> {
        if entries.is_empty() {
            return Err(CommandError::EmptyPalette);
        }
        Ok(Self { entries })
    }

    pub fn first(&self) -> ColorId {
        ColorId(0)
    }

    pub fn get(&self, id: ColorId) -> &PaletteEntry {
        &self.entries[id.0]
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ColorId, &PaletteEntry)> {
        self.entries
            .iter()
            .enumerate()
            .map(|(index, entry)| (ColorId(index), entry))
    }

    pub fn find_code(&self, code: u32) -> Option<ColorId> {
        self.entries
            .iter()
            .position(|entry| entry.code == code)
            .map(ColorId)
    }
}

impl Default for Palette {
    fn default() -> Self {
        Self {
            entries: default_entries(),
        }
    }
}

pub fn default_entries() -> Vec<PaletteEntry> {
    vec![
        PaletteEntry::new("red", 0x01FE_50AF, Rgb::new(139, 0, 0)),
        PaletteEntry::new("yellow", 0x01FE_30CF, Rgb::new(255, 255, 0)),
        PaletteEntry::new("white", 0x01FE_906F, Rgb::new(255, 255, 255)),
        PaletteEntry::new("blue", 0x01FE_F807, Rgb::new(0, 0, 255)),
        PaletteEntry::new("lightblue", 0x01FE_708F, Rgb::new(173, 216, 230)),
        PaletteEntry::new("green", 0x01FE_D827, Rgb::new(0, 128, 0)),
        PaletteEntry::new("purple", 0x01FE_B04F, Rgb::new(128, 0, 128)),
        // Animated mode on the light; black keeps it out of normal matches.
        PaletteEntry::new("cycle", 0x01FE_807F, Rgb::new(0, 0, 0)),
    ]
}
