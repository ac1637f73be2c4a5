use crate::{
    config::{BridgeConfig, RawCommand},
    palette::Palette,
    types::{CommandDescriptor, CommandKind},
};

pub const CMD_ON: &str = "on";
pub const CMD_OFF: &str = "off";
pub const CMD_BRIGHTNESS: &str = "brightness";
pub const CMD_COLOR: &str = "color";

#[derive(Debug, Clone, Default)]
pub struct CommandRegistry {
    descriptors: Vec<CommandDescriptor>,
}

impl CommandRegistry {
    pub fn build(config: &BridgeConfig, palette: &Palette, raw_commands: &[RawCommand]) -> Self {
        let mut registry = Self::default();

        registry.insert(CMD_ON, config.power_on_code, CommandKind::PowerOn);
        registry.insert(CMD_OFF, config.power_off_code, CommandKind::PowerOff);
        for (_, entry) in palette.iter() {
            registry.insert(&entry.name, entry.code, CommandKind::ColorSelect);
        }
        registry.insert(
            CMD_BRIGHTNESS,
            config.brightness_code,
            CommandKind::BrightnessAdjust,
        );
        registry.insert(CMD_COLOR, 0, CommandKind::ColorMatch);
        for raw in raw_commands {
            registry.insert(&raw.name, raw.code, CommandKind::SimpleToggleLike);
        }

        registry
    }

    pub fn resolve(&self, identifier: &str) -> Option<&CommandDescriptor> {
        self.descriptors
            .iter()
            .find(|descriptor| descriptor.identifier == identifier)
    }

    pub fn descriptors(&self) -> &[CommandDescriptor] {
        &self.descriptors
    }

    fn insert(&mut self, identifier: &str, code: u32, kind: CommandKind) {
        if identifier.is_empty() || self.resolve(identifier).is_some() {
            return;
        }
        self.descriptors.push(CommandDescriptor {
            identifier: identifier.to_string(),
            code,
            kind,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::IR_CODE_POWER_ON,
        palette::{PaletteEntry, Rgb},
    };
    use pretty_assertions::assert_eq;

    #[test]
    fn default_table_lists_controls_then_colors() {
        let registry =
            CommandRegistry::build(&BridgeConfig::default(), &Palette::default(), &[]);
        let identifiers: Vec<&str> = registry
            .descriptors()
            .iter()
            .map(|descriptor| descriptor.identifier.as_str())
            .collect();

        assert_eq!(
            identifiers,
            vec![
                "on",
                "off",
                "red",
                "yellow",
                "white",
                "blue",
                "lightblue",
                "green",
                "purple",
                "cycle",
                "brightness",
                "color",
            ]
        );
    }

    #[test]
    fn resolve_is_exact() {
        let registry =
            CommandRegistry::build(&BridgeConfig::default(), &Palette::default(), &[]);

        let on = registry.resolve("on").unwrap();
        assert_eq!(on.kind, CommandKind::PowerOn);
        assert_eq!(on.code, IR_CODE_POWER_ON);
        assert!(registry.resolve("ON").is_none());
        assert!(registry.resolve("re").is_none());
    }

    #[test]
    fn earlier_identifier_wins_on_collision() {
        let palette = Palette::new(vec![
            PaletteEntry::new("off", 7, Rgb::new(1, 2, 3)),
            PaletteEntry::new("teal", 8, Rgb::new(0, 128, 128)),
        ])
        .unwrap();
        let raw = [
            RawCommand {
                name: "teal".to_string(),
                code: 99,
            },
            RawCommand {
                name: "flash".to_string(),
                code: 100,
            },
        ];
        let registry = CommandRegistry::build(&BridgeConfig::default(), &palette, &raw);

        assert_eq!(registry.resolve("off").unwrap().kind, CommandKind::PowerOff);
        assert_eq!(registry.resolve("teal").unwrap().code, 8);
        assert_eq!(
            registry.resolve("flash").unwrap().kind,
            CommandKind::SimpleToggleLike
        );
    }
}
