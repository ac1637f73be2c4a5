use serde::{Deserialize, Serialize};

use crate::palette::{default_entries, PaletteEntry};

pub const IR_CODE_POWER_ON: u32 = 0x01FE_48B7;
pub const IR_CODE_POWER_OFF: u32 = 0x01FE_7887;
pub const IR_CODE_BRIGHTNESS: u32 = 0x01FE_E01F;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ButtonAction {
    PowerOn,
    PowerOff,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    pub max_level: u8,
    pub inter_pulse_delay_ms: u64,
    pub indicator_ms: u64,
    pub power_on_code: u32,
    pub power_off_code: u32,
    pub brightness_code: u32,
    pub button_action: ButtonAction,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            max_level: 3,
            inter_pulse_delay_ms: 300,
            indicator_ms: 1_000,
            power_on_code: IR_CODE_POWER_ON,
            power_off_code: IR_CODE_POWER_OFF,
            brightness_code: IR_CODE_BRIGHTNESS,
            button_action: ButtonAction::PowerOff,
        }
    }
}

impl BridgeConfig {
    pub fn sanitize(&mut self) {
        self.max_level = self.max_level.clamp(1, 16);
        self.inter_pulse_delay_ms = self.inter_pulse_delay_ms.min(5_000);
        self.indicator_ms = self.indicator_ms.min(10_000);
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawCommand {
    pub name: String,
    pub code: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub wifi_ssid: String,
    pub wifi_pass: String,
    pub hostname: String,
    pub http_port: u16,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            wifi_ssid: String::new(),
            wifi_pass: String::new(),
            hostname: "irbridge".to_string(),
            http_port: 80,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct IrHardwareConfig {
    pub tx_pin: i32,
    pub rmt_channel: u8,
    pub carrier_khz: u32,
    pub indicator_pin: i32,
    pub button_pin: i32,
}

impl Default for IrHardwareConfig {
    fn default() -> Self {
        Self {
            tx_pin: 12,
            rmt_channel: 0,
            carrier_khz: 38,
            indicator_pin: 2,
            button_pin: 0,
        }
    }
}

impl IrHardwareConfig {
    pub fn sanitize(&mut self) {
        if self.tx_pin < 0 {
            self.tx_pin = 12;
        }

        if self.rmt_channel > 7 {
            self.rmt_channel = 0;
        }

        self.carrier_khz = self.carrier_khz.clamp(10, 100);
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RuntimeConfig {
    #[serde(default)]
    pub bridge: BridgeConfig,
    #[serde(default = "default_entries")]
    pub palette: Vec<PaletteEntry>,
    #[serde(default)]
    pub raw_commands: Vec<RawCommand>,
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub ir: IrHardwareConfig,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            bridge: BridgeConfig::default(),
            palette: default_entries(),
            raw_commands: Vec::new(),
            network: NetworkConfig::default(),
            ir: IrHardwareConfig::default(),
        }
    }
}

impl RuntimeConfig {
    pub fn from_json_slice(raw: &[u8]) -> Result<Self, serde_json::Error> {
        let mut config: Self = serde_json::from_slice(raw)?;
        config.sanitize();
        Ok(config)
    }

    pub fn sanitize(&mut self) {
        self.bridge.sanitize();
        self.ir.sanitize();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn empty_document_yields_defaults() {
        let config = RuntimeConfig::from_json_slice(b"{}").unwrap();
        assert_eq!(config, RuntimeConfig::default());
    }

    #[test]
    fn partial_sections_keep_remaining_defaults() {
        let raw = br#"{
            "bridge": { "max_level": 5, "button_action": "POWER_ON" },
            "raw_commands": [{ "name": "flash", "code": 33468415 }]
        }"#;
        let config = RuntimeConfig::from_json_slice(raw).unwrap();

        assert_eq!(config.bridge.max_level, 5);
        assert_eq!(config.bridge.button_action, ButtonAction::PowerOn);
        assert_eq!(config.bridge.inter_pulse_delay_ms, 300);
        assert_eq!(config.palette.len(), 8);
        assert_eq!(
            config.raw_commands,
            vec![RawCommand {
                name: "flash".to_string(),
                code: 33_468_415,
            }]
        );
    }

    #[test]
    fn sanitize_clamps_out_of_range_values() {
        let mut config = RuntimeConfig::default();
        config.bridge.max_level = 0;
        config.bridge.inter_pulse_delay_ms = 60_000;
        config.ir.rmt_channel = 9;
        config.ir.carrier_khz = 500;
        config.sanitize();

        assert_eq!(config.bridge.max_level, 1);
        assert_eq!(config.bridge.inter_pulse_delay_ms, 5_000);
        assert_eq!(config.ir.rmt_channel, 0);
        assert_eq!(config.ir.carrier_khz, 100);
    }

    #[test]
    fn sanitize_keeps_upper_rmt_channels() {
        for channel in 4..=7 {
            let mut ir = IrHardwareConfig {
                rmt_channel: channel,
                ..Default::default()
            };
            ir.sanitize();
            assert_eq!(ir.rmt_channel, channel);
        }
    }
}
