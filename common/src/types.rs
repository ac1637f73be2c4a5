use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PowerState {
    On,
    Off,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StateSnapshot {
    pub state: PowerState,
    pub brightness: u8,
    pub color: [u8; 3],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    SimpleToggleLike,
    ColorSelect,
    ColorMatch,
    BrightnessAdjust,
    PowerOn,
    PowerOff,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandDescriptor {
    pub identifier: String,
    pub code: u32,
    pub kind: CommandKind,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct CommandParams {
    #[serde(default)]
    pub value: Option<String>,
}

impl CommandParams {
    pub fn with_value(value: impl Into<String>) -> Self {
        Self {
            value: Some(value.into()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IrAction {
    Send(u32),
    Delay(u64),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dispatch {
    pub snapshot: StateSnapshot,
    pub actions: Vec<IrAction>,
    pub changed: bool,
}

impl Dispatch {
    pub fn pulse_count(&self) -> usize {
        self.actions
            .iter()
            .filter(|action| matches!(action, IrAction::Send(_)))
            .count()
    }
}
