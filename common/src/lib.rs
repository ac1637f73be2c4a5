pub mod color;
pub mod commands;
pub mod config;
pub mod engine;
pub mod error;
pub mod http;
pub mod nec;
pub mod palette;
pub mod state;
pub mod types;

pub use color::{closest_entry, parse_rgb, weighted_distance};
pub use commands::CommandRegistry;
pub use config::{BridgeConfig, ButtonAction, IrHardwareConfig, RawCommand, RuntimeConfig};
pub use engine::{run_actions, CommandEngine, Transmitter};
pub use error::CommandError;
pub use palette::{ColorId, Palette, PaletteEntry, Rgb};
pub use state::DeviceState;
pub use types::{
    CommandDescriptor, CommandKind, CommandParams, Dispatch, IrAction, PowerState, StateSnapshot,
};
