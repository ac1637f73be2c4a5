use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("missing '{0}' parameter")]
    MissingParameter(&'static str),
    #[error("malformed color '{input}': {reason}")]
    MalformedColor { input: String, reason: &'static str },
    #[error("color component {component} exceeds 255")]
    ColorComponentOutOfRange { component: String },
    #[error("invalid brightness '{0}'")]
    InvalidBrightness(String),
    #[error("brightness {level} outside 1..={max}")]
    BrightnessOutOfRange { level: u32, max: u8 },
    #[error("palette must contain at least one entry")]
    EmptyPalette,
}
