//! Slash command parsing.

use crate::error::DispatchError;
use crate::pdf::Rotation;

const COMMAND_PREFIX: char = '/';

/// Default `/extract` resolution.
pub const DEFAULT_DPI: u32 = 150;
pub const MIN_DPI: u32 = 72;
pub const MAX_DPI: u32 = 600;

/// A command sent by the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start,
    Help,
    /// Remove watermark text and images.
    Clean,
    Compress,
    Split,
    Rotate { angle: Option<String> },
    Extract { dpi: Option<String> },
    /// Add the current document to the merge set.
    Merge,
    /// Merge everything in the merge set.
    Done,
    Status,
    Watermarks,
    /// Forget the current document and the merge set.
    Reset,
    Unknown { command: String },
}

impl Command {
    /// Parse a message. Returns `None` if it is not a command.
    ///
    /// Accepts the `/command@botname` form used in group chats.
    pub fn parse(content: &str) -> Option<Self> {
        let without_prefix = content.trim().strip_prefix(COMMAND_PREFIX)?;
        let mut parts = without_prefix.split_whitespace();
        let head = parts.next()?;
        let name = head
            .split_once('@')
            .map_or(head, |(name, _bot)| name)
            .to_lowercase();
        let arg = parts.next().map(str::to_string);

        let command = match name.as_str() {
            "start" => Self::Start,
            "help" => Self::Help,
            "clean" => Self::Clean,
            "compress" => Self::Compress,
            "split" => Self::Split,
            "rotate" => Self::Rotate { angle: arg },
            "extract" => Self::Extract { dpi: arg },
            "merge" => Self::Merge,
            "done" => Self::Done,
            "status" => Self::Status,
            "watermarks" => Self::Watermarks,
            "reset" => Self::Reset,
            _ => Self::Unknown { command: name },
        };
        Some(command)
    }

    /// Command name without the prefix, for logs.
    pub fn name(&self) -> &str {
        match self {
            Self::Start => "start",
            Self::Help => "help",
            Self::Clean => "clean",
            Self::Compress => "compress",
            Self::Split => "split",
            Self::Rotate { .. } => "rotate",
            Self::Extract { .. } => "extract",
            Self::Merge => "merge",
            Self::Done => "done",
            Self::Status => "status",
            Self::Watermarks => "watermarks",
            Self::Reset => "reset",
            Self::Unknown { command } => command,
        }
    }
}

/// Validate the `/rotate` argument. Missing means the default 90 degrees.
pub fn parse_rotation(arg: Option<&str>) -> Result<Rotation, DispatchError> {
    let Some(raw) = arg else {
        return Ok(Rotation::default());
    };
    raw.parse::<i64>()
        .ok()
        .and_then(Rotation::from_degrees)
        .ok_or_else(|| DispatchError::InvalidArgument {
            command: "rotate".to_string(),
            reason: format!("'{raw}' is not one of 90, 180, 270"),
        })
}

/// Validate the `/extract` argument. Missing means `DEFAULT_DPI`.
pub fn parse_dpi(arg: Option<&str>) -> Result<u32, DispatchError> {
    let Some(raw) = arg else {
        return Ok(DEFAULT_DPI);
    };
    raw.parse::<u32>()
        .ok()
        .filter(|dpi| (MIN_DPI..=MAX_DPI).contains(dpi))
        .ok_or_else(|| DispatchError::InvalidArgument {
            command: "extract".to_string(),
            reason: format!("dpi must be a number from {MIN_DPI} to {MAX_DPI}, got '{raw}'"),
        })
}
