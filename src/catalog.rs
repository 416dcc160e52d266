//! LX200 command catalog
//!
//! The catalog is the ordered, immutable registry of every command the tester
//! knows about, together with the response shape each command must produce.
//! Order is insertion order and never changes between runs.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use once_cell::sync::Lazy;
use serde::Serialize;

use crate::constants::{ACK, TERMINATOR};
use crate::error::{CatalogError, CatalogResult};

/// The standard catalog, built once per process
static STANDARD_CATALOG: Lazy<Arc<CommandCatalog>> = Lazy::new(|| Arc::new(CommandCatalog::build_standard()));

/// Expected response shape of a command
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum FormatClass {
    /// No response expected; any reply (or none) is acceptable
    None,
    /// Response must contain the token somewhere
    SubstringMatch(String),
    /// `HH:MM:SS#`
    TimeFormat,
    /// `sDD*MM:SS#` or `sDDD*MM:SS#`
    CoordinateFormat,
    /// Any text ending in `#`
    TerminatedText,
}

impl FormatClass {
    pub fn substring(token: &str) -> Self {
        FormatClass::SubstringMatch(token.to_string())
    }

    /// True when the command is not expected to answer
    pub fn expects_response(&self) -> bool {
        !matches!(self, FormatClass::None)
    }
}

impl fmt::Display for FormatClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FormatClass::None => write!(f, "(no response)"),
            FormatClass::SubstringMatch(token) => write!(f, "{token}"),
            FormatClass::TimeFormat => write!(f, "HH:MM:SS#"),
            FormatClass::CoordinateFormat => write!(f, "sDD*MM:SS#"),
            FormatClass::TerminatedText => write!(f, "text#"),
        }
    }
}

/// Grouping used for listings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum CommandCategory {
    Information,
    Movement,
    Guiding,
    SlewRate,
    CoordinateSet,
    Special,
    Handshake,
}

impl CommandCategory {
    pub fn label(&self) -> &'static str {
        match self {
            CommandCategory::Information => "Information",
            CommandCategory::Movement => "Movement",
            CommandCategory::Guiding => "Guiding",
            CommandCategory::SlewRate => "Slew Rate",
            CommandCategory::CoordinateSet => "Coordinate Setting",
            CommandCategory::Special => "Special",
            CommandCategory::Handshake => "Handshake",
        }
    }
}

/// Direction of a timed guide pulse
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuideDirection {
    North,
    South,
    East,
    West,
}

impl GuideDirection {
    pub fn code(&self) -> char {
        match self {
            GuideDirection::North => 'n',
            GuideDirection::South => 's',
            GuideDirection::East => 'e',
            GuideDirection::West => 'w',
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            b'n' => Some(GuideDirection::North),
            b's' => Some(GuideDirection::South),
            b'e' => Some(GuideDirection::East),
            b'w' => Some(GuideDirection::West),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            GuideDirection::North => "North",
            GuideDirection::South => "South",
            GuideDirection::East => "East",
            GuideDirection::West => "West",
        }
    }
}

/// A single command the tester can send
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommandDefinition {
    pub name: String,
    /// Literal bytes put on the wire
    pub wire_bytes: Vec<u8>,
    pub expected_format: FormatClass,
    pub description: String,
    pub category: CommandCategory,
}

impl CommandDefinition {
    pub fn new(
        name: &str,
        wire: &str,
        expected_format: FormatClass,
        description: &str,
        category: CommandCategory,
    ) -> Self {
        Self {
            name: name.to_string(),
            wire_bytes: wire.as_bytes().to_vec(),
            expected_format,
            description: description.to_string(),
            category,
        }
    }

    /// Timed guide pulse, e.g. `:Mgn1000#`
    pub fn guide_pulse(direction: GuideDirection, duration_ms: u32) -> Self {
        let seconds = duration_ms as f64 / 1000.0;
        Self::new(
            &format!("Guide {} {}s", direction.name(), seconds),
            &format!(":Mg{}{}#", direction.code(), duration_ms),
            FormatClass::None,
            &format!("Guide {} for {} ms", direction.name(), duration_ms),
            CommandCategory::Guiding,
        )
    }

    /// The `0x06` handshake probe
    pub fn handshake() -> Self {
        Self {
            name: "ACK Test".to_string(),
            wire_bytes: vec![ACK],
            expected_format: FormatClass::substring("G"),
            description: "Send ACK character (0x06)".to_string(),
            category: CommandCategory::Handshake,
        }
    }

    /// Ad-hoc command typed by the user; no response is expected
    pub fn custom(text: &str) -> Self {
        Self::new(text, text, FormatClass::None, "Custom command", CommandCategory::Special)
    }

    /// Human readable form of the wire bytes for logs
    pub fn printable_wire(&self) -> String {
        if self.wire_bytes == [ACK] {
            "ACK (0x06)".to_string()
        } else {
            escape_bytes(&self.wire_bytes)
        }
    }
}

/// Render bytes with control characters escaped, so partial or binary
/// responses can be logged verbatim.
pub fn escape_bytes(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len());
    for &b in bytes {
        match b {
            b'\\' => out.push_str("\\\\"),
            b'\r' => out.push_str("\\r"),
            b'\n' => out.push_str("\\n"),
            b'\t' => out.push_str("\\t"),
            0x20..=0x7E => out.push(b as char),
            _ => out.push_str(&format!("\\x{b:02x}")),
        }
    }
    out
}

/// Extract the millisecond duration from a guide command like `:Mgn1000#`.
/// Returns `None` when no digits follow the direction code.
pub fn parse_guide_duration(command: &[u8]) -> Option<(GuideDirection, u32)> {
    let rest = command.strip_prefix(b":Mg")?;
    let (&code, digits) = rest.split_first()?;
    let direction = GuideDirection::from_code(code)?;
    let digits = digits.strip_suffix(&[TERMINATOR]).unwrap_or(digits);
    if digits.is_empty() || !digits.iter().all(u8::is_ascii_digit) {
        return None;
    }
    let text = std::str::from_utf8(digits).ok()?;
    text.parse().ok().map(|ms| (direction, ms))
}

/// Immutable ordered registry of command definitions
#[derive(Debug, Clone)]
pub struct CommandCatalog {
    commands: Vec<CommandDefinition>,
}

impl CommandCatalog {
    /// Build a catalog from definitions in the given order. Names must be unique.
    pub fn from_definitions(commands: Vec<CommandDefinition>) -> CatalogResult<Self> {
        let mut seen = HashSet::new();
        for cmd in &commands {
            if !seen.insert(cmd.name.as_str()) {
                return Err(CatalogError::DuplicateName { name: cmd.name.clone() });
            }
        }
        Ok(Self { commands })
    }

    /// Shared handle to the standard 24-command catalog
    pub fn standard() -> Arc<CommandCatalog> {
        Arc::clone(&STANDARD_CATALOG)
    }

    fn build_standard() -> Self {
        use CommandCategory::*;

        let mut commands = vec![
            // Information
            CommandDefinition::new("Get Right Ascension", ":GR#", FormatClass::TimeFormat, "Get current Right Ascension", Information),
            CommandDefinition::new("Get Declination", ":GD#", FormatClass::CoordinateFormat, "Get current Declination", Information),
            CommandDefinition::new("Get Site Name", ":GM#", FormatClass::TerminatedText, "Get current site name", Information),
            CommandDefinition::new("Get Site Latitude", ":Gt#", FormatClass::CoordinateFormat, "Get site latitude", Information),
            CommandDefinition::new("Get Site Longitude", ":Gg#", FormatClass::CoordinateFormat, "Get site longitude", Information),
            CommandDefinition::new("Get Tracking Rate", ":GT#", FormatClass::TerminatedText, "Get tracking rate", Information),
            // Movement
            CommandDefinition::new("Move North", ":Mn#", FormatClass::None, "Start moving North", Movement),
            CommandDefinition::new("Move South", ":Ms#", FormatClass::None, "Start moving South", Movement),
            CommandDefinition::new("Move East", ":Me#", FormatClass::None, "Start moving East", Movement),
            CommandDefinition::new("Move West", ":Mw#", FormatClass::None, "Start moving West", Movement),
            CommandDefinition::new("Halt All", ":Q#", FormatClass::None, "Stop all movement", Movement),
        ];

        for direction in [GuideDirection::North, GuideDirection::South, GuideDirection::East, GuideDirection::West] {
            commands.push(CommandDefinition::guide_pulse(direction, 1000));
        }

        commands.extend([
            // Slew rate
            CommandDefinition::new("Set Slew Rate Fast", ":RS#", FormatClass::None, "Set slew rate to fastest", SlewRate),
            CommandDefinition::new("Set Slew Rate Medium", ":RM#", FormatClass::None, "Set slew rate to medium", SlewRate),
            CommandDefinition::new("Set Slew Rate Center", ":RC#", FormatClass::None, "Set slew rate to centering", SlewRate),
            CommandDefinition::new("Set Slew Rate Guide", ":RG#", FormatClass::None, "Set slew rate to guiding", SlewRate),
            // Coordinate setting
            CommandDefinition::new("Set RA Example", ":Sr 12:34:56#", FormatClass::substring("1"), "Set Right Ascension to 12:34:56", CoordinateSet),
            CommandDefinition::new("Set DEC Example", ":Sd +45:30:00#", FormatClass::substring("1"), "Set Declination to +45:30:00", CoordinateSet),
            // Special
            CommandDefinition::new("Sync", ":CM#", FormatClass::None, "Sync telescope to current coordinates", Special),
            CommandDefinition::new("Slew to Target", ":MS#", FormatClass::substring("0"), "Slew to target coordinates", Special),
        ]);

        commands.push(CommandDefinition::handshake());

        Self { commands }
    }

    /// Look up a command by its unique name
    pub fn get(&self, name: &str) -> CatalogResult<&CommandDefinition> {
        self.commands
            .iter()
            .find(|c| c.name == name)
            .ok_or_else(|| CatalogError::NotFound { name: name.to_string() })
    }

    pub fn iter(&self) -> std::slice::Iter<'_, CommandDefinition> {
        self.commands.iter()
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.commands.iter().map(|c| c.name.as_str()).collect()
    }

    /// Index of a command in catalog order
    pub fn position(&self, name: &str) -> Option<usize> {
        self.commands.iter().position(|c| c.name == name)
    }
}

impl<'a> IntoIterator for &'a CommandCatalog {
    type Item = &'a CommandDefinition;
    type IntoIter = std::slice::Iter<'a, CommandDefinition>;

    fn into_iter(self) -> Self::IntoIter {
        self.commands.iter()
    }
}
