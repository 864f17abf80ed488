use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::ConfigError;

/// Machine architecture used when a description does not name one.
pub const DEFAULT_MACHINE: &str = "riscv64";

/// Guest RAM in MiB used when a description does not specify it.
pub const DEFAULT_MEMORY_SIZE_MIB: u64 = 128;

/// Engine configuration format revision produced by [`MachineDescription::render`].
pub const CONFIG_VERSION: u64 = 1;

const fn default_memory_size() -> u64 {
    DEFAULT_MEMORY_SIZE_MIB
}

fn default_machine() -> String {
    DEFAULT_MACHINE.to_string()
}

/// Host-authored description of the machine to boot.
///
/// Image entries are file names relative to a base directory supplied at
/// render time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MachineDescription {
    /// Firmware image.
    #[serde(rename = "BIOS")]
    pub bios: String,
    /// Optional kernel image.
    #[serde(rename = "Kernel", default, skip_serializing_if = "Option::is_none")]
    pub kernel: Option<String>,
    /// Optional kernel command line.
    #[serde(
        rename = "KernelCommandLine",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub kernel_command_line: Option<String>,
    /// Optional root block device image.
    #[serde(rename = "RootDrive", default, skip_serializing_if = "Option::is_none")]
    pub root_drive: Option<String>,
    /// Guest RAM in MiB.
    #[serde(rename = "MemorySize", default = "default_memory_size")]
    pub memory_size_mib: u64,
    /// Machine architecture name.
    #[serde(rename = "Machine", default = "default_machine")]
    pub machine: String,
}

impl MachineDescription {
    /// Creates a description booting only `bios` with default machine settings.
    #[must_use]
    pub fn new(bios: impl Into<String>) -> Self {
        Self {
            bios: bios.into(),
            kernel: None,
            kernel_command_line: None,
            root_drive: None,
            memory_size_mib: DEFAULT_MEMORY_SIZE_MIB,
            machine: default_machine(),
        }
    }

    /// Decodes a JSON description.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidDescription`] when the document does not
    /// match the description schema.
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(text).map_err(ConfigError::InvalidDescription)
    }

    /// Reads and decodes a JSON description file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Unreadable`] if the file cannot be read and
    /// [`ConfigError::InvalidDescription`] if it cannot be decoded.
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Unreadable {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&text)
    }

    /// Renders the engine configuration text, resolving images against `base_dir`.
    #[must_use]
    pub fn render(&self, base_dir: &Path) -> String {
        let image = |name: &str| quote(&base_dir.join(name).to_string_lossy());

        let mut config = String::from("{\n");
        let _ = writeln!(config, "    version: {CONFIG_VERSION},");
        let _ = writeln!(config, "    machine: {},", quote(&self.machine));
        let _ = writeln!(config, "    memory_size: {},", self.memory_size_mib);
        let _ = writeln!(config, "    bios: {},", image(&self.bios));
        if let Some(kernel) = &self.kernel {
            let _ = writeln!(config, "    kernel: {},", image(kernel));
        }
        if let Some(cmdline) = &self.kernel_command_line {
            let _ = writeln!(config, "    cmdline: {},", quote(cmdline));
        }
        if let Some(drive) = &self.root_drive {
            let _ = writeln!(config, "    drive0: {{ file: {} }},", image(drive));
        }
        config.push_str("    eth0: { driver: \"user\" },\n");
        config.push_str("}\n");
        config
    }
}

/// Quotes `text` as a single-line configuration string literal.
#[must_use]
pub fn quote(text: &str) -> String {
    let mut quoted = String::with_capacity(text.len() + 2);
    quoted.push('"');
    for ch in text.chars() {
        match ch {
            '"' | '\\' => {
                quoted.push('\\');
                quoted.push(ch);
            }
            '\n' => quoted.push_str("\\n"),
            '\r' => quoted.push_str("\\r"),
            '\t' => quoted.push_str("\\t"),
            _ => quoted.push(ch),
        }
    }
    quoted.push('"');
    quoted
}
