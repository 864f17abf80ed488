use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::ConfigError;

use super::description::CONFIG_VERSION;

/// Largest guest RAM size accepted, in MiB.
pub const MAX_MEMORY_SIZE_MIB: u64 = 1 << 16;

/// A configuration value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigValue {
    /// Unsigned integer literal.
    Integer(u64),
    /// `true` / `false`.
    Bool(bool),
    /// Quoted string literal.
    Text(String),
    /// Inline `{ key: value, ... }` object.
    Object(BTreeMap<String, ConfigValue>),
}

impl ConfigValue {
    /// Returns the integer payload.
    #[must_use]
    pub const fn as_integer(&self) -> Option<u64> {
        match self {
            Self::Integer(value) => Some(*value),
            Self::Bool(_) | Self::Text(_) | Self::Object(_) => None,
        }
    }

    /// Returns the string payload.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            Self::Integer(_) | Self::Bool(_) | Self::Object(_) => None,
        }
    }

    /// Returns the object payload.
    #[must_use]
    pub const fn as_object(&self) -> Option<&BTreeMap<String, Self>> {
        match self {
            Self::Object(entries) => Some(entries),
            Self::Integer(_) | Self::Bool(_) | Self::Text(_) => None,
        }
    }
}

/// Parsed engine configuration.
///
/// Accepts the flat layout produced by
/// [`super::MachineDescription::render`]: an outer `{` / `}` pair with one
/// `key: value,` entry per line. Blank lines and `#` or `//` comment lines
/// are ignored.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MachineConfig {
    entries: BTreeMap<String, ConfigValue>,
}

impl MachineConfig {
    /// Parses configuration text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Malformed`] with the offending line on any
    /// syntax error or duplicate key.
    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        let mut entries = BTreeMap::new();
        let mut opened = false;
        let mut closed = false;
        let mut last_line = 0;

        for (index, raw) in text.lines().enumerate() {
            let line_no = index + 1;
            last_line = line_no;
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with("//") {
                continue;
            }
            if closed {
                return Err(malformed(line_no, "content after closing brace"));
            }
            if !opened {
                if line != "{" {
                    return Err(malformed(line_no, "expected `{`"));
                }
                opened = true;
                continue;
            }
            if line == "}" {
                closed = true;
                continue;
            }

            let mut cursor = Cursor::new(line);
            let (key, value) = cursor
                .entry()
                .map_err(|reason| malformed(line_no, reason))?;
            cursor.skip_ws();
            cursor.eat(',');
            cursor.skip_ws();
            if !cursor.at_end() {
                return Err(malformed(line_no, "trailing characters after value"));
            }
            if entries.insert(key.clone(), value).is_some() {
                return Err(malformed(line_no, &format!("duplicate key `{key}`")));
            }
        }

        if !opened {
            return Err(malformed(last_line.max(1), "empty configuration"));
        }
        if !closed {
            return Err(malformed(last_line.max(1), "missing closing `}`"));
        }
        Ok(Self { entries })
    }

    /// Reads and parses a configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Unreadable`] if the file cannot be read, or any
    /// error from [`MachineConfig::parse`].
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Unreadable {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text)
    }

    /// Looks up a top-level entry.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&ConfigValue> {
        self.entries.get(key)
    }

    /// Iterates top-level entries in key order.
    pub fn entries(&self) -> impl Iterator<Item = (&str, &ConfigValue)> {
        self.entries.iter().map(|(key, value)| (key.as_str(), value))
    }

    /// Configuration format revision.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingField`] when absent or not an integer.
    pub fn version(&self) -> Result<u64, ConfigError> {
        self.integer("version")
    }

    /// Machine architecture name.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingField`] when absent, empty, or not a string.
    pub fn machine(&self) -> Result<&str, ConfigError> {
        self.text("machine")
            .filter(|machine| !machine.is_empty())
            .ok_or(ConfigError::MissingField("machine"))
    }

    /// Guest RAM in MiB.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingField`] when absent or not an integer.
    pub fn memory_size_mib(&self) -> Result<u64, ConfigError> {
        self.integer("memory_size")
    }

    /// Checks the semantic constraints an engine needs to instantiate the machine.
    ///
    /// # Errors
    ///
    /// Returns the first violated constraint.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let version = self.version()?;
        if version != CONFIG_VERSION {
            return Err(ConfigError::UnsupportedVersion(version));
        }
        self.machine()?;
        let memory = self.memory_size_mib()?;
        if memory == 0 || memory > MAX_MEMORY_SIZE_MIB {
            return Err(ConfigError::InvalidMemorySize(memory));
        }
        if self.text("bios").is_none() {
            return Err(ConfigError::MissingField("bios"));
        }
        Ok(())
    }

    /// Image files referenced by the configuration, keyed by where they appear.
    ///
    /// Covers `bios`, `kernel`, and the `file` of every `drive*` object.
    #[must_use]
    pub fn image_paths(&self) -> Vec<(String, PathBuf)> {
        let mut images = Vec::new();
        for key in ["bios", "kernel"] {
            if let Some(path) = self.text(key) {
                images.push((key.to_string(), PathBuf::from(path)));
            }
        }
        for (key, value) in &self.entries {
            if !key.starts_with("drive") {
                continue;
            }
            if let Some(file) = value
                .as_object()
                .and_then(|object| object.get("file"))
                .and_then(ConfigValue::as_text)
            {
                images.push((format!("{key}.file"), PathBuf::from(file)));
            }
        }
        images
    }

    /// Verifies every referenced image exists, resolving relative paths against `base_dir`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingImage`] for the first image not found.
    pub fn verify_images(&self, base_dir: &Path) -> Result<(), ConfigError> {
        for (key, path) in self.image_paths() {
            let resolved = if path.is_absolute() {
                path
            } else {
                base_dir.join(path)
            };
            if !resolved.is_file() {
                return Err(ConfigError::MissingImage {
                    key,
                    path: resolved,
                });
            }
        }
        Ok(())
    }

    fn integer(&self, key: &'static str) -> Result<u64, ConfigError> {
        self.entries
            .get(key)
            .and_then(ConfigValue::as_integer)
            .ok_or(ConfigError::MissingField(key))
    }

    fn text(&self, key: &str) -> Option<&str> {
        self.entries.get(key).and_then(ConfigValue::as_text)
    }
}

fn malformed(line: usize, reason: &str) -> ConfigError {
    ConfigError::Malformed {
        line,
        reason: reason.to_string(),
    }
}

struct Cursor<'a> {
    rest: &'a str,
}

impl<'a> Cursor<'a> {
    const fn new(text: &'a str) -> Self {
        Self { rest: text }
    }

    fn skip_ws(&mut self) {
        self.rest = self.rest.trim_start();
    }

    const fn at_end(&self) -> bool {
        self.rest.is_empty()
    }

    fn peek(&self) -> Option<char> {
        self.rest.chars().next()
    }

    fn eat(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.rest = &self.rest[expected.len_utf8()..];
            true
        } else {
            false
        }
    }

    fn entry(&mut self) -> Result<(String, ConfigValue), &'static str> {
        self.skip_ws();
        let key = self.key()?;
        self.skip_ws();
        if !self.eat(':') {
            return Err("expected `:` after key");
        }
        self.skip_ws();
        let value = self.value()?;
        Ok((key, value))
    }

    fn key(&mut self) -> Result<String, &'static str> {
        let end = self
            .rest
            .find(|ch: char| !(ch.is_ascii_alphanumeric() || ch == '_'))
            .unwrap_or(self.rest.len());
        if end == 0 {
            return Err("expected key");
        }
        let (key, rest) = self.rest.split_at(end);
        self.rest = rest;
        Ok(key.to_string())
    }

    fn value(&mut self) -> Result<ConfigValue, &'static str> {
        match self.peek() {
            Some('"') => self.string().map(ConfigValue::Text),
            Some('{') => self.object(),
            Some(ch) if ch.is_ascii_digit() => self.integer(),
            Some(_) => self.boolean(),
            None => Err("expected value"),
        }
    }

    fn string(&mut self) -> Result<String, &'static str> {
        self.eat('"');
        let mut text = String::new();
        let mut chars = self.rest.char_indices();
        while let Some((index, ch)) = chars.next() {
            match ch {
                '"' => {
                    self.rest = &self.rest[index + 1..];
                    return Ok(text);
                }
                '\\' => match chars.next() {
                    Some((_, 'n')) => text.push('\n'),
                    Some((_, 'r')) => text.push('\r'),
                    Some((_, 't')) => text.push('\t'),
                    Some((_, escaped)) => text.push(escaped),
                    None => break,
                },
                _ => text.push(ch),
            }
        }
        Err("unterminated string")
    }

    fn integer(&mut self) -> Result<ConfigValue, &'static str> {
        let end = self
            .rest
            .find(|ch: char| !ch.is_ascii_digit())
            .unwrap_or(self.rest.len());
        let (digits, rest) = self.rest.split_at(end);
        let value = digits.parse().map_err(|_| "integer out of range")?;
        self.rest = rest;
        Ok(ConfigValue::Integer(value))
    }

    fn boolean(&mut self) -> Result<ConfigValue, &'static str> {
        for (word, value) in [("true", true), ("false", false)] {
            if let Some(rest) = self.rest.strip_prefix(word) {
                self.rest = rest;
                return Ok(ConfigValue::Bool(value));
            }
        }
        Err("unrecognized value")
    }

    fn object(&mut self) -> Result<ConfigValue, &'static str> {
        self.eat('{');
        let mut entries = BTreeMap::new();
        loop {
            self.skip_ws();
            if self.eat('}') {
                return Ok(ConfigValue::Object(entries));
            }
            let (key, value) = self.entry()?;
            if entries.insert(key, value).is_some() {
                return Err("duplicate key in object");
            }
            self.skip_ws();
            if self.eat(',') {
                continue;
            }
            self.skip_ws();
            if self.eat('}') {
                return Ok(ConfigValue::Object(entries));
            }
            return Err("expected `,` or `}` in object");
        }
    }
}
