//! Terminal input encoding for special keys and sticky modifiers.

/// Special keys a host console can inject besides plain text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TerminalKey {
    /// `ESC`
    Escape,
    /// Horizontal tab.
    Tab,
    /// Cursor to line start.
    Home,
    /// Cursor to line end.
    End,
    /// Cursor left.
    ArrowLeft,
    /// Cursor up.
    ArrowUp,
    /// Cursor down.
    ArrowDown,
    /// Cursor right.
    ArrowRight,
}

/// Every special key in a stable order.
pub const TERMINAL_KEYS: [TerminalKey; 8] = [
    TerminalKey::Escape,
    TerminalKey::Tab,
    TerminalKey::Home,
    TerminalKey::End,
    TerminalKey::ArrowLeft,
    TerminalKey::ArrowUp,
    TerminalKey::ArrowDown,
    TerminalKey::ArrowRight,
];

impl TerminalKey {
    /// Returns the VT100 byte sequence for this key.
    #[must_use]
    pub const fn sequence(self) -> &'static [u8] {
        match self {
            Self::Escape => b"\x1b",
            Self::Tab => b"\t",
            Self::Home => b"\x1b[H",
            Self::End => b"\x1b[F",
            Self::ArrowLeft => b"\x1b[D",
            Self::ArrowUp => b"\x1b[A",
            Self::ArrowDown => b"\x1b[B",
            Self::ArrowRight => b"\x1b[C",
        }
    }
}

/// Modifier state applied to the next injected sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Modifiers {
    /// Control: the payload collapses to its first byte as a control character.
    pub control: bool,
    /// Alternate: the payload is preceded by `ESC [`.
    pub alternate: bool,
}

impl Modifiers {
    /// No modifiers.
    pub const NONE: Self = Self {
        control: false,
        alternate: false,
    };

    /// Control only.
    pub const CONTROL: Self = Self {
        control: true,
        alternate: false,
    };

    /// Alternate only.
    pub const ALTERNATE: Self = Self {
        control: false,
        alternate: true,
    };

    /// Combines two modifier sets.
    #[must_use]
    pub const fn union(self, other: Self) -> Self {
        Self {
            control: self.control || other.control,
            alternate: self.alternate || other.alternate,
        }
    }

    /// Returns `true` when no modifier is active.
    #[must_use]
    pub const fn is_empty(self) -> bool {
        !self.control && !self.alternate
    }
}

/// Maps a byte to its control character (`a`/`A` -> `0x01`, `[` -> `ESC`).
#[must_use]
pub const fn control_byte(byte: u8) -> u8 {
    byte.to_ascii_uppercase() ^ 0x40
}

/// Applies `modifiers` to an input sequence.
///
/// An empty sequence encodes to nothing, regardless of modifiers.
#[must_use]
pub fn encode_sequence(sequence: &[u8], modifiers: Modifiers) -> Vec<u8> {
    let Some(&first) = sequence.first() else {
        return Vec::new();
    };
    let mut out = Vec::with_capacity(sequence.len() + 2);
    if modifiers.alternate {
        out.extend_from_slice(b"\x1b[");
    }
    if modifiers.control {
        out.push(control_byte(first));
    } else {
        out.extend_from_slice(sequence);
    }
    out
}

/// Encodes a special key with modifiers.
#[must_use]
pub fn encode_key(key: TerminalKey, modifiers: Modifiers) -> Vec<u8> {
    encode_sequence(key.sequence(), modifiers)
}
