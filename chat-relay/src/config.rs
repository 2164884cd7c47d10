use crate::protocol::Framing;

/// Bytes per read in raw framing.
pub const DEFAULT_READ_BUFFER: usize = 1024;

/// Longest accepted line in line framing.
pub const DEFAULT_MAX_LINE: usize = 64 * 1024;

pub const DEFAULT_LISTEN_ADDR: &str = "localhost:5555";

/// Server options shared by every session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelayConfig {
    pub framing: Framing,
    /// Largest single read in raw framing.
    pub read_buffer: usize,
    /// Longest line in line framing. Longer lines end the session.
    pub max_line: usize,
}

impl RelayConfig {
    /// The bound handed to each session's reader for the active framing.
    pub fn read_limit(&self) -> usize {
        match self.framing {
            Framing::Raw => self.read_buffer,
            Framing::Lines => self.max_line,
        }
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            framing: Framing::Raw,
            read_buffer: DEFAULT_READ_BUFFER,
            max_line: DEFAULT_MAX_LINE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_limit_follows_framing() {
        let raw = RelayConfig::default();
        assert_eq!(raw.read_limit(), DEFAULT_READ_BUFFER);

        let lines = RelayConfig {
            framing: Framing::Lines,
            ..raw
        };
        assert_eq!(lines.read_limit(), DEFAULT_MAX_LINE);
    }
}
