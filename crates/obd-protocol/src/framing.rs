//! Response framing
//!
//! The ELM327 ends every response with its `>` command prompt. Serial and
//! socket links deliver the response in arbitrary fragments, so bytes are
//! accumulated until the prompt shows up.

use crate::link::Framing;

/// ELM327 command prompt
pub const PROMPT: u8 = b'>';

/// Upper bound on buffered bytes before the buffer is considered garbage
const MAX_RESPONSE_BYTES: usize = 4096;

/// Accumulates fragments into complete responses
#[derive(Debug, Default)]
pub struct ResponseFramer {
    framing: Framing,
    buffer: Vec<u8>,
}

impl ResponseFramer {
    pub fn new(framing: Framing) -> Self {
        Self {
            framing,
            buffer: Vec::new(),
        }
    }

    /// Drop whatever is left over from a previous exchange
    pub fn reset(&mut self) {
        self.buffer.clear();
    }

    /// Bytes waiting for a terminator
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// Feed one fragment, returning the response once it is complete
    pub fn push(&mut self, fragment: &[u8]) -> Option<String> {
        match self.framing {
            Framing::Message => Some(clean(fragment)),
            Framing::Prompt => {
                self.buffer.extend_from_slice(fragment);
                match self.buffer.iter().position(|&b| b == PROMPT) {
                    Some(pos) => {
                        let response = clean(&self.buffer[..pos]);
                        self.buffer.clear();
                        Some(response)
                    }
                    None => {
                        if self.buffer.len() > MAX_RESPONSE_BYTES {
                            let excess = self.buffer.len() - MAX_RESPONSE_BYTES;
                            self.buffer.drain(..excess);
                        }
                        None
                    }
                }
            }
        }
    }
}

fn clean(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes)
        .trim_matches(|c: char| c.is_whitespace() || c == '>' || c == '\0')
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fragments_until_prompt() {
        let mut framer = ResponseFramer::new(Framing::Prompt);
        assert_eq!(framer.push(b"41 0C"), None);
        assert_eq!(framer.push(b" 1A F8\r"), None);
        assert_eq!(framer.push(b"\r>"), Some("41 0C 1A F8".to_string()));
        assert_eq!(framer.pending(), 0);
    }

    #[test]
    fn test_prompt_in_first_fragment() {
        let mut framer = ResponseFramer::new(Framing::Prompt);
        assert_eq!(framer.push(b"OK\r\r>"), Some("OK".to_string()));
    }

    #[test]
    fn test_message_framing_takes_each_message() {
        let mut framer = ResponseFramer::new(Framing::Message);
        assert_eq!(framer.push(b"410D3C\r\n"), Some("410D3C".to_string()));
        assert_eq!(framer.push(b"OK>"), Some("OK".to_string()));
    }

    #[test]
    fn test_reset_discards_stale_bytes() {
        let mut framer = ResponseFramer::new(Framing::Prompt);
        framer.push(b"STALE");
        framer.reset();
        assert_eq!(framer.push(b"OK>"), Some("OK".to_string()));
    }

    #[test]
    fn test_runaway_buffer_is_bounded() {
        let mut framer = ResponseFramer::new(Framing::Prompt);
        framer.push(&vec![b'A'; MAX_RESPONSE_BYTES * 2]);
        assert_eq!(framer.pending(), MAX_RESPONSE_BYTES);
    }
}
