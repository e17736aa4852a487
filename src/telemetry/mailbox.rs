//! Single-slot mailbox between the radio accumulation stream and the link session.

use tracing::debug;

/// Longest payload the mailbox holds, in bytes
pub const RADIO_BUFFER_MAX_LEN: usize = 127;

/// Ready radio payload awaiting a gateway poll
///
/// Holds at most one unread payload. The consumer reads and clears in one
/// [`take`](RadioBuffer::take) call; the producer may publish again right after.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RadioBuffer {
    text: String,
    ready: bool,
}

impl RadioBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// True while a published payload has not been taken
    pub fn is_ready(&self) -> bool {
        self.ready
    }

    /// Current payload without consuming it
    pub fn peek(&self) -> Option<&str> {
        self.ready.then_some(self.text.as_str())
    }

    /// Stage a payload, truncated to [`RADIO_BUFFER_MAX_LEN`] bytes
    pub fn publish(&mut self, text: impl Into<String>) {
        let mut text = text.into();
        if text.len() > RADIO_BUFFER_MAX_LEN {
            let mut cut = RADIO_BUFFER_MAX_LEN;
            while !text.is_char_boundary(cut) {
                cut -= 1;
            }
            debug!("Radio payload truncated from {} to {} bytes", text.len(), cut);
            text.truncate(cut);
        }
        self.text = text;
        self.ready = true;
    }

    /// Take the payload if one is ready, clearing the slot
    pub fn take(&mut self) -> Option<String> {
        if !self.ready {
            return None;
        }
        self.ready = false;
        Some(std::mem::take(&mut self.text))
    }

    /// Drop any staged payload
    pub fn clear(&mut self) {
        self.text.clear();
        self.ready = false;
    }
}
