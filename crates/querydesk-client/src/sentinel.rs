//! End-of-stream detection for completion bodies that terminate with an
//! in-band marker instead of closing the connection.

/// Result of scanning one decoded chunk.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Detection {
    /// Text that is safe to display.
    pub content: String,
    /// The marker was seen; nothing after it is content.
    pub terminal: bool,
}

/// Scans decoded text for the marker. Trailing characters that could be the
/// start of a marker split across chunks are carried into the next scan.
#[derive(Debug)]
pub struct SentinelDetector {
    marker: String,
    carry: String,
    terminated: bool,
}

impl SentinelDetector {
    pub fn new(marker: impl Into<String>) -> Self {
        let marker = marker.into();
        debug_assert!(!marker.is_empty(), "sentinel marker must not be empty");
        Self {
            marker,
            carry: String::new(),
            terminated: false,
        }
    }

    pub fn marker(&self) -> &str {
        &self.marker
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated
    }

    pub fn scan(&mut self, chunk: &str) -> Detection {
        if self.terminated {
            return Detection {
                content: String::new(),
                terminal: true,
            };
        }

        let mut window = std::mem::take(&mut self.carry);
        window.push_str(chunk);

        if let Some(idx) = window.find(&self.marker) {
            self.terminated = true;
            window.truncate(idx);
            return Detection {
                content: window,
                terminal: true,
            };
        }

        let held = self.partial_marker_len(&window);
        self.carry = window.split_off(window.len() - held);
        Detection {
            content: window,
            terminal: false,
        }
    }

    /// Release carried text when the body ends without a marker.
    pub fn finish(&mut self) -> String {
        std::mem::take(&mut self.carry)
    }

    /// Length of the longest suffix of `text` that is a proper prefix of the
    /// marker. Never more than `marker.len() - 1` bytes.
    fn partial_marker_len(&self, text: &str) -> usize {
        let max = self.marker.len().saturating_sub(1).min(text.len());
        (1..=max)
            .rev()
            .find(|&n| self.marker.is_char_boundary(n) && text.ends_with(&self.marker[..n]))
            .unwrap_or(0)
    }
}
