//! Streaming line splitter for received projector data
//!
//! Replies arrive in arbitrary chunks. The codec buffers them and yields one
//! reply line per terminator (ETX for serial, CR for IP), with the serial STX
//! and any stray CR/LF stripped.

use tracing::warn;

use crate::framing::{ETX, STX};
use crate::{ProtocolCodec, TransportVariant};

/// Maximum reply length (reasonable limit to prevent unbounded buffering)
const MAX_LINE_LEN: usize = 256;

/// Streaming reply codec for one transport variant
pub struct LineCodec {
    terminator: u8,
    buffer: Vec<u8>,
}

impl LineCodec {
    /// Create a new codec splitting on the variant's terminator
    pub fn new(variant: TransportVariant) -> Self {
        Self {
            terminator: variant.terminator(),
            buffer: Vec::with_capacity(MAX_LINE_LEN),
        }
    }

    /// Extract the next non-empty reply line
    pub fn next_line(&mut self) -> Option<String> {
        self.next_frame()
    }

    /// Extract the next non-empty reply line and the raw bytes it consumed
    pub fn next_line_with_bytes(&mut self) -> Option<(String, Vec<u8>)> {
        self.next_frame_with_bytes()
    }

    fn clean(raw: &[u8]) -> String {
        let body: Vec<u8> = raw
            .iter()
            .copied()
            .filter(|&b| !matches!(b, STX | ETX | b'\r' | b'\n'))
            .collect();
        String::from_utf8_lossy(&body).trim().to_string()
    }
}

impl ProtocolCodec for LineCodec {
    type Frame = String;

    fn push_bytes(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);

        // A reply this long without a terminator is garbage; keep only the tail
        if self.buffer.len() > MAX_LINE_LEN * 4 {
            let start = self.buffer.len() - MAX_LINE_LEN;
            warn!(
                "Discarding {} unterminated bytes from receive buffer",
                start
            );
            self.buffer = self.buffer[start..].to_vec();
        }
    }

    fn next_frame(&mut self) -> Option<Self::Frame> {
        self.next_frame_with_bytes().map(|(line, _)| line)
    }

    fn next_frame_with_bytes(&mut self) -> Option<(Self::Frame, Vec<u8>)> {
        loop {
            let term_pos = self.buffer.iter().position(|&b| b == self.terminator)?;
            let raw: Vec<u8> = self.buffer.drain(..=term_pos).collect();
            let line = Self::clean(&raw);
            if !line.is_empty() {
                return Some((line, raw));
            }
        }
    }

    fn clear(&mut self) {
        self.buffer.clear();
    }
}
