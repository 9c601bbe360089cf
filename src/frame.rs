//! Opaque telemetry frame production.
//!
//! The harness never interprets frame contents; it only needs realistic-sized
//! bytes to carry in the envelope payload. The real deployments publish
//! synchrophasor data frames produced by an external codec behind the
//! [`FrameSource`] seam.

/// Produces the opaque frame bytes carried in each published envelope.
pub trait FrameSource: Send {
    fn next_frame(&mut self) -> Vec<u8>;
}

/// Deterministic stand-in for the external synchrophasor codec.
///
/// Emits a fixed-layout 64-byte frame: a sync word, a frame counter, and a
/// repeating filler pattern. Size and shape approximate a single-PMU data
/// frame so burst bandwidth is representative.
pub struct SyntheticTelemetryFrame {
    counter: u32,
}

/// IEEE C37.118 data-frame sync word
const SYNC_WORD: [u8; 2] = [0xaa, 0x01];
const FRAME_LEN: usize = 64;

impl SyntheticTelemetryFrame {
    pub fn new() -> Self {
        Self { counter: 0 }
    }
}

impl Default for SyntheticTelemetryFrame {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameSource for SyntheticTelemetryFrame {
    fn next_frame(&mut self) -> Vec<u8> {
        let mut frame = Vec::with_capacity(FRAME_LEN);
        frame.extend_from_slice(&SYNC_WORD);
        frame.extend_from_slice(&(FRAME_LEN as u16).to_be_bytes());
        frame.extend_from_slice(&self.counter.to_be_bytes());
        while frame.len() < FRAME_LEN {
            frame.push((frame.len() % 251) as u8);
        }
        self.counter = self.counter.wrapping_add(1);
        frame
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_layout() {
        let mut source = SyntheticTelemetryFrame::new();
        let frame = source.next_frame();
        assert_eq!(frame.len(), FRAME_LEN);
        assert_eq!(&frame[0..2], &SYNC_WORD);
        assert_eq!(&frame[2..4], &(FRAME_LEN as u16).to_be_bytes());
    }

    #[test]
    fn test_frame_counter_advances() {
        let mut source = SyntheticTelemetryFrame::new();
        let first = source.next_frame();
        let second = source.next_frame();
        assert_eq!(&first[4..8], &0u32.to_be_bytes());
        assert_eq!(&second[4..8], &1u32.to_be_bytes());
        // Payload outside the counter is stable
        assert_eq!(&first[8..], &second[8..]);
    }
}
