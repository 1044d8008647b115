//! One-second PCM loop and its playback cursor

use crate::audio::AudioFormat;

/// Owned, read-only interleaved PCM holding exactly one second of audio
///
/// Length is always `sample_rate * channels * bytes_per_sample`.
pub struct AudioBuffer {
    format: AudioFormat,
    data: Box<[u8]>,
}

impl AudioBuffer {
    pub(crate) fn from_pcm(format: AudioFormat, data: Box<[u8]>) -> Self {
        debug_assert_eq!(data.len(), format.bytes_per_second());
        Self { format, data }
    }

    pub fn format(&self) -> AudioFormat {
        self.format
    }

    pub fn len_bytes(&self) -> usize {
        self.data.len()
    }

    /// Number of sample-frames (one second's worth)
    pub fn frame_count(&self) -> usize {
        self.data.len() / self.format.block_align as usize
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Bytes for `frames` sample-frames starting at the cursor
    ///
    /// Returns `None` if the span would run past the end of the buffer.
    pub fn window(&self, cursor: &PlaybackCursor, frames: u32) -> Option<&[u8]> {
        let start = cursor.offset();
        let end = start.checked_add(self.format.frames_to_bytes(frames))?;
        self.data.get(start..end)
    }

    /// Decode one sample as a signed integer
    ///
    /// # Panics
    /// Panics if `frame` or `channel` is out of range
    pub fn sample(&self, frame: usize, channel: usize) -> i32 {
        let width = self.format.bytes_per_sample();
        let start = frame * self.format.block_align as usize + channel * width;
        let bytes = &self.data[start..start + width];

        match width {
            2 => i16::from_le_bytes([bytes[0], bytes[1]]) as i32,
            // Sign-extend packed 24-bit
            3 => i32::from_le_bytes([0, bytes[0], bytes[1], bytes[2]]) >> 8,
            _ => i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
        }
    }
}

impl std::fmt::Debug for AudioBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioBuffer")
            .field("format", &self.format)
            .field("len_bytes", &self.data.len())
            .finish()
    }
}

/// Byte offset into an [`AudioBuffer`], always frame-aligned and in bounds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaybackCursor {
    offset: usize,
    stride: usize,
    end: usize,
}

impl PlaybackCursor {
    /// Cursor at the start of `buffer`
    pub fn new(buffer: &AudioBuffer) -> Self {
        Self {
            offset: 0,
            stride: buffer.format().block_align as usize,
            end: buffer.len_bytes(),
        }
    }

    /// Current byte offset
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Current position in sample-frames
    pub fn frame(&self) -> usize {
        self.offset / self.stride
    }

    /// Advance by `frames` sample-frames, wrapping at the buffer end
    ///
    /// Returns true if the cursor wrapped.
    pub fn advance(&mut self, frames: u32) -> bool {
        if self.end == 0 {
            return false;
        }
        let next = self.offset + frames as usize * self.stride;
        self.offset = next % self.end;
        next >= self.end
    }
}
