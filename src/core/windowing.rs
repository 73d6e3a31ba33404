//! Fixed-size, fixed-stride windowing over sensor samples.
//!
//! Windows start at offsets `0, stride, 2*stride, ...` and are only produced
//! when all `window_size` samples are available. Trailing partial windows are
//! dropped, never padded. Overlap happens whenever `stride < window_size`.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::config::ConfigError;
use crate::source::{SensorSample, SessionTable};

/// Validated window geometry, in samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowSpec {
    window_size: usize,
    stride: usize,
}

impl WindowSpec {
    /// Both `window_size` and `stride` must be positive.
    pub fn new(window_size: usize, stride: usize) -> Result<Self, ConfigError> {
        if window_size == 0 {
            return Err(ConfigError::Invalid("window_size must be > 0".to_string()));
        }
        if stride == 0 {
            return Err(ConfigError::Invalid("stride must be > 0".to_string()));
        }
        Ok(Self {
            window_size,
            stride,
        })
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    /// Number of full windows in a sequence of `n` samples.
    pub fn window_count(&self, n: usize) -> usize {
        if n < self.window_size {
            0
        } else {
            (n - self.window_size) / self.stride + 1
        }
    }
}

impl Default for WindowSpec {
    fn default() -> Self {
        Self {
            window_size: 200,
            stride: 100,
        }
    }
}

/// A contiguous run of `window_size` samples borrowed from a session.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Window<'a> {
    /// Offset of the first sample in the session
    pub start: usize,
    samples: &'a [SensorSample],
}

impl<'a> Window<'a> {
    pub fn new(start: usize, samples: &'a [SensorSample]) -> Self {
        Self { start, samples }
    }

    pub fn samples(&self) -> &'a [SensorSample] {
        self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// The window's label is the label of its first sample.
    pub fn label(&self) -> Option<i32> {
        self.samples.first().map(|s| s.label)
    }
}

/// Slice a session into windows.
///
/// Returns an empty vector when the session is shorter than one window.
pub fn generate_windows(table: &SessionTable, spec: WindowSpec) -> Vec<Window<'_>> {
    windows_over(table.samples(), spec)
}

/// Slice any sample sequence into windows.
pub fn windows_over(samples: &[SensorSample], spec: WindowSpec) -> Vec<Window<'_>> {
    (0..spec.window_count(samples.len()))
        .map(|i| {
            let start = i * spec.stride;
            Window::new(start, &samples[start..start + spec.window_size])
        })
        .collect()
}

/// A window owned by a [`SampleBuffer`].
#[derive(Debug, Clone, PartialEq)]
pub struct BufferedWindow {
    /// Offset of the first sample in the stream seen by the buffer
    pub start: usize,
    pub samples: Vec<SensorSample>,
}

impl BufferedWindow {
    pub fn as_window(&self) -> Window<'_> {
        Window::new(self.start, &self.samples)
    }
}

/// Collects live samples into windows as they arrive.
///
/// Fed the samples of a session one by one, the buffer completes exactly
/// the windows [`generate_windows`] returns for the whole session.
pub struct SampleBuffer {
    spec: WindowSpec,
    /// Samples of the window currently being filled
    pending: VecDeque<SensorSample>,
    /// Completed windows ready for processing
    completed: Vec<BufferedWindow>,
    /// Samples to drop before the next window starts (stride > window_size)
    to_skip: usize,
    /// Stream offset of the first pending sample
    next_start: usize,
}

impl SampleBuffer {
    pub fn new(spec: WindowSpec) -> Self {
        Self {
            spec,
            pending: VecDeque::with_capacity(spec.window_size),
            completed: Vec::new(),
            to_skip: 0,
            next_start: 0,
        }
    }

    pub fn spec(&self) -> WindowSpec {
        self.spec
    }

    /// Process an incoming sample.
    pub fn push(&mut self, sample: SensorSample) {
        if self.to_skip > 0 {
            self.to_skip -= 1;
            return;
        }

        self.pending.push_back(sample);
        if self.pending.len() < self.spec.window_size {
            return;
        }

        self.completed.push(BufferedWindow {
            start: self.next_start,
            samples: self.pending.iter().copied().collect(),
        });

        if self.spec.stride <= self.spec.window_size {
            self.pending.drain(..self.spec.stride);
        } else {
            self.pending.clear();
            self.to_skip = self.spec.stride - self.spec.window_size;
        }
        self.next_start += self.spec.stride;
    }

    /// Get and remove completed windows.
    pub fn take_completed_windows(&mut self) -> Vec<BufferedWindow> {
        std::mem::take(&mut self.completed)
    }

    /// Check if there are completed windows available.
    pub fn has_completed_windows(&self) -> bool {
        !self.completed.is_empty()
    }

    /// Number of samples buffered toward the next window.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Drop partial and completed state; the next sample starts a new stream.
    pub fn clear(&mut self) {
        self.pending.clear();
        self.completed.clear();
        self.to_skip = 0;
        self.next_start = 0;
    }
}
