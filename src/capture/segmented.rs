//! Segmented (batch) acquisition.
//!
//! In batch mode the scope records `segments` consecutive trigger-aligned windows of
//! `sample_count` samples into one continuous capture buffer. This adapter programs the
//! segment count and splits whatever the driver hands back into per-trigger traces.
//!
//! The adapter owns no hardware handle; [`super::CaptureController`] lends it the scope
//! for each call.

use anyhow::anyhow;
use tracing::{debug, warn};

use super::CaptureWarning;
use crate::error::AppResult;
use crate::hardware::{ScopeDriver, Trace};

/// Batch-capture geometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentedCapture {
    segments: u32,
    sample_count: u32,
}

impl SegmentedCapture {
    pub fn new(segments: u32, sample_count: u32) -> Self {
        Self {
            segments,
            sample_count,
        }
    }

    /// Program the segment count.
    pub fn configure<S: ScopeDriver + ?Sized>(&self, scope: &mut S) -> AppResult<()> {
        debug!(segments = self.segments, samples = self.sample_count, "Configuring batch capture");
        scope.set_segment_count(self.segments)?;
        Ok(())
    }

    /// Capture all segments and return them in trigger order.
    ///
    /// A hardware timeout is reported as a warning. A buffer whose shape does not match
    /// the configured geometry is a communication fault.
    pub fn capture_and_transfer<S: ScopeDriver + ?Sized>(
        &self,
        scope: &mut S,
    ) -> AppResult<(Vec<Trace>, Vec<CaptureWarning>)> {
        let mut warnings = Vec::new();
        if scope.capture(true)? {
            warn!("Timeout happened during batch capture");
            warnings.push(CaptureWarning::HardwareTimeout);
        }

        let raw = scope.captured_segments()?;
        let traces = self.split(raw)?;
        Ok((traces, warnings))
    }

    fn split(&self, mut raw: Vec<Trace>) -> AppResult<Vec<Trace>> {
        let samples = self.sample_count as usize;
        let segments = self.segments as usize;

        if raw.len() == segments && raw.iter().all(|t| t.len() == samples) {
            return Ok(raw);
        }

        // One continuous window holding every segment back to back.
        if raw.len() == 1 && raw[0].len() == samples * segments {
            let window = raw.remove(0);
            return Ok(window.chunks_exact(samples).map(<[u16]>::to_vec).collect());
        }

        Err(anyhow!(
            "Batch capture returned {} buffer(s) of lengths {:?}, expected {} x {} samples",
            raw.len(),
            raw.iter().map(Vec::len).collect::<Vec<_>>(),
            segments,
            samples
        )
        .into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::mock::MockScope;

    #[test]
    fn configure_programs_the_segment_count() {
        let mut scope = MockScope::new();
        SegmentedCapture::new(4, 201).configure(&mut scope).unwrap();
        assert_eq!(scope.settings().segment_count, Some(4));
    }

    #[test]
    fn splits_continuous_window_in_trigger_order() {
        let adapter = SegmentedCapture::new(3, 2);
        let traces = adapter.split(vec![vec![1, 2, 3, 4, 5, 6]]).unwrap();
        assert_eq!(traces, vec![vec![1, 2], vec![3, 4], vec![5, 6]]);
    }

    #[test]
    fn passes_through_per_segment_buffers() {
        let adapter = SegmentedCapture::new(2, 3);
        let traces = adapter.split(vec![vec![1, 1, 1], vec![2, 2, 2]]).unwrap();
        assert_eq!(traces.len(), 2);
    }

    #[test]
    fn rejects_mismatched_geometry() {
        let adapter = SegmentedCapture::new(2, 3);
        assert!(adapter.split(vec![vec![1, 1, 1]]).is_err());
        assert!(adapter.split(vec![vec![1, 1], vec![2, 2]]).is_err());
    }
}
