//! Results of one breaking run.

/// A chosen break: the part ending at `leaf_pos` and how it fits.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PageBreakPosition {
    /// Index of the element the part ends at.
    pub leaf_pos: usize,
    /// Adjustment ratio applied when painting; zero unless justifying or the
    /// part only fits by shrinking.
    pub bpd_adjust: f64,
    /// Unused extent of the part; negative when content is too long.
    pub difference: i32,
    /// Extent the part could not absorb even at full shrink.
    pub overflow: i32,
    /// Lines (elements between breaks) in the part, counted from 1.
    pub line: usize,
}

/// Content that did not fit its part.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OverflowEvent {
    pub part_index: usize,
    pub amount: i32,
}

/// The best break before an inline-extent change, where layout has to stop
/// and restart with new geometry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IpdChange {
    /// Positive when the following part is narrower.
    pub difference: i8,
    pub position: usize,
    pub line: usize,
}

/// Everything the driver needs from a finished breaking run.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BreakOutcome {
    pub part_count: usize,
    pub breaks: Vec<PageBreakPosition>,
    pub ipd_change: Option<IpdChange>,
}
