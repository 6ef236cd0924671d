//! Output side of the breaker: where parts are painted and who hears about
//! layout events.

use crate::config::DisplayAlign;
use crate::element::ListElement;
use crate::error::BreakError;
use crate::geometry::PartSlot;
use crate::page_break::{IpdChange, OverflowEvent};

/// How the elements of one part are to be placed.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PaintContext {
    pub part_index: usize,
    pub slot: PartSlot,
    pub available_extent: i32,
    pub inline_extent: i32,
    pub display_align: DisplayAlign,
    /// Ratio to apply to glue: stretch when positive, shrink when negative.
    pub adjust_ratio: f64,
    /// Extent to leave empty before the first element.
    pub space_before: i32,
    /// With `Distribute`, extent inserted after every non-empty box except
    /// the last one.
    pub space_after: i32,
    /// Stacking limit for block content; narrower than the part for `Fill`.
    pub stack_limit: i32,
    pub difference: i32,
    pub is_last_part: bool,
}

pub trait AreaSink {
    /// Places the elements of one part.
    fn paint(&mut self, elements: &[ListElement], ctx: &PaintContext) -> Result<(), BreakError>;

    /// A part got no content (its break fell before any box).
    fn empty_part(&mut self, ctx: &PaintContext) -> Result<(), BreakError>;

    /// A part was skipped to honor a start-on constraint.
    fn blank_part(&mut self, part_index: usize, slot: PartSlot) -> Result<(), BreakError>;

    fn finish(&mut self) -> Result<(), BreakError> {
        Ok(())
    }
}

/// Observer of layout decisions. Every method has an empty default.
pub trait LayoutListener {
    fn overflow(&mut self, _event: &OverflowEvent) {}

    fn restarted(&mut self, _part_index: usize, _change: &IpdChange) {}

    fn part_painted(&mut self, _part_index: usize, _elements: &[ListElement]) {}

    /// An element list reached a named stage of the pipeline.
    fn observe_list(&mut self, _stage: &'static str, _elements: &[ListElement]) {}
}
