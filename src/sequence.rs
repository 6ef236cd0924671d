//! Block sequences: resolved element lists ready for breaking.

use core::ops::Deref;

use crate::config::DisplayAlign;
use crate::element::{BreakClass, ListElement, Position, FILLER_STRETCH, INFINITE};

/// A resolved element list plus the metadata the driver needs to break and
/// paint it.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BlockSequence {
    elements: Vec<ListElement>,
    pub start_on: BreakClass,
    pub display_align: DisplayAlign,
    ignore_at_end: usize,
}

impl BlockSequence {
    pub fn new(start_on: BreakClass, display_align: DisplayAlign) -> Self {
        Self {
            elements: Vec::new(),
            start_on,
            display_align,
            ignore_at_end: 0,
        }
    }

    pub fn from_elements(
        start_on: BreakClass,
        display_align: DisplayAlign,
        elements: Vec<ListElement>,
    ) -> Self {
        Self {
            elements,
            ..Self::new(start_on, display_align)
        }
    }

    pub fn elements(&self) -> &[ListElement] {
        &self.elements
    }

    pub fn ignore_at_end(&self) -> usize {
        self.ignore_at_end
    }

    /// Content elements, without the terminator appended by
    /// [`end_sequence`](Self::end_sequence).
    pub fn content(&self) -> &[ListElement] {
        let end = self.elements.len().saturating_sub(self.ignore_at_end);
        &self.elements[..end]
    }

    /// Index of the first box at or after `start`, or `len()` if none.
    pub fn first_box_index(&self, start: usize) -> usize {
        self.elements
            .iter()
            .enumerate()
            .skip(start)
            .find(|(_, el)| el.is_box())
            .map_or(self.elements.len(), |(index, _)| index)
    }

    /// Closes the sequence with the elements that make its end a legal,
    /// forced break. Returns `None` when nothing but discardable elements
    /// remain.
    pub fn end_sequence(mut self, break_position: Position, favor_single_part: bool) -> Option<Self> {
        while self.elements.last().is_some_and(|el| !el.is_box()) {
            self.elements.pop();
        }
        if self.elements.is_empty() {
            return None;
        }

        if favor_single_part {
            self.elements
                .push(ListElement::forced_break(BreakClass::Any, break_position));
            self.ignore_at_end = 1;
        } else {
            self.elements.push(ListElement::penalty(
                0,
                INFINITE,
                false,
                BreakClass::Any,
                Position::NONE,
            ));
            self.elements
                .push(ListElement::glue(0, FILLER_STRETCH, 0, Position::NONE));
            self.elements
                .push(ListElement::forced_break(BreakClass::Any, break_position));
            self.ignore_at_end = 3;
        }
        Some(self)
    }
}

impl Deref for BlockSequence {
    type Target = [ListElement];

    fn deref(&self) -> &[ListElement] {
        &self.elements
    }
}

pub fn ends_with_forced_break(elements: &[ListElement]) -> bool {
    elements.last().is_some_and(ListElement::is_forced_break)
}

/// A list made of one zero-width box.
pub fn is_empty_box(elements: &[ListElement]) -> bool {
    matches!(elements, [only] if only.is_box() && only.width == 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn boxes(widths: &[i32]) -> Vec<ListElement> {
        widths
            .iter()
            .map(|w| ListElement::new_box(*w, Position::NONE))
            .collect()
    }

    #[test]
    fn end_sequence_appends_filler_terminator() {
        let mut elements = boxes(&[100, 200]);
        elements.push(ListElement::glue(50, 0, 0, Position::NONE));
        let seq = BlockSequence::from_elements(BreakClass::Any, DisplayAlign::Before, elements)
            .end_sequence(Position::NONE, false)
            .unwrap();

        assert_eq!(seq.len(), 5);
        assert_eq!(seq.ignore_at_end(), 3);
        assert_eq!(seq[2].penalty_value(), Some(INFINITE));
        assert_eq!(seq[3].stretch(), FILLER_STRETCH);
        assert!(seq[4].is_forced_break());
        assert_eq!(seq.content().len(), 2);
    }

    #[test]
    fn end_sequence_single_part_uses_bare_forced_break() {
        let seq = BlockSequence::from_elements(
            BreakClass::Any,
            DisplayAlign::Before,
            boxes(&[100]),
        )
        .end_sequence(Position::NONE, true)
        .unwrap();
        assert_eq!(seq.len(), 2);
        assert_eq!(seq.ignore_at_end(), 1);
        assert!(seq[1].is_forced_break());
    }

    #[test]
    fn end_sequence_of_only_glue_is_none() {
        let elements = vec![
            ListElement::glue(10, 0, 0, Position::NONE),
            ListElement::forbidden_break(),
        ];
        let seq = BlockSequence::from_elements(BreakClass::Any, DisplayAlign::Before, elements);
        assert!(seq.end_sequence(Position::NONE, false).is_none());
    }

    #[test]
    fn first_box_index_skips_discardables() {
        let mut elements = vec![ListElement::glue(10, 0, 0, Position::NONE)];
        elements.extend(boxes(&[5]));
        let seq = BlockSequence::from_elements(BreakClass::Any, DisplayAlign::Before, elements);
        assert_eq!(seq.first_box_index(0), 1);
        assert_eq!(seq.first_box_index(2), 2);
    }

    #[test]
    fn empty_box_detection() {
        assert!(is_empty_box(&boxes(&[0])));
        assert!(!is_empty_box(&boxes(&[0, 0])));
        assert!(!is_empty_box(&boxes(&[3])));
    }
}
