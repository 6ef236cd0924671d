//! Justification pass: negotiates elastic space and line-count adjustments
//! with participants so that parts come out exactly full.

use log::debug;

use crate::element::{Adjustment, ListElement, MinOptMax};
use crate::error::BreakError;
use crate::page_break::PageBreakPosition;
use crate::participant::{ContentSource, LayoutContext, PendingAdjustment};
use crate::sequence::BlockSequence;

/// Walks the parts chosen by a first breaking run, asks participants to absorb
/// each part's leftover extent and returns the regenerated element list.
pub(crate) fn justify_boxes(
    source: &mut dyn ContentSource,
    ctx: &LayoutContext,
    seq: &BlockSequence,
    breaks: &[PageBreakPosition],
) -> Result<Vec<ListElement>, BreakError> {
    let elements = seq.elements();
    let content_end = elements.len().saturating_sub(seq.ignore_at_end());
    let mut index = 0;

    for pbp in breaks {
        while index < elements.len() && !elements[index].is_box() {
            let el = &elements[index];
            if el.is_glue() && !el.position.is_none() {
                source.discard_space(el.position);
            }
            index += 1;
        }

        let mut line_range = MinOptMax::ZERO;
        let mut space_range = MinOptMax::ZERO;
        let mut block_spaces: Vec<&ListElement> = Vec::new();
        let mut unconfirmed: Vec<&ListElement> = Vec::new();
        let mut line_glues: Vec<&ListElement> = Vec::new();
        let mut box_seen = false;
        let mut last = None;

        while index < elements.len() && index <= pbp.leaf_pos {
            let el = &elements[index];
            index += 1;
            last = Some(el);
            if el.is_glue() {
                match el.adjustment() {
                    Adjustment::SpaceBefore | Adjustment::SpaceAfter => unconfirmed.push(el),
                    Adjustment::LineNumber => {
                        line_range = line_range.plus_max(el.stretch()).minus_min(el.shrink());
                        line_glues.push(el);
                    }
                    _ => {}
                }
            } else if el.is_box() {
                if box_seen {
                    // spaces followed by a box in the same part are adjustable
                    for space in unconfirmed.drain(..) {
                        space_range = space_range
                            .plus_max(space.stretch())
                            .minus_min(space.shrink());
                        block_spaces.push(space);
                    }
                }
                box_seen = true;
            }
        }

        if let Some(el) = last {
            if el.is_penalty() && el.width > 0 {
                source.negotiate_adjustment(&PendingAdjustment {
                    position: el.position.original(),
                    adjustment: Adjustment::LineNumber,
                    amount: el.width,
                });
            }
        }

        // the part closing the sequence keeps its natural spacing
        if pbp.bpd_adjust == 0.0 || pbp.leaf_pos >= content_end {
            continue;
        }
        let difference = pbp.difference;
        let space_total = if difference > 0 {
            space_range.max
        } else {
            -space_range.min
        };
        let within_spaces = (difference > 0 && difference <= space_range.max)
            || (difference < 0 && difference >= space_range.min);
        let adjusted = if within_spaces {
            adjust_glues(source, &block_spaces, difference, space_total)
        } else {
            let line_total = if difference > 0 {
                line_range.max
            } else {
                -line_range.min
            };
            let by_lines = adjust_glues(source, &line_glues, difference, line_total);
            by_lines + adjust_glues(source, &block_spaces, difference - by_lines, space_total)
        };
        debug!(
            "justified part ending at {}: difference {} adjusted {}",
            pbp.leaf_pos, difference, adjusted
        );
    }

    source.changed_elements(&elements[..content_end], ctx)
}

/// Spreads `difference` over `glues` in proportion to their elasticity and
/// returns how much the participants accepted.
fn adjust_glues(
    source: &mut dyn ContentSource,
    glues: &[&ListElement],
    difference: i32,
    total: i32,
) -> i32 {
    if total == 0 || difference == 0 {
        return 0;
    }
    let mut adjusted = 0i32;
    let mut partial = 0i64;
    for glue in glues {
        partial += i64::from(if difference > 0 {
            glue.stretch()
        } else {
            glue.shrink()
        });
        let wanted = (partial * i64::from(difference) / i64::from(total)) as i32 - adjusted;
        adjusted += source.negotiate_adjustment(&PendingAdjustment {
            position: glue.position,
            adjustment: glue.adjustment(),
            amount: wanted,
        });
    }
    adjusted
}
