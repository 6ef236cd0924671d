//! Layout driver: pulls element lists from a content source, breaks them into
//! parts and paints each part, restarting when the inline extent changes.

use std::collections::VecDeque;

use log::{debug, trace, warn};

use crate::area::{AreaSink, LayoutListener, PaintContext};
use crate::breaking::BreakingAlgorithm;
use crate::config::{Alignment, BreakerConfig, BreakerKind, DisplayAlign, OverflowPolicy};
use crate::element::{BreakClass, ListElement, Position, SpaceRef};
use crate::error::BreakError;
use crate::geometry::GeometryProvider;
use crate::justify::justify_boxes;
use crate::page_break::{BreakOutcome, IpdChange, OverflowEvent, PageBreakPosition};
use crate::participant::{ContentSource, LayoutContext, RestartPoint};
use crate::sequence::{ends_with_forced_break, is_empty_box, BlockSequence};
use crate::space::{SpaceResolutions, SpaceResolver};

/// Summary of one [`Breaker::do_layout`] run.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LayoutReport {
    pub part_count: usize,
    pub sequence_count: usize,
    pub restarts: usize,
    pub overflows: Vec<OverflowEvent>,
    pub blank_parts: Vec<usize>,
    /// The content source produced nothing to lay out.
    pub is_empty: bool,
}

pub struct Breaker<'a> {
    config: BreakerConfig,
    source: &'a mut dyn ContentSource,
    geometry: &'a mut dyn GeometryProvider,
    sink: &'a mut dyn AreaSink,
    listener: Option<&'a mut dyn LayoutListener>,
    resolutions: SpaceResolutions,
    block_lists: VecDeque<BlockSequence>,
    part_offset: usize,
    report: LayoutReport,
}

impl<'a> Breaker<'a> {
    pub fn new(
        config: BreakerConfig,
        source: &'a mut dyn ContentSource,
        geometry: &'a mut dyn GeometryProvider,
        sink: &'a mut dyn AreaSink,
    ) -> Self {
        Self {
            config,
            source,
            geometry,
            sink,
            listener: None,
            resolutions: SpaceResolutions::new(),
            block_lists: VecDeque::new(),
            part_offset: 0,
            report: LayoutReport::default(),
        }
    }

    pub fn with_listener(mut self, listener: &'a mut dyn LayoutListener) -> Self {
        self.listener = Some(listener);
        self
    }

    /// Index of the next part to be filled.
    pub fn part_offset(&self) -> usize {
        self.part_offset
    }

    pub fn resolutions(&self) -> &SpaceResolutions {
        &self.resolutions
    }

    /// Lays out all remaining content. `flow_bpd` is the extent of every part
    /// for block containers and static content; page breaking asks the
    /// geometry provider per part. With `auto_height` each sequence becomes a
    /// single part sized to its content.
    pub fn do_layout(&mut self, flow_bpd: i32, auto_height: bool) -> Result<LayoutReport, BreakError> {
        self.config.validate()?;
        self.report = LayoutReport::default();
        let first_part = self.part_offset;
        let mut ctx = LayoutContext {
            stack_limit: flow_bpd,
            ref_ipd: self.geometry.inline_extent(self.part_offset),
            part_index: self.part_offset,
            alignment: self.config.alignment(),
        };

        let mut next_starts_on = BreakClass::Any;
        let mut empty = true;
        while !self.source.is_finished() {
            self.block_lists.clear();
            next_starts_on = self.next_block_list(&mut ctx, next_starts_on, None, None)?;
            empty &= self.block_lists.is_empty();

            while let Some(block_list) = self.block_lists.pop_front() {
                self.report.sequence_count += 1;
                self.observe("breaker", block_list.elements());
                let start_part = self.start_part_for(block_list.start_on)?;
                let outcome = self.run_algorithm(&block_list, start_part, flow_bpd, auto_height)?;

                if let Some(change) = outcome.ipd_change {
                    next_starts_on = self.handle_ipd_change(
                        &mut ctx,
                        &block_list,
                        &outcome,
                        change,
                        next_starts_on,
                        start_part,
                        flow_bpd,
                    )?;
                    continue;
                }

                if ctx.alignment == Alignment::Justify && !auto_height {
                    let effective = self.justified_sequence(&ctx, &block_list, &outcome)?;
                    let outcome =
                        self.run_algorithm(&effective, start_part, flow_bpd, auto_height)?;
                    if let Some(change) = outcome.ipd_change {
                        next_starts_on = self.handle_ipd_change(
                            &mut ctx,
                            &effective,
                            &outcome,
                            change,
                            next_starts_on,
                            start_part,
                            flow_bpd,
                        )?;
                        continue;
                    }
                    self.add_areas(&effective, &outcome, start_part, flow_bpd)?;
                } else {
                    self.add_areas(&block_list, &outcome, start_part, flow_bpd)?;
                }
                self.release_painted_spaces();
            }
        }

        self.sink.finish()?;
        self.report.is_empty = empty;
        self.report.part_count = self.part_offset - first_part;
        debug!(
            "layout finished: {} parts from {} sequences, {} restarts",
            self.report.part_count, self.report.sequence_count, self.report.restarts
        );
        Ok(self.report.clone())
    }

    fn observe(&mut self, stage: &'static str, elements: &[ListElement]) {
        if let Some(listener) = self.listener.as_deref_mut() {
            listener.observe_list(stage, elements);
        }
    }

    fn resolve(&mut self, elements: Vec<ListElement>) -> Vec<ListElement> {
        SpaceResolver::new(&mut self.resolutions).resolve_element_list(elements)
    }

    /// Forgets resolved windows no queued sequence refers to any more.
    fn release_painted_spaces(&mut self) {
        let keep = self
            .block_lists
            .iter()
            .flat_map(|seq| seq.elements())
            .filter_map(|el| el.position.space.slot())
            .min()
            .unwrap_or_else(|| self.resolutions.next_slot());
        self.resolutions.release_before(keep);
    }

    /// Fetches the next element list, cuts it at its trailing forced break and
    /// queues it as a block sequence. Returns the start-on class for the
    /// sequence after it.
    fn next_block_list(
        &mut self,
        ctx: &mut LayoutContext,
        starts_on: BreakClass,
        restart: Option<RestartPoint>,
        first_elements: Option<Vec<ListElement>>,
    ) -> Result<BreakClass, BreakError> {
        ctx.part_index = self.part_offset;
        ctx.ref_ipd = self.geometry.inline_extent(self.part_offset);

        let mut list = match (first_elements, restart) {
            (None, _) => {
                let raw = self.source.next_elements(ctx, None)?;
                self.observe("source", &raw);
                self.resolve(raw)
            }
            (Some(first), None) => first,
            (Some(mut first), Some(point)) => {
                let raw = self.source.next_elements(ctx, Some(&point))?;
                self.observe("source", &raw);
                first.extend(self.resolve(raw));
                first
            }
        };
        if list.is_empty() {
            return Ok(starts_on);
        }

        let mut next_starts_on = starts_on;
        let mut break_position = Position::NONE;
        if ends_with_forced_break(&list) {
            if let Some(forced) = list.pop() {
                break_position = forced.position;
                next_starts_on = forced.break_class();
            }
        }
        if is_empty_box(&list) {
            list.pop();
        }

        let seq = BlockSequence::from_elements(starts_on, self.config.display_align, list)
            .end_sequence(break_position, self.config.favors_single_part());
        if let Some(seq) = seq {
            trace!("queued block sequence of {} elements", seq.len());
            self.block_lists.push_back(seq);
        }
        Ok(next_starts_on)
    }

    /// First part a sequence may use, after emitting blank parts its start-on
    /// class requires.
    fn start_part_for(&mut self, start_on: BreakClass) -> Result<usize, BreakError> {
        let mut part = self.part_offset;
        if matches!(
            start_on,
            BreakClass::Page | BreakClass::OddPage | BreakClass::EvenPage
        ) {
            let slot = self.geometry.part_slot(part);
            if slot.column != 0 {
                part = self.skip_parts(part, slot.remaining_columns())?;
            }
            if start_on != BreakClass::Page {
                let slot = self.geometry.part_slot(part);
                let odd = (slot.page_index + 1) % 2 == 1;
                if odd != (start_on == BreakClass::OddPage) {
                    part = self.skip_parts(part, slot.column_count)?;
                }
            }
        }
        self.part_offset = part;
        Ok(part)
    }

    fn skip_parts(&mut self, from: usize, count: usize) -> Result<usize, BreakError> {
        for part in from..from + count {
            let slot = self.geometry.part_slot(part);
            debug!("leaving part {} blank", part);
            self.sink.blank_part(part, slot)?;
            self.report.blank_parts.push(part);
        }
        Ok(from + count)
    }

    fn run_algorithm(
        &mut self,
        seq: &BlockSequence,
        start_part: usize,
        flow_bpd: i32,
        auto_height: bool,
    ) -> Result<BreakOutcome, BreakError> {
        let mut alg = if auto_height {
            BreakingAlgorithm::with_constant_width(&self.config, natural_extent(seq))
        } else if self.config.kind == BreakerKind::Page {
            BreakingAlgorithm::with_geometry(&self.config, &mut *self.geometry)
        } else {
            BreakingAlgorithm::with_constant_width(&self.config, flow_bpd)
        };
        let parts = alg.find_breaking_points(seq, start_part, true)?;
        trace!("sequence broken into {} parts from part {}", parts, start_part);
        Ok(alg.outcome(parts))
    }

    fn justified_sequence(
        &mut self,
        ctx: &LayoutContext,
        seq: &BlockSequence,
        outcome: &BreakOutcome,
    ) -> Result<BlockSequence, BreakError> {
        let changed = justify_boxes(&mut *self.source, ctx, seq, &outcome.breaks)?;
        let resolved = self.resolve(changed);
        self.observe("justified", &resolved);
        let break_position = seq.last().map_or(Position::NONE, |el| el.position);
        let effective = BlockSequence::from_elements(seq.start_on, seq.display_align, resolved)
            .end_sequence(break_position, self.config.favors_single_part());
        Ok(effective.unwrap_or_else(|| seq.clone()))
    }

    /// Paints the parts decided before an inline-extent change and queues the
    /// rest of the content, regenerated for the new geometry.
    #[allow(clippy::too_many_arguments)]
    fn handle_ipd_change(
        &mut self,
        ctx: &mut LayoutContext,
        seq: &BlockSequence,
        outcome: &BreakOutcome,
        change: IpdChange,
        pending_starts_on: BreakClass,
        start_part: usize,
        flow_bpd: i32,
    ) -> Result<BreakClass, BreakError> {
        let elements = seq.elements();
        let at_break = elements
            .get(change.position)
            .ok_or_else(|| BreakError::UnsupportedRestartPosition {
                detail: format!("no element at index {}", change.position),
            })?;
        let mut restart = Some(original_break_position(at_break)?);
        let mut first_elements = Vec::new();
        let mut reopen = false;

        let table = self.source.participants();
        if restart.is_some_and(|position| table.contains_non_restartable(&position)) {
            if change.difference > 0 {
                warn!("non-restartable content flows into a narrower part and keeps its extent");
            }
            let content_end = elements.len().saturating_sub(seq.ignore_at_end());
            let mut box_found = false;
            let mut boundary = None;
            for el in &elements[(change.position + 1).min(content_end)..content_end] {
                if !el.position.is_none() && !table.contains_non_restartable(&el.position) {
                    boundary = Some(el);
                    break;
                }
                box_found |= el.is_box();
                if box_found {
                    first_elements.push(el.clone());
                }
            }
            restart = boundary.map(original_break_position).transpose()?;
            if restart.is_some() {
                // everything after the last carried box is generated again
                while first_elements
                    .last()
                    .is_some_and(|el| !el.is_box() || el.auxiliary)
                {
                    first_elements.pop();
                }
                reopen = true;
            }
        }
        debug!(
            "restarting after element {} at {:?} with {} carried elements",
            change.position,
            restart,
            first_elements.len()
        );

        self.add_areas(seq, outcome, start_part, flow_bpd)?;
        self.report.restarts += 1;
        if let Some(listener) = self.listener.as_deref_mut() {
            listener.restarted(self.part_offset, &change);
        }
        self.geometry.discard_cache_starting_with(self.part_offset);
        self.block_lists.clear();

        let point = restart.map(|position| RestartPoint { position, reopen });
        let next = self.next_block_list(ctx, BreakClass::Column, point, Some(first_elements))?;
        self.release_painted_spaces();
        Ok(if point.is_some() {
            next
        } else {
            pending_starts_on
        })
    }

    fn add_areas(
        &mut self,
        seq: &BlockSequence,
        outcome: &BreakOutcome,
        first_part: usize,
        flow_bpd: i32,
    ) -> Result<(), BreakError> {
        let elements = seq.elements();
        let len = elements.len();
        let part_count = outcome.breaks.len();
        let mut start = 0;
        let mut last_break: Option<usize> = None;

        for (p, pbp) in outcome.breaks.iter().enumerate() {
            let part_index = first_part + p;
            let notification_end = pbp.leaf_pos.min(len.saturating_sub(1));
            let mut end = Some(notification_end);
            if notification_end + 1 == len {
                end = notification_end.checked_sub(seq.ignore_at_end());
            }
            if let Some(index) = end {
                if elements[index].is_glue() {
                    end = index.checked_sub(1);
                }
            }
            start = seq.first_box_index(start);

            let range = end.filter(|end| start <= *end).map(|end| start..=end);
            let is_last_part = p + 1 == part_count;
            let paint =
                self.paint_context(seq, range.clone(), pbp, part_index, is_last_part, flow_bpd);
            match range {
                Some(range) => {
                    let notifications = self.resolutions.conditionals_notification(
                        elements,
                        *range.start(),
                        notification_end,
                        last_break,
                    );
                    for notification in &notifications {
                        self.source.notify_space(notification);
                    }
                    let part = &elements[range];
                    self.sink.paint(part, &paint)?;
                    if let Some(listener) = self.listener.as_deref_mut() {
                        listener.part_painted(part_index, part);
                    }
                }
                None => {
                    trace!("part {} is empty", part_index);
                    self.sink.empty_part(&paint)?;
                }
            }

            if pbp.overflow > 0 {
                self.report_overflow(OverflowEvent {
                    part_index,
                    amount: pbp.overflow,
                })?;
            }
            last_break = Some(pbp.leaf_pos);
            start = pbp.leaf_pos + 1;
        }
        self.part_offset = first_part + part_count;
        Ok(())
    }

    fn paint_context(
        &mut self,
        seq: &BlockSequence,
        range: Option<core::ops::RangeInclusive<usize>>,
        pbp: &PageBreakPosition,
        part_index: usize,
        is_last_part: bool,
        flow_bpd: i32,
    ) -> PaintContext {
        let available_extent = if self.config.kind == BreakerKind::Page {
            self.geometry.available_extent(part_index)
        } else {
            flow_bpd
        };
        let inline_extent = self.geometry.inline_extent(part_index);
        let slot = self.geometry.part_slot(part_index);
        let part = range.map_or(&[][..], |range| &seq.elements()[range]);
        let difference = pbp.difference.max(0);

        let mut space_before = 0;
        let mut space_after = 0;
        let mut inline_limit = inline_extent;
        match seq.display_align {
            DisplayAlign::Center => space_before = difference / 2,
            DisplayAlign::After => space_before = difference,
            DisplayAlign::Distribute if !is_last_part => {
                let boxes = part.iter().filter(|el| el.is_box() && el.width > 0).count() as i32;
                if boxes >= 2 {
                    space_after = difference / (boxes - 1);
                }
            }
            DisplayAlign::Fill => {
                let average = average_line_length(part);
                if average > 0 {
                    inline_limit = average;
                }
            }
            _ => {}
        }

        PaintContext {
            part_index,
            slot,
            available_extent,
            inline_extent,
            display_align: seq.display_align,
            adjust_ratio: pbp.bpd_adjust,
            space_before,
            space_after,
            stack_limit: inline_limit,
            difference: pbp.difference,
            is_last_part,
        }
    }

    fn report_overflow(&mut self, event: OverflowEvent) -> Result<(), BreakError> {
        warn!(
            "content overflows part {} by {} mpt",
            event.part_index, event.amount
        );
        self.report.overflows.push(event);
        if let Some(listener) = self.listener.as_deref_mut() {
            listener.overflow(&event);
        }
        match self.config.overflow_policy {
            OverflowPolicy::Clip => Ok(()),
            OverflowPolicy::Error => Err(BreakError::Overflow {
                part_index: event.part_index,
                amount: event.amount,
            }),
        }
    }
}

/// The position a resolved break penalty was created from.
fn original_break_position(el: &ListElement) -> Result<Position, BreakError> {
    match el.position.space {
        SpaceRef::Break(_) => Ok(el.position.original()),
        _ => Err(BreakError::UnsupportedRestartPosition {
            detail: el.to_string(),
        }),
    }
}

/// Natural extent of a sequence's content, used for auto-height parts.
fn natural_extent(seq: &BlockSequence) -> i32 {
    seq.content()
        .iter()
        .filter(|el| el.is_box() || el.is_glue())
        .map(|el| el.width)
        .sum()
}

/// Average line length of the block boxes in a part, raised to the greatest
/// minimum inline extent any of them accepts.
fn average_line_length(part: &[ListElement]) -> i32 {
    let mut count = 0i64;
    let mut accumulated = 0i64;
    let mut greatest_minimum = 0;
    for (width, info) in part
        .iter()
        .filter_map(|el| el.block_info().map(|info| (el.width, info)))
    {
        if width > 0 {
            count += 1;
            accumulated += i64::from(info.line_length);
        }
        greatest_minimum = greatest_minimum.max(info.ipd_range.min);
    }
    if count == 0 || accumulated == 0 {
        return 0;
    }
    ((accumulated / count) as i32).max(greatest_minimum)
}
