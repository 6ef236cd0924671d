//! Stacked blocks of text and fixed-size objects as a [`ContentSource`].
//!
//! Paragraph line counts depend on the reference inline extent handed in by
//! the breaker, so restarting a flow after an inline-extent change really
//! changes the generated content.

use log::{debug, trace};
use serde::{Deserialize, Serialize};

use flowbreak::{
    Adjustment, Alignment, BlockBoxInfo, BorderPaddingSpec, BreakClass, BreakError,
    BreakPossibility, ContentSource, LayoutContext, ListElement, MinOptMax, ParticipantId,
    ParticipantTable, PendingAdjustment, Position, Precedence, RelSide, RestartPoint,
    SpaceNotification, SpaceSpec, SpecifierKind, INFINITE,
};

const DEFAULT_LINE_HEIGHT: i32 = 14_400;

/// Space on one edge of a block.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlowSpace {
    pub length: i32,
    /// Stretch and shrink allowed around `length`.
    pub elasticity: i32,
    pub precedence: i32,
    /// Forcing spaces are never merged away.
    pub force: bool,
    /// Kept at part boundaries instead of being discarded.
    pub retain: bool,
}

impl FlowSpace {
    pub fn new(length: i32) -> Self {
        Self {
            length,
            ..Self::default()
        }
    }

    pub fn elastic(length: i32, elasticity: i32) -> Self {
        Self {
            length,
            elasticity,
            ..Self::default()
        }
    }

    pub fn with_precedence(mut self, precedence: i32) -> Self {
        self.precedence = precedence;
        self
    }

    pub fn forcing(mut self) -> Self {
        self.force = true;
        self
    }

    pub fn retained(mut self) -> Self {
        self.retain = true;
        self
    }

    fn range(&self) -> MinOptMax {
        MinOptMax::new(
            self.length - self.elasticity,
            self.length,
            self.length + self.elasticity,
        )
    }

    fn spec(&self, side: RelSide) -> SpaceSpec {
        let precedence = if self.force {
            Precedence::Force
        } else {
            Precedence::Value(self.precedence)
        };
        let spec = SpaceSpec::new(side, self.range()).with_precedence(precedence);
        if self.retain {
            spec.retained()
        } else {
            spec
        }
    }
}

/// One block of a flow: a paragraph of text or a fixed-size object.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlowBlock {
    /// Inline extent the paragraph's text would take on a single line.
    pub text_extent: i32,
    /// Block extent of an unbreakable object; paragraphs leave this at zero.
    pub fixed_extent: i32,
    pub line_height: i32,
    pub space_before: FlowSpace,
    pub space_after: FlowSpace,
    pub border_before: i32,
    pub border_after: i32,
    pub padding_before: i32,
    pub padding_after: i32,
    /// Border and padding survive part boundaries.
    pub retain_border_padding: bool,
    pub break_before: Option<BreakClass>,
    pub keep_with_previous: bool,
    /// A layout restart may resume inside this block.
    pub restartable: bool,
    /// Lines that may be added when justifying.
    pub adjustable_lines: u32,
    /// Narrowest inline extent the block can be stacked into.
    pub min_inline_extent: i32,
}

impl Default for FlowBlock {
    fn default() -> Self {
        Self {
            text_extent: 0,
            fixed_extent: 0,
            line_height: DEFAULT_LINE_HEIGHT,
            space_before: FlowSpace::default(),
            space_after: FlowSpace::default(),
            border_before: 0,
            border_after: 0,
            padding_before: 0,
            padding_after: 0,
            retain_border_padding: false,
            break_before: None,
            keep_with_previous: false,
            restartable: true,
            adjustable_lines: 0,
            min_inline_extent: 0,
        }
    }
}

impl FlowBlock {
    pub fn paragraph(text_extent: i32, line_height: i32) -> Self {
        Self {
            text_extent,
            line_height,
            ..Self::default()
        }
    }

    pub fn fixed(extent: i32) -> Self {
        Self {
            fixed_extent: extent,
            ..Self::default()
        }
    }

    pub fn with_space_before(mut self, space: FlowSpace) -> Self {
        self.space_before = space;
        self
    }

    pub fn with_space_after(mut self, space: FlowSpace) -> Self {
        self.space_after = space;
        self
    }

    pub fn with_border(mut self, before: i32, after: i32) -> Self {
        self.border_before = before;
        self.border_after = after;
        self
    }

    pub fn with_padding(mut self, before: i32, after: i32) -> Self {
        self.padding_before = before;
        self.padding_after = after;
        self
    }

    pub fn with_break_before(mut self, class: BreakClass) -> Self {
        self.break_before = Some(class);
        self
    }

    pub fn keep_with_previous(mut self) -> Self {
        self.keep_with_previous = true;
        self
    }

    pub fn non_restartable(mut self) -> Self {
        self.restartable = false;
        self
    }

    pub fn with_adjustable_lines(mut self, lines: u32) -> Self {
        self.adjustable_lines = lines;
        self
    }

    pub fn with_min_inline_extent(mut self, extent: i32) -> Self {
        self.min_inline_extent = extent;
        self
    }

    fn is_fixed(&self) -> bool {
        self.fixed_extent > 0
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
struct Cursor {
    block: usize,
    line: usize,
    /// Only what follows the last line of `block` is left to emit.
    tail: bool,
}

/// How the lines of one block were generated last.
#[derive(Clone, Copy, Debug, Default)]
struct LineState {
    /// Text consumed by lines before `first_line`.
    consumed: i32,
    first_line: usize,
    ipd: i32,
    line_count: usize,
}

/// Extents granted during justification.
#[derive(Clone, Copy, Debug, Default)]
struct Negotiated {
    space_before: i32,
    space_after: i32,
    lines: i32,
}

pub struct BlockFlow {
    blocks: Vec<FlowBlock>,
    table: ParticipantTable,
    flow: ParticipantId,
    cursor: Cursor,
    lines: Vec<LineState>,
    negotiated: Vec<Negotiated>,
    resolved: Vec<(usize, SpaceNotification)>,
    discarded: Vec<Position>,
}

impl BlockFlow {
    pub fn new(blocks: Vec<FlowBlock>) -> Self {
        let mut table = ParticipantTable::new();
        let flow = table.register("flow", None, true);
        for (k, block) in blocks.iter().enumerate() {
            table.register(format!("block-{k}"), Some(flow), block.restartable);
        }
        let count = blocks.len();
        Self {
            blocks,
            table,
            flow,
            cursor: Cursor::default(),
            lines: vec![LineState::default(); count],
            negotiated: vec![Negotiated::default(); count],
            resolved: Vec::new(),
            discarded: Vec::new(),
        }
    }

    /// Loads blocks from a JSON array of [`FlowBlock`] objects.
    pub fn from_json_str(input: &str) -> Result<Self, BreakError> {
        let blocks: Vec<FlowBlock> = serde_json::from_str(input)?;
        Ok(Self::new(blocks))
    }

    /// Block a participant id stands for. The flow itself has id 0.
    pub fn block_index(id: ParticipantId) -> Option<usize> {
        (id.0 as usize).checked_sub(1)
    }

    fn block_id(k: usize) -> ParticipantId {
        ParticipantId(k as u32 + 1)
    }

    pub fn blocks(&self) -> &[FlowBlock] {
        &self.blocks
    }

    /// Last length reported for a block's space on `side`; `Some(None)` when
    /// the space was discarded.
    pub fn resolved_space(&self, block: usize, side: RelSide) -> Option<Option<MinOptMax>> {
        self.resolved
            .iter()
            .rev()
            .find(|(k, n)| *k == block && n.kind == SpecifierKind::Space && n.side == side)
            .map(|(_, n)| n.length)
    }

    pub fn discarded_spaces(&self) -> &[Position] {
        &self.discarded
    }

    /// Extent granted to a block's adjustable lines by justification.
    pub fn negotiated_line_extent(&self, block: usize) -> i32 {
        self.negotiated.get(block).map_or(0, |n| n.lines)
    }

    fn owner(&self, position: &Position) -> Option<usize> {
        position
            .participant
            .filter(|id| *id != self.flow)
            .and_then(Self::block_index)
            .filter(|k| *k < self.blocks.len())
    }

    fn rewind(
        &mut self,
        point: &RestartPoint,
        ref_ipd: i32,
        out: &mut Vec<ListElement>,
    ) -> Result<(), BreakError> {
        let position = point.position;
        let (Some(id), Some(index)) = (position.participant, position.index) else {
            return Err(BreakError::Content(format!(
                "cannot restart flow at {:?}",
                position
            )));
        };
        if id == self.flow && point.reopen {
            self.cursor = Cursor {
                block: index,
                line: 0,
                tail: true,
            };
        } else if id == self.flow {
            self.cursor = Cursor {
                block: index + 1,
                ..Cursor::default()
            };
        } else {
            let k = self
                .owner(&position)
                .ok_or_else(|| BreakError::Content(format!("unknown participant {:?}", id)))?;
            let state = self.lines[k];
            let done = index + 1;
            let consumed =
                state.consumed + (done.saturating_sub(state.first_line) as i32) * state.ipd;
            let remaining = (self.blocks[k].text_extent - consumed).max(0);
            self.lines[k] = LineState {
                consumed,
                first_line: done,
                ipd: ref_ipd,
                line_count: done + line_count(remaining, ref_ipd),
            };
            self.cursor = Cursor {
                block: k,
                line: done,
                tail: false,
            };
            if point.reopen {
                out.push(ListElement::break_possibility(
                    BreakPossibility::new(0),
                    position.original(),
                ));
            }
        }
        debug!(
            "flow restarts at block {} line {} with inline extent {}",
            self.cursor.block, self.cursor.line, ref_ipd
        );
        Ok(())
    }

    fn start_block(&mut self, k: usize, ref_ipd: i32) {
        let block = &self.blocks[k];
        let count = if block.is_fixed() {
            1
        } else {
            line_count(block.text_extent, ref_ipd).max(1)
        };
        self.lines[k] = LineState {
            consumed: 0,
            first_line: 0,
            ipd: ref_ipd,
            line_count: count,
        };
    }

    /// Pushes the break between block `k - 1` and `k`; true when it is forced.
    fn push_separator(&self, k: usize, out: &mut Vec<ListElement>) -> bool {
        let block = &self.blocks[k];
        let possibility = match block.break_before {
            Some(class) => BreakPossibility {
                penalty: -INFINITE,
                penalty_width: 0,
                break_class: class,
            },
            None if block.keep_with_previous => BreakPossibility::new(INFINITE),
            None => BreakPossibility::new(0),
        };
        out.push(ListElement::break_possibility(
            possibility,
            Position::new(self.flow, k - 1),
        ));
        block.break_before.is_some()
    }

    fn push_edge(&self, k: usize, side: RelSide, justify: bool, out: &mut Vec<ListElement>) {
        let block = &self.blocks[k];
        let owner = Position::of(Self::block_id(k));
        let (space, border, padding) = match side {
            RelSide::Before => (block.space_before, block.border_before, block.padding_before),
            RelSide::After => (block.space_after, block.border_after, block.padding_after),
        };
        let edge = |length: i32, border: bool| {
            ListElement::border_or_padding(
                BorderPaddingSpec {
                    length: MinOptMax::fixed(length),
                    side,
                    conditional: !block.retain_border_padding,
                    is_first: side == RelSide::Before,
                    is_last: side == RelSide::After,
                    border,
                },
                owner,
            )
        };
        let space_element = |out: &mut Vec<ListElement>| {
            if space.length == 0 && space.elasticity == 0 {
                return;
            }
            if justify && space.elasticity > 0 {
                let adjustment = match side {
                    RelSide::Before => Adjustment::SpaceBefore,
                    RelSide::After => Adjustment::SpaceAfter,
                };
                if side == RelSide::After {
                    out.push(ListElement::forbidden_break());
                }
                out.push(ListElement::adjustable_glue(
                    space.length,
                    space.elasticity,
                    space.elasticity,
                    adjustment,
                    owner,
                ));
            } else {
                out.push(ListElement::space(space.spec(side), owner));
            }
        };
        match side {
            RelSide::Before => {
                space_element(out);
                if border > 0 {
                    out.push(edge(border, true));
                }
                if padding > 0 {
                    out.push(edge(padding, false));
                }
            }
            RelSide::After => {
                if padding > 0 {
                    out.push(edge(padding, false));
                }
                if border > 0 {
                    out.push(edge(border, true));
                }
                space_element(out);
            }
        }
    }

    fn push_lines(&self, k: usize, from: usize, justify: bool, out: &mut Vec<ListElement>) {
        let block = &self.blocks[k];
        let id = Self::block_id(k);
        let state = self.lines[k];
        if block.is_fixed() {
            let info = BlockBoxInfo {
                line_length: state.ipd,
                ipd_range: MinOptMax::new(block.min_inline_extent, state.ipd, state.ipd),
            };
            out.push(ListElement::block_box(
                block.fixed_extent,
                info,
                Position::new(id, 0),
            ));
            return;
        }
        for line in from..state.line_count {
            if line > from {
                out.push(ListElement::break_possibility(
                    BreakPossibility::new(0),
                    Position::new(id, line - 1),
                ));
            }
            let consumed = state.consumed + (line - state.first_line) as i32 * state.ipd;
            let line_length = (block.text_extent - consumed).clamp(0, state.ipd);
            let info = BlockBoxInfo {
                line_length,
                ipd_range: MinOptMax::new(block.min_inline_extent, state.ipd, state.ipd),
            };
            out.push(ListElement::block_box(
                block.line_height,
                info,
                Position::new(id, line),
            ));
        }
        self.push_line_glue(k, justify, out);
    }

    /// Line-count elasticity negotiated during justification.
    fn push_line_glue(&self, k: usize, justify: bool, out: &mut Vec<ListElement>) {
        let block = &self.blocks[k];
        let id = Self::block_id(k);
        if justify && block.adjustable_lines > 0 && !block.is_fixed() {
            out.push(ListElement::forbidden_break());
            out.push(ListElement::adjustable_glue(
                0,
                block.adjustable_lines as i32 * block.line_height,
                0,
                Adjustment::LineNumber,
                Position::of(id),
            ));
        }
    }
}

fn line_count(text_extent: i32, ipd: i32) -> usize {
    if text_extent <= 0 || ipd <= 0 {
        return 0;
    }
    ((text_extent + ipd - 1) / ipd) as usize
}

impl ContentSource for BlockFlow {
    fn next_elements(
        &mut self,
        ctx: &LayoutContext,
        restart: Option<&RestartPoint>,
    ) -> Result<Vec<ListElement>, BreakError> {
        if ctx.ref_ipd <= 0 {
            return Err(BreakError::Content(format!(
                "reference inline extent {} is not positive",
                ctx.ref_ipd
            )));
        }
        let justify = ctx.alignment == Alignment::Justify;
        let mut out = Vec::new();
        if let Some(point) = restart {
            self.rewind(point, ctx.ref_ipd, &mut out)?;
        }
        let mut at_start = true;
        while self.cursor.block < self.blocks.len() {
            let k = self.cursor.block;
            if self.blocks[k].line_height <= 0 && !self.blocks[k].is_fixed() {
                return Err(BreakError::Content(format!(
                    "block {} has no line height",
                    k
                )));
            }
            if self.cursor.tail {
                self.push_line_glue(k, justify, &mut out);
                self.push_edge(k, RelSide::After, justify, &mut out);
                self.cursor = Cursor {
                    block: k + 1,
                    ..Cursor::default()
                };
                at_start = false;
                continue;
            }
            let from = self.cursor.line;
            if from == 0 {
                if k > 0 && !at_start && self.push_separator(k, &mut out) {
                    trace!("forced break before block {}", k);
                    return Ok(out);
                }
                self.start_block(k, ctx.ref_ipd);
                self.push_edge(k, RelSide::Before, justify, &mut out);
            }
            self.push_lines(k, from, justify, &mut out);
            self.push_edge(k, RelSide::After, justify, &mut out);
            self.cursor = Cursor {
                block: k + 1,
                ..Cursor::default()
            };
            at_start = false;
        }
        trace!("flow produced {} elements", out.len());
        Ok(out)
    }

    fn is_finished(&self) -> bool {
        self.cursor.block >= self.blocks.len()
    }

    fn reset(&mut self) {
        self.cursor = Cursor::default();
        self.lines.fill(LineState::default());
        self.negotiated.fill(Negotiated::default());
        self.resolved.clear();
        self.discarded.clear();
    }

    fn participants(&self) -> &ParticipantTable {
        &self.table
    }

    fn notify_space(&mut self, notification: &SpaceNotification) {
        if let Some(k) = self.owner(&notification.position) {
            self.resolved.push((k, *notification));
        }
    }

    fn negotiate_adjustment(&mut self, adjustment: &PendingAdjustment) -> i32 {
        let Some(k) = self.owner(&adjustment.position) else {
            return 0;
        };
        let block = &self.blocks[k];
        let negotiated = &mut self.negotiated[k];
        let (current, low, high, step) = match adjustment.adjustment {
            Adjustment::SpaceBefore => (
                &mut negotiated.space_before,
                -block.space_before.elasticity,
                block.space_before.elasticity,
                1,
            ),
            Adjustment::SpaceAfter => (
                &mut negotiated.space_after,
                -block.space_after.elasticity,
                block.space_after.elasticity,
                1,
            ),
            Adjustment::LineNumber => (
                &mut negotiated.lines,
                0,
                block.adjustable_lines as i32 * block.line_height,
                block.line_height.max(1),
            ),
            _ => return 0,
        };
        let wanted = (*current + adjustment.amount).clamp(low, high);
        let granted = wanted - wanted % step - *current;
        *current += granted;
        trace!(
            "block {} {:?}: asked {} granted {}",
            k,
            adjustment.adjustment,
            adjustment.amount,
            granted
        );
        granted
    }

    fn discard_space(&mut self, position: Position) {
        self.discarded.push(position);
    }

    fn changed_elements(
        &mut self,
        old: &[ListElement],
        _ctx: &LayoutContext,
    ) -> Result<Vec<ListElement>, BreakError> {
        let mut out = Vec::with_capacity(old.len());
        for el in old {
            let owner = self.owner(&el.position);
            match (el.adjustment(), owner) {
                (Adjustment::SpaceBefore, Some(k)) => out.push(ListElement::adjustable_glue(
                    el.width + self.negotiated[k].space_before,
                    0,
                    0,
                    Adjustment::SpaceBefore,
                    el.position,
                )),
                (Adjustment::SpaceAfter, Some(k)) => out.push(ListElement::adjustable_glue(
                    el.width + self.negotiated[k].space_after,
                    0,
                    0,
                    Adjustment::SpaceAfter,
                    el.position,
                )),
                (Adjustment::LineNumber, Some(k)) => {
                    let extra = self.negotiated[k].lines;
                    if extra > 0 {
                        out.push(ListElement::new_box(extra, el.position));
                    }
                }
                _ => out.push(el.clone()),
            }
        }
        debug!(
            "regenerated {} elements after justification ({} before)",
            out.len(),
            old.len()
        );
        Ok(out)
    }
}
