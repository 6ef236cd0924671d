#![allow(dead_code)]

use std::collections::VecDeque;

use flowbreak::{
    AreaSink, BreakClass, BreakError, BreakPossibility, ContentSource, LayoutContext,
    LayoutListener, ListElement, MinOptMax, PaintContext, ParticipantId, ParticipantTable,
    PartSlot, Position, RelSide, RestartPoint, SpaceNotification, SpaceSpec,
};

pub const FLOW: ParticipantId = ParticipantId(0);

pub fn boxed(width: i32) -> ListElement {
    ListElement::new_box(width, Position::new(FLOW, 0))
}

pub fn glue(width: i32, stretch: i32, shrink: i32) -> ListElement {
    ListElement::glue(width, stretch, shrink, Position::new(FLOW, 0))
}

pub fn penalty(value: i32) -> ListElement {
    ListElement::penalty(0, value, false, BreakClass::Any, Position::new(FLOW, 0))
}

pub fn forced(class: BreakClass) -> ListElement {
    ListElement::forced_break(class, Position::new(FLOW, 0))
}

pub fn break_at(value: i32, index: usize) -> ListElement {
    ListElement::break_possibility(BreakPossibility::new(value), Position::new(FLOW, index))
}

pub fn space(side: RelSide, opt: i32, owner: ParticipantId) -> ListElement {
    ListElement::space(SpaceSpec::new(side, MinOptMax::fixed(opt)), Position::of(owner))
}

/// Boxes of the given widths separated by neutral penalties.
pub fn stacked(widths: &[i32]) -> Vec<ListElement> {
    let mut out = Vec::with_capacity(widths.len() * 2);
    for (i, width) in widths.iter().enumerate() {
        if i > 0 {
            out.push(penalty(0));
        }
        out.push(boxed(*width));
    }
    out
}

/// Content source handing out pre-built lists, one per call.
pub struct ScriptedSource {
    lists: VecDeque<Vec<ListElement>>,
    original: Vec<Vec<ListElement>>,
    table: ParticipantTable,
    pub notified: Vec<SpaceNotification>,
}

impl ScriptedSource {
    pub fn new(lists: Vec<Vec<ListElement>>) -> Self {
        let mut table = ParticipantTable::new();
        let flow = table.register("flow", None, true);
        table.register("first", Some(flow), true);
        table.register("second", Some(flow), true);
        Self {
            lists: lists.clone().into(),
            original: lists,
            table,
            notified: Vec::new(),
        }
    }

    pub fn notified_for(&self, owner: ParticipantId) -> Vec<Option<MinOptMax>> {
        self.notified
            .iter()
            .filter(|n| n.position.participant == Some(owner))
            .map(|n| n.length)
            .collect()
    }
}

impl ContentSource for ScriptedSource {
    fn next_elements(
        &mut self,
        _ctx: &LayoutContext,
        restart: Option<&RestartPoint>,
    ) -> Result<Vec<ListElement>, BreakError> {
        if let Some(point) = restart {
            return Err(BreakError::UnsupportedRestartPosition {
                detail: format!("{:?}", point.position),
            });
        }
        Ok(self.lists.pop_front().unwrap_or_default())
    }

    fn is_finished(&self) -> bool {
        self.lists.is_empty()
    }

    fn reset(&mut self) {
        self.lists = self.original.clone().into();
        self.notified.clear();
    }

    fn participants(&self) -> &ParticipantTable {
        &self.table
    }

    fn notify_space(&mut self, notification: &SpaceNotification) {
        self.notified.push(*notification);
    }
}

#[derive(Clone, Debug)]
pub struct RecordedPart {
    pub part_index: usize,
    pub boxes: Vec<i32>,
    pub glue: Vec<i32>,
    pub ctx: PaintContext,
}

/// Sink that remembers what every part received.
#[derive(Default)]
pub struct RecordingSink {
    pub parts: Vec<RecordedPart>,
    pub empty: Vec<usize>,
    pub blank: Vec<(usize, PartSlot)>,
    pub finished: bool,
}

impl RecordingSink {
    pub fn part_indices(&self) -> Vec<usize> {
        self.parts.iter().map(|p| p.part_index).collect()
    }

    pub fn painted_boxes(&self) -> Vec<i32> {
        self.parts.iter().flat_map(|p| p.boxes.clone()).collect()
    }
}

impl AreaSink for RecordingSink {
    fn paint(&mut self, elements: &[ListElement], ctx: &PaintContext) -> Result<(), BreakError> {
        let boxes = elements
            .iter()
            .filter(|el| el.is_box() && !el.auxiliary)
            .map(|el| el.width)
            .collect();
        let glue = elements
            .iter()
            .filter(|el| el.is_glue())
            .map(|el| el.width)
            .collect();
        self.parts.push(RecordedPart {
            part_index: ctx.part_index,
            boxes,
            glue,
            ctx: *ctx,
        });
        Ok(())
    }

    fn empty_part(&mut self, ctx: &PaintContext) -> Result<(), BreakError> {
        self.empty.push(ctx.part_index);
        Ok(())
    }

    fn blank_part(&mut self, part_index: usize, slot: PartSlot) -> Result<(), BreakError> {
        self.blank.push((part_index, slot));
        Ok(())
    }

    fn finish(&mut self) -> Result<(), BreakError> {
        self.finished = true;
        Ok(())
    }
}

/// Listener that keeps the pipeline stages it saw, in order.
#[derive(Default)]
pub struct StageLog {
    pub stages: Vec<&'static str>,
    pub painted: Vec<usize>,
}

impl LayoutListener for StageLog {
    fn part_painted(&mut self, part_index: usize, _elements: &[ListElement]) {
        self.painted.push(part_index);
    }

    fn observe_list(&mut self, stage: &'static str, _elements: &[ListElement]) {
        self.stages.push(stage);
    }
}
