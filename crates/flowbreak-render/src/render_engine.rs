use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use flowbreak::{
    AreaSink, BreakError, Breaker, BreakerConfig, ElementKind, GeometryProvider, IpdChange,
    LayoutListener, ListElement, OverflowEvent, PageMaster, PageMasterSet, PageProvider,
    PaintContext, PartSlot,
};
use log::debug;
use serde::{Deserialize, Serialize};

use crate::block_flow::BlockFlow;
use crate::render_ir::{BlockCommand, DrawCommand, RenderPage, SpaceCommand};

const CANCELLED: &str = "layout cancelled";
const PAGE_LIMIT: &str = "page limit exceeded";

/// Cancellation hook for long-running layout operations.
pub trait CancelToken {
    fn is_cancelled(&self) -> bool;
}

/// Never-cancel token for default call paths.
#[derive(Clone, Copy, Debug, Default)]
pub struct NeverCancel;

impl CancelToken for NeverCancel {
    fn is_cancelled(&self) -> bool {
        false
    }
}

/// Runtime diagnostics from layout.
#[derive(Clone, Debug, PartialEq)]
pub enum RenderDiagnostic {
    ReflowTimeMs(u32),
    Cancelled,
    Overflow { part_index: usize, amount: i32 },
    Restart { part_index: usize, difference: i8 },
    PartCount { parts: usize, pages: usize },
}

type DiagnosticCallback = Arc<Mutex<Box<dyn FnMut(RenderDiagnostic) + Send + 'static>>>;
type DiagnosticSink = Option<DiagnosticCallback>;

/// Render-engine options.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RenderEngineOptions {
    /// Breaking behavior.
    #[serde(default)]
    pub breaker: BreakerConfig,
    /// Page geometry, in millipoints.
    pub masters: PageMasterSet,
    /// Fail instead of producing more pages than this.
    #[serde(default)]
    pub max_pages: Option<usize>,
}

impl RenderEngineOptions {
    /// Build options for a single-column page of `width` by `height`
    /// millipoints.
    pub fn for_display(width: i32, height: i32) -> Self {
        Self {
            breaker: BreakerConfig::default(),
            masters: PageMasterSet::uniform(PageMaster::new(height, width)),
            max_pages: None,
        }
    }

    pub fn from_json_str(input: &str) -> Result<Self, RenderEngineError> {
        let opts: Self = serde_json::from_str(input).map_err(BreakError::from)?;
        opts.breaker.validate()?;
        opts.masters.validate()?;
        Ok(opts)
    }
}

/// Area sink collecting parts onto [`RenderPage`]s.
pub struct PageAreaSink<'c> {
    pages: Vec<RenderPage>,
    cancel: &'c dyn CancelToken,
    max_pages: Option<usize>,
    cancelled: bool,
    limit_exceeded: bool,
}

impl Default for PageAreaSink<'static> {
    fn default() -> Self {
        Self::new()
    }
}

impl PageAreaSink<'static> {
    pub fn new() -> Self {
        PageAreaSink::with_cancel(&NeverCancel)
    }
}

impl<'c> PageAreaSink<'c> {
    pub fn with_cancel(cancel: &'c dyn CancelToken) -> Self {
        Self {
            pages: Vec::new(),
            cancel,
            max_pages: None,
            cancelled: false,
            limit_exceeded: false,
        }
    }

    pub fn with_max_pages(mut self, max_pages: Option<usize>) -> Self {
        self.max_pages = max_pages;
        self
    }

    pub fn pages(&self) -> &[RenderPage] {
        &self.pages
    }

    pub fn into_pages(self) -> Vec<RenderPage> {
        self.pages
    }

    fn page_mut(&mut self, part_index: usize, slot: PartSlot) -> Result<&mut RenderPage, BreakError> {
        if self.cancel.is_cancelled() {
            self.cancelled = true;
            return Err(BreakError::Content(CANCELLED.to_string()));
        }
        if self.max_pages.is_some_and(|limit| slot.page_index >= limit) {
            self.limit_exceeded = true;
            return Err(BreakError::Content(PAGE_LIMIT.to_string()));
        }
        while self.pages.len() <= slot.page_index {
            let index = self.pages.len();
            self.pages
                .push(RenderPage::new(index, part_index.saturating_sub(slot.column)));
        }
        self.pages
            .get_mut(slot.page_index)
            .ok_or_else(|| BreakError::Content(format!("no page {}", slot.page_index)))
    }
}

fn adjusted_glue(el: &ListElement, ratio: f64) -> i32 {
    let elasticity = if ratio > 0.0 {
        el.stretch()
    } else {
        el.shrink()
    };
    el.width + (ratio * f64::from(elasticity)) as i32
}

impl AreaSink for PageAreaSink<'_> {
    fn paint(&mut self, elements: &[ListElement], ctx: &PaintContext) -> Result<(), BreakError> {
        let x = ctx.slot.column as i32 * ctx.inline_extent;
        let boxes = elements
            .iter()
            .filter(|el| el.is_box() && el.width > 0)
            .count();
        let page = self.page_mut(ctx.part_index, ctx.slot)?;
        let mut y = ctx.space_before;
        let mut seen = 0;
        for el in elements {
            match el.kind {
                ElementKind::Box { .. } if el.width > 0 => {
                    if let Some(block) = el.position.participant.and_then(BlockFlow::block_index) {
                        page.push_command(DrawCommand::Block(BlockCommand {
                            block,
                            line: el.position.index,
                            x,
                            y,
                            width: ctx.stack_limit,
                            height: el.width,
                        }));
                    }
                    y += el.width;
                    seen += 1;
                    if ctx.space_after > 0 && seen < boxes {
                        y += ctx.space_after;
                    }
                }
                ElementKind::Glue { .. } => {
                    let extent = adjusted_glue(el, ctx.adjust_ratio);
                    if extent != 0 {
                        page.push_command(DrawCommand::Space(SpaceCommand { x, y, extent }));
                    }
                    y += extent;
                }
                _ => {}
            }
        }
        page.metrics.painted_parts += 1;
        page.metrics.content_extent += y;
        page.metrics.adjust_ratio = ctx.adjust_ratio as f32;
        page.metrics.blank = false;
        Ok(())
    }

    fn empty_part(&mut self, ctx: &PaintContext) -> Result<(), BreakError> {
        self.page_mut(ctx.part_index, ctx.slot)?;
        Ok(())
    }

    fn blank_part(&mut self, part_index: usize, slot: PartSlot) -> Result<(), BreakError> {
        let page = self.page_mut(part_index, slot)?;
        page.metrics.blank = page.metrics.painted_parts == 0;
        Ok(())
    }
}

struct DiagnosticListener<'e> {
    engine: &'e RenderEngine,
}

impl LayoutListener for DiagnosticListener<'_> {
    fn overflow(&mut self, event: &OverflowEvent) {
        self.engine.emit_diagnostic(RenderDiagnostic::Overflow {
            part_index: event.part_index,
            amount: event.amount,
        });
    }

    fn restarted(&mut self, part_index: usize, change: &IpdChange) {
        self.engine.emit_diagnostic(RenderDiagnostic::Restart {
            part_index,
            difference: change.difference,
        });
    }
}

/// Render engine for flow -> page conversion.
#[derive(Clone)]
pub struct RenderEngine {
    opts: RenderEngineOptions,
    diagnostic_sink: DiagnosticSink,
}

impl fmt::Debug for RenderEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderEngine")
            .field("opts", &self.opts)
            .finish_non_exhaustive()
    }
}

impl RenderEngine {
    /// Create a render engine.
    pub fn new(opts: RenderEngineOptions) -> Self {
        Self {
            opts,
            diagnostic_sink: None,
        }
    }

    pub fn options(&self) -> &RenderEngineOptions {
        &self.opts
    }

    /// Register or replace the diagnostics sink.
    pub fn set_diagnostic_sink<F>(&mut self, sink: F)
    where
        F: FnMut(RenderDiagnostic) + Send + 'static,
    {
        self.diagnostic_sink = Some(Arc::new(Mutex::new(Box::new(sink))));
    }

    fn emit_diagnostic(&self, diagnostic: RenderDiagnostic) {
        let Some(sink) = &self.diagnostic_sink else {
            return;
        };
        if let Ok(mut sink) = sink.lock() {
            sink(diagnostic);
        }
    }

    /// Lay out a whole flow into pages.
    pub fn layout(&self, flow: &mut BlockFlow) -> Result<Vec<RenderPage>, RenderEngineError> {
        self.layout_with_cancel(flow, &NeverCancel)
    }

    pub fn layout_with_cancel(
        &self,
        flow: &mut BlockFlow,
        cancel: &dyn CancelToken,
    ) -> Result<Vec<RenderPage>, RenderEngineError> {
        let started = Instant::now();
        let mut geometry = PageProvider::new(self.opts.masters.clone());
        let mut sink = PageAreaSink::with_cancel(cancel).with_max_pages(self.opts.max_pages);
        let mut listener = DiagnosticListener { engine: self };
        let flow_bpd = self.opts.masters.master_for(0).block_extent;

        let result = Breaker::new(self.opts.breaker.clone(), flow, &mut geometry, &mut sink)
            .with_listener(&mut listener)
            .do_layout(flow_bpd, false);
        let report = match result {
            Ok(report) => report,
            Err(_) if sink.cancelled => {
                self.emit_diagnostic(RenderDiagnostic::Cancelled);
                return Err(RenderEngineError::Cancelled);
            }
            Err(_) if sink.limit_exceeded => {
                return Err(RenderEngineError::LimitExceeded {
                    kind: "pages",
                    actual: sink.pages.len() + 1,
                    limit: self.opts.max_pages.unwrap_or_default(),
                });
            }
            Err(err) => return Err(err.into()),
        };

        let mut pages = sink.into_pages();
        for event in &report.overflows {
            let page_index = geometry.part_slot(event.part_index).page_index;
            if let Some(page) = pages.get_mut(page_index) {
                page.metrics.overflow += event.amount;
            }
        }
        debug!(
            "flow laid out on {} pages ({} parts, {} restarts)",
            pages.len(),
            report.part_count,
            report.restarts
        );
        self.emit_diagnostic(RenderDiagnostic::PartCount {
            parts: report.part_count,
            pages: pages.len(),
        });
        let elapsed = started.elapsed().as_millis().min(u128::from(u32::MAX)) as u32;
        self.emit_diagnostic(RenderDiagnostic::ReflowTimeMs(elapsed));
        Ok(pages)
    }
}

#[derive(Debug)]
pub enum RenderEngineError {
    /// Breaking failed.
    Break(BreakError),
    /// Layout run was cancelled.
    Cancelled,
    /// Layout produced more output than configured.
    LimitExceeded {
        kind: &'static str,
        actual: usize,
        limit: usize,
    },
}

impl core::fmt::Display for RenderEngineError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Break(err) => write!(f, "layout failed: {}", err),
            Self::Cancelled => write!(f, "render cancelled"),
            Self::LimitExceeded {
                kind,
                actual,
                limit,
            } => write!(
                f,
                "render limit exceeded: {} (actual={} limit={})",
                kind, actual, limit
            ),
        }
    }
}

impl std::error::Error for RenderEngineError {}

impl From<BreakError> for RenderEngineError {
    fn from(value: BreakError) -> Self {
        Self::Break(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block_flow::FlowBlock;
    use flowbreak::{DisplayAlign, Position};
    use std::cell::Cell;

    fn ctx(part_index: usize, ratio: f64) -> PaintContext {
        PaintContext {
            part_index,
            slot: PartSlot::single(part_index),
            available_extent: 10_000,
            inline_extent: 5_000,
            display_align: DisplayAlign::Before,
            adjust_ratio: ratio,
            space_before: 0,
            space_after: 0,
            stack_limit: 5_000,
            difference: 0,
            is_last_part: true,
        }
    }

    #[test]
    fn glue_is_painted_with_its_adjustment() {
        let mut sink = PageAreaSink::new();
        let elements = vec![
            ListElement::new_box(1000, Position::new(flowbreak::ParticipantId(1), 0)),
            ListElement::glue(400, 200, 100, Position::NONE),
            ListElement::new_box(1000, Position::new(flowbreak::ParticipantId(2), 0)),
        ];
        sink.paint(&elements, &ctx(0, -0.5)).unwrap();
        let page = &sink.pages()[0];
        assert_eq!(
            page.commands[1],
            DrawCommand::Space(SpaceCommand {
                x: 0,
                y: 1000,
                extent: 350
            })
        );
        assert_eq!(page.column_bottom(0), 2350);
        assert_eq!(page.block_indices(), vec![0, 1]);
    }

    #[test]
    fn blank_parts_create_blank_pages() {
        let mut sink = PageAreaSink::new();
        sink.blank_part(0, PartSlot::single(0)).unwrap();
        sink.paint(&[], &ctx(1, 0.0)).unwrap();
        let pages = sink.into_pages();
        assert_eq!(pages.len(), 2);
        assert!(pages[0].metrics.blank);
        assert!(!pages[1].metrics.blank);
    }

    struct CancelAfter(Cell<usize>);

    impl CancelToken for CancelAfter {
        fn is_cancelled(&self) -> bool {
            let left = self.0.get();
            self.0.set(left.saturating_sub(1));
            left == 0
        }
    }

    #[test]
    fn cancellation_stops_layout() {
        let engine = RenderEngine::new(RenderEngineOptions::for_display(10_000, 2_000));
        let mut flow = BlockFlow::new(vec![FlowBlock::fixed(1_500); 4]);
        let err = engine
            .layout_with_cancel(&mut flow, &CancelAfter(Cell::new(1)))
            .unwrap_err();
        assert!(matches!(err, RenderEngineError::Cancelled));
    }

    #[test]
    fn page_limit_is_enforced() {
        let mut opts = RenderEngineOptions::for_display(10_000, 2_000);
        opts.max_pages = Some(2);
        let engine = RenderEngine::new(opts);
        let mut flow = BlockFlow::new(vec![FlowBlock::fixed(1_500); 4]);
        let err = engine.layout(&mut flow).unwrap_err();
        assert!(matches!(
            err,
            RenderEngineError::LimitExceeded { limit: 2, .. }
        ));
    }

    #[test]
    fn diagnostics_report_part_count() {
        let mut engine = RenderEngine::new(RenderEngineOptions::for_display(10_000, 2_000));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        engine.set_diagnostic_sink(move |d| {
            if let Ok(mut seen) = sink.lock() {
                seen.push(d);
            }
        });
        let mut flow = BlockFlow::new(vec![FlowBlock::fixed(1_500); 3]);
        let pages = engine.layout(&mut flow).unwrap();
        assert_eq!(pages.len(), 3);
        let seen = seen.lock().unwrap();
        assert!(seen.contains(&RenderDiagnostic::PartCount { parts: 3, pages: 3 }));
    }

    #[test]
    fn options_load_from_json() {
        let opts = RenderEngineOptions::from_json_str(
            r#"{
                "breaker": {"kind": "block-container", "display_align": "center"},
                "masters": {"rest": {"block_extent": 20000, "inline_extent": 10000}},
                "max_pages": 12
            }"#,
        )
        .unwrap();
        assert_eq!(opts.breaker.display_align, DisplayAlign::Center);
        assert_eq!(opts.masters.rest.column_count, 1);
        assert_eq!(opts.max_pages, Some(12));

        let invalid = RenderEngineOptions::from_json_str(
            r#"{"breaker": {"max_adjustment_ratio": -1.0},
                "masters": {"rest": {"block_extent": 1, "inline_extent": 1}}}"#,
        );
        assert!(matches!(
            invalid,
            Err(RenderEngineError::Break(BreakError::InvalidConfig(_)))
        ));
    }

    #[test]
    fn options_reject_pages_without_extent() {
        let zero_height = RenderEngineOptions::from_json_str(
            r#"{"masters": {"rest": {"block_extent": 0, "inline_extent": 10000}}}"#,
        );
        assert!(matches!(
            zero_height,
            Err(RenderEngineError::Break(BreakError::InvalidConfig(_)))
        ));

        let bad_first_page = RenderEngineOptions::from_json_str(
            r#"{"masters": {
                "first": {"block_extent": 20000, "inline_extent": -5},
                "rest": {"block_extent": 20000, "inline_extent": 10000}
            }}"#,
        );
        assert!(matches!(
            bad_first_page,
            Err(RenderEngineError::Break(BreakError::InvalidConfig(_)))
        ));
    }
}
