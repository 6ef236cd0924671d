//! Knuth-style page and column breaking for flowed print content.
//!
//! The engine consumes element lists (boxes, glue, penalties and unresolved
//! space/border/padding specifiers) produced by a [`ContentSource`], resolves
//! conditional spaces, chooses break points with a total-fit breaking
//! algorithm and paints each resulting part through an [`AreaSink`].
//!
//! ```rust,no_run
//! use flowbreak::{Breaker, BreakerConfig, PageMaster, PageMasterSet, PageProvider};
//! # fn example(
//! #     source: &mut dyn flowbreak::ContentSource,
//! #     sink: &mut dyn flowbreak::AreaSink,
//! # ) -> Result<(), flowbreak::BreakError> {
//! let mut pages = PageProvider::new(PageMasterSet::uniform(PageMaster::new(720_000, 468_000)));
//! let mut breaker = Breaker::new(BreakerConfig::default(), source, &mut pages, sink);
//! let report = breaker.do_layout(720_000, false)?;
//! println!("laid out {} parts", report.part_count);
//! # Ok(())
//! # }
//! ```

#![cfg_attr(
    not(test),
    deny(
        clippy::disallowed_methods,
        clippy::expect_used,
        clippy::unwrap_used,
        clippy::panic,
        clippy::panic_in_result_fn,
        clippy::todo,
        clippy::unimplemented
    )
)]

mod area;
mod breaker;
mod breaking;
mod config;
mod element;
mod error;
mod geometry;
mod justify;
mod page_break;
mod participant;
mod sequence;
mod space;

pub use area::{AreaSink, LayoutListener, PaintContext};
pub use breaker::{Breaker, LayoutReport};
pub use breaking::BreakingAlgorithm;
pub use config::{Alignment, BreakerConfig, BreakerKind, DisplayAlign, OverflowPolicy, SearchMode};
pub use element::{
    Adjustment, BlockBoxInfo, BorderPaddingSpec, BreakClass, BreakPossibility, ElementKind,
    ListElement, MinOptMax, Position, Precedence, RelSide, SpaceRef, SpaceSpec, FILLER_STRETCH,
    FLAGGED_PENALTY, INFINITE,
};
pub use error::BreakError;
pub use geometry::{
    ConstantGeometry, GeometryProvider, Page, PageMaster, PageMasterSet, PageProvider, PartSlot,
};
pub use page_break::{BreakOutcome, IpdChange, OverflowEvent, PageBreakPosition};
pub use participant::{
    ContentSource, LayoutContext, ParticipantId, ParticipantInfo, ParticipantTable,
    PendingAdjustment, RestartPoint, SpaceNotification, SpecifierKind,
};
pub use sequence::{ends_with_forced_break, is_empty_box, BlockSequence};
pub use space::{SpaceResolutions, SpaceResolver};
