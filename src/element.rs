//! Element model shared by the resolver, the breaking algorithm and the
//! painting pass.
//!
//! All lengths are integer millipoints along the block-progression axis.

use core::fmt;
use core::ops::Add;

use serde::{Deserialize, Serialize};

use crate::participant::ParticipantId;

/// Penalty magnitude treated as infinite. A penalty of `-INFINITE` or less
/// forces a break, one of `INFINITE` or more forbids it.
pub const INFINITE: i32 = 1000;

/// Penalty conventionally used for flagged (hyphen-like) break possibilities.
pub const FLAGGED_PENALTY: i32 = 50;

/// Stretch of the filler glue that closes every block sequence.
pub const FILLER_STRETCH: i32 = 10_000_000;

/// A length triple with `min <= opt <= max`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MinOptMax {
    pub min: i32,
    pub opt: i32,
    pub max: i32,
}

impl MinOptMax {
    pub const ZERO: MinOptMax = MinOptMax {
        min: 0,
        opt: 0,
        max: 0,
    };

    /// Builds a triple, widening `min`/`max` so the ordering invariant holds.
    pub fn new(min: i32, opt: i32, max: i32) -> Self {
        Self {
            min: min.min(opt),
            opt,
            max: max.max(opt),
        }
    }

    pub fn fixed(value: i32) -> Self {
        Self {
            min: value,
            opt: value,
            max: value,
        }
    }

    pub fn stretch(self) -> i32 {
        self.max - self.opt
    }

    pub fn shrink(self) -> i32 {
        self.opt - self.min
    }

    pub fn is_non_zero(self) -> bool {
        self.min != 0 || self.max != 0
    }

    pub fn is_elastic(self) -> bool {
        self.min != self.opt || self.opt != self.max
    }

    pub fn plus_max(self, delta: i32) -> Self {
        Self::new(self.min, self.opt, self.max + delta)
    }

    pub fn minus_min(self, delta: i32) -> Self {
        Self::new(self.min - delta, self.opt, self.max)
    }

    /// Narrows to the common range of both triples, keeping `opt` inside it.
    pub fn intersect(self, other: MinOptMax, opt: i32) -> Self {
        let min = self.min.max(other.min);
        let max = self.max.min(other.max).max(min);
        Self {
            min,
            opt: opt.clamp(min, max),
            max,
        }
    }
}

impl Add for MinOptMax {
    type Output = MinOptMax;

    fn add(self, rhs: MinOptMax) -> MinOptMax {
        MinOptMax {
            min: self.min + rhs.min,
            opt: self.opt + rhs.opt,
            max: self.max + rhs.max,
        }
    }
}

impl fmt::Display for MinOptMax {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.min, self.opt, self.max)
    }
}

/// Reference from a resolved element back into the space resolution table.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum SpaceRef {
    #[default]
    None,
    /// The element is the break penalty of a resolved break possibility.
    Break(u32),
    /// The element anchors a run of specifiers with no break inside.
    Run(u32),
}

impl SpaceRef {
    pub fn slot(self) -> Option<u32> {
        match self {
            SpaceRef::None => None,
            SpaceRef::Break(slot) | SpaceRef::Run(slot) => Some(slot),
        }
    }
}

/// Opaque locator of a layout participant and an index inside it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Position {
    pub participant: Option<ParticipantId>,
    pub index: Option<usize>,
    pub space: SpaceRef,
}

impl Position {
    pub const NONE: Position = Position {
        participant: None,
        index: None,
        space: SpaceRef::None,
    };

    pub fn new(participant: ParticipantId, index: usize) -> Self {
        Self {
            participant: Some(participant),
            index: Some(index),
            space: SpaceRef::None,
        }
    }

    pub fn of(participant: ParticipantId) -> Self {
        Self {
            participant: Some(participant),
            index: None,
            space: SpaceRef::None,
        }
    }

    pub fn with_space(self, space: SpaceRef) -> Self {
        Self { space, ..self }
    }

    /// The same locator stripped of its resolution reference.
    pub fn original(self) -> Self {
        Self {
            space: SpaceRef::None,
            ..self
        }
    }

    pub fn is_none(&self) -> bool {
        self.participant.is_none()
    }
}

/// Break class carried by penalties, used for start-on affinity of the
/// following content.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BreakClass {
    #[default]
    Any,
    Column,
    Page,
    OddPage,
    EvenPage,
}

/// What an adjustable glue may be renegotiated as during justification.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Adjustment {
    #[default]
    None,
    SpaceBefore,
    SpaceAfter,
    LineNumber,
}

/// Extra data attached to boxes that represent block content lines.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlockBoxInfo {
    pub line_length: i32,
    pub ipd_range: MinOptMax,
}

/// Which edge of its participant a specifier sits on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RelSide {
    Before,
    After,
}

/// Space precedence. Forcing spaces outrank every numeric precedence.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Precedence {
    Value(i32),
    Force,
}

impl Default for Precedence {
    fn default() -> Self {
        Precedence::Value(0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SpaceSpec {
    pub length: MinOptMax,
    pub side: RelSide,
    pub conditional: bool,
    pub precedence: Precedence,
    pub is_first: bool,
    pub is_last: bool,
}

impl SpaceSpec {
    pub fn new(side: RelSide, length: MinOptMax) -> Self {
        Self {
            length,
            side,
            conditional: true,
            precedence: Precedence::default(),
            is_first: false,
            is_last: false,
        }
    }

    pub fn with_precedence(mut self, precedence: Precedence) -> Self {
        self.precedence = precedence;
        self
    }

    pub fn retained(mut self) -> Self {
        self.conditional = false;
        self
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BorderPaddingSpec {
    pub length: MinOptMax,
    pub side: RelSide,
    pub conditional: bool,
    pub is_first: bool,
    pub is_last: bool,
    pub border: bool,
}

/// Unresolved break possibility sitting between specifier groups.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BreakPossibility {
    pub penalty: i32,
    pub penalty_width: i32,
    pub break_class: BreakClass,
}

impl BreakPossibility {
    pub fn new(penalty: i32) -> Self {
        Self {
            penalty,
            penalty_width: 0,
            break_class: BreakClass::Any,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum ElementKind {
    Box {
        block: Option<BlockBoxInfo>,
    },
    Glue {
        stretch: i32,
        shrink: i32,
        adjustment: Adjustment,
    },
    Penalty {
        value: i32,
        flagged: bool,
        break_class: BreakClass,
    },
    Space(SpaceSpec),
    BorderOrPadding(BorderPaddingSpec),
    Break(BreakPossibility),
}

/// One element of a block list. `width` is the natural extent of boxes and
/// glue and the extra extent a penalty adds when a break is taken there.
#[derive(Clone, Debug, PartialEq)]
pub struct ListElement {
    pub width: i32,
    pub kind: ElementKind,
    pub position: Position,
    pub auxiliary: bool,
}

impl ListElement {
    pub fn new_box(width: i32, position: Position) -> Self {
        Self {
            width,
            kind: ElementKind::Box { block: None },
            position,
            auxiliary: false,
        }
    }

    pub fn block_box(width: i32, info: BlockBoxInfo, position: Position) -> Self {
        Self {
            width,
            kind: ElementKind::Box { block: Some(info) },
            position,
            auxiliary: false,
        }
    }

    pub fn aux_box(width: i32, position: Position) -> Self {
        Self {
            auxiliary: true,
            ..Self::new_box(width, position)
        }
    }

    pub fn glue(width: i32, stretch: i32, shrink: i32, position: Position) -> Self {
        Self {
            width,
            kind: ElementKind::Glue {
                stretch,
                shrink,
                adjustment: Adjustment::None,
            },
            position,
            auxiliary: false,
        }
    }

    pub fn adjustable_glue(
        width: i32,
        stretch: i32,
        shrink: i32,
        adjustment: Adjustment,
        position: Position,
    ) -> Self {
        Self {
            width,
            kind: ElementKind::Glue {
                stretch,
                shrink,
                adjustment,
            },
            position,
            auxiliary: false,
        }
    }

    /// Auxiliary glue carrying a resolved length.
    pub fn resolved_glue(length: MinOptMax) -> Self {
        Self {
            auxiliary: true,
            ..Self::glue(length.opt, length.stretch(), length.shrink(), Position::NONE)
        }
    }

    pub fn penalty(
        width: i32,
        value: i32,
        flagged: bool,
        break_class: BreakClass,
        position: Position,
    ) -> Self {
        Self {
            width,
            kind: ElementKind::Penalty {
                value,
                flagged,
                break_class,
            },
            position,
            auxiliary: false,
        }
    }

    pub fn forbidden_break() -> Self {
        Self {
            auxiliary: true,
            ..Self::penalty(0, INFINITE, false, BreakClass::Any, Position::NONE)
        }
    }

    pub fn forced_break(break_class: BreakClass, position: Position) -> Self {
        Self::penalty(0, -INFINITE, false, break_class, position)
    }

    pub fn space(spec: SpaceSpec, position: Position) -> Self {
        Self {
            width: 0,
            kind: ElementKind::Space(spec),
            position,
            auxiliary: false,
        }
    }

    pub fn border_or_padding(spec: BorderPaddingSpec, position: Position) -> Self {
        Self {
            width: 0,
            kind: ElementKind::BorderOrPadding(spec),
            position,
            auxiliary: false,
        }
    }

    pub fn break_possibility(possibility: BreakPossibility, position: Position) -> Self {
        Self {
            width: 0,
            kind: ElementKind::Break(possibility),
            position,
            auxiliary: false,
        }
    }

    pub fn is_box(&self) -> bool {
        matches!(self.kind, ElementKind::Box { .. })
    }

    pub fn is_glue(&self) -> bool {
        matches!(self.kind, ElementKind::Glue { .. })
    }

    pub fn is_penalty(&self) -> bool {
        matches!(self.kind, ElementKind::Penalty { .. })
    }

    pub fn is_unresolved(&self) -> bool {
        matches!(
            self.kind,
            ElementKind::Space(_) | ElementKind::BorderOrPadding(_) | ElementKind::Break(_)
        )
    }

    pub fn penalty_value(&self) -> Option<i32> {
        match self.kind {
            ElementKind::Penalty { value, .. } => Some(value),
            _ => None,
        }
    }

    pub fn is_forced_break(&self) -> bool {
        self.penalty_value().is_some_and(|value| value <= -INFINITE)
    }

    pub fn is_flagged(&self) -> bool {
        matches!(self.kind, ElementKind::Penalty { flagged: true, .. })
    }

    pub fn break_class(&self) -> BreakClass {
        match self.kind {
            ElementKind::Penalty { break_class, .. } => break_class,
            ElementKind::Break(possibility) => possibility.break_class,
            _ => BreakClass::Any,
        }
    }

    pub fn stretch(&self) -> i32 {
        match self.kind {
            ElementKind::Glue { stretch, .. } => stretch,
            _ => 0,
        }
    }

    pub fn shrink(&self) -> i32 {
        match self.kind {
            ElementKind::Glue { shrink, .. } => shrink,
            _ => 0,
        }
    }

    pub fn adjustment(&self) -> Adjustment {
        match self.kind {
            ElementKind::Glue { adjustment, .. } => adjustment,
            _ => Adjustment::None,
        }
    }

    pub fn block_info(&self) -> Option<BlockBoxInfo> {
        match self.kind {
            ElementKind::Box { block } => block,
            _ => None,
        }
    }
}

impl fmt::Display for ListElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ElementKind::Box { .. } => write!(f, "box w={}", self.width),
            ElementKind::Glue {
                stretch, shrink, ..
            } => write!(f, "glue w={} +{} -{}", self.width, stretch, shrink),
            ElementKind::Penalty { value, flagged, .. } => {
                let flag = if *flagged { " flagged" } else { "" };
                write!(f, "penalty w={} p={}{}", self.width, value, flag)
            }
            ElementKind::Space(spec) => write!(f, "space {:?} {}", spec.side, spec.length),
            ElementKind::BorderOrPadding(spec) => {
                let what = if spec.border { "border" } else { "padding" };
                write!(f, "{} {:?} {}", what, spec.side, spec.length)
            }
            ElementKind::Break(possibility) => write!(f, "break p={}", possibility.penalty),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn min_opt_max_derives_elasticity() {
        let length = MinOptMax::new(200, 300, 500);
        assert_eq!(length.stretch(), 200);
        assert_eq!(length.shrink(), 100);
        assert!(length.is_elastic());
        assert!(!MinOptMax::fixed(12).is_elastic());
    }

    #[test]
    fn min_opt_max_new_restores_ordering() {
        let length = MinOptMax::new(400, 300, 100);
        assert_eq!(length, MinOptMax::fixed(300));
    }

    #[test]
    fn intersect_keeps_opt_inside_range() {
        let a = MinOptMax::new(100, 300, 600);
        let b = MinOptMax::new(200, 300, 400);
        let merged = a.intersect(b, 300);
        assert_eq!(merged, MinOptMax::new(200, 300, 400));
    }

    #[test]
    fn forcing_precedence_outranks_values() {
        assert!(Precedence::Force > Precedence::Value(i32::MAX));
        assert!(Precedence::Value(2) > Precedence::Value(1));
    }

    #[test]
    fn forced_break_detection_uses_infinite_threshold() {
        let forced = ListElement::forced_break(BreakClass::Page, Position::NONE);
        assert!(forced.is_forced_break());
        assert_eq!(forced.break_class(), BreakClass::Page);
        assert!(!ListElement::forbidden_break().is_forced_break());
    }
}
