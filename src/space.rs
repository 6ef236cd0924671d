//! Resolution of space, border and padding specifiers into glue.
//!
//! Every maximal run of unresolved elements is resolved three ways around each
//! break possibility inside it: what stays before the break when it is taken,
//! what starts the next part, and what remains when no break happens. The
//! outcome is recorded in [`SpaceResolutions`] so painting can later tell
//! every participant which lengths survived.

use log::trace;
use smallvec::SmallVec;

use crate::element::{
    BreakPossibility, ElementKind, ListElement, MinOptMax, Position, Precedence, RelSide,
    SpaceRef, INFINITE,
};
use crate::participant::{SpaceNotification, SpecifierKind};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Specifier {
    position: Position,
    kind: SpecifierKind,
    side: RelSide,
    conditional: bool,
    is_first: bool,
    is_last: bool,
    precedence: Precedence,
    length: Option<MinOptMax>,
}

impl Specifier {
    fn from_element(el: &ListElement) -> Option<Self> {
        match el.kind {
            ElementKind::Space(spec) => Some(Self {
                position: el.position,
                kind: SpecifierKind::Space,
                side: spec.side,
                conditional: spec.conditional,
                is_first: spec.is_first,
                is_last: spec.is_last,
                precedence: spec.precedence,
                length: Some(spec.length),
            }),
            ElementKind::BorderOrPadding(spec) => Some(Self {
                position: el.position,
                kind: if spec.border {
                    SpecifierKind::Border
                } else {
                    SpecifierKind::Padding
                },
                side: spec.side,
                conditional: spec.conditional,
                is_first: spec.is_first,
                is_last: spec.is_last,
                precedence: Precedence::Force,
                length: Some(spec.length),
            }),
            _ => None,
        }
    }

    fn is_space(&self) -> bool {
        self.kind == SpecifierKind::Space
    }

    fn notification(&self) -> SpaceNotification {
        SpaceNotification {
            position: self.position,
            kind: self.kind,
            side: self.side,
            length: self.length,
        }
    }
}

#[derive(Clone, Debug)]
enum Resolution {
    Break {
        first: Vec<Specifier>,
        second: Vec<Specifier>,
        no_break: Vec<Specifier>,
    },
    Run {
        specifiers: Vec<Specifier>,
    },
}

/// Outcome of every resolved window, addressed by the [`SpaceRef`] slots the
/// resolver stamps on its output.
///
/// Slots keep growing for the whole layout; entries below `base` have been
/// released once the parts referring to them were painted.
#[derive(Clone, Debug, Default)]
pub struct SpaceResolutions {
    entries: Vec<Resolution>,
    base: u32,
}

impl SpaceResolutions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Slot the next resolved window will get.
    pub fn next_slot(&self) -> u32 {
        self.base + self.entries.len() as u32
    }

    /// Drops every entry below `slot`. Lookups of released slots find nothing.
    pub fn release_before(&mut self, slot: u32) {
        let count = (slot.saturating_sub(self.base) as usize).min(self.entries.len());
        if count == 0 {
            return;
        }
        self.entries.drain(..count);
        self.base += count as u32;
        trace!("released {} space resolutions, base now {}", count, self.base);
    }

    fn push(&mut self, resolution: Resolution) -> u32 {
        self.entries.push(resolution);
        self.next_slot() - 1
    }

    fn entry(&self, slot: u32) -> Option<&Resolution> {
        self.entries.get(slot.checked_sub(self.base)? as usize)
    }

    fn notify_break(&self, slot: u32, taken: Option<RelSide>, out: &mut Vec<SpaceNotification>) {
        let Some(Resolution::Break {
            first,
            second,
            no_break,
        }) = self.entry(slot)
        else {
            return;
        };
        let specifiers = match taken {
            Some(RelSide::Before) => second,
            Some(RelSide::After) => first,
            None => no_break,
        };
        out.extend(specifiers.iter().map(Specifier::notification));
    }

    fn notify_run(&self, slot: u32, out: &mut Vec<SpaceNotification>) {
        if let Some(Resolution::Run { specifiers }) = self.entry(slot) {
            out.extend(specifiers.iter().map(Specifier::notification));
        }
    }

    /// Final specifier lengths for the part covering `start..=end`.
    ///
    /// `prev_break` is the index of the break that opened the part, if any;
    /// the element at `end` is the break closing it.
    pub fn conditionals_notification(
        &self,
        elements: &[ListElement],
        start: usize,
        end: usize,
        prev_break: Option<usize>,
    ) -> Vec<SpaceNotification> {
        let break_slot = |index: usize| match elements.get(index).map(|el| el.position.space) {
            Some(SpaceRef::Break(slot)) => Some(slot),
            _ => None,
        };
        let mut out = Vec::new();
        let before = prev_break.and_then(break_slot);
        let after = break_slot(end);
        if let Some(slot) = before {
            self.notify_break(slot, Some(RelSide::Before), &mut out);
        }
        if let Some(slot) = after {
            self.notify_break(slot, Some(RelSide::After), &mut out);
        }
        let last = end.min(elements.len().saturating_sub(1));
        if start <= last {
            for el in &elements[start..=last] {
                match el.position.space {
                    SpaceRef::Run(slot) => self.notify_run(slot, &mut out),
                    SpaceRef::Break(slot) if Some(slot) != before && Some(slot) != after => {
                        self.notify_break(slot, None, &mut out)
                    }
                    _ => {}
                }
            }
        }
        out
    }
}

/// Replaces unresolved elements of a list by plain glue, boxes and penalties.
pub struct SpaceResolver<'a> {
    resolutions: &'a mut SpaceResolutions,
}

impl<'a> SpaceResolver<'a> {
    pub fn new(resolutions: &'a mut SpaceResolutions) -> Self {
        Self { resolutions }
    }

    /// Resolves every unresolved run of `elements`. Lists without unresolved
    /// elements come back unchanged.
    pub fn resolve_element_list(&mut self, elements: Vec<ListElement>) -> Vec<ListElement> {
        if !elements.iter().any(ListElement::is_unresolved) {
            return elements;
        }
        let mut out = Vec::with_capacity(elements.len() + 8);
        let mut run: Vec<ListElement> = Vec::new();
        for el in elements {
            if el.is_unresolved() {
                run.push(el);
                continue;
            }
            if !run.is_empty() {
                let is_first = out.is_empty();
                self.resolve_run(core::mem::take(&mut run), is_first, false, &mut out);
            }
            out.push(el);
        }
        if !run.is_empty() {
            let is_first = out.is_empty();
            self.resolve_run(run, is_first, true, &mut out);
        }
        out
    }

    fn resolve_run(
        &mut self,
        run: Vec<ListElement>,
        is_first: bool,
        is_last: bool,
        out: &mut Vec<ListElement>,
    ) {
        let mut segments: Vec<Vec<Specifier>> = vec![Vec::new()];
        let mut breaks: Vec<(BreakPossibility, Position)> = Vec::new();
        for el in &run {
            if let ElementKind::Break(possibility) = el.kind {
                breaks.push((possibility, el.position));
                segments.push(Vec::new());
            } else if let (Some(spec), Some(segment)) =
                (Specifier::from_element(el), segments.last_mut())
            {
                segment.push(spec);
            }
        }

        if breaks.is_empty() {
            let specifiers = segments.pop().unwrap_or_default();
            self.resolve_unbroken(specifiers, is_first, is_last, out);
            return;
        }
        for (k, (possibility, position)) in breaks.into_iter().enumerate() {
            // a segment between two breaks belongs to the earlier one only
            let first = if k == 0 {
                core::mem::take(&mut segments[0])
            } else {
                Vec::new()
            };
            let second = core::mem::take(&mut segments[k + 1]);
            self.resolve_break(first, second, possibility, position, out);
        }
    }

    fn resolve_break(
        &mut self,
        mut first: Vec<Specifier>,
        mut second: Vec<Specifier>,
        possibility: BreakPossibility,
        position: Position,
        out: &mut Vec<ListElement>,
    ) {
        let mut no_break: Vec<Specifier> = first.iter().chain(second.iter()).copied().collect();

        remove_conditional_border_and_padding(&mut first, true);
        perform_rule_1(&mut first, true);
        perform_rules_2_to_3(&mut first);

        remove_conditional_border_and_padding(&mut second, false);
        perform_rule_1(&mut second, false);
        perform_rules_2_to_3(&mut second);

        perform_rules_2_to_3(&mut no_break);

        let before = total_length(&first);
        let after = total_length(&second);
        let unbroken = total_length(&no_break);
        trace!(
            "break window: before={} after={} no-break={}",
            before,
            after,
            unbroken
        );

        let slot = self.resolutions.push(Resolution::Break {
            first,
            second,
            no_break,
        });
        let forced = possibility.penalty <= -INFINITE;

        if before.is_non_zero() {
            out.push(ListElement::forbidden_break());
            out.push(ListElement::resolved_glue(before));
            if forced {
                out.push(ListElement::aux_box(0, Position::NONE));
            }
        }
        out.push(ListElement::penalty(
            possibility.penalty_width,
            possibility.penalty,
            false,
            possibility.break_class,
            position.with_space(SpaceRef::Break(slot)),
        ));
        if forced {
            return;
        }

        let spanning = before + after;
        let remainder = MinOptMax::new(
            unbroken.min - spanning.min,
            unbroken.opt - spanning.opt,
            unbroken.max - spanning.max,
        );
        if remainder.is_non_zero() {
            out.push(ListElement::resolved_glue(remainder));
        }
        if after.is_non_zero() {
            out.push(ListElement::aux_box(0, Position::NONE));
            out.push(ListElement::forbidden_break());
            out.push(ListElement::resolved_glue(after));
        }
    }

    fn resolve_unbroken(
        &mut self,
        mut specifiers: Vec<Specifier>,
        is_first: bool,
        is_last: bool,
        out: &mut Vec<ListElement>,
    ) {
        if is_first {
            remove_conditional_border_and_padding(&mut specifiers, false);
            perform_rule_1(&mut specifiers, false);
        }
        if is_last {
            remove_conditional_border_and_padding(&mut specifiers, true);
            perform_rule_1(&mut specifiers, true);
        }
        perform_rules_2_to_3(&mut specifiers);
        let length = total_length(&specifiers);

        let slot = self.resolutions.push(Resolution::Run { specifiers });
        out.push(ListElement::aux_box(
            0,
            Position::NONE.with_space(SpaceRef::Run(slot)),
        ));
        if length.is_non_zero() {
            out.push(ListElement::forbidden_break());
            out.push(ListElement::resolved_glue(length));
        }
    }
}

fn boundary_order(len: usize, reverse: bool) -> SmallVec<[usize; 8]> {
    if reverse {
        (0..len).rev().collect()
    } else {
        (0..len).collect()
    }
}

fn remove_conditional_border_and_padding(specifiers: &mut [Specifier], reverse: bool) {
    for index in boundary_order(specifiers.len(), reverse) {
        let spec = &mut specifiers[index];
        if spec.is_space() {
            continue;
        }
        if spec.conditional && !(spec.is_first || spec.is_last) {
            spec.length = None;
        } else {
            break;
        }
    }
}

/// Conditional spaces next to the boundary are dropped up to the first fence.
fn perform_rule_1(specifiers: &mut [Specifier], reverse: bool) {
    for index in boundary_order(specifiers.len(), reverse) {
        let spec = &mut specifiers[index];
        if spec.length.is_none() {
            continue;
        }
        if !spec.is_space() || !spec.conditional {
            break;
        }
        spec.length = None;
    }
}

/// Applies precedence resolution to every group of spaces not separated by a
/// surviving border or padding.
fn perform_rules_2_to_3(specifiers: &mut [Specifier]) {
    let mut group: SmallVec<[usize; 8]> = SmallVec::new();
    for index in 0..specifiers.len() {
        let spec = &specifiers[index];
        if spec.is_space() || spec.length.is_none() {
            if spec.is_space() {
                group.push(index);
            }
            continue;
        }
        resolve_group(specifiers, &group);
        group.clear();
    }
    resolve_group(specifiers, &group);
}

fn resolve_group(specifiers: &mut [Specifier], group: &[usize]) {
    let live: SmallVec<[usize; 8]> = group
        .iter()
        .copied()
        .filter(|i| specifiers[*i].length.is_some())
        .collect();
    if live.is_empty() {
        return;
    }

    if live
        .iter()
        .any(|i| specifiers[*i].precedence == Precedence::Force)
    {
        for i in &live {
            if specifiers[*i].precedence != Precedence::Force {
                specifiers[*i].length = None;
            }
        }
        return;
    }

    let highest = live
        .iter()
        .map(|i| specifiers[*i].precedence)
        .max()
        .unwrap_or_default();
    let greatest = live
        .iter()
        .filter(|i| specifiers[**i].precedence == highest)
        .filter_map(|i| specifiers[*i].length.map(|l| l.opt))
        .max()
        .unwrap_or(0);

    let mut survivors: SmallVec<[usize; 8]> = SmallVec::new();
    for i in &live {
        let spec = &mut specifiers[*i];
        let keep = spec.precedence == highest && spec.length.is_some_and(|l| l.opt == greatest);
        if keep {
            survivors.push(*i);
        } else {
            spec.length = None;
        }
    }

    if let Some((&last, rest)) = survivors.split_last() {
        if rest.is_empty() {
            return;
        }
        let mut merged = specifiers[last].length.unwrap_or_default();
        for i in rest {
            if let Some(length) = specifiers[*i].length.take() {
                merged = merged.intersect(length, greatest);
            }
        }
        specifiers[last].length = Some(merged);
    }
}

fn total_length(specifiers: &[Specifier]) -> MinOptMax {
    specifiers
        .iter()
        .filter_map(|spec| spec.length)
        .fold(MinOptMax::ZERO, |acc, length| acc + length)
}
