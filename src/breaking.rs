//! Total-fit breaking of block sequences into parts.
//!
//! Active nodes are kept per line (part) number. Every legal break is
//! checked against every active node; feasible candidates become new nodes,
//! the best per fitness class. When nothing stays active and forcing is on,
//! the algorithm restarts from the best too-short or too-long candidate so a
//! solution always exists.

use std::collections::BTreeMap;

use log::{debug, trace};

use crate::config::{Alignment, BreakerConfig, SearchMode};
use crate::element::{ElementKind, ListElement, INFINITE};
use crate::error::BreakError;
use crate::geometry::GeometryProvider;
use crate::page_break::{BreakOutcome, IpdChange, PageBreakPosition};
use crate::sequence::BlockSequence;

pub type NodeId = usize;

const INFINITE_RATIO: f64 = 1000.0;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Fitness {
    VeryTight,
    Decent,
    Loose,
    VeryLoose,
}

impl Fitness {
    pub fn from_ratio(ratio: f64) -> Self {
        if ratio < -0.5 {
            Fitness::VeryTight
        } else if ratio <= 0.5 {
            Fitness::Decent
        } else if ratio <= 1.0 {
            Fitness::Loose
        } else {
            Fitness::VeryLoose
        }
    }

    const ALL: [Fitness; 4] = [
        Fitness::VeryTight,
        Fitness::Decent,
        Fitness::Loose,
        Fitness::VeryLoose,
    ];

    fn index(self) -> usize {
        self as usize
    }

    fn distance(self, other: Fitness) -> usize {
        self.index().abs_diff(other.index())
    }
}

/// A break candidate kept by the algorithm. Totals are measured after the
/// break, past the discardable elements that follow it.
#[derive(Clone, Debug, PartialEq)]
pub struct KnuthNode {
    pub position: usize,
    pub line: usize,
    pub fitness: Fitness,
    pub total_width: i64,
    pub total_stretch: i64,
    pub total_shrink: i64,
    pub adjust_ratio: f64,
    pub available_shrink: i64,
    pub available_stretch: i64,
    pub difference: i64,
    pub total_demerits: f64,
    pub previous: Option<NodeId>,
    /// Content resumes at `position` itself rather than after it.
    content_start: bool,
}

impl KnuthNode {
    fn root(position: usize) -> Self {
        Self {
            position,
            line: 0,
            fitness: Fitness::Decent,
            total_width: 0,
            total_stretch: 0,
            total_shrink: 0,
            adjust_ratio: 0.0,
            available_shrink: 0,
            available_stretch: 0,
            difference: 0,
            total_demerits: 0.0,
            previous: None,
            content_start: true,
        }
    }
}

#[derive(Clone, Copy, Debug)]
struct BestRecord {
    demerits: f64,
    node: NodeId,
    ratio: f64,
    available_shrink: i64,
    available_stretch: i64,
    difference: i64,
}

#[derive(Default)]
struct BestRecords {
    records: [Option<BestRecord>; 4],
}

impl BestRecords {
    fn add(&mut self, fitness: Fitness, record: BestRecord) {
        let slot = &mut self.records[fitness.index()];
        if slot.is_none_or(|best| record.demerits <= best.demerits) {
            *slot = Some(record);
        }
    }

    fn min_demerits(&self) -> Option<f64> {
        self.records
            .iter()
            .flatten()
            .map(|record| record.demerits)
            .min_by(f64::total_cmp)
    }

    fn take(&mut self) -> [Option<BestRecord>; 4] {
        core::mem::take(&mut self.records)
    }
}

enum PartWidths<'g> {
    Constant(i32),
    Geometry(&'g mut dyn GeometryProvider),
}

#[derive(Clone, Copy)]
struct Totals {
    width: i64,
    stretch: i64,
    shrink: i64,
}

pub struct BreakingAlgorithm<'g> {
    widths: PartWidths<'g>,
    threshold: f64,
    repeated_flagged_demerit: f64,
    incompatible_fitness_demerit: f64,
    justify: bool,
    overflow_recovery: bool,
    favor_single_part: bool,
    target_part_count: Option<usize>,
    mode: SearchMode,
    start_part: usize,
    nodes: Vec<KnuthNode>,
    active: BTreeMap<usize, Vec<NodeId>>,
    total_width: i64,
    total_stretch: i64,
    total_shrink: i64,
    best: BestRecords,
    last_too_long: Option<NodeId>,
    last_too_short: Option<NodeId>,
    last_deactivated: Option<NodeId>,
    // (overflowing node, empty part inserted in front of it)
    recovery: Option<(NodeId, NodeId)>,
    ipd_difference: i8,
    best_node_for_ipd_change: Option<NodeId>,
    breaks: Vec<PageBreakPosition>,
}

impl<'g> BreakingAlgorithm<'g> {
    /// Parts take their extents from `geometry`; inline-extent changes
    /// between parts are tracked.
    pub fn with_geometry(config: &BreakerConfig, geometry: &'g mut dyn GeometryProvider) -> Self {
        Self::new(config, PartWidths::Geometry(geometry))
    }

    /// Every part has the same extent.
    pub fn with_constant_width(config: &BreakerConfig, width: i32) -> Self {
        Self::new(config, PartWidths::Constant(width))
    }

    fn new(config: &BreakerConfig, widths: PartWidths<'g>) -> Self {
        Self {
            widths,
            threshold: config.max_adjustment_ratio.unwrap_or(f64::INFINITY),
            repeated_flagged_demerit: config.repeated_flagged_demerit,
            incompatible_fitness_demerit: config.incompatible_fitness_demerit,
            justify: config.alignment() == Alignment::Justify,
            overflow_recovery: config.part_overflow_recovery(),
            favor_single_part: config.favors_single_part(),
            target_part_count: config.target_part_count,
            mode: config.search_mode,
            start_part: 0,
            nodes: Vec::new(),
            active: BTreeMap::new(),
            total_width: 0,
            total_stretch: 0,
            total_shrink: 0,
            best: BestRecords::default(),
            last_too_long: None,
            last_too_short: None,
            last_deactivated: None,
            recovery: None,
            ipd_difference: 0,
            best_node_for_ipd_change: None,
            breaks: Vec::new(),
        }
    }

    pub fn page_breaks(&self) -> &[PageBreakPosition] {
        &self.breaks
    }

    pub fn ipd_difference(&self) -> i8 {
        self.ipd_difference
    }

    /// Breaks collected so far plus the pending inline-extent change, if any.
    pub fn outcome(&self, part_count: usize) -> BreakOutcome {
        let ipd_change = match (self.ipd_difference, self.best_node_for_ipd_change) {
            (0, _) | (_, None) => None,
            (difference, Some(id)) => Some(IpdChange {
                difference,
                position: self.nodes[id].position,
                line: self.nodes[id].line,
            }),
        };
        BreakOutcome {
            part_count,
            breaks: self.breaks.clone(),
            ipd_change,
        }
    }

    /// Chooses break points for `seq`, whose first part is `start_part`.
    /// Returns the number of parts. With `force` off the run gives up and
    /// returns 0 when no feasible set of breaks exists.
    pub fn find_breaking_points(
        &mut self,
        seq: &BlockSequence,
        start_part: usize,
        force: bool,
    ) -> Result<usize, BreakError> {
        self.reset(start_part);
        let elements = seq.elements();
        let len = elements.len();
        if let Some(index) = elements.iter().position(ListElement::is_unresolved) {
            return Err(BreakError::InvalidSequence {
                index,
                reason: "unresolved element reached the breaking algorithm",
            });
        }
        let first_box = seq.first_box_index(0);
        if first_box >= len {
            return Ok(0);
        }
        if !elements.last().is_some_and(ListElement::is_forced_break) {
            return Err(BreakError::InvalidSequence {
                index: len - 1,
                reason: "sequence does not end with a forced break",
            });
        }

        let root = self.push_node(KnuthNode::root(first_box));
        self.add_node(0, root, len);

        if self.mode == SearchMode::FirstFit {
            return Ok(self.find_first_fit(elements, root));
        }

        let mut last_forced = root;
        let mut index = first_box;
        while index < len {
            let el = &elements[index];
            match el.kind {
                ElementKind::Box { .. } => self.total_width += i64::from(el.width),
                ElementKind::Glue {
                    stretch, shrink, ..
                } => {
                    if self.mode != SearchMode::OnlyForcedBreaks
                        && index > 0
                        && elements[index - 1].is_box()
                    {
                        self.consider_legal_break(elements, index, force);
                    }
                    self.total_width += i64::from(el.width);
                    self.total_stretch += i64::from(stretch);
                    self.total_shrink += i64::from(shrink);
                }
                ElementKind::Penalty { value, flagged, .. } => {
                    let allowed = match self.mode {
                        SearchMode::OnlyForcedBreaks => value <= -INFINITE,
                        SearchMode::NoFlaggedPenalties => !flagged,
                        _ => true,
                    };
                    if value < INFINITE && allowed {
                        self.consider_legal_break(elements, index, force);
                    }
                }
                _ => {}
            }

            if self.active.is_empty() {
                if self.ipd_difference != 0 {
                    return Ok(self.handle_ipd_change(elements));
                }
                if !force {
                    debug!(
                        "no feasible set of breaks with threshold {}",
                        self.threshold
                    );
                    return Ok(0);
                }
                if let Some(deactivated) = self.last_deactivated {
                    if deactivated != last_forced {
                        self.replace_last_deactivated(deactivated);
                    }
                }
                last_forced = match self.last_too_short {
                    Some(short) if self.nodes[short].position != self.nodes[last_forced].position => {
                        self.recovery = None;
                        short
                    }
                    _ => self.recover_from_overflow(index)?,
                };
                trace!(
                    "restarting from node at {} (line {})",
                    self.nodes[last_forced].position,
                    self.nodes[last_forced].line
                );
                index = self.restart_from(last_forced, elements);
                continue;
            }
            index += 1;
        }

        if self.active.is_empty() {
            return Ok(self.handle_ipd_change(elements));
        }
        let best = self.filter_active_nodes();
        self.calculate_break_points(best, elements);
        Ok(self.nodes[best].line)
    }

    fn reset(&mut self, start_part: usize) {
        self.start_part = start_part;
        self.nodes.clear();
        self.active.clear();
        self.total_width = 0;
        self.total_stretch = 0;
        self.total_shrink = 0;
        self.best = BestRecords::default();
        self.last_too_long = None;
        self.last_too_short = None;
        self.last_deactivated = None;
        self.recovery = None;
        self.ipd_difference = 0;
        self.best_node_for_ipd_change = None;
        self.breaks.clear();
    }

    fn push_node(&mut self, node: KnuthNode) -> NodeId {
        self.nodes.push(node);
        self.nodes.len() - 1
    }

    fn part_width(&mut self, line: usize) -> i32 {
        let part = self.start_part + line;
        match &mut self.widths {
            PartWidths::Constant(width) => *width,
            PartWidths::Geometry(geometry) => geometry.available_extent(part),
        }
    }

    fn add_node(&mut self, line: usize, id: NodeId, len: usize) {
        let position = self.nodes[id].position;
        if position + 1 < len && line > 0 {
            let part = self.start_part + line - 1;
            let difference = match &mut self.widths {
                PartWidths::Geometry(geometry) => geometry.compare_extents(part),
                PartWidths::Constant(_) => 0,
            };
            if difference != 0 {
                trace!(
                    "inline extent changes after part {}, holding node at {}",
                    part,
                    position
                );
                self.ipd_difference = difference;
                let replace = self
                    .best_node_for_ipd_change
                    .is_none_or(|best| self.nodes[id].total_demerits < self.nodes[best].total_demerits);
                if replace {
                    self.best_node_for_ipd_change = Some(id);
                }
                return;
            }
        }
        if position + 1 == len {
            self.ipd_difference = 0;
            self.best_node_for_ipd_change = None;
        }
        self.active.entry(line).or_default().push(id);
    }

    fn deactivate_node(&mut self, id: NodeId, line: usize) {
        if let Some(ids) = self.active.get_mut(&line) {
            ids.retain(|active| *active != id);
            if ids.is_empty() {
                self.active.remove(&line);
            }
        }
        self.last_deactivated = Some(self.compare_nodes(self.last_deactivated, id));
    }

    /// Later position wins; at the same position, fewer demerits win.
    fn compare_nodes(&self, current: Option<NodeId>, candidate: NodeId) -> NodeId {
        let Some(current) = current else {
            return candidate;
        };
        let (a, b) = (&self.nodes[current], &self.nodes[candidate]);
        if b.position > a.position
            || (b.position == a.position && b.total_demerits < a.total_demerits)
        {
            candidate
        } else {
            current
        }
    }

    fn replace_last_deactivated(&mut self, deactivated: NodeId) {
        if self.nodes[deactivated].adjust_ratio > 0.0 {
            self.last_too_short = Some(self.compare_nodes(self.last_too_short, deactivated));
        } else {
            self.last_too_long = Some(self.compare_nodes(self.last_too_long, deactivated));
        }
    }

    fn compute_difference(&mut self, id: NodeId, el: &ListElement) -> i64 {
        let node_width = self.nodes[id].total_width;
        let line = self.nodes[id].line;
        let mut actual = self.total_width - node_width;
        if el.is_penalty() {
            actual += i64::from(el.width);
        }
        i64::from(self.part_width(line)) - actual
    }

    fn compute_adjustment_ratio(&self, id: NodeId, difference: i64) -> f64 {
        let node = &self.nodes[id];
        if difference > 0 {
            let max_stretch = self.total_stretch - node.total_stretch;
            if max_stretch > 0 {
                difference as f64 / max_stretch as f64
            } else {
                INFINITE_RATIO
            }
        } else if difference < 0 {
            let max_shrink = self.total_shrink - node.total_shrink;
            if max_shrink > 0 {
                difference as f64 / max_shrink as f64
            } else {
                -INFINITE_RATIO
            }
        } else {
            0.0
        }
    }

    fn compute_demerits(
        &self,
        id: NodeId,
        elements: &[ListElement],
        el: &ListElement,
        fitness: Fitness,
        ratio: f64,
    ) -> f64 {
        let node = &self.nodes[id];
        let f = 1.0 + 100.0 * ratio.abs().powi(3);
        let mut demerits = match el.penalty_value() {
            Some(penalty) if penalty >= 0 => (f + f64::from(penalty)).powi(2),
            Some(penalty) if penalty > -INFINITE => f * f - f64::from(penalty).powi(2),
            _ => f * f,
        };
        if el.is_flagged() && elements.get(node.position).is_some_and(ListElement::is_flagged) {
            demerits += self.repeated_flagged_demerit;
        }
        if fitness.distance(node.fitness) > 1 {
            demerits += self.incompatible_fitness_demerit;
        }
        demerits + node.total_demerits
    }

    /// Totals after a break at `index`, past the glue that a break discards.
    fn totals_after_break(&self, elements: &[ListElement], index: usize) -> Totals {
        let mut totals = Totals {
            width: self.total_width,
            stretch: self.total_stretch,
            shrink: self.total_shrink,
        };
        for (i, el) in elements.iter().enumerate().skip(index) {
            if el.is_box() {
                break;
            }
            if el.is_glue() {
                totals.width += i64::from(el.width);
                totals.stretch += i64::from(el.stretch());
                totals.shrink += i64::from(el.shrink());
            } else if el.is_forced_break() && i != index {
                break;
            }
        }
        totals
    }

    fn new_break_node(
        &mut self,
        elements: &[ListElement],
        index: usize,
        line: usize,
        fitness: Fitness,
        record: BestRecord,
    ) -> NodeId {
        let totals = self.totals_after_break(elements, index);
        self.push_node(KnuthNode {
            position: index,
            line,
            fitness,
            total_width: totals.width,
            total_stretch: totals.stretch,
            total_shrink: totals.shrink,
            adjust_ratio: record.ratio,
            available_shrink: record.available_shrink,
            available_stretch: record.available_stretch,
            difference: record.difference,
            total_demerits: record.demerits,
            previous: Some(record.node),
            content_start: false,
        })
    }

    fn consider_legal_break(&mut self, elements: &[ListElement], index: usize, force: bool) {
        self.last_deactivated = None;
        self.last_too_long = None;
        let el = &elements[index];
        let lines: Vec<usize> = self.active.keys().copied().collect();
        for line in lines {
            let Some(ids) = self.active.get(&line).cloned() else {
                continue;
            };
            for id in ids {
                if self.nodes[id].position == index {
                    continue;
                }
                let difference = self.compute_difference(id, el);
                let ratio = self.compute_adjustment_ratio(id, difference);
                let available_shrink = self.total_shrink - self.nodes[id].total_shrink;
                let available_stretch = self.total_stretch - self.nodes[id].total_stretch;
                let fitness = Fitness::from_ratio(ratio);
                let demerits = self.compute_demerits(id, elements, el, fitness, ratio);
                let record = BestRecord {
                    demerits,
                    node: id,
                    ratio,
                    available_shrink,
                    available_stretch,
                    difference,
                };

                if ratio < -1.0 || el.is_forced_break() {
                    self.deactivate_node(id, line);
                }
                let feasible = ratio >= -1.0 && ratio <= self.threshold;
                if feasible {
                    trace!(
                        "feasible break at {} from {} r={:.3} d={:.1}",
                        index,
                        self.nodes[id].position,
                        ratio,
                        demerits
                    );
                    self.best.add(fitness, record);
                    self.last_too_short = None;
                }
                if force && !feasible {
                    self.force_node(elements, index, line, fitness, record);
                }
            }
            self.add_breaks(elements, index, line);
        }
    }

    fn force_node(
        &mut self,
        elements: &[ListElement],
        index: usize,
        line: usize,
        fitness: Fitness,
        record: BestRecord,
    ) {
        if record.ratio <= -1.0 {
            let better = self
                .last_too_long
                .is_none_or(|current| record.demerits < self.nodes[current].total_demerits);
            if better {
                self.last_too_long = Some(self.new_break_node(elements, index, line + 1, fitness, record));
            }
        } else {
            let better = self
                .last_too_short
                .is_none_or(|current| record.demerits <= self.nodes[current].total_demerits);
            if better {
                self.last_too_short = Some(self.new_break_node(elements, index, line + 1, fitness, record));
            }
        }
    }

    fn add_breaks(&mut self, elements: &[ListElement], index: usize, line: usize) {
        let Some(minimum) = self.best.min_demerits() else {
            return;
        };
        let limit = minimum + self.incompatible_fitness_demerit;
        let records = self.best.take();
        for fitness in Fitness::ALL {
            if let Some(record) = records[fitness.index()] {
                if record.demerits.is_finite() && record.demerits <= limit {
                    let id = self.new_break_node(elements, index, line + 1, fitness, record);
                    self.add_node(line + 1, id, elements.len());
                }
            }
        }
    }

    /// Index of the first element to scan after restarting from `id`.
    fn resume_index(&self, id: NodeId, elements: &[ListElement]) -> usize {
        let node = &self.nodes[id];
        if node.content_start {
            return node.position;
        }
        let mut index = node.position;
        while index + 1 < elements.len()
            && !elements[index + 1].is_box()
            && !elements[index + 1].is_forced_break()
        {
            index += 1;
        }
        index + 1
    }

    fn restart_from(&mut self, id: NodeId, elements: &[ListElement]) -> usize {
        self.nodes[id].total_demerits = 0.0;
        self.active.clear();
        let line = self.nodes[id].line;
        self.add_node(line, id, elements.len());
        self.total_width = self.nodes[id].total_width;
        self.total_stretch = self.nodes[id].total_stretch;
        self.total_shrink = self.nodes[id].total_shrink;
        self.last_too_long = None;
        self.last_too_short = None;
        self.last_deactivated = None;
        self.resume_index(id, elements)
    }

    /// Picks the node to continue from when every candidate overflows. With
    /// recovery enabled an empty part is tried once before the overflow is
    /// accepted.
    fn recover_from_overflow(&mut self, index: usize) -> Result<NodeId, BreakError> {
        let too_long = self.last_too_long.ok_or(BreakError::InvalidSequence {
            index,
            reason: "no break candidate to recover from",
        })?;
        if self.overflow_recovery {
            if let Some((original, empty)) = self.recovery.take() {
                if self.nodes[too_long].previous == Some(empty) {
                    debug!(
                        "empty part did not help, accepting overflow at {}",
                        self.nodes[original].position
                    );
                    return Ok(original);
                }
            }
            if let Some(previous) = self.nodes[too_long].previous {
                let base = self.nodes[previous].clone();
                let width = self.part_width(base.line);
                let empty = self.push_node(KnuthNode {
                    line: base.line + 1,
                    fitness: Fitness::Decent,
                    adjust_ratio: 0.0,
                    available_shrink: 0,
                    available_stretch: 0,
                    difference: i64::from(width),
                    previous: Some(previous),
                    ..base
                });
                debug!(
                    "content overflows part {}, trying an empty part first",
                    self.start_part + base.line
                );
                self.recovery = Some((too_long, empty));
                return Ok(empty);
            }
        }
        Ok(too_long)
    }

    fn handle_ipd_change(&mut self, elements: &[ListElement]) -> usize {
        let Some(best) = self.best_node_for_ipd_change else {
            return 0;
        };
        debug!(
            "inline extent change: stopping after part {} at element {}",
            self.start_part + self.nodes[best].line - 1,
            self.nodes[best].position
        );
        self.calculate_break_points(best, elements);
        self.active.clear();
        self.nodes[best].line
    }

    fn filter_active_nodes(&mut self) -> NodeId {
        let mut best: Option<NodeId> = None;
        for id in self.active.values().flatten().copied() {
            let Some(current) = best else {
                best = Some(id);
                continue;
            };
            let (a, b) = (&self.nodes[current], &self.nodes[id]);
            if self.favor_single_part
                && b.line > 1
                && a.difference.abs() < a.available_shrink
            {
                continue;
            }
            let better = match self.target_part_count {
                Some(target) => {
                    let (da, db) = (a.line.abs_diff(target), b.line.abs_diff(target));
                    db < da || (db == da && b.total_demerits < a.total_demerits)
                }
                None => {
                    b.position > a.position
                        || (b.position == a.position && b.total_demerits < a.total_demerits)
                }
            };
            if better {
                best = Some(id);
            }
        }
        let best = best.unwrap_or_default();
        let line = self.nodes[best].line;
        self.active.clear();
        self.active.insert(line, vec![best]);
        best
    }

    fn calculate_break_points(&mut self, last: NodeId, elements: &[ListElement]) {
        let mut chain = Vec::new();
        let mut current = Some(last);
        while let Some(id) = current {
            let node = &self.nodes[id];
            if node.previous.is_none() {
                break;
            }
            chain.push(id);
            current = node.previous;
        }
        chain.reverse();
        for id in chain {
            let node = &self.nodes[id];
            let difference = node.difference;
            let fits_by_shrinking = difference < 0 && -difference <= node.available_shrink;
            let ratio = if self.justify || fits_by_shrinking {
                node.adjust_ratio
            } else {
                0.0
            };
            let overflow = if difference < 0 {
                (-difference - node.available_shrink).max(0)
            } else {
                0
            };
            trace!(
                "break at {} ({}) line {} diff {}",
                node.position,
                elements.get(node.position).map_or(String::new(), |el| el.to_string()),
                node.line,
                difference
            );
            self.breaks.push(PageBreakPosition {
                leaf_pos: node.position,
                bpd_adjust: ratio.max(-1.0),
                difference: saturate(difference),
                overflow: saturate(overflow),
                line: node.line,
            });
        }
    }

    /// Greedy variant: each part ends at the last break that still fits.
    fn find_first_fit(&mut self, elements: &[ListElement], root: NodeId) -> usize {
        let len = elements.len();
        let mut current = root;
        let mut pending: Option<NodeId> = None;
        let mut index = self.nodes[root].position;
        while index < len {
            let el = &elements[index];
            let legal = match el.kind {
                ElementKind::Box { .. } => {
                    self.total_width += i64::from(el.width);
                    false
                }
                ElementKind::Glue { .. } => index > 0 && elements[index - 1].is_box(),
                ElementKind::Penalty { value, .. } => value < INFINITE,
                _ => false,
            };
            if legal {
                let difference = self.compute_difference(current, el);
                let ratio = self.compute_adjustment_ratio(current, difference);
                let record = BestRecord {
                    demerits: 0.0,
                    node: current,
                    ratio,
                    available_shrink: self.total_shrink - self.nodes[current].total_shrink,
                    available_stretch: self.total_stretch - self.nodes[current].total_stretch,
                    difference,
                };
                let line = self.nodes[current].line + 1;
                let fitness = Fitness::from_ratio(ratio);
                if ratio >= -1.0 {
                    let id = self.new_break_node(elements, index, line, fitness, record);
                    if el.is_forced_break() {
                        pending = None;
                        current = id;
                        index = self.restart_from(id, elements);
                        continue;
                    }
                    pending = Some(id);
                } else {
                    let target = match pending.take() {
                        Some(id) => id,
                        None => self.new_break_node(elements, index, line, fitness, record),
                    };
                    current = target;
                    index = self.restart_from(target, elements);
                    continue;
                }
            }
            if el.is_glue() {
                self.total_width += i64::from(el.width);
                self.total_stretch += i64::from(el.stretch());
                self.total_shrink += i64::from(el.shrink());
            }
            index += 1;
        }
        self.calculate_break_points(current, elements);
        self.nodes[current].line
    }
}

fn saturate(value: i64) -> i32 {
    value.clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BreakerKind, DisplayAlign};
    use crate::element::{BreakClass, Position};
    use crate::geometry::ConstantGeometry;

    fn boxed(width: i32) -> ListElement {
        ListElement::new_box(width, Position::NONE)
    }

    fn penalty(value: i32) -> ListElement {
        ListElement::penalty(0, value, false, BreakClass::Any, Position::NONE)
    }

    fn sequence(elements: Vec<ListElement>) -> BlockSequence {
        BlockSequence::from_elements(BreakClass::Any, DisplayAlign::Before, elements)
            .end_sequence(Position::NONE, false)
            .unwrap()
    }

    fn leaf_positions(alg: &BreakingAlgorithm<'_>) -> Vec<usize> {
        alg.page_breaks().iter().map(|pbp| pbp.leaf_pos).collect()
    }

    #[test]
    fn fitness_classes_follow_ratio_bands() {
        assert_eq!(Fitness::from_ratio(-0.9), Fitness::VeryTight);
        assert_eq!(Fitness::from_ratio(0.5), Fitness::Decent);
        assert_eq!(Fitness::from_ratio(0.9), Fitness::Loose);
        assert_eq!(Fitness::from_ratio(3.0), Fitness::VeryLoose);
    }

    #[test]
    fn two_exact_parts() {
        let seq = sequence(vec![
            boxed(1000),
            ListElement::glue(0, 0, 0, Position::NONE),
            penalty(0),
            boxed(1000),
        ]);
        let mut alg = BreakingAlgorithm::with_constant_width(&BreakerConfig::default(), 1000);
        let parts = alg.find_breaking_points(&seq, 0, true).unwrap();
        assert_eq!(parts, 2);
        let positions = leaf_positions(&alg);
        assert_eq!(positions[0], 2);
        assert_eq!(positions[1], seq.len() - 1);
        assert!(alg.page_breaks().iter().all(|pbp| pbp.overflow == 0));
    }

    #[test]
    fn everything_fits_in_one_part() {
        let seq = sequence(vec![
            boxed(1000),
            ListElement::glue(0, 0, 0, Position::NONE),
            penalty(0),
            boxed(1000),
        ]);
        let mut alg = BreakingAlgorithm::with_constant_width(&BreakerConfig::default(), 2500);
        assert_eq!(alg.find_breaking_points(&seq, 0, true).unwrap(), 1);
    }

    #[test]
    fn forced_break_splits_even_with_room_left() {
        let seq = sequence(vec![boxed(500), penalty(-INFINITE), boxed(500)]);
        let mut alg = BreakingAlgorithm::with_constant_width(&BreakerConfig::default(), 2000);
        assert_eq!(alg.find_breaking_points(&seq, 0, true).unwrap(), 2);
        assert_eq!(leaf_positions(&alg)[0], 1);
    }

    #[test]
    fn oversized_box_is_accepted_as_overflow() {
        let seq = sequence(vec![boxed(5000)]);
        let mut alg = BreakingAlgorithm::with_constant_width(&BreakerConfig::default(), 3000);
        assert_eq!(alg.find_breaking_points(&seq, 0, true).unwrap(), 1);
        let pbp = alg.page_breaks()[0];
        assert_eq!(pbp.difference, -2000);
        assert_eq!(pbp.overflow, 2000);
    }

    #[test]
    fn without_force_infeasible_input_yields_no_parts() {
        let seq = sequence(vec![boxed(5000)]);
        let mut alg = BreakingAlgorithm::with_constant_width(&BreakerConfig::default(), 3000);
        assert_eq!(alg.find_breaking_points(&seq, 0, false).unwrap(), 0);
    }

    #[test]
    fn bounded_ratio_falls_back_to_too_short_parts() {
        let mut config = BreakerConfig::for_kind(BreakerKind::BlockContainer);
        config.max_adjustment_ratio = Some(1.0);
        let seq = sequence(vec![boxed(1000), penalty(0), boxed(1000), penalty(0), boxed(1000)]);
        let mut alg = BreakingAlgorithm::with_constant_width(&config, 2500);
        assert_eq!(alg.find_breaking_points(&seq, 0, true).unwrap(), 2);
        assert_eq!(leaf_positions(&alg)[0], 3);
    }

    #[test]
    fn shrink_is_used_before_overflowing() {
        let seq = sequence(vec![
            boxed(1000),
            ListElement::glue(200, 0, 200, Position::NONE),
            boxed(1000),
        ]);
        let mut alg = BreakingAlgorithm::with_constant_width(&BreakerConfig::default(), 2100);
        assert_eq!(alg.find_breaking_points(&seq, 0, true).unwrap(), 1);
        let pbp = alg.page_breaks()[0];
        assert_eq!(pbp.difference, -100);
        assert!((pbp.bpd_adjust + 0.5).abs() < 1e-9);
        assert_eq!(pbp.overflow, 0);
    }

    #[test]
    fn first_fit_fills_parts_greedily() {
        let mut elements = Vec::new();
        for i in 0..5 {
            if i > 0 {
                elements.push(ListElement::glue(0, 0, 0, Position::NONE));
            }
            elements.push(boxed(400));
        }
        let seq = sequence(elements);
        let config = BreakerConfig::default().with_search_mode(SearchMode::FirstFit);
        let mut alg = BreakingAlgorithm::with_constant_width(&config, 1000);
        assert_eq!(alg.find_breaking_points(&seq, 0, true).unwrap(), 3);
        assert_eq!(leaf_positions(&alg)[..2], [3, 7]);
    }

    #[test]
    fn only_forced_breaks_ignores_optional_penalties() {
        let seq = sequence(vec![boxed(600), penalty(0), boxed(600)]);
        let config = BreakerConfig::default().with_search_mode(SearchMode::OnlyForcedBreaks);
        let mut alg = BreakingAlgorithm::with_constant_width(&config, 1000);
        assert_eq!(alg.find_breaking_points(&seq, 0, true).unwrap(), 1);
        assert_eq!(alg.page_breaks()[0].overflow, 200);
    }

    #[test]
    fn unresolved_elements_are_rejected() {
        let seq = BlockSequence::from_elements(
            BreakClass::Any,
            DisplayAlign::Before,
            vec![
                boxed(10),
                ListElement::break_possibility(
                    crate::element::BreakPossibility::new(0),
                    Position::NONE,
                ),
                ListElement::forced_break(BreakClass::Any, Position::NONE),
            ],
        );
        let mut alg = BreakingAlgorithm::with_constant_width(&BreakerConfig::default(), 100);
        let err = alg.find_breaking_points(&seq, 0, true).unwrap_err();
        assert!(matches!(err, BreakError::InvalidSequence { index: 1, .. }));
    }

    struct NarrowingGeometry;

    impl GeometryProvider for NarrowingGeometry {
        fn available_extent(&mut self, _part_index: usize) -> i32 {
            3000
        }

        fn inline_extent(&mut self, part_index: usize) -> i32 {
            if part_index == 0 {
                2000
            } else {
                1000
            }
        }
    }

    #[test]
    fn inline_extent_change_stops_after_first_part() {
        let mut elements = Vec::new();
        for i in 0..6 {
            if i > 0 {
                elements.push(penalty(0));
            }
            elements.push(boxed(1000));
        }
        let seq = sequence(elements);
        let mut geometry = NarrowingGeometry;
        let mut alg = BreakingAlgorithm::with_geometry(&BreakerConfig::default(), &mut geometry);
        let parts = alg.find_breaking_points(&seq, 0, true).unwrap();
        assert_eq!(parts, 1);
        assert_eq!(alg.ipd_difference(), 1);
        let outcome = alg.outcome(parts);
        let change = outcome.ipd_change.unwrap();
        assert_eq!(change.position, 5);
        assert_eq!(change.line, 1);
        assert_eq!(leaf_positions(&alg), vec![5]);
    }

    #[test]
    fn constant_geometry_never_reports_inline_changes() {
        let seq = sequence(vec![boxed(1000), penalty(0), boxed(1000), penalty(0), boxed(1000)]);
        let mut geometry = ConstantGeometry::new(1000, 500);
        let mut alg = BreakingAlgorithm::with_geometry(&BreakerConfig::default(), &mut geometry);
        assert_eq!(alg.find_breaking_points(&seq, 0, true).unwrap(), 3);
        assert_eq!(alg.ipd_difference(), 0);
    }
}
