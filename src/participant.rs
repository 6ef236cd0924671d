//! Layout participants and the protocol content sources implement.

use smallvec::SmallVec;

use crate::config::Alignment;
use crate::element::{Adjustment, ListElement, MinOptMax, Position, RelSide};
use crate::error::BreakError;

/// Index of a participant in its [`ParticipantTable`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ParticipantId(pub u32);

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParticipantInfo {
    pub name: String,
    pub parent: Option<ParticipantId>,
    pub restartable: bool,
}

/// Arena of participants linked child-to-parent.
#[derive(Clone, Debug, Default)]
pub struct ParticipantTable {
    entries: Vec<ParticipantInfo>,
}

impl ParticipantTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        name: impl Into<String>,
        parent: Option<ParticipantId>,
        restartable: bool,
    ) -> ParticipantId {
        let id = ParticipantId(self.entries.len() as u32);
        self.entries.push(ParticipantInfo {
            name: name.into(),
            parent,
            restartable,
        });
        id
    }

    pub fn get(&self, id: ParticipantId) -> Option<&ParticipantInfo> {
        self.entries.get(id.0 as usize)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// `id` followed by its ancestors, innermost first.
    pub fn chain(&self, id: ParticipantId) -> SmallVec<[ParticipantId; 8]> {
        let mut chain = SmallVec::new();
        let mut current = Some(id);
        while let Some(id) = current {
            if chain.contains(&id) {
                break;
            }
            chain.push(id);
            current = self.get(id).and_then(|info| info.parent);
        }
        chain
    }

    /// True when the position's participant or any ancestor cannot restart
    /// mid-content.
    pub fn contains_non_restartable(&self, position: &Position) -> bool {
        let Some(id) = position.participant else {
            return false;
        };
        self.chain(id)
            .iter()
            .any(|id| self.get(*id).is_some_and(|info| !info.restartable))
    }
}

/// Layout inputs handed to content sources when they generate elements.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LayoutContext {
    pub stack_limit: i32,
    pub ref_ipd: i32,
    pub part_index: usize,
    pub alignment: Alignment,
}

/// Where a content source resumes after an IPD change. `position.index ==
/// None` restarts the participant from its first child.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RestartPoint {
    pub position: Position,
    /// The break at `position` was not taken. The source emits again what it
    /// produced between the last box before the break and the break, then
    /// the break itself, so the spaces around it are resolved together.
    pub reopen: bool,
}

impl RestartPoint {
    /// Resume right after a taken break.
    pub fn after(position: Position) -> Self {
        Self {
            position,
            reopen: false,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SpecifierKind {
    Space,
    Border,
    Padding,
}

/// Final length of one specifier after breaks were decided. `length ==
/// None` means the specifier was discarded.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SpaceNotification {
    pub position: Position,
    pub kind: SpecifierKind,
    pub side: RelSide,
    pub length: Option<MinOptMax>,
}

/// A change the justification pass asks a participant to absorb.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PendingAdjustment {
    pub position: Position,
    pub adjustment: Adjustment,
    pub amount: i32,
}

/// Producer of block-progression element lists.
pub trait ContentSource {
    /// Next element list, up to and including the first forced break or the
    /// end of content. With `restart` set, generation resumes right after the
    /// given position, or just before it when the point reopens its break.
    fn next_elements(
        &mut self,
        ctx: &LayoutContext,
        restart: Option<&RestartPoint>,
    ) -> Result<Vec<ListElement>, BreakError>;

    fn is_finished(&self) -> bool;

    /// Rewinds to the start of content.
    fn reset(&mut self);

    fn participants(&self) -> &ParticipantTable;

    fn notify_space(&mut self, _notification: &SpaceNotification) {}

    /// Applies as much of the adjustment as possible and returns the amount
    /// actually applied.
    fn negotiate_adjustment(&mut self, _adjustment: &PendingAdjustment) -> i32 {
        0
    }

    /// Glue at `position` was dropped at the head of a part.
    fn discard_space(&mut self, _position: Position) {}

    /// Regenerates `old` after adjustments were negotiated.
    fn changed_elements(
        &mut self,
        old: &[ListElement],
        _ctx: &LayoutContext,
    ) -> Result<Vec<ListElement>, BreakError> {
        Ok(old.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_restartable_ancestor_taints_descendants() {
        let mut table = ParticipantTable::new();
        let flow = table.register("flow", None, true);
        let table_block = table.register("table", Some(flow), false);
        let cell = table.register("cell", Some(table_block), true);
        let para = table.register("para", Some(flow), true);

        assert!(table.contains_non_restartable(&Position::new(cell, 3)));
        assert!(!table.contains_non_restartable(&Position::new(para, 0)));
        assert!(!table.contains_non_restartable(&Position::NONE));
        assert_eq!(table.chain(cell).as_slice(), &[cell, table_block, flow]);
    }
}
