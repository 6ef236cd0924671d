//! Part geometry: how much block- and inline-progression extent each part
//! offers.

use log::debug;
use serde::{Deserialize, Serialize};

use crate::error::BreakError;

/// Page and column coordinates of a part.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PartSlot {
    pub page_index: usize,
    pub column: usize,
    pub column_count: usize,
}

impl PartSlot {
    pub fn single(part_index: usize) -> Self {
        Self {
            page_index: part_index,
            column: 0,
            column_count: 1,
        }
    }

    /// Parts left on this page, this one included.
    pub fn remaining_columns(&self) -> usize {
        self.column_count.saturating_sub(self.column)
    }
}

pub trait GeometryProvider {
    /// Block-progression extent available to the part.
    fn available_extent(&mut self, part_index: usize) -> i32;

    /// Inline-progression extent of the part.
    fn inline_extent(&mut self, part_index: usize) -> i32;

    /// Sign of `inline_extent(part) - inline_extent(part + 1)`.
    fn compare_extents(&mut self, part_index: usize) -> i8 {
        let current = self.inline_extent(part_index);
        let next = self.inline_extent(part_index + 1);
        match current.cmp(&next) {
            core::cmp::Ordering::Greater => 1,
            core::cmp::Ordering::Less => -1,
            core::cmp::Ordering::Equal => 0,
        }
    }

    /// Drops cached allocations for `part_index` and everything after it.
    fn discard_cache_starting_with(&mut self, _part_index: usize) {}

    fn part_slot(&mut self, part_index: usize) -> PartSlot {
        PartSlot::single(part_index)
    }
}

/// Every part has the same extents.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ConstantGeometry {
    pub block_extent: i32,
    pub inline_extent: i32,
}

impl ConstantGeometry {
    pub fn new(block_extent: i32, inline_extent: i32) -> Self {
        Self {
            block_extent,
            inline_extent,
        }
    }
}

impl GeometryProvider for ConstantGeometry {
    fn available_extent(&mut self, _part_index: usize) -> i32 {
        self.block_extent
    }

    fn inline_extent(&mut self, _part_index: usize) -> i32 {
        self.inline_extent
    }
}

/// Body-region geometry of one kind of page.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageMaster {
    pub block_extent: i32,
    /// Inline extent of the whole body; columns share it.
    pub inline_extent: i32,
    #[serde(default = "default_column_count")]
    pub column_count: u32,
    #[serde(default)]
    pub column_gap: i32,
}

fn default_column_count() -> u32 {
    1
}

impl PageMaster {
    pub fn new(block_extent: i32, inline_extent: i32) -> Self {
        Self {
            block_extent,
            inline_extent,
            column_count: 1,
            column_gap: 0,
        }
    }

    pub fn with_columns(mut self, column_count: u32, column_gap: i32) -> Self {
        self.column_count = column_count.max(1);
        self.column_gap = column_gap;
        self
    }

    pub fn columns(&self) -> usize {
        self.column_count.max(1) as usize
    }

    pub fn column_extent(&self) -> i32 {
        let columns = self.columns() as i32;
        (self.inline_extent - self.column_gap * (columns - 1)) / columns
    }
}

/// Page masters selected by page position and parity.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageMasterSet {
    #[serde(default)]
    pub first: Option<PageMaster>,
    #[serde(default)]
    pub odd: Option<PageMaster>,
    #[serde(default)]
    pub even: Option<PageMaster>,
    pub rest: PageMaster,
}

impl PageMasterSet {
    pub fn uniform(master: PageMaster) -> Self {
        Self {
            first: None,
            odd: None,
            even: None,
            rest: master,
        }
    }

    pub fn with_first(mut self, master: PageMaster) -> Self {
        self.first = Some(master);
        self
    }

    pub fn from_json_str(input: &str) -> Result<Self, BreakError> {
        let set: PageMasterSet = serde_json::from_str(input)?;
        set.validate()?;
        Ok(set)
    }

    /// Every master must offer a positive block extent and column extent.
    pub fn validate(&self) -> Result<(), BreakError> {
        for master in [self.first, self.odd, self.even, Some(self.rest)]
            .into_iter()
            .flatten()
        {
            if master.block_extent <= 0 || master.column_extent() <= 0 {
                return Err(BreakError::InvalidConfig(format!(
                    "page master extents must be positive: {:?}",
                    master
                )));
            }
        }
        Ok(())
    }

    /// Master of the zero-based page `page_index`. Page numbers are one-based,
    /// so index 0 is an odd page.
    pub fn master_for(&self, page_index: usize) -> PageMaster {
        if page_index == 0 {
            if let Some(first) = self.first {
                return first;
            }
        }
        let parity = if page_index % 2 == 0 {
            self.odd
        } else {
            self.even
        };
        parity.unwrap_or(self.rest)
    }
}

/// A page allocated by the provider.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Page {
    pub index: usize,
    pub first_part: usize,
    pub master: PageMaster,
}

impl Page {
    pub fn part_range(&self) -> core::ops::Range<usize> {
        self.first_part..self.first_part + self.master.columns()
    }
}

/// Lazily allocated pages, each contributing one part per column.
#[derive(Clone, Debug)]
pub struct PageProvider {
    masters: PageMasterSet,
    pages: Vec<Page>,
}

impl PageProvider {
    pub fn new(masters: PageMasterSet) -> Self {
        Self {
            masters,
            pages: Vec::new(),
        }
    }

    pub fn cached_pages(&self) -> &[Page] {
        &self.pages
    }

    pub fn page_for_part(&mut self, part_index: usize) -> Page {
        loop {
            if let Some(page) = self.pages.last() {
                if page.part_range().end > part_index {
                    break;
                }
            }
            let (index, first_part) = match self.pages.last() {
                Some(page) => (page.index + 1, page.part_range().end),
                None => (0, 0),
            };
            self.pages.push(Page {
                index,
                first_part,
                master: self.masters.master_for(index),
            });
        }
        // pages are sorted by first part
        let found = self
            .pages
            .partition_point(|page| page.part_range().end <= part_index);
        self.pages[found]
    }
}

impl GeometryProvider for PageProvider {
    fn available_extent(&mut self, part_index: usize) -> i32 {
        self.page_for_part(part_index).master.block_extent
    }

    fn inline_extent(&mut self, part_index: usize) -> i32 {
        self.page_for_part(part_index).master.column_extent()
    }

    fn discard_cache_starting_with(&mut self, part_index: usize) {
        let keep = self
            .pages
            .partition_point(|page| page.part_range().end <= part_index);
        if keep < self.pages.len() {
            debug!(
                "discarding {} cached pages from part {}",
                self.pages.len() - keep,
                part_index
            );
            self.pages.truncate(keep);
        }
    }

    fn part_slot(&mut self, part_index: usize) -> PartSlot {
        let page = self.page_for_part(part_index);
        PartSlot {
            page_index: page.index,
            column: part_index - page.first_part,
            column_count: page.master.columns(),
        }
    }
}
