use serde::{Deserialize, Serialize};

/// A block (or one line of it) placed on a page.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockCommand {
    /// Index of the block in its flow.
    pub block: usize,
    /// Line of the block, when the box is a line of a paragraph.
    pub line: Option<usize>,
    /// Left x, in millipoints from the page's content origin.
    pub x: i32,
    /// Top y.
    pub y: i32,
    /// Inline extent the block was stacked into.
    pub width: i32,
    /// Block extent.
    pub height: i32,
}

/// Resolved space between blocks, after stretch or shrink was applied.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpaceCommand {
    pub x: i32,
    pub y: i32,
    pub extent: i32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DrawCommand {
    Block(BlockCommand),
    Space(SpaceCommand),
}

impl DrawCommand {
    pub fn as_block(&self) -> Option<&BlockCommand> {
        match self {
            Self::Block(block) => Some(block),
            Self::Space(_) => None,
        }
    }
}

/// Per-page metrics for navigation and diagnostics consumers.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PageMetrics {
    /// Page index (0-based).
    pub page_index: usize,
    /// First part laid on this page.
    pub first_part: usize,
    /// Parts (columns) painted with content.
    pub painted_parts: usize,
    /// Extent used by content over all columns, spaces included.
    pub content_extent: i32,
    /// Extent content overflowed by, over all columns.
    pub overflow: i32,
    /// Adjustment ratio applied to the last painted column.
    pub adjust_ratio: f32,
    /// The page exists only to satisfy a start-on constraint.
    pub blank: bool,
}

/// Page represented as backend-agnostic draw commands.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RenderPage {
    /// 1-based page number.
    pub page_number: usize,
    pub commands: Vec<DrawCommand>,
    pub metrics: PageMetrics,
}

impl RenderPage {
    const INITIAL_COMMAND_CAPACITY: usize = 8;

    /// Create an empty page.
    pub fn new(page_index: usize, first_part: usize) -> Self {
        Self {
            page_number: page_index + 1,
            // Blank pages never allocate.
            commands: Vec::with_capacity(0),
            metrics: PageMetrics {
                page_index,
                first_part,
                ..PageMetrics::default()
            },
        }
    }

    pub fn push_command(&mut self, cmd: DrawCommand) {
        if self.commands.capacity() == 0 {
            self.commands.reserve(Self::INITIAL_COMMAND_CAPACITY);
        }
        self.commands.push(cmd);
    }

    pub fn blocks(&self) -> impl Iterator<Item = &BlockCommand> + '_ {
        self.commands.iter().filter_map(DrawCommand::as_block)
    }

    /// Distinct blocks with at least one box on this page, in order.
    pub fn block_indices(&self) -> Vec<usize> {
        let mut out: Vec<usize> = Vec::new();
        for cmd in self.blocks() {
            if out.last() != Some(&cmd.block) {
                out.push(cmd.block);
            }
        }
        out
    }

    /// Bottom edge of the lowest block in column `x`.
    pub fn column_bottom(&self, x: i32) -> i32 {
        self.blocks()
            .filter(|cmd| cmd.x == x)
            .map(|cmd| cmd.y + cmd.height)
            .max()
            .unwrap_or(0)
    }

    /// Serialize to JSON for snapshots and debugging.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_page_is_lazy_and_numbered_from_one() {
        let page = RenderPage::new(2, 5);
        assert_eq!(page.page_number, 3);
        assert_eq!(page.metrics.first_part, 5);
        assert_eq!(page.commands.capacity(), 0);
    }

    #[test]
    fn block_indices_collapse_consecutive_lines() {
        let mut page = RenderPage::new(0, 0);
        for (block, line) in [(0, Some(0)), (0, Some(1)), (1, None), (2, Some(0))] {
            page.push_command(DrawCommand::Block(BlockCommand {
                block,
                line,
                x: 0,
                y: 0,
                width: 10,
                height: 10,
            }));
        }
        page.push_command(DrawCommand::Space(SpaceCommand {
            x: 0,
            y: 10,
            extent: 4,
        }));
        assert_eq!(page.block_indices(), vec![0, 1, 2]);
        assert!(page.to_json().unwrap().contains("\"page_number\":1"));
    }
}
