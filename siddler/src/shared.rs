//! Status state shared between the engine and the renderer.
//!
//! The engine is the only writer and may wait for the lock. The renderer
//! must never wait: it makes a single `try_lock` per scanline and falls back
//! to its own shadow copy whenever the engine holds the lock. The shadow
//! starts out blank, so nothing uninitialised is ever drawn.

use spin::Mutex;

use crate::visual::VisualParams;

pub const TEXT_COLS: usize = 40;
pub const TEXT_ROWS: usize = 27;

pub type TextRow = [u8; TEXT_COLS];

pub const BLANK_ROW: TextRow = [b' '; TEXT_COLS];

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct StatusBlock {
    pub lines: [TextRow; TEXT_ROWS],
    pub visual: VisualParams,
    /// Bumped on every text update
    pub revision: u32,
}

impl StatusBlock {
    pub const fn blank() -> Self {
        Self {
            lines: [BLANK_ROW; TEXT_ROWS],
            visual: VisualParams::blank(),
            revision: 0,
        }
    }
}

pub struct SharedStatus {
    block: Mutex<StatusBlock>,
}

impl SharedStatus {
    pub const fn new() -> Self {
        Self {
            block: Mutex::new(StatusBlock::blank()),
        }
    }

    pub fn clear(&self) {
        let mut block = self.block.lock();
        block.lines = [BLANK_ROW; TEXT_ROWS];
        block.revision = block.revision.wrapping_add(1);
    }

    pub fn set_line(&self, row: usize, text: &TextRow) {
        if row >= TEXT_ROWS {
            return;
        }
        let mut block = self.block.lock();
        block.lines[row] = *text;
        block.revision = block.revision.wrapping_add(1);
    }

    pub fn set_lines(&self, lines: &[TextRow; TEXT_ROWS]) {
        let mut block = self.block.lock();
        block.lines = *lines;
        block.revision = block.revision.wrapping_add(1);
    }

    pub fn publish_visual(&self, visual: VisualParams) {
        self.block.lock().visual = visual;
    }

    pub fn update_visual<F>(&self, f: F)
    where
        F: FnOnce(&mut VisualParams),
    {
        f(&mut self.block.lock().visual);
    }

    pub fn snapshot(&self) -> StatusBlock {
        *self.block.lock()
    }

    /// Row and visual record, unless the lock is taken right now
    pub fn try_read_row(&self, row: usize) -> Option<(TextRow, VisualParams)> {
        let block = self.block.try_lock()?;
        let text = block.lines.get(row).copied().unwrap_or(BLANK_ROW);
        Some((text, block.visual))
    }

    pub fn try_read_visual(&self) -> Option<VisualParams> {
        self.block.try_lock().map(|block| block.visual)
    }

    #[cfg(test)]
    pub(crate) fn lock_for_test(&self) -> spin::MutexGuard<'_, StatusBlock> {
        self.block.lock()
    }
}

impl Default for SharedStatus {
    fn default() -> Self {
        Self::new()
    }
}

/// Renderer-side shadow of the shared block
#[derive(Debug)]
pub struct StatusReader {
    rows: [TextRow; TEXT_ROWS],
    visual: VisualParams,
    fresh: u32,
    stale: u32,
}

impl StatusReader {
    pub const fn new() -> Self {
        Self {
            rows: [BLANK_ROW; TEXT_ROWS],
            visual: VisualParams::blank(),
            fresh: 0,
            stale: 0,
        }
    }

    /// Text of `row`, refreshed from `shared` if its lock is free
    pub fn row(&mut self, shared: &SharedStatus, row: usize) -> &TextRow {
        if row >= TEXT_ROWS {
            return &BLANK_ROW;
        }
        match shared.try_read_row(row) {
            Some((text, visual)) => {
                self.rows[row] = text;
                self.visual = visual;
                self.fresh = self.fresh.wrapping_add(1);
            }
            None => self.stale = self.stale.wrapping_add(1),
        }
        &self.rows[row]
    }

    /// Visual record as of the last successful read
    pub fn visual(&self) -> VisualParams {
        self.visual
    }

    pub fn set_visual(&mut self, visual: VisualParams) {
        self.visual = visual;
    }

    pub fn fresh_reads(&self) -> u32 {
        self.fresh
    }

    pub fn stale_reads(&self) -> u32 {
        self.stale
    }
}

impl Default for StatusReader {
    fn default() -> Self {
        Self::new()
    }
}
