//! The renderer loop: feeds scanlines from the shared status block.
//!
//! Nothing here may wait on the engine except the visual decay, which takes
//! the lock once per video frame.

use crate::context::{ScanlineContext, ScanlineInput};
use crate::shared::{SharedStatus, StatusReader};

pub const GLYPH_HEIGHT: u16 = 8;

pub struct Renderer<'a> {
    shared: &'a SharedStatus,
    reader: StatusReader,
    frames: u32,
}

impl<'a> Renderer<'a> {
    pub fn new(shared: &'a SharedStatus) -> Self {
        Self {
            shared,
            reader: StatusReader::new(),
            frames: 0,
        }
    }

    /// Produce `line`; line 0 starts a new video frame
    pub fn scanline<S: ScanlineContext>(&mut self, sink: &mut S, line: u16) {
        if line == 0 {
            self.start_frame();
        }
        let text_row = line / GLYPH_HEIGHT;
        let text = *self.reader.row(self.shared, usize::from(text_row));
        let input = ScanlineInput {
            text: &text,
            text_row: text_row.min(u16::from(u8::MAX)) as u8,
            glyph_row: (line % GLYPH_HEIGHT) as u8,
            visual: self.reader.visual(),
        };
        sink.emit(line, &input);
    }

    /// Serve every scanline the sink is waiting for; returns how many
    pub fn step<S: ScanlineContext>(&mut self, sink: &mut S) -> usize {
        let mut served = 0;
        while let Ok(line) = sink.next_scanline() {
            self.scanline(sink, line);
            served += 1;
        }
        served
    }

    fn start_frame(&mut self) {
        let mut aged = self.reader.visual();
        self.shared.update_visual(|visual| {
            visual.age();
            aged = *visual;
        });
        self.reader.set_visual(aged);
        self.frames = self.frames.wrapping_add(1);
    }

    pub fn frames(&self) -> u32 {
        self.frames
    }

    pub fn reader(&self) -> &StatusReader {
        &self.reader
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::testing::RecordingSink;
    use crate::shared::{BLANK_ROW, TEXT_ROWS};
    use crate::visual::VisualParams;

    #[test]
    fn draws_text_rows_by_glyph() {
        let shared = SharedStatus::new();
        let mut row = BLANK_ROW;
        row[0] = b'S';
        shared.set_line(1, &row);

        let mut renderer = Renderer::new(&shared);
        let mut sink = RecordingSink::new(240);
        sink.request_frame();
        assert_eq!(renderer.step(&mut sink), 240);
        assert_eq!(renderer.frames(), 1);

        let (line, text_row, glyph_row, text, _) = sink.drawn[13];
        assert_eq!((line, text_row, glyph_row), (13, 1, 5));
        assert_eq!(text, row);
        assert_eq!(sink.drawn[7].3, BLANK_ROW);
        let past_text = (TEXT_ROWS as u16 * GLYPH_HEIGHT) as usize;
        assert_eq!(sink.drawn[past_text].3, BLANK_ROW);
        assert_eq!(renderer.step(&mut sink), 0);
    }

    #[test]
    fn visuals_decay_once_per_frame() {
        let shared = SharedStatus::new();
        shared.publish_visual(VisualParams {
            brightness: 160,
            wave_depth: 10,
            ..VisualParams::blank()
        });
        let mut renderer = Renderer::new(&shared);
        let mut sink = RecordingSink::new(16);
        sink.request_frame();
        sink.request_frame();
        renderer.step(&mut sink);

        assert_eq!(renderer.frames(), 2);
        let visual = shared.snapshot().visual;
        assert_eq!(visual.brightness, 160 - 11 - 10);
        assert_eq!(visual.wave_depth, 8);
        assert_eq!(sink.drawn.last().map(|d| d.4), Some(visual));
    }

    #[test]
    fn contended_lock_serves_shadow() {
        let shared = SharedStatus::new();
        let mut renderer = Renderer::new(&shared);
        let mut sink = RecordingSink::new(8);
        renderer.scanline(&mut sink, 3);
        let guard = shared.lock_for_test();
        renderer.scanline(&mut sink, 4);
        drop(guard);
        assert_eq!(renderer.reader().stale_reads(), 1);
        assert_eq!(sink.drawn[1].3, BLANK_ROW);
    }
}
