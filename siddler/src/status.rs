//! Text status screens and the status line protocol.

use core::fmt::{self, Write};

use heapless::String;

use crate::clock::ClockScale;
use crate::control::ChipMode;
use crate::dispatch::QueueStats;
use crate::event::RegisterEvent;
use crate::shared::{TextRow, BLANK_ROW, TEXT_COLS, TEXT_ROWS};
use crate::stats::LoaderStats;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum View {
    Status,
    UsbQueue,
    SidQueue,
    Hex,
}

impl View {
    pub const COUNT: usize = 4;

    pub fn name(self) -> &'static str {
        match self {
            View::Status => "STATUS",
            View::UsbQueue => "USB QUEUE",
            View::SidQueue => "SID QUEUE",
            View::Hex => "HEX DUMP",
        }
    }

    pub fn index(self) -> usize {
        match self {
            View::Status => 0,
            View::UsbQueue => 1,
            View::SidQueue => 2,
            View::Hex => 3,
        }
    }

    /// Unknown indices fall back to the status view
    pub fn from_index(index: usize) -> Self {
        match index {
            1 => View::UsbQueue,
            2 => View::SidQueue,
            3 => View::Hex,
            _ => View::Status,
        }
    }

    pub fn cycle(self, delta: i8) -> Self {
        let next = (self.index() as i32 + i32::from(delta)).rem_euclid(Self::COUNT as i32);
        Self::from_index(next as usize)
    }
}

impl Default for View {
    fn default() -> Self {
        View::Status
    }
}

pub const RECENT_BYTES: usize = 512;

/// The last bytes received from the host
#[derive(Debug)]
pub struct RecentBytes {
    buf: [u8; RECENT_BYTES],
    head: usize,
    full: bool,
    total: u64,
}

impl RecentBytes {
    pub const fn new() -> Self {
        Self {
            buf: [0; RECENT_BYTES],
            head: 0,
            full: false,
            total: 0,
        }
    }

    pub fn record(&mut self, data: &[u8]) {
        for byte in data {
            self.buf[self.head] = *byte;
            self.head = (self.head + 1) % RECENT_BYTES;
            if self.head == 0 {
                self.full = true;
            }
        }
        self.total += data.len() as u64;
    }

    pub fn available(&self) -> usize {
        if self.full {
            RECENT_BYTES
        } else {
            self.head
        }
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    /// The most recent `count` bytes, oldest first
    pub fn tail(&self, count: usize) -> impl Iterator<Item = u8> + '_ {
        let count = count.min(self.available());
        let start = (self.head + RECENT_BYTES - count) % RECENT_BYTES;
        (0..count).map(move |i| self.buf[(start + i) % RECENT_BYTES])
    }

    pub fn reset(&mut self) {
        self.head = 0;
        self.full = false;
        self.total = 0;
    }
}

impl Default for RecentBytes {
    fn default() -> Self {
        Self::new()
    }
}

struct RowWriter<'a> {
    row: &'a mut TextRow,
    at: usize,
}

impl<'a> Write for RowWriter<'a> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        for byte in s.bytes() {
            if self.at >= TEXT_COLS {
                break;
            }
            self.row[self.at] = if byte == b' ' || byte.is_ascii_graphic() {
                byte
            } else {
                b'?'
            };
            self.at += 1;
        }
        Ok(())
    }
}

/// Grid of fixed-width, space padded text rows
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Screen {
    lines: [TextRow; TEXT_ROWS],
}

impl Screen {
    pub const fn new() -> Self {
        Self {
            lines: [BLANK_ROW; TEXT_ROWS],
        }
    }

    pub fn clear(&mut self) {
        self.lines = [BLANK_ROW; TEXT_ROWS];
    }

    /// Replace `row` with formatted text, truncated to the row width
    pub fn line(&mut self, row: usize, args: fmt::Arguments<'_>) {
        if let Some(target) = self.lines.get_mut(row) {
            *target = BLANK_ROW;
            let mut writer = RowWriter { row: target, at: 0 };
            writer.write_fmt(args).ok();
        }
    }

    pub fn lines(&self) -> &[TextRow; TEXT_ROWS] {
        &self.lines
    }

    pub fn row(&self, row: usize) -> &TextRow {
        self.lines.get(row).unwrap_or(&BLANK_ROW)
    }
}

impl Default for Screen {
    fn default() -> Self {
        Self::new()
    }
}

/// Everything the status screens show
pub struct StatusInputs<'a> {
    pub view: View,
    pub mode: ChipMode,
    pub stats: &'a LoaderStats,
    pub chip_hz: u32,
    pub clock: &'a ClockScale,
    pub paused: bool,
    pub audio_ready: bool,
    pub ingest: QueueStats,
    pub ingest_high_water: usize,
    pub ingest_halted: bool,
    pub ingest_head: &'a [RegisterEvent],
    pub dispatch: QueueStats,
    pub dispatch_head: &'a [RegisterEvent],
    pub recent: &'a RecentBytes,
}

fn yes_no(flag: bool) -> &'static str {
    if flag {
        "YES"
    } else {
        " NO"
    }
}

fn halt_ok(halted: bool) -> &'static str {
    if halted {
        "HALT"
    } else {
        "OK"
    }
}

fn status_view(screen: &mut Screen, inp: &StatusInputs<'_>) {
    let stats = inp.stats;
    let (secs, millis) = stats.elapsed(inp.chip_hz);
    let (pct, hundredths) = inp.clock.percent();

    screen.line(0, format_args!("SIDDLER [{}]", inp.view.name()));
    screen.line(
        1,
        format_args!("Events:{:>10}  Bytes:{:>10}", stats.total_events, stats.total_bytes),
    );
    screen.line(2, format_args!("Time  : {:>5}.{:03}s", secs, millis));
    screen.line(
        3,
        format_args!(
            "Last  : d={:<6} addr=${:02X} val=${:02X}",
            stats.last_delay, stats.last_addr, stats.last_value
        ),
    );
    screen.line(
        4,
        format_args!(
            "Stream:{}  Paused:{}  Audio:{}",
            if stats.streaming { "ON " } else { "OFF" },
            yes_no(inp.paused),
            if inp.audio_ready { "OK" } else { "ERR" }
        ),
    );
    screen.line(
        5,
        format_args!(
            "Clock : {:>3}.{:02}%  {:>7} Hz",
            pct,
            hundredths,
            inp.clock.effective_hz(inp.chip_hz)
        ),
    );
    screen.line(
        6,
        format_args!(
            "USBQ  : {:>4} (max {:>4}) cyc={:>8} {}",
            inp.ingest.depth,
            inp.ingest_high_water,
            inp.ingest.queued_cycles,
            halt_ok(inp.ingest_halted)
        ),
    );
    screen.line(
        7,
        format_args!(
            "SIDQ  : depth={:>4} drop={:>4} next={:>6}",
            inp.dispatch.depth,
            inp.dispatch.dropped,
            inp.dispatch.cycles_to_next.unwrap_or(0)
        ),
    );
    screen.line(8, format_args!("View  : {}", inp.view.name()));
    screen.line(9, format_args!("SID   : {}", inp.mode.name()));
    screen.line(
        10,
        format_args!(
            "Frames:{:>8} ev last {} max {} avg {}",
            stats.total_frames,
            stats.frame_events_last,
            stats.frame_events_max,
            stats.average_frame_events()
        ),
    );
    screen.line(
        11,
        format_args!(
            "Desync:{:>6} ({} bytes)  Cmds:{}",
            stats.desyncs, stats.desync_bytes, stats.commands
        ),
    );
}

fn usb_queue_view(screen: &mut Screen, inp: &StatusInputs<'_>) {
    screen.line(
        0,
        format_args!(
            "USB QUEUE depth={} flow={}",
            inp.ingest.depth,
            halt_ok(inp.ingest_halted)
        ),
    );
    screen.line(1, format_args!("Max depth: {}", inp.ingest_high_water));
    if inp.ingest_head.is_empty() {
        screen.line(3, format_args!("Queue empty"));
        return;
    }
    for (i, ev) in inp.ingest_head.iter().enumerate().take(TEXT_ROWS - 2) {
        screen.line(
            2 + i,
            format_args!("{:>2}: +{:>6} addr ${:02X} = ${:02X}", i, ev.delay, ev.addr, ev.value),
        );
    }
}

fn sid_queue_view(screen: &mut Screen, inp: &StatusInputs<'_>) {
    screen.line(
        0,
        format_args!(
            "SID ENGINE QUEUE depth={} drop={}",
            inp.dispatch.depth, inp.dispatch.dropped
        ),
    );
    screen.line(
        1,
        format_args!(
            "Next event in {} cycles",
            inp.dispatch.cycles_to_next.unwrap_or(0)
        ),
    );
    if inp.dispatch_head.is_empty() {
        screen.line(3, format_args!("No pending SID events"));
        return;
    }
    for (i, ev) in inp.dispatch_head.iter().enumerate().take(TEXT_ROWS - 2) {
        screen.line(
            2 + i,
            format_args!(
                "{:>2}: +{:>6} chip {} addr ${:02X} = ${:02X}",
                i,
                ev.delay,
                ev.target.bits(),
                ev.addr,
                ev.value
            ),
        );
    }
}

const HEX_PER_LINE: usize = 8;

fn hex_view(screen: &mut Screen, inp: &StatusInputs<'_>) {
    let recent = inp.recent;
    screen.line(0, format_args!("HEX RX (total {} bytes)", recent.total()));
    let shown = recent.available().min(HEX_PER_LINE * (TEXT_ROWS - 2));
    if shown == 0 {
        screen.line(2, format_args!("No data captured yet"));
        return;
    }

    let base = recent.total() - shown as u64;
    let mut bytes = recent.tail(shown);
    for line in 0..(shown + HEX_PER_LINE - 1) / HEX_PER_LINE {
        let offset = line * HEX_PER_LINE;
        let mut text: String<TEXT_COLS> = String::new();
        write!(text, "{:08X}:", base + offset as u64).ok();
        for byte in bytes.by_ref().take(HEX_PER_LINE) {
            write!(text, " {:02X}", byte).ok();
        }
        screen.line(2 + line, format_args!("{}", text));
    }
}

/// Redraw `screen` with the view selected in `inputs`
pub fn render(screen: &mut Screen, inputs: &StatusInputs<'_>) {
    screen.clear();
    match inputs.view {
        View::Status => status_view(screen, inputs),
        View::UsbQueue => usb_queue_view(screen, inputs),
        View::SidQueue => sid_queue_view(screen, inputs),
        View::Hex => hex_view(screen, inputs),
    }
}

pub const LINE_MARKER: &str = "#L";
pub const STATUS_SCREENS: usize = View::COUNT;

/// One row pushed to the host
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct StatusLine {
    pub screen: u8,
    pub row: u8,
    pub text: TextRow,
}

/// `#L <screen> <row> <text>\n`, trailing blanks trimmed
pub fn format_status_line(screen: u8, row: u8, text: &TextRow) -> String<64> {
    let len = text.iter().rposition(|b| *b != b' ').map_or(0, |i| i + 1);
    let mut out = String::new();
    write!(out, "{} {} {} ", LINE_MARKER, screen, row).ok();
    for byte in &text[..len] {
        let ch = if byte.is_ascii_graphic() { *byte } else { b' ' };
        out.push(ch as char).ok();
    }
    out.push('\n').ok();
    out
}

/// Inverse of `format_status_line`; rejects foreign lines and bad indices
pub fn parse_status_line(line: &str) -> Option<StatusLine> {
    let rest = line.strip_prefix(LINE_MARKER)?.strip_prefix(' ')?;
    let rest = rest.trim_end_matches(|c| c == '\r' || c == '\n');
    let mut parts = rest.splitn(3, ' ');
    let screen: u8 = parts.next()?.parse().ok()?;
    let row: u8 = parts.next()?.parse().ok()?;
    if usize::from(screen) >= STATUS_SCREENS || usize::from(row) >= TEXT_ROWS {
        return None;
    }
    let mut text = BLANK_ROW;
    let body = parts.next().unwrap_or("").as_bytes();
    let len = body.len().min(TEXT_COLS);
    text[..len].copy_from_slice(&body[..len]);
    Some(StatusLine { screen, row, text })
}
