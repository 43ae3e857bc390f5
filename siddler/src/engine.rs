//! The engine loop: audio, queue transfer, transport, controls and status.

use heapless::Vec;
use log::{info, trace, warn};

use crate::clock::ClockScale;
use crate::codec::{Decoded, FrameDecoder};
use crate::config::Config;
use crate::context::{EngineContext, SoundChip};
use crate::control::{Action, ChipMode, Command, EventFilter};
use crate::dispatch::{Dispatcher, QueueStats, RateAccumulator};
use crate::event::{RegisterEvent, MAX_CHIPS, REGISTER_MASK};
use crate::flow::FlowGate;
use crate::midi::{MidiMessage, MidiParser};
use crate::queue::EventQueue;
use crate::shared::{SharedStatus, TextRow, BLANK_ROW, TEXT_ROWS};
use crate::stats::LoaderStats;
use crate::status::{self, format_status_line, RecentBytes, Screen, StatusInputs, View};
use crate::visual::FrameSummary;
use crate::voice::NotePlayer;

pub const READ_CHUNK_MAX: usize = 512;
pub const READY_BANNER: &[u8] = b"[SIDDLER] READY\r\n";

const MAX_ACTIONS: usize = 8;
const MIDI_CHUNK: usize = 32;
const INGEST_SHOWN: usize = 10;
const DISPATCH_SHOWN: usize = 12;

/// Owns the whole pipeline from transport bytes to audio samples.
///
/// `IN` and `OUT` are the capacities of the host-facing and the chip-facing
/// queues.
pub struct Engine<'a, C: SoundChip, const IN: usize, const OUT: usize> {
    config: Config,
    shared: &'a SharedStatus,
    decoder: FrameDecoder,
    ingest: EventQueue<IN>,
    ingest_gate: FlowGate,
    dispatch_gate: FlowGate,
    dispatcher: Dispatcher<C, OUT>,
    clock: ClockScale,
    filter: EventFilter,
    stats: LoaderStats,
    frame: FrameSummary,
    recent: RecentBytes,
    view: View,
    mode: ChipMode,
    paused: bool,
    audio_ready: bool,
    session: bool,
    ready_sent: bool,
    next_status_us: Option<u64>,
    screen: Screen,
    pushed: [TextRow; TEXT_ROWS],
    pushed_view: Option<View>,
    notes: NotePlayer,
    notes_ready: bool,
    midi: MidiParser,
}

impl<'a, C: SoundChip, const IN: usize, const OUT: usize> Engine<'a, C, IN, OUT> {
    pub fn new(
        config: Config,
        shared: &'a SharedStatus,
        chips: Vec<C, MAX_CHIPS>,
        audio_ready: bool,
    ) -> Result<Self, &'static str> {
        config.validate()?;
        let ingest_marks = config.ingest_watermarks(IN)?;
        let dispatch_marks = config.dispatch_watermarks(OUT)?;
        let rate = RateAccumulator::new(config.chip_clock_hz, config.sample_rate_hz)?;
        let clock = ClockScale::new(config.clock_scale_min, config.clock_scale_max)?;

        let mut dispatcher = Dispatcher::new(chips, rate, config.overflow_merge)
            .with_gain(config.output_gain_q8);
        dispatcher.set_mode(config.chip_mode);

        info!(
            "engine up: {} Hz chip, {} Hz output, audio {}",
            config.chip_clock_hz,
            config.sample_rate_hz,
            if audio_ready { "ok" } else { "off" }
        );

        Ok(Self {
            decoder: FrameDecoder::with_limit(config.record_format, config.max_frame_events),
            ingest: EventQueue::with_merge(config.overflow_merge),
            ingest_gate: FlowGate::new("ingest", ingest_marks),
            dispatch_gate: FlowGate::new("dispatch", dispatch_marks),
            dispatcher,
            clock,
            filter: EventFilter::new(),
            stats: LoaderStats::default(),
            frame: FrameSummary::default(),
            recent: RecentBytes::new(),
            view: View::default(),
            mode: config.chip_mode,
            paused: false,
            audio_ready,
            session: false,
            ready_sent: false,
            next_status_us: None,
            screen: Screen::new(),
            pushed: [BLANK_ROW; TEXT_ROWS],
            pushed_view: None,
            notes: NotePlayer::new(),
            notes_ready: false,
            midi: MidiParser::new(),
            config,
            shared,
        })
    }

    /// One iteration of the engine loop
    pub fn step<X: EngineContext>(&mut self, ctx: &mut X) {
        self.render_audio(ctx);
        self.service_dispatch();
        self.service_connection(ctx);
        self.poll_transport(ctx);
        self.process_control(ctx);
        self.poll_midi(ctx);
        self.refresh_status(ctx);
    }

    fn render_audio<X: EngineContext>(&mut self, ctx: &mut X) {
        if !self.audio_ready {
            return;
        }
        if let Ok(frames) = ctx.audio_buffer() {
            self.dispatcher.fill(frames);
            ctx.submit_audio();
        }
    }

    /// Move events from the host queue to the chip queue while the chip
    /// queue has room
    fn service_dispatch(&mut self) {
        if !self.audio_ready || self.paused {
            return;
        }
        while !self.ingest.is_empty() {
            if !self.dispatch_gate.consider(self.dispatcher.queue().depth()) {
                break;
            }
            let event = match self.ingest.pop() {
                Some(event) => event,
                None => break,
            };
            let mode = self.mode;
            let clock = &self.clock;
            let dispatcher = &mut self.dispatcher;
            self.filter.pass(event, |event| {
                let (delay, event) = prepare(clock, mode, event);
                event.emit_after(delay, |event| dispatcher.queue_event(event));
            });
        }
        self.ingest_gate.consider(self.ingest.depth());
    }

    fn service_connection<X: EngineContext>(&mut self, ctx: &mut X) {
        if !ctx.connected() {
            if self.session {
                info!("host disconnected");
                self.session = false;
            }
            self.ready_sent = false;
            if self.decoder.is_mid_frame()
                || self.decoder.hunting() > 0
                || self.stats.streaming
                || !self.ingest.is_empty()
            {
                self.reset_session(false);
            }
            return;
        }
        if !self.session {
            info!("host connected");
            self.reset_session(true);
            self.session = true;
        }
        if !self.ready_sent && ctx.write(READY_BANNER).is_ok() {
            self.ready_sent = true;
        }
    }

    /// Drop everything received but not yet transferred. A full reset also
    /// clears statistics and the chips.
    pub fn reset_session(&mut self, full: bool) {
        let lost = self.decoder.reset();
        if lost > 0 {
            warn!("dropped {} bytes while hunting for a header", lost);
            self.stats.record_resync(lost);
        }
        self.ingest.reset();
        self.ingest_gate.reset();
        self.frame = FrameSummary::default();
        self.midi.reset();
        self.stats.end_stream();
        if full {
            self.stats.reset();
            self.recent.reset();
            self.filter.reset();
            self.dispatch_gate.reset();
            self.dispatcher.reset();
            self.dispatcher.set_mode(self.mode);
            self.notes_ready = false;
            self.pushed_view = None;
        }
    }

    fn poll_transport<X: EngineContext>(&mut self, ctx: &mut X) {
        if !self.session {
            return;
        }
        let mut buf = [0u8; READ_CHUNK_MAX];
        let chunk = self.config.read_chunk.min(READ_CHUNK_MAX);
        for _ in 0..self.config.max_chunks {
            if !self.ingest_gate.consider(self.ingest.depth()) {
                break;
            }
            let count = match ctx.read(&mut buf[..chunk]) {
                Ok(0) | Err(_) => break,
                Ok(count) => count,
            };
            self.stats.record_bytes(count);
            self.recent.record(&buf[..count]);
            self.ingest_bytes(&buf[..count]);
        }
    }

    /// Decode host bytes into the ingestion queue
    pub fn ingest_bytes(&mut self, data: &[u8]) {
        let mut input = data;
        while let Some(item) = self.decoder.next(&mut input) {
            match item {
                Decoded::Event(event) => {
                    self.stats.record_event(&event);
                    self.frame.observe(&event);
                    self.ingest.push(event);
                }
                Decoded::FrameComplete { sequence, events } => {
                    self.complete_frame(sequence, events)
                }
                Decoded::Command(command) => self.apply_command(command),
                Decoded::Resync { skipped } => {
                    warn!("stream resynced after {} bytes", skipped);
                    self.stats.record_resync(skipped);
                }
            }
        }
    }

    fn complete_frame(&mut self, sequence: u32, events: u16) {
        trace!("frame {} complete, {} events", sequence, events);
        self.stats.record_frame(events);
        let summary = self.frame.finish(sequence);
        self.shared.update_visual(|visual| visual.absorb(&summary));
    }

    pub fn apply_command(&mut self, command: Command) {
        self.stats.record_command();
        match command {
            Command::CycleChipMode => self.cycle_mode(),
            Command::SetVoiceMask(mask) => self.filter.set_voice_mask(mask),
            Command::SetFilter(enabled) => self.filter.set_filter_enabled(enabled),
            Command::Unknown(op) => warn!("unknown command {:#04x}", op),
        }
    }

    fn process_control<X: EngineContext>(&mut self, ctx: &mut X) {
        for _ in 0..MAX_ACTIONS {
            match ctx.poll_action() {
                Some(action) => self.apply_action(action),
                None => break,
            }
        }
    }

    pub fn apply_action(&mut self, action: Action) {
        match action {
            Action::TogglePause => {
                self.paused = !self.paused;
                info!("transfer {}", if self.paused { "paused" } else { "resumed" });
            }
            Action::ShowView(view) => self.set_view(view),
            Action::CycleView(delta) => self.set_view(self.view.cycle(delta)),
            Action::CycleChipMode => self.cycle_mode(),
            Action::ScaleClock { num, den } => {
                self.clock.mul(num, den);
            }
            Action::ResetClock => {
                self.clock.reset();
            }
        }
    }

    fn set_view(&mut self, view: View) {
        if view == self.view {
            return;
        }
        self.view = view;
        self.next_status_us = None;
        info!("view -> {}", view.name());
    }

    fn cycle_mode(&mut self) {
        self.mode = self.mode.next();
        self.dispatcher.set_mode(self.mode);
        info!("chip mode -> {}", self.mode.name());
    }

    fn refresh_status<X: EngineContext>(&mut self, ctx: &mut X) {
        let now = ctx.now_us();
        if let Some(next) = self.next_status_us {
            if now < next {
                return;
            }
        }
        self.next_status_us = Some(now + self.config.status_period_us);
        self.render_status();
        self.shared.set_lines(self.screen.lines());
        if self.config.status_push && self.session {
            self.push_status(ctx);
        }
    }

    fn render_status(&mut self) {
        let ingest_head: Vec<RegisterEvent, INGEST_SHOWN> =
            self.ingest.iter().take(INGEST_SHOWN).copied().collect();
        let dispatch_head: Vec<RegisterEvent, DISPATCH_SHOWN> = self
            .dispatcher
            .queue()
            .iter()
            .take(DISPATCH_SHOWN)
            .copied()
            .collect();
        // a hunt still in progress shows up before its header does
        let mut stats = self.stats;
        let hunting = self.decoder.hunting();
        if hunting > 0 {
            stats.record_resync(hunting);
        }
        let inputs = StatusInputs {
            view: self.view,
            mode: self.mode,
            stats: &stats,
            chip_hz: self.config.chip_clock_hz,
            clock: &self.clock,
            paused: self.paused,
            audio_ready: self.audio_ready,
            ingest: QueueStats::of(&self.ingest),
            ingest_high_water: self.ingest.high_water(),
            ingest_halted: self.ingest_gate.is_paused(),
            ingest_head: &ingest_head,
            dispatch: self.dispatcher.stats(),
            dispatch_head: &dispatch_head,
            recent: &self.recent,
        };
        status::render(&mut self.screen, &inputs);
    }

    /// Send rows that changed since the last push; everything after a view
    /// change
    fn push_status<X: EngineContext>(&mut self, ctx: &mut X) {
        let force = self.pushed_view != Some(self.view);
        let screen = self.view.index() as u8;
        for row in 0..TEXT_ROWS {
            let text = *self.screen.row(row);
            if !force && self.pushed[row] == text {
                continue;
            }
            let line = format_status_line(screen, row as u8, &text);
            if ctx.write(line.as_bytes()).is_err() {
                return;
            }
            self.pushed[row] = text;
        }
        self.pushed_view = Some(self.view);
    }

    /// Configure the chips for the note-driven producer
    pub fn start_notes(&mut self) {
        self.notes.configure(&mut self.dispatcher);
        self.notes_ready = true;
    }

    /// Play whatever the MIDI input delivered; the chips are set up for
    /// notes on the first byte after a reset
    fn poll_midi<X: EngineContext>(&mut self, ctx: &mut X) {
        let mut buf = [0u8; MIDI_CHUNK];
        for _ in 0..self.config.max_chunks {
            let count = match ctx.read_midi(&mut buf) {
                Ok(0) | Err(_) => break,
                Ok(count) => count,
            };
            if !self.notes_ready {
                info!("midi input, voices set up for notes");
                self.start_notes();
            }
            self.feed_midi(&buf[..count]);
        }
    }

    pub fn note_on(&mut self, note: u8, velocity: u8) -> Option<usize> {
        self.notes.note_on(&mut self.dispatcher, note, velocity)
    }

    pub fn note_off(&mut self, note: u8) -> Option<usize> {
        self.notes.note_off(&mut self.dispatcher, note)
    }

    /// Play notes from a MIDI byte stream
    pub fn feed_midi(&mut self, data: &[u8]) {
        for byte in data {
            match self.midi.feed(*byte) {
                Some(MidiMessage::NoteOn { note, velocity, .. }) => {
                    self.note_on(note, velocity);
                }
                Some(MidiMessage::NoteOff { note, .. }) => {
                    self.note_off(note);
                }
                _ => {}
            }
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn stats(&self) -> &LoaderStats {
        &self.stats
    }

    pub fn view(&self) -> View {
        self.view
    }

    pub fn mode(&self) -> ChipMode {
        self.mode
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn audio_ready(&self) -> bool {
        self.audio_ready
    }

    pub fn is_ingest_paused(&self) -> bool {
        self.ingest_gate.is_paused()
    }

    pub fn is_dispatch_paused(&self) -> bool {
        self.dispatch_gate.is_paused()
    }

    pub fn clock(&self) -> &ClockScale {
        &self.clock
    }

    pub fn filter(&self) -> &EventFilter {
        &self.filter
    }

    pub fn ingest(&self) -> &EventQueue<IN> {
        &self.ingest
    }

    pub fn dispatcher(&self) -> &Dispatcher<C, OUT> {
        &self.dispatcher
    }

    pub fn dispatcher_mut(&mut self) -> &mut Dispatcher<C, OUT> {
        &mut self.dispatcher
    }

    pub fn screen(&self) -> &Screen {
        &self.screen
    }
}

/// Scale the delay and resolve the chip selector for the current mode
fn prepare(clock: &ClockScale, mode: ChipMode, event: RegisterEvent) -> (u64, RegisterEvent) {
    let delay = clock.scale(event.delay);
    if event.is_delay_only() {
        return (delay, RegisterEvent::delay_only(0));
    }
    let event = RegisterEvent::write(0, event.addr & REGISTER_MASK, event.value)
        .with_target(event.target.or_default(mode.default_target()));
    (delay, event)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{encode_command, FrameHeader, RecordFormat, HEADER_LEN};
    use crate::event::ChipMask;
    use crate::context::testing::{RecordingChip, TestingContext};
    use crate::status::parse_status_line;
    use std::vec::Vec as StdVec;

    type TestEngine<'a> = Engine<'a, RecordingChip, 64, 16>;

    fn engine<'a>(shared: &'a SharedStatus, config: Config) -> TestEngine<'a> {
        let mut chips = Vec::new();
        chips.push(RecordingChip::with_level(100)).ok();
        chips.push(RecordingChip::with_level(-100)).ok();
        Engine::new(config, shared, chips, true).unwrap()
    }

    fn frame(sequence: u32, events: &[RegisterEvent]) -> StdVec<u8> {
        let format = RecordFormat::Narrow;
        let mut out = vec![0u8; HEADER_LEN + events.len() * format.len()];
        let mut at = FrameHeader {
            count: events.len() as u16,
            sequence,
        }
        .encode(&mut out)
        .unwrap();
        for ev in events {
            at += format.encode(ev, &mut out[at..]).unwrap();
        }
        out
    }

    fn small_config() -> Config {
        Config {
            sample_rate_hz: 44_100,
            ingest_marks: Some((8, 48)),
            dispatch_marks: Some((4, 12)),
            ..Config::default()
        }
    }

    #[test]
    fn connect_sends_banner_once() {
        let shared = SharedStatus::new();
        let mut eng = engine(&shared, small_config());
        let mut ctx = TestingContext::new(4);
        eng.step(&mut ctx);
        eng.step(&mut ctx);
        assert_eq!(ctx.outbound, READY_BANNER);
        assert_eq!(eng.dispatcher_mut().chips_mut()[0].resets, 1);
    }

    #[test]
    fn events_flow_to_chip() {
        let shared = SharedStatus::new();
        let mut eng = engine(&shared, small_config());
        let mut ctx = TestingContext::new(8);
        ctx.send(&frame(
            1,
            &[
                RegisterEvent::write(0, 0x18, 0x0F),
                RegisterEvent::write(30, 0x24, 0x41),
            ],
        ));
        for _ in 0..4 {
            eng.step(&mut ctx);
        }

        let stats = eng.stats();
        assert_eq!((stats.total_events, stats.total_frames), (2, 1));
        let chip = &eng.dispatcher_mut().chips_mut()[0];
        let base = chip.writes[0].0;
        let writes: StdVec<_> = chip.writes.iter().map(|w| (w.0 - base, w.1, w.2)).collect();
        assert_eq!(writes, vec![(0, 0x18, 0x0F), (30, 0x04, 0x41)]);
        assert!(eng.dispatcher_mut().chips_mut()[1].writes.is_empty());
        assert_eq!(ctx.played.len(), 8 * 4);
        assert_eq!(ctx.played[0], [150, 150]);
    }

    #[test]
    fn clock_scale_stretches_delays() {
        let shared = SharedStatus::new();
        let mut eng = engine(&shared, small_config());
        let mut ctx = TestingContext::new(0);
        eng.step(&mut ctx);
        eng.apply_action(Action::ScaleClock { num: 2, den: 1 });
        assert_eq!(eng.clock().ppm(), 2_000_000);

        eng.ingest_bytes(&frame(0, &[RegisterEvent::write(50, 0x01, 0x02)]));
        eng.step(&mut ctx);
        assert_eq!(eng.dispatcher().queue().peek().map(|ev| ev.delay), Some(100));
    }

    #[test]
    fn split_mode_targets_both_chips() {
        let shared = SharedStatus::new();
        let mut eng = engine(&shared, small_config());
        let mut ctx = TestingContext::new(0);
        eng.step(&mut ctx);
        eng.ingest_bytes(&frame(0, &[RegisterEvent::write(0, 0x01, 0x02)]));
        eng.apply_command(Command::CycleChipMode);
        eng.apply_command(Command::CycleChipMode);
        assert_eq!(eng.mode(), ChipMode::Split);
        eng.step(&mut ctx);
        eng.dispatcher_mut().advance(1);
        for chip in eng.dispatcher_mut().chips_mut() {
            assert_eq!(chip.writes, vec![(0, 0x01, 0x02)]);
        }
        assert_eq!(eng.stats().commands, 2);
    }

    #[test]
    fn muted_voice_keeps_timing() {
        let shared = SharedStatus::new();
        let mut eng = engine(&shared, small_config());
        let mut ctx = TestingContext::new(0);
        eng.step(&mut ctx);
        let mut cmd = [0u8; 14];
        encode_command(Command::SetVoiceMask(0b001), &mut cmd).unwrap();
        ctx.send(&cmd);
        ctx.send(&frame(
            0,
            &[
                RegisterEvent::write(10, 0x04, 0x41),
                RegisterEvent::write(5, 0x0B, 0x21),
            ],
        ));
        eng.step(&mut ctx);
        eng.step(&mut ctx);
        assert_eq!(eng.filter().voice_mask(), 0b001);
        eng.dispatcher_mut().advance(100);
        assert_eq!(eng.dispatcher_mut().chips_mut()[0].writes, vec![(15, 0x0B, 0x21)]);
    }

    #[test]
    fn dispatch_gate_holds_back_transfer() {
        let shared = SharedStatus::new();
        let mut eng = engine(&shared, small_config());
        let mut ctx = TestingContext::new(0);
        eng.step(&mut ctx);
        let events: StdVec<RegisterEvent> =
            (0..30).map(|i| RegisterEvent::write(1_000, 0x00, i)).collect();
        eng.ingest_bytes(&frame(0, &events));
        eng.step(&mut ctx);

        assert_eq!(eng.dispatcher().queue().depth(), 12);
        assert!(eng.is_dispatch_paused());
        assert_eq!(eng.ingest().depth(), 18);

        eng.dispatcher_mut().advance(6_000);
        eng.step(&mut ctx);
        assert_eq!(eng.dispatcher().queue().depth(), 6);
        eng.dispatcher_mut().advance(2_000);
        eng.step(&mut ctx);
        assert_eq!(eng.dispatcher().queue().depth(), 12);
        assert_eq!(eng.ingest().depth(), 10);
    }

    #[test]
    fn ingest_gate_stops_reads() {
        let shared = SharedStatus::new();
        let config = Config {
            read_chunk: 64,
            ..small_config()
        };
        let mut eng = engine(&shared, config);
        let mut ctx = TestingContext::new(0);
        eng.step(&mut ctx);
        eng.apply_action(Action::TogglePause);

        let events: StdVec<RegisterEvent> =
            (0..60).map(|i| RegisterEvent::write(1, 0x00, i)).collect();
        ctx.send(&frame(0, &events));
        ctx.send(&frame(1, &events));
        eng.step(&mut ctx);
        assert_eq!(eng.ingest().depth(), 60);
        assert!(!eng.is_ingest_paused());

        eng.step(&mut ctx);
        assert!(eng.is_ingest_paused());
        assert_eq!(ctx.inbound.len(), 2 * 250 - 4 * 64);
        eng.step(&mut ctx);
        assert_eq!(eng.ingest().depth(), 60);
        assert_eq!(eng.ingest().dropped_count(), 0);
    }

    #[test]
    fn pause_stops_transfer_only() {
        let shared = SharedStatus::new();
        let mut eng = engine(&shared, small_config());
        let mut ctx = TestingContext::new(4);
        ctx.press(Action::TogglePause);
        eng.step(&mut ctx);
        assert!(eng.is_paused());
        eng.ingest_bytes(&frame(0, &[RegisterEvent::write(0, 0x01, 0x02)]));
        eng.step(&mut ctx);
        assert_eq!(eng.ingest().depth(), 1);
        assert_eq!(ctx.played.len(), 8);
    }

    #[test]
    fn disconnect_drops_partial_frame_keeps_chips() {
        let shared = SharedStatus::new();
        let mut eng = engine(&shared, small_config());
        let mut ctx = TestingContext::new(0);
        eng.step(&mut ctx);
        let data = frame(4, &[RegisterEvent::write(1, 2, 3), RegisterEvent::write(1, 2, 4)]);
        eng.ingest_bytes(&data[..HEADER_LEN + 5]);
        eng.apply_action(Action::TogglePause);

        ctx.connected = false;
        eng.step(&mut ctx);
        assert_eq!(eng.ingest().depth(), 0);
        assert!(!eng.stats().streaming);
        assert_eq!(eng.stats().total_events, 1);
        assert_eq!(eng.dispatcher_mut().chips_mut()[0].resets, 1);

        ctx.connected = true;
        eng.step(&mut ctx);
        assert_eq!(eng.stats().total_events, 0);
        assert_eq!(eng.dispatcher_mut().chips_mut()[0].resets, 2);
        assert_eq!(ctx.outbound_text().matches("READY").count(), 2);
    }

    #[test]
    fn status_refresh_publishes_rows() {
        let shared = SharedStatus::new();
        let config = Config {
            status_push: true,
            ..small_config()
        };
        let mut eng = engine(&shared, config);
        let mut ctx = TestingContext::new(0);
        eng.step(&mut ctx);
        let snapshot = shared.snapshot();
        assert!(snapshot.lines[0].starts_with(b"SIDDLER [STATUS]"));

        let pushed: StdVec<_> = ctx
            .outbound_text()
            .lines()
            .filter_map(parse_status_line)
            .collect();
        assert_eq!(pushed.len(), TEXT_ROWS);

        ctx.outbound.clear();
        ctx.now += 200_000;
        eng.step(&mut ctx);
        assert!(ctx.outbound.is_empty());

        ctx.press(Action::ShowView(View::Hex));
        eng.step(&mut ctx);
        let lines = ctx.outbound_text();
        assert!(lines.starts_with("#L 3 0 HEX RX"));
        assert_eq!(lines.lines().count(), TEXT_ROWS);
    }

    #[test]
    fn frame_completion_feeds_visuals() {
        let shared = SharedStatus::new();
        let mut eng = engine(&shared, small_config());
        eng.ingest_bytes(&frame(7, &[RegisterEvent::write(0, 0x18, 0x0A)]));
        let visual = shared.snapshot().visual;
        assert_eq!(visual.wave_depth, 170);
        assert!(visual.polarity);
        assert_eq!(visual.hue, 1);
    }

    #[test]
    fn garbage_is_counted() {
        let shared = SharedStatus::new();
        let mut eng = engine(&shared, small_config());
        let mut data = vec![1, 2, 3];
        data.extend(frame(1, &[]));
        eng.ingest_bytes(&data);
        assert_eq!(eng.stats().desyncs, 1);
        assert_eq!(eng.stats().desync_bytes, 3);
        assert_eq!(eng.stats().total_frames, 1);
    }

    #[test]
    fn midi_input_sets_up_voices_once() {
        let shared = SharedStatus::new();
        let mut eng = engine(&shared, small_config());
        let mut ctx = TestingContext::new(0);
        ctx.midi.extend([0x90, 60, 100].iter().copied());
        eng.step(&mut ctx);
        eng.dispatcher_mut().advance(1);
        ctx.midi.extend([0x80, 60, 0, 0x90, 64, 90].iter().copied());
        eng.step(&mut ctx);
        eng.dispatcher_mut().advance(1);

        let writes = &eng.dispatcher_mut().chips_mut()[0].writes;
        let volume = writes.iter().filter(|w| (w.1, w.2) == (0x18, 0x0F)).count();
        assert_eq!(volume, 1);
        let released = writes.iter().filter(|w| (w.1, w.2) == (0x04, 0x20)).count();
        assert_eq!(released, 2);
        assert_eq!(writes.last().map(|w| (w.1, w.2)), Some((0x0B, 0x21)));
    }

    #[test]
    fn midi_notes_reach_chip() {
        let shared = SharedStatus::new();
        let mut eng = engine(&shared, small_config());
        eng.feed_midi(&[0x90, 60, 100]);
        eng.dispatcher_mut().advance(1);
        let writes = &eng.dispatcher_mut().chips_mut()[0].writes;
        assert_eq!(writes.last(), Some(&(0, 0x04, 0x21)));
    }

    #[test]
    fn garbage_cut_by_disconnect_is_counted() {
        let shared = SharedStatus::new();
        let mut eng = engine(&shared, small_config());
        let mut ctx = TestingContext::new(0);
        eng.step(&mut ctx);
        ctx.send(&[0xAB; 300]);
        ctx.now += 200_000;
        eng.step(&mut ctx);
        assert_eq!(eng.stats().total_bytes, 300);
        assert_eq!(eng.stats().desyncs, 0);
        let shown = b"(297 bytes)";
        assert!(eng
            .screen()
            .lines()
            .iter()
            .any(|row| row.windows(shown.len()).any(|w| w == shown)));

        ctx.connected = false;
        eng.step(&mut ctx);
        assert_eq!(eng.stats().desyncs, 1);
        assert_eq!(eng.stats().desync_bytes, 297);
    }

    #[test]
    fn stretched_wide_delay_is_chained() {
        let shared = SharedStatus::new();
        let format = RecordFormat::Wide;
        let config = Config {
            record_format: format,
            ..small_config()
        };
        let mut eng = engine(&shared, config);
        let mut ctx = TestingContext::new(0);
        eng.step(&mut ctx);
        eng.apply_action(Action::ScaleClock { num: 2, den: 1 });

        let mut data = vec![0u8; HEADER_LEN + format.len()];
        let at = FrameHeader {
            count: 1,
            sequence: 0,
        }
        .encode(&mut data)
        .unwrap();
        format
            .encode(&RegisterEvent::write(u32::MAX - 1, 0x01, 0x02), &mut data[at..])
            .unwrap();
        eng.ingest_bytes(&data);
        eng.step(&mut ctx);

        let queued: StdVec<_> = eng.dispatcher().queue().iter().copied().collect();
        assert_eq!(
            queued,
            vec![
                RegisterEvent::delay_only(u32::MAX),
                RegisterEvent::write(u32::MAX - 2, 0x01, 0x02).with_target(ChipMask::single(0)),
            ]
        );
    }
}
