mod common;

use core::convert::Infallible;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use crossbeam_utils::thread;
use rand::{rngs::StdRng, Rng, SeedableRng};

use siddler::engine::READY_BANNER;
use siddler::shared::{TextRow, BLANK_ROW, TEXT_ROWS};
use siddler::{
    Builder, Config, RegisterEvent, Renderer, ScanlineContext, ScanlineInput, SharedStatus,
};

use common::{init_logger, stream, HostContext, StampChip};

/// Display that asks for `budget` scanlines per poll
struct Panel {
    lines: u16,
    next: u16,
    budget: u16,
    garbled: usize,
    rows: Vec<TextRow>,
}

impl Panel {
    fn new(lines: u16) -> Self {
        Self {
            lines,
            next: 0,
            budget: 0,
            garbled: 0,
            rows: vec![BLANK_ROW; TEXT_ROWS],
        }
    }

    fn request_frame(&mut self) {
        self.budget = self.lines;
    }
}

impl ScanlineContext for Panel {
    fn next_scanline(&mut self) -> nb::Result<u16, Infallible> {
        if self.budget == 0 {
            return Err(nb::Error::WouldBlock);
        }
        self.budget -= 1;
        let line = self.next;
        self.next = (self.next + 1) % self.lines;
        Ok(line)
    }

    fn lines_per_frame(&self) -> u16 {
        self.lines
    }

    fn emit(&mut self, _scanline: u16, input: &ScanlineInput<'_>) {
        if input.text.iter().any(|b| !(0x20..0x7F).contains(b)) {
            self.garbled += 1;
        }
        if let Some(row) = self.rows.get_mut(usize::from(input.text_row)) {
            *row = *input.text;
        }
    }
}

fn random_events(rng: &mut StdRng, count: usize) -> Vec<RegisterEvent> {
    (0..count)
        .map(|_| RegisterEvent::write(rng.gen_range(0, 200), rng.gen_range(0, 0x19), rng.gen()))
        .collect()
}

#[test]
fn engine_and_renderer_on_two_threads() {
    init_logger();
    let mut rng = StdRng::seed_from_u64(0x51D);
    let events = random_events(&mut rng, 3000);
    let data = stream(&events, 50);

    let shared = SharedStatus::new();
    let done = AtomicBool::new(false);
    let config = Config {
        ingest_marks: Some((64, 512)),
        status_period_us: 1_000,
        ..Config::default()
    };

    let (writes, total_events, outbound, panel, frames) = thread::scope(|s| {
        let engine = s.spawn(|_| {
            let mut engine = Builder::<StampChip, 1024, 64>::new()
                .with_config(config)
                .with_shared(&shared)
                .with_chip(StampChip::default())
                .build()
                .unwrap();
            let mut host = HostContext::new(data, 64);
            for _ in 0..100_000 {
                engine.step(&mut host);
                if host.drained()
                    && engine.ingest().is_empty()
                    && engine.dispatcher().queue().is_empty()
                {
                    break;
                }
            }
            done.store(true, Ordering::Release);
            let writes = engine.dispatcher_mut().chips_mut()[0].writes.clone();
            (writes, engine.stats().total_events, host.outbound)
        });

        let renderer = s.spawn(|_| {
            let mut renderer = Renderer::new(&shared);
            let mut panel = Panel::new(240);
            let started = Instant::now();
            while !done.load(Ordering::Acquire) && started.elapsed() < Duration::from_secs(30) {
                panel.request_frame();
                renderer.step(&mut panel);
            }
            panel.request_frame();
            renderer.step(&mut panel);
            (panel, renderer.frames())
        });

        let (writes, total_events, outbound) = engine.join().unwrap();
        let (panel, frames) = renderer.join().unwrap();
        (writes, total_events, outbound, panel, frames)
    })
    .unwrap();

    assert!(outbound.starts_with(READY_BANNER));
    assert_eq!(total_events, events.len() as u64);
    assert_eq!(writes.len(), events.len());

    let start = writes[0].0;
    let mut due = 0u64;
    for (i, (event, write)) in events.iter().zip(&writes).enumerate() {
        if i > 0 {
            due += u64::from(event.delay);
        }
        assert_eq!(write.0 - start, due, "event {} landed off its cycle", i);
        assert_eq!((write.1, write.2), (event.addr, event.value));
    }

    assert!(frames > 0);
    assert_eq!(panel.garbled, 0);
    let snapshot = shared.snapshot();
    assert_eq!(&panel.rows[..], &snapshot.lines[..]);
}

#[test]
fn status_push_reaches_the_host() {
    init_logger();
    let shared = SharedStatus::new();
    let config = Config {
        status_push: true,
        ..Config::default()
    };
    let mut engine = Builder::<StampChip, 256, 64>::new()
        .with_config(config)
        .with_shared(&shared)
        .with_chip(StampChip::default())
        .build()
        .unwrap();
    let mut host = HostContext::new(stream(&[RegisterEvent::write(10, 0x18, 0x0F)], 1), 16);
    for _ in 0..4 {
        engine.step(&mut host);
    }

    let text = String::from_utf8_lossy(&host.outbound).into_owned();
    let pushed: Vec<_> = text
        .split('\n')
        .filter_map(siddler::status::parse_status_line)
        .collect();
    assert!(pushed.len() >= TEXT_ROWS);
    for (row, line) in pushed.iter().take(TEXT_ROWS).enumerate() {
        assert_eq!((line.screen, usize::from(line.row)), (0, row));
    }
}
