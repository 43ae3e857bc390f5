#![no_main]
#![no_std]

// sets default panic handler
#[allow(unused_imports)]
use panic_itm;

use core::cell::RefCell;

use cortex_m::interrupt::{self as critical, Mutex};
use cortex_m::peripheral::NVIC;
// provides _start symbol
use cortex_m_rt::entry;
use heapless::spsc::Queue;

use stm32f3xx_hal as stm32f303;

use stm32f303::{
    gpio::GpioExt,
    hal::timer::CountDown,
    pac::{self, interrupt, Interrupt, TIM2, USART1},
    prelude::*,
    serial::{Rx, Serial},
    time::MegaHertz,
    timer::{Event, Timer},
};

#[allow(unused_imports)]
use log::{debug, error, info, trace, warn};
use peripherals::{
    freeze_clocks,
    logger::*,
    ppu,
    serial::{MIDI_BAUD, RX_RING},
    spu,
    spu::AUDIO_RING,
    AudioOut, AudioSink, Buttons, ClocksExt, Console, MidiIn, OledPanel, RxPump, SerialTransport,
};

use siddler::{Builder, ChipModel, Config, Renderer, SharedStatus, StereoFrame, ToneChip};

mod context;
use context::BoardContext;

const SAMPLE_RATE: u32 = 22_050;
const FRAME_RATE: u32 = 25;
const HOST_BAUD: u32 = 1_000_000;
const CONSOLE_BAUD: u32 = 115_200;

static SHARED: SharedStatus = SharedStatus::new();

static mut RX_QUEUE: Queue<u8, RX_RING> = Queue::new();
static mut AUDIO_QUEUE: Queue<StereoFrame, AUDIO_RING> = Queue::new();

static RX_PUMP: Mutex<RefCell<Option<RxPump<Rx<USART1>>>>> = Mutex::new(RefCell::new(None));
static AUDIO_OUT: Mutex<RefCell<Option<(AudioOut, Timer<TIM2>)>>> =
    Mutex::new(RefCell::new(None));

#[entry]
fn main() -> ! {
    let mut cp = cortex_m::Peripherals::take().expect("Failed requesting peripherals");
    let dp = pac::Peripherals::take().expect("Failed requesting peripherals");

    let logger = create_itm_logger::<InterruptOk>(LevelFilter::Info, cp.ITM);
    unsafe {
        init(&logger);
    }
    info!("init process started");

    let mut flash = dp.FLASH.constrain();
    let mut rcc = dp.RCC.constrain();
    let sysclk = MegaHertz(72);
    let clocks = freeze_clocks(sysclk, rcc.cfgr, &mut flash).set_tpiu_async_cpr(MegaHertz(2));

    cp.DCB.enable_trace();
    cp.DWT.enable_cycle_counter();

    let mut gpioa = dp.GPIOA.split(&mut rcc.ahb);
    let mut gpiob = dp.GPIOB.split(&mut rcc.ahb);
    let mut gpiod = dp.GPIOD.split(&mut rcc.ahb);

    info!("configuring host uart on usart1");
    let tx = gpioa.pa9.into_af7(&mut gpioa.moder, &mut gpioa.afrh);
    let rx = gpioa.pa10.into_af7(&mut gpioa.moder, &mut gpioa.afrh);
    let dtr = gpioa
        .pa4
        .into_pull_up_input(&mut gpioa.moder, &mut gpioa.pupdr);
    let rts = gpioa
        .pa5
        .into_push_pull_output(&mut gpioa.moder, &mut gpioa.otyper);
    let host = Serial::usart1(dp.USART1, (tx, rx), HOST_BAUD.bps(), clocks, &mut rcc.apb2);
    let (host_tx, host_rx) = host.split();
    let (rx_in, rx_out) = unsafe { RX_QUEUE.split() };
    critical::free(|cs| {
        RX_PUMP
            .borrow(cs)
            .replace(Some(RxPump::new(host_rx, rx_in)));
    });
    // receive interrupt
    unsafe { (*USART1::ptr()).cr1.modify(|_, w| w.rxneie().set_bit()) };
    let transport = SerialTransport::new(host_tx, rx_out, dtr, rts);

    info!("configuring console on usart2");
    let tx2 = gpioa.pa2.into_af7(&mut gpioa.moder, &mut gpioa.afrl);
    let rx2 = gpioa.pa3.into_af7(&mut gpioa.moder, &mut gpioa.afrl);
    let console = Serial::usart2(dp.USART2, (tx2, rx2), CONSOLE_BAUD.bps(), clocks, &mut rcc.apb1);
    let (_, console_rx) = console.split();

    info!("configuring midi in on usart3");
    let tx3 = gpiod.pd8.into_af7(&mut gpiod.moder, &mut gpiod.afrh);
    let rx3 = gpiod.pd9.into_af7(&mut gpiod.moder, &mut gpiod.afrh);
    let midi = Serial::usart3(dp.USART3, (tx3, rx3), MIDI_BAUD.bps(), clocks, &mut rcc.apb1);
    let (_, midi_rx) = midi.split();

    info!("configuring pwm audio with tim3 ch2 on pb5");
    let pb5 = gpiob.pb5.into_af2(&mut gpiob.moder, &mut gpiob.afrl);
    let pwm = spu::init_tim3_pwm_on_pb5(250.khz().into(), dp.TIM3, pb5, &clocks);
    let (audio_in, audio_out) = unsafe { AUDIO_QUEUE.split() };
    let mut sample_timer = Timer::tim2(dp.TIM2, SAMPLE_RATE.hz(), clocks, &mut rcc.apb1);
    sample_timer.listen(Event::Update);
    critical::free(|cs| {
        AUDIO_OUT
            .borrow(cs)
            .replace(Some((AudioOut::new(audio_out, pwm), sample_timer)));
    });

    info!("configuring ssd1306 display via spi2");
    let rst = gpiob
        .pb0
        .into_push_pull_output(&mut gpiob.moder, &mut gpiob.otyper);
    let dc = gpiob
        .pb1
        .into_push_pull_output(&mut gpiob.moder, &mut gpiob.otyper);
    let chip_select = gpiob
        .pb11
        .into_push_pull_output(&mut gpiob.moder, &mut gpiob.otyper);
    let sck = gpiob.pb13.into_af5(&mut gpiob.moder, &mut gpiob.afrh);
    let miso = gpiob.pb14.into_af5(&mut gpiob.moder, &mut gpiob.afrh);
    let mosi = gpiob.pb15.into_af5(&mut gpiob.moder, &mut gpiob.afrh);
    let mut panel = ppu::init_ssd1306_on_spi2(
        8.mhz(),
        dp.SPI2,
        (sck, miso, mosi),
        (chip_select, dc, rst),
        &mut rcc.apb1,
        cp.SYST,
        clocks,
    )
    .map(OledPanel::new);
    if panel.is_none() {
        warn!("running without a display");
    }

    let button_a = gpiod
        .pd0
        .into_pull_up_input(&mut gpiod.moder, &mut gpiod.pupdr);
    let button_b = gpiod
        .pd1
        .into_pull_up_input(&mut gpiod.moder, &mut gpiod.pupdr);
    let button_c = gpiod
        .pd2
        .into_pull_up_input(&mut gpiod.moder, &mut gpiod.pupdr);

    let config = Config {
        sample_rate_hz: SAMPLE_RATE,
        ..Config::default()
    };
    let mut engine = Builder::<ToneChip, 1024, 256>::new()
        .with_config(config)
        .with_shared(&SHARED)
        .with_chip(ToneChip::new(ChipModel::Mos6581))
        .with_chip(ToneChip::new(ChipModel::Mos8580))
        .build()
        .expect("Failed building engine");

    let mut ctx = BoardContext::new(
        transport,
        AudioSink::new(audio_in),
        Console::new(console_rx),
        Buttons::new([&button_a, &button_b, &button_c]),
        MidiIn::new(midi_rx),
        clocks.sysclk().0,
    );

    let mut renderer = Renderer::new(&SHARED);
    let mut frame_timer = Timer::tim4(dp.TIM4, FRAME_RATE.hz(), clocks, &mut rcc.apb1);
    frame_timer.start(FRAME_RATE.hz());

    unsafe {
        NVIC::unmask(Interrupt::USART1_EXTI25);
        NVIC::unmask(Interrupt::TIM2);
    }
    info!("entering main loop");

    loop {
        engine.step(&mut ctx);

        if let Some(panel) = panel.as_mut() {
            if frame_timer.wait().is_ok() {
                panel.request_frame();
            }
            renderer.step(panel);
        }
    }
}

#[interrupt]
fn USART1_EXTI25() {
    critical::free(|cs| {
        if let Some(pump) = RX_PUMP.borrow(cs).borrow_mut().as_mut() {
            pump.service();
        }
    });
}

#[interrupt]
fn TIM2() {
    critical::free(|cs| {
        if let Some((out, timer)) = AUDIO_OUT.borrow(cs).borrow_mut().as_mut() {
            timer.wait().ok();
            out.tick();
        }
    });
}
