#![no_main]
#![no_std]

use core::cell::Cell;
use core::fmt::Write;
use cortex_m;
use cortex_m::interrupt::Mutex;
use cortex_m_rt::{entry, exception};
use embassy_time::{Duration, Instant};
use log::{info, LevelFilter};
use panic_halt as _;

use stm32f0xx_hal as hal;

use touch_gesture::classifier::Classifier;
use touch_gesture::conditioner::{calibration_baseline, CALIBRATION_INTERVAL, CALIBRATION_SAMPLES};
use touch_gesture::dispatch::CallbackResult;
use touch_gesture::{
    detector, CallbackError, CallbackTable, ConditionedState, Conditioner, GestureEvent, Sensor,
    TouchConfig, DEFAULT_TOUCH_CONFIG,
};

use crate::hal::pac;
use crate::hal::pac::interrupt;
use crate::hal::prelude::*;
use crate::hal::tsc::Tsc;
use crate::hal::rcc::Rcc;

mod serial;

#[derive(Clone, Copy, Debug)]
struct TscSample {
    group: u8,
    sample: u8,
    channel: u8,
}

/// A single TSC electrode read as a `Sensor`
struct TouchPad {
    tsc: Tsc,
    pad: TscSample,
    max_count: u16,
}

impl TouchPad {
    pub fn new(tsc: pac::TSC, rcc: &mut Rcc, pad: TscSample) -> Self {
        let config = hal::tsc::Config {
            clock_prescale: None,
            max_count: Some(hal::tsc::MaxCount::U8191),
            charge_transfer_high: None,
            charge_transfer_low: None,
        };
        Self {
            tsc: Tsc::tsc(tsc, rcc, Some(config)),
            pad,
            max_count: 8191,
        }
    }

    /// Run one acquisition and return the charge transfer count
    fn acquire(&mut self) -> u16 {
        // The HAL has no way to select channels by number, so write the group
        // registers directly.
        let regs = unsafe { pac::Peripherals::steal().TSC };
        let p = self.pad;

        regs.iogcsr.write(|w| unsafe { w.bits(1 << (p.group - 1)) });
        regs.ioscr.write(|w| unsafe { w.bits(1 << ((p.group - 1) * 4 + p.sample - 1)) });
        regs.ioccr.write(|w| unsafe { w.bits(1 << ((p.group - 1) * 4 + p.channel - 1)) });

        self.tsc.acquire().ok();

        // A group that hit max count before the charge threshold has no status bit
        let group_status = regs.iogcsr.read().bits() >> 16;
        if group_status & (1 << (p.group - 1)) != 0 {
            self.tsc.read_unchecked(p.group)
        } else {
            self.max_count + 1
        }
    }
}

impl Sensor for TouchPad {
    /// Counts fall as capacitance rises, so invert them to make a finger read higher
    fn read_raw(&mut self) -> i32 {
        i32::from(self.max_count) + 1 - i32::from(self.acquire())
    }
}

/// Electrode on PB11 (G6 IO1), sample cap on PB12 (G6 IO2)
const PAD: TscSample = TscSample { group: 6, sample: 2, channel: 1 };

static TOUCH_CONFIG: TouchConfig = TouchConfig {
    touch_threshold: 40,
    long_press_hold_interval: Duration::from_millis(250),
    ..DEFAULT_TOUCH_CONFIG
};

const TICK_MS: u32 = 10;

/// Milliseconds since boot. 64 bits so the clock never wraps in practice.
static TIME_MS: Mutex<Cell<u64>> = Mutex::new(Cell::new(0));

fn now() -> Instant {
    Instant::from_millis(cortex_m::interrupt::free(|cs| TIME_MS.borrow(cs).get()))
}

fn sleep_until(deadline: Instant) {
    while now() < deadline {
        cortex_m::asm::wfi();
    }
}

fn report(event: GestureEvent) -> CallbackResult {
    write!(serial::uart1::writer(), "{}\r\n", event).map_err(|_| CallbackError("uart queue full"))
}

#[entry]
fn main() -> ! {
    let dp = pac::Peripherals::take().unwrap();
    let cp = cortex_m::Peripherals::take().unwrap();

    let mut flash = dp.FLASH;
    let mut rcc = dp.RCC.configure().sysclk(48.mhz()).freeze(&mut flash);
    let gpiob = dp.GPIOB.split(&mut rcc);

    // A library requiring a critical section to set a gpio AF register is bad and I just won't.
    let fake_cs = unsafe { cortex_m::interrupt::CriticalSection::new() };

    let _pad = gpiob.pb11.into_alternate_af3(&fake_cs);
    let _pad_cap = gpiob.pb12.into_alternate_af3(&fake_cs);

    let tx_pin = gpiob.pb6.into_alternate_af0(&fake_cs);
    let rx_pin = gpiob.pb7.into_alternate_af0(&fake_cs);
    let uart = hal::serial::Serial::usart1(dp.USART1, (tx_pin, rx_pin), 115200.bps(), &mut rcc);
    serial::uart1::init(uart, 4);
    serial::logger::init(if TOUCH_CONFIG.debug { LevelFilter::Debug } else { LevelFilter::Info });

    let mut syst = hal::timers::Timer::syst(cp.SYST, (1000 / TICK_MS).hz(), &mut rcc);
    syst.listen(&hal::timers::Event::TimeOut);

    let mut pad = TouchPad::new(dp.TSC, &mut rcc, PAD);
    let config = TOUCH_CONFIG;

    // Keep hands off the pad for the first quarter second
    let mut samples = [0i32; CALIBRATION_SAMPLES];
    for sample in samples.iter_mut() {
        *sample = pad.read_raw();
        sleep_until(now() + CALIBRATION_INTERVAL);
    }
    let mut state = ConditionedState {
        smoothed: 0,
        baseline: calibration_baseline(&samples).unwrap_or(0),
    };
    info!("calibrated baseline: {}", state.baseline);

    let mut on_click = || report(GestureEvent::Click);
    let mut on_double_click = || report(GestureEvent::DoubleClick);
    let mut on_long_press = || report(GestureEvent::LongPress);
    let mut on_long_press_hold = || report(GestureEvent::LongPressHold);
    let mut callbacks = CallbackTable::new();
    callbacks.register(GestureEvent::Click, &mut on_click);
    callbacks.register(GestureEvent::DoubleClick, &mut on_double_click);
    callbacks.register(GestureEvent::LongPress, &mut on_long_press);
    callbacks.register(GestureEvent::LongPressHold, &mut on_long_press_hold);

    let mut conditioner = Conditioner::new();
    let mut classifier = Classifier::new();
    let mut next_sample = now();
    let mut next_poll = now() + classifier.poll_interval(&config);

    loop {
        let time = now();

        if time >= next_sample {
            next_sample += config.sample_interval;
            state = conditioner.update(state, pad.read_raw(), time, &config);
        }

        if time >= next_poll {
            let touching = detector::is_touching(&state, &config);
            for event in classifier.poll(time, touching, &config) {
                callbacks.dispatch(event, config.debug);
            }
            next_poll = time + classifier.poll_interval(&config);
        }

        cortex_m::asm::wfi();
    }
}

#[exception]
fn SysTick() {
    cortex_m::interrupt::free(|cs| {
        let time = TIME_MS.borrow(cs);
        time.set(time.get() + u64::from(TICK_MS));
    });
}
