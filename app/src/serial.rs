/// A transmit-only, IRQ driven serial port for event reports and log output
///
pub mod uart1 {
    use crate::interrupt;
    use crate::hal::{
        pac,
        prelude::*,
        serial::{
            Event,
            Serial,
        }
    };
    use heapless::spsc::{Consumer, Producer, Queue};
    use stm32f0xx_hal::gpio::{
        gpiob,
        Alternate,
        AF0,
    };

    const TX_Q_SIZE: usize = 256;

    static mut TX_Q_CONSUMER: Option<Consumer<u8, TX_Q_SIZE>> = None;
    static mut TX_Q_PRODUCER: Option<Producer<u8, TX_Q_SIZE>> = None;

    type TxPinType = gpiob::PB6<Alternate<AF0>>;
    type RxPinType = gpiob::PB7<Alternate<AF0>>;
    static mut SERIAL: Option<Serial<pac::USART1, TxPinType, RxPinType>> = None;

    pub struct Uart1Tx {}

    impl core::fmt::Write for Uart1Tx {
        fn write_str(&mut self, s: &str) -> Result<(), core::fmt::Error> {
            for b in s.bytes() {
                if !write_byte(b) {
                    return Err(core::fmt::Error);
                }
            }
            Ok(())
        }
    }

    /// Must be called once during application initialization, before any write
    pub fn init(serial: Serial<pac::USART1, TxPinType, RxPinType>, irq_prio: u8) {
        let core = unsafe { pac::CorePeripherals::steal() };
        let mut nvic = core.NVIC;

        static mut TX_Q: Queue<u8, TX_Q_SIZE> = Queue::new();
        let (tx_q_producer, tx_q_consumer) = unsafe { TX_Q.split() };

        unsafe {
            TX_Q_PRODUCER = Some(tx_q_producer);
            TX_Q_CONSUMER = Some(tx_q_consumer);
            SERIAL = Some(serial);

            nvic.set_priority(pac::Interrupt::USART1, irq_prio);
            pac::NVIC::unmask(pac::Interrupt::USART1);
        }
    }

    /// Queue a byte for transmission. Returns false if the queue was full and the byte dropped.
    pub fn write_byte(b: u8) -> bool {
        let queued = cortex_m::interrupt::free(|_| {
            let tx_q_producer = unsafe { TX_Q_PRODUCER.as_mut().unwrap_unchecked() };
            tx_q_producer.enqueue(b).is_ok()
        });
        let serial = unsafe { SERIAL.as_mut().unwrap_unchecked() };
        serial.listen(Event::Txe);
        queued
    }

    pub fn writer() -> Uart1Tx {
        Uart1Tx {}
    }

    #[interrupt]
    fn USART1() {
        let serial = unsafe { SERIAL.as_mut().unwrap_unchecked() };
        let tx_q_consumer = unsafe { TX_Q_CONSUMER.as_mut().unwrap_unchecked() };
        let usart1 = unsafe { crate::hal::pac::Peripherals::steal().USART1 };

        let isr = (*usart1).isr.read();
        if isr.txe().bit_is_set() {
            match tx_q_consumer.dequeue() {
                Some(b) => {
                    serial.write(b).ok();
                },
                None => {
                    // Masked until the next write_byte re-enables it
                    serial.unlisten(Event::Txe);
                }
            }
        }
    }
}

/// `log` backend writing one line per record to UART1
pub mod logger {
    use core::fmt::Write;
    use log::{LevelFilter, Log, Metadata, Record};

    struct UartLogger;

    static LOGGER: UartLogger = UartLogger;

    impl Log for UartLogger {
        fn enabled(&self, _metadata: &Metadata) -> bool {
            true
        }

        fn log(&self, record: &Record) {
            let mut writer = super::uart1::writer();
            // Dropped output is preferable to stalling the control loop
            let _ = write!(writer, "{} {}\r\n", record.level(), record.args());
        }

        fn flush(&self) {}
    }

    /// Install the UART logger. Call once, after `uart1::init` and before
    /// anything else logs.
    pub fn init(level: LevelFilter) {
        // thumbv6m has no compare-and-swap, so the racy setter is the only option
        unsafe {
            log::set_logger_racy(&LOGGER).ok();
            log::set_max_level_racy(level);
        }
    }
}
