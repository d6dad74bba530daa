use core::cell::RefCell;

use embassy_stm32::adc::{self, Adc, AdcChannel as _, AnyAdcChannel, SampleTime};
use embassy_stm32::mode::Async;
use embassy_stm32::time::Hertz;
use embassy_stm32::usart::{Config as UsartConfig, Uart};
use embassy_stm32::{bind_interrupts, gpio::Pull, i2c, peripherals, rcc, usart, Config};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;
use embedded_hal::blocking::i2c::{Read, Write, WriteRead};
use static_cell::StaticCell;

use crate::config::{BRIDGE_RX_DMA_BUF, I2C_FREQUENCY_HZ, UART_BAUDRATE};
use crate::drivers::current::counts_to_millivolts;
use crate::drivers::{AdcChannel, SensorError};
use crate::link::bridge::FrameSink;
use crate::link::LinkError;

// ── IRQ table ─────────────────────────────────────────────
bind_interrupts!(pub struct Irqs {
    USART1 => usart::InterruptHandler<peripherals::USART1>;
    I2C2   => i2c::EventInterruptHandler<peripherals::I2C2>,
              i2c::ErrorInterruptHandler<peripherals::I2C2>;
});

static mut BRIDGE_DMA_BUF: [u8; BRIDGE_RX_DMA_BUF] = [0; BRIDGE_RX_DMA_BUF];

type I2cBus = Mutex<CriticalSectionRawMutex, RefCell<i2c::I2c<'static, Async>>>;
type UartTxBus = Mutex<CriticalSectionRawMutex, RefCell<usart::UartTx<'static, Async>>>;
type AdcBus = Mutex<CriticalSectionRawMutex, RefCell<Adc<'static, peripherals::ADC1>>>;

static I2C_BUS: StaticCell<I2cBus> = StaticCell::new();
static UART_TX_BUS: StaticCell<UartTxBus> = StaticCell::new();
static ADC_BUS: StaticCell<AdcBus> = StaticCell::new();

/// Handle to the I2C2 bus shared by the IMU and the thermal sensor.
#[derive(Clone, Copy)]
pub struct SharedI2c(&'static I2cBus);

impl Write for SharedI2c {
    type Error = i2c::Error;

    fn write(&mut self, address: u8, bytes: &[u8]) -> Result<(), i2c::Error> {
        self.0.lock(|bus| bus.borrow_mut().blocking_write(address, bytes))
    }
}

impl WriteRead for SharedI2c {
    type Error = i2c::Error;

    fn write_read(&mut self, address: u8, bytes: &[u8], buffer: &mut [u8]) -> Result<(), i2c::Error> {
        self.0
            .lock(|bus| bus.borrow_mut().blocking_write_read(address, bytes, buffer))
    }
}

impl Read for SharedI2c {
    type Error = i2c::Error;

    fn read(&mut self, address: u8, buffer: &mut [u8]) -> Result<(), i2c::Error> {
        self.0.lock(|bus| bus.borrow_mut().blocking_read(address, buffer))
    }
}

/// Transmit side of the radio coprocessor UART, shared by both links.
#[derive(Clone, Copy)]
pub struct BridgePort(&'static UartTxBus);

impl FrameSink for BridgePort {
    fn send_frame(&mut self, frame: &[u8]) -> Result<(), LinkError> {
        self.0
            .lock(|tx| tx.borrow_mut().blocking_write(frame))
            .map_err(|_| LinkError::SendFailed)
    }
}

/// One current transformer input on ADC1.
pub struct AdcPin {
    adc: &'static AdcBus,
    channel: AnyAdcChannel<peripherals::ADC1>,
}

impl AdcChannel for AdcPin {
    fn read_millivolts(&mut self) -> Result<u16, SensorError> {
        let counts = self
            .adc
            .lock(|adc| adc.borrow_mut().blocking_read(&mut self.channel));
        Ok(counts_to_millivolts(counts))
    }
}

// ── Board struct ──────────────────────────────────────────
pub struct Board {
    pub bridge_tx: BridgePort,
    pub bridge_rx: usart::RingBufferedUartRx<'static>,
    pub i2c: SharedI2c,
    /// Phase A, B, C current transformers (PA0, PA1, PA4).
    pub current_pins: [AdcPin; 3],
}

impl Board {
    pub fn init() -> Self {
        let mut config = Config::default();

        // HSI 16 MHz -> PLL -> 64 MHz system clock
        config.rcc.hsi = Some(rcc::Hsi {
            sys_div: rcc::HsiSysDiv::DIV1,
        });
        config.rcc.pll = Some(rcc::Pll {
            source: rcc::PllSource::HSI,
            prediv: rcc::PllPreDiv::DIV2,   // 16MHz / 2 = 8MHz
            mul: rcc::PllMul::MUL16,        // 8MHz * 16 = 128MHz
            divp: None,
            divq: None,
            divr: Some(rcc::PllRDiv::DIV2), // 128MHz / 2 = 64MHz
        });
        config.rcc.sys = rcc::Sysclk::PLL1_R;
        let p = embassy_stm32::init(config);

        // USART1 to the radio coprocessor (DMA CH2 TX, CH3 RX)
        let mut us_cfg = UsartConfig::default();
        us_cfg.baudrate = UART_BAUDRATE;
        us_cfg.rx_pull = Pull::Up;

        let uart = Uart::new(p.USART1, p.PC5, p.PC4, Irqs, p.DMA1_CH2, p.DMA1_CH3, us_cfg)
            .unwrap();
        let (tx, rx) = uart.split();

        // DMA-circular RX driver
        #[allow(static_mut_refs)]
        let bridge_rx = rx.into_ring_buffered(unsafe { &mut BRIDGE_DMA_BUF });
        let bridge_tx = BridgePort(UART_TX_BUS.init(Mutex::new(RefCell::new(tx))));

        // I²C2 (DMA CH7 TX, CH6 RX); the sensor breakouts carry pull-ups
        let mut i2c_cfg = i2c::Config::default();
        i2c_cfg.sda_pullup = false;
        i2c_cfg.scl_pullup = false;

        let i2c2 = i2c::I2c::new(
            p.I2C2,
            p.PB10,
            p.PB11,
            Irqs,
            p.DMA1_CH7,
            p.DMA1_CH6,
            Hertz(I2C_FREQUENCY_HZ),
            i2c_cfg,
        );
        let i2c = SharedI2c(I2C_BUS.init(Mutex::new(RefCell::new(i2c2))));

        // ADC1, 12-bit, long sample time for the high-impedance CT burden
        let mut adc1 = Adc::new(p.ADC1);
        adc1.set_sample_time(SampleTime::CYCLES79_5);
        adc1.set_resolution(adc::Resolution::BITS12);
        let adc: &'static AdcBus = ADC_BUS.init(Mutex::new(RefCell::new(adc1)));

        let current_pins = [
            AdcPin {
                adc,
                channel: p.PA0.degrade_adc(),
            },
            AdcPin {
                adc,
                channel: p.PA1.degrade_adc(),
            },
            AdcPin {
                adc,
                channel: p.PA4.degrade_adc(),
            },
        ];

        Self {
            bridge_tx,
            bridge_rx,
            i2c,
            current_pins,
        }
    }
}
