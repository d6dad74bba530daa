// Centralize all configuration constants

// Loop cadence
pub const HUB_SAMPLE_RATE_HZ: u32 = 10;
pub const HUB_SAMPLE_PERIOD_MS: u64 = 1000 / HUB_SAMPLE_RATE_HZ as u64;
// One node packet is three back-to-back RMS windows, so the window length
// bounds this period from below.
pub const CURRENT_NODE_PERIOD_MS: u64 = 500;

// Bus timing
pub const UART_BAUDRATE: u32 = 1_000_000;
pub const I2C_FREQUENCY_HZ: u32 = 100_000;

// Smoothing
pub const INERTIAL_FILTER_ALPHA: f32 = 0.2;
pub const THERMAL_FILTER_ALPHA: f32 = 0.05;
pub const CURRENT_FILTER_ALPHA: f32 = 0.2;

// Calibration passes
pub const IMU_CALIBRATION_SAMPLES: u32 = 500;
pub const IMU_SETTLE_MS: u32 = 2;
pub const THERMAL_CALIBRATION_SAMPLES: u32 = 20;
pub const THERMAL_SETTLE_MS: u32 = 20;
pub const CURRENT_CALIBRATION_PASSES: u32 = 4;
pub const CURRENT_SETTLE_MS: u32 = 5;
/// Ambient temperature the thermal channel is trimmed against.
pub const ROOM_TEMPERATURE_C: f32 = 22.0;

// ADC sampling for the RMS window
pub const ADC_RMS_SAMPLES: u16 = 256;
pub const ADC_SAMPLE_SPACING_US: u32 = 500;
pub const ADC_FULL_SCALE_MV: u32 = 3300;
pub const ADC_MAX_COUNT: u32 = 4095;
/// Current transformer burden output, volts RMS per ampere.
pub const CT_VOLTS_PER_AMP: f32 = 0.1;

// Sensor bring-up retry policy (application loop, not the drivers)
pub const INIT_ATTEMPTS: u32 = 5;
pub const INIT_BACKOFF_BASE_MS: u64 = 200;

// Radio identity
/// Datagram peer the current node sends to (the hub's radio address).
pub const HUB_RADIO_ADDRESS: [u8; 6] = [0x24, 0x6F, 0x28, 0x1A, 0x2B, 0x3C];
pub const NOTIFY_DEVICE_NAME: &str = "motorlink";
pub const NOTIFY_SERVICE_UUID: &str = "4fafc201-1fb5-459e-8fcc-c5c9c331914b";
pub const NOTIFY_CHARACTERISTIC_UUID: &str = "488147e4-8512-4bca-b218-0b84f2f76853";

// Bridge UART
pub const BRIDGE_RX_DMA_BUF: usize = 512;
