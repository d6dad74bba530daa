use embedded_hal::blocking::i2c::{Read, Write, WriteRead};

use super::SensorError;

/// Register-level I2C access as the drivers need it.
///
/// Implemented for every `embedded-hal` blocking I2C bus; any bus error is
/// reported as a failed transaction.
pub trait RegisterBus {
    fn write_register(&mut self, device: u8, reg: u8, value: u8) -> Result<(), SensorError>;

    fn read_registers(&mut self, device: u8, reg: u8, buf: &mut [u8]) -> Result<(), SensorError>;

    /// Raw command write for devices addressed by command words instead of
    /// registers.
    fn write_command(&mut self, device: u8, command: &[u8]) -> Result<(), SensorError>;

    fn read(&mut self, device: u8, buf: &mut [u8]) -> Result<(), SensorError>;

    fn read_register(&mut self, device: u8, reg: u8) -> Result<u8, SensorError> {
        let mut buf = [0u8; 1];
        self.read_registers(device, reg, &mut buf)?;
        Ok(buf[0])
    }
}

impl<B, E> RegisterBus for B
where
    B: Write<Error = E> + WriteRead<Error = E> + Read<Error = E>,
{
    fn write_register(&mut self, device: u8, reg: u8, value: u8) -> Result<(), SensorError> {
        Write::write(self, device, &[reg, value]).map_err(|_| SensorError::Transaction)
    }

    fn read_registers(&mut self, device: u8, reg: u8, buf: &mut [u8]) -> Result<(), SensorError> {
        self.write_read(device, &[reg], buf)
            .map_err(|_| SensorError::Transaction)
    }

    fn write_command(&mut self, device: u8, command: &[u8]) -> Result<(), SensorError> {
        Write::write(self, device, command).map_err(|_| SensorError::Transaction)
    }

    fn read(&mut self, device: u8, buf: &mut [u8]) -> Result<(), SensorError> {
        Read::read(self, device, buf).map_err(|_| SensorError::Transaction)
    }
}
