//! [I²C](https://en.wikipedia.org/wiki/I%C2%B2C) register access.

use std::path::Path;

use i2cdev::{
    core::I2CDevice,
    linux::{LinuxI2CDevice, LinuxI2CError},
};

#[cfg(feature = "tracing")]
use tracing::{instrument, trace};

use crate::vl53l4cd::Register;

pub(crate) struct Device {
    i2c: LinuxI2CDevice,
}

impl Device {
    pub fn open(bus: &Path, addr: u8) -> Result<Self, LinuxI2CError> {
        Ok(Self {
            i2c: LinuxI2CDevice::new(bus, u16::from(addr))?,
        })
    }

    #[cfg_attr(feature = "tracing", instrument(level = "trace", skip(self, dest), fields(len = %dest.len())))]
    pub fn read_bytes(&mut self, reg: Register, dest: &mut [u8]) -> Result<(), LinuxI2CError> {
        #[cfg(feature = "tracing")]
        trace!("write {:x?}", reg.as_bytes());
        self.i2c.write(&reg.as_bytes())?;

        #[cfg(feature = "tracing")]
        trace!("read {}", dest.len());
        self.i2c.read(dest)
    }

    pub fn write(&mut self, data: &[u8]) -> Result<(), LinuxI2CError> {
        self.i2c.write(data)
    }
}

macro_rules! read_impl {
    ($name:ident, $out:ty) => {
        impl Device {
            /// Read a
            #[doc = concat!("[`", stringify!($out), "`]")]
            /// from some [`Register`].
            pub fn $name(&mut self, reg: Register) -> Result<$out, LinuxI2CError> {
                let mut buf = [0; core::mem::size_of::<$out>()];
                self.read_bytes(reg, &mut buf)?;
                Ok(<$out>::from_be_bytes(buf))
            }
        }
    };
}

read_impl!(read_byte, u8);
read_impl!(read_word, u16);
read_impl!(read_dword, u32);

macro_rules! write_impl {
    ($name:ident, $in:ty) => {
        impl Device {
            /// Write a
            #[doc = concat!("[`", stringify!($in), "`]")]
            /// into some [`Register`].
            pub fn $name(&mut self, reg: Register, data: $in) -> Result<(), LinuxI2CError> {
                let mut msg = [0; 2 + core::mem::size_of::<$in>()]; // register, then data
                msg[..2].copy_from_slice(&reg.as_bytes());
                msg[2..].copy_from_slice(&data.to_be_bytes());
                #[cfg(feature = "tracing")]
                trace!("write {:x?}", msg);
                self.write(&msg)
            }
        }
    };
}

write_impl!(write_byte, u8);
write_impl!(write_word, u16);
write_impl!(write_dword, u32);
