// Copyright 2025-2026 CEMAXECUTER LLC

use std::ffi::{CStr, CString};
use std::os::raw::{c_char, c_int, c_void};
use std::ptr;
use std::time::Duration;

use crate::device::{DeviceInfo, DeviceSelector, TunerDriver, TunerKind};
use crate::SdrError;

type RtlsdrDev = c_void;

// librtlsdr returns libusb error codes from open
const LIBUSB_ERROR_BUSY: c_int = -6;

extern "C" {
    fn rtlsdr_get_device_count() -> u32;
    fn rtlsdr_get_device_name(index: u32) -> *const c_char;
    fn rtlsdr_get_device_usb_strings(
        index: u32,
        manufact: *mut c_char,
        product: *mut c_char,
        serial: *mut c_char,
    ) -> c_int;
    fn rtlsdr_get_index_by_serial(serial: *const c_char) -> c_int;
    fn rtlsdr_open(dev: *mut *mut RtlsdrDev, index: u32) -> c_int;
    fn rtlsdr_close(dev: *mut RtlsdrDev) -> c_int;
    fn rtlsdr_set_center_freq(dev: *mut RtlsdrDev, freq: u32) -> c_int;
    fn rtlsdr_set_sample_rate(dev: *mut RtlsdrDev, rate: u32) -> c_int;
    fn rtlsdr_set_freq_correction(dev: *mut RtlsdrDev, ppm: c_int) -> c_int;
    fn rtlsdr_get_tuner_type(dev: *mut RtlsdrDev) -> c_int;
    fn rtlsdr_get_tuner_gains(dev: *mut RtlsdrDev, gains: *mut c_int) -> c_int;
    fn rtlsdr_set_tuner_gain(dev: *mut RtlsdrDev, gain: c_int) -> c_int;
    fn rtlsdr_set_tuner_gain_mode(dev: *mut RtlsdrDev, manual: c_int) -> c_int;
    fn rtlsdr_set_agc_mode(dev: *mut RtlsdrDev, on: c_int) -> c_int;
    fn rtlsdr_set_direct_sampling(dev: *mut RtlsdrDev, on: c_int) -> c_int;
    fn rtlsdr_reset_buffer(dev: *mut RtlsdrDev) -> c_int;
    fn rtlsdr_read_sync(
        dev: *mut RtlsdrDev,
        buf: *mut c_void,
        len: c_int,
        n_read: *mut c_int,
    ) -> c_int;
}

/// List the names of all attached dongles.
pub fn catalog() -> Vec<String> {
    let count = unsafe { rtlsdr_get_device_count() };
    (0..count)
        .map(|i| unsafe {
            let p = rtlsdr_get_device_name(i);
            if p.is_null() {
                String::new()
            } else {
                CStr::from_ptr(p).to_string_lossy().to_string()
            }
        })
        .collect()
}

fn usb_strings(index: u32) -> (String, String) {
    let mut manufact = [0 as c_char; 256];
    let mut product = [0 as c_char; 256];
    let mut serial = [0 as c_char; 256];
    let r = unsafe {
        rtlsdr_get_device_usb_strings(
            index,
            manufact.as_mut_ptr(),
            product.as_mut_ptr(),
            serial.as_mut_ptr(),
        )
    };
    if r != 0 {
        return (String::new(), String::new());
    }
    let name = unsafe { CStr::from_ptr(manufact.as_ptr()) }
        .to_string_lossy()
        .to_string();
    let serial = unsafe { CStr::from_ptr(serial.as_ptr()) }
        .to_string_lossy()
        .to_string();
    (name, serial)
}

fn tuner_kind(code: c_int) -> TunerKind {
    match code {
        1 => TunerKind::E4000,
        2 => TunerKind::Fc0012,
        3 => TunerKind::Fc0013,
        4 => TunerKind::Fc2580,
        5 => TunerKind::R820t,
        6 => TunerKind::R828d,
        _ => TunerKind::Unknown,
    }
}

/// An open librtlsdr dongle behind the driver contract.
pub struct RtlDriver {
    dev: *mut RtlsdrDev,
    info: DeviceInfo,
    gains: Vec<i32>,
}

// Device pointer has a single owner; all calls go through &mut self.
unsafe impl Send for RtlDriver {}

impl RtlDriver {
    /// Enumerate and claim the first device matching the selector.
    pub fn open(selector: &DeviceSelector) -> Result<Self, SdrError> {
        let count = unsafe { rtlsdr_get_device_count() };
        if count == 0 {
            return Err(SdrError::DeviceNotFound);
        }

        let index = match selector {
            DeviceSelector::First => 0,
            DeviceSelector::Index(i) => {
                if *i >= count as usize {
                    return Err(SdrError::DeviceNotFound);
                }
                *i as u32
            }
            DeviceSelector::Serial(serial) => {
                let cs = CString::new(serial.as_str())
                    .map_err(|e| SdrError::InvalidParameter(format!("serial: {}", e)))?;
                let r = unsafe { rtlsdr_get_index_by_serial(cs.as_ptr()) };
                if r < 0 {
                    return Err(SdrError::DeviceNotFound);
                }
                r as u32
            }
        };

        let (name, serial) = usb_strings(index);

        let mut dev: *mut RtlsdrDev = ptr::null_mut();
        let r = unsafe { rtlsdr_open(&mut dev, index) };
        if r != 0 || dev.is_null() {
            return Err(if r == LIBUSB_ERROR_BUSY {
                SdrError::DeviceBusy
            } else {
                SdrError::DeviceError(format!("rtlsdr_open failed: {}", r))
            });
        }

        let tuner = tuner_kind(unsafe { rtlsdr_get_tuner_type(dev) });

        let n = unsafe { rtlsdr_get_tuner_gains(dev, ptr::null_mut()) };
        let gains = if n > 0 {
            let mut gains = vec![0 as c_int; n as usize];
            unsafe { rtlsdr_get_tuner_gains(dev, gains.as_mut_ptr()) };
            gains.into_iter().map(|g| g as i32).collect()
        } else {
            Vec::new()
        };

        log::info!(
            "opened {} (serial {}, {} tuner, {} gain steps)",
            name,
            serial,
            tuner.name(),
            gains.len()
        );

        Ok(Self {
            dev,
            info: DeviceInfo {
                name,
                serial,
                tuner,
            },
            gains,
        })
    }

    fn check(&self, r: c_int, what: &str) -> Result<(), SdrError> {
        if r == 0 {
            Ok(())
        } else {
            Err(SdrError::DeviceError(format!("{} failed: {}", what, r)))
        }
    }
}

impl TunerDriver for RtlDriver {
    fn info(&self) -> DeviceInfo {
        self.info.clone()
    }

    fn tuner_gains(&self) -> Vec<i32> {
        self.gains.clone()
    }

    fn set_center_freq(&mut self, hz: u32) -> Result<(), SdrError> {
        let r = unsafe { rtlsdr_set_center_freq(self.dev, hz) };
        self.check(r, "rtlsdr_set_center_freq")
    }

    fn set_sample_rate(&mut self, hz: u32) -> Result<(), SdrError> {
        let r = unsafe { rtlsdr_set_sample_rate(self.dev, hz) };
        self.check(r, "rtlsdr_set_sample_rate")
    }

    fn set_tuner_gain(&mut self, tenths_db: i32) -> Result<(), SdrError> {
        let r = unsafe { rtlsdr_set_tuner_gain_mode(self.dev, 1) };
        self.check(r, "rtlsdr_set_tuner_gain_mode")?;
        let r = unsafe { rtlsdr_set_tuner_gain(self.dev, tenths_db) };
        self.check(r, "rtlsdr_set_tuner_gain")
    }

    fn set_agc(&mut self, enable: bool) -> Result<(), SdrError> {
        if enable {
            let r = unsafe { rtlsdr_set_tuner_gain_mode(self.dev, 0) };
            self.check(r, "rtlsdr_set_tuner_gain_mode")?;
        }
        let r = unsafe { rtlsdr_set_agc_mode(self.dev, enable as c_int) };
        self.check(r, "rtlsdr_set_agc_mode")
    }

    fn set_ppm_correction(&mut self, ppm: i32) -> Result<(), SdrError> {
        let r = unsafe { rtlsdr_set_freq_correction(self.dev, ppm) };
        // librtlsdr reports -2 when the correction is already in effect
        if r == -2 {
            return Ok(());
        }
        self.check(r, "rtlsdr_set_freq_correction")
    }

    fn set_direct_sampling(&mut self, enable: bool) -> Result<(), SdrError> {
        let r = unsafe { rtlsdr_set_direct_sampling(self.dev, enable as c_int) };
        self.check(r, "rtlsdr_set_direct_sampling")
    }

    fn reset_buffer(&mut self) -> Result<(), SdrError> {
        let r = unsafe { rtlsdr_reset_buffer(self.dev) };
        self.check(r, "rtlsdr_reset_buffer")
    }

    fn read_sync(&mut self, buf: &mut [u8], _timeout: Duration) -> Result<usize, SdrError> {
        // librtlsdr manages its own USB transfer timeout internally
        let mut n_read: c_int = 0;
        let r = unsafe {
            rtlsdr_read_sync(
                self.dev,
                buf.as_mut_ptr() as *mut c_void,
                buf.len() as c_int,
                &mut n_read,
            )
        };
        if r != 0 {
            return Err(SdrError::DeviceError(format!(
                "rtlsdr_read_sync failed: {}",
                r
            )));
        }
        Ok(n_read as usize)
    }
}

impl Drop for RtlDriver {
    fn drop(&mut self) {
        unsafe {
            rtlsdr_close(self.dev);
        }
    }
}
