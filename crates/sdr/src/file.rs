// Copyright 2025-2026 CEMAXECUTER LLC

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use std::thread;
use std::time::Duration;

use crate::device::{DeviceInfo, TunerDriver, TunerKind, DEFAULT_GAIN_TABLE};
use crate::SdrError;

/// I/Q sample format for file input
#[derive(Debug, Clone, Copy)]
pub enum SampleFormat {
    /// Complex int8 (CS8): pairs of i8
    Ci8,
    /// Complex int16 (CS16): pairs of i16, little-endian
    Ci16,
    /// Complex float32 (CF32): pairs of f32, little-endian
    Cf32,
}

/// I/Q file playback behind the driver contract, for offline work.
///
/// Wider formats are narrowed to the 8-bit wire format the session
/// expects. Reads are paced to the configured sample rate; end of file
/// behaves like a stalled device (reads time out).
pub struct FileDriver {
    reader: BufReader<File>,
    format: SampleFormat,
    path: String,
    freq: u32,
    rate: u32,
    gain: i32,
    agc: bool,
    ppm: i32,
    direct: bool,
}

impl FileDriver {
    pub fn open(path: impl AsRef<Path>, format: SampleFormat) -> Result<Self, SdrError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                SdrError::DeviceNotFound
            } else {
                SdrError::DeviceError(format!("failed to open {}: {}", path.display(), e))
            }
        })?;
        Ok(Self {
            reader: BufReader::with_capacity(1024 * 1024, file),
            format,
            path: path.display().to_string(),
            freq: 0,
            rate: 2_048_000,
            gain: 0,
            agc: false,
            ppm: 0,
            direct: false,
        })
    }

    /// Read up to `samples` complex samples, narrowing to i8 wire bytes.
    fn read_wire(&mut self, out: &mut [u8], samples: usize) -> Result<usize, SdrError> {
        let io_err =
            |e: std::io::Error| SdrError::DeviceError(format!("read error: {}", e));
        match self.format {
            SampleFormat::Ci8 => {
                let n = self.reader.read(&mut out[..samples * 2]).map_err(io_err)?;
                Ok(n - (n % 2))
            }
            SampleFormat::Ci16 => {
                let mut buf = vec![0u8; samples * 4];
                let n = self.reader.read(&mut buf).map_err(io_err)?;
                let values = n / 2;
                for i in 0..values {
                    let v = i16::from_le_bytes([buf[i * 2], buf[i * 2 + 1]]);
                    out[i] = (v >> 8) as i8 as u8;
                }
                Ok(values - (values % 2))
            }
            SampleFormat::Cf32 => {
                let mut buf = vec![0u8; samples * 8];
                let n = self.reader.read(&mut buf).map_err(io_err)?;
                let values = n / 4;
                for i in 0..values {
                    let base = i * 4;
                    let v = f32::from_le_bytes([
                        buf[base],
                        buf[base + 1],
                        buf[base + 2],
                        buf[base + 3],
                    ]);
                    out[i] = (v * 127.0).clamp(-128.0, 127.0) as i8 as u8;
                }
                Ok(values - (values % 2))
            }
        }
    }
}

impl TunerDriver for FileDriver {
    fn info(&self) -> DeviceInfo {
        DeviceInfo {
            name: format!("IQ file {}", self.path),
            serial: "00000000".into(),
            tuner: TunerKind::Unknown,
        }
    }

    fn tuner_gains(&self) -> Vec<i32> {
        DEFAULT_GAIN_TABLE.to_vec()
    }

    fn set_center_freq(&mut self, hz: u32) -> Result<(), SdrError> {
        self.freq = hz;
        Ok(())
    }

    fn set_sample_rate(&mut self, hz: u32) -> Result<(), SdrError> {
        self.rate = hz;
        Ok(())
    }

    fn set_tuner_gain(&mut self, tenths_db: i32) -> Result<(), SdrError> {
        self.gain = tenths_db;
        Ok(())
    }

    fn set_agc(&mut self, enable: bool) -> Result<(), SdrError> {
        self.agc = enable;
        Ok(())
    }

    fn set_ppm_correction(&mut self, ppm: i32) -> Result<(), SdrError> {
        self.ppm = ppm;
        Ok(())
    }

    fn set_direct_sampling(&mut self, enable: bool) -> Result<(), SdrError> {
        self.direct = enable;
        Ok(())
    }

    fn reset_buffer(&mut self) -> Result<(), SdrError> {
        Ok(())
    }

    fn read_sync(&mut self, buf: &mut [u8], _timeout: Duration) -> Result<usize, SdrError> {
        let samples = buf.len() / 2;
        let n = self.read_wire(buf, samples)?;
        if n == 0 {
            log::info!("end of file: {}", self.path);
            return Err(SdrError::Timeout);
        }
        // pace playback like a live device
        thread::sleep(Duration::from_secs_f64((n / 2) as f64 / self.rate as f64));
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::path::PathBuf;

    fn temp_file(name: &str, bytes: &[u8]) -> PathBuf {
        let path = std::env::temp_dir().join(format!(
            "iqrx-file-{}-{}",
            std::process::id(),
            name
        ));
        let mut f = File::create(&path).unwrap();
        f.write_all(bytes).unwrap();
        path
    }

    #[test]
    fn ci8_passes_bytes_through() {
        let path = temp_file("ci8", &[0x01, 0xff, 0x7f, 0x80]);
        let mut drv = FileDriver::open(&path, SampleFormat::Ci8).unwrap();
        let mut buf = vec![0u8; 8];
        let n = drv.read_sync(&mut buf, Duration::from_millis(100)).unwrap();
        assert_eq!(n, 4);
        assert_eq!(&buf[..4], &[0x01, 0xff, 0x7f, 0x80]);
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn ci16_narrows_to_high_byte() {
        let mut bytes = Vec::new();
        for v in [0x1234i16, -0x1234, 0x7fff, -0x8000] {
            bytes.extend_from_slice(&v.to_le_bytes());
        }
        let path = temp_file("ci16", &bytes);
        let mut drv = FileDriver::open(&path, SampleFormat::Ci16).unwrap();
        let mut buf = vec![0u8; 8];
        let n = drv.read_sync(&mut buf, Duration::from_millis(100)).unwrap();
        assert_eq!(n, 4);
        assert_eq!(buf[0] as i8, 0x12);
        assert_eq!(buf[1] as i8, -0x13); // arithmetic shift rounds toward -inf
        assert_eq!(buf[2] as i8, 0x7f);
        assert_eq!(buf[3] as i8, -0x80);
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn cf32_scales_and_clamps() {
        let mut bytes = Vec::new();
        for v in [0.5f32, -0.5, 2.0, -2.0] {
            bytes.extend_from_slice(&v.to_le_bytes());
        }
        let path = temp_file("cf32", &bytes);
        let mut drv = FileDriver::open(&path, SampleFormat::Cf32).unwrap();
        let mut buf = vec![0u8; 8];
        let n = drv.read_sync(&mut buf, Duration::from_millis(100)).unwrap();
        assert_eq!(n, 4);
        assert_eq!(buf[0] as i8, 63); // 0.5 * 127
        assert_eq!(buf[1] as i8, -63);
        assert_eq!(buf[2] as i8, 127); // clamped
        assert_eq!(buf[3] as i8, -128);
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn end_of_file_reads_time_out() {
        let path = temp_file("eof", &[0u8; 4]);
        let mut drv = FileDriver::open(&path, SampleFormat::Ci8).unwrap();
        let mut buf = vec![0u8; 8];
        drv.read_sync(&mut buf, Duration::from_millis(100)).unwrap();
        assert!(matches!(
            drv.read_sync(&mut buf, Duration::from_millis(100)),
            Err(SdrError::Timeout)
        ));
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn missing_file_is_device_not_found() {
        assert!(matches!(
            FileDriver::open("/nonexistent/iqrx.bin", SampleFormat::Ci8),
            Err(SdrError::DeviceNotFound)
        ));
    }
}
