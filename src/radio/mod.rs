//! # Radio Transport Module
//!
//! Handles the serial connection to the LoRa modem that carries the gateway link.
//!
//! This module handles:
//! - Opening the modem's serial port
//! - Wrapping radio frames for the host link as `[len][frame][crc8]`
//! - Non-blocking reception with resynchronisation on corrupted input
//! - Dropping frames whose checksum fails, so the link layer only sees intact frames

pub mod crc;
pub mod port_trait;

pub use port_trait::RadioTransport;

use crate::error::{NodeError, Result};
use crate::link::protocol::MAX_FRAME_SIZE;
use async_trait::async_trait;
use bytes::{Buf, BytesMut};
use crc::crc8;
use std::io;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_serial::SerialPortBuilderExt;
use tracing::{debug, info, warn};

/// Default modem baud rate
pub const MODEM_BAUD_RATE: u32 = 115_200;

/// Default modem device paths to try (in order of preference)
pub const DEFAULT_DEVICE_PATHS: &[&str] = &[
    "/dev/ttyUSB0", // USB-to-serial bridge on most LoRa boards
    "/dev/ttyACM0", // native USB CDC
];

/// Read chunk reserved before each poll of the port
const READ_CHUNK: usize = 256;

/// Wrap a radio frame for the host link
///
/// # Errors
///
/// Returns `InvalidInput` if the frame is empty or longer than
/// [`MAX_FRAME_SIZE`], since the length byte could not describe it
///
/// # Examples
///
/// ```
/// use irradiance_node::radio::encode_host_frame;
///
/// let wrapped = encode_host_frame(&[22, 30, 1, 0, b'o', b'k']).unwrap();
/// assert_eq!(wrapped[0], 6);
/// assert_eq!(wrapped.len(), 8);
///
/// assert!(encode_host_frame(&[7; 256]).is_err());
/// ```
pub fn encode_host_frame(frame: &[u8]) -> io::Result<Vec<u8>> {
    let len = match u8::try_from(frame.len()) {
        Ok(len) if len > 0 && usize::from(len) <= MAX_FRAME_SIZE => len,
        _ => {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("Radio frame of {} bytes does not fit 1..={}", frame.len(), MAX_FRAME_SIZE),
            ))
        }
    };

    let mut wrapped = Vec::with_capacity(frame.len() + 2);
    wrapped.push(len);
    wrapped.extend_from_slice(frame);
    wrapped.push(crc8(&wrapped));
    Ok(wrapped)
}

/// Pull the next intact radio frame out of the receive buffer
///
/// Bytes that cannot start a valid frame are skipped one at a time until the
/// stream lines up again. Returns `None` when more input is needed.
pub fn extract_host_frame(buf: &mut BytesMut) -> Option<Vec<u8>> {
    loop {
        let len = *buf.first()? as usize;

        if len == 0 {
            buf.advance(1);
            continue;
        }

        if buf.len() < len + 2 {
            return None;
        }

        if crc8(&buf[..len + 1]) != buf[len + 1] {
            debug!("Dropping byte 0x{:02X}: host frame checksum mismatch", buf[0]);
            buf.advance(1);
            continue;
        }

        buf.advance(1);
        let frame = buf.split_to(len).to_vec();
        buf.advance(1);
        return Some(frame);
    }
}

/// LoRa modem attached over a serial port
pub struct SerialModem {
    /// Serial port handle
    port: tokio_serial::SerialStream,
    /// Device path (e.g., /dev/ttyUSB0)
    device_path: String,
    /// Bytes received but not yet framed
    rx: BytesMut,
}

impl std::fmt::Debug for SerialModem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialModem")
            .field("device_path", &self.device_path)
            .field("buffered", &self.rx.len())
            .finish_non_exhaustive()
    }
}

impl SerialModem {
    /// Open the modem at the first path that works
    ///
    /// # Arguments
    ///
    /// * `paths` - Device paths to try (e.g., &["/dev/ttyUSB0"])
    /// * `baud_rate` - Serial speed of the modem host link
    ///
    /// # Errors
    ///
    /// Returns `RadioPortNotFound` if no path could be opened
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use irradiance_node::radio::{SerialModem, DEFAULT_DEVICE_PATHS, MODEM_BAUD_RATE};
    ///
    /// let modem = SerialModem::open_with_paths(DEFAULT_DEVICE_PATHS, MODEM_BAUD_RATE)?;
    /// println!("Modem at {}", modem.device_path());
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn open_with_paths(paths: &[&str], baud_rate: u32) -> Result<Self> {
        for path in paths {
            debug!("Trying to open radio modem: {}", path);

            match Self::open_port(path, baud_rate) {
                Ok(port) => {
                    info!("Opened radio modem at {} ({} baud)", path, baud_rate);
                    return Ok(Self {
                        port,
                        device_path: path.to_string(),
                        rx: BytesMut::with_capacity(READ_CHUNK),
                    });
                }
                Err(e) => {
                    warn!("Failed to open {}: {}", path, e);
                    continue;
                }
            }
        }

        Err(NodeError::RadioPortNotFound(paths.join(", ")))
    }

    /// Open a specific serial port as 8N1 without flow control
    fn open_port(path: &str, baud_rate: u32) -> Result<tokio_serial::SerialStream> {
        tokio_serial::new(path, baud_rate)
            .data_bits(tokio_serial::DataBits::Eight)
            .parity(tokio_serial::Parity::None)
            .stop_bits(tokio_serial::StopBits::One)
            .flow_control(tokio_serial::FlowControl::None)
            .open_native_async()
            .map_err(|e| NodeError::Serial(format!("Failed to open {}: {}", path, e)))
    }

    /// Get the device path of the opened serial port
    pub fn device_path(&self) -> &str {
        &self.device_path
    }
}

#[async_trait]
impl RadioTransport for SerialModem {
    async fn send_bytes(&mut self, frame: &[u8]) -> io::Result<()> {
        let wrapped = encode_host_frame(frame)?;
        self.port.write_all(&wrapped).await?;
        self.port.flush().await?;
        debug!("Sent radio frame ({} bytes)", frame.len());
        Ok(())
    }

    async fn try_receive_bytes(&mut self) -> io::Result<Option<Vec<u8>>> {
        if let Some(frame) = extract_host_frame(&mut self.rx) {
            return Ok(Some(frame));
        }

        self.rx.reserve(READ_CHUNK);
        // A zero timeout polls the read exactly once
        match tokio::time::timeout(Duration::ZERO, self.port.read_buf(&mut self.rx)).await {
            Ok(Ok(_)) => Ok(extract_host_frame(&mut self.rx)),
            Ok(Err(e)) => Err(e),
            Err(_) => Ok(None),
        }
    }
}
