//! In-memory device with crash injection
//!
//! Tests arm a write budget with `crash_after`. The write that crosses the
//! budget lands only partially (a torn write) and every later write fails
//! with `StoreError::Crashed`. The surviving bytes are then reopened with
//! `from_bytes` to run recovery.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{Result, StoreError};

use super::Storage;

#[derive(Debug)]
struct Device {
    bytes: Vec<u8>,
    /// Bytes that may still be written before the crash
    budget: Option<u64>,
    crashed: bool,
    bytes_written: u64,
}

/// A shared in-memory device
#[derive(Debug, Clone)]
pub struct MemoryStorage {
    device: Arc<Mutex<Device>>,
}

impl MemoryStorage {
    /// A zero-filled device of `size` bytes
    pub fn new(size: u64) -> Self {
        Self::from_bytes(vec![0; size as usize])
    }

    /// A device holding a copy of earlier device contents
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self {
            device: Arc::new(Mutex::new(Device {
                bytes,
                budget: None,
                crashed: false,
                bytes_written: 0,
            })),
        }
    }

    /// Snapshot of the current contents
    pub fn bytes(&self) -> Vec<u8> {
        self.device.lock().bytes.clone()
    }

    /// Crash once `budget` more bytes have been written
    pub fn crash_after(&self, budget: u64) {
        self.device.lock().budget = Some(budget);
    }

    pub fn is_crashed(&self) -> bool {
        self.device.lock().crashed
    }

    /// Total bytes written through any handle
    pub fn bytes_written(&self) -> u64 {
        self.device.lock().bytes_written
    }

    /// Overwrite bytes without going through the crash budget
    pub fn corrupt(&self, offset: u64, data: &[u8]) {
        let mut device = self.device.lock();
        let start = offset as usize;
        device.bytes[start..start + data.len()].copy_from_slice(data);
    }
}

impl Storage for MemoryStorage {
    fn read(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        let device = self.device.lock();
        let start = offset as usize;
        let end = start + buf.len();
        if end > device.bytes.len() {
            return Err(StoreError::Corruption(format!(
                "read [{}, {}) past device end {}",
                start,
                end,
                device.bytes.len()
            )));
        }
        buf.copy_from_slice(&device.bytes[start..end]);
        Ok(())
    }

    fn write(&self, offset: u64, data: &[u8]) -> Result<()> {
        let mut device = self.device.lock();
        if device.crashed {
            return Err(StoreError::Crashed);
        }
        let start = offset as usize;
        let end = start + data.len();
        if end > device.bytes.len() {
            return Err(StoreError::Corruption(format!(
                "write [{}, {}) past device end {}",
                start,
                end,
                device.bytes.len()
            )));
        }

        let landed = match device.budget {
            Some(budget) if (data.len() as u64) > budget => budget as usize,
            _ => data.len(),
        };
        device.bytes[start..start + landed].copy_from_slice(&data[..landed]);
        device.bytes_written += landed as u64;
        if let Some(budget) = device.budget.as_mut() {
            *budget -= landed as u64;
        }

        if landed < data.len() {
            device.crashed = true;
            return Err(StoreError::Crashed);
        }
        Ok(())
    }

    fn sync(&self) -> Result<()> {
        if self.device.lock().crashed {
            return Err(StoreError::Crashed);
        }
        Ok(())
    }

    fn size(&self) -> u64 {
        self.device.lock().bytes.len() as u64
    }
}
