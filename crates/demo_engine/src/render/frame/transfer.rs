//! Small buffer updates queued by scene code and flushed after the next draw

use ash::vk;
use crate::render::vulkan::{VulkanError, VulkanResult};

/// Largest payload a single inline buffer update may carry
pub const MAX_INLINE_UPDATE: usize = 65536;

/// A queued write of `data` into `buffer` at `offset`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingTransfer {
    /// Destination buffer
    pub buffer: vk::Buffer,
    /// Byte offset into the destination
    pub offset: vk::DeviceSize,
    /// Bytes to write
    pub data: Vec<u8>,
}

impl PendingTransfer {
    /// Payload size in bytes
    pub fn size(&self) -> vk::DeviceSize {
        self.data.len() as vk::DeviceSize
    }
}

/// Transfers waiting for the next `draw_current`
#[derive(Debug, Default)]
pub struct TransferQueue {
    pending: Vec<PendingTransfer>,
}

impl TransferQueue {
    /// Create an empty queue
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a write of raw bytes
    ///
    /// Inline updates must be 4-byte aligned, a multiple of 4 bytes long and at
    /// most [`MAX_INLINE_UPDATE`] bytes.
    pub fn queue_bytes(
        &mut self,
        buffer: vk::Buffer,
        offset: vk::DeviceSize,
        data: Vec<u8>,
    ) -> VulkanResult<()> {
        if data.is_empty() || data.len() > MAX_INLINE_UPDATE || data.len() % 4 != 0 {
            return Err(VulkanError::InvalidOperation {
                reason: format!("inline buffer update of {} bytes", data.len()),
            });
        }
        if offset % 4 != 0 {
            return Err(VulkanError::InvalidOperation {
                reason: format!("inline buffer update at unaligned offset {}", offset),
            });
        }
        self.pending.push(PendingTransfer { buffer, offset, data });
        Ok(())
    }

    /// Queue a write of a plain-old-data value
    pub fn queue_value<T: bytemuck::Pod>(
        &mut self,
        buffer: vk::Buffer,
        offset: vk::DeviceSize,
        value: &T,
    ) -> VulkanResult<()> {
        self.queue_bytes(buffer, offset, bytemuck::bytes_of(value).to_vec())
    }

    /// Whether anything is queued
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Number of queued transfers
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Queued transfers in submission order
    pub fn iter(&self) -> impl Iterator<Item = &PendingTransfer> {
        self.pending.iter()
    }

    /// Drop everything queued
    pub fn clear(&mut self) {
        self.pending.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::Handle;

    #[test]
    fn test_queue_value_records_bytes() {
        let mut queue = TransferQueue::new();
        let buffer = vk::Buffer::from_raw(3);
        queue.queue_value(buffer, 128, &1.5f32).unwrap();

        let transfer = queue.iter().next().unwrap();
        assert_eq!(transfer.buffer, buffer);
        assert_eq!(transfer.offset, 128);
        assert_eq!(transfer.size(), 4);
        assert_eq!(transfer.data, 1.5f32.to_ne_bytes().to_vec());
    }

    #[test]
    fn test_rejects_invalid_updates() {
        let mut queue = TransferQueue::new();
        let buffer = vk::Buffer::from_raw(3);

        assert!(queue.queue_bytes(buffer, 0, vec![0; 3]).is_err());
        assert!(queue.queue_bytes(buffer, 2, vec![0; 4]).is_err());
        assert!(queue.queue_bytes(buffer, 0, vec![0; MAX_INLINE_UPDATE + 4]).is_err());
        assert!(queue.queue_bytes(buffer, 0, Vec::new()).is_err());
        assert!(queue.is_empty());

        queue.queue_bytes(buffer, 0, vec![0; MAX_INLINE_UPDATE]).unwrap();
        assert_eq!(queue.len(), 1);
    }
}
