//! Buffer management for vertex, index, uniform and indirect data
//!
//! Memory management following RAII patterns with proper allocation and cleanup

use ash::{vk, Device};
use std::marker::PhantomData;
use crate::assets::MeshData;
use crate::assets::mesh_loader::{MeshDimensions, MeshPart};
use crate::render::vulkan::commands::CommandPool;
use crate::render::vulkan::context::{VulkanContext, VulkanError, VulkanResult};

/// Buffer wrapper with memory management
pub struct Buffer {
    device: Device,
    buffer: vk::Buffer,
    memory: vk::DeviceMemory,
    size: vk::DeviceSize,
}

impl Buffer {
    /// Create a new buffer with memory allocation
    pub fn new(
        context: &VulkanContext,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        properties: vk::MemoryPropertyFlags,
    ) -> VulkanResult<Self> {
        let device = context.raw_device();
        let buffer_info = vk::BufferCreateInfo::builder()
            .size(size)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let buffer = unsafe { device.create_buffer(&buffer_info, None).map_err(VulkanError::Api)? };

        let mem_requirements = unsafe { device.get_buffer_memory_requirements(buffer) };
        let memory_type_index = match context
            .physical_device()
            .find_memory_type(mem_requirements.memory_type_bits, properties)
        {
            Ok(index) => index,
            Err(e) => {
                unsafe { device.destroy_buffer(buffer, None) };
                return Err(e);
            }
        };

        let alloc_info = vk::MemoryAllocateInfo::builder()
            .allocation_size(mem_requirements.size)
            .memory_type_index(memory_type_index);

        let memory = unsafe { device.allocate_memory(&alloc_info, None).map_err(VulkanError::Api)? };
        unsafe {
            device
                .bind_buffer_memory(buffer, memory, 0)
                .map_err(VulkanError::Api)?;
        }

        Ok(Self {
            device,
            buffer,
            memory,
            size,
        })
    }

    /// Host-visible, coherent buffer filled with `data`
    pub fn host_visible_with_data(
        context: &VulkanContext,
        usage: vk::BufferUsageFlags,
        data: &[u8],
    ) -> VulkanResult<Self> {
        let buffer = Self::new(
            context,
            data.len().max(1) as vk::DeviceSize,
            usage,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        )?;
        buffer.write_bytes(0, data)?;
        Ok(buffer)
    }

    /// Device-local buffer filled with `data` through a staging copy
    pub fn device_local_with_data(
        context: &VulkanContext,
        pool: &CommandPool,
        usage: vk::BufferUsageFlags,
        data: &[u8],
    ) -> VulkanResult<Self> {
        let staging = Self::host_visible_with_data(context, vk::BufferUsageFlags::TRANSFER_SRC, data)?;
        let buffer = Self::new(
            context,
            staging.size,
            usage | vk::BufferUsageFlags::TRANSFER_DST,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
        )?;

        pool.submit_one_time(context.graphics_queue(), |device, cmd| {
            let region = vk::BufferCopy {
                src_offset: 0,
                dst_offset: 0,
                size: staging.size,
            };
            unsafe { device.cmd_copy_buffer(cmd, staging.buffer, buffer.buffer, &[region]) };
        })?;

        Ok(buffer)
    }

    /// Write `data` at `offset` through a temporary mapping
    pub fn write_bytes(&self, offset: vk::DeviceSize, data: &[u8]) -> VulkanResult<()> {
        if offset + data.len() as vk::DeviceSize > self.size {
            return Err(VulkanError::InvalidOperation {
                reason: format!(
                    "write of {} bytes at {} overflows buffer of {} bytes",
                    data.len(),
                    offset,
                    self.size
                ),
            });
        }
        if data.is_empty() {
            return Ok(());
        }

        unsafe {
            let ptr = self
                .device
                .map_memory(self.memory, offset, data.len() as vk::DeviceSize, vk::MemoryMapFlags::empty())
                .map_err(VulkanError::Api)?;
            std::ptr::copy_nonoverlapping(data.as_ptr(), ptr.cast::<u8>(), data.len());
            self.device.unmap_memory(self.memory);
        }
        Ok(())
    }

    /// Write a slice of plain-old-data values at offset 0
    pub fn write_data<T: bytemuck::Pod>(&self, data: &[T]) -> VulkanResult<()> {
        self.write_bytes(0, bytemuck::cast_slice(data))
    }

    /// Release ownership of the raw handles without destroying them
    ///
    /// Used to hand a buffer still referenced by in-flight work to the
    /// recycler.
    pub fn into_raw(self) -> (vk::Buffer, vk::DeviceMemory) {
        let this = std::mem::ManuallyDrop::new(self);
        (this.buffer, this.memory)
    }

    /// Get buffer handle
    pub fn handle(&self) -> vk::Buffer {
        self.buffer
    }

    /// Get size
    pub fn size(&self) -> vk::DeviceSize {
        self.size
    }

    /// Descriptor covering the whole buffer
    pub fn descriptor(&self) -> vk::DescriptorBufferInfo {
        vk::DescriptorBufferInfo {
            buffer: self.buffer,
            offset: 0,
            range: self.size,
        }
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_buffer(self.buffer, None);
            self.device.free_memory(self.memory, None);
        }
    }
}

/// Uniform buffer for one shader-visible value
pub struct UniformBuffer<T> {
    buffer: Buffer,
    _phantom: PhantomData<T>,
}

impl<T: bytemuck::Pod> UniformBuffer<T> {
    /// Create a host-visible uniform buffer holding `initial`
    ///
    /// The buffer is also a transfer destination so it can be updated through
    /// queued frame transfers.
    pub fn new(context: &VulkanContext, initial: &T) -> VulkanResult<Self> {
        let buffer = Buffer::new(
            context,
            std::mem::size_of::<T>() as vk::DeviceSize,
            vk::BufferUsageFlags::UNIFORM_BUFFER | vk::BufferUsageFlags::TRANSFER_DST,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        )?;
        buffer.write_data(std::slice::from_ref(initial))?;

        Ok(Self {
            buffer,
            _phantom: PhantomData,
        })
    }

    /// Overwrite the value through the host mapping
    pub fn update(&self, data: &T) -> VulkanResult<()> {
        self.buffer.write_data(std::slice::from_ref(data))
    }

    /// Get buffer handle
    pub fn handle(&self) -> vk::Buffer {
        self.buffer.handle()
    }

    /// Descriptor for binding
    pub fn descriptor(&self) -> vk::DescriptorBufferInfo {
        self.buffer.descriptor()
    }
}

/// Vertex and index buffers of a loaded mesh
pub struct MeshBuffer {
    /// Interleaved vertex data
    pub vertices: Buffer,
    /// 32-bit indices
    pub indices: Buffer,
    /// Total index count
    pub index_count: u32,
    /// Index ranges per part of the source file
    pub parts: Vec<MeshPart>,
    /// Bounds of the loaded geometry
    pub dimensions: MeshDimensions,
}

impl MeshBuffer {
    /// Upload mesh data into device-local memory
    pub fn upload(context: &VulkanContext, pool: &CommandPool, mesh: &MeshData) -> VulkanResult<Self> {
        let vertices = Buffer::device_local_with_data(
            context,
            pool,
            vk::BufferUsageFlags::VERTEX_BUFFER,
            bytemuck::cast_slice(&mesh.vertices),
        )?;
        let indices = Buffer::device_local_with_data(
            context,
            pool,
            vk::BufferUsageFlags::INDEX_BUFFER,
            bytemuck::cast_slice(&mesh.indices),
        )?;

        Ok(Self {
            vertices,
            indices,
            index_count: mesh.indices.len() as u32,
            parts: mesh.parts.clone(),
            dimensions: mesh.dimensions,
        })
    }
}
