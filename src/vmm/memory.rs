use vm_memory::{Bytes, GuestAddress, GuestMemory, GuestMemoryMmap};

use crate::config::VmConfig;
use crate::error::{Result, VmmError};


/// The single guest-physical region holding the flat image.
pub struct GuestMem {
    pub mem: GuestMemoryMmap,
    base: GuestAddress,
    size: usize,
}


impl GuestMem {
    pub fn create(config: &VmConfig) -> Result<Self> {
        let base = GuestAddress(config.guest_base);
        let mem: GuestMemoryMmap = GuestMemoryMmap::from_ranges(&[(base, config.memory_size)])
            .map_err(|_| VmmError::GuestMemoryCreate {
                base: config.guest_base,
                size: config.memory_size,
            })?;
        Ok(Self { mem, base, size: config.memory_size })
    }

    pub fn base(&self) -> GuestAddress {
        self.base
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Copies `image` verbatim to the start of the region. Images larger than
    /// the region are rejected whole.
    pub fn load_image(&self, image: &[u8]) -> Result<()> {
        if image.len() > self.size {
            return Err(VmmError::ImageTooLarge { len: image.len(), capacity: self.size });
        }
        self.mem
            .write_slice(image, self.base)
            .map_err(VmmError::GuestMemoryAccess)
    }

    /// Reads `buf.len()` bytes starting `offset` bytes into the region.
    pub fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        self.mem
            .read_slice(buf, GuestAddress(self.base.0 + offset))
            .map_err(VmmError::GuestMemoryAccess)
    }

    /// Host virtual address backing the start of the region.
    pub fn host_address(&self) -> Result<u64> {
        let ptr = self
            .mem
            .get_host_address(self.base)
            .map_err(VmmError::GuestMemoryAccess)?;
        Ok(ptr as u64)
    }
}
