//! Device registry: maps filesystem numbers to registered block devices.

use crate::error::{FsError, Result};
use crate::node::{Inode, NODE_SIZE};
use blockdev::{BlockDevice, BLOCK_SIZE};
use log::debug;

/// Upper bound on simultaneously registered devices.
pub const MAX_DISKS: usize = 10;

struct DiskSlot<D> {
    fs_nr: u8,
    dev: D,
}

/// Fixed-capacity table of registered devices. A device's filesystem number
/// is read from its own metadata inode at registration time; all higher
/// layers route block I/O through [`DeviceRegistry::resolve`].
pub(crate) struct DeviceRegistry<D> {
    disks: Vec<Option<DiskSlot<D>>>,
}

impl<D: BlockDevice> DeviceRegistry<D> {
    pub(crate) fn new() -> Self {
        let mut disks = Vec::with_capacity(MAX_DISKS);
        for _ in 0..MAX_DISKS {
            disks.push(None);
        }
        Self { disks }
    }

    /// Registers a device, learning its filesystem number from the metadata
    /// inode in block 0. Returns the slot index the device landed in.
    pub(crate) fn register(&mut self, mut dev: D) -> Result<usize> {
        let slot = self
            .disks
            .iter()
            .position(|d| d.is_none())
            .ok_or(FsError::RegistryFull)?;

        let mut buf = [0u8; BLOCK_SIZE];
        dev.read_block(0, &mut buf)?;
        let meta = Inode::parse(&buf[..NODE_SIZE]);
        let fs_nr = meta.id.dev;
        if fs_nr == 0 {
            return Err(FsError::ReservedDeviceNr);
        }
        if self.disks.iter().flatten().any(|d| d.fs_nr == fs_nr) {
            return Err(FsError::DeviceExists(fs_nr));
        }

        debug!("registered device fs_nr={} in slot {}", fs_nr, slot);
        self.disks[slot] = Some(DiskSlot { fs_nr, dev });
        Ok(slot)
    }

    pub(crate) fn resolve(&mut self, fs_nr: u8) -> Result<&mut D> {
        self.disks
            .iter_mut()
            .flatten()
            .find(|d| d.fs_nr == fs_nr)
            .map(|d| &mut d.dev)
            .ok_or(FsError::DeviceNotFound(fs_nr))
    }

    /// Filesystem number of the earliest-registered device still present,
    /// used for the default-device root redirect.
    pub(crate) fn first(&self) -> Option<u8> {
        self.disks.iter().flatten().map(|d| d.fs_nr).next()
    }
}
