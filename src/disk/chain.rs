use std::collections::HashSet;
use std::io;

use crate::disk::block::{SectorAddress, SectorDevice, SectorDeviceRef, LINK_SIZE};
use crate::disk::error::DiskError;

/// The link header found at the start of every allocated sector.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SectorLink {
    pub next: SectorAddress,
    pub record_nr: u16,
}

impl SectorLink {
    #[inline]
    pub fn new(next: SectorAddress, record_nr: u16) -> SectorLink {
        SectorLink { next, record_nr }
    }

    #[inline]
    pub fn from_bytes(sector: &[u8]) -> SectorLink {
        assert!(sector.len() >= LINK_SIZE);
        SectorLink {
            next: SectorAddress::from_bytes(sector),
            record_nr: u16::from_be_bytes([sector[2], sector[3]]),
        }
    }

    #[inline]
    pub fn write_bytes(&self, sector: &mut [u8]) {
        assert!(sector.len() >= LINK_SIZE);
        self.next.write_bytes(sector);
        sector[2..4].copy_from_slice(&self.record_nr.to_be_bytes());
    }
}

/// A ChainSector is the result of a chain iteration, and provides the sector
/// contents and the address from which it was read.
pub struct ChainSector {
    /// The 256 byte sector contents, link header included.
    pub data: Vec<u8>,
    pub address: SectorAddress,
}

impl ChainSector {
    #[inline]
    pub fn link(&self) -> SectorLink {
        SectorLink::from_bytes(&self.data)
    }

    /// The payload following the link header.
    #[inline]
    pub fn payload(&self) -> &[u8] {
        &self.data[LINK_SIZE..]
    }
}

/// Walks a sector chain until a null link.  Revisiting a sector ends the walk
/// with `ChainLoop`.
pub struct ChainIterator {
    device: SectorDeviceRef,
    next_sector: Option<SectorAddress>,
    visited_sectors: HashSet<SectorAddress>,
}

impl ChainIterator {
    /// Create a new chain iterator starting at the specified address.  A
    /// null start yields an empty chain.
    pub fn new(device: SectorDeviceRef, start: SectorAddress) -> ChainIterator {
        ChainIterator {
            device,
            next_sector: if start.is_null() { None } else { Some(start) },
            visited_sectors: HashSet::new(),
        }
    }

    /// Read the entire chain and return a list of addresses.
    pub fn addresses(self) -> io::Result<Vec<SectorAddress>> {
        self.map(|r| r.map(|cs| cs.address)).collect()
    }
}

impl Iterator for ChainIterator {
    type Item = io::Result<ChainSector>;

    fn next(&mut self) -> Option<io::Result<ChainSector>> {
        let address = self.next_sector.take()?;

        if !self.visited_sectors.insert(address) {
            return Some(Err(DiskError::ChainLoop(address).into()));
        }

        let data = match self.device.borrow().read_sector(address, None) {
            Ok(data) => data,
            Err(e) => return Some(Err(e)),
        };
        let link = SectorLink::from_bytes(&data);
        if !link.next.is_null() {
            self.next_sector = Some(link.next);
        }
        Some(Ok(ChainSector { data, address }))
    }
}

#[cfg(test)]
mod tests {
    #[allow(unused_imports)]
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    use crate::disk::block::{SectorDevice, SECTOR_SIZE};
    use crate::disk::container::ImageContainer;
    use crate::disk::{DiskOptions, DiskType, FormatOptions};

    fn device() -> SectorDeviceRef {
        let options = DiskOptions {
            writable: true,
            ..DiskOptions::default()
        };
        let container = ImageContainer::create_memory(
            "chain",
            35,
            10,
            DiskType::Dsk,
            &FormatOptions::default(),
            &options,
        )
        .unwrap();
        Rc::new(RefCell::new(container))
    }

    fn write_link(device: &SectorDeviceRef, address: SectorAddress, next: SectorAddress, fill: u8) {
        let mut sector = vec![fill; SECTOR_SIZE];
        SectorLink::new(next, 1).write_bytes(&mut sector);
        device
            .borrow_mut()
            .write_sector(address, None, &sector)
            .unwrap();
    }

    #[test]
    fn test_sector_link() {
        let mut sector = vec![0u8; SECTOR_SIZE];
        SectorLink::new(SectorAddress::new(2, 7), 0x0102).write_bytes(&mut sector);
        assert_eq!(&sector[..4], &[2, 7, 1, 2]);
        assert_eq!(
            SectorLink::from_bytes(&sector),
            SectorLink::new(SectorAddress::new(2, 7), 0x0102)
        );
    }

    #[test]
    fn test_directory_chain() {
        let addresses = ChainIterator::new(device(), SectorAddress::new(0, 5))
            .addresses()
            .unwrap();
        assert_eq!(addresses.len(), 6);
        assert_eq!(addresses[5], SectorAddress::new(0, 10));
        assert!(ChainIterator::new(device(), SectorAddress::NULL)
            .next()
            .is_none());
    }

    #[test]
    fn test_chain_loop() {
        let device = device();
        write_link(&device, SectorAddress::new(1, 1), SectorAddress::new(1, 2), 0);
        write_link(&device, SectorAddress::new(1, 2), SectorAddress::new(1, 1), 0);
        let error = ChainIterator::new(device, SectorAddress::new(1, 1))
            .addresses()
            .unwrap_err();
        assert!(error == DiskError::ChainLoop(SectorAddress::new(1, 1)));
    }
}
