use std::cell::RefCell;
use std::fmt;
use std::io::{self, Write};
use std::rc::Rc;

use crate::disk::geometry::Geometry;
use crate::util;

/// The only sector size a FLEX file system uses.
pub const SECTOR_SIZE: usize = 256;

/// Bytes at the start of every linked sector: next track, next sector and
/// a big endian record number.
pub const LINK_SIZE: usize = 4;

/// Payload bytes of a linked sector.
pub const DATA_BYTES_PER_SECTOR: usize = SECTOR_SIZE - LINK_SIZE;

/// Boot sectors, system information sector and an unused sector precede
/// the first directory sector on track 0.
pub const FIRST_DIRECTORY_SECTOR: SectorAddress = SectorAddress::new(0, 5);
pub const SYSTEM_INFO_SECTOR: SectorAddress = SectorAddress::new(0, 3);

pub type SectorDeviceRef = Rc<RefCell<dyn SectorDevice>>;

/// Sector oriented access to a FLEX disk.  The metadata layer and the file
/// system checker only ever go through this contract.
pub trait SectorDevice {
    fn geometry(&self) -> &Geometry;
    fn is_write_protected(&self) -> bool;
    fn is_flex_format(&self) -> bool;
    fn is_track_valid(&self, track: u8) -> bool;
    fn is_sector_valid(&self, address: SectorAddress) -> bool;
    fn bytes_per_sector(&self) -> usize;

    /// Read one sector.  `side` is only needed to address non-FLEX
    /// double sided media while it is being formatted.
    fn read_sector(&self, address: SectorAddress, side: Option<u8>) -> io::Result<Vec<u8>>;

    fn write_sector(
        &mut self,
        address: SectorAddress,
        side: Option<u8>,
        data: &[u8],
    ) -> io::Result<()>;

    /// Format a single sector of an unformatted container, growing its
    /// geometry as needed.
    fn format_sector(
        &mut self,
        data: &[u8],
        track: u8,
        sector: u8,
        side: u8,
        size_code: u8,
    ) -> io::Result<()>;

    fn flush(&mut self) -> io::Result<()>;

    fn dump(&self, writer: &mut dyn Write) -> io::Result<()> {
        for address in AddressIterator::from_geometry(self.geometry()) {
            if !self.is_sector_valid(address) {
                continue;
            }
            writeln!(writer)?;
            writeln!(writer, "sector {}", address)?;
            let sector = self.read_sector(address, None)?;
            writeln!(writer, "{}", util::hex(&sector))?;
        }
        Ok(())
    }
}

#[derive(PartialEq, Eq, Hash, Clone, Copy, Debug, PartialOrd, Ord, Default)]
pub struct SectorAddress {
    pub track: u8,
    pub sector: u8,
}

impl SectorAddress {
    pub const NULL: SectorAddress = SectorAddress::new(0, 0);

    #[inline]
    pub const fn new(track: u8, sector: u8) -> SectorAddress {
        SectorAddress { track, sector }
    }

    #[inline]
    pub fn is_null(&self) -> bool {
        self.track == 0 && self.sector == 0
    }

    pub fn from_bytes(bytes: &[u8]) -> SectorAddress {
        assert!(bytes.len() >= 2);
        SectorAddress::new(bytes[0], bytes[1])
    }

    pub fn write_bytes(&self, bytes: &mut [u8]) {
        assert!(bytes.len() >= 2);
        bytes[0] = self.track;
        bytes[1] = self.sector;
    }

    /// The sector following this one when walking a disk linearly.
    pub fn successor(&self, sectors_per_track: u8) -> SectorAddress {
        if self.sector >= sectors_per_track {
            SectorAddress::new(self.track.wrapping_add(1), 1)
        } else {
            SectorAddress::new(self.track, self.sector + 1)
        }
    }

    pub fn format_addresses(addresses: &[SectorAddress]) -> String {
        addresses
            .iter()
            .map(|a| a.to_string())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl fmt::Display for SectorAddress {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:02X}-{:02X}", self.track, self.sector)
    }
}

/// Iterate all track and sector addresses of a geometry, track 0 included.
pub struct AddressIterator {
    max_track: u8,
    sectors: u8,
    next: Option<SectorAddress>,
}

impl AddressIterator {
    pub fn from_geometry(geometry: &Geometry) -> AddressIterator {
        AddressIterator::new(geometry.tracks, geometry.sectors as u16)
    }

    pub fn new(tracks: u16, sectors: u16) -> AddressIterator {
        let next = if tracks == 0 || sectors == 0 {
            None
        } else {
            Some(SectorAddress::new(0, 1))
        };
        AddressIterator {
            max_track: tracks.min(256).saturating_sub(1) as u8,
            sectors: sectors.min(255) as u8,
            next,
        }
    }
}

impl Iterator for AddressIterator {
    type Item = SectorAddress;

    fn next(&mut self) -> Option<SectorAddress> {
        let address = self.next?;
        self.next = if address.sector < self.sectors {
            Some(SectorAddress::new(address.track, address.sector + 1))
        } else if address.track < self.max_track {
            Some(SectorAddress::new(address.track + 1, 1))
        } else {
            None
        };
        Some(address)
    }
}
