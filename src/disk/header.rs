use std::fmt;
use std::io;

use crate::disk::block::{SectorAddress, SectorDevice, SECTOR_SIZE, SYSTEM_INFO_SECTOR};
use crate::disk::directory::FlexDate;
use crate::disk::error::DiskError;
use crate::disk::geometry::{self, FLX_HEADER_SIZE};

pub const FLX_MAGIC_NUMBER: u32 = 0x339A_5C48;
pub const MAX_JVC_HEADER_SIZE: usize = 5;

pub const DISK_NAME_SIZE: usize = 8;
pub const DISK_EXT_SIZE: usize = 3;

/// The 16 byte header in front of every FLX image.  Sector counts are per
/// side.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FlxHeader {
    pub write_protect: u8,
    pub size_code: u8,
    pub sides0: u8,
    pub sectors0: u8,
    pub sides: u8,
    pub sectors: u8,
    /// Track count.  256 tracks are stored as 0.
    pub tracks: u8,
}

impl FlxHeader {
    /// Create a header from total sector counts (both sides) as found on an
    /// image being formatted.
    pub fn new(
        bytes_per_sector: usize,
        tracks: u16,
        sectors0: u16,
        sectors: u16,
        sides0: u8,
        sides: u8,
    ) -> FlxHeader {
        let sides0 = sides0.clamp(1, 2);
        let sides = sides.clamp(1, 2);
        let tracks = tracks.min(256);
        let sectors0 = sectors0.min(255);
        let sectors = sectors.min(255);
        FlxHeader {
            write_protect: 0,
            size_code: geometry::size_code_for(bytes_per_sector),
            sides0,
            sectors0: (sectors0 / sides0 as u16) as u8,
            sides,
            sectors: (sectors / sides as u16) as u8,
            tracks: tracks as u8,
        }
    }

    /// Parse a header, or return None if the magic number does not match.
    pub fn from_bytes(bytes: &[u8]) -> Option<FlxHeader> {
        if bytes.len() < FLX_HEADER_SIZE {
            return None;
        }
        let magic = u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        if magic != FLX_MAGIC_NUMBER {
            return None;
        }
        Some(FlxHeader {
            write_protect: bytes[4],
            size_code: bytes[5],
            sides0: bytes[6],
            sectors0: bytes[7],
            sides: bytes[8],
            sectors: bytes[9],
            tracks: bytes[10],
        })
    }

    pub fn to_bytes(&self) -> [u8; FLX_HEADER_SIZE] {
        let mut bytes = [0u8; FLX_HEADER_SIZE];
        bytes[0..4].copy_from_slice(&FLX_MAGIC_NUMBER.to_be_bytes());
        bytes[4] = self.write_protect;
        bytes[5] = self.size_code;
        bytes[6] = self.sides0;
        bytes[7] = self.sectors0;
        bytes[8] = self.sides;
        bytes[9] = self.sectors;
        bytes[10] = self.tracks;
        bytes
    }

    #[inline]
    pub fn track_count(&self) -> u16 {
        if self.tracks == 0 {
            256
        } else {
            self.tracks as u16
        }
    }

    /// The exact size of an image described by this header.
    pub fn file_size(&self) -> usize {
        let sectors = self.sectors0 as usize * self.sides0 as usize
            + (self.track_count() as usize - 1) * self.sectors as usize * self.sides as usize;
        FLX_HEADER_SIZE + sectors * geometry::bytes_per_sector(self.size_code)
    }

    /// Whether this header together with the SIR track and sector counts
    /// describes a FLEX file system of the given image size.
    pub fn is_flex_compatible(&self, sir_tracks: u16, sir_sectors: u16, file_size: usize) -> bool {
        sir_tracks != 0
            && sir_sectors != 0
            && self.size_code == 1
            && self.track_count() == sir_tracks
            && self.sectors0 != 0
            && self.sectors0 as u16 * self.sides0 as u16 <= sir_sectors
            && self.sectors as u16 * self.sides as u16 == sir_sectors
            && (1..=2).contains(&self.sides0)
            && (1..=2).contains(&self.sides)
            && self.file_size() == file_size
    }
}

/// The optional JVC header of a DSK image: sectors per track, sides, size
/// code, first sector id and sector attribute flag, of which only a prefix
/// may be present.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct JvcHeader(Vec<u8>);

impl JvcHeader {
    /// Validate the header bytes found in front of a DSK image.
    pub fn parse(bytes: &[u8]) -> io::Result<JvcHeader> {
        if bytes.len() > MAX_JVC_HEADER_SIZE {
            return Err(DiskError::NotAFlexImage.into());
        }
        let valid = bytes.iter().enumerate().all(|(index, &value)| match index {
            0 => value >= 5,
            1 => (1..=2).contains(&value),
            2 => value == 1,
            3 => value == 1,
            _ => value == 0,
        });
        if !valid {
            return Err(DiskError::InvalidJvcHeader.into());
        }
        Ok(JvcHeader(bytes.to_vec()))
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn sectors_per_track(&self) -> Option<u16> {
        self.0.first().map(|&s| s as u16)
    }

    pub fn sides(&self) -> u16 {
        self.0.get(1).map(|&s| s as u16).unwrap_or(1)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

/// The System Information Record stored in the System Information Sector.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SystemInfoRecord {
    pub disk_name: [u8; DISK_NAME_SIZE],
    pub disk_ext: [u8; DISK_EXT_SIZE],
    pub disk_number: u16,
    pub fc_start: SectorAddress,
    pub fc_end: SectorAddress,
    pub free: u16,
    pub month: u8,
    pub day: u8,
    pub year: u8,
    /// Highest track number and sectors per track.
    pub last: SectorAddress,
}

const SIR_OFFSET: usize = 16;

impl SystemInfoRecord {
    pub fn from_bytes(sector: &[u8]) -> SystemInfoRecord {
        let sir = &sector[SIR_OFFSET..];
        let mut disk_name = [0u8; DISK_NAME_SIZE];
        disk_name.copy_from_slice(&sir[0..8]);
        let mut disk_ext = [0u8; DISK_EXT_SIZE];
        disk_ext.copy_from_slice(&sir[8..11]);
        SystemInfoRecord {
            disk_name,
            disk_ext,
            disk_number: u16::from_be_bytes([sir[11], sir[12]]),
            fc_start: SectorAddress::from_bytes(&sir[13..15]),
            fc_end: SectorAddress::from_bytes(&sir[15..17]),
            free: u16::from_be_bytes([sir[17], sir[18]]),
            month: sir[19],
            day: sir[20],
            year: sir[21],
            last: SectorAddress::from_bytes(&sir[22..24]),
        }
    }

    /// Render the record into a sector buffer.  Bytes outside of the record
    /// are preserved.
    pub fn write_bytes(&self, sector: &mut [u8]) {
        let sir = &mut sector[SIR_OFFSET..];
        sir[0..8].copy_from_slice(&self.disk_name);
        sir[8..11].copy_from_slice(&self.disk_ext);
        sir[11..13].copy_from_slice(&self.disk_number.to_be_bytes());
        self.fc_start.write_bytes(&mut sir[13..15]);
        self.fc_end.write_bytes(&mut sir[15..17]);
        sir[17..19].copy_from_slice(&self.free.to_be_bytes());
        sir[19] = self.month;
        sir[20] = self.day;
        sir[21] = self.year;
        self.last.write_bytes(&mut sir[22..24]);
    }

    pub fn to_sector(&self) -> Vec<u8> {
        let mut sector = vec![0u8; SECTOR_SIZE];
        self.write_bytes(&mut sector);
        sector
    }

    /// Read the record from the System Information Sector.
    pub fn read(device: &dyn SectorDevice) -> io::Result<SystemInfoRecord> {
        let sector = device.read_sector(SYSTEM_INFO_SECTOR, None)?;
        Ok(SystemInfoRecord::from_bytes(&sector))
    }

    /// Write the record back, keeping whatever else the sector holds.
    pub fn write(&self, device: &mut dyn SectorDevice) -> io::Result<()> {
        let mut sector = device.read_sector(SYSTEM_INFO_SECTOR, None)?;
        self.write_bytes(&mut sector);
        device.write_sector(SYSTEM_INFO_SECTOR, None, &sector)
    }

    /// Number of tracks as recorded in the SIR, or 0 if unset.
    pub fn tracks(&self) -> u16 {
        if self.last.track == 0 {
            0
        } else {
            self.last.track as u16 + 1
        }
    }

    #[inline]
    pub fn sectors(&self) -> u16 {
        self.last.sector as u16
    }

    pub fn date(&self) -> FlexDate {
        FlexDate::new(self.day, self.month, self.year)
    }

    /// The disk name, with `.ext` appended when the extension is printable.
    pub fn name(&self) -> String {
        let name = trimmed(&self.disk_name);
        let ext = trimmed(&self.disk_ext);
        if !ext.is_empty() && ext.bytes().all(|b| (b' '..=b'~').contains(&b)) {
            format!("{}.{}", name, ext)
        } else {
            name
        }
    }
}

impl fmt::Display for SystemInfoRecord {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{} #{} free {} ({}..{}) last {}",
            self.name(),
            self.disk_number,
            self.free,
            self.fc_start,
            self.fc_end,
            self.last
        )
    }
}

/// Interpret a NUL padded byte field as a string.
pub(crate) fn trimmed(bytes: &[u8]) -> String {
    let length = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..length]).into_owned()
}

#[cfg(test)]
mod tests {
    #[allow(unused_imports)]
    use super::*;

    #[test]
    fn test_flx_header_new_and_size() {
        let header = FlxHeader::new(256, 40, 10, 18, 1, 1);
        assert_eq!(header.size_code, 1);
        assert_eq!(header.sectors0, 10);
        assert_eq!(header.sectors, 18);
        assert_eq!(header.file_size(), 16 + (10 + 39 * 18) * 256);
        assert_eq!(header.file_size(), 182_288);

        let parsed = FlxHeader::from_bytes(&header.to_bytes()).unwrap();
        assert_eq!(parsed, header);
    }

    #[test]
    fn test_flx_header_clamps() {
        let header = FlxHeader::new(256, 300, 40, 400, 0, 3);
        assert_eq!(header.sides0, 1);
        assert_eq!(header.sides, 2);
        assert_eq!(header.track_count(), 256);
        assert_eq!(header.sectors0, 40);
        assert_eq!(header.sectors, 127);
    }

    #[test]
    fn test_flx_header_bad_magic() {
        let mut bytes = FlxHeader::new(256, 35, 10, 10, 1, 1).to_bytes();
        bytes[0] = 0;
        assert!(FlxHeader::from_bytes(&bytes).is_none());
        assert!(FlxHeader::from_bytes(&bytes[..8]).is_none());
    }

    #[test]
    fn test_jvc_header_validation() {
        assert!(JvcHeader::parse(&[]).unwrap().is_empty());
        assert_eq!(JvcHeader::parse(&[18]).unwrap().sides(), 1);
        assert_eq!(JvcHeader::parse(&[18, 2, 1, 1, 0]).unwrap().sides(), 2);

        let invalid: &[&[u8]] = &[&[4], &[18, 3], &[18, 0], &[18, 1, 2], &[18, 1, 1, 0], &[18, 1, 1, 1, 1]];
        for bytes in invalid {
            let error = JvcHeader::parse(bytes).unwrap_err();
            assert_eq!(DiskError::from_io_error(&error), Some(DiskError::InvalidJvcHeader));
        }
        assert!(JvcHeader::parse(&[18, 1, 1, 1, 0, 0]).is_err());
    }

    #[test]
    fn test_sir_layout() {
        let mut sector = vec![0u8; SECTOR_SIZE];
        sector[16..21].copy_from_slice(b"SYSTE");
        sector[24..27].copy_from_slice(b"DSK");
        sector[27..29].copy_from_slice(&[0x00, 0x07]);
        sector[29..33].copy_from_slice(&[1, 4, 0x22, 0x0A]);
        sector[33..35].copy_from_slice(&[0x01, 0x51]);
        sector[35..38].copy_from_slice(&[12, 24, 85]);
        sector[38..40].copy_from_slice(&[0x22, 0x0A]);
        let sir = SystemInfoRecord::from_bytes(&sector);
        assert_eq!(sir.name(), "SYSTE.DSK");
        assert_eq!(sir.disk_number, 7);
        assert_eq!(sir.fc_start, SectorAddress::new(1, 4));
        assert_eq!(sir.fc_end, SectorAddress::new(0x22, 0x0A));
        assert_eq!(sir.free, 337);
        assert_eq!(sir.tracks(), 35);
        assert_eq!(sir.sectors(), 10);
        assert_eq!(sir.to_sector(), sector);
    }

    #[test]
    fn test_sir_name_with_unprintable_extension() {
        let mut sir = SystemInfoRecord::default();
        sir.disk_name[..4].copy_from_slice(b"WORK");
        sir.disk_ext = [0x01, 0x02, 0x03];
        assert_eq!(sir.name(), "WORK");
    }
}
