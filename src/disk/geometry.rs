//! Track and sector layout of a FLEX disk image and the rules used to infer
//! it.

use std::fmt;
use std::io;

use crate::disk::block::{SectorAddress, SECTOR_SIZE};
use crate::disk::error::DiskError;

/// The storage layout behind a container.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ContainerFormat {
    /// A raw `*.dsk` (or `*.wta`) image.
    Dsk,
    /// A `*.dsk` image prefixed by a JVC header.
    DskJvc,
    /// A `*.flx` image with its 16 byte header.
    Flx,
    /// A host directory emulating a FLEX disk.
    Directory,
}

impl fmt::Display for ContainerFormat {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match self {
            ContainerFormat::Dsk => "DSK",
            ContainerFormat::DskJvc => "DSK (JVC)",
            ContainerFormat::Flx => "FLX",
            ContainerFormat::Directory => "directory",
        })
    }
}

/// A `Geometry` specifies the track and sector layout of a container.
/// Sector counts include both sides.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Geometry {
    /// Number of tracks, i.e. the highest track number plus one.
    pub tracks: u16,
    /// Sectors per track on tracks other than 0.
    pub sectors: u16,
    /// Sectors on track 0, which is usually single density.
    pub sectors0: u16,
    pub sides: u8,
    pub sides0: u8,
    pub bytes_per_sector: usize,
    /// Size of a header preceding the sector data (FLX or JVC).
    pub offset: usize,
    pub bytes_per_track0: usize,
    pub bytes_per_track: usize,
    pub write_protect: bool,
    pub format: ContainerFormat,
}

impl Geometry {
    /// The geometry of a file which holds nothing but an FLX header, waiting
    /// to be formatted sector by sector.
    pub fn unformatted() -> Geometry {
        Geometry {
            tracks: 0,
            sectors: 0,
            sectors0: 0,
            sides: 0,
            sides0: 0,
            bytes_per_sector: 0,
            offset: FLX_HEADER_SIZE,
            bytes_per_track0: 0,
            bytes_per_track: 0,
            write_protect: false,
            format: ContainerFormat::Flx,
        }
    }

    /// The geometry reported by a host directory, which has no sectors.
    pub fn directory(write_protect: bool) -> Geometry {
        Geometry {
            offset: 0,
            write_protect,
            format: ContainerFormat::Directory,
            ..Geometry::unformatted()
        }
    }

    /// Sector count of the given track.
    #[inline]
    pub fn sectors_on_track(&self, track: u8) -> u16 {
        if track == 0 {
            self.sectors0
        } else {
            self.sectors
        }
    }

    /// Return the byte offset of a sector within the image.  On media that
    /// is not FLEX formatted a side is required, and sectors on side 1 may be
    /// numbered from 1 again, in which case the side 0 sector count is added.
    pub fn byte_offset(
        &self,
        address: SectorAddress,
        side: Option<u8>,
        is_flex_format: bool,
    ) -> io::Result<usize> {
        if address.sector == 0 {
            return Err(DiskError::InvalidSector(address).into());
        }
        let mut offset = self.offset;
        if address.track > 0 {
            offset += self.bytes_per_track0;
            offset += self.bytes_per_track * (address.track as usize - 1);
        }

        let mut side0_offset = 0usize;
        if !is_flex_format {
            match side {
                None => return Err(DiskError::UnexpectedSide.into()),
                Some(1) => {
                    let sectors_side0 = (self.sectors_on_track(address.track) / 2) as usize;
                    if (address.sector as usize) <= sectors_side0 {
                        side0_offset = sectors_side0;
                    }
                }
                Some(_) => {}
            }
        }

        offset += self.bytes_per_sector * (address.sector as usize + side0_offset - 1);
        Ok(offset)
    }

    /// Total number of sector bytes this geometry describes, header included.
    pub fn image_size(&self) -> usize {
        if self.tracks == 0 {
            return self.offset;
        }
        self.offset + self.bytes_per_track0 + self.bytes_per_track * (self.tracks as usize - 1)
    }
}

pub const FLX_HEADER_SIZE: usize = 16;

/// Number of sectors on track 0 for a disk of the given size.  Track 0 of
/// floppies is single density, hard disks use the same density throughout.
pub fn track0_sector_count(tracks: u16, sectors: u16) -> u16 {
    if tracks >= 254 {
        return sectors;
    }

    if tracks == 77 {
        // 8 inch single sided (26) or double sided (52) disks
        return match sectors {
            0..=15 => sectors,
            16..=26 => 15,
            27..=30 => sectors,
            _ => 30,
        };
    }

    // 5 1/4 or 3 1/2 inch disks with 34, 35, 40 or 80 tracks
    match sectors {
        0..=10 => sectors,
        11..=18 => 10,
        19..=20 => sectors,
        _ => 20,
    }
}

/// Number of sides for a disk of the given size.
pub fn sides_for(tracks: u16, sectors: u16) -> u8 {
    if tracks >= 254 {
        return 1;
    }
    let double_sided: &[u16] = if tracks == 77 { &[30, 52] } else { &[20, 36] };
    if double_sided.contains(&sectors) {
        2
    } else {
        1
    }
}

/// Sector size for a WD1793 style size code.  Unknown codes fall back to
/// 128 bytes.
pub fn bytes_per_sector(size_code: u8) -> usize {
    if size_code <= 3 {
        128 << size_code
    } else {
        128
    }
}

/// Inverse of `bytes_per_sector` for the sizes it can produce.
pub fn size_code_for(bytes_per_sector: usize) -> u8 {
    (7..=15u32)
        .rev()
        .find(|bit| bytes_per_sector & (1 << bit) != 0)
        .map(|bit| (bit - 7) as u8)
        .unwrap_or(1)
}

/// Geometry of the data area as seen by FLEX, in 256 byte sectors.
pub fn default_geometry(tracks: u16, sectors: u16, sectors0: u16, format: ContainerFormat) -> Geometry {
    let sides = sides_for(tracks, sectors);
    Geometry {
        tracks,
        sectors,
        sectors0,
        sides,
        sides0: sides,
        bytes_per_sector: SECTOR_SIZE,
        offset: 0,
        bytes_per_track0: sectors as usize * SECTOR_SIZE,
        bytes_per_track: sectors as usize * SECTOR_SIZE,
        write_protect: false,
        format,
    }
}

#[cfg(test)]
mod tests {
    #[allow(unused_imports)]
    use super::*;

    #[test]
    fn test_track0_sector_count() {
        let samples: &[(u16, u16, u16)] = &[
            (35, 5, 5),
            (35, 10, 10),
            (35, 18, 10),
            (35, 19, 19),
            (35, 20, 20),
            (35, 25, 20),
            (40, 18, 10),
            (40, 36, 20),
            (77, 10, 10),
            (77, 15, 15),
            (77, 26, 15),
            (77, 27, 27),
            (77, 30, 30),
            (77, 52, 30),
            (254, 100, 100),
            (255, 255, 255),
            (256, 255, 255),
        ];
        for (index, &(tracks, sectors, expected)) in samples.iter().enumerate() {
            assert_eq!(
                track0_sector_count(tracks, sectors),
                expected,
                "index={}",
                index
            );
        }
    }

    #[test]
    fn test_sides_for() {
        assert_eq!(sides_for(35, 10), 1);
        assert_eq!(sides_for(35, 20), 2);
        assert_eq!(sides_for(35, 25), 1);
        assert_eq!(sides_for(40, 36), 2);
        assert_eq!(sides_for(77, 26), 1);
        assert_eq!(sides_for(77, 30), 2);
        assert_eq!(sides_for(77, 52), 2);
        assert_eq!(sides_for(255, 36), 1);
    }

    #[test]
    fn test_bytes_per_sector() {
        assert_eq!(bytes_per_sector(0), 128);
        assert_eq!(bytes_per_sector(1), 256);
        assert_eq!(bytes_per_sector(2), 512);
        assert_eq!(bytes_per_sector(3), 1024);
        assert_eq!(bytes_per_sector(4), 128);
        assert_eq!(bytes_per_sector(80), 128);
        assert_eq!(size_code_for(256), 1);
        assert_eq!(size_code_for(1024), 3);
    }

    #[test]
    fn test_byte_offset() {
        let mut geometry = default_geometry(40, 18, 10, ContainerFormat::Dsk);
        geometry.offset = 0;
        let offset = |t, s| {
            geometry
                .byte_offset(SectorAddress::new(t, s), None, true)
                .unwrap()
        };
        assert_eq!(offset(0, 1), 0);
        assert_eq!(offset(0, 3), 2 * 256);
        // Track 0 of a DSK image spans a full track.
        assert_eq!(offset(1, 1), 18 * 256);
        assert_eq!(offset(2, 5), 18 * 256 * 2 + 4 * 256);
        assert!(geometry
            .byte_offset(SectorAddress::new(1, 0), None, true)
            .is_err());
    }

    #[test]
    fn test_byte_offset_side_one_on_unformatted_media() {
        let mut geometry = Geometry::unformatted();
        geometry.tracks = 2;
        geometry.sectors = 20;
        geometry.sectors0 = 20;
        geometry.bytes_per_sector = 256;
        geometry.bytes_per_track0 = 20 * 256;
        geometry.bytes_per_track = 20 * 256;
        let address = SectorAddress::new(1, 3);
        assert_eq!(
            geometry.byte_offset(address, Some(1), false).unwrap(),
            16 + 20 * 256 + (3 + 10 - 1) * 256
        );
        assert_eq!(
            geometry.byte_offset(address, Some(0), false).unwrap(),
            16 + 20 * 256 + 2 * 256
        );
        assert!(geometry.byte_offset(address, None, false).is_err());
    }
}
