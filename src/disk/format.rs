//! Creation of freshly formatted FLEX disk images.

use std::fs;
use std::io;

use log::{debug, warn};

use crate::disk::block::{SectorAddress, FIRST_DIRECTORY_SECTOR, SECTOR_SIZE};
use crate::disk::directory::FlexDate;
use crate::disk::error::DiskError;
use crate::disk::geometry::{sides_for, track0_sector_count};
use crate::disk::header::{FlxHeader, SystemInfoRecord, DISK_NAME_SIZE};
use crate::disk::image::Image;
use crate::disk::{DiskType, FormatOptions};

pub const MIN_TRACKS: u16 = 2;
pub const MAX_TRACKS: u16 = 256;
pub const MIN_SECTORS: u16 = 6;
pub const MAX_SECTORS: u16 = 255;

const BOOT_SECTORS_SIZE: usize = 2 * SECTOR_SIZE;

/// Without a boot sector file the boot code jumps to the monitor's warm
/// start entry point.
const DEFAULT_BOOT_CODE: [u8; 3] = [0x7E, 0xF0, 0x2D]; // JMP $F02D

/// Sector `index` (0 based) of a disk laid out linearly.
#[inline]
fn linear_address(index: usize, sectors: u16) -> SectorAddress {
    let sectors = sectors as usize;
    SectorAddress::new((index / sectors) as u8, (index % sectors + 1) as u8)
}

fn boot_sectors(options: &FormatOptions) -> Vec<u8> {
    let mut boot = vec![0u8; BOOT_SECTORS_SIZE];
    if let Some(ref path) = options.boot_sector {
        match fs::read(path) {
            Ok(bytes) if bytes.len() == SECTOR_SIZE || bytes.len() == BOOT_SECTORS_SIZE => {
                debug!("boot sector from {}", path.display());
                boot[..bytes.len()].copy_from_slice(&bytes);
                return boot;
            }
            Ok(bytes) => warn!(
                "ignoring boot sector file {} of {} bytes",
                path.display(),
                bytes.len()
            ),
            Err(e) => warn!("unable to read boot sector file {}: {}", path.display(), e),
        }
    }
    boot[..DEFAULT_BOOT_CODE.len()].copy_from_slice(&DEFAULT_BOOT_CODE);
    boot
}

fn disk_name(name: &str) -> [u8; DISK_NAME_SIZE] {
    let mut disk_name = [0u8; DISK_NAME_SIZE];
    let name = name
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-')
        .map(|c| c.to_ascii_uppercase() as u8)
        .take(DISK_NAME_SIZE)
        .collect::<Vec<_>>();
    disk_name[..name.len()].copy_from_slice(&name);
    disk_name
}

fn system_info_record(name: &str, tracks: u16, sectors: u16) -> SystemInfoRecord {
    let last = SectorAddress::new((tracks - 1) as u8, sectors as u8);
    let date = FlexDate::today();
    SystemInfoRecord {
        disk_name: disk_name(name),
        disk_ext: [0u8; 3],
        disk_number: 0,
        fc_start: SectorAddress::new(1, 1),
        fc_end: last,
        free: sectors * (tracks - 1),
        month: date.month,
        day: date.day,
        year: date.year,
        last,
    }
}

/// Format `image` as an empty FLEX disk with the given number of tracks and
/// sectors per track.  Any previous content is replaced.
pub fn format_disk(
    image: &mut Image,
    name: &str,
    tracks: u16,
    sectors: u16,
    disk_type: DiskType,
    options: &FormatOptions,
) -> io::Result<()> {
    if !(MIN_TRACKS..=MAX_TRACKS).contains(&tracks) || !(MIN_SECTORS..=MAX_SECTORS).contains(&sectors) {
        return Err(DiskError::InvalidFormatRequest.into());
    }
    let track0_count = track0_sector_count(tracks, sectors);
    let sectors0 = match disk_type {
        DiskType::Flx => track0_count,
        DiskType::Dsk => sectors,
        DiskType::Directory => return Err(DiskError::InvalidFormatRequest.into()),
    };
    debug!(
        "format {:?} image {}: {} tracks, {} sectors, {} on track 0",
        disk_type, name, tracks, sectors, sectors0
    );

    let mut data = Vec::with_capacity(
        (sectors0 as usize + (tracks as usize - 1) * sectors as usize) * SECTOR_SIZE + 16,
    );

    if disk_type == DiskType::Flx {
        let sides = sides_for(tracks, sectors);
        let header = FlxHeader::new(SECTOR_SIZE, tracks, sectors0, sectors, sides, sides);
        data.extend_from_slice(&header.to_bytes());
    }

    data.extend_from_slice(&boot_sectors(options));
    data.extend_from_slice(&system_info_record(name, tracks, sectors).to_sector());
    data.extend_from_slice(&[0u8; SECTOR_SIZE]);

    // Directory sectors on track 0.  Only the first `track0_count - 4` are
    // chained.
    let first = FIRST_DIRECTORY_SECTOR.sector as usize - 1;
    let chained = track0_count as usize - first;
    for index in 0..(sectors0 as usize - first) {
        let mut sector = [0u8; SECTOR_SIZE];
        if index + 1 < chained {
            linear_address(first + index + 1, sectors).write_bytes(&mut sector);
        }
        data.extend_from_slice(&sector);
    }

    // All other sectors form the free chain.
    let total = tracks as usize * sectors as usize;
    for index in sectors as usize..total {
        let mut sector = [0u8; SECTOR_SIZE];
        if index + 1 < total {
            linear_address(index + 1, sectors).write_bytes(&mut sector);
        }
        data.extend_from_slice(&sector);
    }

    image.resize(data.len())?;
    image.slice_mut(0, data.len())?.copy_from_slice(&data);
    Ok(())
}

#[cfg(test)]
mod tests {
    #[allow(unused_imports)]
    use super::*;

    fn format(tracks: u16, sectors: u16, disk_type: DiskType) -> Vec<u8> {
        let mut image = Image::open_memory(Vec::new());
        format_disk(
            &mut image,
            "system",
            tracks,
            sectors,
            disk_type,
            &FormatOptions::default(),
        )
        .unwrap();
        image.into_bytes()
    }

    fn link(bytes: &[u8], offset: usize, index: usize) -> (u8, u8) {
        let at = offset + index * SECTOR_SIZE;
        (bytes[at], bytes[at + 1])
    }

    #[test]
    fn test_format_dsk_layout() {
        let bytes = format(35, 10, DiskType::Dsk);
        assert_eq!(bytes.len(), 35 * 10 * 256);
        assert_eq!(&bytes[..3], &DEFAULT_BOOT_CODE);

        let sir = SystemInfoRecord::from_bytes(&bytes[512..768]);
        assert_eq!(sir.name(), "SYSTEM");
        assert_eq!(sir.fc_start, SectorAddress::new(1, 1));
        assert_eq!(sir.fc_end, SectorAddress::new(34, 10));
        assert_eq!(sir.free, 340);
        assert_eq!(sir.last, SectorAddress::new(34, 10));
        assert!(sir.date().is_valid());
        assert!(bytes[768..1024].iter().all(|&b| b == 0));

        // Directory chain 00-05 .. 00-0A.
        assert_eq!(link(&bytes, 0, 4), (0, 6));
        assert_eq!(link(&bytes, 0, 8), (0, 10));
        assert_eq!(link(&bytes, 0, 9), (0, 0));
        // Free chain.
        assert_eq!(link(&bytes, 0, 10), (1, 2));
        assert_eq!(link(&bytes, 0, 19), (2, 1));
        assert_eq!(link(&bytes, 0, 349), (0, 0));
    }

    #[test]
    fn test_format_dsk_unchained_track0_sectors() {
        let bytes = format(40, 18, DiskType::Dsk);
        assert_eq!(bytes.len(), 40 * 18 * 256);
        // Only 00-05 .. 00-0A are chained on a 18 sector DSK.
        assert_eq!(link(&bytes, 0, 8), (0, 10));
        assert_eq!(link(&bytes, 0, 9), (0, 0));
        assert_eq!(link(&bytes, 0, 12), (0, 0));
        assert_eq!(link(&bytes, 0, 18), (1, 2));
    }

    #[test]
    fn test_format_flx_layout() {
        let bytes = format(40, 18, DiskType::Flx);
        assert_eq!(bytes.len(), 182_288);
        let header = FlxHeader::from_bytes(&bytes).unwrap();
        assert_eq!(header.sectors0, 10);
        assert_eq!(header.sectors, 18);
        assert_eq!(header.sides, 1);
        assert_eq!(header.file_size(), bytes.len());
        // The first sector of track 1 directly follows 10 track 0 sectors.
        assert_eq!(link(&bytes, 16, 10), (1, 2));
    }

    #[test]
    fn test_format_double_sided_flx() {
        let bytes = format(80, 36, DiskType::Flx);
        let header = FlxHeader::from_bytes(&bytes).unwrap();
        assert_eq!(header.sides0, 2);
        assert_eq!(header.sides, 2);
        assert_eq!(header.sectors0, 10);
        assert_eq!(header.sectors, 18);
        assert_eq!(header.file_size(), bytes.len());
    }

    #[test]
    fn test_format_rejects_bad_geometry() {
        let mut image = Image::open_memory(Vec::new());
        let options = FormatOptions::default();
        for &(tracks, sectors) in &[(1u16, 10u16), (257, 10), (35, 5), (35, 256)] {
            let error = format_disk(&mut image, "x", tracks, sectors, DiskType::Dsk, &options)
                .unwrap_err();
            assert!(error == DiskError::InvalidFormatRequest);
        }
        let error = format_disk(&mut image, "x", 35, 10, DiskType::Directory, &options)
            .unwrap_err();
        assert!(error == DiskError::InvalidFormatRequest);
    }

    #[test]
    fn test_boot_sector_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        let boot = (0..256).map(|i| i as u8).collect::<Vec<_>>();
        std::io::Write::write_all(&mut file, &boot).unwrap();
        let options = FormatOptions {
            boot_sector: Some(file.path().to_path_buf()),
        };
        assert_eq!(&boot_sectors(&options)[..256], &boot[..]);

        let options = FormatOptions {
            boot_sector: Some(file.path().with_extension("missing")),
        };
        assert_eq!(&boot_sectors(&options)[..3], &DEFAULT_BOOT_CODE);
    }
}
