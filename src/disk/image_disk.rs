use std::cell::RefCell;
use std::collections::HashSet;
use std::io;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use log::debug;

use crate::disk::block::{
    SectorAddress, SectorDevice, SectorDeviceRef, DATA_BYTES_PER_SECTOR, FIRST_DIRECTORY_SECTOR,
    LINK_SIZE, SECTOR_SIZE,
};
use crate::disk::chain::{ChainIterator, SectorLink};
use crate::disk::container::ImageContainer;
use crate::disk::cursor::{DirectoryCursor, ImageCursor};
use crate::disk::directory::{
    has_wildcards, slot_range, DirectoryEntry, FileAttributes, FlexDate, FlexTime, SlotState,
    ENTRIES_PER_SECTOR,
};
use crate::disk::error::DiskError;
use crate::disk::file::FileBuffer;
use crate::disk::header::SystemInfoRecord;
use crate::disk::info::{ContainerOptions, DiskAttributes};
use crate::disk::wildcard::Pattern;
use crate::disk::{DiskOptions, FileTimeAccess, FlexDisk};

/// Triples of a random file's sector map start at this offset of each map
/// sector.
const SECTOR_MAP_OFFSET: usize = LINK_SIZE;
const MAX_RUN_LENGTH: u8 = 255;

/// A FLEX file system stored in a disk image.  All file operations go
/// through the container's sectors, following the FLEX free chain and
/// directory conventions.
pub struct ImageDisk {
    container: Rc<RefCell<ImageContainer>>,
    path: PathBuf,
    options: DiskOptions,
}

impl ImageDisk {
    pub fn new(container: ImageContainer) -> ImageDisk {
        let path = container.path().to_path_buf();
        let options = container.options().clone();
        ImageDisk {
            container: Rc::new(RefCell::new(container)),
            path,
            options,
        }
    }

    /// Allocate sectors from the free chain and fill them with `data`.
    /// Returns the start, end and record count of the new chain.
    fn allocate_chain(
        &mut self,
        data: &[u8],
        random: bool,
    ) -> io::Result<(SectorAddress, SectorAddress, usize)> {
        let mut device = self.container.borrow_mut();
        let sectors_per_track = device.geometry().sectors.min(255) as u8;
        let mut sir = SystemInfoRecord::read(&*device)?;
        let start = sir.fc_start;
        let mut next = start;
        let mut end = SectorAddress::NULL;
        let mut record_nr = 0usize;

        let mut map = if random {
            let mut map = SectorMap::new(sectors_per_track);
            for _ in 0..2 {
                if next.is_null() {
                    return Err(DiskError::DiskFull.into());
                }
                let mut sector = device.read_sector(next, None)?;
                let link = SectorLink::from_bytes(&sector);
                for b in sector[2..].iter_mut() {
                    *b = 0;
                }
                map.sectors.push((next, sector));
                end = next;
                next = link.next;
                record_nr += 1;
            }
            Some(map)
        } else {
            None
        };

        while record_nr * DATA_BYTES_PER_SECTOR < data.len() {
            if next.is_null() {
                return Err(DiskError::DiskFull.into());
            }
            let address = next;
            let mut sector = device.read_sector(address, None)?;
            let link = SectorLink::from_bytes(&sector);

            let offset = record_nr * DATA_BYTES_PER_SECTOR;
            let chunk = &data[offset..data.len().min(offset + DATA_BYTES_PER_SECTOR)];
            sector[LINK_SIZE..LINK_SIZE + chunk.len()].copy_from_slice(chunk);
            for b in sector[LINK_SIZE + chunk.len()..].iter_mut() {
                *b = 0;
            }
            record_nr += 1;
            if let Some(map) = map.as_mut() {
                map.add(address)?;
            }

            let is_last = record_nr * DATA_BYTES_PER_SECTOR >= data.len();
            let number = if random { record_nr - 2 } else { record_nr };
            SectorLink::new(
                if is_last { SectorAddress::NULL } else { link.next },
                number as u16,
            )
            .write_bytes(&mut sector);
            device.write_sector(address, None, &sector)?;
            end = address;
            next = link.next;
        }

        if let Some(map) = map {
            let last_index = map.sectors.len() - 1;
            for (index, (address, mut sector)) in map.sectors.into_iter().enumerate() {
                // A random file without records ends with its second map sector.
                if index == last_index && record_nr == 2 {
                    SectorAddress::NULL.write_bytes(&mut sector);
                }
                device.write_sector(address, None, &sector)?;
            }
        }

        sir.fc_start = next;
        if next.is_null() {
            sir.fc_end = SectorAddress::NULL;
        }
        sir.free = sir.free.saturating_sub(record_nr as u16);
        sir.write(&mut *device)?;
        debug!(
            "allocated {} sectors {}..{}, {} free",
            record_nr, start, end, sir.free
        );
        Ok((start, end, record_nr))
    }

    /// Store `entry` in the first empty or deleted directory slot, extending
    /// the directory if none is left.
    fn append_entry(&mut self, entry: &DirectoryEntry) -> io::Result<()> {
        let mut device = self.container.borrow_mut();
        let mut address = FIRST_DIRECTORY_SECTOR;
        let mut visited_sectors = HashSet::new();
        loop {
            if !visited_sectors.insert(address) {
                return Err(DiskError::ChainLoop(address).into());
            }
            let mut sector = device.read_sector(address, None)?;
            for index in 0..ENTRIES_PER_SECTOR {
                let range = slot_range(index);
                if SlotState::of(&sector[range.clone()]) != SlotState::Used {
                    entry.write_bytes(&mut sector[range]);
                    device.write_sector(address, None, &sector)?;
                    debug!("{} stored at {} slot {}", entry.total_name(), address, index);
                    return Ok(());
                }
            }
            let link = SectorLink::from_bytes(&sector);
            address = if link.next.is_null() {
                extend_directory(&mut *device, address, sector)?
            } else {
                link.next
            };
        }
    }

    fn find_exact(&self, name: &str) -> io::Result<DirectoryEntry> {
        if has_wildcards(name) {
            return Err(DiskError::WildcardNotSupported(name.to_string()).into());
        }
        self.find_file(name)
    }
}

/// Take the first sector of the free chain as a new, empty directory sector
/// linked behind `last`.
fn extend_directory(
    device: &mut dyn SectorDevice,
    last: SectorAddress,
    mut last_sector: Vec<u8>,
) -> io::Result<SectorAddress> {
    let mut sir = SystemInfoRecord::read(device)?;
    let address = sir.fc_start;
    if address.is_null() {
        return Err(DiskError::DirectoryFull.into());
    }
    address.write_bytes(&mut last_sector);
    device.write_sector(last, None, &last_sector)?;

    let fc_start = SectorLink::from_bytes(&device.read_sector(address, None)?).next;
    let mut sector = vec![0u8; SECTOR_SIZE];
    SectorLink::new(SectorAddress::NULL, 1).write_bytes(&mut sector);
    device.write_sector(address, None, &sector)?;

    sir.fc_start = fc_start;
    sir.free = sir.free.saturating_sub(1);
    if fc_start.is_null() {
        sir.fc_end = SectorAddress::NULL;
        sir.free = 0;
    }
    sir.write(device)?;
    debug!("directory extended by {}", address);
    Ok(address)
}

/// The two map sectors of a random file being written, and the position of
/// the run currently being extended.
struct SectorMap {
    sectors: Vec<(SectorAddress, Vec<u8>)>,
    sector_index: usize,
    offset: usize,
    expected: SectorAddress,
    sectors_per_track: u8,
}

impl SectorMap {
    fn new(sectors_per_track: u8) -> SectorMap {
        SectorMap {
            sectors: Vec::with_capacity(2),
            sector_index: 0,
            // Moves to the first triple on the first record.
            offset: SECTOR_MAP_OFFSET - 3,
            expected: SectorAddress::NULL,
            sectors_per_track,
        }
    }

    fn add(&mut self, address: SectorAddress) -> io::Result<()> {
        let count = self.sectors[self.sector_index].1[self.offset + 2];
        if address != self.expected || count == MAX_RUN_LENGTH {
            self.offset += 3;
            if self.offset + 3 > SECTOR_SIZE {
                if self.sector_index + 1 >= self.sectors.len() {
                    return Err(DiskError::RecordMapFull.into());
                }
                self.sector_index += 1;
                self.offset = SECTOR_MAP_OFFSET;
            }
            // A new run starts at this sector.
            address.write_bytes(&mut self.sectors[self.sector_index].1[self.offset..]);
        }
        self.sectors[self.sector_index].1[self.offset + 2] += 1;
        self.expected = address.successor(self.sectors_per_track);
        Ok(())
    }
}

impl FlexDisk for ImageDisk {
    fn device(&self) -> SectorDeviceRef {
        self.container.clone()
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn is_formatted(&self) -> bool {
        self.container.borrow().is_flex_format()
    }

    fn is_read_only(&self) -> bool {
        self.container.borrow().is_write_protected()
    }

    fn file_time_access(&self) -> FileTimeAccess {
        self.options.file_time_access
    }

    fn cursor(&self, pattern: &str) -> io::Result<Box<dyn DirectoryCursor>> {
        self.check_formatted()?;
        Ok(Box::new(ImageCursor::new(
            self.device(),
            Pattern::new(pattern)?,
        )))
    }

    fn read_file(&self, name: &str) -> io::Result<FileBuffer> {
        self.check_formatted()?;
        let entry = self.find_exact(name)?;
        let size = entry.size();
        let mut data = Vec::with_capacity(size);
        for (count, sector) in ChainIterator::new(self.device(), entry.start).enumerate() {
            let sector = sector?;
            if count >= entry.records as usize {
                return Err(
                    DiskError::UnexpectedSector(entry.total_name(), sector.address).into(),
                );
            }
            data.extend_from_slice(sector.payload());
        }
        data.resize(size, 0);

        let mut buffer = FileBuffer::from_entry(&entry, data);
        if !self.options.file_time_access.has_get() {
            buffer.time = FlexTime::default();
        }
        Ok(buffer)
    }

    fn write_file(&mut self, buffer: &FileBuffer, name: Option<&str>) -> io::Result<()> {
        self.check_writable()?;
        let name = name.unwrap_or(buffer.name.as_str());
        let mut entry = buffer.to_entry(name)?;
        if buffer.is_empty() {
            return Err(DiskError::EmptyFile(name.to_string()).into());
        }
        if self.file_exists(name)? {
            return Err(DiskError::FileExists(name.to_string()).into());
        }

        let (start, end, records) = self.allocate_chain(buffer.data(), buffer.random)?;
        entry.start = start;
        entry.end = end;
        entry.records = records as u16;
        if !self.options.file_time_access.has_set() {
            entry.time = FlexTime::default();
        }
        self.append_entry(&entry)
    }

    fn read_random_records(&self, name: &str) -> io::Result<Vec<u8>> {
        self.check_formatted()?;
        let entry = self.find_exact(name)?;
        if !entry.random {
            return Err(DiskError::NotRandomFile(entry.total_name()).into());
        }
        let map_sectors = ChainIterator::new(self.device(), entry.start)
            .take(2)
            .collect::<io::Result<Vec<_>>>()?;

        let device = self.container.borrow();
        let sectors_per_track = device.geometry().sectors.min(255) as u8;
        let mut data = Vec::new();
        'map: for map_sector in map_sectors.iter() {
            for triple in map_sector.data[SECTOR_MAP_OFFSET..].chunks_exact(3) {
                let mut address = SectorAddress::from_bytes(triple);
                if address.is_null() {
                    break 'map;
                }
                for _ in 0..triple[2] {
                    let sector = device.read_sector(address, None)?;
                    data.extend_from_slice(&sector[LINK_SIZE..]);
                    address = address.successor(sectors_per_track);
                }
            }
        }
        Ok(data)
    }

    fn attributes(&self) -> io::Result<DiskAttributes> {
        let device = self.container.borrow();
        let geometry = device.geometry();
        let bytes_per_sector = geometry.bytes_per_sector;
        let jvc_header = device.jvc_header().as_bytes().to_vec();
        let mut attributes = DiskAttributes {
            name: String::new(),
            number: 0,
            date: FlexDate::default(),
            free: 0,
            total: geometry.image_size() as u64,
            tracks: geometry.tracks,
            sectors: geometry.sectors,
            sector_size: bytes_per_sector,
            format: geometry.format,
            options: ContainerOptions {
                jvc_header: !jvc_header.is_empty(),
                ram: self.options.ram,
                sector_interface: true,
            },
            supported_attributes: self.supported_attributes(),
            write_protected: device.is_write_protected(),
            is_flex_format: device.is_flex_format(),
            path: self.path.clone(),
            jvc_header,
        };
        if !device.is_flex_format() {
            return Ok(attributes);
        }

        let sir = SystemInfoRecord::read(&*device)?;
        attributes.name = sir.name();
        attributes.number = sir.disk_number;
        attributes.date = sir.date();
        attributes.free = sir.free as u64 * bytes_per_sector as u64;
        attributes.total =
            sir.last.sector as u64 * (sir.last.track as u64 + 1) * bytes_per_sector as u64;
        attributes.tracks = sir.tracks();
        attributes.sectors = sir.sectors();
        Ok(attributes)
    }

    fn supported_attributes(&self) -> FileAttributes {
        FileAttributes::ALL
    }

    fn flush(&mut self) -> io::Result<()> {
        self.container.borrow_mut().flush()
    }
}
