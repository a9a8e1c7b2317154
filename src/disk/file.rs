//! FLEX files held in memory.

use std::fmt;
use std::io;

use crate::disk::block::DATA_BYTES_PER_SECTOR;
use crate::disk::directory::{DirectoryEntry, FileAttributes, FlexDate, FlexTime};

/// Bytes occupied by the two sector map sectors at the start of a random
/// file.
pub const SECTOR_MAP_SIZE: usize = 2 * DATA_BYTES_PER_SECTOR;

/// The in-memory form of one file, as read from or written to a disk.
///
/// The data of a random file includes the payload of its two sector map
/// sectors, which is exactly what walking its chain yields.
#[derive(Clone, PartialEq, Eq)]
pub struct FileBuffer {
    /// Total filename, e.g. `CAT.CMD`.
    pub name: String,
    pub attributes: FileAttributes,
    pub random: bool,
    pub date: FlexDate,
    pub time: FlexTime,
    data: Vec<u8>,
}

impl FileBuffer {
    /// Create a sequential file dated now.
    pub fn new(name: &str, data: Vec<u8>) -> FileBuffer {
        FileBuffer {
            name: name.to_string(),
            attributes: FileAttributes::NONE,
            random: false,
            date: FlexDate::today(),
            time: FlexTime::now(),
            data,
        }
    }

    /// Create a random file.  `records` are the data records following the
    /// sector map; the map sectors are left blank since the allocator
    /// builds them.
    pub fn new_random(name: &str, records: &[u8]) -> FileBuffer {
        let mut data = vec![0u8; SECTOR_MAP_SIZE];
        data.extend_from_slice(records);
        FileBuffer {
            random: true,
            ..FileBuffer::new(name, data)
        }
    }

    /// Create a buffer carrying the metadata of a directory entry.
    pub fn from_entry(entry: &DirectoryEntry, data: Vec<u8>) -> FileBuffer {
        FileBuffer {
            name: entry.total_name(),
            attributes: entry.attributes,
            random: entry.random,
            date: entry.date,
            time: entry.time,
            data,
        }
    }

    /// A directory entry describing this buffer.  Sector addresses and the
    /// record count are left to the allocator.
    pub fn to_entry(&self, name: &str) -> io::Result<DirectoryEntry> {
        let mut entry = DirectoryEntry::new(name)?;
        entry.attributes = self.attributes;
        entry.random = self.random;
        entry.date = self.date;
        entry.time = self.time;
        Ok(entry)
    }

    #[inline]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    #[inline]
    pub fn data_mut(&mut self) -> &mut Vec<u8> {
        &mut self.data
    }

    #[inline]
    pub fn into_data(self) -> Vec<u8> {
        self.data
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Number of sectors needed to store the data.
    pub fn records(&self) -> usize {
        self.data.len().div_ceil(DATA_BYTES_PER_SECTOR)
    }

    /// The payload following the sector map of a random file.
    pub fn random_records(&self) -> &[u8] {
        if self.random && self.data.len() >= SECTOR_MAP_SIZE {
            &self.data[SECTOR_MAP_SIZE..]
        } else {
            &self.data
        }
    }
}

impl fmt::Debug for FileBuffer {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "FileBuffer({} {} bytes {:?} {} {}{})",
            self.name,
            self.data.len(),
            self.attributes,
            self.date,
            self.time,
            if self.random { " random" } else { "" }
        )
    }
}

#[cfg(test)]
mod tests {
    #[allow(unused_imports)]
    use super::*;

    #[test]
    fn test_records() {
        assert_eq!(FileBuffer::new("A.TXT", vec![]).records(), 0);
        assert_eq!(FileBuffer::new("A.TXT", vec![1; 252]).records(), 1);
        assert_eq!(FileBuffer::new("A.TXT", vec![1; 253]).records(), 2);

        let random = FileBuffer::new_random("R.DAT", &[7u8; 300]);
        assert!(random.random);
        assert_eq!(random.records(), 4);
        assert_eq!(random.random_records(), &[7u8; 300][..]);
    }

    #[test]
    fn test_to_entry() {
        let mut buffer = FileBuffer::new("ignored.txt", vec![1, 2, 3]);
        buffer.attributes = FileAttributes::DELETE_PROTECT;
        buffer.date = FlexDate::new(1, 2, 86);
        let entry = buffer.to_entry("report.txt").unwrap();
        assert_eq!(entry.total_name(), "REPORT.TXT");
        assert_eq!(entry.attributes, FileAttributes::DELETE_PROTECT);
        assert_eq!(entry.date, FlexDate::new(1, 2, 86));
        assert!(buffer.to_entry("report").is_err());
    }
}
