use std::collections::HashSet;
use std::io;

use log::debug;

use crate::disk::block::{
    SectorAddress, SectorDevice, SectorDeviceRef, FIRST_DIRECTORY_SECTOR,
};
use crate::disk::chain::SectorLink;
use crate::disk::directory::{
    slot_range, split_name, tombstone, DirectoryEntry, EntryPosition, FileAttributes, FlexDate,
    SlotState, ENTRIES_PER_SECTOR,
};
use crate::disk::error::DiskError;
use crate::disk::header::SystemInfoRecord;
use crate::disk::wildcard::Pattern;

/// Iterates the directory entries matching a pattern and mutates the entry
/// it was last positioned on.
pub trait DirectoryCursor: Iterator<Item = io::Result<DirectoryEntry>> {
    /// The entry the cursor is positioned on, if any.
    fn current(&self) -> Option<&DirectoryEntry>;

    /// Delete the current entry and release its sectors.
    fn delete_current(&mut self) -> io::Result<()>;

    fn rename_current(&mut self, new_name: &str) -> io::Result<()>;

    fn set_date_current(&mut self, date: &FlexDate) -> io::Result<()>;

    fn set_attributes_current(&mut self, attributes: FileAttributes) -> io::Result<()>;
}

/// A cursor over the directory sectors of a disk image.  The directory
/// sector holding the current entry is read again before every change.
pub struct ImageCursor {
    device: SectorDeviceRef,
    pattern: Pattern,
    /// Directory sector and slot to be examined next.
    next_slot: Option<(SectorAddress, usize)>,
    visited_sectors: HashSet<SectorAddress>,
    current: Option<DirectoryEntry>,
}

impl ImageCursor {
    pub fn new(device: SectorDeviceRef, pattern: Pattern) -> ImageCursor {
        ImageCursor {
            device,
            pattern,
            next_slot: Some((FIRST_DIRECTORY_SECTOR, 0)),
            visited_sectors: HashSet::new(),
            current: None,
        }
    }

    fn entry_position(&self) -> io::Result<EntryPosition> {
        self.current
            .as_ref()
            .and_then(|entry| entry.position)
            .ok_or_else(|| DiskError::Unpositioned.into())
    }

    /// Scan for the next matching entry.  `None` ends the iteration.
    fn advance(&mut self) -> io::Result<Option<DirectoryEntry>> {
        while let Some((address, first_index)) = self.next_slot.take() {
            if first_index == 0 && !self.visited_sectors.insert(address) {
                return Err(DiskError::ChainLoop(address).into());
            }
            let sector = self.device.borrow().read_sector(address, None)?;
            for index in first_index..ENTRIES_PER_SECTOR {
                let slot = &sector[slot_range(index)];
                match SlotState::of(slot) {
                    SlotState::Empty => return Ok(None),
                    SlotState::Deleted => continue,
                    SlotState::Used => {}
                }
                let position = EntryPosition {
                    sector: address,
                    index,
                };
                let entry = DirectoryEntry::from_bytes(slot, Some(position));
                if self.pattern.is_match(&entry.total_name()) {
                    self.next_slot = Some((address, index + 1));
                    return Ok(Some(entry));
                }
            }
            let link = SectorLink::from_bytes(&sector);
            if !link.next.is_null() {
                self.next_slot = Some((link.next, 0));
            }
        }
        Ok(None)
    }

    /// Re-read the sector holding the current entry, let `modify` change its
    /// slot and write it back.
    fn update_current<F>(&mut self, modify: F) -> io::Result<DirectoryEntry>
    where
        F: FnOnce(&mut [u8]) -> io::Result<()>,
    {
        let position = self.entry_position()?;
        let mut device = self.device.borrow_mut();
        let mut sector = device.read_sector(position.sector, None)?;
        let slot = &mut sector[slot_range(position.index)];
        let entry = DirectoryEntry::from_bytes(slot, Some(position));
        modify(slot)?;
        device.write_sector(position.sector, None, &sector)?;
        Ok(entry)
    }
}

impl Iterator for ImageCursor {
    type Item = io::Result<DirectoryEntry>;

    fn next(&mut self) -> Option<io::Result<DirectoryEntry>> {
        self.current = None;
        match self.advance() {
            Ok(Some(entry)) => {
                self.current = Some(entry.clone());
                Some(Ok(entry))
            }
            Ok(None) => {
                self.next_slot = None;
                None
            }
            Err(e) => {
                self.next_slot = None;
                Some(Err(e))
            }
        }
    }
}

impl DirectoryCursor for ImageCursor {
    fn current(&self) -> Option<&DirectoryEntry> {
        self.current.as_ref()
    }

    fn delete_current(&mut self) -> io::Result<()> {
        let position = self.entry_position()?;
        let entry = {
            let sector = self.device.borrow().read_sector(position.sector, None)?;
            DirectoryEntry::from_bytes(&sector[slot_range(position.index)], Some(position))
        };
        if entry.is_delete_protected() {
            return Err(DiskError::DeleteProtected(entry.total_name()).into());
        }

        // Append the file's chain to the free chain.  The slot stays live
        // until this has succeeded.
        if !entry.start.is_null() {
            let mut device = self.device.borrow_mut();
            let mut sir = SystemInfoRecord::read(&*device)?;
            if sir.fc_end.is_null() {
                sir.fc_start = entry.start;
            } else {
                let mut sector = device.read_sector(sir.fc_end, None)?;
                entry.start.write_bytes(&mut sector);
                device.write_sector(sir.fc_end, None, &sector)?;
            }
            sir.fc_end = entry.end;
            sir.free = sir.free.wrapping_add(entry.records);
            sir.write(&mut *device)?;
            debug!(
                "released {} sectors of {}, {} free",
                entry.records,
                entry.total_name(),
                sir.free
            );
        }

        self.update_current(|slot| {
            tombstone(slot);
            Ok(())
        })?;
        self.current = None;
        Ok(())
    }

    fn rename_current(&mut self, new_name: &str) -> io::Result<()> {
        let (name, extension) = split_name(new_name)?;
        let entry = self.update_current(|slot| {
            let renamed = DirectoryEntry {
                name: name.clone(),
                extension: extension.clone(),
                ..DirectoryEntry::from_bytes(slot, None)
            };
            renamed.write_name(slot);
            Ok(())
        })?;
        self.current = Some(DirectoryEntry {
            name,
            extension,
            ..entry
        });
        Ok(())
    }

    fn set_date_current(&mut self, date: &FlexDate) -> io::Result<()> {
        let entry = self.update_current(|slot| {
            DirectoryEntry::write_date(date, slot);
            Ok(())
        })?;
        self.current = Some(DirectoryEntry {
            date: *date,
            ..entry
        });
        Ok(())
    }

    fn set_attributes_current(&mut self, attributes: FileAttributes) -> io::Result<()> {
        let entry = self.update_current(|slot| {
            DirectoryEntry::write_attributes(attributes, slot);
            Ok(())
        })?;
        self.current = Some(DirectoryEntry {
            attributes,
            ..entry
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    #[allow(unused_imports)]
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    use crate::disk::block::SECTOR_SIZE;
    use crate::disk::container::ImageContainer;
    use crate::disk::directory::ENTRY_SIZE;
    use crate::disk::{DiskOptions, DiskType, FormatOptions};

    fn device() -> SectorDeviceRef {
        let options = DiskOptions {
            writable: true,
            ..DiskOptions::default()
        };
        let container = ImageContainer::create_memory(
            "cursor",
            35,
            10,
            DiskType::Dsk,
            &FormatOptions::default(),
            &options,
        )
        .unwrap();
        Rc::new(RefCell::new(container))
    }

    /// Write raw entries into directory sector 00-05 without allocating.
    fn put_entries(device: &SectorDeviceRef, names: &[&str]) {
        let address = FIRST_DIRECTORY_SECTOR;
        let mut sector = device.borrow().read_sector(address, None).unwrap();
        for (index, name) in names.iter().enumerate() {
            let mut entry = DirectoryEntry::new(name).unwrap();
            entry.records = 1;
            let mut slot = vec![0u8; ENTRY_SIZE];
            entry.write_bytes(&mut slot);
            sector[slot_range(index)].copy_from_slice(&slot);
        }
        device
            .borrow_mut()
            .write_sector(address, None, &sector)
            .unwrap();
    }

    fn names(cursor: ImageCursor) -> Vec<String> {
        cursor.map(|e| e.unwrap().total_name()).collect()
    }

    #[test]
    fn test_iterate_with_pattern() {
        let device = device();
        put_entries(&device, &["CAT.CMD", "TEST01.TXT", "TEST02.TXT", "ASN.CMD"]);
        let cursor = ImageCursor::new(device.clone(), Pattern::new("*.CMD").unwrap());
        assert_eq!(names(cursor), vec!["CAT.CMD", "ASN.CMD"]);
        let cursor = ImageCursor::new(device, Pattern::new("*").unwrap());
        assert_eq!(names(cursor).len(), 4);
    }

    #[test]
    fn test_deleted_slots_are_skipped() {
        let device = device();
        put_entries(&device, &["CAT.CMD", "TEST01.TXT", "ASN.CMD"]);
        let mut cursor = ImageCursor::new(device.clone(), Pattern::new("TEST01.TXT").unwrap());
        assert!(cursor.next().unwrap().is_ok());
        // Entries without sectors are tombstoned only.
        cursor.delete_current().unwrap();
        assert!(cursor.current().is_none());
        assert!(cursor.next().is_none());

        let cursor = ImageCursor::new(device.clone(), Pattern::any());
        assert_eq!(names(cursor), vec!["CAT.CMD", "ASN.CMD"]);
        let sector = device
            .borrow()
            .read_sector(FIRST_DIRECTORY_SECTOR, None)
            .unwrap();
        assert_eq!(sector[slot_range(1)][0], 0xFF);
    }

    #[test]
    fn test_unpositioned() {
        let device = device();
        put_entries(&device, &["CAT.CMD"]);
        let mut cursor = ImageCursor::new(device, Pattern::any());
        let error = cursor.delete_current().unwrap_err();
        assert!(error == DiskError::Unpositioned);
        assert!(cursor.next().is_some());
        assert!(cursor.next().is_none());
        // End is terminal.
        assert!(cursor.next().is_none());
        let error = cursor.rename_current("DOG.CMD").unwrap_err();
        assert!(error == DiskError::Unpositioned);
    }

    #[test]
    fn test_modify_current() {
        let device = device();
        put_entries(&device, &["CAT.CMD"]);
        let mut cursor = ImageCursor::new(device.clone(), Pattern::any());
        cursor.next().unwrap().unwrap();
        cursor.rename_current("dog.txt").unwrap();
        cursor
            .set_attributes_current(FileAttributes::WRITE_PROTECT)
            .unwrap();
        cursor
            .set_date_current(&FlexDate::new(24, 12, 85))
            .unwrap();
        assert_eq!(cursor.current().unwrap().total_name(), "DOG.TXT");
        assert!(cursor.rename_current("1DOG.TXT").is_err());

        let entry = ImageCursor::new(device, Pattern::any())
            .next()
            .unwrap()
            .unwrap();
        assert_eq!(entry.total_name(), "DOG.TXT");
        assert_eq!(entry.attributes, FileAttributes::WRITE_PROTECT);
        assert_eq!(entry.date, FlexDate::new(24, 12, 85));
        assert_eq!(entry.records, 1);
    }

    #[test]
    fn test_directory_loop() {
        let device = device();
        let mut sector = vec![0u8; SECTOR_SIZE];
        // Full directory sector linking back to itself.
        for index in 0..ENTRIES_PER_SECTOR {
            let mut slot = vec![0u8; ENTRY_SIZE];
            DirectoryEntry::new("A.B").unwrap().write_bytes(&mut slot);
            tombstone(&mut slot);
            sector[slot_range(index)].copy_from_slice(&slot);
        }
        FIRST_DIRECTORY_SECTOR.write_bytes(&mut sector);
        device
            .borrow_mut()
            .write_sector(FIRST_DIRECTORY_SECTOR, None, &sector)
            .unwrap();
        let mut cursor = ImageCursor::new(device, Pattern::any());
        let error = cursor.next().unwrap().unwrap_err();
        assert!(error == DiskError::ChainLoop(FIRST_DIRECTORY_SECTOR));
        assert!(cursor.next().is_none());
    }
}
