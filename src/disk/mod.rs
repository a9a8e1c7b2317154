//! Traits, structs, and functions relating to FLEX disks.

mod block;
mod chain;
mod check;
mod container;
mod cursor;
mod dirdisk;
mod error;
mod format;
mod geometry;
mod header;
mod image;
mod image_disk;
mod info;
mod wildcard;

pub mod directory;
pub mod file;

use std::fmt;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use log::debug;

use crate::disk::directory::{has_wildcards, DirectoryEntry, FileAttributes};
use crate::disk::file::FileBuffer;

pub use self::block::{
    AddressIterator, SectorAddress, SectorDevice, SectorDeviceRef, DATA_BYTES_PER_SECTOR,
    FIRST_DIRECTORY_SECTOR, LINK_SIZE, SECTOR_SIZE, SYSTEM_INFO_SECTOR,
};
pub use self::chain::{ChainIterator, ChainSector, SectorLink};
pub use self::check::{FileSystemCheck, Finding, Severity};
pub use self::container::ImageContainer;
pub use self::cursor::{DirectoryCursor, ImageCursor};
pub use self::dirdisk::{DirectoryDisk, HostCursor};
pub use self::error::{DiskError, ErrorKind};
pub use self::format::format_disk;
pub use self::geometry::{
    bytes_per_sector, sides_for, track0_sector_count, ContainerFormat, Geometry,
};
pub use self::header::{FlxHeader, JvcHeader, SystemInfoRecord};
pub use self::image::Image;
pub use self::image_disk::ImageDisk;
pub use self::info::{ContainerOptions, DiskAttributes};
pub use self::wildcard::Pattern;

/// Disk image types that can be created.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DiskType {
    /// A raw image without header, `*.dsk`.
    Dsk,
    /// An image with a 16 byte FLX header, `*.flx`.
    Flx,
    /// A host directory emulating a FLEX disk.
    Directory,
}

impl DiskType {
    pub fn from_extension<P: AsRef<Path>>(path: P) -> Option<DiskType> {
        const DSK_EXTENSIONS: &[&str] = &["dsk", "wta"];
        const FLX_EXTENSION: &str = "flx";

        let extension = path
            .as_ref()
            .extension()
            .and_then(|s| s.to_str())
            .map(|s| s.to_lowercase())?;
        match &extension[..] {
            FLX_EXTENSION => Some(DiskType::Flx),
            e if DSK_EXTENSIONS.contains(&e) => Some(DiskType::Dsk),
            _ => None,
        }
    }
}

/// Whether file times are transferred between directory entries and file
/// buffers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum FileTimeAccess {
    #[default]
    None,
    Get,
    Set,
    GetSet,
}

impl FileTimeAccess {
    #[inline]
    pub fn has_get(self) -> bool {
        matches!(self, FileTimeAccess::Get | FileTimeAccess::GetSet)
    }

    #[inline]
    pub fn has_set(self) -> bool {
        matches!(self, FileTimeAccess::Set | FileTimeAccess::GetSet)
    }
}

/// Options used when opening a disk.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DiskOptions {
    pub writable: bool,
    /// Hold the whole image in memory and write it back on flush.
    pub ram: bool,
    /// Derive the sector count of track 0 from the directory chain of DSK
    /// images.
    pub track0_only_dir_sectors: bool,
    pub file_time_access: FileTimeAccess,
}

impl Default for DiskOptions {
    fn default() -> DiskOptions {
        DiskOptions {
            writable: false,
            ram: false,
            track0_only_dir_sectors: true,
            file_time_access: FileTimeAccess::None,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FormatOptions {
    /// A file of 256 or 512 bytes holding the boot sectors.
    pub boot_sector: Option<PathBuf>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CheckOptions {
    pub file_time_access: FileTimeAccess,
}

/// Open a disk, regardless of whether it is a DSK or FLX image or a host
/// directory.
pub fn open<P: AsRef<Path>>(path: P, options: &DiskOptions) -> io::Result<Box<dyn FlexDisk>> {
    let path = path.as_ref();
    if path.is_dir() {
        debug!("{}: host directory", path.display());
        return Ok(Box::new(DirectoryDisk::open(path, options)?));
    }
    let container = ImageContainer::open(path, options)?;
    Ok(Box::new(ImageDisk::new(container)))
}

/// Both disk images and host directories implement the `FlexDisk` trait, and
/// all file operations can be performed polymorphically using `FlexDisk` as
/// a trait object.
pub trait FlexDisk {
    /// Sector access to the underlying container.  Host directories refuse
    /// every sector operation.
    fn device(&self) -> SectorDeviceRef;
    fn path(&self) -> &Path;
    /// Whether the disk carries a usable FLEX file system.
    fn is_formatted(&self) -> bool;
    fn is_read_only(&self) -> bool;
    fn file_time_access(&self) -> FileTimeAccess;

    /// Return a cursor over all entries matching `pattern`.
    fn cursor(&self, pattern: &str) -> io::Result<Box<dyn DirectoryCursor>>;

    fn read_file(&self, name: &str) -> io::Result<FileBuffer>;

    /// Create a file from a buffer, using `name` instead of the buffer's
    /// filename if given.
    fn write_file(&mut self, buffer: &FileBuffer, name: Option<&str>) -> io::Result<()>;

    fn attributes(&self) -> io::Result<DiskAttributes>;

    /// The file attributes this disk can represent.
    fn supported_attributes(&self) -> FileAttributes;

    fn flush(&mut self) -> io::Result<()>;

    /// The data records of a random file in sector map order.
    fn read_random_records(&self, name: &str) -> io::Result<Vec<u8>> {
        let _ = name;
        Err(DiskError::Unsupported.into())
    }

    fn check_formatted(&self) -> io::Result<()> {
        if self.is_formatted() {
            Ok(())
        } else {
            Err(DiskError::Unformatted.into())
        }
    }

    fn check_writable(&self) -> io::Result<()> {
        self.check_formatted()?;
        if self.is_read_only() {
            Err(DiskError::ReadOnly.into())
        } else {
            Ok(())
        }
    }

    /// Return a list of all directory entries.
    fn directory(&self) -> io::Result<Vec<DirectoryEntry>> {
        self.check_formatted()?;
        self.cursor("*")?.collect::<io::Result<Vec<_>>>()
    }

    /// Locate the first directory entry matching a pattern.
    fn find_file(&self, pattern: &str) -> io::Result<DirectoryEntry> {
        self.check_formatted()?;
        self.cursor(pattern)?
            .next()
            .unwrap_or_else(|| Err(DiskError::NotFound(pattern.to_string()).into()))
    }

    /// Whether a file of this name exists, ignoring case.
    fn file_exists(&self, name: &str) -> io::Result<bool> {
        match self.find_file(name) {
            Ok(_) => Ok(true),
            Err(ref e) if ErrorKind::of(e) == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Delete all files matching a pattern.
    fn delete_file(&mut self, pattern: &str) -> io::Result<()> {
        self.check_writable()?;
        let mut cursor = self.cursor(pattern)?;
        let mut found = false;
        while let Some(entry) = cursor.next() {
            let entry = entry?;
            debug!("delete {}", entry.total_name());
            cursor.delete_current()?;
            found = true;
        }
        if !found {
            return Err(DiskError::NotFound(pattern.to_string()).into());
        }
        Ok(())
    }

    fn rename_file(&mut self, old_name: &str, new_name: &str) -> io::Result<()> {
        self.check_writable()?;
        for name in [old_name, new_name] {
            if has_wildcards(name) {
                return Err(DiskError::WildcardNotSupported(name.to_string()).into());
            }
        }
        if old_name == new_name {
            return Err(DiskError::SameName(old_name.to_string()).into());
        }
        // Changing the case of a name is allowed.
        if !old_name.eq_ignore_ascii_case(new_name) && self.file_exists(new_name)? {
            return Err(DiskError::FileExists(new_name.to_string()).into());
        }
        let mut cursor = self.cursor(old_name)?;
        match cursor.next() {
            Some(entry) => {
                entry?;
                cursor.rename_current(new_name)
            }
            None => Err(DiskError::NotFound(old_name.to_string()).into()),
        }
    }

    /// Apply `(attributes & !clear) | set` to all files matching a pattern.
    fn set_attributes(
        &mut self,
        pattern: &str,
        set: FileAttributes,
        clear: FileAttributes,
    ) -> io::Result<()> {
        self.check_writable()?;
        let mut cursor = self.cursor(pattern)?;
        while let Some(entry) = cursor.next() {
            let entry = entry?;
            cursor.set_attributes_current(entry.attributes.modify(set, clear))?;
        }
        Ok(())
    }

    /// Copy a file onto another disk.
    fn copy_file(
        &self,
        source_name: &str,
        destination_name: &str,
        destination: &mut dyn FlexDisk,
    ) -> io::Result<()> {
        self.check_formatted()?;
        for name in [source_name, destination_name] {
            if has_wildcards(name) {
                return Err(DiskError::WildcardNotSupported(name.to_string()).into());
            }
        }
        if self.path() == destination.path() && source_name.eq_ignore_ascii_case(destination_name)
        {
            return Err(DiskError::CopyOnItself(source_name.to_string()).into());
        }
        let mut buffer = self.read_file(source_name)?;
        buffer.attributes = buffer
            .attributes
            .restrict(destination.supported_attributes());
        destination.write_file(&buffer, Some(destination_name))
    }

    /// Write a hex dump of all sectors to the provided writer.
    fn dump(&self, writer: &mut dyn Write) -> io::Result<()> {
        self.device().borrow().dump(writer)
    }
}

impl fmt::Display for dyn FlexDisk {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.attributes() {
            Ok(attributes) => write!(f, "{}", attributes),
            Err(e) => write!(f, "Cannot read disk attributes: {}", e),
        }
    }
}
