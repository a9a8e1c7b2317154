//! Host directories emulating a FLEX disk.  Every regular file with a valid
//! lowercase 8.3 name is one FLEX file.

use std::cell::RefCell;
use std::collections::{HashSet, VecDeque};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::SystemTime;

use chrono::{DateTime, Local, TimeZone, Timelike};
use log::{debug, warn};

use crate::disk::block::{SectorAddress, SectorDevice, SectorDeviceRef, DATA_BYTES_PER_SECTOR};
use crate::disk::cursor::DirectoryCursor;
use crate::disk::directory::{
    has_wildcards, split_name, DirectoryEntry, FileAttributes, FlexDate, FlexTime,
};
use crate::disk::error::DiskError;
use crate::disk::file::FileBuffer;
use crate::disk::geometry::{ContainerFormat, Geometry};
use crate::disk::info::{ContainerOptions, DiskAttributes};
use crate::disk::wildcard::Pattern;
use crate::disk::{DiskOptions, FileTimeAccess, FlexDisk};

/// Lists the random files of a write protected directory, one per line.
const RANDOM_FILE_LIST: &str = "random";
/// Larger files cannot be described by a directory entry.
const MAX_FILE_SIZE: u64 = DATA_BYTES_PER_SECTOR as u64 * 65535;
/// File times written without `FileTimeAccess::Set`.
const DEFAULT_HOUR: u8 = 12;

#[cfg(unix)]
const USER_WRITE: u32 = 0o200;
#[cfg(unix)]
const USER_EXECUTE: u32 = 0o100;

/// The sector device of a host directory.  There are no sectors.
struct HostDevice {
    geometry: Geometry,
}

impl SectorDevice for HostDevice {
    fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    fn is_write_protected(&self) -> bool {
        self.geometry.write_protect
    }

    fn is_flex_format(&self) -> bool {
        false
    }

    fn is_track_valid(&self, _track: u8) -> bool {
        false
    }

    fn is_sector_valid(&self, _address: SectorAddress) -> bool {
        false
    }

    fn bytes_per_sector(&self) -> usize {
        0
    }

    fn read_sector(&self, _address: SectorAddress, _side: Option<u8>) -> io::Result<Vec<u8>> {
        Err(DiskError::Unsupported.into())
    }

    fn write_sector(
        &mut self,
        _address: SectorAddress,
        _side: Option<u8>,
        _data: &[u8],
    ) -> io::Result<()> {
        Err(DiskError::Unsupported.into())
    }

    fn format_sector(
        &mut self,
        _data: &[u8],
        _track: u8,
        _sector: u8,
        _side: u8,
        _size_code: u8,
    ) -> io::Result<()> {
        Err(DiskError::Unsupported.into())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// A host directory presented as a FLEX disk.
pub struct DirectoryDisk {
    device: Rc<RefCell<HostDevice>>,
    path: PathBuf,
    write_protected: bool,
    options: DiskOptions,
}

impl DirectoryDisk {
    pub fn open<P: AsRef<Path>>(path: P, options: &DiskOptions) -> io::Result<DirectoryDisk> {
        let path = path.as_ref();
        let metadata = fs::metadata(path)?;
        if !metadata.is_dir() {
            return Err(DiskError::NotFound(path.display().to_string()).into());
        }
        let write_protected = !options.writable || metadata.permissions().readonly();
        debug!(
            "{}: host directory, write protected: {}",
            path.display(),
            write_protected
        );
        Ok(DirectoryDisk {
            device: Rc::new(RefCell::new(HostDevice {
                geometry: Geometry::directory(write_protected),
            })),
            path: path.to_path_buf(),
            write_protected,
            options: options.clone(),
        })
    }

    /// Create the directory, replacing a regular file of the same name.
    pub fn create<P: AsRef<Path>>(path: P, options: &DiskOptions) -> io::Result<DirectoryDisk> {
        let path = path.as_ref();
        if path.is_file() {
            fs::remove_file(path)?;
        }
        if !path.is_dir() {
            create_directory(path)?;
        }
        let options = DiskOptions {
            writable: true,
            ..options.clone()
        };
        DirectoryDisk::open(path, &options)
    }

    fn host_path(&self, name: &str) -> PathBuf {
        self.path.join(name.to_ascii_lowercase())
    }
}

#[cfg(unix)]
fn create_directory(path: &Path) -> io::Result<()> {
    use std::os::unix::fs::DirBuilderExt;
    fs::DirBuilder::new().mode(0o755).create(path)
}

#[cfg(not(unix))]
fn create_directory(path: &Path) -> io::Result<()> {
    fs::create_dir(path)
}

/// Whether a host filename maps onto a FLEX filename.
fn is_host_name(name: &str) -> bool {
    name != RANDOM_FILE_LIST
        && !name.bytes().any(|b| b.is_ascii_uppercase())
        && split_name(name).is_ok()
}

fn read_random_list(directory: &Path) -> HashSet<String> {
    match fs::read_to_string(directory.join(RANDOM_FILE_LIST)) {
        Ok(list) => list
            .lines()
            .map(|line| line.trim().to_ascii_lowercase())
            .filter(|line| !line.is_empty())
            .collect(),
        Err(_) => HashSet::new(),
    }
}

#[cfg(unix)]
fn mode(metadata: &fs::Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode()
}

fn is_user_writable(metadata: &fs::Metadata) -> bool {
    #[cfg(unix)]
    {
        mode(metadata) & USER_WRITE != 0
    }
    #[cfg(not(unix))]
    {
        !metadata.permissions().readonly()
    }
}

fn set_user_writable(path: &Path, writable: bool) -> io::Result<()> {
    let mut permissions = fs::metadata(path)?.permissions();
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = permissions.mode();
        permissions.set_mode(if writable {
            mode | USER_WRITE
        } else {
            mode & !USER_WRITE
        });
    }
    #[cfg(not(unix))]
    permissions.set_readonly(!writable);
    fs::set_permissions(path, permissions)
}

fn set_random(path: &Path) -> io::Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mut permissions = fs::metadata(path)?.permissions();
        permissions.set_mode(permissions.mode() | USER_EXECUTE);
        fs::set_permissions(path, permissions)
    }
    #[cfg(not(unix))]
    {
        let _ = path;
        Err(DiskError::Unsupported.into())
    }
}

fn local_time(time: SystemTime) -> DateTime<Local> {
    DateTime::<Local>::from(time)
}

fn time_of_day(time: &DateTime<Local>) -> FlexTime {
    FlexTime::new(time.hour() as u8, time.minute() as u8)
}

/// Set the modification time of a host file to the given local date and
/// time.
fn set_file_time(path: &Path, date: &FlexDate, time: &FlexTime) -> io::Result<()> {
    let invalid = || -> io::Error { io::Error::new(io::ErrorKind::InvalidInput, date.to_string()) };
    let naive = date
        .to_naive()
        .and_then(|d| d.and_hms_opt(time.hour as u32, time.minute as u32, 0))
        .ok_or_else(invalid)?;
    let local = Local
        .from_local_datetime(&naive)
        .earliest()
        .ok_or_else(invalid)?;
    fs::File::open(path)?.set_modified(SystemTime::from(local))
}

/// Iterates the files of a host directory.  A pattern without wildcards
/// looks up exactly that file.
pub struct HostCursor {
    directory: PathBuf,
    pattern: Pattern,
    pending: VecDeque<String>,
    random_list: Option<HashSet<String>>,
    file_time_access: FileTimeAccess,
    current: Option<DirectoryEntry>,
}

impl HostCursor {
    pub fn new(
        directory: &Path,
        pattern: Pattern,
        write_protected: bool,
        file_time_access: FileTimeAccess,
    ) -> io::Result<HostCursor> {
        let pending = if has_wildcards(pattern.as_str()) {
            let mut names = fs::read_dir(directory)?
                .filter_map(|dirent| dirent.ok())
                .filter_map(|dirent| dirent.file_name().into_string().ok())
                .collect::<Vec<_>>();
            names.sort();
            names.into()
        } else {
            VecDeque::from(vec![pattern.as_str().to_ascii_lowercase()])
        };
        Ok(HostCursor {
            directory: directory.to_path_buf(),
            pattern,
            pending,
            random_list: if write_protected {
                Some(read_random_list(directory))
            } else {
                None
            },
            file_time_access,
            current: None,
        })
    }

    /// The directory entry of a host file, if it represents a FLEX file.
    fn entry_for(&self, name: &str) -> Option<DirectoryEntry> {
        if !is_host_name(name) || !self.pattern.is_match(name) {
            return None;
        }
        let metadata = fs::metadata(self.directory.join(name)).ok()?;
        if !metadata.is_file() || metadata.len() == 0 || metadata.len() > MAX_FILE_SIZE {
            return None;
        }
        let mut entry = DirectoryEntry::new(name).ok()?;
        entry.records = metadata.len().div_ceil(DATA_BYTES_PER_SECTOR as u64) as u16;
        entry.random = match self.random_list {
            Some(ref list) => list.contains(name),
            None => is_random(&metadata),
        };
        if !is_user_writable(&metadata) {
            entry.attributes = FileAttributes::WRITE_PROTECT;
        }
        if let Ok(modified) = metadata.modified() {
            let local = local_time(modified);
            entry.date = FlexDate::from_naive(local.date_naive());
            if self.file_time_access.has_get() {
                entry.time = time_of_day(&local);
            }
        }
        Some(entry)
    }

    fn current_path(&self) -> io::Result<(PathBuf, &DirectoryEntry)> {
        let entry = self.current.as_ref().ok_or(DiskError::Unpositioned)?;
        let path = self
            .directory
            .join(entry.total_name().to_ascii_lowercase());
        Ok((path, entry))
    }
}

#[cfg(unix)]
fn is_random(metadata: &fs::Metadata) -> bool {
    mode(metadata) & USER_EXECUTE != 0
}

#[cfg(not(unix))]
fn is_random(_metadata: &fs::Metadata) -> bool {
    false
}

impl Iterator for HostCursor {
    type Item = io::Result<DirectoryEntry>;

    fn next(&mut self) -> Option<io::Result<DirectoryEntry>> {
        self.current = None;
        while let Some(name) = self.pending.pop_front() {
            if let Some(entry) = self.entry_for(&name) {
                self.current = Some(entry.clone());
                return Some(Ok(entry));
            }
        }
        None
    }
}

impl DirectoryCursor for HostCursor {
    fn current(&self) -> Option<&DirectoryEntry> {
        self.current.as_ref()
    }

    fn delete_current(&mut self) -> io::Result<()> {
        let (path, entry) = self.current_path()?;
        match fs::remove_file(&path) {
            Ok(()) => {}
            Err(ref e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(DiskError::NotFound(entry.total_name()).into())
            }
            Err(e) => return Err(e),
        }
        debug!("removed {}", path.display());
        self.current = None;
        Ok(())
    }

    fn rename_current(&mut self, new_name: &str) -> io::Result<()> {
        let (name, extension) = split_name(new_name)?;
        let (path, entry) = self.current_path()?;
        let new_path = self.directory.join(new_name.to_ascii_lowercase());
        if new_path != path && new_path.exists() {
            return Err(DiskError::FileExists(new_name.to_string()).into());
        }
        let renamed = DirectoryEntry {
            name,
            extension,
            ..entry.clone()
        };
        fs::rename(&path, &new_path)?;
        self.current = Some(renamed);
        Ok(())
    }

    fn set_date_current(&mut self, date: &FlexDate) -> io::Result<()> {
        let (path, _) = self.current_path()?;
        set_file_time(&path, date, &FlexTime::new(DEFAULT_HOUR, 0))?;
        if let Some(entry) = self.current.as_mut() {
            entry.date = *date;
        }
        Ok(())
    }

    fn set_attributes_current(&mut self, attributes: FileAttributes) -> io::Result<()> {
        let (path, _) = self.current_path()?;
        let attributes = attributes.restrict(FileAttributes::WRITE_PROTECT);
        set_user_writable(&path, !attributes.contains(FileAttributes::WRITE_PROTECT))?;
        if let Some(entry) = self.current.as_mut() {
            entry.attributes = attributes;
        }
        Ok(())
    }
}

#[cfg(unix)]
fn disk_space(path: &Path) -> io::Result<(u64, u64)> {
    use std::ffi::CString;
    use std::os::unix::ffi::OsStrExt;

    let c_path = CString::new(path.as_os_str().as_bytes())
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
    // SAFETY: statvfs only writes into the zeroed struct we pass.
    let mut stat: libc::statvfs = unsafe { std::mem::zeroed() };
    if unsafe { libc::statvfs(c_path.as_ptr(), &mut stat) } != 0 {
        return Err(io::Error::last_os_error());
    }
    let block_size = stat.f_frsize as u64;
    Ok((
        stat.f_bavail as u64 * block_size,
        stat.f_blocks as u64 * block_size,
    ))
}

#[cfg(not(unix))]
fn disk_space(_path: &Path) -> io::Result<(u64, u64)> {
    Err(DiskError::Unsupported.into())
}

impl FlexDisk for DirectoryDisk {
    fn device(&self) -> SectorDeviceRef {
        self.device.clone()
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn is_formatted(&self) -> bool {
        true
    }

    fn is_read_only(&self) -> bool {
        self.write_protected
    }

    fn file_time_access(&self) -> FileTimeAccess {
        self.options.file_time_access
    }

    fn cursor(&self, pattern: &str) -> io::Result<Box<dyn DirectoryCursor>> {
        Ok(Box::new(HostCursor::new(
            &self.path,
            Pattern::new(pattern)?,
            self.write_protected,
            self.options.file_time_access,
        )?))
    }

    fn read_file(&self, name: &str) -> io::Result<FileBuffer> {
        if has_wildcards(name) {
            return Err(DiskError::WildcardNotSupported(name.to_string()).into());
        }
        let entry = self.find_file(name)?;
        let data = fs::read(self.host_path(name))?;
        let mut buffer = FileBuffer::from_entry(&entry, data);
        if !self.options.file_time_access.has_get() {
            buffer.time = FlexTime::default();
        }
        Ok(buffer)
    }

    fn write_file(&mut self, buffer: &FileBuffer, name: Option<&str>) -> io::Result<()> {
        self.check_writable()?;
        let name = name.unwrap_or(buffer.name.as_str());
        split_name(name)?;
        if buffer.is_empty() {
            return Err(DiskError::EmptyFile(name.to_string()).into());
        }
        let path = self.host_path(name);
        if path.is_file() {
            return Err(DiskError::FileExists(name.to_string()).into());
        }
        fs::write(&path, buffer.data())?;
        debug!("wrote {} bytes to {}", buffer.len(), path.display());

        let time = if self.options.file_time_access.has_set() {
            buffer.time
        } else {
            FlexTime::new(DEFAULT_HOUR, 0)
        };
        if let Err(e) = set_file_time(&path, &buffer.date, &time) {
            warn!("unable to set the time of {}: {}", path.display(), e);
        }
        if buffer.attributes.contains(FileAttributes::WRITE_PROTECT) {
            if let Err(e) = set_user_writable(&path, false) {
                warn!("unable to write protect {}: {}", path.display(), e);
            }
        }
        if buffer.random {
            if let Err(e) = set_random(&path) {
                warn!("unable to mark {} as random file: {}", path.display(), e);
            }
        }
        Ok(())
    }

    fn attributes(&self) -> io::Result<DiskAttributes> {
        let metadata = fs::metadata(&self.path)?;
        let date = metadata
            .modified()
            .map(|modified| FlexDate::from_naive(local_time(modified).date_naive()))
            .unwrap_or_default();
        let (free, total) = disk_space(&self.path).unwrap_or_else(|e| {
            warn!("unable to read the disk space of {}: {}", self.path.display(), e);
            (0, 0)
        });
        let name = self
            .path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.display().to_string());
        Ok(DiskAttributes {
            name,
            number: 0,
            date,
            free,
            total,
            tracks: 0,
            sectors: 0,
            sector_size: 0,
            format: ContainerFormat::Directory,
            options: ContainerOptions::default(),
            supported_attributes: self.supported_attributes(),
            write_protected: self.write_protected,
            is_flex_format: true,
            path: self.path.clone(),
            jvc_header: Vec::new(),
        })
    }

    fn supported_attributes(&self) -> FileAttributes {
        FileAttributes::WRITE_PROTECT
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    #[allow(unused_imports)]
    use super::*;
    use crate::disk::ErrorKind;

    fn writable() -> DiskOptions {
        DiskOptions {
            writable: true,
            ..DiskOptions::default()
        }
    }

    fn names(disk: &DirectoryDisk) -> Vec<String> {
        disk.directory()
            .unwrap()
            .iter()
            .map(|e| e.total_name())
            .collect()
    }

    #[test]
    fn test_write_and_read() {
        let dir = tempfile::tempdir().unwrap();
        let mut disk = DirectoryDisk::open(dir.path(), &writable()).unwrap();
        let mut buffer = FileBuffer::new("CAT.CMD", vec![0x55; 600]);
        buffer.date = FlexDate::new(24, 12, 86);
        disk.write_file(&buffer, None).unwrap();

        assert!(dir.path().join("cat.cmd").is_file());
        let entry = disk.find_file("CAT.CMD").unwrap();
        assert_eq!(entry.records, 3);
        assert_eq!(entry.date, FlexDate::new(24, 12, 86));
        assert!(entry.start.is_null() && entry.end.is_null());
        assert!(!entry.random);

        let read = disk.read_file("cat.cmd").unwrap();
        assert_eq!(read.data(), buffer.data());
        assert_eq!(read.time, FlexTime::default());

        let error = disk.write_file(&buffer, None).unwrap_err();
        assert!(error == DiskError::FileExists("CAT.CMD".into()));
        let error = disk
            .write_file(&FileBuffer::new("EMPTY.TXT", vec![]), None)
            .unwrap_err();
        assert!(error == DiskError::EmptyFile("EMPTY.TXT".into()));
        let error = disk
            .write_file(&buffer, Some("1CAT.CMD"))
            .unwrap_err();
        assert_eq!(ErrorKind::of(&error), ErrorKind::InvalidArgument);
    }

    #[test]
    fn test_only_flex_files_are_listed() {
        let dir = tempfile::tempdir().unwrap();
        for name in &["b.txt", "a.cmd", "README", "Upper.txt", "toolongname.txt", "x.toolong"] {
            fs::write(dir.path().join(name), b"data").unwrap();
        }
        fs::write(dir.path().join("empty.txt"), b"").unwrap();
        fs::write(dir.path().join(RANDOM_FILE_LIST), b"b.txt\n").unwrap();
        fs::create_dir(dir.path().join("sub.dir")).unwrap();

        let disk = DirectoryDisk::open(dir.path(), &writable()).unwrap();
        assert_eq!(names(&disk), vec!["A.CMD", "B.TXT"]);
        let cursor = disk.cursor("*.TXT;*.CMD").unwrap();
        assert_eq!(cursor.count(), 2);
        assert!(!disk.file_exists("README").unwrap());
        assert!(!disk.file_exists("SUB.DIR").unwrap());
        assert!(disk.file_exists("a.cmd").unwrap());
    }

    #[test]
    fn test_random_list_on_write_protected_directory() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("index.dat"), vec![0u8; 1000]).unwrap();
        fs::write(dir.path().join("plain.txt"), b"x").unwrap();
        fs::write(dir.path().join(RANDOM_FILE_LIST), b"index.dat\n").unwrap();

        let disk = DirectoryDisk::open(dir.path(), &DiskOptions::default()).unwrap();
        assert!(disk.is_read_only());
        assert!(disk.find_file("INDEX.DAT").unwrap().random);
        assert!(!disk.find_file("PLAIN.TXT").unwrap().random);
    }

    #[cfg(unix)]
    #[test]
    fn test_permission_bits() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let mut disk = DirectoryDisk::open(dir.path(), &writable()).unwrap();
        let mut buffer = FileBuffer::new_random("INDEX.DAT", &[1u8; 300]);
        buffer.attributes = FileAttributes::WRITE_PROTECT;
        disk.write_file(&buffer, None).unwrap();

        let path = dir.path().join("index.dat");
        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_ne!(mode & USER_EXECUTE, 0);
        assert_eq!(mode & USER_WRITE, 0);
        let entry = disk.find_file("INDEX.DAT").unwrap();
        assert!(entry.random);
        assert_eq!(entry.attributes, FileAttributes::WRITE_PROTECT);

        disk.set_attributes("*.DAT", FileAttributes::NONE, FileAttributes::WRITE_PROTECT)
            .unwrap();
        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_ne!(mode & USER_WRITE, 0);
        assert_eq!(disk.find_file("INDEX.DAT").unwrap().attributes, FileAttributes::NONE);
    }

    #[test]
    fn test_delete_and_rename() {
        let dir = tempfile::tempdir().unwrap();
        let mut disk = DirectoryDisk::open(dir.path(), &writable()).unwrap();
        for name in &["TEST01.TXT", "TEST02.TXT", "CAT.CMD"] {
            disk.write_file(&FileBuffer::new(name, vec![1; 10]), None)
                .unwrap();
        }
        disk.delete_file("TEST0?.TXT").unwrap();
        assert_eq!(names(&disk), vec!["CAT.CMD"]);
        let error = disk.delete_file("TEST01.TXT").unwrap_err();
        assert!(error == DiskError::NotFound("TEST01.TXT".into()));

        disk.rename_file("CAT.CMD", "DOG.CMD").unwrap();
        assert!(dir.path().join("dog.cmd").is_file());
        assert!(!dir.path().join("cat.cmd").exists());
        disk.write_file(&FileBuffer::new("CAT.CMD", vec![2]), None)
            .unwrap();
        let error = disk.rename_file("CAT.CMD", "DOG.CMD").unwrap_err();
        assert!(error == DiskError::FileExists("DOG.CMD".into()));
    }

    #[test]
    fn test_set_date() {
        let dir = tempfile::tempdir().unwrap();
        let mut disk = DirectoryDisk::open(dir.path(), &writable()).unwrap();
        disk.write_file(&FileBuffer::new("A.TXT", vec![1]), None)
            .unwrap();
        let mut cursor = disk.cursor("A.TXT").unwrap();
        cursor.next().unwrap().unwrap();
        cursor.set_date_current(&FlexDate::new(1, 7, 92)).unwrap();
        assert_eq!(disk.find_file("A.TXT").unwrap().date, FlexDate::new(1, 7, 92));
    }

    #[test]
    fn test_create_replaces_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("flexdisk");
        fs::write(&path, b"not a directory").unwrap();
        let disk = DirectoryDisk::create(&path, &DiskOptions::default()).unwrap();
        assert!(path.is_dir());
        assert!(!disk.is_read_only());
        assert!(disk.directory().unwrap().is_empty());
    }

    #[test]
    fn test_attributes_and_sectors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("work");
        let disk = DirectoryDisk::create(&path, &DiskOptions::default()).unwrap();
        let attributes = disk.attributes().unwrap();
        assert_eq!(attributes.name, "work");
        assert_eq!(attributes.format, ContainerFormat::Directory);
        assert_eq!(attributes.supported_attributes.to_string(), "W");
        assert_eq!(attributes.tracks, 0);
        assert!(attributes.date.is_valid());

        let device = disk.device();
        let error = device
            .borrow()
            .read_sector(SectorAddress::new(0, 3), None)
            .unwrap_err();
        assert!(error == DiskError::Unsupported);
        assert!(!device.borrow().is_flex_format());
        let error = disk.read_random_records("A.TXT").unwrap_err();
        assert!(error == DiskError::Unsupported);
    }

    #[test]
    fn test_dump_without_sectors() {
        let dir = tempfile::tempdir().unwrap();
        let disk = DirectoryDisk::open(dir.path(), &DiskOptions::default()).unwrap();
        let mut output = Vec::new();
        disk.dump(&mut output).unwrap();
        assert!(output.is_empty());
    }
}
