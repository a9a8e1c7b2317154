//! FLEX directory sectors and the entries they hold.

use std::fmt;
use std::io;
use std::ops::Range;

use chrono::{Datelike, Local, NaiveDate, Timelike};

use crate::disk::block::{SectorAddress, DATA_BYTES_PER_SECTOR};
use crate::disk::error::DiskError;
use crate::disk::header::trimmed;

pub const ENTRY_SIZE: usize = 24;
pub const ENTRIES_PER_SECTOR: usize = 10;
const FIRST_ENTRY_OFFSET: usize = 16;

const DE_EMPTY: u8 = 0x00;
const DE_DELETED: u8 = 0xFF;

pub const BASE_NAME_SIZE: usize = 8;
pub const EXTENSION_SIZE: usize = 3;

const ENTRY_NAME_OFFSET: usize = 0;
const ENTRY_EXTENSION_OFFSET: usize = 8;
const ENTRY_ATTRIBUTES_OFFSET: usize = 11;
const ENTRY_HOUR_OFFSET: usize = 12;
const ENTRY_START_OFFSET: usize = 13;
const ENTRY_END_OFFSET: usize = 15;
const ENTRY_RECORDS_OFFSET: usize = 17;
const ENTRY_SECTOR_MAP_OFFSET: usize = 19;
const ENTRY_MINUTE_OFFSET: usize = 20;
const ENTRY_MONTH_OFFSET: usize = 21;
const ENTRY_DAY_OFFSET: usize = 22;
const ENTRY_YEAR_OFFSET: usize = 23;

const IS_RANDOM_FILE: u8 = 0x02;

/// Byte range of a directory slot within its sector.
#[inline]
pub fn slot_range(index: usize) -> Range<usize> {
    let offset = FIRST_ENTRY_OFFSET + index * ENTRY_SIZE;
    offset..offset + ENTRY_SIZE
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SlotState {
    /// Never used.  No live entries follow.
    Empty,
    /// A tombstone which may be reused.
    Deleted,
    Used,
}

impl SlotState {
    pub fn of(slot: &[u8]) -> SlotState {
        match slot[ENTRY_NAME_OFFSET] {
            DE_EMPTY => SlotState::Empty,
            DE_DELETED => SlotState::Deleted,
            _ => SlotState::Used,
        }
    }
}

/// Mark a directory slot as deleted.
#[inline]
pub fn tombstone(slot: &mut [u8]) {
    slot[ENTRY_NAME_OFFSET] = DE_DELETED;
}

/// The protection flags of a file.
#[derive(Clone, Copy, Default, PartialEq, Eq)]
pub struct FileAttributes(u8);

impl FileAttributes {
    pub const WRITE_PROTECT: FileAttributes = FileAttributes(0x80);
    pub const DELETE_PROTECT: FileAttributes = FileAttributes(0x40);
    pub const READ_PROTECT: FileAttributes = FileAttributes(0x20);
    pub const CATALOG_PROTECT: FileAttributes = FileAttributes(0x10);
    pub const NONE: FileAttributes = FileAttributes(0);
    pub const ALL: FileAttributes = FileAttributes(0xF0);

    const LETTERS: [(char, FileAttributes); 4] = [
        ('W', FileAttributes::WRITE_PROTECT),
        ('D', FileAttributes::DELETE_PROTECT),
        ('R', FileAttributes::READ_PROTECT),
        ('C', FileAttributes::CATALOG_PROTECT),
    ];

    #[inline]
    pub fn from_byte(byte: u8) -> FileAttributes {
        FileAttributes(byte)
    }

    #[inline]
    pub fn to_byte(self) -> u8 {
        self.0
    }

    /// Parse attribute letters such as "WD".
    pub fn from_letters(letters: &str) -> io::Result<FileAttributes> {
        let mut attributes = FileAttributes::NONE;
        for c in letters.chars() {
            let c = c.to_ascii_uppercase();
            match FileAttributes::LETTERS.iter().find(|(letter, _)| *letter == c) {
                Some((_, flag)) => attributes = attributes | *flag,
                None => return Err(DiskError::InvalidPattern(letters.to_string()).into()),
            }
        }
        Ok(attributes)
    }

    #[inline]
    pub fn contains(self, other: FileAttributes) -> bool {
        self.0 & other.0 == other.0
    }

    /// Apply `(self & !clear) | set`.
    #[inline]
    pub fn modify(self, set: FileAttributes, clear: FileAttributes) -> FileAttributes {
        FileAttributes((self.0 & !clear.0) | set.0)
    }

    /// Remove all flags not present in `supported`.
    #[inline]
    pub fn restrict(self, supported: FileAttributes) -> FileAttributes {
        FileAttributes(self.0 & supported.0)
    }
}

impl std::ops::BitOr for FileAttributes {
    type Output = FileAttributes;
    fn bitor(self, other: FileAttributes) -> FileAttributes {
        FileAttributes(self.0 | other.0)
    }
}

impl fmt::Display for FileAttributes {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for (letter, flag) in FileAttributes::LETTERS.iter() {
            if self.contains(*flag) {
                write!(f, "{}", letter)?;
            }
        }
        Ok(())
    }
}

impl fmt::Debug for FileAttributes {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:02X}({})", self.0, self)
    }
}

/// A date as stored by FLEX: day, month and a two digit year.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FlexDate {
    pub day: u8,
    pub month: u8,
    pub year: u8,
}

impl FlexDate {
    pub fn new(day: u8, month: u8, year: u8) -> FlexDate {
        FlexDate { day, month, year }
    }

    pub fn today() -> FlexDate {
        FlexDate::from_naive(Local::now().date_naive())
    }

    pub fn from_naive(date: NaiveDate) -> FlexDate {
        FlexDate {
            day: date.day() as u8,
            month: date.month() as u8,
            year: (date.year().rem_euclid(100)) as u8,
        }
    }

    /// Two digit years below 75 belong to the 21st century.
    pub fn full_year(&self) -> i32 {
        if self.year < 75 {
            2000 + self.year as i32
        } else {
            1900 + self.year as i32
        }
    }

    pub fn to_naive(&self) -> Option<NaiveDate> {
        if self.year > 99 {
            return None;
        }
        NaiveDate::from_ymd_opt(self.full_year(), self.month as u32, self.day as u32)
    }

    #[inline]
    pub fn is_valid(&self) -> bool {
        self.to_naive().is_some()
    }
}

impl fmt::Display for FlexDate {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:04}-{:02}-{:02}", self.full_year(), self.month, self.day)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FlexTime {
    pub hour: u8,
    pub minute: u8,
}

impl FlexTime {
    pub fn new(hour: u8, minute: u8) -> FlexTime {
        FlexTime { hour, minute }
    }

    pub fn now() -> FlexTime {
        let now = Local::now();
        FlexTime::new(now.hour() as u8, now.minute() as u8)
    }

    #[inline]
    pub fn is_valid(&self) -> bool {
        self.hour < 24 && self.minute < 60
    }
}

impl fmt::Display for FlexTime {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

/// The location of a directory entry: its directory sector and slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EntryPosition {
    pub sector: SectorAddress,
    pub index: usize,
}

/// A FLEX directory entry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DirectoryEntry {
    pub name: String,
    pub extension: String,
    pub attributes: FileAttributes,
    pub start: SectorAddress,
    pub end: SectorAddress,
    pub records: u16,
    pub random: bool,
    pub date: FlexDate,
    pub time: FlexTime,
    /// Where the entry was read from, if it lives in a directory sector.
    pub position: Option<EntryPosition>,
}

impl DirectoryEntry {
    pub fn new(total_name: &str) -> io::Result<DirectoryEntry> {
        let (name, extension) = split_name(total_name)?;
        Ok(DirectoryEntry {
            name,
            extension,
            attributes: FileAttributes::NONE,
            start: SectorAddress::NULL,
            end: SectorAddress::NULL,
            records: 0,
            random: false,
            date: FlexDate::default(),
            time: FlexTime::default(),
            position: None,
        })
    }

    /// Parse a used directory slot.  The hour's top bit is ignored.
    pub fn from_bytes(bytes: &[u8], position: Option<EntryPosition>) -> DirectoryEntry {
        assert_eq!(bytes.len(), ENTRY_SIZE);
        DirectoryEntry {
            name: trimmed(&bytes[ENTRY_NAME_OFFSET..ENTRY_NAME_OFFSET + BASE_NAME_SIZE]),
            extension: trimmed(
                &bytes[ENTRY_EXTENSION_OFFSET..ENTRY_EXTENSION_OFFSET + EXTENSION_SIZE],
            ),
            attributes: FileAttributes::from_byte(bytes[ENTRY_ATTRIBUTES_OFFSET]),
            start: SectorAddress::from_bytes(&bytes[ENTRY_START_OFFSET..]),
            end: SectorAddress::from_bytes(&bytes[ENTRY_END_OFFSET..]),
            records: u16::from_be_bytes([
                bytes[ENTRY_RECORDS_OFFSET],
                bytes[ENTRY_RECORDS_OFFSET + 1],
            ]),
            random: bytes[ENTRY_SECTOR_MAP_OFFSET] == IS_RANDOM_FILE,
            date: FlexDate::new(
                bytes[ENTRY_DAY_OFFSET],
                bytes[ENTRY_MONTH_OFFSET],
                bytes[ENTRY_YEAR_OFFSET],
            ),
            time: FlexTime::new(bytes[ENTRY_HOUR_OFFSET] & 0x7F, bytes[ENTRY_MINUTE_OFFSET]),
            position,
        }
    }

    /// Serialize into a directory slot.  Names are stored in uppercase.
    pub fn write_bytes(&self, bytes: &mut [u8]) {
        assert_eq!(bytes.len(), ENTRY_SIZE);
        for b in bytes.iter_mut() {
            *b = 0;
        }
        self.write_name(bytes);
        bytes[ENTRY_ATTRIBUTES_OFFSET] = self.attributes.to_byte();
        bytes[ENTRY_HOUR_OFFSET] = self.time.hour;
        self.start.write_bytes(&mut bytes[ENTRY_START_OFFSET..]);
        self.end.write_bytes(&mut bytes[ENTRY_END_OFFSET..]);
        bytes[ENTRY_RECORDS_OFFSET..ENTRY_RECORDS_OFFSET + 2]
            .copy_from_slice(&self.records.to_be_bytes());
        bytes[ENTRY_SECTOR_MAP_OFFSET] = if self.random { IS_RANDOM_FILE } else { 0 };
        bytes[ENTRY_MINUTE_OFFSET] = self.time.minute;
        bytes[ENTRY_MONTH_OFFSET] = self.date.month;
        bytes[ENTRY_DAY_OFFSET] = self.date.day;
        bytes[ENTRY_YEAR_OFFSET] = self.date.year % 100;
    }

    /// Rewrite only the name fields of a slot.
    pub fn write_name(&self, bytes: &mut [u8]) {
        write_padded(
            &mut bytes[ENTRY_NAME_OFFSET..ENTRY_NAME_OFFSET + BASE_NAME_SIZE],
            &self.name.to_ascii_uppercase(),
        );
        write_padded(
            &mut bytes[ENTRY_EXTENSION_OFFSET..ENTRY_EXTENSION_OFFSET + EXTENSION_SIZE],
            &self.extension.to_ascii_uppercase(),
        );
    }

    /// Overwrite the date fields of a slot.
    pub fn write_date(date: &FlexDate, bytes: &mut [u8]) {
        bytes[ENTRY_MONTH_OFFSET] = date.month;
        bytes[ENTRY_DAY_OFFSET] = date.day;
        bytes[ENTRY_YEAR_OFFSET] = date.year % 100;
    }

    pub fn write_attributes(attributes: FileAttributes, bytes: &mut [u8]) {
        bytes[ENTRY_ATTRIBUTES_OFFSET] = attributes.to_byte();
    }

    /// The file name including its extension, e.g. `CAT.CMD`.
    pub fn total_name(&self) -> String {
        format!("{}.{}", self.name, self.extension)
    }

    /// Number of data bytes held by the file's sectors.
    #[inline]
    pub fn size(&self) -> usize {
        self.records as usize * DATA_BYTES_PER_SECTOR
    }

    #[inline]
    pub fn is_write_protected(&self) -> bool {
        self.attributes.contains(FileAttributes::WRITE_PROTECT)
    }

    #[inline]
    pub fn is_delete_protected(&self) -> bool {
        self.attributes.contains(FileAttributes::DELETE_PROTECT)
    }
}

impl fmt::Display for DirectoryEntry {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{:<12} {:>5} {:4} {} {}..{}{}",
            self.total_name(),
            self.records,
            self.attributes,
            self.date,
            self.start,
            self.end,
            if self.random { " R" } else { "" }
        )
    }
}

fn write_padded(field: &mut [u8], value: &str) {
    for b in field.iter_mut() {
        *b = 0;
    }
    let bytes = value.as_bytes();
    let length = bytes.len().min(field.len());
    field[..length].copy_from_slice(&bytes[..length]);
}

fn is_valid_part(part: &str, max_length: usize) -> bool {
    let mut chars = part.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() => {}
        _ => return false,
    }
    part.len() <= max_length
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// Whether a name follows the FLEX 8.3 pattern (in either case).
pub fn is_valid_name(total_name: &str) -> bool {
    split_name(total_name).is_ok()
}

/// Split a total file name into base name and extension, both uppercase.
pub fn split_name(total_name: &str) -> io::Result<(String, String)> {
    let invalid = || -> io::Error { DiskError::InvalidFilename(total_name.to_string()).into() };
    let (name, extension) = match total_name.split_once('.') {
        Some(parts) => parts,
        None => return Err(invalid()),
    };
    if !is_valid_part(name, BASE_NAME_SIZE) || !is_valid_part(extension, EXTENSION_SIZE) {
        return Err(invalid());
    }
    Ok((name.to_ascii_uppercase(), extension.to_ascii_uppercase()))
}

/// Whether a name contains wildcard characters or is a `;` separated list
/// of patterns.
#[inline]
pub fn has_wildcards(name: &str) -> bool {
    name.contains(|c| matches!(c, '*' | '?' | '[' | ']' | ';'))
}
