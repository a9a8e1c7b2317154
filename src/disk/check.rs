//! Consistency checking of FLEX file systems.
//!
//! The checker never trusts the allocation information of a disk.  It reads
//! the link header of every sector, then walks the directory, the free chain
//! and every file, assigning each sector to the first item that reaches it.
//! Whatever remains unassigned on tracks 1 and above is reported as lost.
//! Like the directory listing, this is a read-only operation.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt;
use std::io::{self, Write};

use log::debug;

use crate::disk::block::{SectorAddress, SectorDevice, FIRST_DIRECTORY_SECTOR};
use crate::disk::chain::SectorLink;
use crate::disk::directory::{
    slot_range, DirectoryEntry, FlexDate, FlexTime, SlotState, BASE_NAME_SIZE,
    ENTRIES_PER_SECTOR, EXTENSION_SIZE,
};
use crate::disk::header::SystemInfoRecord;
use crate::disk::{CheckOptions, FileTimeAccess};

const DISK_ITEM_NAME: &str = "The disk";
const DIRECTORY_ITEM_NAME: &str = "Directory";
const FREE_CHAIN_ITEM_NAME: &str = "Free Chain";
const UNKNOWN_ITEM_NAME: &str = "unknown";

/// Number of sector addresses per line in the chain section of
/// `debug_dump()`.
const ADDRESSES_PER_LINE: usize = 12;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl Severity {
    fn prefix(self) -> char {
        match self {
            Severity::Info => 'I',
            Severity::Warning => 'W',
            Severity::Error => 'E',
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match *self {
            Severity::Info => "Info",
            Severity::Warning => "Warning",
            Severity::Error => "Error",
        })
    }
}

/// An inconsistency found by `FileSystemCheck::check_file_system()`.
/// `item` is the name of the file or structure the finding belongs to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Finding {
    BadDate {
        item: String,
    },
    BadTime {
        item: String,
    },
    /// A directory entry without any sectors.
    NullFile {
        item: String,
    },
    InconsistentRecordSize {
        item: String,
        records: u32,
        sectors: u32,
    },
    /// The first sector of an item is also the target of a link.
    LinkAndFileInput {
        item: String,
        address: SectorAddress,
    },
    BadStart {
        item: String,
        address: SectorAddress,
    },
    /// The last sector of an item still links to another sector.
    LinkAfterEnd {
        item: String,
        address: SectorAddress,
        to: SectorAddress,
        severity: Severity,
    },
    BadEnd {
        item: String,
        address: SectorAddress,
    },
    /// The chain of a file stopped at `address` before reaching the end
    /// noted in its directory entry.
    UnexpectedEnd {
        item: String,
        address: SectorAddress,
    },
    LostSectors {
        item: String,
        start: SectorAddress,
        sectors: u32,
    },
    /// Sector `from` links to the invalid or unreadable sector `to`.
    BadLink {
        item: String,
        from: SectorAddress,
        to: SectorAddress,
        severity: Severity,
    },
    MultipleLinkInputs {
        item: String,
        address: SectorAddress,
        from: Vec<SectorAddress>,
    },
    HasCycle {
        item: String,
        from: SectorAddress,
        back_to: SectorAddress,
    },
    DiscontiguousRecordNr {
        item: String,
        address: SectorAddress,
        expected: u16,
        actual: u16,
    },
}

impl Finding {
    pub fn severity(&self) -> Severity {
        use self::Finding::*;
        match *self {
            BadDate { .. } | BadTime { .. } | NullFile { .. } | LostSectors { .. } => {
                Severity::Info
            }
            InconsistentRecordSize { .. } | DiscontiguousRecordNr { .. } => Severity::Warning,
            LinkAfterEnd { severity, .. } | BadLink { severity, .. } => severity,
            LinkAndFileInput { .. }
            | BadStart { .. }
            | BadEnd { .. }
            | UnexpectedEnd { .. }
            | MultipleLinkInputs { .. }
            | HasCycle { .. } => Severity::Error,
        }
    }

    /// A short code identifying the kind of finding.
    pub fn code(&self) -> &'static str {
        use self::Finding::*;
        match *self {
            BadDate { .. } => "BADDAT",
            BadTime { .. } => "BADTIM",
            NullFile { .. } => "NULLF",
            InconsistentRecordSize { .. } => "SIZE",
            LinkAndFileInput { .. } => "MULINF",
            BadStart { .. } => "BADSTA",
            LinkAfterEnd { .. } => "ENDL",
            BadEnd { .. } => "BADEND",
            UnexpectedEnd { .. } => "UXEND",
            LostSectors { .. } => "LOST",
            BadLink { .. } => "BADLNK",
            MultipleLinkInputs { .. } => "MULIN",
            HasCycle { .. } => "CYCLE",
            DiscontiguousRecordNr { .. } => "RECNR",
        }
    }

    pub fn item(&self) -> &str {
        use self::Finding::*;
        match *self {
            BadDate { ref item }
            | BadTime { ref item }
            | NullFile { ref item }
            | InconsistentRecordSize { ref item, .. }
            | LinkAndFileInput { ref item, .. }
            | BadStart { ref item, .. }
            | LinkAfterEnd { ref item, .. }
            | BadEnd { ref item, .. }
            | UnexpectedEnd { ref item, .. }
            | LostSectors { ref item, .. }
            | BadLink { ref item, .. }
            | MultipleLinkInputs { ref item, .. }
            | HasCycle { ref item, .. }
            | DiscontiguousRecordNr { ref item, .. } => item,
        }
    }
}

impl fmt::Display for Finding {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use self::Finding::*;
        write!(
            f,
            "{}-{:<6} {}: ",
            self.severity().prefix(),
            self.code(),
            self.item()
        )?;
        match *self {
            BadDate { .. } => f.write_str("invalid date"),
            BadTime { .. } => f.write_str("invalid time"),
            NullFile { .. } => f.write_str("file has no sectors"),
            InconsistentRecordSize {
                records, sectors, ..
            } => write!(f, "{} records but {} sectors", records, sectors),
            LinkAndFileInput { address, .. } => {
                write!(f, "start sector {} is also a link target", address)
            }
            BadStart { address, .. } => write!(f, "invalid start sector {}", address),
            LinkAfterEnd { address, to, .. } => {
                write!(f, "end sector {} links to {}", address, to)
            }
            BadEnd { address, .. } => write!(f, "invalid end sector {}", address),
            UnexpectedEnd { address, .. } => write!(f, "chain ends early at {}", address),
            LostSectors { start, sectors, .. } => {
                write!(f, "{} sector(s) starting at {}", sectors, start)
            }
            BadLink { from, to, .. } => write!(f, "sector {} links to invalid {}", from, to),
            MultipleLinkInputs {
                address, ref from, ..
            } => write!(
                f,
                "sector {} is linked from {}",
                address,
                SectorAddress::format_addresses(from)
            ),
            HasCycle { from, back_to, .. } => {
                write!(f, "sector {} links back to {}", from, back_to)
            }
            DiscontiguousRecordNr {
                address,
                expected,
                actual,
                ..
            } => write!(
                f,
                "sector {} has record number {}, expected {}",
                address, actual, expected
            ),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
enum SectorType {
    #[default]
    NotAssigned,
    System,
    Directory,
    Free,
    File,
    Lost,
}

impl SectorType {
    fn tag(self) -> char {
        match self {
            SectorType::NotAssigned => '-',
            SectorType::System => 'S',
            SectorType::Directory => 'D',
            SectorType::Free => 'F',
            SectorType::File => 'f',
            SectorType::Lost => 'L',
        }
    }
}

/// What the checker knows about a single sector.
#[derive(Clone, Debug, Default)]
struct Link {
    kind: SectorType,
    to: SectorAddress,
    /// Sectors found linking to this one.
    from: BTreeSet<SectorAddress>,
    /// Index of the owning item.
    item: Option<usize>,
    record_nr: u16,
    expected_record_nr: u16,
    is_bad: bool,
    has_cycle: bool,
}

impl Link {
    fn bad(kind: SectorType) -> Link {
        Link {
            kind,
            is_bad: true,
            ..Link::default()
        }
    }
}

/// A chain of sectors: the directory, the free chain, a file or a run of
/// lost sectors.
#[derive(Clone, Debug)]
struct Item {
    kind: SectorType,
    name: String,
    start: SectorAddress,
    end: SectorAddress,
    unexpected_end: SectorAddress,
    records: u32,
    sectors: u32,
    random: bool,
    date: FlexDate,
    time: FlexTime,
    chain: Vec<SectorAddress>,
}

impl Item {
    fn new(kind: SectorType, name: String, start: SectorAddress, end: SectorAddress) -> Item {
        Item {
            kind,
            name,
            start,
            end,
            unexpected_end: SectorAddress::NULL,
            records: 0,
            sectors: 0,
            random: false,
            date: FlexDate::default(),
            time: FlexTime::default(),
            chain: vec![],
        }
    }

    /// The record number the next sector of this item should carry.
    fn expected_record_nr(&self) -> u16 {
        match self.kind {
            SectorType::File if self.random => {
                // The two sector map sectors are not numbered.
                if self.sectors < 2 {
                    0
                } else {
                    (self.sectors - 1) as u16
                }
            }
            SectorType::File => (self.sectors + 1) as u16,
            _ => 0,
        }
    }
}

/// A lowercase `name.ext` built from the raw name fields of a directory
/// entry.  Unprintable bytes are shown as `\xNN`.
fn item_name(slot: &[u8]) -> String {
    fn push_part(name: &mut String, bytes: &[u8]) {
        for &b in bytes.iter().take_while(|&&b| b != 0) {
            if b.is_ascii_graphic() || b == b' ' {
                name.push(b.to_ascii_lowercase() as char);
            } else {
                name.push_str(&format!("\\x{:02X}", b));
            }
        }
    }

    let mut name = String::new();
    push_part(&mut name, &slot[..BASE_NAME_SIZE]);
    name.push('.');
    push_part(&mut name, &slot[BASE_NAME_SIZE..BASE_NAME_SIZE + EXTENSION_SIZE]);
    name
}

/// Rebuilds the sector ownership of a FLEX disk and reports every
/// inconsistency found.
pub struct FileSystemCheck<'a> {
    device: &'a dyn SectorDevice,
    options: CheckOptions,
    links: BTreeMap<SectorAddress, Link>,
    items: Vec<Item>,
    findings: Vec<Finding>,
    disk_date: FlexDate,
}

impl<'a> FileSystemCheck<'a> {
    pub fn new(device: &'a dyn SectorDevice, options: CheckOptions) -> FileSystemCheck<'a> {
        FileSystemCheck {
            device,
            options,
            links: BTreeMap::new(),
            items: vec![],
            findings: vec![],
            disk_date: FlexDate::default(),
        }
    }

    /// Run all checks and return whether the file system is consistent.
    /// Only an unreadable system information record is an error; corrupt
    /// content is reported through `findings()`.
    pub fn check_file_system(&mut self) -> io::Result<bool> {
        self.links.clear();
        self.items.clear();
        self.findings.clear();

        let sir = SystemInfoRecord::read(self.device)?;
        self.initialize_links(&sir);
        self.initialize_items(&sir);
        debug!(
            "checking {} sectors, {} items",
            self.links.len(),
            self.items.len()
        );

        self.check_disk();
        self.check_links();
        self.check_items();
        self.check_lost_sectors();
        Ok(self.is_valid())
    }

    #[inline]
    pub fn is_valid(&self) -> bool {
        self.findings.is_empty()
    }

    /// Findings in the order disk, links, items, lost sectors.
    pub fn findings(&self) -> &[Finding] {
        &self.findings
    }

    /// Whether a sector can be the target of a link.  The boot sectors, the
    /// system information record and sector 00-04 can not.
    fn is_valid_address(&self, address: SectorAddress) -> bool {
        self.device.is_track_valid(address.track)
            && self.device.is_sector_valid(address)
            && (address.track != 0 || address.sector >= FIRST_DIRECTORY_SECTOR.sector)
    }

    fn initialize_links(&mut self, sir: &SystemInfoRecord) {
        let tracks = sir.tracks();
        let sectors = sir.sectors();
        for track in 0..tracks {
            for sector in 1..=sectors {
                let address = SectorAddress::new(track as u8, sector as u8);
                let link = if !self.is_valid_address(address) {
                    if address.track == 0 && address.sector < FIRST_DIRECTORY_SECTOR.sector {
                        Link::bad(SectorType::System)
                    } else {
                        Link::bad(SectorType::NotAssigned)
                    }
                } else {
                    match self.device.read_sector(address, None) {
                        Ok(data) => {
                            let header = SectorLink::from_bytes(&data);
                            Link {
                                to: header.next,
                                record_nr: header.record_nr,
                                ..Link::default()
                            }
                        }
                        Err(e) => {
                            debug!("sector {} unreadable: {}", address, e);
                            Link::bad(SectorType::NotAssigned)
                        }
                    }
                };
                self.links.insert(address, link);
            }
        }
    }

    fn initialize_items(&mut self, sir: &SystemInfoRecord) {
        let directory = Item::new(
            SectorType::Directory,
            DIRECTORY_ITEM_NAME.to_string(),
            FIRST_DIRECTORY_SECTOR,
            SectorAddress::NULL,
        );
        self.add_item(directory);

        self.disk_date = sir.date();
        let mut free_chain = Item::new(
            SectorType::Free,
            FREE_CHAIN_ITEM_NAME.to_string(),
            sir.fc_start,
            sir.fc_end,
        );
        free_chain.records = sir.free as u32;
        free_chain.date = self.disk_date;
        self.add_item(free_chain);

        for file in self.directory_items() {
            self.add_item(file);
        }

        self.add_lost_items();
    }

    /// An item for every live directory entry.  The directory is read
    /// directly so that entries with unusual names are seen as they are.
    fn directory_items(&mut self) -> Vec<Item> {
        let mut files = vec![];
        let mut visited = HashSet::new();
        let mut address = FIRST_DIRECTORY_SECTOR;
        'sectors: while !address.is_null() && visited.insert(address) {
            if !self.is_valid_address(address) {
                break;
            }
            let sector = match self.device.read_sector(address, None) {
                Ok(sector) => sector,
                Err(e) => {
                    debug!("directory sector {} unreadable: {}", address, e);
                    self.links.entry(address).or_default().is_bad = true;
                    break;
                }
            };
            for index in 0..ENTRIES_PER_SECTOR {
                let slot = &sector[slot_range(index)];
                match SlotState::of(slot) {
                    SlotState::Empty => break 'sectors,
                    SlotState::Deleted => continue,
                    SlotState::Used => {}
                }
                let entry = DirectoryEntry::from_bytes(slot, None);
                let mut file =
                    Item::new(SectorType::File, item_name(slot), entry.start, entry.end);
                file.records = entry.records as u32;
                file.random = entry.random;
                file.date = entry.date;
                file.time = entry.time;
                files.push(file);
            }
            address = SectorLink::from_bytes(&sector).next;
        }
        files
    }

    /// Seed an item for each unassigned run of sectors nobody links to.
    fn add_lost_items(&mut self) {
        let candidates = self
            .links
            .iter()
            .filter(|&(address, link)| {
                address.track != 0 && link.kind == SectorType::NotAssigned && !link.is_bad
            })
            .map(|(&address, link)| (address, link.to))
            .collect::<Vec<_>>();

        for &(address, to) in &candidates {
            if self.is_valid_address(to) {
                if let Some(link) = self.links.get_mut(&to) {
                    link.from.insert(address);
                }
            }
        }

        let mut count = 0;
        for (address, _) in candidates {
            let is_seed = self
                .links
                .get(&address)
                .map(|link| link.kind == SectorType::NotAssigned && link.from.is_empty())
                .unwrap_or(false);
            if is_seed {
                count += 1;
                let lost = Item::new(
                    SectorType::Lost,
                    format!("Lost{}", count),
                    address,
                    SectorAddress::NULL,
                );
                self.add_item(lost);
            }
        }
    }

    /// Walk the chain of an item, claiming every unassigned sector.
    fn add_item(&mut self, mut item: Item) {
        let index = self.items.len();
        let has_end = !item.end.is_null();
        let mut visited = HashSet::new();
        let mut previous = SectorAddress::NULL;
        let mut current = item.start;

        while !current.is_null() {
            let invalid = !self.is_valid_address(current);
            let link = self.links.entry(current).or_default();
            link.is_bad |= invalid;
            if link.kind == SectorType::Lost && link.item.is_some() {
                current = SectorAddress::NULL;
                break;
            }
            if link.kind == SectorType::NotAssigned {
                link.kind = item.kind;
                link.item = Some(index);
                link.expected_record_nr = item.expected_record_nr();
            }
            if !previous.is_null() {
                link.from.insert(previous);
            }
            let (is_bad, to) = (link.is_bad, link.to);

            if !visited.insert(current) {
                if let Some(previous_link) = self.links.get_mut(&previous) {
                    previous_link.has_cycle = true;
                }
                current = SectorAddress::NULL;
                break;
            }
            item.sectors += 1;
            item.chain.push(current);

            if has_end && current == item.end {
                break;
            }
            if is_bad {
                if has_end {
                    item.unexpected_end = current;
                } else {
                    item.end = current;
                }
                break;
            }
            previous = current;
            current = to;
        }

        if current.is_null() {
            if has_end {
                if previous != item.end {
                    item.unexpected_end = previous;
                }
            } else {
                item.end = previous;
            }
        }
        if item.records == 0 {
            item.records = item.sectors;
        }
        self.items.push(item);
    }

    fn owner_name(&self, link: &Link) -> &str {
        link.item
            .and_then(|index| self.items.get(index))
            .map(|item| item.name.as_str())
            .unwrap_or(UNKNOWN_ITEM_NAME)
    }

    fn check_disk(&mut self) {
        if !self.disk_date.is_valid() {
            self.findings.push(Finding::BadDate {
                item: DISK_ITEM_NAME.to_string(),
            });
        }
    }

    fn check_links(&mut self) {
        let mut findings = vec![];
        for (&address, link) in &self.links {
            if link.is_bad {
                for from in &link.from {
                    let predecessor = self.links.get(from);
                    let severity = match predecessor.map(|l| l.kind) {
                        Some(SectorType::Free) | Some(SectorType::Lost) => Severity::Warning,
                        _ => Severity::Error,
                    };
                    let item = if link.item.is_some() {
                        self.owner_name(link)
                    } else {
                        predecessor
                            .map(|l| self.owner_name(l))
                            .unwrap_or(UNKNOWN_ITEM_NAME)
                    };
                    findings.push(Finding::BadLink {
                        item: item.to_string(),
                        from: *from,
                        to: address,
                        severity,
                    });
                }
            }
            if link.item.is_some() && link.from.len() > 1 {
                findings.push(Finding::MultipleLinkInputs {
                    item: self.owner_name(link).to_string(),
                    address,
                    from: link.from.iter().cloned().collect(),
                });
            }
            if link.has_cycle {
                findings.push(Finding::HasCycle {
                    item: self.owner_name(link).to_string(),
                    from: address,
                    back_to: link.to,
                });
            }
            if !link.is_bad
                && link.kind == SectorType::File
                && link.record_nr != link.expected_record_nr
            {
                findings.push(Finding::DiscontiguousRecordNr {
                    item: self.owner_name(link).to_string(),
                    address,
                    expected: link.expected_record_nr,
                    actual: link.record_nr,
                });
            }
        }
        self.findings.extend(findings);
    }

    fn check_items(&mut self) {
        let mut findings = vec![];
        for item in &self.items {
            let name = || item.name.clone();
            let is_file = item.kind == SectorType::File;

            if is_file && !item.date.is_valid() {
                findings.push(Finding::BadDate { item: name() });
            }
            if is_file
                && self.options.file_time_access != FileTimeAccess::None
                && !item.time.is_valid() {
                findings.push(Finding::BadTime { item: name() });
            }
            if item.kind != SectorType::Free && item.start.is_null() && item.end.is_null() {
                findings.push(Finding::NullFile { item: name() });
                continue;
            }
            if item.records != item.sectors {
                findings.push(Finding::InconsistentRecordSize {
                    item: name(),
                    records: item.records,
                    sectors: item.sectors,
                });
            }

            // An empty free chain has neither start nor end.
            let empty_free_chain = item.kind == SectorType::Free && item.start.is_null();
            let start_is_valid = self.is_valid_address(item.start);
            if start_is_valid {
                if let Some(link) = self.links.get(&item.start) {
                    if !link.from.is_empty() {
                        findings.push(Finding::LinkAndFileInput {
                            item: name(),
                            address: item.start,
                        });
                    }
                }
            } else if !empty_free_chain {
                findings.push(Finding::BadStart {
                    item: name(),
                    address: item.start,
                });
            }

            if self.is_valid_address(item.end) {
                if let Some(link) = self.links.get(&item.end) {
                    if !link.to.is_null() {
                        let severity = match link.kind {
                            SectorType::Free | SectorType::Lost => Severity::Warning,
                            _ => Severity::Error,
                        };
                        findings.push(Finding::LinkAfterEnd {
                            item: name(),
                            address: item.end,
                            to: link.to,
                            severity,
                        });
                    }
                }
            } else if !empty_free_chain {
                findings.push(Finding::BadEnd {
                    item: name(),
                    address: item.end,
                });
            }

            if is_file && start_is_valid && !item.unexpected_end.is_null() {
                findings.push(Finding::UnexpectedEnd {
                    item: name(),
                    address: item.unexpected_end,
                });
            }
        }
        self.findings.extend(findings);
    }

    fn check_lost_sectors(&mut self) {
        let lost = self
            .items
            .iter()
            .filter(|item| item.kind == SectorType::Lost)
            .map(|item| Finding::LostSectors {
                item: item.name.clone(),
                start: item.start,
                sectors: item.sectors,
            })
            .collect::<Vec<_>>();
        self.findings.extend(lost);
    }

    /// Write the items, the per-sector links and the sector chains of the
    /// last check.
    pub fn debug_dump(&self, writer: &mut dyn Write) -> io::Result<()> {
        writeln!(writer, "******** I T E M S ********")?;
        for (index, item) in self.items.iter().enumerate() {
            writeln!(
                writer,
                "{:4} {} {:<16} {}..{} records={} sectors={}{}{}",
                index,
                item.kind.tag(),
                item.name,
                item.start,
                item.end,
                item.records,
                item.sectors,
                if item.random { " random" } else { "" },
                if item.unexpected_end.is_null() {
                    String::new()
                } else {
                    format!(" unexpected end {}", item.unexpected_end)
                }
            )?;
        }

        writeln!(writer, "******** L I N K S ********")?;
        for (address, link) in &self.links {
            let item = link
                .item
                .map(|index| index.to_string())
                .unwrap_or_else(|| "-".to_string());
            writeln!(
                writer,
                "{} -> {} {} item={:<4} rec={:<5} exp={:<5} from=[{}]{}{}",
                address,
                link.to,
                link.kind.tag(),
                item,
                link.record_nr,
                link.expected_record_nr,
                link.from
                    .iter()
                    .map(|a| a.to_string())
                    .collect::<Vec<_>>()
                    .join(" "),
                if link.is_bad { " bad" } else { "" },
                if link.has_cycle { " cycle" } else { "" }
            )?;
        }

        writeln!(writer, "******** I T E M   C H A I N S ********")?;
        for item in &self.items {
            writeln!(writer, "{}:", item.name)?;
            for line in item.chain.chunks(ADDRESSES_PER_LINE) {
                let line = line
                    .iter()
                    .map(|address| {
                        let bad = self.links.get(address).map(|l| l.is_bad).unwrap_or(true);
                        format!("{}{}", address, if bad { "*" } else { " " })
                    })
                    .collect::<Vec<_>>()
                    .join(" ");
                writeln!(writer, "    {}", line.trim_end())?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    #[allow(unused_imports)]
    use super::*;
    use crate::disk::file::FileBuffer;
    use crate::disk::{
        DiskOptions, DiskType, FlexDisk, FormatOptions, ImageContainer,
        ImageDisk,
    };

    fn disk_with_file() -> ImageDisk {
        let _ = env_logger::builder().is_test(true).try_init();
        let options = DiskOptions {
            writable: true,
            ..DiskOptions::default()
        };
        let container = ImageContainer::create_memory(
            "test",
            35,
            10,
            DiskType::Dsk,
            &FormatOptions::default(),
            &options,
        )
        .unwrap();
        let mut disk = ImageDisk::new(container);
        disk.write_file(&FileBuffer::new("CAT.CMD", vec![0x55; 700]), None)
            .unwrap();
        disk
    }

    fn modify_sector<F: FnOnce(&mut Vec<u8>)>(disk: &ImageDisk, address: SectorAddress, f: F) {
        let device = disk.device();
        let mut sector = device.borrow().read_sector(address, None).unwrap();
        f(&mut sector);
        device
            .borrow_mut()
            .write_sector(address, None, &sector)
            .unwrap();
    }

    fn modify_sir<F: FnOnce(&mut SystemInfoRecord)>(disk: &ImageDisk, f: F) {
        let device = disk.device();
        let mut sir = SystemInfoRecord::read(&*device.borrow()).unwrap();
        f(&mut sir);
        sir.write(&mut *device.borrow_mut()).unwrap();
    }

    fn check_with(disk: &ImageDisk, options: CheckOptions) -> Vec<Finding> {
        let device = disk.device();
        let device = device.borrow();
        let mut checker = FileSystemCheck::new(&*device, options);
        let valid = checker.check_file_system().unwrap();
        assert_eq!(valid, checker.findings().is_empty());
        let findings = checker.findings().to_vec();
        findings
    }

    fn check(disk: &ImageDisk) -> Vec<Finding> {
        check_with(disk, CheckOptions::default())
    }

    #[test]
    fn test_valid_disk() {
        let mut disk = disk_with_file();
        assert_eq!(check(&disk), vec![]);

        disk.write_file(&FileBuffer::new("TEST01.TXT", vec![1; 2000]), None)
            .unwrap();
        disk.write_file(&FileBuffer::new_random("DATA.DAT", &[7; 252 * 5]), None)
            .unwrap();
        disk.write_file(&FileBuffer::new("TEST02.TXT", vec![2; 300]), None)
            .unwrap();
        disk.delete_file("TEST01.TXT").unwrap();
        disk.write_file(&FileBuffer::new("TEST03.TXT", vec![3; 5000]), None)
            .unwrap();
        assert_eq!(check(&disk), vec![]);
    }

    #[test]
    fn test_check_is_repeatable() {
        let disk = disk_with_file();
        modify_sector(&disk, SectorAddress::new(1, 3), |s| s[3] = 4);
        let device = disk.device();
        let device = device.borrow();
        let mut checker = FileSystemCheck::new(&*device, CheckOptions::default());
        assert!(!checker.check_file_system().unwrap());
        let first = checker.findings().to_vec();
        assert!(!checker.check_file_system().unwrap());
        assert_eq!(checker.findings(), &first[..]);
        assert_eq!(first.len(), 1);
    }

    #[test]
    fn test_null_file() {
        let disk = disk_with_file();
        modify_sector(&disk, FIRST_DIRECTORY_SECTOR, |s| {
            let slot = &mut s[slot_range(1)];
            slot[0] = b'F';
            slot[8] = b'E';
            slot[21] = 11;
            slot[22] = 5;
            slot[23] = 80;
        });
        let findings = check(&disk);
        assert_eq!(
            findings,
            vec![Finding::NullFile {
                item: "f.e".to_string()
            }]
        );
        assert_eq!(findings[0].severity(), Severity::Info);
    }

    #[test]
    fn test_bad_start() {
        let disk = disk_with_file();
        modify_sector(&disk, FIRST_DIRECTORY_SECTOR, |s| {
            let slot = &mut s[slot_range(1)];
            slot[0] = b'F';
            slot[8] = b'E';
            slot[13..17].copy_from_slice(&[0, 1, 1, 3]);
            slot[21] = 11;
            slot[22] = 5;
            slot[23] = 80;
        });
        assert_eq!(
            check(&disk),
            vec![Finding::BadStart {
                item: "f.e".to_string(),
                address: SectorAddress::new(0, 1),
            }]
        );
    }

    #[test]
    fn test_bad_end() {
        let disk = disk_with_file();
        modify_sector(&disk, FIRST_DIRECTORY_SECTOR, |s| {
            let slot = &mut s[slot_range(1)];
            slot[0] = b'F';
            slot[8] = b'E';
            slot[13..17].copy_from_slice(&[1, 1, 0, 1]);
            slot[21] = 11;
            slot[22] = 5;
            slot[23] = 80;
        });
        let findings = check(&disk);
        assert!(findings.contains(&Finding::BadEnd {
            item: "f.e".to_string(),
            address: SectorAddress::new(0, 1),
        }));
        assert!(findings
            .iter()
            .all(|f| !matches!(f, Finding::BadStart { .. })));
    }

    #[test]
    fn test_link_after_end() {
        let disk = disk_with_file();
        modify_sector(&disk, SectorAddress::new(1, 3), |s| {
            s[0] = 1;
            s[1] = 4;
        });
        let findings = check(&disk);
        assert_eq!(
            findings,
            vec![Finding::LinkAfterEnd {
                item: "cat.cmd".to_string(),
                address: SectorAddress::new(1, 3),
                to: SectorAddress::new(1, 4),
                severity: Severity::Error,
            }]
        );
        assert_eq!(findings[0].code(), "ENDL");
    }

    #[test]
    fn test_inconsistent_record_size() {
        let disk = disk_with_file();
        modify_sector(&disk, FIRST_DIRECTORY_SECTOR, |s| {
            s[slot_range(0)][18] = 4;
        });
        let findings = check(&disk);
        assert_eq!(
            findings,
            vec![Finding::InconsistentRecordSize {
                item: "cat.cmd".to_string(),
                records: 4,
                sectors: 3,
            }]
        );
        assert_eq!(findings[0].severity(), Severity::Warning);
    }

    #[test]
    fn test_discontiguous_record_number() {
        let disk = disk_with_file();
        modify_sector(&disk, SectorAddress::new(1, 3), |s| s[3] = 4);
        assert_eq!(
            check(&disk),
            vec![Finding::DiscontiguousRecordNr {
                item: "cat.cmd".to_string(),
                address: SectorAddress::new(1, 3),
                expected: 3,
                actual: 4,
            }]
        );
    }

    #[test]
    fn test_multiple_link_inputs() {
        let disk = disk_with_file();
        modify_sector(&disk, SectorAddress::new(0x22, 9), |s| {
            s[0] = 1;
            s[1] = 2;
        });
        modify_sir(&disk, |sir| sir.free = 338);
        // The free chain is walked before the files, so it owns 01-02.
        assert_eq!(
            check(&disk),
            vec![
                Finding::MultipleLinkInputs {
                    item: "Free Chain".to_string(),
                    address: SectorAddress::new(1, 2),
                    from: vec![SectorAddress::new(1, 1), SectorAddress::new(0x22, 9)],
                },
                Finding::LostSectors {
                    item: "Lost1".to_string(),
                    start: SectorAddress::new(0x22, 10),
                    sectors: 1,
                },
            ]
        );
    }

    #[test]
    fn test_link_and_file_input() {
        let disk = disk_with_file();
        modify_sector(&disk, SectorAddress::new(0x22, 9), |s| {
            s[0] = 1;
            s[1] = 1;
        });
        modify_sir(&disk, |sir| sir.free = 339);
        let findings = check(&disk);
        assert!(findings.contains(&Finding::LinkAndFileInput {
            item: "cat.cmd".to_string(),
            address: SectorAddress::new(1, 1),
        }));
    }

    #[test]
    fn test_lost_sectors() {
        let disk = disk_with_file();
        modify_sector(&disk, SectorAddress::new(0x22, 1), |s| {
            s[0] = 0;
            s[1] = 0;
        });
        modify_sir(&disk, |sir| {
            sir.fc_end = SectorAddress::new(0x22, 1);
            sir.free = 328;
        });
        let findings = check(&disk);
        assert_eq!(
            findings,
            vec![Finding::LostSectors {
                item: "Lost1".to_string(),
                start: SectorAddress::new(0x22, 2),
                sectors: 9,
            }]
        );
    }

    #[test]
    fn test_bad_link_in_free_chain() {
        let disk = disk_with_file();
        modify_sector(&disk, SectorAddress::new(0x22, 9), |s| {
            s[0] = 0x30;
            s[1] = 1;
        });
        let findings = check(&disk);
        assert_eq!(findings.len(), 2);
        assert_eq!(
            findings[0],
            Finding::BadLink {
                item: "Free Chain".to_string(),
                from: SectorAddress::new(0x22, 9),
                to: SectorAddress::new(0x30, 1),
                severity: Severity::Warning,
            }
        );
        assert_eq!(findings[0].to_string(), "W-BADLNK Free Chain: sector 22-09 links to invalid 30-01");
    }

    #[test]
    fn test_cycle() {
        let disk = disk_with_file();
        modify_sector(&disk, SectorAddress::new(1, 2), |s| {
            s[0] = 1;
            s[1] = 1;
        });
        modify_sector(&disk, FIRST_DIRECTORY_SECTOR, |s| {
            s[slot_range(0)][18] = 2;
        });
        assert_eq!(
            check(&disk),
            vec![
                Finding::HasCycle {
                    item: "cat.cmd".to_string(),
                    from: SectorAddress::new(1, 2),
                    back_to: SectorAddress::new(1, 1),
                },
                Finding::LinkAndFileInput {
                    item: "cat.cmd".to_string(),
                    address: SectorAddress::new(1, 1),
                },
                Finding::UnexpectedEnd {
                    item: "cat.cmd".to_string(),
                    address: SectorAddress::new(1, 2),
                },
                Finding::LostSectors {
                    item: "Lost1".to_string(),
                    start: SectorAddress::new(1, 3),
                    sectors: 1,
                },
            ]
        );
    }

    #[test]
    fn test_bad_disk_date() {
        let disk = disk_with_file();
        modify_sir(&disk, |sir| sir.month = 13);
        assert_eq!(
            check(&disk),
            vec![Finding::BadDate {
                item: "The disk".to_string()
            }]
        );
    }

    #[test]
    fn test_bad_time_needs_time_access() {
        let disk = disk_with_file();
        modify_sector(&disk, FIRST_DIRECTORY_SECTOR, |s| {
            s[slot_range(0)][12] = 25;
        });
        assert_eq!(check(&disk), vec![]);
        for access in [FileTimeAccess::Get, FileTimeAccess::Set, FileTimeAccess::GetSet] {
            let options = CheckOptions {
                file_time_access: access,
            };
            assert_eq!(
                check_with(&disk, options),
                vec![Finding::BadTime {
                    item: "cat.cmd".to_string()
                }]
            );
        }
    }

    #[test]
    fn test_unprintable_item_name() {
        let mut slot = [0u8; 24];
        slot[..3].copy_from_slice(b"A\x01B");
        slot[8..11].copy_from_slice(b"TXT");
        assert_eq!(item_name(&slot), "a\\x01b.txt");
    }

    #[test]
    fn test_debug_dump() {
        let disk = disk_with_file();
        let device = disk.device();
        let device = device.borrow();
        let mut checker = FileSystemCheck::new(&*device, CheckOptions::default());
        checker.check_file_system().unwrap();
        let mut output = Vec::new();
        checker.debug_dump(&mut output).unwrap();
        let output = String::from_utf8(output).unwrap();
        assert!(output.starts_with("******** I T E M S ********"));
        assert!(output.contains("cat.cmd"));
        assert!(output.contains("01-01 -> 01-02 f"));
        assert!(output.contains("    01-01  01-02  01-03"));
    }

    #[test]
    fn test_host_directory_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let disk = crate::disk::DirectoryDisk::open(dir.path(), &DiskOptions::default()).unwrap();
        let device = disk.device();
        let device = device.borrow();
        let mut checker = FileSystemCheck::new(&*device, CheckOptions::default());
        assert!(checker.check_file_system().is_err());
    }
}
