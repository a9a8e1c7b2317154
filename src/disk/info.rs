use std::fmt;
use std::path::PathBuf;

use crate::disk::directory::{FileAttributes, FlexDate};
use crate::disk::geometry::ContainerFormat;

/// Container traits reported along with the disk attributes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ContainerOptions {
    /// The image starts with a JVC header.
    pub jvc_header: bool,
    /// The image is held in memory.
    pub ram: bool,
    /// Sectors can be accessed directly.
    pub sector_interface: bool,
}

/// A summary of a disk, as reported by `FlexDisk::attributes()`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DiskAttributes {
    pub name: String,
    pub number: u16,
    pub date: FlexDate,
    /// Free bytes.
    pub free: u64,
    /// Total bytes.
    pub total: u64,
    pub tracks: u16,
    pub sectors: u16,
    pub sector_size: usize,
    pub format: ContainerFormat,
    pub options: ContainerOptions,
    pub supported_attributes: FileAttributes,
    pub write_protected: bool,
    pub is_flex_format: bool,
    pub path: PathBuf,
    pub jvc_header: Vec<u8>,
}

impl fmt::Display for DiskAttributes {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "path        {}", self.path.display())?;
        writeln!(f, "format      {}", self.format)?;
        if !self.is_flex_format {
            return writeln!(f, "unformatted, {} bytes", self.total);
        }
        writeln!(f, "name        {} #{}", self.name, self.number)?;
        writeln!(f, "date        {}", self.date)?;
        if self.tracks != 0 {
            writeln!(f, "tracks      {}", self.tracks)?;
            writeln!(f, "sectors     {}", self.sectors)?;
        }
        writeln!(f, "free        {} bytes", self.free)?;
        writeln!(f, "total       {} bytes", self.total)?;
        if !self.jvc_header.is_empty() {
            writeln!(f, "JVC header  {:02X?}", self.jvc_header)?;
        }
        write!(
            f,
            "attributes  {}{}",
            self.supported_attributes,
            if self.write_protected {
                " (write protected)"
            } else {
                ""
            }
        )
    }
}
