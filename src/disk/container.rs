use std::io;
use std::path::{Path, PathBuf};

use log::{debug, trace};

use crate::disk::block::{SectorAddress, SectorDevice, SECTOR_SIZE, SYSTEM_INFO_SECTOR};
use crate::disk::error::DiskError;
use crate::disk::format;
use crate::disk::geometry::{
    self, default_geometry, track0_sector_count, ContainerFormat, Geometry, FLX_HEADER_SIZE,
};
use crate::disk::header::{FlxHeader, JvcHeader, SystemInfoRecord, MAX_JVC_HEADER_SIZE};
use crate::disk::image::Image;
use crate::disk::{DiskOptions, DiskType, FormatOptions};

/// A FLEX disk image in DSK (optionally JVC prefixed) or FLX format.
pub struct ImageContainer {
    path: PathBuf,
    image: Image,
    geometry: Geometry,
    is_flex_format: bool,
    jvc_header: JvcHeader,
    flx_header: Option<FlxHeader>,
    // Largest sector numbers formatted on side 0, used while an image is
    // being formatted sector by sector.
    sectors0_side0_max: u16,
    sectors_side0_max: u16,
    options: DiskOptions,
}

impl ImageContainer {
    /// Open an existing image file.
    pub fn open<P: AsRef<Path>>(path: P, options: &DiskOptions) -> io::Result<ImageContainer> {
        let path = path.as_ref();
        let image = if options.ram {
            Image::open_cached(path, options.writable)?
        } else if options.writable {
            Image::open_read_write(path)?
        } else {
            Image::open_read_only(path)?
        };
        ImageContainer::from_image(image, path, options)
    }

    /// Format a new image file and open it.
    pub fn create<P: AsRef<Path>>(
        path: P,
        tracks: u16,
        sectors: u16,
        disk_type: DiskType,
        format_options: &FormatOptions,
        options: &DiskOptions,
    ) -> io::Result<ImageContainer> {
        let path = path.as_ref();
        let mut image = Image::create(path, &[], options.ram)?;
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        format::format_disk(&mut image, &name, tracks, sectors, disk_type, format_options)?;
        image.flush()?;
        let options = DiskOptions {
            writable: true,
            ..options.clone()
        };
        ImageContainer::from_image(image, path, &options)
    }

    /// Format a new image held in memory.
    pub fn create_memory(
        name: &str,
        tracks: u16,
        sectors: u16,
        disk_type: DiskType,
        format_options: &FormatOptions,
        options: &DiskOptions,
    ) -> io::Result<ImageContainer> {
        let mut image = Image::open_memory(Vec::new());
        format::format_disk(&mut image, name, tracks, sectors, disk_type, format_options)?;
        ImageContainer::from_image(image, name, options)
    }

    /// Wrap existing image bytes, e.g. a disk image loaded by the caller.
    pub fn from_bytes(name: &str, bytes: Vec<u8>, options: &DiskOptions) -> io::Result<ImageContainer> {
        ImageContainer::from_image(Image::open_memory(bytes), name, options)
    }

    pub fn from_image<P: AsRef<Path>>(
        image: Image,
        path: P,
        options: &DiskOptions,
    ) -> io::Result<ImageContainer> {
        let write_protected = !options.writable || image.check_writability().is_err();
        let mut container = ImageContainer {
            path: path.as_ref().to_path_buf(),
            image,
            geometry: Geometry::unformatted(),
            is_flex_format: false,
            jvc_header: JvcHeader::default(),
            flx_header: None,
            sectors0_side0_max: 0,
            sectors_side0_max: 0,
            options: options.clone(),
        };

        if container.image.is_empty() {
            // Can be formatted sector by sector.
            debug!("{}: empty file, unformatted FLX container", container.path.display());
            container.geometry.write_protect = write_protected;
            return Ok(container);
        }

        let header = if container.image.len() >= FLX_HEADER_SIZE {
            FlxHeader::from_bytes(container.image.slice(0, FLX_HEADER_SIZE)?)
        } else {
            None
        };
        match header {
            Some(header) => container.initialize_flx(header, write_protected),
            None => container.initialize_dsk(write_protected)?,
        }
        Ok(container)
    }

    fn initialize_flx(&mut self, header: FlxHeader, write_protected: bool) {
        let bytes_per_sector = geometry::bytes_per_sector(header.size_code);
        let sectors = header.sectors as u16 * header.sides as u16;
        let sectors0 = header.sectors0 as u16 * header.sides0 as u16;
        self.geometry = Geometry {
            tracks: header.track_count(),
            sectors,
            sectors0,
            sides: header.sides,
            sides0: header.sides0,
            bytes_per_sector,
            offset: FLX_HEADER_SIZE,
            bytes_per_track0: sectors0 as usize * bytes_per_sector,
            bytes_per_track: sectors as usize * bytes_per_sector,
            write_protect: write_protected || header.write_protect != 0,
            format: ContainerFormat::Flx,
        };
        self.flx_header = Some(header);
        self.is_flex_format = self.passes_flx_check();
        debug!(
            "{}: FLX image {}x{} (track 0: {}), FLEX format: {}",
            self.path.display(),
            self.geometry.tracks,
            self.geometry.sectors,
            self.geometry.sectors0,
            self.is_flex_format
        );
    }

    fn initialize_dsk(&mut self, write_protected: bool) -> io::Result<()> {
        let file_size = self.image.len();
        let header_size = file_size % SECTOR_SIZE;
        if header_size > MAX_JVC_HEADER_SIZE {
            return Err(DiskError::NotAFlexImage.into());
        }
        let jvc_header = JvcHeader::parse(self.image.slice(0, header_size)?)?;

        let sir = self
            .read_sir_at(header_size + 2 * SECTOR_SIZE)
            .ok_or(DiskError::NotAFlexImage)?;
        let tracks = sir.tracks();
        let sectors = sir.sectors();
        if tracks == 0 || sectors == 0 {
            return Err(DiskError::NotAFlexImage.into());
        }
        let size_min = header_size + ((tracks as usize - 1) * sectors as usize + 1) * SECTOR_SIZE;
        let size_max = header_size + tracks as usize * sectors as usize * SECTOR_SIZE;
        if file_size < size_min || file_size > size_max {
            return Err(DiskError::NotAFlexImage.into());
        }

        let mut geometry = match jvc_header.sectors_per_track() {
            Some(jvc_sectors) => {
                let jvc_sides = jvc_header.sides();
                let jvc_tracks = (file_size - header_size) / (jvc_sectors as usize * SECTOR_SIZE)
                    / jvc_sides as usize;
                if jvc_tracks != tracks as usize || jvc_sectors * jvc_sides != sectors {
                    return Err(DiskError::InvalidJvcHeader.into());
                }
                let mut geometry =
                    default_geometry(tracks, sectors, sectors, ContainerFormat::DskJvc);
                geometry.sides = jvc_sides as u8;
                geometry.sides0 = jvc_sides as u8;
                geometry
            }
            None => default_geometry(
                tracks,
                sectors,
                track0_sector_count(tracks, sectors),
                ContainerFormat::Dsk,
            ),
        };
        geometry.offset = header_size;
        geometry.write_protect = write_protected;
        self.geometry = geometry;
        self.jvc_header = jvc_header;
        self.is_flex_format = true;
        self.evaluate_track0_sector_count()?;
        debug!(
            "{}: DSK image {}x{} (track 0: {}), JVC header: {} bytes",
            self.path.display(),
            self.geometry.tracks,
            self.geometry.sectors,
            self.geometry.sectors0,
            header_size
        );
        Ok(())
    }

    /// Some DSK images of the same size differ in the sector count of track
    /// 0.  Follow the directory chain on track 0 to find out.
    fn evaluate_track0_sector_count(&mut self) -> io::Result<()> {
        let sectors = self.geometry.sectors;
        if !self.options.track0_only_dir_sectors {
            self.geometry.sectors0 = sectors;
            return Ok(());
        }
        let mut index = 4u16;
        while index < sectors {
            let offset = self.geometry.offset + index as usize * SECTOR_SIZE;
            let link = SectorAddress::from_bytes(self.image.slice(offset, 2)?);
            if link.is_null() || link.track != 0 {
                break;
            }
            index += 1;
        }
        self.geometry.sectors0 = sectors.min(index + 1);
        Ok(())
    }

    fn read_sir_at(&self, offset: usize) -> Option<SystemInfoRecord> {
        self.image
            .slice(offset, SECTOR_SIZE)
            .ok()
            .map(SystemInfoRecord::from_bytes)
    }

    /// Whether the FLX header matches the SIR and the image size.
    fn passes_flx_check(&self) -> bool {
        let header = match self.flx_header {
            Some(ref header) => header,
            None => return false,
        };
        match self.read_sir_at(FLX_HEADER_SIZE + 2 * SECTOR_SIZE) {
            Some(sir) => header.is_flex_compatible(sir.tracks(), sir.sectors(), self.image.len()),
            None => false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn jvc_header(&self) -> &JvcHeader {
        &self.jvc_header
    }

    pub fn options(&self) -> &DiskOptions {
        &self.options
    }

    pub fn file_size(&self) -> usize {
        self.image.len()
    }

    /// The container's bytes, header included.
    pub fn into_bytes(self) -> Vec<u8> {
        self.image.into_bytes()
    }

    fn sector_offset(&self, address: SectorAddress, side: Option<u8>) -> io::Result<usize> {
        if !self.is_track_valid(address.track) || !self.is_sector_valid(address) {
            return Err(DiskError::InvalidSector(address).into());
        }
        self.geometry.byte_offset(address, side, self.is_flex_format)
    }
}

impl SectorDevice for ImageContainer {
    fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    fn is_write_protected(&self) -> bool {
        self.geometry.write_protect
    }

    fn is_flex_format(&self) -> bool {
        self.is_flex_format
    }

    fn is_track_valid(&self, track: u8) -> bool {
        if !self.is_flex_format {
            // Tracks may be formatted in any order.
            return true;
        }
        (track as u16) < self.geometry.tracks
    }

    fn is_sector_valid(&self, address: SectorAddress) -> bool {
        let geometry = &self.geometry;
        if address.track == 0 {
            return address.sector > 0 && address.sector as u16 <= geometry.sectors0;
        }
        address.sector > 0
            && address.sector as u16 <= geometry.sectors
            && geometry.offset
                + geometry.bytes_per_track0
                + geometry.bytes_per_track * (address.track as usize - 1)
                + address.sector as usize * geometry.bytes_per_sector
                <= self.image.len()
    }

    fn bytes_per_sector(&self) -> usize {
        self.geometry.bytes_per_sector
    }

    fn read_sector(&self, address: SectorAddress, side: Option<u8>) -> io::Result<Vec<u8>> {
        let offset = self.sector_offset(address, side)?;
        trace!("read sector {} at {:#x}", address, offset);
        Ok(self
            .image
            .slice(offset, self.geometry.bytes_per_sector)?
            .to_vec())
    }

    fn write_sector(
        &mut self,
        address: SectorAddress,
        side: Option<u8>,
        data: &[u8],
    ) -> io::Result<()> {
        let offset = self.sector_offset(address, side)?;
        if self.is_write_protected() {
            return Err(DiskError::ReadOnly.into());
        }
        let bytes_per_sector = self.geometry.bytes_per_sector;
        if data.len() != bytes_per_sector {
            return Err(DiskError::InvalidOffset.into());
        }
        trace!("write sector {} at {:#x}", address, offset);
        self.image
            .slice_mut(offset, bytes_per_sector)?
            .copy_from_slice(data);

        if !self.is_flex_format && address == SYSTEM_INFO_SECTOR && self.passes_flx_check() {
            debug!("{}: image is now FLEX formatted", self.path.display());
            self.is_flex_format = true;
        }
        Ok(())
    }

    fn format_sector(
        &mut self,
        data: &[u8],
        track: u8,
        sector: u8,
        side: u8,
        size_code: u8,
    ) -> io::Result<()> {
        if self.is_flex_format || sector == 0 || side > 1 || size_code > 3 {
            return Err(DiskError::InvalidFormatRequest.into());
        }
        if self.is_write_protected() {
            return Err(DiskError::ReadOnly.into());
        }
        let bytes_per_sector = geometry::bytes_per_sector(size_code);
        if self.geometry.bytes_per_sector != 0 && self.geometry.bytes_per_sector != bytes_per_sector {
            return Err(DiskError::InvalidFormatRequest.into());
        }

        let sector = sector as u16;
        let mut file_size = self.image.len().max(FLX_HEADER_SIZE);
        {
            let geometry = &mut self.geometry;
            geometry.bytes_per_sector = bytes_per_sector;
            geometry.tracks = geometry.tracks.max(track as u16 + 1);

            if track == 0 {
                if side == 0 {
                    self.sectors0_side0_max = self.sectors0_side0_max.max(sector);
                } else {
                    // A formatted side 1 doubles the sector count of side 0.
                    geometry.sectors0 = 2 * self.sectors0_side0_max;
                    geometry.bytes_per_track0 = geometry.sectors0 as usize * bytes_per_sector;
                }
                geometry.sides0 = geometry.sides0.max(side + 1);
                if sector > geometry.sectors0 {
                    geometry.sectors0 = sector;
                    geometry.bytes_per_track0 = geometry.sectors0 as usize * bytes_per_sector;
                }
                file_size = file_size.max(geometry.offset + geometry.bytes_per_track0);
            } else {
                if side == 0 {
                    self.sectors_side0_max = self.sectors_side0_max.max(sector);
                } else {
                    geometry.sectors = 2 * self.sectors_side0_max;
                    geometry.bytes_per_track = geometry.sectors as usize * bytes_per_sector;
                }
                geometry.sides = geometry.sides.max(side + 1);
                if sector > geometry.sectors {
                    geometry.sectors = sector;
                    geometry.bytes_per_track = geometry.sectors as usize * bytes_per_sector;
                }
                file_size = file_size.max(
                    geometry.offset
                        + geometry.bytes_per_track0
                        + track as usize * geometry.bytes_per_track,
                );
            }
        }

        let header = FlxHeader::new(
            bytes_per_sector,
            self.geometry.tracks,
            self.geometry.sectors0,
            self.geometry.sectors,
            self.geometry.sides0,
            self.geometry.sides,
        );
        self.image.resize(file_size)?;
        self.image
            .slice_mut(0, FLX_HEADER_SIZE)?
            .copy_from_slice(&header.to_bytes());
        let expected_size = header.file_size();
        self.flx_header = Some(header);
        trace!("format sector {:02X}-{:02X} side {}", track, sector, side);

        let mut padded = data.to_vec();
        padded.resize(bytes_per_sector, 0);
        self.write_sector(SectorAddress::new(track, sector as u8), Some(side), &padded)?;

        if !self.is_flex_format && self.image.len() == expected_size && self.passes_flx_check() {
            debug!("{}: formatting complete", self.path.display());
            self.is_flex_format = true;
        }
        Ok(())
    }

    fn flush(&mut self) -> io::Result<()> {
        if self.is_write_protected() {
            return Ok(());
        }
        self.image.flush()
    }
}
