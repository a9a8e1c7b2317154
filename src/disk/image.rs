use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;

use log::{debug, error};
use memmap::{Mmap, MmapMut, MmapOptions};

use crate::disk::error::DiskError;

/// Provide backing storage (file or memory) for disk images.
pub enum Image {
    ReadOnlyMap(Mmap),
    /// A zero length file cannot be mapped, so the map is created once the
    /// file has grown.
    ReadWriteMap {
        file: File,
        map: Option<MmapMut>,
    },
    Memory(Vec<u8>),
    /// The whole file is held in memory and written back on flush.
    Cached {
        file: File,
        data: Vec<u8>,
        dirty: bool,
    },
}

impl Image {
    pub fn open_memory(data: Vec<u8>) -> Image {
        Image::Memory(data)
    }

    pub fn open_read_only<P: AsRef<Path>>(path: P) -> io::Result<Image> {
        let file = File::open(path)?;
        if file.metadata()?.len() == 0 {
            return Ok(Image::Memory(Vec::new()));
        }
        let mmap = unsafe { MmapOptions::new().map(&file)? };
        Ok(Image::ReadOnlyMap(mmap))
    }

    pub fn open_read_write<P: AsRef<Path>>(path: P) -> io::Result<Image> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        let map = Image::map_file(&file)?;
        Ok(Image::ReadWriteMap { file, map })
    }

    pub fn open_cached<P: AsRef<Path>>(path: P, writable: bool) -> io::Result<Image> {
        let mut file = OpenOptions::new().read(true).write(writable).open(path)?;
        let mut data = Vec::new();
        file.read_to_end(&mut data)?;
        debug!("loaded {} bytes into memory", data.len());
        Ok(Image::Cached {
            file,
            data,
            dirty: false,
        })
    }

    /// Create (or truncate) a file holding the provided bytes and open it.
    pub fn create<P: AsRef<Path>>(path: P, data: &[u8], cached: bool) -> io::Result<Image> {
        let path = path.as_ref();
        {
            let mut file = OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .truncate(true)
                .open(path)?;
            file.write_all(data)?;
            file.sync_all()?;
        }
        if cached {
            Image::open_cached(path, true)
        } else {
            Image::open_read_write(path)
        }
    }

    fn map_file(file: &File) -> io::Result<Option<MmapMut>> {
        if file.metadata()?.len() == 0 {
            Ok(None)
        } else {
            Ok(Some(unsafe { MmapOptions::new().map_mut(file)? }))
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Image::ReadOnlyMap(mmap) => mmap.len(),
            Image::ReadWriteMap { map, .. } => map.as_ref().map(|m| m.len()).unwrap_or(0),
            Image::Memory(data) => data.len(),
            Image::Cached { data, .. } => data.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check_bounds(&self, offset: usize) -> io::Result<()> {
        if offset > self.len() {
            Err(DiskError::InvalidOffset.into())
        } else {
            Ok(())
        }
    }

    pub fn check_writability(&self) -> io::Result<()> {
        match self {
            Image::ReadOnlyMap(_) => Err(DiskError::ReadOnly.into()),
            _ => Ok(()),
        }
    }

    pub fn slice(&self, offset: usize, length: usize) -> io::Result<&[u8]> {
        self.check_bounds(offset + length)?;
        Ok(match self {
            Image::ReadOnlyMap(mmap) => &mmap[offset..offset + length],
            Image::ReadWriteMap { map: Some(mmap), .. } => &mmap[offset..offset + length],
            Image::ReadWriteMap { map: None, .. } => &[],
            Image::Memory(data) => &data[offset..offset + length],
            Image::Cached { data, .. } => &data[offset..offset + length],
        })
    }

    pub fn slice_mut(&mut self, offset: usize, length: usize) -> io::Result<&mut [u8]> {
        self.check_bounds(offset + length)?;
        match self {
            Image::ReadOnlyMap(_) => Err(DiskError::ReadOnly.into()),
            Image::ReadWriteMap { map: Some(mmap), .. } => Ok(&mut mmap[offset..offset + length]),
            Image::ReadWriteMap { map: None, .. } => Ok(&mut []),
            Image::Memory(data) => Ok(&mut data[offset..offset + length]),
            Image::Cached { data, dirty, .. } => {
                *dirty = true;
                Ok(&mut data[offset..offset + length])
            }
        }
    }

    /// Grow (or shrink) the image.  New bytes are zero.
    pub fn resize(&mut self, length: usize) -> io::Result<()> {
        if length == self.len() {
            return Ok(());
        }
        debug!("resize image from {} to {} bytes", self.len(), length);
        match self {
            Image::ReadOnlyMap(_) => Err(DiskError::ReadOnly.into()),
            Image::ReadWriteMap { file, map } => {
                if let Some(mmap) = map.take() {
                    mmap.flush()?;
                }
                file.set_len(length as u64)?;
                *map = Image::map_file(file)?;
                Ok(())
            }
            Image::Memory(data) => {
                data.resize(length, 0);
                Ok(())
            }
            Image::Cached { data, dirty, .. } => {
                data.resize(length, 0);
                *dirty = true;
                Ok(())
            }
        }
    }

    pub fn flush(&mut self) -> io::Result<()> {
        match self {
            Image::ReadOnlyMap(_) => Err(DiskError::ReadOnly.into()),
            Image::ReadWriteMap { map: Some(mmap), .. } => mmap.flush(),
            Image::ReadWriteMap { map: None, .. } => Ok(()),
            Image::Memory(_) => Ok(()),
            Image::Cached { file, data, dirty } => {
                if *dirty {
                    file.seek(SeekFrom::Start(0))?;
                    file.write_all(data)?;
                    file.set_len(data.len() as u64)?;
                    file.flush()?;
                    *dirty = false;
                    debug!("wrote {} cached bytes back", data.len());
                }
                Ok(())
            }
        }
    }

    /// Take the bytes of an in-memory image.
    pub fn into_bytes(mut self) -> Vec<u8> {
        match &mut self {
            Image::Memory(data) => std::mem::take(data),
            Image::Cached { data, .. } => data.clone(),
            other => other.slice(0, other.len()).map(|s| s.to_vec()).unwrap_or_default(),
        }
    }
}

impl Drop for Image {
    fn drop(&mut self) {
        if let Image::Cached { dirty: true, .. } = self {
            if let Err(e) = self.flush() {
                error!("unable to write back cached image: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    #[allow(unused_imports)]
    use super::*;

    #[test]
    fn test_memory_image() {
        let mut image = Image::open_memory(vec![0u8; 512]);
        image.slice_mut(256, 4).unwrap().copy_from_slice(&[1, 2, 3, 4]);
        assert_eq!(image.slice(256, 4).unwrap(), &[1, 2, 3, 4]);
        assert!(image.slice(510, 4).is_err());
        image.resize(1024).unwrap();
        assert_eq!(image.len(), 1024);
        assert_eq!(image.slice(1020, 4).unwrap(), &[0, 0, 0, 0]);
    }

    #[test]
    fn test_read_write_map_grows_from_empty() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let mut image = Image::open_read_write(file.path()).unwrap();
        assert_eq!(image.len(), 0);
        image.resize(300).unwrap();
        image.slice_mut(0, 2).unwrap().copy_from_slice(&[0xAB, 0xCD]);
        image.flush().unwrap();
        drop(image);
        let bytes = std::fs::read(file.path()).unwrap();
        assert_eq!(bytes.len(), 300);
        assert_eq!(&bytes[..2], &[0xAB, 0xCD]);
    }

    #[test]
    fn test_cached_image_writes_back_on_drop() {
        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(file.path(), vec![0u8; 256]).unwrap();
        {
            let mut image = Image::open_cached(file.path(), true).unwrap();
            image.slice_mut(10, 1).unwrap()[0] = 0x5A;
            // Not yet written back.
            assert_eq!(std::fs::read(file.path()).unwrap()[10], 0);
        }
        assert_eq!(std::fs::read(file.path()).unwrap()[10], 0x5A);
    }
}
