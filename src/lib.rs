//! This is a Rust library for working with disks of the FLEX operating
//! system, the disk operating system of many 6800 and 6809 based computers
//! of the late 1970's and 1980's.  Most of the provided functionality centers
//! around disk images as used by emulators.
//!
//! Features:
//!
//! * Open DSK images (optionally prefixed by a JVC header) and FLX images,
//! either memory mapped or loaded into RAM.
//! * Use a host directory as a FLEX disk, with one host file per FLEX file.
//! * Format disk images of 2 to 256 tracks with 6 to 255 sectors per track.
//! * Iterate directory entries using FLEX wildcards (`*`, `?` and `[...]`),
//! optionally combined by `;`.
//! * Read, write, delete, rename, and copy files, and change their
//! attributes and dates.
//! * Read and write random files, including their sector maps.
//! * Check the consistency of disk images.
//! * Format sector by sector, as done when importing a disk from physical
//! media.
//!
//! Current shortcomings:
//!
//! * Only sectors of 256 bytes can be read through the FLEX file system.
//! * Host directory disks do not support sector access.
//!
//! # Example
//!
//! The following example opens a disk, lists its directory, and reports
//! any inconsistencies found by the file system check:
//!
//! ```
//! use std::io;
//! use flex::disk::{self, CheckOptions, DiskOptions, FileSystemCheck, FlexDisk};
//! # fn check_disk(path: &str) -> io::Result<()> {
//!
//! // Open the disk image read-only
//! let disk = disk::open(path, &DiskOptions::default())?;
//!
//! for entry in disk.directory()? {
//!     println!("{}", entry);
//! }
//!
//! let device = disk.device();
//! let device = device.borrow();
//! let mut checker = FileSystemCheck::new(&*device, CheckOptions::default());
//! if !checker.check_file_system()? {
//!     for finding in checker.findings() {
//!         println!("{}", finding);
//!     }
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Design of disk access
//!
//! Support for disks was built using a layered scheme:
//!
//! 1. `Image` provides access to the underlying storage containing the disk
//!    image -- either a mapped file, an in-memory array, or a file cached in
//!    RAM.
//! 2. `ImageContainer` divides the image into tracks and sectors according
//!    to a `Geometry` derived from the system information record or the FLX
//!    header, and implements the `SectorDevice` trait.
//! 3. `ChainIterator` follows the links found at the start of every sector,
//!    which is how FLEX chains the directory, the free chain, and files.
//! 4. The `FlexDisk` trait exposes high-level functionality such as reading
//!    and writing files, listing the directory, etc.  Both `ImageDisk` and
//!    `DirectoryDisk` implement it.
//! 5. `FileSystemCheck` independently rebuilds the sector ownership from the
//!    raw links and reports every inconsistency as a `Finding`.
//!
//! # Design shortcomings
//!
//! FLEX sectors start at 1 while tracks start at 0, and sectors 1 to 4 of
//! track 0 hold the boot sectors and the system information record.  The
//! API provided by this crate keeps these FLEX conventions throughout.
//!
//! In the interest of providing a simple and flexible API to callers, the
//! disk and its directory cursors share their container through a
//! `Rc<RefCell<_>>`.  This allows several cursors to be in use at the same
//! time, but it also means none of the types can be sent between threads.
//!
//! # License
//!
//! Flex is distributed under the terms of both the MIT license and the
//! Apache License (Version 2.0).
//!
//! See LICENSE-APACHE and LICENSE-MIT for details.

pub mod disk;

mod util;
