//! Memory-Mapped File Storage untuk stream chunk
//!
//! Hasil `PullSerializer::pull` di-append langsung ke region mmap, dan saat
//! load, slice dari region yang sama di-push ke `PushDeserializer` tanpa copy:
//! - Zero-copy read: data langsung dari page cache ke parser
//! - Kernel-managed paging: file sebesar apapun tidak perlu muat di heap
//! - Persistence: stream tersimpan ke disk

use memmap2::{MmapMut, MmapOptions};
use std::fs::OpenOptions;
use std::io;
use std::path::Path;

/// Header di awal file
#[repr(C, align(64))]
struct StorageHeader {
    magic: u64,
    version: u32,
    chunk_count: u32,
    capacity: u64,
    write_pos: u64,
}

const MAGIC: u64 = 0x43484B5354524D31; // "CHKSTRM1"
const VERSION: u32 = 1;
const HEADER_SIZE: usize = std::mem::size_of::<StorageHeader>();

/// Mmap-backed storage untuk satu stream serialized
pub struct MmapStorage {
    mmap: MmapMut,
    capacity: usize,
}

impl MmapStorage {
    /// Membuat file storage baru (isi lama dibuang)
    ///
    /// # Arguments
    /// * `path` - Path ke file storage
    /// * `capacity` - Kapasitas data dalam bytes
    pub fn create<P: AsRef<Path>>(path: P, capacity: usize) -> io::Result<Self> {
        let total_size = HEADER_SIZE + capacity;

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        file.set_len(total_size as u64)?;

        // SAFETY: file dibuka read/write dan tidak di-share ke proses lain
        let mut mmap = unsafe { MmapOptions::new().len(total_size).map_mut(&file)? };

        // SAFETY: mmap page-aligned dan minimal HEADER_SIZE bytes
        let header = unsafe { &mut *(mmap.as_mut_ptr() as *mut StorageHeader) };
        header.magic = MAGIC;
        header.version = VERSION;
        header.chunk_count = 0;
        header.capacity = capacity as u64;
        header.write_pos = 0;

        Ok(Self { mmap, capacity })
    }

    /// Membuka file storage yang sudah ada
    pub fn open<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        let file_len = file.metadata()?.len() as usize;
        if file_len < HEADER_SIZE {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "storage file shorter than header",
            ));
        }

        // SAFETY: file dibuka read/write dan tidak di-share ke proses lain
        let mmap = unsafe { MmapOptions::new().len(file_len).map_mut(&file)? };

        let header = unsafe { &*(mmap.as_ptr() as *const StorageHeader) };
        if header.magic != MAGIC || header.version != VERSION {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "not a chunkstream storage file",
            ));
        }
        let capacity = header.capacity as usize;
        if HEADER_SIZE + capacity != file_len || header.write_pos as usize > capacity {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "storage header does not match file size",
            ));
        }

        Ok(Self { mmap, capacity })
    }

    #[inline(always)]
    fn header(&self) -> &StorageHeader {
        // SAFETY: header berada di awal mmap region
        unsafe { &*(self.mmap.as_ptr() as *const StorageHeader) }
    }

    /// Append satu chunk.
    ///
    /// Returns offset dimana data ditulis, atau None jika tidak cukup ruang
    #[inline]
    pub fn append(&mut self, data: &[u8]) -> Option<usize> {
        let write_pos = self.header().write_pos as usize;
        if data.len() > self.capacity - write_pos {
            return None;
        }

        let start = HEADER_SIZE + write_pos;
        self.mmap[start..start + data.len()].copy_from_slice(data);

        // SAFETY: header berada di awal mmap region, &mut self eksklusif
        let header = unsafe { &mut *(self.mmap.as_mut_ptr() as *mut StorageHeader) };
        header.write_pos = (write_pos + data.len()) as u64;
        header.chunk_count = header.chunk_count.wrapping_add(1);

        Some(write_pos)
    }

    /// Data yang sudah ditulis (zero-copy)
    #[inline(always)]
    pub fn as_bytes(&self) -> &[u8] {
        let len = self.header().write_pos as usize;
        &self.mmap[HEADER_SIZE..HEADER_SIZE + len]
    }

    /// Data dipotong per `chunk_size` bytes
    pub fn chunks(&self, chunk_size: usize) -> std::slice::Chunks<'_, u8> {
        self.as_bytes().chunks(chunk_size)
    }

    #[inline(always)]
    pub fn len(&self) -> usize {
        self.header().write_pos as usize
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Jumlah chunk yang pernah di-append
    #[inline(always)]
    pub fn chunk_count(&self) -> u32 {
        self.header().chunk_count
    }

    #[inline(always)]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Flush ke disk
    pub fn flush(&self) -> io::Result<()> {
        self.mmap.flush()
    }
}
