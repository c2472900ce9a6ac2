//! ZIP code database lookup.
//!
//! `us_zipcodes.bin` is a 4-byte little-endian record count followed by
//! fixed-width 13-byte records: 5 ASCII digits, then latitude and
//! longitude as little-endian `f32`. Records are sorted bytewise by
//! ZIP, so lookup is a binary search over a memory-mapped view.

use std::fs::File;
use std::num::NonZeroUsize;
use std::path::Path;
use std::ptr::NonNull;

use nix::sys::mman::{MapFlags, ProtFlags, mmap, munmap};

const HEADER_SIZE: usize = 4;
const ENTRY_SIZE: usize = 13; // 5-byte zip + f32 lat + f32 lon

/// Read-only memory map that unmaps on drop.
struct Mapped {
    ptr: NonNull<libc::c_void>,
    len: usize,
}

impl Mapped {
    fn open(path: &Path) -> Option<Self> {
        let file = File::open(path).ok()?;
        let len = file.metadata().ok()?.len() as usize;
        let len_nz = NonZeroUsize::new(len)?;

        let ptr = unsafe {
            mmap(
                None,
                len_nz,
                ProtFlags::PROT_READ,
                MapFlags::MAP_PRIVATE,
                &file,
                0,
            )
        }
        .ok()?;

        Some(Self { ptr, len })
    }

    fn as_slice(&self) -> &[u8] {
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr() as *const u8, self.len) }
    }
}

impl Drop for Mapped {
    fn drop(&mut self) {
        unsafe {
            let _ = munmap(self.ptr, self.len);
        }
    }
}

/// Look up a ZIP code. Queries shorter than five digits are left-padded
/// with zeros; the match must be exact. Returns the stored coordinates
/// bit-for-bit.
pub fn lookup(db_path: &Path, zipcode: &str) -> Option<(f32, f32)> {
    let mut zip5 = [b'0'; 5];
    let bytes = zipcode.as_bytes();
    let len = bytes.len().min(5);
    zip5[5 - len..].copy_from_slice(&bytes[..len]);

    let map = Mapped::open(db_path)?;
    let data = map.as_slice();

    if data.len() < HEADER_SIZE {
        return None;
    }

    let count = u32::from_le_bytes([data[0], data[1], data[2], data[3]]) as usize;
    // Reject a truncated or lying header before trusting any offset
    if count == 0 || HEADER_SIZE + count * ENTRY_SIZE > data.len() {
        return None;
    }

    let entry = |idx: usize| -> &[u8] {
        let offset = HEADER_SIZE + idx * ENTRY_SIZE;
        &data[offset..offset + ENTRY_SIZE]
    };

    let mut low = 0usize;
    let mut high = count - 1;

    loop {
        let mid = low + (high - low) / 2;
        let rec = entry(mid);

        match rec[..5].cmp(&zip5) {
            std::cmp::Ordering::Equal => {
                let lat = f32::from_le_bytes([rec[5], rec[6], rec[7], rec[8]]);
                let lon = f32::from_le_bytes([rec[9], rec[10], rec[11], rec[12]]);
                return Some((lat, lon));
            }
            std::cmp::Ordering::Less => {
                if mid == high {
                    return None;
                }
                low = mid + 1;
            }
            std::cmp::Ordering::Greater => {
                if mid == 0 {
                    return None;
                }
                high = mid - 1;
            }
        }
        if low > high {
            return None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn build_db(entries: &[(&str, f32, f32)]) -> NamedTempFile {
        let mut file = NamedTempFile::new().expect("tempfile");
        let count = entries.len() as u32;
        file.write_all(&count.to_le_bytes()).unwrap();
        for (zip, lat, lon) in entries {
            assert_eq!(zip.len(), 5);
            file.write_all(zip.as_bytes()).unwrap();
            file.write_all(&lat.to_le_bytes()).unwrap();
            file.write_all(&lon.to_le_bytes()).unwrap();
        }
        file.flush().unwrap();
        file
    }

    fn sample_db() -> NamedTempFile {
        // Sorted bytewise by zip
        build_db(&[
            ("02134", 42.355_f32, -71.132_f32),
            ("10001", 40.750_f32, -73.997_f32),
            ("60614", 41.922_f32, -87.653_f32),
            ("90210", 34.090_f32, -118.406_f32),
            ("99950", 55.342_f32, -131.646_f32),
        ])
    }

    #[test]
    fn every_stored_zip_found_bit_exact() {
        let db = sample_db();
        for (zip, lat, lon) in [
            ("02134", 42.355_f32, -71.132_f32),
            ("10001", 40.750_f32, -73.997_f32),
            ("60614", 41.922_f32, -87.653_f32),
            ("90210", 34.090_f32, -118.406_f32),
            ("99950", 55.342_f32, -131.646_f32),
        ] {
            let (got_lat, got_lon) = lookup(db.path(), zip).expect(zip);
            assert_eq!(got_lat.to_bits(), lat.to_bits());
            assert_eq!(got_lon.to_bits(), lon.to_bits());
        }
    }

    #[test]
    fn absent_zip_not_found() {
        let db = sample_db();
        assert!(lookup(db.path(), "00000").is_none());
        assert!(lookup(db.path(), "55555").is_none());
        assert!(lookup(db.path(), "99999").is_none());
    }

    #[test]
    fn short_query_left_padded() {
        let db = sample_db();
        // "2134" pads to "02134"
        assert!(lookup(db.path(), "2134").is_some());
    }

    #[test]
    fn single_entry_db() {
        let db = build_db(&[("60614", 41.922, -87.653)]);
        assert!(lookup(db.path(), "60614").is_some());
        assert!(lookup(db.path(), "60615").is_none());
    }

    #[test]
    fn truncated_file_rejected() {
        let mut file = NamedTempFile::new().unwrap();
        // Header claims 100 entries but the file ends after the count
        file.write_all(&100u32.to_le_bytes()).unwrap();
        file.flush().unwrap();
        assert!(lookup(file.path(), "60614").is_none());
    }

    #[test]
    fn missing_file_rejected() {
        assert!(lookup(Path::new("/nonexistent/zipdb.bin"), "60614").is_none());
    }
}
