// FAT-backed storage device.
// Implements the storage capability surface on top of a volume driver. The
// driver carries the open-file and open-directory handles; this layer adds
// lifecycle guards, cursor rules, search, range deletion and directory
// enumeration.

use log::{debug, warn};

use carddock_core::device::{AccessFlags, DirectoryEntry, StorageDevice};
use carddock_core::driver::{am, NativeStat, VolumeDriver};

use crate::bus::{BusProfile, SdioBus, SpiBus};
use crate::search;

const MAX_LINE_BYTES: usize = 4096;

/// A removable FAT-formatted card behind a [`VolumeDriver`].
///
/// Holds at most one open file and one open directory cursor at a time.
/// Dropping the device closes any open file and unmounts the volume.
pub struct FatStorageDevice<D: VolumeDriver> {
    driver: D,
    volume: String,
    bus: Option<BusProfile>,
    mounted: bool,
    file_open: bool,
    current_path: Option<String>,
}

impl<D: VolumeDriver> FatStorageDevice<D> {
    pub fn new(driver: D, volume: impl Into<String>) -> Self {
        FatStorageDevice {
            driver,
            volume: volume.into(),
            bus: None,
            mounted: false,
            file_open: false,
            current_path: None,
        }
    }

    /// Device wired over SPI.
    pub fn spi(driver: D, volume: impl Into<String>, bus: SpiBus) -> Self {
        let mut device = Self::new(driver, volume);
        device.bus = Some(BusProfile::Spi(bus));
        device
    }

    /// Device wired over SDIO.
    pub fn sdio(driver: D, volume: impl Into<String>, bus: SdioBus) -> Self {
        let mut device = Self::new(driver, volume);
        device.bus = Some(BusProfile::Sdio(bus));
        device
    }

    pub fn volume(&self) -> &str {
        &self.volume
    }

    pub fn bus_profile(&self) -> Option<&BusProfile> {
        self.bus.as_ref()
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    pub fn driver_mut(&mut self) -> &mut D {
        &mut self.driver
    }

    /// Runs `f` and restores the file cursor on every exit path.
    fn restoring_cursor<T>(&mut self, f: impl FnOnce(&mut Self) -> T) -> T {
        let pos = self.driver.tell();
        let out = f(self);
        if self.driver.seek(pos).is_err() {
            warn!("failed to restore file cursor to {}", pos);
        }
        out
    }

    fn write_at_end(&mut self, bytes: &[u8]) -> usize {
        let size = self.driver.size();
        if self.driver.seek(size).is_err() {
            return 0;
        }
        self.driver.write(bytes).unwrap_or(0)
    }

    fn append_bytes(&mut self, bytes: &[u8], keep_index: bool) -> usize {
        if !self.file_open {
            return 0;
        }
        if keep_index {
            self.restoring_cursor(|device| device.write_at_end(bytes))
        } else {
            self.write_at_end(bytes)
        }
    }

    fn find_forward(&mut self, pattern: &[u8]) -> i64 {
        if !self.file_open {
            return -1;
        }
        self.restoring_cursor(|device| search::scan_forward(&mut device.driver, pattern))
    }

    fn find_backward(&mut self, pattern: &[u8]) -> i64 {
        if !self.file_open {
            return -1;
        }
        self.restoring_cursor(|device| search::scan_backward(&mut device.driver, pattern))
    }

    /// Walks the open directory stream, feeding each entry to `visit` until
    /// the end marker, then closes the directory cursor.
    fn scan_directory(&mut self, path: &str, mut visit: impl FnMut(&NativeStat)) -> bool {
        if self.driver.open_dir(path).is_err() {
            return false;
        }
        while let Ok(info) = self.driver.read_dir() {
            if info.is_end_marker() {
                break;
            }
            visit(&info);
        }
        let _ = self.driver.close_dir();
        true
    }
}

impl<D: VolumeDriver> StorageDevice for FatStorageDevice<D> {
    fn mount(&mut self) -> bool {
        if self.mounted {
            return false;
        }
        match self.driver.mount(&self.volume) {
            Ok(()) => {
                debug!("mounted volume {:?}", self.volume);
                self.mounted = true;
                true
            }
            Err(err) => {
                warn!("mount of volume {:?} failed: {}", self.volume, err);
                false
            }
        }
    }

    fn unmount(&mut self) -> bool {
        if !self.mounted {
            return false;
        }
        // The flag clears even if the driver objects: a yanked card must not
        // stay logically mounted.
        self.mounted = false;
        match self.driver.unmount(&self.volume) {
            Ok(()) => {
                debug!("unmounted volume {:?}", self.volume);
                true
            }
            Err(err) => {
                warn!("unmount of volume {:?} failed: {}", self.volume, err);
                false
            }
        }
    }

    fn is_mounted(&self) -> bool {
        self.mounted
    }

    fn open_file(&mut self, path: &str, access: AccessFlags) -> bool {
        if self.file_open {
            let _ = self.driver.close();
            self.file_open = false;
        }
        self.current_path = Some(path.to_string());
        match self.driver.open(path, access.to_native()) {
            Ok(()) => {
                self.file_open = true;
                true
            }
            Err(err) => {
                debug!("open of {:?} failed: {}", path, err);
                false
            }
        }
    }

    fn close_file(&mut self) -> bool {
        if !self.file_open {
            return false;
        }
        self.file_open = false;
        self.driver.close().is_ok()
    }

    fn is_file_open(&self) -> bool {
        self.file_open
    }

    fn current_file_path(&self) -> Option<&str> {
        self.current_path.as_deref()
    }

    fn seek(&mut self, offset: u64) -> bool {
        if !self.file_open {
            return false;
        }
        let clamped = offset.min(self.driver.size());
        self.driver.seek(clamped).is_ok()
    }

    fn seek_start(&mut self) -> bool {
        if !self.file_open {
            return false;
        }
        self.driver.seek(0).is_ok()
    }

    fn seek_end(&mut self) -> bool {
        if !self.file_open {
            return false;
        }
        let size = self.driver.size();
        self.driver.seek(size).is_ok()
    }

    fn seek_step(&mut self, delta: i64) -> bool {
        if !self.file_open {
            return false;
        }
        let cursor = self.driver.tell();
        let target = if delta.is_negative() {
            cursor.saturating_sub(delta.unsigned_abs())
        } else {
            cursor.saturating_add(delta as u64)
        };
        self.driver.seek(target.min(self.driver.size())).is_ok()
    }

    fn cursor(&self) -> u64 {
        self.driver.tell()
    }

    fn file_size(&mut self) -> u64 {
        if self.file_open {
            return self.driver.size();
        }
        match self.current_path.clone() {
            Some(path) => self.file_size_at(&path),
            None => 0,
        }
    }

    fn file_size_at(&mut self, path: &str) -> u64 {
        self.driver.stat(path).map(|info| info.size).unwrap_or(0)
    }

    fn free_space(&mut self) -> u64 {
        self.driver
            .free_space(&self.volume)
            .map(|info| info.free_bytes())
            .unwrap_or(0)
    }

    fn total_space(&mut self) -> u64 {
        self.driver
            .free_space(&self.volume)
            .map(|info| info.total_bytes())
            .unwrap_or(0)
    }

    fn space_used_percentage(&mut self) -> f32 {
        match self.driver.free_space(&self.volume) {
            Ok(info) if info.total_bytes() > 0 => {
                let used = info.total_bytes() - info.free_bytes();
                (used as f64 / info.total_bytes() as f64 * 100.0) as f32
            }
            _ => 0.0,
        }
    }

    fn read_buffer(&mut self, buf: &mut [u8]) -> usize {
        if !self.file_open {
            return 0;
        }
        self.driver.read(buf).unwrap_or(0)
    }

    fn read_character(&mut self) -> char {
        if !self.file_open {
            return '\0';
        }
        let mut byte = [0u8; 1];
        match self.driver.read(&mut byte) {
            Ok(1) => byte[0] as char,
            _ => '\0',
        }
    }

    fn read_all(&mut self) -> Vec<u8> {
        if !self.file_open {
            return Vec::new();
        }
        let remaining = self.driver.size().saturating_sub(self.driver.tell()) as usize;
        let mut buf = vec![0u8; remaining];
        let count = self.driver.read(&mut buf).unwrap_or(0);
        buf.truncate(count);
        buf
    }

    fn read_line(&mut self, from_start_of_line: bool) -> String {
        if !self.file_open {
            return String::new();
        }
        if from_start_of_line {
            let newline = self.find_previous_character('\n');
            let target = if newline < 0 { 0 } else { newline as u64 + 1 };
            if self.driver.seek(target).is_err() {
                return String::new();
            }
        }
        let mut line = Vec::new();
        while line.len() < MAX_LINE_BYTES {
            let mut byte = [0u8; 1];
            match self.driver.read(&mut byte) {
                Ok(1) => {
                    line.push(byte[0]);
                    if byte[0] == b'\n' {
                        break;
                    }
                }
                _ => break,
            }
        }
        String::from_utf8_lossy(&line).into_owned()
    }

    fn write_buffer(&mut self, buf: &[u8]) -> usize {
        if !self.file_open {
            return 0;
        }
        self.driver.write(buf).unwrap_or(0)
    }

    fn write_str(&mut self, s: &str) -> usize {
        if !self.file_open {
            return 0;
        }
        match self.driver.write(s.as_bytes()) {
            Ok(_) => s.len() + 1,
            Err(_) => 0,
        }
    }

    fn write_character(&mut self, c: char) -> usize {
        if !self.file_open {
            return 0;
        }
        let mut encoded = [0u8; 4];
        let bytes = c.encode_utf8(&mut encoded).as_bytes();
        self.driver.write(bytes).unwrap_or(0)
    }

    fn append_buffer(&mut self, buf: &[u8], keep_index: bool) -> usize {
        self.append_bytes(buf, keep_index)
    }

    fn append_str(&mut self, s: &str, keep_index: bool) -> usize {
        if !self.file_open {
            return 0;
        }
        if self.append_bytes(s.as_bytes(), keep_index) == s.len() {
            s.len() + 1
        } else {
            0
        }
    }

    fn append_character(&mut self, c: char, keep_index: bool) -> usize {
        let mut encoded = [0u8; 4];
        let bytes = c.encode_utf8(&mut encoded).as_bytes();
        self.append_bytes(bytes, keep_index)
    }

    fn find_next_buffer(&mut self, pattern: &[u8]) -> i64 {
        self.find_forward(pattern)
    }

    fn find_next_str(&mut self, pattern: &str) -> i64 {
        self.find_forward(pattern.as_bytes())
    }

    fn find_next_character(&mut self, c: char) -> i64 {
        let mut encoded = [0u8; 4];
        let bytes = c.encode_utf8(&mut encoded).as_bytes();
        self.find_forward(bytes)
    }

    fn find_previous_buffer(&mut self, pattern: &[u8]) -> i64 {
        self.find_backward(pattern)
    }

    fn find_previous_str(&mut self, pattern: &str) -> i64 {
        self.find_backward(pattern.as_bytes())
    }

    fn find_previous_character(&mut self, c: char) -> i64 {
        let mut encoded = [0u8; 4];
        let bytes = c.encode_utf8(&mut encoded).as_bytes();
        self.find_backward(bytes)
    }

    fn clear_range(&mut self, begin: u64, end: u64) -> bool {
        if !self.file_open {
            return false;
        }
        let size = self.driver.size();
        let end = end.min(size);
        let begin = begin.min(end);
        let removed = end - begin;
        let prev = self.driver.tell();

        let ok = if end == size {
            self.driver.seek(begin).is_ok() && self.driver.truncate().is_ok()
        } else {
            let tail_len = (size - end) as usize;
            let mut tail = vec![0u8; tail_len];
            let tail_read = self.driver.seek(end).is_ok()
                && matches!(self.driver.read(&mut tail), Ok(n) if n == tail_len);
            tail_read
                && self.driver.seek(begin).is_ok()
                && self.driver.truncate().is_ok()
                && matches!(self.driver.write(&tail), Ok(n) if n == tail_len)
        };

        if ok {
            // Cursor rule: untouched before the hole, the hole collapses to
            // its begin, everything after shifts left with the content.
            let target = if prev < begin {
                prev
            } else if prev < end {
                begin
            } else {
                prev - removed
            };
            let _ = self.driver.seek(target.min(self.driver.size()));
        }
        ok
    }

    fn clear_from(&mut self, begin: u64) -> bool {
        if !self.file_open {
            return false;
        }
        let begin = begin.min(self.driver.size());
        let prev = self.driver.tell();
        if self.driver.seek(begin).is_err() || self.driver.truncate().is_err() {
            return false;
        }
        let restored = if prev > begin {
            self.driver.size()
        } else {
            prev
        };
        let _ = self.driver.seek(restored);
        true
    }

    fn delete(&mut self) -> bool {
        let Some(path) = self.current_path.clone() else {
            return false;
        };
        if self.file_open {
            let _ = self.driver.close();
            self.file_open = false;
        }
        self.driver.unlink(&path).is_ok()
    }

    fn delete_path(&mut self, path: &str) -> bool {
        if self.file_open && self.current_path.as_deref() == Some(path) {
            let _ = self.driver.close();
            self.file_open = false;
        }
        self.driver.unlink(path).is_ok()
    }

    fn exists(&mut self, path: &str) -> bool {
        self.driver.stat(path).is_ok()
    }

    fn change_directory(&mut self, path: &str) -> bool {
        self.driver.change_dir(path).is_ok()
    }

    fn create_directory(&mut self, path: &str) -> bool {
        self.driver.make_dir(path).is_ok()
    }

    fn move_entry(&mut self, from: &str, to: &str) -> bool {
        self.driver.rename(from, to).is_ok()
    }

    fn rename(&mut self, from: &str, to: &str) -> bool {
        self.driver.rename(from, to).is_ok()
    }

    fn peek_directory(&mut self, path: &str) -> Vec<DirectoryEntry> {
        if self.driver.open_dir(path).is_err() {
            return Vec::new();
        }

        // Pass one counts to the end marker so the result is allocated at
        // its exact size; pass two rewinds and fills it.
        let mut count = 0;
        while let Ok(info) = self.driver.read_dir() {
            if info.is_end_marker() {
                break;
            }
            count += 1;
        }

        let mut entries = Vec::with_capacity(count);
        if self.driver.rewind_dir().is_ok() {
            while entries.len() < count {
                match self.driver.read_dir() {
                    Ok(info) if !info.is_end_marker() => {
                        entries.push(DirectoryEntry::from_stat(&info));
                    }
                    _ => break,
                }
            }
        }
        let _ = self.driver.close_dir();
        entries
    }

    fn directory_entry(&mut self, path: &str) -> Option<DirectoryEntry> {
        self.driver
            .stat(path)
            .map(|info| DirectoryEntry::from_stat(&info))
            .ok()
    }

    fn total_count_in_directory(&mut self, path: &str) -> usize {
        let mut count = 0;
        self.scan_directory(path, |_| count += 1);
        count
    }

    fn file_count_in_directory(&mut self, path: &str) -> usize {
        let mut count = 0;
        self.scan_directory(path, |info| {
            if info.attributes & am::DIRECTORY == 0 {
                count += 1;
            }
        });
        count
    }

    fn directory_count_in_directory(&mut self, path: &str) -> usize {
        let mut count = 0;
        self.scan_directory(path, |info| {
            if info.attributes & am::DIRECTORY != 0 {
                count += 1;
            }
        });
        count
    }
}

impl<D: VolumeDriver> Drop for FatStorageDevice<D> {
    fn drop(&mut self) {
        if self.file_open {
            let _ = self.driver.close();
            self.file_open = false;
        }
        if self.mounted {
            self.mounted = false;
            let _ = self.driver.unmount(&self.volume);
        }
    }
}
