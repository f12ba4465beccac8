use bitflags::bitflags;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::driver::{am, fa, NativeStat};
use crate::timestamp;

bitflags! {
    /// Capability set accepted by [`StorageDevice::open_file`].
    ///
    /// Translated to the driver's native mode encoding internally; the
    /// translation is an implementation detail of each device.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct AccessFlags: u32 {
        const READ = 1 << 0;
        const WRITE = 1 << 1;
        const OPEN_EXISTING = 1 << 2;
        const OPEN_ALWAYS = 1 << 3;
        const OPEN_APPEND = 1 << 4;
        const CREATE_NEW = 1 << 5;
        const CREATE_ALWAYS = 1 << 6;
    }
}

impl AccessFlags {
    /// Maps the capability set onto the driver's native mode byte.
    pub fn to_native(self) -> u8 {
        let mut mode = fa::OPEN_EXISTING;
        if self.contains(AccessFlags::READ) {
            mode |= fa::READ;
        }
        if self.contains(AccessFlags::WRITE) {
            mode |= fa::WRITE;
        }
        if self.contains(AccessFlags::OPEN_ALWAYS) {
            mode |= fa::OPEN_ALWAYS;
        }
        if self.contains(AccessFlags::OPEN_APPEND) {
            mode |= fa::OPEN_APPEND;
        }
        if self.contains(AccessFlags::CREATE_NEW) {
            mode |= fa::CREATE_NEW;
        }
        if self.contains(AccessFlags::CREATE_ALWAYS) {
            mode |= fa::CREATE_ALWAYS;
        }
        mode
    }
}

/// Directory listing entry. A plain value: its lifetime is independent of
/// the directory cursor that produced it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryEntry {
    pub name: String,
    pub date_modified: u16,
    pub time_modified: u16,
    pub is_readonly: bool,
    pub is_hidden: bool,
    pub is_system: bool,
    pub is_archive: bool,
    pub is_directory: bool,
}

impl DirectoryEntry {
    pub fn from_stat(info: &NativeStat) -> Self {
        DirectoryEntry {
            name: info.name.clone(),
            date_modified: info.date,
            time_modified: info.time,
            is_readonly: info.attributes & am::READ_ONLY != 0,
            is_hidden: info.attributes & am::HIDDEN != 0,
            is_system: info.attributes & am::SYSTEM != 0,
            is_archive: info.attributes & am::ARCHIVE != 0,
            is_directory: info.attributes & am::DIRECTORY != 0,
        }
    }

    /// Decoded modification timestamp, when the packed words hold a valid
    /// calendar value.
    pub fn modified_at(&self) -> Option<NaiveDateTime> {
        timestamp::decode(self.date_modified, self.time_modified)
    }
}

/// The capability surface every FAT-backed removable device implements,
/// independent of bus type.
///
/// Return conventions are inherited from the underlying driver family:
/// operations report failure through `false`, `0`, `-1` or empty
/// collections rather than a distinguishable error, and an operation issued
/// while the volume is unmounted fails silently the same way. Callers that
/// need the cause should consult the device's driver directly.
///
/// A device owns at most one open file; opening a second file implicitly
/// closes the first. The byte cursor lives in the driver handle and is
/// clamped to `[0, file_size]` by every seek.
pub trait StorageDevice: Send {
    // Lifecycle.

    /// Mounts the volume. Returns `false` if already mounted (the driver is
    /// not re-invoked) or if the driver refuses the mount.
    fn mount(&mut self) -> bool;
    /// Unmounts the volume. Returns `false` if not mounted.
    fn unmount(&mut self) -> bool;
    fn is_mounted(&self) -> bool;

    /// Opens `path`, closing any previously open file first.
    fn open_file(&mut self, path: &str, access: AccessFlags) -> bool;
    /// Closes the open file; `false` when nothing is open.
    fn close_file(&mut self) -> bool;
    fn is_file_open(&self) -> bool;
    /// Path handed to the most recent `open_file`, successful or not.
    fn current_file_path(&self) -> Option<&str>;

    // Cursor.

    /// Absolute seek, clamped to the file size.
    fn seek(&mut self, offset: u64) -> bool;
    fn seek_start(&mut self) -> bool;
    fn seek_end(&mut self) -> bool;
    /// Relative seek; the target is clamped to `[0, file_size]`.
    fn seek_step(&mut self, delta: i64) -> bool;
    /// Current cursor position; 0 when no file is open.
    fn cursor(&self) -> u64;

    // Sizes and space accounting.

    /// Size of the open file, falling back to a stat of the current path.
    fn file_size(&mut self) -> u64;
    fn file_size_at(&mut self, path: &str) -> u64;
    fn free_space(&mut self) -> u64;
    fn total_space(&mut self) -> u64;
    /// Percentage of the volume in use, `0.0` when geometry is unavailable.
    fn space_used_percentage(&mut self) -> f32;

    // Sequential reads from the cursor.

    fn read_buffer(&mut self, buf: &mut [u8]) -> usize;
    /// Reads a single byte; `'\0'` at end of file or with no file open.
    fn read_character(&mut self) -> char;
    /// Reads everything from the cursor to the end of file. The buffer is
    /// allocated at exactly the remaining size.
    fn read_all(&mut self) -> Vec<u8>;
    /// Reads a line bounded at 4096 bytes, newline included. With
    /// `from_start_of_line` the cursor is first moved just past the previous
    /// newline (or to offset 0 when there is none).
    fn read_line(&mut self, from_start_of_line: bool) -> String;

    // Sequential writes at the cursor.

    fn write_buffer(&mut self, buf: &[u8]) -> usize;
    /// Writes the string bytes and reports `len + 1`, counting an implicit
    /// terminator. The convention is inherited; keep it.
    fn write_str(&mut self, s: &str) -> usize;
    fn write_character(&mut self, c: char) -> usize;

    // Appends: seek to end of file, write, and with `keep_index` restore
    // the pre-append cursor.

    fn append_buffer(&mut self, buf: &[u8], keep_index: bool) -> usize;
    fn append_str(&mut self, s: &str, keep_index: bool) -> usize;
    fn append_character(&mut self, c: char, keep_index: bool) -> usize;

    // Content search. All six scan from the current cursor with a sliding
    // window the length of the pattern, return the absolute offset of the
    // start of the match or -1, and restore the cursor on every exit path.

    fn find_next_buffer(&mut self, pattern: &[u8]) -> i64;
    fn find_next_str(&mut self, pattern: &str) -> i64;
    fn find_next_character(&mut self, c: char) -> i64;
    fn find_previous_buffer(&mut self, pattern: &[u8]) -> i64;
    fn find_previous_str(&mut self, pattern: &str) -> i64;
    fn find_previous_character(&mut self, c: char) -> i64;

    // Range deletion.

    /// Deletes the byte range `[begin, end)`, shifting any tail left so the
    /// content after `end` directly follows `begin`. `end` is clamped to the
    /// file size; `end == size` is a pure truncate.
    fn clear_range(&mut self, begin: u64, end: u64) -> bool;
    /// Truncates everything from `begin` onward. A cursor inside the deleted
    /// region lands at the new end of file.
    fn clear_from(&mut self, begin: u64) -> bool;

    // Entry management.

    /// Unlinks the current file, closing it first if open.
    fn delete(&mut self) -> bool;
    /// Unlinks `path`; when it names the currently open file, closes first.
    fn delete_path(&mut self, path: &str) -> bool;
    /// `true` when a stat of `path` succeeds.
    fn exists(&mut self, path: &str) -> bool;

    // Directory operations.

    fn change_directory(&mut self, path: &str) -> bool;
    fn create_directory(&mut self, path: &str) -> bool;
    /// Moves/renames an entry. `move_entry` and `rename` are synonyms.
    fn move_entry(&mut self, from: &str, to: &str) -> bool;
    fn rename(&mut self, from: &str, to: &str) -> bool;
    /// Lists a directory with two passes: one to count entries, one to fill
    /// an exactly-sized vector. Empty when the directory cannot be opened.
    fn peek_directory(&mut self, path: &str) -> Vec<DirectoryEntry>;
    fn directory_entry(&mut self, path: &str) -> Option<DirectoryEntry>;
    fn total_count_in_directory(&mut self, path: &str) -> usize;
    fn file_count_in_directory(&mut self, path: &str) -> usize;
    fn directory_count_in_directory(&mut self, path: &str) -> usize;
}
