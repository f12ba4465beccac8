// Volume driver backed by a host directory.
// Serves a folder of the host filesystem through the driver contract, with
// FAT-style attribute and timestamp mapping. Paths are virtual, rooted at
// the served directory; `..` components cannot escape it.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use log::debug;

use carddock_core::driver::{am, fa, DriverResult, NativeStat, SpaceInfo, VolumeDriver};
use carddock_core::error::DriverError;
use carddock_core::timestamp;

const BYTES_PER_SECTOR: u32 = 512;
const SECTORS_PER_CLUSTER: u32 = 8;
const DEFAULT_TOTAL_CLUSTERS: u32 = 4096;

struct OpenFile {
    file: File,
    cursor: u64,
    mode: u8,
}

struct DirCursor {
    entries: Vec<NativeStat>,
    next: usize,
}

/// Driver serving a host directory as a removable volume.
pub struct HostDriver {
    root: PathBuf,
    cwd: String,
    mounted: bool,
    open: Option<OpenFile>,
    dir: Option<DirCursor>,
    total_clusters: u32,
}

impl HostDriver {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        HostDriver {
            root: root.into(),
            cwd: String::new(),
            mounted: false,
            open: None,
            dir: None,
            total_clusters: DEFAULT_TOTAL_CLUSTERS,
        }
    }

    /// Overrides the synthetic volume size used for space accounting.
    pub fn with_total_clusters(mut self, clusters: u32) -> Self {
        self.total_clusters = clusters;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn check(&self) -> DriverResult<()> {
        if !self.mounted {
            return Err(DriverError::NotMounted);
        }
        Ok(())
    }

    /// Normalizes `path` against the virtual working directory: absolute,
    /// no trailing slash, empty string for the volume root.
    fn virtual_path(&self, path: &str) -> String {
        let joined = if path.starts_with('/') {
            path.to_string()
        } else {
            format!("{}/{}", self.cwd, path)
        };
        let mut parts: Vec<&str> = Vec::new();
        for part in joined.split('/') {
            match part {
                "" | "." => {}
                ".." => {
                    parts.pop();
                }
                other => parts.push(other),
            }
        }
        if parts.is_empty() {
            String::new()
        } else {
            format!("/{}", parts.join("/"))
        }
    }

    fn resolve(&self, path: &str) -> PathBuf {
        let virtual_path = self.virtual_path(path);
        let mut resolved = self.root.clone();
        for part in virtual_path.split('/').filter(|p| !p.is_empty()) {
            resolved.push(part);
        }
        resolved
    }

    fn open_file_mut(&mut self) -> DriverResult<&mut OpenFile> {
        self.open.as_mut().ok_or(DriverError::InvalidObject)
    }

    fn stat_host(path: &Path) -> DriverResult<NativeStat> {
        let meta = fs::metadata(path).map_err(map_io)?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let (date, time) = meta
            .modified()
            .ok()
            .map(|mtime| {
                let local: DateTime<Local> = mtime.into();
                timestamp::encode(local.naive_local())
            })
            .unwrap_or((0, 0));

        let mut attributes = if meta.is_dir() {
            am::DIRECTORY
        } else {
            am::ARCHIVE
        };
        if meta.permissions().readonly() {
            attributes |= am::READ_ONLY;
        }

        Ok(NativeStat {
            name,
            size: if meta.is_dir() { 0 } else { meta.len() },
            date,
            time,
            attributes,
        })
    }

    fn used_clusters(path: &Path) -> u64 {
        let cluster_bytes = (BYTES_PER_SECTOR * SECTORS_PER_CLUSTER) as u64;
        let Ok(entries) = fs::read_dir(path) else {
            return 0;
        };
        entries
            .flatten()
            .map(|entry| {
                let path = entry.path();
                if path.is_dir() {
                    1 + Self::used_clusters(&path)
                } else {
                    let size = entry.metadata().map(|m| m.len()).unwrap_or(0);
                    size.div_ceil(cluster_bytes).max(1)
                }
            })
            .sum()
    }
}

fn map_io(err: io::Error) -> DriverError {
    match err.kind() {
        io::ErrorKind::NotFound => DriverError::NoFile,
        io::ErrorKind::AlreadyExists => DriverError::Exists,
        io::ErrorKind::PermissionDenied => DriverError::Denied,
        _ => DriverError::Disk,
    }
}

impl VolumeDriver for HostDriver {
    fn mount(&mut self, volume: &str) -> DriverResult<()> {
        if !self.root.is_dir() {
            return Err(DriverError::NotReady);
        }
        debug!("serving {:?} as volume {:?}", self.root, volume);
        self.mounted = true;
        Ok(())
    }

    fn unmount(&mut self, _volume: &str) -> DriverResult<()> {
        self.mounted = false;
        self.open = None;
        self.dir = None;
        Ok(())
    }

    fn open(&mut self, path: &str, mode: u8) -> DriverResult<()> {
        self.check()?;
        let resolved = self.resolve(path);
        if resolved.is_dir() {
            return Err(DriverError::Denied);
        }

        let mut options = OpenOptions::new();
        options
            .read(mode & fa::READ != 0)
            .write(mode & fa::WRITE != 0);
        if mode & fa::CREATE_NEW != 0 {
            options.write(true).create_new(true);
        } else if mode & fa::CREATE_ALWAYS != 0 {
            options.write(true).create(true).truncate(true);
        } else if mode & fa::OPEN_ALWAYS != 0 {
            options.write(true).create(true);
        }

        let mut file = options.open(&resolved).map_err(map_io)?;
        let cursor = if mode & fa::OPEN_APPEND == fa::OPEN_APPEND {
            file.seek(SeekFrom::End(0)).map_err(map_io)?
        } else {
            0
        };
        self.open = Some(OpenFile { file, cursor, mode });
        Ok(())
    }

    fn close(&mut self) -> DriverResult<()> {
        self.check()?;
        self.open.take().map(|_| ()).ok_or(DriverError::InvalidObject)
    }

    fn read(&mut self, buf: &mut [u8]) -> DriverResult<usize> {
        self.check()?;
        let open = self.open_file_mut()?;
        if open.mode & fa::READ == 0 {
            return Err(DriverError::Denied);
        }
        let mut total = 0;
        while total < buf.len() {
            match open.file.read(&mut buf[total..]) {
                Ok(0) => break,
                Ok(n) => total += n,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(map_io(err)),
            }
        }
        open.cursor += total as u64;
        Ok(total)
    }

    fn write(&mut self, buf: &[u8]) -> DriverResult<usize> {
        self.check()?;
        let open = self.open_file_mut()?;
        if open.mode & fa::WRITE == 0 {
            return Err(DriverError::Denied);
        }
        open.file.write_all(buf).map_err(map_io)?;
        open.cursor += buf.len() as u64;
        Ok(buf.len())
    }

    fn seek(&mut self, offset: u64) -> DriverResult<()> {
        self.check()?;
        let open = self.open_file_mut()?;
        let size = open.file.metadata().map_err(map_io)?.len();
        let clamped = offset.min(size);
        open.file.seek(SeekFrom::Start(clamped)).map_err(map_io)?;
        open.cursor = clamped;
        Ok(())
    }

    fn tell(&self) -> u64 {
        self.open.as_ref().map(|open| open.cursor).unwrap_or(0)
    }

    fn size(&self) -> u64 {
        self.open
            .as_ref()
            .and_then(|open| open.file.metadata().ok())
            .map(|meta| meta.len())
            .unwrap_or(0)
    }

    fn truncate(&mut self) -> DriverResult<()> {
        self.check()?;
        let open = self.open_file_mut()?;
        if open.mode & fa::WRITE == 0 {
            return Err(DriverError::Denied);
        }
        open.file.set_len(open.cursor).map_err(map_io)
    }

    fn stat(&mut self, path: &str) -> DriverResult<NativeStat> {
        self.check()?;
        if self.virtual_path(path).is_empty() {
            return Err(DriverError::InvalidParameter);
        }
        Self::stat_host(&self.resolve(path))
    }

    fn open_dir(&mut self, path: &str) -> DriverResult<()> {
        self.check()?;
        let resolved = self.resolve(path);
        if !resolved.is_dir() {
            return Err(DriverError::NoPath);
        }
        let mut entries: Vec<NativeStat> = fs::read_dir(&resolved)
            .map_err(map_io)?
            .flatten()
            .filter_map(|entry| Self::stat_host(&entry.path()).ok())
            .collect();
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        self.dir = Some(DirCursor { entries, next: 0 });
        Ok(())
    }

    fn read_dir(&mut self) -> DriverResult<NativeStat> {
        self.check()?;
        let dir = self.dir.as_mut().ok_or(DriverError::InvalidObject)?;
        match dir.entries.get(dir.next) {
            Some(entry) => {
                dir.next += 1;
                Ok(entry.clone())
            }
            None => Ok(NativeStat::default()),
        }
    }

    fn rewind_dir(&mut self) -> DriverResult<()> {
        self.check()?;
        let dir = self.dir.as_mut().ok_or(DriverError::InvalidObject)?;
        dir.next = 0;
        Ok(())
    }

    fn close_dir(&mut self) -> DriverResult<()> {
        self.check()?;
        self.dir.take().map(|_| ()).ok_or(DriverError::InvalidObject)
    }

    fn change_dir(&mut self, path: &str) -> DriverResult<()> {
        self.check()?;
        let virtual_path = self.virtual_path(path);
        if !self.resolve(path).is_dir() {
            return Err(DriverError::NoPath);
        }
        self.cwd = virtual_path;
        Ok(())
    }

    fn make_dir(&mut self, path: &str) -> DriverResult<()> {
        self.check()?;
        fs::create_dir(self.resolve(path)).map_err(|err| match err.kind() {
            io::ErrorKind::NotFound => DriverError::NoPath,
            _ => map_io(err),
        })
    }

    fn rename(&mut self, from: &str, to: &str) -> DriverResult<()> {
        self.check()?;
        let source = self.resolve(from);
        if !source.exists() {
            return Err(DriverError::NoFile);
        }
        let target = self.resolve(to);
        if target.exists() {
            return Err(DriverError::Exists);
        }
        fs::rename(source, target).map_err(map_io)
    }

    fn unlink(&mut self, path: &str) -> DriverResult<()> {
        self.check()?;
        let resolved = self.resolve(path);
        let meta = fs::metadata(&resolved).map_err(map_io)?;
        if meta.is_dir() {
            fs::remove_dir(&resolved).map_err(|_| DriverError::Denied)
        } else {
            fs::remove_file(&resolved).map_err(map_io)
        }
    }

    fn free_space(&mut self, _volume: &str) -> DriverResult<SpaceInfo> {
        self.check()?;
        let used = Self::used_clusters(&self.root);
        Ok(SpaceInfo {
            free_clusters: self.total_clusters.saturating_sub(used as u32),
            total_clusters: self.total_clusters,
            sectors_per_cluster: SECTORS_PER_CLUSTER,
            bytes_per_sector: BYTES_PER_SECTOR,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use carddock_core::{AccessFlags, StorageDevice};
    use carddock_fat::FatStorageDevice;
    use tempfile::TempDir;

    fn scratch_volume() -> (TempDir, FatStorageDevice<HostDriver>) {
        let dir = TempDir::new().expect("temp dir");
        let mut device = FatStorageDevice::new(HostDriver::new(dir.path()), "0:");
        assert!(device.mount(), "mount failed");
        (dir, device)
    }

    #[test]
    fn mount_requires_an_existing_root() {
        let mut driver = HostDriver::new("/definitely/not/a/real/root");
        assert_eq!(driver.mount("0:"), Err(DriverError::NotReady));
    }

    #[test]
    fn roundtrip_through_a_real_directory() {
        let (_dir, mut device) = scratch_volume();
        assert!(device.open_file(
            "/hello.txt",
            AccessFlags::READ | AccessFlags::WRITE | AccessFlags::CREATE_ALWAYS
        ));
        assert_eq!(device.write_str("hello host"), 11);
        assert!(device.close_file());

        assert!(device.open_file("/hello.txt", AccessFlags::READ | AccessFlags::OPEN_EXISTING));
        assert_eq!(device.read_all(), b"hello host");
    }

    #[test]
    fn search_and_clear_work_on_host_files() {
        let (_dir, mut device) = scratch_volume();
        assert!(device.open_file(
            "/f.txt",
            AccessFlags::READ | AccessFlags::WRITE | AccessFlags::CREATE_ALWAYS
        ));
        device.write_buffer(b"abcXYZdef");
        assert!(device.seek_start());
        assert_eq!(device.find_next_str("XYZ"), 3);

        assert!(device.clear_range(3, 6));
        assert!(device.seek_start());
        assert_eq!(device.read_all(), b"abcdef");
    }

    #[test]
    fn directory_listing_reflects_host_tree() {
        let (dir, mut device) = scratch_volume();
        std::fs::write(dir.path().join("a.txt"), b"a").unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();

        let entries = device.peek_directory("/");
        assert_eq!(entries.len(), 2);
        assert_eq!(device.file_count_in_directory("/"), 1);
        assert_eq!(device.directory_count_in_directory("/"), 1);
        let sub = entries.iter().find(|e| e.name == "sub").unwrap();
        assert!(sub.is_directory);
    }

    #[test]
    fn parent_components_cannot_escape_the_root() {
        let (dir, mut device) = scratch_volume();
        std::fs::write(dir.path().join("inside.txt"), b"x").unwrap();
        assert!(device.exists("/../inside.txt"), "`..` at the root stays at the root");
        assert!(!device.exists("/../../etc"), "nothing outside the root resolves");
    }

    #[test]
    fn stat_carries_a_plausible_timestamp() {
        let (dir, mut device) = scratch_volume();
        std::fs::write(dir.path().join("now.txt"), b"x").unwrap();
        let entry = device.directory_entry("/now.txt").expect("entry");
        let modified = entry.modified_at().expect("decodable mtime");
        assert!(modified.and_utc().timestamp() > 0);
    }

    #[test]
    fn delete_and_mkdir_against_the_host() {
        let (dir, mut device) = scratch_volume();
        assert!(device.create_directory("/logs"));
        assert!(dir.path().join("logs").is_dir());

        std::fs::write(dir.path().join("logs/old.txt"), b"x").unwrap();
        assert!(device.delete_path("/logs/old.txt"));
        assert!(!dir.path().join("logs/old.txt").exists());
    }
}
