/// Test utilities and mock implementations for driver-free testing.
///
/// [`MemoryDriver`] is a complete in-memory [`VolumeDriver`]: a tree of
/// directories and files, one open-file cursor, one open-directory cursor,
/// native flag handling and synthetic cluster geometry. It never touches
/// hardware, so every storage-device behavior can be exercised in plain
/// unit tests.
use std::collections::BTreeMap;

use crate::driver::{am, fa, DriverResult, NativeStat, SpaceInfo, VolumeDriver};
use crate::error::DriverError;

const BYTES_PER_SECTOR: u32 = 512;
const SECTORS_PER_CLUSTER: u32 = 8;
const TOTAL_CLUSTERS: u32 = 1024;

// 2024-01-01 12:00:00 packed as FAT date/time words.
const STAMP_DATE: u16 = (44 << 9) | (1 << 5) | 1;
const STAMP_TIME: u16 = 12 << 11;

#[derive(Debug, Clone)]
enum Node {
    Directory,
    File { data: Vec<u8>, attributes: u8 },
}

#[derive(Debug)]
struct OpenFile {
    path: String,
    cursor: u64,
    mode: u8,
}

#[derive(Debug)]
struct DirCursor {
    entries: Vec<NativeStat>,
    next: usize,
}

/// In-memory volume driver for tests and demos.
pub struct MemoryDriver {
    nodes: BTreeMap<String, Node>,
    cwd: String,
    mounted: bool,
    open: Option<OpenFile>,
    dir: Option<DirCursor>,
    fail_all: bool,
    mount_calls: usize,
}

impl MemoryDriver {
    pub fn new() -> Self {
        MemoryDriver {
            nodes: BTreeMap::new(),
            cwd: String::new(),
            mounted: false,
            open: None,
            dir: None,
            fail_all: false,
            mount_calls: 0,
        }
    }

    /// Builds a driver pre-seeded with files; missing parent directories are
    /// created along the way.
    pub fn with_files(files: &[(&str, &[u8])]) -> Self {
        let mut driver = MemoryDriver::new();
        for (path, data) in files {
            driver.seed_file(path, data);
        }
        driver
    }

    /// Inserts a file directly, bypassing the mount and open-mode checks.
    pub fn seed_file(&mut self, path: &str, data: &[u8]) {
        let path = self.absolute(path);
        let mut parent = parent_of(&path).to_string();
        while !parent.is_empty() && !self.nodes.contains_key(&parent) {
            self.nodes.insert(parent.clone(), Node::Directory);
            parent = parent_of(&parent).to_string();
        }
        self.nodes.insert(
            path,
            Node::File {
                data: data.to_vec(),
                attributes: am::ARCHIVE,
            },
        );
    }

    /// Inserts a directory directly, for listing tests.
    pub fn seed_directory(&mut self, path: &str) {
        let path = self.absolute(path);
        self.nodes.insert(path, Node::Directory);
    }

    /// When set, every subsequent driver call reports a disk error.
    pub fn set_failing(&mut self, fail: bool) {
        self.fail_all = fail;
    }

    /// Number of times `mount` reached the driver.
    pub fn mount_calls(&self) -> usize {
        self.mount_calls
    }

    /// Raw file contents, for assertions.
    pub fn file_contents(&self, path: &str) -> Option<Vec<u8>> {
        match self.nodes.get(&self.absolute(path)) {
            Some(Node::File { data, .. }) => Some(data.clone()),
            _ => None,
        }
    }

    fn check(&self) -> DriverResult<()> {
        if self.fail_all {
            return Err(DriverError::Disk);
        }
        if !self.mounted {
            return Err(DriverError::NotMounted);
        }
        Ok(())
    }

    /// Normalizes `path` against the working directory: absolute, no
    /// trailing slash, empty string for the root.
    fn absolute(&self, path: &str) -> String {
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

    fn is_directory(&self, path: &str) -> bool {
        path.is_empty() || matches!(self.nodes.get(path), Some(Node::Directory))
    }

    fn children(&self, path: &str) -> Vec<NativeStat> {
        let prefix = format!("{}/", path);
        self.nodes
            .iter()
            .filter(|(key, _)| {
                key.starts_with(&prefix) && !key[prefix.len()..].contains('/')
            })
            .map(|(key, node)| stat_of(&key[prefix.len()..], node))
            .collect()
    }

    fn open_file_mut(&mut self) -> DriverResult<(&mut OpenFile, &mut Vec<u8>)> {
        let open = self.open.as_mut().ok_or(DriverError::InvalidObject)?;
        match self.nodes.get_mut(&open.path) {
            Some(Node::File { data, .. }) => Ok((open, data)),
            _ => Err(DriverError::InvalidObject),
        }
    }
}

impl Default for MemoryDriver {
    fn default() -> Self {
        Self::new()
    }
}

fn parent_of(path: &str) -> &str {
    match path.rfind('/') {
        Some(0) | None => "",
        Some(idx) => &path[..idx],
    }
}

fn leaf_of(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

fn stat_of(name: &str, node: &Node) -> NativeStat {
    match node {
        Node::Directory => NativeStat {
            name: name.to_string(),
            size: 0,
            date: STAMP_DATE,
            time: STAMP_TIME,
            attributes: am::DIRECTORY,
        },
        Node::File { data, attributes } => NativeStat {
            name: name.to_string(),
            size: data.len() as u64,
            date: STAMP_DATE,
            time: STAMP_TIME,
            attributes: *attributes,
        },
    }
}

impl VolumeDriver for MemoryDriver {
    fn mount(&mut self, _volume: &str) -> DriverResult<()> {
        self.mount_calls += 1;
        if self.fail_all {
            return Err(DriverError::Disk);
        }
        self.mounted = true;
        Ok(())
    }

    fn unmount(&mut self, _volume: &str) -> DriverResult<()> {
        if self.fail_all {
            return Err(DriverError::Disk);
        }
        self.mounted = false;
        Ok(())
    }

    fn open(&mut self, path: &str, mode: u8) -> DriverResult<()> {
        self.check()?;
        let path = self.absolute(path);
        if path.is_empty() || self.is_directory(&path) {
            return Err(DriverError::Denied);
        }
        if !self.is_directory(parent_of(&path)) {
            return Err(DriverError::NoPath);
        }

        let exists = self.nodes.contains_key(&path);
        let create_new = mode & fa::CREATE_NEW != 0;
        let create_always = mode & fa::CREATE_ALWAYS != 0;
        let open_always = mode & fa::OPEN_ALWAYS != 0;
        if create_new && exists {
            return Err(DriverError::Exists);
        }
        if !exists && !(create_new || create_always || open_always) {
            return Err(DriverError::NoFile);
        }
        if create_always || !exists {
            self.nodes.insert(
                path.clone(),
                Node::File {
                    data: Vec::new(),
                    attributes: am::ARCHIVE,
                },
            );
        }

        let size = match self.nodes.get(&path) {
            Some(Node::File { data, .. }) => data.len() as u64,
            _ => 0,
        };
        let cursor = if mode & fa::OPEN_APPEND == fa::OPEN_APPEND {
            size
        } else {
            0
        };
        self.open = Some(OpenFile { path, cursor, mode });
        Ok(())
    }

    fn close(&mut self) -> DriverResult<()> {
        self.check()?;
        self.open.take().map(|_| ()).ok_or(DriverError::InvalidObject)
    }

    fn read(&mut self, buf: &mut [u8]) -> DriverResult<usize> {
        self.check()?;
        let (open, data) = self.open_file_mut()?;
        if open.mode & fa::READ == 0 {
            return Err(DriverError::Denied);
        }
        let start = (open.cursor as usize).min(data.len());
        let count = buf.len().min(data.len() - start);
        buf[..count].copy_from_slice(&data[start..start + count]);
        open.cursor += count as u64;
        Ok(count)
    }

    fn write(&mut self, buf: &[u8]) -> DriverResult<usize> {
        self.check()?;
        let (open, data) = self.open_file_mut()?;
        if open.mode & fa::WRITE == 0 {
            return Err(DriverError::Denied);
        }
        let start = open.cursor as usize;
        let end = start + buf.len();
        if end > data.len() {
            data.resize(end, 0);
        }
        data[start..end].copy_from_slice(buf);
        open.cursor = end as u64;
        Ok(buf.len())
    }

    fn seek(&mut self, offset: u64) -> DriverResult<()> {
        self.check()?;
        let (open, data) = self.open_file_mut()?;
        open.cursor = offset.min(data.len() as u64);
        Ok(())
    }

    fn tell(&self) -> u64 {
        self.open.as_ref().map(|open| open.cursor).unwrap_or(0)
    }

    fn size(&self) -> u64 {
        match &self.open {
            Some(open) => match self.nodes.get(&open.path) {
                Some(Node::File { data, .. }) => data.len() as u64,
                _ => 0,
            },
            None => 0,
        }
    }

    fn truncate(&mut self) -> DriverResult<()> {
        self.check()?;
        let (open, data) = self.open_file_mut()?;
        if open.mode & fa::WRITE == 0 {
            return Err(DriverError::Denied);
        }
        data.truncate(open.cursor as usize);
        Ok(())
    }

    fn stat(&mut self, path: &str) -> DriverResult<NativeStat> {
        self.check()?;
        let path = self.absolute(path);
        if path.is_empty() {
            return Err(DriverError::InvalidParameter);
        }
        match self.nodes.get(&path) {
            Some(node) => Ok(stat_of(leaf_of(&path), node)),
            None => Err(DriverError::NoFile),
        }
    }

    fn open_dir(&mut self, path: &str) -> DriverResult<()> {
        self.check()?;
        let path = self.absolute(path);
        if !self.is_directory(&path) {
            return Err(DriverError::NoPath);
        }
        self.dir = Some(DirCursor {
            entries: self.children(&path),
            next: 0,
        });
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
        let path = self.absolute(path);
        if !self.is_directory(&path) {
            return Err(DriverError::NoPath);
        }
        self.cwd = path;
        Ok(())
    }

    fn make_dir(&mut self, path: &str) -> DriverResult<()> {
        self.check()?;
        let path = self.absolute(path);
        if path.is_empty() || self.nodes.contains_key(&path) {
            return Err(DriverError::Exists);
        }
        if !self.is_directory(parent_of(&path)) {
            return Err(DriverError::NoPath);
        }
        self.nodes.insert(path, Node::Directory);
        Ok(())
    }

    fn rename(&mut self, from: &str, to: &str) -> DriverResult<()> {
        self.check()?;
        let from = self.absolute(from);
        let to = self.absolute(to);
        if !self.nodes.contains_key(&from) {
            return Err(DriverError::NoFile);
        }
        if to.is_empty() || self.nodes.contains_key(&to) {
            return Err(DriverError::Exists);
        }
        if !self.is_directory(parent_of(&to)) {
            return Err(DriverError::NoPath);
        }

        let node = self.nodes.remove(&from).unwrap();
        let moved_children: Vec<(String, Node)> = {
            let prefix = format!("{}/", from);
            let keys: Vec<String> = self
                .nodes
                .keys()
                .filter(|key| key.starts_with(&prefix))
                .cloned()
                .collect();
            keys.into_iter()
                .map(|key| {
                    let child = self.nodes.remove(&key).unwrap();
                    (format!("{}{}", to, &key[from.len()..]), child)
                })
                .collect()
        };
        self.nodes.insert(to, node);
        self.nodes.extend(moved_children);
        Ok(())
    }

    fn unlink(&mut self, path: &str) -> DriverResult<()> {
        self.check()?;
        let path = self.absolute(path);
        match self.nodes.get(&path) {
            None => Err(DriverError::NoFile),
            Some(Node::Directory) if !self.children(&path).is_empty() => {
                Err(DriverError::Denied)
            }
            Some(_) => {
                self.nodes.remove(&path);
                Ok(())
            }
        }
    }

    fn free_space(&mut self, _volume: &str) -> DriverResult<SpaceInfo> {
        self.check()?;
        let cluster_bytes = (BYTES_PER_SECTOR * SECTORS_PER_CLUSTER) as u64;
        let used: u64 = self
            .nodes
            .values()
            .map(|node| match node {
                Node::Directory => 1,
                Node::File { data, .. } => {
                    (data.len() as u64).div_ceil(cluster_bytes).max(1)
                }
            })
            .sum();
        Ok(SpaceInfo {
            free_clusters: TOTAL_CLUSTERS.saturating_sub(used as u32),
            total_clusters: TOTAL_CLUSTERS,
            sectors_per_cluster: SECTORS_PER_CLUSTER,
            bytes_per_sector: BYTES_PER_SECTOR,
        })
    }
}
