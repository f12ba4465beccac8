// Sliding-window content search over the driver's file cursor.
//
// Both directions compare a window exactly the length of the pattern,
// moving one byte per step. The scans leave the cursor wherever they stop;
// callers restore it around the call.

use carddock_core::driver::VolumeDriver;

/// Scans forward from the current cursor. Returns the absolute offset of
/// the first byte of the match, or -1 once end-of-file is reached without
/// one. An empty pattern matches at the cursor.
pub(crate) fn scan_forward<D: VolumeDriver>(driver: &mut D, pattern: &[u8]) -> i64 {
    if pattern.is_empty() {
        return driver.tell() as i64;
    }
    let len = pattern.len();
    let size = driver.size();
    let start = driver.tell();
    if start + len as u64 > size {
        return -1;
    }

    let mut window = vec![0u8; len];
    match driver.read(&mut window) {
        Ok(n) if n == len => {}
        _ => return -1,
    }

    let mut at = start;
    loop {
        if window == pattern {
            return at as i64;
        }
        if at + len as u64 >= size {
            return -1;
        }
        let mut next = [0u8; 1];
        match driver.read(&mut next) {
            Ok(1) => {}
            _ => return -1,
        }
        window.rotate_left(1);
        window[len - 1] = next[0];
        at += 1;
    }
}

/// Scans backward, checking windows starting at the cursor (or the last
/// position a full window fits) down to offset 0. Returns the match start
/// or -1 once position 0 has been checked without one.
pub(crate) fn scan_backward<D: VolumeDriver>(driver: &mut D, pattern: &[u8]) -> i64 {
    if pattern.is_empty() {
        return driver.tell() as i64;
    }
    let len = pattern.len();
    let size = driver.size();
    if (len as u64) > size {
        return -1;
    }

    let mut at = driver.tell().min(size - len as u64);
    if driver.seek(at).is_err() {
        return -1;
    }
    let mut window = vec![0u8; len];
    match driver.read(&mut window) {
        Ok(n) if n == len => {}
        _ => return -1,
    }

    loop {
        if window == pattern {
            return at as i64;
        }
        if at == 0 {
            return -1;
        }
        at -= 1;
        if driver.seek(at).is_err() {
            return -1;
        }
        let mut prev = [0u8; 1];
        match driver.read(&mut prev) {
            Ok(1) => {}
            _ => return -1,
        }
        window.rotate_right(1);
        window[0] = prev[0];
    }
}
