/// End-to-end exercises of the FAT storage device over the in-memory
/// driver: lifecycle guards, cursor rules, search, range deletion,
/// directory enumeration and space accounting.
use carddock_core::test_utils::MemoryDriver;
use carddock_core::{AccessFlags, StorageDevice};
use carddock_fat::FatStorageDevice;

const RW: AccessFlags = AccessFlags::READ
    .union(AccessFlags::WRITE)
    .union(AccessFlags::OPEN_ALWAYS);

fn mounted_device(files: &[(&str, &[u8])]) -> FatStorageDevice<MemoryDriver> {
    let mut device = FatStorageDevice::new(MemoryDriver::with_files(files), "0:");
    assert!(device.mount(), "mount failed");
    device
}

fn device_with_open_file(content: &[u8]) -> FatStorageDevice<MemoryDriver> {
    let mut device = mounted_device(&[("/f.bin", content)]);
    assert!(device.open_file("/f.bin", RW), "open failed");
    device
}

#[test]
fn mount_twice_skips_the_driver() {
    let mut device = FatStorageDevice::new(MemoryDriver::new(), "0:");
    assert!(device.mount(), "first mount should succeed");
    assert!(!device.mount(), "second mount should be refused");
    assert_eq!(
        device.driver().mount_calls(),
        1,
        "second mount must not reach the driver"
    );
}

#[test]
fn failed_mount_leaves_device_unmounted() {
    let mut driver = MemoryDriver::new();
    driver.set_failing(true);
    let mut device = FatStorageDevice::new(driver, "0:");
    assert!(!device.mount());
    assert!(!device.is_mounted());

    // Once the medium responds again the mount goes through.
    device.driver_mut().set_failing(false);
    assert!(device.mount());
    assert!(device.is_mounted());
}

#[test]
fn unmount_requires_mounted_volume() {
    let mut device = FatStorageDevice::new(MemoryDriver::new(), "0:");
    assert!(!device.unmount());
    assert!(device.mount());
    assert!(device.unmount());
    assert!(!device.unmount());
}

#[test]
fn operations_before_mount_fail_silently() {
    let mut device = FatStorageDevice::new(
        MemoryDriver::with_files(&[("/f.txt", b"data")]),
        "0:",
    );
    assert!(!device.open_file("/f.txt", RW));
    assert_eq!(device.read_buffer(&mut [0u8; 4]), 0);
    assert_eq!(device.write_str("x"), 0);
    assert_eq!(device.find_next_str("d"), -1);
    assert!(!device.exists("/f.txt"));
    assert!(device.peek_directory("/").is_empty());
    assert_eq!(device.free_space(), 0);
}

#[test]
fn open_replaces_previously_open_file() {
    let mut device = mounted_device(&[("/a.txt", b"aaaa"), ("/b.txt", b"bb")]);
    assert!(device.open_file("/a.txt", RW));
    assert!(device.open_file("/b.txt", RW));
    assert_eq!(device.current_file_path(), Some("/b.txt"));
    assert_eq!(device.file_size(), 2);
}

#[test]
fn close_without_open_returns_false() {
    let mut device = mounted_device(&[]);
    assert!(!device.close_file());
}

#[test]
fn write_close_reopen_read_all_roundtrip() {
    let payload = b"the quick brown fox";
    let mut device = mounted_device(&[]);
    assert!(device.open_file(
        "/out.bin",
        AccessFlags::WRITE | AccessFlags::CREATE_ALWAYS
    ));
    assert_eq!(device.write_buffer(payload), payload.len());
    assert!(device.close_file());

    assert!(device.open_file("/out.bin", AccessFlags::READ | AccessFlags::OPEN_EXISTING));
    assert_eq!(device.read_all(), payload);
}

#[test]
fn read_all_returns_remainder_from_cursor() {
    let mut device = device_with_open_file(b"0123456789");
    assert!(device.seek(4));
    assert_eq!(device.read_all(), b"456789");
}

#[test]
fn seek_clamps_to_file_size() {
    let mut device = device_with_open_file(b"abcdef");
    assert!(device.seek(1000));
    assert_eq!(device.cursor(), 6);

    assert!(device.seek_step(-2));
    assert_eq!(device.cursor(), 4);
    assert!(device.seek_step(-100));
    assert_eq!(device.cursor(), 0);
    assert!(device.seek_step(3));
    assert_eq!(device.cursor(), 3);
    assert!(device.seek_step(100));
    assert_eq!(device.cursor(), 6);
}

#[test]
fn seeks_without_open_file_return_false() {
    let mut device = mounted_device(&[]);
    assert!(!device.seek(0));
    assert!(!device.seek_start());
    assert!(!device.seek_end());
    assert!(!device.seek_step(1));
}

#[test]
fn write_str_counts_an_implicit_terminator() {
    let mut device = device_with_open_file(b"");
    assert_eq!(device.write_str("hello"), 6);
    assert_eq!(device.write_character('!'), 1);
    assert_eq!(device.file_size(), 6);
}

#[test]
fn read_character_yields_nul_at_eof() {
    let mut device = device_with_open_file(b"x");
    assert_eq!(device.read_character(), 'x');
    assert_eq!(device.read_character(), '\0');
}

#[test]
fn read_line_stops_at_newline() {
    let mut device = device_with_open_file(b"first\nsecond\n");
    assert_eq!(device.read_line(false), "first\n");
    assert_eq!(device.read_line(false), "second\n");
    assert_eq!(device.read_line(false), "");
}

#[test]
fn read_line_can_rewind_to_line_start() {
    let mut device = device_with_open_file(b"first\nsecond\n");
    assert!(device.seek(9)); // mid "second"
    assert_eq!(device.read_line(true), "second\n");

    // No previous newline: rewinds to the start of the file.
    assert!(device.seek(3));
    assert_eq!(device.read_line(true), "first\n");
}

#[test]
fn append_keep_index_preserves_cursor_on_nonempty_file() {
    let mut device = device_with_open_file(b"base");
    assert!(device.seek(2));
    assert_eq!(device.append_str("-tail", true), 6);
    assert_eq!(device.cursor(), 2);
    assert_eq!(device.file_size(), 9);

    assert_eq!(device.append_str("-more", false), 6);
    assert_eq!(device.cursor(), 14, "cursor should sit at end of file");
}

#[test]
fn append_keep_index_preserves_cursor_on_empty_file() {
    let mut device = device_with_open_file(b"");
    assert_eq!(device.append_str("abc", true), 4);
    assert_eq!(device.cursor(), 0);

    let mut device = device_with_open_file(b"");
    assert_eq!(device.append_str("abc", false), 4);
    assert_eq!(device.cursor(), 3);
}

#[test]
fn keep_index_applies_to_every_append_form() {
    let mut device = device_with_open_file(b"0123456789");
    assert!(device.seek(5));

    assert_eq!(device.append_buffer(b"AA", true), 2);
    assert_eq!(device.cursor(), 5);
    assert_eq!(device.append_str("BB", true), 3);
    assert_eq!(device.cursor(), 5);
    assert_eq!(device.append_character('C', true), 1);
    assert_eq!(device.cursor(), 5);

    assert_eq!(device.append_buffer(b"AA", false), 2);
    assert_eq!(device.cursor(), device.file_size());
    assert!(device.seek(5));
    assert_eq!(device.append_character('C', false), 1);
    assert_eq!(device.cursor(), device.file_size());
}

#[test]
fn find_next_reports_match_start() {
    let mut device = device_with_open_file(b"abcXYZdef");
    assert!(device.seek_start());
    assert_eq!(device.find_next_str("XYZ"), 3);
}

#[test]
fn find_next_miss_restores_cursor() {
    let mut device = device_with_open_file(b"abcXYZdef");
    assert!(device.seek(2));
    assert_eq!(device.find_next_str("nope"), -1);
    assert_eq!(device.cursor(), 2);
}

#[test]
fn find_next_success_restores_cursor() {
    let mut device = device_with_open_file(b"abcXYZdef");
    assert!(device.seek(1));
    assert_eq!(device.find_next_str("def"), 6);
    assert_eq!(device.cursor(), 1);
}

#[test]
fn find_next_character_matches_at_cursor() {
    let mut device = device_with_open_file(b"hello ");
    assert!(device.seek_start());
    assert_eq!(device.find_next_character('h'), 0);
    assert_eq!(device.cursor(), 0);
}

#[test]
fn find_previous_scans_back_from_cursor() {
    let mut device = device_with_open_file(b"one\ntwo\nthree");
    assert!(device.seek_end());
    assert_eq!(device.find_previous_str("two"), 4);
    assert_eq!(device.cursor(), 13);

    assert_eq!(device.find_previous_character('\n'), 7);
    assert_eq!(device.find_previous_str("zzz"), -1);
    assert_eq!(device.cursor(), 13);
}

#[test]
fn find_without_open_file_returns_minus_one() {
    let mut device = mounted_device(&[]);
    assert_eq!(device.find_next_str("x"), -1);
    assert_eq!(device.find_previous_buffer(b"x"), -1);
    assert_eq!(device.find_next_character('x'), -1);
}

#[test]
fn clear_range_shifts_tail_left() {
    let content = b"abcdefghij";
    for (begin, end) in [(0u64, 3u64), (2, 5), (5, 10), (0, 10), (4, 4)] {
        let mut device = device_with_open_file(content);
        assert!(device.clear_range(begin, end), "clear({begin},{end}) failed");

        let expected: Vec<u8> = content[..begin as usize]
            .iter()
            .chain(&content[end as usize..])
            .copied()
            .collect();
        assert_eq!(
            device.file_size(),
            expected.len() as u64,
            "size after clear({begin},{end})"
        );
        assert!(device.seek_start());
        assert_eq!(device.read_all(), expected, "content after clear({begin},{end})");
    }
}

#[test]
fn clear_range_clamps_end_to_size() {
    let mut device = device_with_open_file(b"abcdef");
    assert!(device.clear_range(4, 1000));
    assert_eq!(device.file_size(), 4);
}

#[test]
fn clear_range_cursor_rule() {
    // Before the hole: untouched.
    let mut device = device_with_open_file(b"abcdefghij");
    assert!(device.seek(1));
    assert!(device.clear_range(3, 6));
    assert_eq!(device.cursor(), 1);

    // Inside the hole: collapses to begin.
    let mut device = device_with_open_file(b"abcdefghij");
    assert!(device.seek(4));
    assert!(device.clear_range(3, 6));
    assert_eq!(device.cursor(), 3);

    // After the hole: shifted left with the content.
    let mut device = device_with_open_file(b"abcdefghij");
    assert!(device.seek(8));
    assert!(device.clear_range(3, 6));
    assert_eq!(device.cursor(), 5);
}

#[test]
fn clear_from_truncates_and_repositions_cursor() {
    let mut device = device_with_open_file(b"hello world");
    assert!(device.seek(9));
    assert!(device.clear_from(6));
    assert_eq!(device.file_size(), 6);
    assert_eq!(device.cursor(), 6, "cursor in deleted region moves to EOF");

    let mut device = device_with_open_file(b"hello world");
    assert!(device.seek(2));
    assert!(device.clear_from(6));
    assert_eq!(device.cursor(), 2, "cursor before the cut stays put");
}

#[test]
fn notes_scenario_end_to_end() {
    let mut device = mounted_device(&[]);
    assert!(device.open_file(
        "/notes.txt",
        AccessFlags::READ | AccessFlags::WRITE | AccessFlags::CREATE_ALWAYS
    ));
    assert_eq!(device.write_str("hello world"), 12);
    assert!(device.close_file());

    assert!(device.open_file("/notes.txt", RW));
    assert!(device.clear_from(6));
    assert_eq!(device.file_size(), 6);
    assert!(device.seek_start());
    assert_eq!(device.read_all(), b"hello ");

    assert!(device.seek_start());
    assert_eq!(device.find_next_character('h'), 0);

    assert!(device.delete());
    assert!(!device.is_file_open());
    assert!(!device.exists("/notes.txt"));
}

#[test]
fn delete_path_closes_only_the_open_file() {
    let mut device = mounted_device(&[("/a.txt", b"a"), ("/b.txt", b"b")]);
    assert!(device.open_file("/a.txt", RW));

    assert!(device.delete_path("/b.txt"));
    assert!(device.is_file_open(), "deleting another path keeps the file open");

    assert!(device.delete_path("/a.txt"));
    assert!(!device.is_file_open());
    assert!(!device.exists("/a.txt"));
}

#[test]
fn directory_listing_matches_counts() {
    let files: &[(&str, &[u8])] = &[
        ("/data/a.txt", b"a"),
        ("/data/b.txt", b"bb"),
        ("/data/sub/c.txt", b"ccc"),
    ];
    let mut device = mounted_device(files);
    let entries = device.peek_directory("/data");
    assert_eq!(entries.len(), device.total_count_in_directory("/data"));
    assert_eq!(entries.len(), 3);
    assert_eq!(device.file_count_in_directory("/data"), 2);
    assert_eq!(device.directory_count_in_directory("/data"), 1);

    let sub = entries.iter().find(|e| e.name == "sub").expect("sub entry");
    assert!(sub.is_directory);
    let file = entries.iter().find(|e| e.name == "a.txt").expect("a.txt");
    assert!(!file.is_directory);
    assert!(file.is_archive);
}

#[test]
fn peek_directory_on_missing_path_is_empty() {
    let mut device = mounted_device(&[]);
    assert!(device.peek_directory("/nope").is_empty());
    assert_eq!(device.total_count_in_directory("/nope"), 0);
}

#[test]
fn directory_entry_stats_a_single_path() {
    let mut device = mounted_device(&[("/d/f.txt", b"1234")]);
    let entry = device.directory_entry("/d/f.txt").expect("entry");
    assert_eq!(entry.name, "f.txt");
    assert!(!entry.is_directory);
    assert!(device.directory_entry("/missing").is_none());
}

#[test]
fn change_directory_rebases_relative_paths() {
    let mut device = mounted_device(&[("/d/f.txt", b"x")]);
    assert!(device.change_directory("/d"));
    assert!(device.exists("f.txt"));
    assert!(!device.change_directory("/missing"));
}

#[test]
fn create_move_and_rename_entries() {
    let mut device = mounted_device(&[("/a.txt", b"x")]);
    assert!(device.create_directory("/archive"));
    assert!(device.move_entry("/a.txt", "/archive/a.txt"));
    assert!(!device.exists("/a.txt"));
    assert!(device.exists("/archive/a.txt"));
    assert!(device.rename("/archive/a.txt", "/archive/b.txt"));
    assert!(device.exists("/archive/b.txt"));
}

#[test]
fn space_accounting_reports_used_fraction() {
    let mut device = mounted_device(&[]);
    let total = device.total_space();
    let free = device.free_space();
    assert!(total > 0);
    assert!(free <= total);

    assert!(device.open_file(
        "/fill.bin",
        AccessFlags::WRITE | AccessFlags::CREATE_ALWAYS
    ));
    device.append_buffer(&vec![0u8; 512 * 1024], false);

    let used_pct = device.space_used_percentage();
    let expected = (total - device.free_space()) as f64 / total as f64 * 100.0;
    assert!((used_pct as f64 - expected).abs() < 0.5);
    assert!(used_pct > 0.0);
}

#[test]
fn file_size_falls_back_to_stat_when_closed() {
    let mut device = mounted_device(&[("/f.txt", b"12345")]);
    assert!(device.open_file("/f.txt", RW));
    assert!(device.close_file());
    assert_eq!(device.file_size(), 5, "stat of the last path backs the size");
    assert_eq!(device.file_size_at("/f.txt"), 5);
    assert_eq!(device.file_size_at("/missing"), 0);
}

#[test]
fn spi_and_sdio_profiles_attach_at_construction() {
    use carddock_fat::{BusProfile, SdioBus, SpiBus, SDIO_BAUD_HZ, SPI_BAUD_HZ};

    let spi = FatStorageDevice::spi(
        MemoryDriver::new(),
        "0:",
        SpiBus {
            clk_pin: 2,
            miso_pin: 3,
            mosi_pin: 4,
            cs_pin: 5,
        },
    );
    match spi.bus_profile() {
        Some(BusProfile::Spi(bus)) => {
            assert_eq!(bus.cs_pin, 5);
            assert_eq!(spi.bus_profile().unwrap().baud_hz(), SPI_BAUD_HZ);
        }
        other => panic!("unexpected profile: {:?}", other),
    }

    let sdio = FatStorageDevice::sdio(
        MemoryDriver::new(),
        "0:",
        SdioBus {
            cmd_pin: 3,
            d0_pin: 4,
        },
    );
    match sdio.bus_profile() {
        Some(BusProfile::Sdio(bus)) => {
            assert_eq!(bus.clk_pin(), 2);
            assert_eq!(sdio.bus_profile().unwrap().baud_hz(), SDIO_BAUD_HZ);
        }
        other => panic!("unexpected profile: {:?}", other),
    }
}
