use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use carddock_core::{AccessFlags, StorageDevice};
use carddock_fat::FatStorageDevice;
use carddock_host::HostDriver;

#[derive(Parser)]
#[command(name = "carddock")]
#[command(about = "Storage-device operations over a host-rooted volume", long_about = None)]
struct Cli {
    /// Directory served as the volume root
    #[arg(short, long, default_value = ".")]
    root: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List a directory
    Ls {
        /// Directory path on the volume
        #[arg(default_value = "/")]
        path: String,
        /// Emit the listing as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print a file
    Cat {
        file: String,
    },
    /// Write text to a file, replacing its contents
    Write {
        file: String,
        text: String,
    },
    /// Append text to a file
    Append {
        file: String,
        text: String,
        /// Restore the cursor to its pre-append position
        #[arg(long)]
        keep_cursor: bool,
    },
    /// Search a file for a pattern
    Find {
        file: String,
        pattern: String,
        /// Scan backward from the end of the file
        #[arg(long)]
        backward: bool,
    },
    /// Delete a byte range from a file
    Clear {
        file: String,
        begin: u64,
        /// End of the range; omitted means truncate to BEGIN
        end: Option<u64>,
    },
    /// Show a single entry
    Stat {
        path: String,
    },
    /// Show volume space usage
    Df,
    /// Remove a file or empty directory
    Rm {
        path: String,
    },
    /// Create a directory
    Mkdir {
        path: String,
    },
    /// Move or rename an entry
    Mv {
        from: String,
        to: String,
    },
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let mut device = FatStorageDevice::new(HostDriver::new(&cli.root), "0:");
    if !device.mount() {
        bail!("cannot mount volume rooted at {}", cli.root.display());
    }

    match cli.command {
        Commands::Ls { path, json } => {
            let entries = device.peek_directory(&path);
            if json {
                println!("{}", serde_json::to_string_pretty(&entries)?);
            } else if entries.is_empty() {
                println!("(empty or unreadable directory)");
            } else {
                for entry in entries {
                    let kind = if entry.is_directory { "<DIR> " } else { "      " };
                    let stamp = entry
                        .modified_at()
                        .map(|ts| ts.format("%Y-%m-%d %H:%M").to_string())
                        .unwrap_or_else(|| "-".to_string());
                    println!("{}{:<32} {}", kind, entry.name, stamp);
                }
            }
        }
        Commands::Cat { file } => {
            if !device.open_file(&file, AccessFlags::READ | AccessFlags::OPEN_EXISTING) {
                bail!("cannot open {}", file);
            }
            let contents = device.read_all();
            print!("{}", String::from_utf8_lossy(&contents));
        }
        Commands::Write { file, text } => {
            if !device.open_file(&file, AccessFlags::WRITE | AccessFlags::CREATE_ALWAYS) {
                bail!("cannot create {}", file);
            }
            let written = device.write_str(&text);
            if written == 0 {
                bail!("write to {} failed", file);
            }
            println!("wrote {} bytes to {}", text.len(), file);
        }
        Commands::Append { file, text, keep_cursor } => {
            let access = AccessFlags::READ | AccessFlags::WRITE | AccessFlags::OPEN_ALWAYS;
            if !device.open_file(&file, access) {
                bail!("cannot open {}", file);
            }
            if device.append_str(&text, keep_cursor) == 0 {
                bail!("append to {} failed", file);
            }
            println!(
                "appended {} bytes, file is now {} bytes, cursor at {}",
                text.len(),
                device.file_size(),
                device.cursor()
            );
        }
        Commands::Find { file, pattern, backward } => {
            if !device.open_file(&file, AccessFlags::READ | AccessFlags::OPEN_EXISTING) {
                bail!("cannot open {}", file);
            }
            let offset = if backward {
                device.seek_end();
                device.find_previous_str(&pattern)
            } else {
                device.find_next_str(&pattern)
            };
            if offset < 0 {
                println!("pattern not found");
            } else {
                println!("match at byte {}", offset);
            }
        }
        Commands::Clear { file, begin, end } => {
            let access = AccessFlags::READ | AccessFlags::WRITE | AccessFlags::OPEN_EXISTING;
            if !device.open_file(&file, access) {
                bail!("cannot open {}", file);
            }
            let ok = match end {
                Some(end) => device.clear_range(begin, end),
                None => device.clear_from(begin),
            };
            if !ok {
                bail!("clear on {} failed", file);
            }
            println!("file is now {} bytes", device.file_size());
        }
        Commands::Stat { path } => {
            let entry = device
                .directory_entry(&path)
                .with_context(|| format!("no entry at {}", path))?;
            println!("name:      {}", entry.name);
            println!("directory: {}", entry.is_directory);
            println!("size:      {}", device.file_size_at(&path));
            println!(
                "modified:  {}",
                entry
                    .modified_at()
                    .map(|ts| ts.to_string())
                    .unwrap_or_else(|| "-".to_string())
            );
            println!(
                "flags:     ro={} hidden={} system={} archive={}",
                entry.is_readonly, entry.is_hidden, entry.is_system, entry.is_archive
            );
        }
        Commands::Df => {
            let free = device.free_space();
            let total = device.total_space();
            println!("total: {:>12} bytes", total);
            println!("free:  {:>12} bytes", free);
            println!("used:  {:>11.1}%", device.space_used_percentage());
        }
        Commands::Rm { path } => {
            if !device.delete_path(&path) {
                bail!("cannot remove {}", path);
            }
            println!("removed {}", path);
        }
        Commands::Mkdir { path } => {
            if !device.create_directory(&path) {
                bail!("cannot create directory {}", path);
            }
            println!("created {}", path);
        }
        Commands::Mv { from, to } => {
            if !device.move_entry(&from, &to) {
                bail!("cannot move {} to {}", from, to);
            }
            println!("moved {} -> {}", from, to);
        }
    }

    Ok(())
}
