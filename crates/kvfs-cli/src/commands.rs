//! Subcommands and their output.

use anyhow::{Context, Result};
use clap::Subcommand;
use std::io::Write;
use std::time::SystemTime;

use kvfs_kernel::{
    FileSystem, FileType, KvFs, Metadata, OpenFlags, ensure_root, unix_seconds,
};

/// Largest accepted mode (permission bits plus setuid/setgid/sticky).
const MAX_MODE: u32 = 0o7777;

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Create the root directory if the namespace is empty
    Format,

    /// Create a directory
    Mkdir {
        /// Create missing parents, no error if it exists
        #[arg(short, long)]
        parents: bool,

        /// Octal permission bits
        #[arg(short, long, default_value = "755", value_parser = parse_mode)]
        mode: u32,

        path: String,
    },

    /// Create an empty file or bump its modification time
    Touch { path: String },

    /// Remove a file or empty directory
    Rm {
        /// Remove directories and their contents
        #[arg(short, long)]
        recursive: bool,

        path: String,
    },

    /// Move or rename
    Mv { from: String, to: String },

    /// Change permission bits
    Chmod {
        #[arg(value_parser = parse_mode)]
        mode: u32,

        path: String,
    },

    /// Show inode metadata
    Stat { path: String },

    /// List a directory
    Ls {
        #[arg(default_value = "/")]
        path: String,
    },
}

/// Parse an octal mode such as `755`, `0755` or `0o755`.
pub fn parse_mode(s: &str) -> Result<u32, String> {
    let digits = s.strip_prefix("0o").unwrap_or(s);
    let mode =
        u32::from_str_radix(digits, 8).map_err(|e| format!("invalid octal mode {s:?}: {e}"))?;
    if mode > MAX_MODE {
        return Err(format!("mode {s} out of range (max 7777)"));
    }
    Ok(mode)
}

/// Run one command, writing human output to `out`.
pub async fn run(fs: &KvFs, command: &Command, out: &mut dyn Write) -> Result<()> {
    match command {
        Command::Format => {
            if ensure_root(fs.backend().as_ref()).await? {
                writeln!(out, "formatted {}", fs.name())?;
            } else {
                writeln!(out, "{} already formatted", fs.name())?;
            }
        }
        Command::Mkdir {
            parents,
            mode,
            path,
        } => {
            let made = if *parents {
                fs.mkdir_all(path, *mode).await
            } else {
                fs.mkdir(path, *mode).await
            };
            made.with_context(|| format!("mkdir {path}"))?;
        }
        Command::Touch { path } => {
            fs.open_file(path, OpenFlags::create(), 0o644)
                .await
                .with_context(|| format!("touch {path}"))?;
            let now = SystemTime::now();
            fs.chtimes(path, now, now)
                .await
                .with_context(|| format!("touch {path}"))?;
        }
        Command::Rm { recursive, path } => {
            let removed = if *recursive {
                fs.remove_all(path).await
            } else {
                fs.remove(path).await
            };
            removed.with_context(|| format!("rm {path}"))?;
        }
        Command::Mv { from, to } => {
            fs.rename(from, to)
                .await
                .with_context(|| format!("mv {from} {to}"))?;
        }
        Command::Chmod { mode, path } => {
            fs.chmod(path, *mode)
                .await
                .with_context(|| format!("chmod {path}"))?;
        }
        Command::Stat { path } => {
            let meta = fs.stat(path).await.with_context(|| format!("stat {path}"))?;
            write_stat(out, path, &meta)?;
        }
        Command::Ls { path } => {
            let entries = fs.read_dir(path).await.with_context(|| format!("ls {path}"))?;
            for meta in &entries {
                write_entry(out, meta)?;
            }
        }
    }
    Ok(())
}

fn kind_name(kind: FileType) -> &'static str {
    match kind {
        FileType::File => "regular file",
        FileType::Directory => "directory",
    }
}

fn write_stat(out: &mut dyn Write, path: &str, meta: &Metadata) -> std::io::Result<()> {
    writeln!(out, "  Path: {path}")?;
    writeln!(out, "  Type: {}", kind_name(meta.kind))?;
    writeln!(out, " Inode: {}", meta.id)?;
    writeln!(out, "  Mode: {:04o}", meta.permissions)?;
    writeln!(out, "  Size: {}", meta.size)?;
    writeln!(out, "Modify: {}", unix_seconds(meta.modified))
}

fn write_entry(out: &mut dyn Write, meta: &Metadata) -> std::io::Result<()> {
    let (tag, suffix) = if meta.is_dir() { ('d', "/") } else { ('-', "") };
    writeln!(
        out,
        "{tag}{:04o} {:>10} {}{suffix}",
        meta.permissions, meta.size, meta.name
    )
}
