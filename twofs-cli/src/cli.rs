use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::path::FsPath;

/// 10240 blocks of 512 bytes, a 5 MiB image.
pub const DEFAULT_BLOCKS: u64 = 10_240;

#[derive(Parser)]
#[command(name = "twofs", about = "Inspect and modify a two-level file system image")]
pub struct Cli {
    /// Disk image to operate on
    #[arg(long, short, env = "TWOFS_IMAGE", default_value = ".disk")]
    pub image: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Create a fresh, empty image (overwrites any existing file)
    Format {
        /// Number of 512 byte blocks in the image
        #[arg(long, default_value_t = DEFAULT_BLOCKS)]
        blocks: u64,
    },
    #[command(flatten)]
    Image(ImageCommand),
}

/// Commands that operate on an already formatted image.
#[derive(Subcommand)]
pub enum ImageCommand {
    /// Create a subdirectory: /dir
    Mkdir { path: FsPath },
    /// Accepted for compatibility, subdirectories are never removed
    Rmdir { path: FsPath },
    /// Create an empty file: /dir/name.ext
    Touch { path: FsPath },
    /// Write bytes from a host file (or stdin) into a file
    Write {
        path: FsPath,
        #[arg(long, default_value_t = 0)]
        offset: u64,
        /// Host file to copy from, stdin when absent
        #[arg(long, short)]
        input: Option<PathBuf>,
    },
    /// Print a file's contents to stdout
    Cat {
        path: FsPath,
        #[arg(long, default_value_t = 0)]
        offset: u64,
        /// Bytes to read, defaults to the rest of the file
        #[arg(long)]
        length: Option<usize>,
    },
    /// List the root or a subdirectory
    Ls {
        #[arg(default_value = "/")]
        path: FsPath,
    },
    /// Show whether a path is a directory and its size
    Stat { path: FsPath },
    /// Delete a file
    Rm { path: FsPath },
    /// Report free blocks
    Df,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn command_definitions_are_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn format_is_split_from_image_commands() {
        let cli = Cli::try_parse_from(["twofs", "-i", "disk.img", "format"]).unwrap();
        assert_eq!(cli.image, PathBuf::from("disk.img"));
        assert!(matches!(
            cli.command,
            Command::Format {
                blocks: DEFAULT_BLOCKS
            }
        ));

        let cli = Cli::try_parse_from(["twofs", "cat", "/docs/a.txt", "--offset", "4"]).unwrap();
        match cli.command {
            Command::Image(ImageCommand::Cat { path, offset, length }) => {
                assert_eq!(path.triple(), ("docs", "a", "txt"));
                assert_eq!(offset, 4);
                assert_eq!(length, None);
            }
            _ => panic!("cat parsed as another command"),
        }
    }
}
