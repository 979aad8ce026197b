mod cli;
mod path;

use std::fs::File;
use std::io::{self, Read, Write};

use anyhow::{bail, Context, Result};
use clap::Parser;
use cli::{Cli, Command, ImageCommand};
use path::FsPath;
use twofs::{DiskImage, TwoFs, BLOCK_SIZE};

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Command::Format { blocks } => {
            TwoFs::format(&cli.image, blocks)
                .with_context(|| format!("formatting {}", cli.image.display()))?;
            println!(
                "formatted {} ({} blocks, {} bytes)",
                cli.image.display(),
                blocks,
                blocks * BLOCK_SIZE as u64
            );
            Ok(())
        }
        Command::Image(command) => {
            let mut fs = TwoFs::open_image(&cli.image)
                .with_context(|| format!("opening {}", cli.image.display()))?;
            run(&mut fs, command)
        }
    }
}

fn run(fs: &mut TwoFs<DiskImage>, command: ImageCommand) -> Result<()> {
    match command {
        ImageCommand::Mkdir { path } => {
            let dir = directory(&path)?;
            fs.create_subdirectory(dir)
                .with_context(|| format!("mkdir {}", dir))?;
        }
        ImageCommand::Rmdir { path } => {
            fs.remove_subdirectory(directory(&path)?)?;
        }
        ImageCommand::Touch { path } => {
            let (dir, name, ext) = file(&path)?;
            fs.create_file(dir, name, ext)
                .with_context(|| format!("touch {:?}", path))?;
        }
        ImageCommand::Write {
            path,
            offset,
            input,
        } => {
            let (dir, name, ext) = file(&path)?;
            let mut data = Vec::new();
            match input {
                Some(host) => File::open(&host)
                    .and_then(|mut f| f.read_to_end(&mut data))
                    .with_context(|| format!("reading {}", host.display()))?,
                None => io::stdin().read_to_end(&mut data)?,
            };
            let written = fs
                .write(dir, name, ext, offset, &data)
                .with_context(|| format!("write {:?}", path))?;
            log::info!("wrote {} bytes", written);
        }
        ImageCommand::Cat {
            path,
            offset,
            length,
        } => {
            let (dir, name, ext) = file(&path)?;
            let size = fs.attributes(dir, name, ext)?.size;
            let length = length.unwrap_or_else(|| size.saturating_sub(offset) as usize);
            let data = fs
                .read(dir, name, ext, offset, length)
                .with_context(|| format!("cat {:?}", path))?;
            io::stdout().write_all(&data)?;
        }
        ImageCommand::Ls { path } => match path {
            FsPath::Root => {
                for dir in fs.list_subdirectories()? {
                    println!("{}/", dir);
                }
            }
            FsPath::Directory(dir) => {
                for (name, ext) in fs.list_files(&dir)? {
                    if ext.is_empty() {
                        println!("{}", name);
                    } else {
                        println!("{}.{}", name, ext);
                    }
                }
            }
            FsPath::File { .. } => bail!("ls expects / or /dir"),
        },
        ImageCommand::Stat { path } => {
            let (dir, name, ext) = path.triple();
            let attrs = fs.attributes(dir, name, ext)?;
            if attrs.is_directory {
                println!("directory");
            } else {
                let blocks = fs.file_blocks(dir, name, ext)?.len();
                println!("file, {} bytes in {} blocks", attrs.size, blocks);
            }
        }
        ImageCommand::Rm { path } => {
            let (dir, name, ext) = file(&path)?;
            fs.remove_file(dir, name, ext)
                .with_context(|| format!("rm {:?}", path))?;
        }
        ImageCommand::Df => {
            let free = fs.free_block_count()?;
            println!("{} free blocks ({} bytes)", free, free * BLOCK_SIZE);
        }
    }
    Ok(())
}

fn directory(path: &FsPath) -> Result<&str> {
    match path {
        FsPath::Directory(dir) => Ok(dir),
        _ => bail!("expected a subdirectory path like /dir, got {:?}", path),
    }
}

fn file(path: &FsPath) -> Result<(&str, &str, &str)> {
    match path {
        FsPath::File { .. } => Ok(path.triple()),
        _ => bail!("expected a file path like /dir/name.ext, got {:?}", path),
    }
}
