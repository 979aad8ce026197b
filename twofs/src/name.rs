//! Fixed-width, NUL padded name fields shared by the root and directory tables.

use crate::fs::{FsError, Result};

/// Longest subdirectory or file name, in bytes.
pub const MAX_FILENAME: usize = 8;
/// Longest file extension, in bytes.
pub const MAX_EXTENSION: usize = 3;

/// On-disk width of a name field: the name plus its terminating NUL.
pub const NAME_FIELD: usize = MAX_FILENAME + 1;
/// On-disk width of an extension field.
pub const EXT_FIELD: usize = MAX_EXTENSION + 1;

pub(crate) enum Kind {
    Directory,
    File,
    Extension,
}

impl Kind {
    fn max(&self) -> usize {
        match self {
            Kind::Directory | Kind::File => MAX_FILENAME,
            Kind::Extension => MAX_EXTENSION,
        }
    }
}

pub(crate) fn validate(name: &str, kind: Kind) -> Result<()> {
    if name.len() > kind.max() {
        return Err(FsError::NameTooLong {
            name: name.to_string(),
            max: kind.max(),
        });
    }
    let forbidden = |c: char| {
        c == '/' || c == '\0' || (c == '.' && !matches!(kind, Kind::Directory))
    };
    let empty_allowed = matches!(kind, Kind::Extension);
    if (name.is_empty() && !empty_allowed) || name.contains(forbidden) {
        return Err(FsError::InvalidName(name.to_string()));
    }
    Ok(())
}

/// Copies an already validated name into a zeroed field. Anything past the
/// field's last byte is dropped so the terminating NUL always survives.
pub(crate) fn encode<const N: usize>(name: &str) -> [u8; N] {
    let mut field = [0; N];
    let len = name.len().min(N - 1);
    field[..len].copy_from_slice(&name.as_bytes()[..len]);
    field
}

/// The bytes before the first NUL.
pub(crate) fn raw(field: &[u8]) -> &[u8] {
    let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
    &field[..end]
}

pub(crate) fn decode(field: &[u8]) -> String {
    String::from_utf8_lossy(raw(field)).into_owned()
}
