use std::str::FromStr;
use thiserror::Error;

/// A path inside the image, split the way the file system addresses things:
/// `/`, `/dir` or `/dir/name.ext`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FsPath {
    Root,
    Directory(String),
    File { dir: String, name: String, ext: String },
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum PathError {
    #[error("path must start with \"/\"")]
    Relative,
    #[error("empty component in {0:?}")]
    EmptyComponent(String),
    #[error("{0:?} is nested deeper than /dir/file")]
    TooDeep(String),
}

impl FsPath {
    /// The (directory, file, extension) triple, with empty strings for the parts
    /// a directory or the root lacks.
    pub fn triple(&self) -> (&str, &str, &str) {
        match self {
            FsPath::Root => ("", "", ""),
            FsPath::Directory(dir) => (dir.as_str(), "", ""),
            FsPath::File { dir, name, ext } => (dir.as_str(), name.as_str(), ext.as_str()),
        }
    }
}

impl FromStr for FsPath {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let rest = s.strip_prefix('/').ok_or(PathError::Relative)?;
        let rest = rest.strip_suffix('/').unwrap_or(rest);
        if rest.is_empty() {
            return Ok(FsPath::Root);
        }

        let parts: Vec<&str> = rest.split('/').collect();
        if parts.iter().any(|part| part.is_empty()) {
            return Err(PathError::EmptyComponent(s.to_string()));
        }
        match parts.as_slice() {
            [dir] => Ok(FsPath::Directory(dir.to_string())),
            [dir, file] => {
                // Everything after the first dot is the extension.
                let (name, ext) = file.split_once('.').unwrap_or((*file, ""));
                if name.is_empty() {
                    return Err(PathError::EmptyComponent(s.to_string()));
                }
                Ok(FsPath::File {
                    dir: dir.to_string(),
                    name: name.to_string(),
                    ext: ext.to_string(),
                })
            }
            _ => Err(PathError::TooDeep(s.to_string())),
        }
    }
}
