use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Component, Path, PathBuf};
use tracing::info;

use super::blocks::{FileBlock, ParsedResponse};
use crate::error::{PipelineError, Result};

/// A file written to the working tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrittenFile {
    /// Relative to the working tree root.
    pub path: PathBuf,
    pub bytes: usize,
    pub sha256: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Materialization {
    /// One entry per block, in block order; a repeated path appears once per write.
    pub written: Vec<WrittenFile>,
    pub commands_path: PathBuf,
}

impl Materialization {
    pub fn count(&self) -> usize {
        self.written.len()
    }
}

/// Writes parsed file blocks under a root directory.
pub struct FileMaterializer {
    root: PathBuf,
    commands_path: PathBuf,
}

impl FileMaterializer {
    /// # Arguments
    /// * `root` - Working tree root every block path is resolved against
    /// * `commands_path` - Where the commands block is written (absolute, or relative to cwd)
    pub fn new(root: impl Into<PathBuf>, commands_path: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            commands_path: commands_path.into(),
        }
    }

    /// Checks every block path before anything touches the disk.
    pub fn plan(&self, files: &[FileBlock]) -> Result<Vec<PathBuf>> {
        files.iter().map(|block| safe_relative_path(&block.path)).collect()
    }

    /// Writes every file block in order, creating parent directories and
    /// replacing existing files wholesale, then writes the commands artifact
    /// (empty when the response carried no commands block).
    pub fn materialize(&self, parsed: &ParsedResponse) -> Result<Materialization> {
        let relative_paths = self.plan(&parsed.files)?;

        let mut written = Vec::with_capacity(parsed.files.len());
        for (block, relative) in parsed.files.iter().zip(relative_paths) {
            let full = self.root.join(&relative);
            if let Some(parent) = full.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(&full, &block.content)?;

            let sha256 = hash_content(block.content.as_bytes());
            info!(
                path = %relative.display(),
                bytes = block.content.len(),
                sha256 = %&sha256[..12],
                "Wrote: {}",
                relative.display()
            );
            written.push(WrittenFile {
                path: relative,
                bytes: block.content.len(),
                sha256,
            });
        }

        if let Some(parent) = self.commands_path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.commands_path, parsed.commands_text())?;

        Ok(Materialization {
            written,
            commands_path: self.commands_path.clone(),
        })
    }
}

/// Name of the repository metadata directory; never a write target.
const GIT_DIR: &str = ".git";

/// Normalizes a block path, refusing anything that could land outside the
/// root or inside the repository's `.git` directory.
pub fn safe_relative_path(raw: &str) -> Result<PathBuf> {
    let mut clean = PathBuf::new();
    for component in Path::new(raw).components() {
        match component {
            Component::Normal(part) if part.eq_ignore_ascii_case(GIT_DIR) => {
                return Err(PipelineError::UnsafePath(raw.to_string()));
            }
            Component::Normal(part) => clean.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(PipelineError::UnsafePath(raw.to_string()));
            }
        }
    }

    if clean.as_os_str().is_empty() {
        return Err(PipelineError::UnsafePath(raw.to_string()));
    }
    Ok(clean)
}

fn hash_content(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    hex::encode(hasher.finalize())
}
