//! Numbered checkpoint directories.
use anyhow::Result;
use log::{info, warn};
use std::{
    fs,
    path::{Path, PathBuf},
};

const PREFIX: &str = "ckpt-";

/// Manages checkpoints saved in directories `<dir>/ckpt-<step>`.
///
/// Only the newest `max_to_keep` checkpoints are kept; older ones are removed after each save.
#[derive(Debug, Clone)]
pub struct Checkpointer {
    dir: PathBuf,
    max_to_keep: usize,
}

impl Checkpointer {
    /// Creates a checkpointer. The directory is created on the first save.
    pub fn new(dir: impl AsRef<Path>, max_to_keep: usize) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            max_to_keep: max_to_keep.max(1),
        }
    }

    /// The directory containing the checkpoints.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Saves a checkpoint for `step`, writing its content with `write`.
    ///
    /// `write` receives the (existing) checkpoint directory. Returns that directory.
    pub fn save(&self, step: usize, write: impl FnOnce(&Path) -> Result<()>) -> Result<PathBuf> {
        let path = self.dir.join(format!("{}{}", PREFIX, step));
        fs::create_dir_all(&path)?;
        write(&path)?;
        info!("Saved checkpoint {:?}", path);

        let checkpoints = self.checkpoints()?;
        let num_stale = checkpoints.len().saturating_sub(self.max_to_keep);
        for (_, stale) in checkpoints.into_iter().take(num_stale) {
            if let Err(e) = fs::remove_dir_all(&stale) {
                warn!("Failed to remove checkpoint {:?}: {}", stale, e);
            }
        }
        Ok(path)
    }

    /// Existing checkpoints with their steps, oldest first.
    pub fn checkpoints(&self) -> Result<Vec<(usize, PathBuf)>> {
        if !self.dir.is_dir() {
            return Ok(vec![]);
        }
        let mut checkpoints = vec![];
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            let step = path
                .file_name()
                .and_then(|name| name.to_str())
                .and_then(|name| name.strip_prefix(PREFIX))
                .and_then(|step| step.parse::<usize>().ok());
            if let (Some(step), true) = (step, path.is_dir()) {
                checkpoints.push((step, path));
            }
        }
        checkpoints.sort();
        Ok(checkpoints)
    }

    /// The newest checkpoint, if any.
    pub fn latest(&self) -> Result<Option<(usize, PathBuf)>> {
        Ok(self.checkpoints()?.pop())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use tempdir::TempDir;

    #[test]
    fn test_keeps_newest() -> Result<()> {
        let dir = TempDir::new("checkpointer")?;
        let ckpt = Checkpointer::new(dir.path().join("train"), 2);
        assert_eq!(ckpt.latest()?, None);

        for step in [10, 2, 30].iter() {
            ckpt.save(*step, |path| {
                fs::write(path.join("step.txt"), step.to_string())?;
                Ok(())
            })?;
        }
        // Steps are compared as numbers, so ckpt-2 is the oldest.
        let steps = ckpt.checkpoints()?.into_iter().map(|(s, _)| s).collect::<Vec<_>>();
        assert_eq!(steps, vec![10, 30]);

        let (step, path) = ckpt.latest()?.unwrap();
        assert_eq!(step, 30);
        assert_eq!(fs::read_to_string(path.join("step.txt"))?, "30");
        Ok(())
    }

    #[test]
    fn test_ignores_other_entries() -> Result<()> {
        let dir = TempDir::new("checkpointer")?;
        fs::create_dir_all(dir.path().join("best"))?;
        fs::write(dir.path().join("ckpt-5"), "not a directory")?;
        let ckpt = Checkpointer::new(dir.path(), 3);
        assert!(ckpt.checkpoints()?.is_empty());
        Ok(())
    }
}
