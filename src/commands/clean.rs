//! Clean the public directory

use anyhow::{Context, Result};
use std::fs;

use crate::Site;

/// Delete the public directory. Returns whether anything was removed.
pub fn run(site: &Site) -> Result<bool> {
    if !site.public_dir.exists() {
        tracing::debug!("Nothing to clean at {:?}", site.public_dir);
        return Ok(false);
    }
    if site.public_dir == site.base_dir || site.public_dir == site.source_dir {
        anyhow::bail!(
            "Refusing to delete {:?}: it is not a separate output directory",
            site.public_dir
        );
    }

    fs::remove_dir_all(&site.public_dir)
        .with_context(|| format!("Failed to delete {:?}", site.public_dir))?;
    tracing::info!("Deleted: {:?}", site.public_dir);
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_removes_public_dir() {
        let dir = tempfile::tempdir().unwrap();
        let site = Site::new(dir.path()).unwrap();
        fs::create_dir_all(site.public_dir.join("tags")).unwrap();
        fs::write(site.public_dir.join("index.html"), "x").unwrap();

        assert!(run(&site).unwrap());
        assert!(!site.public_dir.exists());
        assert!(!run(&site).unwrap());
    }

    #[test]
    fn test_clean_refuses_base_dir() {
        let dir = tempfile::tempdir().unwrap();
        let site = Site::new(dir.path())
            .unwrap()
            .with_public_dir(dir.path().to_path_buf());
        assert!(run(&site).is_err());
        assert!(dir.path().exists());
    }
}
