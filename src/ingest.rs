// 📬 Inbox sync
// Moves freshly downloaded source exports into the raw data directory
// before extraction. Per-file failures are tolerated; the run continues
// with whatever arrived intact.

use crate::config::Config;
use crate::error::Result;
use std::fs;

/// File extensions worth picking up from the downloads folder.
const SOURCE_EXTENSIONS: [&str; 2] = ["csv", "txt"];

/// Move matching files from the downloads dir into the raw dir.
/// Returns the number of files moved. A missing downloads dir is not an
/// error — there is simply nothing new.
pub fn sync_downloads(config: &Config) -> Result<usize> {
    if !config.downloads_dir.exists() {
        println!("   ⚠️  Downloads dir not found: {}", config.downloads_dir.display());
        return Ok(0);
    }

    fs::create_dir_all(&config.raw_dir)?;

    let mut moved = 0;
    for entry in fs::read_dir(&config.downloads_dir)?.flatten() {
        let path = entry.path();
        let matches = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| SOURCE_EXTENSIONS.contains(&ext.to_lowercase().as_str()));
        if !matches {
            continue;
        }

        let Some(name) = path.file_name() else {
            continue;
        };
        let target = config.raw_dir.join(name);

        // Copy + remove instead of rename: downloads and raw may live on
        // different filesystems
        match fs::copy(&path, &target).and_then(|_| fs::remove_file(&path)) {
            Ok(()) => {
                println!("   📥 Moved: {}", name.to_string_lossy());
                moved += 1;
            }
            Err(e) => {
                println!("   ⚠️  Could not move {}: {e}", name.to_string_lossy());
            }
        }
    }

    Ok(moved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_sync_moves_source_files_only() {
        let downloads = tempdir().unwrap();
        let base = tempdir().unwrap();

        fs::write(downloads.path().join("report.csv"), "x").unwrap();
        fs::write(downloads.path().join("notes.pdf"), "x").unwrap();

        let mut config = Config::with_paths(
            downloads.path(),
            base.path().join("staging"),
            base.path().join("etl.db"),
        );
        config.raw_dir = base.path().join("raw");

        let moved = sync_downloads(&config).unwrap();

        assert_eq!(moved, 1);
        assert!(config.raw_dir.join("report.csv").exists());
        assert!(!downloads.path().join("report.csv").exists());
        assert!(downloads.path().join("notes.pdf").exists());

        println!("✅ Inbox sync test PASSED");
    }

    #[test]
    fn test_sync_missing_downloads_dir_is_noop() {
        let base = tempdir().unwrap();
        let mut config = Config::with_paths(
            base.path().join("nope"),
            base.path().join("staging"),
            base.path().join("etl.db"),
        );
        config.raw_dir = base.path().join("raw");

        assert_eq!(sync_downloads(&config).unwrap(), 0);

        println!("✅ Missing downloads dir test PASSED");
    }
}
