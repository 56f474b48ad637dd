use std::path::{Path, PathBuf};

use codebase_fingerprint::{Fingerprint, FingerprintBuilder, FingerprintConfig, walk_files};
use tracing::debug;

use crate::Result;
use crate::domain::CodeBaseEntry;

/// Enumerates the monitored inventory.
///
/// Both methods may block on I/O; callers run them off the async executor.
pub trait CodeBaseScanner: Send + Sync {
    /// Fingerprint of the inventory as it is now.
    fn fingerprint(&self) -> Result<Fingerprint>;

    /// Every trackable entry of the inventory.
    fn scan(&self) -> Result<Vec<CodeBaseEntry>>;
}

/// Treats every regular file under a set of roots as one inventory entry.
///
/// Entry signatures are root-relative paths with `/` separators. When
/// inclusion patterns are configured, only signatures starting with one of
/// them are reported; signatures starting with an exclusion pattern never
/// are.
#[derive(Debug, Clone)]
pub struct FileTreeScanner {
    roots: Vec<PathBuf>,
    config: FingerprintConfig,
}

impl FileTreeScanner {
    pub fn new(roots: Vec<PathBuf>, config: FingerprintConfig) -> Self {
        Self { roots, config }
    }

    fn is_selected(&self, signature: &str) -> bool {
        let included = self.config.packages.is_empty()
            || self
                .config
                .packages
                .iter()
                .any(|p| signature.starts_with(p.as_str()));
        let excluded = self
            .config
            .exclude_packages
            .iter()
            .any(|p| signature.starts_with(p.as_str()));
        included && !excluded
    }
}

impl FileTreeScanner {
    /// Selected files under every root, with their signatures.
    fn selected_files(&self) -> Result<Vec<(PathBuf, String)>> {
        let mut selected = Vec::new();
        for root in &self.roots {
            for file in walk_files(root)? {
                let signature = signature_of(root, &file);
                if self.is_selected(&signature) {
                    selected.push((file, signature));
                }
            }
        }
        Ok(selected)
    }
}

impl CodeBaseScanner for FileTreeScanner {
    fn fingerprint(&self) -> Result<Fingerprint> {
        let mut builder = FingerprintBuilder::new(self.config.clone());
        for (file, _) in self.selected_files()? {
            builder.record(&file)?;
        }
        let fingerprint = builder.build();
        debug!(fingerprint = %fingerprint, "Computed code base fingerprint");
        Ok(fingerprint)
    }

    fn scan(&self) -> Result<Vec<CodeBaseEntry>> {
        let mut entries: Vec<CodeBaseEntry> = self
            .selected_files()?
            .into_iter()
            .map(|(_, signature)| {
                let mut entry = CodeBaseEntry::new(signature);
                if !self.config.visibility.is_empty() {
                    entry.visibility = Some(self.config.visibility.clone());
                }
                entry
            })
            .collect();
        entries.sort();
        entries.dedup();
        Ok(entries)
    }
}

/// Root-relative path with `/` separators. A root that is itself a file keeps
/// its full path.
fn signature_of(root: &Path, file: &Path) -> String {
    let relative = file.strip_prefix(root).unwrap_or(file);
    let signature = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/");
    if signature.is_empty() {
        file.to_string_lossy().into_owned()
    } else {
        signature
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn fixture() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("shop/cart")).unwrap();
        fs::create_dir_all(dir.path().join("shop/generated")).unwrap();
        fs::write(dir.path().join("shop/cart/checkout.rs"), b"fn checkout() {}").unwrap();
        fs::write(dir.path().join("shop/generated/stubs.rs"), b"// gen").unwrap();
        fs::write(dir.path().join("README"), b"readme").unwrap();
        dir
    }

    #[test]
    fn test_scan_applies_patterns() {
        let dir = fixture();
        let scanner = FileTreeScanner::new(
            vec![dir.path().to_path_buf()],
            FingerprintConfig::new(["shop/"], ["shop/generated"], "public"),
        );
        let entries = scanner.scan().unwrap();
        let signatures: Vec<&str> = entries.iter().map(|e| e.signature.as_str()).collect();
        assert_eq!(signatures, vec!["shop/cart/checkout.rs"]);
        assert_eq!(entries[0].visibility.as_deref(), Some("public"));
    }

    #[test]
    fn test_scan_without_patterns_reports_everything() {
        let dir = fixture();
        let scanner = FileTreeScanner::new(
            vec![dir.path().to_path_buf()],
            FingerprintConfig::default(),
        );
        assert_eq!(scanner.scan().unwrap().len(), 3);
    }

    #[test]
    fn test_fingerprint_tracks_changes() {
        let dir = fixture();
        let scanner = FileTreeScanner::new(
            vec![dir.path().to_path_buf()],
            FingerprintConfig::default(),
        );
        let before = scanner.fingerprint().unwrap();
        assert_eq!(before.file_count, 3);
        assert_eq!(before, scanner.fingerprint().unwrap());

        fs::write(dir.path().join("shop/cart/checkout.rs"), b"fn checkout() { pay() }").unwrap();
        assert_ne!(before, scanner.fingerprint().unwrap());
    }

    #[test]
    fn test_fingerprint_ignores_unselected_files() {
        let dir = fixture();
        let scanner = FileTreeScanner::new(
            vec![dir.path().to_path_buf()],
            FingerprintConfig::new(["shop/"], ["shop/generated"], "public"),
        );
        let before = scanner.fingerprint().unwrap();
        assert_eq!(before.file_count, 1);

        fs::write(dir.path().join("shop/generated/stubs.rs"), b"// regenerated stubs").unwrap();
        fs::write(dir.path().join("README"), b"updated readme").unwrap();
        assert_eq!(before, scanner.fingerprint().unwrap());

        fs::write(dir.path().join("shop/cart/checkout.rs"), b"fn checkout() { pay() }").unwrap();
        assert_ne!(before, scanner.fingerprint().unwrap());
    }

    #[test]
    fn test_missing_root_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let scanner = FileTreeScanner::new(
            vec![dir.path().join("nope")],
            FingerprintConfig::default(),
        );
        assert!(scanner.fingerprint().is_err());
        assert!(scanner.scan().is_err());
    }
}
