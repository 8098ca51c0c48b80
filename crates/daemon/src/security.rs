// Owner-only permissions for files holding credentials (store, config).

use std::fs::{self, OpenOptions};
use std::path::Path;

use anyhow::{Context, Result};

pub fn ensure_owner_only_file(path: &Path) -> Result<()> {
    ensure_mode(path, 0o600)
}

pub fn ensure_owner_only_dir(path: &Path) -> Result<()> {
    ensure_mode(path, 0o700)
}

fn ensure_mode(path: &Path, wanted: u32) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;

        if !path.exists() {
            return Ok(());
        }

        let metadata = fs::metadata(path)
            .with_context(|| format!("failed to read metadata for `{}`", path.display()))?;
        let mode = metadata.permissions().mode() & 0o777;
        if mode != wanted {
            fs::set_permissions(path, fs::Permissions::from_mode(wanted))
                .with_context(|| format!("failed to set owner-only mode on `{}`", path.display()))?;
        }
    }

    #[cfg(not(unix))]
    {
        let _ = (path, wanted);
    }

    Ok(())
}

pub fn open_private_truncate(path: &Path) -> std::io::Result<std::fs::File> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;

        OpenOptions::new().create(true).write(true).truncate(true).mode(0o600).open(path)
    }
    #[cfg(not(unix))]
    {
        OpenOptions::new().create(true).write(true).truncate(true).open(path)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use std::io::Write;
    use std::os::unix::fs::PermissionsExt;

    use super::*;

    #[test]
    fn tightens_loose_file_and_dir_modes() {
        let tmp = tempfile::tempdir().expect("tempdir should be created");
        let dir = tmp.path().join("data");
        fs::create_dir(&dir).expect("dir should be created");
        fs::set_permissions(&dir, fs::Permissions::from_mode(0o755)).expect("chmod dir");
        let file = dir.join("config.toml");
        fs::write(&file, "x").expect("file should be written");
        fs::set_permissions(&file, fs::Permissions::from_mode(0o644)).expect("chmod file");

        ensure_owner_only_dir(&dir).expect("dir mode should be fixed");
        ensure_owner_only_file(&file).expect("file mode should be fixed");

        assert_eq!(fs::metadata(&dir).unwrap().permissions().mode() & 0o777, 0o700);
        assert_eq!(fs::metadata(&file).unwrap().permissions().mode() & 0o777, 0o600);
    }

    #[test]
    fn missing_paths_are_ignored() {
        let tmp = tempfile::tempdir().expect("tempdir should be created");
        ensure_owner_only_file(&tmp.path().join("absent")).expect("missing file is fine");
    }

    #[test]
    fn private_truncate_creates_owner_only_file() {
        let tmp = tempfile::tempdir().expect("tempdir should be created");
        let path = tmp.path().join("out.toml");
        let mut file = open_private_truncate(&path).expect("file should open");
        file.write_all(b"a = 1\n").expect("write should succeed");
        assert_eq!(fs::metadata(&path).unwrap().permissions().mode() & 0o777, 0o600);
    }
}
