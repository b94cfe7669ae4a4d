use std::{
    fs::File,
    io,
    path::{Path, PathBuf},
};

use tokio::task;
use zip::{CompressionMethod, ZipArchive, ZipWriter, write::SimpleFileOptions};

use crate::error::ArchiveError;

/// Recursively pack `source` into a new zip archive at `dest`, at maximum
/// compression. Returns the finished archive's size in bytes.
pub async fn compress_dir(source: &Path, dest: &Path) -> Result<u64, ArchiveError> {
    let source = source.to_path_buf();
    let dest = dest.to_path_buf();

    task::spawn_blocking(move || compress_dir_blocking(&source, &dest))
        .await
        .map_err(|_| ArchiveError::TaskAborted)?
}

/// Unpack `archive` into `dest`, creating it if absent. Existing files of
/// the same name are overwritten, not merged around.
pub async fn extract(archive: &Path, dest: &Path) -> Result<(), ArchiveError> {
    let archive = archive.to_path_buf();
    let dest = dest.to_path_buf();

    task::spawn_blocking(move || extract_blocking(&archive, &dest))
        .await
        .map_err(|_| ArchiveError::TaskAborted)?
}

fn compress_dir_blocking(source: &Path, dest: &Path) -> Result<u64, ArchiveError> {
    if !source.is_dir() {
        return Err(ArchiveError::MissingSource(source.to_path_buf()));
    }

    let file = File::create(dest)?;
    let mut writer = ZipWriter::new(file);
    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .compression_level(Some(9));

    add_dir(&mut writer, source, source, options)?;

    let file = writer.finish()?;
    Ok(file.metadata()?.len())
}

fn add_dir(
    writer: &mut ZipWriter<File>,
    root: &Path,
    dir: &Path,
    options: SimpleFileOptions,
) -> Result<(), ArchiveError> {
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        let Ok(rel) = path.strip_prefix(root) else {
            continue;
        };
        let name = rel.to_string_lossy().into_owned();

        if path.is_dir() {
            writer.add_directory(name, options)?;
            add_dir(writer, root, &path, options)?;
        } else {
            writer.start_file(name, options)?;
            let mut source = File::open(&path)?;
            io::copy(&mut source, writer)?;
        }
    }

    Ok(())
}

fn extract_blocking(archive: &Path, dest: &Path) -> Result<(), ArchiveError> {
    std::fs::create_dir_all(dest)?;

    let file = File::open(archive)?;
    let mut zip = ZipArchive::new(file).map_err(|e| ArchiveError::Corrupt(e.to_string()))?;
    zip.extract(dest)?;

    Ok(())
}

/// Timestamped archive file name for a fresh world backup, e.g.
/// `06-01-2026-01-02-03-PM.zip`.
pub fn backup_name(now: chrono::DateTime<chrono::Local>) -> PathBuf {
    PathBuf::from(format!("{}.zip", now.format("%m-%d-%Y-%I-%M-%S-%p")))
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    use super::*;

    fn build_world(root: &Path) {
        std::fs::create_dir_all(root.join("region")).unwrap();
        std::fs::write(root.join("level.dat"), b"level data").unwrap();
        std::fs::write(root.join("region/r.0.0.mca"), vec![7u8; 4096]).unwrap();
    }

    #[tokio::test]
    async fn compress_then_extract_restores_the_tree() {
        let dir = tempdir().unwrap();
        let world = dir.path().join("world");
        build_world(&world);

        let archive = dir.path().join("world.zip");
        let size = compress_dir(&world, &archive).await.unwrap();
        assert!(size > 0);
        assert_eq!(size, std::fs::metadata(&archive).unwrap().len());

        let restored = dir.path().join("restored");
        extract(&archive, &restored).await.unwrap();

        assert_eq!(
            std::fs::read(restored.join("level.dat")).unwrap(),
            b"level data"
        );
        assert_eq!(
            std::fs::read(restored.join("region/r.0.0.mca")).unwrap(),
            vec![7u8; 4096]
        );
    }

    #[tokio::test]
    async fn extract_overwrites_existing_files() {
        let dir = tempdir().unwrap();
        let world = dir.path().join("world");
        build_world(&world);

        let archive = dir.path().join("world.zip");
        compress_dir(&world, &archive).await.unwrap();

        let dest = dir.path().join("dest");
        std::fs::create_dir_all(&dest).unwrap();
        std::fs::write(dest.join("level.dat"), b"stale contents").unwrap();

        extract(&archive, &dest).await.unwrap();

        assert_eq!(std::fs::read(dest.join("level.dat")).unwrap(), b"level data");
    }

    #[tokio::test]
    async fn missing_source_dir_is_reported() {
        let dir = tempdir().unwrap();
        let result = compress_dir(&dir.path().join("nope"), &dir.path().join("out.zip")).await;
        assert!(matches!(result, Err(ArchiveError::MissingSource(_))));
    }

    #[tokio::test]
    async fn garbage_archive_is_corrupt() {
        let dir = tempdir().unwrap();
        let fake = dir.path().join("fake.zip");
        std::fs::write(&fake, b"definitely not a zip file").unwrap();

        let result = extract(&fake, &dir.path().join("dest")).await;
        assert!(matches!(result, Err(ArchiveError::Corrupt(_))));
    }

    #[test]
    fn backup_name_is_timestamped_zip() {
        use chrono::TimeZone;

        let at = chrono::Local.with_ymd_and_hms(2026, 6, 1, 13, 2, 3).unwrap();
        assert_eq!(backup_name(at), PathBuf::from("06-01-2026-01-02-03-PM.zip"));
    }
}
