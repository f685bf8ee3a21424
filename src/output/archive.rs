use anyhow::{anyhow, Context, Result};
use log::info;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

const MAX_ARCHIVE_SUFFIX: u32 = 10_000;

/// Picks `<participant>.zip` in `parent`, or the first free `<participant>_N.zip`.
pub fn unique_archive_path(parent: &Path, participant: &str) -> Result<PathBuf> {
    let stem = sanitize(participant);
    let first = parent.join(format!("{stem}.zip"));
    if !first.exists() {
        return Ok(first);
    }

    (1..=MAX_ARCHIVE_SUFFIX)
        .map(|n| parent.join(format!("{stem}_{n}.zip")))
        .find(|candidate| !candidate.exists())
        .ok_or_else(|| anyhow!("no free archive name for participant {participant}"))
}

/// Zips every regular file in `output_dir` into a new archive beside it.
///
/// Never overwrites an existing archive; returns the path actually written.
pub fn archive_session(output_dir: &Path, participant: &str) -> Result<PathBuf> {
    let parent = output_dir
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let archive_path = unique_archive_path(parent, participant)?;

    let file = File::options()
        .write(true)
        .create_new(true)
        .open(&archive_path)
        .with_context(|| format!("failed to create archive {}", archive_path.display()))?;
    let mut zip = ZipWriter::new(file);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    let mut entries: Vec<PathBuf> = fs::read_dir(output_dir)
        .with_context(|| format!("failed to list {}", output_dir.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_file())
        .collect();
    entries.sort();

    for path in &entries {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| anyhow!("non UTF-8 file name in {}", output_dir.display()))?;
        zip.start_file(name, options)
            .with_context(|| format!("failed to add {name} to archive"))?;
        let mut source =
            File::open(path).with_context(|| format!("failed to read {}", path.display()))?;
        io::copy(&mut source, &mut zip)
            .with_context(|| format!("failed to compress {}", path.display()))?;
    }

    zip.finish().context("failed to finalize archive")?;
    info!(
        "Archived {} files from {} into {}",
        entries.len(),
        output_dir.display(),
        archive_path.display()
    );
    Ok(archive_path)
}

fn sanitize(participant: &str) -> String {
    let cleaned: String = participant
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    if cleaned.is_empty() {
        "participant".into()
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    fn output_dir_with_logs(root: &Path) -> PathBuf {
        let out = root.join("output");
        fs::create_dir_all(&out).unwrap();
        fs::write(out.join("main_log.txt"), "1.000000,participant,2024\n").unwrap();
        fs::write(out.join("probe_Intro-to-AI.txt"), "2.000000,cue,40000\n").unwrap();
        out
    }

    #[test]
    fn second_archive_does_not_overwrite_first() {
        let dir = tempfile::tempdir().unwrap();
        let out = output_dir_with_logs(dir.path());

        let first = archive_session(&out, "2024").unwrap();
        let first_len = fs::metadata(&first).unwrap().len();
        let second = archive_session(&out, "2024").unwrap();

        assert_eq!(first.file_name().unwrap(), "2024.zip");
        assert_eq!(second.file_name().unwrap(), "2024_1.zip");
        assert_eq!(fs::metadata(&first).unwrap().len(), first_len);
    }

    #[test]
    fn archive_contains_every_log() {
        let dir = tempfile::tempdir().unwrap();
        let out = output_dir_with_logs(dir.path());

        let path = archive_session(&out, "7").unwrap();
        let mut archive = zip::ZipArchive::new(File::open(path).unwrap()).unwrap();
        assert_eq!(archive.len(), 2);

        let mut contents = String::new();
        archive
            .by_name("main_log.txt")
            .unwrap()
            .read_to_string(&mut contents)
            .unwrap();
        assert!(contents.contains("participant,2024"));
    }

    #[test]
    fn participant_names_are_sanitized() {
        assert_eq!(sanitize("../evil"), "___evil");
        assert_eq!(sanitize(""), "participant");
    }
}
