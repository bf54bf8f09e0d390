// ABOUTME: Export directory layout and atomic Markdown writer
// ABOUTME: Finished files appear whole or not at all

use crate::convert::to_markdown;
use crate::model::Item;
use crate::ports::TranscriptWriter;
use crate::util::sanitize_title;
use crate::{Error, Result};
use directories::ProjectDirs;
use std::fs;
use std::path::{Path, PathBuf};

pub struct Paths {
    pub export_dir: PathBuf,
    pub tmp_dir: PathBuf,
}

impl Paths {
    pub fn new(export_dir_override: Option<PathBuf>) -> Result<Self> {
        let export_dir = if let Some(dir) = export_dir_override {
            dir
        } else {
            ProjectDirs::from("ai", "granola", "granola-export")
                .ok_or_else(|| {
                    Error::Filesystem(std::io::Error::new(
                        std::io::ErrorKind::NotFound,
                        "Could not determine data directory",
                    ))
                })?
                .data_dir()
                .join("exports")
        };

        Ok(Paths {
            // Same filesystem as the exports so the final rename is atomic.
            tmp_dir: export_dir.join(".tmp"),
            export_dir,
        })
    }

    pub fn ensure_dirs(&self) -> Result<()> {
        for dir in &[&self.export_dir, &self.tmp_dir] {
            fs::create_dir_all(dir)?;
        }
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&self.tmp_dir, fs::Permissions::from_mode(0o700))?;
        }
        Ok(())
    }
}

pub fn export_filename(item: &Item) -> String {
    format!(
        "{}_{}.md",
        item.date.format("%Y-%m-%d"),
        sanitize_title(&item.title)
    )
}

pub fn write_atomic(path: &Path, content: &[u8], tmp_dir: &Path) -> Result<()> {
    use rand::Rng;

    let random: u32 = rand::thread_rng().gen();
    let tmp_path = tmp_dir.join(format!("{:x}.part", random));

    fs::write(&tmp_path, content)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = fs::Permissions::from_mode(0o600);
        fs::set_permissions(&tmp_path, perms)?;
    }

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    if let Err(e) = fs::rename(&tmp_path, path) {
        let _ = fs::remove_file(&tmp_path);
        return Err(e.into());
    }

    Ok(())
}

/// Writes each verified transcript as `YYYY-MM-DD_<title>.md`.
pub struct MarkdownWriter {
    paths: Paths,
}

impl MarkdownWriter {
    pub fn new(paths: Paths) -> Result<Self> {
        paths.ensure_dirs()?;
        Ok(MarkdownWriter { paths })
    }

    pub fn export_dir(&self) -> &Path {
        &self.paths.export_dir
    }
}

impl TranscriptWriter for MarkdownWriter {
    fn path_for(&self, item: &Item) -> PathBuf {
        self.paths.export_dir.join(export_filename(item))
    }

    fn write(&self, item: &Item, text: &str) -> Result<PathBuf> {
        let path = self.path_for(item);
        let content = to_markdown(item, text);
        write_atomic(&path, content.as_bytes(), &self.paths.tmp_dir)?;
        Ok(path)
    }
}
