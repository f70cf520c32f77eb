//! Saves downloaded results into a directory.

use std::path::{Path, PathBuf};

use anyhow::Context;
use jobwatch_infra::{ClientConfig, FileSaver, Payload, SaveError};
use tokio::io::AsyncWriteExt;

/// Writes each payload to `{dir}/{title}`, never overwriting an existing file.
#[derive(Debug, Clone)]
pub struct DirectorySaver {
    dir: PathBuf,
}

impl DirectorySaver {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Use the configured directory, else the user's download directory.
    pub fn from_config(config: &ClientConfig) -> anyhow::Result<Self> {
        if let Some(dir) = &config.download_dir {
            return Ok(Self::new(dir));
        }
        let dir = dirs::download_dir()
            .or_else(|| dirs::home_dir().map(|h| h.join("Downloads")))
            .context("failed to resolve a download directory - tried download_dir() and home_dir()/Downloads")?;
        Ok(Self::new(dir))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Create `name` in the directory, or the first free `name (n).ext`.
    ///
    /// Files are opened with `create_new`, so an existing file (even one that
    /// appears concurrently) is never overwritten.
    async fn create_unique(&self, name: &str) -> Result<(PathBuf, tokio::fs::File), SaveError> {
        let (stem, ext) = match name.rsplit_once('.') {
            Some((stem, ext)) if !stem.is_empty() => (stem, Some(ext)),
            _ => (name, None),
        };

        let mut n = 0u32;
        loop {
            let candidate = match (n, ext) {
                (0, _) => self.dir.join(name),
                (n, Some(ext)) => self.dir.join(format!("{stem} ({n}).{ext}")),
                (n, None) => self.dir.join(format!("{stem} ({n})")),
            };
            let opened = tokio::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&candidate)
                .await;
            match opened {
                Ok(file) => return Ok((candidate, file)),
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => n += 1,
                Err(e) => return Err(e.into()),
            }
        }
    }
}

/// Turn a server-provided title into a plain file name.
///
/// Path separators and control characters become `_`; names that are empty
/// or only dots are rejected.
pub fn sanitize_file_name(title: &str) -> Result<String, SaveError> {
    let name: String = title
        .trim()
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    if name.is_empty() || name.chars().all(|c| c == '.') {
        return Err(SaveError::InvalidName(title.to_string()));
    }
    Ok(name)
}

#[async_trait::async_trait]
impl FileSaver for DirectorySaver {
    async fn save(&self, payload: &Payload) -> Result<PathBuf, SaveError> {
        let name = sanitize_file_name(&payload.title)?;
        tokio::fs::create_dir_all(&self.dir).await?;
        let (path, mut file) = self.create_unique(&name).await?;
        file.write_all(&payload.content).await?;
        file.flush().await?;
        tracing::info!(path = %path.display(), bytes = payload.content.len(), "saved result");
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("jobwatch-{name}-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        dir
    }

    #[test]
    fn sanitizes_titles() {
        assert_eq!(sanitize_file_name("grades.csv").unwrap(), "grades.csv");
        assert_eq!(sanitize_file_name("../etc/passwd").unwrap(), ".._etc_passwd");
        assert_eq!(sanitize_file_name(" a\tb.csv ").unwrap(), "a_b.csv");
        assert!(sanitize_file_name("").is_err());
        assert!(sanitize_file_name("..").is_err());
        assert!(sanitize_file_name("   ").is_err());
    }

    #[tokio::test]
    async fn writes_payload_without_overwriting() {
        let dir = scratch_dir("saver");
        let saver = DirectorySaver::new(&dir);

        let first = saver
            .save(&Payload::new("report.csv", "a,b\n"))
            .await
            .unwrap();
        let second = saver
            .save(&Payload::new("report.csv", "c,d\n"))
            .await
            .unwrap();

        assert_eq!(first, dir.join("report.csv"));
        assert_eq!(second, dir.join("report (1).csv"));
        assert_eq!(std::fs::read(&first).unwrap(), b"a,b\n");
        assert_eq!(std::fs::read(&second).unwrap(), b"c,d\n");

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn concurrent_saves_never_share_a_file() {
        let dir = scratch_dir("concurrent");
        let saver = DirectorySaver::new(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("grades"), b"existing").unwrap();

        let a = Payload::new("grades", "a");
        let b = Payload::new("grades", "b");
        let c = Payload::new("grades", "c");
        let (pa, pb, pc) = tokio::join!(saver.save(&a), saver.save(&b), saver.save(&c));
        let mut paths = vec![pa.unwrap(), pb.unwrap(), pc.unwrap()];
        paths.sort();

        assert_eq!(
            paths,
            vec![
                dir.join("grades (1)"),
                dir.join("grades (2)"),
                dir.join("grades (3)"),
            ]
        );
        assert_eq!(std::fs::read(dir.join("grades")).unwrap(), b"existing");
        let mut contents: Vec<Vec<u8>> = paths.iter().map(|p| std::fs::read(p).unwrap()).collect();
        contents.sort();
        assert_eq!(contents, vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec()]);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn rejects_untitled_payload() {
        let saver = DirectorySaver::new(scratch_dir("untitled"));
        let err = saver.save(&Payload::new("", "data")).await.unwrap_err();
        assert!(matches!(err, SaveError::InvalidName(_)));
    }

    #[test]
    fn configured_directory_wins() {
        let config = ClientConfig::default().with_download_dir("/tmp/jobwatch-results");
        let saver = DirectorySaver::from_config(&config).unwrap();
        assert_eq!(saver.dir(), Path::new("/tmp/jobwatch-results"));
    }
}
