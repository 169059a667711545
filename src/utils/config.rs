use std::collections::HashMap;
use std::env;
use std::fs::File;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use tracing::info;

pub const DATA_DIR: &str = "DATA_DIR";
pub const DB_PATH: &str = "DB_PATH";
pub const BUCKET_THUMBNAILS: &str = "BUCKET_THUMBNAILS";
pub const WORK_DIR: &str = "WORK_DIR";
pub const ANALYSIS_DIR: &str = "ANALYSIS_DIR";
pub const WORKERS: &str = "WORKERS";

const KEYS: [&str; 6] = [DATA_DIR, DB_PATH, BUCKET_THUMBNAILS, WORK_DIR, ANALYSIS_DIR, WORKERS];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Root of the bucket directories.
    pub data_dir: PathBuf,
    pub db_path: PathBuf,
    /// Derivative bucket for thumbnails and the collage.
    pub bucket_thumbnails: String,
    pub work_dir: PathBuf,
    /// Root of captured vision annotations. Without it pictures are analyzed
    /// offline by palette only.
    pub analysis_dir: Option<PathBuf>,
    pub workers: usize,
}

/// Settings from the `.env` file at `env_path` (if any), overridden by the
/// process environment, falling back to defaults.
pub fn load(env_path: &Path) -> Result<Settings> {
    let mut vars = HashMap::new();
    if env_path.exists() {
        vars = load_from_env(env_path)?;
        info!("Loaded settings from {:?}", env_path);
    }
    for key in KEYS {
        if let Ok(value) = env::var(key) {
            vars.insert(key.to_string(), value);
        }
    }
    resolve(&vars)
}

pub fn resolve(vars: &HashMap<String, String>) -> Result<Settings> {
    let get = |key: &str| vars.get(key).map(|v| v.trim()).filter(|v| !v.is_empty());

    let data_dir = PathBuf::from(get(DATA_DIR).unwrap_or("data"));
    let db_path = get(DB_PATH)
        .map(PathBuf::from)
        .unwrap_or_else(|| data_dir.join("pictures.db"));
    let bucket_thumbnails = get(BUCKET_THUMBNAILS).unwrap_or("thumbnails").to_string();
    if bucket_thumbnails.contains('/') {
        return Err(anyhow!("{BUCKET_THUMBNAILS} must be a single bucket name, got '{bucket_thumbnails}'"));
    }
    let work_dir = get(WORK_DIR)
        .map(PathBuf::from)
        .unwrap_or_else(|| env::temp_dir().join("picture-pipeline"));
    let analysis_dir = get(ANALYSIS_DIR).map(PathBuf::from);
    let workers = match get(WORKERS) {
        Some(raw) => raw
            .parse::<usize>()
            .ok()
            .filter(|n| *n > 0)
            .ok_or_else(|| anyhow!("{WORKERS} must be a positive integer, got '{raw}'"))?,
        None => 2,
    };

    Ok(Settings { data_dir, db_path, bucket_thumbnails, work_dir, analysis_dir, workers })
}

fn load_from_env(path: &Path) -> Result<HashMap<String, String>> {
    let file = File::open(path).with_context(|| format!("Failed to open {:?}", path))?;
    let reader = BufReader::new(file);

    let mut vars = HashMap::new();
    for line in reader.lines() {
        let line = line?;
        let line = line.trim();
        if line.starts_with('#') {
            continue;
        }
        if let Some((key, value)) = line.split_once('=') {
            let key = key.trim();
            if KEYS.contains(&key) {
                vars.insert(key.to_string(), value.trim().to_string());
            }
        }
    }
    Ok(vars)
}

pub fn save_to_env(path: &Path, settings: &Settings) -> Result<()> {
    let mut file = File::create(path).context("Failed to create .env file")?;
    writeln!(file, "{DATA_DIR}={}", settings.data_dir.display())?;
    writeln!(file, "{DB_PATH}={}", settings.db_path.display())?;
    writeln!(file, "{BUCKET_THUMBNAILS}={}", settings.bucket_thumbnails)?;
    writeln!(file, "{WORK_DIR}={}", settings.work_dir.display())?;
    if let Some(dir) = &settings.analysis_dir {
        writeln!(file, "{ANALYSIS_DIR}={}", dir.display())?;
    }
    writeln!(file, "{WORKERS}={}", settings.workers)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn test_save_and_load_env() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join(".env");
        let settings = Settings {
            data_dir: PathBuf::from("/srv/pictures"),
            db_path: PathBuf::from("/srv/pictures/meta.db"),
            bucket_thumbnails: "thumbs".to_string(),
            work_dir: PathBuf::from("/tmp/work"),
            analysis_dir: Some(PathBuf::from("/srv/annotations")),
            workers: 6,
        };

        save_to_env(&path, &settings)?;

        let content = fs::read_to_string(&path)?;
        assert!(content.contains("BUCKET_THUMBNAILS=thumbs"));
        assert!(content.contains("WORKERS=6"));

        let loaded = resolve(&load_from_env(&path)?)?;
        assert_eq!(loaded, settings);
        Ok(())
    }

    #[test]
    fn test_defaults() -> Result<()> {
        let settings = resolve(&HashMap::new())?;
        assert_eq!(settings.data_dir, PathBuf::from("data"));
        assert_eq!(settings.db_path, PathBuf::from("data").join("pictures.db"));
        assert_eq!(settings.bucket_thumbnails, "thumbnails");
        assert_eq!(settings.analysis_dir, None);
        assert_eq!(settings.workers, 2);
        Ok(())
    }

    #[test]
    fn test_comments_and_unknown_keys_are_ignored() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join(".env");
        fs::write(&path, "# local\nPORT=8080\nDATA_DIR = /data \n")?;
        let loaded = load_from_env(&path)?;
        assert_eq!(loaded, vars(&[(DATA_DIR, "/data")]));
        Ok(())
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        assert!(resolve(&vars(&[(WORKERS, "0")])).is_err());
        assert!(resolve(&vars(&[(WORKERS, "many")])).is_err());
        assert!(resolve(&vars(&[(BUCKET_THUMBNAILS, "a/b")])).is_err());
    }
}
