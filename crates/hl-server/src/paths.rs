use directories::ProjectDirs;
use std::path::PathBuf;

pub const APP_QUALIFIER: &str = "org";
pub const APP_ORG: &str = "hushline";
pub const APP_NAME: &str = "hushline";

pub fn data_dir() -> anyhow::Result<PathBuf> {
    let dirs = ProjectDirs::from(APP_QUALIFIER, APP_ORG, APP_NAME)
        .ok_or_else(|| anyhow::anyhow!("cannot determine data directory"))?;
    Ok(dirs.data_dir().to_path_buf())
}

/// `hushline.db` in the data directory, or in the working directory when
/// the platform has no home.
pub fn default_database_path() -> PathBuf {
    data_dir()
        .map(|d| d.join("hushline.db"))
        .unwrap_or_else(|_| PathBuf::from("hushline.db"))
}

pub fn default_config_path() -> anyhow::Result<PathBuf> {
    Ok(data_dir()?.join("config.json"))
}
