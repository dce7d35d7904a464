use std::path::PathBuf;

/// Default config file location: `<platform config dir>/hatago/config.toml`.
pub fn default_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "hatago")
        .map(|dirs| dirs.config_dir().join("config.toml"))
}
