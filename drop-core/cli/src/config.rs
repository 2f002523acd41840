use std::{
    env,
    ffi::OsString,
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result, anyhow};
use drop_core::LocalEngineConfig;
use serde::{Deserialize, Serialize};

const APP_DIR: &str = "arkdrop";

/// Configuration for the CLI application.
///
/// This structure is persisted to TOML and stores user preferences, such as
/// the default directory to save received files and where offers are spooled.
///
/// It lives at `arkdrop/config.toml` under the per-user config directory,
/// and offers are spooled under the per-user data directory by default.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct CliConfig {
    pub default_receive_dir: Option<String>,
    pub spool_dir: Option<String>,
    pub chunk_size: Option<u64>,
}

impl CliConfig {
    /// `arkdrop` under the per-user config directory.
    pub fn config_dir() -> Result<PathBuf> {
        Ok(user_dir(UserDir::Config)?.join(APP_DIR))
    }

    pub fn config_file() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Loads the configuration from disk, or the defaults when there is no
    /// file yet.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_file()?)
    }

    pub fn load_from(config_file: &Path) -> Result<Self> {
        if !config_file.exists() {
            return Ok(Self::default());
        }

        let config_content =
            fs::read_to_string(config_file).with_context(|| {
                format!("Failed to read config file: {}", config_file.display())
            })?;

        toml::from_str(&config_content)
            .with_context(|| "Failed to parse config file")
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_file()?)
    }

    /// Writes the configuration, creating the parent directory if needed.
    pub fn save_to(&self, config_file: &Path) -> Result<()> {
        if let Some(config_dir) = config_file.parent() {
            fs::create_dir_all(config_dir).with_context(|| {
                format!(
                    "Failed to create config directory: {}",
                    config_dir.display()
                )
            })?;
        }

        let config_content = toml::to_string_pretty(self)
            .with_context(|| "Failed to serialize config")?;

        fs::write(config_file, config_content).with_context(|| {
            format!("Failed to write config file: {}", config_file.display())
        })
    }

    /// The saved receive directory, or `Downloads/Drop` in the user's home.
    /// Without a home directory files land in the working directory.
    pub fn receive_dir(&self) -> PathBuf {
        if let Some(dir) = &self.default_receive_dir {
            return PathBuf::from(dir);
        }
        match user_dir(UserDir::Home) {
            Ok(home) => home.join("Downloads").join("Drop"),
            Err(_) => {
                env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
            }
        }
    }

    /// Spool directory shared by senders and receivers on this machine.
    /// `overridden` comes from the command line or the environment.
    pub fn spool_dir(&self, overridden: Option<&Path>) -> Result<PathBuf> {
        if let Some(dir) = overridden {
            return Ok(dir.to_path_buf());
        }
        match &self.spool_dir {
            Some(dir) => Ok(PathBuf::from(dir)),
            None => Ok(user_dir(UserDir::Data)?.join(APP_DIR).join("spool")),
        }
    }

    pub fn engine_config(
        &self,
        overridden: Option<&Path>,
    ) -> Result<LocalEngineConfig> {
        let mut config = LocalEngineConfig::new(self.spool_dir(overridden)?);
        if let Some(chunk_size) = self.chunk_size {
            config = config.with_chunk_size(chunk_size);
        }
        Ok(config)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum UserDir {
    Home,
    Config,
    Data,
}

/// Resolves a per-user directory from the platform's environment.
///
/// - Linux and others: `$XDG_CONFIG_HOME` and `$XDG_DATA_HOME`, falling back
///   to `~/.config` and `~/.local/share`
/// - macOS: `~/Library/Application Support` for both
/// - Windows: `%APPDATA%` and `%LOCALAPPDATA%`, home is `%USERPROFILE%`
fn user_dir(kind: UserDir) -> Result<PathBuf> {
    resolve_user_dir(kind, |name| env::var_os(name).filter(|v| !v.is_empty()))
}

fn resolve_user_dir(
    kind: UserDir,
    var: impl Fn(&str) -> Option<OsString>,
) -> Result<PathBuf> {
    let from_var = |name: &str| var(name).map(PathBuf::from);
    let home_var = if cfg!(windows) { "USERPROFILE" } else { "HOME" };
    let home = || {
        from_var(home_var).ok_or_else(|| {
            anyhow!(
                "Unable to determine {kind:?} directory (missing {home_var})"
            )
        })
    };

    if cfg!(windows) {
        let name = match kind {
            UserDir::Home => return home(),
            UserDir::Config => "APPDATA",
            UserDir::Data => "LOCALAPPDATA",
        };
        return from_var(name).ok_or_else(|| {
            anyhow!("Unable to determine {kind:?} directory (missing {name})")
        });
    }

    if cfg!(target_os = "macos") {
        return match kind {
            UserDir::Home => home(),
            UserDir::Config | UserDir::Data => {
                Ok(home()?.join("Library").join("Application Support"))
            }
        };
    }

    match kind {
        UserDir::Home => home(),
        UserDir::Config => match from_var("XDG_CONFIG_HOME") {
            Some(dir) => Ok(dir),
            None => Ok(home()?.join(".config")),
        },
        UserDir::Data => match from_var("XDG_DATA_HOME") {
            Some(dir) => Ok(dir),
            None => Ok(home()?.join(".local").join("share")),
        },
    }
}

#[cfg(test)]
mod test {
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = TempDir::new().unwrap();
        let config = CliConfig::load_from(&dir.path().join("config.toml"))
            .unwrap();
        assert_eq!(config, CliConfig::default());
    }

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("nested").join("config.toml");
        let config = CliConfig {
            default_receive_dir: Some("/tmp/drop".into()),
            spool_dir: None,
            chunk_size: Some(1024),
        };
        config.save_to(&file).unwrap();
        assert_eq!(CliConfig::load_from(&file).unwrap(), config);
    }

    #[test]
    fn test_rejects_malformed_file() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("config.toml");
        fs::write(&file, "chunk_size = \"big\"").unwrap();
        assert!(CliConfig::load_from(&file).is_err());
    }

    fn vars(
        pairs: &[(&'static str, &'static str)],
    ) -> impl Fn(&str) -> Option<OsString> {
        let pairs = pairs.to_vec();
        move |name| {
            pairs
                .iter()
                .find(|(k, _)| *k == name)
                .map(|(_, v)| OsString::from(v))
        }
    }

    #[cfg(all(unix, not(target_os = "macos")))]
    #[test]
    fn test_user_dir_prefers_xdg() {
        let env = vars(&[
            ("HOME", "/home/ann"),
            ("XDG_CONFIG_HOME", "/xdg/config"),
        ]);
        assert_eq!(
            resolve_user_dir(UserDir::Config, &env).unwrap(),
            PathBuf::from("/xdg/config")
        );
        assert_eq!(
            resolve_user_dir(UserDir::Data, &env).unwrap(),
            PathBuf::from("/home/ann/.local/share")
        );
        assert_eq!(
            resolve_user_dir(UserDir::Home, &env).unwrap(),
            PathBuf::from("/home/ann")
        );
    }

    #[cfg(all(unix, not(target_os = "macos")))]
    #[test]
    fn test_user_dir_without_home() {
        let env = vars(&[("XDG_DATA_HOME", "/xdg/data")]);
        assert_eq!(
            resolve_user_dir(UserDir::Data, &env).unwrap(),
            PathBuf::from("/xdg/data")
        );
        let err = resolve_user_dir(UserDir::Config, &env).unwrap_err();
        assert!(err.to_string().contains("missing HOME"));
    }

    #[test]
    fn test_engine_config_prefers_override() {
        let config = CliConfig {
            default_receive_dir: None,
            spool_dir: Some("/var/spool/arkdrop".into()),
            chunk_size: Some(0),
        };
        let engine = config
            .engine_config(Some(Path::new("/tmp/spool")))
            .unwrap();
        assert_eq!(engine.spool_dir, PathBuf::from("/tmp/spool"));
        assert_eq!(engine.chunk_size, 1);

        let engine = config.engine_config(None).unwrap();
        assert_eq!(engine.spool_dir, PathBuf::from("/var/spool/arkdrop"));
    }
}
