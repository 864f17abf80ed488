//! Machine descriptions and the engine configuration files rendered from them.

/// Engine configuration reader and semantic checks.
pub mod config;
/// JSON machine description and configuration rendering.
pub mod description;

pub use config::{ConfigValue, MachineConfig, MAX_MEMORY_SIZE_MIB};
pub use description::{
    quote, MachineDescription, CONFIG_VERSION, DEFAULT_MACHINE, DEFAULT_MEMORY_SIZE_MIB,
};

use std::io::Write as _;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::debug;

use crate::{ConfigError, ConfigRef};

/// Owns a rendered engine configuration file for as long as it lives.
///
/// The file is created in a temporary directory and removed when the loader
/// is dropped, so keep the loader alive for the lifetime of any session that
/// was constructed from [`MachineLoader::config_ref`].
#[derive(Debug)]
pub struct MachineLoader {
    file: NamedTempFile,
    base_dir: PathBuf,
}

impl MachineLoader {
    /// Renders `description` into a fresh file in the system temporary directory.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Write`] if the file cannot be created or written.
    pub fn load(description: &MachineDescription, base_dir: &Path) -> Result<Self, ConfigError> {
        let file = tempfile::Builder::new()
            .prefix("temu-")
            .suffix(".cfg")
            .tempfile()
            .map_err(|source| ConfigError::Write {
                path: std::env::temp_dir(),
                source,
            })?;
        Self::write(file, description, base_dir)
    }

    /// Renders `description` into a fresh file inside `dir`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Write`] if the file cannot be created or written.
    pub fn load_in(
        description: &MachineDescription,
        base_dir: &Path,
        dir: &Path,
    ) -> Result<Self, ConfigError> {
        let file = tempfile::Builder::new()
            .prefix("temu-")
            .suffix(".cfg")
            .tempfile_in(dir)
            .map_err(|source| ConfigError::Write {
                path: dir.to_path_buf(),
                source,
            })?;
        Self::write(file, description, base_dir)
    }

    /// Loads a JSON description file and renders it, resolving images next to it.
    ///
    /// Image paths are written out absolute, since the rendered file lives in
    /// a different directory.
    ///
    /// # Errors
    ///
    /// Returns any error from [`MachineDescription::from_path`] or
    /// [`MachineLoader::load`].
    pub fn from_description_file(path: &Path) -> Result<Self, ConfigError> {
        let description = MachineDescription::from_path(path)?;
        let parent = path
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let base_dir = std::path::absolute(parent).map_err(|source| ConfigError::Unreadable {
            path: parent.to_path_buf(),
            source,
        })?;
        Self::load(&description, &base_dir)
    }

    fn write(
        mut file: NamedTempFile,
        description: &MachineDescription,
        base_dir: &Path,
    ) -> Result<Self, ConfigError> {
        let path = file.path().to_path_buf();
        let text = description.render(base_dir);
        file.write_all(text.as_bytes())
            .and_then(|()| file.flush())
            .map_err(|source| ConfigError::Write {
                path: path.clone(),
                source,
            })?;
        debug!(
            path = %path.display(),
            base_dir = %base_dir.display(),
            machine = %description.machine,
            "machine configuration rendered"
        );
        Ok(Self {
            file,
            base_dir: base_dir.to_path_buf(),
        })
    }

    /// Path of the rendered configuration file.
    #[must_use]
    pub fn config_path(&self) -> &Path {
        self.file.path()
    }

    /// Directory image names were resolved against.
    #[must_use]
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Configuration reference suitable for a session controller.
    ///
    /// # Errors
    ///
    /// Never fails for a loader-created file; the signature mirrors
    /// [`ConfigRef::new`].
    pub fn config_ref(&self) -> Result<ConfigRef, ConfigError> {
        ConfigRef::new(self.config_path())
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::{MachineConfig, MachineDescription, MachineLoader};
    use crate::ConfigError;

    #[test]
    fn rendered_file_exists_until_loader_drops() {
        let dir = tempfile::tempdir().expect("tempdir");
        let description = MachineDescription::new("bbl64.bin");
        let loader =
            MachineLoader::load_in(&description, dir.path(), dir.path()).expect("rendered");

        let path = loader.config_path().to_path_buf();
        assert!(path.starts_with(dir.path()));
        assert_eq!(
            path.extension().and_then(|ext| ext.to_str()),
            Some("cfg")
        );
        let text = fs::read_to_string(&path).expect("readable");
        assert_eq!(text, description.render(dir.path()));
        assert_eq!(loader.base_dir(), dir.path());
        assert_eq!(
            loader.config_ref().expect("non-empty").path(),
            path.as_path()
        );

        drop(loader);
        assert!(!path.exists());
    }

    #[test]
    fn description_file_resolves_images_next_to_it() {
        let dir = tempfile::tempdir().expect("tempdir");
        let description_path = dir.path().join("Machine.json");
        fs::write(&description_path, r#"{ "BIOS": "bbl64.bin", "RootDrive": "root.bin" }"#)
            .expect("write description");

        let loader = MachineLoader::from_description_file(&description_path).expect("rendered");
        let config = MachineConfig::from_path(loader.config_path()).expect("parsable");
        let images = config.image_paths();
        assert_eq!(images[0].1, dir.path().join("bbl64.bin"));
        assert_eq!(images[1].1, dir.path().join("root.bin"));
    }

    #[test]
    fn missing_description_file_is_unreadable() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = MachineLoader::from_description_file(&dir.path().join("absent.json"))
            .expect_err("no description");
        assert!(matches!(err, ConfigError::Unreadable { .. }));
    }
}
