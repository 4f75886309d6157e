//! Configuration file loading and validation.

use crate::error::ConfigError;
use crate::types::{ConfigData, KilnConfig};
use kiln_common::{file_mtime, FileDepend};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Name of the configuration file within a project directory.
pub const CONFIG_FILE: &str = "kiln.toml";

/// Loads and validates `kiln.toml` from a project directory, with its includes.
///
/// Included files are read in order and their variables merged first, so the
/// top-level file overrides them. Every file read is recorded with its mtime
/// in [`ConfigData::depends`].
pub fn load_config(project_dir: &Path) -> Result<ConfigData, ConfigError> {
    let config_path = project_dir.join(CONFIG_FILE);
    let config = parse_config(CONFIG_FILE, &read_file(&config_path)?)?;
    validate_config(&config)?;

    let mut depends = vec![FileDepend::new(&config_path, file_mtime(&config_path))];
    let mut vars = BTreeMap::new();
    for include in &config.include {
        let path = project_dir.join(include);
        let included = parse_config(include, &read_file(&path)?)?;
        validate_include(include, &included)?;
        depends.push(FileDepend::new(&path, file_mtime(&path)));
        vars.extend(included.vars);
    }
    vars.extend(config.vars.iter().map(|(k, v)| (k.clone(), v.clone())));

    Ok(ConfigData {
        project_dir: project_dir.to_path_buf(),
        config,
        vars,
        depends,
    })
}

/// Parses and validates a `kiln.toml` configuration from a string.
///
/// Include entries are validated but not resolved, and no file dependencies
/// are recorded. Useful for testing without filesystem dependencies.
pub fn load_config_from_str(content: &str) -> Result<ConfigData, ConfigError> {
    let config = parse_config(CONFIG_FILE, content)?;
    validate_config(&config)?;
    let vars = config.vars.clone();
    Ok(ConfigData {
        project_dir: PathBuf::new(),
        config,
        vars,
        depends: Vec::new(),
    })
}

fn read_file(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|source| ConfigError::IoError {
        path: path.to_path_buf(),
        source,
    })
}

fn parse_config(file: &str, content: &str) -> Result<KilnConfig, ConfigError> {
    toml::from_str(content).map_err(|e| ConfigError::ParseError {
        file: file.to_string(),
        reason: e.to_string(),
    })
}

/// Validates that include entries are usable paths.
fn validate_config(config: &KilnConfig) -> Result<(), ConfigError> {
    for (i, include) in config.include.iter().enumerate() {
        if include.trim().is_empty() {
            return Err(ConfigError::MissingField(format!("include[{i}]")));
        }
    }
    Ok(())
}

/// Included files may only contribute variables.
fn validate_include(name: &str, included: &KilnConfig) -> Result<(), ConfigError> {
    if !included.include.is_empty() {
        return Err(ConfigError::ValidationError {
            file: name.to_string(),
            reason: "included files cannot include further files".to_string(),
        });
    }
    if included.cache.is_some() {
        return Err(ConfigError::ValidationError {
            file: name.to_string(),
            reason: format!("[cache] is only allowed in {CONFIG_FILE}"),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_minimal_config() {
        let data = load_config_from_str("").unwrap();
        assert!(data.config.include.is_empty());
        assert!(data.vars.is_empty());
        assert!(data.cache_dir().is_none());
    }

    #[test]
    fn parse_full_config() {
        let toml = r#"
include = ["conf/machine.toml"]

[cache]
dir = "cache"

[vars]
MACHINE = "qemux86"
DISTRO = "poky"
"#;
        let data = load_config_from_str(toml).unwrap();
        assert_eq!(data.config.include, vec!["conf/machine.toml"]);
        assert_eq!(data.var("MACHINE"), Some("qemux86"));
        assert_eq!(data.cache_dir(), Some(PathBuf::from("cache")));
        assert!(data.depends.is_empty());
    }

    #[test]
    fn invalid_toml_errors() {
        let err = load_config_from_str("this is not valid toml {{{}}}").unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { .. }));
    }

    #[test]
    fn empty_include_errors() {
        let err = load_config_from_str("include = [\"\"]").unwrap_err();
        assert!(matches!(err, ConfigError::MissingField(_)));
    }

    #[test]
    fn load_from_disk_records_depends() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("conf")).unwrap();
        std::fs::write(
            dir.path().join(CONFIG_FILE),
            r#"
include = ["conf/machine.toml"]

[cache]
dir = "cache"

[vars]
MACHINE = "genericx86"
"#,
        )
        .unwrap();
        std::fs::write(
            dir.path().join("conf/machine.toml"),
            "[vars]\nMACHINE = \"qemux86\"\nTUNE = \"core2\"\n",
        )
        .unwrap();

        let data = load_config(dir.path()).unwrap();
        assert_eq!(data.depends.len(), 2);
        assert!(data.depends.iter().all(|d| d.mtime > 0));
        assert_eq!(data.depends[0].path, dir.path().join(CONFIG_FILE));
        assert_eq!(data.var("MACHINE"), Some("genericx86"), "top-level wins");
        assert_eq!(data.var("TUNE"), Some("core2"));
        assert_eq!(data.cache_dir(), Some(dir.path().join("cache")));
        assert_eq!(data.newest_depend(), data.depends.iter().map(|d| d.mtime).max().unwrap());
    }

    #[test]
    fn nested_include_errors() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE), "include = [\"a.toml\"]\n").unwrap();
        std::fs::write(dir.path().join("a.toml"), "include = [\"b.toml\"]\n").unwrap();
        let err = load_config(dir.path()).unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError { .. }));
    }

    #[test]
    fn cache_table_in_include_errors() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE), "include = [\"a.toml\"]\n").unwrap();
        std::fs::write(dir.path().join("a.toml"), "[cache]\ndir = \"x\"\n").unwrap();
        let err = load_config(dir.path()).unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError { .. }));
    }

    #[test]
    fn missing_include_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE), "include = [\"gone.toml\"]\n").unwrap();
        let err = load_config(dir.path()).unwrap_err();
        assert!(matches!(err, ConfigError::IoError { .. }));
        assert!(err.to_string().contains("gone.toml"));
    }

    #[test]
    fn io_error_from_nonexistent_dir() {
        let err = load_config(Path::new("/nonexistent/dir")).unwrap_err();
        assert!(matches!(err, ConfigError::IoError { .. }));
    }
}
