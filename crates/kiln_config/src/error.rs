//! Error types for configuration loading and validation.

use std::path::PathBuf;

/// Errors that can occur when loading `kiln.toml` and its include files.
///
/// Each variant names the file it arose in, since a configuration may be
/// assembled from several.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A configuration file could not be read.
    #[error("failed to read {}: {source}", path.display())]
    IoError {
        /// The file being read.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// A configuration file is not valid TOML for the expected layout.
    #[error("failed to parse {file}: {reason}")]
    ParseError {
        /// The file being parsed.
        file: String,
        /// The TOML error.
        reason: String,
    },

    /// A required field is missing or empty.
    #[error("missing required field: {0}")]
    MissingField(String),

    /// A file is well-formed but not allowed where it appears.
    #[error("{file}: {reason}")]
    ValidationError {
        /// The offending file.
        file: String,
        /// What is not allowed.
        reason: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_missing_field() {
        let err = ConfigError::MissingField("include[0]".to_string());
        assert_eq!(format!("{err}"), "missing required field: include[0]");
    }

    #[test]
    fn display_parse_error() {
        let err = ConfigError::ParseError {
            file: "kiln.toml".to_string(),
            reason: "expected '=' at line 3".to_string(),
        };
        assert_eq!(
            format!("{err}"),
            "failed to parse kiln.toml: expected '=' at line 3"
        );
    }

    #[test]
    fn display_validation_error() {
        let err = ConfigError::ValidationError {
            file: "conf/a.toml".to_string(),
            reason: "included files cannot include further files".to_string(),
        };
        assert_eq!(
            format!("{err}"),
            "conf/a.toml: included files cannot include further files"
        );
    }

    #[test]
    fn display_io_error_names_file() {
        let err = ConfigError::IoError {
            path: PathBuf::from("conf/missing.toml"),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "file not found"),
        };
        assert_eq!(
            format!("{err}"),
            "failed to read conf/missing.toml: file not found"
        );
    }
}
