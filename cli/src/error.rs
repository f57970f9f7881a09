//! Error handling for the pash CLI

use pash_core::scan::ScanError;
use pash_core::MapError;
use std::path::PathBuf;
use thiserror::Error;

/// Main error type for pash CLI operations
#[derive(Error, Debug)]
pub enum CliError {
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Input/Output error: {message}")]
    Io { message: String },

    #[error("File not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("Invalid format: {message}")]
    InvalidFormat { message: String },

    #[error("Mapping error: {message}")]
    Mapping { message: String },

    #[error("Validation error: {message}")]
    Validation { message: String },

    #[error("Resource error: {message}")]
    Resource { message: String },
}

impl CliError {
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config { message: message.into() }
    }

    pub fn io<S: Into<String>>(message: S) -> Self {
        Self::Io { message: message.into() }
    }

    pub fn file_not_found(path: PathBuf) -> Self {
        Self::FileNotFound { path }
    }

    pub fn invalid_format<S: Into<String>>(message: S) -> Self {
        Self::InvalidFormat { message: message.into() }
    }

    pub fn mapping<S: Into<String>>(message: S) -> Self {
        Self::Mapping { message: message.into() }
    }

    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::Validation { message: message.into() }
    }

    pub fn resource<S: Into<String>>(message: S) -> Self {
        Self::Resource { message: message.into() }
    }
}

impl From<std::io::Error> for CliError {
    fn from(err: std::io::Error) -> Self {
        Self::io(err.to_string())
    }
}

impl From<toml::de::Error> for CliError {
    fn from(err: toml::de::Error) -> Self {
        Self::config(format!("TOML parsing error: {}", err))
    }
}

impl From<MapError> for CliError {
    fn from(err: MapError) -> Self {
        let message = err.to_string();
        match err {
            MapError::Params(_) | MapError::Mask(_) | MapError::Ignore(_) => Self::validation(message),
            MapError::Read(_) | MapError::Genome(_) | MapError::Filter(_) => Self::invalid_format(message),
            MapError::Scan(ScanError::WindowTooLarge { .. }) => Self::validation(message),
            MapError::Build(_) => Self::resource(message),
            MapError::Io(_) => Self::io(message),
            MapError::Scan(_) => Self::mapping(message),
        }
    }
}

/// Result type for CLI operations
pub type CliResult<T> = Result<T, CliError>;

/// Provide helpful error messages and suggestions
pub fn format_error_with_suggestions(error: &CliError) -> String {
    let mut message = error.to_string();

    match error {
        CliError::FileNotFound { path } => {
            message.push_str(&format!(
                "\n\nSuggestions:\n\
                 • Check that the file path is correct: {}\n\
                 • Ensure you have read permissions for the file\n\
                 • A genome given as a .fof file lists one FASTA path per line",
                path.display()
            ));
        }

        CliError::InvalidFormat { .. } => {
            message.push_str(
                "\n\nSuggestions:\n\
                 • Reads must be FASTA or FASTQ, optionally gzip-compressed\n\
                 • Ensure the file is not corrupted or truncated"
            );
        }

        CliError::Validation { .. } => {
            message.push_str(
                "\n\nSuggestions:\n\
                 • Patterns are presets such as 12from18 or literal 0/1 masks\n\
                 • Keep percent must lie between 90 and 100\n\
                 • Ignore list seeds must match the pattern weight"
            );
        }

        CliError::Config { .. } => {
            message.push_str(
                "\n\nSuggestions:\n\
                 • Check your pash.toml configuration file\n\
                 • Use 'pash config --example' to generate a sample configuration"
            );
        }

        CliError::Resource { .. } => {
            message.push_str(
                "\n\nSuggestions:\n\
                 • Lower --keep-percent to prune more repetitive seeds\n\
                 • Split the reads into smaller batches"
            );
        }

        _ => {}
    }

    message
}

/// Print error with helpful suggestions and exit
pub fn print_error_and_exit(error: &CliError) -> ! {
    eprintln!("Error: {}", format_error_with_suggestions(error));
    std::process::exit(1);
}
