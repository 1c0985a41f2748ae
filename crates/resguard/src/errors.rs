use camino::Utf8PathBuf;
use miette::Diagnostic;
use resguard_arsc::ResguardError;
use resguard_config::ConfigError;
use thiserror::Error;

#[derive(Error, Debug, Diagnostic)]
pub enum CliError {
    #[error("Resource table not found: {path}")]
    #[diagnostic(
        code(input::table_not_found),
        help("Point --input at an unpacked APK directory that contains resources.arsc and res/")
    )]
    TableNotFound { path: Utf8PathBuf },

    #[error("Unsupported config file format: {path}")]
    #[diagnostic(
        code(config::unsupported_format),
        help("Use a config file with a .toml or .json extension")
    )]
    UnsupportedConfigFormat { path: Utf8PathBuf },

    #[error("Configuration file error")]
    #[diagnostic(
        code(config::parse_error),
        help("Check your resguard config for syntax errors and whitelist entries of the form pkg.R.type.name")
    )]
    ConfigParseError {
        #[source]
        source: ConfigError,
    },

    #[error("Mapping file error: {path}")]
    #[diagnostic(
        code(mapping::parse_error),
        help("Pass the resource_mapping.txt written by a previous run, or drop --mapping")
    )]
    MappingParseError {
        path: Utf8PathBuf,
        #[source]
        source: ResguardError,
    },

    #[error("Resource table rewrite failed")]
    #[diagnostic(
        code(resguard::failed),
        help("No output table was written. Rerun with --verbose for per-entry detail")
    )]
    ResguardFailed {
        #[from]
        source: ResguardError,
    },

    #[error("IO operation failed")]
    #[diagnostic(code(io::operation_failed))]
    IoError {
        #[from]
        source: std::io::Error,
    },
}

impl CliError {
    pub fn table_not_found(path: Utf8PathBuf) -> Self {
        Self::TableNotFound { path }
    }

    pub fn unsupported_config_format(path: Utf8PathBuf) -> Self {
        Self::UnsupportedConfigFormat { path }
    }

    pub fn config_parse_error(source: ConfigError) -> Self {
        Self::ConfigParseError { source }
    }

    pub fn mapping_parse_error(path: Utf8PathBuf, source: ResguardError) -> Self {
        Self::MappingParseError { path, source }
    }
}
