use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum MigrateError {
    #[error("invalid record identifier: {0}")]
    InvalidIdentifier(String),

    #[error("no record identifier configured")]
    #[diagnostic(help("set `identifier` in mets-migrate.json or pass --identifier"))]
    MissingIdentifier,

    #[error("no download url configured")]
    #[diagnostic(help("set `download_url` in mets-migrate.json or pass --download-url"))]
    MissingDownloadUrl,

    #[error("missing config file mets-migrate.json")]
    #[diagnostic(help(
        "place mets-migrate.json in the current directory or the user config directory, or pass --config"
    ))]
    MissingConfig,

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("no ruleset configured")]
    #[diagnostic(help("set `ruleset` in mets-migrate.json to the path of the ruleset XML"))]
    MissingRuleset,

    #[error("failed to read ruleset at {0}")]
    RulesetRead(PathBuf),

    #[error("invalid ruleset: {0}")]
    RulesetParse(String),

    #[error("record request failed: {0}")]
    RecordHttp(String),

    #[error("record endpoint returned status {status}: {message}")]
    RecordStatus { status: u16, message: String },

    #[error("no record found for identifier {0}")]
    RecordNotFound(String),

    #[error("failed to parse XML: {0}")]
    XmlParse(String),

    #[error("image request failed: {0}")]
    ImageHttp(String),

    #[error("image endpoint returned status {status}: {message}")]
    ImageStatus { status: u16, message: String },

    #[error("image download produced an empty file: {0}")]
    EmptyImage(String),

    #[error("no document found at {0}")]
    #[diagnostic(help("create one with `mets-migrate init`"))]
    DocumentNotFound(PathBuf),

    #[error("invalid document: {0}")]
    InvalidDocument(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),
}
