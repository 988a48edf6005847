use cloudweave_rules::RuleError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config directory not found")]
    ConfigDirNotFound,

    #[error(
        "Profile file not found. Searched:\n\
        - current directory: weave.local.kdl, .weave.local.kdl, weave.kdl, .weave.kdl\n\
        - ./.cloudweave/ directory\n\
        - ~/.config/cloudweave/weave.kdl\n\
        Set CLOUDWEAVE_CONFIG_PATH to point at a file directly"
    )]
    ProfileFileNotFound,

    #[error("KDL parse error: {0}")]
    KdlParse(#[from] kdl::KdlError),

    #[error("Invalid profile '{provider}': {message}")]
    InvalidProfile { provider: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid rule in profile: {0}")]
    Rule(#[from] RuleError),
}

pub type Result<T> = std::result::Result<T, ConfigError>;
