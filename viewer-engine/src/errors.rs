use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Stream reload failed: {reason}")]
    ReloadFailed { reason: String },

    #[error("Media repair failed: {reason}")]
    MediaRepairFailed { reason: String },

    #[error("Codec swap failed: {reason}")]
    CodecSwapFailed { reason: String },

    #[error("Streaming client already destroyed")]
    Destroyed,
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Config serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Invalid configuration: {message}")]
    Invalid { message: String },
}

// Engine-level error type
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Session error: {0}")]
    Session(#[from] common::ViewerError),

    #[error("Streaming client error: {0}")]
    Client(#[from] ClientError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Component initialization failed: {component}")]
    ComponentInitializationFailed { component: String },
}
