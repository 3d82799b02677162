pub mod config;
pub mod converter;
pub mod metrics;
pub mod testing;

pub use config::{
    load_config, load_config_from_env, load_config_from_str, validate_config, Config,
    ConfigError, ProgressConfig, ServerConfig,
};
pub use converter::{
    ConversionRequest, ConversionResult, ConversionService, ConversionState, ConverterConfig,
    ConverterError, FfmpegToolchain, MediaToolchain, ProgressEvent,
};
