use super::{types::Config, ConfigError};

/// Validate configuration
/// Currently validates:
/// - Server port is not 0
/// - Tool paths are not empty
/// - Stderr read size, tail length and broadcast capacity are positive
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.server.port == 0 {
        return Err(ConfigError::ValidationError(
            "server.port cannot be 0".to_string(),
        ));
    }

    if config.converter.ffmpeg_path.as_os_str().is_empty() {
        return Err(ConfigError::ValidationError(
            "converter.ffmpeg_path cannot be empty".to_string(),
        ));
    }

    if config.converter.ffprobe_path.as_os_str().is_empty() {
        return Err(ConfigError::ValidationError(
            "converter.ffprobe_path cannot be empty".to_string(),
        ));
    }

    if config.converter.read_chunk_size == 0 {
        return Err(ConfigError::ValidationError(
            "converter.read_chunk_size must be greater than 0".to_string(),
        ));
    }

    if config.converter.stderr_tail_lines == 0 {
        return Err(ConfigError::ValidationError(
            "converter.stderr_tail_lines must be greater than 0".to_string(),
        ));
    }

    if config.progress.broadcast_capacity == 0 {
        return Err(ConfigError::ValidationError(
            "progress.broadcast_capacity must be greater than 0".to_string(),
        ));
    }

    Ok(())
}
