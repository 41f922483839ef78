//! Configuration validation with range checks.

use crate::error::ConfigError;

use super::Config;

impl Config {
    /// Validate configuration values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.source.limit == 0 {
            return Err(ConfigError::ValidationError(
                "source.limit must be > 0".into(),
            ));
        }
        if self.source.max_concurrent_downloads == 0 {
            return Err(ConfigError::ValidationError(
                "source.max_concurrent_downloads must be > 0".into(),
            ));
        }
        if self.source.request_timeout_secs == Some(0) {
            return Err(ConfigError::ValidationError(
                "source.request_timeout_secs must be > 0 when set".into(),
            ));
        }
        if self.processing.parallel_workers == 0 {
            return Err(ConfigError::ValidationError(
                "processing.parallel_workers must be > 0".into(),
            ));
        }
        if !(self.processing.harris_k > 0.0) {
            return Err(ConfigError::ValidationError(
                "processing.harris_k must be > 0".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.processing.harris_threshold) {
            return Err(ConfigError::ValidationError(
                "processing.harris_threshold must be between 0.0 and 1.0".into(),
            ));
        }
        if self.limits.max_image_dimension == 0 {
            return Err(ConfigError::ValidationError(
                "limits.max_image_dimension must be > 0".into(),
            ));
        }
        if self.limits.decode_timeout_ms == 0 {
            return Err(ConfigError::ValidationError(
                "limits.decode_timeout_ms must be > 0".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_passes_validation() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_limit() {
        let mut config = Config::default();
        config.source.limit = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("source.limit"));
    }

    #[test]
    fn test_validate_rejects_zero_parallel_workers() {
        let mut config = Config::default();
        config.processing.parallel_workers = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("parallel_workers"));
    }

    #[test]
    fn test_validate_rejects_zero_download_concurrency() {
        let mut config = Config::default();
        config.source.max_concurrent_downloads = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("max_concurrent_downloads"));
    }

    #[test]
    fn test_validate_rejects_zero_request_timeout() {
        let mut config = Config::default();
        config.source.request_timeout_secs = Some(0);
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("request_timeout_secs"));

        config.source.request_timeout_secs = Some(30);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_harris_params() {
        let mut config = Config::default();
        config.processing.harris_k = 0.0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("harris_k"));

        let mut config = Config::default();
        config.processing.harris_threshold = 1.5;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("harris_threshold"));

        config.processing.harris_threshold = -0.1;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("harris_threshold"));
    }

    #[test]
    fn test_validate_rejects_zero_timeout() {
        let mut config = Config::default();
        config.limits.decode_timeout_ms = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("decode_timeout_ms"));
    }
}
