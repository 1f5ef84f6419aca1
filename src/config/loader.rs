use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

use super::SponsorConfig;

pub const DEFAULT_CONFIG_PATHS: &[&str] = &["sponsor.toml", "config/sponsor.toml"];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("读取配置 {path} 失败: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("解析配置 {path} 失败: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("配置非法: {0}")]
    Invalid(String),
}

/// 加载找到的第一个配置文件，均不存在时使用默认值。
/// 显式指定的路径必须存在。
pub fn load_config(path: Option<PathBuf>) -> Result<SponsorConfig, ConfigError> {
    if let Some(explicit) = path {
        return match try_load_file(&explicit)? {
            Some(config) => Ok(config),
            None => Err(ConfigError::Io {
                path: explicit,
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "config file not found"),
            }),
        };
    }

    for candidate in DEFAULT_CONFIG_PATHS.iter().map(PathBuf::from) {
        if let Some(config) = try_load_file(&candidate)? {
            return Ok(config);
        }
    }

    Ok(SponsorConfig::default())
}

fn try_load_file(path: &Path) -> Result<Option<SponsorConfig>, ConfigError> {
    if !path.exists() {
        return Ok(None);
    }

    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let config: SponsorConfig = toml::from_str(&contents).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    config.validate()?;

    Ok(Some(config))
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn explicit_path_is_loaded_and_validated() {
        let mut file = tempfile::NamedTempFile::new().expect("create temp file");
        writeln!(
            file,
            "[registry]\nttl_secs = 120\n\n[stream]\ninterval_ms = 750\n"
        )
        .expect("write config");

        let config = load_config(Some(file.path().to_path_buf())).expect("load config");
        assert_eq!(config.registry.ttl_secs, 120);
        assert_eq!(config.stream.interval_ms, 750);
        assert_eq!(config.policy.max_build_attempts, 3);
    }

    #[test]
    fn missing_explicit_path_is_an_io_error() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let missing = dir.path().join("absent.toml");
        let err = load_config(Some(missing)).expect_err("missing file must fail");
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn malformed_toml_is_a_parse_error() {
        let mut file = tempfile::NamedTempFile::new().expect("create temp file");
        writeln!(file, "[policy\nmax_build_attempts = ").expect("write config");
        let err = load_config(Some(file.path().to_path_buf())).expect_err("parse must fail");
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn invalid_policy_is_rejected_on_load() {
        let mut file = tempfile::NamedTempFile::new().expect("create temp file");
        writeln!(file, "[policy]\nmax_build_attempts = 0\n").expect("write config");
        let err = load_config(Some(file.path().to_path_buf())).expect_err("validation must fail");
        assert!(matches!(err, ConfigError::Invalid(_)));
    }
}
