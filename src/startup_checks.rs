//! Startup requirement validation for barman-exporter.
//!
//! This module validates that the privilege-elevation wrapper, the barman binary
//! and the barman configuration directory are usable before the exporter starts.
//! Failures are reported but never abort startup.

use nix::unistd::{access, geteuid, AccessFlags, User};
use std::path::Path;
use tracing::{debug, error, info, warn};

use crate::config::Config;

/// Validate all runtime requirements
pub fn validate_requirements(config: &Config) -> Result<(), ValidationError> {
    info!("🔍 Validating runtime requirements...");

    check_executable(&config.sudo_binary_path())?;
    check_executable(&config.barman_binary_path())?;
    check_config_dir(&config.barman_config_dir())?;
    check_barman_user(&config.barman_user_name());
    check_user_privileges();

    info!("✅ All runtime requirements validated");
    Ok(())
}

/// Check that a binary exists and is executable by us
fn check_executable(path: &Path) -> Result<(), ValidationError> {
    if !path.exists() {
        error!("❌ {} not found", path.display());
        return Err(ValidationError::MissingBinary(path.display().to_string()));
    }

    if let Err(e) = access(path, AccessFlags::X_OK) {
        error!("❌ {} is not executable: {}", path.display(), e);
        return Err(ValidationError::NotExecutable(
            path.display().to_string(),
            e.to_string(),
        ));
    }

    debug!("✅ {} is executable", path.display());
    Ok(())
}

/// Check the watched configuration directory
fn check_config_dir(path: &Path) -> Result<(), ValidationError> {
    if !path.is_dir() {
        error!("❌ config directory {} does not exist", path.display());
        error!("   The config watcher cannot start without it");
        return Err(ValidationError::MissingConfigDir(path.display().to_string()));
    }

    info!("✅ config directory {} found", path.display());
    Ok(())
}

/// Check that the barman user exists on this host
fn check_barman_user(name: &str) {
    match User::from_name(name) {
        Ok(Some(user)) => debug!("barman user '{}' has uid={}", name, user.uid),
        Ok(None) => warn!("⚠️  User '{}' not found - every barman call will fail", name),
        Err(e) => debug!("Failed to lookup user '{}': {}", name, e),
    }
}

/// Running as root means sudo needs no sudoers entry for the exporter
fn check_user_privileges() {
    if geteuid().is_root() {
        info!("✅ Running as root (uid=0)");
    } else {
        warn!("⚠️  Not running as root - sudo must allow running barman without a password");
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("binary not found: {0}")]
    MissingBinary(String),

    #[error("binary not executable: {0} ({1})")]
    NotExecutable(String, String),

    #[error("config directory not found: {0}")]
    MissingConfigDir(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_missing_binary() {
        let cfg = Config {
            sudo_binary_path: Some(PathBuf::from("/nonexistent/sudo")),
            ..Config::default()
        };
        let err = validate_requirements(&cfg).unwrap_err();
        assert!(matches!(err, ValidationError::MissingBinary(_)));
    }

    #[test]
    fn test_missing_config_dir() {
        let err = check_config_dir(Path::new("/nonexistent/barman.d")).unwrap_err();
        assert!(matches!(err, ValidationError::MissingConfigDir(_)));
    }

    #[test]
    fn test_existing_config_dir() {
        let dir = tempfile::tempdir().unwrap();
        assert!(check_config_dir(dir.path()).is_ok());
    }

    #[test]
    fn test_non_executable_file() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let err = check_executable(file.path()).unwrap_err();
        assert!(matches!(err, ValidationError::NotExecutable(..)));
    }
}
