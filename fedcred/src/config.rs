use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use configparser::ini::Ini;
use tracing::debug;

use crate::error::{FedError, FedResult};

/// Default session duration in seconds when neither the command line nor the
/// config file provides one.
pub const DEFAULT_DURATION: i32 = 3600;

/// Well-known locations of the system CA bundle, checked in order.
const SYSTEM_BUNDLE_PATHS: &[&str] = &[
    "/etc/ssl/certs/ca-certificates.crt", // Debian, Ubuntu
    "/etc/pki/tls/certs/ca-bundle.crt",   // RHEL, Fedora
    "/etc/ssl/ca-bundle.pem",             // OpenSUSE
    "/etc/ssl/cert.pem",                  // Alpine, macOS
];

/// Settings resolved for one invocation.
///
/// Precedence for every field: explicit command-line value, then the selected
/// profile section of `~/.getawscreds`, then its DEFAULT section, then the
/// built-in default.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub account: Option<String>,
    pub role: Option<String>,
    pub duration: i32,
    pub idp: Option<String>,
    pub username: Option<String>,
    pub subject: Option<String>,
    pub ca_bundle: Option<String>,
}

/// Values taken from the command line that trump the config file.
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub account: Option<String>,
    pub role: Option<String>,
    pub duration: Option<i32>,
    pub idp: Option<String>,
    pub username: Option<String>,
    pub subject: Option<String>,
    pub ca_bundle: Option<String>,
}

/// OS-reported login name, from USER or USERNAME.
pub fn get_user() -> Option<String> {
    env::var("USER").ok().or_else(|| env::var("USERNAME").ok())
}

/// Home directory, from HOME, then HOMEDRIVE+HOMEPATH, then the platform API.
pub fn get_home() -> FedResult<PathBuf> {
    if let Ok(home) = env::var("HOME") {
        return Ok(PathBuf::from(home));
    }
    if let (Ok(drive), Ok(path)) = (env::var("HOMEDRIVE"), env::var("HOMEPATH")) {
        return Ok(PathBuf::from(format!("{}{}", drive, path)));
    }
    dirs::home_dir().ok_or_else(|| FedError::config("could not determine home directory"))
}

pub fn get_awscreds_config_path() -> FedResult<PathBuf> {
    Ok(get_home()?.join(".getawscreds"))
}

pub fn get_aws_config_path() -> FedResult<PathBuf> {
    Ok(get_home()?.join(".aws").join("config"))
}

pub fn get_aws_credentials_path() -> FedResult<PathBuf> {
    Ok(get_home()?.join(".aws").join("credentials"))
}

/// Look a key up in the selected profile section, falling back to DEFAULT.
fn lookup(ini: &Ini, section: Option<&str>, key: &str) -> Option<String> {
    if let Some(section) = section {
        if let Some(value) = ini.get(section, key) {
            return Some(value);
        }
    }
    ini.get("default", key)
}

/// Resolve the effective configuration for this invocation.
///
/// A named profile that does not exist in the config file is an error; the
/// implicit `default` profile is always accepted, file or no file.
pub fn parse_config(
    profile: Option<&str>,
    overrides: &Overrides,
    inipath: Option<&Path>,
) -> FedResult<Config> {
    let inipath = match inipath {
        Some(path) => path.to_path_buf(),
        None => get_awscreds_config_path()?,
    };

    let mut ini = Ini::new();
    if inipath.is_file() {
        ini.load(&inipath)
            .map_err(|e| FedError::config(format!("{}: {}", inipath.display(), e)))?;
    }

    let section = match profile {
        Some(profile) => {
            let section = profile.to_lowercase();
            if section != "default" && !ini.sections().contains(&section) {
                return Err(FedError::profile_not_found(
                    profile,
                    inipath.display().to_string(),
                ));
            }
            Some(section)
        }
        None => None,
    };
    let section = section.as_deref();

    let duration = match overrides.duration {
        Some(duration) => duration,
        None => match lookup(&ini, section, "duration") {
            Some(raw) => raw
                .parse::<i32>()
                .map_err(|_| FedError::config(format!("invalid duration '{}'", raw)))?,
            None => DEFAULT_DURATION,
        },
    };
    if duration <= 0 {
        return Err(FedError::config(format!(
            "duration must be a positive number of seconds, got {}",
            duration
        )));
    }

    let ca_bundle = match &overrides.ca_bundle {
        Some(path) => Some(path.clone()),
        None => match lookup(&ini, section, "ca_bundle") {
            Some(path) => Some(path),
            None => aws_config_ca_bundle()?,
        },
    };

    let config = Config {
        account: overrides
            .account
            .clone()
            .or_else(|| lookup(&ini, section, "account")),
        role: overrides
            .role
            .clone()
            .or_else(|| lookup(&ini, section, "role")),
        duration,
        idp: overrides
            .idp
            .clone()
            .or_else(|| lookup(&ini, section, "idp")),
        username: overrides
            .username
            .clone()
            .or_else(|| lookup(&ini, section, "username"))
            .or_else(get_user),
        subject: overrides
            .subject
            .clone()
            .or_else(|| lookup(&ini, section, "subject")),
        ca_bundle,
    };
    debug!("Resolved configuration: {:?}", config);
    Ok(config)
}

/// The `ca_bundle` key of the default section of `~/.aws/config`, if any.
fn aws_config_ca_bundle() -> FedResult<Option<String>> {
    let path = get_aws_config_path()?;
    if !path.is_file() {
        return Ok(None);
    }
    let mut ini = Ini::new();
    ini.load(&path)
        .map_err(|e| FedError::config(format!("{}: {}", path.display(), e)))?;
    Ok(ini.get("default", "ca_bundle"))
}

/// Copy the system CA bundle to `output` so a user can extend it with the
/// certificate of an intercepting proxy.
pub fn setup_certificates(output: &Path) -> FedResult<()> {
    let candidates: Vec<PathBuf> = SYSTEM_BUNDLE_PATHS.iter().map(PathBuf::from).collect();
    setup_certificates_from(&candidates, output)
}

fn setup_certificates_from(candidates: &[PathBuf], output: &Path) -> FedResult<()> {
    let source = candidates
        .iter()
        .find(|path| path.is_file())
        .ok_or(FedError::CertificatesFileNotFound)?;
    debug!("Copying CA bundle from {}", source.display());
    fs::copy(source, output)?;
    Ok(())
}
