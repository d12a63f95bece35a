use thiserror::Error;

/// Errors surfaced by the credential-fetching pipeline
#[derive(Error, Debug)]
pub enum FedError {
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Profile '{profile}' not found in {path}")]
    ProfileNotFound { profile: String, path: String },

    #[error("Base certificates not found; no system CA bundle is installed")]
    CertificatesFileNotFound,

    #[error("No SAML binding: could it be an invalid password?")]
    InvalidCredentials,

    #[error("Invalid SAML assertion: {message}")]
    Assertion { message: String },

    #[error("The credential is expired or will expire in the next 10 minutes")]
    AssertionExpired,

    #[error("No roles found")]
    NoRoles,

    #[error("No roles match your criteria for account and role.{guidance}")]
    NoMatchingRoles { guidance: String },

    #[error("Multiple potential roles found. Use --account or --role argument to limit to one.{guidance}")]
    AmbiguousRoles { guidance: String },

    #[error("Identity provider returned status {status}")]
    IdpStatus { status: u16 },

    #[error("HTTP transport error: {source}")]
    Transport {
        #[from]
        source: reqwest::Error,
    },

    #[error("STS AssumeRoleWithSAML failed: {message}")]
    Exchange { message: String },

    #[error("PIV login is not supported on Linux or MacOS")]
    PlatformMismatch,

    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },
}

impl FedError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    pub fn assertion(message: impl Into<String>) -> Self {
        Self::Assertion {
            message: message.into(),
        }
    }

    pub fn exchange(message: impl Into<String>) -> Self {
        Self::Exchange {
            message: message.into(),
        }
    }

    pub fn no_matching_roles(guidance: impl Into<String>) -> Self {
        Self::NoMatchingRoles {
            guidance: guidance.into(),
        }
    }

    pub fn ambiguous_roles(guidance: impl Into<String>) -> Self {
        Self::AmbiguousRoles {
            guidance: guidance.into(),
        }
    }

    pub fn profile_not_found(profile: impl Into<String>, path: impl Into<String>) -> Self {
        Self::ProfileNotFound {
            profile: profile.into(),
            path: path.into(),
        }
    }
}

pub type FedResult<T> = Result<T, FedError>;
