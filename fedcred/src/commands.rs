use std::env;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::Result;
use chrono::Utc;
use clap::Parser;
use tracing::{debug, info};

use crate::config::{self, Overrides};
use crate::error::{FedError, FedResult};
use crate::filter::filter_role_pairs;
use crate::idp::{self, IdpSession};
use crate::output::{self, ShellStyle};
use crate::piv;
use crate::saml::RolePair;
use crate::sts;

#[derive(Parser, Debug, Clone)]
pub struct CredsCommand {
    /// Active Directory username; defaults to the OS login name
    #[arg(short, long, value_name = "USERNAME")]
    pub username: Option<String>,

    /// You will be prompted to enter a password if none is provided
    #[arg(long, value_name = "PASSWORD")]
    pub password: Option<String>,

    /// Filters possible roles by role name match
    #[arg(short, long, value_name = "NAME")]
    pub role: Option<String>,

    /// Account number; filters possible roles by account number match
    #[arg(short, long, value_name = "ACCOUNT")]
    pub account: Option<String>,

    /// AWS region for the credential exchange
    #[arg(long, value_name = "REGION", default_value = "us-east-1")]
    pub region: String,

    /// Path where the output should be written
    #[arg(short, long, value_name = "PATH")]
    pub output: Option<PathBuf>,

    /// Multi-certificate PEM file used to validate TLS server certificates
    #[arg(long, value_name = "PATH")]
    pub ca_bundle: Option<String>,

    /// Build a multi-certificate PEM bundle seeded from the system store
    #[arg(long, value_name = "PATH")]
    pub setupcerts: Option<PathBuf>,

    /// Save the SAML assertion without processing it (debugging aid)
    #[arg(short = 's', long, value_name = "PATH")]
    pub samlout: Option<PathBuf>,

    /// Choose either bash or cmd style output
    #[arg(long, value_enum, value_name = "SHELL")]
    pub shell: Option<ShellStyle>,

    /// Section of ~/.getawscreds to use for your configuration
    #[arg(short, long, value_name = "NAME", num_args = 0..=1)]
    pub profile: Option<Option<String>>,

    /// FQDN to use when making federation calls
    #[arg(long, value_name = "FQDN")]
    pub idp: Option<String>,

    /// Duration of the temporary credentials in seconds
    #[arg(long, value_name = "SECONDS")]
    pub duration: Option<i32>,

    /// Request PIV smart-card login rather than username/password
    #[arg(long)]
    pub piv: bool,

    /// The Subject of the X.509 certificate on the smart card
    #[arg(long, value_name = "NAME")]
    pub subject: Option<String>,
}

/// Profile selected when `--profile` is given without a value.
fn default_profile() -> String {
    env::var("AWS_PROFILE")
        .or_else(|_| env::var("AWS_DEFAULT_PROFILE"))
        .unwrap_or_else(|_| "default".to_string())
}

pub async fn run(args: CredsCommand) -> Result<()> {
    if let Some(path) = &args.setupcerts {
        config::setup_certificates(path)?;
        println!("Wrote certificate bundle to {}", path.display());
        return Ok(());
    }

    let profile = args.profile.clone().map(|explicit| match explicit {
        Some(name) => name,
        None => default_profile(),
    });

    let overrides = Overrides {
        account: args.account.clone(),
        role: args.role.clone(),
        duration: args.duration,
        idp: args.idp.clone(),
        username: args.username.clone(),
        subject: args.subject.clone(),
        ca_bundle: args.ca_bundle.clone(),
    };
    let config = config::parse_config(profile.as_deref(), &overrides, None)?;

    let idp = match &config.idp {
        Some(fqdn) => idp::make_idp(fqdn),
        None => idp::default_idp(),
    };
    let ca_bundle = config.ca_bundle.as_deref().map(Path::new);

    // A lingering profile selection would steer the SDK's own config
    // resolution; drop it before anything talks to AWS.
    env::remove_var("AWS_DEFAULT_PROFILE");
    env::remove_var("AWS_PROFILE");

    let samlvalue = if args.piv {
        if !cfg!(windows) {
            return Err(FedError::PlatformMismatch.into());
        }
        let subject = config.subject.as_deref().ok_or_else(|| {
            FedError::config("specify a subject for SmartCard authentication")
        })?;
        piv::fetch_assertion(subject, &idp, ca_bundle).await?
    } else {
        let username = config
            .username
            .as_deref()
            .ok_or_else(|| FedError::config("could not determine a username"))?;
        let password = match &args.password {
            Some(password) => password.clone(),
            None => rpassword::prompt_password("Enter Password: ")?,
        };
        let session = IdpSession::new(idp, ca_bundle)?;
        session.fetch_assertion(username, &password).await?
    };

    // The IdP answers a rejected login with a sentinel value, not an
    // assertion; classify it before any decode is attempted.
    let assertion = idp::classify_login_value(samlvalue)?;

    if let Some(path) = &args.samlout {
        std::fs::write(path, assertion.decode_xml()?)?;
        println!("SAML output saved without processing");
        return Ok(());
    }

    let pairs = assertion.role_pairs()?;
    let pair = select_role_pair(&pairs, &args, &config)?;
    info!("Selected role {}", pair.role_arn);

    let longest = assertion.longest_duration(Utc::now().naive_utc())?;
    let duration = i64::from(config.duration).min(longest) as i32;
    debug!(
        "Requesting {}s of the {}s the assertion can back",
        duration, longest
    );

    let creds = sts::assume_role_with_saml(
        &pair.role_arn,
        &pair.principal_arn,
        assertion.encoded(),
        &args.region,
        duration,
    )
    .await?;

    match args.shell {
        Some(style) => {
            if let Some(path) = &args.output {
                let mut file = output::create_private(path)?;
                output::output_creds(Some(style), &args.region, &creds, &mut file)?;
            } else {
                let stdout = io::stdout();
                output::output_creds(Some(style), &args.region, &creds, &mut stdout.lock())?;
            }
        }
        None => {
            let section = profile.unwrap_or_else(|| "default".to_string());
            output::update_aws_credentials(&args.region, &creds, &section, args.output.as_deref())?;
        }
    }
    Ok(())
}

/// Apply the account/role filters and enforce the exactly-one policy.
///
/// Zero or multiple survivors are terminal; the candidate list rides along
/// under the error message as guidance where it helps the user narrow the
/// filters.
fn select_role_pair(
    pairs: &[RolePair],
    args: &CredsCommand,
    config: &config::Config,
) -> FedResult<RolePair> {
    let mut filtered =
        filter_role_pairs(pairs, config.account.as_deref(), config.role.as_deref())?;
    match filtered.len() {
        1 => Ok(filtered.remove(0)),
        0 => {
            if args.account.is_some() || args.role.is_some() {
                if pairs.is_empty() {
                    Err(FedError::NoRoles)
                } else {
                    Err(FedError::no_matching_roles(output::roles_listing(pairs)))
                }
            } else {
                Err(FedError::NoRoles)
            }
        }
        _ => Err(FedError::ambiguous_roles(output::roles_listing(&filtered))),
    }
}
