use aws_config::{BehaviorVersion, Region};
use aws_credential_types::Credentials as SdkCredentials;
use aws_sdk_sts::error::DisplayErrorContext;
use tracing::{debug, info};

use crate::error::{FedError, FedResult};

/// The temporary credential triple produced by the exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: String,
}

/// Exchange the SAML assertion for temporary credentials.
///
/// AssumeRoleWithSAML is an unsigned call, but the SDK still walks its
/// credential-provider chain before sending one. Installing placeholder
/// static credentials on the loader keeps that discovery from failing on a
/// machine that has no credentials yet, without touching process
/// environment state.
pub async fn assume_role_with_saml(
    role_arn: &str,
    principal_arn: &str,
    assertion_b64: &str,
    region: &str,
    duration_seconds: i32,
) -> FedResult<Credentials> {
    info!("Calling STS AssumeRoleWithSAML for {}", role_arn);
    debug!("Principal ARN: {}", principal_arn);
    debug!("Duration: {} seconds", duration_seconds);

    let placeholder = SdkCredentials::new("99999999", "9999999999999999", None, None, "fedcred");
    let config = aws_config::defaults(BehaviorVersion::latest())
        .credentials_provider(placeholder)
        .region(Region::new(region.to_string()))
        .load()
        .await;
    let client = aws_sdk_sts::Client::new(&config);

    let response = client
        .assume_role_with_saml()
        .role_arn(role_arn)
        .principal_arn(principal_arn)
        .saml_assertion(assertion_b64)
        .duration_seconds(duration_seconds)
        .send()
        .await
        .map_err(|e| FedError::exchange(format!("{}", DisplayErrorContext(&e))))?;

    let raw = response
        .credentials()
        .ok_or_else(|| FedError::exchange("STS returned no credentials"))?;

    Ok(Credentials {
        access_key_id: raw.access_key_id().to_string(),
        secret_access_key: raw.secret_access_key().to_string(),
        session_token: raw.session_token().to_string(),
    })
}
