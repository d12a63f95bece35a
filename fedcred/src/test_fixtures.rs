//! Canned SAML responses shared by the parsing, filtering and output tests.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;

/// Fixed "now" used by the duration tests; 13801 seconds short of the
/// margined deadline of the main fixture.
pub const REFERENCE_NOW: &str = "2017-09-29T10:48:16Z";

fn encode_response(deadline: &str, pairs: &[(&str, &str)]) -> String {
    let values = pairs
        .iter()
        .map(|(principal, role)| format!("        <AttributeValue>{},{}</AttributeValue>\n", principal, role))
        .collect::<String>();
    let xml = format!(
        r#"<Response xmlns="urn:oasis:names:tc:SAML:2.0:protocol" ID="_resp" Version="2.0">
  <Assertion xmlns="urn:oasis:names:tc:SAML:2.0:assertion" ID="_assn" Version="2.0">
    <AuthnStatement AuthnInstant="2017-09-29T06:48:17Z" SessionNotOnOrAfter="{}">
      <AuthnContext>
        <AuthnContextClassRef>urn:oasis:names:tc:SAML:2.0:ac:classes:PasswordProtectedTransport</AuthnContextClassRef>
      </AuthnContext>
    </AuthnStatement>
    <AttributeStatement>
      <Attribute Name="https://aws.amazon.com/SAML/Attributes/RoleSessionName">
        <AttributeValue>markfu</AttributeValue>
      </Attribute>
      <Attribute Name="https://aws.amazon.com/SAML/Attributes/Role">
{}      </Attribute>
    </AttributeStatement>
  </Assertion>
</Response>"#,
        deadline, values
    );
    BASE64.encode(xml)
}

/// Six role pairs across three accounts; three of them in 070163433501.
pub fn saml_response_b64() -> String {
    encode_response(
        "2017-09-29T14:48:17Z",
        &[
            (
                "arn:aws:iam::070163433501:saml-provider/nih-login",
                "arn:aws:iam::070163433501:role/nlm_aws_admins",
            ),
            (
                "arn:aws:iam::070163433501:saml-provider/nih-login",
                "arn:aws:iam::070163433501:role/nlm_aws_users",
            ),
            (
                "arn:aws:iam::070163433501:saml-provider/nih-login",
                "arn:aws:iam::070163433501:role/nlm_aws_developers",
            ),
            (
                "arn:aws:iam::123456789012:saml-provider/nih-login",
                "arn:aws:iam::123456789012:role/nlm_aws_admins",
            ),
            (
                "arn:aws:iam::123456789012:saml-provider/nih-login",
                "arn:aws:iam::123456789012:role/nlm_aws_users",
            ),
            (
                "arn:aws:iam::555555555555:saml-provider/nih-login",
                "arn:aws:iam::555555555555:role/readonly",
            ),
        ],
    )
}

/// Sysops variant exercising the organizational role-name prefix.
pub fn saml_response_sysop_b64() -> String {
    encode_response(
        "2017-09-29T14:48:17Z",
        &[
            (
                "arn:aws:iam::626642342379:saml-provider/nih-login",
                "arn:aws:iam::626642342379:role/nlm_aws_sysops",
            ),
            (
                "arn:aws:iam::626642342379:saml-provider/nih-login",
                "arn:aws:iam::626642342379:role/nlm_aws_sysops_super",
            ),
            (
                "arn:aws:iam::070163433501:saml-provider/nih-login",
                "arn:aws:iam::070163433501:role/nlm_aws_users",
            ),
        ],
    )
}
