use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chrono::{Duration, NaiveDateTime};
use tracing::{debug, warn};

use crate::error::{FedError, FedResult};

/// Attribute URN AWS expects role/principal pairs under.
pub const ROLE_ATTRIBUTE_NAME: &str = "https://aws.amazon.com/SAML/Attributes/Role";

/// Seconds subtracted from the assertion deadline before computing a usable
/// session duration.
const SAFETY_MARGIN_SECS: i64 = 600;

const DEADLINE_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// One (principal ARN, role ARN) pair from the assertion's role attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RolePair {
    pub principal_arn: String,
    pub role_arn: String,
}

impl RolePair {
    pub fn new(principal_arn: impl Into<String>, role_arn: impl Into<String>) -> Self {
        Self {
            principal_arn: principal_arn.into(),
            role_arn: role_arn.into(),
        }
    }
}

/// A base64-encoded SAML response as handed back by the IdP.
#[derive(Debug, Clone)]
pub struct SamlAssertion {
    encoded: String,
}

impl SamlAssertion {
    pub fn new(encoded: impl Into<String>) -> Self {
        Self {
            encoded: encoded.into(),
        }
    }

    /// The base64 form, as AssumeRoleWithSAML wants it.
    pub fn encoded(&self) -> &str {
        &self.encoded
    }

    /// Decode to the raw XML document.
    pub fn decode_xml(&self) -> FedResult<String> {
        let raw = BASE64
            .decode(self.encoded.trim())
            .map_err(|e| FedError::assertion(format!("payload is not valid base64: {}", e)))?;
        String::from_utf8(raw)
            .map_err(|e| FedError::assertion(format!("payload is not valid UTF-8: {}", e)))
    }

    /// Extract every (principal ARN, role ARN) pair, in document order, from
    /// the role attribute of the assertion's AttributeStatement.
    ///
    /// Attribute values that do not split on a comma into exactly two fields
    /// are dropped with a warning. Duplicates are kept.
    pub fn role_pairs(&self) -> FedResult<Vec<RolePair>> {
        let xml = self.decode_xml()?;
        // roxmltree never resolves external entities, so a hostile assertion
        // cannot trigger XXE expansion here.
        let doc = roxmltree::Document::parse(&xml)
            .map_err(|e| FedError::assertion(format!("malformed XML: {}", e)))?;

        let statement = doc
            .descendants()
            .find(|node| node.is_element() && node.tag_name().name() == "AttributeStatement")
            .ok_or_else(|| FedError::assertion("response carries no AttributeStatement"))?;

        let mut pairs = Vec::new();
        for attribute in statement
            .children()
            .filter(|node| node.tag_name().name() == "Attribute")
        {
            if attribute.attribute("Name") != Some(ROLE_ATTRIBUTE_NAME) {
                continue;
            }
            for value in attribute
                .children()
                .filter(|node| node.tag_name().name() == "AttributeValue")
            {
                let text = value.text().unwrap_or("").trim();
                let fields: Vec<&str> = text.split(',').collect();
                if fields.len() == 2 {
                    pairs.push(RolePair::new(fields[0], fields[1]));
                } else {
                    warn!(
                        "AttributeValue should encode a principal arn and role arn: {:?}",
                        text
                    );
                }
            }
        }
        debug!("Extracted {} role pairs from assertion", pairs.len());
        Ok(pairs)
    }

    /// The SessionNotOnOrAfter timestamp of the authentication statement.
    /// An assertion without one is unusable.
    pub fn deadline(&self) -> FedResult<NaiveDateTime> {
        let xml = self.decode_xml()?;
        let doc = roxmltree::Document::parse(&xml)
            .map_err(|e| FedError::assertion(format!("malformed XML: {}", e)))?;

        let statement = doc
            .descendants()
            .find(|node| node.is_element() && node.tag_name().name() == "AuthnStatement")
            .ok_or_else(|| FedError::assertion("response carries no AuthnStatement"))?;

        let raw = statement
            .attribute("SessionNotOnOrAfter")
            .ok_or_else(|| FedError::assertion("the SAML credentials have no expiration timestamp"))?;
        NaiveDateTime::parse_from_str(raw, DEADLINE_FORMAT)
            .map_err(|e| FedError::assertion(format!("bad expiration timestamp '{}': {}", raw, e)))
    }

    /// Whole seconds until the safety-margined deadline, the longest session
    /// duration this assertion can back. Hard error once `now` reaches the
    /// margined deadline.
    pub fn longest_duration(&self, now: NaiveDateTime) -> FedResult<i64> {
        let deadline = self.deadline()? - Duration::seconds(SAFETY_MARGIN_SECS);
        if now >= deadline {
            return Err(FedError::AssertionExpired);
        }
        Ok((deadline - now).num_seconds())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_fixtures::{saml_response_b64, REFERENCE_NOW};

    fn reference_now() -> NaiveDateTime {
        NaiveDateTime::parse_from_str(REFERENCE_NOW, DEADLINE_FORMAT).unwrap()
    }

    #[test]
    fn test_decodes_to_xml() {
        let assertion = SamlAssertion::new(saml_response_b64());
        let xml = assertion.decode_xml().unwrap();
        assert!(xml.starts_with("<Response xmlns="));
    }

    #[test]
    fn test_finds_all_roles() {
        let assertion = SamlAssertion::new(saml_response_b64());
        let pairs = assertion.role_pairs().unwrap();
        assert_eq!(pairs.len(), 6);
        for pair in &pairs {
            assert!(pair.principal_arn.starts_with("arn:aws:iam::"));
            assert!(pair.role_arn.starts_with("arn:aws:iam::"));
        }
        // source order is preserved
        assert_eq!(
            pairs[0].role_arn,
            "arn:aws:iam::070163433501:role/nlm_aws_admins"
        );
    }

    #[test]
    fn test_malformed_value_dropped() {
        let xml = r#"<Response xmlns="urn:oasis:names:tc:SAML:2.0:protocol">
  <Assertion xmlns="urn:oasis:names:tc:SAML:2.0:assertion">
    <AttributeStatement>
      <Attribute Name="https://aws.amazon.com/SAML/Attributes/Role">
        <AttributeValue>arn:aws:iam::1:saml-provider/x,arn:aws:iam::1:role/a</AttributeValue>
        <AttributeValue>not-a-pair</AttributeValue>
        <AttributeValue>one,two,three</AttributeValue>
      </Attribute>
    </AttributeStatement>
  </Assertion>
</Response>"#;
        let assertion = SamlAssertion::new(BASE64.encode(xml));
        let pairs = assertion.role_pairs().unwrap();
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].role_arn, "arn:aws:iam::1:role/a");
    }

    #[test]
    fn test_missing_attribute_statement() {
        let xml = r#"<Response xmlns="urn:oasis:names:tc:SAML:2.0:protocol"></Response>"#;
        let assertion = SamlAssertion::new(BASE64.encode(xml));
        assert!(matches!(
            assertion.role_pairs(),
            Err(FedError::Assertion { .. })
        ));
    }

    #[test]
    fn test_get_deadline() {
        let assertion = SamlAssertion::new(saml_response_b64());
        let deadline = assertion.deadline().unwrap();
        assert_eq!(
            deadline,
            NaiveDateTime::parse_from_str("2017-09-29T14:48:17Z", DEADLINE_FORMAT).unwrap()
        );
    }

    #[test]
    fn test_missing_deadline_is_error() {
        let xml = r#"<Response xmlns="urn:oasis:names:tc:SAML:2.0:protocol">
  <Assertion xmlns="urn:oasis:names:tc:SAML:2.0:assertion">
    <AuthnStatement></AuthnStatement>
  </Assertion>
</Response>"#;
        let assertion = SamlAssertion::new(BASE64.encode(xml));
        assert!(matches!(
            assertion.deadline(),
            Err(FedError::Assertion { .. })
        ));
    }

    #[test]
    fn test_longest_duration_ok() {
        let assertion = SamlAssertion::new(saml_response_b64());
        let duration = assertion.longest_duration(reference_now()).unwrap();
        assert_eq!(duration, 13801);
    }

    #[test]
    fn test_longest_duration_past() {
        let assertion = SamlAssertion::new(saml_response_b64());
        let late = NaiveDateTime::parse_from_str("2017-09-29T14:40:00Z", DEADLINE_FORMAT).unwrap();
        assert!(matches!(
            assertion.longest_duration(late),
            Err(FedError::AssertionExpired)
        ));
    }

    #[test]
    fn test_not_base64() {
        let assertion = SamlAssertion::new("US-EN!!!");
        assert!(matches!(
            assertion.decode_xml(),
            Err(FedError::Assertion { .. })
        ));
    }
}
