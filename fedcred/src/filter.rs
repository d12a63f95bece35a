use regex::Regex;
use tracing::debug;

use crate::error::{FedError, FedResult};
use crate::saml::RolePair;

/// Role names are commonly provisioned with this organizational prefix, so a
/// bare name matches either the prefixed or unprefixed form.
const ROLE_NAME_PREFIX: &str = "nlm_aws_";

/// Build the left-anchored pattern a role ARN must match.
///
/// An unspecified account becomes a wildcard segment; a role name must
/// terminate the ARN's resource path.
pub fn build_filter_expr(account: Option<&str>, name: Option<&str>) -> String {
    let mut expr = format!("^arn:aws:iam::{}", account.unwrap_or("[^:]+"));
    if let Some(name) = name {
        expr.push_str(&format!(":role/({})?{}$", ROLE_NAME_PREFIX, name));
    }
    expr
}

/// Narrow role pairs by optional account and role-name criteria.
///
/// With no criteria the input comes back unchanged and no pattern is built.
pub fn filter_role_pairs(
    pairs: &[RolePair],
    account: Option<&str>,
    name: Option<&str>,
) -> FedResult<Vec<RolePair>> {
    if account.is_none() && name.is_none() {
        debug!("No account or role filtering");
        return Ok(pairs.to_vec());
    }
    let expr = build_filter_expr(account, name);
    debug!("Filtering role pairs by '{}'", expr);
    let pattern = Regex::new(&expr)
        .map_err(|e| FedError::config(format!("bad role filter '{}': {}", expr, e)))?;

    let mut filtered = Vec::new();
    for pair in pairs {
        if pattern.is_match(&pair.role_arn) {
            filtered.push(pair.clone());
        } else {
            debug!(
                "principal {}, role {}: does not match filter",
                pair.principal_arn, pair.role_arn
            );
        }
    }
    Ok(filtered)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::saml::SamlAssertion;
    use crate::test_fixtures::{saml_response_b64, saml_response_sysop_b64};

    fn pairs() -> Vec<RolePair> {
        SamlAssertion::new(saml_response_b64()).role_pairs().unwrap()
    }

    fn sysop_pairs() -> Vec<RolePair> {
        SamlAssertion::new(saml_response_sysop_b64())
            .role_pairs()
            .unwrap()
    }

    #[test]
    fn test_no_filters_is_identity() {
        let pairs = pairs();
        let filtered = filter_role_pairs(&pairs, None, None).unwrap();
        assert_eq!(filtered, pairs);
    }

    #[test]
    fn test_filter_on_missing_account() {
        let filtered = filter_role_pairs(&pairs(), Some("77"), None).unwrap();
        assert!(filtered.is_empty());
    }

    #[test]
    fn test_filter_on_account() {
        let filtered = filter_role_pairs(&pairs(), Some("070163433501"), None).unwrap();
        assert_eq!(filtered.len(), 3);
        for pair in &filtered {
            assert!(pair
                .role_arn
                .starts_with("arn:aws:iam::070163433501:role/"));
        }
        assert!(filtered
            .iter()
            .any(|p| p.role_arn == "arn:aws:iam::070163433501:role/nlm_aws_admins"));
    }

    #[test]
    fn test_filter_on_role() {
        let filtered = filter_role_pairs(&pairs(), None, Some("nlm_aws_admins")).unwrap();
        assert_eq!(filtered.len(), 2);
        for pair in &filtered {
            assert!(pair.role_arn.ends_with(":role/nlm_aws_admins"));
        }
    }

    #[test]
    fn test_filter_on_account_and_role() {
        let filtered =
            filter_role_pairs(&pairs(), Some("070163433501"), Some("nlm_aws_admins")).unwrap();
        assert_eq!(filtered.len(), 1);
        assert_eq!(
            filtered[0].role_arn,
            "arn:aws:iam::070163433501:role/nlm_aws_admins"
        );
        assert_eq!(
            filtered[0].principal_arn,
            "arn:aws:iam::070163433501:saml-provider/nih-login"
        );
    }

    #[test]
    fn test_filter_on_account_role_exact() {
        let filtered = filter_role_pairs(
            &sysop_pairs(),
            Some("626642342379"),
            Some("nlm_aws_sysops"),
        )
        .unwrap();
        assert_eq!(filtered.len(), 1);
        assert!(filtered[0].role_arn.ends_with(":role/nlm_aws_sysops"));
    }

    #[test]
    fn test_filter_on_role_without_prefix() {
        let filtered = filter_role_pairs(&sysop_pairs(), None, Some("sysops_super")).unwrap();
        assert_eq!(filtered.len(), 1);
        assert!(filtered[0].role_arn.ends_with(":role/nlm_aws_sysops_super"));
    }

    #[test]
    fn test_match_is_left_anchored() {
        let pairs = vec![RolePair::new(
            "arn:aws:iam::1:saml-provider/x",
            "prefix-arn:aws:iam::070163433501:role/nlm_aws_admins",
        )];
        let filtered = filter_role_pairs(&pairs, Some("070163433501"), None).unwrap();
        assert!(filtered.is_empty());
    }

    #[test]
    fn test_build_filter_expr_shapes() {
        assert_eq!(
            build_filter_expr(Some("123"), None),
            "^arn:aws:iam::123"
        );
        assert_eq!(
            build_filter_expr(None, Some("geeks")),
            "^arn:aws:iam::[^:]+:role/(nlm_aws_)?geeks$"
        );
    }
}
