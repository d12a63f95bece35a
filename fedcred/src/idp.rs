use std::path::Path;

use scraper::{Html, Selector};
use tracing::debug;

use crate::error::{FedError, FedResult};
use crate::saml::SamlAssertion;

const FORM_URL_FORMAT: &str =
    "https://{}/affwebservices/public/saml2sso?SPID=urn:amazon:webservices&appname=NLM";
const LOGIN_URL_FORMAT: &str = "https://{}/siteminderagent/forms/login.fcc";
const PIV_URL_FORMAT: &str = "https://{}/CertAuthV2/forms/HHSPIVRedirector.aspx";

pub const DEFAULT_IDP_FQDN: &str = "authtest.nih.gov";

/// Sentinel value the IdP hands back in place of a SAML response when the
/// submitted credentials were rejected.
pub const NO_SAML_SENTINEL: &str = "US-EN";

/// The three endpoints of one identity provider deployment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Idp {
    pub form_url: String,
    pub login_url: String,
    pub piv_url: String,
}

fn fill(template: &str, fqdn: &str) -> String {
    template.replacen("{}", fqdn, 1)
}

/// Derive IdP endpoints from an FQDN, or from a complete form URL whose host
/// seeds the login and PIV endpoints.
pub fn make_idp(fqdn_or_url: &str) -> Idp {
    if let Some(rest) = fqdn_or_url
        .strip_prefix("https://")
        .or_else(|| fqdn_or_url.strip_prefix("http://"))
    {
        let fqdn = rest.split('/').next().unwrap_or(rest);
        return Idp {
            form_url: fqdn_or_url.to_string(),
            login_url: fill(LOGIN_URL_FORMAT, fqdn),
            piv_url: fill(PIV_URL_FORMAT, fqdn),
        };
    }
    Idp {
        form_url: fill(FORM_URL_FORMAT, fqdn_or_url),
        login_url: fill(LOGIN_URL_FORMAT, fqdn_or_url),
        piv_url: fill(PIV_URL_FORMAT, fqdn_or_url),
    }
}

pub fn default_idp() -> Idp {
    make_idp(DEFAULT_IDP_FQDN)
}

/// Classify the value scraped from a login response. The sentinel is an
/// authentication failure; anything else is taken as an assertion, with no
/// decode attempted here.
pub fn classify_login_value(value: String) -> FedResult<SamlAssertion> {
    if value == NO_SAML_SENTINEL {
        return Err(FedError::InvalidCredentials);
    }
    Ok(SamlAssertion::new(value))
}

/// One authenticated exchange against the IdP's login form.
pub struct IdpSession {
    client: reqwest::Client,
    idp: Idp,
}

impl IdpSession {
    /// Build the HTTP session. A CA bundle, when configured, is installed on
    /// the client directly rather than through ambient environment state.
    pub fn new(idp: Idp, ca_bundle: Option<&Path>) -> FedResult<Self> {
        let mut builder = reqwest::Client::builder().cookie_store(true);
        if let Some(path) = ca_bundle {
            let pem = std::fs::read(path)?;
            for cert in reqwest::Certificate::from_pem_bundle(&pem)? {
                builder = builder.add_root_certificate(cert);
            }
        }
        let client = builder.build()?;
        Ok(Self { client, idp })
    }

    /// Authenticate with form credentials and return the base64 SAML payload
    /// scraped from the login response.
    ///
    /// The returned string may be the rejected-credentials sentinel; callers
    /// must check for it before decoding.
    pub async fn fetch_assertion(&self, username: &str, password: &str) -> FedResult<String> {
        let mut form_data = self.hidden_inputs().await?;
        form_data.push(("USER".to_string(), username.to_string()));
        form_data.push(("PASSWORD".to_string(), password.to_string()));

        debug!("Submitting login form to {}", self.idp.login_url);
        let response = self
            .client
            .post(&self.idp.login_url)
            .form(&form_data)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FedError::IdpStatus {
                status: status.as_u16(),
            });
        }

        let body = response.text().await?;
        first_input_value(&body).ok_or_else(|| {
            FedError::assertion("login response carries no SAML response input")
        })
    }

    /// Fetch the login form and collect its pre-populated hidden inputs.
    async fn hidden_inputs(&self) -> FedResult<Vec<(String, String)>> {
        debug!("Fetching login form from {}", self.idp.form_url);
        let response = self.client.get(&self.idp.form_url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FedError::IdpStatus {
                status: status.as_u16(),
            });
        }
        let body = response.text().await?;
        Ok(extract_form_inputs(&body))
    }
}

/// Name/value pairs of every input of the first form in the document.
fn extract_form_inputs(html: &str) -> Vec<(String, String)> {
    let document = Html::parse_document(html);
    let form_selector = Selector::parse("form").unwrap();
    let input_selector = Selector::parse("input").unwrap();

    let mut inputs = Vec::new();
    if let Some(form) = document.select(&form_selector).next() {
        for input in form.select(&input_selector) {
            if let (Some(name), Some(value)) =
                (input.value().attr("name"), input.value().attr("value"))
            {
                inputs.push((name.to_string(), value.to_string()));
            }
        }
    }
    inputs
}

/// The value of the first input anywhere in the document, which on a
/// successful login is the base64 SAML response.
pub(crate) fn first_input_value(html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    let selector = Selector::parse("input").unwrap();
    document
        .select(&selector)
        .next()
        .and_then(|input| input.value().attr("value"))
        .map(|value| value.to_string())
}
