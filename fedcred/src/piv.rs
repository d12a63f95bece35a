//! Smart-card (PIV) authentication against the SiteMinder redirector.
//!
//! The flow is three hops: the login form yields a TARGET token, the PIV
//! redirector answers a client-certificate request with a second escaped
//! TARGET, and the decoded target URL finally serves the SAML response.
//! Only the Windows build performs the certificate hop; the card certificate
//! lives in the CURRENT_USER\MY store and SChannel presents it during the
//! TLS handshake. Every other platform reports a platform mismatch so the
//! caller can exit cleanly.

use std::path::Path;

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use scraper::{Html, Selector};

use crate::error::{FedError, FedResult};
use crate::idp::Idp;

/// The redirector rejects unrecognized agents, so claim to be Chrome.
#[cfg_attr(not(windows), allow(dead_code))]
const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/79.0.3945.88 Safari/537.36";

/// The TARGET input of a redirector page; SiteMinder flips the name's case
/// between hops.
#[cfg_attr(not(windows), allow(dead_code))]
fn find_target(html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    for name in ["TARGET", "target"] {
        let selector = Selector::parse(&format!("input[name=\"{}\"]", name)).unwrap();
        if let Some(input) = document.select(&selector).next() {
            return input.value().attr("value").map(|v| v.to_string());
        }
    }
    None
}

/// Everything except alphanumerics and `_.-~` gets percent-encoded, with
/// spaces folded to `+` afterwards.
const QUOTE_PLUS: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'_')
    .remove(b'.')
    .remove(b'-')
    .remove(b'~');

#[cfg_attr(not(windows), allow(dead_code))]
fn quote_plus(value: &str) -> String {
    utf8_percent_encode(value, QUOTE_PLUS)
        .to_string()
        .replace("%20", "+")
}

/// Undo the SiteMinder `-X` escaping of a redirector TARGET and re-encode
/// the SPID and SMPORTALURL query parameters, which the portal expects
/// quoted.
#[cfg_attr(not(windows), allow(dead_code))]
fn decode_redirector_target(target: &str) -> FedResult<String> {
    let mut target = target.strip_prefix("-SM-").unwrap_or(target).to_string();
    if let Some(rest) = target.strip_prefix("HTTPS:") {
        target = format!("https:{}", rest);
    }
    // the `--` pair must come last or it would eat other escapes
    for (escaped, plain) in [
        ("-:", ":"),
        ("-/", "/"),
        ("-=", "="),
        ("-%", "%"),
        ("-?", "?"),
        ("-;", ";"),
        ("-+", "+"),
        ("-#", "#"),
        ("-&", "&"),
        ("- ", " "),
        ("-_", "_"),
        ("-.", "."),
        ("-@", "@"),
        ("--", "-"),
    ] {
        target = target.replace(escaped, plain);
    }

    let (target, fragment) = match target.split_once('#') {
        Some((rest, fragment)) => (rest.to_string(), Some(fragment.to_string())),
        None => (target, None),
    };
    let (base, query) = target
        .split_once('?')
        .ok_or_else(|| FedError::assertion("redirector target carries no query string"))?;

    let mut params = Vec::new();
    for param in query.split('&') {
        let (name, value) = param
            .split_once('=')
            .ok_or_else(|| FedError::assertion("malformed redirector query parameter"))?;
        let value = match name {
            "SPID" | "SMPORTALURL" => quote_plus(value),
            _ => value.to_string(),
        };
        params.push(format!("{}={}", name, value));
    }

    let mut url = format!("{}?{}", base, params.join("&"));
    if let Some(fragment) = fragment {
        url.push('#');
        url.push_str(&fragment);
    }
    Ok(url)
}

/// Split a raw HTTP/1.1 response into status, session cookies, and body.
#[cfg_attr(not(windows), allow(dead_code))]
fn parse_raw_response(raw: &[u8]) -> FedResult<(u16, Vec<String>, String)> {
    let text = String::from_utf8_lossy(raw);
    let (head, body) = text
        .split_once("\r\n\r\n")
        .ok_or_else(|| FedError::assertion("redirector response has no header block"))?;

    let mut lines = head.lines();
    let status = lines
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
        .and_then(|code| code.parse::<u16>().ok())
        .ok_or_else(|| FedError::assertion("redirector response has no status line"))?;

    let mut cookies = Vec::new();
    let mut chunked = false;
    for line in lines {
        if let Some((name, value)) = line.split_once(':') {
            match name.trim().to_ascii_lowercase().as_str() {
                "set-cookie" => {
                    if let Some(pair) = value.trim().split(';').next() {
                        cookies.push(pair.to_string());
                    }
                }
                "transfer-encoding" => chunked = value.to_ascii_lowercase().contains("chunked"),
                _ => {}
            }
        }
    }

    let body = if chunked {
        dechunk(body)?
    } else {
        body.to_string()
    };
    Ok((status, cookies, body))
}

#[cfg_attr(not(windows), allow(dead_code))]
fn dechunk(body: &str) -> FedResult<String> {
    let mut out = String::new();
    let mut rest = body;
    loop {
        let (size_line, after) = rest
            .split_once("\r\n")
            .ok_or_else(|| FedError::assertion("truncated chunked response"))?;
        let size = usize::from_str_radix(size_line.trim(), 16)
            .map_err(|_| FedError::assertion("bad chunk size in redirector response"))?;
        if size == 0 {
            return Ok(out);
        }
        if after.len() < size {
            return Err(FedError::assertion("truncated chunked response"));
        }
        out.push_str(&after[..size]);
        rest = after[size..].trim_start_matches("\r\n");
    }
}

#[cfg(windows)]
mod redirector {
    //! One GET over a TLS session that presents the smart-card certificate.

    use std::io::{Read, Write};
    use std::net::TcpStream;

    use schannel::cert_store::CertStore;
    use schannel::schannel_cred::{Direction, SchannelCred};
    use schannel::tls_stream;

    use crate::error::{FedError, FedResult};

    use super::{parse_raw_response, USER_AGENT};

    /// GET the URL with the card certificate matching `subject` from the
    /// CURRENT_USER\MY store, returning status, session cookies, and body.
    pub fn get_with_cert(url: &str, subject: &str) -> FedResult<(u16, Vec<String>, String)> {
        let rest = url
            .strip_prefix("https://")
            .ok_or_else(|| FedError::assertion("PIV redirector URL is not https"))?;
        let (host_port, path) = match rest.split_once('/') {
            Some((host, path)) => (host, format!("/{}", path)),
            None => (rest, "/".to_string()),
        };
        let (host, port) = match host_port.split_once(':') {
            Some((host, port)) => (
                host,
                port.parse::<u16>()
                    .map_err(|_| FedError::assertion("bad port in PIV redirector URL"))?,
            ),
            None => (host_port, 443),
        };

        let store = CertStore::open_current_user("My")?;
        let cert = store
            .certs()
            .find(|cert| {
                cert.friendly_name()
                    .map(|name| name.contains(subject))
                    .unwrap_or(false)
            })
            .ok_or_else(|| {
                FedError::config(format!(
                    "no certificate matching '{}' in the CURRENT_USER\\MY store",
                    subject
                ))
            })?;

        let creds = SchannelCred::builder()
            .cert(cert)
            .acquire(Direction::Outbound)?;
        let stream = TcpStream::connect((host, port))?;
        let mut tls = match tls_stream::Builder::new().domain(host).connect(creds, stream) {
            Ok(tls) => tls,
            Err(tls_stream::HandshakeError::Failure(e)) => return Err(e.into()),
            Err(tls_stream::HandshakeError::Interrupted(_)) => {
                return Err(FedError::config(format!(
                    "TLS handshake with {} interrupted",
                    host
                )))
            }
        };

        let request = format!(
            "GET {} HTTP/1.1\r\nHost: {}\r\nUser-Agent: {}\r\nConnection: close\r\n\r\n",
            path, host, USER_AGENT
        );
        tls.write_all(request.as_bytes())?;

        let mut raw = Vec::new();
        // servers often drop the connection without a close_notify
        let _ = tls.read_to_end(&mut raw);
        parse_raw_response(&raw)
    }
}

#[cfg(windows)]
pub async fn fetch_assertion(
    subject: &str,
    idp: &Idp,
    ca_bundle: Option<&Path>,
) -> FedResult<String> {
    use tracing::debug;

    debug!("PIV login with certificate subject '{}'", subject);

    let mut builder = reqwest::Client::builder()
        .cookie_store(true)
        .user_agent(USER_AGENT);
    if let Some(path) = ca_bundle {
        let pem = std::fs::read(path)?;
        for cert in reqwest::Certificate::from_pem_bundle(&pem)? {
            builder = builder.add_root_certificate(cert);
        }
    }
    let client = builder.build()?;

    // First hop: the login form carries the TARGET token the redirector
    // needs.
    let body = client.get(&idp.form_url).send().await?.text().await?;
    let target = find_target(&body)
        .ok_or_else(|| FedError::assertion("login form carries no TARGET input"))?;

    // Second hop: the redirector demands the card certificate during the
    // handshake and answers with a second, escaped TARGET.
    let piv_url = format!("{}?TARGET={}", idp.piv_url, target);
    debug!("Requesting PIV redirector at {}", piv_url);
    let (status, cookies, body) = redirector::get_with_cert(&piv_url, subject)?;
    if status != 200 {
        return Err(FedError::IdpStatus { status });
    }
    let target = find_target(&body)
        .ok_or_else(|| FedError::assertion("redirector response carries no TARGET input"))?;
    let url = decode_redirector_target(&target)?;

    // Final hop: the decoded target serves the SAML response, gated on the
    // session cookies the redirector just set.
    debug!("Fetching SAML response from {}", url);
    let mut request = client.get(&url);
    if !cookies.is_empty() {
        request = request.header(reqwest::header::COOKIE, cookies.join("; "));
    }
    let response = request.send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(FedError::IdpStatus {
            status: status.as_u16(),
        });
    }
    let body = response.text().await?;
    crate::idp::first_input_value(&body)
        .ok_or_else(|| FedError::assertion("redirector response carries no SAML response input"))
}

#[cfg(not(windows))]
pub async fn fetch_assertion(
    _subject: &str,
    _idp: &Idp,
    _ca_bundle: Option<&Path>,
) -> FedResult<String> {
    Err(FedError::PlatformMismatch)
}
