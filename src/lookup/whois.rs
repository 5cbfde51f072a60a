//! WHOIS client over the port 43 text protocol.
//!
//! The server for a TLD is discovered through IANA and remembered for the
//! rest of the run. Thin registries (`.com`, `.net`) point at the registrar's
//! own server, which is queried once more for the full record.

use crate::types::{HijackError, Result, WhoisRecord, WhoisStatus};
use async_trait::async_trait;
use dashmap::DashMap;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, trace};

const IANA_SERVER: &str = "whois.iana.org";
const WHOIS_PORT: u16 = 43;
/// Upper bound on a single response, registries stay far below this.
const MAX_RESPONSE_BYTES: u64 = 1024 * 1024;

/// Answers registration queries for root domains.
#[async_trait]
pub trait WhoisBackend: Send + Sync {
    /// Query the registration state of `domain`, which is already a root domain.
    async fn lookup(&self, domain: &str) -> Result<WhoisStatus>;
}

/// Phrases registries use to say a domain has no registration.
const NOT_FOUND_MARKERS: &[&str] = &[
    "no match for",
    "not found",
    "no data found",
    "no entries found",
    "no matching record",
    "no object found",
    "status: free",
    "status: available",
    "status:\tavailable",
    "is available for registration",
    "the queried object does not exist",
    "domain you requested is not known",
    "nothing found for this query",
    "this domain name has not been registered",
    "is free",
];

const EXPIRATION_KEYS: &[&str] = &[
    "registry expiry date",
    "registrar registration expiration date",
    "expiration date",
    "expiry date",
    "expire date",
    "expiration time",
    "expires on",
    "expires",
    "expire",
    "paid-till",
    "renewal date",
    "valid until",
];

const REGISTRAR_KEYS: &[&str] = &[
    "registrar",
    "registrar name",
    "sponsoring registrar",
    "registrar organization",
];

const DOMAIN_KEYS: &[&str] = &["domain name", "domain", "domainname", "domain_name"];

/// Phrases of throttled or rejected queries.
const REFUSAL_MARKERS: &[&str] = &[
    "limit exceeded",
    "quota exceeded",
    "too many",
    "interval is too short",
    "access denied",
    "%error",
];

/// Parsed content of one WHOIS text response.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ParsedResponse {
    pub not_found: bool,
    pub record: WhoisRecord,
    /// `Registrar WHOIS Server:` value, if present.
    pub referral: Option<String>,
    /// The refusal phrase found in the reply.
    pub refusal: Option<&'static str>,
    /// A `Domain Name:` style line is present.
    pub names_domain: bool,
}

impl ParsedResponse {
    pub fn has_record(&self) -> bool {
        self.record.expiration_date.is_some() || self.record.registrar.is_some()
    }

    /// Expiry or registrar still missing.
    pub fn is_thin(&self) -> bool {
        self.record.expiration_date.is_none() || self.record.registrar.is_none()
    }

    /// Reject replies that answer neither "free" nor "registered".
    pub fn ensure_answer(&self, domain: &str, server: &str) -> Result<()> {
        if self.not_found || self.has_record() {
            return Ok(());
        }

        let message = match self.refusal {
            Some(marker) => format!("{} refused the query ({})", server, marker),
            None if !self.names_domain => format!("unrecognised response from {}", server),
            None => return Ok(()),
        };
        Err(HijackError::WhoisError {
            domain: domain.to_string(),
            message,
        })
    }
}

/// Split `key: value` lines, skipping comments and blank values.
fn fields(raw: &str) -> impl Iterator<Item = (String, &str)> {
    raw.lines().filter_map(|line| {
        let line = line.trim();
        if line.starts_with('%') || line.starts_with('#') || line.starts_with('>') {
            return None;
        }
        let (key, value) = line.split_once(':')?;
        let value = value.trim();
        if value.is_empty() {
            return None;
        }
        Some((key.trim().to_ascii_lowercase(), value))
    })
}

fn first_value(raw: &str, keys: &[&str]) -> Option<String> {
    // Respect key priority, not line order.
    keys.iter().find_map(|wanted| {
        fields(raw)
            .find(|(key, _)| key == wanted)
            .map(|(_, value)| value.to_string())
    })
}

/// Parse a raw WHOIS response.
pub fn parse_response(raw: &str) -> ParsedResponse {
    let lowered = raw.to_lowercase();
    let not_found = NOT_FOUND_MARKERS
        .iter()
        .any(|marker| lowered.contains(marker));

    let record = WhoisRecord {
        expiration_date: first_value(raw, EXPIRATION_KEYS),
        registrar: first_value(raw, REGISTRAR_KEYS),
    };

    let referral = first_value(raw, &["registrar whois server", "whois server"])
        .map(|server| {
            server
                .trim_start_matches("whois://")
                .trim_end_matches('/')
                .to_string()
        })
        .filter(|server| !server.is_empty());

    let refusal = REFUSAL_MARKERS
        .iter()
        .copied()
        .find(|marker| lowered.contains(marker));
    let names_domain = fields(raw).any(|(key, _)| DOMAIN_KEYS.contains(&key.as_str()));

    let mut parsed = ParsedResponse {
        not_found,
        record,
        referral,
        refusal,
        names_domain,
    };
    // A real record that merely mentions "not found" somewhere (e.g. in a
    // disclaimer) still counts as registered.
    parsed.not_found = not_found && !parsed.has_record();
    parsed
}

/// Extract the authoritative server from an IANA TLD response.
pub fn parse_iana_referral(raw: &str) -> Option<String> {
    first_value(raw, &["refer", "whois"])
}

/// Some servers want a flag in front of the query.
fn query_for(server: &str, domain: &str) -> String {
    match server {
        "whois.denic.de" => format!("-T dn,ace {}\r\n", domain),
        "whois.verisign-grs.com" => format!("domain {}\r\n", domain),
        _ => format!("{}\r\n", domain),
    }
}

/// Port 43 WHOIS client.
pub struct TcpWhoisBackend {
    timeout: Duration,
    bootstrap: String,
    port: u16,
    /// TLD -> WHOIS server.
    servers: DashMap<String, String>,
}

impl TcpWhoisBackend {
    /// Create a client. `timeout` bounds each full lookup.
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            bootstrap: IANA_SERVER.to_string(),
            port: WHOIS_PORT,
            servers: DashMap::new(),
        }
    }

    /// Discover TLD servers through `host` instead of IANA, and talk to
    /// every server on `port`.
    pub fn with_bootstrap(mut self, host: &str, port: u16) -> Self {
        self.bootstrap = host.to_string();
        self.port = port;
        self
    }

    async fn query(&self, server: &str, query: &str) -> Result<String> {
        trace!("WHOIS {} <- {}", server, query.trim_end());
        let whois_error = |message: String| HijackError::WhoisError {
            domain: query.trim_end().to_string(),
            message,
        };

        let mut stream = TcpStream::connect((server, self.port))
            .await
            .map_err(|e| whois_error(format!("could not connect to {}: {}", server, e)))?;
        stream.write_all(query.as_bytes()).await?;

        let mut buf = Vec::new();
        let mut limited = stream.take(MAX_RESPONSE_BYTES);
        limited.read_to_end(&mut buf).await?;

        Ok(String::from_utf8_lossy(&buf).into_owned())
    }

    async fn server_for(&self, domain: &str) -> Result<String> {
        let tld = domain
            .rsplit('.')
            .next()
            .filter(|tld| !tld.is_empty())
            .ok_or_else(|| HijackError::DomainError(domain.to_string()))?;

        if let Some(server) = self.servers.get(tld) {
            return Ok(server.clone());
        }

        let response = self.query(&self.bootstrap, &format!("{}\r\n", tld)).await?;
        let server = parse_iana_referral(&response).ok_or_else(|| HijackError::WhoisError {
            domain: domain.to_string(),
            message: format!("IANA has no WHOIS server for .{}", tld),
        })?;

        debug!("WHOIS server for .{} is {}", tld, server);
        self.servers.insert(tld.to_string(), server.clone());
        Ok(server)
    }

    async fn lookup_inner(&self, domain: &str) -> Result<WhoisStatus> {
        let server = self.server_for(domain).await?;
        let raw = self.query(&server, &query_for(&server, domain)).await?;

        if raw.trim().is_empty() {
            return Err(HijackError::WhoisError {
                domain: domain.to_string(),
                message: format!("empty response from {}", server),
            });
        }

        let parsed = parse_response(&raw);
        parsed.ensure_answer(domain, &server)?;
        if parsed.not_found {
            return Ok(WhoisStatus::Free);
        }

        let referral = parsed
            .referral
            .clone()
            .filter(|r| parsed.is_thin() && !r.eq_ignore_ascii_case(&server));
        let mut record = parsed.record;
        if let Some(referral) = referral {
            // Registrar servers are flaky; the registry answer stands on its own.
            match self.query(&referral, &query_for(&referral, domain)).await {
                Ok(raw) => {
                    let detailed = parse_response(&raw).record;
                    record.expiration_date = record.expiration_date.or(detailed.expiration_date);
                    record.registrar = record.registrar.or(detailed.registrar);
                }
                Err(e) => debug!("referral to {} for {} failed: {}", referral, domain, e),
            }
        }

        Ok(WhoisStatus::Registered(record))
    }
}

#[async_trait]
impl WhoisBackend for TcpWhoisBackend {
    async fn lookup(&self, domain: &str) -> Result<WhoisStatus> {
        match timeout(self.timeout, self.lookup_inner(domain)).await {
            Ok(result) => result,
            Err(_) => Err(HijackError::Timeout {
                target: format!("WHOIS for {}", domain),
            }),
        }
    }
}
