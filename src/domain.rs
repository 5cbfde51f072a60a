//! Registrable (root) domain extraction.
//!
//! Every DNS NS and WHOIS lookup is keyed by the registrable domain so that
//! `a.example.co.uk` and `b.example.co.uk` share one cache entry and one
//! WHOIS query.

use crate::types::{HijackError, Result};

/// Reduce a domain or subdomain to its registrable root using the Public Suffix List.
///
/// The result is lowercase and has no trailing dot. Unknown suffixes fall back to
/// the last two labels.
pub fn root_domain(domain: &str) -> Result<String> {
    let normalized = normalize(domain)?;

    let root = psl::domain_str(&normalized)
        .ok_or_else(|| HijackError::DomainError(format!("{} has no registrable part", domain)))?;

    Ok(root.to_string())
}

/// Lowercase, trim and validate the label syntax of a domain.
fn normalize(domain: &str) -> Result<String> {
    let trimmed = domain.trim().trim_end_matches('.');
    if trimmed.is_empty() {
        return Err(HijackError::DomainError(format!("{:?} is empty", domain)));
    }

    let lowered = trimmed.to_lowercase();
    for label in lowered.split('.') {
        let valid = !label.is_empty()
            && label.len() <= 63
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label
                .chars()
                .all(|c| c.is_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(HijackError::DomainError(domain.to_string()));
        }
    }

    if !lowered.contains('.') {
        return Err(HijackError::DomainError(format!(
            "{} is a bare suffix",
            domain
        )));
    }

    Ok(lowered)
}
