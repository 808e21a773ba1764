//! The site lifecycle state machine: the transition matrix, domain-format
//! validation, and the small set of predicates every caller (state store,
//! orchestrators, API handlers) needs instead of re-deriving them.

use crate::models::SiteStatus;
use once_cell::sync::Lazy;
use regex::Regex;

/// Returns the set of statuses `from` may legally move to. Only these
/// edges are valid; anything else is an `InvalidTransition`.
pub fn allowed_targets(from: SiteStatus) -> &'static [SiteStatus] {
    use SiteStatus::*;
    match from {
        Created => &[Provisioning],
        Provisioning => &[Active, Failed],
        Active => &[DomainPending, Destroying],
        DomainPending => &[DomainValidating, Active],
        DomainValidating => &[DomainRouting, DomainPending, Active],
        DomainRouting => &[DomainActive, Active],
        DomainActive => &[DomainRemoving, Destroying],
        DomainRemoving => &[Active, Failed],
        Destroying => &[Destroyed, Failed],
        Failed => &[Provisioning, Destroying],
        Destroyed => &[],
    }
}

pub fn can_transition_to(from: SiteStatus, to: SiteStatus) -> bool {
    allowed_targets(from).contains(&to)
}

pub fn is_terminal(status: SiteStatus) -> bool {
    matches!(status, SiteStatus::Destroyed)
}

/// A custom domain may be attached (or re-attached idempotently) from
/// `ACTIVE` or `DOMAIN_ACTIVE` only.
pub fn allows_custom_domain(status: SiteStatus) -> bool {
    matches!(status, SiteStatus::Active | SiteStatus::DomainActive)
}

/// Destroy may be initiated from these statuses.
pub fn allows_destroy(status: SiteStatus) -> bool {
    matches!(
        status,
        SiteStatus::Active | SiteStatus::DomainActive | SiteStatus::Failed
    )
}

/// `^[a-z0-9]+$` — the site identifier rule.
pub fn is_valid_site_name(name: &str) -> bool {
    static SITE_NAME: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[a-z0-9]+$").unwrap());
    !name.is_empty() && SITE_NAME.is_match(name)
}

/// Label-by-label domain format validation: non-empty, <= 253 chars,
/// matches the label regex, no wildcard prefix, and must not equal (or
/// end in) the base domain.
pub fn validate_domain_format(domain: &str, base_domain: &str) -> Result<(), String> {
    static DOMAIN: Lazy<Regex> = Lazy::new(|| {
        Regex::new(r"^([a-zA-Z0-9]([a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?\.)+[a-zA-Z]{2,}$").unwrap()
    });

    if domain.is_empty() {
        return Err("domain must not be empty".to_string());
    }
    if domain.len() > 253 {
        return Err("domain exceeds 253 characters".to_string());
    }
    if domain.starts_with('*') {
        return Err("wildcard domains are not allowed".to_string());
    }
    if !DOMAIN.is_match(domain) {
        return Err(format!("'{domain}' is not a well-formed domain name"));
    }
    if domain == base_domain || domain.ends_with(&format!(".{base_domain}")) {
        return Err(format!(
            "'{domain}' is the base domain or a subdomain of it; custom domains must be independent"
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use SiteStatus::*;

    #[test]
    fn full_provision_then_destroy_path_is_legal() {
        assert!(can_transition_to(Created, Provisioning));
        assert!(can_transition_to(Provisioning, Active));
        assert!(can_transition_to(Active, Destroying));
        assert!(can_transition_to(Destroying, Destroyed));
    }

    #[test]
    fn domain_attach_then_detach_path_is_legal() {
        assert!(can_transition_to(Active, DomainPending));
        assert!(can_transition_to(DomainPending, DomainValidating));
        assert!(can_transition_to(DomainValidating, DomainRouting));
        assert!(can_transition_to(DomainRouting, DomainActive));
        assert!(can_transition_to(DomainActive, DomainRemoving));
        assert!(can_transition_to(DomainRemoving, Active));
    }

    #[test]
    fn destroyed_is_terminal_and_has_no_outbound_edges() {
        assert!(is_terminal(Destroyed));
        assert!(allowed_targets(Destroyed).is_empty());
    }

    #[test]
    fn illegal_edges_are_rejected() {
        assert!(!can_transition_to(Created, Active));
        assert!(!can_transition_to(Destroyed, Provisioning));
        assert!(!can_transition_to(Active, DomainActive));
    }

    #[test]
    fn failed_may_be_re_provisioned_or_destroyed() {
        assert!(can_transition_to(Failed, Provisioning));
        assert!(can_transition_to(Failed, Destroying));
        assert!(!can_transition_to(Failed, Active));
    }

    #[test]
    fn custom_domain_allowed_from_active_and_domain_active() {
        assert!(allows_custom_domain(Active));
        assert!(allows_custom_domain(DomainActive));
        assert!(!allows_custom_domain(Provisioning));
    }

    #[test]
    fn destroy_allowed_from_active_domain_active_and_failed() {
        assert!(allows_destroy(Active));
        assert!(allows_destroy(DomainActive));
        assert!(allows_destroy(Failed));
        assert!(!allows_destroy(Provisioning));
        assert!(!allows_destroy(Destroyed));
    }

    #[test]
    fn site_name_rule() {
        assert!(is_valid_site_name("mysite"));
        assert!(is_valid_site_name("site123"));
        assert!(!is_valid_site_name(""));
        assert!(!is_valid_site_name("MySite"));
        assert!(!is_valid_site_name("my-site"));
        assert!(!is_valid_site_name("my site"));
    }

    #[test]
    fn domain_format_validation() {
        assert!(validate_domain_format("example.com", "fleet.test").is_ok());
        assert!(validate_domain_format("", "fleet.test").is_err());
        assert!(validate_domain_format("*.example.com", "fleet.test").is_err());
        assert!(validate_domain_format("fleet.test", "fleet.test").is_err());
        assert!(validate_domain_format("mysite.fleet.test", "fleet.test").is_err());
        assert!(validate_domain_format("not a domain", "fleet.test").is_err());
        let too_long = format!("{}.com", "a".repeat(260));
        assert!(validate_domain_format(&too_long, "fleet.test").is_err());
    }
}
