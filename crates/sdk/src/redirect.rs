//! Redirect target resolution
//!
//! Turns relative targets into absolute URLs on the plugin's external base,
//! and guards against open redirects: a caller-supplied target is only
//! honored verbatim when its host is on the allow-list, otherwise it is
//! collapsed to its path-only ("resource") form.

use percent_encoding::percent_decode_str;
use url::Url;

/// Query parameter carrying the login outcome
pub const RESULT_PARAM: &str = "result";

/// Query parameter carrying the failure reason
pub const ERROR_MESSAGE_PARAM: &str = "errorMessage";

const DEFAULT_ERROR_MESSAGE: &str = "Authentication failed";

/// Base used to parse path-only targets; never appears in output
const PLACEHOLDER_BASE: &str = "http://placeholder.invalid/";

#[derive(Debug, thiserror::Error)]
pub enum RedirectError {
    #[error("malformed url: {0}")]
    Parse(#[from] url::ParseError),

    #[error("base url cannot carry a path: {0}")]
    NotHierarchical(String),
}

/// Login outcome signalled to the front end
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Failure,
}

impl Outcome {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failure => "failure",
        }
    }
}

/// A parsed redirect candidate
enum Target {
    /// Carries a host, including protocol-relative `//host/...` forms
    Absolute(Url),
    /// Path-only, parsed against the placeholder base
    Relative(Url),
}

fn placeholder_base() -> Url {
    Url::parse(PLACEHOLDER_BASE).expect("placeholder base is a valid url")
}

fn parse_target(raw: &str) -> Result<Target, RedirectError> {
    match Url::parse(raw) {
        Ok(url) if url.host_str().is_some() => Ok(Target::Absolute(url)),
        Ok(url) => {
            // Host-less scheme such as `javascript:` or `mailto:`; keep only
            // what a path-only target could express.
            let mut relative = placeholder_base();
            relative.set_path(url.path());
            relative.set_query(url.query());
            relative.set_fragment(url.fragment());
            Ok(Target::Relative(relative))
        }
        Err(url::ParseError::RelativeUrlWithoutBase) => {
            let base = placeholder_base();
            let joined = base.join(raw)?;
            if joined.host_str() == base.host_str() {
                Ok(Target::Relative(joined))
            } else {
                Ok(Target::Absolute(joined))
            }
        }
        Err(e) => Err(e.into()),
    }
}

/// Path + query + fragment, always rooted at a single `/`
fn resource(url: &Url) -> String {
    let mut out = format!("/{}", url.path().trim_start_matches('/'));
    if let Some(query) = url.query() {
        out.push('?');
        out.push_str(query);
    }
    if let Some(fragment) = url.fragment() {
        out.push('#');
        out.push_str(fragment);
    }
    out
}

fn decoded_segments(url: &Url) -> Vec<String> {
    url.path_segments()
        .map(|segments| {
            segments
                .filter(|s| !s.is_empty())
                .map(|s| percent_decode_str(s).decode_utf8_lossy().into_owned())
                .collect()
        })
        .unwrap_or_default()
}

/// Replace the value of `key` in place, or append it
fn upsert(pairs: &mut Vec<(String, String)>, key: &str, value: &str) {
    let mut seen = false;
    pairs.retain_mut(|(k, v)| {
        if k != key {
            return true;
        }
        if seen {
            return false;
        }
        seen = true;
        *v = value.to_string();
        true
    });
    if !seen {
        pairs.push((key.to_string(), value.to_string()));
    }
}

fn set_query_pairs(url: &mut Url, pairs: &[(String, String)]) {
    if pairs.is_empty() {
        url.set_query(None);
    } else {
        url.query_pairs_mut().clear().extend_pairs(pairs);
    }
}

/// Web url on an allow-listed host; other schemes never qualify
fn host_allowed(url: &Url, allowed_hosts: &[String]) -> bool {
    if !matches!(url.scheme(), "http" | "https") {
        return false;
    }
    url.host_str().is_some_and(|host| {
        allowed_hosts
            .iter()
            .any(|allowed| allowed.eq_ignore_ascii_case(host))
    })
}

/// Resolve `url` against `base_url`.
///
/// A host-bearing `url` is returned unchanged. Otherwise the base path
/// segments are followed by the url's own segments, and the query is the
/// union of the base query, `extra_query` and the url's query, later sources
/// winning on key collision.
pub fn to_absolute(
    url: &str,
    base_url: &str,
    extra_query: &[(&str, &str)],
) -> Result<String, RedirectError> {
    let relative = match parse_target(url)? {
        Target::Absolute(_) => return Ok(url.to_string()),
        Target::Relative(relative) => relative,
    };

    let mut merged = Url::parse(base_url)?;

    let mut segments = decoded_segments(&merged);
    segments.extend(decoded_segments(&relative));
    merged
        .path_segments_mut()
        .map_err(|()| RedirectError::NotHierarchical(base_url.to_string()))?
        .clear()
        .extend(&segments);

    let mut pairs: Vec<(String, String)> = merged.query_pairs().into_owned().collect();
    for (key, value) in extra_query {
        upsert(&mut pairs, key, value);
    }
    for (key, value) in relative.query_pairs() {
        upsert(&mut pairs, &key, &value);
    }
    set_query_pairs(&mut merged, &pairs);
    merged.set_fragment(relative.fragment());

    Ok(merged.to_string())
}

/// Open-redirect guard.
///
/// Empty input becomes `/`. An `http` or `https` candidate whose host is in
/// `allowed_hosts` is returned unchanged; anything else is reduced to its resource form with no
/// scheme or host. Must be applied to every request-supplied target right
/// before it is used.
pub fn normalize(candidate: &str, allowed_hosts: &[String]) -> Result<String, RedirectError> {
    if candidate.is_empty() {
        return Ok("/".to_string());
    }

    match parse_target(candidate)? {
        Target::Absolute(url) if host_allowed(&url, allowed_hosts) => Ok(candidate.to_string()),
        Target::Absolute(url) => {
            tracing::warn!(
                host = url.host_str().unwrap_or_default(),
                "Redirect host not in allow-list, keeping path only"
            );
            Ok(resource(&url))
        }
        Target::Relative(url) => Ok(resource(&url)),
    }
}

/// Set `result` (and `errorMessage` on failure) on a redirect target.
///
/// Success strips any stale `errorMessage`. Other parameters keep their
/// order. Applying the same outcome twice yields the same query.
pub fn append_outcome(
    target: &str,
    outcome: Outcome,
    error_message: Option<&str>,
) -> Result<String, RedirectError> {
    let (mut url, is_relative) = match parse_target(target)? {
        Target::Absolute(url) => (url, false),
        Target::Relative(url) => (url, true),
    };

    let mut pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
    upsert(&mut pairs, RESULT_PARAM, outcome.as_str());
    match outcome {
        Outcome::Success => pairs.retain(|(k, _)| k != ERROR_MESSAGE_PARAM),
        Outcome::Failure => upsert(
            &mut pairs,
            ERROR_MESSAGE_PARAM,
            error_message
                .filter(|m| !m.is_empty())
                .unwrap_or(DEFAULT_ERROR_MESSAGE),
        ),
    }
    set_query_pairs(&mut url, &pairs);

    Ok(if is_relative {
        resource(&url)
    } else {
        url.to_string()
    })
}

/// Where a login cycle may send the user agent.
///
/// The plugin's own external host and the host of the configured default
/// target are always trusted on top of the allow-list, so that a state value
/// minted by this plugin survives revalidation unchanged.
#[derive(Debug, Clone)]
pub struct RedirectPolicy {
    external_url: String,
    default_target: String,
    trusted_hosts: Vec<String>,
}

impl RedirectPolicy {
    pub fn new(
        external_url: &str,
        default_redirect: &str,
        allowed_hosts: &[String],
    ) -> Result<Self, RedirectError> {
        let external = Url::parse(external_url)?;
        let default_target = to_absolute(default_redirect, external_url, &[])?;

        let mut trusted_hosts: Vec<String> = allowed_hosts
            .iter()
            .map(|h| h.trim().to_ascii_lowercase())
            .filter(|h| !h.is_empty())
            .collect();
        if let Some(host) = external.host_str() {
            trusted_hosts.push(host.to_ascii_lowercase());
        }
        if let Target::Absolute(url) = parse_target(&default_target)? {
            if let Some(host) = url.host_str() {
                trusted_hosts.push(host.to_ascii_lowercase());
            }
        }
        trusted_hosts.dedup();

        Ok(Self {
            external_url: external_url.to_string(),
            default_target,
            trusted_hosts,
        })
    }

    /// Absolute default post-login target
    pub fn default_target(&self) -> &str {
        &self.default_target
    }

    pub fn trusted_hosts(&self) -> &[String] {
        &self.trusted_hosts
    }

    /// Target for a login start; `requested` comes from the query string
    pub fn initial_target(&self, requested: Option<&str>) -> Result<String, RedirectError> {
        match requested.filter(|r| !r.is_empty()) {
            Some(candidate) => {
                let safe = normalize(candidate, &self.trusted_hosts)?;
                to_absolute(&safe, &self.external_url, &[])
            }
            None => Ok(self.default_target.clone()),
        }
    }

    /// Re-check a state value echoed back by the provider.
    ///
    /// Never fails: anything unusable falls back to the default target.
    pub fn revalidate(&self, echoed: Option<&str>) -> String {
        match self.initial_target(echoed) {
            Ok(target) => target,
            Err(e) => {
                tracing::warn!(error = %e, "Discarding unusable redirect state");
                self.default_target.clone()
            }
        }
    }
}
