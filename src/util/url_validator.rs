use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;
use url::Url;

/// Address ranges a fetch may never reach while the guard is enabled.
///
/// Loopback for both families, plus the private, link-local and unspecified
/// ranges an attacker-supplied feed link could use to reach internal services.
pub const DEFAULT_BLOCKED_RANGES: &[&str] = &[
    "127.0.0.0/8",
    "::1/128",
    "0.0.0.0/8",
    "10.0.0.0/8",
    "172.16.0.0/12",
    "192.168.0.0/16",
    "169.254.0.0/16",
    "::/128",
    "fc00::/7",
    "fe80::/10",
];

/// Errors that can occur during URL validation.
///
/// These errors cover both parsing failures and security policy violations
/// designed to prevent SSRF (Server-Side Request Forgery) attacks.
#[derive(Error, Debug, Clone)]
pub enum UrlValidationError {
    /// The URL string could not be parsed.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    /// The URL uses a scheme other than http or https.
    #[error("Unsupported scheme: {0} (only http/https allowed)")]
    UnsupportedScheme(String),
    /// The URL carries no host component.
    #[error("URL has no host")]
    MissingHost,
    /// The host resolved to an address inside a blocked range.
    #[error("Blocked host {host}: resolves to {addr}")]
    BlockedHost { host: String, addr: IpAddr },
    /// DNS resolution failed. The guard fails closed on this.
    #[error("Failed to resolve {host}: {reason}")]
    Resolve { host: String, reason: String },
    /// A configured CIDR range could not be parsed.
    #[error("Invalid address range: {0}")]
    InvalidRange(String),
}

/// A CIDR block such as `127.0.0.0/8` or `fe80::/10`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IpRange {
    network: IpAddr,
    prefix_len: u8,
}

impl IpRange {
    /// Returns true if `addr` falls inside this block.
    ///
    /// IPv4-mapped IPv6 addresses (`::ffff:127.0.0.1`) are matched against
    /// IPv4 blocks so the mapping cannot be used to sidestep a v4 range.
    pub fn contains(&self, addr: &IpAddr) -> bool {
        match (self.network, addr) {
            (IpAddr::V4(net), IpAddr::V4(ip)) => {
                let mask = prefix_mask_v4(self.prefix_len);
                (u32::from(net) & mask) == (u32::from(*ip) & mask)
            }
            (IpAddr::V6(net), IpAddr::V6(ip)) => {
                let mask = prefix_mask_v6(self.prefix_len);
                (u128::from(net) & mask) == (u128::from(*ip) & mask)
            }
            (IpAddr::V4(_), IpAddr::V6(ip)) => match ip.to_ipv4_mapped() {
                Some(v4) => self.contains(&IpAddr::V4(v4)),
                None => false,
            },
            (IpAddr::V6(_), IpAddr::V4(_)) => false,
        }
    }
}

fn prefix_mask_v4(prefix_len: u8) -> u32 {
    if prefix_len == 0 {
        0
    } else {
        u32::MAX << (32 - u32::from(prefix_len))
    }
}

fn prefix_mask_v6(prefix_len: u8) -> u128 {
    if prefix_len == 0 {
        0
    } else {
        u128::MAX << (128 - u32::from(prefix_len))
    }
}

impl FromStr for IpRange {
    type Err = UrlValidationError;

    fn from_str(cidr: &str) -> Result<Self, Self::Err> {
        let invalid = || UrlValidationError::InvalidRange(cidr.to_owned());

        let (addr, prefix) = cidr.trim().split_once('/').ok_or_else(invalid)?;
        let network: IpAddr = addr.parse().map_err(|_| invalid())?;
        let prefix_len: u8 = prefix.parse().map_err(|_| invalid())?;

        let max = if network.is_ipv4() { 32 } else { 128 };
        if prefix_len > max {
            return Err(invalid());
        }

        Ok(Self {
            network,
            prefix_len,
        })
    }
}

/// Validates a URL string for use as an outbound fetch target.
///
/// Only checks syntax and scheme. Address-level policy lives in
/// [`NetworkGuard`], which needs DNS and is therefore async.
///
/// # Errors
///
/// Returns [`UrlValidationError`] if:
/// - The URL cannot be parsed ([`UrlValidationError::InvalidUrl`])
/// - The scheme is not `http` or `https` ([`UrlValidationError::UnsupportedScheme`])
/// - The URL has no host ([`UrlValidationError::MissingHost`])
///
/// # Examples
///
/// ```
/// use fullfeed::util::validate_url;
///
/// let url = validate_url("https://example.com/feed.xml").unwrap();
/// assert_eq!(url.host_str(), Some("example.com"));
///
/// assert!(validate_url("file:///etc/passwd").is_err());
/// ```
pub fn validate_url(url_str: &str) -> Result<Url, UrlValidationError> {
    let url = Url::parse(url_str)?;
    check_scheme(&url)?;
    Ok(url)
}

fn check_scheme(url: &Url) -> Result<(), UrlValidationError> {
    match url.scheme() {
        "http" | "https" => {}
        scheme => return Err(UrlValidationError::UnsupportedScheme(scheme.to_owned())),
    }

    if matches!(url.host_str(), None | Some("")) {
        return Err(UrlValidationError::MissingHost);
    }

    Ok(())
}

/// Parses a user-supplied feed URL, assuming `http` when no scheme is given.
///
/// ```
/// use fullfeed::util::parse_feed_url;
///
/// let url = parse_feed_url("example.com/feed").unwrap();
/// assert_eq!(url.as_str(), "http://example.com/feed");
/// ```
pub fn parse_feed_url(raw: &str) -> Result<Url, UrlValidationError> {
    let trimmed = raw.trim();
    if trimmed.contains("://") {
        validate_url(trimmed)
    } else {
        validate_url(&format!("http://{trimmed}"))
    }
}

/// Outbound request guard against SSRF.
///
/// Holds a fixed set of blocked ranges, built once at startup and shared
/// read-only between requests. A disabled guard lets every host through;
/// tests and local development use it to reach servers on loopback.
#[derive(Debug, Clone)]
pub struct NetworkGuard {
    blocked: Arc<[IpRange]>,
    enabled: bool,
}

impl Default for NetworkGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl NetworkGuard {
    /// Enabled guard with [`DEFAULT_BLOCKED_RANGES`].
    pub fn new() -> Self {
        let blocked: Vec<IpRange> = DEFAULT_BLOCKED_RANGES
            .iter()
            .filter_map(|cidr| cidr.parse().ok())
            .collect();
        Self {
            blocked: blocked.into(),
            enabled: true,
        }
    }

    /// Enabled guard with a custom range list.
    pub fn with_ranges(ranges: Vec<IpRange>) -> Self {
        Self {
            blocked: ranges.into(),
            enabled: true,
        }
    }

    /// Guard that allows every host, including loopback.
    pub fn disabled() -> Self {
        Self {
            blocked: Arc::from(Vec::new()),
            enabled: false,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Returns true if `addr` lies in any blocked range.
    pub fn is_blocked(&self, addr: &IpAddr) -> bool {
        self.blocked.iter().any(|range| range.contains(addr))
    }

    /// Checks a URL's host. The URL must already have passed [`validate_url`].
    pub async fn check_url(&self, url: &Url) -> Result<(), UrlValidationError> {
        check_scheme(url)?;
        if !self.enabled {
            return Ok(());
        }

        let host = url.host_str().ok_or(UrlValidationError::MissingHost)?;
        let port = url.port_or_known_default().unwrap_or(80);
        self.check_resolved(host, port).await
    }

    /// Checks a `host` or `host:port` string.
    ///
    /// Every address the host resolves to is checked; a single blocked one
    /// rejects the host. Resolution failure also rejects it.
    pub async fn check_host(&self, host_port: &str) -> Result<(), UrlValidationError> {
        if !self.enabled {
            return Ok(());
        }

        let (host, port) = split_host_port(host_port);
        self.check_resolved(host, port.unwrap_or(80)).await
    }

    async fn check_resolved(&self, host: &str, port: u16) -> Result<(), UrlValidationError> {
        self.resolve_checked(host, port).await.map(|_| ())
    }

    /// Resolves `host` and returns its addresses if none is blocked.
    ///
    /// IP literals are checked without a lookup. A disabled guard resolves
    /// but checks nothing.
    pub async fn resolve_checked(
        &self,
        host: &str,
        port: u16,
    ) -> Result<Vec<SocketAddr>, UrlValidationError> {
        // Strip brackets from IPv6 literals for parsing
        let bare = host
            .strip_prefix('[')
            .and_then(|h| h.strip_suffix(']'))
            .unwrap_or(host);

        let addrs: Vec<SocketAddr> = match bare.parse::<IpAddr>() {
            Ok(ip) => vec![SocketAddr::new(ip, port)],
            Err(_) => tokio::net::lookup_host((bare, port))
                .await
                .map_err(|e| UrlValidationError::Resolve {
                    host: bare.to_owned(),
                    reason: e.to_string(),
                })?
                .collect(),
        };

        if addrs.is_empty() {
            return Err(UrlValidationError::Resolve {
                host: bare.to_owned(),
                reason: "no addresses returned".to_owned(),
            });
        }

        if !self.enabled {
            return Ok(addrs);
        }

        if let Some(addr) = addrs.iter().map(SocketAddr::ip).find(|ip| self.is_blocked(ip)) {
            tracing::warn!(host = %bare, addr = %addr, "Blocked outbound request to disallowed address");
            return Err(UrlValidationError::BlockedHost {
                host: bare.to_owned(),
                addr,
            });
        }

        Ok(addrs)
    }
}

/// Connection-time check: installed as the HTTP client's resolver, so the
/// addresses vetted are exactly the addresses connected to. A name that
/// re-resolves to a blocked address after [`NetworkGuard::check_url`]
/// passed is still refused.
impl reqwest::dns::Resolve for NetworkGuard {
    fn resolve(&self, name: reqwest::dns::Name) -> reqwest::dns::Resolving {
        let guard = self.clone();
        Box::pin(async move {
            let addrs = guard.resolve_checked(name.as_str(), 0).await?;
            let addrs: reqwest::dns::Addrs = Box::new(addrs.into_iter());
            Ok(addrs)
        })
    }
}

/// Finds a guard veto in an HTTP client error's source chain.
pub fn guard_rejection(err: &(dyn std::error::Error + 'static)) -> Option<UrlValidationError> {
    let mut current = Some(err);
    while let Some(e) = current {
        if let Some(rejection) = e.downcast_ref::<UrlValidationError>() {
            return Some(rejection.clone());
        }
        current = e.source();
    }
    None
}

/// Splits `host:port`, `[v6]:port`, bare hosts and bare IPv6 literals.
fn split_host_port(host_port: &str) -> (&str, Option<u16>) {
    if let Some(rest) = host_port.strip_prefix('[') {
        if let Some((host, after)) = rest.split_once(']') {
            let port = after.strip_prefix(':').and_then(|p| p.parse().ok());
            return (host, port);
        }
    }

    match host_port.rsplit_once(':') {
        // More than one colon without brackets is a bare IPv6 literal
        Some((host, port)) if !host.contains(':') => (host, port.parse().ok()),
        _ => (host_port, None),
    }
}
