//! Origin canonicalization for session-token binding.
//!
//! A session token is only valid against the origin it was announced on. An
//! origin is the canonicalized tuple `(scheme, host, port, path, query)`;
//! the URI fragment is never part of it (viewers strip the fragment into the
//! session-token slot before connecting).
//!
//! Host canonicalization lowercases and converts IDNA hosts to A-labels.
//! The `url` crate only applies IDNA to "special" schemes, so HackVR URLs
//! are canonicalized by reparenting their authority under `http` first.

use url::Url;

use crate::error::EstablishError;

/// The four HackVR URL schemes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scheme {
    /// `hackvr://`: raw TCP.
    Raw,
    /// `hackvrs://`: raw TCP over TLS.
    RawTls,
    /// `http+hackvr://`: HTTP/1.1 Upgrade, cleartext.
    HttpUpgrade,
    /// `https+hackvr://`: HTTP/1.1 Upgrade over TLS.
    HttpsUpgrade,
}

impl Scheme {
    /// Parse a URL scheme string.
    pub fn parse(scheme: &str) -> Result<Self, EstablishError> {
        match scheme {
            "hackvr" => Ok(Self::Raw),
            "hackvrs" => Ok(Self::RawTls),
            "http+hackvr" => Ok(Self::HttpUpgrade),
            "https+hackvr" => Ok(Self::HttpsUpgrade),
            other => Err(EstablishError::UnsupportedScheme { scheme: other.to_owned() }),
        }
    }

    /// The scheme as written in URLs.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Raw => "hackvr",
            Self::RawTls => "hackvrs",
            Self::HttpUpgrade => "http+hackvr",
            Self::HttpsUpgrade => "https+hackvr",
        }
    }

    /// Default port when the URL does not spell one.
    ///
    /// The raw ports are implementation constants; the upgrade schemes
    /// inherit the HTTP defaults.
    #[must_use]
    pub fn default_port(self) -> u16 {
        match self {
            Self::Raw => 7777,
            Self::RawTls => 7778,
            Self::HttpUpgrade => 80,
            Self::HttpsUpgrade => 443,
        }
    }

    /// Whether establishment runs over the HTTP Upgrade path.
    #[must_use]
    pub fn is_http(self) -> bool {
        matches!(self, Self::HttpUpgrade | Self::HttpsUpgrade)
    }
}

/// A canonicalized origin tuple.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Origin {
    /// URL scheme.
    pub scheme: Scheme,
    /// Lowercased host, IDNA hosts as A-labels.
    pub host: String,
    /// Explicit or scheme-default port.
    pub port: u16,
    /// Path component, `/` when empty.
    pub path: String,
    /// Query component without the `?`, if present.
    pub query: Option<String>,
}

impl Origin {
    /// Canonicalize a HackVR URL into its bound origin.
    ///
    /// # Errors
    ///
    /// [`EstablishError::UnsupportedScheme`] for non-HackVR schemes, or
    /// [`EstablishError::MalformedUpgrade`] when the URL has no usable host.
    pub fn from_url(url: &Url) -> Result<Self, EstablishError> {
        let scheme = Scheme::parse(url.scheme())?;

        // Round-trip the authority through an http URL so IDNA lowering
        // applies regardless of scheme specialness.
        let host_raw = url
            .host_str()
            .ok_or(EstablishError::MalformedUpgrade { reason: "url has no host" })?;
        let canonical = Url::parse(&format!("http://{host_raw}/"))
            .map_err(|_| EstablishError::MalformedUpgrade { reason: "host fails canonicalization" })?;
        let host = canonical
            .host_str()
            .ok_or(EstablishError::MalformedUpgrade { reason: "host fails canonicalization" })?
            .to_owned();

        let port = url.port().unwrap_or_else(|| scheme.default_port());
        let path = if url.path().is_empty() { "/".to_owned() } else { url.path().to_owned() };
        let query = url.query().map(str::to_owned);

        Ok(Self { scheme, host, port, path, query })
    }

    /// Origin for the server side of an HTTP upgrade, from the `Host`
    /// header and request-target.
    pub fn from_http_request(
        scheme: Scheme,
        host_header: &str,
        target: &str,
    ) -> Result<Self, EstablishError> {
        let url_text = format!("http://{host_header}{target}");
        let parsed = Url::parse(&url_text)
            .map_err(|_| EstablishError::MalformedUpgrade { reason: "bad Host or request-target" })?;
        let host = parsed
            .host_str()
            .ok_or(EstablishError::MalformedUpgrade { reason: "bad Host header" })?
            .to_owned();
        let port = parsed.port().unwrap_or_else(|| scheme.default_port());
        let path = if parsed.path().is_empty() { "/".to_owned() } else { parsed.path().to_owned() };
        let query = parsed.query().map(str::to_owned);
        Ok(Self { scheme, host, port, path, query })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn origin(url: &str) -> Origin {
        Origin::from_url(&Url::parse(url).unwrap()).unwrap()
    }

    #[test]
    fn host_is_lowercased() {
        assert_eq!(origin("hackvr://Example.COM/world").host, "example.com");
    }

    #[test]
    fn idna_hosts_become_a_labels() {
        assert_eq!(origin("hackvr://bücher.example/w").host, "xn--bcher-kva.example");
    }

    #[test]
    fn default_ports_fill_in() {
        assert_eq!(origin("hackvr://example/world").port, 7777);
        assert_eq!(origin("hackvrs://example/world").port, 7778);
        assert_eq!(origin("http+hackvr://example/world").port, 80);
        assert_eq!(origin("https+hackvr://example/world").port, 443);
        assert_eq!(origin("hackvr://example:9000/world").port, 9000);
    }

    #[test]
    fn explicit_and_default_port_compare_equal() {
        assert_eq!(origin("hackvr://example/world"), origin("hackvr://example:7777/world"));
    }

    #[test]
    fn fragment_is_never_bound() {
        assert_eq!(origin("hackvr://example/world#token"), origin("hackvr://example/world"));
    }

    #[test]
    fn query_is_bound() {
        assert_ne!(origin("hackvr://example/world?a=1"), origin("hackvr://example/world"));
    }

    #[test]
    fn non_hackvr_schemes_are_rejected() {
        let url = Url::parse("https://example/world").unwrap();
        assert!(matches!(
            Origin::from_url(&url),
            Err(EstablishError::UnsupportedScheme { .. })
        ));
    }

    #[test]
    fn http_request_origin() {
        let o = Origin::from_http_request(Scheme::HttpUpgrade, "Example.com:8080", "/world?x=1")
            .unwrap();
        assert_eq!(o.host, "example.com");
        assert_eq!(o.port, 8080);
        assert_eq!(o.path, "/world");
        assert_eq!(o.query.as_deref(), Some("x=1"));
    }
}
