//! Establishment: raw `hackvr-hello` and HTTP/1.1 Upgrade.
//!
//! Both paths are strict. Any deviation (wrong first line, unparsable
//! version, missing upgrade headers, bytes before the stream) returns an
//! [`EstablishError`], and the driver closes the transport without retrying.
//! Only after establishment does the connection switch to the optimistic
//! per-command error regime.
//!
//! The raw path exchanges `hackvr-hello` lines through the normal framer.
//! The upgrade path consumes an HTTP preface *before* the framer starts;
//! the command stream begins immediately after the blank line, and
//! `hackvr-hello` must not appear on an upgraded stream. Full HTTP stacks
//! are out of scope; this module only speaks the upgrade preface.

use hackvr_proto::{Command, Sender, SessionToken, Version};
use url::Url;

use crate::{
    error::EstablishError,
    origin::{Origin, Scheme},
};

/// The protocol version this implementation speaks.
pub const SUPPORTED_VERSION: Version = Version::V1;

/// Result of a successful establishment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Established {
    /// Effective version: min of both sides' maxima.
    pub version: Version,
    /// Session token the client asked to resume, to be processed as an
    /// implicit first `resume-session`.
    pub resume: Option<SessionToken>,
    /// The URI the client said it was connecting to (server side only).
    pub client_uri: Option<Url>,
}

fn effective_version(ours: Version, theirs: Version) -> Version {
    ours.min(theirs)
}

/// Client half of the raw `hackvr-hello` exchange.
#[derive(Debug, Clone)]
pub struct RawClient {
    max_version: Version,
    uri: Url,
    session: Option<SessionToken>,
}

impl RawClient {
    /// Prepare a client hello for `uri`. Any fragment is stripped into the
    /// session-token slot here, before anything touches the wire.
    pub fn new(mut uri: Url, session: Option<SessionToken>) -> Result<Self, EstablishError> {
        Scheme::parse(uri.scheme())?;
        let session = match (session, uri.fragment()) {
            (Some(token), _) => Some(token),
            (None, Some(fragment)) => SessionToken::parse(fragment),
            (None, None) => None,
        };
        uri.set_fragment(None);
        Ok(Self { max_version: SUPPORTED_VERSION, uri, session })
    }

    /// The hello line to send before anything else.
    #[must_use]
    pub fn hello(&self) -> Command {
        Command::Hello {
            max_version: self.max_version,
            uri: Some(self.uri.clone()),
            session: self.session,
        }
    }

    /// Process the server's first frame.
    pub fn on_frame(&self, frame: &str) -> Result<Established, EstablishError> {
        match Command::parse(frame, Sender::Server)? {
            Command::Hello { max_version, uri: None, session: None } => Ok(Established {
                version: effective_version(self.max_version, max_version),
                resume: None,
                client_uri: None,
            }),
            Command::Hello { .. } => {
                Err(EstablishError::BadHello { reason: "server hello carries client fields" })
            }
            other => Err(EstablishError::ExpectedHello { got: other.name().to_owned() }),
        }
    }
}

/// Server half of the raw `hackvr-hello` exchange.
#[derive(Debug, Clone, Default)]
pub struct RawServer {
    _private: (),
}

impl RawServer {
    /// New server-side establishment for one connection.
    #[must_use]
    pub fn new() -> Self {
        Self { _private: () }
    }

    /// Process the client's first frame. On success returns the hello reply
    /// to send and the establishment result.
    pub fn on_frame(&self, frame: &str) -> Result<(Command, Established), EstablishError> {
        match Command::parse(frame, Sender::Client)? {
            Command::Hello { max_version, uri: Some(uri), session } => {
                if uri.fragment().is_some() {
                    return Err(EstablishError::FragmentInUri);
                }
                Scheme::parse(uri.scheme())?;
                let reply = Command::Hello {
                    max_version: SUPPORTED_VERSION,
                    uri: None,
                    session: None,
                };
                let established = Established {
                    version: effective_version(SUPPORTED_VERSION, max_version),
                    resume: session,
                    client_uri: Some(uri),
                };
                Ok((reply, established))
            }
            Command::Hello { uri: None, .. } => Err(EstablishError::MissingUri),
            other => Err(EstablishError::ExpectedHello { got: other.name().to_owned() }),
        }
    }
}

/// Incremental accumulator for an HTTP preface (everything up to the blank
/// line). Returns the header block and hands back any bytes after it; on
/// the upgrade path those are already HackVR stream bytes.
#[derive(Debug, Default)]
pub struct PrefaceBuffer {
    buf: Vec<u8>,
}

/// Cap on preface size; a peer that sends more is not speaking the upgrade
/// handshake.
const MAX_PREFACE: usize = 8 * 1024;

impl PrefaceBuffer {
    /// New empty buffer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed bytes. Returns `Some((header_text, leftover))` once the blank
    /// line has arrived.
    pub fn push(&mut self, bytes: &[u8]) -> Result<Option<(String, Vec<u8>)>, EstablishError> {
        self.buf.extend_from_slice(bytes);
        if let Some(end) = find_blank_line(&self.buf) {
            let head = std::str::from_utf8(&self.buf[..end])
                .map_err(|_| EstablishError::MalformedUpgrade { reason: "preface is not UTF-8" })?
                .to_owned();
            let leftover = self.buf[end + 4..].to_vec();
            self.buf.clear();
            return Ok(Some((head, leftover)));
        }
        if self.buf.len() > MAX_PREFACE {
            return Err(EstablishError::MalformedUpgrade { reason: "preface too large" });
        }
        Ok(None)
    }
}

fn find_blank_line(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n")
}

/// Case-insensitive header lookup over a parsed preface.
fn header<'a>(lines: &[&'a str], name: &str) -> Option<&'a str> {
    lines.iter().find_map(|line| {
        let (key, value) = line.split_once(':')?;
        key.trim().eq_ignore_ascii_case(name).then(|| value.trim())
    })
}

/// Whether a `Connection` header's token list contains `upgrade`.
fn connection_upgrades(value: &str) -> bool {
    value.split(',').any(|token| token.trim().eq_ignore_ascii_case("upgrade"))
}

/// A validated client upgrade request, server side.
#[derive(Debug, Clone)]
pub struct UpgradeRequest {
    /// The request-target (path and query).
    pub target: String,
    /// The `Host` header as sent.
    pub host: String,
    /// Token from `HackVr-Session`, if present.
    pub session: Option<SessionToken>,
    /// The origin this connection binds tokens to.
    pub origin: Origin,
}

/// Build the upgrade request preface for a `http+hackvr`/`https+hackvr`
/// URL. HTTP establishment pins the protocol to v1.
pub fn build_upgrade_request(
    url: &Url,
    session: Option<&SessionToken>,
) -> Result<String, EstablishError> {
    let scheme = Scheme::parse(url.scheme())?;
    if !scheme.is_http() {
        return Err(EstablishError::UnsupportedScheme { scheme: url.scheme().to_owned() });
    }
    let host = url
        .host_str()
        .ok_or(EstablishError::MalformedUpgrade { reason: "url has no host" })?;
    let host_header = match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_owned(),
    };
    let path = if url.path().is_empty() { "/" } else { url.path() };
    let target = match url.query() {
        Some(query) => format!("{path}?{query}"),
        None => path.to_owned(),
    };

    let mut request = format!(
        "GET {target} HTTP/1.1\r\n\
         Host: {host_header}\r\n\
         Connection: upgrade\r\n\
         Upgrade: hackvr\r\n\
         HackVr-Version: {SUPPORTED_VERSION}\r\n"
    );
    if let Some(token) = session {
        request.push_str(&format!("HackVr-Session: {token}\r\n"));
    }
    request.push_str("\r\n");
    Ok(request)
}

/// Validate a client's upgrade request preface, server side.
pub fn parse_upgrade_request(
    scheme: Scheme,
    head: &str,
) -> Result<UpgradeRequest, EstablishError> {
    let lines: Vec<&str> = head.split("\r\n").collect();
    let request_line = lines
        .first()
        .ok_or(EstablishError::MalformedUpgrade { reason: "empty preface" })?;

    let mut parts = request_line.split(' ');
    let method = parts.next().unwrap_or_default();
    let target = parts.next().unwrap_or_default();
    let http_version = parts.next().unwrap_or_default();
    if method != "GET" || !target.starts_with('/') || http_version != "HTTP/1.1" {
        return Err(EstablishError::MalformedUpgrade { reason: "bad request line" });
    }

    let headers = &lines[1..];
    if !header(headers, "connection").is_some_and(connection_upgrades) {
        return Err(EstablishError::MalformedUpgrade { reason: "missing Connection: upgrade" });
    }
    if !header(headers, "upgrade").is_some_and(|v| v.eq_ignore_ascii_case("hackvr")) {
        return Err(EstablishError::MalformedUpgrade { reason: "missing Upgrade: hackvr" });
    }
    if header(headers, "hackvr-version") != Some("v1") {
        return Err(EstablishError::MalformedUpgrade { reason: "missing HackVr-Version: v1" });
    }
    let host = header(headers, "host")
        .ok_or(EstablishError::MalformedUpgrade { reason: "missing Host" })?
        .to_owned();
    let session = match header(headers, "hackvr-session") {
        Some(raw) => Some(
            SessionToken::parse(raw)
                .ok_or(EstablishError::MalformedUpgrade { reason: "bad HackVr-Session token" })?,
        ),
        None => None,
    };

    let origin = Origin::from_http_request(scheme, &host, target)?;
    Ok(UpgradeRequest { target: target.to_owned(), host, session, origin })
}

/// The switching-protocols response preface, server side.
#[must_use]
pub fn build_upgrade_response() -> String {
    "HTTP/1.1 101 Switching Protocols\r\n\
     Connection: upgrade\r\n\
     Upgrade: hackvr\r\n\
     \r\n"
        .to_owned()
}

/// Validate the server's response preface, client side.
///
/// `body` is whatever the driver read past the blank line, used only to
/// surface debug text on a non-101 2xx response.
pub fn check_upgrade_response(head: &str, body: &[u8]) -> Result<(), EstablishError> {
    let lines: Vec<&str> = head.split("\r\n").collect();
    let status_line = lines
        .first()
        .ok_or(EstablishError::MalformedUpgrade { reason: "empty preface" })?;

    let mut parts = status_line.splitn(3, ' ');
    let http_version = parts.next().unwrap_or_default();
    let status: u16 = parts
        .next()
        .and_then(|s| s.parse().ok())
        .ok_or(EstablishError::MalformedUpgrade { reason: "bad status line" })?;
    if !http_version.starts_with("HTTP/1.") {
        return Err(EstablishError::MalformedUpgrade { reason: "bad status line" });
    }

    if status != 101 {
        let debug_body = (200..300).contains(&status).then(|| {
            String::from_utf8_lossy(body).into_owned()
        });
        return Err(EstablishError::UpgradeRefused { status, debug_body });
    }

    let headers = &lines[1..];
    let connection_ok = header(headers, "connection").is_some_and(connection_upgrades);
    let upgrade_ok =
        header(headers, "upgrade").is_some_and(|v| v.eq_ignore_ascii_case("hackvr"));
    if !connection_ok || !upgrade_ok {
        return Err(EstablishError::UpgradeHeadersMismatch);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn raw_handshake_negotiates_minimum() {
        let client = RawClient::new(url("hackvr://example/world"), None).unwrap();
        let server = RawServer::new();

        let hello = client.hello().encode().unwrap();
        assert_eq!(hello, "hackvr-hello\tv1\thackvr://example/world");

        let (reply, established) = server.on_frame(&hello).unwrap();
        assert_eq!(established.version, Version::V1);
        assert_eq!(established.client_uri.unwrap().as_str(), "hackvr://example/world");

        let established = client.on_frame(&reply.encode().unwrap()).unwrap();
        assert_eq!(established.version, Version::V1);
    }

    #[test]
    fn newer_client_falls_back_to_v1() {
        let server = RawServer::new();
        let (_, established) =
            server.on_frame("hackvr-hello\tv2\thackvr://example/world").unwrap();
        assert_eq!(established.version, Version::V1);
    }

    #[test]
    fn non_hello_first_line_is_fatal() {
        let server = RawServer::new();
        assert!(matches!(
            server.on_frame("chat\thello"),
            Err(EstablishError::ExpectedHello { .. })
        ));
    }

    #[test]
    fn hello_without_uri_is_fatal() {
        let server = RawServer::new();
        assert!(matches!(
            server.on_frame("hackvr-hello\tv1"),
            Err(EstablishError::MissingUri)
        ));
    }

    #[test]
    fn fragment_on_the_wire_is_fatal() {
        let server = RawServer::new();
        assert!(matches!(
            server.on_frame("hackvr-hello\tv1\thackvr://example/world#frag"),
            Err(EstablishError::FragmentInUri)
        ));
    }

    #[test]
    fn client_strips_fragment_into_token_slot() {
        let token = SessionToken::from_bytes([9u8; 32]);
        let with_fragment = url(&format!("hackvr://example/world#{token}"));
        let client = RawClient::new(with_fragment, None).unwrap();
        match client.hello() {
            Command::Hello { uri, session, .. } => {
                assert_eq!(uri.unwrap().fragment(), None);
                assert_eq!(session, Some(token));
            }
            other => panic!("not a hello: {other:?}"),
        }
    }

    #[test]
    fn hello_token_becomes_implicit_resume() {
        let token = SessionToken::from_bytes([3u8; 32]);
        let server = RawServer::new();
        let frame = format!("hackvr-hello\tv1\thackvr://example/world\t{token}");
        let (_, established) = server.on_frame(&frame).unwrap();
        assert_eq!(established.resume, Some(token));
    }

    #[test]
    fn upgrade_request_round_trips() {
        let token = SessionToken::from_bytes([5u8; 32]);
        let request =
            build_upgrade_request(&url("http+hackvr://example:8080/world?a=1"), Some(&token))
                .unwrap();

        let mut buffer = PrefaceBuffer::new();
        let (head, leftover) = buffer.push(request.as_bytes()).unwrap().unwrap();
        assert!(leftover.is_empty());

        let parsed = parse_upgrade_request(Scheme::HttpUpgrade, &head).unwrap();
        assert_eq!(parsed.target, "/world?a=1");
        assert_eq!(parsed.session, Some(token));
        assert_eq!(parsed.origin.host, "example");
        assert_eq!(parsed.origin.port, 8080);
    }

    #[test]
    fn upgrade_response_checks_headers_case_insensitively() {
        assert!(check_upgrade_response(
            "HTTP/1.1 101 Switching Protocols\r\nCONNECTION: Upgrade\r\nupgrade: HackVR",
            &[],
        )
        .is_ok());

        assert!(matches!(
            check_upgrade_response("HTTP/1.1 101 Switching Protocols\r\nUpgrade: hackvr", &[]),
            Err(EstablishError::UpgradeHeadersMismatch)
        ));
    }

    #[test]
    fn non_101_2xx_carries_debug_body() {
        let err = check_upgrade_response("HTTP/1.1 200 OK", b"maintenance tonight").unwrap_err();
        match err {
            EstablishError::UpgradeRefused { status, debug_body } => {
                assert_eq!(status, 200);
                assert_eq!(debug_body.as_deref(), Some("maintenance tonight"));
            }
            other => panic!("wrong error: {other}"),
        }
    }

    #[test]
    fn upgrade_leftover_bytes_are_stream_bytes() {
        let mut buffer = PrefaceBuffer::new();
        let wire = b"HTTP/1.1 101 Switching Protocols\r\nConnection: upgrade\r\nUpgrade: hackvr\r\n\r\ncreate-object\troom\r\n";
        let (head, leftover) = buffer.push(wire).unwrap().unwrap();
        assert!(check_upgrade_response(&head, &[]).is_ok());
        assert_eq!(leftover, b"create-object\troom\r\n");
    }

    #[test]
    fn missing_version_header_is_fatal() {
        let head = "GET /world HTTP/1.1\r\nHost: example\r\nConnection: upgrade\r\nUpgrade: hackvr";
        assert!(matches!(
            parse_upgrade_request(Scheme::HttpUpgrade, head),
            Err(EstablishError::MalformedUpgrade { .. })
        ));
    }
}
