//! Purpose: Build authentication header values for hosted record stores.
//! Exports: `Auth`, `Credentials`, `PROTOCOL_VERSION`, `VERSION_COOKIE`.
//! Role: Explicit per-client configuration; there is no process-wide
//!       authentication state anywhere in the crate.
//! Invariants: Credential components are escaped so the header's key=value
//!             list stays parseable whatever the email contains.

/// Protocol version advertised to the host through the version cookie.
pub const PROTOCOL_VERSION: &str = "2026.1";

/// Cookie name carrying [`PROTOCOL_VERSION`].
pub const VERSION_COOKIE: &str = "CARAVEL_VER";

const AUTH_SCHEME: &str = "CaravelAuth";

/// Account credentials for a hosted store.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Credentials {
    pub account: String,
    pub email: String,
    pub signature: String,
    pub role: String,
}

impl Credentials {
    pub fn new(
        account: impl Into<String>,
        email: impl Into<String>,
        signature: impl Into<String>,
        role: impl Into<String>,
    ) -> Self {
        Self {
            account: account.into(),
            email: email.into(),
            signature: signature.into(),
            role: role.into(),
        }
    }

    fn header_value(&self) -> String {
        format!(
            "{AUTH_SCHEME} account={},email={},signature={},role={}",
            escape_component(&self.account),
            escape_component(&self.email),
            escape_component(&self.signature),
            escape_component(&self.role)
        )
    }
}

/// How a client authenticates: hosted-store credentials, a bearer token
/// (the dev server's scheme), or nothing.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Auth {
    Credentials(Credentials),
    Token(String),
    Anonymous,
}

impl Auth {
    /// The `Authorization` header value, if any.
    pub fn header_value(&self) -> Option<String> {
        match self {
            Auth::Credentials(credentials) => Some(credentials.header_value()),
            Auth::Token(token) => Some(format!("Bearer {token}")),
            Auth::Anonymous => None,
        }
    }
}

/// Percent-encode everything outside the unreserved set, keeping the
/// comma-separated key=value header list unambiguous.
fn escape_component(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for byte in raw.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char);
            }
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}
