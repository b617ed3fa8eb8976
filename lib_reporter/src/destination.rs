//! # Destination
//!
//! Parses the reporting endpoint once and decides which transport serves it.
//! The scheme is matched by family prefix: anything starting with `ws` gets the
//! persistent socket channel, anything starting with `http` gets the
//! request-per-tick channel.

use std::fmt;

use url::Url;

use crate::errors::ReporterError;

/// Which transport a destination is served by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelKind {
    /// One persistent WebSocket connection.
    Socket,
    /// One POST request per tick.
    Http,
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelKind::Socket => write!(f, "socket"),
            ChannelKind::Http => write!(f, "http"),
        }
    }
}

/// An immutable, validated reporting endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Destination {
    url: Url,
    kind: ChannelKind,
}

impl Destination {
    /// Parses `raw` and classifies its scheme.
    ///
    /// # Errors
    /// `InvalidUrl` when `raw` is not an absolute URL, `UnsupportedScheme` when
    /// the scheme is neither WebSocket- nor HTTP-family.
    pub fn parse(raw: &str) -> Result<Self, ReporterError> {
        let url = Url::parse(raw.trim()).map_err(|source| ReporterError::InvalidUrl {
            url: raw.to_string(),
            source,
        })?;

        // `Url` lowercases the scheme, so `WSS://` and `wss://` classify alike.
        let kind = if url.scheme().starts_with("ws") {
            ChannelKind::Socket
        } else if url.scheme().starts_with("http") {
            ChannelKind::Http
        } else {
            return Err(ReporterError::UnsupportedScheme {
                url: raw.to_string(),
                scheme: url.scheme().to_string(),
            });
        };

        Ok(Self { url, kind })
    }

    /// The normalized URL string.
    pub fn as_str(&self) -> &str {
        self.url.as_str()
    }

    /// The parsed URL.
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// The transport this destination is served by.
    pub fn kind(&self) -> ChannelKind {
        self.kind
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.url)
    }
}
