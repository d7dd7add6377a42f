//! Pairing handoff link.
//!
//! A second device scans a code encoding this URL and opens the same client
//! directly in chat mode. The link carries no state beyond the query flag.

use std::fmt;

use url::Url;

use crate::{ClientConfig, ConnectionEndpoint};

/// Query parameter selecting the client interface.
pub const INTERFACE_PARAM: &str = "interface";

/// Value of [`INTERFACE_PARAM`] that skips pairing and opens the chat.
pub const CHAT_INTERFACE: &str = "chat";

/// One-shot URL handed to the peer device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairingLink {
    url: String,
}

impl PairingLink {
    /// Build the link for an endpoint.
    #[must_use]
    pub fn for_endpoint(endpoint: &ConnectionEndpoint, config: &ClientConfig) -> Self {
        Self {
            url: format!(
                "http://{}{}?{INTERFACE_PARAM}={CHAT_INTERFACE}",
                endpoint.authority(),
                config.web_path
            ),
        }
    }

    /// The link as a string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.url
    }

    /// Whether a page URL asks for chat mode.
    ///
    /// Unparseable URLs are treated as not in chat mode.
    #[must_use]
    pub fn is_chat_mode(page_url: &str) -> bool {
        Url::parse(page_url).is_ok_and(|url| {
            url.query_pairs()
                .any(|(key, value)| key == INTERFACE_PARAM && value == CHAT_INTERFACE)
        })
    }
}

impl fmt::Display for PairingLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_link_format() {
        let config = ClientConfig::default();
        let endpoint = ConnectionEndpoint::new("10.0.0.2", config.backend_port, "/ws");
        let link = PairingLink::for_endpoint(&endpoint, &config);
        assert_eq!(link.as_str(), "http://10.0.0.2:3001/web/?interface=chat");
    }

    #[test]
    fn test_link_opens_chat_mode() {
        let config = ClientConfig::default();
        let endpoint = ConnectionEndpoint::new("10.0.0.2", config.backend_port, "/ws");
        let link = PairingLink::for_endpoint(&endpoint, &config);
        assert!(PairingLink::is_chat_mode(link.as_str()));
    }

    #[test]
    fn test_chat_mode_detection() {
        assert!(!PairingLink::is_chat_mode("http://10.0.0.2:3000/web/"));
        assert!(!PairingLink::is_chat_mode("http://10.0.0.2:3000/?interface=qr"));
        assert!(PairingLink::is_chat_mode("http://h/?x=1&interface=chat"));
        assert!(!PairingLink::is_chat_mode("::"));
    }
}
