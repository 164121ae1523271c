use std::collections::BTreeMap;
use std::net::SocketAddrV4;

use thiserror::Error;

pub const SSDP_MULTICAST: SocketAddrV4 = SocketAddrV4::new(std::net::Ipv4Addr::new(239, 255, 255, 250), 1900);

/// Search target that matches every device.
pub const SEARCH_ALL: &str = "ssdp:all";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SsdpError {
    #[error("response is not UTF-8")]
    NotText,
    #[error("unexpected start line '{0}'")]
    StartLine(String),
}

/// Builds an M-SEARCH request for `search`. `mx` is the maximum response delay in seconds.
pub fn create_msearch(search: &str, mx: u8) -> Vec<u8> {
    format!(
        "M-SEARCH * HTTP/1.1\r\n\
         HOST: {SSDP_MULTICAST}\r\n\
         MAN: \"ssdp:discover\"\r\n\
         MX: {mx}\r\n\
         ST: {search}\r\n\
         \r\n"
    )
    .into_bytes()
}

/// A search response or a `NOTIFY` announcement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SsdpResponse {
    /// Header names are lower-cased.
    pub headers: BTreeMap<String, String>,
}

impl SsdpResponse {
    pub fn parse(data: &[u8]) -> Result<Self, SsdpError> {
        let text = std::str::from_utf8(data).map_err(|_| SsdpError::NotText)?;
        let mut lines = text.split("\r\n");

        let start = lines.next().unwrap_or_default().trim();
        let is_response = start.starts_with("HTTP/1.1 200") || start.starts_with("HTTP/1.0 200");
        let is_notify = start.starts_with("NOTIFY * HTTP/1.1");
        if !is_response && !is_notify {
            return Err(SsdpError::StartLine(start.to_string()));
        }

        let headers = lines
            .take_while(|line| !line.is_empty())
            .filter_map(|line| line.split_once(':'))
            .map(|(name, value)| (name.trim().to_ascii_lowercase(), value.trim().to_string()))
            .collect();

        Ok(Self { headers })
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    pub fn location(&self) -> Option<&str> {
        self.header("location")
    }

    pub fn usn(&self) -> Option<&str> {
        self.header("usn")
    }

    /// Search responses carry `ST`, announcements carry `NT`.
    pub fn search_target(&self) -> Option<&str> {
        self.header("st").or_else(|| self.header("nt"))
    }

    pub fn matches(&self, search: &str) -> bool {
        search == SEARCH_ALL
            || self
                .search_target()
                .is_some_and(|st| st.eq_ignore_ascii_case(search))
    }

    /// Port of the `LOCATION` URL, defaulting to 80 when the URL has none.
    pub fn location_port(&self) -> Option<u16> {
        let location = self.location()?;
        let authority = location
            .split_once("://")
            .map_or(location, |(_, rest)| rest)
            .split('/')
            .next()?;
        match authority.rsplit_once(':') {
            Some((_, port)) => port.parse().ok(),
            None => Some(80),
        }
    }
}
