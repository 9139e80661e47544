use std::net::{IpAddr, Ipv6Addr};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ServerNameError {
    #[error("Invalid server name: empty string")]
    EmptyString,
    #[error("Invalid server name: empty hostname")]
    EmptyHostname,
    #[error("Invalid server name: {0} (Not a valid DNS name)")]
    NotValidDns(String),
    #[error("Invalid server name: {0} (Invalid character '{1}')")]
    InvalidCharacter(String, char),
    #[error("Invalid server name: {0} (Invalid port)")]
    InvalidPort(String),
}

/// Validates a server name: a DNS name, IPv4 literal or bracketed IPv6
/// literal, optionally followed by `:port`.
pub fn validate_server_name(server_name: &str) -> Result<(), ServerNameError> {
    if server_name.is_empty() {
        return Err(ServerNameError::EmptyString);
    }

    // Split off the port if it exists
    let (hostname, port) = if let Some(rest) = server_name.strip_prefix('[') {
        let (literal, after) = rest
            .split_once(']')
            .ok_or_else(|| ServerNameError::NotValidDns(server_name.to_string()))?;
        if literal.parse::<Ipv6Addr>().is_err() {
            return Err(ServerNameError::NotValidDns(server_name.to_string()));
        }
        let port = match after {
            "" => None,
            p => Some(
                p.strip_prefix(':')
                    .ok_or_else(|| ServerNameError::InvalidPort(server_name.to_string()))?,
            ),
        };
        (literal, port)
    } else {
        match server_name.split_once(':') {
            Some((host, port)) => (host, Some(port)),
            None => (server_name, None),
        }
    };

    if hostname.is_empty() {
        return Err(ServerNameError::EmptyHostname);
    }

    if let Some(port) = port {
        if port.is_empty() || port.len() > 5 || port.parse::<u16>().is_err() {
            return Err(ServerNameError::InvalidPort(server_name.to_string()));
        }
    }

    if hostname.parse::<IpAddr>().is_err() {
        // Check if it's a valid DNS name
        if !hostname.is_ascii() || hostname.len() > 255 || hostname.contains("..") {
            return Err(ServerNameError::NotValidDns(server_name.to_string()));
        }

        // Check for invalid characters in the hostname
        for c in hostname.chars() {
            if !c.is_ascii_alphanumeric() && c != '-' && c != '.' {
                return Err(ServerNameError::InvalidCharacter(server_name.to_string(), c));
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_hosts_and_literals() {
        assert!(validate_server_name("chat.example.org").is_ok());
        assert!(validate_server_name("chat.example.org:8443").is_ok());
        assert!(validate_server_name("192.0.2.1:443").is_ok());
        assert!(validate_server_name("[2001:db8::1]:8448").is_ok());
        assert!(validate_server_name("[2001:db8::1]").is_ok());
    }

    #[test]
    fn rejects_malformed_names() {
        assert_eq!(validate_server_name(""), Err(ServerNameError::EmptyString));
        assert_eq!(validate_server_name(":80"), Err(ServerNameError::EmptyHostname));
        assert!(matches!(
            validate_server_name("a..b"),
            Err(ServerNameError::NotValidDns(_))
        ));
        assert!(matches!(
            validate_server_name("exa_mple.org"),
            Err(ServerNameError::InvalidCharacter(_, '_'))
        ));
        assert!(matches!(
            validate_server_name("example.org:99999"),
            Err(ServerNameError::InvalidPort(_))
        ));
        assert!(matches!(
            validate_server_name("[not-ipv6]:80"),
            Err(ServerNameError::NotValidDns(_))
        ));
    }
}
