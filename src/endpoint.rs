/*
 * Copyright the s3-object-client contributors.
 * SPDX-License-Identifier: Apache-2.0
 */

use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

use http::Method;
use url::Url;

use crate::error::{self, Error};

const AWS_S3_HOST: &str = "s3.amazonaws.com";

/// A service endpoint: scheme, host and optional port with an empty path.
#[derive(Clone)]
pub struct Endpoint {
    scheme: Scheme,
    host: Host,
    port: Option<u16>,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Scheme {
    Http,
    Https,
}

impl Scheme {
    fn as_str(self) -> &'static str {
        match self {
            Scheme::Http => "http",
            Scheme::Https => "https",
        }
    }

    fn default_port(self) -> u16 {
        match self {
            Scheme::Http => 80,
            Scheme::Https => 443,
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
enum Host {
    Dns(String),
    Ipv4(Ipv4Addr),
    Ipv6(Ipv6Addr),
}

impl Host {
    fn authority_fragment(&self) -> String {
        match self {
            Host::Dns(name) => name.clone(),
            Host::Ipv4(addr) => addr.to_string(),
            Host::Ipv6(addr) => format!("[{addr}]"),
        }
    }
}

impl Endpoint {
    /// Whether this endpoint uses TLS.
    pub fn is_secure(&self) -> bool {
        self.scheme == Scheme::Https
    }

    /// Whether this endpoint addresses the Amazon S3 service proper.
    pub fn is_aws_host(&self) -> bool {
        matches!(&self.host, Host::Dns(name) if name == AWS_S3_HOST)
    }

    /// Force plain HTTP or HTTPS regardless of what the endpoint string said.
    pub(crate) fn set_secure(&mut self, secure: bool) {
        self.scheme = if secure { Scheme::Https } else { Scheme::Http };
    }

    fn host_for_region(&self, region: &str) -> String {
        if self.is_aws_host() && region != "us-east-1" {
            format!("s3.{region}.amazonaws.com")
        } else {
            self.host.authority_fragment()
        }
    }

    fn authority(&self, host: &str) -> String {
        match self.port {
            Some(port) if port != self.scheme.default_port() => format!("{host}:{port}"),
            _ => host.to_string(),
        }
    }

    /// The `Host` header value for a request against `url`, omitting the
    /// port when it is the scheme default.
    pub(crate) fn host_header(url: &Url) -> String {
        let host = url.host_str().unwrap_or_default();
        match url.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        }
    }

    /// Build the request URL for an operation, choosing between
    /// virtual-hosted and path style addressing.
    pub(crate) fn build_url(
        &self,
        method: &Method,
        bucket: Option<&str>,
        object: Option<&str>,
        query: &[(String, String)],
        region: &str,
    ) -> Result<Url, Error> {
        let mut host = self.host_for_region(region);
        let mut path = String::from("/");

        if let Some(bucket) = bucket {
            check_bucket_name(bucket)?;

            let mut use_path_style = !matches!(self.host, Host::Dns(_));
            if *method == Method::PUT && object.is_none() && query.is_empty() {
                // The create-bucket request must go to the path style URL,
                // the virtual-hosted form is rejected for buckets that do
                // not exist yet on some services.
                use_path_style = true;
            } else if query.iter().any(|(k, _)| k == "location") {
                use_path_style = true;
            } else if bucket.contains('.') && self.is_secure() {
                // A dot in the bucket label breaks TLS wildcard matching.
                use_path_style = true;
            }

            if use_path_style {
                path.push_str(&uri_encode(bucket, true));
                if object.is_some() {
                    path.push('/');
                }
            } else {
                host = format!("{bucket}.{host}");
            }
        }

        if let Some(object) = object {
            check_object_name(object)?;
            path.push_str(&uri_encode(object, false));
        }

        let mut url = format!("{}://{}{}", self.scheme.as_str(), self.authority(&host), path);
        if !query.is_empty() {
            url.push('?');
            url.push_str(&encode_query(query));
        }

        Url::parse(&url).map_err(error::internal)
    }
}

impl FromStr for Endpoint {
    type Err = Error;

    /// Accepts a bare `host`, `host:port`, or a full `http(s)://` URL with
    /// an empty path.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (scheme, rest) = match s.split_once("://") {
            Some(("http", rest)) => (Scheme::Http, rest),
            Some(("https", rest)) => (Scheme::Https, rest),
            Some((other, _)) => {
                return Err(error::invalid_argument(format!(
                    "unsupported endpoint scheme {other:?}"
                )))
            }
            None => (Scheme::Https, s),
        };
        let rest = rest.strip_suffix('/').unwrap_or(rest);
        if rest.contains('/') {
            return Err(error::invalid_argument(
                "endpoint must not carry a path component",
            ));
        }

        // IPv6 literals keep their brackets in authority form.
        let (host_str, port) = if let Some(rest) = rest.strip_prefix('[') {
            let (addr, tail) = rest
                .split_once(']')
                .ok_or_else(|| error::invalid_argument("unbalanced IPv6 literal"))?;
            let port = match tail.strip_prefix(':') {
                Some(p) => Some(parse_port(p)?),
                None if tail.is_empty() => None,
                None => return Err(error::invalid_argument("malformed endpoint authority")),
            };
            (addr.to_string(), port)
        } else {
            match rest.rsplit_once(':') {
                Some((host, p)) => (host.to_string(), Some(parse_port(p)?)),
                None => (rest.to_string(), None),
            }
        };

        let host = if let Ok(addr) = host_str.parse::<Ipv6Addr>() {
            Host::Ipv6(addr)
        } else if let Ok(addr) = host_str.parse::<Ipv4Addr>() {
            Host::Ipv4(addr)
        } else if is_valid_dns_name(&host_str) {
            Host::Dns(host_str.to_ascii_lowercase())
        } else {
            return Err(error::invalid_argument(format!(
                "invalid endpoint host {host_str:?}"
            )));
        };

        Ok(Endpoint { scheme, host, port })
    }
}

impl fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}://{}",
            self.scheme.as_str(),
            self.authority(&self.host.authority_fragment())
        )
    }
}

fn parse_port(s: &str) -> Result<u16, Error> {
    match s.parse::<u16>() {
        Ok(p) if p > 0 => Ok(p),
        _ => Err(error::invalid_argument(format!("invalid endpoint port {s:?}"))),
    }
}

fn is_valid_dns_name(name: &str) -> bool {
    if name.is_empty() || name.len() > 253 {
        return false;
    }
    name.split('.').all(|label| {
        !label.is_empty()
            && label.len() <= 63
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    })
}

/// Validate a bucket name: 3 to 63 characters of lowercase alphanumerics,
/// dots and hyphens, starting and ending alphanumeric, without consecutive
/// dots.
pub fn check_bucket_name(name: &str) -> Result<(), Error> {
    if name.len() < 3 || name.len() > 63 {
        return Err(error::invalid_argument(format!(
            "bucket name {name:?} must be 3 to 63 characters long"
        )));
    }
    let bytes = name.as_bytes();
    let alnum = |b: u8| b.is_ascii_lowercase() || b.is_ascii_digit();
    if !alnum(bytes[0]) || !alnum(bytes[bytes.len() - 1]) {
        return Err(error::invalid_argument(format!(
            "bucket name {name:?} must start and end with a lowercase letter or digit"
        )));
    }
    if !bytes.iter().all(|&b| alnum(b) || b == b'.' || b == b'-') {
        return Err(error::invalid_argument(format!(
            "bucket name {name:?} contains invalid characters"
        )));
    }
    if name.contains("..") {
        return Err(error::invalid_argument(format!(
            "bucket name {name:?} must not contain consecutive dots"
        )));
    }
    Ok(())
}

/// Validate an object key: nonempty, and no path segment may be `.` or `..`.
pub fn check_object_name(name: &str) -> Result<(), Error> {
    if name.is_empty() {
        return Err(error::invalid_argument("object name must not be empty"));
    }
    if name.split('/').any(|segment| segment == "." || segment == "..") {
        return Err(error::invalid_argument(format!(
            "object name {name:?} must not contain '.' or '..' path segments"
        )));
    }
    Ok(())
}

/// Percent-encode `s` for use in a URL path or query. Unreserved
/// characters pass through; `/` passes through too unless `encode_slash`
/// is set.
pub(crate) fn uri_encode(s: &str, encode_slash: bool) -> String {
    let keep_slash = !encode_slash;
    let mut out = String::with_capacity(s.len());
    for byte in s.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char)
            }
            b'/' if keep_slash => out.push('/'),
            _ => {
                out.push('%');
                out.push_str(&format!("{byte:02X}"));
            }
        }
    }
    out
}

/// Encode query parameters, keys and values both percent-encoded; keys
/// with empty values render without `=`.
pub(crate) fn encode_query(query: &[(String, String)]) -> String {
    let mut parts = Vec::with_capacity(query.len());
    for (key, value) in query {
        if value.is_empty() {
            parts.push(uri_encode(key, true));
        } else {
            parts.push(format!("{}={}", uri_encode(key, true), uri_encode(value, true)));
        }
    }
    parts.join("&")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoint(s: &str) -> Endpoint {
        s.parse().unwrap()
    }

    #[test]
    fn parses_bare_host_as_https() {
        let ep = endpoint("play.min.io");
        assert!(ep.is_secure());
        assert_eq!(ep.port, None);
    }

    #[test]
    fn parses_host_port_and_scheme() {
        let ep = endpoint("http://localhost:9000");
        assert!(!ep.is_secure());
        assert_eq!(ep.port, Some(9000));
    }

    #[test]
    fn rejects_path_component() {
        assert!("https://play.min.io/prefix".parse::<Endpoint>().is_err());
    }

    #[test]
    fn rejects_zero_port() {
        assert!("localhost:0".parse::<Endpoint>().is_err());
    }

    #[test]
    fn bucket_names() {
        for ok in ["abc", "my-bucket", "a.b.c", "0sparks9"] {
            assert!(check_bucket_name(ok).is_ok(), "{ok}");
        }
        for bad in ["ab", "Uppercase", "-leading", "trailing-", "dots..inside", "a_b", ""] {
            assert!(check_bucket_name(bad).is_err(), "{bad}");
        }
        assert!(check_bucket_name(&"x".repeat(64)).is_err());
    }

    #[test]
    fn object_names() {
        assert!(check_object_name("a/b/c.txt").is_ok());
        assert!(check_object_name("").is_err());
        assert!(check_object_name("a/../b").is_err());
        assert!(check_object_name("./a").is_err());
    }

    #[test]
    fn dotted_bucket_over_https_uses_path_style() {
        let ep = endpoint("https://play.min.io");
        let url = ep
            .build_url(&Method::GET, Some("a.b"), Some("key"), &[], "us-east-1")
            .unwrap();
        assert_eq!(url.as_str(), "https://play.min.io/a.b/key");
    }

    #[test]
    fn plain_bucket_over_https_uses_virtual_host() {
        let ep = endpoint("https://play.min.io");
        let url = ep
            .build_url(&Method::GET, Some("ab"), Some("key"), &[], "us-east-1")
            .unwrap();
        assert_eq!(url.as_str(), "https://ab.play.min.io/key");
    }

    #[test]
    fn create_bucket_forces_path_style() {
        let ep = endpoint("https://play.min.io");
        let url = ep
            .build_url(&Method::PUT, Some("ab"), None, &[], "us-east-1")
            .unwrap();
        assert_eq!(url.as_str(), "https://play.min.io/ab");
    }

    #[test]
    fn location_query_forces_path_style() {
        let ep = endpoint("https://play.min.io");
        let query = vec![("location".to_string(), String::new())];
        let url = ep
            .build_url(&Method::GET, Some("ab"), None, &query, "us-east-1")
            .unwrap();
        assert_eq!(url.as_str(), "https://play.min.io/ab?location");
    }

    #[test]
    fn ip_endpoint_always_path_style() {
        let ep = endpoint("http://127.0.0.1:9000");
        let url = ep
            .build_url(&Method::GET, Some("ab"), Some("k"), &[], "us-east-1")
            .unwrap();
        assert_eq!(url.as_str(), "http://127.0.0.1:9000/ab/k");
    }

    #[test]
    fn aws_host_resolves_regional_endpoint() {
        let ep = endpoint("https://s3.amazonaws.com");
        let url = ep
            .build_url(&Method::GET, Some("ab"), Some("k"), &[], "eu-west-1")
            .unwrap();
        assert_eq!(url.as_str(), "https://ab.s3.eu-west-1.amazonaws.com/k");
    }

    #[test]
    fn object_keys_escape_but_keep_slashes() {
        let ep = endpoint("https://play.min.io");
        let url = ep
            .build_url(&Method::GET, Some("ab"), Some("dir/a key+x"), &[], "us-east-1")
            .unwrap();
        assert_eq!(url.as_str(), "https://ab.play.min.io/dir/a%20key%2Bx");
    }

    #[test]
    fn default_port_is_omitted_from_host_header() {
        let ep = endpoint("https://play.min.io");
        let url = ep
            .build_url(&Method::GET, None, None, &[], "us-east-1")
            .unwrap();
        assert_eq!(Endpoint::host_header(&url), "play.min.io");

        let ep = endpoint("http://localhost:9000");
        let url = ep
            .build_url(&Method::GET, None, None, &[], "us-east-1")
            .unwrap();
        assert_eq!(Endpoint::host_header(&url), "localhost:9000");
    }
}
