/*
 * Copyright the s3-object-client contributors.
 * SPDX-License-Identifier: Apache-2.0
 */

//! Header categorization and formatting helpers.

use http::header::{HeaderMap, HeaderName, HeaderValue};

use crate::error::{self, Error};

/// Recognized standard HTTP headers passed through untouched.
const STANDARD_HEADERS: [&str; 7] = [
    "cache-control",
    "content-disposition",
    "content-encoding",
    "content-language",
    "content-type",
    "expires",
    "range",
];

/// Recognized service header tokens rewritten to `x-amz-<token>`.
const AMZ_HEADER_TOKENS: [&str; 8] = [
    "server-side-encryption",
    "server-side-encryption-aws-kms-key-id",
    "server-side-encryption-context",
    "server-side-encryption-customer-algorithm",
    "server-side-encryption-customer-key",
    "server-side-encryption-customer-key-md5",
    "storage-class",
    "website-redirect-location",
];

/// Normalize a caller supplied header name.
///
/// Recognized standard headers and `x-amz-*` names pass through;
/// recognized service tokens gain the `x-amz-` prefix; everything else
/// becomes user metadata under `x-amz-meta-`.
pub(crate) fn normalize_header_name(name: &str) -> String {
    let lowered = name.to_ascii_lowercase();
    if AMZ_HEADER_TOKENS.contains(&lowered.as_str()) {
        format!("x-amz-{lowered}")
    } else if STANDARD_HEADERS.contains(&lowered.as_str()) || lowered.starts_with("x-amz-") {
        lowered
    } else {
        format!("x-amz-meta-{lowered}")
    }
}

/// Insert caller supplied headers into `headers` after normalization.
pub(crate) fn add_normalized<'a>(
    headers: &mut HeaderMap,
    user_headers: impl IntoIterator<Item = (&'a str, &'a str)>,
) -> Result<(), Error> {
    for (name, value) in user_headers {
        let name = normalize_header_name(name);
        append(headers, &name, value)?;
    }
    Ok(())
}

/// Append a header, validating name and value.
pub(crate) fn append(headers: &mut HeaderMap, name: &str, value: &str) -> Result<(), Error> {
    let name: HeaderName = name.parse().map_err(error::invalid_argument)?;
    let value = HeaderValue::from_str(value).map_err(error::invalid_argument)?;
    headers.append(name, value);
    Ok(())
}

/// Insert a header, replacing earlier values, validating name and value.
pub(crate) fn insert(headers: &mut HeaderMap, name: &str, value: &str) -> Result<(), Error> {
    let name: HeaderName = name.parse().map_err(error::invalid_argument)?;
    let value = HeaderValue::from_str(value).map_err(error::invalid_argument)?;
    headers.insert(name, value);
    Ok(())
}

/// Read a header as a string, empty when missing or not UTF-8.
pub(crate) fn get_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

const HTTP_DATE_FORMAT: &[time::format_description::BorrowedFormatItem<'static>] =
    time::macros::format_description!(
        "[weekday repr:short], [day] [month repr:short] [year] [hour]:[minute]:[second] GMT"
    );

/// Format a timestamp as an IMF-fixdate HTTP date.
pub(crate) fn format_http_date(t: time::OffsetDateTime) -> String {
    t.to_offset(time::UtcOffset::UTC)
        .format(&HTTP_DATE_FORMAT)
        .expect("UTC datetime formats")
}

/// Parse an IMF-fixdate HTTP date such as `Last-Modified`.
pub(crate) fn parse_http_date(value: &str) -> Option<time::OffsetDateTime> {
    time::PrimitiveDateTime::parse(value, &HTTP_DATE_FORMAT)
        .ok()
        .map(time::PrimitiveDateTime::assume_utc)
}

/// `Range` header value covering `length` bytes from `offset`, or the
/// rest of the object when `length` is `None`.
pub(crate) fn format_range(offset: u64, length: Option<u64>) -> String {
    match length {
        Some(length) if length > 0 => format!("bytes={}-{}", offset, offset + length - 1),
        _ => format!("bytes={offset}-"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_headers_pass_through() {
        assert_eq!(normalize_header_name("Content-Type"), "content-type");
        assert_eq!(normalize_header_name("Cache-Control"), "cache-control");
    }

    #[test]
    fn amz_tokens_gain_prefix() {
        assert_eq!(normalize_header_name("Storage-Class"), "x-amz-storage-class");
        assert_eq!(
            normalize_header_name("server-side-encryption"),
            "x-amz-server-side-encryption"
        );
    }

    #[test]
    fn amz_headers_pass_through() {
        assert_eq!(
            normalize_header_name("x-amz-acl"),
            "x-amz-acl"
        );
    }

    #[test]
    fn everything_else_becomes_metadata() {
        assert_eq!(normalize_header_name("Project"), "x-amz-meta-project");
        assert_eq!(normalize_header_name("My-Header"), "x-amz-meta-my-header");
    }

    #[test]
    fn range_formatting() {
        assert_eq!(format_range(0, Some(10)), "bytes=0-9");
        assert_eq!(format_range(4_194_304, None), "bytes=4194304-");
        assert_eq!(format_range(5, Some(0)), "bytes=5-");
    }
}
