//! Rate limit identifiers for inbound requests.

use crate::constants::ANONYMOUS_IDENTIFIER;

/// Forwarding headers consulted in order of preference
const CLIENT_ADDRESS_HEADERS: [&str; 3] = ["x-forwarded-for", "x-real-ip", "cf-connecting-ip"];

/// Resolve the client address from request headers
///
/// `headers` yields `(name, value)` pairs; names are matched
/// case-insensitively. Only the first hop of `x-forwarded-for` is used.
/// Falls back to `"anonymous"` when no usable header is present.
pub fn client_identifier<'a, I>(headers: I) -> String
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let headers: Vec<(&str, &str)> = headers.into_iter().collect();

    CLIENT_ADDRESS_HEADERS
        .iter()
        .find_map(|wanted| {
            headers
                .iter()
                .find(|(name, _)| name.eq_ignore_ascii_case(wanted))
                .and_then(|(_, value)| value.split(',').next())
                .map(str::trim)
                .filter(|address| !address.is_empty())
        })
        .unwrap_or(ANONYMOUS_IDENTIFIER)
        .to_string()
}

/// Identifier for an authenticated user
pub fn user_identifier(user_id: &str) -> String {
    format!("user:{user_id}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_forwarded_hop_wins() {
        let headers = [
            ("X-Forwarded-For", "203.0.113.7, 10.0.0.1"),
            ("x-real-ip", "10.0.0.1"),
        ];
        assert_eq!(client_identifier(headers), "203.0.113.7");
    }

    #[test]
    fn test_falls_through_header_chain() {
        assert_eq!(
            client_identifier([("cf-connecting-ip", "198.51.100.2")]),
            "198.51.100.2"
        );
        assert_eq!(
            client_identifier([("x-forwarded-for", " "), ("x-real-ip", "192.0.2.9")]),
            "192.0.2.9"
        );
    }

    #[test]
    fn test_anonymous_without_headers() {
        assert_eq!(client_identifier(Vec::new()), "anonymous");
    }

    #[test]
    fn test_user_identifier() {
        assert_eq!(user_identifier("42"), "user:42");
    }
}
