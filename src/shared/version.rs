use std::fmt::{self, Display};


/// Represents the version from an HTTP request line.
///
/// Any `MAJOR.MINOR` pair is accepted by the parser. Responses are always
/// written as `HTTP/1.1` regardless of what the client sent.
#[derive(Copy, Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Version {
    pub major: u32,
    pub minor: u32,
}

impl Version {
    /// HTTP/1.0 protocol version.
    pub const HTTP_10: Version = Version { major: 1, minor: 0 };
    /// HTTP/1.1 protocol version as described in RFC7230 and others.
    pub const HTTP_11: Version = Version { major: 1, minor: 1 };

    /// Parses the `HTTP/x.y` part of a request line.
    ///
    /// The `HTTP` prefix is matched case-insensitively, both numbers
    /// must be plain decimal digits.
    pub fn parse(token: &str) -> Option<Version> {
        match token.get(..5) {
            Some(prefix) if prefix.eq_ignore_ascii_case("HTTP/") => {}
            _ => return None,
        }
        let mut parts = token[5..].splitn(2, '.');
        let major = parse_digits(parts.next()?)?;
        let minor = parse_digits(parts.next()?)?;
        Some(Version { major: major, minor: minor })
    }
}

fn parse_digits(val: &str) -> Option<u32> {
    if val.is_empty() || !val.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    val.parse().ok()
}

impl Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "HTTP/{}.{}", self.major, self.minor)
    }
}

#[cfg(test)]
mod test {
    use super::Version;

    #[test]
    fn parse_versions() {
        assert_eq!(Version::parse("HTTP/1.1"), Some(Version::HTTP_11));
        assert_eq!(Version::parse("http/1.0"), Some(Version::HTTP_10));
        assert_eq!(Version::parse("HTTP/2.0"),
                   Some(Version { major: 2, minor: 0 }));
        assert_eq!(Version::parse("HTTP/12.34"),
                   Some(Version { major: 12, minor: 34 }));
    }

    #[test]
    fn reject_garbage() {
        assert_eq!(Version::parse("HTTP/1"), None);
        assert_eq!(Version::parse("HTTP/1."), None);
        assert_eq!(Version::parse("HTTP/+1.1"), None);
        assert_eq!(Version::parse("HTTPS/1.1"), None);
        assert_eq!(Version::parse("HTTP/1.1.1"), None);
        assert_eq!(Version::parse(""), None);
    }

    #[test]
    fn display() {
        assert_eq!(Version::HTTP_11.to_string(), "HTTP/1.1");
        assert_eq!(Version { major: 3, minor: 7 }.to_string(), "HTTP/3.7");
    }
}
