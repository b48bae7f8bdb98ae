//! Lexical predicates over the RFC 4566 grammar. Each function answers
//! "is this byte slice a valid instance of production X", with no
//! allocation and no partial acceptance.

pub fn is_token(s: &str) -> bool {
    !s.is_empty()
        && s.bytes().all(|b| {
            b.is_ascii_graphic()
                && !matches!(
                    b,
                    b'(' | b')' | b'<' | b'>' | b'@' | b',' | b';' | b':' | b'\\' | b'"' | b'/' | b'[' | b']' | b'?' | b'=' | b'{' | b'}' | b' '
                )
        })
}

pub fn is_username(s: &str) -> bool {
    !s.is_empty() && !s.bytes().any(|b| b == b' ' || b == 0x00 || b == b'\r' || b == b'\n')
}

pub fn is_byte_string(s: &str) -> bool {
    !s.bytes().any(|b| b == 0x00 || b == b'\r' || b == b'\n')
}

/// RFC 4566 "text" is any UTF-8 byte-string, \r and \n excluded.
pub fn is_text(s: &str) -> bool {
    is_byte_string(s)
}

pub fn is_digit_string(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

pub fn is_integer(s: &str) -> bool {
    if s == "0" {
        return true;
    }
    is_digit_string(s) && !s.starts_with('0')
}

pub fn is_port(s: &str) -> bool {
    is_digit_string(s) && s.parse::<u32>().map(|p| p <= 65535).unwrap_or(false)
}

/// digits, optionally followed by one of d|h|m|s; `allow_negative` permits a leading '-'.
pub fn is_typed_time(s: &str, allow_negative: bool) -> bool {
    let s = if allow_negative {
        s.strip_prefix('-').unwrap_or(s)
    } else {
        s
    };
    if s.is_empty() {
        return false;
    }
    let (digits, unit) = match s.as_bytes()[s.len() - 1] {
        b'd' | b'h' | b'm' | b's' => (&s[..s.len() - 1], true),
        _ => (s, false),
    };
    let _ = unit;
    is_digit_string(digits)
}

/// A 10-digit decimal NTP timestamp, or the literal "0".
pub fn is_time(s: &str) -> bool {
    s == "0" || (s.len() == 10 && is_digit_string(s))
}

pub fn is_phone(s: &str) -> bool {
    !s.is_empty()
        && s.bytes()
            .all(|b| b.is_ascii_digit() || matches!(b, b'+' | b'-' | b' ' | b'(' | b')'))
}

pub fn is_email(s: &str) -> bool {
    !s.is_empty() && s.contains('@') && !s.bytes().any(|b| b == b' ' || b == b'\r' || b == b'\n')
}

/// `prompt`, `clear:<text>`, `base64:<digits/letters>`, or `uri:<uri>`.
pub fn is_key(s: &str) -> bool {
    if s == "prompt" {
        return true;
    }
    if let Some(rest) = s.strip_prefix("clear:") {
        return is_byte_string(rest);
    }
    if let Some(rest) = s.strip_prefix("base64:") {
        return is_base64(rest);
    }
    if let Some(rest) = s.strip_prefix("uri:") {
        return is_uri(rest);
    }
    false
}

pub fn is_base64(s: &str) -> bool {
    !s.is_empty()
        && s.bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'+' | b'/' | b'='))
}

pub fn is_uri(s: &str) -> bool {
    !s.is_empty() && s.contains(':') && !s.bytes().any(|b| b == b' ' || b == b'\r' || b == b'\n')
}

/// `<token>:<u64>`
pub fn is_bandwidth(s: &str) -> bool {
    match s.split_once(':') {
        Some((typ, val)) => is_token(typ) && is_digit_string(val),
        None => false,
    }
}

pub fn is_proto(s: &str) -> bool {
    !s.is_empty() && s.split('/').all(is_token)
}

pub fn is_ip4(s: &str) -> bool {
    s.parse::<std::net::Ipv4Addr>().is_ok()
}

pub fn is_ip6(s: &str) -> bool {
    s.parse::<std::net::Ipv6Addr>().is_ok()
}

/// A dot-separated FQDN label sequence, minimal RFC 1035 host syntax.
pub fn is_fqdn(s: &str) -> bool {
    !s.is_empty()
        && s.split('.').all(|label| {
            !label.is_empty()
                && label.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-')
                && !label.starts_with('-')
                && !label.ends_with('-')
        })
}

pub fn is_address(s: &str) -> bool {
    is_ip4(s) || is_ip6(s) || is_fqdn(s)
}

pub fn parse_port(s: &str) -> Option<u16> {
    if is_port(s) {
        s.parse().ok()
    } else {
        None
    }
}

pub fn parse_u64(s: &str) -> Option<u64> {
    if is_digit_string(s) {
        s.parse().ok()
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokens() {
        assert!(is_token("UDP/TLS/RTP/SAVPF".split('/').next().unwrap()));
        assert!(!is_token(""));
        assert!(!is_token("a b"));
    }

    #[test]
    fn times() {
        assert!(is_time("0"));
        assert!(is_time("3034423619"));
        assert!(!is_time("123"));
    }

    #[test]
    fn typed_time() {
        assert!(is_typed_time("7200", false));
        assert!(is_typed_time("1h", false));
        assert!(is_typed_time("-1h", true));
        assert!(!is_typed_time("-1h", false));
    }

    #[test]
    fn keys() {
        assert!(is_key("prompt"));
        assert!(is_key("clear:hello"));
        assert!(is_key("base64:aGVsbG8="));
        assert!(!is_key("garbage"));
    }

    #[test]
    fn addresses() {
        assert!(is_address("127.0.0.1"));
        assert!(is_address("::1"));
        assert!(is_address("example.org"));
        assert!(!is_address(""));
    }

    #[test]
    fn bandwidth() {
        assert!(is_bandwidth("AS:128"));
        assert!(!is_bandwidth("AS"));
        assert!(!is_bandwidth(":128"));
    }
}
