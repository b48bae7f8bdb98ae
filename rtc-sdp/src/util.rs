/// Escapes CRLF line endings into the literal two-character sequence `\r\n`,
/// matching the form expected when an SDP body is embedded as a JSON string
/// value (`{"sdp":"v=0\r\n..."}`).
pub fn escape_crlf(sdp: &str) -> String {
    sdp.replace('\r', "\\r").replace('\n', "\\n")
}

/// Inverse of [`escape_crlf`].
pub fn unescape_crlf(escaped: &str) -> String {
    escaped.replace("\\r\\n", "\r\n").replace("\\n", "\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_and_unescapes() {
        let sdp = "v=0\r\ns=x\r\n";
        let escaped = escape_crlf(sdp);
        assert_eq!(escaped, "v=0\\r\\ns=x\\r\\n");
        assert_eq!(unescape_crlf(&escaped), sdp);
    }
}
