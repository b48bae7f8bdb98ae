use crate::attribute::{Attribute, AttributeHolder};
use crate::description::media::MediaDescription;
use crate::error::{Error, Result};
use crate::lexer;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Connection {
    pub nettype: String,
    pub addrtype: String,
    pub address: String,
}

impl Connection {
    pub fn new_ip4(address: impl Into<String>) -> Self {
        Connection {
            nettype: "IN".to_string(),
            addrtype: "IP4".to_string(),
            address: address.into(),
        }
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if !lexer::is_token(&self.nettype) {
            return Err(Error::InvalidField("nettype", self.nettype.clone()));
        }
        if !lexer::is_token(&self.addrtype) {
            return Err(Error::InvalidField("addrtype", self.addrtype.clone()));
        }
        if !lexer::is_address(&self.address) {
            return Err(Error::InvalidField("address", self.address.clone()));
        }
        Ok(())
    }

    pub(crate) fn parse_standalone(s: &str) -> Result<Connection> {
        let mut it = s.split_whitespace();
        let nettype = it.next().ok_or_else(|| Error::MalformedLine(s.to_string()))?;
        let addrtype = it.next().ok_or_else(|| Error::MalformedLine(s.to_string()))?;
        let address = it.next().ok_or_else(|| Error::MalformedLine(s.to_string()))?;
        let conn = Connection {
            nettype: nettype.to_string(),
            addrtype: addrtype.to_string(),
            address: address.to_string(),
        };
        conn.validate()?;
        Ok(conn)
    }

    fn parse(s: &str) -> Result<Connection> {
        Connection::parse_standalone(s)
    }

    pub(crate) fn emit_pub(&self) -> String {
        self.emit()
    }

    fn emit(&self) -> String {
        format!("{} {} {}", self.nettype, self.addrtype, self.address)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Bandwidth {
    pub bwtype: String,
    pub bandwidth: u64,
}

impl Bandwidth {
    pub(crate) fn parse_standalone(s: &str) -> Result<Bandwidth> {
        let (bwtype, val) = s
            .split_once(':')
            .ok_or_else(|| Error::MalformedLine(s.to_string()))?;
        if !lexer::is_token(bwtype) {
            return Err(Error::InvalidField("bwtype", bwtype.to_string()));
        }
        let bandwidth = lexer::parse_u64(val).ok_or_else(|| Error::InvalidField("bandwidth", val.to_string()))?;
        Ok(Bandwidth {
            bwtype: bwtype.to_string(),
            bandwidth,
        })
    }

    fn parse(s: &str) -> Result<Bandwidth> {
        Bandwidth::parse_standalone(s)
    }

    pub(crate) fn emit_pub(&self) -> String {
        self.emit()
    }

    fn emit(&self) -> String {
        format!("{}:{}", self.bwtype, self.bandwidth)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct TimeDescription {
    pub start: u64,
    pub stop: u64,
    pub repeat: Vec<String>,
    pub zone: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Origin {
    pub username: String,
    pub session_id: u64,
    pub session_version: u64,
    pub connection: Connection,
}

impl Origin {
    fn parse(s: &str) -> Result<Origin> {
        let mut it = s.split_whitespace();
        let username = it.next().ok_or_else(|| Error::MalformedLine(s.to_string()))?;
        if !lexer::is_username(username) {
            return Err(Error::InvalidField("username", username.to_string()));
        }
        let session_id = it
            .next()
            .and_then(lexer::parse_u64)
            .ok_or_else(|| Error::InvalidField("sess-id", s.to_string()))?;
        let session_version = it
            .next()
            .and_then(lexer::parse_u64)
            .ok_or_else(|| Error::InvalidField("sess-version", s.to_string()))?;
        let nettype = it.next().ok_or_else(|| Error::MalformedLine(s.to_string()))?;
        let addrtype = it.next().ok_or_else(|| Error::MalformedLine(s.to_string()))?;
        let address = it.next().ok_or_else(|| Error::MalformedLine(s.to_string()))?;
        let connection = Connection {
            nettype: nettype.to_string(),
            addrtype: addrtype.to_string(),
            address: address.to_string(),
        };
        connection.validate()?;
        Ok(Origin {
            username: username.to_string(),
            session_id,
            session_version,
            connection,
        })
    }

    fn emit(&self) -> String {
        format!(
            "{} {} {} {}",
            self.username,
            self.session_id,
            self.session_version,
            self.connection.emit()
        )
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionDescription {
    pub version: u8,
    pub origin: Origin,
    pub name: String,
    pub info: Option<String>,
    pub uri: Option<String>,
    pub emails: Vec<String>,
    pub phones: Vec<String>,
    pub connection: Option<Connection>,
    pub bandwidth: Vec<Bandwidth>,
    pub times: Vec<TimeDescription>,
    pub key: Option<String>,
    pub attributes: Vec<Attribute>,
    pub media_descriptions: Vec<MediaDescription>,
}

impl AttributeHolder for SessionDescription {
    fn attribute_list(&self) -> &[Attribute] {
        &self.attributes
    }

    fn attribute_list_mut(&mut self) -> &mut Vec<Attribute> {
        &mut self.attributes
    }
}

impl SessionDescription {
    pub fn new(origin: Origin, name: impl Into<String>) -> Self {
        SessionDescription {
            version: 0,
            origin,
            name: name.into(),
            info: None,
            uri: None,
            emails: Vec::new(),
            phones: Vec::new(),
            connection: None,
            bandwidth: Vec::new(),
            times: vec![TimeDescription::default()],
            key: None,
            attributes: Vec::new(),
            media_descriptions: Vec::new(),
        }
    }

    pub fn parse(input: &str) -> Result<SessionDescription> {
        if input.is_empty() {
            return Err(Error::EmptyInput);
        }

        let mut lines = input
            .split("\r\n")
            .flat_map(|l| l.split('\n'))
            .filter(|l| !l.is_empty())
            .peekable();

        let mut version = None;
        let mut origin = None;
        let mut name = None;
        let mut info = None;
        let mut uri = None;
        let mut emails = Vec::new();
        let mut phones = Vec::new();
        let mut connection = None;
        let mut bandwidth = Vec::new();
        let mut times = Vec::new();
        let mut key = None;
        let mut attributes = Vec::new();

        while let Some(line) = lines.peek() {
            if line.starts_with("m=") {
                break;
            }
            let line = lines.next().unwrap();
            let (tag, value) = split_line(line)?;
            match tag {
                "v" => {
                    version = Some(value.parse::<u8>().map_err(|_| Error::InvalidField("version", value.to_string()))?);
                }
                "o" => origin = Some(Origin::parse(value)?),
                "s" => name = Some(value.to_string()),
                "i" => info = Some(value.to_string()),
                "u" => uri = Some(value.to_string()),
                "e" => emails.push(value.to_string()),
                "p" => phones.push(value.to_string()),
                "c" => connection = Some(Connection::parse(value)?),
                "b" => bandwidth.push(Bandwidth::parse(value)?),
                "t" => times.push(parse_time(value, &mut lines)?),
                "k" => key = Some(value.to_string()),
                "a" => attributes.push(parse_attribute(value)),
                other => return Err(Error::MalformedLine(format!("unexpected {other}= before m="))),
            }
        }

        let version = version.ok_or(Error::MissingLine("v"))?;
        let origin = origin.ok_or(Error::MissingLine("o"))?;
        let name = name.ok_or(Error::MissingLine("s"))?;
        if times.is_empty() {
            return Err(Error::MissingLine("t"));
        }

        let mut media_descriptions = Vec::new();
        let mut media_lines: Vec<&str> = Vec::new();
        for line in lines {
            if line.starts_with("m=") && !media_lines.is_empty() {
                media_descriptions.push(MediaDescription::parse_block(&media_lines)?);
                media_lines.clear();
            }
            media_lines.push(line);
        }
        if !media_lines.is_empty() {
            media_descriptions.push(MediaDescription::parse_block(&media_lines)?);
        }

        Ok(SessionDescription {
            version,
            origin,
            name,
            info,
            uri,
            emails,
            phones,
            connection,
            bandwidth,
            times,
            key,
            attributes,
            media_descriptions,
        })
    }

    pub fn marshal(&self) -> Result<String> {
        let mut out = String::new();
        out.push_str(&format!("v={}\r\n", self.version));
        out.push_str(&format!("o={}\r\n", self.origin.emit()));
        if !lexer::is_byte_string(&self.name) {
            return Err(Error::InvalidField("session name", self.name.clone()));
        }
        out.push_str(&format!("s={}\r\n", self.name));
        if let Some(info) = &self.info {
            out.push_str(&format!("i={info}\r\n"));
        }
        if let Some(uri) = &self.uri {
            out.push_str(&format!("u={uri}\r\n"));
        }
        for email in &self.emails {
            out.push_str(&format!("e={email}\r\n"));
        }
        for phone in &self.phones {
            out.push_str(&format!("p={phone}\r\n"));
        }
        if let Some(c) = &self.connection {
            c.validate()?;
            out.push_str(&format!("c={}\r\n", c.emit()));
        }
        for bw in &self.bandwidth {
            out.push_str(&format!("b={}\r\n", bw.emit()));
        }
        for t in &self.times {
            out.push_str(&format!("t={} {}\r\n", t.start, t.stop));
            for r in &t.repeat {
                out.push_str(&format!("r={r}\r\n"));
            }
            if !t.zone.is_empty() {
                out.push_str(&format!("z={}\r\n", t.zone.join(" ")));
            }
        }
        if let Some(key) = &self.key {
            if !lexer::is_key(key) {
                return Err(Error::InvalidField("key", key.clone()));
            }
            out.push_str(&format!("k={key}\r\n"));
        }
        for attr in &self.attributes {
            out.push_str(&emit_attribute(attr));
        }
        for media in &self.media_descriptions {
            out.push_str(&media.marshal()?);
        }
        Ok(out)
    }
}

fn split_line(line: &str) -> Result<(&str, &str)> {
    let mut chars = line.char_indices();
    let (_, c) = chars.next().ok_or_else(|| Error::MalformedLine(line.to_string()))?;
    let (idx, eq) = chars.next().ok_or_else(|| Error::MalformedLine(line.to_string()))?;
    if eq != '=' {
        return Err(Error::MalformedLine(line.to_string()));
    }
    let tag = &line[..idx - c.len_utf8()];
    Ok((tag, &line[idx + 1..]))
}

pub(crate) fn parse_attribute(value: &str) -> Attribute {
    match value.split_once(':') {
        Some((k, v)) => Attribute::new(k.to_string(), Some(v.to_string())),
        None => Attribute::property(value.to_string()),
    }
}

pub(crate) fn emit_attribute(attr: &Attribute) -> String {
    match &attr.value {
        Some(v) => format!("a={}:{}\r\n", attr.key, v),
        None => format!("a={}\r\n", attr.key),
    }
}

fn parse_time<'a, I>(value: &str, lines: &mut std::iter::Peekable<I>) -> Result<TimeDescription>
where
    I: Iterator<Item = &'a str>,
{
    let mut it = value.split_whitespace();
    let start_tok = it.next().ok_or_else(|| Error::InvalidField("start-time", value.to_string()))?;
    if !lexer::is_time(start_tok) {
        return Err(Error::InvalidField("start-time", start_tok.to_string()));
    }
    let start = lexer::parse_u64(start_tok).ok_or_else(|| Error::InvalidField("start-time", start_tok.to_string()))?;
    let stop_tok = it.next().ok_or_else(|| Error::InvalidField("stop-time", value.to_string()))?;
    if !lexer::is_time(stop_tok) {
        return Err(Error::InvalidField("stop-time", stop_tok.to_string()));
    }
    let stop = lexer::parse_u64(stop_tok).ok_or_else(|| Error::InvalidField("stop-time", stop_tok.to_string()))?;

    let mut repeat = Vec::new();
    let mut zone = Vec::new();
    while let Some(line) = lines.peek() {
        if let Some(r) = line.strip_prefix("r=") {
            repeat.push(r.to_string());
            lines.next();
        } else if let Some(z) = line.strip_prefix("z=") {
            zone = z.split_whitespace().map(str::to_string).collect();
            lines.next();
        } else {
            break;
        }
    }

    Ok(TimeDescription {
        start,
        stop,
        repeat,
        zone,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> String {
        concat!(
            "v=0\r\n",
            "o=- 1234 1 IN IP4 0.0.0.0\r\n",
            "s=gateway\r\n",
            "t=0 0\r\n",
            "a=ice-options:trickle\r\n",
            "m=audio 9 UDP/TLS/RTP/SAVPF 111\r\n",
            "c=IN IP4 203.0.113.1\r\n",
            "a=ice-ufrag:abc\r\n",
            "a=ice-pwd:0123456789012345678901\r\n",
            "a=setup:passive\r\n",
            "a=rtcp-mux\r\n",
            "a=sendrecv\r\n",
        )
        .to_string()
    }

    #[test]
    fn roundtrip_parses() {
        let sdp = SessionDescription::parse(&sample()).unwrap();
        assert_eq!(sdp.version, 0);
        assert_eq!(sdp.name, "gateway");
        assert_eq!(sdp.media_descriptions.len(), 1);
        let m = &sdp.media_descriptions[0];
        assert_eq!(m.media, "audio");
        assert!(m.has_attribute("rtcp-mux"));
        assert_eq!(m.direction(), Some(crate::direction::Direction::SendRecv));
    }

    #[test]
    fn rejects_missing_version() {
        let bad = "o=- 1 1 IN IP4 0.0.0.0\r\ns=x\r\nt=0 0\r\n";
        assert!(SessionDescription::parse(bad).is_err());
    }

    #[test]
    fn rejects_non_canonical_stop_time() {
        let bad = "v=0\r\no=- 1 1 IN IP4 0.0.0.0\r\ns=x\r\nt=0 1\r\n";
        assert!(SessionDescription::parse(bad).is_err());
    }

    #[test]
    fn marshal_emits_crlf() {
        let sdp = SessionDescription::parse(&sample()).unwrap();
        let out = sdp.marshal().unwrap();
        assert!(out.starts_with("v=0\r\n"));
        assert!(out.contains("m=audio 9 UDP/TLS/RTP/SAVPF 111\r\n"));
    }
}
