use crate::attribute::{Attribute, AttributeHolder};
use crate::description::session::{emit_attribute, parse_attribute, Bandwidth, Connection};
use crate::error::{Error, Result};
use crate::lexer;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MediaDescription {
    pub media: String,
    pub port: u16,
    pub port_count: Option<u16>,
    pub protocol: String,
    pub formats: Vec<String>,
    pub info: Option<String>,
    pub connection: Vec<Connection>,
    pub bandwidth: Vec<Bandwidth>,
    pub key: Option<String>,
    pub attributes: Vec<Attribute>,
}

impl AttributeHolder for MediaDescription {
    fn attribute_list(&self) -> &[Attribute] {
        &self.attributes
    }

    fn attribute_list_mut(&mut self) -> &mut Vec<Attribute> {
        &mut self.attributes
    }
}

impl MediaDescription {
    pub fn new(media: impl Into<String>, port: u16, protocol: impl Into<String>, formats: Vec<String>) -> Self {
        MediaDescription {
            media: media.into(),
            port,
            port_count: None,
            protocol: protocol.into(),
            formats,
            info: None,
            connection: Vec::new(),
            bandwidth: Vec::new(),
            key: None,
            attributes: Vec::new(),
        }
    }

    pub(crate) fn parse_block(lines: &[&str]) -> Result<MediaDescription> {
        let first = lines.first().ok_or_else(|| Error::MalformedLine(String::new()))?;
        let value = first
            .strip_prefix("m=")
            .ok_or_else(|| Error::MalformedLine((*first).to_string()))?;

        let mut it = value.split_whitespace();
        let media = it.next().ok_or_else(|| Error::MalformedLine(value.to_string()))?;
        if !lexer::is_token(media) {
            return Err(Error::InvalidField("media", media.to_string()));
        }
        let port_field = it.next().ok_or_else(|| Error::MalformedLine(value.to_string()))?;
        let (port, port_count) = match port_field.split_once('/') {
            Some((p, c)) => (
                lexer::parse_port(p).ok_or_else(|| Error::InvalidField("port", p.to_string()))?,
                Some(lexer::parse_port(c).ok_or_else(|| Error::InvalidField("port-count", c.to_string()))?),
            ),
            None => (
                lexer::parse_port(port_field).ok_or_else(|| Error::InvalidField("port", port_field.to_string()))?,
                None,
            ),
        };
        let protocol = it.next().ok_or_else(|| Error::MalformedLine(value.to_string()))?;
        if !lexer::is_proto(protocol) {
            return Err(Error::InvalidField("proto", protocol.to_string()));
        }
        let formats: Vec<String> = it.map(str::to_string).collect();
        if formats.is_empty() {
            return Err(Error::MalformedLine(format!("{value}: missing fmt list")));
        }

        let mut info = None;
        let mut connection = Vec::new();
        let mut bandwidth = Vec::new();
        let mut key = None;
        let mut attributes = Vec::new();

        for line in &lines[1..] {
            let (tag, val) = split_line(line)?;
            match tag {
                "i" => info = Some(val.to_string()),
                "c" => connection.push(Connection::parse_standalone(val)?),
                "b" => bandwidth.push(Bandwidth::parse_standalone(val)?),
                "k" => key = Some(val.to_string()),
                "a" => attributes.push(parse_attribute(val)),
                other => return Err(Error::MalformedLine(format!("unexpected {other}= in m= block"))),
            }
        }

        Ok(MediaDescription {
            media: media.to_string(),
            port,
            port_count,
            protocol: protocol.to_string(),
            formats,
            info,
            connection,
            bandwidth,
            key,
            attributes,
        })
    }

    pub fn marshal(&self) -> Result<String> {
        if !lexer::is_token(&self.media) {
            return Err(Error::InvalidField("media", self.media.clone()));
        }
        if !lexer::is_proto(&self.protocol) {
            return Err(Error::InvalidField("proto", self.protocol.clone()));
        }
        let port_field = match self.port_count {
            Some(c) => format!("{}/{}", self.port, c),
            None => self.port.to_string(),
        };
        let mut out = format!(
            "m={} {} {} {}\r\n",
            self.media,
            port_field,
            self.protocol,
            self.formats.join(" ")
        );
        if let Some(info) = &self.info {
            out.push_str(&format!("i={info}\r\n"));
        }
        for c in &self.connection {
            out.push_str(&format!("c={}\r\n", c.emit_pub()));
        }
        for bw in &self.bandwidth {
            out.push_str(&format!("b={}\r\n", bw.emit_pub()));
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
