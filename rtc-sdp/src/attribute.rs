use crate::direction::Direction;
use std::str::FromStr;

/// A session- or media-level `a=` line: `a=<key>` or `a=<key>:<value>`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Attribute {
    pub key: String,
    pub value: Option<String>,
}

impl Attribute {
    pub fn new(key: impl Into<String>, value: Option<String>) -> Self {
        Attribute {
            key: key.into(),
            value,
        }
    }

    pub fn property(key: impl Into<String>) -> Self {
        Attribute::new(key, None)
    }

    pub fn value_pair(key: impl Into<String>, value: impl Into<String>) -> Self {
        Attribute::new(key, Some(value.into()))
    }
}

/// A one-shot forward cursor over the attributes matching a given name.
///
/// Each call to [`next`](AttributeCursor::next) advances the cursor and
/// returns the next match, or `None` once exhausted. Callers that need to
/// restart iteration MUST create a new cursor rather than reuse a spent one.
pub struct AttributeCursor<'a> {
    attrs: &'a [Attribute],
    name: &'a str,
    pos: usize,
}

impl<'a> AttributeCursor<'a> {
    pub(crate) fn new(attrs: &'a [Attribute], name: &'a str) -> Self {
        AttributeCursor { attrs, name, pos: 0 }
    }
}

impl<'a> Iterator for AttributeCursor<'a> {
    type Item = &'a Attribute;

    fn next(&mut self) -> Option<Self::Item> {
        while self.pos < self.attrs.len() {
            let attr = &self.attrs[self.pos];
            self.pos += 1;
            if attr.key == self.name {
                return Some(attr);
            }
        }
        None
    }
}

/// Shared attribute query surface, implemented by both the session and media
/// description types so callers use the same accessors at either level.
pub trait AttributeHolder {
    fn attribute_list(&self) -> &[Attribute];
    fn attribute_list_mut(&mut self) -> &mut Vec<Attribute>;

    fn has_attribute(&self, name: &str) -> bool {
        self.attribute_list().iter().any(|a| a.key == name)
    }

    fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.attribute_list().iter().find(|a| a.key == name)
    }

    fn iter_attribute<'a>(&'a self, name: &'a str) -> AttributeCursor<'a> {
        AttributeCursor::new(self.attribute_list(), name)
    }

    fn add_attribute(&mut self, attr: Attribute) {
        self.attribute_list_mut().push(attr);
    }

    fn delete_attribute(&mut self, name: &str) {
        self.attribute_list_mut().retain(|a| a.key != name);
    }

    fn direction(&self) -> Option<Direction> {
        Direction::ATTRIBUTE_NAMES
            .iter()
            .find(|name| self.has_attribute(name))
            .and_then(|name| Direction::from_str(name).ok())
    }

    /// `a=rtpmap:<fmt> <encoding>/<clockrate>[/<params>]`
    fn rtpmap(&self, fmt: &str) -> Option<RtpMap> {
        self.iter_attribute("rtpmap")
            .filter_map(|a| a.value.as_deref())
            .find_map(|v| {
                let (payload, rest) = v.split_once(' ')?;
                if payload != fmt {
                    return None;
                }
                RtpMap::parse(rest)
            })
    }

    /// `a=fmtp:<fmt> <params>`
    fn fmtp(&self, fmt: &str) -> Option<&str> {
        self.iter_attribute("fmtp")
            .filter_map(|a| a.value.as_deref())
            .find_map(|v| {
                let (payload, params) = v.split_once(' ')?;
                (payload == fmt).then_some(params)
            })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RtpMap {
    pub encoding: String,
    pub clock_rate: u32,
    pub params: Option<String>,
}

impl RtpMap {
    fn parse(s: &str) -> Option<RtpMap> {
        let mut parts = s.splitn(2, '/');
        let encoding = parts.next()?.to_string();
        let rest = parts.next()?;
        let mut rest_parts = rest.splitn(2, '/');
        let clock_rate = rest_parts.next()?.parse().ok()?;
        let params = rest_parts.next().map(|s| s.to_string());
        Some(RtpMap {
            encoding,
            clock_rate,
            params,
        })
    }
}
