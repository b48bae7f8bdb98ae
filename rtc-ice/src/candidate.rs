use std::fmt;
use std::net::{IpAddr, SocketAddr};

use crate::error::{Error, Result};

pub(crate) const DEFAULT_LOCAL_PREFERENCE: u16 = 65535;
/// This system supports exactly one component (rtcp-mux is required).
pub(crate) const COMPONENT_RTP: u16 = 1;

/// Candidate type preference weights, RFC 8445 §5.1.2.1.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CandidateKind {
    Host,
    ServerReflexive,
    PeerReflexive,
    Relay,
}

impl CandidateKind {
    pub const fn preference(self) -> u16 {
        match self {
            CandidateKind::Host => 126,
            CandidateKind::PeerReflexive => 110,
            CandidateKind::ServerReflexive => 100,
            CandidateKind::Relay => 0,
        }
    }

    const fn as_typ(self) -> &'static str {
        match self {
            CandidateKind::Host => "host",
            CandidateKind::ServerReflexive => "srflx",
            CandidateKind::PeerReflexive => "prflx",
            CandidateKind::Relay => "relay",
        }
    }

    fn parse(s: &str) -> Result<CandidateKind> {
        match s {
            "host" => Ok(CandidateKind::Host),
            "srflx" => Ok(CandidateKind::ServerReflexive),
            "prflx" => Ok(CandidateKind::PeerReflexive),
            "relay" => Ok(CandidateKind::Relay),
            other => Err(Error::UnknownCandidateType(other.to_string())),
        }
    }
}

impl fmt::Display for CandidateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_typ())
    }
}

/// One ICE candidate: a transport address plus the metadata needed to
/// compute its priority and to round-trip the `a=candidate:` line.
#[derive(Clone, Debug, PartialEq)]
pub struct Candidate {
    pub foundation: String,
    pub component: u16,
    pub priority: u32,
    pub address: IpAddr,
    pub port: u16,
    pub kind: CandidateKind,
    pub related_address: Option<(IpAddr, u16)>,
}

impl Candidate {
    pub fn host(foundation: impl Into<String>, addr: SocketAddr, local_preference: u16) -> Self {
        let kind = CandidateKind::Host;
        let foundation = foundation.into();
        Candidate {
            priority: priority(kind, local_preference, COMPONENT_RTP),
            foundation,
            component: COMPONENT_RTP,
            address: addr.ip(),
            port: addr.port(),
            kind,
            related_address: None,
        }
    }

    pub fn peer_reflexive(foundation: impl Into<String>, addr: SocketAddr, wire_priority: u32) -> Self {
        Candidate {
            foundation: foundation.into(),
            component: COMPONENT_RTP,
            priority: wire_priority,
            address: addr.ip(),
            port: addr.port(),
            kind: CandidateKind::PeerReflexive,
            related_address: None,
        }
    }

    pub fn addr(&self) -> SocketAddr {
        SocketAddr::new(self.address, self.port)
    }

    /// Parses the value of an `a=candidate:` line (everything after the colon).
    pub fn parse(line: &str) -> Result<Candidate> {
        let mut it = line.split_whitespace();
        let foundation = it.next().ok_or(Error::MissingField("foundation"))?;
        let component: u16 = it
            .next()
            .ok_or(Error::MissingField("component"))?
            .parse()
            .map_err(|_| Error::MissingField("component"))?;
        let transport = it.next().ok_or(Error::MissingField("transport"))?;
        if !transport.eq_ignore_ascii_case("udp") {
            return Err(Error::UnknownTransport(transport.to_string()));
        }
        let priority_field = it.next().ok_or(Error::MissingField("priority"))?;
        let priority: u32 = priority_field
            .parse()
            .map_err(|_| Error::InvalidPriority(priority_field.to_string()))?;
        let addr_field = it.next().ok_or(Error::MissingField("address"))?;
        let address: IpAddr = addr_field
            .parse()
            .map_err(|_| Error::InvalidAddress(addr_field.to_string()))?;
        let port_field = it.next().ok_or(Error::MissingField("port"))?;
        let port: u16 = port_field
            .parse()
            .map_err(|_| Error::InvalidPort(port_field.to_string()))?;

        let typ_lit = it.next().ok_or(Error::MissingField("typ"))?;
        if typ_lit != "typ" {
            return Err(Error::MissingField("typ"));
        }
        let kind = CandidateKind::parse(it.next().ok_or(Error::MissingField("cand-type"))?)?;

        let mut related_address = None;
        while let Some(tok) = it.next() {
            if tok == "raddr" {
                let raddr: IpAddr = it
                    .next()
                    .ok_or(Error::MissingField("raddr"))?
                    .parse()
                    .map_err(|_| Error::MissingField("raddr"))?;
                let rport_lit = it.next().ok_or(Error::MissingField("rport"))?;
                if rport_lit != "rport" {
                    continue;
                }
                let rport: u16 = it
                    .next()
                    .ok_or(Error::MissingField("rport"))?
                    .parse()
                    .map_err(|_| Error::MissingField("rport"))?;
                related_address = Some((raddr, rport));
            }
            // any other extension token (e.g. `generation N`, `ufrag ...`) is tolerated and ignored.
        }

        Ok(Candidate {
            foundation: foundation.to_string(),
            component,
            priority,
            address,
            port,
            kind,
            related_address,
        })
    }

    /// Serializes to the value of an `a=candidate:` line (without the `a=candidate:` prefix).
    pub fn marshal(&self) -> String {
        let mut s = format!(
            "{} {} udp {} {} {} typ {}",
            self.foundation, self.component, self.priority, self.address, self.port, self.kind
        );
        if let Some((raddr, rport)) = self.related_address {
            s.push_str(&format!(" raddr {raddr} rport {rport}"));
        }
        s
    }
}

/// RFC 8445 §5.1.2.1: `(1<<24)*type_pref + (1<<8)*local_pref + (256 - component)`.
pub fn priority(kind: CandidateKind, local_preference: u16, component: u16) -> u32 {
    (1u32 << 24) * kind.preference() as u32 + (1u32 << 8) * local_preference as u32 + (256 - component as u32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrips_host_candidate() {
        let c = Candidate::host("f1", "203.0.113.1:9".parse().unwrap(), DEFAULT_LOCAL_PREFERENCE);
        let line = c.marshal();
        let parsed = Candidate::parse(&line).unwrap();
        assert_eq!(parsed, c);
    }

    #[test]
    fn rejects_missing_typ() {
        assert!(Candidate::parse("f1 1 udp 12345 203.0.113.1 9").is_err());
    }

    #[test]
    fn parses_related_address() {
        let parsed = Candidate::parse(
            "f1 1 udp 1694498815 198.51.100.1 9 typ srflx raddr 203.0.113.1 rport 9",
        )
        .unwrap();
        assert_eq!(parsed.kind, CandidateKind::ServerReflexive);
        assert_eq!(parsed.related_address, Some(("203.0.113.1".parse().unwrap(), 9)));
    }
}
