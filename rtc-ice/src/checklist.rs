use std::collections::VecDeque;
use std::net::SocketAddr;

use bytes::BytesMut;
use stun::{attributes, Class, Message, TransactionId, BINDING};

use crate::candidate::{Candidate, CandidateKind};
use crate::error::{Error, Result};
use crate::pair::{pair_priority, CandidatePair, PairState};

/// A connectivity-check result for a previously sent Binding Request.
#[derive(Debug)]
pub enum CheckOutcome {
    Succeeded { remote: SocketAddr, mapped: SocketAddr },
    Failed { remote: SocketAddr },
}

/// Once `progress_count` exceeds this many outstanding retransmits on the
/// same transaction without a reply, the pair is marked FAILED.
const MAX_PROGRESS: u32 = 100;
/// Every Nth success on a non-nominated valid pair promotes it to a
/// nomination candidate (controlling side only).
const NOMINATE_EVERY: u32 = 3;

/// Per-stream candidate pair list, FROZEN/WAITING scheduling, triggered
/// checks, and nomination bookkeeping (RFC 8445 §6 and §8, component C5).
pub struct Checklist {
    pairs: Vec<CandidatePair>,
    trigger: VecDeque<SocketAddr>,
    valid: Vec<SocketAddr>,
    pub selected: Option<SocketAddr>,
}

impl Checklist {
    pub fn new() -> Self {
        Checklist {
            pairs: Vec::new(),
            trigger: VecDeque::new(),
            valid: Vec::new(),
            selected: None,
        }
    }

    pub fn pairs(&self) -> &[CandidatePair] {
        &self.pairs
    }

    pub fn find(&self, remote: SocketAddr) -> Option<&CandidatePair> {
        self.pairs.iter().find(|p| p.remote.addr() == remote)
    }

    fn find_mut(&mut self, remote: SocketAddr) -> Option<&mut CandidatePair> {
        self.pairs.iter_mut().find(|p| p.remote.addr() == remote)
    }

    /// Adds a pair for `remote` if one does not already exist for that
    /// address (remote address uniquely identifies a pair in this stream,
    /// since the local side is always the stream's single host candidate).
    /// New pairs start FROZEN unless the stream currently has no other pair.
    pub fn add_pair(&mut self, local: Candidate, remote: Candidate, controlling: bool, initial_success: bool) -> SocketAddr {
        let addr = remote.addr();
        if self.find(addr).is_some() {
            return addr;
        }
        let initial_state = if initial_success {
            PairState::Succeeded
        } else if self.pairs.is_empty() {
            PairState::Waiting
        } else {
            PairState::Frozen
        };
        let pair = CandidatePair::new(local, remote, controlling, initial_state);
        self.pairs.push(pair);
        self.sort();
        self.prune();
        addr
    }

    fn sort(&mut self) {
        self.pairs.sort_by(|a, b| b.priority.cmp(&a.priority));
    }

    /// Removes any non-selected FROZEN/WAITING pair that is redundant with a
    /// higher-priority pair. Pairs are keyed by remote address, so this only
    /// ever matters for defensive de-duplication after a bulk re-add.
    fn prune(&mut self) {
        let mut seen = std::collections::HashSet::new();
        self.pairs.retain(|p| {
            if self.selected == Some(p.remote.addr()) {
                return true;
            }
            if matches!(p.state, PairState::Frozen | PairState::Waiting) {
                if !seen.insert(p.remote.addr()) {
                    return false;
                }
            }
            true
        });
    }

    pub fn recompute_priorities(&mut self, controlling: bool) {
        for pair in &mut self.pairs {
            pair.recompute_priority(controlling);
        }
        self.sort();
    }

    /// Enqueues a pair for an immediate out-of-pace connectivity check.
    pub fn trigger(&mut self, remote: SocketAddr) {
        if !self.trigger.contains(&remote) {
            self.trigger.push_back(remote);
        }
    }

    /// One pacing tick: pop the triggered-check queue, else the
    /// highest-priority WAITING pair. Returns `None` when the stream has no
    /// work this tick (the session-level tick then calls `unfreeze`).
    pub fn next_check(&mut self) -> Option<SocketAddr> {
        while let Some(addr) = self.trigger.pop_front() {
            if self.find(addr).is_some() {
                return Some(addr);
            }
        }
        self.pairs
            .iter()
            .find(|p| p.state == PairState::Waiting)
            .map(|p| p.remote.addr())
    }

    /// Promotes the single highest-priority FROZEN pair to WAITING. Called
    /// by the session tick when no stream has other work.
    pub fn unfreeze(&mut self) -> bool {
        if let Some(pair) = self.pairs.iter_mut().find(|p| p.state == PairState::Frozen) {
            pair.state = PairState::Waiting;
            true
        } else {
            false
        }
    }

    pub fn mark_in_progress(&mut self, remote: SocketAddr, transaction_id: TransactionId) {
        if let Some(pair) = self.find_mut(remote) {
            pair.state = PairState::InProgress;
            pair.transaction_id = Some(transaction_id);
            pair.progress_count += 1;
            if pair.progress_count > MAX_PROGRESS {
                pair.state = PairState::Failed;
            }
        }
    }

    /// Transaction-id → pair lookup for a Binding Success response, with the
    /// symmetry check (source must equal the pair's remote address).
    pub fn find_by_transaction(&self, transaction_id: TransactionId, source: SocketAddr) -> Option<SocketAddr> {
        self.pairs
            .iter()
            .find(|p| p.transaction_id == Some(transaction_id) && p.remote.addr() == source)
            .map(|p| p.remote.addr())
    }

    /// Applies a successful Binding response: SUCCESS, appended to `valid`,
    /// success_count incremented. Returns true if this pair just became a
    /// nomination candidate (every third success, controlling side only).
    pub fn handle_success(&mut self, remote: SocketAddr, controlling: bool) -> bool {
        let Some(pair) = self.find_mut(remote) else {
            return false;
        };
        pair.state = PairState::Succeeded;
        pair.transaction_id = None;
        pair.success_count += 1;
        if !self.valid.contains(&remote) {
            self.valid.push(remote);
        }
        controlling && pair.success_count % NOMINATE_EVERY == 0 && !pair.nominated
    }

    pub fn handle_failure(&mut self, remote: SocketAddr) {
        if let Some(pair) = self.find_mut(remote) {
            pair.state = PairState::Failed;
            pair.transaction_id = None;
        }
    }

    /// Highest-priority valid, non-nominated pair — the controlling side's
    /// nomination candidate.
    pub fn best_nomination_candidate(&self) -> Option<SocketAddr> {
        self.valid
            .iter()
            .filter_map(|addr| self.find(*addr))
            .filter(|p| !p.nominated)
            .max_by_key(|p| p.priority)
            .map(|p| p.remote.addr())
    }

    pub fn nominate(&mut self, remote: SocketAddr) {
        if let Some(pair) = self.find_mut(remote) {
            pair.nominated = true;
        }
        self.selected = Some(remote);
    }

    /// Observed nomination on the controlled side: a pair that received a
    /// request carrying USE-CANDIDATE becomes selected.
    pub fn observe_use_candidate(&mut self, remote: SocketAddr) {
        if let Some(pair) = self.find_mut(remote) {
            pair.nominated = true;
        }
        self.selected = Some(remote);
    }

    /// Builds a STUN Binding Request for the given pair per §4.5: USERNAME,
    /// PRIORITY, role attribute + tiebreaker, USE-CANDIDATE if nominating,
    /// MESSAGE-INTEGRITY keyed by the remote password, FINGERPRINT last.
    pub fn build_binding_request(
        &self,
        remote: SocketAddr,
        local_ufrag: &str,
        remote_ufrag: &str,
        remote_password: &[u8],
        controlling: bool,
        tiebreaker: u64,
        use_candidate: bool,
    ) -> Result<(TransactionId, BytesMut)> {
        let pair = self.find(remote).ok_or(Error::MissingField("pair"))?;
        let tid = TransactionId::random();
        let mut msg = Message::build(Class::Request, BINDING, tid)
            .with_attribute(attributes::username(remote_ufrag, local_ufrag))
            .with_attribute(attributes::priority(pair.local.priority));
        msg = if controlling {
            msg.with_attribute(attributes::ice_controlling(tiebreaker))
        } else {
            msg.with_attribute(attributes::ice_controlled(tiebreaker))
        };
        if controlling && use_candidate {
            msg = msg.with_attribute(attributes::use_candidate());
        }
        let mut buf = msg.encode();
        Message::append_message_integrity(&mut buf, remote_password)?;
        Message::append_fingerprint(&mut buf);
        Ok((tid, buf))
    }

    /// Builds a Binding Success response carrying XOR-MAPPED-ADDRESS of the
    /// request's source, keyed by the local password.
    pub fn build_binding_success(
        request_tid: TransactionId,
        source: SocketAddr,
        local_password: &[u8],
    ) -> Result<BytesMut> {
        let msg = Message::build(Class::Success, BINDING, request_tid)
            .with_attribute(attributes::xor_mapped_address(source, &request_tid));
        let mut buf = msg.encode();
        Message::append_message_integrity(&mut buf, local_password)?;
        Message::append_fingerprint(&mut buf);
        Ok(buf)
    }

    pub fn build_role_conflict_error(request_tid: TransactionId) -> BytesMut {
        let msg = Message::build(Class::Error, BINDING, request_tid)
            .with_attribute(attributes::error_code(487, "Role Conflict"));
        msg.encode()
    }

    /// Creates a PEER_REFLEXIVE pair in SUCCESS state for a previously
    /// unseen source address, per "receiving a STUN Binding Request" (§4.5).
    pub fn learn_peer_reflexive(
        &mut self,
        local: Candidate,
        source: SocketAddr,
        wire_priority: u32,
        controlling: bool,
    ) -> SocketAddr {
        let foundation = format!("prflx-{}", source);
        let remote = Candidate::peer_reflexive(foundation, source, wire_priority);
        self.add_pair(local, remote, controlling, true)
    }

    pub fn remote_kind(&self, remote: SocketAddr) -> Option<CandidateKind> {
        self.find(remote).map(|p| p.remote_kind())
    }
}

impl Default for Checklist {
    fn default() -> Self {
        Self::new()
    }
}

pub fn recompute_pair_priority(local_priority: u32, remote_priority: u32, controlling: bool) -> u64 {
    pair_priority(local_priority, remote_priority, controlling)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::candidate::DEFAULT_LOCAL_PREFERENCE;

    fn local() -> Candidate {
        Candidate::host("f-local", "203.0.113.1:9".parse().unwrap(), DEFAULT_LOCAL_PREFERENCE)
    }

    #[test]
    fn first_pair_starts_waiting_rest_start_frozen() {
        let mut cl = Checklist::new();
        let a = cl.add_pair(local(), Candidate::peer_reflexive("r1", "198.51.100.1:9".parse().unwrap(), 1000), true, false);
        let b = cl.add_pair(local(), Candidate::peer_reflexive("r2", "198.51.100.2:9".parse().unwrap(), 2000), true, false);
        assert_eq!(cl.find(a).unwrap().state, PairState::Waiting);
        assert_eq!(cl.find(b).unwrap().state, PairState::Frozen);
    }

    #[test]
    fn unfreeze_promotes_highest_priority_frozen() {
        let mut cl = Checklist::new();
        cl.add_pair(local(), Candidate::peer_reflexive("r1", "198.51.100.1:9".parse().unwrap(), 1000), true, false);
        let b = cl.add_pair(local(), Candidate::peer_reflexive("r2", "198.51.100.2:9".parse().unwrap(), 5000), true, false);
        assert_eq!(cl.find(b).unwrap().state, PairState::Frozen);
        assert!(cl.unfreeze());
        assert_eq!(cl.find(b).unwrap().state, PairState::Waiting);
    }

    #[test]
    fn nomination_candidate_needs_three_successes() {
        let mut cl = Checklist::new();
        let a = cl.add_pair(local(), Candidate::peer_reflexive("r1", "198.51.100.1:9".parse().unwrap(), 1000), true, false);
        assert!(!cl.handle_success(a, true));
        assert!(!cl.handle_success(a, true));
        assert!(cl.handle_success(a, true));
    }
}
