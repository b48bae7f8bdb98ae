use stun::TransactionId;

use crate::candidate::{Candidate, CandidateKind};

/// FROZEN is not part of the teacher's (or the ezk-ice reference's) state
/// machine — both start every pair at WAITING and rely on a pacing timer
/// plus a triggered-check queue instead. It is added here so a stream with
/// many remote candidates doesn't fire a connectivity check against all of
/// them simultaneously: see `Checklist::unfreeze`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PairState {
    Frozen,
    Waiting,
    InProgress,
    Succeeded,
    Failed,
}

#[derive(Clone, Debug, PartialEq)]
pub struct CandidatePair {
    pub local: Candidate,
    pub remote: Candidate,
    pub state: PairState,
    pub nominated: bool,
    pub priority: u64,
    pub transaction_id: Option<TransactionId>,
    pub success_count: u32,
    pub progress_count: u32,
}

impl CandidatePair {
    pub fn new(local: Candidate, remote: Candidate, controlling: bool, initial_state: PairState) -> Self {
        let priority = pair_priority(local.priority, remote.priority, controlling);
        CandidatePair {
            local,
            remote,
            state: initial_state,
            nominated: false,
            priority,
            transaction_id: None,
            success_count: 0,
            progress_count: 0,
        }
    }

    pub fn recompute_priority(&mut self, controlling: bool) {
        self.priority = pair_priority(self.local.priority, self.remote.priority, controlling);
    }

    /// Two pairs are redundant when they share a remote address+port; in
    /// multiplexing mode the local side is always the single host candidate,
    /// so remote address+port alone identifies a duplicate path.
    pub fn is_redundant_with(&self, other: &CandidatePair) -> bool {
        self.remote.addr() == other.remote.addr()
    }

    pub fn remote_kind(&self) -> CandidateKind {
        self.remote.kind
    }
}

/// RFC 8445 §6.1.2.3 / §5.7.2: `(2^32-1)*min(G,D) + 2*max(G,D) + (G>D ? 1 : 0)`,
/// with G the controlling agent's priority and D the controlled agent's.
pub fn pair_priority(local_priority: u32, remote_priority: u32, controlling: bool) -> u64 {
    let (g, d) = if controlling {
        (local_priority as u64, remote_priority as u64)
    } else {
        (remote_priority as u64, local_priority as u64)
    };
    let min = g.min(d);
    let max = g.max(d);
    ((1u64 << 32) - 1) * min + 2 * max + if g > d { 1 } else { 0 }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::candidate::DEFAULT_LOCAL_PREFERENCE;

    #[test]
    fn controlling_uses_local_as_g() {
        let local = Candidate::host("f1", "203.0.113.1:9".parse().unwrap(), DEFAULT_LOCAL_PREFERENCE);
        let remote = Candidate::peer_reflexive("f2", "198.51.100.1:9".parse().unwrap(), 1_000);
        let pair = CandidatePair::new(local, remote, true, PairState::Waiting);
        assert!(pair.priority > 0);
    }

    #[test]
    fn symmetric_priority_formula() {
        let p1 = pair_priority(100, 200, true);
        let p2 = pair_priority(200, 100, false);
        assert_eq!(p1, p2);
    }
}
