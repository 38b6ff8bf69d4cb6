use std::collections::HashSet;

/// Maps entries onto ensemble slots: entry `e` goes to the `write_quorum`
/// consecutive slots starting at `e mod ensemble_size`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoundRobinSchedule {
    ensemble_size: usize,
    write_quorum: usize,
    ack_quorum: usize,
}

impl RoundRobinSchedule {
    /// Callers validate `1 <= ack <= write <= ensemble` beforehand.
    pub fn new(ensemble_size: usize, write_quorum: usize, ack_quorum: usize) -> Self {
        Self {
            ensemble_size,
            write_quorum,
            ack_quorum,
        }
    }

    pub fn ensemble_size(&self) -> usize {
        self.ensemble_size
    }

    pub fn write_quorum(&self) -> usize {
        self.write_quorum
    }

    pub fn ack_quorum(&self) -> usize {
        self.ack_quorum
    }

    pub fn write_set(&self, entry_id: i64) -> Vec<usize> {
        let start = (entry_id.max(0) as u64 % self.ensemble_size as u64) as usize;
        (0..self.write_quorum)
            .map(|offset| (start + offset) % self.ensemble_size)
            .collect()
    }

    pub fn has_entry(&self, entry_id: i64, slot: usize) -> bool {
        self.write_set(entry_id).contains(&slot)
    }

    /// Tracker for one entry's write or read responses.
    pub fn ack_set(&self) -> AckSet {
        AckSet::new(self.write_quorum, self.ack_quorum)
    }

    /// True when the responding slots intersect every possible ack quorum:
    /// each write set has fewer than `ack_quorum` slots that did not respond.
    pub fn covered_by(&self, responded: &HashSet<usize>) -> bool {
        (0..self.ensemble_size).all(|start| {
            let missing = (0..self.write_quorum)
                .map(|offset| (start + offset) % self.ensemble_size)
                .filter(|slot| !responded.contains(slot))
                .count();
            missing < self.ack_quorum
        })
    }
}

/// Counts distinct successes and failures among `members` responders.
/// Satisfied at `required` successes; unreachable once more than
/// `members - required` have failed.
#[derive(Debug, Clone)]
pub struct AckSet {
    members: usize,
    required: usize,
    acked: HashSet<usize>,
    failed: HashSet<usize>,
}

impl AckSet {
    pub fn new(members: usize, required: usize) -> Self {
        Self {
            members,
            required,
            acked: HashSet::new(),
            failed: HashSet::new(),
        }
    }

    /// Records a success; returns whether the quorum is now met.
    pub fn complete(&mut self, slot: usize) -> bool {
        if !self.failed.contains(&slot) {
            self.acked.insert(slot);
        }
        self.is_satisfied()
    }

    /// Records a failure; returns whether the quorum can still be met.
    pub fn fail(&mut self, slot: usize) -> bool {
        if !self.acked.contains(&slot) {
            self.failed.insert(slot);
        }
        self.can_still_satisfy()
    }

    pub fn is_satisfied(&self) -> bool {
        self.acked.len() >= self.required
    }

    pub fn can_still_satisfy(&self) -> bool {
        self.members.saturating_sub(self.failed.len()) >= self.required
    }

    pub fn acked(&self) -> usize {
        self.acked.len()
    }

    pub fn failed(&self) -> usize {
        self.failed.len()
    }

    pub fn outstanding(&self) -> usize {
        self.members
            .saturating_sub(self.acked.len() + self.failed.len())
    }
}
