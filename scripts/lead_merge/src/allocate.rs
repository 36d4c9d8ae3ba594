//! Fair Allocation Module
//!
//! Assigns a consultant to every lead, round-robin by minimum count:
//! each lead goes to the consultant with the fewest leads so far, ties broken
//! by position in the rotation queue. The queue is the enabled roster in
//! configured order, rotated so the first-pick consultant leads.

use crate::types::{Consultant, LeadRecord};
use serde::Serialize;
use tracing::debug;

/// Per-consultant result of one allocation run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConsultantLoad {
    pub name: String,
    pub unit: String,
    pub count: usize,
}

/// Counts per consultant in rotation-queue order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AllocationSummary {
    pub loads: Vec<ConsultantLoad>,
}

impl AllocationSummary {
    /// Difference between the busiest and the least busy consultant
    pub fn spread(&self) -> usize {
        let max = self.loads.iter().map(|l| l.count).max().unwrap_or(0);
        let min = self.loads.iter().map(|l| l.count).min().unwrap_or(0);
        max - min
    }

    pub fn is_even(&self) -> bool {
        self.spread() <= 1
    }

    pub fn count_for(&self, name: &str) -> Option<usize> {
        self.loads.iter().find(|l| l.name == name).map(|l| l.count)
    }
}

/// Enabled consultant names in roster order, first occurrence of each name only
pub fn enabled_names(roster: &[Consultant]) -> Vec<&str> {
    let mut names: Vec<&str> = Vec::new();
    for consultant in roster.iter().filter(|c| c.enabled) {
        if !names.contains(&consultant.name.as_str()) {
            names.push(&consultant.name);
        }
    }
    names
}

/// Unit of a consultant, empty when the name is not on the roster
pub fn unit_for<'a>(roster: &'a [Consultant], name: &str) -> &'a str {
    roster
        .iter()
        .find(|c| c.name == name)
        .map(|c| c.unit.as_str())
        .unwrap_or("")
}

/// Rotation queue: enabled names, rotated so `first_pick` comes first when it is enabled
pub fn rotation_queue<'a>(roster: &'a [Consultant], first_pick: Option<&str>) -> Vec<&'a str> {
    let mut queue = enabled_names(roster);
    if let Some(pick) = first_pick {
        if let Some(idx) = queue.iter().position(|name| *name == pick) {
            queue.rotate_left(idx);
        }
    }
    queue
}

/// Fill `consultant` and `unit` on every record, in order.
///
/// With no enabled consultant the records are left untouched and the summary is empty.
pub fn allocate(
    records: &mut [LeadRecord],
    roster: &[Consultant],
    first_pick: Option<&str>,
) -> AllocationSummary {
    let queue = rotation_queue(roster, first_pick);
    if queue.is_empty() {
        return AllocationSummary::default();
    }

    let mut counts = vec![0usize; queue.len()];

    for record in records.iter_mut() {
        let min = counts.iter().copied().min().unwrap_or(0);
        // earliest queue position among the least loaded
        let slot = counts.iter().position(|&c| c == min).unwrap_or(0);
        counts[slot] += 1;

        let name = queue[slot];
        record.consultant = name.to_string();
        record.unit = unit_for(roster, name).to_string();
    }

    debug!(consultants = queue.len(), records = records.len(), "Allocated leads");

    AllocationSummary {
        loads: queue
            .iter()
            .zip(counts)
            .map(|(name, count)| ConsultantLoad {
                name: name.to_string(),
                unit: unit_for(roster, name).to_string(),
                count,
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roster(names: &[(&str, bool)]) -> Vec<Consultant> {
        names
            .iter()
            .map(|(name, enabled)| Consultant::new(*name, format!("{}组", name), *enabled))
            .collect()
    }

    fn records(n: usize) -> Vec<LeadRecord> {
        (0..n)
            .map(|i| LeadRecord {
                name: format!("客户{}", i),
                phone: format!("1380000{:04}", i),
                ..Default::default()
            })
            .collect()
    }

    #[test]
    fn test_five_records_two_consultants() {
        let roster = roster(&[("A", true), ("B", true)]);
        let mut recs = records(5);
        let summary = allocate(&mut recs, &roster, None);

        assert_eq!(summary.count_for("A"), Some(3));
        assert_eq!(summary.count_for("B"), Some(2));
        let order: Vec<&str> = recs.iter().map(|r| r.consultant.as_str()).collect();
        assert_eq!(order, vec!["A", "B", "A", "B", "A"]);
        assert_eq!(recs[1].unit, "B组");
    }

    #[test]
    fn test_first_pick_rotates_queue() {
        let roster = roster(&[("A", true), ("B", true), ("C", true)]);
        let mut recs = records(4);
        let summary = allocate(&mut recs, &roster, Some("B"));

        let order: Vec<&str> = recs.iter().map(|r| r.consultant.as_str()).collect();
        assert_eq!(order, vec!["B", "C", "A", "B"]);
        let queue: Vec<&str> = summary.loads.iter().map(|l| l.name.as_str()).collect();
        assert_eq!(queue, vec!["B", "C", "A"]);
    }

    #[test]
    fn test_disabled_first_pick_is_ignored() {
        let roster = roster(&[("A", true), ("B", true), ("C", false)]);
        let mut recs = records(3);
        allocate(&mut recs, &roster, Some("C"));
        assert_eq!(recs[0].consultant, "A");
        assert!(recs.iter().all(|r| r.consultant != "C"));
    }

    #[test]
    fn test_fairness_bound_holds() {
        let roster = roster(&[("A", true), ("B", true), ("C", true), ("D", false), ("E", true)]);
        for n in 0..40 {
            for pick in [None, Some("C"), Some("E"), Some("D")] {
                let mut recs = records(n);
                let summary = allocate(&mut recs, &roster, pick);
                assert!(summary.is_even(), "n={} pick={:?} spread={}", n, pick, summary.spread());
                assert_eq!(summary.loads.iter().map(|l| l.count).sum::<usize>(), n);
            }
        }
    }

    #[test]
    fn test_no_enabled_consultants_leaves_records() {
        let roster = roster(&[("A", false)]);
        let mut recs = records(2);
        let summary = allocate(&mut recs, &roster, Some("A"));
        assert!(summary.loads.is_empty());
        assert!(recs.iter().all(|r| r.consultant.is_empty() && r.unit.is_empty()));
    }

    #[test]
    fn test_duplicate_roster_names_count_once() {
        let mut roster = roster(&[("A", true), ("B", true)]);
        roster.push(Consultant::new("A", "别的组", true));
        let mut recs = records(4);
        let summary = allocate(&mut recs, &roster, None);
        assert_eq!(summary.loads.len(), 2);
        assert_eq!(unit_for(&roster, "A"), "A组");
    }

    #[test]
    fn test_allocation_is_deterministic() {
        let roster = roster(&[("A", true), ("B", true), ("C", true)]);
        let mut first = records(11);
        let mut second = records(11);
        allocate(&mut first, &roster, Some("C"));
        allocate(&mut second, &roster, Some("C"));
        assert_eq!(first, second);
    }
}
