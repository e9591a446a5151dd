//! Ownership bookkeeping for the cross-reference pass.

use crate::models::CustomModel;
use std::cmp::Ordering;
use std::collections::HashMap;

/// Ownership state of one resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Claim {
    Unclaimed,
    ClaimedBy(String),
}

/// Result of trying to claim a resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClaimOutcome {
    /// The resource was unclaimed and now belongs to the caller.
    Granted,
    /// The caller already owned it.
    AlreadyOwned,
    /// Another owner holds it.
    HeldBy(String),
    /// No such resource exists in the snapshot.
    Absent,
}

/// Claim state for every resource of one kind, keyed by resource id.
///
/// Resources never leave the table; ownership is recorded beside the
/// snapshot rather than by removing entries from it.
#[derive(Debug, Clone, Default)]
pub struct ClaimTable {
    claims: HashMap<String, Claim>,
}

impl ClaimTable {
    pub fn new<'a>(ids: impl IntoIterator<Item = &'a str>) -> Self {
        Self {
            claims: ids
                .into_iter()
                .map(|id| (id.to_string(), Claim::Unclaimed))
                .collect(),
        }
    }

    pub fn owner(&self, id: &str) -> Option<&str> {
        match self.claims.get(id) {
            Some(Claim::ClaimedBy(owner)) => Some(owner.as_str()),
            _ => None,
        }
    }

    pub fn claim(&mut self, id: &str, owner: &str) -> ClaimOutcome {
        match self.claims.get_mut(id) {
            None => ClaimOutcome::Absent,
            Some(Claim::ClaimedBy(current)) if current.as_str() == owner => {
                ClaimOutcome::AlreadyOwned
            }
            Some(Claim::ClaimedBy(current)) => ClaimOutcome::HeldBy(current.clone()),
            Some(slot @ Claim::Unclaimed) => {
                *slot = Claim::ClaimedBy(owner.to_string());
                ClaimOutcome::Granted
            }
        }
    }

    pub fn is_unclaimed(&self, id: &str) -> bool {
        matches!(self.claims.get(id), Some(Claim::Unclaimed))
    }
}

/// Deterministic processing order for contested ownership.
///
/// Dated models come first, oldest first; undated models follow. Ties are
/// broken by id so the order never depends on how a store listed them.
pub fn ownership_order(a: &CustomModel, b: &CustomModel) -> Ordering {
    match (a.creation_date, b.creation_date) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
    .then_with(|| a.id.cmp(&b.id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::DateTime;

    #[test]
    fn test_claim_lifecycle() {
        let mut table = ClaimTable::new(["b1", "b2"]);
        assert!(table.is_unclaimed("b1"));
        assert_eq!(table.claim("b1", "m1"), ClaimOutcome::Granted);
        assert_eq!(table.claim("b1", "m1"), ClaimOutcome::AlreadyOwned);
        assert_eq!(table.claim("b1", "m2"), ClaimOutcome::HeldBy("m1".into()));
        assert_eq!(table.claim("b3", "m1"), ClaimOutcome::Absent);
        assert_eq!(table.owner("b1"), Some("m1"));
        assert_eq!(table.owner("b2"), None);
        assert!(table.is_unclaimed("b2"));
    }

    #[test]
    fn test_ownership_order() {
        let mut old = CustomModel::new("t", "a", "en", "fr", "en-fr");
        old.id = "z".into();
        old.creation_date = DateTime::from_timestamp(100, 0);
        let mut new = CustomModel::new("t", "b", "en", "fr", "en-fr");
        new.id = "a".into();
        new.creation_date = DateTime::from_timestamp(200, 0);
        let mut undated = CustomModel::new("t", "c", "en", "fr", "en-fr");
        undated.id = "0".into();
        undated.creation_date = None;

        let mut models = vec![undated.clone(), new.clone(), old.clone()];
        models.sort_by(ownership_order);
        let ids: Vec<_> = models.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["z", "a", "0"]);
    }
}
