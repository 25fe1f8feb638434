//! Relation-set reconciliation as a pure function.
//!
//! A recipe's join rows must end up mirroring the latest document exactly.
//! Instead of wiping and re-inserting every row on each import, the loader
//! computes the minimal delta between what is stored and what is wanted and
//! applies it inside the recipe's transaction.

/// Rows to delete (by handle) and keys to insert.
#[derive(Debug, Clone, PartialEq)]
pub struct RelationDiff<R, K> {
    pub to_add: Vec<K>,
    pub to_remove: Vec<R>,
}

impl<R, K> RelationDiff<R, K> {
    pub fn is_empty(&self) -> bool {
        self.to_add.is_empty() && self.to_remove.is_empty()
    }

    pub fn len(&self) -> usize {
        self.to_add.len() + self.to_remove.len()
    }
}

/// Multiset difference between stored rows `(handle, key)` and the desired keys.
///
/// Each desired key consumes at most one stored row with an equal key, so
/// duplicated lines (the same item listed twice) survive as two rows. Applying
/// the result to `current` yields exactly `desired` as a multiset.
pub fn reconcile<R: Clone, K: PartialEq + Clone>(current: &[(R, K)], desired: &[K]) -> RelationDiff<R, K> {
    let mut matched = vec![false; current.len()];
    let mut to_add = Vec::new();

    for want in desired {
        let hit = (0..current.len()).find(|&i| !matched[i] && current[i].1 == *want);
        match hit {
            Some(i) => matched[i] = true,
            None => to_add.push(want.clone()),
        }
    }

    let to_remove = current
        .iter()
        .zip(matched)
        .filter(|(_, kept)| !kept)
        .map(|((handle, _), _)| handle.clone())
        .collect();

    RelationDiff { to_add, to_remove }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_sets_need_nothing() {
        let diff = reconcile(&[(1, "a"), (2, "b")], &["b", "a"]);
        assert!(diff.is_empty());
    }

    #[test]
    fn shrinking_removes_the_dropped_row() {
        let diff = reconcile(&[(10, "smelter"), (11, "foundry")], &["smelter"]);
        assert!(diff.to_add.is_empty());
        assert_eq!(diff.to_remove, vec![11]);
    }

    #[test]
    fn changed_key_is_remove_plus_add() {
        let current = [(1, ("ore", 30.0)), (2, ("ingot", 30.0))];
        let diff = reconcile(&current, &[("ore", 45.0), ("ingot", 30.0)]);
        assert_eq!(diff.to_add, vec![("ore", 45.0)]);
        assert_eq!(diff.to_remove, vec![1]);
        assert_eq!(diff.len(), 2);
    }

    #[test]
    fn duplicates_are_counted() {
        let diff = reconcile(&[(1, "ore")], &["ore", "ore"]);
        assert_eq!(diff.to_add, vec!["ore"]);
        assert!(diff.to_remove.is_empty());

        let diff = reconcile(&[(1, "ore"), (2, "ore")], &["ore"]);
        assert_eq!(diff.to_remove, vec![2]);
    }

    #[test]
    fn empty_desired_clears_everything() {
        let diff = reconcile(&[(1, "a"), (2, "b")], &[]);
        assert_eq!(diff.to_remove, vec![1, 2]);
    }
}
