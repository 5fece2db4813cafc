//! [`UnspentSet`]: the live id→output mapping, with copy-on-fork
//! semantics (§4.5 / §9: a parent-pointer delta chain rather than a deep
//! copy on every state-changing call).

use std::collections::HashSet;
use std::sync::Arc;

use indexmap::IndexMap;

use crate::id::Amount;
use crate::id::OutputId;
use crate::output::Output;

/// Once a delta chain grows past this many links, the next operation
/// flattens it back down into a single root map instead of growing the
/// chain further.
const FLATTEN_THRESHOLD: usize = 32;

#[derive(Debug, Clone)]
enum Repr {
    Root(IndexMap<OutputId, Output>),
    Delta {
        parent: Arc<UnspentSet>,
        added: IndexMap<OutputId, Output>,
        removed: HashSet<OutputId>,
    },
}

/// The set of outputs not yet consumed. Every state-changing operation
/// returns a fresh logical value; the receiver is left untouched, so a
/// caller can hold onto a prior snapshot (e.g. to retry a rejected
/// transaction) without the original state ever being observably mutated.
#[derive(Debug, Clone)]
pub struct UnspentSet {
    repr: Repr,
    total_amount: Amount,
    len: usize,
    depth: usize,
    flatten_threshold: usize,
}

impl UnspentSet {
    /// An empty set, flattening its delta chain past [`FLATTEN_THRESHOLD`]
    /// links.
    pub fn empty() -> Self {
        Self::with_flatten_threshold(FLATTEN_THRESHOLD)
    }

    /// An empty set with a host-chosen flatten threshold, for hosts that
    /// want to trade delta-chain lookup depth against flatten frequency
    /// differently than the default.
    pub fn with_flatten_threshold(flatten_threshold: usize) -> Self {
        Self {
            repr: Repr::Root(IndexMap::new()),
            total_amount: Amount::ZERO,
            len: 0,
            depth: 0,
            flatten_threshold,
        }
    }

    /// Look up an output by id, walking the delta chain back to the root.
    pub fn get(&self, id: &OutputId) -> Option<&Output> {
        match &self.repr {
            Repr::Root(map) => map.get(id),
            Repr::Delta {
                parent,
                added,
                removed,
            } => {
                if let Some(output) = added.get(id) {
                    Some(output)
                } else if removed.contains(id) {
                    None
                } else {
                    parent.get(id)
                }
            }
        }
    }

    pub fn contains(&self, id: &OutputId) -> bool {
        self.get(id).is_some()
    }

    pub fn count(&self) -> usize {
        self.len
    }

    /// Cached total amount across every output in the set. O(1) regardless
    /// of representation: kept up to date on every `add`/`remove`.
    pub fn total_amount(&self) -> Amount {
        self.total_amount
    }

    pub fn output_ids(&self) -> Vec<OutputId> {
        self.materialize().into_keys().collect()
    }

    /// Insert or replace the binding for `output.id`. Ledger-level callers
    /// are expected to have already rejected an `output.id` that collides
    /// with an existing binding (§4.5); calling `add` directly with a
    /// colliding id replaces the existing binding instead of erroring.
    pub fn add(&self, output: Output) -> Self {
        let existing_amount = self.get(&output.id).map(|o| o.amount);
        let mut total = self.total_amount;
        let mut len = self.len;
        if let Some(old_amount) = existing_amount {
            total = total
                .checked_sub(old_amount)
                .expect("unspent total underflow on replace");
        } else {
            len += 1;
        }
        total = total
            .checked_add(output.amount)
            .expect("unspent total overflow");

        let mut added = IndexMap::with_capacity(1);
        added.insert(output.id.clone(), output);
        self.push_delta(added, HashSet::new(), total, len)
    }

    /// Insert every output in `outputs`, in order.
    pub fn add_all(&self, outputs: impl IntoIterator<Item = Output>) -> Self {
        let mut current = self.clone();
        for output in outputs {
            current = current.add(output);
        }
        current
    }

    /// Remove the binding for `id`. A no-op (returns an equivalent clone)
    /// if `id` is absent.
    pub fn remove(&self, id: &OutputId) -> Self {
        match self.get(id) {
            None => self.clone(),
            Some(existing) => {
                let total = self
                    .total_amount
                    .checked_sub(existing.amount)
                    .expect("unspent total underflow");
                let len = self.len - 1;
                let mut removed = HashSet::with_capacity(1);
                removed.insert(id.clone());
                self.push_delta(IndexMap::new(), removed, total, len)
            }
        }
    }

    /// Remove every id in `ids`. Unknown ids are silently skipped.
    pub fn remove_all<'a>(&self, ids: impl IntoIterator<Item = &'a OutputId>) -> Self {
        let mut current = self.clone();
        for id in ids {
            current = current.remove(id);
        }
        current
    }

    pub fn filter(&self, pred: impl Fn(&Output) -> bool) -> Vec<Output> {
        self.materialize()
            .into_values()
            .filter(|o| pred(o))
            .collect()
    }

    /// Outputs locked to `name` via a `Lock::NamedOwner`.
    pub fn owned_by(&self, name: &str) -> Vec<Output> {
        self.filter(|o| matches!(&o.lock, crate::lock::Lock::NamedOwner { name: n } if n == name))
    }

    pub fn total_amount_owned_by(&self, name: &str) -> Amount {
        Amount::sum(self.owned_by(name).iter().map(|o| o.amount)).unwrap_or(Amount::ZERO)
    }

    /// Iterate every (id, output) binding in stable insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (OutputId, Output)> {
        self.materialize().into_iter()
    }

    /// Force the delta chain down into a single root map. Called
    /// automatically once a chain exceeds [`FLATTEN_THRESHOLD`]; exposed so
    /// a long-lived ledger can flatten proactively (e.g. between batches).
    pub fn release(&self) -> Self {
        self.flatten()
    }

    fn flatten(&self) -> Self {
        if matches!(self.repr, Repr::Root(_)) {
            return self.clone();
        }
        Self {
            repr: Repr::Root(self.materialize()),
            total_amount: self.total_amount,
            len: self.len,
            depth: 0,
            flatten_threshold: self.flatten_threshold,
        }
    }

    fn materialize(&self) -> IndexMap<OutputId, Output> {
        let mut out = IndexMap::new();
        self.collect_into(&mut out);
        out
    }

    fn collect_into(&self, out: &mut IndexMap<OutputId, Output>) {
        match &self.repr {
            Repr::Root(map) => {
                for (id, output) in map {
                    out.insert(id.clone(), output.clone());
                }
            }
            Repr::Delta {
                parent,
                added,
                removed,
            } => {
                parent.collect_into(out);
                for id in removed {
                    out.shift_remove(id);
                }
                for (id, output) in added {
                    out.insert(id.clone(), output.clone());
                }
            }
        }
    }

    fn push_delta(
        &self,
        added: IndexMap<OutputId, Output>,
        removed: HashSet<OutputId>,
        total_amount: Amount,
        len: usize,
    ) -> Self {
        let next = Self {
            repr: Repr::Delta {
                parent: Arc::new(self.clone()),
                added,
                removed,
            },
            total_amount,
            len,
            depth: self.depth + 1,
            flatten_threshold: self.flatten_threshold,
        };
        if next.depth > next.flatten_threshold {
            next.flatten()
        } else {
            next
        }
    }
}

impl Default for UnspentSet {
    fn default() -> Self {
        Self::empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id::OutputId;

    fn out(id: &str, amount: u64) -> Output {
        Output::open(Amount::new(amount), Some(OutputId::new(id).unwrap())).unwrap()
    }

    #[test]
    fn add_and_get_roundtrip() {
        let set = UnspentSet::empty().add(out("a", 10));
        assert_eq!(set.get(&OutputId::new("a").unwrap()).unwrap().amount, Amount::new(10));
        assert_eq!(set.count(), 1);
        assert_eq!(set.total_amount(), Amount::new(10));
    }

    #[test]
    fn remove_drops_binding_and_updates_total() {
        let set = UnspentSet::empty().add(out("a", 10)).add(out("b", 5));
        let removed = set.remove(&OutputId::new("a").unwrap());
        assert!(!removed.contains(&OutputId::new("a").unwrap()));
        assert!(removed.contains(&OutputId::new("b").unwrap()));
        assert_eq!(removed.total_amount(), Amount::new(5));
        // The predecessor is untouched.
        assert!(set.contains(&OutputId::new("a").unwrap()));
        assert_eq!(set.total_amount(), Amount::new(15));
    }

    #[test]
    fn remove_unknown_id_is_a_no_op() {
        let set = UnspentSet::empty().add(out("a", 10));
        let same = set.remove(&OutputId::new("missing").unwrap());
        assert_eq!(same.total_amount(), set.total_amount());
        assert_eq!(same.count(), set.count());
    }

    #[test]
    fn flattens_past_threshold_without_changing_contents() {
        let mut set = UnspentSet::empty();
        for i in 0..(FLATTEN_THRESHOLD + 5) {
            set = set.add(out(&format!("o{i}"), 1));
        }
        assert_eq!(set.count(), FLATTEN_THRESHOLD + 5);
        assert_eq!(set.total_amount().get(), (FLATTEN_THRESHOLD + 5) as u64);
    }

    #[test]
    fn custom_flatten_threshold_is_honored() {
        let mut set = UnspentSet::with_flatten_threshold(2);
        for i in 0..5 {
            set = set.add(out(&format!("o{i}"), 1));
        }
        assert_eq!(set.count(), 5);
        for i in 0..5 {
            assert!(set.contains(&OutputId::new(format!("o{i}")).unwrap()));
        }
    }

    #[test]
    fn owned_by_filters_named_owner_locks() {
        let alice = Output::owned_by("alice", Amount::new(10), None).unwrap();
        let bob = Output::owned_by("bob", Amount::new(20), None).unwrap();
        let set = UnspentSet::empty().add(alice.clone()).add(bob);
        let owned = set.owned_by("alice");
        assert_eq!(owned, vec![alice]);
        assert_eq!(set.total_amount_owned_by("alice"), Amount::new(10));
    }

    #[test]
    fn iteration_order_is_stable_insertion_order() {
        let set = UnspentSet::empty().add(out("a", 1)).add(out("b", 2)).add(out("c", 3));
        let ids: Vec<_> = set.iter().map(|(id, _)| id.into_string()).collect();
        assert_eq!(ids, vec!["a".to_string(), "b".to_string(), "c".to_string()]);
    }

    #[test]
    fn predecessor_is_unaffected_by_successor_mutation() {
        let base = UnspentSet::empty().add(out("a", 10));
        let forked = base.add(out("b", 5));
        assert_eq!(base.count(), 1);
        assert_eq!(forked.count(), 2);
        assert!(!base.contains(&OutputId::new("b").unwrap()));
    }
}
