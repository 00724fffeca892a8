//! Pure derivations of whitelist and ownership state from event logs.

use std::collections::BTreeMap;

use crate::{
    chain::{TransferEvent, WhitelistUpdate},
    types::Address,
};

/// Owner address -> strictly ascending token ids.
pub type Holdings = BTreeMap<Address, Vec<u128>>;

/// Replay whitelist updates in the given (log) order; the last update for
/// an address decides its membership. Returns members sorted ascending.
pub fn fold_whitelist(updates: &[WhitelistUpdate]) -> Vec<Address> {
    let mut status: BTreeMap<Address, bool> = BTreeMap::new();
    for update in updates {
        status.insert(update.user, update.added);
    }
    status
        .into_iter()
        .filter_map(|(user, added)| added.then_some(user))
        .collect()
}

/// Replay mint transfers (single and batch, merged by log position) into a
/// token -> owner map, later events winning, then group ids by owner.
/// Transfers that are not mints are ignored.
pub fn fold_holders(singles: &[TransferEvent], batches: &[TransferEvent]) -> Holdings {
    let mut mints: Vec<&TransferEvent> = singles
        .iter()
        .chain(batches.iter())
        .filter(|e| e.is_mint())
        .collect();
    // Stable: equal positions keep single-before-batch input order.
    mints.sort_by_key(|e| e.position);

    let mut owners: BTreeMap<u128, Address> = BTreeMap::new();
    for event in mints {
        for id in &event.ids {
            owners.insert(*id, event.to);
        }
    }

    let mut holdings = Holdings::new();
    for (id, owner) in owners {
        holdings.entry(owner).or_default().push(id);
    }
    holdings
}
