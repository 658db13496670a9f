//! Balances are never stored; they are replayed from the chain on demand.

use crate::Block;
use serde::Serialize;
use std::collections::BTreeMap;

/// Signed so that replaying an inconsistent history cannot wrap.
pub type Balance = i128;

pub fn balance_of(chain: &[Block], address: &str) -> Balance {
    let mut balance: Balance = 0;
    for tx in chain.iter().flat_map(|b| b.transactions.iter()) {
        if tx.from.as_deref() == Some(address) {
            balance -= tx.amount as Balance;
        }
        if tx.to == address {
            balance += tx.amount as Balance;
        }
    }
    balance
}

/// Every address that appears in the chain with its replayed balance.
pub fn balances(chain: &[Block]) -> BTreeMap<String, Balance> {
    let mut out = BTreeMap::new();
    for tx in chain.iter().flat_map(|b| b.transactions.iter()) {
        if let Some(from) = &tx.from {
            *out.entry(from.clone()).or_insert(0) -= tx.amount as Balance;
        }
        *out.entry(tx.to.clone()).or_insert(0) += tx.amount as Balance;
    }
    out
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Issuance {
    pub total_fauceted: u64,
    pub total_mining_rewards: u64,
}

/// Splits minted coins into mining rewards and faucet grants. A mint is
/// counted as a reward when its amount equals `block_reward`. Totals saturate
/// at `u64::MAX`.
pub fn issuance(chain: &[Block], block_reward: u64) -> Issuance {
    chain
        .iter()
        .skip(1)
        .flat_map(|b| b.transactions.iter())
        .filter(|tx| tx.is_mint())
        .fold(Issuance::default(), |mut acc, tx| {
            if tx.amount == block_reward {
                acc.total_mining_rewards = acc.total_mining_rewards.saturating_add(tx.amount);
            } else {
                acc.total_fauceted = acc.total_fauceted.saturating_add(tx.amount);
            }
            acc
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{chain::genesis_block, testutil::next_block, Transaction};

    fn replay_chain() -> Vec<Block> {
        let genesis = genesis_block();
        let b1 = next_block(&genesis, vec![Transaction::mint("X", 100)], 10_000);
        let b2 = next_block(&b1, vec![Transaction::transfer("X", "Y", 30)], 10_000);
        vec![genesis, b1, b2]
    }

    #[test]
    fn balance_replay() {
        let chain = replay_chain();
        assert_eq!(balance_of(&chain, "X"), 70);
        assert_eq!(balance_of(&chain, "Y"), 30);
        assert_eq!(balance_of(&chain, "Z"), 0);
    }

    #[test]
    fn self_transfer_nets_to_zero() {
        let genesis = genesis_block();
        let b1 = next_block(
            &genesis,
            vec![Transaction::mint("A", 5), Transaction::transfer("A", "A", 5)],
            10_000,
        );
        assert_eq!(balance_of(&[genesis, b1], "A"), 5);
    }

    #[test]
    fn balances_cover_every_address() {
        let all = balances(&replay_chain());
        assert_eq!(all.get("X"), Some(&70));
        assert_eq!(all.get("Y"), Some(&30));
        assert_eq!(all.len(), 2);
    }

    #[test]
    fn issuance_splits_rewards_from_faucet() {
        let genesis = genesis_block();
        let b1 = next_block(
            &genesis,
            vec![Transaction::mint("miner", 10), Transaction::mint("user", 100)],
            10_000,
        );
        let stats = issuance(&[genesis, b1], 10);
        assert_eq!(stats.total_mining_rewards, 10);
        assert_eq!(stats.total_fauceted, 100);
    }

    #[test]
    fn issuance_saturates_instead_of_overflowing() {
        let genesis = genesis_block();
        let b1 = next_block(
            &genesis,
            vec![
                Transaction::mint("whale", u64::MAX - 5),
                Transaction::mint("whale", u64::MAX - 5),
            ],
            10_000,
        );
        let chain = [genesis, b1];
        assert_eq!(issuance(&chain, 10).total_fauceted, u64::MAX);
        assert_eq!(balance_of(&chain, "whale"), 2 * (u64::MAX - 5) as Balance);
    }
}
