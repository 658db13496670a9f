use crate::{
    hash_with_prefix,
    pow::{meets_difficulty, CancelToken},
    Block,
};
use rayon::prelude::*;
use tracing::info;

/// Mines a block by searching nonces in parallel until the hash carries
/// `difficulty` leading hex zeros. Returns `None` if `cancel` fires first.
///
/// The winning nonce is whichever worker finds one first, so it need not be
/// the smallest one.
pub fn mine_block_parallel(block: Block, difficulty: usize, cancel: &CancelToken) -> Option<Block> {
    let prefix = block.hash_preimage_prefix();

    // Rayon splits the nonce range across threads; a cancelled search makes
    // every worker stop at its next attempt.
    let found = (block.nonce..u64::MAX).into_par_iter().find_any(|nonce| {
        cancel.is_cancelled() || meets_difficulty(&hash_with_prefix(&prefix, *nonce), difficulty)
    })?;

    let hash = hash_with_prefix(&prefix, found);
    if !meets_difficulty(&hash, difficulty) {
        return None;
    }

    info!(index = block.index, nonce = found, %hash, "mined block");

    Some(Block {
        nonce: found,
        hash,
        ..block
    })
}
