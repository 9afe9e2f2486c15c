use anyhow::Result;

use types::block::Block;

use crate::constants::{DIFFICULTY_WINDOW, TARGET_BLOCK_TIME};

/// Required difficulty for the child of `parent`, retargeted every block
/// from a sliding window of `DIFFICULTY_WINDOW` timestamps.
///
/// `ancestor` must resolve a height to the ancestor of `parent` at that
/// height by walking `prev_hash` links, not the canonical index, so the
/// result is correct for side chains too.
pub fn next_required_difficulty<F>(parent: Option<&Block>, ancestor: F) -> Result<u64>
where
    F: Fn(u64) -> Result<Block>,
{
    let parent = match parent {
        Some(parent) => parent,
        None => return Ok(1),
    };

    // Constant difficulty until a full window of history exists.
    if parent.height() < DIFFICULTY_WINDOW {
        return Ok(parent.header.difficulty);
    }

    let first_height = parent.height() - DIFFICULTY_WINDOW + 1;
    let first = ancestor(first_height)?;

    let actual = parent
        .header
        .timestamp
        .saturating_sub(first.header.timestamp)
        .max(1);
    let target = TARGET_BLOCK_TIME * DIFFICULTY_WINDOW;

    // Widen to u128 so the multiply cannot overflow, then clamp into u64.
    let next = (parent.header.difficulty as u128 * target as u128) / actual as u128;
    Ok(next.clamp(1, u64::MAX as u128) as u64)
}

#[cfg(test)]
mod tests {
    use types::block::BlockHeader;
    use types::Hash;

    use super::*;

    /// Chain of `count` headers spaced `spacing` seconds apart, all at the
    /// given difficulty.
    fn build_chain(count: u64, spacing: u64, difficulty: u64) -> Vec<Block> {
        (0..count)
            .map(|height| {
                let header = BlockHeader {
                    version: 1,
                    height,
                    timestamp: 1_700_000_000 + height * spacing,
                    prev_hash: Hash::ZERO,
                    merkle_root: Hash::ZERO,
                    difficulty,
                    nonce: 0,
                };
                Block {
                    header,
                    transactions: Vec::new(),
                    hash: header.hash(),
                    pow_hash: Hash::ZERO,
                }
            })
            .collect()
    }

    fn lookup(chain: &[Block]) -> impl Fn(u64) -> Result<Block> + '_ {
        |height| {
            chain
                .get(height as usize)
                .cloned()
                .ok_or_else(|| anyhow::anyhow!("no block at height {height}"))
        }
    }

    #[test]
    fn no_parent_defaults_to_one() {
        let next =
            next_required_difficulty(None, |_| anyhow::bail!("unreachable")).unwrap();
        assert_eq!(next, 1);
    }

    #[test]
    fn constant_before_full_window() {
        let chain = build_chain(DIFFICULTY_WINDOW, 3600, 1000);
        let parent = chain.last().unwrap();
        // parent.height == 23 < window, no retarget yet
        let next = next_required_difficulty(Some(parent), lookup(&chain)).unwrap();
        assert_eq!(next, 1000);
    }

    /// Pins the window span: parent's timestamp is adjusted so the wall
    /// time between the window-start block and the parent is exactly
    /// `span` seconds.
    fn with_window_span(mut chain: Vec<Block>, span: u64) -> Vec<Block> {
        let parent_height = chain.len() as u64 - 1;
        let first_height = (parent_height - DIFFICULTY_WINDOW + 1) as usize;
        let first_ts = chain[first_height].header.timestamp;
        chain.last_mut().unwrap().header.timestamp = first_ts + span;
        chain
    }

    #[test]
    fn on_target_window_keeps_difficulty() {
        let target = TARGET_BLOCK_TIME * DIFFICULTY_WINDOW;
        let chain = with_window_span(build_chain(DIFFICULTY_WINDOW + 2, 3600, 1000), target);
        let parent = chain.last().unwrap();
        let next = next_required_difficulty(Some(parent), lookup(&chain)).unwrap();
        assert_eq!(next, 1000);
    }

    #[test]
    fn half_window_doubles_difficulty() {
        let target = TARGET_BLOCK_TIME * DIFFICULTY_WINDOW;
        let chain =
            with_window_span(build_chain(DIFFICULTY_WINDOW + 2, 3600, 1000), target / 2);
        let parent = chain.last().unwrap();
        let next = next_required_difficulty(Some(parent), lookup(&chain)).unwrap();
        assert_eq!(next, 2000);
    }

    #[test]
    fn double_window_halves_difficulty() {
        let target = TARGET_BLOCK_TIME * DIFFICULTY_WINDOW;
        let chain =
            with_window_span(build_chain(DIFFICULTY_WINDOW + 2, 3600, 1000), target * 2);
        let parent = chain.last().unwrap();
        let next = next_required_difficulty(Some(parent), lookup(&chain)).unwrap();
        assert_eq!(next, 500);
    }

    #[test]
    fn clamps_to_minimum_one() {
        // Difficulty zero chains converge to one once the window opens.
        let chain = build_chain(DIFFICULTY_WINDOW + 2, TARGET_BLOCK_TIME, 0);
        let parent = chain.last().unwrap();
        let next = next_required_difficulty(Some(parent), lookup(&chain)).unwrap();
        assert_eq!(next, 1);
    }
}
