/// Blocks that must be mined on top of a coinbase before it can be spent.
/// Roughly a day at the one-hour target.
pub const COINBASE_MATURITY: u64 = 24;

/// Whether outputs minted at `output_height` are spendable at
/// `current_height`. A coinbase mined at height 10 unlocks at height 34.
pub fn is_mature(output_height: u64, current_height: u64) -> bool {
    if current_height < output_height {
        return false;
    }
    current_height - output_height >= COINBASE_MATURITY
}
