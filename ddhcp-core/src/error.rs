use thiserror::Error;

/// Fallible, structurally-meaningful failures raised by the core.
///
/// Per-packet outcomes (NAK, drop, silence) are never modeled as errors —
/// only things that indicate a misconfigured pool or a malformed override.
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("pool geometry invalid: block_size must divide the pool ({pool_size} addresses / {block_size} per block)")]
    IndivisiblePool { pool_size: u64, block_size: u32 },

    #[error("malformed option override {raw:?}: {reason}")]
    MalformedOptionOverride { raw: String, reason: &'static str },

    #[error("block index {index} out of range (pool has {num_blocks} blocks)")]
    BlockOutOfRange { index: u32, num_blocks: u32 },
}
