pub use kelp_consensus as consensus;
pub use kelp_mempool as mempool;
pub use kelp_protocol as protocol;
