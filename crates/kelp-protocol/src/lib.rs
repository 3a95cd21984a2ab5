pub mod block_record;
pub mod bytes;
pub mod coin;
pub mod coin_record;
pub mod coin_spend;
pub mod program;
pub mod spend_bundle;

pub use block_record::*;
pub use bytes::*;
pub use coin::*;
pub use coin_record::*;
pub use coin_spend::*;
pub use program::*;
pub use spend_bundle::*;
