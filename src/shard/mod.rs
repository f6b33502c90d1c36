//! Static two-way sharding by routing key.
//!
//! Keys starting with `a`..=`m` (case-insensitive) live on the first shard,
//! everything else on the second. The mapping is fixed; there is no
//! rebalancing and no cross-shard coordination.

mod router;
mod set;

pub use router::{RouteError, ShardId, ShardRouter};
pub use set::{ShardPoolStatus, ShardSet};
