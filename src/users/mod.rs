//! User accounts stored across the two shards.
//!
//! - `UserService`: register and authenticate, hashing with Argon2id
//! - `UserStore`: shard-aware persistence, implemented by `ShardedUserStore`
//! - `UserConnection`: the queries a pooled connection must answer

mod password;
mod service;
mod store;
mod types;

pub use password::{hash_password, verify_password, PasswordError};
pub use service::{UserError, UserService};
pub use store::{ShardedUserStore, StoreError, UserConnection, UserStore};
pub use types::{AuthResponse, CreateUserRequest, CreatedUser, LoginRequest, NewUser};
