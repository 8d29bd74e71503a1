mod outcome_key;
mod owner_id;
mod session_id;
mod wallet_address;

pub use outcome_key::OutcomeKey;
pub use owner_id::{OwnerId, OwnerIdGenerator};
pub use session_id::{SessionId, DEFAULT_SUFFIX_DELIMITERS};
pub use wallet_address::WalletAddress;
