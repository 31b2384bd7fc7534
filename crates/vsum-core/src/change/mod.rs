pub mod diff;
pub mod echange;

pub use diff::{diff, seeding_batch};
pub use echange::{resequence, ChangeKind, ChangeOp, EChange};
