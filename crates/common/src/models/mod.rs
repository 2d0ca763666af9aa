//! Domain models

pub mod labels;
pub mod paper;

pub use labels::{AttackType, Focus};
pub use paper::{Paper, PaperField, PaperSnapshot, MAX_AUTHORS};
