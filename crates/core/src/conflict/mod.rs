//! Conflict recording, three-way merging, and resolution.
//!
//! - [`types`] describes what collided and where the variants live.
//! - [`merger`] is the line-based three-way merge.
//! - [`store`] persists conflict records and owns their artifacts.
//! - [`resolver`] applies a [`ConflictChoice`] and runs the prompt loop.

pub mod merger;
pub mod resolver;
pub mod store;
pub mod types;

pub use merger::{ConflictSide, MergeLabels, MergeResult, Merger};
pub use resolver::{
    ConflictResolver, ExternalTools, FixedChoice, NoTools, PromptCommand, PromptOption, Prompter,
};
pub use store::{ConflictStore, TextVariants};
pub use types::{
    ConflictAction, ConflictChoice, ConflictKind, ConflictOperation, ConflictReason,
    ConflictRecord, ConflictVersion, PropertyConflict, TextConflict, TreeConflict,
};
