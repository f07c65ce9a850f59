pub mod layout;
pub mod partitioner;
pub mod split;

pub use layout::{discover_categories, list_category_files, prepare_layout, Category};
pub use partitioner::{partition, CategoryCounts, CopyRecord, PartitionMode, PartitionReport};
pub use split::{DrawSource, RngDraws, ScriptedDraws, Split, SplitThresholds, DRAW_MAX};
