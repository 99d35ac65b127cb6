pub mod consolidate;
pub mod sync;
pub mod write_tree;
