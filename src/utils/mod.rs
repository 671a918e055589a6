//! Utility modules.

pub mod file;
pub mod vector;

pub use file::{calculate_checksum, sync_dir, write_atomic};
pub use vector::{dot, f32s_from_le_bytes, f32s_to_le_bytes, l2_norm, normalize_in_place};
