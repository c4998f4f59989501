//! Well-known mutable pointer keys. Everything else in a destination is
//! content-addressed and immutable.

/// Latest completed backup generation.
pub const HEAD: &str = "head";

/// In-progress backup checkpoint, deleted on successful completion.
pub const PROGRESS: &str = "progress";

/// Newest pack index entry in the pack aggregator chain.
pub const PACK_HEAD: &str = "packhead";
