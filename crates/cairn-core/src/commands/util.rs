use crate::destination::{Destination, ReadOptions};
use crate::entry::BackupSetEntry;
use crate::error::Result;
use crate::pipeline::Pipeline;

/// Loads a backup set by key. Sets are written compressed and
/// cache-locally, so reads mirror those options.
pub(crate) fn load_set(
    destination: &dyn Destination,
    pipeline: &Pipeline,
    key: &str,
) -> Result<Option<BackupSetEntry>> {
    match pipeline.read_object(destination, key, ReadOptions::FROM_LOCAL_CACHE, true)? {
        Some(bytes) => Ok(Some(BackupSetEntry::from_bytes(&bytes)?)),
        None => Ok(None),
    }
}
