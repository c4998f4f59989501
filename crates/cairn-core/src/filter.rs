//! File predicates deciding what gets backed up and what gets
//! compressed, composable with [`all`].

use crate::entry::FileEntry;

/// Predicate over a candidate file. `true` means keep (back up, or
/// compress, depending on where the predicate is installed).
pub type FilePredicate = Box<dyn Fn(&FileEntry) -> bool + Send + Sync>;

/// Path fragments skipped by the default backup filter, matched
/// case-insensitively anywhere in the path.
pub const DEFAULT_IGNORES: &[&str] = &[
    "node_modules",
    ".git",
    ".svn",
    "thumbs.db",
    "packages",
    "$tf",
    "previews.lrdata",
];

/// Extensions of already-compressed formats where recompression only
/// burns CPU.
pub const INCOMPRESSIBLE_EXTENSIONS: &[&str] = &[
    ".mp2", ".mp3", ".mp4", ".mpg", ".mpeg", ".mpv", ".mpa", ".ogg", ".ogv", ".avi", ".mov",
    ".aac", ".jpg", ".jpeg", ".png", ".docx", ".xlsx", ".pptx", ".bz2", ".7z", ".zip", ".rar",
    ".jar", ".gz",
];

/// Smallest file worth compressing, in bytes.
pub const COMPRESSION_SIZE_FLOOR: u64 = 1024;

pub fn include_all() -> FilePredicate {
    Box::new(|_| true)
}

/// Every predicate must accept the file.
pub fn all(predicates: Vec<FilePredicate>) -> FilePredicate {
    Box::new(move |file| predicates.iter().all(|p| p(file)))
}

pub fn larger_than(minimum_size: u64) -> FilePredicate {
    Box::new(move |file| file.size >= minimum_size)
}

/// Rejects files whose extension (lowercased, dot included) is listed.
pub fn skip_extensions(extensions: &[&str]) -> FilePredicate {
    let extensions: Vec<String> = extensions.iter().map(|e| e.to_lowercase()).collect();
    Box::new(move |file| match extension_of(&file.path) {
        Some(ext) => !extensions.iter().any(|e| *e == ext),
        None => true,
    })
}

/// Rejects files whose path contains any of the fragments,
/// case-insensitively.
pub fn ignore_containing(fragments: Vec<String>) -> FilePredicate {
    let fragments: Vec<String> = fragments.iter().map(|f| f.to_lowercase()).collect();
    Box::new(move |file| {
        let path = file.path.to_lowercase();
        !fragments.iter().any(|f| path.contains(f.as_str()))
    })
}

/// Accepts only paths under the given prefix.
pub fn matching_prefix(prefix: String) -> FilePredicate {
    Box::new(move |file| file.path.starts_with(&prefix))
}

/// Default backup filter: skip well-known cache and VCS directories.
pub fn default_backup_filter() -> FilePredicate {
    ignore_containing(DEFAULT_IGNORES.iter().map(|s| s.to_string()).collect())
}

/// Default compression filter: worth compressing only when the file is
/// at least [`COMPRESSION_SIZE_FLOOR`] and not an already-compressed
/// format.
pub fn default_compression_filter() -> FilePredicate {
    all(vec![
        larger_than(COMPRESSION_SIZE_FLOOR),
        skip_extensions(INCOMPRESSIBLE_EXTENSIONS),
    ])
}

fn extension_of(path: &str) -> Option<String> {
    let name = path.rsplit(['/', '\\']).next()?;
    let dot = name.rfind('.')?;
    Some(name[dot..].to_lowercase())
}
