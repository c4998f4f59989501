//! Several named sources presented as one tree.
//!
//! Paths gain a `group:` prefix, so `photos:2024/img.jpg` routes to
//! the member registered as `photos`. Enumeration fans out across
//! member sources on scoped threads; the shared callback is serialized
//! behind a mutex.

use std::sync::Mutex;
use std::thread;

use crate::cancel::CancelToken;
use crate::entry::FileEntry;
use crate::error::{CairnError, Result};
use crate::source::Source;
use crate::stream::{ReadProcess, WriteProcess};

#[derive(Default)]
pub struct GroupedSource {
    groups: Vec<(String, Box<dyn Source>)>,
}

impl GroupedSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, name: impl Into<String>, source: Box<dyn Source>) {
        self.groups.push((name.into(), source));
    }

    fn resolve<'p>(&self, path: &'p str) -> Result<(&dyn Source, &'p str)> {
        let (group, rest) = path
            .split_once(':')
            .ok_or_else(|| CairnError::UnknownGroup(path.to_string()))?;
        let source = self
            .groups
            .iter()
            .find(|(name, _)| name == group)
            .map(|(_, source)| source.as_ref())
            .ok_or_else(|| CairnError::UnknownGroup(group.to_string()))?;
        Ok((source, rest))
    }
}

impl Source for GroupedSource {
    fn enumerate(
        &self,
        cancel: &CancelToken,
        on_file: &mut (dyn FnMut(FileEntry) -> Result<()> + Send),
    ) -> Result<()> {
        let shared = Mutex::new(on_file);
        thread::scope(|scope| {
            let mut handles = Vec::with_capacity(self.groups.len());
            for (name, source) in &self.groups {
                let shared = &shared;
                handles.push(scope.spawn(move || -> Result<()> {
                    let mut deliver = |mut entry: FileEntry| -> Result<()> {
                        entry.path = format!("{}:{}", name, entry.path);
                        let mut on_file = shared.lock().unwrap();
                        (*on_file)(entry)
                    };
                    source.enumerate(cancel, &mut deliver)
                }));
            }
            for handle in handles {
                handle
                    .join()
                    .map_err(|_| {
                        CairnError::Other("group enumeration thread panicked".to_string())
                    })??;
            }
            Ok(())
        })
    }

    fn metadata(&self, path: &str) -> Result<Option<FileEntry>> {
        let (source, rest) = self.resolve(path)?;
        Ok(source.metadata(rest)?.map(|mut entry| {
            entry.path = path.to_string();
            entry
        }))
    }

    fn read_file(&self, path: &str, process: ReadProcess<'_>) -> Result<()> {
        let (source, rest) = self.resolve(path)?;
        source.read_file(rest, process)
    }

    fn write_file(&self, entry: &FileEntry, process: WriteProcess<'_>) -> Result<()> {
        let (source, rest) = self.resolve(&entry.path)?;
        let mut inner = entry.clone();
        inner.path = rest.to_string();
        source.write_file(&inner, process)
    }
}
