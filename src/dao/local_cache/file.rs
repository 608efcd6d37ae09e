use std::{
    fmt::Write as _,
    fs,
    io::{ErrorKind, Write as _},
    path::{Path, PathBuf},
};

use tempfile::NamedTempFile;

use super::{
    LocalCache,
    error::{CacheError, CacheResult},
};

/// Durable cache backend storing one file per key under a directory.
///
/// Keys are escaped into file names: ASCII alphanumerics, `-` and `_` are
/// kept, every other byte becomes `%XX`.
#[derive(Debug, Clone)]
pub struct FileCache {
    root: PathBuf,
}

impl FileCache {
    /// Open (and create if needed) the cache directory.
    pub fn open(root: impl Into<PathBuf>) -> CacheResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|source| CacheError::Prepare {
            path: root.clone(),
            source,
        })?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(format!("{}.json", escape_key(key)))
    }
}

impl LocalCache for FileCache {
    fn get(&self, key: &str) -> CacheResult<Option<String>> {
        match fs::read_to_string(self.path_for(key)) {
            Ok(value) => Ok(Some(value)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(source) => Err(CacheError::Read {
                key: key.to_owned(),
                source,
            }),
        }
    }

    fn set(&self, key: &str, value: &str) -> CacheResult<()> {
        let write_error = |source: std::io::Error| CacheError::Write {
            key: key.to_owned(),
            source,
        };
        // Each writer stages into its own file so concurrent sets of one key
        // never share a staging path.
        let mut staging = NamedTempFile::new_in(&self.root).map_err(write_error)?;
        staging.write_all(value.as_bytes()).map_err(write_error)?;
        staging
            .persist(self.path_for(key))
            .map(|_| ())
            .map_err(|err| write_error(err.error))
    }

    fn remove(&self, key: &str) -> CacheResult<()> {
        match fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(source) => Err(CacheError::Write {
                key: key.to_owned(),
                source,
            }),
        }
    }
}

fn escape_key(key: &str) -> String {
    let mut escaped = String::with_capacity(key.len());
    for byte in key.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'-' || byte == b'_' {
            escaped.push(char::from(byte));
        } else {
            let _ = write!(escaped, "%{byte:02X}");
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_separators_and_unicode() {
        assert_eq!(escape_key("event_k3x9"), "event_k3x9");
        assert_eq!(escape_key("device:a/b"), "device%3Aa%2Fb");
        assert_eq!(escape_key("é"), "%C3%A9");
    }

    #[test]
    fn stores_and_removes_entries() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FileCache::open(dir.path().join("cache")).unwrap();

        assert_eq!(cache.get("event_a").unwrap(), None);
        cache.set("event_a", "{\"title\":\"A\"}").unwrap();
        assert_eq!(cache.get("event_a").unwrap().as_deref(), Some("{\"title\":\"A\"}"));

        let reopened = FileCache::open(cache.root()).unwrap();
        assert!(reopened.get("event_a").unwrap().is_some());

        reopened.remove("event_a").unwrap();
        reopened.remove("event_a").unwrap();
        assert_eq!(cache.get("event_a").unwrap(), None);
    }

    #[test]
    fn concurrent_writers_to_one_key_all_succeed() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FileCache::open(dir.path()).unwrap();

        let values: Vec<String> = (0..8).map(|n| format!("{{\"n\":{n}}}")).collect();
        std::thread::scope(|scope| {
            let writers: Vec<_> = values
                .iter()
                .map(|value| {
                    let cache = &cache;
                    scope.spawn(move || {
                        for _ in 0..20 {
                            cache.set("event_shared", value)?;
                        }
                        Ok::<_, CacheError>(())
                    })
                })
                .collect();
            for writer in writers {
                writer.join().unwrap().unwrap();
            }
        });

        let stored = cache.get("event_shared").unwrap().unwrap();
        assert!(values.contains(&stored));
        let entries = fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(entries, 1, "no staging files left behind");
    }
}
