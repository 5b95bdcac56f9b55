//! Media storage collaborator.
//!
//! Uploaded assets are identified by a public id; the store only keeps the
//! returned url and public id. [`Uploads`] tracks what a request uploaded so
//! that a failed domain write can be compensated.

use crate::error::{Error, Result};
use log::{debug, warn};
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq)]
pub struct Uploaded {
    pub url: String,
    pub public_id: String,
    /// Play length in seconds, when the host can tell.
    pub duration: Option<f64>,
}

pub trait MediaStorage: Send + Sync {
    fn upload(&self, path: &Path) -> Result<Uploaded>;
    fn destroy(&self, public_id: &str) -> Result<()>;
}

/// Stores media as files below `root`, served from `base_url`.
pub struct DirectoryStorage {
    root: PathBuf,
    base_url: String,
}

impl DirectoryStorage {
    pub fn new<P: AsRef<Path>>(root: P, base_url: &str) -> Result<DirectoryStorage> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).map_err(|err| Error::upstream(err, "Media storage error"))?;
        Ok(DirectoryStorage {
            root,
            base_url: base_url.trim_end_matches('/').to_owned(),
        })
    }

    fn new_public_id(source: &Path) -> String {
        let id = Uuid::new_v4();
        match source.extension().and_then(|e| e.to_str()) {
            Some(ext) => format!("{}.{}", id, ext.to_lowercase()),
            None => id.to_string(),
        }
    }

    /// Copies `source` to a new file named `public_id`. Never overwrites.
    fn copy_new(&self, source: &Path, public_id: &str) -> io::Result<()> {
        let target = self.root.join(public_id);
        let mut output = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&target)?;
        let copied = File::open(source).and_then(|mut input| io::copy(&mut input, &mut output));
        if let Err(err) = copied {
            drop(output);
            let _ = fs::remove_file(&target);
            return Err(err);
        }
        Ok(())
    }

    fn path_of(&self, public_id: &str) -> Result<PathBuf> {
        if public_id.is_empty()
            || public_id.starts_with('.')
            || public_id.contains(|c: char| c == '/' || c == '\\')
        {
            return Err(Error::validation("Invalid media id"));
        }
        Ok(self.root.join(public_id))
    }
}

impl MediaStorage for DirectoryStorage {
    fn upload(&self, path: &Path) -> Result<Uploaded> {
        if !path.is_file() {
            return Err(Error::validation(format!(
                "Media file not found: {}",
                path.display()
            )));
        }
        let public_id = Self::new_public_id(path);
        self.copy_new(path, &public_id)
            .map_err(|err| Error::upstream(err, "Media upload failed"))?;
        debug!("Stored media {} from {}", public_id, path.display());
        Ok(Uploaded {
            url: format!("{}/{}", self.base_url, public_id),
            public_id,
            duration: None,
        })
    }

    fn destroy(&self, public_id: &str) -> Result<()> {
        fs::remove_file(self.path_of(public_id)?)
            .map_err(|err| Error::upstream(err, "Media delete failed"))
    }
}

/// Best-effort delete; failures are logged and dropped.
pub fn discard(media: &dyn MediaStorage, public_id: &str) {
    if let Err(err) = media.destroy(public_id) {
        warn!("Could not delete media {}: {:?}", public_id, err);
    }
}

/// Assets uploaded while serving one request.
pub struct Uploads<'a> {
    media: &'a dyn MediaStorage,
    public_ids: Vec<String>,
}

impl<'a> Uploads<'a> {
    pub fn new(media: &'a dyn MediaStorage) -> Uploads<'a> {
        Uploads {
            media,
            public_ids: Vec::new(),
        }
    }

    pub fn upload(&mut self, path: &Path) -> Result<Uploaded> {
        let uploaded = self.media.upload(path)?;
        self.public_ids.push(uploaded.public_id.clone());
        Ok(uploaded)
    }

    /// Runs `write`; if it fails, deletes everything uploaded so far once.
    pub fn commit<T>(self, write: impl FnOnce() -> Result<T>) -> Result<T> {
        let result = write();
        if result.is_err() {
            for public_id in self.public_ids.iter() {
                discard(self.media, public_id);
            }
        }
        result
    }

    /// Deletes everything uploaded so far and returns `err`.
    pub fn abandon<T>(self, err: Error) -> Result<T> {
        self.commit(|| Err(err))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Records calls; destroy always fails.
    #[derive(Default)]
    pub(crate) struct FakeStorage {
        pub uploads: Mutex<Vec<String>>,
        pub destroyed: Mutex<Vec<String>>,
        pub fail_uploads: bool,
    }

    impl MediaStorage for FakeStorage {
        fn upload(&self, path: &Path) -> Result<Uploaded> {
            if self.fail_uploads {
                return Err(Error::upstream("offline", "Media upload failed"));
            }
            let mut uploads = self.uploads.lock().unwrap();
            let public_id = format!("fake-{}", uploads.len());
            uploads.push(public_id.clone());
            Ok(Uploaded {
                url: format!("http://media.test/{}", path.display()),
                public_id,
                duration: Some(42.0),
            })
        }

        fn destroy(&self, public_id: &str) -> Result<()> {
            self.destroyed.lock().unwrap().push(public_id.to_owned());
            Err(Error::upstream("offline", "Media delete failed"))
        }
    }

    fn staged(dir: &TempDir, name: &str) -> PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, b"frames").unwrap();
        path
    }

    #[test]
    fn upload_and_destroy() {
        let staging = TempDir::new().unwrap();
        let root = TempDir::new().unwrap();
        let storage = DirectoryStorage::new(root.path(), "http://cdn.test/media/").unwrap();

        let uploaded = storage.upload(&staged(&staging, "clip.MP4")).unwrap();
        assert!(uploaded.public_id.ends_with(".mp4"));
        assert_eq!(
            uploaded.url,
            format!("http://cdn.test/media/{}", uploaded.public_id)
        );
        assert!(root.path().join(&uploaded.public_id).is_file());

        storage.destroy(&uploaded.public_id).unwrap();
        assert!(!root.path().join(&uploaded.public_id).exists());
    }

    #[test]
    fn public_ids_are_unique() {
        let staging = TempDir::new().unwrap();
        let root = TempDir::new().unwrap();
        let storage = DirectoryStorage::new(root.path(), "http://cdn.test").unwrap();
        let file = staged(&staging, "a.png");
        let a = storage.upload(&file).unwrap();
        let b = storage.upload(&file).unwrap();
        assert_ne!(a.public_id, b.public_id);
    }

    #[test]
    fn handles_on_one_directory_keep_each_others_files() {
        let staging = TempDir::new().unwrap();
        let root = TempDir::new().unwrap();
        let first = DirectoryStorage::new(root.path(), "http://cdn.test").unwrap();
        let second = DirectoryStorage::new(root.path(), "http://cdn.test").unwrap();
        let a_file = staging.path().join("a.png");
        let b_file = staging.path().join("b.png");
        fs::write(&a_file, b"first").unwrap();
        fs::write(&b_file, b"second").unwrap();
        for _ in 0..50 {
            let a = first.upload(&a_file).unwrap();
            let b = second.upload(&b_file).unwrap();
            assert_ne!(a.public_id, b.public_id);
            assert_eq!(fs::read(root.path().join(&a.public_id)).unwrap(), b"first");
            assert_eq!(fs::read(root.path().join(&b.public_id)).unwrap(), b"second");
        }
        assert_eq!(fs::read_dir(root.path()).unwrap().count(), 100);
    }

    #[test]
    fn existing_files_are_never_overwritten() {
        let staging = TempDir::new().unwrap();
        let root = TempDir::new().unwrap();
        let storage = DirectoryStorage::new(root.path(), "http://cdn.test").unwrap();
        fs::write(root.path().join("taken.png"), b"keep").unwrap();
        assert!(storage
            .copy_new(&staged(&staging, "a.png"), "taken.png")
            .is_err());
        assert_eq!(fs::read(root.path().join("taken.png")).unwrap(), b"keep");
    }

    #[test]
    fn rejects_missing_file_and_bad_ids() {
        let root = TempDir::new().unwrap();
        let storage = DirectoryStorage::new(root.path(), "http://cdn.test").unwrap();
        assert!(matches!(
            storage.upload(Path::new("/definitely/not/here.png")),
            Err(Error::Validation(_))
        ));
        assert!(matches!(storage.destroy("../etc"), Err(Error::Validation(_))));
    }

    #[test]
    fn failed_write_compensates_each_upload_once() {
        let fake = FakeStorage::default();
        let mut uploads = Uploads::new(&fake);
        uploads.upload(Path::new("video.mp4")).unwrap();
        uploads.upload(Path::new("thumb.png")).unwrap();
        let result: Result<()> = uploads.commit(|| Err(Error::conflict("taken")));
        assert!(matches!(result, Err(Error::Conflict(_))));
        assert_eq!(*fake.destroyed.lock().unwrap(), vec!["fake-0", "fake-1"]);
    }

    #[test]
    fn successful_write_keeps_uploads() {
        let fake = FakeStorage::default();
        let mut uploads = Uploads::new(&fake);
        uploads.upload(Path::new("video.mp4")).unwrap();
        assert_eq!(uploads.commit(|| Ok(7)).unwrap(), 7);
        assert!(fake.destroyed.lock().unwrap().is_empty());
    }
}
