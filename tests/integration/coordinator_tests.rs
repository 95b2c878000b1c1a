//! End-to-end behaviour of the upload coordinator against a real directory
//! tree and ledger file, with a scripted uploader.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use flupload::ledger::{Fingerprint, Ledger, LEDGER_FILE};
use flupload::lock::ExclusiveLock;
use flupload::upload::{
    Blake3Hasher, ContentHasher, CoordinatorOptions, FileEnumerator, FileStream,
    UploadCoordinator, UploadError, UploadReport, Uploader, WalkDirEnumerator,
};
use flupload::Error;
use tempfile::{tempdir, TempDir};

/// Uploader that records every call and fails according to a script.
#[derive(Default)]
struct ScriptedUploader {
    calls: Vec<PathBuf>,
    failures: HashMap<usize, UploadError>,
}

impl ScriptedUploader {
    fn failing_at(call: usize, err: UploadError) -> Self {
        let mut failures = HashMap::new();
        failures.insert(call, err);
        Self {
            calls: Vec::new(),
            failures,
        }
    }
}

impl Uploader for ScriptedUploader {
    fn upload(&mut self, path: &Path) -> Result<(), UploadError> {
        let idx = self.calls.len();
        self.calls.push(path.to_path_buf());
        match self.failures.get(&idx) {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }
}

/// Deterministic digest derived from the file name, no disk access.
struct NameHasher;

impl ContentHasher for NameHasher {
    fn fingerprint(&self, path: &Path) -> flupload::Result<Fingerprint> {
        let name = path.file_name().unwrap().to_string_lossy().to_lowercase();
        Ok(Fingerprint::new(format!("name:{name}")))
    }
}

/// Yields a fixed list of paths, in order.
struct ListEnumerator(Vec<PathBuf>);

impl FileEnumerator for ListEnumerator {
    fn files(&self, _root: &Path) -> flupload::Result<FileStream> {
        Ok(Box::new(self.0.clone().into_iter().map(Ok)))
    }
}

struct Fixture {
    photos: TempDir,
    state: TempDir,
}

impl Fixture {
    fn new() -> Self {
        Self {
            photos: tempdir().unwrap(),
            state: tempdir().unwrap(),
        }
    }

    fn write(&self, rel: &str, contents: &[u8]) -> PathBuf {
        let path = self.photos.path().join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, contents).unwrap();
        path
    }

    fn ledger_path(&self) -> PathBuf {
        self.state.path().join(LEDGER_FILE)
    }

    fn options(&self) -> CoordinatorOptions {
        CoordinatorOptions {
            extension: "jpg".into(),
            lock_dir: self.state.path().to_path_buf(),
            lock_name: "flupload".into(),
            lock_timeout: Duration::from_secs(2),
        }
    }

    fn ledger_lines(&self) -> Vec<String> {
        std::fs::read_to_string(self.ledger_path())
            .map(|s| s.lines().map(str::to_string).collect())
            .unwrap_or_default()
    }

    /// One real-disk pass; returns the result and the uploader's calls.
    fn run(&self, uploader: ScriptedUploader) -> (flupload::Result<UploadReport>, Vec<PathBuf>) {
        let ledger = Ledger::open(self.ledger_path()).unwrap();
        let mut coordinator = UploadCoordinator::new(
            ledger,
            Blake3Hasher,
            WalkDirEnumerator,
            uploader,
            self.options(),
        );
        let result = coordinator.upload_all(self.photos.path());
        (result, coordinator.uploader().calls.clone())
    }
}

#[test]
fn uploads_only_images_case_insensitively() -> flupload::Result<()> {
    let fx = Fixture::new();
    let a = fx.write("a.jpg", b"alpha");
    let b = fx.write("b.JPG", b"bravo");
    fx.write("notes.txt", b"not a photo");

    let (result, calls) = fx.run(ScriptedUploader::default());
    let report = result?;

    assert_eq!(2, report.uploaded);
    assert_eq!(0, report.skipped);
    assert!(report.auth_failure.is_none());

    let mut calls = calls;
    calls.sort();
    assert_eq!(vec![a, b], calls);

    let lines = fx.ledger_lines();
    assert_eq!(2, lines.len());
    assert!(lines.iter().any(|l| l.ends_with("# a.jpg")));
    assert!(lines.iter().any(|l| l.ends_with("# b.JPG")));
    assert!(!lines.iter().any(|l| l.contains("notes.txt")));
    Ok(())
}

#[test]
fn second_run_uploads_nothing() -> flupload::Result<()> {
    let fx = Fixture::new();
    fx.write("a.jpg", b"alpha");
    fx.write("DCIM/b.jpg", b"bravo");

    let (first, _) = fx.run(ScriptedUploader::default());
    assert_eq!(2, first?.uploaded);

    let (second, calls) = fx.run(ScriptedUploader::default());
    let report = second?;
    assert!(calls.is_empty());
    assert_eq!(0, report.uploaded);
    assert_eq!(2, report.skipped);
    assert_eq!(2, fx.ledger_lines().len());
    Ok(())
}

#[test]
fn preexisting_ledger_entry_skips_file() -> flupload::Result<()> {
    let fx = Fixture::new();
    let a = fx.write("a.jpg", b"alpha");
    let fp = Blake3Hasher.fingerprint(&a)?;
    std::fs::write(fx.ledger_path(), format!("{fp} # a.jpg\n"))?;

    let (result, calls) = fx.run(ScriptedUploader::default());
    assert_eq!(1, result?.skipped);
    assert!(calls.is_empty());
    assert_eq!(1, fx.ledger_lines().len());
    Ok(())
}

#[test]
fn duplicate_content_is_uploaded_once() -> flupload::Result<()> {
    let fx = Fixture::new();
    fx.write("a.jpg", b"same bytes");
    fx.write("backup/a copy.jpg", b"same bytes");

    let (result, calls) = fx.run(ScriptedUploader::default());
    let report = result?;
    assert_eq!(1, calls.len());
    assert_eq!(1, report.uploaded);
    assert_eq!(1, report.skipped);
    assert_eq!(1, fx.ledger_lines().len());
    Ok(())
}

#[test]
fn auth_failure_on_first_file_stops_run_without_recording() -> flupload::Result<()> {
    let fx = Fixture::new();
    fx.write("a.jpg", b"alpha");
    fx.write("b.jpg", b"bravo");
    fx.write("c.jpg", b"charlie");

    let uploader = ScriptedUploader::failing_at(
        0,
        UploadError::Authentication("code 98: Invalid auth token".into()),
    );
    let (result, calls) = fx.run(uploader);
    let report = result?;

    assert_eq!(1, calls.len());
    assert_eq!(0, report.uploaded);
    assert_eq!(
        Some("code 98: Invalid auth token".to_string()),
        report.auth_failure
    );
    assert!(fx.ledger_lines().is_empty());
    Ok(())
}

#[test]
fn auth_failure_midway_keeps_earlier_records() -> flupload::Result<()> {
    let fx = Fixture::new();
    let files: Vec<PathBuf> = ["a.jpg", "b.jpg", "c.jpg"]
        .iter()
        .map(|name| fx.write(name, name.as_bytes()))
        .collect();

    let ledger = Ledger::open(fx.ledger_path())?;
    let mut coordinator = UploadCoordinator::new(
        ledger,
        NameHasher,
        ListEnumerator(files.clone()),
        ScriptedUploader::failing_at(1, UploadError::Authentication("expired".into())),
        fx.options(),
    );
    let report = coordinator.upload_all(fx.photos.path())?;

    assert_eq!(1, report.uploaded);
    assert!(report.auth_failure.is_some());
    assert_eq!(&files[..2], &coordinator.uploader().calls[..]);
    assert!(coordinator.ledger().contains(&Fingerprint::new("name:a.jpg")));
    assert!(!coordinator.ledger().contains(&Fingerprint::new("name:b.jpg")));
    assert_eq!(vec!["name:a.jpg # a.jpg".to_string()], fx.ledger_lines());
    Ok(())
}

#[test]
fn non_auth_failure_skips_file_and_continues() -> flupload::Result<()> {
    let fx = Fixture::new();
    let files: Vec<PathBuf> = ["a.jpg", "b.jpg", "c.jpg"]
        .iter()
        .map(|name| fx.write(name, name.as_bytes()))
        .collect();

    let ledger = Ledger::open(fx.ledger_path())?;
    let mut coordinator = UploadCoordinator::new(
        ledger,
        NameHasher,
        ListEnumerator(files.clone()),
        ScriptedUploader::failing_at(1, UploadError::Transport("connection reset".into())),
        fx.options(),
    );
    let report = coordinator.upload_all(fx.photos.path())?;

    assert_eq!(2, report.uploaded);
    assert_eq!(1, report.failed);
    assert!(report.auth_failure.is_none());
    assert_eq!(3, coordinator.uploader().calls.len());
    assert!(!coordinator.ledger().contains(&Fingerprint::new("name:b.jpg")));
    assert_eq!(2, fx.ledger_lines().len());
    Ok(())
}

#[test]
fn vanished_file_aborts_run() {
    let fx = Fixture::new();
    let present = fx.write("a.jpg", b"alpha");
    let vanished = fx.photos.path().join("gone.jpg");
    let after = fx.write("z.jpg", b"zulu");

    let ledger = Ledger::open(fx.ledger_path()).unwrap();
    let mut coordinator = UploadCoordinator::new(
        ledger,
        Blake3Hasher,
        ListEnumerator(vec![present.clone(), vanished, after]),
        ScriptedUploader::default(),
        fx.options(),
    );
    let err = coordinator
        .upload_all(fx.photos.path())
        .expect_err("missing file must abort");

    assert!(matches!(err.downcast_ref::<Error>(), Some(Error::NoSuchFile(_))));
    assert_eq!(vec![present], coordinator.uploader().calls);
    assert_eq!(1, fx.ledger_lines().len());
}

#[test]
fn held_lock_times_out_and_leaves_ledger_untouched() {
    let fx = Fixture::new();
    fx.write("a.jpg", b"alpha");

    let blocker = ExclusiveLock::named_in(fx.state.path(), "flupload").unwrap();
    let held = blocker.acquire(Duration::from_secs(1)).unwrap();

    let mut options = fx.options();
    options.lock_timeout = Duration::from_millis(50);
    let ledger = Ledger::open(fx.ledger_path()).unwrap();
    let mut coordinator = UploadCoordinator::new(
        ledger,
        Blake3Hasher,
        WalkDirEnumerator,
        ScriptedUploader::default(),
        options,
    );
    let err = coordinator
        .upload_all(fx.photos.path())
        .expect_err("lock timeout is fatal");

    assert!(matches!(
        err.downcast_ref::<Error>(),
        Some(Error::LockTimeout { .. })
    ));
    // Upload went through but was not recorded; the next run retries it.
    assert_eq!(1, coordinator.uploader().calls.len());
    assert!(coordinator.ledger().is_empty());
    assert!(fx.ledger_lines().is_empty());

    held.release().unwrap();
}

#[test]
fn custom_extension_is_honoured() -> flupload::Result<()> {
    let fx = Fixture::new();
    fx.write("raw/IMG_1.CR2", b"raw");
    fx.write("IMG_1.jpg", b"jpeg");

    let mut options = fx.options();
    options.extension = "cr2".into();
    let ledger = Ledger::open(fx.ledger_path())?;
    let mut coordinator = UploadCoordinator::new(
        ledger,
        Blake3Hasher,
        WalkDirEnumerator,
        ScriptedUploader::default(),
        options,
    );
    let report = coordinator.upload_all(fx.photos.path())?;

    assert_eq!(1, report.uploaded);
    assert!(coordinator.uploader().calls[0].ends_with("raw/IMG_1.CR2"));
    Ok(())
}

#[test]
fn non_utf8_image_names_are_candidates() -> flupload::Result<()> {
    use std::ffi::OsStr;
    use std::os::unix::ffi::OsStrExt;

    let fx = Fixture::new();
    let odd = fx
        .photos
        .path()
        .join(OsStr::from_bytes(b"IMG_\xff01.JPG"));
    std::fs::write(&odd, b"latin-1 camera name")?;
    let ok = fx.write("ok.jpg", b"plain");
    fx.write("IMG_\u{e9}.txt", b"not a photo");

    let (result, calls) = fx.run(ScriptedUploader::default());
    let report = result?;

    assert_eq!(2, report.uploaded);
    let mut calls = calls;
    calls.sort();
    let mut expected = vec![odd, ok];
    expected.sort();
    assert_eq!(expected, calls);

    let lines = fx.ledger_lines();
    assert_eq!(2, lines.len());
    assert!(lines.iter().any(|l| l.ends_with("# IMG_\u{fffd}01.JPG")));
    Ok(())
}
