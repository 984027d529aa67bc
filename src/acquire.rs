//! Source acquisition: resolve a locator (given or searched) and fetch it.
use crate::error::{SongError, ToolError};
use crate::runner::{run_tool, split_command};
use crate::sanitize::replace_invalid_chars;
use crate::song::{Provenance, ValidSong};
use anyhow::Result;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

/// Extensions the download tool may leave behind for an audio-only fetch.
pub const AUDIO_EXTENSIONS: &[&str] = &["mp3", "opus", "m4a", "flac", "webm", "ogg", "wav"];

const WATCH_URL_PREFIX: &str = "https://www.youtube.com/watch?v=";

/// Search and download capability.
pub trait MediaSource {
    /// Locator of the best match for `query`, or `None` if nothing matched.
    fn search(&self, query: &str) -> Result<Option<String>, ToolError>;

    /// Download audio from `locator` to `output_template` (`%(ext)s` expanded by the tool).
    fn fetch(&self, locator: &str, output_template: &str) -> Result<(), ToolError>;
}

/// `yt-dlp` (or a compatible command line).
pub struct YtDlp {
    argv: Vec<String>,
    search_timeout: Duration,
    download_timeout: Duration,
}

impl YtDlp {
    pub fn from_command_line(
        command: &str,
        search_timeout: Duration,
        download_timeout: Duration,
    ) -> Result<Self> {
        Ok(Self {
            argv: split_command(command)?,
            search_timeout,
            download_timeout,
        })
    }

    fn command(&self, extra: &[&str]) -> Vec<String> {
        let mut argv = self.argv.clone();
        argv.extend(extra.iter().map(|arg| arg.to_string()));
        argv
    }
}

impl MediaSource for YtDlp {
    fn search(&self, query: &str) -> Result<Option<String>, ToolError> {
        let search = format!("ytsearch:{query}");
        let output = run_tool(
            &self.command(&[&search, "--get-id"]),
            None,
            self.search_timeout,
        )?;
        let stdout = output.stdout_text();
        let id = stdout.lines().map(str::trim).find(|line| !line.is_empty());
        tracing::debug!(
            query,
            id = id.unwrap_or(""),
            duration_ms = output.duration.as_millis() as u64,
            "search finished"
        );
        Ok(id.map(|id| format!("{WATCH_URL_PREFIX}{id}")))
    }

    fn fetch(&self, locator: &str, output_template: &str) -> Result<(), ToolError> {
        let output = run_tool(
            &self.command(&[
                "-x",
                "--audio-format",
                "best",
                locator,
                "-o",
                output_template,
            ]),
            None,
            self.download_timeout,
        )?;
        tracing::debug!(
            locator,
            duration_ms = output.duration.as_millis() as u64,
            "download finished"
        );
        Ok(())
    }
}

/// A fetched source file and how its locator was chosen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Acquisition {
    pub path: PathBuf,
    pub locator: String,
    pub provenance: Provenance,
}

/// Fetch `song` into `working_dir`, searching for a locator when none was given.
pub fn acquire(
    media: &dyn MediaSource,
    song: &ValidSong,
    working_dir: &Path,
) -> Result<Acquisition, SongError> {
    let name = song.display_name();
    let (locator, provenance) = match &song.locator {
        Some(locator) => (locator.clone(), Provenance::Authoritative),
        None => {
            let found = media.search(&name).map_err(|err| SongError::Acquisition {
                song: name.clone(),
                reason: format!("search failed: {err}"),
            })?;
            let Some(locator) = found else {
                tracing::warn!(song = %name, "no search result; skipping");
                return Err(SongError::NotFound { query: name });
            };
            tracing::info!(
                song = %name,
                locator = %locator,
                "source found by search; needs verification"
            );
            (locator, Provenance::AutoSearched)
        }
    };

    let stem = working_stem(song);
    let template = working_dir.join(format!("{}.%(ext)s", stem.replace('%', "%%")));
    let template = template.to_string_lossy();
    tracing::info!(song = %name, locator = %locator, "downloading");

    if let Err(err) = media.fetch(&locator, &template) {
        tracing::error!(song = %name, error = %err, "download failed");
        return Err(SongError::Acquisition {
            song: name,
            reason: err.to_string(),
        });
    }

    match find_acquired_file(working_dir, &stem) {
        Some(path) => {
            tracing::info!(song = %name, path = %path.display(), "downloaded");
            Ok(Acquisition {
                path,
                locator,
                provenance,
            })
        }
        None => {
            tracing::error!(song = %name, "download reported success but no audio file appeared");
            Err(SongError::Acquisition {
                song: name,
                reason: format!(
                    "no audio file named {stem:?} in {}",
                    working_dir.display()
                ),
            })
        }
    }
}

/// File stem used for the downloaded source.
pub fn working_stem(song: &ValidSong) -> String {
    replace_invalid_chars(&song.display_name())
}

/// Most recently modified `{stem}.{ext}` over [`AUDIO_EXTENSIONS`].
///
/// Leftovers from an earlier run under another extension lose to the fresh
/// download; equal times keep extension order.
pub fn find_acquired_file(dir: &Path, stem: &str) -> Option<PathBuf> {
    let mut newest: Option<(SystemTime, PathBuf)> = None;
    for ext in AUDIO_EXTENSIONS {
        let path = dir.join(format!("{stem}.{ext}"));
        let Ok(meta) = fs::metadata(&path) else {
            continue;
        };
        if !meta.is_file() {
            continue;
        }
        let modified = meta.modified().unwrap_or(SystemTime::UNIX_EPOCH);
        let newer = match &newest {
            Some((best, _)) => modified > *best,
            None => true,
        };
        if newer {
            newest = Some((modified, path));
        }
    }
    newest.map(|(_, path)| path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeMedia;

    fn song(artist: &str, title: &str, locator: Option<&str>) -> ValidSong {
        ValidSong {
            original_input: title.to_string(),
            title: title.to_string(),
            artist: artist.to_string(),
            year: "1968".to_string(),
            locator: locator.map(str::to_string),
        }
    }

    #[test]
    fn searched_source_is_marked_auto_searched() {
        let dir = tempfile::tempdir().expect("tempdir");
        let media = FakeMedia::new().with_result("The Beatles - Hey Jude", "A_MjCqQoLLA");
        let acquired = acquire(&media, &song("The Beatles", "Hey Jude", None), dir.path())
            .expect("acquire");

        assert_eq!(acquired.provenance, Provenance::AutoSearched);
        assert_eq!(
            acquired.locator,
            "https://www.youtube.com/watch?v=A_MjCqQoLLA"
        );
        assert_eq!(acquired.path, dir.path().join("The Beatles - Hey Jude.opus"));
        assert_eq!(media.searches.borrow().as_slice(), ["The Beatles - Hey Jude"]);
    }

    #[test]
    fn given_locator_skips_search() {
        let dir = tempfile::tempdir().expect("tempdir");
        let media = FakeMedia::new();
        let acquired = acquire(
            &media,
            &song("The Beatles", "Hey Jude", Some("https://youtu.be/A_MjCqQoLLA")),
            dir.path(),
        )
        .expect("acquire");

        assert_eq!(acquired.provenance, Provenance::Authoritative);
        assert!(media.searches.borrow().is_empty());
        assert_eq!(media.fetches.borrow()[0].0, "https://youtu.be/A_MjCqQoLLA");
    }

    #[test]
    fn empty_search_is_not_found() {
        let dir = tempfile::tempdir().expect("tempdir");
        let media = FakeMedia::new();
        let err = acquire(&media, &song("Nobody", "Nothing", None), dir.path()).unwrap_err();
        assert!(matches!(err, SongError::NotFound { .. }));
        assert!(media.fetches.borrow().is_empty());
    }

    #[test]
    fn failed_fetch_is_acquisition_failure() {
        let dir = tempfile::tempdir().expect("tempdir");
        let media = FakeMedia::new().failing_fetch();
        let err = acquire(
            &media,
            &song("The Beatles", "Hey Jude", Some("https://youtu.be/x")),
            dir.path(),
        )
        .unwrap_err();
        assert_eq!(err.stage(), "acquisition");
        assert!(err.to_string().contains("Video unavailable"));
    }

    #[test]
    fn missing_file_after_fetch_is_acquisition_failure() {
        let dir = tempfile::tempdir().expect("tempdir");
        let media = FakeMedia::new().silent_fetch();
        let err = acquire(
            &media,
            &song("The Beatles", "Hey Jude", Some("https://youtu.be/x")),
            dir.path(),
        )
        .unwrap_err();
        assert!(matches!(err, SongError::Acquisition { .. }));
        assert!(err.to_string().contains("no audio file"));
    }

    #[test]
    fn stem_escapes_path_and_template_characters() {
        let dir = tempfile::tempdir().expect("tempdir");
        let media = FakeMedia::new();
        let acquired = acquire(
            &media,
            &song("AC/DC", "100% Rock?", Some("https://youtu.be/x")),
            dir.path(),
        )
        .expect("acquire");

        assert_eq!(acquired.path, dir.path().join("AC_DC - 100% Rock_.opus"));
        assert!(media.fetches.borrow()[0].1.ends_with("AC_DC - 100%% Rock_.%(ext)s"));
    }

    #[test]
    fn finds_files_by_known_extension_only() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("Song.part"), b"partial").unwrap();
        assert_eq!(find_acquired_file(dir.path(), "Song"), None);
        std::fs::write(dir.path().join("Song.m4a"), b"audio").unwrap();
        assert_eq!(
            find_acquired_file(dir.path(), "Song"),
            Some(dir.path().join("Song.m4a"))
        );
    }

    fn set_age(path: &Path, secs_since_epoch: u64) {
        let file = fs::File::options().write(true).open(path).unwrap();
        file.set_modified(SystemTime::UNIX_EPOCH + Duration::from_secs(secs_since_epoch))
            .unwrap();
    }

    #[test]
    fn fresh_download_wins_over_stale_leftover() {
        let dir = tempfile::tempdir().expect("tempdir");
        let stale = dir.path().join("Song.mp3");
        let fresh = dir.path().join("Song.opus");
        fs::write(&stale, b"old run").unwrap();
        fs::write(&fresh, b"this run").unwrap();
        set_age(&stale, 1_000_000);
        set_age(&fresh, 2_000_000);
        assert_eq!(find_acquired_file(dir.path(), "Song"), Some(fresh.clone()));

        set_age(&stale, 3_000_000);
        assert_eq!(find_acquired_file(dir.path(), "Song"), Some(stale));
    }

    #[cfg(unix)]
    mod yt_dlp {
        use super::*;

        const TIMEOUT: Duration = Duration::from_secs(10);

        /// `YtDlp` backed by a shell stub that records its arguments to `args.txt`.
        fn stub(dir: &Path, body: &str) -> YtDlp {
            let script = dir.join("yt-dlp.sh");
            fs::write(
                &script,
                format!("printf '%s\\n' \"$@\" > \"$(dirname \"$0\")/args.txt\"\n{body}\n"),
            )
            .unwrap();
            let command = shell_words::join(["sh", &*script.to_string_lossy()]);
            YtDlp::from_command_line(&command, TIMEOUT, TIMEOUT).expect("command line")
        }

        fn recorded_args(dir: &Path) -> Vec<String> {
            fs::read_to_string(dir.join("args.txt"))
                .unwrap()
                .lines()
                .map(str::to_string)
                .collect()
        }

        #[test]
        fn search_maps_first_id_to_watch_url() {
            let dir = tempfile::tempdir().expect("tempdir");
            let media = stub(dir.path(), "printf '\\n  A_MjCqQoLLA  \\nsecond_id\\n'");

            let found = media.search("The Beatles - Hey Jude").expect("search");
            assert_eq!(
                found.as_deref(),
                Some("https://www.youtube.com/watch?v=A_MjCqQoLLA")
            );
            assert_eq!(
                recorded_args(dir.path()),
                ["ytsearch:The Beatles - Hey Jude", "--get-id"]
            );
        }

        #[test]
        fn blank_search_output_is_not_found() {
            let dir = tempfile::tempdir().expect("tempdir");
            let media = stub(dir.path(), "printf '\\n   \\n'");

            assert_eq!(media.search("Nobody - Nothing").expect("search"), None);
            let err = acquire(&media, &song("Nobody", "Nothing", None), dir.path()).unwrap_err();
            assert!(matches!(err, SongError::NotFound { .. }));
        }

        #[test]
        fn failing_search_is_acquisition_failure() {
            let dir = tempfile::tempdir().expect("tempdir");
            let media = stub(dir.path(), "echo 'ERROR: network is unreachable' >&2; exit 1");

            let err = acquire(&media, &song("The Beatles", "Hey Jude", None), dir.path())
                .unwrap_err();
            assert_eq!(err.stage(), "acquisition");
            assert!(err.to_string().contains("network is unreachable"));
        }

        #[test]
        fn fetch_passes_locator_and_template() {
            let dir = tempfile::tempdir().expect("tempdir");
            let working = dir.path().join("working");
            fs::create_dir_all(&working).unwrap();
            let media = stub(
                dir.path(),
                "for last; do :; done\n\
                 : > \"$(printf '%s' \"$last\" | sed 's/%(ext)s$/opus/')\"",
            );

            let acquired = acquire(
                &media,
                &song("The Beatles", "Hey Jude", Some("https://youtu.be/A_MjCqQoLLA")),
                &working,
            )
            .expect("acquire");

            let template = working.join("The Beatles - Hey Jude.%(ext)s");
            assert_eq!(
                recorded_args(dir.path()),
                [
                    "-x",
                    "--audio-format",
                    "best",
                    "https://youtu.be/A_MjCqQoLLA",
                    "-o",
                    &*template.to_string_lossy(),
                ]
            );
            assert_eq!(acquired.path, working.join("The Beatles - Hey Jude.opus"));
            assert_eq!(acquired.provenance, Provenance::Authoritative);
        }
    }
}
