//! Concatenating rendered scene clips into one video with FFmpeg.
//!
//! Clips are downloaded into a scoped temp directory owned by the merger.
//! For a single clip the merge degenerates to a plain download. For
//! multiple clips a cross-fade filter graph is attempted first; when any
//! clip fails to probe or the filter run fails, the concat demuxer with
//! stream copy takes over so a missing transition never sinks the workflow.
//!
//! Temp directories stay alive until [`MediaMerger::cleanup`] releases them,
//! which callers do on success and failure paths alike.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tempfile::TempDir;

use crate::error::{Error, Result};

const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(300);
const FFMPEG_TIMEOUT: Duration = Duration::from_secs(300);
const CROSSFADE_SECS: f64 = 0.5;

/// Async trait for the clip concatenation backend.
#[async_trait]
pub trait MediaMerger: Send + Sync {
    /// Merge the clips behind `asset_urls`, preserving their order, into a
    /// single local file. A single URL is just downloaded.
    async fn merge(&self, asset_urls: &[String]) -> Result<PathBuf>;

    /// Release the temp storage behind a previously merged file.
    async fn cleanup(&self, path: &Path);
}

pub struct FfmpegMerger {
    client: reqwest::Client,
    workdirs: Mutex<HashMap<PathBuf, TempDir>>,
}

impl FfmpegMerger {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(DOWNLOAD_TIMEOUT)
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!("Failed to build HTTP client with timeout: {}", e);
                reqwest::Client::new()
            });

        Self {
            client,
            workdirs: Mutex::new(HashMap::new()),
        }
    }

    fn ffmpeg_bin() -> Result<PathBuf> {
        which::which("ffmpeg").map_err(|_| Error::provider("ffmpeg binary not found on PATH"))
    }

    async fn download(&self, url: &str, dest: &Path) -> Result<()> {
        let response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(Error::provider(format!(
                "failed to download clip: {}",
                response.status()
            )));
        }
        let bytes = response.bytes().await?;
        tokio::fs::write(dest, &bytes).await?;
        Ok(())
    }

    /// Clip duration in seconds via ffprobe, if ffprobe is installed and the
    /// file parses.
    async fn probe_duration(path: &Path) -> Option<f64> {
        let ffprobe = which::which("ffprobe").ok()?;
        let output = tokio::process::Command::new(ffprobe)
            .args([
                "-v",
                "error",
                "-show_entries",
                "format=duration",
                "-of",
                "default=noprint_wrappers=1:nokey=1",
            ])
            .arg(path)
            .output()
            .await
            .ok()?;
        if !output.status.success() {
            return None;
        }
        String::from_utf8_lossy(&output.stdout).trim().parse().ok()
    }

    /// FFmpeg writes progress noise to stderr even on success, so the real
    /// success check is whether the output file materialized.
    async fn run_ffmpeg(&self, args: &[&str], output: &Path) -> Result<()> {
        let ffmpeg = Self::ffmpeg_bin()?;
        let mut command = tokio::process::Command::new(ffmpeg);
        command.args(args).stdout(Stdio::null()).stderr(Stdio::piped());

        let result = tokio::time::timeout(FFMPEG_TIMEOUT, command.output()).await;
        let process_output = match result {
            Err(_) => return Err(Error::timeout("ffmpeg run exceeded its time budget")),
            Ok(Err(e)) => return Err(Error::Io(e)),
            Ok(Ok(out)) => out,
        };

        if output.exists() {
            return Ok(());
        }

        let stderr = String::from_utf8_lossy(&process_output.stderr);
        Err(Error::provider(format!(
            "ffmpeg failed: {}",
            stderr.lines().last().unwrap_or("unknown error")
        )))
    }

    async fn concat_copy(&self, files: &[PathBuf], dir: &Path, output: &Path) -> Result<()> {
        let list_path = dir.join("concat.txt");
        tokio::fs::write(&list_path, concat_list(files)).await?;

        let list = list_path.to_string_lossy().to_string();
        let out = output.to_string_lossy().to_string();
        self.run_ffmpeg(
            &[
                "-f",
                "concat",
                "-safe",
                "0",
                "-i",
                list.as_str(),
                "-c",
                "copy",
                out.as_str(),
                "-y",
            ],
            output,
        )
        .await
    }

    async fn concat_crossfade(
        &self,
        files: &[PathBuf],
        durations: &[f64],
        output: &Path,
    ) -> Result<()> {
        let (filter, video_label, audio_label) = build_xfade_filter(durations, CROSSFADE_SECS);

        let mut args: Vec<String> = Vec::new();
        for file in files {
            args.push("-i".to_string());
            args.push(file.to_string_lossy().to_string());
        }
        args.push("-filter_complex".to_string());
        args.push(filter);
        args.push("-map".to_string());
        args.push(format!("[{video_label}]"));
        args.push("-map".to_string());
        args.push(format!("[{audio_label}]"));
        args.push(output.to_string_lossy().to_string());
        args.push("-y".to_string());

        let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
        self.run_ffmpeg(&arg_refs, output).await
    }
}

impl Default for FfmpegMerger {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MediaMerger for FfmpegMerger {
    async fn merge(&self, asset_urls: &[String]) -> Result<PathBuf> {
        if asset_urls.is_empty() {
            return Err(Error::provider("no clips to merge"));
        }

        let workdir = TempDir::new()?;

        if asset_urls.len() == 1 {
            let output = workdir.path().join("video.mp4");
            self.download(&asset_urls[0], &output).await?;
            self.workdirs.lock().insert(output.clone(), workdir);
            return Ok(output);
        }

        tracing::info!(clips = asset_urls.len(), "downloading clips for merge");
        let mut files = Vec::with_capacity(asset_urls.len());
        for (index, url) in asset_urls.iter().enumerate() {
            let dest = workdir.path().join(format!("clip_{index}.mp4"));
            self.download(url, &dest).await?;
            files.push(dest);
        }

        let output = workdir.path().join("output.mp4");

        let mut durations = Vec::with_capacity(files.len());
        for file in &files {
            match Self::probe_duration(file).await {
                Some(duration) => durations.push(duration),
                None => break,
            }
        }

        if durations.len() == files.len() {
            match self.concat_crossfade(&files, &durations, &output).await {
                Ok(()) => {
                    self.workdirs.lock().insert(output.clone(), workdir);
                    return Ok(output);
                }
                Err(e) => {
                    tracing::warn!("cross-fade merge failed, falling back to concat: {e}");
                    let _ = tokio::fs::remove_file(&output).await;
                }
            }
        } else {
            tracing::debug!("clip durations unavailable, skipping cross-fade");
        }

        self.concat_copy(&files, workdir.path(), &output).await?;
        self.workdirs.lock().insert(output.clone(), workdir);
        Ok(output)
    }

    async fn cleanup(&self, path: &Path) {
        let owned = self.workdirs.lock().remove(path);
        match owned {
            // Dropping the TempDir removes the whole directory.
            Some(_dir) => {}
            None => {
                let _ = tokio::fs::remove_file(path).await;
            }
        }
    }
}

/// Concat-demuxer list file contents. FFmpeg wants forward slashes even on
/// Windows.
fn concat_list(files: &[PathBuf]) -> String {
    files
        .iter()
        .map(|f| format!("file '{}'", f.to_string_lossy().replace('\\', "/")))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Chain of `xfade`/`acrossfade` filters over `n` inputs. Each transition
/// starts `fade` seconds before the end of the accumulated stream, so the
/// offset for transition `i` is the summed duration of clips `0..=i` minus
/// the fades already consumed.
fn build_xfade_filter(durations: &[f64], fade: f64) -> (String, String, String) {
    let mut parts = Vec::new();
    let mut offset = 0.0;

    for i in 1..durations.len() {
        offset += durations[i - 1] - fade;
        let prev_v = if i == 1 {
            "0:v".to_string()
        } else {
            format!("v{}", i - 1)
        };
        let prev_a = if i == 1 {
            "0:a".to_string()
        } else {
            format!("a{}", i - 1)
        };
        parts.push(format!(
            "[{prev_v}][{i}:v]xfade=transition=fade:duration={fade}:offset={offset:.3}[v{i}]"
        ));
        parts.push(format!("[{prev_a}][{i}:a]acrossfade=d={fade}[a{i}]"));
    }

    let last = durations.len() - 1;
    (parts.join(";"), format!("v{last}"), format!("a{last}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn concat_list_quotes_paths() {
        let files = vec![PathBuf::from("/tmp/a.mp4"), PathBuf::from("/tmp/b.mp4")];
        assert_eq!(
            concat_list(&files),
            "file '/tmp/a.mp4'\nfile '/tmp/b.mp4'"
        );
    }

    #[test]
    fn xfade_filter_two_clips() {
        let (filter, video, audio) = build_xfade_filter(&[15.0, 15.0], 0.5);
        assert_eq!(
            filter,
            "[0:v][1:v]xfade=transition=fade:duration=0.5:offset=14.500[v1];[0:a][1:a]acrossfade=d=0.5[a1]"
        );
        assert_eq!(video, "v1");
        assert_eq!(audio, "a1");
    }

    #[test]
    fn xfade_filter_chains_offsets() {
        let (filter, video, _) = build_xfade_filter(&[15.0, 15.0, 15.0], 0.5);
        // Second transition starts after two clips minus two fades.
        assert!(filter.contains("offset=29.000[v2]"));
        assert!(filter.contains("[v1][2:v]"));
        assert!(filter.contains("[a1][2:a]"));
        assert_eq!(video, "v2");
    }
}
