//! Retrieval tool (yt-dlp) invocation

use async_trait::async_trait;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tracing::{debug, info};

use super::ToolError;
use crate::config::RetrievalConfig;

/// Field separator of the search-only print template
pub const SEARCH_DELIMITER: &str = "<|>";

const SEARCH_TEMPLATE: &str = "%(id)s<|>%(title)s<|>%(uploader)s<|>%(duration_string)s";
const OUTPUT_TEMPLATE: &str = "%(title)s.%(ext)s";
const STDERR_TAIL_LINES: usize = 20;

/// Fetches media for a source locator
#[async_trait]
pub trait Retriever: Send + Sync {
    /// Path the tool would write for `url`, without downloading anything
    async fn predict_path(&self, url: &str) -> Option<PathBuf>;

    /// Download `url`, handing every output line (stdout and stderr) to `on_line`
    ///
    /// A non-zero exit is an error carrying the tail of stderr.
    async fn download(
        &self,
        url: &str,
        on_line: &mut (dyn for<'l> FnMut(&'l str) + Send),
    ) -> Result<(), ToolError>;
}

/// yt-dlp command line builder and runner
#[derive(Debug, Clone)]
pub struct YtDlp {
    binary: String,
    format: String,
    cookies_file: PathBuf,
    js_runtime: Option<String>,
    output_dir: PathBuf,
}

impl YtDlp {
    pub fn new(config: &RetrievalConfig, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            binary: config.binary.clone(),
            format: config.format.clone(),
            cookies_file: config.cookies_file.clone(),
            // an empty string in the config file switches the flag off
            js_runtime: config.js_runtime.clone().filter(|rt| !rt.trim().is_empty()),
            output_dir: output_dir.into(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    fn output_template(&self) -> String {
        self.output_dir.join(OUTPUT_TEMPLATE).to_string_lossy().into_owned()
    }

    fn cookies(&self) -> Option<String> {
        self.cookies_file
            .is_file()
            .then(|| self.cookies_file.to_string_lossy().into_owned())
    }

    /// Flags shared by prediction and download
    fn format_args(&self) -> Vec<String> {
        let mut args = vec![
            "--newline".to_string(),
            "--no-playlist".to_string(),
            "-f".to_string(),
            self.format.clone(),
        ];
        if let Some(runtime) = &self.js_runtime {
            args.push("--js-runtimes".to_string());
            args.push(runtime.clone());
        }
        if let Some(cookies) = self.cookies() {
            args.push("--cookies".to_string());
            args.push(cookies);
        }
        args
    }

    pub fn predict_args(&self, url: &str) -> Vec<String> {
        let mut args = self.format_args();
        args.extend([
            "--get-filename".to_string(),
            "-o".to_string(),
            self.output_template(),
            url.to_string(),
        ]);
        args
    }

    pub fn download_args(&self, url: &str) -> Vec<String> {
        let mut args = self.format_args();
        args.extend(["-o".to_string(), self.output_template(), url.to_string()]);
        args
    }

    pub fn search_args(&self, query: &str, limit: usize) -> Vec<String> {
        let mut args = Vec::new();
        if let Some(cookies) = self.cookies() {
            args.push("--cookies".to_string());
            args.push(cookies);
        }
        args.extend([
            "--print".to_string(),
            SEARCH_TEMPLATE.to_string(),
            "--flat-playlist".to_string(),
            "--no-warnings".to_string(),
        ]);
        if let Some(runtime) = &self.js_runtime {
            args.push("--js-runtimes".to_string());
            args.push(runtime.clone());
        }
        args.push(format!("ytsearch{limit}:{query}"));
        args
    }

    /// Run search-only mode and return its raw stdout
    pub async fn search_output(&self, query: &str, limit: usize) -> Result<String, ToolError> {
        let args = self.search_args(query, limit);
        info!("[CMD] {} {}", self.binary, args.join(" "));

        let output = Command::new(&self.binary)
            .args(&args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| self.spawn_error(source))?;

        if !output.status.success() {
            return Err(ToolError::Failed {
                tool: self.binary.clone(),
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    fn spawn_error(&self, source: std::io::Error) -> ToolError {
        ToolError::Spawn {
            tool: self.binary.clone(),
            source,
        }
    }
}

#[async_trait]
impl Retriever for YtDlp {
    async fn predict_path(&self, url: &str) -> Option<PathBuf> {
        let output = Command::new(&self.binary)
            .args(self.predict_args(url))
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await;

        let output = match output {
            Ok(output) => output,
            Err(e) => {
                debug!(url, error = %e, "Filename prediction failed to start");
                return None;
            }
        };

        // Warnings can precede the name; the name is the last line
        let stdout = String::from_utf8_lossy(&output.stdout);
        stdout
            .lines()
            .map(str::trim)
            .rfind(|line| !line.is_empty())
            .map(PathBuf::from)
    }

    async fn download(
        &self,
        url: &str,
        on_line: &mut (dyn for<'l> FnMut(&'l str) + Send),
    ) -> Result<(), ToolError> {
        let args = self.download_args(url);
        info!("[CMD] {} {}", self.binary, args.join(" "));

        let mut child = Command::new(&self.binary)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| self.spawn_error(source))?;

        let missing = || ToolError::MissingPipe {
            tool: self.binary.clone(),
        };
        let stdout = child.stdout.take().ok_or_else(missing)?;
        let stderr = child.stderr.take().ok_or_else(missing)?;

        let (tx, mut rx) = mpsc::unbounded_channel();
        forward_lines(stdout, OutputStream::Stdout, tx.clone());
        forward_lines(stderr, OutputStream::Stderr, tx);

        let mut stderr_tail = VecDeque::with_capacity(STDERR_TAIL_LINES);
        while let Some((stream, line)) = rx.recv().await {
            on_line(&line);
            if stream == OutputStream::Stderr {
                if stderr_tail.len() == STDERR_TAIL_LINES {
                    stderr_tail.pop_front();
                }
                stderr_tail.push_back(line);
            }
        }

        let status = child.wait().await?;
        if !status.success() {
            return Err(ToolError::Failed {
                tool: self.binary.clone(),
                code: status.code(),
                stderr: Vec::from(stderr_tail).join("\n"),
            });
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutputStream {
    Stdout,
    Stderr,
}

/// Pump one pipe into the shared line channel until EOF
///
/// Lines are decoded lossily: a stray byte in a title must not end the stream.
fn forward_lines<R>(reader: R, stream: OutputStream, tx: mpsc::UnboundedSender<(OutputStream, String)>)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut reader = BufReader::new(reader);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf).await {
                Ok(0) => break,
                Ok(_) => {
                    let line = String::from_utf8_lossy(&buf)
                        .trim_end_matches(['\r', '\n'])
                        .to_string();
                    if tx.send((stream, line)).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    debug!(?stream, error = %e, "Tool output read failed");
                    break;
                }
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn tool(cookies_file: PathBuf) -> YtDlp {
        let config = RetrievalConfig {
            cookies_file,
            ..RetrievalConfig::default()
        };
        YtDlp::new(&config, "/srv/downloads")
    }

    #[test]
    fn test_download_args_without_cookies() {
        let yt = tool(PathBuf::from("/nonexistent/cookies.txt"));
        let args = yt.download_args("https://www.youtube.com/watch?v=abc");

        assert_eq!(
            args,
            vec![
                "--newline",
                "--no-playlist",
                "-f",
                "best[height<=480]/bestvideo[height<=480]+bestaudio/best",
                "--js-runtimes",
                "node",
                "-o",
                "/srv/downloads/%(title)s.%(ext)s",
                "https://www.youtube.com/watch?v=abc",
            ]
        );
    }

    #[test]
    fn test_predict_args_include_cookies_when_present() {
        let dir = TempDir::new().unwrap();
        let cookies = dir.path().join("cookies.txt");
        std::fs::write(&cookies, "# Netscape HTTP Cookie File").unwrap();

        let yt = tool(cookies.clone());
        let args = yt.predict_args("v1");

        let pos = args.iter().position(|a| a == "--cookies").unwrap();
        assert_eq!(args[pos + 1], cookies.to_string_lossy());
        assert!(args.contains(&"--get-filename".to_string()));
        assert_eq!(args.last().unwrap(), "v1");
    }

    #[test]
    fn test_search_args() {
        let yt = tool(PathBuf::from("/nonexistent/cookies.txt"));
        let args = yt.search_args("queen karaoke", 5);

        assert_eq!(args[0], "--print");
        assert_eq!(args[1], SEARCH_TEMPLATE);
        assert!(args.contains(&"--flat-playlist".to_string()));
        assert_eq!(args.last().unwrap(), "ytsearch5:queen karaoke");
    }

    #[test]
    fn test_empty_js_runtime_disables_flag() {
        let config = RetrievalConfig {
            js_runtime: Some(String::new()),
            ..RetrievalConfig::default()
        };
        let yt = YtDlp::new(&config, "/tmp");
        assert!(!yt.download_args("v1").contains(&"--js-runtimes".to_string()));
    }

    #[tokio::test]
    async fn test_download_streams_lines_and_keeps_stderr_tail() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let script = dir.path().join("fake-yt-dlp");
        std::fs::write(
            &script,
            "#!/bin/sh\n\
             echo '[download]  10.0% of 5.00MiB'\n\
             echo 'WARNING: slow' >&2\n\
             echo 'ERROR: gone' >&2\n\
             exit 2\n",
        )
        .unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let config = RetrievalConfig {
            binary: script.to_string_lossy().into_owned(),
            ..RetrievalConfig::default()
        };
        let yt = YtDlp::new(&config, dir.path());

        let mut seen = Vec::new();
        let mut collect = |line: &str| seen.push(line.to_string());
        let err = yt.download("v1", &mut collect).await.unwrap_err();

        seen.sort();
        assert_eq!(
            seen,
            vec!["ERROR: gone", "WARNING: slow", "[download]  10.0% of 5.00MiB"]
        );
        match err {
            ToolError::Failed { code, stderr, .. } => {
                assert_eq!(code, Some(2));
                assert_eq!(stderr, "WARNING: slow\nERROR: gone");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_missing_binary_is_a_spawn_error() {
        let config = RetrievalConfig {
            binary: "/nonexistent/yt-dlp".to_string(),
            ..RetrievalConfig::default()
        };
        let yt = YtDlp::new(&config, "/tmp");

        let mut sink = |_: &str| {};
        let err = yt.download("v1", &mut sink).await.unwrap_err();
        assert!(matches!(err, ToolError::Spawn { .. }));
        assert!(yt.predict_path("v1").await.is_none());
    }
}
