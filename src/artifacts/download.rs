use std::{
    fmt,
    fs::{self, File},
    io::{self, Read, Write},
    path::{Path, PathBuf},
    time::{Duration, Instant},
};

use anyhow::{anyhow, Context, Result};
use reqwest::{blocking::Client, Url};
use serde::Serialize;

use super::{
    error::PrefetchError,
    metadata::{compute_sha256, probe_cached, CacheProbe},
    plan::{FetchPlan, PlanEntry},
    progress::DownloadProgress,
};

pub const CHUNK_SIZE: usize = 1024 * 1024;

/// An open response body plus the size the server announced, if any.
pub struct Transfer {
    pub content_length: Option<u64>,
    pub body: Box<dyn Read>,
}

impl Transfer {
    pub fn new(content_length: Option<u64>, body: impl Read + 'static) -> Self {
        Self {
            content_length,
            body: Box::new(body),
        }
    }
}

impl fmt::Debug for Transfer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transfer")
            .field("content_length", &self.content_length)
            .finish_non_exhaustive()
    }
}

/// Opens a GET transfer for a URL. Errors here and from reading the body are
/// treated as transport failures of a single artifact.
pub trait Transport {
    fn open(&self, url: &Url) -> Result<Transfer>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HttpOptions {
    pub connect_timeout: Duration,
    /// Upper bound on a single wait for the server, including each body read.
    pub idle_timeout: Duration,
}

impl Default for HttpOptions {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new(options: &HttpOptions) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(options.connect_timeout)
            .timeout(options.idle_timeout)
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("create http client")?;
        Ok(Self { client })
    }
}

impl Transport for HttpTransport {
    fn open(&self, url: &Url) -> Result<Transfer> {
        let response = self
            .client
            .get(url.clone())
            .send()
            .with_context(|| format!("request {url}"))?
            .error_for_status()
            .with_context(|| format!("download {url}"))?;

        tracing::debug!(
            %url,
            status = %response.status(),
            content_length = ?response.content_length(),
            "transfer opened"
        );
        Ok(Transfer {
            content_length: response.content_length(),
            body: Box::new(response),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase", rename_all_fields = "camelCase", tag = "state")]
pub enum ArtifactState {
    Cached { size_bytes: u64 },
    Done { bytes_downloaded: u64 },
    Failed { error: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactOutcome {
    pub name: String,
    pub source_url: String,
    pub dest_path: PathBuf,
    #[serde(flatten)]
    pub state: ArtifactState,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FetchReport {
    outcomes: Vec<ArtifactOutcome>,
}

impl FetchReport {
    pub fn outcomes(&self) -> &[ArtifactOutcome] {
        &self.outcomes
    }

    pub fn failures(&self) -> impl Iterator<Item = &ArtifactOutcome> {
        self.outcomes
            .iter()
            .filter(|outcome| matches!(outcome.state, ArtifactState::Failed { .. }))
    }

    pub fn all_available(&self) -> bool {
        self.failures().next().is_none()
    }
}

/// Walks a [`FetchPlan`] one entry at a time, writing human-readable progress
/// to `console`.
pub struct FetchEngine<T, W> {
    transport: T,
    console: W,
    line_open: bool,
}

impl FetchEngine<HttpTransport, io::Stdout> {
    pub fn http(options: &HttpOptions) -> Result<Self, PrefetchError> {
        let transport = HttpTransport::new(options).map_err(PrefetchError::Client)?;
        Ok(Self::new(transport, io::stdout()))
    }
}

impl<T: Transport, W: Write> FetchEngine<T, W> {
    pub fn new(transport: T, console: W) -> Self {
        Self {
            transport,
            console,
            line_open: false,
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn into_console(self) -> W {
        self.console
    }

    /// Make every planned artifact available in the cache directory.
    ///
    /// Only failing to create the cache directory is an error; each artifact
    /// that cannot be fetched is reported once and skipped.
    pub fn ensure_available(&mut self, plan: &FetchPlan) -> Result<FetchReport, PrefetchError> {
        ensure_cache_dir(plan.cache_dir())?;

        let mut report = FetchReport::default();
        for entry in plan {
            let state = self.fetch_entry(entry);
            report.outcomes.push(ArtifactOutcome {
                name: entry.name.clone(),
                source_url: entry.source_url.to_string(),
                dest_path: entry.dest_path.clone(),
                state,
            });
        }
        Ok(report)
    }

    fn fetch_entry(&mut self, entry: &PlanEntry) -> ArtifactState {
        match probe_cached(&entry.dest_path) {
            CacheProbe::Hit { size_bytes } => {
                tracing::debug!(artifact = %entry.name, size_bytes, "cache hit");
                self.say(format_args!(
                    "Using cached artifact: {}\n",
                    entry.dest_path.display()
                ));
                return ArtifactState::Cached { size_bytes };
            }
            probe => tracing::debug!(artifact = %entry.name, ?probe, "cache miss"),
        }

        match self.download(entry) {
            Ok(bytes_downloaded) => {
                tracing::info!(artifact = %entry.name, bytes_downloaded, "artifact downloaded");
                ArtifactState::Done { bytes_downloaded }
            }
            Err(error) => {
                self.close_line();
                self.say(format_args!(
                    "Warning: could not download {}: {error:#}\n",
                    entry.source_url
                ));
                ArtifactState::Failed {
                    error: format!("{error:#}"),
                }
            }
        }
    }

    fn download(&mut self, entry: &PlanEntry) -> Result<u64> {
        self.say(format_args!("Starting download: {}\n", entry.source_url));
        let staging = entry.staging_path();

        let result = self
            .transport
            .open(&entry.source_url)
            .and_then(|transfer| self.stream_to(transfer, &staging))
            .and_then(|bytes| {
                promote(entry, &staging)?;
                Ok(bytes)
            });

        match result {
            Ok(bytes) => {
                self.say(format_args!("Saved to: {}\n", entry.dest_path.display()));
                Ok(bytes)
            }
            Err(error) => {
                discard(&staging);
                Err(error)
            }
        }
    }

    fn stream_to(&mut self, mut transfer: Transfer, staging: &Path) -> Result<u64> {
        let mut file = File::create(staging)
            .with_context(|| format!("create staging file {}", staging.display()))?;
        let mut progress = DownloadProgress::start(transfer.content_length, Instant::now());
        let mut buffer = vec![0u8; CHUNK_SIZE];

        loop {
            let read = read_chunk(transfer.body.as_mut(), &mut buffer)
                .context("read download chunk")?;
            if read == 0 {
                break;
            }
            file.write_all(&buffer[..read])
                .context("write download chunk")?;
            if let Some(line) = progress.advance(read, Instant::now()) {
                self.overwrite(&line);
            }
        }

        file.flush().context("flush staging file")?;
        file.sync_all().context("sync staging file")?;

        if let Some(expected) = progress.total_size() {
            if progress.bytes_read() != expected {
                return Err(anyhow!(
                    "size mismatch: expected {} bytes, got {}",
                    expected,
                    progress.bytes_read()
                ));
            }
        }

        self.overwrite(&progress.completion_line());
        self.close_line();
        Ok(progress.bytes_read())
    }

    fn overwrite(&mut self, line: &str) {
        self.line_open = true;
        self.say(format_args!("\r{line}"));
    }

    fn close_line(&mut self) {
        if self.line_open {
            self.line_open = false;
            self.say(format_args!("\n"));
        }
    }

    fn say(&mut self, args: fmt::Arguments<'_>) {
        if let Err(err) = self
            .console
            .write_fmt(args)
            .and_then(|_| self.console.flush())
        {
            tracing::debug!("console write failed: {err}");
        }
    }
}

pub fn ensure_cache_dir(path: &Path) -> Result<(), PrefetchError> {
    fs::create_dir_all(path).map_err(|source| PrefetchError::CacheDirectory {
        path: path.to_path_buf(),
        source,
    })
}

/// Checks the staged bytes and moves them onto the destination path.
fn promote(entry: &PlanEntry, staging: &Path) -> Result<()> {
    if let Some(expected) = &entry.sha256 {
        let checksum = compute_sha256(staging)?;
        if &checksum != expected {
            return Err(anyhow!(
                "checksum mismatch: expected {}, got {}",
                expected,
                checksum
            ));
        }
    }
    fs::rename(staging, &entry.dest_path).with_context(|| {
        format!(
            "move {} into place at {}",
            staging.display(),
            entry.dest_path.display()
        )
    })
}

fn discard(staging: &Path) {
    match fs::remove_file(staging) {
        Ok(()) => {}
        Err(err) if err.kind() == io::ErrorKind::NotFound => {}
        Err(err) => tracing::warn!("Failed to remove {}: {err}", staging.display()),
    }
}

/// Fill `buffer` unless the stream ends first; returns the bytes read.
fn read_chunk(reader: &mut dyn Read, buffer: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buffer.len() {
        match reader.read(&mut buffer[filled..]) {
            Ok(0) => break,
            Ok(read) => filled += read,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        }
    }
    Ok(filled)
}
