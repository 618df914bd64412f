use anyhow::{Context, Result, anyhow};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::constants::constants;

pub const UNSUPPORTED_MESSAGE: &str = "Speech recognition is not supported on this system.";

// --- Voice search ---

/// Progress of one dictation session.
#[derive(Debug, Clone, PartialEq)]
pub enum DictationEvent {
  /// Microphone capture started.
  Listening,
  /// Capture finished, speech is being recognised.
  Recognizing,
  /// Whisper model download progress (downloaded bytes, total bytes).
  DownloadProgress(u64, u64),
  /// Final text, trimmed and non-empty.
  Transcript(String),
  Failed(String),
}

#[derive(Default)]
pub enum DictationState {
  #[default]
  Idle,
  Listening { handle: JoinHandle<()> },
  Recognizing { handle: JoinHandle<()> },
}

/// Push-to-talk voice search: record a short clip from the default
/// microphone with ffmpeg, then transcribe it locally with whisper.
///
/// Toggling while active aborts the session without producing text.
pub struct Dictation {
  pub state: DictationState,
  pub download_progress: Option<(u64, u64)>,
  rx: Option<mpsc::UnboundedReceiver<DictationEvent>>,
  whisper_cache: Arc<StdMutex<Option<whisper_cli::Whisper>>>,
}

impl Default for Dictation {
  fn default() -> Self {
    Self::new()
  }
}

impl Dictation {
  pub fn new() -> Self {
    Self {
      state: DictationState::Idle,
      download_progress: None,
      rx: None,
      whisper_cache: Arc::new(StdMutex::new(None)),
    }
  }

  pub fn is_active(&self) -> bool {
    !matches!(self.state, DictationState::Idle)
  }

  pub fn is_listening(&self) -> bool {
    matches!(self.state, DictationState::Listening { .. })
  }

  /// Start a session, or abort the running one.
  pub fn toggle(&mut self) {
    if self.is_active() { self.stop() } else { self.start() }
  }

  pub fn start(&mut self) {
    self.stop();
    let (tx, rx) = mpsc::unbounded_channel();
    let handle = spawn_dictation_pipeline(tx, Arc::clone(&self.whisper_cache), constants().dictation_secs);
    self.rx = Some(rx);
    self.state = DictationState::Listening { handle };
  }

  pub fn stop(&mut self) {
    match std::mem::take(&mut self.state) {
      DictationState::Listening { handle } | DictationState::Recognizing { handle } => {
        info!("dictation: stopped");
        handle.abort();
      }
      DictationState::Idle => {}
    }
    self.rx = None;
    self.download_progress = None;
  }

  /// Drain pipeline events. Returns the transcript or failure message that
  /// ended the session, if any.
  pub fn poll(&mut self) -> Option<Result<String, String>> {
    let rx = self.rx.as_mut()?;
    let mut outcome = None;
    while let Ok(event) = rx.try_recv() {
      match event {
        DictationEvent::Listening => {}
        DictationEvent::Recognizing => {
          if let DictationState::Listening { handle } = std::mem::take(&mut self.state) {
            self.state = DictationState::Recognizing { handle };
          }
        }
        DictationEvent::DownloadProgress(done, total) => {
          self.download_progress = if done >= total && total > 0 { None } else { Some((done, total)) };
        }
        DictationEvent::Transcript(text) => outcome = Some(Ok(text)),
        DictationEvent::Failed(msg) => outcome = Some(Err(msg)),
      }
    }
    if outcome.is_some() {
      self.state = DictationState::Idle;
      self.rx = None;
      self.download_progress = None;
    }
    outcome
  }
}

impl Drop for Dictation {
  fn drop(&mut self) {
    self.stop();
  }
}

/// Fetch the whisper model with progress events instead of letting
/// whisper-cli-rs print an indicatif bar over the TUI.
pub async fn download_whisper_model(tx: &mpsc::UnboundedSender<DictationEvent>, model_path: &Path) -> Result<()> {
  use futures::StreamExt;

  let url = format!("https://huggingface.co/ggerganov/whisper.cpp/resolve/main/ggml-{}.bin", whisper_cli::Size::Small);
  info!(url = %url, "dictation: downloading whisper model");

  let response = reqwest::get(&url).await.context("Failed to download whisper model")?.error_for_status()?;
  let total = response.content_length().unwrap_or(0);
  let mut downloaded: u64 = 0;

  if let Some(parent) = model_path.parent() {
    std::fs::create_dir_all(parent).context("Failed to create model cache directory")?;
  }

  let tmp_path = model_path.with_extension("bin.part");
  let mut file = tokio::fs::File::create(&tmp_path).await.context("Failed to create model file")?;
  let mut stream = response.bytes_stream();
  let mut last_progress = std::time::Instant::now();

  while let Some(chunk) = stream.next().await {
    let chunk = chunk.context("Error downloading model chunk")?;
    tokio::io::AsyncWriteExt::write_all(&mut file, &chunk).await.context("Error writing model file")?;
    downloaded += chunk.len() as u64;
    // At most one progress event per 100ms
    if last_progress.elapsed() >= Duration::from_millis(100) || downloaded >= total {
      let _ = tx.send(DictationEvent::DownloadProgress(downloaded, total));
      last_progress = std::time::Instant::now();
    }
  }

  tokio::io::AsyncWriteExt::flush(&mut file).await.context("Error flushing model file")?;
  drop(file);
  tokio::fs::rename(&tmp_path, model_path).await.context("Failed to finalize model file")?;

  info!(path = %model_path.display(), "dictation: whisper model downloaded");
  let _ = tx.send(DictationEvent::DownloadProgress(total, total));
  Ok(())
}

/// Redirects fd 2 to /dev/null while alive. whisper.cpp logs straight to
/// stderr, which would scribble over the TUI.
pub struct SuppressStderr {
  saved: libc::c_int,
}

impl SuppressStderr {
  pub fn new() -> Self {
    // Safety: plain dup/dup2/open on fd 2; stdout stays untouched for the TUI.
    unsafe {
      let saved = libc::dup(2);
      let devnull = libc::open(c"/dev/null".as_ptr(), libc::O_WRONLY);
      if devnull >= 0 {
        libc::dup2(devnull, 2);
        libc::close(devnull);
      } else {
        warn!("dictation: failed to open /dev/null");
      }
      Self { saved }
    }
  }
}

impl Drop for SuppressStderr {
  fn drop(&mut self) {
    // Safety: restores the descriptor saved in `new`.
    unsafe {
      if self.saved >= 0 {
        libc::dup2(self.saved, 2);
        libc::close(self.saved);
      }
    }
  }
}

/// ffmpeg input arguments for the default microphone.
fn capture_input_args() -> &'static [&'static str] {
  if cfg!(target_os = "macos") { &["-f", "avfoundation", "-i", ":0"] } else { &["-f", "pulse", "-i", "default"] }
}

/// Record `secs` seconds of 16kHz mono audio into `path`.
async fn record_clip(path: &Path, secs: u32) -> Result<()> {
  let out = path.to_str().ok_or_else(|| anyhow!("Temporary path is not valid UTF-8"))?;
  let duration = secs.to_string();
  let mut args: Vec<&str> = vec!["-y", "-loglevel", "error"];
  args.extend_from_slice(capture_input_args());
  args.extend_from_slice(&["-t", &duration, "-ar", "16000", "-ac", "1", "-f", "wav", out]);

  info!(secs, "dictation: recording");
  let status = tokio::process::Command::new("ffmpeg")
    .args(&args)
    .stdin(std::process::Stdio::null())
    .stdout(std::process::Stdio::null())
    .stderr(std::process::Stdio::null())
    .kill_on_drop(true)
    .status()
    .await
    .map_err(|e| {
      if e.kind() == std::io::ErrorKind::NotFound {
        anyhow!(UNSUPPORTED_MESSAGE)
      } else {
        anyhow!("Failed to start ffmpeg: {}", e)
      }
    })?;
  if !status.success() {
    return Err(anyhow!("Could not access the microphone (ffmpeg exited with {})", status));
  }
  Ok(())
}

fn transcribe_clip(cache: &StdMutex<Option<whisper_cli::Whisper>>, clip: &Path) -> Result<String> {
  let _guard = SuppressStderr::new();
  let mut lock = cache.lock().map_err(|_| anyhow!("whisper cache poisoned"))?;
  if lock.is_none() {
    info!("dictation: loading whisper model (Small)");
    let model = whisper_cli::Model::new(whisper_cli::Size::Small);
    let rt = tokio::runtime::Builder::new_current_thread()
      .enable_all()
      .build()
      .context("Failed to create tokio runtime for model init")?;
    *lock = Some(rt.block_on(whisper_cli::Whisper::new(model, Some(whisper_cli::Language::Auto))));
  }
  let whisper = lock.as_mut().ok_or_else(|| anyhow!("whisper model unavailable"))?;
  let transcript = whisper.transcribe(clip, false, false).context("Whisper transcription failed")?;
  Ok(join_utterances(transcript.utterances.iter().map(|u| u.text.as_str())))
}

/// Join recognised fragments into a single search phrase.
pub fn join_utterances<'a>(parts: impl Iterator<Item = &'a str>) -> String {
  parts.map(str::trim).filter(|s| !s.is_empty()).collect::<Vec<_>>().join(" ")
}

fn clip_path() -> PathBuf {
  std::env::temp_dir().join(format!("iamdb-dictation-{}.wav", std::process::id()))
}

/// Record, make sure the model is present, transcribe.
pub fn spawn_dictation_pipeline(
  tx: mpsc::UnboundedSender<DictationEvent>,
  whisper_cache: Arc<StdMutex<Option<whisper_cli::Whisper>>>,
  secs: u32,
) -> JoinHandle<()> {
  tokio::spawn(async move {
    let clip = clip_path();
    let _ = std::fs::remove_file(&clip);

    let _ = tx.send(DictationEvent::Listening);
    if let Err(e) = record_clip(&clip, secs).await {
      warn!(err = %e, "dictation: capture failed");
      let _ = tx.send(DictationEvent::Failed(format!("{:#}", e)));
      return;
    }
    let _ = tx.send(DictationEvent::Recognizing);

    // Whisper rejects clips under about a second of audio
    let size = std::fs::metadata(&clip).map(|m| m.len()).unwrap_or(0);
    if size < constants().min_chunk_bytes {
      info!(size, "dictation: clip too short");
      let _ = std::fs::remove_file(&clip);
      let _ = tx.send(DictationEvent::Failed("No speech detected.".to_string()));
      return;
    }

    let model_path = whisper_cli::Size::Small.get_path();
    if !model_path.exists()
      && let Err(e) = download_whisper_model(&tx, &model_path).await
    {
      let _ = tx.send(DictationEvent::Failed(format!("Model download failed: {:#}", e)));
      return;
    }

    let for_whisper = clip.clone();
    let result = tokio::task::spawn_blocking(move || transcribe_clip(&whisper_cache, &for_whisper)).await;
    let _ = std::fs::remove_file(&clip);

    let event = match result {
      Ok(Ok(text)) if !text.is_empty() => {
        info!(chars = text.len(), "dictation: transcribed");
        DictationEvent::Transcript(text)
      }
      Ok(Ok(_)) => DictationEvent::Failed("No speech detected.".to_string()),
      Ok(Err(e)) => {
        warn!(err = %e, "dictation: transcription failed");
        DictationEvent::Failed(format!("{:#}", e))
      }
      Err(e) => {
        warn!(err = %e, "dictation: transcription task panicked");
        DictationEvent::Failed("Speech recognition failed.".to_string())
      }
    };
    let _ = tx.send(event);
  })
}
