use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::{debug, info};

use super::slides::{self, Palette, HEIGHT, WIDTH};
use super::{RenderError, RenderRequest, Renderer, VoiceConfig};
use crate::jobs::{Artifact, JobId};

const FRAME_RATE: u32 = 24;

/// Renders videos with external tools: `espeak-ng` for speech and
/// `ffmpeg` for slide composition and encoding.
pub struct FfmpegRenderer {
    ffmpeg: PathBuf,
    espeak: PathBuf,
    output_dir: PathBuf,
}

impl FfmpegRenderer {
    pub fn new(ffmpeg: PathBuf, espeak: PathBuf, output_dir: PathBuf) -> Self {
        Self {
            ffmpeg,
            espeak,
            output_dir,
        }
    }

    /// Speak the contents of `script` into `output`
    async fn synthesize(&self, script: &Path, voice: &VoiceConfig, output: &Path) -> Result<(), RenderError> {
        let args = espeak_args(script, voice, output);
        debug!("espeak args: {:?}", args);

        let result = Command::new(&self.espeak)
            .args(&args)
            .output()
            .await
            .map_err(|e| RenderError::Speech(format!("failed to execute {}: {}", self.espeak.display(), e)))?;

        if !result.status.success() {
            return Err(RenderError::Speech(last_line(&result.stderr, result.status)));
        }
        Ok(())
    }

    async fn encode(&self, args: &[String]) -> Result<(), RenderError> {
        debug!("FFmpeg args: {:?}", args);

        let result = Command::new(&self.ffmpeg)
            .args(args)
            .output()
            .await
            .map_err(|e| RenderError::Encode(format!("failed to execute {}: {}", self.ffmpeg.display(), e)))?;

        if !result.status.success() {
            return Err(RenderError::Encode(last_line(&result.stderr, result.status)));
        }
        Ok(())
    }
}

#[async_trait]
impl Renderer for FfmpegRenderer {
    async fn render(&self, job_id: &JobId, request: &RenderRequest) -> Result<Artifact, RenderError> {
        tokio::fs::create_dir_all(&self.output_dir).await?;

        // Removed when dropped, whatever the outcome
        let workdir = tempfile::Builder::new()
            .prefix(&format!("vidgen-{}-", job_id))
            .tempdir()?;

        let script = write_script(workdir.path(), &request.text).await?;
        let audio = workdir.path().join("speech.wav");
        self.synthesize(&script, &request.voice, &audio).await?;

        let layout = slides::layout(&request.text, request.duration_secs);
        let mut textfiles = Vec::with_capacity(layout.len());
        for (i, slide) in layout.iter().enumerate() {
            let path = workdir.path().join(format!("slide_{}.txt", i));
            tokio::fs::write(&path, &slide.text).await?;
            textfiles.push(path);
        }

        let palette = Palette::resolve(&request.style.template, &request.style.color_scheme);
        let pairs: Vec<_> = textfiles.iter().map(PathBuf::as_path).zip(layout.iter()).collect();
        let filter = slides::drawtext_filter(&pairs, &palette, &request.style.font_family);

        let output = self.output_dir.join(format!("{}.mp4", job_id));
        let args = encode_args(&palette, request.duration_secs, &audio, &filter, &output);
        self.encode(&args).await?;

        let size_bytes = tokio::fs::metadata(&output).await?.len();
        info!(%job_id, slides = layout.len(), size_bytes, "Rendered {}", output.display());

        Ok(Artifact {
            path: output,
            size_bytes,
            duration_secs: request.duration_secs,
        })
    }
}

/// Narration text goes through a file so it is never parsed as an option
async fn write_script(workdir: &Path, text: &str) -> Result<PathBuf, RenderError> {
    let path = workdir.join("speech.txt");
    tokio::fs::write(&path, text).await?;
    Ok(path)
}

/// espeak-ng arguments for the requested voice and speed
fn espeak_args(script: &Path, voice: &VoiceConfig, output: &Path) -> Vec<String> {
    let language = if voice.voice_type.contains("british") { "en-gb" } else { "en-us" };
    let variant = if voice.voice_type.contains("female") { "f3" } else { "m3" };
    let words_per_minute = match voice.speech_speed.as_str() {
        "slow" => 130,
        "fast" => 220,
        _ => 175,
    };

    vec![
        "-v".to_string(),
        format!("{}+{}", language, variant),
        "-s".to_string(),
        words_per_minute.to_string(),
        "-w".to_string(),
        output.to_string_lossy().to_string(),
        "-f".to_string(),
        script.to_string_lossy().to_string(),
    ]
}

/// ffmpeg arguments: solid canvas for the full duration, slide text on top,
/// speech as the audio track, cut at whichever stream ends first
fn encode_args(palette: &Palette, duration_secs: u32, audio: &Path, filter: &str, output: &Path) -> Vec<String> {
    vec![
        "-y".to_string(),
        "-f".to_string(),
        "lavfi".to_string(),
        "-i".to_string(),
        format!(
            "color=c={}:s={}x{}:r={}:d={}",
            palette.background_hex(),
            WIDTH,
            HEIGHT,
            FRAME_RATE,
            duration_secs
        ),
        "-i".to_string(),
        audio.to_string_lossy().to_string(),
        "-vf".to_string(),
        filter.to_string(),
        "-c:v".to_string(),
        "libx264".to_string(),
        "-pix_fmt".to_string(),
        "yuv420p".to_string(),
        "-r".to_string(),
        FRAME_RATE.to_string(),
        "-c:a".to_string(),
        "aac".to_string(),
        "-shortest".to_string(),
        "-movflags".to_string(),
        "+faststart".to_string(),
        output.to_string_lossy().to_string(),
    ]
}

fn last_line(stderr: &[u8], status: std::process::ExitStatus) -> String {
    String::from_utf8_lossy(stderr)
        .lines()
        .rev()
        .find(|line| !line.trim().is_empty())
        .map(|line| line.trim().to_string())
        .unwrap_or_else(|| format!("exited with {}", status))
}
