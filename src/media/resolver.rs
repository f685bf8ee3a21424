use anyhow::{anyhow, bail, Context, Result};
use std::process::Command;
use url::Url;

use crate::config::{CommandSettings, VideoEntry};

/// Something the media player can open directly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayableSource {
    pub title: String,
    pub location: String,
}

/// Turns a playlist reference into a playable location.
pub trait SourceResolver: Send + Sync {
    fn resolve(&self, video: &VideoEntry) -> Result<PlayableSource>;
}

/// Uses the reference as-is.
pub struct PassthroughResolver;

impl SourceResolver for PassthroughResolver {
    fn resolve(&self, video: &VideoEntry) -> Result<PlayableSource> {
        if video.source.trim().is_empty() {
            bail!("video {} has an empty source", video.title);
        }
        Ok(PlayableSource {
            title: video.title.clone(),
            location: video.source.clone(),
        })
    }
}

/// Pipes URLs through an external extractor (`yt-dlp -g`, for instance).
/// Local paths skip the extractor.
pub struct CommandResolver {
    program: String,
    args: Vec<String>,
}

impl CommandResolver {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    pub fn from_settings(settings: &CommandSettings) -> Option<Self> {
        settings
            .command
            .as_ref()
            .map(|program| Self::new(program.clone(), settings.args.clone()))
    }
}

impl SourceResolver for CommandResolver {
    fn resolve(&self, video: &VideoEntry) -> Result<PlayableSource> {
        if !is_remote(&video.source) {
            return PassthroughResolver.resolve(video);
        }

        let output = Command::new(&self.program)
            .args(&self.args)
            .arg(&video.source)
            .output()
            .with_context(|| format!("failed to launch resolver {}", self.program))?;

        if !output.status.success() {
            bail!(
                "resolver exited with {} for {}: {}",
                output.status,
                video.source,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let location = stdout
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .ok_or_else(|| anyhow!("resolver returned no stream for {}", video.source))?;

        Ok(PlayableSource {
            title: video.title.clone(),
            location: location.to_string(),
        })
    }
}

pub fn resolver_from_settings(settings: &CommandSettings) -> Box<dyn SourceResolver> {
    match CommandResolver::from_settings(settings) {
        Some(resolver) => Box::new(resolver),
        None => Box::new(PassthroughResolver),
    }
}

fn is_remote(source: &str) -> bool {
    Url::parse(source)
        .map(|url| matches!(url.scheme(), "http" | "https"))
        .unwrap_or(false)
}
