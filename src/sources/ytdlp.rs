use anyhow::{Context, Result};
use async_process::Command;
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, info};
use url::Url;

use super::{ResolvedTrack, TrackResolver};

/// Resolver basado en yt-dlp.
///
/// Una búsqueda de texto libre se convierte en `ytsearch1:<query>` (primer
/// resultado o ninguno); las URLs se pasan tal cual. La llamada externa va
/// acotada por timeout para no dejar peticiones suspendidas indefinidamente.
pub struct YtDlpResolver {
    bin: String,
    timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct YtDlpEntry {
    url: Option<String>,
    title: Option<String>,
    webpage_url: Option<String>,
}

impl YtDlpResolver {
    pub fn new(bin: impl Into<String>, timeout: Duration) -> Self {
        Self {
            bin: bin.into(),
            timeout,
        }
    }

    /// Verifica que el binario de yt-dlp exista y responda.
    pub async fn verify_available(&self) -> Result<()> {
        let output = Command::new(&self.bin)
            .arg("--version")
            .output()
            .await
            .with_context(|| format!("no se pudo ejecutar {}", self.bin))?;

        if !output.status.success() {
            anyhow::bail!("{} --version terminó con error", self.bin);
        }

        let version = String::from_utf8_lossy(&output.stdout);
        info!("✅ yt-dlp disponible, versión {}", version.trim());
        Ok(())
    }

    fn target_for(query: &str) -> String {
        let is_url = query.starts_with("http") && Url::parse(query).is_ok();
        if is_url {
            query.to_string()
        } else {
            format!("ytsearch1:{query}")
        }
    }

    async fn extract(&self, target: &str) -> Result<Option<ResolvedTrack>> {
        let output = Command::new(&self.bin)
            .arg("--no-playlist")
            .arg("--quiet")
            .arg("--no-warnings")
            .arg("-f")
            .arg("bestaudio/best")
            .arg("-j")
            .arg(target)
            .output()
            .await
            .with_context(|| format!("no se pudo ejecutar {}", self.bin))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("yt-dlp terminó con error: {}", stderr.trim());
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        parse_output(&stdout)
    }
}

/// Interpreta la salida `-j` de yt-dlp: una línea JSON por entrada, salida
/// vacía cuando la búsqueda no encontró nada.
fn parse_output(stdout: &str) -> Result<Option<ResolvedTrack>> {
    let Some(line) = stdout
        .lines()
        .map(str::trim)
        .find(|line| line.starts_with('{'))
    else {
        return Ok(None);
    };

    let entry: YtDlpEntry =
        serde_json::from_str(line).context("salida de yt-dlp no es JSON válido")?;

    match entry.url {
        Some(stream_url) => Ok(Some(ResolvedTrack {
            stream_url,
            title: entry.title.unwrap_or_else(|| "Unknown Title".to_string()),
            source_url: entry.webpage_url,
        })),
        // Entrada sin formato de audio utilizable
        None => Ok(None),
    }
}

#[async_trait]
impl TrackResolver for YtDlpResolver {
    async fn resolve(&self, query: &str) -> Result<Option<ResolvedTrack>> {
        let target = Self::target_for(query);
        debug!("🔍 Resolviendo: {}", target);

        match timeout(self.timeout, self.extract(&target)).await {
            Ok(result) => result,
            Err(_) => anyhow::bail!(
                "yt-dlp no respondió en {}s para: {}",
                self.timeout.as_secs(),
                target
            ),
        }
    }
}
