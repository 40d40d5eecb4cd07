//! On-device model runtime
//!
//! Quantized GGUF weights are downloaded into a cache directory and run by a
//! llama.cpp style executable (`llama-cli` by default). Nothing leaves the
//! machine once the weights are cached.

use super::{Backend, BackendDescriptor};
use crate::error::{Error, Result};
use crate::provider::Provider;
use async_trait::async_trait;
use futures_util::{Stream, StreamExt};
use reqwest::Client;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info};

pub const DEFAULT_RUNTIME_PROGRAM: &str = "llama-cli";
const MAX_NEW_TOKENS: u32 = 1024;

#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeModel {
    pub id: &'static str,
    pub name: &'static str,
    pub size: &'static str,
    pub size_gb: f32,
    pub description: &'static str,
    pub recommended: bool,
    pub url: &'static str,
    pub file_name: &'static str,
}

const CATALOG: &[RuntimeModel] = &[
    RuntimeModel {
        id: "phi-2",
        name: "Phi-2",
        size: "1.4GB",
        size_gb: 1.4,
        description: "Microsoft's efficient 2.7B model, good on modest hardware",
        recommended: true,
        url: "https://huggingface.co/TheBloke/phi-2-GGUF/resolve/main/phi-2.Q4_K_M.gguf",
        file_name: "phi-2.Q4_K_M.gguf",
    },
    RuntimeModel {
        id: "gemma-2b",
        name: "Gemma 2B",
        size: "1.5GB",
        size_gb: 1.5,
        description: "Google's lightweight model for conversations",
        recommended: true,
        url: "https://huggingface.co/lmstudio-ai/gemma-2b-it-GGUF/resolve/main/gemma-2b-it-q4_k_m.gguf",
        file_name: "gemma-2b-it-q4_k_m.gguf",
    },
    RuntimeModel {
        id: "tinyllama",
        name: "TinyLlama",
        size: "637MB",
        size_gb: 0.637,
        description: "Ultra-small model for basic conversations",
        recommended: false,
        url: "https://huggingface.co/TheBloke/TinyLlama-1.1B-Chat-v1.0-GGUF/resolve/main/tinyllama-1.1b-chat-v1.0.Q4_K_M.gguf",
        file_name: "tinyllama-1.1b-chat-v1.0.Q4_K_M.gguf",
    },
    RuntimeModel {
        id: "mistral-7b",
        name: "Mistral 7B",
        size: "4.2GB",
        size_gb: 4.2,
        description: "High-quality model (requires 8GB+ RAM)",
        recommended: false,
        url: "https://huggingface.co/TheBloke/Mistral-7B-Instruct-v0.2-GGUF/resolve/main/mistral-7b-instruct-v0.2.Q4_K_M.gguf",
        file_name: "mistral-7b-instruct-v0.2.Q4_K_M.gguf",
    },
];

pub fn catalog() -> &'static [RuntimeModel] {
    CATALOG
}

pub fn find_model(id: &str) -> Result<&'static RuntimeModel> {
    CATALOG
        .iter()
        .find(|m| m.id == id)
        .ok_or_else(|| Error::UnknownModel(id.to_string()))
}

/// Best catalog model for a device with this much memory
pub fn recommended_model(ram_gb: f32) -> &'static RuntimeModel {
    let id = if ram_gb >= 8.0 {
        "phi-2"
    } else if ram_gb >= 6.0 {
        "gemma-2b"
    } else {
        "tinyllama"
    };
    // Every id above is in the catalog
    CATALOG.iter().find(|m| m.id == id).unwrap_or(&CATALOG[0])
}

/// A model needs at least twice its weight size in RAM
pub fn is_suitable(model_id: &str, ram_gb: f32) -> bool {
    find_model(model_id)
        .map(|m| ram_gb >= m.size_gb * 2.0)
        .unwrap_or(false)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DownloadProgress {
    pub downloaded: u64,
    pub total: Option<u64>,
}

impl DownloadProgress {
    pub fn fraction(&self) -> Option<f64> {
        self.total
            .filter(|t| *t > 0)
            .map(|t| (self.downloaded as f64 / t as f64).min(1.0))
    }
}

#[derive(Clone)]
pub struct ModelRuntime {
    client: Client,
    program: String,
    cache_dir: PathBuf,
}

impl ModelRuntime {
    pub fn new(program: &str, cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            client: Client::new(),
            program: program.to_string(),
            cache_dir: cache_dir.into(),
        }
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Resolve the runtime executable on PATH (or as given, if it is a path)
    pub fn program_path(&self) -> Option<PathBuf> {
        which::which(&self.program).ok()
    }

    pub fn model_path(&self, model: &RuntimeModel) -> PathBuf {
        self.cache_dir.join(model.file_name)
    }

    pub fn is_cached(&self, model_id: &str) -> bool {
        find_model(model_id)
            .map(|m| self.model_path(m).is_file())
            .unwrap_or(false)
    }

    pub fn cached_models(&self) -> Vec<&'static RuntimeModel> {
        CATALOG
            .iter()
            .filter(|m| self.model_path(m).is_file())
            .collect()
    }

    /// Stream a model's weights into the cache, reporting progress per chunk
    pub async fn download<F>(&self, model_id: &str, progress: F) -> Result<PathBuf>
    where
        F: FnMut(DownloadProgress),
    {
        let model = find_model(model_id)?;
        self.download_from(model, model.url, progress).await
    }

    pub async fn download_from<F>(
        &self,
        model: &RuntimeModel,
        url: &str,
        mut progress: F,
    ) -> Result<PathBuf>
    where
        F: FnMut(DownloadProgress),
    {
        tokio::fs::create_dir_all(&self.cache_dir).await?;
        let target = self.model_path(model);
        let partial = target.with_extension("gguf.part");

        info!("Downloading {} ({}) from {}", model.name, model.size, url);
        let response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(Error::backend_status(
                "runtime",
                response.status().as_u16(),
                format!("download of {} failed", model.id),
            ));
        }

        let total = response.content_length();
        stream_to_file(response.bytes_stream(), &partial, total, &mut progress).await?;

        tokio::fs::rename(&partial, &target).await?;
        info!("Cached {} at {}", model.id, target.display());
        Ok(target)
    }

    /// Remove cached weights and partial downloads; returns files removed
    pub fn clear_cache(&self) -> Result<usize> {
        if !self.cache_dir.exists() {
            return Ok(0);
        }
        let mut removed = 0;
        for entry in std::fs::read_dir(&self.cache_dir)? {
            let path = entry?.path();
            let name = path
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or_default();
            if name.ends_with(".gguf") || name.ends_with(".gguf.part") {
                std::fs::remove_file(&path)?;
                removed += 1;
            }
        }
        debug!("Removed {} cached model files", removed);
        Ok(removed)
    }

    pub async fn generate(&self, model_id: &str, prompt: &str) -> Result<String> {
        let model = find_model(model_id)?;
        let weights = self.model_path(model);
        if !weights.is_file() {
            return Err(Error::Runtime(format!("{} is not downloaded", model.id)));
        }
        let program = self
            .program_path()
            .ok_or_else(|| Error::Runtime(format!("{} not found on PATH", self.program)))?;

        let output = Command::new(program)
            .arg("-m")
            .arg(&weights)
            .arg("-p")
            .arg(prompt)
            .arg("-n")
            .arg(MAX_NEW_TOKENS.to_string())
            .arg("--temp")
            .arg("0.7")
            .arg("--no-display-prompt")
            .kill_on_drop(true)
            .output()
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::Runtime(stderr.trim().to_string()));
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

#[async_trait]
impl Backend for ModelRuntime {
    fn provider(&self) -> Provider {
        Provider::Runtime
    }

    async fn probe(&self) -> Result<Vec<BackendDescriptor>> {
        if self.program_path().is_none() {
            return Err(Error::Runtime(format!("{} not found on PATH", self.program)));
        }
        Ok(self
            .cached_models()
            .into_iter()
            .map(|m| BackendDescriptor::new(Provider::Runtime, m.id).with_size(m.size))
            .collect())
    }

    async fn complete(&self, model: &str, prompt: &str) -> Result<String> {
        self.generate(model, prompt).await
    }
}

/// Write a byte stream to `path`; the file is removed again if the stream
/// or the write fails part way.
async fn stream_to_file<S, B, E, F>(
    stream: S,
    path: &Path,
    total: Option<u64>,
    progress: &mut F,
) -> Result<()>
where
    S: Stream<Item = std::result::Result<B, E>>,
    B: AsRef<[u8]>,
    E: Into<Error>,
    F: FnMut(DownloadProgress),
{
    let written = write_chunks(stream, path, total, progress).await;
    if written.is_err() {
        if let Err(e) = tokio::fs::remove_file(path).await {
            debug!("Could not remove {}: {}", path.display(), e);
        }
    }
    written
}

async fn write_chunks<S, B, E, F>(
    stream: S,
    path: &Path,
    total: Option<u64>,
    progress: &mut F,
) -> Result<()>
where
    S: Stream<Item = std::result::Result<B, E>>,
    B: AsRef<[u8]>,
    E: Into<Error>,
    F: FnMut(DownloadProgress),
{
    futures_util::pin_mut!(stream);
    let mut file = tokio::fs::File::create(path).await?;
    let mut downloaded = 0u64;
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(Into::into)?;
        let bytes = chunk.as_ref();
        file.write_all(bytes).await?;
        downloaded += bytes.len() as u64;
        progress(DownloadProgress { downloaded, total });
    }
    file.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_recommended_model_by_ram() {
        assert_eq!(recommended_model(16.0).id, "phi-2");
        assert_eq!(recommended_model(8.0).id, "phi-2");
        assert_eq!(recommended_model(6.0).id, "gemma-2b");
        assert_eq!(recommended_model(4.0).id, "tinyllama");
    }

    #[test]
    fn test_suitability_needs_twice_the_size() {
        assert!(is_suitable("tinyllama", 2.0));
        assert!(is_suitable("phi-2", 4.0));
        assert!(!is_suitable("mistral-7b", 8.0));
        assert!(is_suitable("mistral-7b", 8.4));
        assert!(!is_suitable("gpt-5", 64.0));
    }

    #[test]
    fn test_catalog_contents() {
        let ids: Vec<_> = catalog().iter().map(|m| m.id).collect();
        assert_eq!(ids, vec!["phi-2", "gemma-2b", "tinyllama", "mistral-7b"]);
        assert!(matches!(find_model("nope"), Err(Error::UnknownModel(_))));
    }

    #[test]
    fn test_cache_detection_and_clearing() {
        let dir = tempdir().unwrap();
        let runtime = ModelRuntime::new("definitely-not-a-runtime", dir.path());
        assert!(runtime.cached_models().is_empty());

        let tiny = find_model("tinyllama").unwrap();
        std::fs::write(runtime.model_path(tiny), b"weights").unwrap();
        std::fs::write(dir.path().join("phi-2.Q4_K_M.gguf.part"), b"half").unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"keep").unwrap();

        assert!(runtime.is_cached("tinyllama"));
        assert!(!runtime.is_cached("phi-2"));
        assert_eq!(runtime.cached_models().len(), 1);

        assert_eq!(runtime.clear_cache().unwrap(), 2);
        assert!(!runtime.is_cached("tinyllama"));
        assert!(dir.path().join("notes.txt").exists());
    }

    #[tokio::test]
    async fn test_probe_fails_without_program() {
        let dir = tempdir().unwrap();
        let runtime = ModelRuntime::new("definitely-not-a-runtime", dir.path());
        assert!(runtime.probe().await.is_err());
    }

    #[tokio::test]
    async fn test_generate_requires_cached_weights() {
        let dir = tempdir().unwrap();
        let runtime = ModelRuntime::new("echo", dir.path());
        let err = runtime.generate("phi-2", "hello").await.unwrap_err();
        assert!(matches!(err, Error::Runtime(_)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_generate_runs_program() {
        let dir = tempdir().unwrap();
        let runtime = ModelRuntime::new("echo", dir.path());
        let tiny = find_model("tinyllama").unwrap();
        std::fs::write(runtime.model_path(tiny), b"weights").unwrap();

        let out = runtime.generate("tinyllama", "hello there").await.unwrap();
        assert!(out.contains("hello there"));

        let found = runtime.probe().await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].identifier(), "runtime:tinyllama");
    }

    #[test]
    fn test_progress_fraction() {
        let p = DownloadProgress { downloaded: 50, total: Some(200) };
        assert_eq!(p.fraction(), Some(0.25));
        let unknown = DownloadProgress { downloaded: 50, total: None };
        assert_eq!(unknown.fraction(), None);
    }

    #[tokio::test]
    async fn test_interrupted_download_leaves_no_partial_file() {
        let dir = tempdir().unwrap();
        let partial = dir.path().join("tinyllama.gguf.part");
        let chunks: Vec<std::result::Result<Vec<u8>, Error>> = vec![
            Ok(b"first".to_vec()),
            Err(Error::Runtime("connection reset".into())),
            Ok(b"never".to_vec()),
        ];
        let mut seen = Vec::new();
        let err = stream_to_file(
            futures_util::stream::iter(chunks),
            &partial,
            Some(100),
            &mut |p: DownloadProgress| seen.push(p.downloaded),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, Error::Runtime(_)));
        assert_eq!(seen, vec![5]);
        assert!(!partial.exists());

        let complete: Vec<std::result::Result<Vec<u8>, Error>> =
            vec![Ok(b"all ".to_vec()), Ok(b"weights".to_vec())];
        let mut ignore = |_: DownloadProgress| {};
        stream_to_file(futures_util::stream::iter(complete), &partial, None, &mut ignore)
            .await
            .unwrap();
        assert_eq!(std::fs::read(&partial).unwrap(), b"all weights");
    }
}
