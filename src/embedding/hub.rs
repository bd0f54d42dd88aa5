//! Access tokens and model file downloads from the Hugging Face Hub.

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

use super::error::{EmbedError, EmbedResult};

const HUB_URL: &str = "https://huggingface.co";

/// Environment variables holding an access token, highest precedence first.
pub const TOKEN_ENV_VARS: [&str; 3] = ["HUGGINGFACE_API_KEY", "HF_TOKEN", "HUGGING_FACE_HUB_TOKEN"];

const TOKENIZER_FILE: &str = "tokenizer.json";

/// Suffix ONNX uses for the weights file of a graph saved with external data.
const EXTERNAL_DATA_SUFFIX: &str = "_data";

/// First non-empty token among [`TOKEN_ENV_VARS`].
pub fn credential_from_env() -> Option<String> {
    credential_from(|name| std::env::var(name).ok())
}

/// Same as [`credential_from_env`] with an injectable variable lookup.
pub fn credential_from(lookup: impl Fn(&str) -> Option<String>) -> Option<String> {
    TOKEN_ENV_VARS
        .iter()
        .filter_map(|name| lookup(name))
        .map(|value| value.trim().to_string())
        .find(|value| !value.is_empty())
}

/// An explicit token if given, otherwise the environment; missing is a
/// configuration error.
pub fn require_credential(explicit: Option<&str>) -> EmbedResult<String> {
    explicit
        .map(str::to_string)
        .or_else(credential_from_env)
        .ok_or_else(|| {
            EmbedError::Configuration(format!(
                "no access token found; set one of {}",
                TOKEN_ENV_VARS.join(", ")
            ))
        })
}

/// Local paths of one model's files inside the cache directory.
#[derive(Debug, Clone)]
pub struct ModelFiles {
    pub dir: PathBuf,
    pub model: PathBuf,
    pub tokenizer: PathBuf,
    /// Weights sidecar next to the graph. Only large exports have one.
    pub external_data: PathBuf,
    onnx_file: String,
}

impl ModelFiles {
    /// `<cache_dir>/<org>--<name>/` with the ONNX graph, its `<graph>_data`
    /// sidecar and `tokenizer.json`, flattened into one directory.
    pub fn new(cache_dir: &Path, model_id: &str, onnx_file: &str) -> Self {
        let dir = cache_dir.join(model_id.replace('/', "--"));
        let graph = onnx_file.rsplit('/').next().unwrap_or(onnx_file);
        let model = dir.join(graph);
        let external_data = dir.join(format!("{graph}{EXTERNAL_DATA_SUFFIX}"));
        let tokenizer = dir.join(TOKENIZER_FILE);
        Self {
            dir,
            model,
            tokenizer,
            external_data,
            onnx_file: onnx_file.to_string(),
        }
    }

    fn external_data_file(&self) -> String {
        format!("{}{EXTERNAL_DATA_SUFFIX}", self.onnx_file)
    }

    pub fn exist(&self) -> bool {
        self.model.exists() && self.tokenizer.exists()
    }
}

fn resolve_url(model_id: &str, file: &str) -> String {
    format!("{HUB_URL}/{model_id}/resolve/main/{file}")
}

/// Download whichever of the model files are missing. The external-data sidecar
/// is fetched too when the repository has one; a 404 for it is not an error.
pub async fn download_model_files(
    files: &ModelFiles,
    model_id: &str,
    credential: Option<&str>,
) -> Result<()> {
    std::fs::create_dir_all(&files.dir)
        .with_context(|| format!("failed to create cache dir: {}", files.dir.display()))?;

    let external_data = files.external_data_file();
    for (remote, local, required) in [
        (files.onnx_file.as_str(), &files.model, true),
        (external_data.as_str(), &files.external_data, false),
        (TOKENIZER_FILE, &files.tokenizer, true),
    ] {
        if local.exists() {
            tracing::info!(path = %local.display(), "model file already present");
            continue;
        }
        tracing::info!(model = model_id, file = remote, "downloading model file");
        if download_file(&resolve_url(model_id, remote), local, credential, required).await? {
            tracing::info!(path = %local.display(), "model file saved");
        } else {
            tracing::debug!(model = model_id, file = remote, "no external data, weights are inline");
        }
    }

    Ok(())
}

/// Download a file from a URL with progress bar. Uses atomic write (tmp + rename).
///
/// Returns `false` without writing anything when the file is not `required` and
/// the server answers 404.
async fn download_file(
    url: &str,
    dest: &Path,
    credential: Option<&str>,
    required: bool,
) -> Result<bool> {
    let client = reqwest::Client::new();
    let mut request = client.get(url);
    if let Some(token) = credential {
        request = request.bearer_auth(token);
    }
    let mut response = request
        .send()
        .await
        .with_context(|| format!("HTTP request failed for {url}"))?;

    if !required && response.status() == reqwest::StatusCode::NOT_FOUND {
        return Ok(false);
    }
    anyhow::ensure!(
        response.status().is_success(),
        "download of {url} failed with HTTP {}",
        response.status()
    );

    let pb = match response.content_length() {
        Some(size) => {
            let pb = ProgressBar::new(size);
            pb.set_style(
                ProgressStyle::default_bar()
                    .template("  {bar:40.cyan/blue} {bytes}/{total_bytes} ({eta})")
                    .context("invalid progress template")?
                    .progress_chars("##-"),
            );
            pb
        }
        None => ProgressBar::new_spinner(),
    };

    let tmp_path = dest.with_extension("tmp");
    let mut file = tokio::fs::File::create(&tmp_path)
        .await
        .with_context(|| format!("failed to create temp file: {}", tmp_path.display()))?;

    while let Some(chunk) = response.chunk().await.context("error reading response")? {
        file.write_all(&chunk)
            .await
            .context("error writing to file")?;
        pb.inc(chunk.len() as u64);
    }

    file.flush().await?;
    drop(file);

    tokio::fs::rename(&tmp_path, dest)
        .await
        .context("failed to rename temp file")?;

    pb.finish_and_clear();
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn credential_precedence() {
        let vars = env(&[("HF_TOKEN", "second"), ("HUGGINGFACE_API_KEY", "first")]);
        assert_eq!(credential_from(|k| vars.get(k).cloned()).as_deref(), Some("first"));

        let vars = env(&[("HUGGING_FACE_HUB_TOKEN", "third"), ("HF_TOKEN", "second")]);
        assert_eq!(credential_from(|k| vars.get(k).cloned()).as_deref(), Some("second"));
    }

    #[test]
    fn blank_credentials_are_skipped() {
        let vars = env(&[("HUGGINGFACE_API_KEY", "  "), ("HF_TOKEN", "real")]);
        assert_eq!(credential_from(|k| vars.get(k).cloned()).as_deref(), Some("real"));
        assert_eq!(credential_from(|_| None), None);
    }

    #[test]
    fn explicit_credential_wins() {
        assert_eq!(require_credential(Some("explicit")).unwrap(), "explicit");
    }

    #[test]
    fn model_files_layout() {
        let files = ModelFiles::new(
            Path::new("/cache"),
            "AITeamVN/Vietnamese_Embedding",
            "onnx/model.onnx",
        );
        assert_eq!(files.dir, PathBuf::from("/cache/AITeamVN--Vietnamese_Embedding"));
        assert_eq!(
            files.model,
            PathBuf::from("/cache/AITeamVN--Vietnamese_Embedding/model.onnx")
        );
        assert_eq!(
            files.tokenizer,
            PathBuf::from("/cache/AITeamVN--Vietnamese_Embedding/tokenizer.json")
        );
        assert_eq!(
            files.external_data,
            PathBuf::from("/cache/AITeamVN--Vietnamese_Embedding/model.onnx_data")
        );
        assert!(!files.exist());
    }

    #[test]
    fn hub_urls() {
        assert_eq!(
            resolve_url("BAAI/bge-m3", "onnx/model.onnx"),
            "https://huggingface.co/BAAI/bge-m3/resolve/main/onnx/model.onnx"
        );
        let files = ModelFiles::new(Path::new("/cache"), "BAAI/bge-m3", "onnx/model.onnx");
        assert_eq!(
            resolve_url("BAAI/bge-m3", &files.external_data_file()),
            "https://huggingface.co/BAAI/bge-m3/resolve/main/onnx/model.onnx_data"
        );
    }

    #[test]
    fn external_data_sits_beside_the_graph() {
        // The graph names its sidecar relative to itself, so both must share a directory.
        let files = ModelFiles::new(Path::new("/cache"), "org/name", "model.onnx");
        assert_eq!(files.model.parent(), files.external_data.parent());
        assert_eq!(files.external_data.file_name().unwrap(), "model.onnx_data");
    }
}
