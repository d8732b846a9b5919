//! Locating and fetching the prover's setup artifacts

use std::{
    convert::Infallible,
    fmt::{self, Display},
    path::{Path, PathBuf},
    str::FromStr,
    sync::Arc,
};

use crisp_common::{
    constants::{CIRCUIT_PROGRAM_FILE, PROVING_KEY_FILE},
    errors::VoteError,
};
use tracing::debug;

use crate::prover::CryptoContext;

/// Where a binary artifact lives
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ArtifactSource {
    /// A file on the local filesystem
    Path(PathBuf),
    /// A resource served over HTTP(S)
    Url(String),
    /// Bytes already in memory
    Bytes(Arc<[u8]>),
}

impl FromStr for ArtifactSource {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.starts_with("http://") || s.starts_with("https://") {
            Ok(ArtifactSource::Url(s.to_string()))
        } else {
            Ok(ArtifactSource::Path(PathBuf::from(s)))
        }
    }
}

impl Display for ArtifactSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArtifactSource::Path(path) => write!(f, "{}", path.display()),
            ArtifactSource::Url(url) => write!(f, "{url}"),
            ArtifactSource::Bytes(bytes) => write!(f, "<{} bytes in memory>", bytes.len()),
        }
    }
}

impl ArtifactSource {
    /// Reads the artifact's bytes
    pub async fn fetch(&self, http: &reqwest::Client) -> Result<Vec<u8>, VoteError> {
        let fetch_err = |e: &dyn Display| VoteError::Initialization(format!("fetching {self}: {e}"));

        let bytes = match self {
            ArtifactSource::Path(path) => tokio::fs::read(path).await.map_err(|e| fetch_err(&e))?,
            ArtifactSource::Url(url) => http
                .get(url)
                .send()
                .await
                .and_then(reqwest::Response::error_for_status)
                .map_err(|e| fetch_err(&e))?
                .bytes()
                .await
                .map_err(|e| fetch_err(&e))?
                .to_vec(),
            ArtifactSource::Bytes(bytes) => bytes.to_vec(),
        };

        debug!(source = %self, num_bytes = bytes.len(), "fetched artifact");
        Ok(bytes)
    }
}

/// The sources of the circuit program and proving key
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ArtifactSources {
    /// The compiled vote circuit
    pub circuit: ArtifactSource,
    /// The Groth16 proving key
    pub proving_key: ArtifactSource,
}

impl ArtifactSources {
    /// The artifacts under their default names in `dir`
    pub fn from_dir(dir: &Path) -> Self {
        Self {
            circuit: ArtifactSource::Path(dir.join(CIRCUIT_PROGRAM_FILE)),
            proving_key: ArtifactSource::Path(dir.join(PROVING_KEY_FILE)),
        }
    }

    /// Fetches both artifacts concurrently and parses them into a context
    pub async fn load(&self, http: &reqwest::Client) -> Result<CryptoContext, VoteError> {
        let (program, proving_key) =
            tokio::try_join!(self.circuit.fetch(http), self.proving_key.fetch(http))?;

        CryptoContext::from_bytes(&program, &proving_key)
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use crisp_common::errors::VoteError;

    use super::{ArtifactSource, ArtifactSources};

    #[test]
    fn test_parse_source() {
        assert_eq!(
            "https://example.org/vote_integrity.circuit".parse::<ArtifactSource>(),
            Ok(ArtifactSource::Url(
                "https://example.org/vote_integrity.circuit".to_string()
            ))
        );
        assert_eq!(
            "artifacts/vote_integrity_0001.zkey".parse::<ArtifactSource>(),
            Ok(ArtifactSource::Path(PathBuf::from(
                "artifacts/vote_integrity_0001.zkey"
            )))
        );
    }

    #[tokio::test]
    async fn test_missing_file_is_initialization_error() {
        let sources = ArtifactSources::from_dir(&PathBuf::from("/nonexistent/artifacts"));

        let res = sources.load(&reqwest::Client::new()).await;
        assert!(matches!(res, Err(VoteError::Initialization(msg)) if msg.contains("/nonexistent")));
    }
}
