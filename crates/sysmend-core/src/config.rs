//! TOML configuration.
//!
//! Every field has a default, so an empty file (or no file) is valid:
//!
//! ```toml
//! [ollama]
//! model = "llama3.1:8b"
//!
//! [index]
//! dir = "/var/lib/sysmend/index"
//! embedder = "hash"
//!
//! [retrieval]
//! similarity_threshold = 0.35
//!
//! [orchestrator]
//! max_retries = 3
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use ollama_client::{OllamaClient, OllamaConfig};
use serde::{Deserialize, Serialize};
use solution_index::{Embedder, HashEmbedder, OllamaEmbedder, SolutionIndex, DEFAULT_COLLECTION};
use tracing::debug;

use crate::agent::{standard_registry, AgentConfig, DiagnosticAgent, InferenceProvider};
use crate::confirm::ConfirmationGate;
use crate::domain::{RepairError, Result};
use crate::exec::{CommandRunner, ExecutionConfig, ExecutionEngine, ValidationChecker};
use crate::orchestrator::{OrchestratorConfig, RepairOrchestrator};
use crate::retrieval::{RetrievalConfig, SolutionRetriever};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbedderKind {
    /// Deterministic hashed bag-of-words; no network.
    Hash,
    /// Ollama `/api/embed` with `ollama.embed_model`.
    Ollama,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    pub dir: PathBuf,
    pub collection: String,
    pub embedder: EmbedderKind,
    pub dimension: usize,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("/var/lib/sysmend/index"),
            collection: DEFAULT_COLLECTION.to_string(),
            embedder: EmbedderKind::Hash,
            dimension: HashEmbedder::DEFAULT_DIMENSION,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    pub dir: PathBuf,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("/var/lib/sysmend/sessions"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SysmendConfig {
    pub ollama: OllamaConfig,
    pub index: IndexConfig,
    pub retrieval: RetrievalConfig,
    pub agent: AgentConfig,
    pub execution: ExecutionConfig,
    pub orchestrator: OrchestratorConfig,
    pub reports: ReportConfig,
}

impl SysmendConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config = Self::parse(&raw)?;
        debug!(path = %path.display(), "configuration loaded");
        Ok(config)
    }

    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => {
                let config = Self::default();
                config.validate()?;
                Ok(config)
            }
        }
    }

    pub fn parse(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: &str| Err(RepairError::InvalidConfig(msg.to_string()));

        if !(0.0..=1.0).contains(&self.retrieval.similarity_threshold) {
            return invalid("retrieval.similarity_threshold must be within [0, 1]");
        }
        if self.retrieval.top_k == 0 {
            return invalid("retrieval.top_k must be at least 1");
        }
        if self.retrieval.tie_epsilon < 0.0 {
            return invalid("retrieval.tie_epsilon must not be negative");
        }
        if self.orchestrator.max_retries == 0 {
            return invalid("orchestrator.max_retries must be at least 1");
        }
        if self.agent.max_tool_rounds == 0 {
            return invalid("agent.max_tool_rounds must be at least 1");
        }
        if self.index.dimension == 0 {
            return invalid("index.dimension must be at least 1");
        }
        if self.index.collection.trim().is_empty() {
            return invalid("index.collection must not be empty");
        }
        let timeouts = [
            ("agent.inference_timeout_ms", self.agent.inference_timeout_ms),
            ("agent.tool_timeout_ms", self.agent.tool_timeout_ms),
            ("execution.step_timeout_ms", self.execution.step_timeout_ms),
            ("execution.validation_timeout_ms", self.execution.validation_timeout_ms),
            ("orchestrator.confirmation_timeout_ms", self.orchestrator.confirmation_timeout_ms),
            ("ollama.request_timeout_secs", self.ollama.request_timeout_secs),
        ];
        if let Some((name, _)) = timeouts.iter().find(|(_, v)| *v == 0) {
            return Err(RepairError::InvalidConfig(format!("{name} must be greater than 0")));
        }
        Ok(())
    }

    pub fn embedder(&self) -> Result<Arc<dyn Embedder>> {
        Ok(match self.index.embedder {
            EmbedderKind::Hash => Arc::new(HashEmbedder::new(self.index.dimension)),
            EmbedderKind::Ollama => Arc::new(OllamaEmbedder::new(
                self.ollama_client()?,
                self.index.dimension,
            )),
        })
    }

    pub fn ollama_client(&self) -> Result<OllamaClient> {
        OllamaClient::new(self.ollama.clone())
            .map_err(|e| RepairError::InvalidConfig(format!("ollama: {e}")))
    }

    /// Open the persisted index described by `[index]`.
    pub fn open_index(&self) -> Result<SolutionIndex> {
        Ok(SolutionIndex::open(
            self.embedder()?,
            self.index.collection.clone(),
            &self.index.dir,
        )?)
    }

    pub fn diagnostic_agent(
        &self,
        provider: Arc<dyn InferenceProvider>,
        runner: Arc<dyn CommandRunner>,
    ) -> Result<DiagnosticAgent> {
        let registry = standard_registry(runner, &self.agent)
            .map_err(|e| RepairError::InvalidConfig(e.to_string()))?;
        Ok(DiagnosticAgent::new(provider, Arc::new(registry), self.agent.clone()))
    }

    /// Assemble a full orchestrator from this configuration.
    pub fn orchestrator(
        &self,
        provider: Arc<dyn InferenceProvider>,
        runner: Arc<dyn CommandRunner>,
        index: Arc<SolutionIndex>,
        gate: Arc<dyn ConfirmationGate>,
    ) -> Result<RepairOrchestrator> {
        Ok(RepairOrchestrator::new(
            self.diagnostic_agent(provider, runner.clone())?,
            SolutionRetriever::new(index, self.retrieval.clone()),
            ExecutionEngine::new(runner.clone(), self.execution.clone()),
            ValidationChecker::new(runner, self.execution.validation_timeout()),
            gate,
            self.orchestrator.clone(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_empty_file_is_default() {
        let config = SysmendConfig::parse("").unwrap();
        assert_eq!(config.retrieval.top_k, 5);
        assert_eq!(config.orchestrator.max_retries, 3);
        assert_eq!(config.agent.syslog_path, "/var/log/syslog");
        assert_eq!(config.index.collection, "ubuntu_solutions");
        assert_eq!(config.index.embedder, EmbedderKind::Hash);
    }

    #[test]
    fn test_partial_sections_merge_with_defaults() {
        let config = SysmendConfig::parse(
            r#"
            [retrieval]
            similarity_threshold = 0.5

            [orchestrator]
            max_retries = 2

            [index]
            embedder = "ollama"
            dimension = 768
            "#,
        )
        .unwrap();
        assert_eq!(config.retrieval.similarity_threshold, 0.5);
        assert_eq!(config.retrieval.top_k, 5);
        assert_eq!(config.orchestrator.max_retries, 2);
        assert_eq!(config.index.embedder, EmbedderKind::Ollama);
        assert_eq!(config.index.dimension, 768);
    }

    #[test]
    fn test_invalid_values_rejected() {
        for raw in [
            "[retrieval]\nsimilarity_threshold = 1.5",
            "[retrieval]\ntop_k = 0",
            "[retrieval]\ntie_epsilon = -0.1",
            "[orchestrator]\nmax_retries = 0",
            "[execution]\nstep_timeout_ms = 0",
        ] {
            assert!(
                matches!(SysmendConfig::parse(raw), Err(RepairError::InvalidConfig(_))),
                "accepted {raw}"
            );
        }
    }

    #[test]
    fn test_malformed_toml_is_parse_error() {
        assert!(matches!(
            SysmendConfig::parse("[retrieval\ntop_k = 3"),
            Err(RepairError::ConfigParse(_))
        ));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[agent]\nmax_tool_rounds = 4").unwrap();
        let config = SysmendConfig::load(file.path()).unwrap();
        assert_eq!(config.agent.max_tool_rounds, 4);
        assert!(SysmendConfig::load_or_default(None).is_ok());
    }
}
