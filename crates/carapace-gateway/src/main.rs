//! The `carapace-server` binary.
//!
//! Exit codes: 0 normal shutdown, 1 configuration error, 2 bind/port
//! error.

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use carapace_config::{data_dir, ensure_data_dir, ensure_token, load_config};
use carapace_gate::{ApprovalGate, OperationClassifier, SecurityGate};
use carapace_gateway::{run, spawn_retention_sweep, AppState, GatewayError, LlmChatAgent};
use carapace_llm::{ClaudeProvider, LlmProvider, ProviderConfig};
use carapace_rules::{LlmRuleEvaluator, RuleEngine, RuleStore};
use carapace_session::SessionManager;

const EXIT_CONFIG: u8 = 1;
const EXIT_BIND: u8 = 2;

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    let data_dir = data_dir();
    if let Err(e) = ensure_data_dir(&data_dir) {
        eprintln!("carapace: {e}");
        return ExitCode::from(EXIT_CONFIG);
    }

    let config = match load_config(&data_dir) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("carapace: {e}");
            return ExitCode::from(EXIT_CONFIG);
        }
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.carapace.log_level.clone()));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let rules = match RuleStore::load(&data_dir.join("rules.yaml")) {
        Ok(rules) => Arc::new(rules),
        Err(e) => {
            eprintln!("carapace: {e}");
            return ExitCode::from(EXIT_CONFIG);
        }
    };

    let token = match ensure_token(&data_dir) {
        Ok(token) => token,
        Err(e) => {
            eprintln!("carapace: {e}");
            return ExitCode::from(EXIT_CONFIG);
        }
    };

    let sessions = match SessionManager::new(&data_dir) {
        Ok(sessions) => Arc::new(sessions),
        Err(e) => {
            eprintln!("carapace: {e}");
            return ExitCode::from(EXIT_CONFIG);
        }
    };

    let api_key = std::env::var("CARAPACE_LLM_API_KEY").unwrap_or_default();
    if api_key.is_empty() {
        warn!("CARAPACE_LLM_API_KEY is not set; classification will fall back to the conservative default");
    }

    let aux_provider: Arc<dyn LlmProvider> = Arc::new(ClaudeProvider::new(
        ProviderConfig::new(api_key.clone(), config.agent.classifier_model.clone()).max_tokens(512),
    ));
    let agent_provider: Arc<dyn LlmProvider> = Arc::new(ClaudeProvider::new(
        ProviderConfig::new(api_key, config.agent.model.clone()).max_tokens(4096),
    ));

    let gate = Arc::new(SecurityGate::new(
        OperationClassifier::new(Arc::clone(&aux_provider)),
        RuleEngine::new(Arc::new(LlmRuleEvaluator::new(aux_provider))),
        ApprovalGate::new(Duration::from_secs(config.sessions.approval_timeout_secs)),
        Arc::clone(&sessions),
        Arc::clone(&rules),
    ));

    let token_preview: String = token.chars().take(8).collect();
    info!(
        model = %config.agent.model,
        rules = rules.snapshot().len(),
        data_dir = %data_dir.display(),
        token_preview = %token_preview,
        "carapace server ready"
    );

    let state = AppState {
        config: Arc::new(config.clone()),
        sessions,
        rules,
        gate,
        agent: Arc::new(LlmChatAgent::new(agent_provider)),
        token,
    };

    let sweeper = spawn_retention_sweep(state.clone());

    let result = run(state, &config.server.host, config.server.port).await;
    sweeper.abort();

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e @ GatewayError::Bind { .. }) => {
            eprintln!("carapace: {e}");
            ExitCode::from(EXIT_BIND)
        }
        Err(e) => {
            eprintln!("carapace: {e}");
            ExitCode::from(EXIT_CONFIG)
        }
    }
}
