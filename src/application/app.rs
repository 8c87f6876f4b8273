use crate::config::{LedgerBackend, ProviderSettings, ProvidersSettings, Settings};
use crate::domain::{ApiKey, UserId};
use crate::infrastructure::log_messages::{application as log_msg, database as db_msg};
use crate::infrastructure::Database;
use crate::ledger::{
    InMemoryLedgerStore, LedgerStore, OverrideSource, PostgresLedgerStore, PricingResolver,
    UsageLedger,
};
use crate::providers::http::build_client;
use crate::providers::{GeminiAdapter, OpenAiCompatibleAdapter, ProviderSet, Upstream};
use crate::proxy::{FeaturePasswords, ProviderExecutor, ProxyService, StaticSessionResolver};
use crate::scheduler::RequestScheduler;
use crate::{Error, Result};
use axum::Router;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};

/// Main application struct that coordinates all components
pub struct Application {
    settings: Settings,
    scheduler: RequestScheduler,
    router: Router,
}

impl Application {
    /// Load settings from the environment and build the gateway
    pub async fn from_env() -> Result<Self> {
        Self::new(Settings::new()?).await
    }

    #[instrument(skip_all)]
    pub async fn new(settings: Settings) -> Result<Self> {
        let ledger = build_ledger(&settings).await?;
        let providers = build_providers(&settings.providers)?;

        let scheduler = RequestScheduler::new(
            Arc::new(ProviderExecutor::new(providers)),
            settings.scheduler_config(),
        );
        scheduler.start();

        let passwords = FeaturePasswords::parse(
            &settings.auth.feature_passwords,
            settings.auth.feature_passwords_enabled,
        );
        let sessions = StaticSessionResolver::from_pairs(settings.auth.session_tokens.clone());

        let mut service = ProxyService::new(scheduler.clone(), settings.proxy_config())
            .with_feature_passwords(passwords)
            .with_session_resolver(Arc::new(sessions));
        if let Some(ledger) = ledger {
            service = service.with_ledger(ledger);
        }

        Ok(Self {
            settings,
            scheduler,
            router: service.into_router(),
        })
    }

    #[instrument(skip(self))]
    pub async fn run(self) -> Result<()> {
        let address = format!(
            "{}:{}",
            self.settings.application.host, self.settings.application.port
        );
        let listener = tokio::net::TcpListener::bind(&address).await?;
        info!(%address, "{}", log_msg::LISTENING);
        info!("{}", log_msg::STARTED_SUCCESSFULLY);

        let served = axum::serve(listener, self.router)
            .with_graceful_shutdown(shutdown_signal())
            .await;

        self.scheduler.shutdown().await;
        info!("{}", log_msg::STOPPED);
        served.map_err(|error| Error::server(error.to_string()))
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn scheduler(&self) -> &RequestScheduler {
        &self.scheduler
    }

    /// The fully layered router, for embedding or in-process tests
    pub fn router(&self) -> Router {
        self.router.clone()
    }
}

async fn build_ledger(settings: &Settings) -> Result<Option<UsageLedger>> {
    if !settings.billing.enabled {
        return Ok(None);
    }

    let store: Arc<dyn LedgerStore> = match settings.database.ledger_backend {
        LedgerBackend::Postgres => {
            let database = Database::connect(&settings.database_url(), &settings.database).await?;
            Arc::new(PostgresLedgerStore::new(database.into_pool()))
        }
        LedgerBackend::Memory => {
            warn!("{}", db_msg::MEMORY_BACKEND);
            let balances = settings
                .billing
                .memory_balances
                .iter()
                .filter_map(|(user, cents)| {
                    UserId::try_new(user.clone()).ok().map(|user| (user, *cents))
                });
            Arc::new(InMemoryLedgerStore::with_balances(balances))
        }
    };

    let pricing = PricingResolver::new(OverrideSource::Env(
        settings.billing.pricing_override_env.clone(),
    ));
    Ok(Some(
        UsageLedger::new(store, pricing).with_default_max_tokens(settings.billing.default_max_tokens),
    ))
}

fn api_key(provider: &ProviderSettings) -> Option<ApiKey> {
    provider
        .api_key
        .clone()
        .and_then(|key| ApiKey::try_new(key).ok())
}

fn build_providers(providers: &ProvidersSettings) -> Result<ProviderSet> {
    let openrouter = Upstream::openrouter(
        Some(providers.openrouter.base_url.clone()),
        api_key(&providers.openrouter),
        providers.openrouter.http_referer.clone(),
        providers.openrouter.x_title.clone(),
    );
    let openai =
        Upstream::new("openai", providers.openai.base_url.clone()).with_key(api_key(&providers.openai));
    let generic_client = build_client(
        providers
            .openai
            .connect_timeout()
            .max(providers.openrouter.connect_timeout()),
    )?;
    let generic = OpenAiCompatibleAdapter::generic(generic_client, openrouter, openai);

    let deepseek = OpenAiCompatibleAdapter::deepseek(
        build_client(providers.deepseek.connect_timeout())?,
        Upstream::new("deepseek", providers.deepseek.base_url.clone())
            .with_key(api_key(&providers.deepseek)),
    );

    let gemini = GeminiAdapter::new(
        build_client(providers.gemini.connect_timeout())?,
        providers.gemini.base_url.clone(),
        api_key(&providers.gemini),
    );

    Ok(ProviderSet::new(
        Arc::new(generic),
        Arc::new(deepseek),
        Arc::new(gemini),
    ))
}

/// Resolves on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(error) = tokio::signal::ctrl_c().await {
            error!(%error, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(error) => {
                error!(%error, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("{}", log_msg::SHUTDOWN_SIGNAL);
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use std::collections::HashMap;
    use tower::ServiceExt;

    fn memory_settings() -> Settings {
        let vars: HashMap<&str, &str> = HashMap::new();
        let mut settings = Settings::load(|name| vars.get(name).map(|v| v.to_string())).unwrap();
        settings.database.ledger_backend = LedgerBackend::Memory;
        settings
    }

    #[tokio::test]
    async fn memory_backed_gateway_reports_healthy() {
        let app = Application::new(memory_settings()).await.unwrap();

        let response = app
            .router()
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        let body: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(body["ledger"], "ok");

        app.scheduler().shutdown().await;
    }

    #[tokio::test]
    async fn billing_can_be_switched_off() {
        let mut settings = memory_settings();
        settings.billing.enabled = false;
        let app = Application::new(settings).await.unwrap();

        let response = app
            .router()
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        let body: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(body["ledger"], "disabled");

        app.scheduler().shutdown().await;
    }

    #[tokio::test]
    #[ignore = "requires database connection"]
    async fn test_application_can_be_created() {
        let app = Application::from_env()
            .await
            .expect("Failed to create application");
        assert!(app.settings().application.port > 0);
        app.scheduler().shutdown().await;
    }
}
