use cdc_orchestrator_lambda::handlers::tick::handle_tick;
use cdc_orchestrator_lambda::observability::init_logging;
use cdc_orchestrator_lambda::runtime::RuntimeDependencies;
use cdc_orchestrator_lambda::settings::OrchestratorSettings;
use chrono::Utc;
use lambda_runtime::{service_fn, Error, LambdaEvent};
use serde_json::Value;
use tracing::info;

async fn handle_request(
    event: LambdaEvent<Value>,
    deps: &RuntimeDependencies,
) -> Result<Value, Error> {
    info!(
        component = "orchestrator_lambda",
        event = "invocation_received",
        request_id = event.context.request_id.as_str(),
        source = event.payload.get("source").and_then(serde_json::Value::as_str).unwrap_or("unknown"),
    );

    let tracker = deps.tracker()?;
    let response = handle_tick(&tracker, Utc::now(), deps.region.as_deref())?;
    serde_json::to_value(response)
        .map_err(|error| Error::from(format!("failed to serialize tick response: {error}")))
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    let settings = OrchestratorSettings::from_env()
        .map_err(|error| Error::from(format!("invalid orchestrator settings: {error}")))?;
    init_logging(settings.log_format);
    let resolved = settings
        .resolve()
        .map_err(|error| Error::from(format!("invalid orchestrator settings: {error}")))?;
    let deps = RuntimeDependencies::load(resolved).await;

    lambda_runtime::run(service_fn(move |event| {
        let deps = deps.clone();
        async move { handle_request(event, &deps).await }
    }))
    .await
}
