//! mplp - multi-agent workflow orchestrator
//!
//! Command-line entry point: configuration checks and a demo run.

mod cli;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use serde_json::json;
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use mplp_config::{Config, ConfigLoader, ConfigValidator, LogFormat, LoggingConfig};
use mplp_orchestrator::{
    ExecutionContext, ExecutionOptions, MockAgent, Orchestrator, Predicate, WorkflowStep,
};

use cli::{Cli, Commands};

/// Initialize tracing. `RUST_LOG` wins over the configured level.
fn init_tracing(logging: &LoggingConfig) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));

    let registry = tracing_subscriber::registry().with(env_filter);
    match logging.format {
        LogFormat::Json => registry.with(fmt::layer().json().with_target(true)).init(),
        LogFormat::Text => registry
            .with(fmt::layer().with_target(true).with_ansi(true))
            .init(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = ConfigLoader::load_or_default(cli.config.as_deref())
        .context("Failed to load configuration")?;
    init_tracing(&config.logging);

    match cli.command.unwrap_or(Commands::Validate) {
        Commands::Validate => validate(&config),
        Commands::Demo {
            topic,
            score,
            flaky,
        } => demo(&config, topic, score, flaky).await,
    }
}

fn validate(config: &Config) -> Result<()> {
    let result = ConfigValidator::validate(config);
    for warning in &result.warnings {
        warn!(path = %warning.path, "{}", warning.message);
    }
    result.into_result().context("Invalid configuration")?;

    println!("{}", toml::to_string_pretty(config)?);
    info!("Configuration is valid");
    Ok(())
}

async fn demo(config: &Config, topic: String, score: f64, flaky: u32) -> Result<()> {
    let orchestrator = Orchestrator::from_config(config)?;

    orchestrator.register_agent(Arc::new(MockAgent::new("writer").failing_times(flaky)))?;
    orchestrator.register_agent(Arc::new(
        MockAgent::new("reviewer").with_response(json!({ "quality_score": score })),
    ))?;
    orchestrator.register_agent(Arc::new(
        MockAgent::new("publisher").with_response(json!({ "published": true })),
    ))?;

    orchestrator.on_progress(|update| {
        info!(
            step_id = %update.step_id,
            status = ?update.status,
            "Progress {:.0}%",
            update.percentage()
        );
    });

    let review_passed = Predicate::new(|ctx: &ExecutionContext| {
        ctx.output("review")
            .and_then(|review| review["quality_score"].as_f64())
            .is_some_and(|score| score > 0.8)
    })
    .with_description("review.quality_score > 0.8");

    let workflow = Orchestrator::create_workflow("Draft, review, publish")
        .description("Sample content pipeline")
        .step(WorkflowStep::agent("draft", "Draft", "writer", "write").with_retries(flaky))?
        .step(WorkflowStep::agent("review", "Review", "reviewer", "review").depends_on(["draft"]))?
        .step(
            WorkflowStep::conditional(
                "gate",
                "Publish gate",
                review_passed,
                WorkflowStep::agent("publish", "Publish", "publisher", "publish"),
                None,
            )
            .depends_on(["review"]),
        )?
        .build()?;
    let workflow_id = workflow.id.clone();
    orchestrator.register_workflow(workflow)?;

    let result = orchestrator
        .execute_workflow(&workflow_id, json!({ "topic": topic }), ExecutionOptions::default())
        .await?;

    println!("{}", serde_json::to_string_pretty(&result)?);
    let analytics = orchestrator.workflow_analytics(Some(&workflow_id));
    info!(
        success_rate = analytics.success_rate,
        "Demo finished with status {:?}",
        result.status
    );
    Ok(())
}
