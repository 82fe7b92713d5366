use anyhow::{Context, Result};
use colored::Colorize;
use security_event_log::{
    config, metrics, sink, RequestMetadata, SecurityLevel, SecurityLogger,
};
use std::path::Path;
use tracing::info;

/// Arguments of the emit command
#[derive(Debug, Clone)]
pub struct EmitRequest {
    pub level: String,
    pub category: String,
    pub action: String,
    pub details: String,
    pub user: Option<String>,
    pub ip: Option<String>,
    pub prometheus: bool,
}

/// Execute the emit command
///
/// Builds a logger for the configured sink, records one event, tries to flush
/// anything left in the backlog and prints the resulting metrics.
pub async fn execute(path: &Path, request: EmitRequest) -> Result<()> {
    let cfg = config::load_config(path)?;

    let level: SecurityLevel = request.level.parse()?;
    let details: serde_json::Value =
        serde_json::from_str(&request.details).context("--details must be valid JSON")?;
    let metadata = build_metadata(request.user, request.ip);

    let prometheus = if request.prometheus {
        Some(metrics::init_metrics()?)
    } else {
        None
    };

    let sink = sink::build_sink(&cfg.sink).await?;
    let logger = SecurityLogger::new(cfg.logger.clone(), sink)?;

    info!(level = %level, action = %request.action, "Emitting security event");
    let delivered = logger
        .log_security_event(level, request.category, request.action, details, metadata)
        .await;

    if delivered {
        println!("{}", "✓ Event written".green());
    } else {
        println!("{}", "✗ Event not written, kept in backlog".red());
        let flushed = logger.flush_queue().await;
        if flushed > 0 {
            println!("{}", format!("✓ Flushed {} event(s) on retry", flushed).green());
        }
    }

    let snapshot = logger.get_metrics().await;
    println!();
    println!("{}", "Metrics:".bold());
    println!("{}", serde_json::to_string_pretty(&snapshot)?);

    if let Some(handle) = prometheus {
        println!();
        println!("{}", "Prometheus:".bold());
        println!("{}", handle.render());
    }

    logger.destroy().await;
    Ok(())
}

fn build_metadata(user: Option<String>, ip: Option<String>) -> Option<RequestMetadata> {
    if user.is_none() && ip.is_none() {
        return None;
    }
    Some(RequestMetadata {
        ip,
        user_id: user,
        ..Default::default()
    })
}
