use std::sync::Arc;

use chrono::Utc;

use crate::commands::CommandResult;
use artibot_agent::{NoopNotifier, ReminderService, Repositories, SweepReport};
use artibot_core::config::{AppConfig, LoadOptions};
use artibot_core::TenantId;
use artibot_db::connect_with_settings;

/// One reminder/relance evaluation pass, the same work the
/// `POST /api/v1/rappels/sweep` action runs, for cron-style invocation.
pub fn run(tenant: &str) -> CommandResult {
    let tenant = tenant.trim();
    if tenant.is_empty() {
        return CommandResult::failure("sweep", "validation_error", "tenant must not be empty", 2);
    }

    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "sweep",
                "config_validation",
                format!("configuration issue: {error}"),
                2,
            );
        }
    };

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return CommandResult::failure(
                "sweep",
                "runtime_init",
                format!("failed to initialize async runtime: {error}"),
                3,
            );
        }
    };

    let result = runtime.block_on(async {
        let pool = connect_with_settings(
            &config.database.url,
            config.database.max_connections,
            config.database.timeout_secs,
        )
        .await
        .map_err(|error| ("db_connectivity".to_string(), error.to_string(), 4u8))?;

        let reminders =
            ReminderService::new(Repositories::sql(pool.clone()), Arc::new(NoopNotifier));
        let report = reminders
            .sweep(&TenantId(tenant.to_string()), Utc::now())
            .await
            .map_err(|error| {
                (error.code().as_str().to_ascii_lowercase(), error.to_string(), 5u8)
            })?;

        pool.close().await;
        Ok::<SweepReport, (String, String, u8)>(report)
    });

    match result {
        Ok(report) => CommandResult::success("sweep", render_report(tenant, &report)),
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("sweep", &error_class, message, exit_code)
        }
    }
}

fn render_report(tenant: &str, report: &SweepReport) -> String {
    let mut lines = vec![format!(
        "swept tenant {tenant}: {} rappels envoyes, {} relances envoyees, {} relances ignorees",
        report.rappels.len(),
        report.relances.len(),
        report.relances_ignorees.len()
    )];

    for rappel in &report.rappels {
        lines.push(format!("  - rappel {} pour le rdv {}", rappel.rappel, rappel.rdv_id));
    }
    for numero in &report.relances {
        lines.push(format!("  - relance envoyee pour {numero}"));
    }
    for ignoree in &report.relances_ignorees {
        lines.push(format!("  - {} ignoree [{}]: {}", ignoree.facture, ignoree.code, ignoree.message));
    }

    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use artibot_agent::SweepReport;

    use super::render_report;

    #[test]
    fn empty_report_renders_a_single_summary_line() {
        let report = SweepReport::default();

        assert_eq!(
            render_report("tnt-1", &report),
            "swept tenant tnt-1: 0 rappels envoyes, 0 relances envoyees, 0 relances ignorees"
        );
    }
}
