use promissory_core::config::{AppConfig, LoadOptions};
use promissory_core::patterns::PatternTables;
use promissory_core::AssetUrlBuilder;
use promissory_db::{connect_with_config, migrations};
use serde::Serialize;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: CheckStatus,
    details: String,
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

const DEPENDENT_CHECKS: [&str; 5] = [
    "pattern_tables",
    "asset_catalog",
    "delivery_gateway",
    "database_connectivity",
    "schema_migrations",
];

impl DoctorCheck {
    fn pass(name: &'static str, details: impl Into<String>) -> Self {
        Self { name, status: CheckStatus::Pass, details: details.into() }
    }

    fn fail(name: &'static str, details: impl Into<String>) -> Self {
        Self { name, status: CheckStatus::Fail, details: details.into() }
    }

    fn skipped(name: &'static str, details: impl Into<String>) -> Self {
        Self { name, status: CheckStatus::Skipped, details: details.into() }
    }
}

/// Returns the rendered report and whether every check passed or was
/// skipped.
pub fn run(json_output: bool) -> (String, bool) {
    let report = build_report();
    let healthy = report.overall_status == CheckStatus::Pass;

    if json_output {
        let output = serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        });
        return (output, healthy);
    }

    (render_human(&report), healthy)
}

fn build_report() -> DoctorReport {
    let mut checks = Vec::new();

    match AppConfig::load(LoadOptions::default()) {
        Ok(config) => {
            checks.push(DoctorCheck::pass("config_validation", "configuration loaded and validated"));
            checks.push(check_pattern_tables());
            checks.push(check_catalog(&config));
            checks.push(check_delivery_gateway(&config));
            checks.extend(check_database(&config));
        }
        Err(error) => {
            checks.push(DoctorCheck::fail("config_validation", error.to_string()));
            for name in DEPENDENT_CHECKS {
                checks.push(DoctorCheck::skipped(name, "skipped because configuration did not load"));
            }
        }
    }

    let any_failed = checks.iter().any(|check| check.status == CheckStatus::Fail);
    let overall_status = if any_failed { CheckStatus::Fail } else { CheckStatus::Pass };
    let summary = if any_failed {
        "doctor: one or more readiness checks failed".to_string()
    } else {
        "doctor: all readiness checks passed".to_string()
    };

    DoctorReport { overall_status, summary, checks }
}

fn check_pattern_tables() -> DoctorCheck {
    match PatternTables::bilingual() {
        Ok(_) => DoctorCheck::pass("pattern_tables", "bilingual detection patterns compiled"),
        Err(error) => DoctorCheck::fail("pattern_tables", error.to_string()),
    }
}

fn check_catalog(config: &AppConfig) -> DoctorCheck {
    match AssetUrlBuilder::from_catalog(&config.catalog) {
        Ok(builder) if builder.franchises().is_empty() => DoctorCheck::skipped(
            "asset_catalog",
            "no franchises configured; links fall back to static asset urls",
        ),
        Ok(builder) => {
            let locations: usize =
                builder.franchises().iter().map(|franchise| franchise.location_count()).sum();
            DoctorCheck::pass(
                "asset_catalog",
                format!(
                    "{} franchise(s), {locations} location(s)",
                    builder.franchises().len()
                ),
            )
        }
        Err(error) => DoctorCheck::fail("asset_catalog", error.to_string()),
    }
}

fn check_delivery_gateway(config: &AppConfig) -> DoctorCheck {
    match config.delivery.gateway_url.as_deref() {
        Some(url) => DoctorCheck::pass("delivery_gateway", format!("configured at `{url}`")),
        None => DoctorCheck::skipped(
            "delivery_gateway",
            "no gateway configured; `replay` cannot send messages",
        ),
    }
}

fn check_database(config: &AppConfig) -> Vec<DoctorCheck> {
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return vec![
                DoctorCheck::fail(
                    "database_connectivity",
                    format!("failed to initialize async runtime: {error}"),
                ),
                DoctorCheck::skipped("schema_migrations", "skipped because runtime did not start"),
            ];
        }
    };

    let result = runtime.block_on(async {
        let pool = connect_with_config(&config.database)
            .await
            .map_err(|error| format!("failed to connect to database: {error}"))?;
        let applied = migrations::applied_count(&pool).await;
        pool.close().await;
        Ok::<_, String>(applied)
    });

    let applied = match result {
        Ok(applied) => applied,
        Err(error) => {
            return vec![
                DoctorCheck::fail("database_connectivity", error),
                DoctorCheck::skipped("schema_migrations", "skipped because database is unreachable"),
            ];
        }
    };

    let connectivity = DoctorCheck::pass(
        "database_connectivity",
        format!("connected using `{}`", config.database.url),
    );
    let known = migrations::known_count() as i64;
    let schema = match applied {
        Ok(count) if count >= known => {
            DoctorCheck::pass("schema_migrations", format!("{count}/{known} migration(s) applied"))
        }
        Ok(count) => DoctorCheck::fail(
            "schema_migrations",
            format!("{count}/{known} migration(s) applied; run `promissory migrate`"),
        ),
        Err(error) => DoctorCheck::fail("schema_migrations", error.to_string()),
    };

    vec![connectivity, schema]
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = Vec::new();
    lines.push(report.summary.clone());

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }

    lines.join("\n")
}

fn escape_json(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}
