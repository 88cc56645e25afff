use crate::commands::{build_runtime, load_config, CommandResult, EXIT_DATABASE, EXIT_MIGRATION};
use promissory_db::{connect_with_config, migrations};

pub fn run() -> CommandResult {
    let config = match load_config("migrate") {
        Ok(config) => config,
        Err(result) => return result,
    };
    let runtime = match build_runtime("migrate") {
        Ok(runtime) => runtime,
        Err(result) => return result,
    };

    let result = runtime.block_on(async {
        let pool = connect_with_config(&config.database)
            .await
            .map_err(|error| ("db_connectivity", error.to_string(), EXIT_DATABASE))?;
        let applied_before = migrations::applied_count(&pool).await.unwrap_or(0);
        migrations::run_pending(&pool)
            .await
            .map_err(|error| ("migration", error.to_string(), EXIT_MIGRATION))?;
        let applied_after = migrations::applied_count(&pool)
            .await
            .map_err(|error| ("migration", error.to_string(), EXIT_MIGRATION))?;
        pool.close().await;
        Ok::<i64, (&'static str, String, u8)>(applied_after - applied_before)
    });

    match result {
        Ok(0) => CommandResult::success("migrate", "schema already up to date"),
        Ok(count) => CommandResult::success("migrate", format!("applied {count} pending migration(s)")),
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("migrate", error_class, message, exit_code)
        }
    }
}
