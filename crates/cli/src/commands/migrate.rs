use tripwise_core::config::LoadOptions;

use crate::bootstrap::bootstrap;
use crate::commands::{runtime, CommandResult};

pub fn run() -> CommandResult {
    let runtime = match runtime("migrate") {
        Ok(runtime) => runtime,
        Err(failure) => return failure,
    };

    let result = runtime.block_on(async {
        let app = bootstrap(LoadOptions::default()).await?;
        app.db_pool.close().await;
        Ok::<String, crate::bootstrap::BootstrapError>(app.config.database.url)
    });

    match result {
        Ok(url) => CommandResult::success("migrate", format!("applied pending migrations to `{url}`")),
        Err(error) => {
            let (error_class, exit_code) = error.classify();
            CommandResult::failure("migrate", error_class, error.to_string(), exit_code)
        }
    }
}
