use std::{env, env::VarError};

/// There's no real CLI for the server, so just do quick 'n dirty
pub fn handle_command_line_args() -> bool {
    let has_cli_args = env::args().count() > 1;
    if has_cli_args {
        display_readme();
        display_envs();
    }
    has_cli_args
}

fn display_readme() {
    const README: &str = include_str!("./cli-help.txt");
    println!("\n{README}\n");
}

fn display_envs() {
    // Only non-secret variables are listed here
    const DISPLAY_ENVS: [&str; 24] = [
        "RUST_LOG",
        "CFS_HOST",
        "CFS_PORT",
        "CFS_DATABASE_URL",
        "CFS_DB_MAX_CONNECTIONS",
        "CFS_RUN_MIGRATIONS",
        "CFS_IDEMPOTENCY_TTL_HOURS",
        "CFS_HOLDING_ACCOUNT_ID",
        "CFS_WALLET_SERVICE_URL",
        "CFS_WALLET_TIMEOUT_SECS",
        "CFS_OUTBOX_POLL_INTERVAL_SECS",
        "CFS_OUTBOX_BATCH_SIZE",
        "CFS_OUTBOX_MAX_ATTEMPTS",
        "CFS_OUTBOX_BASE_BACKOFF_SECS",
        "CFS_OUTBOX_MAX_BACKOFF_SECS",
        "CFS_OUTBOX_LEASE_TIMEOUT_SECS",
        "CFS_ACTIVATION_INTERVAL_SECS",
        "CFS_COMPLETION_INTERVAL_SECS",
        "CFS_EXPIRATION_INTERVAL_SECS",
        "CFS_SCHEDULER_FETCH_LIMIT",
        "CFS_SCHEDULER_BATCH_SIZE",
        "CFS_SCHEDULER_MAX_JITTER_MS",
        "CFS_SCHEDULER_BATCH_DELAY_MS",
        "CFS_POOLING_THRESHOLD_PERCENT",
    ];

    println!("Current environment values (EXCLUDING variables that contain secrets):");
    DISPLAY_ENVS.iter().for_each(|&name| {
        let val = match env::var(name) {
            Ok(s) => s,
            Err(VarError::NotPresent) => "Not set".into(),
            Err(VarError::NotUnicode(s)) => format!("Invalid value: {}", s.to_string_lossy()),
        };
        println!("  {name:<35} {val:<15}");
    });
    // The Redis URL can carry a password
    let redis = if env::var("CFS_REDIS_URL").is_ok_and(|s| !s.is_empty()) { "Set" } else { "Not set" };
    println!("  {:<35} {redis:<15}", "CFS_REDIS_URL");
}
