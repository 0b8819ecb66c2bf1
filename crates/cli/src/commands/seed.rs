use crate::commands::{current_thread_runtime, load_config, CommandResult};
use woms_db::{connect_with_config, migrations, DemoDataset, FlowSeedInfo};

pub fn run() -> CommandResult {
    let config = match load_config("seed") {
        Ok(config) => config,
        Err(failure) => return failure,
    };
    let runtime = match current_thread_runtime("seed") {
        Ok(runtime) => runtime,
        Err(failure) => return failure,
    };

    let result = runtime.block_on(async {
        let pool = connect_with_config(&config.database)
            .await
            .map_err(|error| ("db_connectivity", error.to_string(), 4u8))?;

        migrations::run_pending(&pool)
            .await
            .map_err(|error| ("migration", error.to_string(), 5u8))?;

        let seed_result = DemoDataset::load(&pool)
            .await
            .map_err(|error| ("seed_execution", error.to_string(), 5u8))?;

        let verification = DemoDataset::verify(&pool)
            .await
            .map_err(|error| ("seed_verification", error.to_string(), 6u8))?;

        let run_result = if verification.all_present {
            Ok(seed_message(seed_result.skipped, &seed_result.flows_seeded))
        } else {
            let failed_checks = verification
                .checks
                .iter()
                .filter_map(|(check, passed)| (!passed).then_some(*check))
                .collect::<Vec<_>>();
            Err(("seed_verification", verification_failure_message(&failed_checks), 6u8))
        };

        pool.close().await;
        run_result
    });

    match result {
        Ok(message) => CommandResult::success("seed", message),
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("seed", error_class, message, exit_code)
        }
    }
}

fn seed_message(skipped: bool, flows: &[FlowSeedInfo]) -> String {
    if skipped {
        return "demo dataset already present; nothing loaded".to_string();
    }

    let lines = flows
        .iter()
        .map(|flow| format!("  - {}: {} ({})", flow.stage, flow.reference, flow.description))
        .collect::<Vec<_>>();
    format!("demo dataset loaded, one request per stage:\n{}", lines.join("\n"))
}

fn verification_failure_message(failed_checks: &[&str]) -> String {
    if failed_checks.is_empty() {
        "Some seed data failed to load".to_string()
    } else {
        format!("Seed verification failed for checks: {}", failed_checks.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use woms_core::domain::request::Stage;
    use woms_db::FlowSeedInfo;

    use super::{seed_message, verification_failure_message};

    #[test]
    fn verification_error_message_targets_failed_checks() {
        assert_eq!(
            verification_failure_message(&["rejected", "notifications"]),
            "Seed verification failed for checks: rejected, notifications"
        );
    }

    #[test]
    fn verification_error_message_falls_back_to_generic_when_no_labels() {
        assert_eq!(verification_failure_message(&[]), "Some seed data failed to load");
    }

    #[test]
    fn seed_message_lists_each_stage() {
        let flows = vec![FlowSeedInfo {
            stage: Stage::Approved,
            reference: "MRR-2026-0002".to_string(),
            description: "Approved, waiting for a purchase order",
        }];

        let message = seed_message(false, &flows);
        assert!(message.contains("  - approved: MRR-2026-0002 (Approved, waiting for a purchase order)"));
        assert_eq!(seed_message(true, &flows), "demo dataset already present; nothing loaded");
    }
}
