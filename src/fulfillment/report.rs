//! Run reporting (summarize stage)

use crate::logging::ProcessLog;
use crate::pipeline::{RunSummary, StageSummary};

/// Write the run summary into the process log
///
/// Stage statistics first, then output entries, then map and reduce errors
/// keyed by the record or group they were raised for.
pub fn report(summary: &RunSummary, log: &ProcessLog) {
    log.audit(
        "Run Summary",
        format!(
            "Run {} of {} started {} finished in {:.3}s using {} units (concurrency {})",
            summary.run_id,
            summary.job_name,
            summary.started_at.to_rfc3339(),
            summary.elapsed_seconds,
            summary.resource_units_consumed,
            summary.concurrency
        ),
    );
    log.audit("Input Summary", stage_json(&summary.input));
    log.audit("Map Summary", stage_json(&summary.map));
    log.audit("Reduce Summary", stage_json(&summary.reduce));

    for (key, value) in &summary.output_entries {
        log.audit("Summarize Output", format!("Key: {key}, Value: {value}"));
    }

    for (key, error) in &summary.map_errors {
        log.error(
            format!("Map Error for Key: {key}"),
            key,
            format!("Error: {error}"),
        );
    }

    for (key, error) in &summary.reduce_errors {
        log.error(
            format!("Reduce Error for Key: {key}"),
            key,
            format!("Error: {error}"),
        );
    }
}

fn stage_json(stage: &StageSummary) -> String {
    serde_json::to_string(stage).unwrap_or_else(|_| format!("{stage:?}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::LogLevel;
    use chrono::Utc;
    use serde_json::json;
    use std::collections::BTreeMap;
    use uuid::Uuid;

    fn summary() -> RunSummary {
        RunSummary {
            run_id: Uuid::new_v4(),
            job_name: "deal-fulfillment".to_string(),
            started_at: Utc::now(),
            elapsed_seconds: 1.5,
            resource_units_consumed: 60,
            concurrency: 5,
            input: StageSummary {
                invocations: 1,
                emitted: 3,
                ..StageSummary::default()
            },
            map: StageSummary {
                invocations: 3,
                errors: 1,
                emitted: 1,
                elapsed_seconds: 0.5,
                units_consumed: 40,
            },
            reduce: StageSummary {
                invocations: 1,
                emitted: 1,
                units_consumed: 20,
                ..StageSummary::default()
            },
            map_errors: BTreeMap::from([(
                "7".to_string(),
                "Failed to update opportunity 7: RCRD_LOCKED: locked".to_string(),
            )]),
            reduce_errors: BTreeMap::new(),
            output_entries: BTreeMap::from([(
                "A".to_string(),
                json!({"recipient": "a@x", "orders": ["SO-1"]}),
            )]),
        }
    }

    #[test]
    fn test_report_audits_stage_summaries_in_order() {
        let log = ProcessLog::new();
        report(&summary(), &log);

        let audits: Vec<_> = log
            .entries_at(LogLevel::Audit)
            .into_iter()
            .map(|e| e.title)
            .collect();
        assert_eq!(
            audits,
            vec![
                "Run Summary",
                "Input Summary",
                "Map Summary",
                "Reduce Summary",
                "Summarize Output"
            ]
        );

        let map_summary: serde_json::Value =
            serde_json::from_str(&log.entries_titled("Map Summary")[0].details).unwrap();
        assert_eq!(map_summary["errors"], 1);
        assert_eq!(map_summary["units_consumed"], 40);
    }

    #[test]
    fn test_report_flattens_errors_with_keys() {
        let log = ProcessLog::new();
        let mut summary = summary();
        summary
            .reduce_errors
            .insert("B".to_string(), "task aborted".to_string());
        report(&summary, &log);

        let errors = log.entries_at(LogLevel::Error);
        assert_eq!(errors.len(), 2);
        assert_eq!(errors[0].title, "Map Error for Key: 7");
        assert_eq!(errors[0].key.as_deref(), Some("7"));
        assert!(errors[0].details.contains("RCRD_LOCKED"));
        assert_eq!(errors[1].title, "Reduce Error for Key: B");
    }

    #[test]
    fn test_report_writes_output_entries() {
        let log = ProcessLog::new();
        report(&summary(), &log);

        let output = log.entries_titled("Summarize Output");
        assert_eq!(output.len(), 1);
        assert!(output[0].details.starts_with("Key: A, Value: "));
        assert!(output[0].details.contains("SO-1"));
    }
}
