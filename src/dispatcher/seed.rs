//! Start-up batch seeding from a JSON file.
//!
//! Format: `{"<class>": [["payload", ...], ...], ...}`. Batches within a
//! class are enqueued in file order.

use std::collections::BTreeMap;
use std::path::Path;

use tracing::info;

use super::Dispatcher;
use crate::error::ConfigError;
use crate::protocol::TaskBatch;

/// Parse seed file contents into (class, batch) pairs.
pub fn parse_seed(raw: &str) -> Result<Vec<(String, TaskBatch)>, ConfigError> {
    let classes: BTreeMap<String, Vec<TaskBatch>> =
        serde_json::from_str(raw).map_err(|e| ConfigError::ParseError(e.to_string()))?;

    Ok(classes
        .into_iter()
        .flat_map(|(class, batches)| {
            batches
                .into_iter()
                .map(move |batch| (class.clone(), batch))
        })
        .collect())
}

/// Load a seed file into the dispatcher. Returns the number of batches queued.
pub async fn seed_from_file(dispatcher: &Dispatcher, path: &Path) -> Result<usize, ConfigError> {
    let raw = tokio::fs::read_to_string(path).await?;
    let batches = parse_seed(&raw)?;
    let count = batches.len();
    for (class, batch) in batches {
        dispatcher.enqueue(&class, batch).await;
    }
    info!(path = %path.display(), batches = count, "Seeded task batches");
    Ok(count)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::config::DispatcherConfig;
    use crate::error::Error;
    use crate::protocol::{Reply, Request};

    #[test]
    fn parses_classes_in_order() {
        let seeded = parse_seed(
            r#"{
                "gold": [["g1a", "g1b"], ["g2"]],
                "default": [["d1"]]
            }"#,
        )
        .unwrap();

        assert_eq!(seeded.len(), 3);
        assert_eq!(seeded[0], ("default".to_string(), TaskBatch::new(["d1"])));
        assert_eq!(seeded[1], ("gold".to_string(), TaskBatch::new(["g1a", "g1b"])));
        assert_eq!(seeded[2], ("gold".to_string(), TaskBatch::new(["g2"])));
    }

    #[test]
    fn rejects_malformed_seed() {
        assert!(matches!(
            parse_seed(r#"{"gold": ["not a batch"]}"#),
            Err(ConfigError::ParseError(_))
        ));
        assert!(parse_seed("[]").is_err());
    }

    #[tokio::test]
    async fn seeds_dispatcher_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("seed.json");
        tokio::fs::write(&path, r#"{"gold": [["a"], ["b"]]}"#)
            .await
            .unwrap();

        let dispatcher = Dispatcher::new(Duration::from_secs(60));
        let count = seed_from_file(&dispatcher, &path).await.unwrap();

        assert_eq!(count, 2);
        dispatcher.handle(Request::register("w1", "gold")).await;
        assert_eq!(
            dispatcher.handle(Request::get_task("w1")).await,
            Reply::Batch(TaskBatch::new(["a"]))
        );
    }

    #[tokio::test]
    async fn missing_file_is_io_error() {
        let dispatcher = Dispatcher::new(Duration::from_secs(60));
        let result = seed_from_file(&dispatcher, Path::new("/nonexistent/seed.json")).await;
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }

    #[tokio::test]
    async fn bootstrap_loads_configured_seed_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("seed.json");
        tokio::fs::write(&path, r#"{"gold": [["a"]], "default": [["b"]]}"#)
            .await
            .unwrap();

        let config = DispatcherConfig {
            seed_file: Some(path),
            ..DispatcherConfig::default()
        };
        let dispatcher = Dispatcher::bootstrap(&config).await.unwrap();
        assert_eq!(dispatcher.pending().await, 2);
        assert_eq!(dispatcher.heartbeat_timeout(), config.heartbeat_timeout);
    }

    #[tokio::test]
    async fn bootstrap_without_seed_file_starts_empty() {
        let dispatcher = Dispatcher::bootstrap(&DispatcherConfig::default())
            .await
            .unwrap();
        assert_eq!(dispatcher.pending().await, 0);
    }

    #[tokio::test]
    async fn bootstrap_reports_unreadable_seed_as_config_error() {
        let config = DispatcherConfig {
            seed_file: Some("/nonexistent/seed.json".into()),
            ..DispatcherConfig::default()
        };
        let result = Dispatcher::bootstrap(&config).await;
        assert!(matches!(result, Err(Error::Config(ConfigError::Io(_)))));
    }
}
