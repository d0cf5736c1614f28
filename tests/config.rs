// ABOUTME: Integration tests for configuration parsing and validation.
// ABOUTME: Tests YAML parsing, defaults, strategy overrides, discovery and graph building.

use stagehand::config::*;
use stagehand::graph::GraphError;
use stagehand::plan::Strategy;
use std::time::Duration;

mod parsing {
    use super::*;

    #[test]
    fn parse_minimal_config() {
        let yaml = r#"
services:
  db: {}
  api:
    dependencies: [db]
"#;
        let config = Config::from_yaml(yaml).unwrap();
        assert_eq!(config.services.len(), 2);
        assert!(config.deployer.is_none());
        assert!(config.notifications.is_none());
        assert_eq!(config.execution.concurrency_limit, 4);
        assert_eq!(config.defaults.max_retries, 2);
        assert_eq!(config.defaults.timeout, Duration::from_secs(10));
    }

    #[test]
    fn parse_full_config() {
        let yaml = r#"
services:
  postgres:
    image: ghcr.io/org/postgres:16
    priority: 10
    health:
      url: http://postgres:8080/health
      timeout: 3s
  api:
    dependencies: [postgres]
    max_retries: 5

defaults:
  timeout: 20s
  max_retries: 1

execution:
  concurrency_limit: 6
  retry:
    base_delay: 500ms
    max_delay: 10s

strategies:
  priority_based:
    max_concurrent: 2

deployer:
  deploy: ./deploy.sh
  rollback: ./rollback.sh

notifications:
  webhook: http://hooks.internal/deploys

state_dir: /var/lib/stagehand
"#;
        let config = Config::from_yaml(yaml).unwrap();

        let postgres = &config.services[&stagehand::types::ServiceName::new("postgres").unwrap()];
        assert_eq!(postgres.priority, 10);
        assert_eq!(postgres.image.as_ref().unwrap().tag(), Some("16"));
        let health = postgres.health.as_ref().unwrap();
        assert_eq!(health.timeout, Some(Duration::from_secs(3)));

        assert_eq!(config.defaults.timeout, Duration::from_secs(20));
        assert_eq!(config.execution.retry.base_delay, Duration::from_millis(500));
        assert_eq!(config.execution.retry.max_delay, Duration::from_secs(10));

        let deployer = config.deployer.as_ref().unwrap();
        assert_eq!(deployer.deploy, "./deploy.sh");
        assert_eq!(deployer.rollback.as_deref(), Some("./rollback.sh"));

        let notifications = config.notifications.as_ref().unwrap();
        assert_eq!(
            notifications.webhook.as_deref(),
            Some("http://hooks.internal/deploys")
        );
        assert!(notifications.log);

        assert_eq!(
            config.state_dir(std::path::Path::new("/ignored")),
            std::path::PathBuf::from("/var/lib/stagehand")
        );
    }

    #[test]
    fn invalid_service_name_is_rejected() {
        let yaml = r#"
services:
  "bad name": {}
"#;
        assert!(Config::from_yaml(yaml).is_err());
    }

    #[test]
    fn unknown_strategy_key_is_rejected() {
        let yaml = r#"
services:
  api: {}
strategies:
  canary:
    max_concurrent: 2
"#;
        assert!(Config::from_yaml(yaml).is_err());
    }
}

mod settings {
    use super::*;

    #[test]
    fn strategy_override_applies_only_to_its_strategy() {
        let yaml = r#"
services:
  api: {}
execution:
  concurrency_limit: 3
strategies:
  priority_based:
    max_concurrent: 7
"#;
        let settings = Config::from_yaml(yaml).unwrap().execution_settings();
        assert_eq!(settings.limit_for(Strategy::PriorityBased), 7);
        assert_eq!(settings.limit_for(Strategy::ParallelOptimized), 3);
        assert_eq!(settings.limit_for(Strategy::Sequential), 3);
    }
}

mod graph_building {
    use super::*;

    #[test]
    fn defaults_fill_unset_fields() {
        let yaml = r#"
services:
  db:
    health:
      url: http://db/health
  api:
    dependencies: [db]
    max_retries: 0
    health:
      url: http://api/health
      timeout: 2s
defaults:
  timeout: 15s
  max_retries: 4
"#;
        let graph = Config::from_yaml(yaml).unwrap().graph().unwrap();

        let db = graph.node("db").unwrap();
        assert_eq!(db.params.timeout, Duration::from_secs(15));
        assert_eq!(db.params.max_retries, 4);
        assert_eq!(db.params.health.as_deref(), Some("http://db/health"));
        assert_eq!(db.params.image.name(), "db");

        let api = graph.node("api").unwrap();
        assert_eq!(api.params.timeout, Duration::from_secs(2));
        assert_eq!(api.params.max_retries, 0);
        assert_eq!(graph.longest_chain(), 2);
    }

    #[test]
    fn unknown_dependency_is_reported() {
        let yaml = r#"
services:
  api:
    dependencies: [db]
"#;
        let err = Config::from_yaml(yaml).unwrap().graph().unwrap_err();
        assert!(matches!(err, GraphError::UnknownDependency { .. }));
    }

    #[test]
    fn cycle_is_reported() {
        let yaml = r#"
services:
  a:
    dependencies: [b]
  b:
    dependencies: [a]
"#;
        let config = Config::from_yaml(yaml).unwrap();
        assert!(matches!(config.graph(), Err(GraphError::Cycle { .. })));
        assert!(validate_graph(&config).is_err());
    }
}

mod discovery {
    use super::*;
    use stagehand::error::Error;

    const MINIMAL: &str = "services:\n  api: {}\n";

    #[test]
    fn finds_primary_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILENAME), MINIMAL).unwrap();
        assert_eq!(Config::discover(dir.path()).unwrap().services.len(), 1);
    }

    #[test]
    fn finds_alternate_locations() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join(".stagehand")).unwrap();
        std::fs::write(dir.path().join(CONFIG_FILENAME_DIR), MINIMAL).unwrap();
        assert!(Config::discover(dir.path()).is_ok());
    }

    #[test]
    fn missing_config_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = Config::discover(dir.path()).unwrap_err();
        assert!(matches!(err, Error::ConfigNotFound(_)));
    }

    #[test]
    fn init_writes_a_loadable_template() {
        let dir = tempfile::tempdir().unwrap();
        init_config(dir.path(), false).unwrap();

        let config = Config::discover(dir.path()).unwrap();
        assert_eq!(config.services.len(), 3);
        assert!(config.graph().is_ok());

        let err = init_config(dir.path(), false).unwrap_err();
        assert!(matches!(err, Error::AlreadyExists(_)));
        assert!(init_config(dir.path(), true).is_ok());
    }
}
