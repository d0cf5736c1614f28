// ABOUTME: Config scaffolding for new projects.
// ABOUTME: Writes a stagehand.yml template describing a small service chain.

use std::fmt::Write as _;
use std::path::Path;

use crate::error::{Error, Result};

use super::{CONFIG_FILENAME, Config};

pub fn init_config(dir: &Path, force: bool) -> Result<()> {
    let config_path = dir.join(CONFIG_FILENAME);

    if config_path.exists() && !force {
        return Err(Error::AlreadyExists(config_path));
    }

    let yaml = generate_template_yaml(&Config::template());
    std::fs::write(&config_path, yaml)?;

    Ok(())
}

fn generate_template_yaml(config: &Config) -> String {
    let mut yaml = String::from(
        "# Services deploy after everything listed in `dependencies` is healthy.\n\
         # Higher `priority` starts first when several services are eligible.\n\
         services:\n",
    );

    for (name, service) in &config.services {
        let _ = writeln!(yaml, "  {name}:");
        if let Some(ref image) = service.image {
            let _ = writeln!(yaml, "    image: {image}");
        }
        let deps: Vec<&str> = service.dependencies.iter().map(|d| d.as_str()).collect();
        let _ = writeln!(yaml, "    dependencies: [{}]", deps.join(", "));
        let _ = writeln!(yaml, "    priority: {}", service.priority);
        if let Some(ref health) = service.health {
            let _ = writeln!(yaml, "    health:\n      url: {}", health.url);
        }
    }

    let _ = write!(
        yaml,
        r#"
defaults:
  timeout: {}s
  max_retries: {}

execution:
  concurrency_limit: {}
  retry:
    base_delay: 2s
    max_delay: 30s
"#,
        config.defaults.timeout.as_secs(),
        config.defaults.max_retries,
        config.execution.concurrency_limit,
    );

    if let Some(ref deployer) = config.deployer {
        let _ = write!(yaml, "\ndeployer:\n  deploy: {}\n", deployer.deploy);
        if let Some(ref rollback) = deployer.rollback {
            let _ = writeln!(yaml, "  rollback: {rollback}");
        }
    }

    yaml
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn template_yaml_parses_back() {
        let yaml = generate_template_yaml(&Config::template());
        let config = Config::from_yaml(&yaml).unwrap();
        assert_eq!(config.services.len(), 3);
        assert!(config.graph().is_ok());
        assert_eq!(
            config.deployer.unwrap().rollback.as_deref(),
            Some("./scripts/rollback.sh")
        );
    }
}
