use std::path::Path;

use anyhow::Context;
use fleetroll_core::{DeployConfig, GroupProperties};

pub fn validate(path: &str) -> anyhow::Result<()> {
    let groups = load(path)?;
    println!("✓ {path}: {} group(s)", groups.len());
    for group in &groups {
        println!("  {}", describe(group));
    }
    Ok(())
}

/// Load and validate, with the config path attached to any error.
pub fn load(path: &str) -> anyhow::Result<Vec<GroupProperties>> {
    let config = DeployConfig::from_file(Path::new(path))?;
    config
        .validate()
        .with_context(|| format!("invalid deployment config {path}"))
}

fn describe(group: &GroupProperties) -> String {
    let mut line = format!(
        "{} (rolling: {})",
        group.name(),
        group.rolling()
    );
    if let Some(min) = group.min_healthy_percentage() {
        line.push_str(&format!(", min healthy {min}%"));
    }
    if let Some(max) = group.max_healthy_percentage() {
        line.push_str(&format!(", max healthy {max}%"));
    }
    if let Some(image) = group.image_id() {
        line.push_str(&format!(", image {image}"));
    }
    if !group.overrides().is_empty() {
        let keys: Vec<_> = group.overrides().keys().map(String::as_str).collect();
        line.push_str(&format!(", overrides [{}]", keys.join(", ")));
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn loads_valid_config() {
        let file = write_config(
            r#"
[groups.web]
min_healthy_percentage = 90

[groups.api]
healthy_percentage = 50
"#,
        );
        let groups = load(file.path().to_str().unwrap()).unwrap();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].name(), "api");
        assert_eq!(groups[0].min_healthy_percentage(), Some(50));
    }

    #[test]
    fn error_names_the_file() {
        let file = write_config("[groups.web]\nmax_healthy_percentage = 150\n");
        let path = file.path().to_str().unwrap().to_string();
        let err = load(&path).unwrap_err();
        assert!(format!("{err:#}").contains(&path));
        assert!(format!("{err:#}").contains("web"));
    }

    #[test]
    fn describes_group_settings() {
        let group = GroupProperties::new("web")
            .with_healthy_percentages(Some(90), Some(110))
            .unwrap()
            .with_image_id("ami-1");
        assert_eq!(
            describe(&group),
            "web (rolling: true), min healthy 90%, max healthy 110%, image ami-1"
        );
    }
}
