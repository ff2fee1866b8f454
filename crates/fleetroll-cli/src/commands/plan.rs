use std::path::Path;

use fleetroll_core::{DeployConfig, GroupProperties};

pub fn plan(path: &str) -> anyhow::Result<()> {
    let config = DeployConfig::from_file(Path::new(path))?;
    print!("{}", render(&config)?);
    Ok(())
}

/// Per-group deploy path and settings, as text.
pub fn render(config: &DeployConfig) -> anyhow::Result<String> {
    let groups = config.validate()?;
    let run = &config.run;
    let mut out = String::new();

    out.push_str("═══ Deployment Plan ═══\n\n");
    out.push_str(&format!(
        "Concurrency: {} group(s), {} instance(s) per group\n",
        run.group_concurrency, run.instance_concurrency
    ));
    out.push_str(&format!(
        "Refresh polling: every {}s, {}\n",
        run.refresh_poll_interval_secs,
        timeout(run.refresh_timeout_secs)
    ));
    if let Some(keep) = run.keep_template_versions {
        out.push_str(&format!("Template versions kept: {keep}\n"));
    }
    out.push('\n');

    for group in &groups {
        out.push_str(&render_group(group, run.deploy_command.as_deref()));
    }
    Ok(out)
}

fn render_group(group: &GroupProperties, deploy_command: Option<&str>) -> String {
    let mut out = format!("▸ {}\n", group.name());
    match group.image_id() {
        Some(image) => out.push_str(&format!("  image:   reuse {image}\n")),
        None => out.push_str("  image:   publish from launch template source\n"),
    }

    if group.rolling() {
        out.push_str("  path:    instance refresh\n");
        let warmup = group
            .instance_warmup()
            .map_or("group grace period".to_string(), |s| format!("{s}s"));
        out.push_str(&format!("  warmup:  {warmup}\n"));
        out.push_str(&format!(
            "  healthy: min {}, max {}\n",
            percent(group.min_healthy_percentage()),
            percent(group.max_healthy_percentage())
        ));
    } else {
        out.push_str("  path:    standby cycle\n");
        out.push_str(&format!("  deploy:  {}\n", deploy_command.unwrap_or("-")));
    }
    out.push('\n');
    out
}

fn percent(value: Option<u32>) -> String {
    value.map_or("provider default".to_string(), |v| format!("{v}%"))
}

fn timeout(secs: Option<u64>) -> String {
    secs.map_or("no timeout".to_string(), |s| format!("timeout {s}s"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_both_paths() {
        let config = DeployConfig::parse(
            r#"
[run]
group_concurrency = 2
refresh_timeout_secs = 3600
deploy_command = "ssh {address} deploy"

[groups.web]
min_healthy_percentage = 90
instance_warmup = 120

[groups.worker]
rolling = false
image_id = "ami-7"
"#,
        )
        .unwrap();

        let out = render(&config).unwrap();
        assert!(out.contains("Concurrency: 2 group(s), 1 instance(s) per group"));
        assert!(out.contains("every 15s, timeout 3600s"));
        assert!(out.contains("▸ web\n  image:   publish from launch template source\n  path:    instance refresh\n  warmup:  120s\n  healthy: min 90%, max provider default\n"));
        assert!(out.contains("▸ worker\n  image:   reuse ami-7\n  path:    standby cycle\n  deploy:  ssh {address} deploy\n"));
    }

    #[test]
    fn refuses_invalid_config() {
        let config = DeployConfig::parse("[groups.worker]\nrolling = false\n").unwrap();
        let err = render(&config).unwrap_err();
        assert!(err.to_string().contains("worker"), "{err}");
    }
}
