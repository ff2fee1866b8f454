//! Run report: every group's terminal state, and every failure with its
//! kind and message.

use serde::{Serialize, Serializer};

use fleetroll_fleet::RefreshStatus;

use crate::error::{CompositeError, Failure, RolloutError, RolloutResult};

/// How a group's instances get replaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeployPath {
    /// Provider-native instance refresh.
    Refresh,
    /// Standby, remote deploy, exit standby, per instance.
    Standby,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupState {
    Done,
    Failed,
}

/// Phase a group was in when it reached its terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupPhase {
    Preflight,
    PublishImage,
    UpdateLaunchTemplate,
    Refresh,
    Standby,
    Done,
}

/// Kind and message of an error, as shown to the operator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorSummary {
    pub kind: &'static str,
    pub message: String,
}

impl From<&RolloutError> for ErrorSummary {
    fn from(err: &RolloutError) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

fn serialize_error<S: Serializer>(err: &Option<RolloutError>, s: S) -> Result<S::Ok, S::Error> {
    err.as_ref().map(ErrorSummary::from).serialize(s)
}

#[derive(Debug, Clone, Serialize)]
pub struct InstanceReport {
    pub id: String,
    pub address: Option<String>,
    pub state: GroupState,
    pub error: Option<ErrorSummary>,
}

#[derive(Debug, Serialize)]
pub struct GroupReport {
    pub name: String,
    pub path: DeployPath,
    pub state: GroupState,
    pub phase: GroupPhase,
    pub image_id: Option<String>,
    pub template_version: Option<String>,
    pub refresh_id: Option<String>,
    pub refresh_status: Option<RefreshStatus>,
    pub refresh_percentage: Option<u8>,
    pub instances: Vec<InstanceReport>,
    #[serde(serialize_with = "serialize_error")]
    pub error: Option<RolloutError>,
}

impl GroupReport {
    pub fn new(name: &str, path: DeployPath) -> Self {
        Self {
            name: name.to_string(),
            path,
            state: GroupState::Failed,
            phase: GroupPhase::Preflight,
            image_id: None,
            template_version: None,
            refresh_id: None,
            refresh_status: None,
            refresh_percentage: None,
            instances: Vec::new(),
            error: None,
        }
    }

    pub fn is_done(&self) -> bool {
        self.state == GroupState::Done
    }

    pub(crate) fn finish(&mut self, result: RolloutResult<()>) {
        match result {
            Ok(()) => {
                self.state = GroupState::Done;
                self.phase = GroupPhase::Done;
            }
            Err(err) => {
                self.state = GroupState::Failed;
                self.error = Some(err);
            }
        }
    }
}

#[derive(Debug, Default, Serialize)]
pub struct RunReport {
    pub groups: Vec<GroupReport>,
}

impl RunReport {
    /// Groups are kept sorted by name; completion order is not meaningful.
    pub fn new(mut groups: Vec<GroupReport>) -> Self {
        groups.sort_by(|a, b| a.name.cmp(&b.name));
        Self { groups }
    }

    pub fn is_success(&self) -> bool {
        self.groups.iter().all(GroupReport::is_done)
    }

    pub fn group(&self, name: &str) -> Option<&GroupReport> {
        self.groups.iter().find(|g| g.name == name)
    }

    /// `Ok` iff every group is done, else a composite of every failed group.
    pub fn into_result(self) -> RolloutResult<()> {
        let failures: Vec<Failure> = self
            .groups
            .into_iter()
            .filter_map(|g| {
                let error = match (g.state, g.error) {
                    (GroupState::Done, _) => return None,
                    (GroupState::Failed, Some(error)) => error,
                    (GroupState::Failed, None) => RolloutError::TaskPanicked {
                        origin: g.name.clone(),
                    },
                };
                Some(Failure {
                    origin: g.name,
                    error,
                })
            })
            .collect();

        if failures.is_empty() {
            Ok(())
        } else {
            Err(CompositeError::new(failures).into())
        }
    }

    pub fn to_json(&self) -> anyhow::Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Human-readable summary of a run.
pub fn format_report(report: &RunReport) -> String {
    let mut out = String::new();
    let done = report.groups.iter().filter(|g| g.is_done()).count();

    out.push_str(&format!(
        "Rolling deployment: {done}/{} groups done\n\n",
        report.groups.len()
    ));

    for g in &report.groups {
        let state = match g.state {
            GroupState::Done => "✅ done",
            GroupState::Failed => "❌ failed",
        };
        let path = match g.path {
            DeployPath::Refresh => "instance refresh",
            DeployPath::Standby => "standby",
        };
        out.push_str(&format!("  {:<24} {state}  ({path})\n", g.name));

        if let Some(image) = &g.image_id {
            out.push_str(&format!("     Image:    {image}\n"));
        }
        if let Some(version) = &g.template_version {
            out.push_str(&format!("     Template: version {version}\n"));
        }
        if let Some(id) = &g.refresh_id {
            let status = g
                .refresh_status
                .map(|s| s.to_string())
                .unwrap_or_else(|| "unknown".to_string());
            match g.refresh_percentage {
                Some(pct) => out.push_str(&format!("     Refresh:  {id} {status} ({pct}%)\n")),
                None => out.push_str(&format!("     Refresh:  {id} {status}\n")),
            }
        }
        for inst in &g.instances {
            let addr = inst.address.as_deref().unwrap_or("-");
            match &inst.error {
                None => out.push_str(&format!("     • {} {addr} done\n", inst.id)),
                Some(e) => out.push_str(&format!(
                    "     • {} {addr} failed [{}] {}\n",
                    inst.id, e.kind, e.message
                )),
            }
        }
        if let Some(err) = &g.error {
            if !matches!(err, RolloutError::Composite(_)) || g.instances.is_empty() {
                out.push_str(&format!("     Error:    [{}] {err}\n", err.kind()));
            } else {
                out.push_str(&format!("     Error:    [{}] see instances above\n", err.kind()));
            }
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failed(name: &str) -> GroupReport {
        let mut g = GroupReport::new(name, DeployPath::Refresh);
        g.finish(Err(RolloutError::NoLaunchTemplate(name.to_string())));
        g
    }

    fn done(name: &str) -> GroupReport {
        let mut g = GroupReport::new(name, DeployPath::Refresh);
        g.finish(Ok(()));
        g
    }

    #[test]
    fn success_requires_every_group_done() {
        assert!(RunReport::new(vec![done("a"), done("b")]).is_success());
        assert!(!RunReport::new(vec![done("a"), failed("b")]).is_success());
        assert!(RunReport::new(vec![done("a")]).into_result().is_ok());
    }

    #[test]
    fn into_result_lists_failed_groups() {
        let report = RunReport::new(vec![failed("b"), done("a"), failed("c")]);
        let RolloutError::Composite(err) = report.into_result().unwrap_err() else {
            panic!("expected composite");
        };
        let origins: Vec<_> = err.failures.iter().map(|f| f.origin.as_str()).collect();
        assert_eq!(origins, ["b", "c"]);
    }

    #[test]
    fn json_carries_error_kind() {
        let report = RunReport::new(vec![failed("web")]);
        let json: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();
        let group = &json["groups"][0];
        assert_eq!(group["state"], "failed");
        assert_eq!(group["phase"], "preflight");
        assert_eq!(group["error"]["kind"], "NoLaunchTemplate");
    }

    #[test]
    fn text_report_mentions_each_group() {
        let text = format_report(&RunReport::new(vec![done("api"), failed("web")]));
        assert!(text.contains("1/2 groups done"));
        assert!(text.contains("api"));
        assert!(text.contains("[NoLaunchTemplate]"));
    }
}
