use serde::Serialize;
use std::collections::BTreeMap;

use crate::instance::Instance;

/// What the status boundary sees of one instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstanceStatus {
    pub running: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pid: Option<i32>,
    pub command: Vec<String>,
}

/// Instance name -> status.
pub type StatusReport = BTreeMap<String, InstanceStatus>;

impl Instance {
    /// Add this instance's record to `report`. Pure read.
    pub fn dump(&self, report: &mut StatusReport) {
        report.insert(
            self.name().to_owned(),
            InstanceStatus {
                running: self.is_running(),
                pid: self.pid().map(|p| p.as_raw()),
                command: self.command().as_slice().to_vec(),
            },
        );
    }
}

pub fn render(report: &StatusReport) -> serde_json::Result<String> {
    serde_json::to_string_pretty(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{entry, FakeLauncher, FakeLoop};
    use serde_json::json;

    #[test]
    fn running_instance_reports_pid() {
        let mut events = FakeLoop::default();
        let mut launcher = FakeLauncher::default();
        let mut inst = Instance::new("web", entry("command: [/bin/sleep, '5']"));
        inst.start(&mut events, &mut launcher);

        let mut report = StatusReport::new();
        inst.dump(&mut report);

        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(
            value,
            json!({ "web": { "running": true, "pid": 1001, "command": ["/bin/sleep", "5"] } })
        );
    }

    #[test]
    fn stopped_instance_has_no_pid_field() {
        let inst = Instance::new("web", entry("command: [/bin/true]"));
        let mut report = StatusReport::new();
        inst.dump(&mut report);

        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(value, json!({ "web": { "running": false, "command": ["/bin/true"] } }));
    }

    #[test]
    fn invalid_instance_dumps_last_known_command() {
        let empty = Instance::new("a", entry("command: []"));
        let bad_env = Instance::new("b", entry("command: [/bin/true]\nenv: { N: 1 }"));
        let mut report = StatusReport::new();
        empty.dump(&mut report);
        bad_env.dump(&mut report);

        assert_eq!(report["a"], InstanceStatus { running: false, pid: None, command: vec![] });
        assert_eq!(report["b"].command, vec!["/bin/true".to_string()]);
        assert!(render(&report).unwrap().contains("\"running\": false"));
    }
}
