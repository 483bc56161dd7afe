//! Install scripts shipped inside the binary

use crate::error::{Error, Result};
use command_executor::shell_escape;
use resource_store::{AgentScripts, Package, Script};
use std::path::Path;

/// Remote directory scripts are staged under
pub const REMOTE_SCRIPT_ROOT: &str = "/tmp/edgectl";

/// A file to copy to the remote host
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptFile {
    /// File name inside the staging directory
    pub name: String,
    /// File contents
    pub body: Vec<u8>,
}

impl ScriptFile {
    fn embedded(name: &str, body: &str) -> Self {
        Self {
            name: name.to_string(),
            body: body.as_bytes().to_vec(),
        }
    }
}

/// Component a set of scripts installs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Component {
    /// Controller service
    Controller,
    /// Agent daemon
    Agent,
    /// Connector service
    Connector,
}

impl Component {
    /// Lowercase name, used for directories and messages
    pub fn as_str(self) -> &'static str {
        match self {
            Component::Controller => "controller",
            Component::Agent => "agent",
            Component::Connector => "connector",
        }
    }

    /// Staging directory on the remote host
    pub fn remote_dir(self) -> String {
        format!("{REMOTE_SCRIPT_ROOT}/{}", self.as_str())
    }
}

/// Scripts and invocations for installing one component
#[derive(Debug, Clone)]
pub struct InstallPlan {
    /// What is installed
    pub component: Component,
    /// Files to stage
    pub files: Vec<ScriptFile>,
    /// Ordered install steps: description and shell line
    pub steps: Vec<(String, String)>,
    /// Shell line that removes the component
    pub uninstall: String,
}

fn invocation(component: Component, script: &str, args: &[String]) -> String {
    let mut line = shell_escape(&format!("{}/{}", component.remote_dir(), script));
    for arg in args {
        line.push(' ');
        line.push_str(&shell_escape(arg));
    }
    line
}

fn package_args(package: &Package) -> Vec<String> {
    vec![
        package.version.clone(),
        package.repo.clone(),
        package.token.clone(),
    ]
}

fn default_plan(
    component: Component,
    files: Vec<ScriptFile>,
    install_script: &str,
    uninstall_script: &str,
    package: &Package,
) -> InstallPlan {
    let steps = vec![
        (
            "check prerequisites".to_string(),
            invocation(component, "check_prereqs.sh", &[]),
        ),
        (
            "install dependencies".to_string(),
            invocation(component, "install_deps.sh", &[]),
        ),
        (
            format!("install {}", component.as_str()),
            invocation(component, install_script, &package_args(package)),
        ),
    ];
    InstallPlan {
        component,
        files,
        steps,
        uninstall: invocation(component, uninstall_script, &[]),
    }
}

/// Scripts for a Controller install
pub fn controller_plan(package: &Package) -> InstallPlan {
    let files = vec![
        ScriptFile::embedded(
            "check_prereqs.sh",
            include_str!("../../assets/controller/check_prereqs.sh"),
        ),
        ScriptFile::embedded(
            "install_deps.sh",
            include_str!("../../assets/controller/install_deps.sh"),
        ),
        ScriptFile::embedded(
            "install_controller.sh",
            include_str!("../../assets/controller/install_controller.sh"),
        ),
        ScriptFile::embedded(
            "uninstall_controller.sh",
            include_str!("../../assets/controller/uninstall_controller.sh"),
        ),
    ];
    default_plan(
        Component::Controller,
        files,
        "install_controller.sh",
        "uninstall_controller.sh",
        package,
    )
}

/// Scripts for a Connector install
pub fn connector_plan(package: &Package) -> InstallPlan {
    let files = vec![
        ScriptFile::embedded(
            "check_prereqs.sh",
            include_str!("../../assets/connector/check_prereqs.sh"),
        ),
        ScriptFile::embedded(
            "install_deps.sh",
            include_str!("../../assets/connector/install_deps.sh"),
        ),
        ScriptFile::embedded(
            "install_connector.sh",
            include_str!("../../assets/connector/install_connector.sh"),
        ),
        ScriptFile::embedded(
            "uninstall_connector.sh",
            include_str!("../../assets/connector/uninstall_connector.sh"),
        ),
    ];
    default_plan(
        Component::Connector,
        files,
        "install_connector.sh",
        "uninstall_connector.sh",
        package,
    )
}

/// Scripts for an Agent install, with user overrides applied
///
/// Overrides replace the dependency, install and uninstall scripts. They are
/// read from `scripts.dir`; the prerequisite check always stays the built-in
/// one.
pub fn agent_plan(package: &Package, overrides: Option<&AgentScripts>) -> Result<InstallPlan> {
    let mut plan = default_plan(
        Component::Agent,
        vec![
            ScriptFile::embedded(
                "check_prereqs.sh",
                include_str!("../../assets/agent/check_prereqs.sh"),
            ),
            ScriptFile::embedded(
                "install_deps.sh",
                include_str!("../../assets/agent/install_deps.sh"),
            ),
            ScriptFile::embedded(
                "install_agent.sh",
                include_str!("../../assets/agent/install_agent.sh"),
            ),
            ScriptFile::embedded(
                "uninstall_agent.sh",
                include_str!("../../assets/agent/uninstall_agent.sh"),
            ),
        ],
        "install_agent.sh",
        "uninstall_agent.sh",
        package,
    );

    let Some(overrides) = overrides else {
        return Ok(plan);
    };

    let mut load = |script: &Script| -> Result<String> {
        let dir = overrides.dir.as_deref().ok_or_else(|| {
            Error::input(format!(
                "script override {} needs a scripts directory",
                script.name
            ))
        })?;
        let file = read_override(dir, &script.name)?;
        plan.files.retain(|f| f.name != file.name);
        plan.files.push(file);
        Ok(invocation(Component::Agent, &script.name, &script.args))
    };

    let deps = overrides.deps.as_ref().map(&mut load).transpose()?;
    let install = overrides.install.as_ref().map(&mut load).transpose()?;
    let uninstall = overrides.uninstall.as_ref().map(&mut load).transpose()?;

    if let Some(line) = deps {
        plan.steps[1].1 = line;
    }
    if let Some(line) = install {
        plan.steps[2].1 = line;
    }
    if let Some(line) = uninstall {
        plan.uninstall = line;
    }
    Ok(plan)
}

fn read_override(dir: &Path, name: &str) -> Result<ScriptFile> {
    if name.contains('/') || name == "check_prereqs.sh" {
        return Err(Error::input(format!("script {name} cannot be overridden")));
    }
    let path = dir.join(name);
    let body = std::fs::read(&path)
        .map_err(|e| Error::input(format!("cannot read script {}: {e}", path.display())))?;
    Ok(ScriptFile {
        name: name.to_string(),
        body,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_controller_steps_in_order() {
        let plan = controller_plan(&Package {
            version: "3.0.1".to_string(),
            ..Package::default()
        });
        let lines: Vec<_> = plan.steps.iter().map(|(_, l)| l.as_str()).collect();
        assert_eq!(
            lines,
            vec![
                "/tmp/edgectl/controller/check_prereqs.sh",
                "/tmp/edgectl/controller/install_deps.sh",
                "/tmp/edgectl/controller/install_controller.sh 3.0.1 '' ''",
            ]
        );
        assert_eq!(plan.files.len(), 4);
    }

    #[test]
    fn test_agent_overrides_keep_prereq_check() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::write(dir.path().join("my_install.sh"), "#!/bin/sh\necho custom\n").unwrap();

        let overrides = AgentScripts {
            dir: Some(dir.path().to_path_buf()),
            install: Some(Script {
                name: "my_install.sh".to_string(),
                args: vec!["--fast".to_string()],
            }),
            ..AgentScripts::default()
        };
        let plan = agent_plan(&Package::default(), Some(&overrides)).unwrap();

        assert_eq!(plan.steps[0].1, "/tmp/edgectl/agent/check_prereqs.sh");
        assert_eq!(plan.steps[2].1, "/tmp/edgectl/agent/my_install.sh --fast");
        let custom = plan.files.iter().find(|f| f.name == "my_install.sh").unwrap();
        assert_eq!(custom.body, b"#!/bin/sh\necho custom\n");
    }

    #[test]
    fn test_prereq_check_cannot_be_overridden() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::write(dir.path().join("check_prereqs.sh"), "true").unwrap();
        let overrides = AgentScripts {
            dir: Some(dir.path().to_path_buf()),
            deps: Some(Script {
                name: "check_prereqs.sh".to_string(),
                args: Vec::new(),
            }),
            ..AgentScripts::default()
        };
        assert!(matches!(
            agent_plan(&Package::default(), Some(&overrides)),
            Err(Error::Input(_))
        ));
    }

    #[test]
    fn test_override_without_dir_is_input_error() {
        let overrides = AgentScripts {
            uninstall: Some(Script {
                name: "bye.sh".to_string(),
                args: Vec::new(),
            }),
            ..AgentScripts::default()
        };
        assert!(agent_plan(&Package::default(), Some(&overrides)).is_err());
    }
}
