//! Sunbeam (OpenStack snap) commands, run inside the VM as the guest user.

use crate::lxd::Lxd;
use crate::util::CommandLine;

pub const SEED_SERVICE: &str = "snapd.seeded.service";
/// `systemctl status` marker for a oneshot unit that completed.
pub const SEED_ACTIVE_MARKER: &str = "active (exited)";

/// Builds the in-VM bootstrap commands.
#[derive(Debug, Clone)]
pub struct Sunbeam {
    lxd: Lxd,
    user: String,
}

impl Sunbeam {
    pub fn new(lxd: Lxd, user: impl Into<String>) -> Self {
        Self {
            lxd,
            user: user.into(),
        }
    }

    pub fn install(&self, channel: &str) -> CommandLine {
        self.lxd.exec_as(
            &self.user,
            ["sudo", "snap", "install", "openstack", "--channel", channel],
        )
    }

    /// Pipe the generated node preparation script into bash.
    pub fn prepare_node(&self) -> CommandLine {
        self.lxd.exec_as(
            &self.user,
            ["bash", "-c", "sunbeam prepare-node-script | bash -x"],
        )
    }

    pub fn bootstrap(&self) -> CommandLine {
        self.lxd.exec_as(
            &self.user,
            ["sunbeam", "cluster", "bootstrap", "--accept-defaults"],
        )
    }

    /// Print the admin `clouds.yaml` to stdout.
    pub fn cloud_config(&self) -> CommandLine {
        self.lxd
            .exec_as(&self.user, ["sunbeam", "cloud-config", "-a"])
    }

    pub fn seed_status(&self) -> CommandLine {
        self.lxd.exec(["systemctl", "status", SEED_SERVICE])
    }

    /// Identity lookup for the guest user.
    pub fn user_id(&self) -> CommandLine {
        self.lxd.exec(["id", self.user.as_str()])
    }

    /// Passwd database entry for the guest user.
    pub fn user_entry(&self) -> CommandLine {
        self.lxd.exec(["getent", "passwd", self.user.as_str()])
    }
}

/// Whether `systemctl status` output shows the seed unit has finished.
pub fn seed_service_active(status_output: &str) -> bool {
    status_output.contains(SEED_ACTIVE_MARKER)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sunbeam() -> Sunbeam {
        Sunbeam::new(Lxd::new("openstack"), "ubuntu")
    }

    #[test]
    fn test_install_command() {
        assert_eq!(
            sunbeam().install("2024.1/beta").to_string(),
            "lxc exec openstack -- sudo -i -u ubuntu sudo snap install openstack --channel 2024.1/beta"
        );
    }

    #[test]
    fn test_prepare_node_keeps_pipeline_in_one_arg() {
        let cmd = sunbeam().prepare_node();
        assert_eq!(
            cmd.args.last().map(String::as_str),
            Some("sunbeam prepare-node-script | bash -x")
        );
    }

    #[test]
    fn test_user_checks_run_as_root() {
        assert_eq!(
            sunbeam().user_entry().to_string(),
            "lxc exec openstack -- getent passwd ubuntu"
        );
        assert_eq!(sunbeam().user_id().to_string(), "lxc exec openstack -- id ubuntu");
    }

    #[test]
    fn test_seed_service_active() {
        let active = "● snapd.seeded.service - Wait until snapd is fully seeded\n   \
                      Active: active (exited) since Tue 2024-06-04 10:00:00 UTC; 1min ago\n";
        assert!(seed_service_active(active));

        let activating = "● snapd.seeded.service - Wait until snapd is fully seeded\n   \
                          Active: activating (start) since Tue 2024-06-04 10:00:00 UTC\n";
        assert!(!seed_service_active(activating));
        assert!(!seed_service_active(""));
    }
}
