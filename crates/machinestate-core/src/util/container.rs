//! Container environment detection.
//!
//! Detects whether the inspected machine runs the collector inside a
//! container (Docker, Kubernetes, Podman, LXC, etc.) or on bare metal. All
//! checks go through the [`Host`], so mocked machines can be either.

use std::path::Path;

use crate::collector::Host;

/// Cgroup path fragments that only appear inside containers.
const CGROUP_PATTERNS: [&str; 5] = [
    "kubepods",
    "docker",
    "containerd",
    "lxc",
    "/system.slice/containerd",
];

/// Returns `true` if the host looks like a container.
pub fn is_container(host: &dyn Host, proc_path: &Path) -> bool {
    check_k8s_env_vars(host)
        || check_service_account(host)
        || check_container_markers(host)
        || check_cgroup(host, proc_path)
}

/// Checks for Kubernetes environment variables.
/// These are automatically injected by K8s into all pods.
fn check_k8s_env_vars(host: &dyn Host) -> bool {
    host.var("KUBERNETES_SERVICE_HOST").is_some()
}

/// Checks for Kubernetes service account files.
fn check_service_account(host: &dyn Host) -> bool {
    host.exists(Path::new(
        "/var/run/secrets/kubernetes.io/serviceaccount/token",
    ))
}

/// Checks for container marker files.
fn check_container_markers(host: &dyn Host) -> bool {
    host.exists(Path::new("/.dockerenv")) || host.exists(Path::new("/run/.containerenv"))
}

/// Checks the cgroup of PID 1 for container-specific patterns.
fn check_cgroup(host: &dyn Host, proc_path: &Path) -> bool {
    let Ok(content) = host.read_to_string(&proc_path.join("1/cgroup")) else {
        return false;
    };
    CGROUP_PATTERNS.iter().any(|p| content.contains(p))
}
