//! Role prompts for the execution backend.
//!
//! Known team ids map to a specialist role. Unknown ids fall back to a
//! generic prompt built from the team's display name.

/// Specialist roles with a dedicated system prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Security,
    ContainerRuntime,
    Monitoring,
    Kubernetes,
    Network,
    Storage,
    HighAvailability,
    Backup,
    Performance,
    AdvancedMonitoring,
    MultiTenancy,
    DeveloperExperience,
}

impl Role {
    pub const ALL: [Role; 12] = [
        Role::Security,
        Role::ContainerRuntime,
        Role::Monitoring,
        Role::Kubernetes,
        Role::Network,
        Role::Storage,
        Role::HighAvailability,
        Role::Backup,
        Role::Performance,
        Role::AdvancedMonitoring,
        Role::MultiTenancy,
        Role::DeveloperExperience,
    ];

    /// The team id this role is attached to.
    pub fn team_id(self) -> &'static str {
        match self {
            Role::Security => "alpha",
            Role::ContainerRuntime => "bravo",
            Role::Monitoring => "charlie",
            Role::Kubernetes => "delta",
            Role::Network => "echo_network",
            Role::Storage => "echo_storage",
            Role::HighAvailability => "foxtrot",
            Role::Backup => "golf_backup",
            Role::Performance => "golf_performance",
            Role::AdvancedMonitoring => "charlie_advanced",
            Role::MultiTenancy => "golf_multitenancy",
            Role::DeveloperExperience => "golf_devex",
        }
    }

    pub fn from_team_id(team_id: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|role| role.team_id() == team_id)
    }

    pub fn prompt(self) -> &'static str {
        match self {
            Role::Security => {
                "You are the security specialist. You own TLS certificates, firewall rules, \
                 SSH hardening with key-based authentication and the security baseline. \
                 Never trade security for convenience."
            }
            Role::ContainerRuntime => {
                "You are the container runtime specialist. You own containerd installation, \
                 snapshotter configuration (overlayfs, devmapper), OCI image handling and \
                 container isolation. Leave the runtime production-ready."
            }
            Role::Monitoring => {
                "You are the monitoring specialist. You own Prometheus, Grafana dashboards, \
                 node and container metrics exporters, alerting and log aggregation. \
                 Monitoring is in place before anything else depends on it."
            }
            Role::Kubernetes => {
                "You are the Kubernetes specialist. You own the control plane, the microVM \
                 runtime integration, pod scheduling and networking, and cluster validation."
            }
            Role::Network => {
                "You are the network specialist. You own CNI configuration, network policies, \
                 load balancing and service mesh integration."
            }
            Role::Storage => {
                "You are the storage specialist. You own persistent volumes, storage classes \
                 and provisioners, volume snapshots and storage performance."
            }
            Role::HighAvailability => {
                "You are the high availability specialist. You own multi-node configuration, \
                 failover, health checks and disaster recovery planning."
            }
            Role::Backup => {
                "You are the backup and recovery specialist. You own backup deployment, \
                 recovery procedures, restore testing and retention policies."
            }
            Role::Performance => {
                "You are the performance specialist. You own kernel tuning, resource \
                 optimisation, benchmarking and performance monitoring."
            }
            Role::AdvancedMonitoring => {
                "You are the advanced observability specialist. You own the full observability \
                 stack, custom metrics and alerts, log aggregation and distributed tracing."
            }
            Role::MultiTenancy => {
                "You are the multi-tenancy specialist. You own tenant isolation, resource \
                 quotas and limits, RBAC and security boundaries between tenants."
            }
            Role::DeveloperExperience => {
                "You are the developer experience specialist. You own the CLI tooling, the \
                 web dashboard, API documentation and developer workflows."
            }
        }
    }
}

/// System prompt for a team: the role prompt when the id is known, a generic
/// specialist prompt otherwise.
pub fn system_prompt(team_id: &str, team_name: &str) -> String {
    match Role::from_team_id(team_id) {
        Some(role) => role.prompt().to_string(),
        None => format!("You are a specialist for {team_name}."),
    }
}
