//! Legacy-to-new ACL upgrade coordinator.
//!
//! Each server runs one [`AclModeMonitor`] while it still enforces legacy
//! ACLs. On every tick it decides whether this server may switch:
//!
//! 1. Outside the ACL datacenter, every alive server of the ACL datacenter
//!    seen on the WAN must advertise `acls=enabled`.
//! 2. The leader additionally needs consistent reads and every alive LAN
//!    server at or above the minimum version. It then runs the one-time
//!    initialization, flips the flag and advertises.
//! 3. A follower flips and advertises once the leader's own LAN member
//!    advertises `acls=enabled`.
//!
//! The switch is irreversible. The monitor exits after advertising, or when
//! shutdown is requested.

use std::{sync::Arc, time::Duration};

use tokio::{task::JoinHandle, time::sleep};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{cluster::servers_meet_minimum_version, metrics, server::AclServer};

/// Consensus role the upgrade happened under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// The server initialized the new ACL system.
    Leader,
    /// The server mirrored the leader.
    Follower,
}

impl Role {
    /// Returns the role name used in logs and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Leader => "leader",
            Role::Follower => "follower",
        }
    }
}

/// Why an iteration did not upgrade.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HoldReason {
    /// An alive server of the ACL datacenter still runs legacy ACLs.
    AclDatacenterNotReady,
    /// The leader cannot serve consistent reads yet.
    ConsistentReadsUnavailable,
    /// An alive LAN server runs a build below the minimum version.
    ServersBelowMinimumVersion,
    /// The leader is unknown or not among the alive LAN servers.
    LeaderUnknown,
    /// The leader does not advertise the new ACL mode yet.
    LeaderNotUpgraded,
    /// A gossip member list could not be read.
    MembershipUnavailable,
}

impl HoldReason {
    /// Returns the reason name used in logs and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            HoldReason::AclDatacenterNotReady => "acl_datacenter_not_ready",
            HoldReason::ConsistentReadsUnavailable => "consistent_reads_unavailable",
            HoldReason::ServersBelowMinimumVersion => "servers_below_minimum_version",
            HoldReason::LeaderUnknown => "leader_unknown",
            HoldReason::LeaderNotUpgraded => "leader_not_upgraded",
            HoldReason::MembershipUnavailable => "membership_unavailable",
        }
    }
}

/// Outcome of evaluating the cluster state once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeDecision {
    /// Stay on legacy ACLs for now.
    Hold(HoldReason),
    /// Switch to the new ACL system.
    Upgrade(Role),
}

/// How the monitor task ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorOutcome {
    /// The server switched and advertised the new mode.
    Upgraded(Role),
    /// The flag was switched by someone else.
    AlreadyEnabled,
    /// Shutdown was requested first.
    Shutdown,
}

/// Background task driving the ACL mode upgrade of one server.
#[derive(Debug)]
pub struct AclModeMonitor {
    server: Arc<AclServer>,
    interval: Duration,
    /// Role of a completed switch whose advertisement still has to succeed.
    pending_publish: Option<Role>,
}

impl AclModeMonitor {
    /// Creates a monitor ticking at the configured mode check interval.
    pub fn new(server: Arc<AclServer>) -> Self {
        let interval = server.config().mode_check_interval;
        Self { server, interval, pending_publish: None }
    }

    /// Whether servers outside the ACL datacenter may upgrade.
    ///
    /// Always `Ok(true)` inside the ACL datacenter.
    fn acl_datacenter_ready(&self) -> Result<bool, HoldReason> {
        if self.server.in_acl_datacenter() {
            return Ok(true);
        }

        let members = self.server.membership().wan_members().map_err(|err| {
            warn!(error = %err, "Failed to read WAN members for ACL mode check");
            HoldReason::MembershipUnavailable
        })?;
        let acl_datacenter = self.server.acl_datacenter();
        let holdout = members
            .iter()
            .filter_map(|member| member.server())
            .filter(|server| server.is_alive() && server.datacenter == acl_datacenter)
            .find(|server| !server.acls_enabled());

        match holdout {
            Some(server) => {
                debug!(server = %server.name, acl_datacenter, "ACL datacenter server still on legacy ACLs");
                Ok(false)
            },
            None => Ok(true),
        }
    }

    /// Evaluates the cluster state once, without side effects.
    pub fn evaluate(&self) -> ModeDecision {
        match self.acl_datacenter_ready() {
            Ok(true) => {},
            Ok(false) => return ModeDecision::Hold(HoldReason::AclDatacenterNotReady),
            Err(reason) => return ModeDecision::Hold(reason),
        }

        let leadership = self.server.leadership();
        if leadership.is_leader() {
            if !leadership.ready_for_consistent_reads() {
                return ModeDecision::Hold(HoldReason::ConsistentReadsUnavailable);
            }
            let members = match self.server.membership().lan_members() {
                Ok(members) => members,
                Err(err) => {
                    warn!(error = %err, "Failed to read LAN members for ACL mode check");
                    return ModeDecision::Hold(HoldReason::MembershipUnavailable);
                },
            };
            if !servers_meet_minimum_version(&members, &self.server.config().min_server_version) {
                return ModeDecision::Hold(HoldReason::ServersBelowMinimumVersion);
            }
            return ModeDecision::Upgrade(Role::Leader);
        }

        let Some(leader_addr) = leadership.leader_addr() else {
            return ModeDecision::Hold(HoldReason::LeaderUnknown);
        };
        let members = match self.server.membership().lan_members() {
            Ok(members) => members,
            Err(err) => {
                warn!(error = %err, "Failed to read LAN members for ACL mode check");
                return ModeDecision::Hold(HoldReason::MembershipUnavailable);
            },
        };
        let leader = members
            .iter()
            .filter_map(|member| member.server())
            .find(|server| server.is_alive() && server.addr == leader_addr);

        match leader {
            Some(leader) if leader.acls_enabled() => ModeDecision::Upgrade(Role::Follower),
            Some(_) => ModeDecision::Hold(HoldReason::LeaderNotUpgraded),
            None => ModeDecision::Hold(HoldReason::LeaderUnknown),
        }
    }

    /// Runs one iteration. Returns the role once the switch is complete and
    /// advertised.
    pub fn step(&mut self) -> Option<Role> {
        if let Some(role) = self.pending_publish {
            return self.publish(role);
        }

        let role = match self.evaluate() {
            ModeDecision::Hold(reason) => {
                debug!(reason = reason.as_str(), "Holding legacy ACL mode");
                metrics::record_mode_check(reason.as_str());
                return None;
            },
            ModeDecision::Upgrade(role) => role,
        };

        match self.server.enable_new_acls(role == Role::Leader) {
            Ok(true) => {
                info!(role = role.as_str(), "Switched to new ACL system");
                metrics::record_mode_transition(role.as_str());
            },
            Ok(false) => {
                debug!(role = role.as_str(), "New ACL system already in force");
            },
            Err(err) => {
                warn!(error = %err, "ACL initialization failed, staying on legacy ACLs");
                metrics::record_mode_check("initialization_failed");
                return None;
            },
        }

        self.publish(role)
    }

    fn publish(&mut self, role: Role) -> Option<Role> {
        match self.server.publish_acl_mode() {
            Ok(()) => {
                self.pending_publish = None;
                metrics::record_mode_check("upgraded");
                Some(role)
            },
            Err(err) => {
                warn!(error = %err, "Failed to advertise ACL mode, retrying on next check");
                metrics::record_mode_check("advertise_failed");
                self.pending_publish = Some(role);
                None
            },
        }
    }

    /// Runs the monitor until the upgrade completes or `shutdown` fires.
    pub async fn run(mut self, shutdown: CancellationToken) -> MonitorOutcome {
        info!(
            interval_ms = self.interval.as_millis() as u64,
            datacenter = self.server.config().datacenter.as_str(),
            acl_datacenter = self.server.acl_datacenter(),
            "ACL mode monitor started"
        );

        loop {
            if shutdown.is_cancelled() {
                info!("ACL mode monitor shutting down");
                return MonitorOutcome::Shutdown;
            }
            if self.pending_publish.is_none() && self.server.capability().use_new_acls() {
                info!("New ACL system already in force, stopping ACL mode monitor");
                return MonitorOutcome::AlreadyEnabled;
            }
            if let Some(role) = self.step() {
                info!(role = role.as_str(), "ACL mode upgrade complete");
                return MonitorOutcome::Upgraded(role);
            }

            tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    info!("ACL mode monitor shutting down");
                    return MonitorOutcome::Shutdown;
                }
                _ = sleep(self.interval) => {}
            }
        }
    }

    /// Spawns the monitor as a background task.
    pub fn start(self, shutdown: CancellationToken) -> JoinHandle<MonitorOutcome> {
        tokio::spawn(self.run(shutdown))
    }
}
