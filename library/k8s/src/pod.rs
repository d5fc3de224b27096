use error::*;
use k8s_openapi::api::core::v1::{
    ContainerState, ContainerStateTerminated, ContainerStateWaiting, Pod, PodStatus,
};
use result::Result;

/// PodExt is an extension trait used to answer common questions about a
/// worker's backing pod: has it gone Ready, has it crashed, is it stuck
/// Unschedulable, and so on. The Worker Controller's state machine is built
/// almost entirely out of these predicates.
pub trait PodExt {
    fn dns(&self) -> Result<String>;
    fn port(&self, container_port: i32) -> Result<i32>;
    fn address(&self, container_port: i32) -> Result<String>;
    fn running(&self) -> bool;
    fn crashed(&self) -> bool;
    fn terminated(&self) -> bool;
    fn terminated_reason(&self) -> Option<String>;
    fn terminated_message(&self) -> Option<String>;
    fn was_err_image_pull(&self) -> bool;
    fn err_image_pull(&self) -> Result<()>;
    fn unschedulable(&self) -> bool;
}

impl PodExt for Pod {
    fn dns(&self) -> Result<String> {
        let subdomain = self
            .status
            .as_ref()
            .ok_or_else(|| PodHasNoStatus {
                op: "retrieving its cluster DNS entry".to_string(),
            })?
            .pod_ip
            .as_ref()
            .ok_or_else(|| PodHasNoIp {
                op: "retrieving its cluster DNS entry".to_string(),
            })?
            .replace('.', "-");
        let domain = self
            .metadata
            .namespace
            .as_ref()
            .ok_or_else(|| PodHasNoNamespace {
                op: "retrieving its cluster DNS entry".to_string(),
            })?;
        Ok(format!("{}.{}.pod", subdomain, domain))
    }

    fn port(&self, container_port: i32) -> Result<i32> {
        let containers = &self
            .spec
            .as_ref()
            .ok_or_else(|| PodHasNoSpec {
                op: "retrieving its listening port number".to_string(),
            })?
            .containers;
        let container = containers.get(0).as_ref().ok_or_else(|| ContainerHasNoPorts {
            op: "retrieving its listening port number".to_string(),
        })?;
        let ports = container.ports.as_ref().ok_or_else(|| ContainerHasNoPorts {
            op: "retrieving its listening port number".to_string(),
        })?;
        ports
            .iter()
            .find(|p| container_port == 0 || p.container_port == container_port)
            .map(|p| p.container_port)
            .ok_or_else(|| {
                ContainerHasNoPorts {
                    op: "retrieving its listening port number".to_string(),
                }
                .into()
            })
    }

    fn address(&self, container_port: i32) -> Result<String> {
        Ok(format!("{}:{}", self.dns()?, self.port(container_port)?))
    }

    fn running(&self) -> bool {
        let default_state = ContainerState::default();
        let default_status = PodStatus::default();
        let default_statuses = vec![];
        self.status
            .as_ref()
            .unwrap_or(&default_status)
            .container_statuses
            .as_ref()
            .unwrap_or(&default_statuses)
            .iter()
            .any(|status| {
                let state = status.state.as_ref().unwrap_or(&default_state);
                state.running.is_some()
            })
    }

    fn terminated(&self) -> bool {
        let default_state = ContainerState::default();
        let default_status = PodStatus::default();
        let default_statuses = vec![];
        self.status
            .as_ref()
            .unwrap_or(&default_status)
            .container_statuses
            .as_ref()
            .unwrap_or(&default_statuses)
            .iter()
            .any(|status| {
                let state = status.state.as_ref().unwrap_or(&default_state);
                state.terminated.is_some()
            })
    }

    fn was_err_image_pull(&self) -> bool {
        let default_state = ContainerState::default();
        let default_status = PodStatus::default();
        let default_statuses = vec![];
        let status = self
            .status
            .as_ref()
            .unwrap_or(&default_status)
            .container_statuses
            .as_ref()
            .unwrap_or(&default_statuses)
            .iter()
            .find(|status| {
                let state = status.state.as_ref().unwrap_or(&default_state);
                matches!(
                    state.waiting.as_ref(),
                    Some(ContainerStateWaiting { reason: Some(reason), .. }) if reason == "ErrImagePull"
                )
            });
        status.is_some()
    }

    fn err_image_pull(&self) -> Result<()> {
        let default_state = ContainerState::default();
        let default_status = PodStatus::default();
        let default_statuses = vec![];
        let status = self
            .status
            .as_ref()
            .unwrap_or(&default_status)
            .container_statuses
            .as_ref()
            .unwrap_or(&default_statuses)
            .iter()
            .find(|status| {
                let state = status.state.as_ref().unwrap_or(&default_state);
                matches!(
                    state.waiting.as_ref(),
                    Some(ContainerStateWaiting { reason: Some(reason), .. }) if reason == "ErrImagePull"
                )
            });
        if let Some(problem) = status {
            Err(ErrImagePull {
                message: ErrImagePullCause {
                    message: problem
                        .state
                        .as_ref()
                        .and_then(|s| s.waiting.as_ref())
                        .and_then(|w| w.message.as_ref())
                        .cloned()
                        .unwrap_or_default(),
                },
            }
            .into())
        } else {
            Ok(())
        }
    }

    fn crashed(&self) -> bool {
        let default_state = ContainerState::default();
        let default_status = PodStatus::default();
        let default_statuses = vec![];
        let status = self
            .status
            .as_ref()
            .unwrap_or(&default_status)
            .container_statuses
            .as_ref()
            .unwrap_or(&default_statuses)
            .iter()
            .find(|status| {
                let state = status.state.as_ref().unwrap_or(&default_state);
                matches!(
                    state.waiting.as_ref(),
                    Some(ContainerStateWaiting { reason: Some(reason), .. }) if reason == "CrashLoopBackOff"
                )
            });
        status.is_some()
    }

    fn terminated_reason(&self) -> Option<String> {
        let default_state = ContainerState::default();
        let default_status = PodStatus::default();
        let default_statuses = vec![];
        self.status
            .as_ref()
            .unwrap_or(&default_status)
            .container_statuses
            .as_ref()
            .unwrap_or(&default_statuses)
            .iter()
            .map(|status| {
                let state = status.state.as_ref().unwrap_or(&default_state);
                match state {
                    ContainerState {
                        terminated: Some(ContainerStateTerminated { reason: Some(reason), .. }),
                        ..
                    } => Some(reason.clone()),
                    _ => None,
                }
            })
            .last()
            .unwrap_or(None)
    }

    fn terminated_message(&self) -> Option<String> {
        let default_state = ContainerState::default();
        let default_status = PodStatus::default();
        let default_statuses = vec![];
        self.status
            .as_ref()
            .unwrap_or(&default_status)
            .container_statuses
            .as_ref()
            .unwrap_or(&default_statuses)
            .iter()
            .map(|status| {
                let state = status.state.as_ref().unwrap_or(&default_state);
                match state {
                    ContainerState {
                        terminated: Some(ContainerStateTerminated { message: Some(message), .. }),
                        ..
                    } => Some(message.clone()),
                    _ => None,
                }
            })
            .last()
            .unwrap_or(None)
    }

    fn unschedulable(&self) -> bool {
        let default_status = PodStatus::default();
        let default_conditions = vec![];
        self.status
            .as_ref()
            .unwrap_or(&default_status)
            .conditions
            .as_ref()
            .unwrap_or(&default_conditions)
            .iter()
            .any(|c| {
                c.type_ == "PodScheduled"
                    && c.status == "False"
                    && c.reason.as_deref() == Some("Unschedulable")
            })
    }
}

#[derive(Error, FleetError, HttpCode, Kind, Debug)]
#[error(
    "The image for the worker pod failed to get pulled from the configured image registry. \
Perhaps the image doesn't exist or the connection to the registry couldn't be established?"
)]
#[code(error::Status::NotFound)]
struct ErrImagePull {
    #[source]
    message: ErrImagePullCause,
}

#[derive(Error, FleetError, HttpCode, Kind, Debug)]
#[error("{message}")]
#[code(error::Status::NotFound)]
struct ErrImagePullCause {
    message: String,
}

#[derive(Error, FleetError, HttpCode, Kind, Debug)]
#[code(error::Status::InternalServerError)]
#[error(
    "An attempt was made to retrieve the status field of a pod object while {op}, however the \
object had no status field. This was likely a premature call to a pod object that had not yet \
been provisioned in Kubernetes."
)]
struct PodHasNoStatus {
    op: String,
}

#[derive(Error, FleetError, HttpCode, Kind, Debug)]
#[code(error::Status::InternalServerError)]
#[error(
    "An attempt was made to retrieve the pod IP field of a pod object while {op}, however the \
object had no IP. This was likely a premature call to a pod object that had not yet \
been provisioned in Kubernetes."
)]
struct PodHasNoIp {
    op: String,
}

#[derive(Error, FleetError, HttpCode, Kind, Debug)]
#[code(error::Status::InternalServerError)]
#[error(
    "An attempt was made to retrieve the namespace of a pod object while {op}, however the \
object had no namespace associated with it. This was likely a premature call to a pod object \
that had not yet been provisioned in Kubernetes."
)]
struct PodHasNoNamespace {
    op: String,
}

#[derive(Error, FleetError, HttpCode, Kind, Debug)]
#[code(error::Status::InternalServerError)]
#[error(
    "An attempt was made to retrieve the spec of a pod object while {op}, however the \
object had no spec associated with it. This was likely a premature call to a pod object \
that had not yet been provisioned in Kubernetes."
)]
struct PodHasNoSpec {
    op: String,
}

#[derive(Error, FleetError, HttpCode, Kind, Debug)]
#[code(error::Status::InternalServerError)]
#[error(
"An attempt was made to retrieve at least one listening port associated with a container object while \
{op}, however the object had no listening ports associated with it. This was likely a premature call to a \
pod object that had not yet been provisioned in Kubernetes."
)]
struct ContainerHasNoPorts {
    op: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unschedulable_false_by_default() {
        let pod = Pod::default();
        assert!(!pod.unschedulable());
    }

    #[test]
    fn running_false_with_no_status() {
        let pod = Pod::default();
        assert!(!pod.running());
    }
}
