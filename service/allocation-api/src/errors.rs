//! Error kinds specific to the allocation surface. Transient/permanent faults
//! from the orchestrator client or the identity/token libraries propagate
//! through their own `FleetError` types; these cover the policy and capacity
//! decisions this crate makes itself.

use error::*;

#[derive(Error, FleetError, Kind, HttpCode, Debug)]
#[code(Status::NotFound)]
#[error("pool '{pool}' does not exist")]
pub struct PoolNotFound {
    pub pool: String,
}

#[derive(Error, FleetError, Kind, HttpCode, Debug)]
#[code(Status::Forbidden)]
#[error("caller is not permitted to allocate from pool '{pool}'")]
pub struct Forbidden {
    pub pool: String,
}

#[derive(Error, FleetError, Kind, HttpCode, Debug)]
#[code(Status::ServiceUnavailable)]
#[error("pool '{pool}' is at capacity and no worker became idle in time; retry shortly")]
pub struct AtCapacity {
    pub pool: String,
}

#[derive(Error, FleetError, Kind, HttpCode, Debug)]
#[code(Status::InternalServerError)]
#[error("worker '{worker}' reached Idle/Running without a recorded endpoint")]
pub struct WorkerHasNoEndpoint {
    pub worker: String,
}

#[derive(Error, FleetError, Kind, HttpCode, Debug)]
#[code(Status::Conflict)]
#[error("could not write allocation onto worker '{worker}' after repeated conflicts")]
pub struct AllocationWriteConflict {
    pub worker: String,
}

#[derive(Error, FleetError, Kind, HttpCode, Debug)]
#[code(Status::GatewayTimeout)]
#[error("pool '{pool}' did not become ready within the wake deadline")]
pub struct WakeTimedOut {
    pub pool: String,
}

#[derive(Error, FleetError, Kind, HttpCode, Debug)]
#[code(Status::NotFound)]
#[error("no live allocation for the given token")]
pub struct TokenNotAllocated {}
