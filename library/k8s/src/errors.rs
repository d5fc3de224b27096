use error::*;

#[derive(Error, Kind, FleetError, HttpCode, Debug)]
pub enum ApiError {
    #[error("The orchestrator's API server rejected our request")]
    #[code(Status::InternalServerError)]
    Api(#[source] kube::Error),
    #[error("Failed to connect to the orchestrator's API server")]
    #[code(Status::InternalServerError)]
    Connection(#[source] kube::Error),
    // TODO: kube::Error has a long tail of variants (ws upgrade, serde, uri parsing...).
    // Bucket them here as they show up in practice rather than enumerating all of them
    // speculatively.
    #[error("The orchestrator's API server rejected our request")]
    #[code(Status::InternalServerError)]
    Rest(#[source] kube::Error),
}

impl From<kube::Error> for ApiError {
    fn from(err: kube::Error) -> Self {
        match err {
            kube::Error::Api(_) => ApiError::Api(err),
            kube::Error::Service(_) => ApiError::Connection(err),
            _ => ApiError::Rest(err),
        }
    }
}
