use thiserror::Error;

use crate::endpoint::EndpointError;
use crate::model::{LessonError, ParseIdError};
use crate::protocol::ProtocolError;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    #[error(transparent)]
    Lesson(#[from] LessonError),
    #[error(transparent)]
    Id(#[from] ParseIdError),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error(transparent)]
    Endpoint(#[from] EndpointError),
}
