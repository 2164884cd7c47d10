use thiserror::Error;

use crate::connection::ConnectionId;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("connection {0} is already registered")]
    AlreadyRegistered(ConnectionId),
}
