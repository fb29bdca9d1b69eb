//! Connection registry: the fixed set of logical connections.

use std::time::Duration;

use async_trait::async_trait;

use common::errors::{AppError, AppResult};
use common::models::{ConnectionItem, ConnectionSpec};

use crate::drivers::{Connection, SessionProvider, SourceSession};

pub struct ConnectionRegistry {
    connections: Vec<Connection>,
}

impl ConnectionRegistry {
    pub fn new(specs: &[ConnectionSpec], connect_timeout: Duration) -> Self {
        let connections = specs
            .iter()
            .map(|spec| Connection::from_spec(spec, connect_timeout))
            .collect::<Vec<_>>();
        for connection in &connections {
            tracing::info!(
                connection = connection.name(),
                driver = %connection.driver_kind(),
                "connection registered"
            );
        }
        Self { connections }
    }

    /// Looks a connection up by exact logical name.
    pub fn get(&self, name: &str) -> AppResult<&Connection> {
        self.connections
            .iter()
            .find(|c| c.name() == name)
            .ok_or_else(|| AppError::ConnectionNotFound(name.to_string()))
    }

    /// Registered connections in registration order.
    pub fn list(&self) -> Vec<ConnectionItem> {
        self.connections
            .iter()
            .map(|c| ConnectionItem {
                name: c.name().to_string(),
                driver: c.driver_kind(),
            })
            .collect()
    }

    pub fn connections(&self) -> &[Connection] {
        &self.connections
    }
}

#[async_trait]
impl SessionProvider for ConnectionRegistry {
    async fn open_session(&self, connection: &str) -> AppResult<Box<dyn SourceSession>> {
        self.get(connection)?.open().await
    }
}
