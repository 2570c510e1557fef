//! Session provider for dependency injection.

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;

use crate::{
    config::ConfigManager,
    providers::traits::AsyncProvider,
    reload::ReloadHandle,
    runner::CommandRunner,
    session::Session,
};

/// Provider assembling the shared session from its collaborators.
pub struct SessionProvider {
    config_manager: Arc<ConfigManager>,
    runner: Arc<dyn CommandRunner>,
    reload: ReloadHandle,
}

impl SessionProvider {
    pub fn new(
        config_manager: Arc<ConfigManager>,
        runner: Arc<dyn CommandRunner>,
        reload: ReloadHandle,
    ) -> Self {
        Self {
            config_manager,
            runner,
            reload,
        }
    }
}

#[async_trait]
impl AsyncProvider<Session> for SessionProvider {
    async fn provide(&self) -> Result<Session> {
        Ok(Session::new(
            self.config_manager.clone(),
            self.runner.clone(),
            self.reload.clone(),
        )
        .await)
    }
}
