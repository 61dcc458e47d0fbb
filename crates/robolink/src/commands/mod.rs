//! Command dispatch: bridges CLI args -> core components -> output formatting.

pub mod config_cmd;
pub mod history;
pub mod send;
pub mod status;
pub mod util;
pub mod watch;

use std::sync::Arc;

use robolink_config::Settings;
use robolink_core::{CommandTransport, Dispatcher, KeyValueStore, SyncConfig};

use crate::cli::{Command, GlobalOpts};
use crate::error::CliError;
use crate::store::FileStore;

/// Resolved configuration for one invocation.
#[derive(Debug)]
pub struct Session {
    pub settings: Settings,
    pub config: SyncConfig,
}

impl Session {
    pub fn load(global: &GlobalOpts) -> Result<Self, CliError> {
        let settings = robolink_config::load_settings(global.config.as_deref())?;
        let config = settings.clone().into_sync_config()?;
        Ok(Self { settings, config })
    }

    /// Durable store under the configured data dir.
    pub fn storage(&self) -> Result<Arc<dyn KeyValueStore>, CliError> {
        let store = FileStore::open(self.settings.resolved_data_dir().join("state"))?;
        Ok(Arc::new(store))
    }

    /// Standalone HTTP dispatcher for one-shot commands.
    pub fn dispatcher(&self) -> Result<Dispatcher, CliError> {
        let transport: Arc<dyn CommandTransport> = Arc::new(self.config.device_client()?);
        Ok(Dispatcher::new(transport, self.config.dispatcher_config()))
    }
}

/// Dispatch a robot-bound command to its handler.
pub async fn dispatch(cmd: Command, session: &Session, global: &GlobalOpts) -> Result<(), CliError> {
    match cmd {
        Command::Watch(args) => watch::handle(session, &args, global).await,
        Command::Status => status::handle(session, global).await,
        Command::Send(args) => send::handle(session, &args, global).await,
        Command::Move { direction } => send::motion(session, direction, global).await,
        Command::Toggle { component } => send::toggle(session, component, global).await,
        Command::History => history::handle(session, global),
        // Config and Completions are handled before dispatch
        Command::Config(_) | Command::Completions(_) => unreachable!(),
    }
}
