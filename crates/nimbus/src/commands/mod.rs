//! Command dispatch: bridges CLI args -> API calls -> output formatting.

pub mod config_cmd;
pub mod events;
pub mod pair;
pub mod set;
pub mod status;
pub mod systems;
pub mod watch;

use nimbus_api::NimbusClient;

use crate::cli::{Command, GlobalOpts};
use crate::config::Config;
use crate::error::CliError;

/// Dispatch a service-bound command to the appropriate handler.
pub async fn dispatch(
    cmd: Command,
    client: NimbusClient,
    cfg: &Config,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    match cmd {
        Command::Systems => systems::handle(&client, global).await,
        Command::Status(args) => status::handle(&client, args, cfg, global).await,
        Command::Events(args) => events::handle(&client, args, cfg, global).await,
        Command::Set(args) => set::handle(&client, args, global).await,
        Command::Watch(args) => watch::handle(client, args, cfg, global).await,
        // Handled before dispatch
        Command::Pair(_) | Command::Config(_) | Command::Completions(_) => Err(CliError::Validation {
            field: "command".into(),
            reason: "not a service command".into(),
        }),
    }
}
