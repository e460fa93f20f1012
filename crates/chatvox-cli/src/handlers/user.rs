//! `user`: manage permission records.

use anyhow::Result;
use chatvox_core::PermissionChange;

use crate::bootstrap::CliContext;
use crate::commands::UserCommand;
use crate::presentation::print_users;

/// Split a user subcommand into its target and the change to apply.
///
/// Returns `None` for `list`.
pub fn to_change(command: UserCommand) -> Option<(String, Option<String>, PermissionChange)> {
    let (user_id, name, change) = match command {
        UserCommand::Allow { user_id, name } => (user_id, name, PermissionChange::Allow),
        UserCommand::Deny { user_id, name } => (user_id, name, PermissionChange::Deny),
        UserCommand::Blacklist { user_id, name } => (user_id, name, PermissionChange::Blacklist),
        UserCommand::Unblacklist { user_id, name } => {
            (user_id, name, PermissionChange::Unblacklist)
        }
        UserCommand::Level {
            user_id,
            level,
            name,
        } => (user_id, name, PermissionChange::SetTeamLevel { level }),
        UserCommand::Voice {
            user_id,
            voice,
            name,
        } => (user_id, name, PermissionChange::AssignVoice { voice }),
        UserCommand::List => return None,
    };
    Some((user_id, name, change))
}

pub async fn execute(ctx: &CliContext, command: UserCommand) -> Result<()> {
    let service = ctx.service();
    let Some((user_id, name, change)) = to_change(command) else {
        print_users(&service.list_users().await?);
        return Ok(());
    };

    // An empty name keeps the stored one.
    let record = service
        .set_user(&user_id, name.as_deref().unwrap_or_default(), &change)
        .await?;
    print_users(std::slice::from_ref(&record));
    Ok(())
}
