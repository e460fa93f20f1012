//! Subcommand definitions.

use clap::{Subcommand, ValueEnum};

/// Available commands.
#[derive(Subcommand)]
pub enum Commands {
    /// Read `user: text` lines from stdin and speak them
    ///
    /// Lines starting with `!` are operator commands: `!skip`, `!clear`,
    /// `!pause`, `!resume`, `!stats`, and `!say <text>` for a manual request.
    Run {
        /// Audio output
        #[arg(long, value_enum, default_value_t = SinkArg::Timed)]
        sink: SinkArg,
    },

    /// Manage per-user permissions
    User {
        #[command(subcommand)]
        command: UserCommand,
    },

    /// Show spend, permission and cache statistics
    Stats {
        /// Print JSON instead of tables
        #[arg(long)]
        json: bool,
    },

    /// Replay a scripted scenario against in-memory stores
    ///
    /// The first engine hangs, the rate limit is three messages per minute,
    /// and the circuit breaker takes the failing engine out of rotation.
    Simulate {
        /// Print every event as JSON
        #[arg(long)]
        json: bool,
    },
}

/// Audio output for `run`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SinkArg {
    /// Headless: wait out the estimated duration
    Timed,
    /// Print `playAudio` events for an overlay
    Overlay,
    /// Play through the default output device
    #[cfg(feature = "rodio")]
    Device,
}

#[derive(Subcommand)]
pub enum UserCommand {
    /// Allow a user to speak
    Allow {
        user_id: String,
        #[arg(long)]
        name: Option<String>,
    },
    /// Revoke a user's explicit permission
    Deny {
        user_id: String,
        #[arg(long)]
        name: Option<String>,
    },
    /// Block a user entirely
    Blacklist {
        user_id: String,
        #[arg(long)]
        name: Option<String>,
    },
    /// Lift a block
    Unblacklist {
        user_id: String,
        #[arg(long)]
        name: Option<String>,
    },
    /// Set a user's team level
    Level {
        user_id: String,
        level: u8,
        #[arg(long)]
        name: Option<String>,
    },
    /// Assign a voice, or clear it when omitted
    Voice {
        user_id: String,
        voice: Option<String>,
        #[arg(long)]
        name: Option<String>,
    },
    /// List every known user
    List,
}
