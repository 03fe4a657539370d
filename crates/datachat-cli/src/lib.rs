// Library interface for datachat-cli, so integration tests can reach the
// pure modules. main.rs declares the same files.

#[path = "attachments.rs"]
pub mod attachments;

#[path = "commands.rs"]
pub mod commands;

#[path = "theme.rs"]
pub mod theme;

pub use attachments::{image_after_failure, load_image, plot_count, save_plots};
pub use commands::{handle_command, CommandResult};
pub use theme::Theme;
