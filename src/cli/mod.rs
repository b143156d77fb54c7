mod commands;
mod handlers;

pub use commands::{Cli, Commands, GlobalArgs};
pub use handlers::{
    handle_add, handle_clear, handle_delete, handle_edit, handle_front, handle_list, handle_move,
    handle_resize, handle_serve, handle_status, handle_sync,
};
