mod api;
mod cache;
mod playback;
mod process;
mod uri;

pub(crate) use api::PlayerClient;
pub(crate) use playback::{Session, resolve_successor, run_session};
pub(crate) use process::{PlayerProcess, player_command};
