pub(crate) mod helpers;

mod activity;
mod playback;
