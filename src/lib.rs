//! Quickdraw duel server
//!
//! Two players share a room, wait for a randomized cue, and report their
//! reaction time; the fastest plausible shot takes the round. Rooms are joined
//! by six-digit code or formed by a rating-windowed matchmaking queue.
//!
//! - [`lobby`] owns every room, the queue, and all timers on one task
//! - [`game`] holds the room state machine and shot validation
//! - [`matchmaking`] holds the queue and pairing window
//! - [`ws`] is the WebSocket gateway and wire protocol
//! - [`http`] serves `/health`, `/rooms/:code`, and the `/ws` upgrade

pub mod app;
pub mod config;
pub mod game;
pub mod http;
pub mod lobby;
pub mod matchmaking;
pub mod util;
pub mod ws;

pub use app::AppState;
pub use config::Config;
pub use http::build_router;
