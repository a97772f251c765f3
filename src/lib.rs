//! Receive push webhooks and force local git repositories onto their remote master.
//!
//! ## How it works
//!
//! Every repository under the **hook root** gets its own endpoint: a POST to
//! `/demo` updates the repository in `<hook root>/demo`. The body has to be a
//! push webhook (Bitbucket Server or GitLab) with a change on `refs/heads/master`,
//! anything else is ignored.
//!
//! ```ignore
//! +---------+     +---------+     +--------+     +------+     +------+
//! | request | --> | payload | --> | master | --> | lock | --> | sync |
//! +---------+     +---------+     +--------+     +------+     +------+
//! ```
//!
//! Updating is destructive: `origin` is fetched, then master, HEAD and the working tree
//! are reset to `origin/master`, throwing away every local change. Only one
//! update runs at a time in the whole process.

/// The configuration of the daemon, read from a TOML file and the command line.
pub mod config;
/// The shared state of the request threads, with the lock that serializes the updates.
pub mod context;
/// Processing a single webhook from the body to the response.
pub mod hook;
/// Parsing webhook payloads into a single "did master change" event.
pub mod payload;
/// The HTTP server that dispatches the requests.
pub mod server;
/// Forcing a repository to the state of its remote master.
pub mod sync;
/// Finding the repository for a request path.
pub mod target;
