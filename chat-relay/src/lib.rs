//! Line-oriented TCP chat relay.
//!
//! One server accepts TCP connections, takes the first message from each as
//! the participant's display name, and rebroadcasts everything a participant
//! sends to everyone else. Modules, leaves first:
//!
//! - [`protocol`] splits inbound bytes into messages (raw reads or lines) and
//!   formats the announcement and chat lines the server emits.
//! - [`connection`] is the server's handle to one client's write half.
//! - [`registry`] tracks who is online; it is the only shared mutable state.
//! - [`broadcast`] fans a message out to a registry snapshot and evicts
//!   recipients whose writes fail.
//! - [`session`] runs the per-connection handshake/relay/close state machine.
//! - [`listener`] accepts connections and spawns one session task each.
//! - [`transport`] and [`client`] make up the terminal client.
//! - [`cli`] and [`config`] hold command-line parsing and server options.

pub mod broadcast;
pub mod cli;
pub mod client;
pub mod config;
pub mod connection;
pub mod error;
pub mod listener;
pub mod protocol;
pub mod registry;
pub mod session;
pub mod transport;
