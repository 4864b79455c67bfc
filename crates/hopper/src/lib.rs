//! hopper - a cryptographic UDP packet relay
//!
//! A listener accepts datagrams from clients, optionally authenticates and
//! decrypts them under an ingress cipher, optionally re-encrypts them under a
//! different egress cipher, and forwards them to one of a configured set of
//! next hops. Reply traffic from the chosen next hop traverses the inverse
//! transform back to the originating client. Relays may be chained so that
//! every network segment carries a different ciphertext under a different key.
//!
//! Frame layout when a cipher is active:
//!
//! ```ignore
//! +----------------+----------------+----------+
//! | nonce(8 bytes) | tag(8 bytes)   |   DATA   |
//! +----------------+----------------+----------+
//! ```
//!
//! With the `none` method the payload travels verbatim with no header.

pub mod config;
pub mod crypto;
pub mod listener;
pub mod packet;
pub mod reactor;
pub mod session;

pub use self::{
    config::Config,
    listener::{ListenError, Listener, OnClientIn, OnNextHopIn},
};
