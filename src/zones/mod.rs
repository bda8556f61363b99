//! Card zones.
//!
//! Zones are ordered piles: a deck, a player's draw pile, hand, and
//! discard pile. Scripts get the same saturating semantics through
//! `api.move_cards` and `api.take_cards`.

pub mod pile;

pub use pile::Pile;
