//! Entities, value objects and the ports the engines are written against.

pub mod event;
pub mod ids;
pub mod ledger;
pub mod merchant;
pub mod money;
pub mod policy;
pub mod ports;
pub mod refund;
pub mod signature;
pub mod transaction;
pub mod webhook;
