//! Change-notice fan-out to connected admin consoles and guest windows.

pub mod hub;
pub mod observer;
