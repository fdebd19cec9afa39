#![allow(clippy::needless_pass_by_value, clippy::redundant_clone)]

mod network;
mod simulation;
mod tests;
