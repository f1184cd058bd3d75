//! Schelling's model of residential segregation.
//!
//! A [`Grid`](grid::Grid) holds vacant cells and agents of two types. Each
//! step of the [`Engine`](engine::Engine) moves every unsatisfied agent to a
//! random vacant cell and updates the satisfied percentage.

pub mod analysis;
pub mod config;
pub mod engine;
pub mod error;
pub mod grid;
pub mod manager;
pub mod model;
pub mod stats;
