pub mod app;
pub mod config;
pub mod document;
pub mod domain;
pub mod error;
pub mod http;
pub mod images;
pub mod linker;
pub mod logical;
pub mod mets;
pub mod mods;
pub mod output;
pub mod physical;
pub mod ruleset;
pub mod store;
pub mod tui;
pub mod xml;
