//! marketcrawl - extension marketplace crawler and page archiver.
//!
//! Discovers extensions by scrolling marketplace listings in a headless
//! browser, stores their metadata in SQLite, and saves each extension's
//! rendered page to disk.

pub mod archive;
pub mod browser;
pub mod cli;
pub mod config;
pub mod migrations;
pub mod models;
pub mod repository;
pub mod schema;
pub mod scrapers;
