//! Brando Imóveis listings site.
//!
//! Public property browsing, lead capture, a rule-based assistant, and an
//! admin back office with CSV/XLSX import/export, photo uploads and
//! post-sale service tickets.
//!
//! # Modules
//!
//! - `api`: HTTP-facing namespace (handlers, routes, sessions).
//! - `core`: Domain namespace (models, normalizers, assistant, errors).
//! - `config`: Configuration management.
//! - `db`: Database pool and migrations.
//! - `repository`: Storage trait, with `pg_store` and `memory_store` backends.
//! - `tabular`: Spreadsheet and delimited-text import/export.

pub mod api;
pub mod core;

pub mod admin_handlers;
pub mod assistant;
pub mod config;
pub mod db;
pub mod errors;
pub mod handlers;
pub mod memory_store;
pub mod models;
pub mod normalize;
pub mod openapi;
pub mod pg_store;
pub mod repository;
pub mod routes;
pub mod session;
pub mod tabular;
