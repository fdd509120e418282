//! Settlement end-to-end tests
#![allow(missing_docs, unused)]

#[path = "e2e/cases/mod.rs"]
mod cases;
#[path = "e2e/environment.rs"]
mod environment;
