#![doc = "target-crawler-core: discovery and dispatch pipeline for target-crawler."]

//! This crate holds the crawl-to-dispatch core: provider enumeration,
//! paginated listing with rate-limit backoff, the bounded target queue,
//! paced job submission and the run coordinator tying them together.
//! Transport to the orchestration API lives in the binary crate.
//!
//! # Usage
//! Build a [`producers::SourceConfig`] into a [`contract::Producer`] through
//! [`producers::registry::Registry`], then hand it with a
//! [`contract::JobCreator`] to [`run::run`].

pub mod auth;
pub mod clients;
pub mod config;
pub mod contract;
pub mod dispatch;
pub mod error;
pub mod pagination;
pub mod producers;
pub mod queue;
pub mod run;
pub mod target;
