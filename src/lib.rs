//! # Analytics Sentinel Library
//!
//! LLM-driven data-quality and opportunity checks over an analytics event
//! warehouse. A [`catalog`] of plain-English checks is turned into SQL by a
//! [`synth::QuerySynthesizer`], executed through a
//! [`warehouse::WarehouseClient`], interpreted by a
//! [`classifier::FindingClassifier`], filtered by the [`dedup`] gate and
//! delivered through a [`notify::NotificationSink`]. The
//! [`orchestrator::CheckOrchestrator`] ties the stages together and returns a
//! [`report::RunReport`].

pub mod app;
pub mod catalog;
pub mod classifier;
pub mod cli;
pub mod config;
pub mod context;
pub mod dedup;
pub mod error;
pub mod finding;
pub mod llm;
pub mod notify;
pub mod orchestrator;
pub mod output;
pub mod query;
pub mod report;
pub mod state;
pub mod synth;
pub mod warehouse;
