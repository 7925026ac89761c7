//! Integration tests for the StackEdit to Hugo synchronization engine

mod bootstrap_flow;
mod change_feed;
mod common;
mod couch_client;
mod frontmatter_index;
mod reconcile_plan;
