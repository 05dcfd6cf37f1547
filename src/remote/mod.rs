// ABOUTME: Remote media API access
// ABOUTME: GraphQL change feed client and its wire models

pub mod client;
pub mod models;

pub use client::GraphQlChangeFeed;
