//! envmig Contentful - Management API backend
//!
//! Implements `envmig_core::ManagementApi` over HTTP:
//! - Bearer-token authentication with the management media type
//! - `X-Contentful-Version` on every update for optimistic concurrency
//! - `X-Contentful-Source-Environment` when cloning environments
//! - Paged collection reads
//!
//! A 404 maps to `BackendError::NotFound`; any other non-success status to
//! `BackendError::Status` with the message from the error body.

#![warn(unreachable_pub)]

pub mod client;
pub mod wire;

pub use client::ContentfulClient;
