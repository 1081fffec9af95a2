//! Integration tests for the proxy
//!
//! Requests go through the full router: the scripted backend covers the
//! translation paths, wiremock stands in for GitHub and Copilot when the real
//! backend is exercised.

mod copilot_backend;
mod health;
mod messages;
