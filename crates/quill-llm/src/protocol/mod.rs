//! Wire format types for vendor API protocols
//!
//! Each module contains pure serde structs matching a vendor's JSON format.
//! These types only appear at the HTTP boundary.

pub mod anthropic;
pub mod google;
pub mod ollama;
pub mod openai;
