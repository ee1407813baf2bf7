//! End-to-end test support for librarian
//!
//! `harness` builds throwaway workspaces (real files, real git repos);
//! `mocks` provides deterministic embedding and LLM providers.

pub mod harness;
pub mod mocks;
