//! Integration test crate for the Carapace security pipeline. All content
//! lives in `tests/`.
